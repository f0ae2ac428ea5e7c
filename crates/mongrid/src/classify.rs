//! Error classification and identifier helpers. No I/O.

use mongodb::bson::Bson;
use mongodb::error::{ErrorKind, WriteFailure};

use crate::error::{PoolError, PoolResult};

/// Server error code for a unique index violation.
pub const DUPLICATE_KEY_CODE: i32 = 11000;

/// True when a read matched no document, as opposed to failing.
pub fn is_no_document(err: &PoolError) -> bool {
    matches!(err, PoolError::NotFound)
}

/// True when a write failed because it violated a unique index.
///
/// Any other failure, including a duplicate-key code buried in something
/// that is not a write error, returns `false`.
pub fn is_duplicate_key(err: &PoolError) -> bool {
    match err {
        PoolError::Database(db_err) => write_error_codes(db_err).contains(&DUPLICATE_KEY_CODE),
        _ => false,
    }
}

/// Server codes carried by a driver write failure.
///
/// Command errors are not write failures and carry no codes here, so an index
/// build rejected over existing duplicates is not reported as a duplicate key.
pub fn write_error_codes(err: &mongodb::error::Error) -> Vec<i32> {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write_error)) => vec![write_error.code],
        ErrorKind::InsertMany(insert_many) => insert_many
            .write_errors
            .iter()
            .flatten()
            .map(|indexed| indexed.code)
            .collect(),
        _ => Vec::new(),
    }
}

/// Hex string of a database-native `ObjectId`.
pub fn object_id_hex(id: &Bson) -> PoolResult<String> {
    match id {
        Bson::ObjectId(oid) => Ok(oid.to_hex()),
        other => Err(PoolError::InvalidIdentifier(format!(
            "expected an ObjectId, got {:?}",
            other.element_type()
        ))),
    }
}

/// Convert a BSON array of strings into owned strings.
pub fn strings_from_array(values: &[Bson]) -> PoolResult<Vec<String>> {
    values
        .iter()
        .enumerate()
        .map(|(index, value)| match value {
            Bson::String(s) => Ok(s.clone()),
            other => Err(PoolError::Decode(format!(
                "element {index} is {:?}, expected a string",
                other.element_type()
            ))),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::oid::ObjectId;
    use std::time::Duration;

    #[test]
    fn not_found_is_no_document() {
        assert!(is_no_document(&PoolError::NotFound));
    }

    #[test]
    fn other_errors_are_not_no_document() {
        assert!(!is_no_document(&PoolError::Decode("bad".into())));
        assert!(!is_no_document(&PoolError::Connection("refused".into())));
    }

    #[test]
    fn non_database_errors_are_not_duplicates() {
        assert!(!is_duplicate_key(&PoolError::NotFound));
        assert!(!is_duplicate_key(&PoolError::EmptyFilter));
        assert!(!is_duplicate_key(&PoolError::Timeout {
            operation: "insert_one",
            after: Duration::from_secs(5),
        }));
    }

    #[test]
    fn driver_errors_outside_writes_are_not_duplicates() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "E11000 reset");
        let err = PoolError::Database(mongodb::error::Error::from(io));
        assert!(!is_duplicate_key(&err));
        if let PoolError::Database(db_err) = &err {
            assert!(write_error_codes(db_err).is_empty());
        }
    }

    #[test]
    fn object_id_to_hex() {
        let oid = ObjectId::new();
        assert_eq!(object_id_hex(&Bson::ObjectId(oid)).unwrap(), oid.to_hex());
        assert_eq!(object_id_hex(&Bson::ObjectId(oid)).unwrap().len(), 24);
    }

    #[test]
    fn non_object_id_is_rejected() {
        let err = object_id_hex(&Bson::String("5f1d7f1e".into())).unwrap_err();
        assert!(matches!(err, PoolError::InvalidIdentifier(_)));
        assert!(object_id_hex(&Bson::Int32(7)).is_err());
    }

    #[test]
    fn strings_from_string_array() {
        let values = vec![Bson::String("a".into()), Bson::String("b".into())];
        assert_eq!(strings_from_array(&values).unwrap(), ["a", "b"]);
        assert!(strings_from_array(&[]).unwrap().is_empty());
    }

    #[test]
    fn strings_from_mixed_array_fails() {
        let values = vec![Bson::String("a".into()), Bson::Int64(2)];
        let err = strings_from_array(&values).unwrap_err();
        match err {
            PoolError::Decode(msg) => assert!(msg.contains("element 1")),
            other => panic!("unexpected error: {other}"),
        }
    }
}
