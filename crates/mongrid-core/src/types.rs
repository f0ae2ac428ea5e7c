//! Shared types used across mongrid crates.

use std::fmt;

/// Key identifying a connection pool. Configurations with the same key share a pool.
///
/// Only the endpoint takes part in identity. Credentials and pool tuning do
/// not, so two configurations that differ only in pool size resolve to the
/// same pool.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PoolKey {
    pub host: String,
    pub port: u16,
}

impl PoolKey {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
        }
    }
}

impl fmt::Display for PoolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn pool_key_display() {
        assert_eq!(PoolKey::new("db.local", 27017).to_string(), "db.local:27017");
    }

    #[test]
    fn pool_key_different_port() {
        assert_ne!(PoolKey::new("host", 27017), PoolKey::new("host", 27018));
    }

    #[test]
    fn pool_key_different_host() {
        assert_ne!(PoolKey::new("host1", 27017), PoolKey::new("host2", 27017));
    }

    #[test]
    fn pool_key_hashable() {
        let mut map = HashMap::new();
        let key = PoolKey::new("host", 27017);
        map.insert(key.clone(), 42);
        assert_eq!(map.get(&key), Some(&42));
    }
}
