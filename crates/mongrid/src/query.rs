//! Typed filter, sort and pipeline builders.
//!
//! Pure functions, no I/O. The handle feeds their output straight to the
//! driver.

use mongodb::bson::{Bson, Document, doc};

use crate::error::{PoolError, PoolResult};

/// Limit applied to a search when the caller passes 0, to bound unbounded scans.
pub const DEFAULT_SEARCH_LIMIT: u64 = 5000;

/// Field name of the document produced by the terminal `$count` stage.
pub const TOTAL_COUNT_FIELD: &str = "totalCount";

/// How a [`FieldFilter`] compares its value against the field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatchMode {
    /// Field equals the value.
    Equals,
    /// Field matches the value as a regular expression (unanchored).
    ContainsPattern,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FieldFilter {
    pub field: String,
    pub value: String,
    pub mode: MatchMode,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    fn as_bson(self) -> i32 {
        match self {
            SortDirection::Ascending => 1,
            SortDirection::Descending => -1,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SortKey {
    pub field: String,
    pub direction: SortDirection,
}

/// One `field IN (values…)` group of a set-membership fetch.
#[derive(Clone, Debug, PartialEq)]
pub struct MembershipGroup {
    pub field: String,
    pub values: Vec<Bson>,
}

impl MembershipGroup {
    pub fn new<I, V>(field: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Bson>,
    {
        Self {
            field: field.to_string(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }
}

/// Build the set-membership filter: one `$in` (or `$nin` when `negate`)
/// predicate per group, OR-combined across groups.
///
/// With `negate` the result is a union of exclusions, not an intersection:
/// a document passes if it is outside *any* one group.
pub fn membership_filter(negate: bool, groups: &[MembershipGroup]) -> PoolResult<Document> {
    if groups.is_empty() {
        return Err(PoolError::EmptyFilter);
    }
    let operator = if negate { "$nin" } else { "$in" };
    let conditions: Vec<Bson> = groups
        .iter()
        .map(|group| {
            let mut predicate = Document::new();
            predicate.insert(operator, group.values.clone());
            let mut condition = Document::new();
            condition.insert(group.field.clone(), predicate);
            Bson::Document(condition)
        })
        .collect();
    Ok(doc! { "$or": conditions })
}

/// A filtered, sorted, paged aggregation search.
///
/// Filters and sort keys are applied in the order they were added.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SearchQuery {
    pub filters: Vec<FieldFilter>,
    pub sort: Vec<SortKey>,
    pub limit: u64,
    pub skip: u64,
}

impl SearchQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn equals(mut self, field: &str, value: &str) -> Self {
        self.filters.push(FieldFilter {
            field: field.to_string(),
            value: value.to_string(),
            mode: MatchMode::Equals,
        });
        self
    }

    pub fn contains(mut self, field: &str, pattern: &str) -> Self {
        self.filters.push(FieldFilter {
            field: field.to_string(),
            value: pattern.to_string(),
            mode: MatchMode::ContainsPattern,
        });
        self
    }

    pub fn sort_by(mut self, field: &str, direction: SortDirection) -> Self {
        self.sort.push(SortKey {
            field: field.to_string(),
            direction,
        });
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = limit;
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = skip;
        self
    }

    /// Limit actually sent to the server.
    pub fn effective_limit(&self) -> u64 {
        if self.limit == 0 { DEFAULT_SEARCH_LIMIT } else { self.limit }
    }

    /// `$match` → `$sort` → `$skip` → `$limit`; match and sort only when non-empty.
    pub fn pipeline(&self) -> Vec<Document> {
        let mut stages = Vec::with_capacity(4);
        if let Some(stage) = match_stage(&self.filters) {
            stages.push(stage);
        }
        if !self.sort.is_empty() {
            let mut rule = Document::new();
            for key in &self.sort {
                rule.insert(key.field.clone(), key.direction.as_bson());
            }
            stages.push(doc! { "$sort": rule });
        }
        stages.push(doc! { "$skip": to_i64(self.skip) });
        // Limit after sort: the server folds it into a top-k sort.
        stages.push(doc! { "$limit": to_i64(self.effective_limit()) });
        stages
    }

    /// `$match` (if any filters) followed by a terminal `$count`.
    pub fn count_pipeline(&self) -> Vec<Document> {
        let mut stages = Vec::with_capacity(2);
        if let Some(stage) = match_stage(&self.filters) {
            stages.push(stage);
        }
        stages.push(doc! { "$count": TOTAL_COUNT_FIELD });
        stages
    }
}

/// `$match` must come first so the server can use indexes.
fn match_stage(filters: &[FieldFilter]) -> Option<Document> {
    if filters.is_empty() {
        return None;
    }
    let mut rule = Document::new();
    for filter in filters {
        let value = match filter.mode {
            MatchMode::Equals => Bson::String(filter.value.clone()),
            MatchMode::ContainsPattern => Bson::Document(doc! { "$regex": filter.value.clone() }),
        };
        rule.insert(filter.field.clone(), value);
    }
    Some(doc! { "$match": rule })
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
