//! Option and result types used by the storage traits.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use pactdb_core::Contract;

use crate::error::StorageError;

/// Hard upper bound on rows returned by a single query.
///
/// Callers asking for more are rejected before compilation.
pub const MAX_QUERY_LIMIT: usize = 1000;

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    /// The SQL keyword for this direction.
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Sort, skip and limit for one result window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WindowOptions {
    /// Property path to sort by. A single name addresses a column;
    /// a multi-segment path descends into JSONB.
    pub sort_by: Option<Vec<String>>,
    pub sort_dir: SortDirection,
    pub skip: usize,
    pub limit: Option<usize>,
}

/// Options for one query call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueryOptions {
    #[serde(flatten)]
    pub window: WindowOptions,
    /// Per-link-type windows, applied inside the `$$links` laterals.
    pub links: HashMap<String, WindowOptions>,
}

impl QueryOptions {
    /// Validate the requested window against [`MAX_QUERY_LIMIT`].
    pub fn validate(&self) -> Result<(), StorageError> {
        let limit = self.window.limit.unwrap_or(MAX_QUERY_LIMIT);
        if limit > MAX_QUERY_LIMIT {
            return Err(StorageError::invalid_limit(format!(
                "limit {limit} exceeds maximum of {MAX_QUERY_LIMIT}"
            )));
        }
        if limit == 0 {
            return Err(StorageError::invalid_limit("limit must be >= 1"));
        }
        for (name, window) in &self.links {
            if window.limit.unwrap_or(0) > MAX_QUERY_LIMIT {
                return Err(StorageError::invalid_limit(format!(
                    "limit for link '{name}' exceeds maximum of {MAX_QUERY_LIMIT}"
                )));
            }
        }
        Ok(())
    }

    /// The effective limit: the requested one, clamped defaults applied.
    pub fn effective_limit(&self) -> usize {
        self.window.limit.unwrap_or(MAX_QUERY_LIMIT)
    }
}

/// Result of a cache lookup.
#[derive(Debug, Clone, Default)]
pub struct CacheLookup {
    /// Whether the cache had an answer (including a cached miss).
    pub hit: bool,
    /// The cached contract; `None` on a cached miss.
    pub element: Option<Contract>,
}

impl CacheLookup {
    /// A cache miss: the cache knows nothing about the key.
    pub fn unknown() -> Self {
        Self::default()
    }

    /// A positive hit.
    pub fn found(contract: Contract) -> Self {
        Self {
            hit: true,
            element: Some(contract),
        }
    }

    /// A cached negative: the element is known to be absent.
    pub fn missing() -> Self {
        Self {
            hit: true,
            element: None,
        }
    }
}

/// Kind of change emitted by a change stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Insert,
    Update,
}

/// One change observed by an attached stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Change {
    #[serde(rename = "type")]
    pub change_type: ChangeType,
    /// Projection of the row before the change; `None` for inserts.
    pub before: Option<Value>,
    /// Projection of the row after the change.
    pub after: Value,
}
