//! Link-name interning.
//!
//! Link names (and their inverses) are stored as integers referencing the
//! shared `strings` table. Resolution is a single upsert-or-lookup round
//! trip, fronted by a process-local cache since the set of relation names
//! is small and append-only.

use dashmap::DashMap;
use sqlx_postgres::PgPool;

use pactdb_storage::StorageError;

use crate::error::map_db_error;

/// Process-local intern cache over the `strings` table.
#[derive(Debug, Default)]
pub struct StringInterner {
    cache: DashMap<String, i32>,
}

impl StringInterner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `name` to its interned id, inserting it if new.
    ///
    /// The `DO UPDATE` arm makes the statement return the existing id on
    /// conflict, so a race between writers still resolves in one round trip.
    pub async fn get_or_intern(&self, pool: &PgPool, name: &str) -> Result<i32, StorageError> {
        if let Some(id) = self.cache.get(name) {
            return Ok(*id);
        }
        let row = sqlx_core::query::query(
            "INSERT INTO strings (string) VALUES ($1)
             ON CONFLICT (string) DO UPDATE SET string = EXCLUDED.string
             RETURNING id",
        )
        .bind(name)
        .fetch_one(pool)
        .await
        .map_err(map_db_error)?;
        let id: i32 = sqlx_core::row::Row::try_get(&row, 0).map_err(map_db_error)?;
        self.cache.insert(name.to_string(), id);
        tracing::debug!(name, id, "interned link name");
        Ok(id)
    }

    /// Number of cached names, for diagnostics.
    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_starts_empty() {
        let interner = StringInterner::new();
        assert_eq!(interner.cached(), 0);
    }
}
