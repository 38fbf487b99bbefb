//! Storage traits for the contract storage abstraction layer.
//!
//! This module defines the contracts between the query core and its external
//! collaborators: the database connection, the in-memory lookup cache, and
//! the change-data stream. Implementations must be thread-safe
//! (`Send + Sync`).

use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use pactdb_core::{Contract, Version};

use crate::error::StorageError;
use crate::types::{Change, QueryOptions};

/// A boxed future used for scoped database work.
pub type ScopedWork = Pin<Box<dyn Future<Output = Result<Value, StorageError>> + Send>>;

/// Options for an explicit transaction scope.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransactionOptions {
    /// Run the transaction read-only.
    pub read_only: bool,
}

/// The database connection the query core runs against.
///
/// The current transaction handle is ambient: work scheduled through
/// [`Database::task`] or [`Database::tx`] observes the scope it runs in, and
/// nested `tx` calls join the outer transaction instead of opening a second
/// one.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run a query and return all rows, each as a JSON object.
    async fn any(&self, sql: &str, values: &[Value]) -> Result<Vec<Value>, StorageError>;

    /// Run a query expected to return exactly one row.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NoElement` when the query returns no rows.
    async fn one(&self, sql: &str, values: &[Value]) -> Result<Value, StorageError>;

    /// Run `work` on a dedicated connection scope.
    async fn task(&self, work: ScopedWork) -> Result<Value, StorageError>;

    /// Run `work` inside a transaction. Re-entrant: when already inside a
    /// transaction scope the outer one is reused and commit/rollback is
    /// deferred to the outermost caller.
    async fn tx(&self, options: TransactionOptions, work: ScopedWork)
        -> Result<Value, StorageError>;
}

/// The in-memory lookup cache consulted before hitting the database.
///
/// The cache records both positive entries and known-missing keys, so a
/// lookup distinguishes "cached miss" from "never asked".
#[async_trait]
pub trait ContractCache: Send + Sync {
    async fn get_by_id(&self, table: &str, id: Uuid) -> crate::types::CacheLookup;

    async fn get_by_slug(
        &self,
        table: &str,
        slug: &str,
        version: &Version,
    ) -> crate::types::CacheLookup;

    async fn set(&self, table: &str, contract: &Contract);

    /// Record that no contract exists for this id.
    async fn set_missing_id(&self, table: &str, id: Uuid);

    /// Record that no contract exists for this slug/version.
    async fn set_missing_slug(&self, table: &str, slug: &str, version: &Version);

    /// Drop any entry for this contract (by id and by slug).
    async fn unset(&self, contract: &Contract);

    /// Drop everything.
    async fn reset(&self);
}

/// Factory for change streams over a table.
#[async_trait]
pub trait ChangeStreamer: Send + Sync {
    /// Attach a stream: changes are filtered by the compiled `schema` and
    /// projected through `select`.
    async fn attach(
        &self,
        select: Value,
        schema: Value,
        options: QueryOptions,
    ) -> Result<Box<dyn ChangeStream>, StorageError>;

    /// Stop dispatching and release the underlying trigger.
    async fn close(&self);
}

/// One attached change stream.
#[async_trait]
pub trait ChangeStream: Send + Sync {
    /// Wait for the next matching change. `None` after close.
    async fn next_change(&mut self) -> Option<Change>;

    async fn close(&mut self);
}
