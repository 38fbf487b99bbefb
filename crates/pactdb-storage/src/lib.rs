//! Storage abstraction layer for PactDB.
//!
//! Defines the interfaces the query core consumes — database connection,
//! lookup cache, change streams — together with the option types and the
//! storage error taxonomy. Backends (e.g. `pactdb-db-postgres`) implement
//! these traits.

pub mod error;
pub mod traits;
pub mod types;

pub use error::StorageError;
pub use traits::{
    ChangeStream, ChangeStreamer, ContractCache, Database, ScopedWork, TransactionOptions,
};
pub use types::{
    CacheLookup, Change, ChangeType, QueryOptions, SortDirection, WindowOptions, MAX_QUERY_LIMIT,
};
