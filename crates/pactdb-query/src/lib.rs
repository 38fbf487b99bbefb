//! JSON-Schema to SQL compilation for PactDB.
//!
//! Translates an arbitrary JSON-Schema document — extended with the
//! `$$links`, `fullTextSearch`, `formatMaximum`/`formatMinimum` and `regexp`
//! keywords — into a single relational query over the `cards` table that
//! retrieves the matching contracts together with their transitively linked
//! contracts, honoring sort/skip/limit per link depth.
//!
//! Compilation is pure and synchronous: all state lives on the compilation
//! in progress, and the result is immutable once returned.

pub mod builder;
pub mod columns;
pub mod error;
pub mod filter;
pub mod format;
pub mod fts;
pub mod links;
pub mod literal;
pub mod ordering;
pub mod path;
pub mod select_map;

pub use builder::{compile, compile_row_filter, compile_row_query, CompiledQuery};
pub use columns::{ColumnSpec, JsonType, SqlType, LINKS_TABLE, STRINGS_TABLE, TABLE};
pub use error::{QueryBuilderError, Result};
pub use filter::{CompareOp, Filter, ValueCast};
pub use path::{Path, PathSegment};
pub use select_map::SelectMap;
