//! Core contract types and utilities for PactDB.
//!
//! A contract is a row of the wide `cards` table: a set of fixed header
//! columns (id, slug, version, type, markers, ...) plus a free-form `data`
//! JSONB payload. This crate holds the typed model for contracts and links,
//! the slug/version grammar, and the core error taxonomy. It performs no I/O.

pub mod contract;
pub mod error;
pub mod slug;
pub mod version;

pub use contract::{Contract, LinkEndpoint, LinkReference, LINK_TYPE};
pub use error::{CoreError, Result};
pub use slug::{validate_slug, SlugRef};
pub use version::Version;
