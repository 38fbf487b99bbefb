//! Session-derived permission masks for PactDB.
//!
//! Materializes an effective JSON-Schema mask from a session (actor roles,
//! organization markers, session scope) and composes it with caller queries,
//! including every `$$links` subtree, so joins can never widen visibility.

pub mod error;
pub mod mask;
pub mod merge;
pub mod template;

pub use error::{AuthError, Result};
pub use mask::{compose, ContractReader, SessionMask};
pub use merge::{deep_merge, merge_mask_in_links};
pub use template::evaluate;
