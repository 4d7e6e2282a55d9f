//! Caller-side result merging.
//!
//! The store lives with the caller, never inside the background worker; the
//! only way data reaches it is through [`ResultMerger`].

pub mod actions;
pub mod canonical_store;
pub mod merger;

pub use actions::StoreAction;
pub use canonical_store::{CanonicalStore, MergeRules, StoreData};
pub use merger::{MergeOutcome, ResultMerger};
