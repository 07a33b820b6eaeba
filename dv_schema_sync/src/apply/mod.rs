//! Applying a change plan to the remote entity store

pub mod applier;
pub mod attributes;
pub mod candidates;

pub use applier::{apply_plan, ApplyFailure, ApplyReport, DROPS_SKIPPED_NOTICE};
pub use attributes::{attribute_kind, new_attribute};
pub use candidates::{write_delete_candidates, DeleteCandidates};
