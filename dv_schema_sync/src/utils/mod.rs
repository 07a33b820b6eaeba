//! Utilities for dv_schema_sync
//!
//! This module provides utility functions used across the library.

pub mod logging;
pub mod naming;

// Re-export key utility functions
pub use logging::init_logging;
pub use naming::{customization_prefix, format_name, get_foreign_key_name, get_index_name};
