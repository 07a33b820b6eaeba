//! Schema module for dv_schema_sync
//!
//! This module parses MySQL `CREATE TABLE` DDL into a structured model.

pub mod parser;
pub mod scanner;
pub mod types;

// Re-export key types
pub use parser::{parse, parse_file};
pub use scanner::{split_definitions, strip_comments};
pub use types::{SqlColumn, SqlForeignKey, SqlIndex, SqlPrimaryKey, SqlSchema, SqlTable};
