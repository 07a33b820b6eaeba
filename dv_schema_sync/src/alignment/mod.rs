//! Alignment of the SQL schema with remote entity metadata

pub mod analyzer;
pub mod types;

pub use analyzer::AlignmentAnalyzer;
pub use types::{
    AlignmentAnalysis, ColumnAlignment, ColumnAlignmentStatus, ForeignKeyAlignment,
    ForeignKeyAlignmentStatus, KeyAlignment, KeyAlignmentStatus, KeyKind, TableAlignment,
};
