//! Alignment verdicts for one run

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

use crate::config::TableMap;
use crate::remote::{AlternateKey, AttributeMetadata, EntityMetadata, RelationshipMetadata};
use crate::schema::{SqlColumn, SqlForeignKey, SqlTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ColumnAlignmentStatus {
    Matched,
    /// The column should use a platform-native attribute instead
    NativeReplacement,
    MissingInDataverse,
}

impl fmt::Display for ColumnAlignmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ColumnAlignmentStatus::Matched => "Matched",
            ColumnAlignmentStatus::NativeReplacement => "Native replacement",
            ColumnAlignmentStatus::MissingInDataverse => "Missing in Dataverse",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum KeyAlignmentStatus {
    Matched,
    MissingInDataverse,
}

impl fmt::Display for KeyAlignmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyAlignmentStatus::Matched => f.write_str("Matched"),
            KeyAlignmentStatus::MissingInDataverse => f.write_str("Missing in Dataverse"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ForeignKeyAlignmentStatus {
    Matched,
    MissingInDataverse,
}

impl fmt::Display for ForeignKeyAlignmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForeignKeyAlignmentStatus::Matched => f.write_str("Matched"),
            ForeignKeyAlignmentStatus::MissingInDataverse => f.write_str("Missing in Dataverse"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum KeyKind {
    Primary,
    Unique,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnAlignment {
    pub column: SqlColumn,
    pub status: ColumnAlignmentStatus,
    /// The remote attribute the column aligned with, when the snapshot lists it
    pub attribute: Option<AttributeMetadata>,
    /// Attribute logical name the column resolves to (native target included)
    pub resolved_attribute: Option<String>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyAlignment {
    pub name: String,
    pub kind: KeyKind,
    pub sql_columns: Vec<String>,
    /// Remote attributes backing the key when matched
    pub dataverse_attributes: Vec<String>,
    pub status: KeyAlignmentStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForeignKeyAlignment {
    pub foreign_key: SqlForeignKey,
    pub status: ForeignKeyAlignmentStatus,
    /// Entity the referenced table maps to
    pub referenced_entity: String,
    pub relationship_schema_name: Option<String>,
    pub referencing_attribute: Option<String>,
}

impl ForeignKeyAlignment {
    pub fn is_composite(&self) -> bool {
        self.foreign_key.columns.len() != 1
    }
}

/// Alignment of one SQL table against its entity
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableAlignment {
    pub table: SqlTable,
    pub entity_name: String,
    pub entity: Option<EntityMetadata>,
    pub columns: Vec<ColumnAlignment>,
    pub keys: Vec<KeyAlignment>,
    pub foreign_keys: Vec<ForeignKeyAlignment>,
    pub unmatched_attributes: Vec<AttributeMetadata>,
    pub unmatched_alternate_keys: Vec<AlternateKey>,
    pub unmatched_relationships: Vec<RelationshipMetadata>,
}

impl TableAlignment {
    pub fn is_missing_entity(&self) -> bool {
        self.entity.is_none()
    }

    /// Referencing attributes of relationships matched to a SQL foreign key
    pub fn matched_relationship_attributes(&self) -> impl Iterator<Item = &str> {
        self.foreign_keys.iter().filter_map(|fk| match fk.status {
            ForeignKeyAlignmentStatus::Matched => fk.referencing_attribute.as_deref(),
            ForeignKeyAlignmentStatus::MissingInDataverse => None,
        })
    }

    pub fn column_count(&self, status: ColumnAlignmentStatus) -> usize {
        self.columns.iter().filter(|c| c.status == status).count()
    }
}

/// Result of aligning a whole schema
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlignmentAnalysis {
    pub generated_at: DateTime<Utc>,
    pub table_map: TableMap,
    /// One entry per SQL table, in case-insensitive table order
    pub tables: Vec<TableAlignment>,
}

impl AlignmentAnalysis {
    pub fn table(&self, name: &str) -> Option<&TableAlignment> {
        self.tables
            .iter()
            .find(|t| t.table.name.eq_ignore_ascii_case(name))
    }
}
