//! Categorized schema change plan

use serde::Serialize;

use crate::remote::{AlternateKey, AttributeMetadata, RelationshipMetadata};
use crate::schema::{SqlColumn, SqlForeignKey};

/// Every change needed to bring the remote entities in line with the SQL schema.
///
/// The lists are disjoint and each is sorted by table (or entity) and then by
/// element name, so two plans built from the same analysis compare equal.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SchemaChangePlan {
    pub attributes_to_add: Vec<PlannedAttributeAddition>,
    pub native_replacements: Vec<NativeFieldReplacement>,
    pub alternate_keys_to_add: Vec<PlannedAlternateKeyAddition>,
    pub relationships_to_add: Vec<PlannedRelationshipAddition>,
    pub attributes_to_remove: Vec<PlannedAttributeRemoval>,
    pub alternate_keys_to_remove: Vec<PlannedAlternateKeyRemoval>,
    pub relationships_to_remove: Vec<PlannedRelationshipRemoval>,
    pub missing_entities: Vec<MissingEntityPlan>,
}

impl SchemaChangePlan {
    /// Native replacements are advisory and never count as a change
    pub fn has_changes(&self) -> bool {
        !self.attributes_to_add.is_empty()
            || !self.alternate_keys_to_add.is_empty()
            || !self.relationships_to_add.is_empty()
            || self.has_removals()
            || !self.missing_entities.is_empty()
    }

    pub fn has_removals(&self) -> bool {
        !self.attributes_to_remove.is_empty()
            || !self.alternate_keys_to_remove.is_empty()
            || !self.relationships_to_remove.is_empty()
    }

    pub fn summary(&self) -> SchemaChangePlanSummary {
        SchemaChangePlanSummary {
            attributes_to_add: self.attributes_to_add.len(),
            native_replacements: self.native_replacements.len(),
            alternate_keys_to_add: self.alternate_keys_to_add.len(),
            relationships_to_add: self.relationships_to_add.len(),
            attributes_to_remove: self.attributes_to_remove.len(),
            alternate_keys_to_remove: self.alternate_keys_to_remove.len(),
            relationships_to_remove: self.relationships_to_remove.len(),
            missing_entities: self.missing_entities.len(),
        }
    }

    /// Planned addition for a column, used when resolving alternate key members
    pub fn attribute_addition(&self, table: &str, column: &str) -> Option<&PlannedAttributeAddition> {
        self.attributes_to_add.iter().find(|addition| {
            addition.table_name.eq_ignore_ascii_case(table)
                && addition.column.name.eq_ignore_ascii_case(column)
        })
    }

    /// Native replacement for a column
    pub fn native_replacement(&self, table: &str, column: &str) -> Option<&NativeFieldReplacement> {
        self.native_replacements.iter().find(|replacement| {
            replacement.table_name.eq_ignore_ascii_case(table)
                && replacement.column_name.eq_ignore_ascii_case(column)
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SchemaChangePlanSummary {
    pub attributes_to_add: usize,
    pub native_replacements: usize,
    pub alternate_keys_to_add: usize,
    pub relationships_to_add: usize,
    pub attributes_to_remove: usize,
    pub alternate_keys_to_remove: usize,
    pub relationships_to_remove: usize,
    pub missing_entities: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedAttributeAddition {
    pub table_name: String,
    pub entity_name: String,
    pub column: SqlColumn,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NativeFieldReplacement {
    pub table_name: String,
    pub entity_name: String,
    pub column_name: String,
    pub native_logical_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedAlternateKeyAddition {
    pub table_name: String,
    pub entity_name: String,
    pub key_name: String,
    pub columns: Vec<String>,
    /// Attribute each column already aligned to, `None` while the column
    /// waits on a planned addition
    pub resolved_attributes: Vec<Option<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedRelationshipAddition {
    pub table_name: String,
    pub entity_name: String,
    pub referenced_entity: String,
    pub foreign_key: SqlForeignKey,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedAttributeRemoval {
    pub entity_name: String,
    pub attribute: AttributeMetadata,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedAlternateKeyRemoval {
    pub entity_name: String,
    pub key: AlternateKey,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedRelationshipRemoval {
    pub entity_name: String,
    pub relationship: RelationshipMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MissingEntityPlan {
    pub table_name: String,
    pub expected_entity: String,
}
