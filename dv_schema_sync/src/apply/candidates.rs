//! Dry-run delete-candidates artifact

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::path::Path;

use crate::error::Result;
use crate::planning::SchemaChangePlan;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteCandidates<'a> {
    #[serde(rename = "generatedAtUtc")]
    pub generated_at: DateTime<Utc>,
    pub attributes: Vec<AttributeCandidate<'a>>,
    pub relationships: Vec<RelationshipCandidate<'a>>,
    pub alternate_keys: Vec<AlternateKeyCandidate<'a>>,
    pub missing_entities: Vec<MissingEntityCandidate<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeCandidate<'a> {
    pub entity: &'a str,
    pub logical_name: &'a str,
    pub schema_name: Option<&'a str>,
    pub display_name: Option<&'a str>,
    pub attribute_type: &'a str,
    pub targets: &'a [String],
    pub reason: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipCandidate<'a> {
    pub entity: &'a str,
    pub schema_name: &'a str,
    pub referencing_entity: &'a str,
    pub referencing_attribute: &'a str,
    pub referenced_entity: &'a str,
    pub referenced_attribute: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlternateKeyCandidate<'a> {
    pub entity: &'a str,
    pub logical_name: &'a str,
    pub key_attributes: &'a [String],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MissingEntityCandidate<'a> {
    pub table_name: &'a str,
    pub expected_entity_logical_name: &'a str,
}

impl<'a> DeleteCandidates<'a> {
    pub fn from_plan(plan: &'a SchemaChangePlan, generated_at: DateTime<Utc>) -> Self {
        Self {
            generated_at,
            attributes: plan
                .attributes_to_remove
                .iter()
                .map(|removal| AttributeCandidate {
                    entity: &removal.entity_name,
                    logical_name: &removal.attribute.logical_name,
                    schema_name: removal.attribute.schema_name.as_deref(),
                    display_name: removal.attribute.display_name.as_deref(),
                    attribute_type: &removal.attribute.attribute_type,
                    targets: &removal.attribute.targets,
                    reason: &removal.reason,
                })
                .collect(),
            relationships: plan
                .relationships_to_remove
                .iter()
                .map(|removal| RelationshipCandidate {
                    entity: &removal.entity_name,
                    schema_name: &removal.relationship.schema_name,
                    referencing_entity: &removal.relationship.referencing_entity,
                    referencing_attribute: &removal.relationship.referencing_attribute,
                    referenced_entity: &removal.relationship.referenced_entity,
                    referenced_attribute: &removal.relationship.referenced_attribute,
                })
                .collect(),
            alternate_keys: plan
                .alternate_keys_to_remove
                .iter()
                .map(|removal| AlternateKeyCandidate {
                    entity: &removal.entity_name,
                    logical_name: &removal.key.logical_name,
                    key_attributes: &removal.key.key_attributes,
                })
                .collect(),
            missing_entities: plan
                .missing_entities
                .iter()
                .map(|missing| MissingEntityCandidate {
                    table_name: &missing.table_name,
                    expected_entity_logical_name: &missing.expected_entity,
                })
                .collect(),
        }
    }
}

/// Write the removal candidates of `plan` as indented JSON, creating parent
/// directories as needed
pub fn write_delete_candidates(plan: &SchemaChangePlan, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let candidates = DeleteCandidates::from_plan(plan, Utc::now());
    let json = serde_json::to_string_pretty(&candidates)?;
    fs::write(path, json)?;

    tracing::info!(
        path = %path.display(),
        attributes = candidates.attributes.len(),
        relationships = candidates.relationships.len(),
        alternate_keys = candidates.alternate_keys.len(),
        "Wrote delete candidates"
    );
    Ok(())
}
