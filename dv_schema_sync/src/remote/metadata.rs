//! Read-only view of Dataverse entity metadata

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An entity as described by the remote metadata service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityMetadata {
    pub logical_name: String,
    pub schema_name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    pub primary_id_attribute: String,
    #[serde(default)]
    pub attributes: Vec<AttributeMetadata>,
    #[serde(default)]
    pub alternate_keys: Vec<AlternateKey>,
    /// Many-to-one relationships where this entity is the referencing side
    #[serde(default)]
    pub relationships: Vec<RelationshipMetadata>,
}

impl EntityMetadata {
    pub fn new(logical_name: &str, schema_name: &str, primary_id_attribute: &str) -> Self {
        Self {
            logical_name: logical_name.to_string(),
            schema_name: schema_name.to_string(),
            display_name: None,
            primary_id_attribute: primary_id_attribute.to_string(),
            attributes: Vec::new(),
            alternate_keys: Vec::new(),
            relationships: Vec::new(),
        }
    }

    /// Attribute by logical name, ignoring case
    pub fn attribute(&self, logical_name: &str) -> Option<&AttributeMetadata> {
        self.attributes
            .iter()
            .find(|attribute| attribute.logical_name.eq_ignore_ascii_case(logical_name))
    }

    /// Attribute by logical name, falling back to schema name
    pub fn find_attribute(&self, name: &str) -> Option<&AttributeMetadata> {
        self.attribute(name).or_else(|| {
            self.attributes.iter().find(|attribute| {
                attribute
                    .schema_name
                    .as_deref()
                    .map_or(false, |schema| schema.eq_ignore_ascii_case(name))
            })
        })
    }

    pub fn is_primary_id(&self, logical_name: &str) -> bool {
        self.primary_id_attribute.eq_ignore_ascii_case(logical_name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeMetadata {
    pub logical_name: String,
    #[serde(default)]
    pub schema_name: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default = "unknown_type")]
    pub attribute_type: String,
    #[serde(default)]
    pub is_custom: bool,
    /// Target entities of a lookup attribute; empty for every other type
    #[serde(default)]
    pub targets: Vec<String>,
}

fn unknown_type() -> String {
    "Unknown".to_string()
}

impl AttributeMetadata {
    pub fn new(logical_name: &str, attribute_type: &str) -> Self {
        Self {
            logical_name: logical_name.to_string(),
            schema_name: None,
            display_name: None,
            attribute_type: attribute_type.to_string(),
            is_custom: false,
            targets: Vec::new(),
        }
    }

    pub fn custom(mut self) -> Self {
        self.is_custom = true;
        self
    }

    pub fn with_targets(mut self, targets: &[&str]) -> Self {
        self.targets = targets.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn is_lookup(&self) -> bool {
        !self.targets.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlternateKey {
    pub logical_name: String,
    pub key_attributes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipMetadata {
    pub schema_name: String,
    pub referencing_entity: String,
    pub referencing_attribute: String,
    pub referenced_entity: String,
    pub referenced_attribute: String,
    #[serde(default)]
    pub is_custom: bool,
}

/// Entities retrieved from a live connection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataSnapshot {
    pub org_url: Option<String>,
    entities: BTreeMap<String, EntityMetadata>,
    /// Per-entity retrieval failures that did not stop the run
    pub errors: Vec<String>,
}

impl MetadataSnapshot {
    pub fn new(
        org_url: Option<String>,
        entities: impl IntoIterator<Item = EntityMetadata>,
        errors: Vec<String>,
    ) -> Self {
        let entities = entities
            .into_iter()
            .map(|entity| (entity.logical_name.to_lowercase(), entity))
            .collect();
        Self {
            org_url,
            entities,
            errors,
        }
    }

    /// Entity by logical name, ignoring case
    pub fn entity(&self, logical_name: &str) -> Option<&EntityMetadata> {
        self.entities.get(&logical_name.trim().to_lowercase())
    }

    pub fn entities(&self) -> impl Iterator<Item = &EntityMetadata> {
        self.entities.values()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

/// Outcome of a metadata load
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataResult {
    Connected(MetadataSnapshot),
    Unavailable {
        org_url: Option<String>,
        reason: String,
    },
}

impl MetadataResult {
    pub fn unavailable(org_url: Option<String>, reason: impl Into<String>) -> Self {
        MetadataResult::Unavailable {
            org_url,
            reason: reason.into(),
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, MetadataResult::Connected(_))
    }

    pub fn snapshot(&self) -> Option<&MetadataSnapshot> {
        match self {
            MetadataResult::Connected(snapshot) => Some(snapshot),
            MetadataResult::Unavailable { .. } => None,
        }
    }

    /// Entity by logical name; always `None` when the connection is unavailable
    pub fn entity(&self, logical_name: &str) -> Option<&EntityMetadata> {
        self.snapshot().and_then(|snapshot| snapshot.entity(logical_name))
    }

    pub fn org_url(&self) -> Option<&str> {
        match self {
            MetadataResult::Connected(snapshot) => snapshot.org_url.as_deref(),
            MetadataResult::Unavailable { org_url, .. } => org_url.as_deref(),
        }
    }

    /// Messages worth surfacing to the operator
    pub fn warnings(&self) -> Vec<String> {
        match self {
            MetadataResult::Connected(snapshot) => snapshot.errors.clone(),
            MetadataResult::Unavailable { reason, .. } => vec![reason.clone()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invoices() -> EntityMetadata {
        let mut entity = EntityMetadata::new("invoices", "cr8a1_Invoices", "invoiceid");
        entity.attributes = vec![
            AttributeMetadata::new("invoiceid", "Uniqueidentifier"),
            AttributeMetadata {
                schema_name: Some("cr8a1_EngagementRef".to_string()),
                ..AttributeMetadata::new("cr8a1_engagementref", "String").custom()
            },
        ];
        entity
    }

    #[test]
    fn snapshot_lookup_ignores_case() {
        let snapshot = MetadataSnapshot::new(None, vec![invoices()], Vec::new());
        assert!(snapshot.entity("Invoices").is_some());
        assert!(snapshot.entity(" INVOICES ").is_some());
        assert!(snapshot.entity("widgets").is_none());
    }

    #[test]
    fn find_attribute_falls_back_to_schema_name() {
        let entity = invoices();
        assert_eq!(
            entity.find_attribute("cr8a1_EngagementRef").map(|a| a.logical_name.as_str()),
            Some("cr8a1_engagementref")
        );
        assert!(entity.is_primary_id("InvoiceId"));
    }

    #[test]
    fn unavailable_has_no_entities() {
        let result = MetadataResult::unavailable(Some("https://org".into()), "offline");
        assert!(!result.is_connected());
        assert!(result.entity("invoices").is_none());
        assert_eq!(result.warnings(), vec!["offline".to_string()]);
        assert_eq!(result.org_url(), Some("https://org"));
    }

    #[test]
    fn entity_json_uses_camel_case() {
        let json = r#"{
            "logicalName": "invoices",
            "schemaName": "cr8a1_Invoices",
            "primaryIdAttribute": "invoiceid",
            "attributes": [{"logicalName": "invoiceid"}]
        }"#;
        let entity: EntityMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(entity.attributes[0].attribute_type, "Unknown");
        assert!(entity.alternate_keys.is_empty());
    }
}
