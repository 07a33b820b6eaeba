//! Change planner
//!
//! Turns an [`AlignmentAnalysis`] into a [`SchemaChangePlan`]. Planning is a
//! pure function of the analysis and the native-field map.

use crate::alignment::{
    AlignmentAnalysis, ColumnAlignmentStatus, ForeignKeyAlignmentStatus, KeyAlignmentStatus,
    TableAlignment,
};
use crate::config::NativeFieldMap;
use crate::planning::plan::*;
use crate::remote::AttributeMetadata;

pub const REMOVAL_REASON: &str = "Custom attribute is not present in the MySQL schema.";

#[derive(Debug, Clone)]
pub struct ChangePlanner {
    native_fields: NativeFieldMap,
}

impl ChangePlanner {
    pub fn new(native_fields: NativeFieldMap) -> Self {
        Self { native_fields }
    }

    pub fn build_plan(&self, analysis: &AlignmentAnalysis) -> SchemaChangePlan {
        let mut plan = SchemaChangePlan::default();

        for table in &analysis.tables {
            let table_name = &table.table.name;
            let entity_name = &table.entity_name;

            let entity = match &table.entity {
                Some(entity) => entity,
                None => {
                    plan.missing_entities.push(MissingEntityPlan {
                        table_name: table_name.clone(),
                        expected_entity: entity_name.clone(),
                    });
                    continue;
                }
            };

            for column in &table.columns {
                match column.status {
                    ColumnAlignmentStatus::MissingInDataverse => {
                        plan.attributes_to_add.push(PlannedAttributeAddition {
                            table_name: table_name.clone(),
                            entity_name: entity_name.clone(),
                            column: column.column.clone(),
                        });
                    }
                    ColumnAlignmentStatus::NativeReplacement => {
                        if let Some(native) = &column.resolved_attribute {
                            plan.native_replacements.push(NativeFieldReplacement {
                                table_name: table_name.clone(),
                                entity_name: entity_name.clone(),
                                column_name: column.column.name.clone(),
                                native_logical_name: native.clone(),
                            });
                        }
                    }
                    ColumnAlignmentStatus::Matched => {}
                }
            }

            for key in &table.keys {
                if key.status == KeyAlignmentStatus::MissingInDataverse && !key.sql_columns.is_empty() {
                    plan.alternate_keys_to_add.push(PlannedAlternateKeyAddition {
                        table_name: table_name.clone(),
                        entity_name: entity_name.clone(),
                        key_name: key.name.clone(),
                        columns: key.sql_columns.clone(),
                        resolved_attributes: key
                            .sql_columns
                            .iter()
                            .map(|name| {
                                table
                                    .columns
                                    .iter()
                                    .find(|c| c.column.name.eq_ignore_ascii_case(name))
                                    .and_then(|c| c.resolved_attribute.clone())
                            })
                            .collect(),
                    });
                }
            }

            for fk in &table.foreign_keys {
                // Composite keys have no single lookup to back them
                if fk.status == ForeignKeyAlignmentStatus::MissingInDataverse && !fk.is_composite() {
                    plan.relationships_to_add.push(PlannedRelationshipAddition {
                        table_name: table_name.clone(),
                        entity_name: entity_name.clone(),
                        referenced_entity: fk.referenced_entity.clone(),
                        foreign_key: fk.foreign_key.clone(),
                    });
                }
            }

            for attribute in &table.unmatched_attributes {
                if should_propose_attribute_removal(table, attribute, &self.native_fields) {
                    plan.attributes_to_remove.push(PlannedAttributeRemoval {
                        entity_name: entity.logical_name.clone(),
                        attribute: attribute.clone(),
                        reason: REMOVAL_REASON.to_string(),
                    });
                }
            }

            plan.relationships_to_remove.extend(
                table
                    .unmatched_relationships
                    .iter()
                    .filter(|relationship| relationship.is_custom)
                    .map(|relationship| PlannedRelationshipRemoval {
                        entity_name: entity.logical_name.clone(),
                        relationship: relationship.clone(),
                    }),
            );

            plan.alternate_keys_to_remove.extend(table.unmatched_alternate_keys.iter().map(|key| {
                PlannedAlternateKeyRemoval {
                    entity_name: entity.logical_name.clone(),
                    key: key.clone(),
                }
            }));
        }

        sort_plan(&mut plan);

        tracing::debug!(
            attributes_to_add = plan.attributes_to_add.len(),
            attributes_to_remove = plan.attributes_to_remove.len(),
            missing_entities = plan.missing_entities.len(),
            "Built schema change plan"
        );
        plan
    }
}

/// Whether an unmatched remote attribute is safe to propose for removal.
///
/// Only custom attributes qualify, and never one that is a native-field target,
/// the entity's primary id, the referencing attribute of a matched foreign key,
/// or a lookup (it may back a relationship the SQL schema does not express).
pub fn should_propose_attribute_removal(
    table: &TableAlignment,
    attribute: &AttributeMetadata,
    native_fields: &NativeFieldMap,
) -> bool {
    if !attribute.is_custom || native_fields.is_target(&attribute.logical_name) {
        return false;
    }

    if table
        .entity
        .as_ref()
        .map_or(false, |entity| entity.is_primary_id(&attribute.logical_name))
    {
        return false;
    }

    if table
        .matched_relationship_attributes()
        .any(|name| name.eq_ignore_ascii_case(&attribute.logical_name))
    {
        return false;
    }

    !attribute.is_lookup()
}

fn key(value: &str) -> String {
    value.to_lowercase()
}

fn sort_plan(plan: &mut SchemaChangePlan) {
    plan.attributes_to_add
        .sort_by_key(|a| (key(&a.table_name), key(&a.column.name)));
    plan.native_replacements
        .sort_by_key(|r| (key(&r.table_name), key(&r.column_name)));
    plan.alternate_keys_to_add
        .sort_by_key(|k| (key(&k.table_name), key(&k.key_name)));
    plan.relationships_to_add
        .sort_by_key(|r| (key(&r.table_name), key(&r.foreign_key.name)));
    plan.attributes_to_remove
        .sort_by_key(|r| (key(&r.entity_name), key(&r.attribute.logical_name)));
    plan.alternate_keys_to_remove
        .sort_by_key(|r| (key(&r.entity_name), key(&r.key.logical_name)));
    plan.relationships_to_remove
        .sort_by_key(|r| (key(&r.entity_name), key(&r.relationship.schema_name)));
    plan.missing_entities
        .sort_by_key(|m| (key(&m.table_name), key(&m.expected_entity)));
}
