//! Alignment analyzer
//!
//! Compares every parsed table against the metadata of the entity it maps to.
//! Matching is exact and case-insensitive throughout.

use chrono::Utc;
use std::collections::{BTreeSet, HashMap, HashSet};

use crate::alignment::types::*;
use crate::config::{NativeFieldMap, TableMap};
use crate::remote::{AttributeMetadata, EntityMetadata, MetadataResult};
use crate::schema::{SqlColumn, SqlSchema, SqlTable};

const PRIMARY_KEY_NAME: &str = "PRIMARY";

/// Aligns a parsed schema with a metadata snapshot
#[derive(Debug, Clone)]
pub struct AlignmentAnalyzer {
    native_fields: NativeFieldMap,
}

impl AlignmentAnalyzer {
    pub fn new(native_fields: NativeFieldMap) -> Self {
        Self { native_fields }
    }

    /// Align every table. Tables without a map entry use their own name as
    /// the entity logical name.
    pub fn analyze(
        &self,
        schema: &SqlSchema,
        metadata: &MetadataResult,
        table_map: &TableMap,
    ) -> AlignmentAnalysis {
        let tables = schema
            .tables()
            .map(|table| {
                let entity_name = table_map.entity_for(&table.name);
                let result = match metadata.entity(&entity_name) {
                    Some(entity) => self.analyze_table(table, entity, table_map),
                    None => missing_entity(table, entity_name, table_map),
                };
                tracing::debug!(
                    table = %table.name,
                    entity = %result.entity_name,
                    missing_entity = result.is_missing_entity(),
                    unmatched_attributes = result.unmatched_attributes.len(),
                    "Aligned table"
                );
                result
            })
            .collect();

        AlignmentAnalysis {
            generated_at: Utc::now(),
            table_map: table_map.clone(),
            tables,
        }
    }

    fn analyze_table(
        &self,
        table: &SqlTable,
        entity: &EntityMetadata,
        table_map: &TableMap,
    ) -> TableAlignment {
        let mut consumed: HashSet<String> = HashSet::new();
        let mut resolved: HashMap<String, String> = HashMap::new();
        let primary_column = table.single_primary_key_column();

        let columns = table
            .columns
            .iter()
            .map(|column| {
                let alignment = self.align_column(column, primary_column, entity);
                if let Some(attribute) = &alignment.attribute {
                    consumed.insert(attribute.logical_name.to_lowercase());
                }
                if let Some(name) = &alignment.resolved_attribute {
                    resolved.insert(column.name.to_lowercase(), name.clone());
                }
                alignment
            })
            .collect();

        let resolve = |column: &str| -> String {
            resolved
                .get(&column.to_lowercase())
                .cloned()
                .unwrap_or_else(|| column.to_string())
        };

        let (keys, matched_keys) = align_keys(table, entity, &resolve);
        let foreign_keys = align_foreign_keys(table, entity, table_map, &resolve);

        let mut unmatched_attributes: Vec<_> = entity
            .attributes
            .iter()
            .filter(|attribute| !consumed.contains(&attribute.logical_name.to_lowercase()))
            .cloned()
            .collect();
        unmatched_attributes.sort_by_key(|a| a.logical_name.to_lowercase());

        let unmatched_alternate_keys = entity
            .alternate_keys
            .iter()
            .filter(|key| !matched_keys.contains(&key.logical_name.to_lowercase()))
            .cloned()
            .collect();

        let matched_relationships: HashSet<String> = foreign_keys
            .iter()
            .filter_map(|fk| fk.relationship_schema_name.as_deref())
            .map(str::to_lowercase)
            .collect();
        let unmatched_relationships = entity
            .relationships
            .iter()
            .filter(|rel| !matched_relationships.contains(&rel.schema_name.to_lowercase()))
            .cloned()
            .collect();

        TableAlignment {
            table: table.clone(),
            entity_name: entity.logical_name.clone(),
            entity: Some(entity.clone()),
            columns,
            keys,
            foreign_keys,
            unmatched_attributes,
            unmatched_alternate_keys,
            unmatched_relationships,
        }
    }

    fn align_column(
        &self,
        column: &SqlColumn,
        primary_column: Option<&str>,
        entity: &EntityMetadata,
    ) -> ColumnAlignment {
        let native = self.native_fields.get(&column.name);
        let native_replacement = |attribute: Option<&AttributeMetadata>| {
            native.map(|native| ColumnAlignment {
                column: column.clone(),
                status: ColumnAlignmentStatus::NativeReplacement,
                attribute: attribute.cloned(),
                resolved_attribute: Some(native.to_string()),
                note: Some(format!("Use native Dataverse attribute '{}'.", native)),
            })
        };

        if let Some(attribute) = native.and_then(|native| entity.attribute(native)) {
            if let Some(alignment) = native_replacement(Some(attribute)) {
                return alignment;
            }
        }

        if primary_column.map_or(false, |pk| pk.eq_ignore_ascii_case(&column.name)) {
            return ColumnAlignment {
                column: column.clone(),
                status: ColumnAlignmentStatus::Matched,
                attribute: entity.attribute(&entity.primary_id_attribute).cloned(),
                resolved_attribute: Some(entity.primary_id_attribute.clone()),
                note: Some(format!(
                    "Primary key maps to '{}'.",
                    entity.primary_id_attribute
                )),
            };
        }

        match entity.find_attribute(&column.name) {
            Some(attribute) => ColumnAlignment {
                column: column.clone(),
                status: ColumnAlignmentStatus::Matched,
                resolved_attribute: Some(attribute.logical_name.clone()),
                attribute: Some(attribute.clone()),
                note: None,
            },
            // A native-mapped column with no remote counterpart still adopts
            // the native field rather than planning a new attribute.
            None => native_replacement(None).unwrap_or_else(|| ColumnAlignment {
                column: column.clone(),
                status: ColumnAlignmentStatus::MissingInDataverse,
                attribute: None,
                resolved_attribute: None,
                note: Some("No matching Dataverse attribute found.".to_string()),
            }),
        }
    }
}

fn attribute_set<'a>(names: impl IntoIterator<Item = &'a String>) -> BTreeSet<String> {
    names.into_iter().map(|name| name.to_lowercase()).collect()
}

/// Align the primary key and unique indexes; also returns the alternate keys
/// (lowercase logical names) that found a SQL counterpart.
fn align_keys(
    table: &SqlTable,
    entity: &EntityMetadata,
    resolve: &dyn Fn(&str) -> String,
) -> (Vec<KeyAlignment>, HashSet<String>) {
    let mut keys = Vec::new();
    let mut matched = HashSet::new();

    let mut align = |name: String, kind: KeyKind, columns: &[String]| {
        let resolved: Vec<String> = columns.iter().map(|c| resolve(c)).collect();
        let wanted = attribute_set(&resolved);

        let primary_match = kind == KeyKind::Primary
            && resolved.len() == 1
            && entity.is_primary_id(&resolved[0]);
        let alternate = entity
            .alternate_keys
            .iter()
            .find(|key| attribute_set(&key.key_attributes) == wanted);

        let (status, dataverse_attributes) = if primary_match {
            (
                KeyAlignmentStatus::Matched,
                vec![entity.primary_id_attribute.clone()],
            )
        } else if let Some(key) = alternate {
            matched.insert(key.logical_name.to_lowercase());
            (KeyAlignmentStatus::Matched, key.key_attributes.clone())
        } else {
            (KeyAlignmentStatus::MissingInDataverse, Vec::new())
        };

        keys.push(KeyAlignment {
            name,
            kind,
            sql_columns: columns.to_vec(),
            dataverse_attributes,
            status,
        });
    };

    if let Some(pk) = &table.primary_key {
        let name = pk.name.clone().unwrap_or_else(|| PRIMARY_KEY_NAME.to_string());
        align(name, KeyKind::Primary, &pk.columns);
    }
    for unique in &table.unique_keys {
        align(unique.name.clone(), KeyKind::Unique, &unique.columns);
    }

    (keys, matched)
}

fn align_foreign_keys(
    table: &SqlTable,
    entity: &EntityMetadata,
    table_map: &TableMap,
    resolve: &dyn Fn(&str) -> String,
) -> Vec<ForeignKeyAlignment> {
    table
        .foreign_keys
        .iter()
        .map(|fk| {
            let referenced_entity = table_map.entity_for(&fk.referenced_table);
            let relationship = fk.single_column().and_then(|column| {
                let attribute = resolve(column);
                entity.relationships.iter().find(|rel| {
                    rel.referencing_entity.eq_ignore_ascii_case(&entity.logical_name)
                        && rel.referencing_attribute.eq_ignore_ascii_case(&attribute)
                        && rel.referenced_entity.eq_ignore_ascii_case(&referenced_entity)
                })
            });

            match relationship {
                Some(rel) => ForeignKeyAlignment {
                    foreign_key: fk.clone(),
                    status: ForeignKeyAlignmentStatus::Matched,
                    referenced_entity,
                    relationship_schema_name: Some(rel.schema_name.clone()),
                    referencing_attribute: Some(rel.referencing_attribute.clone()),
                },
                None => ForeignKeyAlignment {
                    foreign_key: fk.clone(),
                    status: ForeignKeyAlignmentStatus::MissingInDataverse,
                    referenced_entity,
                    relationship_schema_name: None,
                    referencing_attribute: None,
                },
            }
        })
        .collect()
}

/// Every element is missing when the entity itself does not exist
fn missing_entity(table: &SqlTable, entity_name: String, table_map: &TableMap) -> TableAlignment {
    let columns = table
        .columns
        .iter()
        .map(|column| ColumnAlignment {
            column: column.clone(),
            status: ColumnAlignmentStatus::MissingInDataverse,
            attribute: None,
            resolved_attribute: None,
            note: Some("Dataverse entity not available.".to_string()),
        })
        .collect();

    let mut keys = Vec::new();
    if let Some(pk) = &table.primary_key {
        keys.push(KeyAlignment {
            name: pk.name.clone().unwrap_or_else(|| PRIMARY_KEY_NAME.to_string()),
            kind: KeyKind::Primary,
            sql_columns: pk.columns.clone(),
            dataverse_attributes: Vec::new(),
            status: KeyAlignmentStatus::MissingInDataverse,
        });
    }
    keys.extend(table.unique_keys.iter().map(|unique| KeyAlignment {
        name: unique.name.clone(),
        kind: KeyKind::Unique,
        sql_columns: unique.columns.clone(),
        dataverse_attributes: Vec::new(),
        status: KeyAlignmentStatus::MissingInDataverse,
    }));

    let foreign_keys = table
        .foreign_keys
        .iter()
        .map(|fk| ForeignKeyAlignment {
            foreign_key: fk.clone(),
            status: ForeignKeyAlignmentStatus::MissingInDataverse,
            referenced_entity: table_map.entity_for(&fk.referenced_table),
            relationship_schema_name: None,
            referencing_attribute: None,
        })
        .collect();

    TableAlignment {
        table: table.clone(),
        entity_name,
        entity: None,
        columns,
        keys,
        foreign_keys,
        unmatched_attributes: Vec::new(),
        unmatched_alternate_keys: Vec::new(),
        unmatched_relationships: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{AlternateKey, AttributeMetadata, MetadataSnapshot, RelationshipMetadata};
    use crate::schema::parse;
    use pretty_assertions::assert_eq;

    const ENGAGEMENTS_DDL: &str = r#"
        CREATE TABLE `Engagements` (
          `Id` int NOT NULL AUTO_INCREMENT,
          `Code` varchar(20) NOT NULL,
          `Region` varchar(20) NOT NULL,
          `CustomerId` int NOT NULL,
          `OwnerId` int NULL,
          `Budget` decimal(12,2) NULL,
          PRIMARY KEY (`Id`),
          UNIQUE KEY `UX_Code_Region` (`Region`, `Code`),
          UNIQUE KEY `UX_Budget` (`Budget`),
          CONSTRAINT `FK_Engagements_Customers` FOREIGN KEY (`CustomerId`) REFERENCES `Customers` (`Id`)
        );
    "#;

    fn engagement_entity() -> EntityMetadata {
        let mut entity = EntityMetadata::new("cr8a1_engagement", "cr8a1_Engagement", "cr8a1_engagementid");
        entity.attributes = vec![
            AttributeMetadata::new("cr8a1_engagementid", "Uniqueidentifier"),
            AttributeMetadata::new("code", "String").custom(),
            AttributeMetadata::new("region", "String").custom(),
            AttributeMetadata::new("customerid", "Lookup").custom().with_targets(&["account"]),
            AttributeMetadata::new("ownerid", "Owner"),
            AttributeMetadata::new("cr8a1_legacy", "String").custom(),
        ];
        entity.alternate_keys = vec![
            AlternateKey {
                logical_name: "cr8a1_code_region".into(),
                key_attributes: vec!["code".into(), "region".into()],
            },
            AlternateKey {
                logical_name: "cr8a1_orphan".into(),
                key_attributes: vec!["cr8a1_legacy".into()],
            },
        ];
        entity.relationships = vec![
            RelationshipMetadata {
                schema_name: "cr8a1_engagement_customer".into(),
                referencing_entity: "cr8a1_engagement".into(),
                referencing_attribute: "customerid".into(),
                referenced_entity: "account".into(),
                referenced_attribute: "accountid".into(),
                is_custom: true,
            },
            RelationshipMetadata {
                schema_name: "lk_engagement_createdby".into(),
                referencing_entity: "cr8a1_engagement".into(),
                referencing_attribute: "createdby".into(),
                referenced_entity: "systemuser".into(),
                referenced_attribute: "systemuserid".into(),
                is_custom: false,
            },
        ];
        entity
    }

    fn analyze(ddl: &str, entities: Vec<EntityMetadata>, map: TableMap) -> AlignmentAnalysis {
        let schema = parse(ddl).unwrap();
        let metadata = MetadataResult::Connected(MetadataSnapshot::new(None, entities, Vec::new()));
        AlignmentAnalyzer::new(NativeFieldMap::default()).analyze(&schema, &metadata, &map)
    }

    fn engagement_map() -> TableMap {
        TableMap::new([("Engagements", "cr8a1_engagement"), ("Customers", "account")])
    }

    #[test]
    fn columns_match_native_primary_and_by_name() {
        let analysis = analyze(ENGAGEMENTS_DDL, vec![engagement_entity()], engagement_map());
        let table = analysis.table("engagements").unwrap();

        let statuses: Vec<_> = table
            .columns
            .iter()
            .map(|c| (c.column.name.as_str(), c.status))
            .collect();
        assert_eq!(
            statuses,
            vec![
                ("Id", ColumnAlignmentStatus::Matched),
                ("Code", ColumnAlignmentStatus::Matched),
                ("Region", ColumnAlignmentStatus::Matched),
                ("CustomerId", ColumnAlignmentStatus::Matched),
                ("OwnerId", ColumnAlignmentStatus::NativeReplacement),
                ("Budget", ColumnAlignmentStatus::MissingInDataverse),
            ]
        );

        let id = &table.columns[0];
        assert_eq!(id.resolved_attribute.as_deref(), Some("cr8a1_engagementid"));

        let unmatched: Vec<_> = table
            .unmatched_attributes
            .iter()
            .map(|a| a.logical_name.as_str())
            .collect();
        assert_eq!(unmatched, vec!["cr8a1_legacy"]);
    }

    #[test]
    fn keys_match_as_unordered_sets() {
        let analysis = analyze(ENGAGEMENTS_DDL, vec![engagement_entity()], engagement_map());
        let table = analysis.table("Engagements").unwrap();

        let keys: Vec<_> = table.keys.iter().map(|k| (k.name.as_str(), k.status)).collect();
        assert_eq!(
            keys,
            vec![
                ("PRIMARY", KeyAlignmentStatus::Matched),
                ("UX_Code_Region", KeyAlignmentStatus::Matched),
                ("UX_Budget", KeyAlignmentStatus::MissingInDataverse),
            ]
        );
        assert_eq!(table.unmatched_alternate_keys.len(), 1);
        assert_eq!(table.unmatched_alternate_keys[0].logical_name, "cr8a1_orphan");
    }

    #[test]
    fn foreign_keys_match_through_the_table_map() {
        let analysis = analyze(ENGAGEMENTS_DDL, vec![engagement_entity()], engagement_map());
        let table = analysis.table("Engagements").unwrap();

        let fk = &table.foreign_keys[0];
        assert_eq!(fk.status, ForeignKeyAlignmentStatus::Matched);
        assert_eq!(fk.referenced_entity, "account");
        assert_eq!(fk.referencing_attribute.as_deref(), Some("customerid"));

        let unmatched: Vec<_> = table
            .unmatched_relationships
            .iter()
            .map(|r| r.schema_name.as_str())
            .collect();
        assert_eq!(unmatched, vec!["lk_engagement_createdby"]);
    }

    #[test]
    fn foreign_key_to_unmapped_table_does_not_match() {
        let map = TableMap::new([("Engagements", "cr8a1_engagement")]);
        let analysis = analyze(ENGAGEMENTS_DDL, vec![engagement_entity()], map);
        let fk = &analysis.table("Engagements").unwrap().foreign_keys[0];
        assert_eq!(fk.referenced_entity, "Customers");
        assert_eq!(fk.status, ForeignKeyAlignmentStatus::MissingInDataverse);
    }

    #[test]
    fn composite_foreign_keys_are_never_matched() {
        let ddl = "CREATE TABLE lines (a int, b int, FOREIGN KEY (a, b) REFERENCES orders (x, y));";
        let mut entity = EntityMetadata::new("lines", "cr8a1_Lines", "linesid");
        entity.relationships = vec![RelationshipMetadata {
            schema_name: "cr8a1_lines_orders".into(),
            referencing_entity: "lines".into(),
            referencing_attribute: "a".into(),
            referenced_entity: "orders".into(),
            referenced_attribute: "ordersid".into(),
            is_custom: true,
        }];

        let analysis = analyze(ddl, vec![entity], TableMap::default());
        let fk = &analysis.table("lines").unwrap().foreign_keys[0];
        assert!(fk.is_composite());
        assert_eq!(fk.status, ForeignKeyAlignmentStatus::MissingInDataverse);
    }

    #[test]
    fn missing_entity_marks_everything_missing() {
        let analysis = analyze(ENGAGEMENTS_DDL, Vec::new(), engagement_map());
        let table = analysis.table("Engagements").unwrap();

        assert!(table.is_missing_entity());
        assert_eq!(table.entity_name, "cr8a1_engagement");
        assert!(table
            .columns
            .iter()
            .all(|c| c.status == ColumnAlignmentStatus::MissingInDataverse));
        assert!(table
            .keys
            .iter()
            .all(|k| k.status == KeyAlignmentStatus::MissingInDataverse));
        assert!(table.unmatched_attributes.is_empty());
    }

    #[test]
    fn unavailable_metadata_treats_tables_as_missing() {
        let schema = parse(ENGAGEMENTS_DDL).unwrap();
        let metadata = MetadataResult::unavailable(None, "offline");
        let analysis = AlignmentAnalyzer::new(NativeFieldMap::default()).analyze(
            &schema,
            &metadata,
            &TableMap::default(),
        );
        assert!(analysis.tables.iter().all(TableAlignment::is_missing_entity));
    }

    #[test]
    fn native_column_falls_back_to_name_match_when_native_attribute_is_absent() {
        let ddl = "CREATE TABLE `Invoices` (`Id` bigint PRIMARY KEY, `CreatedAt` datetime);";
        let mut entity = EntityMetadata::new("invoices", "cr8a1_Invoices", "invoiceid");
        entity.attributes = vec![
            AttributeMetadata::new("invoiceid", "Uniqueidentifier"),
            AttributeMetadata::new("createdat", "DateTime").custom(),
        ];

        let analysis = analyze(ddl, vec![entity], TableMap::default());
        let table = analysis.table("Invoices").unwrap();

        let created = &table.columns[1];
        assert_eq!(created.status, ColumnAlignmentStatus::Matched);
        assert_eq!(created.resolved_attribute.as_deref(), Some("createdat"));
        assert!(table.unmatched_attributes.is_empty());
    }

    #[test]
    fn native_column_without_any_counterpart_still_adopts_native_field() {
        let ddl = "CREATE TABLE `Invoices` (`Id` bigint PRIMARY KEY, `CreatedAt` datetime);";
        let mut entity = EntityMetadata::new("invoices", "cr8a1_Invoices", "invoiceid");
        entity.attributes = vec![AttributeMetadata::new("invoiceid", "Uniqueidentifier")];

        let analysis = analyze(ddl, vec![entity], TableMap::default());
        let created = &analysis.table("Invoices").unwrap().columns[1];
        assert_eq!(created.status, ColumnAlignmentStatus::NativeReplacement);
        assert!(created.attribute.is_none());
        assert_eq!(created.resolved_attribute.as_deref(), Some("createdon"));
    }

    #[test]
    fn injected_native_map_changes_the_verdict() {
        let analysis = {
            let schema = parse(ENGAGEMENTS_DDL).unwrap();
            let metadata = MetadataResult::Connected(MetadataSnapshot::new(
                None,
                vec![engagement_entity()],
                Vec::new(),
            ));
            AlignmentAnalyzer::new(NativeFieldMap::empty()).analyze(&schema, &metadata, &engagement_map())
        };
        let owner = &analysis.table("Engagements").unwrap().columns[4];
        assert_eq!(owner.column.name, "OwnerId");
        assert_eq!(owner.status, ColumnAlignmentStatus::Matched);
    }
}
