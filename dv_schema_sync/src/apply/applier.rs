//! Plan applier
//!
//! Issues the remote mutations of a [`SchemaChangePlan`] in a fixed order:
//! solution export, attribute creations, alternate keys, follow-ups for the
//! changes that need a human, then removals when drops are permitted.
//!
//! A failed item is recorded and the applier moves on. Cancellation is checked
//! before every remote call; items already applied are never rolled back.

use chrono::Utc;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::apply::attributes::new_attribute;
use crate::config::{ExecutionOptions, ALLOW_DROP_ENV};
use crate::error::{Error, Result};
use crate::planning::{PlannedAlternateKeyAddition, SchemaChangePlan};
use crate::remote::{EntityMetadata, EntityStore, MetadataResult, MetadataSnapshot, NewAlternateKey};
use crate::utils::naming::{customization_prefix, logical_name, schema_name};

pub const DROPS_SKIPPED_NOTICE: &str =
    "Drop operations were planned but skipped. Use --allow-drop and set DVSCHEMA_ALLOW_DROP=1 to enable removals.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyFailure {
    pub item: String,
    pub message: String,
}

/// What happened during an apply run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub exported_solution: Option<PathBuf>,
    pub created: Vec<String>,
    pub deleted: Vec<String>,
    /// Items that could not be attempted, with the reason
    pub skipped: Vec<String>,
    /// Planned changes that have to be made by hand
    pub follow_ups: Vec<String>,
    pub failures: Vec<ApplyFailure>,
    pub drops_skipped: bool,
}

impl ApplyReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    fn fail(&mut self, item: String, error: &Error) {
        warn!(item = %item, error = %error, "Apply step failed");
        self.failures.push(ApplyFailure {
            item,
            message: error.to_string(),
        });
    }

    fn skip(&mut self, message: String) {
        info!("{}", message);
        self.skipped.push(message);
    }

    fn follow_up(&mut self, message: String) {
        info!("{}", message);
        self.follow_ups.push(message);
    }
}

fn ensure_active(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(Error::Cancelled)
    } else {
        Ok(())
    }
}

/// Apply `plan` through `store`.
///
/// Fails before any mutation when `metadata` is not connected. Per-item
/// failures are collected in the returned report.
pub async fn apply_plan(
    store: &dyn EntityStore,
    plan: &SchemaChangePlan,
    options: &ExecutionOptions,
    metadata: &MetadataResult,
    cancel: &CancellationToken,
) -> Result<ApplyReport> {
    let snapshot = match metadata {
        MetadataResult::Connected(snapshot) => snapshot,
        MetadataResult::Unavailable { reason, .. } => {
            return Err(Error::RemoteUnavailable(format!(
                "Cannot apply schema changes without a Dataverse connection. {}",
                reason
            )));
        }
    };

    let mut report = ApplyReport::default();
    if !plan.has_changes() {
        info!("No schema changes to apply");
        return Ok(report);
    }

    if let Some(name) = &options.solution_export_name {
        export_solution(store, name, options, &mut report, cancel).await?;
    }

    create_attributes(store, plan, snapshot, &mut report, cancel).await?;
    create_alternate_keys(store, plan, snapshot, &mut report, cancel).await?;

    for replacement in &plan.native_replacements {
        report.follow_up(format!(
            "Column '{}' on entity '{}' maps to native attribute '{}'. Update data layer to use the native field.",
            replacement.column_name, replacement.entity_name, replacement.native_logical_name
        ));
    }
    for relationship in &plan.relationships_to_add {
        report.follow_up(format!(
            "Planned relationship '{}' between '{}' and '{}' requires manual creation in Dataverse.",
            relationship.foreign_key.name, relationship.entity_name, relationship.referenced_entity
        ));
    }

    if options.drops_permitted() {
        apply_removals(store, plan, &mut report, cancel).await?;
    } else if plan.has_removals() {
        warn!(env = ALLOW_DROP_ENV, "{}", DROPS_SKIPPED_NOTICE);
        report.drops_skipped = true;
    }

    info!(
        created = report.created.len(),
        deleted = report.deleted.len(),
        failed = report.failures.len(),
        skipped = report.skipped.len(),
        "Apply finished"
    );
    Ok(report)
}

async fn export_solution(
    store: &dyn EntityStore,
    name: &str,
    options: &ExecutionOptions,
    report: &mut ApplyReport,
    cancel: &CancellationToken,
) -> Result<()> {
    ensure_active(cancel)?;

    let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
    let path = options
        .solution_export_dir
        .join(format!("{}_{}.zip", name, timestamp));

    let outcome = match store.export_solution(name).await {
        Ok(bytes) => tokio::fs::write(&path, bytes).await.map_err(Error::from),
        Err(e) => Err(e),
    };

    match outcome {
        Ok(()) => {
            info!(solution = %name, path = %path.display(), "Exported Dataverse solution");
            report.exported_solution = Some(path);
        }
        Err(e) => report.fail(format!("export solution '{}'", name), &e),
    }
    Ok(())
}

/// Entity metadata and customization prefix, or the reason the item is skipped
fn target_entity<'a>(
    snapshot: &'a MetadataSnapshot,
    entity_name: &str,
) -> std::result::Result<(&'a EntityMetadata, String), String> {
    let entity = snapshot
        .entity(entity_name)
        .ok_or_else(|| format!("metadata for entity '{}' is unavailable", entity_name))?;
    let prefix = customization_prefix(&entity.schema_name)
        .ok_or_else(|| "a customization prefix could not be determined".to_string())?;
    Ok((entity, prefix))
}

async fn create_attributes(
    store: &dyn EntityStore,
    plan: &SchemaChangePlan,
    snapshot: &MetadataSnapshot,
    report: &mut ApplyReport,
    cancel: &CancellationToken,
) -> Result<()> {
    for addition in &plan.attributes_to_add {
        let item = format!(
            "attribute '{}' on entity '{}'",
            addition.column.name, addition.entity_name
        );

        let (_, prefix) = match target_entity(snapshot, &addition.entity_name) {
            Ok(target) => target,
            Err(reason) => {
                report.skip(format!("Skipping {} because {}.", item, reason));
                continue;
            }
        };

        let attribute = match new_attribute(&addition.column, &prefix) {
            Ok(attribute) => attribute,
            Err(e) => {
                report.fail(item, &e);
                continue;
            }
        };

        ensure_active(cancel)?;
        match store.create_attribute(&addition.entity_name, &attribute).await {
            Ok(()) => {
                info!(
                    attribute = %attribute.logical_name,
                    entity = %addition.entity_name,
                    "Created attribute"
                );
                report.created.push(format!(
                    "attribute '{}' on entity '{}'",
                    attribute.logical_name, addition.entity_name
                ));
            }
            Err(e) => report.fail(item, &e),
        }
    }
    Ok(())
}

/// Attribute a key column will be backed by: the attribute it aligned to
/// (primary id included), a native replacement, an existing attribute, or the
/// attribute planned for the column
fn resolve_key_attribute(
    plan: &SchemaChangePlan,
    key: &PlannedAlternateKeyAddition,
    entity: &EntityMetadata,
    prefix: &str,
    index: usize,
    column: &str,
) -> Option<String> {
    if let Some(Some(resolved)) = key.resolved_attributes.get(index) {
        return Some(resolved.clone());
    }
    if let Some(replacement) = plan.native_replacement(&key.table_name, column) {
        return Some(replacement.native_logical_name.clone());
    }
    if let Some(attribute) = entity.find_attribute(column) {
        return Some(attribute.logical_name.clone());
    }
    plan.attribute_addition(&key.table_name, column)
        .map(|addition| logical_name(prefix, &addition.column.name))
}

async fn create_alternate_keys(
    store: &dyn EntityStore,
    plan: &SchemaChangePlan,
    snapshot: &MetadataSnapshot,
    report: &mut ApplyReport,
    cancel: &CancellationToken,
) -> Result<()> {
    for key in &plan.alternate_keys_to_add {
        let item = format!("alternate key '{}' on entity '{}'", key.key_name, key.entity_name);

        let (entity, prefix) = match target_entity(snapshot, &key.entity_name) {
            Ok(target) => target,
            Err(reason) => {
                report.skip(format!("Skipping {} because {}.", item, reason));
                continue;
            }
        };

        let key_attributes: Option<Vec<String>> = key
            .columns
            .iter()
            .enumerate()
            .map(|(index, column)| resolve_key_attribute(plan, key, entity, &prefix, index, column))
            .collect();
        let key_attributes = match key_attributes {
            Some(attributes) => attributes,
            None => {
                report.skip(format!(
                    "Skipping {} because one or more key attributes could not be resolved.",
                    item
                ));
                continue;
            }
        };

        let new_key = NewAlternateKey {
            logical_name: logical_name(&prefix, &key.key_name),
            schema_name: schema_name(&prefix, &key.key_name),
            display_name: key.key_name.clone(),
            key_attributes,
        };

        ensure_active(cancel)?;
        match store.create_alternate_key(&key.entity_name, &new_key).await {
            Ok(()) => {
                info!(key = %new_key.logical_name, entity = %key.entity_name, "Created alternate key");
                report.created.push(format!(
                    "alternate key '{}' on entity '{}'",
                    new_key.logical_name, key.entity_name
                ));
            }
            Err(e) => report.fail(item, &e),
        }
    }
    Ok(())
}

async fn apply_removals(
    store: &dyn EntityStore,
    plan: &SchemaChangePlan,
    report: &mut ApplyReport,
    cancel: &CancellationToken,
) -> Result<()> {
    for removal in &plan.attributes_to_remove {
        let item = format!(
            "attribute '{}' from entity '{}'",
            removal.attribute.logical_name, removal.entity_name
        );
        ensure_active(cancel)?;
        match store
            .delete_attribute(&removal.entity_name, &removal.attribute.logical_name)
            .await
        {
            Ok(()) => {
                info!(attribute = %removal.attribute.logical_name, entity = %removal.entity_name, "Deleted attribute");
                report.deleted.push(item);
            }
            Err(e) => report.fail(item, &e),
        }
    }

    for removal in &plan.relationships_to_remove {
        let item = format!("relationship '{}'", removal.relationship.schema_name);
        ensure_active(cancel)?;
        match store.delete_relationship(&removal.relationship.schema_name).await {
            Ok(()) => {
                info!(relationship = %removal.relationship.schema_name, "Deleted relationship");
                report.deleted.push(item);
            }
            Err(e) => report.fail(item, &e),
        }
    }

    for removal in &plan.alternate_keys_to_remove {
        let item = format!(
            "alternate key '{}' from entity '{}'",
            removal.key.logical_name, removal.entity_name
        );
        ensure_active(cancel)?;
        match store
            .delete_alternate_key(&removal.entity_name, &removal.key.logical_name)
            .await
        {
            Ok(()) => {
                info!(key = %removal.key.logical_name, entity = %removal.entity_name, "Deleted alternate key");
                report.deleted.push(item);
            }
            Err(e) => report.fail(item, &e),
        }
    }
    Ok(())
}
