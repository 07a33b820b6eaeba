//! dv_schema_sync: align Dataverse entities with a MySQL schema
//!
//! The MySQL DDL is the source of truth. A run parses it, loads the metadata of
//! the mapped Dataverse entities, classifies every column, key and foreign key,
//! plans the changes that would close the gaps and, when asked, applies them.

pub mod alignment;
pub mod apply;
pub mod config;
pub mod error;
pub mod planning;
pub mod remote;
pub mod report;
pub mod schema;
pub mod utils;

use tokio_util::sync::CancellationToken;

// Re-export main types for easier access
pub use alignment::{AlignmentAnalysis, AlignmentAnalyzer};
pub use apply::{apply_plan, ApplyReport};
pub use config::{ExecutionOptions, NativeFieldMap, RunArgs, RunMode, SyncConfig, TableMap};
pub use error::{Error, Result};
pub use planning::{ChangePlanner, SchemaChangePlan, SchemaChangePlanSummary};
pub use remote::{
    EntityStore, MetadataResult, MetadataSource, SnapshotFileSource, WebApiClient,
};
pub use report::ReportWriter;
pub use schema::SqlSchema;

/// Everything one run produced
#[derive(Debug)]
pub struct RunOutcome {
    pub analysis: AlignmentAnalysis,
    pub plan: SchemaChangePlan,
    pub metadata: MetadataResult,
    pub apply_report: Option<ApplyReport>,
}

/// Drives a run: parse, load metadata, analyze, plan, report, then the
/// dry-run artifact and apply steps the options ask for
pub struct SyncClient {
    options: ExecutionOptions,
    native_fields: NativeFieldMap,
}

impl SyncClient {
    pub fn new(options: ExecutionOptions, native_fields: NativeFieldMap) -> Self {
        Self {
            options,
            native_fields,
        }
    }

    pub fn options(&self) -> &ExecutionOptions {
        &self.options
    }

    pub fn load_schema(&self) -> Result<SqlSchema> {
        let schema = schema::parse_file(&self.options.sql_path)?;
        tracing::info!(
            path = %self.options.sql_path.display(),
            tables = schema.len(),
            "Parsed SQL schema"
        );
        Ok(schema)
    }

    /// Entity logical names the schema's tables map to
    pub fn entity_names(&self, schema: &SqlSchema) -> Vec<String> {
        schema
            .tables()
            .map(|table| self.options.table_map.entity_for(&table.name))
            .collect()
    }

    /// Load metadata from the snapshot file when one is given, else from the
    /// Web API
    pub async fn load_metadata(
        &self,
        schema: &SqlSchema,
        cancel: &CancellationToken,
    ) -> Result<MetadataResult> {
        match &self.options.metadata_snapshot {
            Some(path) => {
                let source = SnapshotFileSource::new(path, self.options.connection.base_url());
                self.load_metadata_from(&source, schema, cancel).await
            }
            None => {
                let source = WebApiClient::new(self.options.connection.clone())?;
                self.load_metadata_from(&source, schema, cancel).await
            }
        }
    }

    pub async fn load_metadata_from(
        &self,
        source: &dyn MetadataSource,
        schema: &SqlSchema,
        cancel: &CancellationToken,
    ) -> Result<MetadataResult> {
        let result = source.load(&self.entity_names(schema), cancel).await?;
        for warning in result.warnings() {
            tracing::warn!("{}", warning);
        }
        Ok(result)
    }

    pub fn analyze(&self, schema: &SqlSchema, metadata: &MetadataResult) -> AlignmentAnalysis {
        AlignmentAnalyzer::new(self.native_fields.clone()).analyze(
            schema,
            metadata,
            &self.options.table_map,
        )
    }

    pub fn plan(&self, analysis: &AlignmentAnalysis) -> SchemaChangePlan {
        ChangePlanner::new(self.native_fields.clone()).build_plan(analysis)
    }

    /// Complete workflow. `store` receives the mutations of an apply run.
    pub async fn run(
        &self,
        store: &dyn EntityStore,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome> {
        let schema = self.load_schema()?;
        let metadata = self.load_metadata(&schema, cancel).await?;
        self.finish(schema, metadata, store, cancel).await
    }

    /// Complete workflow with metadata from `source` instead of the configured one
    pub async fn run_with_source(
        &self,
        source: &dyn MetadataSource,
        store: &dyn EntityStore,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome> {
        let schema = self.load_schema()?;
        let metadata = self.load_metadata_from(source, &schema, cancel).await?;
        self.finish(schema, metadata, store, cancel).await
    }

    async fn finish(
        &self,
        schema: SqlSchema,
        metadata: MetadataResult,
        store: &dyn EntityStore,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome> {
        let analysis = self.analyze(&schema, &metadata);
        let plan = self.plan(&analysis);

        ReportWriter::new(&self.native_fields).write(
            &analysis,
            &metadata,
            &self.options.sql_path,
            &self.options.report_path,
        )?;
        println!(
            "Alignment report written to {}.",
            self.options.report_path.display()
        );
        if !metadata.is_connected() {
            println!("Dataverse metadata could not be retrieved; report contains SQL-only details.");
        }

        for line in plan_summary_lines(&plan) {
            println!("{}", line);
        }

        if self.options.dry_run {
            apply::write_delete_candidates(&plan, &self.options.delete_candidates_path)?;
            println!(
                "Dry-run complete. Deletion candidates written to {}.",
                self.options.delete_candidates_path.display()
            );
        }

        let apply_report = if self.options.apply {
            let report = apply_plan(store, &plan, &self.options, &metadata, cancel).await?;
            print_apply_report(&report);
            Some(report)
        } else {
            None
        };

        Ok(RunOutcome {
            analysis,
            plan,
            metadata,
            apply_report,
        })
    }
}

/// Build a client from parsed arguments, the loaded TOML config and the
/// drop-permission environment signal
pub fn client_from_args(
    args: &RunArgs,
    config: &SyncConfig,
    environment_allows_drop: bool,
) -> Result<SyncClient> {
    let options = ExecutionOptions::resolve(args, environment_allows_drop)?;
    Ok(SyncClient::new(options, config.native_field_map()?))
}

/// Human-readable plan summary, one line per category
pub fn plan_summary_lines(plan: &SchemaChangePlan) -> Vec<String> {
    let summary = plan.summary();
    let mut lines = vec![
        "Schema change summary:".to_string(),
        format!("  Attributes to add: {}", summary.attributes_to_add),
        format!("  Native replacements to adopt: {}", summary.native_replacements),
        format!("  Alternate keys to add: {}", summary.alternate_keys_to_add),
        format!("  Relationships to add: {}", summary.relationships_to_add),
        format!("  Attributes to remove: {}", summary.attributes_to_remove),
        format!("  Alternate keys to remove: {}", summary.alternate_keys_to_remove),
        format!("  Relationships to remove: {}", summary.relationships_to_remove),
        format!("  Entities missing in Dataverse: {}", summary.missing_entities),
    ];
    if !plan.has_changes() {
        lines.push("No schema changes are required.".to_string());
    }
    lines
}

fn print_apply_report(report: &ApplyReport) {
    if let Some(path) = &report.exported_solution {
        println!("Exported Dataverse solution to '{}'.", path.display());
    }
    for item in &report.created {
        println!("Created {}.", item);
    }
    for message in report.skipped.iter().chain(&report.follow_ups) {
        println!("{}", message);
    }
    if report.drops_skipped {
        println!("{}", apply::DROPS_SKIPPED_NOTICE);
    }
    for item in &report.deleted {
        println!("Deleted {}.", item);
    }
    for failure in &report.failures {
        println!("Failed: {}: {}", failure.item, failure.message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use clap::Parser;

    #[test]
    fn client_uses_native_fields_from_loaded_config() {
        let dir = tempfile::tempdir().unwrap();
        let sql = dir.path().join("schema.sql");
        std::fs::write(&sql, "CREATE TABLE t (id int);").unwrap();
        let args = RunArgs::parse_from(["dv_schema_sync", "--sql", sql.to_str().unwrap()]);
        let config: SyncConfig = toml::from_str("[native_fields]\nOpenedAt = \"createdon\"\n").unwrap();

        let client = client_from_args(&args, &config, false).unwrap();
        assert_eq!(client.native_fields.get("openedat"), Some("createdon"));
        assert_eq!(client.native_fields.get("CreatedAt"), None);
    }

    #[test]
    fn summary_reports_no_changes() {
        let lines = plan_summary_lines(&SchemaChangePlan::default());
        assert_eq!(lines[0], "Schema change summary:");
        assert_eq!(lines[1], "  Attributes to add: 0");
        assert_eq!(lines.last().map(String::as_str), Some("No schema changes are required."));
    }
}
