//! Markdown alignment report

use std::fs;
use std::path::Path;

use crate::alignment::{
    AlignmentAnalysis, ColumnAlignmentStatus, ForeignKeyAlignmentStatus, KeyAlignmentStatus,
    TableAlignment,
};
use crate::config::NativeFieldMap;
use crate::error::Result;
use crate::remote::MetadataResult;

/// Renders an [`AlignmentAnalysis`] as Markdown
pub struct ReportWriter<'a> {
    native_fields: &'a NativeFieldMap,
}

impl<'a> ReportWriter<'a> {
    pub fn new(native_fields: &'a NativeFieldMap) -> Self {
        Self { native_fields }
    }

    /// Render the report and write it to `output`, creating parent directories
    pub fn write(
        &self,
        analysis: &AlignmentAnalysis,
        metadata: &MetadataResult,
        sql_path: &Path,
        output: &Path,
    ) -> Result<()> {
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(output, self.render(analysis, metadata, sql_path))?;
        tracing::info!(path = %output.display(), tables = analysis.tables.len(), "Wrote alignment report");
        Ok(())
    }

    pub fn render(&self, analysis: &AlignmentAnalysis, metadata: &MetadataResult, sql_path: &Path) -> String {
        let mut md = String::new();

        md.push_str("# Dataverse Alignment Report\n\n");
        md.push_str(&format!(
            "Generated: {} UTC\n",
            analysis.generated_at.format("%Y-%m-%d %H:%M:%S")
        ));
        md.push_str(&format!(
            "Source schema: `{}` tables parsed from {}\n",
            analysis.tables.len(),
            sql_path.display()
        ));
        md.push_str(&format!(
            "Dataverse org URL: {}\n",
            metadata.org_url().unwrap_or("(not configured)")
        ));
        md.push_str(&format!(
            "Dataverse connection: {}\n",
            if metadata.is_connected() { "available" } else { "not available" }
        ));

        let warnings = metadata.warnings();
        if !warnings.is_empty() {
            md.push_str("\n## Connection Warnings\n");
            for warning in &warnings {
                md.push_str(&format!("- {}\n", warning));
            }
        }

        if !self.native_fields.is_empty() {
            md.push_str("\n## Native Field Replacement Map\n");
            for (column, native) in self.native_fields.iter() {
                md.push_str(&format!("- `{}` → `{}`\n", column, native));
            }
        }

        for table in &analysis.tables {
            append_table(&mut md, table);
        }

        md
    }
}

fn cell(text: &str) -> String {
    text.replace('|', "\\|")
}

fn append_table(md: &mut String, table: &TableAlignment) {
    md.push_str(&format!("\n## Table `{}`\n\n", table.table.name));
    md.push_str(&format!("- MySQL table: `{}`\n", table.table.name));
    md.push_str(&format!("- Dataverse entity: `{}`\n", table.entity_name));
    md.push_str(&format!(
        "- Dataverse entity status: {}\n",
        if table.is_missing_entity() { "missing" } else { "retrieved" }
    ));

    md.push_str("\n### Column Alignment\n\n");
    md.push_str("| SQL Column | SQL Type | Nullable | Alignment | Dataverse Attribute | Dataverse Type | Notes |\n");
    md.push_str("| --- | --- | --- | --- | --- | --- | --- |\n");
    for column in &table.columns {
        let alignment = match column.status {
            ColumnAlignmentStatus::Matched => "Matched",
            ColumnAlignmentStatus::NativeReplacement => "Use native",
            ColumnAlignmentStatus::MissingInDataverse => "Missing",
        };
        let (name, kind) = match &column.attribute {
            Some(attribute) => (attribute.logical_name.as_str(), attribute.attribute_type.as_str()),
            None => (column.resolved_attribute.as_deref().unwrap_or(""), ""),
        };
        md.push_str(&format!(
            "| `{}` | `{}` | {} | {} | `{}` | `{}` | {} |\n",
            column.column.name,
            cell(&column.column.data_type),
            if column.column.nullable { "Yes" } else { "No" },
            alignment,
            name,
            kind,
            cell(column.note.as_deref().unwrap_or(""))
        ));
    }

    md.push_str("\n### Key Alignment\n\n");
    md.push_str("| Key | SQL Columns | Dataverse Columns | Status |\n");
    md.push_str("| --- | --- | --- | --- |\n");
    for key in &table.keys {
        let status = match key.status {
            KeyAlignmentStatus::Matched => "Matched",
            KeyAlignmentStatus::MissingInDataverse => "Missing",
        };
        md.push_str(&format!(
            "| `{}` | `{}` | `{}` | {} |\n",
            key.name,
            key.sql_columns.join(", "),
            key.dataverse_attributes.join(", "),
            status
        ));
    }

    md.push_str("\n### Foreign Key Alignment\n\n");
    md.push_str("| Foreign Key | Columns | References | Status | Matched Relationship |\n");
    md.push_str("| --- | --- | --- | --- | --- |\n");
    for fk in &table.foreign_keys {
        let status = match fk.status {
            ForeignKeyAlignmentStatus::Matched => "Matched",
            ForeignKeyAlignmentStatus::MissingInDataverse => "Missing",
        };
        md.push_str(&format!(
            "| `{}` | `{}` | `{}({})` | {} | `{}` |\n",
            fk.foreign_key.name,
            fk.foreign_key.columns.join(", "),
            fk.foreign_key.referenced_table,
            fk.foreign_key.referenced_columns.join(", "),
            status,
            fk.relationship_schema_name.as_deref().unwrap_or("")
        ));
    }

    if !table.unmatched_attributes.is_empty() {
        md.push_str("\n### Unmatched Dataverse Attributes\n");
        for attribute in &table.unmatched_attributes {
            md.push_str(&format!("- `{}` ({})\n", attribute.logical_name, attribute.attribute_type));
        }
    }

    if !table.unmatched_alternate_keys.is_empty() {
        md.push_str("\n### Unmatched Dataverse Alternate Keys\n");
        let mut keys: Vec<_> = table.unmatched_alternate_keys.iter().collect();
        keys.sort_by_key(|k| k.logical_name.to_lowercase());
        for key in keys {
            md.push_str(&format!("- `{}` → `{}`\n", key.logical_name, key.key_attributes.join(", ")));
        }
    }

    if !table.unmatched_relationships.is_empty() {
        md.push_str("\n### Unmatched Dataverse Relationships\n");
        let mut relationships: Vec<_> = table.unmatched_relationships.iter().collect();
        relationships.sort_by_key(|r| r.schema_name.to_lowercase());
        for relationship in relationships {
            md.push_str(&format!(
                "- `{}` ({} → {})\n",
                relationship.schema_name, relationship.referencing_attribute, relationship.referenced_entity
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alignment::AlignmentAnalyzer;
    use crate::config::TableMap;
    use crate::remote::{AttributeMetadata, EntityMetadata, MetadataSnapshot};
    use crate::schema::parse;

    const DDL: &str = "CREATE TABLE Invoices (Id int NOT NULL, Amount decimal(12,2) NOT NULL, \
                       CreatedAt datetime NOT NULL, PRIMARY KEY (Id)); \
                       CREATE TABLE Widgets (Id int NOT NULL, PRIMARY KEY (Id));";

    fn render(metadata: &MetadataResult) -> String {
        let natives = NativeFieldMap::default();
        let schema = parse(DDL).unwrap();
        let analysis = AlignmentAnalyzer::new(natives.clone()).analyze(&schema, metadata, &TableMap::default());
        ReportWriter::new(&natives).render(&analysis, metadata, Path::new("schema.sql"))
    }

    #[test]
    fn renders_tables_and_statuses() {
        let mut invoices = EntityMetadata::new("invoices", "cr8a1_Invoices", "invoiceid");
        invoices.attributes = vec![
            AttributeMetadata::new("invoiceid", "Uniqueidentifier"),
            AttributeMetadata::new("cr8a1_legacy", "String").custom(),
        ];
        let metadata = MetadataResult::Connected(MetadataSnapshot::new(
            Some("https://org.crm.dynamics.com".into()),
            vec![invoices],
            vec!["Failed to retrieve metadata for 'widgets': boom".into()],
        ));

        let md = render(&metadata);
        assert!(md.starts_with("# Dataverse Alignment Report"));
        assert!(md.contains("Source schema: `2` tables parsed from schema.sql"));
        assert!(md.contains("Dataverse connection: available"));
        assert!(md.contains("## Connection Warnings\n- Failed to retrieve metadata for 'widgets': boom"));
        assert!(md.contains("- `CreatedAt` → `createdon`"));
        assert!(md.contains("| `Id` | `int` | No | Matched | `invoiceid` | `Uniqueidentifier` |"));
        assert!(md.contains("| `CreatedAt` | `datetime` | No | Use native | `createdon` | `` |"));
        assert!(md.contains("| `Amount` | `decimal(12,2)` | No | Missing |"));
        assert!(md.contains("- `cr8a1_legacy` (String)"));
        assert!(md.contains("## Table `Widgets`"));
        assert!(md.contains("- Dataverse entity status: missing"));
    }

    #[test]
    fn unavailable_connection_is_reported() {
        let md = render(&MetadataResult::unavailable(None, "Dataverse connection is not configured."));
        assert!(md.contains("Dataverse org URL: (not configured)"));
        assert!(md.contains("Dataverse connection: not available"));
        assert!(md.contains("- Dataverse connection is not configured."));
    }
}
