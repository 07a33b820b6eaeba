//! Naming utilities for dv_schema_sync
//!
//! Constraint names for unnamed SQL keys, and the logical/schema names given to
//! attributes created in Dataverse.

use inflector::Inflector;

/// Longest logical-name body generated for a new attribute (prefix excluded)
pub const MAX_LOGICAL_NAME_BODY: usize = 40;

const FALLBACK_LOGICAL_NAME: &str = "customfield";
const FALLBACK_SCHEMA_NAME: &str = "CustomField";

/// Format a name according to a pattern with placeholders
pub fn format_name(pattern: &str, replacements: &[(&str, &str)]) -> String {
    let mut result = pattern.to_string();

    for (placeholder, value) in replacements {
        result = result.replace(&format!("{{{}}}", placeholder), value);
    }

    result
}

/// Get index name from table and columns according to pattern
pub fn get_index_name(pattern: &str, table_name: &str, columns: &[String]) -> String {
    let columns_str = columns.join("_");

    format_name(pattern, &[("table", table_name), ("columns", &columns_str)])
}

/// Get foreign key constraint name according to pattern
pub fn get_foreign_key_name(pattern: &str, table_name: &str, column_name: &str) -> String {
    format_name(pattern, &[("table", table_name), ("column", column_name)])
}

/// Publisher customization prefix of an entity, e.g. `cr8a1` for `cr8a1_Invoice`.
///
/// System entities such as `account` carry no prefix.
pub fn customization_prefix(entity_schema_name: &str) -> Option<String> {
    let (prefix, _) = entity_schema_name.split_once('_')?;
    let prefix = prefix.trim();
    if prefix.is_empty() {
        None
    } else {
        Some(prefix.to_lowercase())
    }
}

/// Logical name for a new attribute: `prefix_` plus the lowercase
/// alphanumerics of `name`, capped at [`MAX_LOGICAL_NAME_BODY`] characters.
pub fn logical_name(prefix: &str, name: &str) -> String {
    let body: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .take(MAX_LOGICAL_NAME_BODY)
        .collect();

    if body.is_empty() {
        format!("{}_{}", prefix, FALLBACK_LOGICAL_NAME)
    } else {
        format!("{}_{}", prefix, body)
    }
}

/// Schema name for a new attribute: `prefix_` plus `name` in PascalCase
pub fn schema_name(prefix: &str, name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    let body = cleaned.to_pascal_case();

    if body.is_empty() {
        format!("{}_{}", prefix, FALLBACK_SCHEMA_NAME)
    } else {
        format!("{}_{}", prefix, body)
    }
}
