//! Configuration handling for dv_schema_sync
//!
//! Three layers feed a run: command-line flags ([`RunArgs`]), an optional TOML
//! file ([`SyncConfig`]) and the `DVSCHEMA_ALLOW_DROP` environment signal.
//! [`ExecutionOptions::resolve`] validates them into one immutable value.

use clap::Parser;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::remote::ConnectionSettings;

pub const DEFAULT_SQL_PATH: &str = "artifacts/mysql/rebuild_schema.sql";
pub const DEFAULT_REPORT_PATH: &str = "docs/dv_alignment_report.md";
pub const DEFAULT_DELETE_CANDIDATES_PATH: &str = "docs/dv_delete_candidates.json";

/// Environment variable that must independently opt in to removals
pub const ALLOW_DROP_ENV: &str = "DVSCHEMA_ALLOW_DROP";

/// Built-in SQL column → Dataverse native attribute pairs
const DEFAULT_NATIVE_FIELDS: &[(&str, &str)] = &[
    ("CreatedAt", "createdon"),
    ("UpdatedAt", "modifiedon"),
    ("CreatedBy", "createdby"),
    ("UpdatedBy", "modifiedby"),
    ("OwnerId", "ownerid"),
    ("Owner", "ownerid"),
    ("AssignedTo", "ownerid"),
    ("Status", "statuscode"),
    ("StatusText", "statecode"),
    ("IsActive", "statecode"),
    ("IsDeleted", "statecode"),
    ("DeletedAt", "overriddencreatedon"),
];

/// Command-line surface of the `dv_schema_sync` binary
#[derive(Parser, Clone)]
#[command(name = "dv_schema_sync")]
#[command(version, about = "Align a MySQL schema with Dataverse entity metadata", long_about = None)]
pub struct RunArgs {
    /// MySQL DDL file containing CREATE TABLE statements
    #[arg(short = 's', long = "sql", default_value = DEFAULT_SQL_PATH)]
    pub sql: PathBuf,

    /// Markdown alignment report to write
    #[arg(short = 'o', long = "output", default_value = DEFAULT_REPORT_PATH)]
    pub output: PathBuf,

    /// JSON object mapping SQL table names to entity logical names
    #[arg(short = 'm', long = "map")]
    pub map: Option<PathBuf>,

    /// Where --dry-run writes removal candidates
    #[arg(long = "delete-candidates", default_value = DEFAULT_DELETE_CANDIDATES_PATH)]
    pub delete_candidates: PathBuf,

    /// Unmanaged solution to export before applying changes
    #[arg(long = "solution-export")]
    pub solution_export: Option<String>,

    /// Existing directory receiving the exported solution
    #[arg(long = "solution-export-dir", default_value = ".")]
    pub solution_export_dir: PathBuf,

    /// Write the delete-candidates artifact
    #[arg(long)]
    pub dry_run: bool,

    /// Apply the plan to Dataverse
    #[arg(long)]
    pub apply: bool,

    /// Permit removals (also requires DVSCHEMA_ALLOW_DROP=1)
    #[arg(long)]
    pub allow_drop: bool,

    #[arg(long, env = "DV_ORG_URL")]
    pub org_url: Option<String>,

    #[arg(long, env = "DV_CLIENT_ID")]
    pub client_id: Option<String>,

    #[arg(long, env = "DV_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: Option<String>,

    #[arg(long, env = "DV_TENANT_ID")]
    pub tenant_id: Option<String>,

    /// Read entity metadata from a JSON file instead of the Web API
    #[arg(long)]
    pub metadata_snapshot: Option<PathBuf>,

    /// TOML file with [logging] and [native_fields] sections
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// Load configuration from a TOML file
pub fn load_from_file(path: impl AsRef<Path>) -> Result<SyncConfig> {
    let path = path.as_ref();
    let config_str = fs::read_to_string(path).map_err(|e| {
        Error::Config(format!(
            "Failed to read config file '{}': {}",
            path.display(),
            e
        ))
    })?;

    let config: SyncConfig = toml::from_str(&config_str)
        .map_err(|e| Error::Config(format!("Failed to parse config file: {}", e)))?;

    Ok(config)
}

/// Optional TOML configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    pub logging: Option<LoggingConfig>,
    /// Replaces the built-in native field map when present
    pub native_fields: Option<BTreeMap<String, String>>,
}

impl SyncConfig {
    pub fn native_field_map(&self) -> Result<NativeFieldMap> {
        match &self.native_fields {
            None => Ok(NativeFieldMap::default()),
            Some(fields) => {
                if let Some((column, _)) = fields.iter().find(|(_, target)| target.trim().is_empty()) {
                    return Err(Error::Config(format!(
                        "Native field mapping for '{}' must be a non-empty attribute name",
                        column
                    )));
                }
                Ok(NativeFieldMap::new(
                    fields.iter().map(|(column, target)| (column.as_str(), target.as_str())),
                ))
            }
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
    /// `text` or `json`
    pub format: String,
    /// Log to stdout instead of stderr
    pub stdout: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            format: "text".to_string(),
            stdout: false,
        }
    }
}

/// SQL column names that should adopt a platform-native attribute instead of
/// becoming custom attributes. Lookups ignore case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NativeFieldMap {
    entries: BTreeMap<String, (String, String)>,
}

impl Default for NativeFieldMap {
    fn default() -> Self {
        Self::new(DEFAULT_NATIVE_FIELDS.iter().copied())
    }
}

impl NativeFieldMap {
    pub fn new<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let entries = pairs
            .into_iter()
            .map(|(column, target)| {
                (
                    column.to_lowercase(),
                    (column.to_string(), target.trim().to_lowercase()),
                )
            })
            .collect();
        Self { entries }
    }

    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Native attribute logical name for a SQL column
    pub fn get(&self, column: &str) -> Option<&str> {
        self.entries
            .get(&column.to_lowercase())
            .map(|(_, target)| target.as_str())
    }

    /// Every distinct native attribute a column may map onto (lowercase)
    pub fn targets(&self) -> BTreeSet<String> {
        self.entries
            .values()
            .map(|(_, target)| target.clone())
            .collect()
    }

    pub fn is_target(&self, logical_name: &str) -> bool {
        let name = logical_name.to_lowercase();
        self.entries.values().any(|(_, target)| *target == name)
    }

    /// `(column, native attribute)` pairs in column order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .values()
            .map(|(column, target)| (column.as_str(), target.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// SQL table name → entity logical name overrides. Lookups ignore case;
/// unmapped tables use their own name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableMap {
    entries: BTreeMap<String, (String, String)>,
}

impl TableMap {
    pub fn new<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let entries = pairs
            .into_iter()
            .map(|(table, entity)| {
                (
                    table.to_lowercase(),
                    (table.to_string(), entity.trim().to_string()),
                )
            })
            .collect();
        Self { entries }
    }

    pub fn get(&self, table: &str) -> Option<&str> {
        self.entries
            .get(&table.to_lowercase())
            .map(|(_, entity)| entity.as_str())
    }

    /// Entity logical name for a table
    pub fn entity_for(&self, table: &str) -> String {
        self.get(table).unwrap_or(table).to_string()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .values()
            .map(|(table, entity)| (table.as_str(), entity.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Parse the table-to-entity map: a JSON object of non-empty strings
pub fn parse_table_map(json: &str) -> Result<TableMap> {
    let root: Value = serde_json::from_str(json)
        .map_err(|e| Error::Config(format!("The mapping file did not contain valid JSON: {}", e)))?;

    let object = root.as_object().ok_or_else(|| {
        Error::Config(
            "The mapping file must be a JSON object with table-to-entity pairs.".to_string(),
        )
    })?;

    let mut pairs = Vec::with_capacity(object.len());
    for (table, value) in object {
        match value.as_str() {
            Some(entity) if !entity.trim().is_empty() => pairs.push((table.as_str(), entity)),
            _ => {
                return Err(Error::Config(format!(
                    "Mapping values must be non-empty strings (table '{}').",
                    table
                )))
            }
        }
    }

    Ok(TableMap::new(pairs))
}

/// Read the table-to-entity map; no path means an empty map
pub fn load_table_map(path: Option<&Path>) -> Result<TableMap> {
    let path = match path {
        Some(path) => path,
        None => return Ok(TableMap::default()),
    };

    if !path.is_file() {
        return Err(Error::Config(format!(
            "The mapping file '{}' could not be found.",
            path.display()
        )));
    }

    let content = fs::read_to_string(path)?;
    parse_table_map(&content)
}

/// Interpret the `DVSCHEMA_ALLOW_DROP` value: `1` or `true`, any case
pub fn environment_allows_drop(value: Option<&str>) -> bool {
    matches!(value.map(str::trim), Some(v) if v == "1" || v.eq_ignore_ascii_case("true"))
}

/// Read `DVSCHEMA_ALLOW_DROP` from the process environment
pub fn environment_allows_drop_from_env() -> bool {
    environment_allows_drop(std::env::var(ALLOW_DROP_ENV).ok().as_deref())
}

/// What a run is allowed to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    AnalyzeOnly,
    DryRun,
    Apply,
}

/// Validated, immutable options for one run
#[derive(Debug, Clone)]
pub struct ExecutionOptions {
    pub sql_path: PathBuf,
    pub report_path: PathBuf,
    pub table_map: TableMap,
    pub delete_candidates_path: PathBuf,
    pub solution_export_name: Option<String>,
    pub solution_export_dir: PathBuf,
    pub dry_run: bool,
    pub apply: bool,
    pub allow_drop: bool,
    pub environment_allows_drop: bool,
    pub connection: ConnectionSettings,
    pub metadata_snapshot: Option<PathBuf>,
}

impl ExecutionOptions {
    /// Validate flags against the filesystem. Fails before any remote
    /// interaction when an input file or the export directory is missing.
    pub fn resolve(args: &RunArgs, environment_allows_drop: bool) -> Result<Self> {
        if !args.sql.is_file() {
            return Err(Error::Config(format!(
                "The SQL schema file '{}' could not be found.",
                args.sql.display()
            )));
        }

        if !args.solution_export_dir.is_dir() {
            return Err(Error::Config(format!(
                "The solution export directory '{}' does not exist.",
                args.solution_export_dir.display()
            )));
        }

        if let Some(snapshot) = &args.metadata_snapshot {
            if args.apply {
                return Err(Error::Config(
                    "--apply needs live Dataverse metadata and cannot be combined with --metadata-snapshot."
                        .to_string(),
                ));
            }
            if !snapshot.is_file() {
                return Err(Error::Config(format!(
                    "The metadata snapshot '{}' could not be found.",
                    snapshot.display()
                )));
            }
        }

        let table_map = load_table_map(args.map.as_deref())?;

        Ok(Self {
            sql_path: args.sql.clone(),
            report_path: args.output.clone(),
            table_map,
            delete_candidates_path: args.delete_candidates.clone(),
            solution_export_name: args
                .solution_export
                .as_deref()
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string),
            solution_export_dir: args.solution_export_dir.clone(),
            dry_run: args.dry_run,
            apply: args.apply,
            allow_drop: args.allow_drop,
            environment_allows_drop,
            connection: ConnectionSettings {
                org_url: args.org_url.clone(),
                client_id: args.client_id.clone(),
                client_secret: args.client_secret.clone(),
                tenant_id: args.tenant_id.clone(),
            },
            metadata_snapshot: args.metadata_snapshot.clone(),
        })
    }

    /// Both the local flag and the environment must opt in
    pub fn drops_permitted(&self) -> bool {
        self.allow_drop && self.environment_allows_drop
    }

    pub fn requires_solution_export(&self) -> bool {
        self.solution_export_name.is_some()
    }

    pub fn mode(&self) -> RunMode {
        if self.apply {
            RunMode::Apply
        } else if self.dry_run {
            RunMode::DryRun
        } else {
            RunMode::AnalyzeOnly
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Write;

    fn sql_file(dir: &tempfile::TempDir) -> PathBuf {
        let path = dir.path().join("schema.sql");
        fs::write(&path, "CREATE TABLE t (id int);").unwrap();
        path
    }

    fn args(extra: &[&str]) -> RunArgs {
        let mut argv = vec!["dv_schema_sync"];
        argv.extend_from_slice(extra);
        RunArgs::parse_from(argv)
    }

    #[rstest]
    #[case(None, false)]
    #[case(Some("1"), true)]
    #[case(Some("true"), true)]
    #[case(Some("TRUE"), true)]
    #[case(Some(" True "), true)]
    #[case(Some("0"), false)]
    #[case(Some("yes"), false)]
    #[case(Some(""), false)]
    fn allow_drop_environment_values(#[case] value: Option<&str>, #[case] expected: bool) {
        assert_eq!(environment_allows_drop(value), expected);
    }

    #[rstest]
    #[case(false, false, false)]
    #[case(true, false, false)]
    #[case(false, true, false)]
    #[case(true, true, true)]
    fn drops_need_both_gates(#[case] flag: bool, #[case] env: bool, #[case] permitted: bool) {
        let dir = tempfile::tempdir().unwrap();
        let sql = sql_file(&dir);
        let sql = sql.to_str().unwrap();
        let mut argv = vec!["--sql", sql, "--apply"];
        if flag {
            argv.push("--allow-drop");
        }

        let options = ExecutionOptions::resolve(&args(&argv), env).unwrap();
        assert_eq!(options.drops_permitted(), permitted);
        assert_eq!(options.mode(), RunMode::Apply);
    }

    #[test]
    fn missing_sql_file_is_a_config_error() {
        let err = ExecutionOptions::resolve(&args(&["--sql", "/nonexistent/schema.sql"]), false)
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("could not be found"));
    }

    #[test]
    fn missing_export_dir_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let sql = sql_file(&dir);
        let err = ExecutionOptions::resolve(
            &args(&[
                "--sql",
                sql.to_str().unwrap(),
                "--solution-export",
                "Core",
                "--solution-export-dir",
                "/nonexistent/exports",
            ]),
            false,
        )
        .unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn apply_rejects_offline_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let sql = sql_file(&dir);
        let snapshot = dir.path().join("snapshot.json");
        std::fs::write(&snapshot, "[]").unwrap();
        let argv = [
            "--sql",
            sql.to_str().unwrap(),
            "--metadata-snapshot",
            snapshot.to_str().unwrap(),
        ];

        let mut with_apply = argv.to_vec();
        with_apply.push("--apply");
        let err = ExecutionOptions::resolve(&args(&with_apply), true).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("--metadata-snapshot"));

        let dry = ExecutionOptions::resolve(&args(&[argv.as_slice(), &["--dry-run"]].concat()), true)
            .unwrap();
        assert_eq!(dry.mode(), RunMode::DryRun);
    }

    #[test]
    fn resolves_defaults_and_modes() {
        let dir = tempfile::tempdir().unwrap();
        let sql = sql_file(&dir);
        let options =
            ExecutionOptions::resolve(&args(&["--sql", sql.to_str().unwrap()]), true).unwrap();

        assert_eq!(options.mode(), RunMode::AnalyzeOnly);
        assert_eq!(options.report_path, PathBuf::from(DEFAULT_REPORT_PATH));
        assert!(!options.requires_solution_export());
        assert!(!options.drops_permitted());

        let dry = ExecutionOptions::resolve(
            &args(&["--sql", sql.to_str().unwrap(), "--dry-run", "--solution-export", " "]),
            false,
        )
        .unwrap();
        assert_eq!(dry.mode(), RunMode::DryRun);
        assert!(!dry.requires_solution_export());
    }

    #[test]
    fn table_map_is_case_insensitive() {
        let map = parse_table_map(r#"{"Invoices": "cr8a1_invoice", "Engagements": "cr8a1_engagement"}"#)
            .unwrap();
        assert_eq!(map.get("invoices"), Some("cr8a1_invoice"));
        assert_eq!(map.entity_for("INVOICES"), "cr8a1_invoice");
        assert_eq!(map.entity_for("Widgets"), "Widgets");
    }

    #[rstest]
    #[case("[1, 2]", "JSON object")]
    #[case(r#"{"Invoices": 5}"#, "non-empty strings")]
    #[case(r#"{"Invoices": "  "}"#, "non-empty strings")]
    #[case("{not json", "valid JSON")]
    fn malformed_table_maps(#[case] json: &str, #[case] message: &str) {
        let err = parse_table_map(json).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains(message), "{}", err);
    }

    #[test]
    fn missing_map_file_is_a_config_error() {
        let err = load_table_map(Some(Path::new("/nonexistent/map.json"))).unwrap_err();
        assert!(err.to_string().contains("could not be found"));
        assert!(load_table_map(None).unwrap().is_empty());
    }

    #[test]
    fn default_native_map() {
        let map = NativeFieldMap::default();
        assert_eq!(map.get("createdat"), Some("createdon"));
        assert_eq!(map.get("AssignedTo"), Some("ownerid"));
        assert!(map.is_target("StateCode"));
        assert!(!map.is_target("name"));
        assert_eq!(map.len(), 12);
    }

    #[test]
    fn toml_config_overrides_native_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[logging]
level = "debug"
format = "json"

[native_fields]
CreatedOn = "createdon"
"#
        )
        .unwrap();

        let config = load_from_file(file.path()).unwrap();
        let logging = config.logging.clone().unwrap();
        assert_eq!(logging.level, "debug");
        assert!(!logging.stdout);

        let map = config.native_field_map().unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("createdon"), Some("createdon"));
        assert_eq!(map.get("CreatedAt"), None);
    }

    #[test]
    fn blank_native_target_is_rejected() {
        let config: SyncConfig = toml::from_str("[native_fields]\nCreatedAt = \"\"\n").unwrap();
        assert!(config.native_field_map().is_err());
    }
}
