//! Metadata sources

use async_trait::async_trait;
use std::fs;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::remote::metadata::{EntityMetadata, MetadataResult, MetadataSnapshot};

/// Supplies entity metadata for a set of logical names.
///
/// An unreachable service is reported as [`MetadataResult::Unavailable`], not
/// as an error. Errors are reserved for cancellation and local failures.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn load(
        &self,
        entity_names: &[String],
        cancel: &CancellationToken,
    ) -> Result<MetadataResult>;
}

/// Trim, drop blanks and de-duplicate (case-insensitively), keeping first-seen order
pub fn normalize_entity_names(names: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    names
        .iter()
        .map(|name| name.trim())
        .filter(|name| !name.is_empty())
        .filter(|name| seen.insert(name.to_lowercase()))
        .map(str::to_string)
        .collect()
}

/// Metadata previously exported to a JSON file (an array of entities)
#[derive(Debug, Clone)]
pub struct SnapshotFileSource {
    path: PathBuf,
    org_url: Option<String>,
}

impl SnapshotFileSource {
    pub fn new(path: impl AsRef<Path>, org_url: Option<String>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            org_url,
        }
    }

    fn read(&self) -> Result<Vec<EntityMetadata>> {
        let content = fs::read_to_string(&self.path).map_err(|e| {
            Error::Config(format!(
                "Failed to read metadata snapshot '{}': {}",
                self.path.display(),
                e
            ))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            Error::Config(format!(
                "Metadata snapshot '{}' is not a JSON array of entities: {}",
                self.path.display(),
                e
            ))
        })
    }
}

#[async_trait]
impl MetadataSource for SnapshotFileSource {
    async fn load(
        &self,
        entity_names: &[String],
        cancel: &CancellationToken,
    ) -> Result<MetadataResult> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let all = MetadataSnapshot::new(None, self.read()?, Vec::new());
        let requested = normalize_entity_names(entity_names);
        let entities: Vec<EntityMetadata> = requested
            .iter()
            .filter_map(|name| all.entity(name).cloned())
            .collect();

        tracing::info!(
            path = %self.path.display(),
            requested = requested.len(),
            found = entities.len(),
            "Loaded metadata snapshot"
        );

        Ok(MetadataResult::Connected(MetadataSnapshot::new(
            self.org_url.clone(),
            entities,
            Vec::new(),
        )))
    }
}
