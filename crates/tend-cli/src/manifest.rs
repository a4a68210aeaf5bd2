//! Desired-state manifest parsing.
//!
//! A manifest (`tend.toml`) carries the engine settings and the resources
//! to converge:
//!
//! ```toml
//! [engine]
//! tags = ["prod"]
//!
//! [[resource]]
//! kind = "config"
//! entity = "db"
//! priority = 20
//! tags = "prod"
//! config = { host = "prod.db", port = 5432 }
//!
//! [[resource]]
//! kind = "artifact"
//! entity = "tool"
//! version = "1.2.0"
//! path = "dist/tool.bin"
//! ```
//!
//! Artifact paths are relative to the manifest's directory.

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tend_core::EngineConfig;
use tend_schema::{ConfigMap, ResourceKind, ResourceSpec};
use tokio::fs;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default, rename = "resource")]
    pub resources: Vec<ResourceEntry>,
}

/// One `[[resource]]` table.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceEntry {
    pub kind: ResourceKind,
    pub entity: String,
    /// Defaults to `<manifest path>#<kind>/<entity>`, with `@<n>` appended
    /// for the n-th further entry of the same kind and entity.
    pub url: Option<String>,
    pub priority: Option<i32>,
    pub version: Option<String>,
    #[serde(default)]
    pub tags: String,
    pub digest: Option<String>,
    /// Artifact content read from a file.
    pub path: Option<PathBuf>,
    /// Inline artifact content.
    pub content: Option<String>,
    /// Config payload.
    pub config: Option<ConfigMap>,
    pub alias_of: Option<String>,
}

impl Manifest {
    /// Load and parse a manifest.
    pub async fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Turn every entry into a registration, reading artifact files
    /// relative to the manifest's directory.
    pub async fn resource_specs(&self, manifest: &Path) -> Result<Vec<ResourceSpec>> {
        let base_dir = manifest.parent().unwrap_or_else(|| Path::new("."));
        let mut specs = Vec::with_capacity(self.resources.len());
        let mut seen: HashMap<(ResourceKind, &str), usize> = HashMap::new();
        for entry in &self.resources {
            let occurrence = seen.entry((entry.kind, entry.entity.as_str())).or_default();
            let repeat = *occurrence;
            *occurrence += 1;
            let url = entry.url.clone().unwrap_or_else(|| match repeat {
                0 => format!("{}#{}/{}", manifest.display(), entry.kind, entry.entity),
                n => format!("{}#{}/{}@{n}", manifest.display(), entry.kind, entry.entity),
            });
            let mut spec = match entry.kind {
                ResourceKind::Artifact => {
                    let bytes = match (&entry.path, &entry.content) {
                        (Some(path), None) => {
                            let full = base_dir.join(path);
                            fs::read(&full)
                                .await
                                .with_context(|| format!("Failed to read {}", full.display()))?
                        }
                        (None, Some(content)) => content.clone().into_bytes(),
                        _ => bail!(
                            "Artifact '{}' needs exactly one of `path` or `content`",
                            entry.entity
                        ),
                    };
                    let Some(version) = &entry.version else {
                        bail!("Artifact '{}' has no version", entry.entity);
                    };
                    ResourceSpec::artifact(entry.entity.as_str(), url, version, bytes)
                }
                ResourceKind::Config => {
                    let Some(map) = &entry.config else {
                        bail!("Config '{}' has no `config` table", entry.entity);
                    };
                    ResourceSpec::config(entry.entity.as_str(), url, map.clone())
                }
            };
            if let Some(priority) = entry.priority {
                spec = spec.with_priority(priority);
            }
            spec = spec.with_tags(entry.tags.clone());
            if let Some(digest) = &entry.digest {
                spec = spec.with_digest(digest.clone());
            }
            if let Some(path) = &entry.path {
                spec = spec.with_data_uri(format!("file:{}", base_dir.join(path).display()));
            }
            if let Some(alias) = &entry.alias_of {
                spec = spec.with_alias_of(alias.clone());
            }
            specs.push(spec);
        }
        Ok(specs)
    }
}

/// Read a TOML file as a flat configuration map.
pub async fn load_config_map(path: &Path) -> Result<ConfigMap> {
    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("{} is not a flat key/value table", path.display()))
}
