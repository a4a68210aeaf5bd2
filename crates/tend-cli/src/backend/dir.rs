//! Directory-backed apply-backend.
//!
//! ```text
//! <root>/
//! ├── artifacts/<entity>          # artifact bytes
//! ├── config/<entity>.json        # config maps as JSON
//! └── .tend/<kind>/<entity>.json  # sidecar: version, marker, owned
//! ```
//!
//! The sidecar is what makes an instance "owned": files without one were
//! put there by someone else and are reported as foreign. Entity ids are
//! percent-encoded into file names.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tend_core::{ApplyBackend, ApplyError, Observation, Resource};
use tend_schema::serializer::{ConfigSerializer, JsonSerializer};
use tend_schema::{EntityId, Fingerprint, Payload, ResourceKind, Version};
use tokio::fs;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Sidecar {
    version: Option<Version>,
    marker: Fingerprint,
    owned: bool,
}

#[derive(Debug, Clone)]
pub struct DirBackend {
    root: PathBuf,
    kind: ResourceKind,
}

impl DirBackend {
    pub fn new(root: impl Into<PathBuf>, kind: ResourceKind) -> Self {
        Self {
            root: root.into(),
            kind,
        }
    }

    /// Where the runtime copy of `entity` lives.
    pub fn data_path(&self, entity: &str) -> PathBuf {
        let name = file_name(entity);
        match self.kind {
            ResourceKind::Artifact => self.root.join("artifacts").join(name),
            ResourceKind::Config => self.root.join("config").join(format!("{name}.json")),
        }
    }

    fn sidecar_path(&self, entity: &str) -> PathBuf {
        self.root
            .join(".tend")
            .join(self.kind.as_str())
            .join(format!("{}.json", file_name(entity)))
    }

    async fn write(&self, resource: &Resource) -> Result<(), ApplyError> {
        let bytes = match &resource.payload {
            Payload::Bytes(bytes) => bytes.to_vec(),
            Payload::Config(map) => JsonSerializer.to_bytes(map)?,
        };
        write_file(&self.data_path(&resource.entity), &bytes).await?;

        let sidecar = Sidecar {
            version: resource.version.clone(),
            marker: resource.fingerprint.clone(),
            owned: true,
        };
        let json = serde_json::to_vec_pretty(&sidecar)?;
        write_file(&self.sidecar_path(&resource.entity), &json).await
    }
}

#[async_trait]
impl ApplyBackend for DirBackend {
    async fn observe(&self, entity: &EntityId) -> Result<Observation, ApplyError> {
        let data = self.data_path(entity);
        if !fs::try_exists(&data).await? {
            return Ok(Observation::Absent);
        }

        match fs::read(self.sidecar_path(entity)).await {
            Ok(raw) => {
                let sidecar: Sidecar = serde_json::from_slice(&raw)?;
                Ok(Observation::Present {
                    version: sidecar.version,
                    owned: sidecar.owned,
                    marker: Some(sidecar.marker),
                })
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                let marker = match self.kind {
                    ResourceKind::Artifact => Some(Fingerprint::of_bytes(&fs::read(&data).await?)),
                    ResourceKind::Config => None,
                };
                Ok(Observation::Present {
                    version: None,
                    owned: false,
                    marker,
                })
            }
            Err(e) => Err(ApplyError::context("Failed to read sidecar", e)),
        }
    }

    async fn install(&self, resource: &Resource) -> Result<(), ApplyError> {
        self.write(resource).await
    }

    async fn update(&self, resource: &Resource) -> Result<(), ApplyError> {
        self.write(resource).await
    }

    async fn remove(&self, entity: &EntityId) -> Result<(), ApplyError> {
        remove_file(&self.data_path(entity)).await?;
        remove_file(&self.sidecar_path(entity)).await
    }
}

/// Map an entity id onto a single file name, one-to-one.
///
/// Everything outside `A-Za-z0-9-._~` is percent-encoded, `%` included, so
/// distinct ids never share a file. A leading `.` is encoded as well to keep
/// `.`, `..` and hidden names out of the tree.
fn file_name(entity: &str) -> String {
    let encoded = urlencoding::encode(entity);
    match encoded.strip_prefix('.') {
        Some(rest) => format!("%2E{rest}"),
        None => encoded.into_owned(),
    }
}

async fn write_file(path: &Path, bytes: &[u8]) -> Result<(), ApplyError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    // Write beside the target and rename, so readers never see half a file.
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    fs::write(&tmp, bytes).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}

async fn remove_file(path: &Path) -> Result<(), ApplyError> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
