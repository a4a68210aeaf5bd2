//! Apply-backends: the narrow interface through which the engine changes
//! the managed runtime.
//!
//! One backend serves one [`ResourceKind`]. The engine never interprets
//! payloads; a backend reports what the runtime holds for an entity and
//! applies install, update and remove on request.

pub mod memory;

pub use memory::MemoryBackend;

use crate::error::ApplyError;
use crate::resource::Resource;
use crate::signal::RetrySignal;
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tend_schema::{EntityId, Fingerprint, ResourceKind, Version};

/// What the runtime currently holds for an entity.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Observation {
    #[default]
    Absent,
    Present {
        version: Option<Version>,
        /// The instance was put there by this engine.
        owned: bool,
        /// Fingerprint of the content the runtime holds, if known.
        marker: Option<Fingerprint>,
    },
}

impl Observation {
    /// The runtime holds an owned instance of exactly this resource.
    pub fn holds(&self, resource: &Resource) -> bool {
        match self {
            Self::Absent => false,
            Self::Present {
                version,
                owned,
                marker,
            } => {
                *owned
                    && (marker.as_ref() == Some(&resource.fingerprint)
                        || (resource.kind == ResourceKind::Artifact
                            && version.is_some()
                            && *version == resource.version))
            }
        }
    }
}

#[async_trait]
pub trait ApplyBackend: Send + Sync {
    async fn observe(&self, entity: &EntityId) -> Result<Observation, ApplyError>;

    async fn install(&self, resource: &Resource) -> Result<(), ApplyError>;

    async fn update(&self, resource: &Resource) -> Result<(), ApplyError>;

    async fn remove(&self, entity: &EntityId) -> Result<(), ApplyError>;
}

/// Backends available per kind.
///
/// Registering or replacing a backend fires the retry signal, and the
/// coordinator re-plans every group of that kind on its next merge.
/// Without a backend, work for the kind is deferred, never dropped.
pub struct BackendRegistry {
    backends: RwLock<HashMap<ResourceKind, Arc<dyn ApplyBackend>>>,
    newly_available: Mutex<BTreeSet<ResourceKind>>,
    signal: RetrySignal,
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kinds: Vec<ResourceKind> = self
            .backends
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect();
        f.debug_struct("BackendRegistry")
            .field("kinds", &kinds)
            .finish_non_exhaustive()
    }
}

impl BackendRegistry {
    pub fn new(signal: RetrySignal) -> Self {
        Self {
            backends: RwLock::new(HashMap::new()),
            newly_available: Mutex::new(BTreeSet::new()),
            signal,
        }
    }

    pub fn signal(&self) -> &RetrySignal {
        &self.signal
    }

    // Poisoned guards are recovered: every write is a single insert or remove.
    pub fn register(&self, kind: ResourceKind, backend: Arc<dyn ApplyBackend>) {
        self.backends
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(kind, backend);
        self.newly_available
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(kind);
        tracing::info!("Backend available for {kind}");
        self.signal.fire();
    }

    pub fn unregister(&self, kind: ResourceKind) -> Option<Arc<dyn ApplyBackend>> {
        let removed = self
            .backends
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&kind);
        if removed.is_some() {
            tracing::info!("Backend for {kind} withdrawn");
        }
        removed
    }

    pub fn get(&self, kind: ResourceKind) -> Option<Arc<dyn ApplyBackend>> {
        self.backends
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .cloned()
    }

    /// Kinds whose backend appeared since the last call.
    pub fn take_newly_available(&self) -> BTreeSet<ResourceKind> {
        std::mem::take(&mut *self.newly_available.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tend_schema::ResourceSpec;

    fn artifact(version: &str, content: &[u8]) -> Resource {
        let spec = ResourceSpec::artifact("tool", "file:tool", version, content.to_vec());
        Resource::new(spec.validate().unwrap(), 0)
    }

    #[test]
    fn holds_requires_ownership_and_a_match() {
        let res = artifact("1.0", b"one");
        let owned = |version: &str, marker: Option<Fingerprint>| Observation::Present {
            version: Some(Version::new(version)),
            owned: true,
            marker,
        };

        assert!(owned("1.0", None).holds(&res));
        assert!(owned("2.0", Some(res.fingerprint.clone())).holds(&res));
        assert!(!owned("2.0", None).holds(&res));
        assert!(
            !Observation::Present {
                version: Some(Version::new("1.0")),
                owned: false,
                marker: Some(res.fingerprint.clone()),
            }
            .holds(&res)
        );
        assert!(!Observation::Absent.holds(&res));
    }

    #[tokio::test]
    async fn registering_a_backend_fires_the_signal() {
        let registry = BackendRegistry::new(RetrySignal::new());
        assert!(registry.get(ResourceKind::Config).is_none());

        registry.register(ResourceKind::Config, Arc::new(MemoryBackend::new()));
        tokio::time::timeout(std::time::Duration::from_millis(100), registry.signal().notified())
            .await
            .unwrap();

        assert!(registry.get(ResourceKind::Config).is_some());
        assert_eq!(
            registry.take_newly_available().into_iter().collect::<Vec<_>>(),
            [ResourceKind::Config]
        );
        assert!(registry.take_newly_available().is_empty());

        assert!(registry.unregister(ResourceKind::Config).is_some());
        assert!(registry.get(ResourceKind::Config).is_none());
    }
}
