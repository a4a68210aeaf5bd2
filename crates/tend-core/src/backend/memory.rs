//! In-memory apply-backend.
//!
//! Holds the "runtime" in a map. Used by the test suites and by
//! `tend apply --dry-run`; supports injected failures and records every
//! call so callers can assert on ordering.

use super::{ApplyBackend, Observation};
use crate::error::ApplyError;
use crate::resource::Resource;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use tend_schema::{EntityId, Fingerprint, Payload, ResourceUrl, Version};

/// What the in-memory runtime holds for one entity.
#[derive(Debug, Clone)]
pub struct Installed {
    pub version: Option<Version>,
    pub marker: Fingerprint,
    pub owned: bool,
    pub payload: Option<Payload>,
}

/// A call the backend received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Install(ResourceUrl),
    Update(ResourceUrl),
    Remove(EntityId),
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<EntityId, Installed>,
    failures: HashMap<EntityId, usize>,
    observe_failures: HashMap<EntityId, usize>,
    calls: Vec<Call>,
}

#[derive(Debug, Default)]
pub struct MemoryBackend {
    inner: Mutex<Inner>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make the next `times` install/update/remove calls for `entity` fail.
    pub fn fail_next(&self, entity: impl Into<EntityId>, times: usize) {
        self.lock().failures.insert(entity.into(), times);
    }

    /// Make the next `times` observations of `entity` fail.
    pub fn fail_observe(&self, entity: impl Into<EntityId>, times: usize) {
        self.lock().observe_failures.insert(entity.into(), times);
    }

    /// Put an instance into the runtime behind the engine's back.
    pub fn insert(&self, entity: impl Into<EntityId>, installed: Installed) {
        self.lock().entries.insert(entity.into(), installed);
    }

    pub fn get(&self, entity: &str) -> Option<Installed> {
        self.lock().entries.get(entity).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    fn record(&self, call: Call, entity: &EntityId) -> Result<(), ApplyError> {
        let mut inner = self.lock();
        inner.calls.push(call);
        if let Some(remaining) = inner.failures.get_mut(entity) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(ApplyError::Failed(format!("injected failure for {entity}")));
            }
        }
        Ok(())
    }

    fn store(&self, resource: &Resource) {
        self.lock().entries.insert(
            resource.entity.clone(),
            Installed {
                version: resource.version.clone(),
                marker: resource.fingerprint.clone(),
                owned: true,
                payload: Some(resource.payload.clone()),
            },
        );
    }
}

#[async_trait]
impl ApplyBackend for MemoryBackend {
    async fn observe(&self, entity: &EntityId) -> Result<Observation, ApplyError> {
        let mut inner = self.lock();
        if let Some(remaining) = inner.observe_failures.get_mut(entity) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(ApplyError::Failed(format!("{entity} cannot be read")));
            }
        }
        Ok(match inner.entries.get(entity) {
            Some(installed) => Observation::Present {
                version: installed.version.clone(),
                owned: installed.owned,
                marker: Some(installed.marker.clone()),
            },
            None => Observation::Absent,
        })
    }

    async fn install(&self, resource: &Resource) -> Result<(), ApplyError> {
        self.record(Call::Install(resource.url.clone()), &resource.entity)?;
        self.store(resource);
        Ok(())
    }

    async fn update(&self, resource: &Resource) -> Result<(), ApplyError> {
        self.record(Call::Update(resource.url.clone()), &resource.entity)?;
        self.store(resource);
        Ok(())
    }

    async fn remove(&self, entity: &EntityId) -> Result<(), ApplyError> {
        self.record(Call::Remove(entity.clone()), entity)?;
        self.lock().entries.remove(entity);
        Ok(())
    }
}
