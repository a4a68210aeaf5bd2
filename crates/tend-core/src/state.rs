//! Published view of the installation, for polling and await-based
//! observation of convergence.

use serde::Serialize;
use tend_schema::{
    ActiveTags, EntityId, Fingerprint, ResourceKind, ResourceState, ResourceUrl, Version,
};

/// A resource as reported to listeners and state observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceSnapshot {
    pub entity: EntityId,
    pub url: ResourceUrl,
    pub kind: ResourceKind,
    pub priority: i32,
    pub version: Option<Version>,
    pub fingerprint: Fingerprint,
    pub state: ResourceState,
    pub error: Option<String>,
}

/// Everything the coordinator knows after a cycle.
#[derive(Debug, Clone, Default, Serialize)]
pub struct InstallationState {
    /// Completed cycles.
    pub cycle: u64,
    /// Intake messages merged so far.
    pub merged: u64,
    /// Groups still needing work (failed, deferred or not yet planned).
    pub pending: usize,
    pub tags: ActiveTags,
    /// The active resource of every group.
    pub active: Vec<ResourceSnapshot>,
    pub shadowed: Vec<ResourceSnapshot>,
}

impl InstallationState {
    /// No group has outstanding work.
    pub fn is_converged(&self) -> bool {
        self.pending == 0
    }

    /// Look up a resource by url, active or shadowed.
    pub fn find(&self, url: &str) -> Option<&ResourceSnapshot> {
        self.active
            .iter()
            .chain(&self.shadowed)
            .find(|r| r.url.as_str() == url)
    }

    pub fn errors(&self) -> impl Iterator<Item = &ResourceSnapshot> {
        self.active
            .iter()
            .chain(&self.shadowed)
            .filter(|r| r.state == ResourceState::Error)
    }
}
