//! The engine's view of one registered candidate.

use crate::state::ResourceSnapshot;
use tend_schema::{
    EntityId, Fingerprint, InstallableResource, Payload, ResourceKind, ResourceState,
    ResourceUrl, TagExpr, Version,
};

/// Identifies an entity group: the kind and the entity it competes for.
///
/// Artifacts and configs live in separate namespaces, so `artifact:db` and
/// `config:db` are different groups.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupKey {
    pub kind: ResourceKind,
    pub entity: EntityId,
}

impl GroupKey {
    pub fn new(kind: ResourceKind, entity: impl Into<EntityId>) -> Self {
        Self {
            kind,
            entity: entity.into(),
        }
    }
}

impl std::fmt::Display for GroupKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.entity)
    }
}

/// A registered candidate plus its lifecycle bookkeeping.
///
/// Identity and content are public; lifecycle fields are only changed by
/// the coordinator.
#[derive(Debug, Clone)]
pub struct Resource {
    pub entity: EntityId,
    pub url: ResourceUrl,
    pub kind: ResourceKind,
    pub priority: i32,
    pub version: Option<Version>,
    pub payload: Payload,
    pub fingerprint: Fingerprint,
    pub tags: TagExpr,
    pub data_uri: String,
    pub alias_of: Option<String>,
    state: ResourceState,
    error: Option<String>,
    /// Set once this engine put the resource's content into the runtime.
    applied: bool,
    /// The provider withdrew the resource.
    withdrawn: bool,
    sequence: u64,
}

impl Resource {
    pub(crate) fn new(res: InstallableResource, sequence: u64) -> Self {
        Self {
            entity: res.entity,
            url: res.url,
            kind: res.kind,
            priority: res.priority,
            version: res.version,
            payload: res.payload,
            fingerprint: res.fingerprint,
            tags: res.tags,
            data_uri: res.data_uri,
            alias_of: res.alias_of,
            state: ResourceState::Install,
            error: None,
            applied: false,
            withdrawn: false,
            sequence,
        }
    }

    pub fn key(&self) -> GroupKey {
        GroupKey::new(self.kind, self.entity.clone())
    }

    pub fn state(&self) -> ResourceState {
        self.state
    }

    /// Message of the last failed apply, while in `ERROR`.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_applied(&self) -> bool {
        self.applied
    }

    pub fn is_withdrawn(&self) -> bool {
        self.withdrawn
    }

    /// Registration order within the registry.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn snapshot(&self) -> ResourceSnapshot {
        ResourceSnapshot {
            entity: self.entity.clone(),
            url: self.url.clone(),
            kind: self.kind,
            priority: self.priority,
            version: self.version.clone(),
            fingerprint: self.fingerprint.clone(),
            state: self.state,
            error: self.error.clone(),
        }
    }

    pub(crate) fn set_state(&mut self, state: ResourceState) {
        self.state = state;
        self.error = None;
    }

    pub(crate) fn set_applied(&mut self, applied: bool) {
        self.applied = applied;
    }

    pub(crate) fn fail(&mut self, message: impl Into<String>) {
        self.state = ResourceState::Error;
        self.error = Some(message.into());
    }

    pub(crate) fn withdraw(&mut self) {
        self.withdrawn = true;
        self.state = ResourceState::Uninstall;
        self.error = None;
    }

    /// Undo a withdrawal after the same content was registered again.
    pub(crate) fn revive(&mut self) {
        self.withdrawn = false;
        self.state = if self.applied {
            ResourceState::Installed
        } else {
            ResourceState::Install
        };
        self.error = None;
    }

    /// Take new content for the same url. Lifecycle restarts at `INSTALL`;
    /// `applied` is kept so the old runtime copy is still accounted for.
    pub(crate) fn replace(&mut self, res: InstallableResource) {
        self.priority = res.priority;
        self.version = res.version;
        self.payload = res.payload;
        self.fingerprint = res.fingerprint;
        self.tags = res.tags;
        self.data_uri = res.data_uri;
        self.alias_of = res.alias_of;
        self.state = ResourceState::Install;
        self.error = None;
        self.withdrawn = false;
    }
}
