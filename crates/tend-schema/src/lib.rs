//! Shared vocabulary for the tend reconciliation engine.
//!
//! Everything a provider needs to describe desired state lives here:
//! identifiers, versions, payloads, fingerprints, tag expressions and the
//! registration record itself. The engine in `tend-core` and the `tend`
//! binary both build on these types.

/// Content fingerprints of resource payloads.
pub mod fingerprint;
pub mod resource;
pub mod serializer;
pub mod tags;
/// Identifiers, versions, kinds and lifecycle states.
pub mod types;
pub mod value;

// Re-exports
pub use fingerprint::Fingerprint;
pub use resource::{InstallableResource, RegistrationError, ResourceSpec};
pub use serializer::{ConfigSerializer, Format, serializer};
pub use tags::{ActiveTags, TagExpr, TagExprError};
pub use types::*;
pub use value::{ConfigMap, ConfigValue, Payload};
