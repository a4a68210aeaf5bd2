//! Provider-facing registration records.
//!
//! Providers describe a candidate with a [`ResourceSpec`]; validation turns
//! it into an [`InstallableResource`] with a parsed tag expression and a
//! computed fingerprint. Malformed specs are rejected synchronously, before
//! anything is queued for the coordinator.

use crate::fingerprint::Fingerprint;
use crate::tags::{TagExpr, TagExprError};
use crate::types::{DEFAULT_PRIORITY, EntityId, ResourceKind, ResourceUrl, Version};
use crate::value::{ConfigMap, Payload};
use bytes::Bytes;

/// Errors that reject a registration.
#[derive(thiserror::Error, Debug)]
pub enum RegistrationError {
    /// A required identifier (entity or url) is empty.
    #[error("Empty field: {0}")]
    EmptyField(&'static str),

    /// No payload, or a payload of the wrong kind.
    #[error("Resource {url} declares kind {kind} but carries no {kind} payload")]
    MissingPayload {
        /// The offending resource.
        url: ResourceUrl,
        /// The declared kind.
        kind: ResourceKind,
    },

    /// Artifacts are ordered by version, so they must carry one.
    #[error("Artifact resource {0} has no version")]
    MissingVersion(ResourceUrl),

    /// The activation condition does not parse.
    #[error("Invalid tag expression on {url}: {source}")]
    TagExpr {
        /// The offending resource.
        url: ResourceUrl,
        /// The grammar error.
        #[source]
        source: TagExprError,
    },

    /// The provider declared a digest that does not match the content.
    #[error("Declared digest {declared} does not match content {actual} for {url}")]
    DigestMismatch {
        /// The offending resource.
        url: ResourceUrl,
        /// What the provider declared.
        declared: String,
        /// What the content hashes to.
        actual: Fingerprint,
    },
}

/// An unvalidated registration as supplied by a provider.
#[derive(Debug, Clone)]
pub struct ResourceSpec {
    /// Logical entity this candidate competes for.
    pub entity: EntityId,
    /// Unique provenance of this candidate.
    pub url: ResourceUrl,
    /// Artifact or config.
    pub kind: ResourceKind,
    /// Higher wins.
    pub priority: i32,
    /// Required for artifacts; ignored for configs.
    pub version: Option<Version>,
    /// The desired content.
    pub payload: Option<Payload>,
    /// Raw tag expression; empty means unconditional.
    pub tags: String,
    /// Optional provider-declared digest (`sha256:<hex>` or bare hex).
    pub digest: Option<String>,
    /// Where the payload was sourced from; defaults to the url.
    pub data_uri: Option<String>,
    /// Derived reference to another resource's `data_uri`.
    pub alias_of: Option<String>,
}

impl ResourceSpec {
    /// An artifact candidate with default priority and no condition.
    pub fn artifact(
        entity: impl Into<EntityId>,
        url: impl Into<ResourceUrl>,
        version: &str,
        bytes: impl Into<Bytes>,
    ) -> Self {
        Self {
            entity: entity.into(),
            url: url.into(),
            kind: ResourceKind::Artifact,
            priority: DEFAULT_PRIORITY,
            version: Some(Version::new(version)),
            payload: Some(Payload::Bytes(bytes.into())),
            tags: String::new(),
            digest: None,
            data_uri: None,
            alias_of: None,
        }
    }

    /// A config candidate with default priority and no condition.
    pub fn config(
        entity: impl Into<EntityId>,
        url: impl Into<ResourceUrl>,
        map: ConfigMap,
    ) -> Self {
        Self {
            entity: entity.into(),
            url: url.into(),
            kind: ResourceKind::Config,
            priority: DEFAULT_PRIORITY,
            version: None,
            payload: Some(Payload::Config(map)),
            tags: String::new(),
            digest: None,
            data_uri: None,
            alias_of: None,
        }
    }

    /// Set the priority.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Set the activation condition.
    pub fn with_tags(mut self, expr: impl Into<String>) -> Self {
        self.tags = expr.into();
        self
    }

    /// Declare the expected digest of the payload.
    pub fn with_digest(mut self, digest: impl Into<String>) -> Self {
        self.digest = Some(digest.into());
        self
    }

    /// Record where the payload was sourced from.
    pub fn with_data_uri(mut self, uri: impl Into<String>) -> Self {
        self.data_uri = Some(uri.into());
        self
    }

    /// Mark this resource as derived from another resource's data.
    pub fn with_alias_of(mut self, uri: impl Into<String>) -> Self {
        self.alias_of = Some(uri.into());
        self
    }

    /// Validate and fingerprint the spec.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError`] if an identifier is empty, the payload
    /// is missing or of the wrong kind, an artifact has no version, the tag
    /// expression does not parse, or a declared digest does not match.
    pub fn validate(self) -> Result<InstallableResource, RegistrationError> {
        if self.entity.is_empty() {
            return Err(RegistrationError::EmptyField("entity"));
        }
        if self.url.is_empty() {
            return Err(RegistrationError::EmptyField("url"));
        }

        let payload = match self.payload {
            Some(p) if p.kind() == self.kind && !(p.kind() == ResourceKind::Artifact && p.is_empty()) => p,
            _ => {
                return Err(RegistrationError::MissingPayload {
                    url: self.url,
                    kind: self.kind,
                });
            }
        };

        let version = match (self.kind, self.version) {
            (ResourceKind::Artifact, None) => {
                return Err(RegistrationError::MissingVersion(self.url));
            }
            (_, version) => version,
        };

        let tags = match TagExpr::parse(&self.tags) {
            Ok(expr) => expr,
            Err(source) => {
                return Err(RegistrationError::TagExpr {
                    url: self.url,
                    source,
                });
            }
        };

        let fingerprint = Fingerprint::of(&payload);
        if let Some(declared) = self.digest {
            if !digest_matches(&declared, &fingerprint) {
                return Err(RegistrationError::DigestMismatch {
                    url: self.url,
                    declared,
                    actual: fingerprint,
                });
            }
        }

        let data_uri = self
            .data_uri
            .unwrap_or_else(|| self.url.as_str().to_string());

        Ok(InstallableResource {
            entity: self.entity,
            url: self.url,
            kind: self.kind,
            priority: self.priority,
            version,
            payload,
            fingerprint,
            tags,
            data_uri,
            alias_of: self.alias_of,
        })
    }
}

/// Accepts `sha256:<hex>`, `blake3:<hex>` or bare hex, case-insensitively.
fn digest_matches(declared: &str, actual: &Fingerprint) -> bool {
    let declared = declared.trim().to_ascii_lowercase();
    if declared.contains(':') {
        return declared == actual.as_str();
    }
    actual
        .as_str()
        .split_once(':')
        .is_some_and(|(_, hex)| hex == declared)
}

/// A validated, fingerprinted registration ready to be queued.
#[derive(Debug, Clone)]
pub struct InstallableResource {
    /// Logical entity this candidate competes for.
    pub entity: EntityId,
    /// Unique provenance of this candidate.
    pub url: ResourceUrl,
    /// Artifact or config.
    pub kind: ResourceKind,
    /// Higher wins.
    pub priority: i32,
    /// Present for every artifact.
    pub version: Option<Version>,
    /// The desired content.
    pub payload: Payload,
    /// Content digest of `payload`.
    pub fingerprint: Fingerprint,
    /// Parsed activation condition.
    pub tags: TagExpr,
    /// Where the payload was sourced from.
    pub data_uri: String,
    /// Derived reference to another resource's `data_uri`.
    pub alias_of: Option<String>,
}
