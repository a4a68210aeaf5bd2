use serde::{Deserialize, Serialize};
use std::borrow::Borrow;

/// Default priority for resources registered without an explicit one.
///
/// Sits in the middle of the usual provider range so that providers can
/// register both overrides (higher) and fallbacks (lower).
pub const DEFAULT_PRIORITY: i32 = 100;

/// Identity shared by every competing candidate for one logical thing
/// (e.g. "the configuration named X").
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Create a new entity id. Entity ids are case-sensitive and stored as-is.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Return the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::ops::Deref for EntityId {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<str> for EntityId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for EntityId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for EntityId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl PartialEq<str> for EntityId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for EntityId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Unique identifier of one specific candidate's provenance.
///
/// Two registrations with the same url are the same candidate; a second
/// registration is an update of the first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceUrl(String);

impl ResourceUrl {
    /// Create a new resource url (stored as-is).
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    /// Return the url as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ResourceUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::ops::Deref for ResourceUrl {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<str> for ResourceUrl {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ResourceUrl {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ResourceUrl {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ResourceUrl {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl PartialEq<&str> for ResourceUrl {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// A version string, ordered semantically where possible.
///
/// Parsing is lenient: `1.0` is read as `1.0.0` and a trailing dotted
/// qualifier (`2.0.7.SNAPSHOT`) is read as a pre-release (`2.0.7-SNAPSHOT`).
/// Versions that still cannot be parsed sort after all parseable ones and
/// are compared as plain strings among themselves.
///
/// Equality follows the ordering, so `1.0` and `1.0.0` are equal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(String);

impl Version {
    /// Create a new version from the given string (stored as-is).
    pub fn new(v: &str) -> Self {
        Self(v.to_string())
    }

    /// Return the version string as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is a development snapshot (`-SNAPSHOT` / `.SNAPSHOT`).
    ///
    /// Snapshots may change content without changing version, so an equal
    /// version does not imply equal content.
    pub fn is_snapshot(&self) -> bool {
        self.0.to_ascii_uppercase().ends_with("SNAPSHOT")
    }

    /// The semantic version this string denotes, if any.
    pub fn semver(&self) -> Option<semver::Version> {
        semver::Version::parse(&self.0)
            .ok()
            .or_else(|| lenient_semver(&self.0))
    }
}

fn lenient_semver(raw: &str) -> Option<semver::Version> {
    let (core, pre) = match raw.split_once('-') {
        Some((core, pre)) => (core, Some(pre)),
        None => (raw, None),
    };

    let mut numbers = [0u64; 3];
    let mut count = 0;
    let mut qualifier = Vec::new();
    for part in core.split('.') {
        if count < numbers.len() && qualifier.is_empty() {
            if let Ok(n) = part.parse::<u64>() {
                numbers[count] = n;
                count += 1;
                continue;
            }
        }
        qualifier.push(part);
    }
    if count == 0 {
        return None;
    }

    let pre = match (qualifier.is_empty(), pre) {
        (true, None) => None,
        (true, Some(p)) => Some(p.to_string()),
        (false, None) => Some(qualifier.join(".")),
        (false, Some(p)) => Some(format!("{}-{p}", qualifier.join("."))),
    };
    let [major, minor, patch] = numbers;
    let text = match pre {
        Some(p) => format!("{major}.{minor}.{patch}-{p}"),
        None => format!("{major}.{minor}.{patch}"),
    };
    semver::Version::parse(&text).ok()
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        match (self.semver(), other.semver()) {
            (Some(a), Some(b)) => a.cmp(&b),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == std::cmp::Ordering::Equal
    }
}

impl Eq for Version {}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Version {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Version {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Version {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// The kind of installable a resource describes.
///
/// Each kind has exactly one task factory and at most one apply-backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    /// A deployable package: opaque bytes plus a version.
    Artifact,
    /// A configuration record: an ordered key/value map.
    Config,
}

impl ResourceKind {
    /// Every kind, in a stable order.
    pub const ALL: [ResourceKind; 2] = [ResourceKind::Artifact, ResourceKind::Config];

    /// Lowercase name used in manifests and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Artifact => "artifact",
            Self::Config => "config",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of one resource.
///
/// ```text
/// INSTALL --> INSTALLED --> UNINSTALL --> UNINSTALLED (purged)
///    |  ^                                      ^
///    v  |                                      |
///  IGNORED / ERROR ----------------------------+
/// ```
///
/// Only the coordinator moves a resource between states; providers can
/// only register (which resets to `Install` on a content change) or
/// withdraw (which marks `Uninstall`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResourceState {
    /// Desired but not yet applied.
    #[default]
    Install,
    /// Applied and confirmed.
    Installed,
    /// Marked for removal.
    Uninstall,
    /// Removed; terminal. The resource is purged from its group.
    Uninstalled,
    /// Valid but superseded or not eligible; no action taken.
    Ignored,
    /// Last apply failed; retried on the next cycle.
    Error,
}

impl ResourceState {
    /// Uppercase name, as shown to operators.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Install => "INSTALL",
            Self::Installed => "INSTALLED",
            Self::Uninstall => "UNINSTALL",
            Self::Uninstalled => "UNINSTALLED",
            Self::Ignored => "IGNORED",
            Self::Error => "ERROR",
        }
    }

    /// `true` for the terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Uninstalled)
    }
}

impl std::fmt::Display for ResourceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
