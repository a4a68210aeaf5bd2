//! Payload types carried by resources.

use bytes::Bytes;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::types::ResourceKind;

/// Key/value payload of a CONFIG resource.
///
/// Keeps insertion order for presentation; equality and fingerprints do
/// not depend on it.
pub type ConfigMap = IndexMap<String, ConfigValue>;

/// One value in a configuration record.
///
/// Lists are ordered: `[x, y]` and `[y, x]` are different values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    /// `true` / `false`.
    Boolean(bool),
    /// Signed 64-bit integer.
    Integer(i64),
    /// 64-bit float.
    Float(f64),
    /// UTF-8 text.
    String(String),
    /// Ordered sequence of values.
    List(Vec<ConfigValue>),
}

impl ConfigValue {
    /// Short type name used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Boolean(_) => "boolean",
            Self::Integer(_) => "integer",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::List(_) => "list",
        }
    }

    /// Render a scalar the way flat text formats expect (`true`, `42`, `text`).
    ///
    /// Lists render as their elements joined by `,`.
    pub fn to_plain_string(&self) -> String {
        match self {
            Self::Boolean(b) => b.to_string(),
            Self::Integer(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::String(s) => s.clone(),
            Self::List(items) => items
                .iter()
                .map(ConfigValue::to_plain_string)
                .collect::<Vec<_>>()
                .join(","),
        }
    }
}

impl From<&str> for ConfigValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for ConfigValue {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

impl From<bool> for ConfigValue {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<f64> for ConfigValue {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl<T: Into<ConfigValue>> From<Vec<T>> for ConfigValue {
    fn from(items: Vec<T>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }
}

/// The desired content of a resource.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Opaque artifact bytes; never interpreted by the engine.
    Bytes(Bytes),
    /// A configuration record.
    Config(ConfigMap),
}

impl Payload {
    /// The resource kind this payload belongs to.
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::Bytes(_) => ResourceKind::Artifact,
            Self::Config(_) => ResourceKind::Config,
        }
    }

    /// Artifact bytes, if this is an artifact payload.
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Self::Bytes(b) => Some(b),
            Self::Config(_) => None,
        }
    }

    /// Configuration map, if this is a config payload.
    pub fn as_config(&self) -> Option<&ConfigMap> {
        match self {
            Self::Config(c) => Some(c),
            Self::Bytes(_) => None,
        }
    }

    /// `true` when there is nothing to apply.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Bytes(b) => b.is_empty(),
            Self::Config(c) => c.is_empty(),
        }
    }
}

impl From<Bytes> for Payload {
    fn from(b: Bytes) -> Self {
        Self::Bytes(b)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(b: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(b))
    }
}

impl From<ConfigMap> for Payload {
    fn from(c: ConfigMap) -> Self {
        Self::Config(c)
    }
}
