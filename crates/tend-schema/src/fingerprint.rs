use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::value::{ConfigMap, ConfigValue, Payload};

/// Canonical content digest of a resource payload.
///
/// Artifact bytes are hashed with SHA-256 (`sha256:<hex>`), the same digest
/// upstream publishers use, so a provider-declared checksum can be compared
/// directly. Configuration maps are hashed with BLAKE3 (`blake3:<hex>`) over
/// a canonical encoding:
///
/// - entries are visited in key order, so insertion order never matters;
/// - every value is tagged with its type, so `"1"` and `1` differ;
/// - lists are hashed by position and never re-sorted.
///
/// Fingerprints are compared for equality only; two registrations of the
/// same url with equal fingerprints are the same desired state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Wrap an existing digest string without validation (e.g. a marker
    /// reported back by an apply-backend).
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Fingerprint any payload.
    pub fn of(payload: &Payload) -> Self {
        match payload {
            Payload::Bytes(bytes) => Self::of_bytes(bytes),
            Payload::Config(map) => Self::of_config(map),
        }
    }

    /// SHA-256 of raw bytes.
    pub fn of_bytes(data: &[u8]) -> Self {
        let digest = Sha256::digest(data);
        Self(format!("sha256:{}", hex::encode(digest)))
    }

    /// Order-independent BLAKE3 digest of a configuration map.
    pub fn of_config(map: &ConfigMap) -> Self {
        let mut entries: Vec<(&String, &ConfigValue)> = map.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));

        let mut hasher = blake3::Hasher::new();
        hasher.update(&(entries.len() as u64).to_le_bytes());
        for (key, value) in entries {
            write_str(&mut hasher, key);
            write_value(&mut hasher, value);
        }
        Self(format!("blake3:{}", hasher.finalize().to_hex()))
    }

    /// The algorithm prefix (`sha256` / `blake3`), if present.
    pub fn algorithm(&self) -> Option<&str> {
        self.0.split_once(':').map(|(alg, _)| alg)
    }

    /// Return the digest as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn write_str(hasher: &mut blake3::Hasher, s: &str) {
    hasher.update(&(s.len() as u64).to_le_bytes());
    hasher.update(s.as_bytes());
}

fn write_value(hasher: &mut blake3::Hasher, value: &ConfigValue) {
    match value {
        ConfigValue::Boolean(b) => {
            hasher.update(&[b'b', u8::from(*b)]);
        }
        ConfigValue::Integer(i) => {
            hasher.update(b"i");
            hasher.update(&i.to_le_bytes());
        }
        ConfigValue::Float(f) => {
            hasher.update(b"f");
            hasher.update(&f.to_bits().to_le_bytes());
        }
        ConfigValue::String(s) => {
            hasher.update(b"s");
            write_str(hasher, s);
        }
        ConfigValue::List(items) => {
            hasher.update(b"l");
            hasher.update(&(items.len() as u64).to_le_bytes());
            for item in items {
                write_value(hasher, item);
            }
        }
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Fingerprint {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Fingerprint {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(entries: &[(&str, ConfigValue)]) -> ConfigMap {
        entries
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn bytes_use_sha256() {
        let fp = Fingerprint::of_bytes(b"hello world");
        assert_eq!(fp.algorithm(), Some("sha256"));
        assert_eq!(
            fp.as_str(),
            "sha256:b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn config_ignores_insertion_order() {
        let a = map(&[
            ("la", ConfigValue::from(vec!["x", "y"])),
            ("foo", ConfigValue::from(vec![3i64, 2, 7])),
        ]);
        let b = map(&[
            ("foo", ConfigValue::from(vec![3i64, 2, 7])),
            ("la", ConfigValue::from(vec!["x", "y"])),
        ]);
        assert_eq!(Fingerprint::of_config(&a), Fingerprint::of_config(&b));
    }

    #[test]
    fn config_list_order_matters() {
        let a = map(&[("la", ConfigValue::from(vec!["y", "x"]))]);
        let b = map(&[("la", ConfigValue::from(vec!["x", "y"]))]);
        assert_ne!(Fingerprint::of_config(&a), Fingerprint::of_config(&b));
    }

    #[test]
    fn config_array_contents_matter() {
        let a = map(&[("foo", ConfigValue::from(vec![7i64, 2, 3]))]);
        let b = map(&[("foo", ConfigValue::from(vec![3i64, 2, 7]))]);
        assert_ne!(Fingerprint::of_config(&a), Fingerprint::of_config(&b));
    }

    #[test]
    fn config_value_types_are_distinguished() {
        let a = map(&[("port", ConfigValue::from("1"))]);
        let b = map(&[("port", ConfigValue::from(1i64))]);
        assert_ne!(Fingerprint::of_config(&a), Fingerprint::of_config(&b));
    }

    #[test]
    fn key_value_boundaries_are_unambiguous() {
        let a = map(&[("ab", ConfigValue::from("c"))]);
        let b = map(&[("a", ConfigValue::from("bc"))]);
        assert_ne!(Fingerprint::of_config(&a), Fingerprint::of_config(&b));
    }
}
