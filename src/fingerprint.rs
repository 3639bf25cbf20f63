//! Content- and value-derived fingerprints.
//!
//! Every build decision reduces to fingerprint comparison: a target is fresh
//! only when its rule fingerprint and every recorded dependency fingerprint
//! still match what is observed now. File-backed targets hash their content;
//! value targets hash their canonical JSON serialization; rule identity is
//! explicit data (kind + pattern + declared version), never introspection.

use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ActionError, ForgeResult};

/// Bump when the fingerprinting scheme itself changes; invalidates every
/// rule fingerprint, and with it every journal record.
const SCHEME_VERSION: u32 = 1;

/// A stable blake3 fingerprint, stored as lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprints a byte slice.
    #[must_use]
    pub fn of_bytes(bytes: &[u8]) -> Self {
        Self(blake3::hash(bytes).to_hex().to_string())
    }

    /// Fingerprints a file's content, streaming in fixed-size chunks.
    ///
    /// # Errors
    /// Returns [`ActionError::Io`] when the file cannot be read.
    pub fn of_file(path: &Path) -> ForgeResult<Self> {
        let mut file = File::open(path).map_err(|e| ActionError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        let mut hasher = blake3::Hasher::new();
        let mut buf = [0u8; 64 * 1024];
        loop {
            let n = file.read(&mut buf).map_err(|e| ActionError::Io {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(Self(hasher.finalize().to_hex().to_string()))
    }

    /// Fingerprints a JSON value via its canonical serialization.
    ///
    /// `serde_json` maps iterate in sorted key order, so two semantically
    /// equal values always serialize (and hash) identically.
    #[must_use]
    pub fn of_value(value: &serde_json::Value) -> Self {
        let bytes = serde_json::to_vec(value).unwrap_or_default();
        Self::of_bytes(&bytes)
    }

    /// Fingerprints a rule's identity: kind name, pattern source, and the
    /// version the rule was registered with.
    #[must_use]
    pub fn of_rule(kind: &str, pattern: &str, version: u32) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&SCHEME_VERSION.to_le_bytes());
        hasher.update(kind.as_bytes());
        hasher.update(&[0]);
        hasher.update(pattern.as_bytes());
        hasher.update(&[0]);
        hasher.update(&version.to_le_bytes());
        Self(hasher.finalize().to_hex().to_string())
    }

    /// Fingerprints an ordered set of dependency fingerprints, used as the
    /// output fingerprint of task-group targets.
    #[must_use]
    pub fn of_deps<'a>(deps: impl IntoIterator<Item = &'a Fingerprint>) -> Self {
        let mut hasher = blake3::Hasher::new();
        for dep in deps {
            hasher.update(dep.0.as_bytes());
            hasher.update(&[0]);
        }
        Self(hasher.finalize().to_hex().to_string())
    }

    /// Returns the hex representation.
    #[must_use]
    pub fn as_hex(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_bytes_fingerprint_is_stable() {
        let a = Fingerprint::of_bytes(b"hello");
        let b = Fingerprint::of_bytes(b"hello");
        let c = Fingerprint::of_bytes(b"hello!");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_file_fingerprint_tracks_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("input.txt");

        std::fs::write(&path, b"v1").unwrap();
        let fp1 = Fingerprint::of_file(&path).unwrap();

        std::fs::write(&path, b"v2").unwrap();
        let fp2 = Fingerprint::of_file(&path).unwrap();
        assert_ne!(fp1, fp2);

        std::fs::write(&path, b"v1").unwrap();
        let fp3 = Fingerprint::of_file(&path).unwrap();
        assert_eq!(fp1, fp3);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempdir().unwrap();
        let err = Fingerprint::of_file(&dir.path().join("nope")).unwrap_err();
        let msg = format!("{err}");
        assert!(msg.contains("io error"));
    }

    #[test]
    fn test_value_fingerprint_ignores_key_insertion_order() {
        let a: serde_json::Value = serde_json::from_str(r#"{"x":1,"y":2}"#).unwrap();
        let b: serde_json::Value = serde_json::from_str(r#"{"y":2,"x":1}"#).unwrap();
        assert_eq!(Fingerprint::of_value(&a), Fingerprint::of_value(&b));
    }

    #[test]
    fn test_rule_fingerprint_tracks_version() {
        let a = Fingerprint::of_rule("FileRule", "build/*.ttf", 1);
        let b = Fingerprint::of_rule("FileRule", "build/*.ttf", 2);
        let c = Fingerprint::of_rule("FileRule", "build/*.otd", 1);
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_dep_set_fingerprint_is_order_sensitive() {
        let x = Fingerprint::of_bytes(b"x");
        let y = Fingerprint::of_bytes(b"y");
        let xy = Fingerprint::of_deps([&x, &y]);
        let yx = Fingerprint::of_deps([&y, &x]);
        assert_ne!(xy, yx);
        assert_eq!(xy, Fingerprint::of_deps([&x, &y]));
    }
}
