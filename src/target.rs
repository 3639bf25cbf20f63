//! Target identity and producer results.
//!
//! A target is addressed by its fully-expanded string id. Producers receive a
//! [`TargetInfo`] describing the requested expansion (id, path pieces, and
//! the ordered wildcard captures) and return a [`TargetResult`].

use std::path::{Path, PathBuf};

/// The concrete expansion a producer was invoked for.
#[derive(Debug, Clone)]
pub struct TargetInfo {
    id: String,
    captures: Vec<String>,
}

impl TargetInfo {
    /// Creates a target info from an id and its pattern captures.
    #[must_use]
    pub fn new(id: impl Into<String>, captures: Vec<String>) -> Self {
        Self {
            id: id.into(),
            captures,
        }
    }

    /// The full target id, which for file rules is also the output path.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The target id as a filesystem path.
    #[must_use]
    pub fn path(&self) -> &Path {
        Path::new(&self.id)
    }

    /// The directory portion of the target path, empty for bare names.
    #[must_use]
    pub fn dir(&self) -> String {
        self.path()
            .parent()
            .map(|p| p.display().to_string())
            .unwrap_or_default()
    }

    /// The file stem of the target path (`gothic-sc-regular` for
    /// `build/pass1/gothic-sc-regular.ttf`).
    #[must_use]
    pub fn name(&self) -> String {
        self.path()
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// The ordered wildcard captures bound during resolution.
    #[must_use]
    pub fn captures(&self) -> &[String] {
        &self.captures
    }

    /// A single capture by position.
    ///
    /// # Panics
    /// Panics when `index` is out of range; producers are registered against
    /// a pattern and may rely on its wildcard count.
    #[must_use]
    pub fn capture(&self, index: usize) -> &str {
        &self.captures[index]
    }
}

/// A file artifact produced by (or recorded for) a file rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Full path of the produced file.
    pub full: PathBuf,
}

impl Artifact {
    /// Creates an artifact for a path.
    #[must_use]
    pub fn new(full: impl Into<PathBuf>) -> Self {
        Self { full: full.into() }
    }

    /// The containing directory.
    #[must_use]
    pub fn dir(&self) -> PathBuf {
        self.full.parent().map(Path::to_path_buf).unwrap_or_default()
    }

    /// The file stem.
    #[must_use]
    pub fn name(&self) -> String {
        self.full
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// The result of building one target.
#[derive(Debug, Clone, PartialEq)]
pub enum TargetResult {
    /// A pure value (oracle and computed rules).
    Value(serde_json::Value),
    /// A file artifact (file rules).
    File(Artifact),
    /// Completion with no addressable result (task groups and phony rules).
    Done,
}

impl TargetResult {
    /// The value payload, if any.
    #[must_use]
    pub fn as_value(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }

    /// The file artifact, if any.
    #[must_use]
    pub fn as_file(&self) -> Option<&Artifact> {
        match self {
            Self::File(a) => Some(a),
            _ => None,
        }
    }
}
