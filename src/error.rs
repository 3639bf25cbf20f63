//! Error types for glyphforge.
//!
//! All errors are strongly typed using thiserror. Every variant carries
//! owned, displayable data (no live `io::Error` sources) so that a memoized
//! build failure can be cloned to every waiter of an in-flight target.

use thiserror::Error;

/// Errors raised while resolving a target string against the rule registry.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("no rule matches target '{target}'")]
    NoRuleMatches {
        target: String,
    },

    #[error("target '{target}' matches multiple rule patterns: {patterns:?}")]
    AmbiguousTarget {
        target: String,
        patterns: Vec<String>,
    },

    #[error("rule pattern '{pattern}' is already registered")]
    DuplicatePattern {
        pattern: String,
    },

    #[error("invalid rule pattern '{pattern}': {reason}")]
    InvalidPattern {
        pattern: String,
        reason: String,
    },

    #[error("pattern '{pattern}' expects {expected} capture values, got {actual}")]
    CaptureCountMismatch {
        pattern: String,
        expected: usize,
        actual: usize,
    },
}

/// Errors raised while executing a producer's side effects.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ActionError {
    #[error("process '{program}' exited with status {status}")]
    ProcessFailed {
        program: String,
        status: i32,
    },

    #[error("process '{program}' was terminated by a signal")]
    ProcessKilled {
        program: String,
    },

    #[error("failed to launch process '{program}': {message}")]
    SpawnFailed {
        program: String,
        message: String,
    },

    #[error("file rule completed but output '{path}' is missing")]
    MissingOutput {
        path: String,
    },

    #[error("required source file '{path}' is missing")]
    MissingSource {
        path: String,
    },

    #[error("io error on '{path}': {message}")]
    Io {
        path: String,
        message: String,
    },
}

/// Errors raised by the persisted journal.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum JournalError {
    #[error("journal is locked by another process: {path}")]
    Locked {
        path: String,
    },

    #[error("failed to open journal '{path}': {message}")]
    Open {
        path: String,
        message: String,
    },

    #[error("failed to append journal record for '{target}': {message}")]
    Append {
        target: String,
        message: String,
    },

    #[error("failed to compact journal '{path}': {message}")]
    Compact {
        path: String,
        message: String,
    },
}

/// Top-level error type for glyphforge.
///
/// Dependency failures are wrapped in [`ForgeError::Target`] as they
/// propagate upward, so the rendered message names the whole failing chain
/// from the root request down to the leaf action.
#[derive(Debug, Clone, Error)]
pub enum ForgeError {
    #[error("resolution error: {0}")]
    Resolve(#[from] ResolveError),

    #[error("dependency cycle: {}", chain.join(" -> "))]
    Cycle {
        chain: Vec<String>,
    },

    #[error("action error: {0}")]
    Action(#[from] ActionError),

    #[error("target '{target}' failed: {source}")]
    Target {
        target: String,
        #[source]
        source: Box<ForgeError>,
    },

    #[error("journal error: {0}")]
    Journal(#[from] JournalError),

    #[error("build aborted after an earlier failure")]
    Aborted,

    #[error("value error: {message}")]
    Value {
        message: String,
    },

    #[error("internal error: {message}")]
    Internal {
        message: String,
    },
}

impl ForgeError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Creates a value error.
    #[must_use]
    pub fn value(message: impl Into<String>) -> Self {
        Self::Value {
            message: message.into(),
        }
    }

    /// Wraps this error as the failure of `target`, extending the chain.
    ///
    /// `Aborted` is left unwrapped: it is a consequence of some other
    /// target's failure, not a failure of `target` itself.
    #[must_use]
    pub fn for_target(self, target: &str) -> Self {
        match self {
            Self::Aborted => Self::Aborted,
            other => Self::Target {
                target: target.to_string(),
                source: Box::new(other),
            },
        }
    }

    /// Returns true if this is a resolution error.
    #[must_use]
    pub const fn is_resolve(&self) -> bool {
        matches!(self, Self::Resolve(_))
    }

    /// Returns true if this is a dependency cycle.
    #[must_use]
    pub const fn is_cycle(&self) -> bool {
        matches!(self, Self::Cycle { .. })
    }

    /// Returns true if this error (or any wrapped cause) is `Aborted`.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        match self {
            Self::Aborted => true,
            Self::Target { source, .. } => source.is_aborted(),
            _ => false,
        }
    }

    /// Returns the innermost (leaf) cause of a wrapped target chain.
    #[must_use]
    pub fn leaf(&self) -> &Self {
        match self {
            Self::Target { source, .. } => source.leaf(),
            other => other,
        }
    }
}

/// Result type alias for glyphforge operations.
pub type ForgeResult<T> = Result<T, ForgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_error_no_match() {
        let err = ResolveError::NoRuleMatches {
            target: "out/missing.ttf".to_string(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("no rule matches"));
        assert!(msg.contains("out/missing.ttf"));
    }

    #[test]
    fn test_cycle_error_renders_chain() {
        let err = ForgeError::Cycle {
            chain: vec!["a".to_string(), "b".to_string(), "a".to_string()],
        };
        assert_eq!(format!("{err}"), "dependency cycle: a -> b -> a");
    }

    #[test]
    fn test_target_chain_names_root_and_leaf() {
        let leaf: ForgeError = ActionError::ProcessFailed {
            program: "otfccbuild".to_string(),
            status: 1,
        }
        .into();
        let err = leaf
            .for_target("build/pass1/gothic-sc-regular.ttf")
            .for_target("out/ttf/sarasa-gothic-sc-regular.ttf");

        let msg = format!("{err}");
        assert!(msg.contains("out/ttf/sarasa-gothic-sc-regular.ttf"));
        assert!(msg.contains("build/pass1/gothic-sc-regular.ttf"));
        assert!(msg.contains("otfccbuild"));
        assert!(matches!(
            err.leaf(),
            ForgeError::Action(ActionError::ProcessFailed { .. })
        ));
    }

    #[test]
    fn test_aborted_is_not_wrapped() {
        let err = ForgeError::Aborted.for_target("anything");
        assert!(matches!(err, ForgeError::Aborted));
        assert!(err.is_aborted());
    }

    #[test]
    fn test_aborted_detected_through_chain() {
        let err = ForgeError::Target {
            target: "root".to_string(),
            source: Box::new(ForgeError::Aborted),
        };
        assert!(err.is_aborted());
    }

    #[test]
    fn test_errors_are_cloneable() {
        let err: ForgeError = JournalError::Locked {
            path: "/tmp/journal".to_string(),
        }
        .into();
        let cloned = err.clone();
        assert_eq!(format!("{err}"), format!("{cloned}"));
    }
}
