//! Rule registry: kinds, producers, and target resolution.
//!
//! Rules are registered once at startup and are immutable afterwards. A rule
//! pairs a [`Pattern`] with a producer routine and an explicit version; the
//! version participates in the rule fingerprint so that editing a producer
//! (and bumping its version) invalidates exactly that rule's journal records.

use std::fmt;

use crate::engine::BuildContext;
use crate::error::{ForgeResult, ResolveError};
use crate::fingerprint::Fingerprint;
use crate::pattern::Pattern;
use crate::target::{TargetInfo, TargetResult};

/// Producer routine invoked to build one target expansion.
pub type Producer =
    dyn Fn(&BuildContext<'_>, &TargetInfo) -> ForgeResult<TargetResult> + Send + Sync;

/// The behavioral class of a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleKind {
    /// Named singleton value, re-evaluated every run; its value fingerprint
    /// is what gates dependents.
    Oracle,
    /// Named singleton value derived from other targets, journaled and
    /// skipped when fresh.
    Computed,
    /// Produces exactly one file artifact per expansion, keyed by path.
    FileRule,
    /// Aggregates dependent targets under a (possibly parameterized) name.
    TaskGroup,
    /// Side effects only; never journaled, always re-run.
    Phony,
}

impl RuleKind {
    /// Stable name used in rule fingerprints.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Oracle => "Oracle",
            Self::Computed => "Computed",
            Self::FileRule => "FileRule",
            Self::TaskGroup => "TaskGroup",
            Self::Phony => "Phony",
        }
    }

    /// Returns true if completed builds of this kind are journaled.
    #[must_use]
    pub const fn is_journaled(self) -> bool {
        !matches!(self, Self::Phony)
    }

    /// Returns true if a journal hit may skip the producer entirely.
    ///
    /// Oracles are excluded: they are the change detectors for external
    /// configuration and must observe the current state every run. Task
    /// groups are excluded as well: their producers may materialize files
    /// that other rules merely bind (collection parts), so they re-run each
    /// session and rely on their dependencies' own freshness for skipping.
    #[must_use]
    pub const fn skips_when_fresh(self) -> bool {
        matches!(self, Self::Computed | Self::FileRule)
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A registered rule.
pub struct Rule {
    kind: RuleKind,
    pattern: Pattern,
    version: u32,
    producer: Box<Producer>,
}

impl Rule {
    /// The rule's kind.
    #[must_use]
    pub fn kind(&self) -> RuleKind {
        self.kind
    }

    /// The rule's pattern.
    #[must_use]
    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    /// The rule's producer.
    #[must_use]
    pub fn producer(&self) -> &Producer {
        self.producer.as_ref()
    }

    /// The rule's identity fingerprint (kind + pattern + version).
    #[must_use]
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of_rule(self.kind.name(), self.pattern.source(), self.version)
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("kind", &self.kind)
            .field("pattern", &self.pattern.source())
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

/// Opaque handle to a registered rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RuleHandle(usize);

/// The immutable set of all registered rules.
#[derive(Default)]
pub struct Registry {
    rules: Vec<Rule>,
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a rule.
    ///
    /// Duplicate pattern strings are rejected eagerly; ambiguity between
    /// *different* patterns is detected lazily in [`Registry::resolve`],
    /// before any producer can run against a wrongly-picked rule.
    ///
    /// # Errors
    /// - [`ResolveError::DuplicatePattern`] for an exact pattern repeat.
    /// - [`ResolveError::InvalidPattern`] for malformed patterns, or for
    ///   `Oracle`/`Computed` rules with wildcards (they are named singleton
    ///   values and take no path captures).
    pub fn register<F>(
        &mut self,
        kind: RuleKind,
        pattern: &str,
        version: u32,
        producer: F,
    ) -> ForgeResult<RuleHandle>
    where
        F: Fn(&BuildContext<'_>, &TargetInfo) -> ForgeResult<TargetResult> + Send + Sync + 'static,
    {
        let pattern = Pattern::parse(pattern)?;

        if matches!(kind, RuleKind::Oracle | RuleKind::Computed) && !pattern.is_literal() {
            return Err(ResolveError::InvalidPattern {
                pattern: pattern.source().to_string(),
                reason: format!("{kind} rules are named singletons and cannot have wildcards"),
            }
            .into());
        }

        if self
            .rules
            .iter()
            .any(|r| r.pattern.source() == pattern.source())
        {
            return Err(ResolveError::DuplicatePattern {
                pattern: pattern.source().to_string(),
            }
            .into());
        }

        self.rules.push(Rule {
            kind,
            pattern,
            version,
            producer: Box::new(producer),
        });
        Ok(RuleHandle(self.rules.len() - 1))
    }

    /// Looks up a rule by handle.
    ///
    /// # Panics
    /// Panics for a handle from another registry; handles are only ever
    /// produced by [`Registry::register`] and [`Registry::resolve`].
    #[must_use]
    pub fn rule(&self, handle: RuleHandle) -> &Rule {
        &self.rules[handle.0]
    }

    /// Number of registered rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Returns true if no rules are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Resolves a target string to the unique matching rule and its ordered
    /// captures.
    ///
    /// # Errors
    /// - [`ResolveError::NoRuleMatches`] when nothing matches.
    /// - [`ResolveError::AmbiguousTarget`] when more than one rule matches;
    ///   this is a configuration error and fails fast rather than silently
    ///   picking one.
    pub fn resolve(&self, target: &str) -> ForgeResult<(RuleHandle, Vec<String>)> {
        let mut found: Option<(RuleHandle, Vec<String>)> = None;
        let mut matched_patterns = Vec::new();

        for (idx, rule) in self.rules.iter().enumerate() {
            if let Some(captures) = rule.pattern.matches(target) {
                matched_patterns.push(rule.pattern.source().to_string());
                if found.is_none() {
                    found = Some((RuleHandle(idx), captures));
                }
            }
        }

        match matched_patterns.len() {
            0 => Err(ResolveError::NoRuleMatches {
                target: target.to_string(),
            }
            .into()),
            1 => Ok(found.unwrap_or_else(|| unreachable!())),
            _ => Err(ResolveError::AmbiguousTarget {
                target: target.to_string(),
                patterns: matched_patterns,
            }
            .into()),
        }
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("rules", &self.rules.len())
            .finish()
    }
}
