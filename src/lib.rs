//! # glyphforge - Incremental Font Pipeline Engine
//!
//! glyphforge orchestrates a multi-stage font compilation pipeline as an
//! incremental build graph. Targets are addressed by string id (task names
//! like `ttf`, or output paths like `out/ttf/sarasa-gothic-sc-regular.ttf`),
//! matched against wildcard rule patterns, and built by producer routines
//! that discover their dependencies dynamically while they run.
//!
//! ## Core Concepts
//!
//! - **Rule**: a pattern plus a producer; its kind decides caching behavior
//! - **Target**: one concrete expansion of a rule's pattern
//! - **Journal**: the persisted fingerprint store that makes re-runs skip
//!   everything whose rule, inputs, and output are unchanged
//! - **BuildContext**: the handle producers use to request dependencies and
//!   run external tools
//!
//! ## Usage
//!
//! ```rust,ignore
//! use glyphforge::engine::{BuildEngine, EngineConfig};
//! use glyphforge::journal::Journal;
//! use glyphforge::pipeline::Pipeline;
//!
//! let registry = Pipeline::default().build_registry()?;
//! let journal = Journal::open("build/.journal".as_ref())?;
//! let engine = BuildEngine::new(registry, journal, EngineConfig::default());
//! engine.build("start")?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod action;
pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod journal;
pub mod pattern;
pub mod pipeline;
pub mod rule;
pub mod target;

// Re-export primary types at crate root for convenience
pub use action::ToolOptions;
pub use engine::{BuildContext, BuildEngine, EngineConfig};
pub use error::{ActionError, ForgeError, ForgeResult, JournalError, ResolveError};
pub use fingerprint::Fingerprint;
pub use journal::{BuildRecord, DepEdge, Journal};
pub use pattern::Pattern;
pub use rule::{Registry, Rule, RuleHandle, RuleKind};
pub use target::{Artifact, TargetInfo, TargetResult};
