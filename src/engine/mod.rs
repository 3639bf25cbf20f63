//! The dependency scheduler.
//!
//! One [`BuildEngine`] instance drives one build run. Requested targets are
//! resolved against the rule registry, their producers are invoked with a
//! [`BuildContext`] that records every nested request as a dependency edge,
//! and completed work is memoized per target id for the remainder of the
//! run. The journal is consulted before a producer runs so unchanged targets
//! are skipped entirely.
//!
//! Concurrency model: sibling targets requested together build on their own
//! threads; a target that is already in flight is awaited, never duplicated.
//! The only suspension points are external process execution (gated by
//! [`jobs::JobSlots`]) and waiting on an in-flight dependency. Cross-target
//! state lives behind one mutex-protected table, so no target's own control
//! flow ever races with itself.

pub mod jobs;

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};

use serde::de::DeserializeOwned;

use crate::action;
use crate::error::{ActionError, ForgeError, ForgeResult, ResolveError};
use crate::fingerprint::Fingerprint;
use crate::journal::{BuildRecord, DepEdge, Journal};
use crate::rule::{Registry, RuleHandle, RuleKind};
use crate::target::{Artifact, TargetInfo, TargetResult};

use self::jobs::JobSlots;

/// Prefix marking raw source-file dependency edges in the journal.
const SOURCE_PREFIX: &str = "file:";

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Ceiling on concurrently running external processes. Global across
    /// all build stages.
    pub jobs: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            jobs: std::thread::available_parallelism()
                .map(std::num::NonZeroUsize::get)
                .unwrap_or(1),
        }
    }
}

/// Per-target build state for the current run.
enum TargetState {
    /// A producer (or freshness check) is running somewhere; wait for it.
    Building,
    /// Terminal. Cloned to every requester for the rest of the run.
    Done(ForgeResult<(TargetResult, Fingerprint)>),
}

/// Cross-target scheduling state, all behind one lock.
#[derive(Default)]
struct StateTable {
    /// In-flight and terminal build states, keyed by target id.
    states: HashMap<String, TargetState>,
    /// Which targets each in-flight producer is currently parked on. One
    /// producer can park on several siblings at once (parallel `need`), so
    /// this is a multimap.
    waits: HashMap<String, Vec<String>>,
}

/// The incremental build engine.
///
/// Constructed explicitly at startup and passed by reference everywhere;
/// multiple independent engines can coexist in one process (each with its
/// own journal).
pub struct BuildEngine {
    registry: Registry,
    journal: Journal,
    slots: JobSlots,
    states: Mutex<StateTable>,
    done: Condvar,
    resolutions: Mutex<HashMap<String, (RuleHandle, Vec<String>)>>,
    aborted: AtomicBool,
}

impl BuildEngine {
    /// Creates an engine over a rule registry and an opened journal.
    #[must_use]
    pub fn new(registry: Registry, journal: Journal, config: EngineConfig) -> Self {
        Self {
            registry,
            journal,
            slots: JobSlots::new(config.jobs),
            states: Mutex::new(StateTable::default()),
            done: Condvar::new(),
            resolutions: Mutex::new(HashMap::new()),
            aborted: AtomicBool::new(false),
        }
    }

    /// Builds one top-level target.
    ///
    /// # Errors
    /// Any resolution, cycle, action, or journal failure below the target,
    /// wrapped so the message names the chain from this target down to the
    /// failing leaf.
    pub fn build(&self, target: &str) -> ForgeResult<TargetResult> {
        self.need_target(target, &[]).map(|(result, _)| result)
    }

    /// Builds several top-level targets in request order.
    ///
    /// # Errors
    /// Stops at the first failing target.
    pub fn build_all(&self, targets: &[&str]) -> ForgeResult<Vec<TargetResult>> {
        targets.iter().map(|t| self.build(t)).collect()
    }

    /// The engine's journal.
    #[must_use]
    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    /// True once any target has failed; no new work starts afterwards.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    /// Resolves a target, memoizing the decision per target id so large
    /// graphs never re-resolve the same string twice.
    fn resolve(&self, target: &str) -> ForgeResult<(RuleHandle, Vec<String>)> {
        if let Some(hit) = self.resolutions.lock().unwrap().get(target) {
            return Ok(hit.clone());
        }
        let resolved = self.registry.resolve(target)?;
        self.resolutions
            .lock()
            .unwrap()
            .insert(target.to_string(), resolved.clone());
        Ok(resolved)
    }

    /// Requests a target: memoized result, await-if-in-flight, or build.
    ///
    /// `chain` is the requester chain from the root request down to (and
    /// excluding) `target`; re-entering any chain member is a cycle.
    fn need_target(
        &self,
        target: &str,
        chain: &[String],
    ) -> ForgeResult<(TargetResult, Fingerprint)> {
        if let Some(pos) = chain.iter().position(|t| t == target) {
            let mut cycle: Vec<String> = chain[pos..].to_vec();
            cycle.push(target.to_string());
            return Err(ForgeError::Cycle { chain: cycle });
        }

        {
            let mut table = self.states.lock().unwrap();
            loop {
                match table.states.get(target) {
                    Some(TargetState::Done(outcome)) => return outcome.clone(),
                    Some(TargetState::Building) => {
                        // Another thread owns this target. Before parking,
                        // make sure its owner is not (transitively) parked
                        // on a member of our own chain; two producers parked
                        // on each other would never wake.
                        if let Some(cycle) = find_wait_cycle(&table.waits, target, chain) {
                            return Err(ForgeError::Cycle { chain: cycle });
                        }
                        let me = chain.last().cloned();
                        if let Some(me) = &me {
                            table
                                .waits
                                .entry(me.clone())
                                .or_default()
                                .push(target.to_string());
                        }
                        table = self.done.wait(table).unwrap();
                        if let Some(me) = &me {
                            remove_wait_edge(&mut table.waits, me, target);
                        }
                    }
                    None => {
                        if self.is_aborted() {
                            return Err(ForgeError::Aborted);
                        }
                        table
                            .states
                            .insert(target.to_string(), TargetState::Building);
                        break;
                    }
                }
            }
        }

        let outcome = self
            .build_target(target, chain)
            .map_err(|e| e.for_target(target));

        if outcome.is_err() {
            // Fail fast: in-flight targets finish, nothing new starts.
            self.aborted.store(true, Ordering::SeqCst);
        }

        let mut table = self.states.lock().unwrap();
        table
            .states
            .insert(target.to_string(), TargetState::Done(outcome.clone()));
        self.done.notify_all();
        outcome
    }

    /// Builds one target that is not memoized: freshness check, then
    /// producer invocation, then fingerprinting and journaling.
    fn build_target(
        &self,
        target: &str,
        chain: &[String],
    ) -> ForgeResult<(TargetResult, Fingerprint)> {
        let (handle, captures) = self.resolve(target)?;
        let rule = self.registry.rule(handle);
        let kind = rule.kind();
        let rule_fp = rule.fingerprint();

        let mut chain = chain.to_vec();
        chain.push(target.to_string());

        if kind.skips_when_fresh() {
            if let Some(hit) = self.check_fresh(target, kind, &rule_fp, &chain)? {
                return Ok(hit);
            }
        }

        if self.is_aborted() {
            return Err(ForgeError::Aborted);
        }

        let info = TargetInfo::new(target, captures);
        if kind == RuleKind::FileRule {
            let dir = info.dir();
            if !dir.is_empty() {
                action::make_dirs(Path::new(&dir))?;
            }
        }

        let ctx = BuildContext {
            engine: self,
            chain,
            deps: Mutex::new(Vec::new()),
        };
        let produced = rule.producer()(&ctx, &info)?;
        let deps = ctx.deps.into_inner().unwrap();

        let (result, output) = match kind {
            RuleKind::FileRule => {
                let path = info.path();
                if !path.is_file() {
                    return Err(ActionError::MissingOutput {
                        path: target.to_string(),
                    }
                    .into());
                }
                let fp = Fingerprint::of_file(path)?;
                (TargetResult::File(Artifact::new(path)), fp)
            }
            RuleKind::Oracle | RuleKind::Computed => match produced {
                TargetResult::Value(value) => {
                    let fp = Fingerprint::of_value(&value);
                    (TargetResult::Value(value), fp)
                }
                _ => {
                    return Err(ForgeError::value(format!(
                        "{kind} rule '{}' returned no value",
                        rule.pattern()
                    )))
                }
            },
            RuleKind::TaskGroup | RuleKind::Phony => {
                let fp = Fingerprint::of_deps(deps.iter().map(|d| &d.fingerprint));
                (TargetResult::Done, fp)
            }
        };

        // Results discovered after a sibling failure are discarded, never
        // recorded as completed.
        if kind.is_journaled() && !self.is_aborted() {
            let value = result.as_value().cloned();
            self.journal.record(BuildRecord::new(
                target,
                rule_fp,
                deps,
                output.clone(),
                value,
            ))?;
        }

        Ok((result, output))
    }

    /// Consults the journal for `target`. Returns the recorded result when
    /// the rule fingerprint, every recorded dependency fingerprint (verified
    /// by requesting the dependency now), and the on-disk output all still
    /// match. Any mismatch or missing piece means stale.
    ///
    /// A false "fresh" here silently corrupts output, so every doubtful case
    /// resolves to a rebuild.
    fn check_fresh(
        &self,
        target: &str,
        kind: RuleKind,
        rule_fp: &Fingerprint,
        chain: &[String],
    ) -> ForgeResult<Option<(TargetResult, Fingerprint)>> {
        let Some(record) = self.journal.lookup(target) else {
            return Ok(None);
        };
        if &record.rule != rule_fp {
            return Ok(None);
        }

        // chain already ends with `target`, so dependency cycles through the
        // freshness check are still detected.
        let parent_chain = chain;

        for dep in &record.deps {
            let current = if let Some(path) = dep.target.strip_prefix(SOURCE_PREFIX) {
                match Fingerprint::of_file(Path::new(path)) {
                    Ok(fp) => fp,
                    // Source vanished: stale; the producer reports it.
                    Err(_) => return Ok(None),
                }
            } else {
                match self.need_target(&dep.target, parent_chain) {
                    Ok((_, fp)) => fp,
                    // A recorded dep that no longer resolves is stale (the
                    // rule set changed); a dep that *fails to build* is a
                    // real failure and propagates with its chain.
                    Err(e) if Self::is_unresolvable(&e, &dep.target) => return Ok(None),
                    Err(e) => return Err(e),
                }
            };
            if current != dep.fingerprint {
                return Ok(None);
            }
        }

        match kind {
            RuleKind::FileRule => {
                let path = Path::new(target);
                if !path.is_file() {
                    return Ok(None);
                }
                match Fingerprint::of_file(path) {
                    Ok(fp) if fp == record.output => {
                        Ok(Some((TargetResult::File(Artifact::new(path)), fp)))
                    }
                    _ => Ok(None),
                }
            }
            RuleKind::Computed => match record.value {
                Some(value) => Ok(Some((TargetResult::Value(value), record.output))),
                None => Ok(None),
            },
            // Oracle, task-group, and phony rules never take the fresh path.
            RuleKind::Oracle | RuleKind::TaskGroup | RuleKind::Phony => Ok(None),
        }
    }

    /// True when `err` is exactly "no rule matches `target`".
    fn is_unresolvable(err: &ForgeError, target: &str) -> bool {
        match err {
            ForgeError::Target { target: t, source } => {
                t == target
                    && matches!(
                        source.as_ref(),
                        ForgeError::Resolve(ResolveError::NoRuleMatches { .. })
                    )
            }
            ForgeError::Resolve(ResolveError::NoRuleMatches { .. }) => true,
            _ => false,
        }
    }
}

/// Searches the waits-for graph for a path from `blocked_on` back into
/// `chain`, returning the closed cycle when one exists.
///
/// Edges are only ever inserted after this search declines, under the same
/// lock, so the graph itself never contains a cycle and the walk terminates.
fn find_wait_cycle(
    waits: &HashMap<String, Vec<String>>,
    blocked_on: &str,
    chain: &[String],
) -> Option<Vec<String>> {
    let mut path = Vec::new();
    let mut seen = HashSet::new();
    walk_waits(waits, blocked_on, chain, &mut path, &mut seen)
}

fn walk_waits(
    waits: &HashMap<String, Vec<String>>,
    node: &str,
    chain: &[String],
    path: &mut Vec<String>,
    seen: &mut HashSet<String>,
) -> Option<Vec<String>> {
    if let Some(pos) = chain.iter().position(|t| t == node) {
        let mut cycle = chain[pos..].to_vec();
        cycle.extend(path.iter().cloned());
        cycle.push(node.to_string());
        return Some(cycle);
    }
    if !seen.insert(node.to_string()) {
        return None;
    }
    path.push(node.to_string());
    if let Some(targets) = waits.get(node) {
        for next in targets {
            if let Some(cycle) = walk_waits(waits, next, chain, path, seen) {
                return Some(cycle);
            }
        }
    }
    path.pop();
    None
}

/// Drops one `waiter -> target` edge after the waiter wakes.
fn remove_wait_edge(waits: &mut HashMap<String, Vec<String>>, waiter: &str, target: &str) {
    if let Some(edges) = waits.get_mut(waiter) {
        if let Some(idx) = edges.iter().position(|t| t == target) {
            edges.remove(idx);
        }
        if edges.is_empty() {
            waits.remove(waiter);
        }
    }
}

/// Dependency-recording handle threaded into every producer call.
///
/// All cross-target effects of a producer flow through this context: nested
/// target requests (which become recorded dependency edges), raw source-file
/// dependencies, and external actions.
pub struct BuildContext<'e> {
    engine: &'e BuildEngine,
    /// Root request down to the target this context builds.
    chain: Vec<String>,
    /// Edges recorded so far, in request order.
    deps: Mutex<Vec<DepEdge>>,
}

impl BuildContext<'_> {
    /// Requests targets, building stale ones, and records each as a
    /// dependency edge of the current target. Independent targets build
    /// concurrently.
    ///
    /// # Errors
    /// The first non-abort failure among the requested targets.
    pub fn need(&self, targets: &[&str]) -> ForgeResult<Vec<TargetResult>> {
        let outcomes: Vec<ForgeResult<(TargetResult, Fingerprint)>> = if targets.len() <= 1 {
            targets
                .iter()
                .map(|t| self.engine.need_target(t, &self.chain))
                .collect()
        } else {
            std::thread::scope(|scope| {
                let handles: Vec<_> = targets
                    .iter()
                    .map(|&t| scope.spawn(move || self.engine.need_target(t, &self.chain)))
                    .collect();
                handles
                    .into_iter()
                    .map(|h| {
                        h.join()
                            .unwrap_or_else(|_| Err(ForgeError::internal("build worker panicked")))
                    })
                    .collect()
            })
        };

        let mut results = Vec::with_capacity(outcomes.len());
        let mut first_err: Option<ForgeError> = None;
        {
            let mut deps = self.deps.lock().unwrap();
            for (target, outcome) in targets.iter().zip(outcomes) {
                match outcome {
                    Ok((result, fingerprint)) => {
                        deps.push(DepEdge {
                            target: (*target).to_string(),
                            fingerprint,
                        });
                        results.push(result);
                    }
                    Err(e) => {
                        // Prefer the originating failure over abort echoes.
                        match &first_err {
                            None => first_err = Some(e),
                            Some(prev) if prev.is_aborted() && !e.is_aborted() => {
                                first_err = Some(e);
                            }
                            Some(_) => {}
                        }
                    }
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(results),
        }
    }

    /// Requests one target.
    pub fn need_one(&self, target: &str) -> ForgeResult<TargetResult> {
        let mut results = self.need(std::slice::from_ref(&target))?;
        results
            .pop()
            .ok_or_else(|| ForgeError::internal("need returned no result"))
    }

    /// Requests an oracle/computed target and deserializes its value.
    ///
    /// # Errors
    /// [`ForgeError::Value`] when the target has no value payload or the
    /// payload does not deserialize as `T`.
    pub fn need_value<T: DeserializeOwned>(&self, target: &str) -> ForgeResult<T> {
        let result = self.need_one(target)?;
        let value = result
            .as_value()
            .ok_or_else(|| ForgeError::value(format!("target '{target}' carries no value")))?;
        serde_json::from_value(value.clone())
            .map_err(|e| ForgeError::value(format!("target '{target}': {e}")))
    }

    /// Requests a file rule target and returns its artifact.
    ///
    /// # Errors
    /// [`ForgeError::Value`] when the target is not file-backed.
    pub fn need_file(&self, target: &str) -> ForgeResult<Artifact> {
        let result = self.need_one(target)?;
        result
            .as_file()
            .cloned()
            .ok_or_else(|| ForgeError::value(format!("target '{target}' is not file-backed")))
    }

    /// Declares a dependency on a raw source file, fingerprinted straight
    /// from disk (no rule involved).
    ///
    /// # Errors
    /// [`ActionError::MissingSource`] when the file cannot be read.
    pub fn source(&self, path: impl AsRef<Path>) -> ForgeResult<Artifact> {
        let path = path.as_ref();
        let fingerprint = Fingerprint::of_file(path).map_err(|_| ActionError::MissingSource {
            path: path.display().to_string(),
        })?;
        self.deps.lock().unwrap().push(DepEdge {
            target: format!("{SOURCE_PREFIX}{}", path.display()),
            fingerprint,
        });
        Ok(Artifact::new(path))
    }

    /// Runs an external process, holding one global job slot for its
    /// duration. Non-zero exit is a failure of the current target.
    pub fn run<I, S>(&self, program: &str, args: I) -> ForgeResult<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let args: Vec<String> = args.into_iter().map(Into::into).collect();
        let _slot = self.engine.slots.acquire()?;
        action::run_process(program, &args, None)
    }

    /// Like [`BuildContext::run`], scoped to a working directory.
    pub fn run_in<I, S>(&self, cwd: impl AsRef<Path>, program: &str, args: I) -> ForgeResult<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let args: Vec<String> = args.into_iter().map(Into::into).collect();
        let _slot = self.engine.slots.acquire()?;
        action::run_process(program, &args, Some(cwd.as_ref()))
    }

    /// Removes a file; missing files are already removed.
    pub fn remove(&self, path: impl AsRef<Path>) -> ForgeResult<()> {
        action::remove_file(path.as_ref())
    }

    /// Creates a directory and its parents.
    pub fn make_dirs(&self, path: impl AsRef<Path>) -> ForgeResult<()> {
        action::make_dirs(path.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn engine_with(registry: Registry, dir: &TempDir) -> BuildEngine {
        let journal = Journal::open(&dir.path().join("journal")).unwrap();
        BuildEngine::new(registry, journal, EngineConfig { jobs: 4 })
    }

    #[test]
    fn test_oracle_is_memoized_within_a_run() {
        let dir = TempDir::new().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));

        let mut registry = Registry::new();
        {
            let calls = Arc::clone(&calls);
            registry
                .register(RuleKind::Oracle, "answer", 1, move |_, _| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(TargetResult::Value(serde_json::json!(42)))
                })
                .unwrap();
        }
        registry
            .register(RuleKind::Phony, "root", 1, |ctx, _| {
                let a: u32 = ctx.need_value("answer")?;
                let b: u32 = ctx.need_value("answer")?;
                assert_eq!(a, b);
                Ok(TargetResult::Done)
            })
            .unwrap();

        let engine = engine_with(registry, &dir);
        engine.build("root").unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cycle_is_detected_not_hung() {
        let dir = TempDir::new().unwrap();
        let mut registry = Registry::new();
        registry
            .register(RuleKind::Phony, "a", 1, |ctx, _| {
                ctx.need_one("b")?;
                Ok(TargetResult::Done)
            })
            .unwrap();
        registry
            .register(RuleKind::Phony, "b", 1, |ctx, _| {
                ctx.need_one("a")?;
                Ok(TargetResult::Done)
            })
            .unwrap();

        let engine = engine_with(registry, &dir);
        let err = engine.build("a").unwrap_err();
        let leaf = err.leaf();
        assert!(leaf.is_cycle(), "expected cycle, got {leaf:?}");
        let msg = format!("{leaf}");
        assert!(msg.contains("a -> b -> a"), "{msg}");
    }

    #[test]
    fn test_concurrent_mutual_cycle_is_detected() {
        let dir = TempDir::new().unwrap();
        let mut registry = Registry::new();
        for (name, other) in [("a", "b"), ("b", "a")] {
            registry
                .register(RuleKind::TaskGroup, name, 1, move |ctx, _| {
                    // Give the sibling time to mark itself in flight, so
                    // both sides observe each other as Building.
                    std::thread::sleep(std::time::Duration::from_millis(100));
                    ctx.need_one(other)?;
                    Ok(TargetResult::Done)
                })
                .unwrap();
        }
        registry
            .register(RuleKind::Phony, "root", 1, |ctx, _| {
                ctx.need(&["a", "b"])?;
                Ok(TargetResult::Done)
            })
            .unwrap();

        let engine = engine_with(registry, &dir);
        let err = engine.build("root").unwrap_err();
        let leaf = err.leaf();
        assert!(leaf.is_cycle(), "expected cycle, got {leaf:?}");
    }

    #[test]
    fn test_failure_chain_names_root_and_leaf() {
        let dir = TempDir::new().unwrap();
        let mut registry = Registry::new();
        registry
            .register(RuleKind::Phony, "root", 1, |ctx, _| {
                ctx.need_one("mid")?;
                Ok(TargetResult::Done)
            })
            .unwrap();
        registry
            .register(RuleKind::TaskGroup, "mid", 1, |_, _| {
                Err(ActionError::ProcessFailed {
                    program: "7z".to_string(),
                    status: 2,
                }
                .into())
            })
            .unwrap();

        let engine = engine_with(registry, &dir);
        let err = engine.build("root").unwrap_err();
        let msg = format!("{err}");
        assert!(msg.contains("'root'"));
        assert!(msg.contains("'mid'"));
        assert!(msg.contains("7z"));
        assert!(engine.is_aborted());
    }

    #[test]
    fn test_failed_target_is_not_journaled() {
        let dir = TempDir::new().unwrap();
        let mut registry = Registry::new();
        registry
            .register(RuleKind::TaskGroup, "broken", 1, |_, _| {
                Err(ForgeError::internal("boom"))
            })
            .unwrap();

        let engine = engine_with(registry, &dir);
        engine.build("broken").unwrap_err();
        assert!(!engine.journal().contains("broken"));
    }

    #[test]
    fn test_file_rule_missing_output_is_failure() {
        let dir = TempDir::new().unwrap();
        let pattern = format!("{}/out/*.txt", dir.path().display());

        let mut registry = Registry::new();
        registry
            .register(RuleKind::FileRule, &pattern, 1, |_, _| {
                // Claims success but writes nothing.
                Ok(TargetResult::Done)
            })
            .unwrap();

        let engine = engine_with(registry, &dir);
        let target = format!("{}/out/a.txt", dir.path().display());
        let err = engine.build(&target).unwrap_err();
        assert!(format!("{err}").contains("output"));
    }

    #[test]
    fn test_file_rule_fresh_skip_across_runs() {
        let dir = TempDir::new().unwrap();
        let pattern = format!("{}/out/*.txt", dir.path().display());
        let source = dir.path().join("input.txt");
        std::fs::write(&source, b"payload").unwrap();
        let calls = Arc::new(AtomicUsize::new(0));

        let make_registry = |calls: Arc<AtomicUsize>| {
            let mut registry = Registry::new();
            let source = source.clone();
            registry
                .register(RuleKind::FileRule, &pattern, 1, move |ctx, info| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    let input = ctx.source(&source)?;
                    let data = std::fs::read(&input.full).unwrap();
                    std::fs::write(info.path(), data).unwrap();
                    Ok(TargetResult::Done)
                })
                .unwrap();
            registry
        };

        let target = format!("{}/out/a.txt", dir.path().display());
        let journal_path = dir.path().join("journal");

        {
            let journal = Journal::open(&journal_path).unwrap();
            let engine = BuildEngine::new(
                make_registry(Arc::clone(&calls)),
                journal,
                EngineConfig { jobs: 2 },
            );
            engine.build(&target).unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Unchanged input: second run skips the producer.
        {
            let journal = Journal::open(&journal_path).unwrap();
            let engine = BuildEngine::new(
                make_registry(Arc::clone(&calls)),
                journal,
                EngineConfig { jobs: 2 },
            );
            let result = engine.build(&target).unwrap();
            assert!(result.as_file().is_some());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Changed input: third run rebuilds.
        std::fs::write(&source, b"payload v2").unwrap();
        {
            let journal = Journal::open(&journal_path).unwrap();
            let engine =
                BuildEngine::new(make_registry(Arc::clone(&calls)), journal, EngineConfig { jobs: 2 });
            engine.build(&target).unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_rule_version_bump_invalidates_only_that_rule() {
        let dir = TempDir::new().unwrap();
        let pattern_a = format!("{}/a/*.txt", dir.path().display());
        let pattern_b = format!("{}/b/*.txt", dir.path().display());
        let calls_a = Arc::new(AtomicUsize::new(0));
        let calls_b = Arc::new(AtomicUsize::new(0));

        let make_registry = |version_a: u32, ca: Arc<AtomicUsize>, cb: Arc<AtomicUsize>| {
            let mut registry = Registry::new();
            registry
                .register(RuleKind::FileRule, &pattern_a, version_a, move |_, info| {
                    ca.fetch_add(1, Ordering::SeqCst);
                    std::fs::write(info.path(), b"a").unwrap();
                    Ok(TargetResult::Done)
                })
                .unwrap();
            registry
                .register(RuleKind::FileRule, &pattern_b, 1, move |_, info| {
                    cb.fetch_add(1, Ordering::SeqCst);
                    std::fs::write(info.path(), b"b").unwrap();
                    Ok(TargetResult::Done)
                })
                .unwrap();
            registry
        };

        let ta = format!("{}/a/x.txt", dir.path().display());
        let tb = format!("{}/b/x.txt", dir.path().display());
        let journal_path = dir.path().join("journal");

        {
            let engine = BuildEngine::new(
                make_registry(1, Arc::clone(&calls_a), Arc::clone(&calls_b)),
                Journal::open(&journal_path).unwrap(),
                EngineConfig::default(),
            );
            engine.build_all(&[&ta, &tb]).unwrap();
        }

        // Self-tracking: bumping rule A's version rebuilds A, not B.
        {
            let engine = BuildEngine::new(
                make_registry(2, Arc::clone(&calls_a), Arc::clone(&calls_b)),
                Journal::open(&journal_path).unwrap(),
                EngineConfig::default(),
            );
            engine.build_all(&[&ta, &tb]).unwrap();
        }

        assert_eq!(calls_a.load(Ordering::SeqCst), 2);
        assert_eq!(calls_b.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_at_most_once_for_concurrent_dependents() {
        let dir = TempDir::new().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));

        let mut registry = Registry::new();
        {
            let calls = Arc::clone(&calls);
            registry
                .register(RuleKind::Computed, "shared", 1, move |_, _| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    std::thread::sleep(std::time::Duration::from_millis(30));
                    Ok(TargetResult::Value(serde_json::json!("shared-value")))
                })
                .unwrap();
        }
        for name in ["left", "right"] {
            registry
                .register(RuleKind::TaskGroup, name, 1, |ctx, _| {
                    ctx.need_one("shared")?;
                    Ok(TargetResult::Done)
                })
                .unwrap();
        }
        registry
            .register(RuleKind::Phony, "root", 1, |ctx, _| {
                ctx.need(&["left", "right"])?;
                Ok(TargetResult::Done)
            })
            .unwrap();

        let engine = engine_with(registry, &dir);
        engine.build("root").unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unresolvable_target_reported_by_name() {
        let dir = TempDir::new().unwrap();
        let engine = engine_with(Registry::new(), &dir);
        let err = engine.build("no/such/thing").unwrap_err();
        assert!(format!("{err}").contains("no/such/thing"));
    }
}
