//! External action primitives.
//!
//! Producers interact with the outside world through a small surface: spawn
//! a process and wait for it, remove a file, create directories. A non-zero
//! exit status is a build failure for the requesting target and is never
//! swallowed or retried here; retry policy belongs to whoever re-invokes the
//! top-level build.

use std::path::Path;
use std::process::Command;

use crate::error::{ActionError, ForgeResult};

/// An order-preserving option map rendered into an argument vector.
///
/// Boolean `true` options become bare flags, `false` options are omitted,
/// and valued options become a flag/value pair. Single-character keys get a
/// `-` prefix, longer keys `--`. The mapping is total and order-preserving
/// so invocations are reproducible.
#[derive(Debug, Clone, Default)]
pub struct ToolOptions {
    entries: Vec<(String, OptionValue)>,
}

#[derive(Debug, Clone)]
enum OptionValue {
    Flag(bool),
    Value(String),
}

impl ToolOptions {
    /// Creates an empty option map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a boolean flag option.
    #[must_use]
    pub fn flag(mut self, key: impl Into<String>, on: bool) -> Self {
        self.entries.push((key.into(), OptionValue::Flag(on)));
        self
    }

    /// Adds a valued option.
    #[must_use]
    pub fn value(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.entries
            .push((key.into(), OptionValue::Value(value.to_string())));
        self
    }

    /// Adds a valued option when `value` is present, nothing otherwise.
    #[must_use]
    pub fn maybe_value<T: ToString>(self, key: impl Into<String>, value: Option<T>) -> Self {
        match value {
            Some(v) => self.value(key, v),
            None => self,
        }
    }

    /// Renders the options into an argument vector.
    #[must_use]
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        for (key, value) in &self.entries {
            if matches!(value, OptionValue::Flag(false)) {
                continue;
            }
            if key.chars().count() == 1 {
                args.push(format!("-{key}"));
            } else {
                args.push(format!("--{key}"));
            }
            if let OptionValue::Value(v) = value {
                args.push(v.clone());
            }
        }
        args
    }
}

/// Runs an external process to completion, optionally in a working
/// directory, failing on any non-zero exit.
///
/// # Errors
/// - [`ActionError::SpawnFailed`] when the program cannot be launched.
/// - [`ActionError::ProcessFailed`] on a non-zero exit status.
/// - [`ActionError::ProcessKilled`] when the process dies without a status.
pub fn run_process(program: &str, args: &[String], cwd: Option<&Path>) -> ForgeResult<()> {
    let mut command = Command::new(program);
    command.args(args);
    if let Some(dir) = cwd {
        command.current_dir(dir);
    }

    let status = command.status().map_err(|e| ActionError::SpawnFailed {
        program: program.to_string(),
        message: e.to_string(),
    })?;

    if status.success() {
        return Ok(());
    }
    match status.code() {
        Some(code) => Err(ActionError::ProcessFailed {
            program: program.to_string(),
            status: code,
        }
        .into()),
        None => Err(ActionError::ProcessKilled {
            program: program.to_string(),
        }
        .into()),
    }
}

/// Removes a file, treating a missing file as already removed.
///
/// # Errors
/// Returns [`ActionError::Io`] for any failure other than `NotFound`.
pub fn remove_file(path: &Path) -> ForgeResult<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ActionError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        }
        .into()),
    }
}

/// Creates a directory and all of its parents.
///
/// # Errors
/// Returns [`ActionError::Io`] on failure.
pub fn make_dirs(path: &Path) -> ForgeResult<()> {
    std::fs::create_dir_all(path).map_err(|e| {
        ActionError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        }
        .into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_flag_and_value_mapping() {
        let opts = ToolOptions::new()
            .value("o", "out.otd")
            .flag("mono", true)
            .flag("pwid", false)
            .value("subfamily", "SC");
        assert_eq!(
            opts.to_args(),
            vec!["-o", "out.otd", "--mono", "--subfamily", "SC"]
        );
    }

    #[test]
    fn test_options_preserve_insertion_order() {
        let opts = ToolOptions::new()
            .value("main", "a.otf")
            .value("asian", "b.ttf")
            .value("ws", "c.ttf");
        assert_eq!(
            opts.to_args(),
            vec!["--main", "a.otf", "--asian", "b.ttf", "--ws", "c.ttf"]
        );
    }

    #[test]
    fn test_options_maybe_value() {
        let opts = ToolOptions::new()
            .maybe_value("CVT_PADDING", Some(64))
            .maybe_value::<u32>("FPGM_PADDING", None);
        assert_eq!(opts.to_args(), vec!["--CVT_PADDING", "64"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_run_process_success_and_failure() {
        run_process("true", &[], None).unwrap();

        let err = run_process("false", &[], None).unwrap_err();
        let msg = format!("{err}");
        assert!(msg.contains("exited with status 1"), "{msg}");
    }

    #[cfg(unix)]
    #[test]
    fn test_run_process_unknown_program() {
        let err = run_process("glyphforge-no-such-tool", &[], None).unwrap_err();
        assert!(format!("{err}").contains("failed to launch"));
    }

    #[cfg(unix)]
    #[test]
    fn test_run_process_respects_cwd() {
        let dir = tempfile::tempdir().unwrap();
        run_process(
            "sh",
            &["-c".to_string(), "pwd > marker.txt".to_string()],
            Some(dir.path()),
        )
        .unwrap();
        assert!(dir.path().join("marker.txt").exists());
    }

    #[test]
    fn test_remove_missing_file_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        remove_file(&dir.path().join("absent")).unwrap();
    }

    #[test]
    fn test_make_dirs_recursive() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b/c");
        make_dirs(&nested).unwrap();
        assert!(nested.is_dir());
    }
}
