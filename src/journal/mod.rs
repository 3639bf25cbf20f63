//! The build journal: persisted fingerprint store.
//!
//! The journal maps each built target to the fingerprint of its rule, of
//! everything it depended on at build time, and of its own output. It is
//! loaded once per run, appended to as targets complete (crash resilience),
//! and survives across runs to enable incremental rebuilds.
//!
//! Corruption policy: a record that cannot be read is never trusted. The
//! loader keeps every intact record, drops the corrupt tail with a warning,
//! and rewrites the file so subsequent appends land on a clean frame
//! boundary. Affected targets simply rebuild; correctness over speed.

mod codec;
mod file_lock;

pub use file_lock::FileLock;

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, ErrorKind, Seek, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ForgeResult, JournalError};
use crate::fingerprint::Fingerprint;

/// A recorded dependency edge: the dependency's target id and the
/// fingerprint it had when the dependent was built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepEdge {
    /// Dependency target id (`file:`-prefixed for raw source files).
    pub target: String,
    /// Fingerprint observed at build time.
    pub fingerprint: Fingerprint,
}

/// One persisted build record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildRecord {
    /// Target id this record describes.
    pub target: String,
    /// Fingerprint of the rule definition that built it.
    pub rule: Fingerprint,
    /// Every dependency requested during the build, in request order.
    pub deps: Vec<DepEdge>,
    /// Fingerprint of the produced output (file content, value, or dep set).
    pub output: Fingerprint,
    /// Serialized value for oracle/computed targets, reused on fresh skips.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    /// When the target completed.
    pub built_at: DateTime<Utc>,
}

impl BuildRecord {
    /// Creates a record timestamped now.
    #[must_use]
    pub fn new(
        target: impl Into<String>,
        rule: Fingerprint,
        deps: Vec<DepEdge>,
        output: Fingerprint,
        value: Option<serde_json::Value>,
    ) -> Self {
        Self {
            target: target.into(),
            rule,
            deps,
            output,
            value,
            built_at: Utc::now(),
        }
    }
}

/// The persisted fingerprint store.
///
/// Thread-safe: record appends from concurrently completing targets are
/// serialized through internal mutexes, and targets never share a record
/// key.
#[derive(Debug)]
pub struct Journal {
    path: PathBuf,
    records: Mutex<HashMap<String, BuildRecord>>,
    writer: Mutex<BufWriter<File>>,
    _lock: FileLock,
}

impl Journal {
    /// Opens (or creates) the journal at `path`, replaying existing records.
    ///
    /// The journal's directory is locked exclusively for the lifetime of
    /// this value, so two build processes cannot interleave appends.
    ///
    /// # Errors
    /// - [`JournalError::Locked`] when another process holds the lock.
    /// - [`JournalError::Open`] for filesystem failures. A *corrupt* journal
    ///   is not an error: intact records are kept, the rest is discarded.
    pub fn open(path: &Path) -> ForgeResult<Self> {
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(|e| JournalError::Open {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        let lock = FileLock::acquire(&dir).map_err(|e| {
            if e.kind() == ErrorKind::WouldBlock {
                JournalError::Locked {
                    path: path.display().to_string(),
                }
            } else {
                JournalError::Open {
                    path: path.display().to_string(),
                    message: e.to_string(),
                }
            }
        })?;

        let (records, dirty) = Self::replay(path);

        // Rewrite after a dirty load (corrupt tail dropped), and whenever the
        // file is missing or still empty: appends must always land after a
        // valid header.
        let headerless = std::fs::metadata(path).map_or(true, |m| m.len() == 0);
        if dirty || headerless {
            Self::rewrite(path, &records).map_err(|e| JournalError::Open {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        }

        let file = OpenOptions::new()
            .append(true)
            .open(path)
            .map_err(|e| JournalError::Open {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;

        Ok(Self {
            path: path.to_path_buf(),
            records: Mutex::new(records),
            writer: Mutex::new(BufWriter::new(file)),
            _lock: lock,
        })
    }

    /// Replays the journal file, returning the surviving records and whether
    /// anything unreadable was encountered.
    fn replay(path: &Path) -> (HashMap<String, BuildRecord>, bool) {
        let mut records = HashMap::new();

        let file = match File::open(path) {
            Ok(f) => f,
            Err(_) => return (records, false),
        };
        let len = file.metadata().map(|m| m.len()).unwrap_or(0);
        if len == 0 {
            return (records, false);
        }

        let mut reader = BufReader::new(file);
        if codec::read_header(&mut reader).is_err() {
            eprintln!(
                "journal: unreadable header in {}; treating all targets as stale",
                path.display()
            );
            return (records, true);
        }

        loop {
            let pos = reader.stream_position().unwrap_or(len);
            if pos >= len {
                return (records, false);
            }
            match codec::decode::<BuildRecord>(&mut reader) {
                Ok(record) => {
                    // Later appends for the same target replace earlier ones.
                    records.insert(record.target.clone(), record);
                }
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                    eprintln!(
                        "journal: truncated record in {}; dropping tail",
                        path.display()
                    );
                    return (records, true);
                }
                Err(e) => {
                    eprintln!(
                        "journal: corrupt record in {} ({e}); dropping tail",
                        path.display()
                    );
                    return (records, true);
                }
            }
        }
    }

    /// Rewrites the journal file from a record table, atomically via a
    /// sibling temp file.
    fn rewrite(path: &Path, records: &HashMap<String, BuildRecord>) -> std::io::Result<()> {
        let tmp = path.with_extension("tmp");
        {
            let file = File::create(&tmp)?;
            let mut writer = BufWriter::new(file);
            codec::write_header(&mut writer)?;
            let mut ordered: Vec<&BuildRecord> = records.values().collect();
            ordered.sort_by(|a, b| a.target.cmp(&b.target));
            for record in ordered {
                writer.write_all(&codec::encode(record)?)?;
            }
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        std::fs::rename(&tmp, path)
    }

    /// Looks up the persisted record for a target.
    #[must_use]
    pub fn lookup(&self, target: &str) -> Option<BuildRecord> {
        self.records.lock().unwrap().get(target).cloned()
    }

    /// Returns true if a record exists for `target`.
    #[must_use]
    pub fn contains(&self, target: &str) -> bool {
        self.records.lock().unwrap().contains_key(target)
    }

    /// Number of recorded targets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    /// Returns true if no targets are recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.lock().unwrap().is_empty()
    }

    /// Appends (or replaces) the record for one completed target and flushes
    /// it to disk immediately.
    ///
    /// # Errors
    /// Returns [`JournalError::Append`] on encode or write failure.
    pub fn record(&self, record: BuildRecord) -> ForgeResult<()> {
        let encoded = codec::encode(&record).map_err(|e| JournalError::Append {
            target: record.target.clone(),
            message: e.to_string(),
        })?;

        {
            let mut writer = self.writer.lock().unwrap();
            writer
                .write_all(&encoded)
                .and_then(|()| writer.flush())
                .map_err(|e| JournalError::Append {
                    target: record.target.clone(),
                    message: e.to_string(),
                })?;
        }

        self.records
            .lock()
            .unwrap()
            .insert(record.target.clone(), record);
        Ok(())
    }

    /// Compacts the journal: rewrites the file with exactly one record per
    /// target, dropping superseded appends.
    ///
    /// # Errors
    /// Returns [`JournalError::Compact`] on write failure.
    pub fn compact(&self) -> ForgeResult<()> {
        let mut writer = self.writer.lock().unwrap();
        let records = self.records.lock().unwrap();

        writer.flush().map_err(|e| JournalError::Compact {
            path: self.path.display().to_string(),
            message: e.to_string(),
        })?;

        Self::rewrite(&self.path, &records).map_err(|e| JournalError::Compact {
            path: self.path.display().to_string(),
            message: e.to_string(),
        })?;

        let file = OpenOptions::new().append(true).open(&self.path).map_err(|e| {
            JournalError::Compact {
                path: self.path.display().to_string(),
                message: e.to_string(),
            }
        })?;
        *writer = BufWriter::new(file);
        Ok(())
    }

    /// The journal file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample(target: &str, payload: &[u8]) -> BuildRecord {
        BuildRecord::new(
            target,
            Fingerprint::of_rule("FileRule", "build/*.ttf", 1),
            vec![DepEdge {
                target: "config".to_string(),
                fingerprint: Fingerprint::of_bytes(b"{}"),
            }],
            Fingerprint::of_bytes(payload),
            None,
        )
    }

    #[test]
    fn test_record_and_lookup_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("journal");

        {
            let journal = Journal::open(&path).unwrap();
            assert!(journal.is_empty());
            journal.record(sample("build/a.ttf", b"a")).unwrap();
            journal.record(sample("build/b.ttf", b"b")).unwrap();
            assert_eq!(journal.len(), 2);
        }

        let journal = Journal::open(&path).unwrap();
        assert_eq!(journal.len(), 2);
        let rec = journal.lookup("build/a.ttf").unwrap();
        assert_eq!(rec.deps[0].target, "config");
        assert!(journal.lookup("build/c.ttf").is_none());
    }

    #[test]
    fn test_later_append_replaces_earlier() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("journal");

        {
            let journal = Journal::open(&path).unwrap();
            journal.record(sample("build/a.ttf", b"v1")).unwrap();
            journal.record(sample("build/a.ttf", b"v2")).unwrap();
        }

        let journal = Journal::open(&path).unwrap();
        assert_eq!(journal.len(), 1);
        assert_eq!(
            journal.lookup("build/a.ttf").unwrap().output,
            Fingerprint::of_bytes(b"v2")
        );
    }

    #[test]
    fn test_corrupt_tail_keeps_intact_records() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("journal");

        {
            let journal = Journal::open(&path).unwrap();
            journal.record(sample("build/a.ttf", b"a")).unwrap();
            journal.record(sample("build/b.ttf", b"b")).unwrap();
        }

        // Chop bytes off the end: the second record becomes unreadable.
        let data = std::fs::read(&path).unwrap();
        std::fs::write(&path, &data[..data.len() - 7]).unwrap();

        let journal = Journal::open(&path).unwrap();
        assert_eq!(journal.len(), 1);
        assert!(journal.contains("build/a.ttf"));
        assert!(!journal.contains("build/b.ttf"));

        // Appends after recovery must survive another reopen.
        journal.record(sample("build/c.ttf", b"c")).unwrap();
        drop(journal);
        let journal = Journal::open(&path).unwrap();
        assert_eq!(journal.len(), 2);
    }

    #[test]
    fn test_preexisting_empty_file_gets_a_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("journal");
        std::fs::write(&path, b"").unwrap();

        {
            let journal = Journal::open(&path).unwrap();
            assert!(journal.is_empty());
            journal.record(sample("build/a.ttf", b"a")).unwrap();
        }

        let journal = Journal::open(&path).unwrap();
        assert_eq!(journal.len(), 1);
        assert!(journal.contains("build/a.ttf"));
    }

    #[test]
    fn test_garbage_file_means_everything_stale() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("journal");
        std::fs::write(&path, b"not a journal at all").unwrap();

        let journal = Journal::open(&path).unwrap();
        assert!(journal.is_empty());
    }

    #[test]
    fn test_compact_dedupes_appends() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("journal");

        let journal = Journal::open(&path).unwrap();
        for i in 0..10 {
            journal
                .record(sample("build/a.ttf", format!("v{i}").as_bytes()))
                .unwrap();
        }
        let before = std::fs::metadata(&path).unwrap().len();
        journal.compact().unwrap();
        let after = std::fs::metadata(&path).unwrap().len();
        assert!(after < before);

        journal.record(sample("build/d.ttf", b"d")).unwrap();
        drop(journal);
        let journal = Journal::open(&path).unwrap();
        assert_eq!(journal.len(), 2);
    }

    #[test]
    fn test_second_open_is_locked_out() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("journal");

        let _journal = Journal::open(&path).unwrap();
        let err = Journal::open(&path).unwrap_err();
        assert!(format!("{err}").contains("locked"));
    }
}
