//! This module provides the append-only record history and its durable
//! file mirror.
use super::format::LogRecord;
use crate::types::{LogEvent, Phase};
use anyhow::{Context, Result};
use chrono::Local;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{error, info};

/// Marker written to the durable file when a store is created.
pub const STARTUP_SENTINEL: &str = "=== LOG SERVER STARTED ===";
/// Marker written to the durable file when the history is cleared.
pub const CLEAR_SENTINEL: &str = "=== LOGS CLEARED ===";

/// A write-only destination that mirrors every record line.
pub trait LogMirror: Send + Sync {
    /// Appends a single line. The implementation adds the line terminator.
    ///
    /// # Errors
    ///
    /// This function will return an error if the line cannot be persisted.
    fn append_line(&self, line: &str) -> io::Result<()>;
}

/// A `LogMirror` that appends to a plain text file.
///
/// The file is opened, appended to and closed on every call so that no
/// buffered region outlives a single line.
pub struct FileMirror {
    path: PathBuf,
}

impl FileMirror {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl LogMirror for FileMirror {
    fn append_line(&self, line: &str) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(format!("{}\n", line).as_bytes())?;
        file.flush()
    }
}

/// The in-memory record history, mirrored to a `LogMirror`.
///
/// A single lock covers both the in-memory push and the mirror write, so the
/// durable file always lists records in the same order as the history.
pub struct LogStore {
    lines: Mutex<Vec<String>>,
    mirror: Box<dyn LogMirror>,
}

impl LogStore {
    /// Creates an empty store and writes the startup sentinel.
    ///
    /// # Errors
    ///
    /// This function will return an error if the startup sentinel cannot be
    /// written, since a mirror that is unusable from the start is a
    /// configuration problem rather than a transient one.
    pub fn new(mirror: Box<dyn LogMirror>) -> Result<Self> {
        mirror
            .append_line(STARTUP_SENTINEL)
            .context("Failed to write startup sentinel to the durable log")?;

        Ok(Self {
            lines: Mutex::new(Vec::new()),
            mirror,
        })
    }

    /// Opens a store mirrored to the file at `path`.
    ///
    /// # Errors
    ///
    /// This function will return an error if the file cannot be appended to.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        Self::new(Box::new(FileMirror::new(path)))
            .with_context(|| format!("Cannot use '{}' as durable log", path.display()))
    }

    /// Stamps, appends and mirrors a record, returning its rendered line.
    ///
    /// Mirror failures are logged and otherwise ignored: the record stays in
    /// memory either way.
    pub fn append(&self, phase: Phase, event: LogEvent) -> String {
        let line = LogRecord::stamped(Local::now(), phase, event).render();

        let mut lines = self.lock();
        lines.push(line.clone());
        if let Err(e) = self.mirror.append_line(&line) {
            error!("Failed to write record to durable log: {}", e);
        }
        drop(lines);

        info!("LOG: {}", line);
        line
    }

    /// Returns a snapshot of every record in insertion order.
    pub fn all_records(&self) -> Vec<String> {
        self.lock().clone()
    }

    /// Returns the records whose rendered line contains `source_id`.
    ///
    /// This is a literal substring match over the whole line, so an id that
    /// occurs inside another id, an operation or a detail also matches.
    pub fn records_matching(&self, source_id: &str) -> Vec<String> {
        self.lock()
            .iter()
            .filter(|line| line.contains(source_id))
            .cloned()
            .collect()
    }

    /// Empties the history and marks the wipe in the durable file.
    ///
    /// The file itself is never truncated.
    pub fn clear(&self) {
        let mut lines = self.lock();
        lines.clear();
        if let Err(e) = self.mirror.append_line(CLEAR_SENTINEL) {
            error!("Failed to write clear sentinel to durable log: {}", e);
        }
        drop(lines);

        info!("Logs cleared");
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<String>> {
        self.lines.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;

    /// A mirror whose writes can be made to fail on demand.
    struct FlakyMirror {
        broken: Arc<AtomicBool>,
        written: Arc<Mutex<Vec<String>>>,
    }

    impl LogMirror for FlakyMirror {
        fn append_line(&self, line: &str) -> io::Result<()> {
            if self.broken.load(Ordering::SeqCst) {
                return Err(io::Error::new(io::ErrorKind::Other, "disk full"));
            }
            self.written.lock().unwrap().push(line.to_string());
            Ok(())
        }
    }

    fn event(ts: i64, source: &str, op: &str, details: &[&str]) -> LogEvent {
        LogEvent::new(
            ts,
            source,
            op,
            details.iter().map(|d| d.to_string()).collect(),
        )
    }

    fn read_lines(path: &Path) -> Vec<String> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn open_writes_startup_sentinel() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("game_logs.txt");

        let store = LogStore::open(&path).unwrap();

        assert!(store.is_empty());
        assert_eq!(read_lines(&path), vec![STARTUP_SENTINEL.to_string()]);
    }

    #[test]
    fn open_fails_when_file_cannot_be_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("game_logs.txt");

        assert!(LogStore::open(&path).is_err());
    }

    #[test]
    fn reopening_appends_instead_of_truncating() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("game_logs.txt");

        let first = LogStore::open(&path).unwrap();
        first.append(Phase::Start, event(1, "g1", "op", &[]));
        drop(first);

        let second = LogStore::open(&path).unwrap();
        assert!(second.is_empty());

        let lines = read_lines(&path);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], STARTUP_SENTINEL);
        assert!(lines[1].ends_with("timestamp(1), ini, g1, op"));
        assert_eq!(lines[2], STARTUP_SENTINEL);
    }

    #[test]
    fn appends_preserve_submission_order_in_memory_and_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("game_logs.txt");
        let store = LogStore::open(&path).unwrap();

        store.append(Phase::Start, event(1000, "game-7", "move", &["e2e4"]));
        store.append(Phase::End, event(1500, "game-7", "move", &[]));

        let records = store.all_records();
        assert_eq!(records.len(), 2);
        assert!(records[0].contains("ini, game-7, move, e2e4"));
        assert!(records[1].contains("fin, game-7, move"));

        let file = read_lines(&path);
        assert_eq!(&file[1..], &records[..]);
    }

    #[test]
    fn substring_filter_includes_false_positives() {
        let dir = tempfile::tempdir().unwrap();
        let store = LogStore::open(dir.path().join("log.txt")).unwrap();

        store.append(Phase::Start, event(1, "game-1", "op", &[]));
        store.append(Phase::Start, event(2, "game-10", "op", &[]));
        store.append(Phase::Start, event(3, "game-2", "join", &["game-1-lobby"]));
        store.append(Phase::Start, event(4, "game-2", "op", &[]));

        let matching = store.records_matching("game-1");
        let expected: Vec<String> = store
            .all_records()
            .into_iter()
            .filter(|line| line.contains("game-1"))
            .collect();

        assert_eq!(matching, expected);
        assert_eq!(matching.len(), 3);
        assert!(store.records_matching("nobody").is_empty());
    }

    #[test]
    fn clear_empties_memory_and_appends_sentinel() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.txt");
        let store = LogStore::open(&path).unwrap();

        store.append(Phase::Start, event(1, "g", "op", &[]));
        store.clear();

        assert!(store.all_records().is_empty());
        let file = read_lines(&path);
        assert_eq!(file.len(), 3);
        assert_eq!(file[2], CLEAR_SENTINEL);

        store.append(Phase::End, event(2, "g", "op", &[]));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn mirror_failure_does_not_lose_records() {
        let broken = Arc::new(AtomicBool::new(false));
        let written = Arc::new(Mutex::new(Vec::new()));
        let store = LogStore::new(Box::new(FlakyMirror {
            broken: broken.clone(),
            written: written.clone(),
        }))
        .unwrap();

        store.append(Phase::Start, event(1, "g", "a", &[]));
        broken.store(true, Ordering::SeqCst);
        store.append(Phase::End, event(2, "g", "a", &[]));
        store.clear();
        store.append(Phase::Start, event(3, "g", "b", &[]));

        assert_eq!(store.len(), 1);
        assert!(store.all_records()[0].contains("timestamp(3)"));
        // Sentinel plus the single record written while the mirror was healthy.
        assert_eq!(written.lock().unwrap().len(), 2);
    }

    #[test]
    fn startup_sentinel_failure_is_fatal() {
        let store = LogStore::new(Box::new(FlakyMirror {
            broken: Arc::new(AtomicBool::new(true)),
            written: Arc::new(Mutex::new(Vec::new())),
        }));

        assert!(store.is_err());
    }

    #[test]
    fn file_disappearing_mid_run_keeps_memory_available() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("logs");
        std::fs::create_dir(&sub).unwrap();
        let store = LogStore::open(sub.join("log.txt")).unwrap();

        store.append(Phase::Start, event(1, "g", "op", &[]));
        std::fs::remove_dir_all(&sub).unwrap();
        store.append(Phase::End, event(2, "g", "op", &[]));

        assert_eq!(store.len(), 2);
    }

    #[test]
    fn concurrent_appends_are_all_recorded_once() {
        const WORKERS: usize = 8;
        const PER_WORKER: usize = 200;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.txt");
        let store = Arc::new(LogStore::open(&path).unwrap());

        let handles: Vec<_> = (0..WORKERS)
            .map(|w| {
                let store = store.clone();
                thread::spawn(move || {
                    for i in 0..PER_WORKER {
                        store.append(
                            Phase::Start,
                            event(i as i64, &format!("w{}", w), &format!("op{}", i), &[]),
                        );
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let records = store.all_records();
        assert_eq!(records.len(), WORKERS * PER_WORKER);

        let bodies: HashSet<String> = records
            .iter()
            .map(|line| line.split_once("] ").unwrap().1.to_string())
            .collect();
        assert_eq!(bodies.len(), WORKERS * PER_WORKER);

        // Per-worker order is preserved even though workers interleave.
        for w in 0..WORKERS {
            let id = format!(", w{}, ", w);
            let ops: Vec<String> = records
                .iter()
                .filter(|line| line.contains(&id))
                .map(|line| line.rsplit(", ").next().unwrap().to_string())
                .collect();
            let expected: Vec<String> = (0..PER_WORKER).map(|i| format!("op{}", i)).collect();
            assert_eq!(ops, expected);
        }

        let file = read_lines(&path);
        assert_eq!(&file[1..], &records[..]);
    }

    #[test]
    fn appends_racing_a_clear_never_tear_records() {
        const WORKERS: usize = 4;
        const PER_WORKER: usize = 100;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.txt");
        let store = Arc::new(LogStore::open(&path).unwrap());

        let mut handles: Vec<_> = (0..WORKERS)
            .map(|w| {
                let store = store.clone();
                thread::spawn(move || {
                    for i in 0..PER_WORKER {
                        store.append(Phase::End, event(i as i64, &format!("w{}", w), "op", &[]));
                    }
                })
            })
            .collect();
        let clearer = store.clone();
        handles.push(thread::spawn(move || clearer.clear()));
        for handle in handles {
            handle.join().unwrap();
        }

        // Memory holds exactly what was appended after the clear, and the file
        // holds every record plus both sentinels.
        let file = read_lines(&path);
        assert_eq!(file.len(), WORKERS * PER_WORKER + 2);
        let clear_at = file.iter().position(|l| l == CLEAR_SENTINEL).unwrap();
        assert_eq!(&file[clear_at + 1..], &store.all_records()[..]);

        for line in file.iter().filter(|l| l.starts_with('[')) {
            assert!(line.contains("), fin, w"));
            assert!(line.ends_with(", op"));
        }
    }
}
