//! Name resolution ledger
//!
//! Decides the on-disk name for each requested file name. Every accepted name
//! has a counter record `<meta_dir>/<name>.meta` holding the number of times the
//! name has been accepted; the N-th repeat of a name is stored as `<stem>_copyN.<ext>`.
//!
//! The ledger only looks at its own records, never at the data directory, so a
//! file placed there by hand can still collide with an assigned name.

use crate::error::LedgerError;
use crate::protocol::META_SUFFIX;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Outcome of [`NameLedger::resolve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub assigned_name: String,
    /// True when `assigned_name` differs from the requested name.
    pub was_copy: bool,
    /// Counter value persisted by this resolution.
    pub count: u64,
}

pub struct NameLedger {
    meta_dir: PathBuf,
    // Serializes read-modify-write per requested name
    name_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl NameLedger {
    pub fn new<P: AsRef<Path>>(meta_dir: P) -> Self {
        Self {
            meta_dir: meta_dir.as_ref().to_path_buf(),
            name_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn record_path(&self, requested: &str) -> PathBuf {
        self.meta_dir.join(format!("{requested}{META_SUFFIX}"))
    }

    /// Resolve `requested` to a destination name and bump its counter.
    ///
    /// `requested` must already be a validated bare file name. A corrupt or
    /// unreadable record fails the resolution and is not rewritten.
    pub fn resolve(&self, requested: &str) -> Result<Resolution, LedgerError> {
        let lock = self.name_lock(requested);
        let result = {
            let _guard = lock.lock();
            self.resolve_locked(requested)
        };
        self.release_lock(requested, lock);
        result
    }

    fn resolve_locked(&self, requested: &str) -> Result<Resolution, LedgerError> {
        let path = self.record_path(requested);
        let previous = read_count(&path)?;
        let (assigned_name, count) = match previous {
            None => (requested.to_string(), 1),
            Some(n) => {
                // A saturated counter cannot name another copy
                let Some(next) = n.checked_add(1) else {
                    return Err(LedgerError::Corrupt {
                        path,
                        content: n.to_string(),
                    });
                };
                (copy_name(requested, n), next)
            }
        };
        write_count(&self.meta_dir, &path, count)?;

        Ok(Resolution {
            was_copy: assigned_name != requested,
            assigned_name,
            count,
        })
    }

    fn name_lock(&self, requested: &str) -> Arc<Mutex<()>> {
        let mut locks = self.name_locks.lock();
        locks
            .entry(requested.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    // Give back a handle from `name_lock`. Handles are cloned and dropped only
    // under the table lock, so the last holder sees a count of one and removes
    // the entry.
    fn release_lock(&self, requested: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.name_locks.lock();
        drop(lock);
        if locks
            .get(requested)
            .map_or(false, |entry| Arc::strong_count(entry) == 1)
        {
            locks.remove(requested);
        }
    }

    #[cfg(test)]
    fn tracked_names(&self) -> usize {
        self.name_locks.lock().len()
    }
}

/// Split at the last `.`: `"a.b.tar.gz"` → `("a.b.tar", Some("gz"))`.
pub fn split_extension(name: &str) -> (&str, Option<&str>) {
    match name.rfind('.') {
        Some(pos) => (&name[..pos], Some(&name[pos + 1..])),
        None => (name, None),
    }
}

/// Insert `_copyN` before the extension, or append it when there is none.
pub fn copy_name(name: &str, n: u64) -> String {
    match split_extension(name) {
        (stem, Some(ext)) => format!("{stem}_copy{n}.{ext}"),
        (stem, None) => format!("{stem}_copy{n}"),
    }
}

fn read_count(path: &Path) -> Result<Option<u64>, LedgerError> {
    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(LedgerError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    let parsed = content.trim().parse::<u64>();
    match parsed {
        Ok(n) => Ok(Some(n)),
        Err(_) => Err(LedgerError::Corrupt {
            path: path.to_path_buf(),
            content,
        }),
    }
}

// Write to a temp file in the same directory and rename over the record, so a
// crash never leaves a truncated counter behind.
fn write_count(dir: &Path, path: &Path, count: u64) -> Result<(), LedgerError> {
    let write_err = |source| LedgerError::Write {
        path: path.to_path_buf(),
        source,
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
    tmp.write_all(count.to_string().as_bytes())
        .map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::thread;
    use tempfile::TempDir;

    #[test]
    fn test_repeated_requests_get_copy_suffixes() {
        let tmp = TempDir::new().unwrap();
        let ledger = NameLedger::new(tmp.path());

        let first = ledger.resolve("notes.txt").unwrap();
        assert_eq!(first.assigned_name, "notes.txt");
        assert!(!first.was_copy);

        let second = ledger.resolve("notes.txt").unwrap();
        assert_eq!(second.assigned_name, "notes_copy1.txt");
        assert!(second.was_copy);

        let third = ledger.resolve("notes.txt").unwrap();
        assert_eq!(third.assigned_name, "notes_copy2.txt");
        assert!(third.was_copy);
        assert_eq!(third.count, 3);
    }

    #[test]
    fn test_record_holds_decimal_count() {
        let tmp = TempDir::new().unwrap();
        let ledger = NameLedger::new(tmp.path());
        ledger.resolve("a.bin").unwrap();
        ledger.resolve("a.bin").unwrap();
        let content = fs::read_to_string(tmp.path().join("a.bin.meta")).unwrap();
        assert_eq!(content, "2");
    }

    #[test]
    fn test_split_extension_uses_last_dot() {
        assert_eq!(split_extension("a.b.tar.gz"), ("a.b.tar", Some("gz")));
        assert_eq!(split_extension("README"), ("README", None));
        assert_eq!(copy_name("a.b.tar.gz", 1), "a.b.tar_copy1.gz");
    }

    #[test]
    fn test_name_without_extension() {
        let tmp = TempDir::new().unwrap();
        let ledger = NameLedger::new(tmp.path());
        assert_eq!(ledger.resolve("README").unwrap().assigned_name, "README");
        assert_eq!(ledger.resolve("README").unwrap().assigned_name, "README_copy1");
    }

    #[test]
    fn test_ledger_survives_restart() {
        let tmp = TempDir::new().unwrap();
        NameLedger::new(tmp.path()).resolve("x.log").unwrap();
        let reopened = NameLedger::new(tmp.path());
        assert_eq!(reopened.resolve("x.log").unwrap().assigned_name, "x_copy1.log");
    }

    #[test]
    fn test_corrupt_record_is_left_untouched() {
        let tmp = TempDir::new().unwrap();
        let ledger = NameLedger::new(tmp.path());
        let record = ledger.record_path("bad.txt");
        fs::write(&record, "not a number").unwrap();

        match ledger.resolve("bad.txt") {
            Err(LedgerError::Corrupt { content, .. }) => assert_eq!(content, "not a number"),
            other => panic!("expected Corrupt, got {:?}", other),
        }
        assert_eq!(fs::read_to_string(&record).unwrap(), "not a number");
    }

    #[test]
    fn test_counter_at_max_is_corrupt() {
        let tmp = TempDir::new().unwrap();
        let ledger = NameLedger::new(tmp.path());
        let record = ledger.record_path("a.txt");
        fs::write(&record, u64::MAX.to_string()).unwrap();

        match ledger.resolve("a.txt") {
            Err(LedgerError::Corrupt { content, .. }) => {
                assert_eq!(content, u64::MAX.to_string())
            }
            other => panic!("expected Corrupt, got {:?}", other),
        }
        assert_eq!(fs::read_to_string(&record).unwrap(), u64::MAX.to_string());
    }

    #[test]
    fn test_name_locks_are_released() {
        let tmp = TempDir::new().unwrap();
        let ledger = Arc::new(NameLedger::new(tmp.path()));
        for i in 0..32 {
            ledger.resolve(&format!("one-off{i}.bin")).unwrap();
        }
        fs::write(ledger.record_path("bad.txt"), "junk").unwrap();
        assert!(ledger.resolve("bad.txt").is_err());
        assert_eq!(ledger.tracked_names(), 0);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ledger = Arc::clone(&ledger);
                thread::spawn(move || ledger.resolve("shared.txt").unwrap())
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(ledger.tracked_names(), 0);
        assert_eq!(ledger.resolve("shared.txt").unwrap().count, 9);
    }

    #[test]
    fn test_unwritable_store_fails() {
        let tmp = TempDir::new().unwrap();
        let ledger = NameLedger::new(tmp.path().join("missing"));
        assert!(matches!(
            ledger.resolve("a.txt"),
            Err(LedgerError::Write { .. })
        ));
    }

    #[test]
    fn test_concurrent_distinct_names_do_not_interfere() {
        let tmp = TempDir::new().unwrap();
        let ledger = Arc::new(NameLedger::new(tmp.path()));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let ledger = Arc::clone(&ledger);
                thread::spawn(move || ledger.resolve(&format!("file{i}.dat")).unwrap())
            })
            .collect();
        for h in handles {
            let res = h.join().unwrap();
            assert!(!res.was_copy);
            assert_eq!(res.count, 1);
        }
    }

    #[test]
    fn test_concurrent_same_name_assigns_distinct_names() {
        let tmp = TempDir::new().unwrap();
        let ledger = Arc::new(NameLedger::new(tmp.path()));
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let ledger = Arc::clone(&ledger);
                thread::spawn(move || ledger.resolve("same.txt").unwrap().assigned_name)
            })
            .collect();
        let names: HashSet<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(names.len(), 16);
        assert!(names.contains("same.txt"));
        assert!(names.contains("same_copy15.txt"));
    }
}
