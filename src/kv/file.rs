//! JSON-file scratch store.
//!
//! The whole store is one JSON object (`{"key": "value", ...}`). Every
//! mutation rewrites it through a sibling temp file and a rename, so a crash
//! leaves either the old or the new contents. Keys iterate in sorted order.
//!
//! One broker process runs per container and all of them share the file.
//! An open handle holds an exclusive advisory lock on `<file>.lock` until it
//! is closed, so read-modify-write cycles from different processes never
//! interleave. Opening blocks while another handle is open.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::debug;

use super::backend::{KvBackend, KvStore};
use super::error::{KvError, KvResult};

/// Scratch store persisted at one file path.
#[derive(Debug, Clone)]
pub struct FileKv {
    path: PathBuf,
}

impl FileKv {
    /// Store at `path`; the file and its directory are created on first
    /// write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Default location under the user's data directory.
    pub fn default_path() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("sandbox-broker")
            .join("kv.json")
    }

    /// Path of the store file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the sibling lock file.
    pub fn lock_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".lock");
        self.path.with_file_name(name)
    }

    fn lock(&self) -> KvResult<File> {
        let lock_path = self.lock_path();
        let io_error = |source| KvError::Io {
            path: lock_path.clone(),
            source,
        };

        if let Some(dir) = lock_path.parent() {
            fs::create_dir_all(dir).map_err(io_error)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(io_error)?;
        file.lock_exclusive().map_err(io_error)?;
        Ok(file)
    }
}

impl KvBackend for FileKv {
    fn open(&self) -> KvResult<Box<dyn KvStore>> {
        let lock = self.lock()?;
        let entries = match fs::read_to_string(&self.path) {
            Ok(contents) if contents.trim().is_empty() => BTreeMap::new(),
            Ok(contents) => serde_json::from_str(&contents).map_err(|source| KvError::Corrupt {
                path: self.path.clone(),
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => {
                return Err(KvError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        Ok(Box::new(FileStore {
            path: self.path.clone(),
            entries,
            _lock: lock,
        }))
    }
}

struct FileStore {
    path: PathBuf,
    entries: BTreeMap<String, String>,
    /// Released when the handle is dropped.
    _lock: File,
}

impl FileStore {
    fn flush(&self) -> KvResult<()> {
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let io_error = |source| KvError::Io {
            path: self.path.clone(),
            source,
        };

        fs::create_dir_all(dir).map_err(io_error)?;
        let contents = serde_json::to_vec_pretty(&self.entries)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(io_error)?;
        tmp.write_all(&contents).map_err(io_error)?;
        tmp.persist(&self.path).map_err(|e| io_error(e.error))?;

        debug!("Wrote {} scratch entries to {:?}", self.entries.len(), self.path);
        Ok(())
    }
}

impl KvStore for FileStore {
    fn get(&self, key: &str) -> KvResult<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> KvResult<()> {
        self.entries.insert(key.to_string(), value.to_string());
        self.flush()
    }

    fn delete(&mut self, key: &str) -> KvResult<()> {
        if self.entries.remove(key).is_some() {
            self.flush()?;
        }
        Ok(())
    }

    fn iterate(&self, prefix: &str, visitor: &mut dyn FnMut(&str, &str)) -> KvResult<()> {
        for (key, value) in self.entries.range(prefix.to_string()..) {
            if !key.starts_with(prefix) {
                break;
            }
            visitor(key, value);
        }
        Ok(())
    }

    fn close(self: Box<Self>) -> KvResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_is_empty_store() {
        let dir = tempdir().unwrap();
        let kv = FileKv::new(dir.path().join("absent.json"));
        let store = kv.open().unwrap();
        assert_eq!(store.get("k").unwrap(), None);
    }

    #[test]
    fn test_mutations_persist_across_opens() {
        let dir = tempdir().unwrap();
        let kv = FileKv::new(dir.path().join("nested").join("kv.json"));

        let mut store = kv.open().unwrap();
        store.set("a", "1").unwrap();
        store.set("b", "2").unwrap();
        store.delete("a").unwrap();
        store.close().unwrap();

        let store = kv.open().unwrap();
        assert_eq!(store.get("a").unwrap(), None);
        assert_eq!(store.get("b").unwrap().as_deref(), Some("2"));
    }

    #[test]
    fn test_iterate_by_prefix() {
        let dir = tempdir().unwrap();
        let kv = FileKv::new(dir.path().join("kv.json"));
        let mut store = kv.open().unwrap();
        for key in ["app/x", "app/y", "apq", "ap", "other"] {
            store.set(key, "v").unwrap();
        }

        let mut seen = Vec::new();
        store
            .iterate("app/", &mut |k, _| seen.push(k.to_string()))
            .unwrap();
        assert_eq!(seen, vec!["app/x", "app/y"]);

        let mut all = 0;
        store.iterate("", &mut |_, _| all += 1).unwrap();
        assert_eq!(all, 5);
    }

    #[test]
    fn test_concurrent_handles_do_not_lose_writes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("kv.json");
        let first = FileKv::new(&path);
        let second = FileKv::new(&path);

        let mut a = first.open().unwrap();
        let (opened_tx, opened_rx) = std::sync::mpsc::channel();
        let writer = std::thread::spawn(move || {
            let mut b = second.open().unwrap();
            opened_tx.send(()).unwrap();
            b.set("from_b", "2").unwrap();
            b.close().unwrap();
        });

        // The second handle waits on the lock while the first is open.
        assert!(opened_rx
            .recv_timeout(std::time::Duration::from_millis(200))
            .is_err());
        a.set("from_a", "1").unwrap();
        a.close().unwrap();
        writer.join().unwrap();

        let store = first.open().unwrap();
        assert_eq!(store.get("from_a").unwrap().as_deref(), Some("1"));
        assert_eq!(store.get("from_b").unwrap().as_deref(), Some("2"));
    }

    #[test]
    fn test_lock_file_sits_next_to_store() {
        let kv = FileKv::new("/var/lib/broker/kv.json");
        assert_eq!(kv.lock_path(), PathBuf::from("/var/lib/broker/kv.json.lock"));
    }

    #[test]
    fn test_corrupt_file_is_reported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("kv.json");
        fs::write(&path, "[1,2,3]").unwrap();
        assert!(matches!(
            FileKv::new(&path).open(),
            Err(KvError::Corrupt { .. })
        ));
    }
}
