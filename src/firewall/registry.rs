//! File-based registry of per-container session domains.
//!
//! Each running container that was granted extra domains gets one file,
//! `<dir>/<container>.urls`, holding newline-separated entries. Nothing is
//! cached in memory: every call reads the directory, so a restarted broker
//! sees exactly what the previous one granted and aggregation across
//! sessions is a directory listing.

use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::error::{FirewallError, FirewallResult};

/// Extension of session URL files.
const SESSION_FILE_EXT: &str = "urls";

/// Directory-backed session URL registry.
#[derive(Debug, Clone)]
pub struct SessionRegistry {
    dir: PathBuf,
}

impl SessionRegistry {
    /// Create a registry rooted at `dir`. The directory is created lazily.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the session files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Replace the container's session file with `urls`.
    pub fn register(&self, container: &str, urls: &[String]) -> FirewallResult<()> {
        let path = self.path_for(container)?;
        let entries: BTreeSet<&str> = urls
            .iter()
            .map(|u| u.trim())
            .filter(|u| !u.is_empty())
            .collect();

        fs::create_dir_all(&self.dir).map_err(|e| io_error(&self.dir, e))?;

        let mut contents = String::new();
        for entry in entries {
            contents.push_str(entry);
            contents.push('\n');
        }
        write_atomic(&path, contents.as_bytes())?;

        debug!("Registered session URLs for {} at {:?}", container, path);
        Ok(())
    }

    /// Append a single entry to the container's session file.
    pub fn add(&self, container: &str, url: &str) -> FirewallResult<()> {
        let mut urls = self.read(container)?;
        if !urls.iter().any(|u| u == url) {
            urls.push(url.to_string());
        }
        self.register(container, &urls)
    }

    /// Entries registered for one container. Missing file means none.
    pub fn read(&self, container: &str) -> FirewallResult<Vec<String>> {
        let path = self.path_for(container)?;
        read_entries(&path)
    }

    /// Delete the container's session file. Missing file is not an error.
    pub fn remove(&self, container: &str) -> FirewallResult<()> {
        let path = self.path_for(container)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!("Removed session URLs for {}", container);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(&path, e)),
        }
    }

    /// Union of every container's entries.
    pub fn aggregate(&self) -> FirewallResult<BTreeSet<String>> {
        let mut all = BTreeSet::new();
        for path in self.session_files()? {
            all.extend(read_entries(&path)?);
        }
        Ok(all)
    }

    /// Delete every session file.
    pub fn clear_all(&self) -> FirewallResult<()> {
        for path in self.session_files()? {
            if let Err(e) = fs::remove_file(&path)
                && e.kind() != std::io::ErrorKind::NotFound
            {
                warn!("Failed to remove session file {:?}: {}", path, e);
            }
        }
        Ok(())
    }

    fn session_files(&self) -> FirewallResult<Vec<PathBuf>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error(&self.dir, e)),
        };

        let mut files: Vec<PathBuf> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension().and_then(|e| e.to_str()) == Some(SESSION_FILE_EXT)
            })
            .collect();
        files.sort();
        Ok(files)
    }

    fn path_for(&self, container: &str) -> FirewallResult<PathBuf> {
        validate_container_name(container)?;
        Ok(self.dir.join(format!("{container}.{SESSION_FILE_EXT}")))
    }
}

/// Container names become file names, so keep them to a safe alphabet.
pub fn validate_container_name(name: &str) -> FirewallResult<()> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));

    if valid {
        Ok(())
    } else {
        Err(FirewallError::InvalidContainerName(name.to_string()))
    }
}

fn read_entries(path: &Path) -> FirewallResult<Vec<String>> {
    match fs::read_to_string(path) {
        Ok(contents) => Ok(contents
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(io_error(path, e)),
    }
}

/// Write via a sibling temp file and rename so readers never see a
/// half-written file.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> FirewallResult<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| io_error(dir, e))?;
    tmp.write_all(contents).map_err(|e| io_error(path, e))?;
    tmp.persist(path).map_err(|e| io_error(path, e.error))?;
    Ok(())
}

fn io_error(path: &Path, source: std::io::Error) -> FirewallError {
    FirewallError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_aggregate_across_containers() {
        let dir = tempdir().unwrap();
        let registry = SessionRegistry::new(dir.path().join("sessions"));

        registry.register("agent-x", &strings(&["a.com", "b.com"])).unwrap();
        registry.register("agent-y", &strings(&["b.com", "c.com"])).unwrap();

        let all: Vec<String> = registry.aggregate().unwrap().into_iter().collect();
        assert_eq!(all, strings(&["a.com", "b.com", "c.com"]));

        registry.remove("agent-x").unwrap();
        let all: Vec<String> = registry.aggregate().unwrap().into_iter().collect();
        assert_eq!(all, strings(&["b.com", "c.com"]));
    }

    #[test]
    fn test_aggregate_missing_dir_is_empty() {
        let dir = tempdir().unwrap();
        let registry = SessionRegistry::new(dir.path().join("never-created"));
        assert!(registry.aggregate().unwrap().is_empty());
    }

    #[test]
    fn test_add_appends_once() {
        let dir = tempdir().unwrap();
        let registry = SessionRegistry::new(dir.path());

        registry.add("agent", ".example.com").unwrap();
        registry.add("agent", ".example.com").unwrap();
        registry.add("agent", ".other.com").unwrap();

        assert_eq!(
            registry.read("agent").unwrap(),
            strings(&[".example.com", ".other.com"])
        );
    }

    #[test]
    fn test_file_is_newline_separated() {
        let dir = tempdir().unwrap();
        let registry = SessionRegistry::new(dir.path());

        registry.register("agent", &strings(&["x.io", "y.io"])).unwrap();

        let contents = fs::read_to_string(dir.path().join("agent.urls")).unwrap();
        assert_eq!(contents, "x.io\ny.io\n");
    }

    #[test]
    fn test_remove_missing_is_ok() {
        let dir = tempdir().unwrap();
        let registry = SessionRegistry::new(dir.path());
        assert!(registry.remove("ghost").is_ok());
    }

    #[test]
    fn test_clear_all_ignores_foreign_files() {
        let dir = tempdir().unwrap();
        let registry = SessionRegistry::new(dir.path());
        registry.register("one", &strings(&["a.com"])).unwrap();
        registry.register("two", &strings(&["b.com"])).unwrap();
        fs::write(dir.path().join("notes.txt"), "keep me").unwrap();

        registry.clear_all().unwrap();

        assert!(registry.aggregate().unwrap().is_empty());
        assert!(dir.path().join("notes.txt").exists());
    }

    #[test]
    fn test_rejects_path_like_container_names() {
        let dir = tempdir().unwrap();
        let registry = SessionRegistry::new(dir.path());

        assert!(registry.register("../escape", &[]).is_err());
        assert!(registry.register(".hidden", &[]).is_err());
        assert!(registry.register("", &[]).is_err());
        assert!(registry.register("ok_name-1.2", &[]).is_ok());
    }
}
