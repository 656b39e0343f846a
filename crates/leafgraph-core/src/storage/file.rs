use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use tracing::debug;

use super::KeyValueStore;

/// Durable storage in a single JSON object file.
///
/// Every mutation reads the current map, applies the change and writes the
/// whole file to a sibling temp file before renaming it over the original,
/// so a reader sees either the old map or the new one.
pub struct FileStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> Result<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let contents = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read storage file: {}", self.path.display()))?;
        if contents.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse storage file: {}", self.path.display()))
    }

    fn write_map(&self, map: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let contents = serde_json::to_string_pretty(map)?;
        std::fs::write(&tmp, contents)
            .with_context(|| format!("Failed to write storage file: {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace storage file: {}", self.path.display()))?;
        debug!(path = %self.path.display(), keys = map.len(), "Storage file written");
        Ok(())
    }

    /// Read the map for a mutation. A corrupt file is replaced rather than
    /// blocking writes forever.
    fn read_map_for_update(&self) -> BTreeMap<String, String> {
        match self.read_map() {
            Ok(map) => map,
            Err(e) => {
                debug!(error = %e, "Discarding unreadable storage file");
                BTreeMap::new()
            }
        }
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let _guard = self.lock.lock().map_err(|_| anyhow!("file store lock poisoned"))?;
        Ok(self.read_map()?.remove(key))
    }

    fn set_many(&self, entries: &[(&str, String)]) -> Result<()> {
        let _guard = self.lock.lock().map_err(|_| anyhow!("file store lock poisoned"))?;
        let mut map = self.read_map_for_update();
        for (key, value) in entries {
            map.insert((*key).to_string(), value.clone());
        }
        self.write_map(&map)
    }

    fn remove_many(&self, keys: &[&str]) -> Result<()> {
        let _guard = self.lock.lock().map_err(|_| anyhow!("file store lock poisoned"))?;
        let mut map = self.read_map_for_update();
        for key in keys {
            map.remove(*key);
        }
        self.write_map(&map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_values_survive_a_new_instance() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.json");

        let store = FileStore::new(&path);
        store
            .set_many(&[("a", "1".to_string()), ("b", "2".to_string())])
            .unwrap();

        let reopened = FileStore::new(&path);
        assert_eq!(reopened.get("a").unwrap().as_deref(), Some("1"));
        assert_eq!(reopened.get("b").unwrap().as_deref(), Some("2"));
    }

    #[test]
    fn test_remove_many() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("storage.json"));
        store
            .set_many(&[("a", "1".to_string()), ("b", "2".to_string()), ("c", "3".to_string())])
            .unwrap();

        store.remove_many(&["a", "b"]).unwrap();
        assert!(store.get("a").unwrap().is_none());
        assert!(store.get("b").unwrap().is_none());
        assert_eq!(store.get("c").unwrap().as_deref(), Some("3"));
    }

    #[test]
    fn test_missing_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("nested").join("storage.json"));
        assert!(store.get("a").unwrap().is_none());
    }

    #[test]
    fn test_corrupt_file_errors_on_read_and_heals_on_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = FileStore::new(&path);
        assert!(store.get("a").is_err());

        store.remove_many(&["a"]).unwrap();
        assert!(store.get("a").unwrap().is_none());
    }
}
