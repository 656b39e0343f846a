//! Durable key-value storage backing the session.
//!
//! This module provides:
//! - `KeyValueStore`: the storage seam used by `TokenStore`
//! - `MemoryStore`: in-process map, lost when the process exits
//! - `FileStore`: a single JSON file, rewritten atomically on every change
//!
//! Multi-key writes and removals are applied as one unit so callers never
//! observe half of a session.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use anyhow::Result;

pub trait KeyValueStore: Send + Sync {
    /// Read a single value. `Ok(None)` means the key is absent.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write all entries as one unit.
    fn set_many(&self, entries: &[(&str, String)]) -> Result<()>;

    /// Remove all keys as one unit. Missing keys are ignored.
    fn remove_many(&self, keys: &[&str]) -> Result<()>;

    fn set(&self, key: &str, value: String) -> Result<()> {
        self.set_many(&[(key, value)])
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.remove_many(&[key])
    }
}
