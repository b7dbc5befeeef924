//! Durable key/value storage for session credentials
//!
//! The [`StorageBackend`] trait is the raw get/set/remove surface. The
//! [`CredentialStore`] layers the all-or-nothing credential record on top.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::StorageError;

pub mod credentials;
pub mod sqlite;

pub use credentials::{CredentialRecord, CredentialStore};
pub use sqlite::SqliteBackend;

type Result<T> = std::result::Result<T, StorageError>;

/// Synchronous key/value storage
pub trait StorageBackend: Send + Sync {
    /// Read a value
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a value, replacing any previous one
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Delete a value; deleting a missing key is not an error
    fn remove(&self, key: &str) -> Result<()>;

    /// Write several values as one unit.
    ///
    /// The default writes them one by one; backends that can do better should.
    fn set_many(&self, entries: &[(&str, &str)]) -> Result<()> {
        for (key, value) in entries {
            self.set(key, value)?;
        }
        Ok(())
    }

    /// Delete several values as one unit
    fn remove_many(&self, keys: &[&str]) -> Result<()> {
        for key in keys {
            self.remove(key)?;
        }
        Ok(())
    }
}

/// In-process storage that lives as long as the value does
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl StorageBackend for MemoryBackend {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.lock().map_err(|_| StorageError::Poisoned)?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.lock().map_err(|_| StorageError::Poisoned)?;
        entries.remove(key);
        Ok(())
    }

    fn set_many(&self, pairs: &[(&str, &str)]) -> Result<()> {
        // One lock for the batch so readers never see half of it
        let mut entries = self.entries.lock().map_err(|_| StorageError::Poisoned)?;
        for (key, value) in pairs {
            entries.insert((*key).to_string(), (*value).to_string());
        }
        Ok(())
    }

    fn remove_many(&self, keys: &[&str]) -> Result<()> {
        let mut entries = self.entries.lock().map_err(|_| StorageError::Poisoned)?;
        for key in keys {
            entries.remove(*key);
        }
        Ok(())
    }
}

/// Shared backends are backends too
impl<B: StorageBackend + ?Sized> StorageBackend for std::sync::Arc<B> {
    fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<()> {
        (**self).remove(key)
    }

    fn set_many(&self, entries: &[(&str, &str)]) -> Result<()> {
        (**self).set_many(entries)
    }

    fn remove_many(&self, keys: &[&str]) -> Result<()> {
        (**self).remove_many(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_set_get_remove() {
        let backend = MemoryBackend::new();
        assert_eq!(backend.get("token").unwrap(), None);

        backend.set("token", "abc").unwrap();
        assert_eq!(backend.get("token").unwrap(), Some("abc".to_string()));

        backend.set("token", "def").unwrap();
        assert_eq!(backend.get("token").unwrap(), Some("def".to_string()));

        backend.remove("token").unwrap();
        assert_eq!(backend.get("token").unwrap(), None);
        backend.remove("token").unwrap();
    }

    #[test]
    fn test_memory_batch_operations() {
        let backend = MemoryBackend::new();
        backend.set_many(&[("a", "1"), ("b", "2")]).unwrap();
        assert_eq!(backend.len(), 2);

        backend.remove_many(&["a", "b", "c"]).unwrap();
        assert!(backend.is_empty());
    }

    #[test]
    fn test_arc_backend_shares_state() {
        let shared = std::sync::Arc::new(MemoryBackend::new());
        let handle = shared.clone();
        handle.set("k", "v").unwrap();
        assert_eq!(shared.get("k").unwrap(), Some("v".to_string()));
    }
}
