//! Credential record persistence
//!
//! A record is four keys that are written together and read together. A read
//! that finds any of them missing or unreadable reports no record at all.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::StorageBackend;
use crate::error::StorageError;
use crate::session::Identity;

const TOKEN_KEY: &str = "token";
const REFRESH_TOKEN_KEY: &str = "refreshToken";
const EXPIRATION_KEY: &str = "tokenExpiration";
const USER_KEY: &str = "user";

const ALL_KEYS: [&str; 4] = [TOKEN_KEY, REFRESH_TOKEN_KEY, EXPIRATION_KEY, USER_KEY];

/// Everything needed to resume a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub identity: Identity,
}

impl CredentialRecord {
    /// Whether the client-assigned expiry has passed
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }

    /// Time left before expiry, zero once expired
    pub fn time_until_expiry(&self) -> chrono::Duration {
        (self.expires_at - Utc::now()).max(chrono::Duration::zero())
    }
}

enum Loaded {
    Record(CredentialRecord),
    Empty,
    Damaged(String),
}

/// Reads and writes [`CredentialRecord`]s through a storage backend
#[derive(Clone)]
pub struct CredentialStore {
    backend: Arc<dyn StorageBackend>,
}

impl CredentialStore {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    /// Persist all four fields in one batch
    pub fn save(&self, record: &CredentialRecord) -> Result<(), StorageError> {
        let expires_at = record.expires_at.to_rfc3339();
        let identity = serde_json::to_string(&record.identity)
            .map_err(|e| StorageError::Encode(e.to_string()))?;

        self.backend.set_many(&[
            (TOKEN_KEY, record.access_token.as_str()),
            (REFRESH_TOKEN_KEY, record.refresh_token.as_str()),
            (EXPIRATION_KEY, expires_at.as_str()),
            (USER_KEY, identity.as_str()),
        ])
    }

    /// Load the full record, or `None` if anything is missing or malformed.
    ///
    /// Leftovers of an incomplete or unreadable record are removed so the next
    /// read starts clean.
    pub fn load(&self) -> Option<CredentialRecord> {
        match self.try_load() {
            Ok(Loaded::Record(record)) => Some(record),
            Ok(Loaded::Empty) => None,
            Ok(Loaded::Damaged(reason)) => {
                log::warn!("Discarding stored session: {}", reason);
                if let Err(e) = self.clear() {
                    log::warn!("Failed to discard stored session: {}", e);
                }
                None
            }
            Err(e) => {
                log::warn!("Ignoring unreadable stored session: {}", e);
                None
            }
        }
    }

    fn try_load(&self) -> Result<Loaded, StorageError> {
        let fields = (
            self.backend.get(TOKEN_KEY)?,
            self.backend.get(REFRESH_TOKEN_KEY)?,
            self.backend.get(EXPIRATION_KEY)?,
            self.backend.get(USER_KEY)?,
        );

        let (access_token, refresh_token, expiration, user) = match fields {
            (Some(a), Some(r), Some(e), Some(u)) => (a, r, e, u),
            (None, None, None, None) => return Ok(Loaded::Empty),
            _ => return Ok(Loaded::Damaged("record is incomplete".to_string())),
        };

        let expires_at = match DateTime::parse_from_rfc3339(&expiration) {
            Ok(ts) => ts.with_timezone(&Utc),
            Err(e) => {
                return Ok(Loaded::Damaged(format!(
                    "expiration '{}' is malformed: {}",
                    expiration, e
                )));
            }
        };

        let identity: Identity = match serde_json::from_str(&user) {
            Ok(identity) => identity,
            Err(e) => return Ok(Loaded::Damaged(format!("identity is malformed: {}", e))),
        };

        Ok(Loaded::Record(CredentialRecord {
            access_token,
            refresh_token,
            expires_at,
            identity,
        }))
    }

    /// Remove every credential field
    pub fn clear(&self) -> Result<(), StorageError> {
        self.backend.remove_many(&ALL_KEYS)
    }

    /// Current access token, if a complete record is stored
    pub fn access_token(&self) -> Option<String> {
        self.load().map(|r| r.access_token)
    }

    /// Current refresh token, if a complete record is stored
    pub fn refresh_token(&self) -> Option<String> {
        self.load().map(|r| r.refresh_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Role;
    use crate::storage::MemoryBackend;

    fn sample_record() -> CredentialRecord {
        CredentialRecord {
            access_token: "header.payload.sig".to_string(),
            refresh_token: "refresh-1".to_string(),
            expires_at: DateTime::parse_from_rfc3339("2030-01-01T12:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
            identity: Identity {
                id: "42".to_string(),
                username: "alice".to_string(),
                role: Role::admin(),
            },
        }
    }

    fn store() -> (CredentialStore, Arc<MemoryBackend>) {
        let backend = Arc::new(MemoryBackend::new());
        (CredentialStore::new(backend.clone()), backend)
    }

    #[test]
    fn test_round_trip() {
        let (store, _) = store();
        let record = sample_record();
        store.save(&record).unwrap();
        assert_eq!(store.load(), Some(record));
    }

    #[test]
    fn test_round_trip_sqlite() {
        let dir = tempfile::TempDir::new().unwrap();
        let backend = Arc::new(crate::storage::SqliteBackend::open_at(dir.path()).unwrap());
        let store = CredentialStore::new(backend);
        let record = sample_record();
        store.save(&record).unwrap();
        assert_eq!(store.load(), Some(record));
    }

    #[test]
    fn test_missing_field_means_absent() {
        let (store, backend) = store();
        store.save(&sample_record()).unwrap();
        backend.remove(REFRESH_TOKEN_KEY).unwrap();
        assert_eq!(store.load(), None);
        assert_eq!(store.access_token(), None);
        assert!(backend.is_empty());
    }

    #[test]
    fn test_corrupt_timestamp_means_absent() {
        let (store, backend) = store();
        store.save(&sample_record()).unwrap();
        backend.set(EXPIRATION_KEY, "not-a-date").unwrap();
        assert_eq!(store.load(), None);
        assert!(backend.is_empty());
    }

    #[test]
    fn test_corrupt_identity_means_absent() {
        let (store, backend) = store();
        store.save(&sample_record()).unwrap();
        backend.set(USER_KEY, "{\"id\":").unwrap();
        assert_eq!(store.load(), None);
    }

    #[test]
    fn test_clear_removes_everything() {
        let (store, backend) = store();
        store.save(&sample_record()).unwrap();
        assert_eq!(backend.len(), 4);

        store.clear().unwrap();
        assert!(backend.is_empty());
        assert_eq!(store.load(), None);
    }

    #[test]
    fn test_token_accessors() {
        let (store, _) = store();
        assert_eq!(store.refresh_token(), None);
        store.save(&sample_record()).unwrap();
        assert_eq!(store.access_token().as_deref(), Some("header.payload.sig"));
        assert_eq!(store.refresh_token().as_deref(), Some("refresh-1"));
    }

    #[test]
    fn test_expiry_helpers() {
        let mut record = sample_record();
        assert!(!record.is_expired());

        record.expires_at = Utc::now() - chrono::Duration::minutes(1);
        assert!(record.is_expired());
        assert_eq!(record.time_until_expiry(), chrono::Duration::zero());
    }
}
