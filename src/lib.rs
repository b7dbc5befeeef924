//! tokenkeeper: client-side session manager with proactive token renewal
//!
//! The [`session::SessionManager`] owns the login session. It stores
//! credentials through a [`storage::StorageBackend`], publishes the signed-in
//! [`session::Identity`], renews tokens ahead of expiry and signs out when the
//! session lifetime runs out.

pub mod client;
pub mod config;
pub mod error;
pub mod session;
pub mod storage;

pub use client::{AuthTransport, GraphQlClient, RegisteredUser, TokenPair};
pub use config::Config;
pub use error::{Error, Result};
pub use session::{Identity, Navigator, Role, SessionManager, SessionSettings};
pub use storage::{CredentialRecord, CredentialStore, MemoryBackend, SqliteBackend, StorageBackend};
