//! Authentication transport
//!
//! [`AuthTransport`] is the network surface the session manager needs.
//! [`GraphQlClient`] implements it over HTTP.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

pub mod graphql;
#[cfg(test)]
pub mod mock;

pub use graphql::GraphQlClient;
#[cfg(test)]
pub use mock::MockAuthTransport;

/// Result type for transport calls
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Login, refresh and registration calls
#[async_trait]
pub trait AuthTransport: Send + Sync {
    /// Exchange credentials for a token pair
    async fn login(&self, username: &str, password: &str) -> ApiResult<TokenPair>;

    /// Exchange a refresh token for a new token pair
    async fn refresh(&self, refresh_token: &str) -> ApiResult<TokenPair>;

    /// Create an account; does not sign in
    async fn register(&self, username: &str, password: &str) -> ApiResult<RegisteredUser>;
}

/// Access and refresh token as issued by the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    /// Signed access token
    #[serde(rename = "token")]
    pub access_token: String,

    /// Opaque refresh token
    #[serde(rename = "refreshToken")]
    pub refresh_token: String,
}

/// Summary of a freshly created account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredUser {
    /// Server-side id; numeric ids are kept as decimal text
    #[serde(deserialize_with = "crate::session::identity::id_from_number_or_string")]
    pub id: String,
    pub username: String,
}
