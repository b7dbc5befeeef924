//! Identity extraction from access tokens
//!
//! Tokens are compact `header.payload.signature` strings. Only the payload is
//! read; the signature is the server's business.

use std::fmt;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};

use crate::error::DecodeError;

/// Prefix the server puts in front of role claims
const ROLE_PREFIX: &str = "ROLE_";

/// Role of the signed-in user. Open set; `USER` and `ADMIN` are the known ones.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(String);

impl Role {
    pub const USER: &'static str = "USER";
    pub const ADMIN: &'static str = "ADMIN";

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn user() -> Self {
        Self::new(Self::USER)
    }

    pub fn admin() -> Self {
        Self::new(Self::ADMIN)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_admin(&self) -> bool {
        self.0 == Self::ADMIN
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who the current access token belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub username: String,
    pub role: Role,
}

impl Identity {
    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}

/// User ids arrive as either JSON numbers or strings
#[derive(Deserialize)]
#[serde(untagged)]
enum ClaimId {
    Number(i64),
    Text(String),
}

impl From<ClaimId> for String {
    fn from(id: ClaimId) -> Self {
        match id {
            ClaimId::Number(n) => n.to_string(),
            ClaimId::Text(s) => s,
        }
    }
}

/// Deserialize a numeric or string id into its decimal text
pub(crate) fn id_from_number_or_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    ClaimId::deserialize(deserializer).map(String::from)
}

#[derive(Deserialize)]
struct Claims {
    sub: String,
    #[serde(rename = "userId", deserialize_with = "id_from_number_or_string")]
    user_id: String,
    #[serde(default)]
    roles: Option<Vec<String>>,
}

/// Decode the identity carried by an access token
pub fn decode(access_token: &str) -> Result<Identity, DecodeError> {
    let mut parts = access_token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(DecodeError::Malformed);
    };

    // Some issuers pad the segment even though the format says not to
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| DecodeError::Encoding(e.to_string()))?;

    let claims: Claims =
        serde_json::from_slice(&bytes).map_err(|e| DecodeError::Claims(e.to_string()))?;

    Ok(Identity {
        id: claims.user_id,
        username: claims.sub,
        role: main_role(claims.roles.as_deref()),
    })
}

/// First role wins; no roles means a plain user
fn main_role(roles: Option<&[String]>) -> Role {
    match roles.and_then(|r| r.first()) {
        Some(first) => Role::new(first.strip_prefix(ROLE_PREFIX).unwrap_or(first)),
        None => Role::user(),
    }
}

/// Build an unsigned token around the given claims
#[cfg(test)]
pub(crate) fn encode_test_token(claims: &serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{}.{}.signature", header, payload)
}
