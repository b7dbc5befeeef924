//! GraphQL-over-HTTP transport

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client as HttpClient, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;

use super::{ApiResult, AuthTransport, RegisteredUser, TokenPair};
use crate::error::ApiError;

const LOGIN_MUTATION: &str = r#"
mutation Login($username: String!, $password: String!) {
  login(username: $username, password: $password) {
    token
    refreshToken
  }
}
"#;

const REFRESH_TOKEN_MUTATION: &str = r#"
mutation RefreshToken($refreshToken: String!) {
  refreshToken(refreshToken: $refreshToken) {
    token
    refreshToken
  }
}
"#;

const CREATE_USER_MUTATION: &str = r#"
mutation CreateUser($username: String!, $password: String!) {
  createUser(userRequest: { username: $username, password: $password }) {
    id
    username
  }
}
"#;

/// Request timeout for every call
const REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlErrorEntry>,
}

#[derive(Deserialize)]
struct GraphQlErrorEntry {
    message: String,
}

/// GraphQL API client
pub struct GraphQlClient {
    http: HttpClient,
    endpoint: String,
}

impl GraphQlClient {
    /// Create a client for the given endpoint URL
    pub fn new(endpoint: impl Into<String>) -> ApiResult<Self> {
        let http = HttpClient::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))?;

        Ok(Self {
            http,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Run a query or mutation and return its `data`.
    ///
    /// With a `bearer` token the request carries `Authorization: Bearer <token>`.
    pub async fn execute<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: serde_json::Value,
        bearer: Option<&str>,
    ) -> ApiResult<T> {
        let mut request = self
            .http
            .post(&self.endpoint)
            .header("Accept", "application/json")
            .json(&json!({ "query": query, "variables": variables }));

        if let Some(token) = bearer {
            request = request.header("Authorization", format!("Bearer {}", token));
        }

        let response = request.send().await.map_err(ApiError::from)?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to read response: {}", e)))?;

        match status {
            StatusCode::OK => Self::parse_body(&body),
            StatusCode::UNAUTHORIZED => Err(ApiError::Unauthorized),
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
                // Servers often report validation failures as GraphQL errors with a 4xx
                match Self::first_error(&body) {
                    Some(message) => Err(ApiError::GraphQl(message)),
                    None => Err(ApiError::BadRequest(body)),
                }
            }
            status if status.is_server_error() => {
                if body.is_empty() {
                    Err(ApiError::ServerError(format!("Server error: {}", status)))
                } else {
                    Err(ApiError::ServerError(body))
                }
            }
            _ => Err(ApiError::InvalidResponse(format!(
                "Unexpected status code: {}",
                status
            ))),
        }
    }

    fn parse_body<T: DeserializeOwned>(body: &str) -> ApiResult<T> {
        let response: GraphQlResponse<T> = serde_json::from_str(body).map_err(|e| {
            ApiError::InvalidResponse(format!("Failed to parse response: {}. Body was: {}", e, body))
        })?;

        if let Some(error) = response.errors.into_iter().next() {
            return Err(ApiError::GraphQl(error.message));
        }

        response
            .data
            .ok_or_else(|| ApiError::InvalidResponse("Response has no data".to_string()))
    }

    fn first_error(body: &str) -> Option<String> {
        serde_json::from_str::<GraphQlResponse<serde_json::Value>>(body)
            .ok()?
            .errors
            .into_iter()
            .next()
            .map(|e| e.message)
    }
}

#[async_trait]
impl AuthTransport for GraphQlClient {
    async fn login(&self, username: &str, password: &str) -> ApiResult<TokenPair> {
        #[derive(Deserialize)]
        struct LoginData {
            login: TokenPair,
        }

        log::debug!("Logging in as {}", username);
        let data: LoginData = self
            .execute(
                LOGIN_MUTATION,
                json!({ "username": username, "password": password }),
                None,
            )
            .await?;
        Ok(data.login)
    }

    async fn refresh(&self, refresh_token: &str) -> ApiResult<TokenPair> {
        #[derive(Deserialize)]
        struct RefreshData {
            #[serde(rename = "refreshToken")]
            refresh_token: TokenPair,
        }

        let data: RefreshData = self
            .execute(
                REFRESH_TOKEN_MUTATION,
                json!({ "refreshToken": refresh_token }),
                None,
            )
            .await?;
        Ok(data.refresh_token)
    }

    async fn register(&self, username: &str, password: &str) -> ApiResult<RegisteredUser> {
        #[derive(Deserialize)]
        struct CreateUserData {
            #[serde(rename = "createUser")]
            create_user: RegisteredUser,
        }

        let data: CreateUserData = self
            .execute(
                CREATE_USER_MUTATION,
                json!({ "username": username, "password": password }),
                None,
            )
            .await?;
        Ok(data.create_user)
    }
}
