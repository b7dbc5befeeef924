//! Mock transport for testing
//!
//! Responses are queued per call and consumed in order. Optional gates hold a
//! call open until the test releases it, to simulate slow networks.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use super::{ApiResult, AuthTransport, RegisteredUser, TokenPair};
use crate::error::ApiError;

/// Tracks transport call counts for test verification
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct CallCounts {
    pub login: usize,
    pub refresh: usize,
    pub register: usize,
}

/// Mock transport.
///
/// # Example
/// ```ignore
/// let mock = MockAuthTransport::new()
///     .with_login(Ok(pair("T1", "R1")))
///     .await;
/// ```
#[derive(Default)]
pub struct MockAuthTransport {
    login: Mutex<VecDeque<ApiResult<TokenPair>>>,
    refresh: Mutex<VecDeque<ApiResult<TokenPair>>>,
    register: Mutex<VecDeque<ApiResult<RegisteredUser>>>,
    login_gate: Mutex<Option<Arc<Notify>>>,
    refresh_gate: Mutex<Option<Arc<Notify>>>,
    call_count: Mutex<CallCounts>,
    refresh_tokens_seen: Mutex<Vec<String>>,
}

impl MockAuthTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a login response
    pub async fn with_login(self, response: ApiResult<TokenPair>) -> Self {
        self.login.lock().await.push_back(response);
        self
    }

    /// Queue a refresh response
    pub async fn with_refresh(self, response: ApiResult<TokenPair>) -> Self {
        self.refresh.lock().await.push_back(response);
        self
    }

    /// Queue a registration response
    pub async fn with_register(self, response: ApiResult<RegisteredUser>) -> Self {
        self.register.lock().await.push_back(response);
        self
    }

    /// Hold every login until the returned notifier fires
    pub async fn gate_login(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.login_gate.lock().await = Some(gate.clone());
        gate
    }

    /// Hold every refresh until the returned notifier fires
    pub async fn gate_refresh(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.refresh_gate.lock().await = Some(gate.clone());
        gate
    }

    /// Get the call counts for verification in tests.
    pub async fn call_counts(&self) -> CallCounts {
        self.call_count.lock().await.clone()
    }

    /// Refresh tokens presented to `refresh`, in order
    pub async fn refresh_tokens_seen(&self) -> Vec<String> {
        self.refresh_tokens_seen.lock().await.clone()
    }

    async fn wait_at(gate: &Mutex<Option<Arc<Notify>>>) {
        let gate = gate.lock().await.clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
    }

    fn exhausted(call: &str) -> ApiError {
        ApiError::Network(format!("no mock response queued for {}", call))
    }
}

#[async_trait]
impl AuthTransport for MockAuthTransport {
    async fn login(&self, _username: &str, _password: &str) -> ApiResult<TokenPair> {
        self.call_count.lock().await.login += 1;
        Self::wait_at(&self.login_gate).await;
        self.login
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Err(Self::exhausted("login")))
    }

    async fn refresh(&self, refresh_token: &str) -> ApiResult<TokenPair> {
        self.call_count.lock().await.refresh += 1;
        self.refresh_tokens_seen
            .lock()
            .await
            .push(refresh_token.to_string());
        Self::wait_at(&self.refresh_gate).await;
        self.refresh
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Err(Self::exhausted("refresh")))
    }

    async fn register(&self, _username: &str, _password: &str) -> ApiResult<RegisteredUser> {
        self.call_count.lock().await.register += 1;
        self.register
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Err(Self::exhausted("register")))
    }
}
