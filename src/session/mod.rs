//! Session lifecycle: identity, renewal and the manager tying them together
//!
//! - [`identity`] decodes who a token belongs to
//! - [`SessionSignal`] publishes the current identity
//! - [`RenewalScheduler`] renews ahead of expiry and retries on failure
//! - [`SessionManager`] runs login, logout, refresh and startup rehydration

use std::time::Duration;

pub mod identity;
pub mod manager;
pub mod navigator;
pub mod scheduler;
pub mod signal;

pub use identity::{Identity, Role, decode};
pub use manager::SessionManager;
pub use navigator::{LogNavigator, Navigator};
pub use scheduler::{RenewalScheduler, RenewalState, renewal_delay};
pub use signal::SessionSignal;

/// Timing and routing knobs for a [`SessionManager`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    /// Lifetime assigned to each freshly issued token; also the auto-logout deadline
    pub session_duration: Duration,
    /// Renew this long before expiry
    pub renewal_lead: Duration,
    /// Wait between failed renewal attempts
    pub retry_delay: Duration,
    /// Route shown after logout and registration
    pub login_path: String,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            session_duration: Duration::from_secs(60 * 60),
            renewal_lead: Duration::from_secs(10 * 60),
            retry_delay: Duration::from_secs(30),
            login_path: "/auth/login".to_string(),
        }
    }
}
