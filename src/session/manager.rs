//! Session lifecycle controller
//!
//! Every operation that changes the session follows the same order: storage
//! first, then the identity signal, then the renewal scheduler. Anyone reading
//! the signal therefore sees storage that already agrees with it.
//!
//! Writes and logout are serialized on one lock. A result is only written
//! after checking, under that lock, that no logout or newer arm happened
//! since its call started.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use tokio::task::JoinHandle;

use super::identity::{self, Identity};
use super::navigator::Navigator;
use super::scheduler::{RenewalScheduler, RenewalState};
use super::signal::SessionSignal;
use super::SessionSettings;
use crate::client::{AuthTransport, RegisteredUser, TokenPair};
use crate::error::SessionError;
use crate::storage::{CredentialRecord, CredentialStore, StorageBackend};

type SessionResult<T> = std::result::Result<T, SessionError>;

/// Which in-flight call a token pair came back from
#[derive(Debug, Clone, Copy)]
enum Origin {
    /// Login or refresh started under this logout generation
    Call(u64),
    /// Background renewal fired under this scheduler epoch
    Renewal(u64),
}

/// Owns the session: credentials, current identity, renewal and auto-logout.
///
/// Construct one per application with [`SessionManager::new`] and share the
/// returned `Arc`. Timers hold only weak references, so dropping the last `Arc`
/// stops all background work.
pub struct SessionManager {
    transport: Arc<dyn AuthTransport>,
    store: CredentialStore,
    signal: SessionSignal,
    scheduler: RenewalScheduler,
    navigator: Arc<dyn Navigator>,
    settings: SessionSettings,
    auto_logout: Mutex<Option<JoinHandle<()>>>,
    /// Held by logout, shutdown and every session write
    session_lock: Mutex<()>,
    /// Bumped on every logout; calls started under an older value are dropped
    generation: AtomicU64,
    this: Weak<SessionManager>,
}

impl SessionManager {
    pub fn new(
        transport: Arc<dyn AuthTransport>,
        backend: Arc<dyn StorageBackend>,
        navigator: Arc<dyn Navigator>,
        settings: SessionSettings,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            transport,
            store: CredentialStore::new(backend),
            signal: SessionSignal::new(),
            scheduler: RenewalScheduler::new(settings.renewal_lead, settings.retry_delay),
            navigator,
            settings,
            auto_logout: Mutex::new(None),
            session_lock: Mutex::new(()),
            generation: AtomicU64::new(0),
            this: this.clone(),
        })
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Identity of the signed-in user
    pub fn current(&self) -> Option<Identity> {
        self.signal.current()
    }

    /// Identity changes, starting with the current value
    pub fn observe(&self) -> BoxStream<'static, Option<Identity>> {
        self.signal.observe()
    }

    pub fn is_authenticated(&self) -> bool {
        self.signal.is_set()
    }

    pub fn is_admin(&self) -> bool {
        self.signal.current().is_some_and(|i| i.is_admin())
    }

    /// Access token for authenticated requests
    pub fn token(&self) -> Option<String> {
        self.store.access_token()
    }

    /// Full stored record, if any
    pub fn record(&self) -> Option<CredentialRecord> {
        self.store.load()
    }

    pub fn renewal_state(&self) -> RenewalState {
        self.scheduler.state()
    }

    /// When the next renewal or retry fires
    pub fn next_renewal(&self) -> Option<tokio::time::Instant> {
        self.scheduler.next_due()
    }

    /// Renewal timers currently armed (never more than one)
    pub fn pending_renewals(&self) -> usize {
        self.scheduler.pending_timers()
    }

    /// Sign in and start a session
    pub async fn login(&self, username: &str, password: &str) -> SessionResult<Identity> {
        let generation = self.generation();
        let tokens = self
            .transport
            .login(username, password)
            .await
            .map_err(SessionError::Authentication)?;

        let identity = self.establish(tokens, Origin::Call(generation))?;
        log::info!("Signed in as {} ({})", identity.username, identity.role);
        Ok(identity)
    }

    /// Create an account. The session is untouched; the user is sent to the login screen.
    pub async fn register(&self, username: &str, password: &str) -> SessionResult<RegisteredUser> {
        let user = self
            .transport
            .register(username, password)
            .await
            .map_err(SessionError::Registration)?;
        log::info!("Registered user {}", user.username);
        self.navigator.navigate_to(&self.settings.login_path);
        Ok(user)
    }

    /// Replace the session using `refresh_token`
    pub async fn refresh(&self, refresh_token: &str) -> SessionResult<Identity> {
        let generation = self.generation();
        let tokens = self
            .transport
            .refresh(refresh_token)
            .await
            .map_err(SessionError::Refresh)?;

        self.establish(tokens, Origin::Call(generation))
    }

    /// Refresh with whatever refresh token is stored
    pub async fn refresh_now(&self) -> SessionResult<Identity> {
        let refresh_token = self
            .store
            .refresh_token()
            .ok_or(SessionError::NoRefreshToken)?;
        self.refresh(&refresh_token).await
    }

    /// End the session and return to the login screen
    pub fn logout(&self) {
        self.end_session(self.lock_session());
    }

    /// Resume a stored session at startup.
    ///
    /// Never fails: anything unusable leaves the manager signed out.
    pub async fn rehydrate(&self) -> Option<Identity> {
        let generation = self.generation();
        let Some(record) = self.store.load() else {
            log::debug!("No stored session");
            return None;
        };

        if record.is_expired() {
            log::info!("Stored session expired, refreshing");
            return match self.refresh(&record.refresh_token).await {
                Ok(identity) => Some(identity),
                Err(SessionError::Superseded) => None,
                Err(e) => {
                    log::warn!("Could not resume session: {}", e);
                    self.logout();
                    None
                }
            };
        }

        let identity = match identity::decode(&record.access_token) {
            Ok(identity) => identity,
            Err(e) => {
                log::warn!("Stored access token is unreadable: {}", e);
                self.logout();
                return None;
            }
        };

        let _session = self.lock_session();
        if self.ensure_current(Origin::Call(generation)).is_err() {
            return None;
        }
        self.signal.set(Some(identity.clone()));
        self.arm_renewal(record.expires_at);
        let remaining = record.time_until_expiry().to_std().unwrap_or(Duration::ZERO);
        self.arm_auto_logout(remaining);
        log::info!("Resumed session for {}", identity.username);
        Some(identity)
    }

    /// Stop background work for application teardown.
    ///
    /// Storage and identity stay as they are so the next start can rehydrate.
    pub fn shutdown(&self) {
        let _session = self.lock_session();
        self.scheduler.cancel();
        self.cancel_auto_logout();
    }

    fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn lock_session(&self) -> MutexGuard<'_, ()> {
        self.session_lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Check, with the session lock held, that `origin` has not been overtaken
    fn ensure_current(&self, origin: Origin) -> SessionResult<()> {
        let current = match origin {
            Origin::Call(generation) => self.generation() == generation,
            Origin::Renewal(epoch) => self.scheduler.is_current(epoch),
        };
        if current {
            Ok(())
        } else {
            log::debug!("Discarding {:?} result, the session moved on", origin);
            Err(SessionError::Superseded)
        }
    }

    /// Wipe the session, release the lock, then go to the login screen
    fn end_session(&self, session: MutexGuard<'_, ()>) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Err(e) = self.store.clear() {
            log::error!("Failed to clear stored session: {}", e);
        }
        self.scheduler.cancel();
        self.signal.set(None);
        self.cancel_auto_logout();
        drop(session);

        log::info!("Signed out");
        self.navigator.navigate_to(&self.settings.login_path);
    }

    /// Persist, publish and arm for a freshly issued token pair
    fn establish(&self, tokens: TokenPair, origin: Origin) -> SessionResult<Identity> {
        let session = self.lock_session();
        self.ensure_current(origin)?;

        let identity = match identity::decode(&tokens.access_token) {
            Ok(identity) => identity,
            Err(e) => {
                log::error!("Server issued an unreadable access token: {}", e);
                self.end_session(session);
                return Err(e.into());
            }
        };

        let expires_at = expiry_after(self.settings.session_duration);
        let record = CredentialRecord {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            expires_at,
            identity: identity.clone(),
        };

        if let Err(e) = self.store.save(&record) {
            log::error!("Failed to persist session: {}", e);
            self.end_session(session);
            return Err(e.into());
        }

        self.signal.set(Some(identity.clone()));
        self.arm_renewal(expires_at);
        self.arm_auto_logout(self.settings.session_duration);
        Ok(identity)
    }

    fn arm_renewal(&self, expires_at: DateTime<Utc>) {
        self.scheduler.schedule(expires_at, self.renewal_job());
    }

    fn renewal_job(&self) -> impl FnOnce(u64) -> BoxFuture<'static, ()> + Send + 'static {
        let this = self.this.clone();
        move |epoch| -> BoxFuture<'static, ()> {
            Box::pin(async move {
                if let Some(manager) = this.upgrade() {
                    manager.run_renewal(epoch).await;
                }
            })
        }
    }

    /// Body of a fired renewal or retry timer
    fn run_renewal(self: Arc<Self>, epoch: u64) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            if !self.scheduler.begin_renewal(epoch) {
                log::debug!("Renewal timer {} is stale", epoch);
                return;
            }

            let Some(refresh_token) = self.store.refresh_token() else {
                log::warn!("No refresh token stored, renewal stops");
                self.scheduler.settle_idle(epoch);
                return;
            };

            log::debug!("Renewing session");
            let result = self.transport.refresh(&refresh_token).await;

            if !self.scheduler.is_current(epoch) {
                log::debug!("Discarding renewal result from epoch {}", epoch);
                return;
            }

            match result {
                Ok(tokens) => match self.establish(tokens, Origin::Renewal(epoch)) {
                    Ok(identity) => log::info!("Session renewed for {}", identity.username),
                    Err(SessionError::Superseded) => {}
                    Err(e) => log::warn!("Renewed session rejected: {}", e),
                },
                Err(e) if self.signal.is_set() => {
                    log::warn!(
                        "Session renewal failed, retrying in {}s: {}",
                        self.scheduler.retry_delay().as_secs(),
                        e
                    );
                    self.scheduler.retry(epoch, self.renewal_job());
                }
                Err(e) => {
                    log::warn!("Session renewal failed while signed out: {}", e);
                    self.scheduler.settle_idle(epoch);
                }
            }
        })
    }

    fn arm_auto_logout(&self, after: Duration) {
        let this = self.this.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            if let Some(manager) = this.upgrade() {
                log::info!("Session lifetime reached, signing out");
                manager.logout();
            }
        });

        let mut slot = self.auto_logout.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = slot.replace(handle) {
            previous.abort();
        }
    }

    fn cancel_auto_logout(&self) {
        let mut slot = self.auto_logout.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(handle) = slot.take() {
            handle.abort();
        }
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn expiry_after(duration: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(duration)
        .ok()
        .and_then(|d| Utc::now().checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
