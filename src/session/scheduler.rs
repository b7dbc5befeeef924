//! Proactive session renewal
//!
//! The scheduler owns a single timer slot. Arming always replaces whatever was
//! armed before, and every arm gets a fresh epoch so that a timer or network
//! call started under an older epoch can recognize itself as stale.
//!
//! ```text
//!   Idle ──schedule──▶ Scheduled ──fire──▶ Renewing ──ok──▶ Scheduled
//!                                             │  ▲
//!                                       fail  ▼  │ fire
//!                                         RetryPending
//! ```
//! Any state returns to `Idle` on cancel.

use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Where the renewal loop currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenewalState {
    /// No session, nothing armed
    Idle,
    /// Timer armed for the next proactive renewal
    Scheduled,
    /// Refresh call in flight
    Renewing,
    /// Last refresh failed; backoff timer armed
    RetryPending,
}

impl std::fmt::Display for RenewalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RenewalState::Idle => "idle",
            RenewalState::Scheduled => "scheduled",
            RenewalState::Renewing => "renewing",
            RenewalState::RetryPending => "retry pending",
        };
        f.write_str(s)
    }
}

/// Delay before renewing a session expiring at `expires_at`.
///
/// Zero when the expiry is already inside the lead window or past.
pub fn renewal_delay(lead_window: Duration, expires_at: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (expires_at - now)
        .to_std()
        .map(|remaining| remaining.saturating_sub(lead_window))
        .unwrap_or(Duration::ZERO)
}

struct Inner {
    state: RenewalState,
    epoch: u64,
    timer: Option<JoinHandle<()>>,
    due: Option<Instant>,
}

/// Timer-driven renewal state machine
pub struct RenewalScheduler {
    lead_window: Duration,
    retry_delay: Duration,
    inner: Mutex<Inner>,
}

impl RenewalScheduler {
    pub fn new(lead_window: Duration, retry_delay: Duration) -> Self {
        Self {
            lead_window,
            retry_delay,
            inner: Mutex::new(Inner {
                state: RenewalState::Idle,
                epoch: 0,
                timer: None,
                due: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // State is plain data; a panic elsewhere cannot leave it half-written
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    pub fn state(&self) -> RenewalState {
        self.lock().state
    }

    pub fn is_current(&self, epoch: u64) -> bool {
        self.lock().epoch == epoch
    }

    /// When the armed timer fires, if one is armed
    pub fn next_due(&self) -> Option<Instant> {
        let inner = self.lock();
        inner.timer.as_ref().and(inner.due)
    }

    /// Timers armed and not yet finished (0 or 1)
    pub fn pending_timers(&self) -> usize {
        let inner = self.lock();
        inner
            .timer
            .as_ref()
            .map_or(0, |handle| usize::from(!handle.is_finished()))
    }

    /// Arm renewal for a session expiring at `expires_at`.
    ///
    /// `job` runs with the new epoch once the timer fires. Returns that epoch.
    /// Re-arming straight after a renewal never waits less than the retry
    /// delay, even when the new session already sits inside the lead window.
    pub fn schedule<F, Fut>(&self, expires_at: DateTime<Utc>, job: F) -> u64
    where
        F: FnOnce(u64) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut inner = self.lock();
        let mut delay = renewal_delay(self.lead_window, expires_at, Utc::now());
        if inner.state == RenewalState::Renewing && delay < self.retry_delay {
            log::warn!(
                "Renewed session is already inside the {}s lead window, next renewal in {}s",
                self.lead_window.as_secs(),
                self.retry_delay.as_secs()
            );
            delay = self.retry_delay;
        } else if delay.is_zero() {
            log::debug!("Session expires within the lead window, renewing now");
        } else {
            log::debug!("Session renewal scheduled in {}s", delay.as_secs());
        }
        Self::arm(&mut inner, RenewalState::Scheduled, delay, job)
    }

    /// Mark the timer for `epoch` as fired and the refresh as started.
    ///
    /// Returns false when `epoch` is stale, in which case the caller must do nothing.
    pub fn begin_renewal(&self, epoch: u64) -> bool {
        let mut inner = self.lock();
        if inner.epoch != epoch
            || !matches!(inner.state, RenewalState::Scheduled | RenewalState::RetryPending)
        {
            return false;
        }
        // Detach: the handle belongs to the task calling us
        inner.timer = None;
        inner.due = None;
        inner.state = RenewalState::Renewing;
        true
    }

    /// Arm the backoff timer after a failed refresh under `epoch`.
    ///
    /// Returns the new epoch, or `None` if `epoch` was stale.
    pub fn retry<F, Fut>(&self, epoch: u64, job: F) -> Option<u64>
    where
        F: FnOnce(u64) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut inner = self.lock();
        if inner.epoch != epoch || inner.state != RenewalState::Renewing {
            return None;
        }
        Some(Self::arm(
            &mut inner,
            RenewalState::RetryPending,
            self.retry_delay,
            job,
        ))
    }

    /// End the renewal loop started under `epoch` without a retry
    pub fn settle_idle(&self, epoch: u64) {
        let mut inner = self.lock();
        if inner.epoch == epoch {
            Self::disarm(&mut inner);
            inner.state = RenewalState::Idle;
        }
    }

    /// Stop everything and invalidate outstanding work
    pub fn cancel(&self) {
        let mut inner = self.lock();
        Self::disarm(&mut inner);
        inner.epoch += 1;
        inner.state = RenewalState::Idle;
    }

    fn arm<F, Fut>(inner: &mut Inner, state: RenewalState, delay: Duration, job: F) -> u64
    where
        F: FnOnce(u64) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self::disarm(inner);
        inner.epoch += 1;
        let epoch = inner.epoch;
        inner.state = state;
        inner.due = Some(Instant::now() + delay);
        // The lock is held until the handle is stored, so the task cannot
        // observe its own epoch before the slot is filled.
        inner.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            job(epoch).await;
        }));
        epoch
    }

    fn disarm(inner: &mut Inner) {
        if let Some(handle) = inner.timer.take() {
            handle.abort();
        }
        inner.due = None;
    }
}

impl Drop for RenewalScheduler {
    fn drop(&mut self) {
        Self::disarm(&mut self.lock());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn at(minutes: i64) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2030-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
            + chrono::Duration::minutes(minutes)
    }

    fn scheduler() -> RenewalScheduler {
        RenewalScheduler::new(Duration::from_secs(600), Duration::from_secs(30))
    }

    fn counting_job(
        counter: &Arc<AtomicUsize>,
    ) -> impl FnOnce(u64) -> std::future::Ready<()> + Send + 'static {
        let counter = counter.clone();
        move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            std::future::ready(())
        }
    }

    #[test]
    fn test_delay_one_hour_out() {
        let delay = renewal_delay(Duration::from_secs(600), at(60), at(0));
        assert_eq!(delay, Duration::from_secs(50 * 60));
    }

    #[test]
    fn test_delay_inside_lead_window_is_zero() {
        let delay = renewal_delay(Duration::from_secs(600), at(5), at(0));
        assert_eq!(delay, Duration::ZERO);
    }

    #[test]
    fn test_delay_after_expiry_is_zero() {
        let delay = renewal_delay(Duration::from_secs(600), at(-5), at(0));
        assert_eq!(delay, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedule_arms_single_timer() {
        let scheduler = scheduler();
        let counter = Arc::new(AtomicUsize::new(0));
        let start = Instant::now();

        scheduler.schedule(Utc::now() + chrono::Duration::hours(1), counting_job(&counter));
        assert_eq!(scheduler.state(), RenewalState::Scheduled);
        assert_eq!(scheduler.pending_timers(), 1);

        let due = scheduler.next_due().unwrap();
        let delay = due - start;
        assert!(delay <= Duration::from_secs(50 * 60));
        assert!(delay > Duration::from_secs(50 * 60 - 5));

        // Re-arming replaces the old timer
        scheduler.schedule(Utc::now() + chrono::Duration::hours(1), counting_job(&counter));
        assert_eq!(scheduler.pending_timers(), 1);

        tokio::time::sleep(Duration::from_secs(51 * 60)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_near_expiry_fires_immediately() {
        let scheduler = scheduler();
        let counter = Arc::new(AtomicUsize::new(0));

        scheduler.schedule(Utc::now() + chrono::Duration::minutes(5), counting_job(&counter));
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_after_renewal_waits_retry_delay() {
        let scheduler = scheduler();
        let counter = Arc::new(AtomicUsize::new(0));
        let start = Instant::now();

        let epoch = scheduler.schedule(Utc::now() + chrono::Duration::minutes(5), |_| {
            std::future::ready(())
        });
        assert!(scheduler.begin_renewal(epoch));

        // Renewal handed back a session that is again inside the lead window
        scheduler.schedule(Utc::now() + chrono::Duration::minutes(5), counting_job(&counter));
        assert_eq!(scheduler.state(), RenewalState::Scheduled);
        assert_eq!(scheduler.next_due().unwrap() - start, Duration::from_secs(30));

        tokio::time::sleep(Duration::from_secs(29)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_timer_and_bumps_epoch() {
        let scheduler = scheduler();
        let counter = Arc::new(AtomicUsize::new(0));

        let epoch = scheduler.schedule(Utc::now() + chrono::Duration::hours(1), counting_job(&counter));
        scheduler.cancel();
        assert_eq!(scheduler.state(), RenewalState::Idle);
        assert!(!scheduler.is_current(epoch));
        assert_eq!(scheduler.next_due(), None);

        tokio::time::sleep(Duration::from_secs(2 * 3600)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.pending_timers(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_begin_renewal_rejects_stale_epoch() {
        let scheduler = scheduler();
        let counter = Arc::new(AtomicUsize::new(0));

        let old = scheduler.schedule(Utc::now() + chrono::Duration::hours(1), counting_job(&counter));
        let new = scheduler.schedule(Utc::now() + chrono::Duration::hours(1), counting_job(&counter));
        assert!(!scheduler.begin_renewal(old));
        assert!(scheduler.begin_renewal(new));
        assert_eq!(scheduler.state(), RenewalState::Renewing);
        assert_eq!(scheduler.pending_timers(), 0);

        // A second begin for the same epoch is refused while renewing
        assert!(!scheduler.begin_renewal(new));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_failure() {
        let scheduler = scheduler();
        let counter = Arc::new(AtomicUsize::new(0));

        let epoch = scheduler.schedule(Utc::now() + chrono::Duration::hours(1), counting_job(&counter));
        assert!(scheduler.begin_renewal(epoch));

        let retry_epoch = scheduler.retry(epoch, counting_job(&counter)).unwrap();
        assert_eq!(scheduler.state(), RenewalState::RetryPending);
        assert_eq!(scheduler.pending_timers(), 1);
        assert!(scheduler.is_current(retry_epoch));

        // Stale epochs cannot arm another retry
        assert!(scheduler.retry(epoch, counting_job(&counter)).is_none());
        assert_eq!(scheduler.pending_timers(), 1);

        tokio::time::sleep(Duration::from_secs(29)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_settle_idle_only_for_current_epoch() {
        let scheduler = scheduler();
        let counter = Arc::new(AtomicUsize::new(0));

        let old = scheduler.schedule(Utc::now() + chrono::Duration::hours(1), counting_job(&counter));
        let new = scheduler.schedule(Utc::now() + chrono::Duration::hours(1), counting_job(&counter));

        scheduler.settle_idle(old);
        assert_eq!(scheduler.state(), RenewalState::Scheduled);

        assert!(scheduler.begin_renewal(new));
        scheduler.settle_idle(new);
        assert_eq!(scheduler.state(), RenewalState::Idle);
    }
}
