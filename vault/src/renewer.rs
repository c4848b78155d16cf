//! Background lease renewal.
//!
//! State machine:
//!
//! ```text
//! Idle ──renewable──▶ Scheduled ──wake──▶ Renewing ──ok──▶ Scheduled
//!   │                                     │  ▲
//!   │ not renewable                       │  └─ transient, backoff fits before expiry
//!   ▼                                     ▼
//! (hold until expiry) ─────────────────▶ Dead ◀── terminal, or backoff would pass expiry
//! ```
//!
//! `stop` moves any state to `Stopped`. Sleeps and backoffs are cancelled
//! immediately; an in-flight renew request is allowed to finish (it is
//! bounded by the request timeout and the lease expiry) and its result is
//! committed before the task exits.

use crate::auth::RenewLease;
use crate::error::RenewalError;
use crate::lease::Lease;
use crate::store::CredentialStore;
use rust_common::RetryPolicy;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, error, info, warn};

/// Called once with the reason when the renewer dies.
pub type FailureCallback = Arc<dyn Fn(&RenewalError) + Send + Sync>;

/// Observable renewer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenewerState {
    /// No renewal scheduled (initial, or holding a non-renewable lease)
    Idle,
    /// Sleeping until `wake_at`
    Scheduled {
        /// Next renewal attempt
        wake_at: Instant,
    },
    /// Renewal in progress; `attempt` counts transient failures so far
    Renewing {
        /// Zero-based attempt number
        attempt: u32,
    },
    /// Gave up; the store's lease is stale
    Dead,
    /// Stopped on request
    Stopped,
}

/// Result of one renewal attempt.
#[derive(Debug)]
pub enum RenewalOutcome {
    /// Vault extended the lease
    Renewed(Lease),
    /// Worth another try after backoff
    Transient(RenewalError),
    /// Renewal can never succeed for this lease
    Terminal(RenewalError),
}

/// Why the renewer task ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenewerExit {
    /// `stop` was requested
    Stopped,
    /// Terminal failure; the callback was invoked with the same error
    Dead(RenewalError),
}

/// Earliest of "`fraction` of the remaining lifetime from `now`" and "just
/// before `expires_at`".
///
/// For any `fraction` in (0, 1) and `now < expires_at` the result lies in
/// `[now, expires_at)`. Returns `now` for an already expired lease.
#[must_use]
pub fn next_wake(now: Instant, expires_at: Instant, fraction: f64) -> Instant {
    let remaining = expires_at.saturating_duration_since(now);
    if remaining.is_zero() {
        return now;
    }

    let fraction = if fraction.is_finite() {
        fraction.clamp(0.0, 1.0)
    } else {
        0.5
    };
    let latest = expires_at - Duration::from_nanos(1);
    (now + remaining.mul_f64(fraction)).min(latest)
}

/// Builder for the background renewal task.
pub struct LeaseRenewer<R> {
    renewer: Arc<R>,
    store: Arc<CredentialStore>,
    fraction: f64,
    backoff: RetryPolicy,
    on_failure: Option<FailureCallback>,
    state_tx: Arc<watch::Sender<RenewerState>>,
}

impl<R: RenewLease + 'static> LeaseRenewer<R> {
    /// Create a renewer that writes renewed leases into `store`.
    #[must_use]
    pub fn new(
        renewer: Arc<R>,
        store: Arc<CredentialStore>,
        fraction: f64,
        backoff: RetryPolicy,
    ) -> Self {
        Self {
            renewer,
            store,
            fraction,
            backoff,
            on_failure: None,
            state_tx: Arc::new(watch::channel(RenewerState::Idle).0),
        }
    }

    /// Invoke `callback` once when the renewer dies.
    #[must_use]
    pub fn with_failure_callback(mut self, callback: Option<FailureCallback>) -> Self {
        self.on_failure = callback;
        self
    }

    /// Publish state on an existing channel (so observers survive re-login).
    #[must_use]
    pub fn with_state_channel(mut self, state_tx: Arc<watch::Sender<RenewerState>>) -> Self {
        self.state_tx = state_tx;
        self
    }

    /// Start renewing `lease`, which must already be in the store.
    #[must_use]
    pub fn spawn(self, lease: Arc<Lease>) -> RenewerHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        self.state_tx.send_replace(RenewerState::Idle);
        let state_tx = Arc::clone(&self.state_tx);

        let task = RenewerTask {
            renewer: self.renewer,
            store: self.store,
            fraction: self.fraction,
            backoff: self.backoff,
            on_failure: self.on_failure,
            state_tx: self.state_tx,
            stop_rx,
        };

        RenewerHandle {
            stop_tx,
            state_tx,
            task: tokio::spawn(task.run(lease)),
        }
    }
}

/// Handle on a running renewer. Dropping it also stops the renewer.
#[derive(Debug)]
pub struct RenewerHandle {
    stop_tx: watch::Sender<bool>,
    state_tx: Arc<watch::Sender<RenewerState>>,
    task: JoinHandle<RenewerExit>,
}

impl RenewerHandle {
    /// Current state.
    #[must_use]
    pub fn state(&self) -> RenewerState {
        *self.state_tx.borrow()
    }

    /// Watch state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<RenewerState> {
        self.state_tx.subscribe()
    }

    /// Whether the task has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Signal stop and wait for the task to exit.
    pub async fn stop(self) -> RenewerExit {
        self.stop_tx.send_replace(true);
        self.join().await
    }

    /// Wait for the task to exit on its own.
    pub async fn join(self) -> RenewerExit {
        match self.task.await {
            Ok(exit) => exit,
            Err(e) => {
                error!(error = %e, "Lease renewer task panicked or was aborted");
                self.state_tx.send_replace(RenewerState::Stopped);
                RenewerExit::Stopped
            }
        }
    }
}

struct Stopped;

enum Step {
    Renewed(Arc<Lease>),
    Dead(RenewalError),
    Stopped,
}

struct RenewerTask<R> {
    renewer: Arc<R>,
    store: Arc<CredentialStore>,
    fraction: f64,
    backoff: RetryPolicy,
    on_failure: Option<FailureCallback>,
    state_tx: Arc<watch::Sender<RenewerState>>,
    stop_rx: watch::Receiver<bool>,
}

impl<R: RenewLease> RenewerTask<R> {
    async fn run(mut self, mut lease: Arc<Lease>) -> RenewerExit {
        loop {
            if !lease.renewable() {
                debug!(
                    accessor = %lease.lease_id(),
                    "Lease is not renewable, holding it until expiry"
                );
                self.publish(RenewerState::Idle);
                if self.sleep_until(lease.expires_at()).await.is_err() {
                    return self.stopped();
                }
                return self.die(RenewalError::NotRenewable);
            }

            let wake_at = next_wake(Instant::now(), lease.expires_at(), self.fraction);
            debug!(
                accessor = %lease.lease_id(),
                in_secs = wake_at.saturating_duration_since(Instant::now()).as_secs_f64(),
                "Lease renewal scheduled"
            );
            self.publish(RenewerState::Scheduled { wake_at });
            if self.sleep_until(wake_at).await.is_err() {
                return self.stopped();
            }

            match self.renew_with_backoff(&lease).await {
                Step::Renewed(renewed) => {
                    if *self.stop_rx.borrow() {
                        return self.stopped();
                    }
                    lease = renewed;
                }
                Step::Dead(err) => return self.die(err),
                Step::Stopped => return self.stopped(),
            }
        }
    }

    async fn renew_with_backoff(&mut self, lease: &Lease) -> Step {
        let mut attempt = 0u32;
        loop {
            self.publish(RenewerState::Renewing { attempt });
            let err = match self.attempt(lease).await {
                RenewalOutcome::Renewed(renewed) => {
                    let (ttl, expires_at) = (renewed.duration(), renewed.expires_at_utc());
                    match self.store.set(renewed) {
                        Ok(committed) => {
                            info!(
                                accessor = %committed.lease_id(),
                                ttl_secs = ttl.as_secs(),
                                attempts = attempt + 1,
                                expires_at = %expires_at,
                                "Renewed Vault token lease"
                            );
                            return Step::Renewed(committed);
                        }
                        Err(_) => RenewalError::Transient(
                            "renewed lease expired before it could be stored".to_string(),
                        ),
                    }
                }
                RenewalOutcome::Terminal(err) => return Step::Dead(err),
                RenewalOutcome::Transient(err) => err,
            };

            let remaining = lease.remaining(Instant::now());
            let Some(delay) = self.backoff.delay_within(attempt, remaining) else {
                warn!(
                    error = %err,
                    attempts = attempt + 1,
                    "Backoff would pass lease expiry, giving up"
                );
                return Step::Dead(RenewalError::Expired);
            };
            warn!(
                error = %err,
                attempt = attempt + 1,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "Transient lease renewal failure, backing off"
            );
            if self.sleep_until(Instant::now() + delay).await.is_err() {
                return Step::Stopped;
            }
            attempt = attempt.saturating_add(1);
        }
    }

    async fn attempt(&self, lease: &Lease) -> RenewalOutcome {
        match timeout_at(lease.expires_at(), self.renewer.renew(lease)).await {
            Err(_) => RenewalOutcome::Terminal(RenewalError::Expired),
            Ok(Ok(renewed)) => RenewalOutcome::Renewed(renewed),
            Ok(Err(err)) if err.is_terminal() => RenewalOutcome::Terminal(err),
            Ok(Err(err)) => RenewalOutcome::Transient(err),
        }
    }

    /// Sleep until `deadline` unless stop is requested first.
    async fn sleep_until(&mut self, deadline: Instant) -> Result<(), Stopped> {
        if *self.stop_rx.borrow_and_update() {
            return Err(Stopped);
        }
        tokio::select! {
            () = tokio::time::sleep_until(deadline) => Ok(()),
            // A dropped handle counts as a stop request.
            _ = self.stop_rx.changed() => Err(Stopped),
        }
    }

    fn publish(&self, state: RenewerState) {
        self.state_tx.send_replace(state);
    }

    fn stopped(&self) -> RenewerExit {
        info!("Lease renewer stopped");
        self.publish(RenewerState::Stopped);
        RenewerExit::Stopped
    }

    fn die(&self, err: RenewalError) -> RenewerExit {
        self.store.mark_stale();
        self.publish(RenewerState::Dead);
        error!(error = %err, "Lease renewal failed terminally, Vault token is stale");
        if let Some(callback) = &self.on_failure {
            callback(&err);
        }
        RenewerExit::Dead(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rust_common::RetryConfig;
    use secrecy::{ExposeSecret, SecretString};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Plays back a script of renewal results; an exhausted script keeps
    /// failing transiently.
    struct ScriptedRenewal {
        script: Mutex<VecDeque<Result<Duration, RenewalError>>>,
        calls: Mutex<Vec<Instant>>,
        issued: AtomicU32,
    }

    impl ScriptedRenewal {
        fn new(script: Vec<Result<Duration, RenewalError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                calls: Mutex::new(Vec::new()),
                issued: AtomicU32::new(0),
            })
        }

        fn calls(&self) -> Vec<Instant> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RenewLease for ScriptedRenewal {
        async fn renew(&self, lease: &Lease) -> Result<Lease, RenewalError> {
            let now = Instant::now();
            self.calls.lock().unwrap().push(now);
            let next = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(RenewalError::Transient("connection refused".into())));
            next.map(|ttl| {
                let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
                Lease::new(
                    SecretString::from(format!("tok-renewed-{n}")),
                    lease.lease_id(),
                    ttl,
                    true,
                    now,
                )
            })
        }
    }

    fn initial_lease(ttl: Duration, renewable: bool) -> Lease {
        Lease::new(
            SecretString::from("tok-initial"),
            "acc-1",
            ttl,
            renewable,
            Instant::now(),
        )
    }

    fn fixed_backoff(initial: Duration, max: Duration) -> RetryPolicy {
        RetryPolicy::new(
            RetryConfig::default()
                .without_jitter()
                .with_initial_delay(initial)
                .with_max_delay(max),
        )
    }

    fn counting_callback() -> (FailureCallback, Arc<Mutex<Vec<RenewalError>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback: FailureCallback = Arc::new(move |err: &RenewalError| {
            sink.lock().unwrap().push(err.clone());
        });
        (callback, seen)
    }

    fn spawn_with(
        renewal: &Arc<ScriptedRenewal>,
        store: &Arc<CredentialStore>,
        lease: Lease,
        fraction: f64,
        backoff: RetryPolicy,
        callback: Option<FailureCallback>,
    ) -> RenewerHandle {
        let lease = store.set(lease).unwrap();
        LeaseRenewer::new(Arc::clone(renewal), Arc::clone(store), fraction, backoff)
            .with_failure_callback(callback)
            .spawn(lease)
    }

    #[test]
    fn test_next_wake_half_of_remaining() {
        let now = Instant::now();
        let expires = now + Duration::from_secs(10);
        assert_eq!(next_wake(now, expires, 0.5), now + Duration::from_secs(5));
    }

    #[test]
    fn test_next_wake_strictly_before_expiry() {
        let now = Instant::now();
        let expires = now + Duration::from_nanos(1);
        assert!(next_wake(now, expires, 0.999_999) < expires);
        assert!(next_wake(now, now + Duration::from_secs(1), 1.0) < now + Duration::from_secs(1));
        assert_eq!(next_wake(expires, now, 0.5), expires);
    }

    #[tokio::test(start_paused = true)]
    async fn test_renews_at_fraction_and_reschedules_from_new_lease() {
        let start = Instant::now();
        let renewal = ScriptedRenewal::new(vec![
            Ok(Duration::from_secs(10)),
            Ok(Duration::from_secs(10)),
        ]);
        let store = Arc::new(CredentialStore::new());
        let handle = spawn_with(
            &renewal,
            &store,
            initial_lease(Duration::from_secs(10), true),
            0.5,
            fixed_backoff(Duration::from_millis(100), Duration::from_secs(1)),
            None,
        );

        tokio::time::sleep(Duration::from_millis(10_500)).await;

        let calls = renewal.calls();
        assert_eq!(
            calls,
            vec![start + Duration::from_secs(5), start + Duration::from_secs(10)]
        );
        assert_eq!(
            store.current_token().unwrap().expose_secret(),
            "tok-renewed-2"
        );
        assert_eq!(
            handle.state(),
            RenewerState::Scheduled {
                wake_at: start + Duration::from_secs(15)
            }
        );
        assert_eq!(handle.stop().await, RenewerExit::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_then_success() {
        let renewal = ScriptedRenewal::new(vec![
            Err(RenewalError::Transient("503 sealed".into())),
            Err(RenewalError::Transient("connection reset".into())),
            Err(RenewalError::Transient("timeout".into())),
            Ok(Duration::from_secs(60)),
        ]);
        let store = Arc::new(CredentialStore::new());
        let (callback, seen) = counting_callback();
        let handle = spawn_with(
            &renewal,
            &store,
            initial_lease(Duration::from_secs(10), true),
            0.5,
            fixed_backoff(Duration::from_millis(100), Duration::from_secs(1)),
            Some(callback),
        );

        // 5s wake + 100ms + 200ms + 400ms of backoff
        tokio::time::sleep(Duration::from_secs(6)).await;

        assert_eq!(renewal.calls().len(), 4);
        let lease = store.get().unwrap();
        assert_eq!(lease.token().expose_secret(), "tok-renewed-1");
        assert_eq!(lease.duration(), Duration::from_secs(60));
        assert!(seen.lock().unwrap().is_empty());
        assert!(matches!(handle.state(), RenewerState::Scheduled { .. }));
        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_already_expired_renewal_is_retried() {
        let renewal = ScriptedRenewal::new(vec![
            Ok(Duration::ZERO),
            Ok(Duration::from_secs(60)),
        ]);
        let store = Arc::new(CredentialStore::new());
        let (callback, seen) = counting_callback();
        let handle = spawn_with(
            &renewal,
            &store,
            initial_lease(Duration::from_secs(10), true),
            0.5,
            fixed_backoff(Duration::from_millis(100), Duration::from_secs(1)),
            Some(callback),
        );

        tokio::time::sleep(Duration::from_secs(6)).await;

        assert_eq!(renewal.calls().len(), 2);
        let lease = store.get().unwrap();
        assert_eq!(lease.token().expose_secret(), "tok-renewed-2");
        assert!(!lease.is_expired(Instant::now()));
        assert!(seen.lock().unwrap().is_empty());
        assert!(!handle.is_finished());
        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_until_expiry_dies_once() {
        let renewal = ScriptedRenewal::new(Vec::new());
        let store = Arc::new(CredentialStore::new());
        let (callback, seen) = counting_callback();
        let handle = spawn_with(
            &renewal,
            &store,
            initial_lease(Duration::from_secs(10), true),
            0.5,
            fixed_backoff(Duration::from_secs(1), Duration::from_secs(2)),
            Some(callback),
        );

        // Attempts at 5s, 6s, 8s; the next 2s backoff would land on expiry.
        let exit = handle.join().await;

        assert_eq!(exit, RenewerExit::Dead(RenewalError::Expired));
        assert_eq!(renewal.calls().len(), 3);
        assert_eq!(*seen.lock().unwrap(), vec![RenewalError::Expired]);
        assert!(store.get().is_none());
        assert!(store.snapshot().is_stale());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejection_is_terminal() {
        let rejected = RenewalError::Rejected {
            status: 403,
            body: r#"{"errors":["permission denied"]}"#.into(),
        };
        let renewal = ScriptedRenewal::new(vec![Err(rejected.clone())]);
        let store = Arc::new(CredentialStore::new());
        let (callback, seen) = counting_callback();
        let handle = spawn_with(
            &renewal,
            &store,
            initial_lease(Duration::from_secs(30), true),
            0.5,
            fixed_backoff(Duration::from_millis(100), Duration::from_secs(1)),
            Some(callback),
        );
        let mut states = handle.subscribe();

        let exit = handle.join().await;

        assert_eq!(exit, RenewerExit::Dead(rejected.clone()));
        assert_eq!(renewal.calls().len(), 1);
        assert_eq!(*seen.lock().unwrap(), vec![rejected]);
        assert_eq!(*states.borrow_and_update(), RenewerState::Dead);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_pending_sleep() {
        let renewal = ScriptedRenewal::new(vec![Ok(Duration::from_secs(3600))]);
        let store = Arc::new(CredentialStore::new());
        let (callback, seen) = counting_callback();
        let handle = spawn_with(
            &renewal,
            &store,
            initial_lease(Duration::from_secs(3600), true),
            0.66,
            fixed_backoff(Duration::from_millis(100), Duration::from_secs(1)),
            Some(callback),
        );
        tokio::task::yield_now().await;
        let start = Instant::now();

        assert_eq!(handle.stop().await, RenewerExit::Stopped);

        assert!(start.elapsed() < Duration::from_secs(1));
        assert!(renewal.calls().is_empty());
        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(store.get().unwrap().token().expose_secret(), "tok-initial");
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_backoff() {
        let renewal = ScriptedRenewal::new(Vec::new());
        let store = Arc::new(CredentialStore::new());
        let (callback, seen) = counting_callback();
        let handle = spawn_with(
            &renewal,
            &store,
            initial_lease(Duration::from_secs(100), true),
            0.5,
            fixed_backoff(Duration::from_secs(10), Duration::from_secs(10)),
            Some(callback),
        );
        let mut states = handle.subscribe();
        states
            .wait_for(|s| matches!(s, RenewerState::Renewing { .. }))
            .await
            .unwrap();
        tokio::task::yield_now().await;

        assert_eq!(handle.stop().await, RenewerExit::Stopped);
        assert_eq!(renewal.calls().len(), 1);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_renewable_lease_held_until_expiry() {
        let start = Instant::now();
        let renewal = ScriptedRenewal::new(Vec::new());
        let store = Arc::new(CredentialStore::new());
        let (callback, seen) = counting_callback();
        let handle = spawn_with(
            &renewal,
            &store,
            initial_lease(Duration::from_secs(20), false),
            0.5,
            fixed_backoff(Duration::from_millis(100), Duration::from_secs(1)),
            Some(callback),
        );

        tokio::time::sleep(Duration::from_secs(19)).await;
        assert_eq!(handle.state(), RenewerState::Idle);
        assert!(store.get().is_some());

        let exit = handle.join().await;
        assert_eq!(exit, RenewerExit::Dead(RenewalError::NotRenewable));
        assert_eq!(start.elapsed(), Duration::from_secs(20));
        assert!(renewal.calls().is_empty());
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_handle_stops_renewer() {
        let renewal = ScriptedRenewal::new(Vec::new());
        let store = Arc::new(CredentialStore::new());
        let handle = spawn_with(
            &renewal,
            &store,
            initial_lease(Duration::from_secs(10), true),
            0.5,
            fixed_backoff(Duration::from_millis(100), Duration::from_secs(1)),
            None,
        );
        let mut states = handle.subscribe();
        drop(handle);

        states
            .wait_for(|s| *s == RenewerState::Stopped)
            .await
            .unwrap();
        assert!(renewal.calls().is_empty());
    }
}
