//! Periodic, fault-tolerant exchange-rate refresh.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::{extract_rate, is_valid_rate, RateEndpoint, RateState, RateStatus};
use crate::config::ExchangeSettings;
use crate::error::{AppError, Result, SubtrackError};
use crate::util::http::{fetch_text, shared_client};
use crate::util::retry::{RetryExecutor, RetryPolicy};
use crate::util::task::TaskHandle;

/// What a call to [`ExchangeRateService::refresh`] did.
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshResult {
    /// A fresh rate was stored.
    Updated(f64),
    /// Every source failed after retries; the previous rate is kept.
    Failed(AppError),
    /// Another refresh was already in flight, or the service was shut down
    /// before or during the refresh.
    Skipped,
}

/// Resolves and holds the current exchange rate.
///
/// Cheap to clone; clones share state. Background timers hold only weak
/// references, and everything is cancelled by [`shutdown`](Self::shutdown)
/// or when the last handle is dropped.
///
/// # Example
///
/// ```no_run
/// use subtrack::config::SubtrackConfig;
/// use subtrack::exchange::ExchangeRateService;
/// use subtrack::util::retry::RetryExecutor;
///
/// # async fn example() -> subtrack::error::Result<()> {
/// let config = SubtrackConfig::global();
/// let rates = ExchangeRateService::new(
///     config.exchange.clone(),
///     config.retry_policy(),
///     RetryExecutor::new(),
/// )?;
/// rates.start();
/// println!("1 USD = {} KRW", rates.rate());
/// rates.shutdown();
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ExchangeRateService {
    inner: Arc<ServiceInner>,
}

struct ServiceInner {
    settings: ExchangeSettings,
    policy: RetryPolicy,
    executor: RetryExecutor,
    client: reqwest::Client,
    state_tx: watch::Sender<RateState>,
    in_flight: AtomicBool,
    shutdown: CancellationToken,
    periodic: Mutex<Option<TaskHandle>>,
    scheduled_retry: Mutex<Option<TaskHandle>>,
    stale_timer: Mutex<Option<TaskHandle>>,
    /// When the cycle that produced the current valid rate started.
    valid_since: Mutex<Option<Instant>>,
}

impl Drop for ServiceInner {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Clears the re-entrancy flag however the refresh ends.
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl ExchangeRateService {
    /// Create a service holding `settings.default_rate`.
    pub fn new(settings: ExchangeSettings, policy: RetryPolicy, executor: RetryExecutor) -> Result<Self> {
        Self::with_client(settings, policy, executor, shared_client().clone())
    }

    pub fn with_client(
        settings: ExchangeSettings,
        policy: RetryPolicy,
        executor: RetryExecutor,
        client: reqwest::Client,
    ) -> Result<Self> {
        if !is_valid_rate(settings.default_rate) {
            return Err(SubtrackError::Configuration(format!(
                "default exchange rate must be positive and finite, got {}",
                settings.default_rate
            )));
        }
        if settings.refresh_interval_secs == 0 {
            return Err(SubtrackError::Configuration(
                "refresh interval must be at least one second".to_string(),
            ));
        }
        let (state_tx, _) = watch::channel(RateState::new(settings.default_rate));
        Ok(Self {
            inner: Arc::new(ServiceInner {
                settings,
                policy,
                executor,
                client,
                state_tx,
                in_flight: AtomicBool::new(false),
                shutdown: CancellationToken::new(),
                periodic: Mutex::new(None),
                scheduled_retry: Mutex::new(None),
                stale_timer: Mutex::new(None),
                valid_since: Mutex::new(None),
            }),
        })
    }

    /// Current rate (last good value, or the default).
    pub fn rate(&self) -> f64 {
        self.inner.state_tx.borrow().rate
    }

    /// Snapshot of the full state.
    pub fn state(&self) -> RateState {
        self.inner.state_tx.borrow().clone()
    }

    /// Subscribe to state changes via a [`watch::Receiver`].
    pub fn watch(&self) -> watch::Receiver<RateState> {
        self.inner.state_tx.subscribe()
    }

    pub fn default_rate(&self) -> f64 {
        self.inner.settings.default_rate
    }

    /// Whether a retry timer is armed after a failed refresh.
    pub fn has_scheduled_retry(&self) -> bool {
        self.inner
            .scheduled_retry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(TaskHandle::is_active)
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Start the periodic refresh timer. The first tick refreshes immediately.
    ///
    /// Idempotent; must be called from within a tokio runtime.
    pub fn start(&self) {
        if self.is_shut_down() {
            return;
        }
        let mut periodic = self
            .inner
            .periodic
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if periodic.as_ref().is_some_and(TaskHandle::is_active) {
            return;
        }

        let interval = self.inner.settings.refresh_interval();
        let weak = Arc::downgrade(&self.inner);
        *periodic = Some(TaskHandle::spawn_child(&self.inner.shutdown, |token| async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                let tick = tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    tick = ticker.tick() => tick,
                };
                let Some(service) = upgrade(&weak) else { break };
                if service.mark_stale_if_expired(tick) {
                    // Let watchers see the stale state before the refresh replaces it.
                    tokio::task::yield_now().await;
                }
                service.refresh_from(tick).await;
            }
        }));
        tracing::debug!(interval_secs = interval.as_secs(), "Exchange rate refresh started");
    }

    /// Cancel every timer and any in-flight request. Irreversible.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
        for slot in [
            &self.inner.periodic,
            &self.inner.scheduled_retry,
            &self.inner.stale_timer,
        ] {
            if let Some(handle) = slot.lock().unwrap_or_else(PoisonError::into_inner).take() {
                handle.cancel();
            }
        }
        self.inner.state_tx.send_modify(|state| state.is_refreshing = false);
        tracing::debug!("Exchange rate service shut down");
    }

    /// Manual retry: cancel any pending scheduled retry, then refresh now.
    pub async fn retry(&self) -> RefreshResult {
        self.cancel_scheduled_retry();
        self.refresh().await
    }

    /// Run one refresh cycle, retried as a whole under the retry policy.
    ///
    /// A call while another refresh is in flight is a no-op.
    pub async fn refresh(&self) -> RefreshResult {
        self.refresh_from(Instant::now()).await
    }

    /// Refresh with the cycle start pinned to `started`, which is what the
    /// staleness deadline is measured from.
    async fn refresh_from(&self, started: Instant) -> RefreshResult {
        if self.is_shut_down() {
            return RefreshResult::Skipped;
        }
        if self
            .inner
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("Exchange rate refresh already in flight");
            return RefreshResult::Skipped;
        }
        let _guard = InFlightGuard(&self.inner.in_flight);

        self.inner.state_tx.send_modify(|state| {
            state.is_refreshing = true;
            state.status = RateStatus::Refreshing;
        });

        let cancel = self.inner.shutdown.child_token();
        let outcome = self
            .inner
            .executor
            .run_with_cancel(
                || self.fetch_cycle(),
                &self.inner.policy,
                "exchange rate refresh",
                &cancel,
            )
            .await;
        let attempts = outcome.attempts_made;

        match outcome.into_result() {
            _ if self.is_shut_down() => {
                tracing::debug!("Exchange rate refresh abandoned by shutdown");
                RefreshResult::Skipped
            }
            Ok(rate) if is_valid_rate(rate) => {
                self.inner.state_tx.send_modify(|state| {
                    state.rate = rate;
                    state.is_refreshing = false;
                    state.last_error = None;
                    state.last_updated_at = Some(Utc::now());
                    state.consecutive_failures = 0;
                    state.status = RateStatus::Valid;
                });
                self.cancel_scheduled_retry();
                self.arm_stale_timer(started);
                tracing::info!(rate, attempts, "Exchange rate updated");
                RefreshResult::Updated(rate)
            }
            Ok(rate) => self.record_failure(AppError::from_failure(
                SubtrackError::InvalidRate(rate.to_string()),
                Some("exchange rate refresh"),
            )),
            Err(error) => self.record_failure(error),
        }
    }

    fn record_failure(&self, error: AppError) -> RefreshResult {
        self.inner.state_tx.send_modify(|state| {
            state.is_refreshing = false;
            state.last_error = Some(error.clone());
            state.consecutive_failures = state.consecutive_failures.saturating_add(1);
            state.status = RateStatus::Failed;
        });
        tracing::warn!(
            error = %error.details,
            kept_rate = self.rate(),
            "Exchange rate refresh failed; keeping previous rate"
        );
        self.schedule_retry();
        RefreshResult::Failed(error)
    }

    /// Try every endpoint in priority order; first valid rate wins.
    async fn fetch_cycle(&self) -> Result<f64> {
        let endpoints = &self.inner.settings.endpoints;
        let mut last_error = None;
        for endpoint in endpoints {
            match self.fetch_endpoint(endpoint).await {
                Ok(rate) => {
                    tracing::debug!(endpoint = %endpoint.name, rate, "Exchange rate source answered");
                    return Ok(rate);
                }
                Err(e) => {
                    tracing::warn!(endpoint = %endpoint.name, error = %e, "Exchange rate source failed");
                    last_error = Some(e);
                }
            }
        }
        Err(SubtrackError::AllSourcesFailed {
            attempted: endpoints.len(),
            last: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no sources configured".to_string()),
        })
    }

    async fn fetch_endpoint(&self, endpoint: &RateEndpoint) -> Result<f64> {
        let request = self.inner.client.get(&endpoint.url);
        let body = fetch_text(request, self.inner.settings.request_timeout()).await?;
        let json: serde_json::Value = serde_json::from_str(&body)?;
        extract_rate(&json, &self.inner.settings.target_currency)
    }

    /// Move `Valid` to `Stale` once a full interval has passed since the
    /// cycle that produced the rate started. Returns whether the rate is
    /// stale afterwards.
    fn mark_stale_if_expired(&self, now: Instant) -> bool {
        let Some(since) = *self
            .inner
            .valid_since
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
        else {
            return false;
        };
        if now.saturating_duration_since(since) < self.inner.settings.refresh_interval() {
            return false;
        }
        let marked = self.inner.state_tx.send_if_modified(|state| {
            if state.status == RateStatus::Valid {
                state.status = RateStatus::Stale;
                true
            } else {
                false
            }
        });
        if marked {
            tracing::debug!("Exchange rate is stale");
        }
        self.inner.state_tx.borrow().status == RateStatus::Stale
    }

    fn arm_stale_timer(&self, since: Instant) {
        *self
            .inner
            .valid_since
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(since);
        let deadline = since + self.inner.settings.refresh_interval();
        let weak = Arc::downgrade(&self.inner);
        let handle = TaskHandle::spawn_child(&self.inner.shutdown, |token| async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => return,
                _ = tokio::time::sleep_until(deadline) => {}
            }
            if let Some(service) = upgrade(&weak) {
                service.mark_stale_if_expired(Instant::now());
            }
        });
        self.inner
            .stale_timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle);
    }

    fn schedule_retry(&self) {
        let delay = self.inner.settings.retry_delay();
        let weak = Arc::downgrade(&self.inner);
        let handle = TaskHandle::spawn_child(&self.inner.shutdown, |token| async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            if let Some(service) = upgrade(&weak) {
                tracing::debug!("Running scheduled exchange rate retry");
                service.refresh().await;
            }
        });
        // Replacing the slot drops (and so cancels) any older timer.
        self.inner
            .scheduled_retry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle);
        tracing::debug!(delay_ms = delay.as_millis() as u64, "Scheduled exchange rate retry");
    }

    fn cancel_scheduled_retry(&self) {
        if let Some(handle) = self
            .inner
            .scheduled_retry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.cancel();
        }
    }
}

fn upgrade(weak: &Weak<ServiceInner>) -> Option<ExchangeRateService> {
    weak.upgrade().map(|inner| ExchangeRateService { inner })
}
