//! The rate-limited analysis queue
//!
//! A single tokio task owns every piece of mutable state: the pending
//! queue, the cache, quota counters and the one provider call that may be
//! outstanding. Callers hold a cloneable [`AnalysisHandle`] and talk to the
//! task over a bounded channel, receiving answers on oneshot channels.
//!
//! # Drain loop
//!
//! The task waits on four things at once:
//!
//! - the inbox (new requests, stats, manual reset, cache clear)
//! - the outstanding provider call, if any
//! - the dispatch timer for the head of the queue
//! - a maintenance tick that applies the daily reset
//!
//! The head is dispatched at the latest of its retry deadline,
//! `last_dispatch + min_interval`, and, when the window budget is spent, the
//! start of the next window. Only one provider call runs at a time.
//!
//! # Failure handling
//!
//! Provider errors never reach callers. A quota error switches the whole
//! queue to the fallback until the next scheduled reset, a transient error
//! puts the item back at the head after `retry_delay` (up to `max_retries`
//! times), and anything else falls back for that item alone. The only error
//! a caller can see from a valid key is [`QueueError::Fallback`].

use super::QueueError;
use super::analysis::AnalysisResult;
use super::cache::AnalysisCache;
use super::clock::{Clock, SystemClock, add_duration, sub_duration, until};
use super::fallback::FallbackAnalyzer;
use super::provider::{InferenceProvider, ProviderError};
use super::quota::{QuotaState, ResetSchedule};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

#[cfg(feature = "ahash")]
use ahash::AHashMap as HashMap;
#[cfg(not(feature = "ahash"))]
use std::collections::HashMap;

#[cfg(test)]
mod tests;

const DEFAULT_PER_WINDOW_LIMIT: u32 = 15;
const DEFAULT_WINDOW_SECS: u64 = 60;
const DEFAULT_MIN_INTERVAL_MS: u64 = 4_000;
const DEFAULT_MAX_RETRIES: u32 = 2;
const DEFAULT_RETRY_DELAY_MS: u64 = 2_000;
const DEFAULT_CACHE_TTL_SECS: u64 = 3_600;
const DEFAULT_FALLBACK_CACHE_TTL_SECS: u64 = 300;
const DEFAULT_CACHE_MAX_AGE_SECS: u64 = 86_400;
const DEFAULT_MAINTENANCE_INTERVAL_SECS: u64 = 60;
const DEFAULT_BUFFER_SIZE: usize = 10_000;

/// Queue tuning
///
/// Use [`QueueConfig::builder`] to override individual settings.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueConfig {
    /// Maximum provider calls per window
    pub per_window_limit: u32,
    /// Length of the fixed request window
    pub window: Duration,
    /// Minimum spacing between the starts of two provider calls
    pub min_interval: Duration,
    /// Retries granted to an item after transient failures
    pub max_retries: u32,
    /// Delay before a failed item may be retried
    pub retry_delay: Duration,
    /// Lifetime of provider results in the cache
    pub cache_ttl: Duration,
    /// Lifetime of fallback results in the cache (zero disables)
    pub fallback_cache_ttl: Duration,
    /// Entries older than this are swept at the daily reset
    pub cache_max_age: Duration,
    /// When the daily reset fires
    pub reset_schedule: ResetSchedule,
    /// How often the background task checks for the daily reset
    pub maintenance_interval: Duration,
    /// Inbox capacity
    pub buffer_size: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        QueueConfig {
            per_window_limit: DEFAULT_PER_WINDOW_LIMIT,
            window: Duration::from_secs(DEFAULT_WINDOW_SECS),
            min_interval: Duration::from_millis(DEFAULT_MIN_INTERVAL_MS),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
            cache_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            fallback_cache_ttl: Duration::from_secs(DEFAULT_FALLBACK_CACHE_TTL_SECS),
            cache_max_age: Duration::from_secs(DEFAULT_CACHE_MAX_AGE_SECS),
            reset_schedule: ResetSchedule::default(),
            maintenance_interval: Duration::from_secs(DEFAULT_MAINTENANCE_INTERVAL_SECS),
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

impl QueueConfig {
    pub fn builder() -> QueueConfigBuilder {
        QueueConfigBuilder::default()
    }

    /// Raise values that would stall or panic the queue to their minimum
    fn normalized(mut self) -> Self {
        self.per_window_limit = self.per_window_limit.max(1);
        self.window = self.window.max(Duration::from_millis(1));
        self.maintenance_interval = self.maintenance_interval.max(Duration::from_millis(1));
        self.buffer_size = self.buffer_size.max(1);
        self
    }
}

/// Builder for [`QueueConfig`]
///
/// # Example
///
/// ```
/// use domainiq::{QueueConfig, ResetSchedule};
/// use std::time::Duration;
///
/// let config = QueueConfig::builder()
///     .per_window_limit(10)
///     .min_interval(Duration::from_secs(6))
///     .max_retries(3)
///     .reset_schedule(ResetSchedule::DailyUtcMidnight)
///     .build();
/// assert_eq!(config.per_window_limit, 10);
/// ```
#[derive(Debug, Clone, Default)]
pub struct QueueConfigBuilder {
    config: QueueConfig,
}

impl QueueConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn per_window_limit(mut self, limit: u32) -> Self {
        self.config.per_window_limit = limit;
        self
    }

    pub fn window(mut self, window: Duration) -> Self {
        self.config.window = window;
        self
    }

    pub fn min_interval(mut self, interval: Duration) -> Self {
        self.config.min_interval = interval;
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries;
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.config.retry_delay = delay;
        self
    }

    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.config.cache_ttl = ttl;
        self
    }

    /// Lifetime of cached fallback results; `Duration::ZERO` stops caching them
    pub fn fallback_cache_ttl(mut self, ttl: Duration) -> Self {
        self.config.fallback_cache_ttl = ttl;
        self
    }

    pub fn cache_max_age(mut self, age: Duration) -> Self {
        self.config.cache_max_age = age;
        self
    }

    pub fn reset_schedule(mut self, schedule: ResetSchedule) -> Self {
        self.config.reset_schedule = schedule;
        self
    }

    pub fn maintenance_interval(mut self, interval: Duration) -> Self {
        self.config.maintenance_interval = interval;
        self
    }

    pub fn buffer_size(mut self, size: usize) -> Self {
        self.config.buffer_size = size;
        self
    }

    pub fn build(self) -> QueueConfig {
        self.config.normalized()
    }
}

/// Running totals since the queue started
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounters {
    /// Calls handed to the provider, retries included
    pub provider_calls: u64,
    pub provider_successes: u64,
    /// Transient failures that were put back at the head
    pub retries: u64,
    /// Requests answered by the fallback
    pub fallbacks: u64,
    pub fallback_failures: u64,
    pub cache_hits: u64,
    /// Requests attached to an item already queued or in flight
    pub coalesced: u64,
    pub quota_exhaustions: u64,
}

/// Snapshot of the queue state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: usize,
    pub in_flight: bool,
    pub cached_entries: usize,
    pub exhausted: bool,
    pub exhausted_until: Option<DateTime<Utc>>,
    pub requests_this_window: u32,
    pub per_window_limit: u32,
    pub window_start: DateTime<Utc>,
    pub next_reset: DateTime<Utc>,
    #[serde(flatten)]
    pub counters: QueueCounters,
}

type Responder = oneshot::Sender<Result<AnalysisResult, QueueError>>;

/// Message types for the queue task
enum QueueMessage {
    Analyze {
        key: String,
        response_tx: Responder,
    },
    Stats {
        response_tx: oneshot::Sender<QueueStats>,
    },
    ResetQuota {
        response_tx: oneshot::Sender<()>,
    },
    ClearCache {
        response_tx: oneshot::Sender<usize>,
    },
}

/// Handle to communicate with the queue task
#[derive(Clone)]
pub struct AnalysisHandle {
    tx: mpsc::Sender<QueueMessage>,
}

impl AnalysisHandle {
    /// Analyze `key`, from cache, provider or fallback
    ///
    /// Provider failures are absorbed: the caller gets a fallback result
    /// instead. Errors are limited to an empty key, a failing fallback, or a
    /// queue task that has stopped.
    pub async fn get_analysis(&self, key: &str) -> Result<AnalysisResult, QueueError> {
        if key.trim().is_empty() {
            return Err(QueueError::EmptyKey);
        }

        let key = key.to_string();
        self.request(|response_tx| QueueMessage::Analyze { key, response_tx })
            .await?
    }

    pub async fn stats(&self) -> Result<QueueStats, QueueError> {
        self.request(|response_tx| QueueMessage::Stats { response_tx })
            .await
    }

    /// Clear quota exhaustion and the window counter immediately
    ///
    /// The daily schedule is left untouched.
    pub async fn reset_quota(&self) -> Result<(), QueueError> {
        self.request(|response_tx| QueueMessage::ResetQuota { response_tx })
            .await
    }

    /// Drop every cached result, returning how many were removed
    pub async fn clear_cache(&self) -> Result<usize, QueueError> {
        self.request(|response_tx| QueueMessage::ClearCache { response_tx })
            .await
    }

    async fn request<T>(
        &self,
        message: impl FnOnce(oneshot::Sender<T>) -> QueueMessage,
    ) -> Result<T, QueueError> {
        let (response_tx, response_rx) = oneshot::channel();

        self.tx
            .send(message(response_tx))
            .await
            .map_err(|_| QueueError::Shutdown)?;

        response_rx.await.map_err(|_| QueueError::Shutdown)
    }
}

/// Spawns queue tasks
///
/// # Example
///
/// ```
/// use async_trait::async_trait;
/// use domainiq::{
///     AnalysisQueue, AnalysisResult, AnalysisSource, HeuristicAnalyzer, InferenceProvider,
///     ProviderError, QueueConfig,
/// };
///
/// struct Exhausted;
///
/// #[async_trait]
/// impl InferenceProvider for Exhausted {
///     async fn analyze(&self, _key: &str) -> Result<AnalysisResult, ProviderError> {
///         Err(ProviderError::QuotaExceeded("daily limit".into()))
///     }
/// }
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let queue = AnalysisQueue::spawn(QueueConfig::default(), Exhausted, HeuristicAnalyzer::new());
/// let result = queue.get_analysis("crab.io").await.unwrap();
/// assert_eq!(result.source, AnalysisSource::Fallback);
/// # }
/// ```
pub struct AnalysisQueue;

impl AnalysisQueue {
    /// Spawn a queue reading time from the system clock
    pub fn spawn<P, F>(config: QueueConfig, provider: P, fallback: F) -> AnalysisHandle
    where
        P: InferenceProvider,
        F: FallbackAnalyzer,
    {
        Self::spawn_with_clock(config, provider, fallback, Arc::new(SystemClock))
    }

    /// Spawn a queue reading time from `clock`
    pub fn spawn_with_clock<P, F>(
        config: QueueConfig,
        provider: P,
        fallback: F,
        clock: Arc<dyn Clock>,
    ) -> AnalysisHandle
    where
        P: InferenceProvider,
        F: FallbackAnalyzer,
    {
        let config = config.normalized();
        let (tx, rx) = mpsc::channel(config.buffer_size);
        let actor = QueueActor::new(config, Arc::new(provider), Arc::new(fallback), clock);

        tokio::spawn(actor.run(rx));

        AnalysisHandle { tx }
    }
}

struct QueueItem {
    key: String,
    enqueued_at: DateTime<Utc>,
    /// Retries used so far
    attempt: u32,
    /// Earliest dispatch time, pushed out by the retry delay
    not_before: DateTime<Utc>,
}

struct InFlight {
    item: QueueItem,
    call: BoxFuture<'static, Result<AnalysisResult, ProviderError>>,
}

struct QueueActor {
    config: QueueConfig,
    provider: Arc<dyn InferenceProvider>,
    fallback: Arc<dyn FallbackAnalyzer>,
    clock: Arc<dyn Clock>,
    cache: AnalysisCache,
    quota: QuotaState,
    pending: VecDeque<QueueItem>,
    /// Callers waiting on each queued or in-flight key
    waiters: HashMap<String, Vec<Responder>>,
    in_flight: Option<InFlight>,
    last_dispatch: Option<DateTime<Utc>>,
    counters: QueueCounters,
}

impl QueueActor {
    fn new(
        config: QueueConfig,
        provider: Arc<dyn InferenceProvider>,
        fallback: Arc<dyn FallbackAnalyzer>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let now = clock.now();
        let quota = QuotaState::new(config.window, config.reset_schedule, now);

        QueueActor {
            config,
            provider,
            fallback,
            clock,
            cache: AnalysisCache::new(),
            quota,
            pending: VecDeque::new(),
            waiters: HashMap::new(),
            in_flight: None,
            last_dispatch: None,
            counters: QueueCounters::default(),
        }
    }

    async fn run(mut self, mut rx: mpsc::Receiver<QueueMessage>) {
        let mut maintenance = tokio::time::interval(self.config.maintenance_interval);
        maintenance.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            per_window_limit = self.config.per_window_limit,
            min_interval_ms = self.config.min_interval.as_millis() as u64,
            next_reset = %self.quota.next_reset(),
            "Analysis queue started"
        );

        loop {
            let now = self.clock.now();
            let dispatch_at = self
                .next_dispatch_at(now)
                .map(|at| Instant::now() + until(now, at));
            let in_flight_active = self.in_flight.is_some();

            tokio::select! {
                msg = rx.recv() => match msg {
                    Some(msg) => self.handle_message(msg),
                    None => break,
                },
                outcome = wait_in_flight(&mut self.in_flight), if in_flight_active => {
                    if let Some(flight) = self.in_flight.take() {
                        self.complete(flight.item, outcome);
                    }
                }
                _ = tokio::time::sleep_until(dispatch_at.unwrap_or_else(Instant::now)), if dispatch_at.is_some() => {
                    self.dispatch_head();
                }
                _ = maintenance.tick() => {
                    let now = self.clock.now();
                    self.apply_scheduled_reset(now);
                }
            }
        }

        info!("Analysis queue shutting down");
    }

    fn handle_message(&mut self, msg: QueueMessage) {
        let now = self.clock.now();

        match msg {
            QueueMessage::Analyze { key, response_tx } => self.handle_analyze(key, response_tx, now),
            QueueMessage::Stats { response_tx } => {
                self.apply_scheduled_reset(now);
                self.quota.roll_window(now);
                // Ignore send errors - caller may have gone away
                let _ = response_tx.send(self.stats());
            }
            QueueMessage::ResetQuota { response_tx } => {
                let was_exhausted = self.quota.is_exhausted();
                self.quota.clear(now);
                let purged = self.cache.purge_fallback();
                info!(was_exhausted, purged, "Quota reset manually");
                let _ = response_tx.send(());
            }
            QueueMessage::ClearCache { response_tx } => {
                let removed = self.cache.clear();
                info!(removed, "Cache cleared");
                let _ = response_tx.send(removed);
            }
        }
    }

    fn handle_analyze(&mut self, key: String, response_tx: Responder, now: DateTime<Utc>) {
        self.apply_scheduled_reset(now);

        if let Some(hit) = self.cache.get(&key, now) {
            self.counters.cache_hits += 1;
            debug!(key = %key, source = ?hit.source, "Cache hit");
            let _ = response_tx.send(Ok(hit));
            return;
        }

        if let Some(waiting) = self.waiters.get_mut(&key) {
            self.counters.coalesced += 1;
            debug!(key = %key, "Joining queued request");
            waiting.push(response_tx);
            return;
        }

        if self.quota.is_exhausted() {
            debug!(key = %key, "Quota exhausted, answering from fallback");
            let result = self.run_fallback(&key, now);
            let _ = response_tx.send(result);
            return;
        }

        debug!(key = %key, pending = self.pending.len(), "Enqueued");
        self.pending.push_back(QueueItem {
            key: key.clone(),
            enqueued_at: now,
            attempt: 0,
            not_before: now,
        });
        self.waiters.insert(key, vec![response_tx]);
    }

    /// When the head of the queue may be dispatched, if anything can be
    fn next_dispatch_at(&mut self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if self.in_flight.is_some() || self.quota.is_exhausted() {
            return None;
        }

        let head = self.pending.front()?;
        let mut at = head.not_before;

        if let Some(last) = self.last_dispatch {
            at = at.max(add_duration(last, self.config.min_interval));
        }

        self.quota.roll_window(now);
        if !self.quota.has_capacity(self.config.per_window_limit) {
            at = at.max(self.quota.window_reopens_at());
        }

        Some(at)
    }

    fn dispatch_head(&mut self) {
        let now = self.clock.now();

        // The timer and the clock can disagree by a hair; try again next turn
        match self.next_dispatch_at(now) {
            Some(at) if at <= now => {}
            _ => return,
        }

        let Some(item) = self.pending.pop_front() else {
            return;
        };

        self.last_dispatch = Some(now);
        self.quota.record_dispatch();
        self.counters.provider_calls += 1;

        debug!(
            key = %item.key,
            attempt = item.attempt,
            queued_ms = (now - item.enqueued_at).num_milliseconds(),
            window_requests = self.quota.requests_this_window(),
            "Dispatching to provider"
        );

        let provider = Arc::clone(&self.provider);
        let key = item.key.clone();
        let call = Box::pin(async move { provider.analyze(&key).await });

        self.in_flight = Some(InFlight { item, call });
    }

    fn complete(
        &mut self,
        mut item: QueueItem,
        outcome: Result<AnalysisResult, ProviderError>,
    ) {
        let now = self.clock.now();
        let outcome = outcome.and_then(|result| match result.validate() {
            Ok(()) => Ok(result),
            Err(reason) => Err(ProviderError::Other(format!("invalid analysis: {reason}"))),
        });

        match outcome {
            Ok(result) => {
                self.counters.provider_successes += 1;
                self.cache
                    .insert(&item.key, result.clone(), self.config.cache_ttl, now);
                self.resolve(&item.key, Ok(result));
            }
            Err(ProviderError::QuotaExceeded(reason)) => {
                let until = self.quota.mark_exhausted();
                self.counters.quota_exhaustions += 1;
                warn!(
                    key = %item.key,
                    reason = %reason,
                    exhausted_until = %until,
                    pending = self.pending.len(),
                    "Provider quota exhausted, switching to fallback"
                );

                let result = self.run_fallback(&item.key, now);
                self.resolve(&item.key, result);

                while let Some(queued) = self.pending.pop_front() {
                    let result = self.run_fallback(&queued.key, now);
                    self.resolve(&queued.key, result);
                }
            }
            Err(ProviderError::Transient(reason)) if item.attempt < self.config.max_retries => {
                item.attempt += 1;
                item.not_before = add_duration(now, self.config.retry_delay);
                self.counters.retries += 1;
                warn!(
                    key = %item.key,
                    reason = %reason,
                    attempt = item.attempt,
                    max_retries = self.config.max_retries,
                    "Transient provider error, retrying"
                );
                self.pending.push_front(item);
            }
            Err(err) => {
                warn!(
                    key = %item.key,
                    error = %err,
                    attempts = item.attempt + 1,
                    "Provider failed, using fallback"
                );
                let result = self.run_fallback(&item.key, now);
                self.resolve(&item.key, result);
            }
        }
    }

    fn run_fallback(&mut self, key: &str, now: DateTime<Utc>) -> Result<AnalysisResult, QueueError> {
        self.counters.fallbacks += 1;

        match self.fallback.heuristic(key) {
            Ok(result) => {
                self.cache
                    .insert(key, result.clone(), self.config.fallback_cache_ttl, now);
                Ok(result)
            }
            Err(err) => {
                self.counters.fallback_failures += 1;
                error!(key = %key, error = %err, "Fallback analysis failed");
                Err(QueueError::from(err))
            }
        }
    }

    fn resolve(&mut self, key: &str, result: Result<AnalysisResult, QueueError>) {
        if let Some(waiting) = self.waiters.remove(key) {
            for response_tx in waiting {
                let _ = response_tx.send(result.clone());
            }
        }
    }

    fn apply_scheduled_reset(&mut self, now: DateTime<Utc>) {
        if !self.quota.is_reset_due(now) {
            return;
        }

        let was_exhausted = self.quota.is_exhausted();
        self.quota.scheduled_reset(now);
        let swept = self
            .cache
            .sweep_older_than(sub_duration(now, self.config.cache_max_age));
        let purged = self.cache.purge_fallback();

        info!(
            was_exhausted,
            swept,
            purged,
            next_reset = %self.quota.next_reset(),
            "Daily quota reset"
        );
    }

    fn stats(&self) -> QueueStats {
        QueueStats {
            pending: self.pending.len(),
            in_flight: self.in_flight.is_some(),
            cached_entries: self.cache.len(),
            exhausted: self.quota.is_exhausted(),
            exhausted_until: self.quota.exhausted_until(),
            requests_this_window: self.quota.requests_this_window(),
            per_window_limit: self.config.per_window_limit,
            window_start: self.quota.window_start(),
            next_reset: self.quota.next_reset(),
            counters: self.counters,
        }
    }
}

async fn wait_in_flight(
    in_flight: &mut Option<InFlight>,
) -> Result<AnalysisResult, ProviderError> {
    match in_flight {
        Some(flight) => (&mut flight.call).await,
        None => std::future::pending().await,
    }
}
