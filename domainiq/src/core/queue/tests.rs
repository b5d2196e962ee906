use super::*;
use crate::core::analysis::{AnalysisSource, InvestmentGrade};
use crate::core::clock::TokioClock;
use crate::core::fallback::{FallbackError, HeuristicAnalyzer};
use async_trait::async_trait;
use chrono::TimeZone;
use std::sync::Mutex;
use tokio_test::{assert_err, assert_ok};

type Script = dyn Fn(&str, usize) -> Result<(), ProviderError> + Send + Sync;

/// Provider that records every call and answers from a script keyed on the
/// call index
struct ScriptedProvider {
    clock: Arc<TokioClock>,
    latency: Duration,
    script: Box<Script>,
    calls: Mutex<Vec<(String, DateTime<Utc>)>>,
}

impl ScriptedProvider {
    fn calls(&self) -> Vec<(String, DateTime<Utc>)> {
        self.calls.lock().unwrap().clone()
    }

    fn keys(&self) -> Vec<String> {
        self.calls().into_iter().map(|(key, _)| key).collect()
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl InferenceProvider for ScriptedProvider {
    async fn analyze(&self, key: &str) -> Result<AnalysisResult, ProviderError> {
        let index = {
            let mut calls = self.calls.lock().unwrap();
            calls.push((key.to_string(), self.clock.now()));
            calls.len() - 1
        };

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        (self.script)(key, index)?;
        Ok(provider_result(key, self.clock.now()))
    }
}

struct BrokenPayloadProvider;

#[async_trait]
impl InferenceProvider for BrokenPayloadProvider {
    async fn analyze(&self, key: &str) -> Result<AnalysisResult, ProviderError> {
        let mut result = provider_result(key, origin());
        result.brandability = 140;
        Ok(result)
    }
}

struct FailingFallback;

impl FallbackAnalyzer for FailingFallback {
    fn heuristic(&self, _key: &str) -> Result<AnalysisResult, FallbackError> {
        Err(FallbackError("scorer unavailable".to_string()))
    }
}

struct Harness {
    queue: AnalysisHandle,
    provider: Arc<ScriptedProvider>,
    start: DateTime<Utc>,
}

impl Harness {
    /// Milliseconds from the start of the test to each provider call
    fn call_offsets(&self) -> Vec<i64> {
        self.provider
            .calls()
            .into_iter()
            .map(|(_, at)| (at - self.start).num_milliseconds())
            .collect()
    }
}

fn origin() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0).unwrap()
}

fn provider_result(key: &str, at: DateTime<Utc>) -> AnalysisResult {
    AnalysisResult {
        domain: key.to_string(),
        brandability: 80,
        memorability: 80,
        seo_potential: 80,
        rarity: 80,
        investment_grade: InvestmentGrade::A,
        estimated_value_usd: Some(2_500),
        summary: Some("scripted".to_string()),
        source: AnalysisSource::Provider,
        analyzed_at: at,
    }
}

fn config() -> QueueConfigBuilder {
    QueueConfig::builder()
        .per_window_limit(15)
        .window(Duration::from_secs(60))
        .min_interval(Duration::from_millis(100))
        .max_retries(2)
        .retry_delay(Duration::from_millis(500))
        .cache_ttl(Duration::from_secs(600))
        .fallback_cache_ttl(Duration::from_secs(300))
        .reset_schedule(ResetSchedule::DailyUtcMidnight)
}

fn harness_at(
    start: DateTime<Utc>,
    config: QueueConfig,
    latency: Duration,
    script: impl Fn(&str, usize) -> Result<(), ProviderError> + Send + Sync + 'static,
) -> Harness {
    let clock = Arc::new(TokioClock::starting_at(start));
    let provider = Arc::new(ScriptedProvider {
        clock: Arc::clone(&clock),
        latency,
        script: Box::new(script),
        calls: Mutex::new(Vec::new()),
    });
    let queue = AnalysisQueue::spawn_with_clock(
        config,
        Arc::clone(&provider),
        HeuristicAnalyzer::with_clock(clock.clone()),
        clock,
    );

    Harness {
        queue,
        provider,
        start,
    }
}

fn harness(
    config: QueueConfig,
    script: impl Fn(&str, usize) -> Result<(), ProviderError> + Send + Sync + 'static,
) -> Harness {
    harness_at(origin(), config, Duration::ZERO, script)
}

fn always_ok(_key: &str, _index: usize) -> Result<(), ProviderError> {
    Ok(())
}

fn assert_offsets(actual: &[i64], expected: &[i64]) {
    assert_eq!(actual.len(), expected.len(), "calls at {actual:?}");
    for (got, want) in actual.iter().zip(expected) {
        assert!(
            (got - want).abs() <= 5,
            "calls at {actual:?}, expected {expected:?}"
        );
    }
}

#[tokio::test(start_paused = true)]
async fn test_cache_hit_skips_provider() {
    let h = harness(config().build(), always_ok);

    let first = assert_ok!(h.queue.get_analysis("crab.io").await);
    let second = assert_ok!(h.queue.get_analysis("crab.io").await);

    assert_eq!(first, second);
    assert_eq!(first.source, AnalysisSource::Provider);
    assert_eq!(h.provider.call_count(), 1);

    let stats = h.queue.stats().await.unwrap();
    assert_eq!(stats.counters.cache_hits, 1);
    assert_eq!(stats.cached_entries, 1);
}

#[tokio::test(start_paused = true)]
async fn test_expired_entry_goes_back_to_provider() {
    let h = harness(config().build(), always_ok);

    h.queue.get_analysis("crab.io").await.unwrap();
    tokio::time::sleep(Duration::from_secs(601)).await;
    h.queue.get_analysis("crab.io").await.unwrap();

    assert_eq!(h.provider.call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_requests_share_one_call() {
    let h = harness_at(
        origin(),
        config().build(),
        Duration::from_secs(1),
        always_ok,
    );

    let (a, b, c) = tokio::join!(
        h.queue.get_analysis("crab.io"),
        h.queue.get_analysis("crab.io"),
        h.queue.get_analysis("crab.io"),
    );

    assert_eq!(h.provider.call_count(), 1);
    assert_eq!(a.clone().unwrap(), b.unwrap());
    assert_eq!(a.unwrap(), c.unwrap());

    let stats = h.queue.stats().await.unwrap();
    assert_eq!(stats.counters.coalesced, 2);
}

#[tokio::test(start_paused = true)]
async fn test_dispatches_are_spaced_by_min_interval() {
    // One-second windows so the per-window cap never binds; spacing alone
    // decides when b and c go out
    let h = harness(
        config()
            .per_window_limit(2)
            .window(Duration::from_secs(1))
            .min_interval(Duration::from_millis(1000))
            .max_retries(1)
            .build(),
        always_ok,
    );

    let (a, b, c) = tokio::join!(
        h.queue.get_analysis("a.com"),
        h.queue.get_analysis("b.com"),
        h.queue.get_analysis("c.com"),
    );
    assert_ok!(a);
    assert_ok!(b);
    assert_ok!(c);

    assert_eq!(h.provider.keys(), ["a.com", "b.com", "c.com"]);
    assert_offsets(&h.call_offsets(), &[0, 1000, 2000]);
}

#[tokio::test(start_paused = true)]
async fn test_window_limit_holds_dispatch_until_next_window() {
    let h = harness(
        config()
            .per_window_limit(2)
            .window(Duration::from_secs(60))
            .min_interval(Duration::from_millis(100))
            .build(),
        always_ok,
    );

    let (a, b, c) = tokio::join!(
        h.queue.get_analysis("a.com"),
        h.queue.get_analysis("b.com"),
        h.queue.get_analysis("c.com"),
    );
    assert!(a.is_ok() && b.is_ok() && c.is_ok());

    assert_offsets(&h.call_offsets(), &[0, 100, 60_000]);

    // No window ever saw more than two calls
    let calls = h.provider.calls();
    let first_window = calls
        .iter()
        .filter(|(_, at)| *at < origin() + chrono::TimeDelta::seconds(60))
        .count();
    assert_eq!(first_window, 2);
}

#[tokio::test(start_paused = true)]
async fn test_quota_error_drains_queue_through_fallback() {
    let h = harness(config().build(), |_, index| match index {
        1 => Err(ProviderError::QuotaExceeded("daily limit reached".into())),
        _ => Ok(()),
    });

    let (a, b, c, d) = tokio::join!(
        h.queue.get_analysis("a.com"),
        h.queue.get_analysis("b.com"),
        h.queue.get_analysis("c.com"),
        h.queue.get_analysis("d.com"),
    );

    assert_eq!(a.unwrap().source, AnalysisSource::Provider);
    assert_eq!(b.unwrap().source, AnalysisSource::Fallback);
    assert_eq!(c.unwrap().source, AnalysisSource::Fallback);
    assert_eq!(d.unwrap().source, AnalysisSource::Fallback);
    assert_eq!(h.provider.call_count(), 2);

    let e = h.queue.get_analysis("e.com").await.unwrap();
    assert_eq!(e.source, AnalysisSource::Fallback);
    assert_eq!(h.provider.call_count(), 2);

    let stats = h.queue.stats().await.unwrap();
    assert!(stats.exhausted);
    assert_eq!(
        stats.exhausted_until,
        Some(Utc.with_ymd_and_hms(2024, 6, 11, 0, 0, 0).unwrap())
    );
    assert_eq!(stats.pending, 0);
    assert_eq!(stats.counters.quota_exhaustions, 1);
    assert_eq!(stats.counters.fallbacks, 4);
}

#[tokio::test(start_paused = true)]
async fn test_fallback_results_are_cached_while_exhausted() {
    let h = harness(config().build(), |_, _| {
        Err(ProviderError::QuotaExceeded("gone".into()))
    });

    h.queue.get_analysis("a.com").await.unwrap();
    let again = h.queue.get_analysis("a.com").await.unwrap();
    assert!(again.is_fallback());

    let stats = h.queue.stats().await.unwrap();
    assert_eq!(stats.counters.fallbacks, 1);
    assert_eq!(stats.counters.cache_hits, 1);
}

#[tokio::test(start_paused = true)]
async fn test_nameless_keys_still_get_a_fallback_result() {
    let h = harness(config().build(), |_, _| {
        Err(ProviderError::QuotaExceeded("gone".into()))
    });

    let first = assert_ok!(h.queue.get_analysis(".com").await);
    assert!(first.is_fallback());
    assert!(h.queue.stats().await.unwrap().exhausted);

    for key in [".com", ".", ".."] {
        let result = assert_ok!(h.queue.get_analysis(key).await);
        assert!(result.is_fallback(), "{key:?} was not a fallback");
    }

    let stats = h.queue.stats().await.unwrap();
    assert_eq!(stats.counters.fallback_failures, 0);
    assert_eq!(h.provider.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_maintenance_tick_clears_exhaustion_at_midnight() {
    let start = Utc.with_ymd_and_hms(2024, 6, 10, 23, 50, 0).unwrap();
    let h = harness_at(start, config().build(), Duration::ZERO, |_, index| {
        if index == 0 {
            Err(ProviderError::QuotaExceeded("daily limit".into()))
        } else {
            Ok(())
        }
    });

    let first = h.queue.get_analysis("a.com").await.unwrap();
    assert!(first.is_fallback());
    assert!(h.queue.stats().await.unwrap().exhausted);

    tokio::time::sleep(Duration::from_secs(11 * 60)).await;

    let stats = h.queue.stats().await.unwrap();
    assert!(!stats.exhausted);
    assert_eq!(stats.exhausted_until, None);
    assert_eq!(
        stats.next_reset,
        Utc.with_ymd_and_hms(2024, 6, 12, 0, 0, 0).unwrap()
    );
    // The fallback entry for a.com went with the reset
    assert_eq!(stats.cached_entries, 0);

    let b = h.queue.get_analysis("b.com").await.unwrap();
    assert_eq!(b.source, AnalysisSource::Provider);
    let a = h.queue.get_analysis("a.com").await.unwrap();
    assert_eq!(a.source, AnalysisSource::Provider);
    assert_eq!(h.provider.call_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_request_after_midnight_resets_without_maintenance() {
    let start = Utc.with_ymd_and_hms(2024, 6, 10, 23, 50, 0).unwrap();
    let h = harness_at(
        start,
        config()
            .maintenance_interval(Duration::from_secs(86_400 * 7))
            .build(),
        Duration::ZERO,
        |_, index| {
            if index == 0 {
                Err(ProviderError::QuotaExceeded("daily limit".into()))
            } else {
                Ok(())
            }
        },
    );

    assert!(h.queue.get_analysis("a.com").await.unwrap().is_fallback());
    tokio::time::sleep(Duration::from_secs(11 * 60)).await;

    let b = h.queue.get_analysis("b.com").await.unwrap();
    assert_eq!(b.source, AnalysisSource::Provider);
    assert_eq!(h.provider.call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_transient_errors_retry_then_fall_back() {
    let h = harness(config().build(), |_, _| {
        Err(ProviderError::Transient("connection reset".into()))
    });

    let result = h.queue.get_analysis("a.com").await.unwrap();

    assert!(result.is_fallback());
    assert_eq!(h.provider.call_count(), 3);
    assert_offsets(&h.call_offsets(), &[0, 500, 1000]);

    let stats = h.queue.stats().await.unwrap();
    assert_eq!(stats.counters.retries, 2);
    assert_eq!(stats.counters.fallbacks, 1);
    assert!(!stats.exhausted);
}

#[tokio::test(start_paused = true)]
async fn test_retry_keeps_its_place_at_the_head() {
    let h = harness(
        config()
            .min_interval(Duration::from_millis(1000))
            .retry_delay(Duration::from_millis(200))
            .build(),
        |_, index| {
            if index == 0 {
                Err(ProviderError::Transient("timeout".into()))
            } else {
                Ok(())
            }
        },
    );

    let (a, b, c) = tokio::join!(
        h.queue.get_analysis("a.com"),
        h.queue.get_analysis("b.com"),
        h.queue.get_analysis("c.com"),
    );

    assert_eq!(a.unwrap().source, AnalysisSource::Provider);
    assert_eq!(b.unwrap().source, AnalysisSource::Provider);
    assert_eq!(c.unwrap().source, AnalysisSource::Provider);
    assert_eq!(h.provider.keys(), ["a.com", "a.com", "b.com", "c.com"]);
    // Spacing wins over the shorter retry delay
    assert_offsets(&h.call_offsets(), &[0, 1000, 2000, 3000]);
}

#[tokio::test(start_paused = true)]
async fn test_other_errors_fall_back_without_retry() {
    let h = harness(config().build(), |_, _| {
        Err(ProviderError::Other("unparseable response".into()))
    });

    let result = h.queue.get_analysis("a.com").await.unwrap();

    assert!(result.is_fallback());
    assert_eq!(h.provider.call_count(), 1);
    let stats = h.queue.stats().await.unwrap();
    assert_eq!(stats.counters.retries, 0);
    assert!(!stats.exhausted);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_provider_payload_falls_back() {
    let clock = Arc::new(TokioClock::starting_at(origin()));
    let queue = AnalysisQueue::spawn_with_clock(
        config().build(),
        BrokenPayloadProvider,
        HeuristicAnalyzer::with_clock(clock.clone()),
        clock,
    );

    let result = queue.get_analysis("a.com").await.unwrap();
    assert!(result.is_fallback());
    assert!(result.validate().is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_fallback_failure_is_reported() {
    let clock = Arc::new(TokioClock::starting_at(origin()));
    let provider = Arc::new(ScriptedProvider {
        clock: Arc::clone(&clock),
        latency: Duration::ZERO,
        script: Box::new(|_, _| Err(ProviderError::QuotaExceeded("gone".into()))),
        calls: Mutex::new(Vec::new()),
    });
    let queue = AnalysisQueue::spawn_with_clock(config().build(), provider, FailingFallback, clock);

    let err = assert_err!(queue.get_analysis("a.com").await);
    assert_eq!(
        err,
        QueueError::Fallback("scorer unavailable".to_string())
    );

    let stats = queue.stats().await.unwrap();
    assert_eq!(stats.counters.fallback_failures, 1);
    assert_eq!(stats.cached_entries, 0);
}

#[tokio::test(start_paused = true)]
async fn test_empty_key_is_rejected() {
    let h = harness(config().build(), always_ok);

    assert_eq!(h.queue.get_analysis("").await, Err(QueueError::EmptyKey));
    assert_eq!(h.queue.get_analysis("   ").await, Err(QueueError::EmptyKey));
    assert_eq!(h.provider.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_manual_reset_reopens_provider() {
    let h = harness(config().build(), |_, index| {
        if index == 0 {
            Err(ProviderError::QuotaExceeded("daily limit".into()))
        } else {
            Ok(())
        }
    });

    assert!(h.queue.get_analysis("a.com").await.unwrap().is_fallback());
    let next_reset = h.queue.stats().await.unwrap().next_reset;

    h.queue.reset_quota().await.unwrap();

    let stats = h.queue.stats().await.unwrap();
    assert!(!stats.exhausted);
    assert_eq!(stats.next_reset, next_reset);

    let again = h.queue.get_analysis("a.com").await.unwrap();
    assert_eq!(again.source, AnalysisSource::Provider);
    assert_eq!(h.provider.call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_clear_cache_forces_new_calls() {
    let h = harness(config().build(), always_ok);

    h.queue.get_analysis("a.com").await.unwrap();
    h.queue.get_analysis("b.com").await.unwrap();
    assert_eq!(h.queue.clear_cache().await.unwrap(), 2);
    assert_eq!(h.queue.stats().await.unwrap().cached_entries, 0);

    h.queue.get_analysis("a.com").await.unwrap();
    assert_eq!(h.provider.call_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_cache_answers_while_provider_is_busy() {
    let h = harness_at(
        origin(),
        config().min_interval(Duration::ZERO).build(),
        Duration::from_secs(5),
        always_ok,
    );

    h.queue.get_analysis("a.com").await.unwrap();

    let queue = h.queue.clone();
    let slow = tokio::spawn(async move { queue.get_analysis("b.com").await });
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(h.queue.stats().await.unwrap().in_flight);

    let started = tokio::time::Instant::now();
    let cached = h.queue.get_analysis("a.com").await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(cached.domain, "a.com");

    let b = slow.await.unwrap().unwrap();
    assert_eq!(b.source, AnalysisSource::Provider);
}

#[tokio::test(start_paused = true)]
async fn test_every_request_resolves_under_any_provider() {
    let scripts: Vec<Box<Script>> = vec![
        Box::new(|_, _| Ok(())),
        Box::new(|_, _| Err(ProviderError::QuotaExceeded("gone".into()))),
        Box::new(|_, _| Err(ProviderError::Transient("flaky".into()))),
        Box::new(|_, index| match index % 3 {
            0 => Err(ProviderError::Transient("flaky".into())),
            1 => Err(ProviderError::Other("bad".into())),
            _ => Ok(()),
        }),
    ];

    for script in scripts {
        let h = harness(
            QueueConfig::builder()
                .reset_schedule(ResetSchedule::DailyUtcMidnight)
                .build(),
            script,
        );

        let keys: Vec<String> = (0..10).map(|i| format!("site{i}.com")).collect();
        let requests = keys.iter().map(|key| h.queue.get_analysis(key));
        let results = tokio::time::timeout(
            Duration::from_secs(3600),
            futures::future::join_all(requests),
        )
        .await
        .expect("queue stalled");

        for (key, result) in keys.iter().zip(results) {
            let result = result.unwrap();
            assert_eq!(&result.domain, key);
            assert!(result.validate().is_ok());
        }

        let stats = h.queue.stats().await.unwrap();
        assert_eq!(stats.pending, 0);
        assert!(!stats.in_flight);
    }
}

#[test]
fn test_builder_normalizes_degenerate_values() {
    let config = QueueConfig::builder()
        .per_window_limit(0)
        .window(Duration::ZERO)
        .maintenance_interval(Duration::ZERO)
        .buffer_size(0)
        .build();

    assert_eq!(config.per_window_limit, 1);
    assert!(!config.window.is_zero());
    assert!(!config.maintenance_interval.is_zero());
    assert_eq!(config.buffer_size, 1);
}

#[test]
fn test_default_config() {
    let config = QueueConfig::default();
    assert_eq!(config.per_window_limit, 15);
    assert_eq!(config.window, Duration::from_secs(60));
    assert_eq!(config.min_interval, Duration::from_secs(4));
    assert_eq!(config.max_retries, 2);
    assert_eq!(config.reset_schedule, ResetSchedule::DailyLocalMidnight);
}
