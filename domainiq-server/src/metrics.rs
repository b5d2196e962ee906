//! Simple metrics collection for observability
//!
//! HTTP-side counters live here as atomics. Queue-side numbers are not
//! duplicated: [`Metrics::export_prometheus`] takes a [`QueueStats`] snapshot
//! and renders it alongside.

use domainiq::{AnalysisSource, QueueStats};
use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// How an analysis request ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// Answered with a provider result (fresh or cached)
    Provider,
    /// Answered with a fallback result
    Fallback,
    /// Rejected as invalid input
    Rejected,
    /// Failed inside the server
    Error,
}

impl From<AnalysisSource> for RequestOutcome {
    fn from(source: AnalysisSource) -> Self {
        match source {
            AnalysisSource::Provider => RequestOutcome::Provider,
            AnalysisSource::Fallback => RequestOutcome::Fallback,
        }
    }
}

/// Core metrics collected by the server
pub struct Metrics {
    start_time: Instant,

    pub total_requests: AtomicU64,

    /// Analysis requests by outcome
    pub provider_answers: AtomicU64,
    pub fallback_answers: AtomicU64,
    pub rejected_requests: AtomicU64,
    pub requests_errors: AtomicU64,

    /// Request latency buckets
    pub latency_under_1ms: AtomicU64,
    pub latency_under_10ms: AtomicU64,
    pub latency_under_100ms: AtomicU64,
    pub latency_under_1s: AtomicU64,
    pub latency_under_10s: AtomicU64,
    pub latency_over_10s: AtomicU64,

    pub latency_sum_micros: AtomicU64,
    pub latency_count: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            total_requests: AtomicU64::new(0),
            provider_answers: AtomicU64::new(0),
            fallback_answers: AtomicU64::new(0),
            rejected_requests: AtomicU64::new(0),
            requests_errors: AtomicU64::new(0),
            latency_under_1ms: AtomicU64::new(0),
            latency_under_10ms: AtomicU64::new(0),
            latency_under_100ms: AtomicU64::new(0),
            latency_under_1s: AtomicU64::new(0),
            latency_under_10s: AtomicU64::new(0),
            latency_over_10s: AtomicU64::new(0),
            latency_sum_micros: AtomicU64::new(0),
            latency_count: AtomicU64::new(0),
        }
    }

    /// Record an analysis request and its latency
    pub fn record_request(&self, latency_us: u64, outcome: RequestOutcome) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);

        match outcome {
            RequestOutcome::Provider => self.provider_answers.fetch_add(1, Ordering::Relaxed),
            RequestOutcome::Fallback => self.fallback_answers.fetch_add(1, Ordering::Relaxed),
            RequestOutcome::Rejected => self.rejected_requests.fetch_add(1, Ordering::Relaxed),
            RequestOutcome::Error => self.requests_errors.fetch_add(1, Ordering::Relaxed),
        };

        // Queued requests can legitimately wait for minutes
        match latency_us {
            0..=999 => self.latency_under_1ms.fetch_add(1, Ordering::Relaxed),
            1_000..=9_999 => self.latency_under_10ms.fetch_add(1, Ordering::Relaxed),
            10_000..=99_999 => self.latency_under_100ms.fetch_add(1, Ordering::Relaxed),
            100_000..=999_999 => self.latency_under_1s.fetch_add(1, Ordering::Relaxed),
            1_000_000..=9_999_999 => self.latency_under_10s.fetch_add(1, Ordering::Relaxed),
            _ => self.latency_over_10s.fetch_add(1, Ordering::Relaxed),
        };

        self.latency_sum_micros
            .fetch_add(latency_us, Ordering::Relaxed);
        self.latency_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Export metrics in Prometheus text format
    ///
    /// Queue metrics are omitted when `queue` is `None` (queue task gone).
    pub fn export_prometheus(&self, queue: Option<&QueueStats>) -> String {
        let mut output = String::with_capacity(2048);
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);

        metric(
            &mut output,
            "domainiq_uptime_seconds",
            "Time since server start in seconds",
            "gauge",
            self.uptime_seconds(),
        );
        metric(
            &mut output,
            "domainiq_requests_total",
            "Total number of analysis requests processed",
            "counter",
            load(&self.total_requests),
        );

        output.push_str("# HELP domainiq_requests_by_outcome Analysis requests by outcome\n");
        output.push_str("# TYPE domainiq_requests_by_outcome counter\n");
        for (label, counter) in [
            ("provider", &self.provider_answers),
            ("fallback", &self.fallback_answers),
            ("rejected", &self.rejected_requests),
            ("error", &self.requests_errors),
        ] {
            let _ = writeln!(
                output,
                "domainiq_requests_by_outcome{{outcome=\"{label}\"}} {}",
                load(counter)
            );
        }
        output.push('\n');

        output.push_str("# HELP domainiq_request_duration_seconds Request latency distribution\n");
        output.push_str("# TYPE domainiq_request_duration_seconds histogram\n");
        let mut cumulative = 0;
        for (le, counter) in [
            ("0.001", &self.latency_under_1ms),
            ("0.01", &self.latency_under_10ms),
            ("0.1", &self.latency_under_100ms),
            ("1", &self.latency_under_1s),
            ("10", &self.latency_under_10s),
            ("+Inf", &self.latency_over_10s),
        ] {
            cumulative += load(counter);
            let _ = writeln!(
                output,
                "domainiq_request_duration_seconds_bucket{{le=\"{le}\"}} {cumulative}"
            );
        }
        let latency_sum_seconds = load(&self.latency_sum_micros) as f64 / 1_000_000.0;
        let _ = writeln!(
            output,
            "domainiq_request_duration_seconds_sum {latency_sum_seconds:.6}"
        );
        let _ = writeln!(
            output,
            "domainiq_request_duration_seconds_count {}\n",
            load(&self.latency_count)
        );

        if let Some(stats) = queue {
            export_queue(&mut output, stats);
        }

        output
    }
}

fn export_queue(output: &mut String, stats: &QueueStats) {
    let counters = &stats.counters;

    let gauges = [
        ("domainiq_queue_pending", "Requests waiting for the provider", stats.pending as u64),
        ("domainiq_queue_in_flight", "Provider calls in flight", u64::from(stats.in_flight)),
        ("domainiq_cache_entries", "Cached analyses", stats.cached_entries as u64),
        (
            "domainiq_quota_exhausted",
            "1 while the provider quota is exhausted",
            u64::from(stats.exhausted),
        ),
        (
            "domainiq_window_requests",
            "Provider calls in the current window",
            u64::from(stats.requests_this_window),
        ),
        (
            "domainiq_window_limit",
            "Provider calls allowed per window",
            u64::from(stats.per_window_limit),
        ),
    ];
    for (name, help, value) in gauges {
        metric(output, name, help, "gauge", value);
    }
    metric(
        output,
        "domainiq_next_reset_timestamp_seconds",
        "Unix time of the next daily reset",
        "gauge",
        stats.next_reset.timestamp(),
    );

    let totals = [
        ("domainiq_provider_calls_total", "Calls handed to the provider", counters.provider_calls),
        (
            "domainiq_provider_successes_total",
            "Provider calls that returned a result",
            counters.provider_successes,
        ),
        ("domainiq_retries_total", "Transient failures retried", counters.retries),
        ("domainiq_fallbacks_total", "Requests answered by the fallback", counters.fallbacks),
        (
            "domainiq_fallback_failures_total",
            "Fallback analyses that failed",
            counters.fallback_failures,
        ),
        ("domainiq_cache_hits_total", "Requests answered from cache", counters.cache_hits),
        (
            "domainiq_coalesced_total",
            "Requests that joined a queued request",
            counters.coalesced,
        ),
        (
            "domainiq_quota_exhaustions_total",
            "Times the provider reported its quota gone",
            counters.quota_exhaustions,
        ),
    ];
    for (name, help, value) in totals {
        metric(output, name, help, "counter", value);
    }
}

fn metric(output: &mut String, name: &str, help: &str, kind: &str, value: impl std::fmt::Display) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} {kind}");
    let _ = writeln!(output, "{name} {value}\n");
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
