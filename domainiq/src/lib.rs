//! # domainiq
//!
//! A rate-limited, cache-fronted queue for domain analysis backed by a
//! quota-constrained inference provider.
//!
//! ## Overview
//!
//! Callers ask for the analysis of a domain and always get an answer:
//! - **Cached** when a fresh result is on hand
//! - **Queued** for the provider otherwise, one call at a time, spaced by a
//!   minimum interval and capped per request window
//! - **Degraded** to a local heuristic when the provider is out of quota,
//!   keeps failing, or returns garbage
//!
//! Duplicate requests for a key that is already queued share one provider
//! call. A provider quota error switches the queue to the fallback until the
//! next daily reset.
//!
//! ## Quick Start
//!
//! ```
//! use async_trait::async_trait;
//! use domainiq::{
//!     AnalysisQueue, AnalysisResult, AnalysisSource, HeuristicAnalyzer, InferenceProvider,
//!     InvestmentGrade, ProviderError, QueueConfig,
//! };
//! use std::time::Duration;
//!
//! struct Echo;
//!
//! #[async_trait]
//! impl InferenceProvider for Echo {
//!     async fn analyze(&self, key: &str) -> Result<AnalysisResult, ProviderError> {
//!         Ok(AnalysisResult {
//!             domain: key.to_string(),
//!             brandability: 70,
//!             memorability: 70,
//!             seo_potential: 70,
//!             rarity: 70,
//!             investment_grade: InvestmentGrade::B,
//!             estimated_value_usd: None,
//!             summary: None,
//!             source: AnalysisSource::Provider,
//!             analyzed_at: chrono::Utc::now(),
//!         })
//!     }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let config = QueueConfig::builder()
//!     .per_window_limit(15)
//!     .min_interval(Duration::from_millis(10))
//!     .build();
//! let queue = AnalysisQueue::spawn(config, Echo, HeuristicAnalyzer::new());
//!
//! let result = queue.get_analysis("crab.io").await.unwrap();
//! assert_eq!(result.source, AnalysisSource::Provider);
//!
//! // Served from cache this time
//! let again = queue.get_analysis("crab.io").await.unwrap();
//! assert_eq!(again, result);
//! # }
//! ```
//!
//! ## Concurrency
//!
//! [`AnalysisQueue::spawn`] starts a tokio task that owns all queue state.
//! [`AnalysisHandle`] is cheap to clone and can be shared across tasks.
//!
//! ## Features
//!
//! - `ahash` (default): Use AHash for the cache and waiter maps

pub mod core;

pub use core::{
    AnalysisCache, AnalysisHandle, AnalysisQueue, AnalysisResult, AnalysisSource, Clock,
    FallbackAnalyzer, FallbackError, HeuristicAnalyzer, InferenceProvider, InvestmentGrade,
    MAX_SCORE, ProviderError, QueueConfig, QueueConfigBuilder, QueueCounters, QueueError,
    QueueStats, QuotaState, ResetSchedule, SystemClock, TokioClock,
};
