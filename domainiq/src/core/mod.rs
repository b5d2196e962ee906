//! Core components of the domainiq analysis library
//!
//! This module contains the fundamental building blocks:
//! - [`analysis`]: The result schema shared by every producer
//! - [`cache`]: TTL cache of finished analyses
//! - [`quota`]: Request window and daily exhaustion bookkeeping
//! - [`queue`]: The task that serializes provider calls
//! - [`provider`] and [`fallback`]: The collaborators the queue delegates to

pub mod analysis;
pub mod cache;
pub mod clock;
pub mod fallback;
pub mod provider;
pub mod queue;
pub mod quota;

pub use analysis::{AnalysisResult, AnalysisSource, InvestmentGrade, MAX_SCORE};
pub use cache::AnalysisCache;
pub use clock::{Clock, SystemClock, TokioClock};
pub use fallback::{FallbackAnalyzer, FallbackError, HeuristicAnalyzer};
pub use provider::{InferenceProvider, ProviderError};
pub use queue::{
    AnalysisHandle, AnalysisQueue, QueueConfig, QueueConfigBuilder, QueueCounters, QueueStats,
};
pub use quota::{QuotaState, ResetSchedule};

/// Errors a caller of [`AnalysisHandle`] can see
///
/// Provider failures are not among them: the queue absorbs those and answers
/// with the fallback.
///
/// # Example
///
/// ```
/// use domainiq::{AnalysisQueue, HeuristicAnalyzer, QueueConfig, QueueError};
/// # use domainiq::{AnalysisResult, InferenceProvider, ProviderError};
/// # struct Offline;
/// # #[async_trait::async_trait]
/// # impl InferenceProvider for Offline {
/// #     async fn analyze(&self, _key: &str) -> Result<AnalysisResult, ProviderError> {
/// #         Err(ProviderError::QuotaExceeded("offline".into()))
/// #     }
/// # }
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let queue = AnalysisQueue::spawn(QueueConfig::default(), Offline, HeuristicAnalyzer::new());
///
/// match queue.get_analysis("  ").await {
///     Err(QueueError::EmptyKey) => println!("nothing to analyze"),
///     _ => unreachable!(),
/// }
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    /// The key was empty or whitespace
    #[error("analysis key must not be empty")]
    EmptyKey,
    /// The provider was unavailable and the local fallback failed too
    #[error("fallback analysis failed: {0}")]
    Fallback(String),
    /// The queue task has stopped
    #[error("analysis queue has shut down")]
    Shutdown,
}

impl From<FallbackError> for QueueError {
    fn from(err: FallbackError) -> Self {
        QueueError::Fallback(err.0)
    }
}
