//! The external inference provider seam
//!
//! Implementations classify their own failures. The queue only branches on
//! the [`ProviderError`] variant and never inspects messages.

use super::analysis::AnalysisResult;
use async_trait::async_trait;
use std::sync::Arc;

/// Failure reported by an [`InferenceProvider`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// The provider's quota is used up; no more calls until the daily reset
    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Network or timeout class failure, worth retrying
    #[error("transient error: {0}")]
    Transient(String),

    /// Anything else, including malformed responses; never retried
    #[error("provider error: {0}")]
    Other(String),
}

impl ProviderError {
    pub fn is_quota(&self) -> bool {
        matches!(self, ProviderError::QuotaExceeded(_))
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Transient(_))
    }
}

/// Remote, rate-limited analysis service
///
/// # Example
///
/// ```
/// use async_trait::async_trait;
/// use domainiq::{AnalysisResult, InferenceProvider, ProviderError};
///
/// struct AlwaysBusy;
///
/// #[async_trait]
/// impl InferenceProvider for AlwaysBusy {
///     async fn analyze(&self, _key: &str) -> Result<AnalysisResult, ProviderError> {
///         Err(ProviderError::Transient("busy".into()))
///     }
/// }
/// ```
#[async_trait]
pub trait InferenceProvider: Send + Sync + 'static {
    async fn analyze(&self, key: &str) -> Result<AnalysisResult, ProviderError>;
}

#[async_trait]
impl<P: InferenceProvider + ?Sized> InferenceProvider for Arc<P> {
    async fn analyze(&self, key: &str) -> Result<AnalysisResult, ProviderError> {
        (**self).analyze(key).await
    }
}
