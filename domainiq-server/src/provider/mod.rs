//! Inference providers the queue can be wired to
//!
//! - [`gemini`]: Google's Gemini `generateContent` API
//! - [`OfflineProvider`]: stands in when no API key is configured

pub mod gemini;

pub use gemini::{GeminiConfig, GeminiProvider};

use async_trait::async_trait;
use domainiq::{AnalysisResult, InferenceProvider, ProviderError};

/// Provider used when no API key is configured
///
/// Every call reports an exhausted quota, so the queue answers from the
/// fallback and probes again only after the next daily reset.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineProvider;

#[async_trait]
impl InferenceProvider for OfflineProvider {
    async fn analyze(&self, _key: &str) -> Result<AnalysisResult, ProviderError> {
        Err(ProviderError::QuotaExceeded(
            "no provider configured".to_string(),
        ))
    }
}
