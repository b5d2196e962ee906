//! Queue factory
//!
//! Picks the provider from configuration and spawns the analysis queue.
//!
//! ## Gemini
//! Used when an API key is configured. Calls are paced by the queue
//! settings and classified per [`crate::provider::gemini`].
//!
//! ## Offline
//! Without a key every provider call reports an exhausted quota, so the
//! queue answers from the local heuristic. Once per daily reset it probes
//! the offline provider again, which costs nothing.

use crate::config::Config;
use crate::provider::{GeminiConfig, GeminiProvider, OfflineProvider};
use anyhow::Result;
use domainiq::{AnalysisHandle, AnalysisQueue, HeuristicAnalyzer};
use std::time::Duration;

/// Create the analysis queue with the configured provider
///
/// # Errors
///
/// Fails if the HTTP client for the provider cannot be built.
pub fn create_analysis_queue(config: &Config) -> Result<AnalysisHandle> {
    let queue_config = config.queue_config();
    let fallback = HeuristicAnalyzer::new();

    match &config.provider.api_key {
        Some(api_key) => {
            let provider = GeminiProvider::new(GeminiConfig {
                api_key: api_key.clone(),
                model: config.provider.model.clone(),
                endpoint: config.provider.endpoint.clone(),
                timeout: Duration::from_secs(config.provider.timeout_secs),
            })?;
            tracing::info!(model = %config.provider.model, "Using Gemini provider");
            Ok(AnalysisQueue::spawn(queue_config, provider, fallback))
        }
        None => {
            tracing::warn!("No Gemini API key configured, serving heuristic analyses only");
            Ok(AnalysisQueue::spawn(queue_config, OfflineProvider, fallback))
        }
    }
}
