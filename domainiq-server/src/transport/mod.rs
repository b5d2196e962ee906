//! Transport layer implementations for the analysis server
//!
//! Transports implement the [`Transport`] trait and all talk to the same
//! queue task through a cloned [`AnalysisHandle`].
//!
//! # Available Transports
//!
//! - [`http`]: REST API with JSON

pub mod http;


use anyhow::Result;
use async_trait::async_trait;
use domainiq::AnalysisHandle;

/// Common interface for all transport implementations
#[async_trait]
pub trait Transport {
    /// Bind, accept and serve until an error occurs
    async fn start(self, queue: AnalysisHandle) -> Result<()>;
}
