//! # DomainIQ Server
//!
//! An HTTP service that analyzes domain names with a quota-limited inference
//! provider (Gemini) and never lets the quota become the caller's problem.
//!
//! ## Purpose
//!
//! Free and low-tier inference APIs cap requests per minute and per day.
//! The server puts a single queue in front of the provider that:
//!
//! - **Paces calls** with a minimum spacing and a per-window cap
//! - **Caches results** so repeated lookups never touch the provider
//! - **Retries** transient failures a bounded number of times
//! - **Falls back** to a local heuristic when the quota is gone, keeping
//!   the provider idle until the next daily reset
//!
//! ## Quick Start
//!
//! ```bash
//! # Show all available options
//! domainiq --help
//!
//! # Serve HTTP on port 8080 using Gemini
//! domainiq --http --http-port 8080 --gemini-api-key "$GEMINI_API_KEY"
//!
//! # No key: heuristic analyses only
//! domainiq --http
//! ```
//!
//! ## Configuration
//!
//! Configure via CLI arguments or environment variables (CLI takes precedence):
//!
//! ```bash
//! export DOMAINIQ_HTTP=true
//! export DOMAINIQ_PER_WINDOW_LIMIT=10
//! export DOMAINIQ_MIN_INTERVAL_MS=6000
//! domainiq
//!
//! # List all available environment variables
//! domainiq --list-env-vars
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐
//! │    HTTP     │
//! │  Transport  │
//! └──────┬──────┘
//!        │
//!  ┌─────▼─────┐      ┌──────────┐
//!  │   Queue   │─────▶│  Gemini  │  one call at a time
//!  │   task    │      └──────────┘
//!  │ cache +   │      ┌──────────┐
//!  │ quota     │─────▶│Heuristic │  when the provider can't answer
//!  └───────────┘      └──────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! curl http://localhost:8080/analysis/crab.io
//!
//! curl -X POST http://localhost:8080/analyze \
//!   -H "Content-Type: application/json" \
//!   -d '{"domain": "crab.io"}'
//!
//! curl http://localhost:8080/stats
//! ```

pub mod config;
pub mod metrics;
pub mod provider;
pub mod queue;
pub mod transport;
pub mod types;
