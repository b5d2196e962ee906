//! Server configuration and CLI argument parsing
//!
//! Every option can be given on the command line or through an environment
//! variable with the `DOMAINIQ_` prefix.
//!
//! # Configuration Priority
//!
//! 1. CLI arguments (highest priority)
//! 2. Environment variables
//! 3. Default values (lowest priority)
//!
//! # Example Usage
//!
//! ```bash
//! # Using CLI arguments
//! domainiq --http --http-port 9090 --per-window-limit 10
//!
//! # Using environment variables
//! export DOMAINIQ_HTTP=true
//! export DOMAINIQ_GEMINI_API_KEY=...
//! domainiq
//!
//! # Mixed (CLI overrides env)
//! export DOMAINIQ_HTTP_PORT=8080
//! domainiq --http --http-port 9090  # Uses port 9090
//! ```

use anyhow::{Result, anyhow};
use clap::Parser;
use domainiq::{QueueConfig, ResetSchedule};
use std::time::Duration;

/// Main configuration structure for the server
#[derive(Debug, Clone)]
pub struct Config {
    /// Transport layer configuration
    pub transports: TransportConfig,
    /// Inference provider configuration
    pub provider: ProviderConfig,
    /// Queue pacing, retry and cache settings
    pub queue: QueueSettings,
    /// Channel buffer size for the queue task
    pub buffer_size: usize,
    /// Logging level (error, warn, info, debug, trace)
    pub log_level: String,
}

#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// HTTP/JSON transport configuration
    pub http: Option<HttpConfig>,
}

/// HTTP transport configuration
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Host address to bind to (e.g., "0.0.0.0")
    pub host: String,
    /// Port number to listen on
    pub port: u16,
}

/// Gemini connection settings
///
/// Without an API key the server runs offline and answers every request
/// from the local heuristic.
#[derive(Clone)]
pub struct ProviderConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub endpoint: String,
    pub timeout_secs: u64,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("endpoint", &self.endpoint)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Queue settings in the units operators configure them in
#[derive(Debug, Clone, PartialEq)]
pub struct QueueSettings {
    pub per_window_limit: u32,
    pub window_secs: u64,
    pub min_interval_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub cache_ttl_secs: u64,
    pub fallback_cache_ttl_secs: u64,
    pub cache_max_age_secs: u64,
    pub reset_schedule: ResetSchedule,
    pub maintenance_interval_secs: u64,
}

/// Command-line arguments for the server
///
/// All arguments can also be set via environment variables with the
/// DOMAINIQ_ prefix. CLI arguments take precedence over environment variables.
#[derive(Parser, Debug)]
#[command(
    name = "domainiq",
    about = "Rate-limited domain analysis service",
    long_about = "Serves domain analyses from a cache, a quota-limited inference provider, or a local heuristic fallback.\n\nAt least one transport must be specified.\n\nEnvironment variables with DOMAINIQ_ prefix are supported. CLI arguments take precedence over environment variables."
)]
pub struct Args {
    // HTTP Transport
    #[arg(long, help = "Enable HTTP transport", env = "DOMAINIQ_HTTP")]
    pub http: bool,
    #[arg(
        long,
        value_name = "HOST",
        help = "HTTP host",
        default_value = "127.0.0.1",
        env = "DOMAINIQ_HTTP_HOST"
    )]
    pub http_host: String,
    #[arg(
        long,
        value_name = "PORT",
        help = "HTTP port",
        default_value_t = 8080,
        env = "DOMAINIQ_HTTP_PORT"
    )]
    pub http_port: u16,

    // Provider
    #[arg(
        long,
        value_name = "KEY",
        help = "Gemini API key (offline mode when absent)",
        env = "DOMAINIQ_GEMINI_API_KEY",
        hide_env_values = true
    )]
    pub gemini_api_key: Option<String>,
    #[arg(
        long,
        value_name = "MODEL",
        help = "Gemini model name",
        default_value = "gemini-1.5-flash",
        env = "DOMAINIQ_GEMINI_MODEL"
    )]
    pub gemini_model: String,
    #[arg(
        long,
        value_name = "URL",
        help = "Gemini API base URL",
        default_value = "https://generativelanguage.googleapis.com/v1beta",
        env = "DOMAINIQ_GEMINI_ENDPOINT"
    )]
    pub gemini_endpoint: String,
    #[arg(
        long,
        value_name = "SECS",
        help = "Provider request timeout (seconds)",
        default_value_t = 30,
        env = "DOMAINIQ_PROVIDER_TIMEOUT_SECS"
    )]
    pub provider_timeout_secs: u64,

    // Queue pacing
    #[arg(
        long,
        value_name = "N",
        help = "Maximum provider calls per window",
        default_value_t = 15,
        env = "DOMAINIQ_PER_WINDOW_LIMIT"
    )]
    pub per_window_limit: u32,
    #[arg(
        long,
        value_name = "SECS",
        help = "Request window length (seconds)",
        default_value_t = 60,
        env = "DOMAINIQ_WINDOW_SECS"
    )]
    pub window_secs: u64,
    #[arg(
        long,
        value_name = "MS",
        help = "Minimum spacing between provider calls (milliseconds)",
        default_value_t = 4000,
        env = "DOMAINIQ_MIN_INTERVAL_MS"
    )]
    pub min_interval_ms: u64,
    #[arg(
        long,
        value_name = "N",
        help = "Retries after transient provider errors",
        default_value_t = 2,
        env = "DOMAINIQ_MAX_RETRIES"
    )]
    pub max_retries: u32,
    #[arg(
        long,
        value_name = "MS",
        help = "Delay before a retry (milliseconds)",
        default_value_t = 2000,
        env = "DOMAINIQ_RETRY_DELAY_MS"
    )]
    pub retry_delay_ms: u64,

    // Cache
    #[arg(
        long,
        value_name = "SECS",
        help = "Lifetime of provider results (seconds)",
        default_value_t = 3600,
        env = "DOMAINIQ_CACHE_TTL_SECS"
    )]
    pub cache_ttl_secs: u64,
    #[arg(
        long,
        value_name = "SECS",
        help = "Lifetime of fallback results, 0 disables (seconds)",
        default_value_t = 300,
        env = "DOMAINIQ_FALLBACK_CACHE_TTL_SECS"
    )]
    pub fallback_cache_ttl_secs: u64,
    #[arg(
        long,
        value_name = "SECS",
        help = "Entries older than this are swept at the daily reset (seconds)",
        default_value_t = 86_400,
        env = "DOMAINIQ_CACHE_MAX_AGE_SECS"
    )]
    pub cache_max_age_secs: u64,

    // Quota reset
    #[arg(
        long,
        value_name = "SCHEDULE",
        help = "Daily reset: daily-midnight (local), daily-utc-midnight",
        default_value = "daily-midnight",
        env = "DOMAINIQ_RESET_SCHEDULE"
    )]
    pub reset_schedule: ResetSchedule,
    #[arg(
        long,
        value_name = "SECS",
        help = "How often to check for the daily reset (seconds)",
        default_value_t = 60,
        env = "DOMAINIQ_MAINTENANCE_INTERVAL_SECS"
    )]
    pub maintenance_interval_secs: u64,

    // General options
    #[arg(
        long,
        value_name = "SIZE",
        help = "Channel buffer size",
        default_value_t = 10_000,
        env = "DOMAINIQ_BUFFER_SIZE"
    )]
    pub buffer_size: usize,
    #[arg(
        long,
        value_name = "LEVEL",
        help = "Log level: error, warn, info, debug, trace",
        default_value = "info",
        env = "DOMAINIQ_LOG_LEVEL"
    )]
    pub log_level: String,

    // Utility options
    #[arg(
        long,
        help = "List all environment variables and exit",
        action = clap::ArgAction::SetTrue
    )]
    pub list_env_vars: bool,
}

impl Config {
    /// Build configuration from environment variables and CLI arguments
    ///
    /// # Errors
    ///
    /// Returns an error if no transport is enabled or a numeric limit is zero.
    pub fn from_env_and_args() -> Result<Self> {
        let args = Args::parse();

        if args.list_env_vars {
            Self::print_env_vars();
            std::process::exit(0);
        }

        Self::from_args(args)
    }

    /// Build and validate configuration from already parsed arguments
    pub fn from_args(args: Args) -> Result<Self> {
        let http = args.http.then(|| HttpConfig {
            host: args.http_host,
            port: args.http_port,
        });

        let api_key = args
            .gemini_api_key
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty());

        let config = Config {
            transports: TransportConfig { http },
            provider: ProviderConfig {
                api_key,
                model: args.gemini_model,
                endpoint: args.gemini_endpoint,
                timeout_secs: args.provider_timeout_secs,
            },
            queue: QueueSettings {
                per_window_limit: args.per_window_limit,
                window_secs: args.window_secs,
                min_interval_ms: args.min_interval_ms,
                max_retries: args.max_retries,
                retry_delay_ms: args.retry_delay_ms,
                cache_ttl_secs: args.cache_ttl_secs,
                fallback_cache_ttl_secs: args.fallback_cache_ttl_secs,
                cache_max_age_secs: args.cache_max_age_secs,
                reset_schedule: args.reset_schedule,
                maintenance_interval_secs: args.maintenance_interval_secs,
            },
            buffer_size: args.buffer_size,
            log_level: args.log_level,
        };

        config.validate()?;

        Ok(config)
    }

    pub fn has_any_transport(&self) -> bool {
        self.transports.http.is_some()
    }

    /// Queue configuration for [`domainiq::AnalysisQueue`]
    pub fn queue_config(&self) -> QueueConfig {
        let q = &self.queue;
        QueueConfig::builder()
            .per_window_limit(q.per_window_limit)
            .window(Duration::from_secs(q.window_secs))
            .min_interval(Duration::from_millis(q.min_interval_ms))
            .max_retries(q.max_retries)
            .retry_delay(Duration::from_millis(q.retry_delay_ms))
            .cache_ttl(Duration::from_secs(q.cache_ttl_secs))
            .fallback_cache_ttl(Duration::from_secs(q.fallback_cache_ttl_secs))
            .cache_max_age(Duration::from_secs(q.cache_max_age_secs))
            .reset_schedule(q.reset_schedule)
            .maintenance_interval(Duration::from_secs(q.maintenance_interval_secs))
            .buffer_size(self.buffer_size)
            .build()
    }

    fn validate(&self) -> Result<()> {
        if !self.has_any_transport() {
            return Err(anyhow!(
                "At least one transport must be specified.\n\n\
                Available transports:\n  \
                --http       Enable HTTP transport\n\n\
                Example:\n  \
                domainiq --http --http-port 8080\n\n\
                For more information, try '--help'"
            ));
        }

        for (name, value) in [
            ("--per-window-limit", self.queue.per_window_limit as u64),
            ("--window-secs", self.queue.window_secs),
            ("--maintenance-interval-secs", self.queue.maintenance_interval_secs),
            ("--buffer-size", self.buffer_size as u64),
            ("--provider-timeout-secs", self.provider.timeout_secs),
        ] {
            if value == 0 {
                return Err(anyhow!("{name} must be greater than zero"));
            }
        }

        Ok(())
    }

    /// Print all available environment variables and their descriptions
    fn print_env_vars() {
        println!("DomainIQ Environment Variables");
        println!("==============================");
        println!();
        println!("All environment variables use the DOMAINIQ_ prefix.");
        println!("CLI arguments take precedence over environment variables.");
        println!();

        println!("Transport Configuration:");
        println!("  DOMAINIQ_HTTP=true|false                   Enable HTTP transport");
        println!("  DOMAINIQ_HTTP_HOST=<host>                  HTTP host [default: 127.0.0.1]");
        println!("  DOMAINIQ_HTTP_PORT=<port>                  HTTP port [default: 8080]");
        println!();

        println!("Provider Configuration:");
        println!(
            "  DOMAINIQ_GEMINI_API_KEY=<key>              Gemini API key [default: none, offline mode]"
        );
        println!(
            "  DOMAINIQ_GEMINI_MODEL=<model>              Model name [default: gemini-1.5-flash]"
        );
        println!(
            "  DOMAINIQ_GEMINI_ENDPOINT=<url>             API base URL [default: https://generativelanguage.googleapis.com/v1beta]"
        );
        println!(
            "  DOMAINIQ_PROVIDER_TIMEOUT_SECS=<secs>      Request timeout [default: 30]"
        );
        println!();

        println!("Queue Configuration:");
        println!(
            "  DOMAINIQ_PER_WINDOW_LIMIT=<n>              Provider calls per window [default: 15]"
        );
        println!("  DOMAINIQ_WINDOW_SECS=<secs>                Window length [default: 60]");
        println!(
            "  DOMAINIQ_MIN_INTERVAL_MS=<ms>              Spacing between calls [default: 4000]"
        );
        println!(
            "  DOMAINIQ_MAX_RETRIES=<n>                   Retries after transient errors [default: 2]"
        );
        println!("  DOMAINIQ_RETRY_DELAY_MS=<ms>               Delay before a retry [default: 2000]");
        println!();

        println!("Cache Configuration:");
        println!(
            "  DOMAINIQ_CACHE_TTL_SECS=<secs>             Provider result lifetime [default: 3600]"
        );
        println!(
            "  DOMAINIQ_FALLBACK_CACHE_TTL_SECS=<secs>    Fallback result lifetime, 0 disables [default: 300]"
        );
        println!(
            "  DOMAINIQ_CACHE_MAX_AGE_SECS=<secs>         Swept at daily reset [default: 86400]"
        );
        println!();

        println!("Quota Reset:");
        println!(
            "  DOMAINIQ_RESET_SCHEDULE=<schedule>         daily-midnight, daily-utc-midnight [default: daily-midnight]"
        );
        println!(
            "  DOMAINIQ_MAINTENANCE_INTERVAL_SECS=<secs>  Reset check interval [default: 60]"
        );
        println!();

        println!("General Configuration:");
        println!("  DOMAINIQ_BUFFER_SIZE=<size>                Channel buffer size [default: 10000]");
        println!(
            "  DOMAINIQ_LOG_LEVEL=<level>                 Log level: error, warn, info, debug, trace [default: info]"
        );
        println!();

        println!("Examples:");
        println!("  # Serve HTTP on port 8080 with a Gemini key");
        println!("  export DOMAINIQ_HTTP=true");
        println!("  export DOMAINIQ_GEMINI_API_KEY=your-key");
        println!();
        println!("  # Stay well under a free-tier quota");
        println!("  export DOMAINIQ_PER_WINDOW_LIMIT=10");
        println!("  export DOMAINIQ_MIN_INTERVAL_MS=6000");
        println!();
        println!("  # Run server (CLI args override env vars)");
        println!("  domainiq --http-port 9090  # Will use port 9090, not 8080");
    }
}
