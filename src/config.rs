use clap::{Args, Parser, ValueEnum};
use std::time::Duration as StdDuration;
use time::Duration;

#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Config {
    #[command(flatten)]
    pub database: DatabaseConfig,

    #[command(flatten)]
    pub server: ServerConfig,

    #[command(flatten)]
    pub auth: AuthConfig,

    #[command(flatten)]
    pub notes: NoteConfig,

    #[command(flatten)]
    pub lifecycle: LifecycleConfig,

    #[command(flatten)]
    pub telemetry: TelemetryConfig,

    #[command(flatten)]
    pub health: HealthConfig,
}

#[derive(Clone, Debug, Args)]
pub struct DatabaseConfig {
    /// Database connection URL. Notes are kept in process memory when unset.
    #[arg(long = "database-url", env = "LOVENOTES_DATABASE_URL")]
    pub url: Option<String>,

    /// Maximum number of pooled connections
    #[arg(long, env = "LOVENOTES_DB_MAX_CONNECTIONS", default_value_t = 10)]
    pub max_connections: u32,

    /// Minimum number of idle connections kept open
    #[arg(long, env = "LOVENOTES_DB_MIN_CONNECTIONS", default_value_t = 1)]
    pub min_connections: u32,

    /// How long a store operation waits for a free connection
    #[arg(long, env = "LOVENOTES_DB_ACQUIRE_TIMEOUT_SECS", default_value_t = 5)]
    pub acquire_timeout_secs: u64,

    #[arg(long, env = "LOVENOTES_DB_IDLE_TIMEOUT_SECS", default_value_t = 600)]
    pub idle_timeout_secs: u64,

    #[arg(long, env = "LOVENOTES_DB_MAX_LIFETIME_SECS", default_value_t = 1800)]
    pub max_lifetime_secs: u64,

    /// Upper bound on connection attempts at boot before giving up
    #[arg(long, env = "LOVENOTES_DB_CONNECT_MAX_RETRIES", default_value_t = 5)]
    pub connect_max_retries: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 10,
            min_connections: 1,
            acquire_timeout_secs: 5,
            idle_timeout_secs: 600,
            max_lifetime_secs: 1800,
            connect_max_retries: 5,
        }
    }
}

#[derive(Clone, Debug, Args)]
pub struct ServerConfig {
    /// Host to listen on
    #[arg(long, env = "LOVENOTES_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "LOVENOTES_PORT", default_value_t = 5000)]
    pub port: u16,

    /// Port for the management (health) server
    #[arg(long, env = "LOVENOTES_MGMT_PORT", default_value_t = 9090)]
    pub mgmt_port: u16,

    /// How long to wait for background tasks during shutdown
    #[arg(long, env = "LOVENOTES_SHUTDOWN_TIMEOUT_SECS", default_value_t = 5)]
    pub shutdown_timeout_secs: u64,

    /// Per-request timeout for the public API
    #[arg(long, env = "LOVENOTES_REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            mgmt_port: 9090,
            shutdown_timeout_secs: 5,
            request_timeout_secs: 30,
        }
    }
}

#[derive(Clone, Debug, Args)]
pub struct AuthConfig {
    /// Secret used to verify bearer tokens issued by the account service
    #[arg(long, env = "LOVENOTES_JWT_SECRET")]
    pub jwt_secret: String,
}

#[derive(Clone, Debug, Args)]
pub struct NoteConfig {
    /// Maximum note text length in characters
    #[arg(long, env = "LOVENOTES_MAX_CONTENT_CHARS", default_value_t = 500)]
    pub max_content_chars: usize,
}

impl Default for NoteConfig {
    fn default() -> Self {
        Self { max_content_chars: 500 }
    }
}

/// Upper bound for every lifecycle delay and interval (ten years).
pub const MAX_LIFECYCLE_SECS: u64 = 315_360_000;

#[derive(Clone, Debug, Args)]
pub struct LifecycleConfig {
    /// Delay between note creation and automatic publishing
    #[arg(
        long,
        env = "LOVENOTES_PUBLISH_DELAY_SECS",
        default_value_t = 86_400,
        value_parser = clap::value_parser!(u64).range(1..=MAX_LIFECYCLE_SECS)
    )]
    pub publish_delay_secs: u64,

    /// How long a published note stays visible before it is soft-deleted
    #[arg(
        long,
        env = "LOVENOTES_EXPIRY_DELAY_SECS",
        default_value_t = 259_200,
        value_parser = clap::value_parser!(u64).range(1..=MAX_LIFECYCLE_SECS)
    )]
    pub expiry_delay_secs: u64,

    /// How often the lifecycle sweep runs
    #[arg(
        long,
        env = "LOVENOTES_SWEEP_INTERVAL_SECS",
        default_value_t = 600,
        value_parser = clap::value_parser!(u64).range(1..=MAX_LIFECYCLE_SECS)
    )]
    pub sweep_interval_secs: u64,

    /// Delay before the first sweep after boot
    #[arg(
        long,
        env = "LOVENOTES_STARTUP_SWEEP_DELAY_SECS",
        default_value_t = 5,
        value_parser = clap::value_parser!(u64).range(0..=MAX_LIFECYCLE_SECS)
    )]
    pub startup_sweep_delay_secs: u64,

    /// Shortens both delays and the sweep interval for manual testing
    #[arg(long, env = "LOVENOTES_FAST_MODE", default_value_t = false)]
    pub fast_mode: bool,

    #[arg(
        long,
        env = "LOVENOTES_FAST_PUBLISH_DELAY_SECS",
        default_value_t = 120,
        value_parser = clap::value_parser!(u64).range(1..=MAX_LIFECYCLE_SECS)
    )]
    pub fast_publish_delay_secs: u64,

    #[arg(
        long,
        env = "LOVENOTES_FAST_EXPIRY_DELAY_SECS",
        default_value_t = 300,
        value_parser = clap::value_parser!(u64).range(1..=MAX_LIFECYCLE_SECS)
    )]
    pub fast_expiry_delay_secs: u64,

    #[arg(
        long,
        env = "LOVENOTES_FAST_SWEEP_INTERVAL_SECS",
        default_value_t = 60,
        value_parser = clap::value_parser!(u64).range(1..=MAX_LIFECYCLE_SECS)
    )]
    pub fast_sweep_interval_secs: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            publish_delay_secs: 86_400,
            expiry_delay_secs: 259_200,
            sweep_interval_secs: 600,
            startup_sweep_delay_secs: 5,
            fast_mode: false,
            fast_publish_delay_secs: 120,
            fast_expiry_delay_secs: 300,
            fast_sweep_interval_secs: 60,
        }
    }
}

/// Lifecycle durations resolved once at startup. Never changes afterwards.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LifecycleTimings {
    pub publish_delay: Duration,
    pub expiry_delay: Duration,
    pub sweep_interval: StdDuration,
    pub startup_delay: StdDuration,
}

impl LifecycleConfig {
    /// Resolves the active delays, honouring fast mode.
    ///
    /// # Errors
    /// Returns an error if a delay or interval is zero or above `MAX_LIFECYCLE_SECS`.
    pub fn timings(&self) -> anyhow::Result<LifecycleTimings> {
        let (publish, expiry, interval) = if self.fast_mode {
            (self.fast_publish_delay_secs, self.fast_expiry_delay_secs, self.fast_sweep_interval_secs)
        } else {
            (self.publish_delay_secs, self.expiry_delay_secs, self.sweep_interval_secs)
        };

        for (name, secs) in [("publish delay", publish), ("expiry delay", expiry), ("sweep interval", interval)] {
            anyhow::ensure!(
                (1..=MAX_LIFECYCLE_SECS).contains(&secs),
                "{name} must be between 1 and {MAX_LIFECYCLE_SECS} seconds, got {secs}"
            );
        }
        anyhow::ensure!(
            self.startup_sweep_delay_secs <= MAX_LIFECYCLE_SECS,
            "startup sweep delay must be at most {MAX_LIFECYCLE_SECS} seconds"
        );

        Ok(LifecycleTimings {
            publish_delay: Duration::seconds(i64::try_from(publish)?),
            expiry_delay: Duration::seconds(i64::try_from(expiry)?),
            sweep_interval: StdDuration::from_secs(interval),
            startup_delay: StdDuration::from_secs(self.startup_sweep_delay_secs),
        })
    }
}

impl Default for LifecycleTimings {
    fn default() -> Self {
        Self {
            publish_delay: Duration::hours(24),
            expiry_delay: Duration::days(3),
            sweep_interval: StdDuration::from_secs(600),
            startup_delay: StdDuration::from_secs(5),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Clone, Debug, Args)]
pub struct TelemetryConfig {
    /// Log output format
    #[arg(long, env = "LOVENOTES_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Default log filter when `RUST_LOG` is not set
    #[arg(long, env = "LOVENOTES_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// OTLP collector endpoint for traces and metrics
    #[arg(long, env = "LOVENOTES_OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self { log_format: LogFormat::Text, log_level: "info".to_string(), otlp_endpoint: None }
    }
}

#[derive(Clone, Debug, Args)]
pub struct HealthConfig {
    /// Timeout for the store readiness probe
    #[arg(long, env = "LOVENOTES_HEALTH_DB_TIMEOUT_MS", default_value_t = 2000)]
    pub db_timeout_ms: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self { db_timeout_ms: 2000 }
    }
}

impl Config {
    #[must_use]
    pub fn load() -> Self {
        Self::parse()
    }
}
