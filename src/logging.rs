//! Logging subsystem
//!
//! Structured logging via tracing with support for JSON (production) and
//! plaintext (development) output formats.
//!
//! # Environment Variables
//!
//! - `PALISADE_LOG` - Primary log level/filter (takes precedence)
//! - `RUST_LOG` - Fallback log level/filter
//!
//! # Examples
//!
//! ```no_run
//! use palisade::logging::{init_logging, LogConfig};
//!
//! // Development setup (plaintext to stdout)
//! init_logging(LogConfig::development()).unwrap();
//! ```

use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use tracing::Level;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Guard to track if logging has been initialized
static INIT_GUARD: OnceLock<()> = OnceLock::new();

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// JSON format for production (structured logs)
    Json,
    /// Human-readable plaintext for development
    #[default]
    Plaintext,
}

/// Log output destination
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LogOutput {
    /// Write to stdout
    #[default]
    Stdout,
    /// Write to stderr
    Stderr,
    /// Write to a file at the given path
    File(PathBuf),
}

/// Configuration for the logging subsystem
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Output format (JSON or plaintext)
    pub format: LogFormat,
    /// Output destination (stdout, stderr, or file)
    pub output: LogOutput,
    /// Default log level when no env filter is set
    pub default_level: Level,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Plaintext,
            output: LogOutput::Stdout,
            default_level: Level::INFO,
        }
    }
}

impl LogConfig {
    /// Create a development configuration (plaintext to stdout, debug level)
    pub fn development() -> Self {
        Self {
            format: LogFormat::Plaintext,
            output: LogOutput::Stdout,
            default_level: Level::DEBUG,
        }
    }

    /// Create a production configuration (JSON to stdout, info level)
    pub fn production() -> Self {
        Self {
            format: LogFormat::Json,
            output: LogOutput::Stdout,
            default_level: Level::INFO,
        }
    }
}

/// Error type for logging initialization
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("failed to create log file: {0}")]
    FileCreation(#[from] io::Error),
    #[error("failed to parse log filter: {0}")]
    FilterParse(#[from] tracing_subscriber::filter::ParseError),
    #[error("logging already initialized")]
    AlreadyInitialized,
    #[error("failed to initialize subscriber: {0}")]
    TryInit(#[from] tracing_subscriber::util::TryInitError),
}

/// Build an EnvFilter from environment variables or default level.
///
/// Checks PALISADE_LOG first, then RUST_LOG, falling back to the default level.
fn build_env_filter(default_level: Level) -> Result<EnvFilter, LoggingError> {
    if let Ok(filter) = std::env::var("PALISADE_LOG") {
        return Ok(EnvFilter::try_new(filter)?);
    }
    if let Ok(filter) = std::env::var("RUST_LOG") {
        return Ok(EnvFilter::try_new(filter)?);
    }

    Ok(EnvFilter::try_new(
        default_level.as_str().to_lowercase(),
    )?)
}

/// Initialize the logging subsystem with the given configuration.
///
/// This function should be called once at application startup. Subsequent
/// calls will return an error.
pub fn init_logging(config: LogConfig) -> Result<(), LoggingError> {
    // Prevent double initialization
    if INIT_GUARD.set(()).is_err() {
        return Err(LoggingError::AlreadyInitialized);
    }

    let filter = build_env_filter(config.default_level)?;

    // RFC 3339 timestamp format
    let timer = UtcTime::rfc_3339();

    let layer = match (&config.format, &config.output) {
        (LogFormat::Json, LogOutput::Stdout) => tracing_subscriber::fmt::layer()
            .json()
            .with_timer(timer)
            .with_target(true)
            .with_writer(io::stdout as fn() -> io::Stdout)
            .boxed(),
        (LogFormat::Json, LogOutput::Stderr) => tracing_subscriber::fmt::layer()
            .json()
            .with_timer(timer)
            .with_target(true)
            .with_writer(io::stderr as fn() -> io::Stderr)
            .boxed(),
        (LogFormat::Json, LogOutput::File(path)) => {
            let file = File::create(path)?;
            tracing_subscriber::fmt::layer()
                .json()
                .with_timer(timer)
                .with_target(true)
                .with_writer(Arc::new(file))
                .boxed()
        }
        (LogFormat::Plaintext, LogOutput::Stdout) => tracing_subscriber::fmt::layer()
            .with_timer(timer)
            .with_target(true)
            .with_writer(io::stdout as fn() -> io::Stdout)
            .boxed(),
        (LogFormat::Plaintext, LogOutput::Stderr) => tracing_subscriber::fmt::layer()
            .with_timer(timer)
            .with_target(true)
            .with_writer(io::stderr as fn() -> io::Stderr)
            .boxed(),
        (LogFormat::Plaintext, LogOutput::File(path)) => {
            let file = File::create(path)?;
            tracing_subscriber::fmt::layer()
                .with_timer(timer)
                .with_target(true)
                .with_writer(Arc::new(file))
                .boxed()
        }
    };

    tracing_subscriber::registry()
        .with(layer.with_filter(filter))
        .try_init()?;

    Ok(())
}
