use crate::env::{env_or, APP_ENV_ENV, LOG_LEVEL_ENV};
use crate::formatter::{Formatter, JsonFormatter, TextFormatter};
use crate::hook::ServiceHook;
use crate::layer::CloudLogLayer;
use crate::logger::{Logger, LoggerBuilder};
use crate::record::{Level, ParseLevelError};
use std::io::Write;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

/// Output format of the logger.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    /// Line-delimited JSON for cloud log ingestion.
    Json,
    /// Human readable lines for local development.
    Text,
}

impl OutputFormat {
    fn formatter(self) -> Box<dyn Formatter> {
        match self {
            OutputFormat::Json => Box::new(JsonFormatter::new()),
            OutputFormat::Text => Box::new(TextFormatter::new()),
        }
    }
}

/// Logger configuration resolved once at startup.
///
/// **Fields**
/// - `format`: JSON in production, text elsewhere.
/// - `level`: minimum level written.
/// - `report_caller`: attach the call site to error-class entries so it
///   shows up as the report location.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoggerConfig {
    pub format: OutputFormat,
    pub level: Level,
    pub report_caller: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::Json,
            level: Level::Info,
            report_caller: true,
        }
    }
}

impl LoggerConfig {
    /// Defaults for a deployment environment name: `production` gets JSON
    /// at `Info`, anything else text at `Debug`.
    pub fn for_environment(environment: &str) -> Self {
        if environment == "production" {
            Self::default()
        } else {
            Self {
                format: OutputFormat::Text,
                level: Level::Debug,
                report_caller: true,
            }
        }
    }

    /// Read `APP_ENV` and the optional `LOG_LEVEL` override.
    ///
    /// **Returns**
    /// - `Err(InitError::Level)` if `LOG_LEVEL` is set to an unknown level.
    pub fn from_env() -> Result<Self, InitError> {
        let mut config = Self::for_environment(&env_or(APP_ENV_ENV, "development"));
        if let Ok(level) = std::env::var(LOG_LEVEL_ENV) {
            config.level = level.parse()?;
        }
        Ok(config)
    }

    /// Builder pre-filled with this configuration.
    pub fn logger_builder(&self) -> LoggerBuilder {
        Logger::builder()
            .boxed_formatter(self.format.formatter())
            .level(self.level)
            .report_caller(self.report_caller)
    }
}

/// Error type returned when installing the logger.
#[derive(thiserror::Error, Debug)]
pub enum InitError {
    #[error("global tracing subscriber already set: {0}")]
    AlreadySet(#[from] tracing::subscriber::SetGlobalDefaultError),

    #[error("invalid log level: {0}")]
    Level(#[from] ParseLevelError),
}

/// Install a global `tracing` subscriber writing to `out` and return the
/// [`Logger`] behind it.
///
/// **Effects**
///
/// Registers a [`ServiceHook`] resolved from `POD_NAME` and installs a
/// [`Registry`] combined with [`CloudLogLayer`] as the global default
/// subscriber. The returned logger writes to the same output and is the
/// way to log rich values (errors, requests, RPC contexts).
pub fn try_init_with_writer(
    config: &LoggerConfig,
    out: impl Write + Send + 'static,
) -> Result<Logger, InitError> {
    let logger = config
        .logger_builder()
        .hook(ServiceHook::from_env())
        .writer(out)
        .build();

    let subscriber = Registry::default().with(CloudLogLayer::new(logger.clone()));
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(logger)
}

/// Same as [`try_init_with_writer`] with stdout as output.
pub fn try_init(config: &LoggerConfig) -> Result<Logger, InitError> {
    try_init_with_writer(config, std::io::stdout())
}

/// Initialize from the environment with stdout as output.
///
/// This is the recommended entrypoint for typical microservices.
pub fn init() -> Result<Logger, InitError> {
    try_init(&LoggerConfig::from_env()?)
}
