//! Environment variable names read at startup.
//!
//! Only [`crate::init::LoggerConfig::from_env`] and
//! [`crate::hook::ServiceHook::from_env`] look at the environment; the
//! formatters never do.

/// Name of the running pod, e.g. `billing-api-5d8f7c9b4-x2kqp`.
pub const POD_NAME_ENV: &str = "POD_NAME";

/// Deployment environment; `production` selects JSON output.
pub const APP_ENV_ENV: &str = "APP_ENV";

/// Optional minimum level overriding the environment default.
pub const LOG_LEVEL_ENV: &str = "LOG_LEVEL";

/// Read an environment variable or fall back to a provided default.
pub fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
