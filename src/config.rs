//! Process configuration read from the environment.

use std::path::PathBuf;

pub const WORKSPACE_ENV: &str = "ECOLED_WORKSPACE";
pub const LOG_ENV: &str = "ECOLED_LOG";
const DEFAULT_LOG_FILTER: &str = "ecoled=info";

#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Workspace opened before the first request, if set.
    pub workspace: Option<PathBuf>,
    /// Log filter directive (`EnvFilter` syntax).
    pub log_filter: String,
}

impl Config {
    pub fn from_env() -> Self {
        let workspace = std::env::var_os(WORKSPACE_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        let log_filter = std::env::var(LOG_ENV)
            .ok()
            .or_else(|| std::env::var("RUST_LOG").ok())
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());
        Self {
            workspace,
            log_filter,
        }
    }
}

/// Logs go to stderr; stdout carries the JSON protocol.
pub fn init_logging(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_new(&config.log_filter)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
