use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::logger::{LogLevel, LoggerConfig, LoggerFormat};

const WHITELISTED_CRATES: &[&str] = &["jshost", "jshost_debugger", "jshost_engine"];

pub(crate) fn default_env_filter(level: &str) -> String {
    let mut filters: Vec<String> = WHITELISTED_CRATES
        .iter()
        .map(|crate_name| format!("{crate_name}={level}"))
        .collect();

    // Set default level for all other crates to warn
    filters.insert(0, "warn".to_string());

    filters.join(",")
}

/// Installs the global subscriber. Logs go to stderr; stdout belongs to the
/// script and its result.
pub(crate) fn init_logger(config: &LoggerConfig, level_override: Option<LogLevel>) {
    if !config.enabled {
        return;
    }
    let level = level_override.unwrap_or(config.level);
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_env_filter(level.as_str())));

    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(config.colors)
        .with_target(level <= LogLevel::Debug);
    let result = match config.format {
        LoggerFormat::Compact => tracing_subscriber::registry()
            .with(filter)
            .with(layer.compact())
            .try_init(),
        LoggerFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(layer.pretty())
            .try_init(),
        LoggerFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(layer.json())
            .try_init(),
    };

    if let Err(e) = result {
        eprintln!("jshost: Failed initializing logger: {e:?}");
    }
}
