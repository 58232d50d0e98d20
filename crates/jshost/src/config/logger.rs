//! The `logger` section of the host config.
//!
//! ```json
//! { "logger": { "level": "debug", "format": "json", "colors": false } }
//! ```
//!
//! Every field is optional. `-v`/`-q` on the command line win over `level`,
//! and `RUST_LOG` wins over both.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::defaults::default_true;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggerConfig {
    /// `false` installs no subscriber at all
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub level: LogLevel,
    #[serde(default)]
    pub format: LoggerFormat,
    /// ANSI colors on stderr
    #[serde(default = "default_true")]
    pub colors: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: LogLevel::default(),
            format: LoggerFormat::default(),
            colors: true,
        }
    }
}

/// Shape of each stderr log line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoggerFormat {
    #[default]
    Compact,
    /// Multi-line, for reading a debugger session by eye
    Pretty,
    Json,
}

/// Verbosity of the host crates; everything else logs at `warn`.
///
/// Variants compare by verbosity, `Trace` being the chattiest. The config
/// accepts the lowercase names, and their uppercase spelling as used in
/// `RUST_LOG`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    #[serde(alias = "TRACE")]
    Trace,
    #[serde(alias = "DEBUG")]
    Debug,
    #[default]
    #[serde(alias = "INFO")]
    Info,
    #[serde(alias = "WARN")]
    Warn,
    #[serde(alias = "ERROR")]
    Error,
}

impl LogLevel {
    /// Directive spelling for an `EnvFilter`
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    /// `-q` keeps errors only; each `-v` steps down from `info`. `None` when
    /// neither flag was given and the config decides.
    pub fn from_flags(verbose: u8, quiet: bool) -> Option<Self> {
        if quiet {
            return Some(Self::Error);
        }
        match verbose {
            0 => None,
            1 => Some(Self::Debug),
            _ => Some(Self::Trace),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels_accept_both_spellings() {
        let levels: Vec<LogLevel> = serde_json::from_str(r#"["trace", "WARN", "error"]"#).unwrap();
        assert_eq!(levels, [LogLevel::Trace, LogLevel::Warn, LogLevel::Error]);
        assert_eq!(serde_json::to_string(&LogLevel::Debug).unwrap(), r#""debug""#);
        assert!(serde_json::from_str::<LogLevel>(r#""verbose""#).is_err());
    }

    #[test]
    fn test_levels_order_by_verbosity() {
        assert!(LogLevel::Trace < LogLevel::Debug);
        assert!(LogLevel::Warn < LogLevel::Error);
        assert_eq!(LogLevel::Info.to_string(), "info");
    }

    #[test]
    fn test_partial_logger_section_keeps_defaults() {
        let config: LoggerConfig = serde_json::from_str(r#"{ "format": "pretty" }"#).unwrap();
        assert!(config.enabled);
        assert!(config.colors);
        assert_eq!(config.level, LogLevel::Info);
        assert_eq!(config.format, LoggerFormat::Pretty);
    }
}
