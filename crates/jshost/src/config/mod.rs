use std::{fs, time::Duration};

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::logger::LoggerConfig;

pub(crate) mod defaults;
pub mod logger;

/// Host settings that are not worth a command-line flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostConfig {
    #[serde(skip_serializing, default)]
    pub(crate) path: Option<Utf8PathBuf>,

    /// Path segment debuggers connect to, `ws://{host}:{port}/{runtimeName}`
    #[serde(default = "defaults::default_runtime_name")]
    pub runtime_name: String,

    /// Interface the debugger listener binds
    #[serde(default = "defaults::default_host")]
    pub host: String,

    /// How long `--inspect-brk` waits for a debugger; unbounded when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_timeout_ms: Option<u64>,

    #[serde(default)]
    pub logger: LoggerConfig,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            path: None,
            runtime_name: defaults::default_runtime_name(),
            host: defaults::default_host(),
            wait_timeout_ms: None,
            logger: LoggerConfig::default(),
        }
    }
}

impl HostConfig {
    /// Loads config from a json file
    ///
    /// # Errors
    ///
    /// This function will return an error if the config path does not exist or the content is invalid
    pub fn load(path: &Utf8Path) -> Result<Self> {
        debug!("Loading config from {path}");

        if !path.exists() {
            anyhow::bail!("Config file does not exist: {path}");
        }

        let contents =
            fs::read_to_string(path).context(format!("Failed reading config: {path}"))?;

        let mut cfg: Self =
            serde_json::from_str(&contents).context(format!("Failed loading config: {path}"))?;
        cfg.path = Some(path.to_path_buf());

        Ok(cfg)
    }

    /// Loads `path` when given, otherwise the defaults.
    ///
    /// # Errors
    ///
    /// Same as [`HostConfig::load`].
    pub fn load_or_default(path: Option<&Utf8Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn path(&self) -> Option<&Utf8Path> {
        self.path.as_deref()
    }

    pub fn wait_timeout(&self) -> Option<Duration> {
        self.wait_timeout_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::logger::{LogLevel, LoggerFormat};

    #[test]
    fn test_empty_config_uses_defaults() {
        let cfg: HostConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.runtime_name, "runtime1");
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.wait_timeout(), None);
        assert!(cfg.logger.enabled);
        assert_eq!(cfg.logger.level, LogLevel::Info);
        assert_eq!(cfg.logger.format, LoggerFormat::Compact);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("jshost.json")).unwrap();
        fs::write(
            &path,
            r#"{
                "runtimeName": "main",
                "waitTimeoutMs": 1500,
                "logger": { "level": "DEBUG", "format": "json", "colors": false }
            }"#,
        )
        .unwrap();

        let cfg = HostConfig::load(&path).unwrap();
        assert_eq!(cfg.path(), Some(path.as_path()));
        assert_eq!(cfg.runtime_name, "main");
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.wait_timeout(), Some(Duration::from_millis(1500)));
        assert_eq!(cfg.logger.level, LogLevel::Debug);
        assert_eq!(cfg.logger.format, LoggerFormat::Json);
        assert!(!cfg.logger.colors);
    }

    #[test]
    fn test_load_errors_name_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = Utf8PathBuf::from_path_buf(dir.path().join("missing.json")).unwrap();
        let err = HostConfig::load(&missing).unwrap_err();
        assert!(err.to_string().contains("does not exist"));

        let invalid = Utf8PathBuf::from_path_buf(dir.path().join("invalid.json")).unwrap();
        fs::write(&invalid, "{ not json").unwrap();
        let err = HostConfig::load(&invalid).unwrap_err();
        assert!(err.to_string().contains("Failed loading config"));
    }

    #[test]
    fn test_flags_override_level() {
        assert_eq!(LogLevel::from_flags(0, false), None);
        assert_eq!(LogLevel::from_flags(1, false), Some(LogLevel::Debug));
        assert_eq!(LogLevel::from_flags(3, false), Some(LogLevel::Trace));
        assert_eq!(LogLevel::from_flags(2, true), Some(LogLevel::Error));
    }
}
