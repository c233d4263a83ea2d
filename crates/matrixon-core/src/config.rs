//! Configuration for the timeline writer tooling
//!
//! Values come from an optional TOML file merged with `MATRIXON_` prefixed
//! environment variables, the latter taking precedence. Nested tables are
//! addressed from the environment as `MATRIXON_<TABLE>_<KEY>`, for example
//! `MATRIXON_LOGGING_LEVEL=debug`.

use std::path::Path;

use figment::{
    providers::{Env, Format, Toml},
    value::Uncased,
    Figment,
};
use matrixon_common::{MatrixonError, Result};
use ruma::OwnedUserId;
use serde::{Deserialize, Serialize};

static SUB_TABLES: [&str; 2] = ["logging", "replay"];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimelineConfig {
    /// The local user; reactions sent by it are flagged as `me`.
    #[serde(default)]
    pub own_user_id: Option<OwnedUserId>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Replay tool behaviour
    #[serde(default)]
    pub replay: ReplayConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `info` or `matrixon_timeline=debug`
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format
    #[serde(default)]
    pub format: LogFormat,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReplayConfig {
    /// Write the first replayed response with rejoin overlap handling, for
    /// replays that resume a room whose store already holds history.
    #[serde(default)]
    pub treat_first_as_rejoin: bool,
}

fn default_log_level() -> String {
    "info".to_owned()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

impl TimelineConfig {
    /// Load configuration from an optional TOML file and the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();
        if let Some(path) = path {
            if !path.exists() {
                return Err(MatrixonError::Config(format!(
                    "Config file does not exist: {}",
                    path.display()
                )));
            }
            figment = figment.merge(Toml::file(path));
        }

        let config: TimelineConfig = figment
            .merge(Env::prefixed("MATRIXON_").map(|k| {
                let mut key: Uncased = k.into();
                for table in SUB_TABLES {
                    if k.starts_with(&(table.to_owned() + "_")) {
                        key = Uncased::from(
                            table.to_owned() + "." + &k.as_str()[table.len() + 1..],
                        );
                        break;
                    }
                }
                key
            }))
            .extract()
            .map_err(|e| MatrixonError::Config(format!("Failed to load configuration: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.logging.level.trim().is_empty() {
            return Err(MatrixonError::Config("Log level cannot be empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;
    use test_log::test;

    #[test]
    fn test_config_default() {
        let config = TimelineConfig::default();
        assert!(config.own_user_id.is_none());
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert!(!config.replay.treat_first_as_rejoin);
    }

    #[test]
    fn test_config_from_toml_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
own_user_id = "@alice:example.org"

[logging]
level = "debug"
format = "json"

[replay]
treat_first_as_rejoin = true
"#
        )
        .unwrap();

        let config = TimelineConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.own_user_id.unwrap().as_str(), "@alice:example.org");
        assert_eq!(config.logging.format, LogFormat::Json);
        assert!(config.replay.treat_first_as_rejoin);
    }

    #[test]
    fn test_config_missing_file() {
        let err = TimelineConfig::load(Some(Path::new("/nonexistent/matrixon.toml"))).unwrap_err();
        assert!(matches!(err, MatrixonError::Config(_)));
    }

    #[test]
    fn test_config_validation() {
        let mut config = TimelineConfig::default();
        assert!(config.validate().is_ok());

        config.logging.level = "  ".to_owned();
        assert!(config.validate().is_err());
    }
}
