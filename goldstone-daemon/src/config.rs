//
// Copyright (c) The Goldstone Core Contributors
//
// SPDX-License-Identifier: MIT
//

#![allow(clippy::derivable_impls)]

use std::time::Duration;

use goldstone_datastore::Config as DatastoreConfig;
use goldstone_northbound::Config as ServerConfig;
use goldstone_telemetry::{
    Config as TelemetryConfig, DEFAULT_QUEUE_SIZE, DEFAULT_UPDATE_INTERVAL,
};
use serde::Deserialize;
use tracing_appender::rolling::Rotation;

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub logging: Logging,
    pub datastore: Datastore,
    pub northbound: Northbound,
    pub telemetry: Telemetry,
    pub liveness: Liveness,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Logging {
    pub journald: LoggingJournald,
    pub file: LoggingFile,
    pub stdout: LoggingStdout,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingJournald {
    pub enabled: bool,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingFile {
    pub enabled: bool,
    pub dir: String,
    pub name: String,
    pub rotation: LoggingFileRotation,
    #[serde(flatten)]
    pub fmt: LoggingFmt,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingStdout {
    pub enabled: bool,
    #[serde(flatten)]
    pub fmt: LoggingFmt,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingFmt {
    pub style: LoggingFmtStyle,
    pub colors: bool,
}

#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LoggingFileRotation {
    #[default]
    Never,
    Hourly,
    Daily,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LoggingFmtStyle {
    Compact,
    Full,
    Json,
}

// Timeouts are in seconds.
#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Datastore {
    pub startup_path: String,
    pub commit_timeout: u64,
    pub oper_timeout: u64,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Northbound {
    pub revert_timeout: u64,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Telemetry {
    pub enabled: bool,
    // Shortest sample and heartbeat interval, in seconds.
    pub update_interval: u64,
    pub queue_size: usize,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Liveness {
    pub enabled: bool,
    pub address: String,
    pub path: String,
}

// ===== impl Config =====

impl Config {
    const DFLT_FILEPATH: &'static str = "/etc/goldstoned.toml";

    pub(crate) fn load(config_file: Option<&str>) -> Config {
        let config_file = config_file.unwrap_or(Config::DFLT_FILEPATH);

        match std::fs::read_to_string(config_file) {
            Ok(config_str) => Config::parse(&config_str)
                .expect("Failed to parse configuration file"),
            Err(err) => {
                eprintln!("Failed to load configuration file: {err}");
                eprintln!("Falling back to default configuration...");
                Config::default()
            }
        }
    }

    pub(crate) fn parse(config_str: &str) -> Result<Config, toml::de::Error> {
        toml::from_str(config_str)
    }
}

impl Default for Config {
    fn default() -> Config {
        Config {
            logging: Default::default(),
            datastore: Default::default(),
            northbound: Default::default(),
            telemetry: Default::default(),
            liveness: Default::default(),
        }
    }
}

// ===== impl LoggingJournald =====

impl Default for LoggingJournald {
    fn default() -> LoggingJournald {
        LoggingJournald { enabled: false }
    }
}

// ===== impl LoggingFile =====

impl Default for LoggingFile {
    fn default() -> LoggingFile {
        LoggingFile {
            enabled: true,
            dir: "/var/log".to_owned(),
            name: "goldstoned.log".to_owned(),
            rotation: Default::default(),
            fmt: Default::default(),
        }
    }
}

// ===== impl LoggingStdout =====

impl Default for LoggingStdout {
    fn default() -> LoggingStdout {
        LoggingStdout {
            enabled: false,
            fmt: Default::default(),
        }
    }
}

// ===== impl LoggingFileRotation =====

impl LoggingFileRotation {
    pub(crate) fn rotation(&self) -> Rotation {
        match self {
            LoggingFileRotation::Never => Rotation::NEVER,
            LoggingFileRotation::Hourly => Rotation::HOURLY,
            LoggingFileRotation::Daily => Rotation::DAILY,
        }
    }
}

// ===== impl LoggingFmt =====

impl Default for LoggingFmt {
    fn default() -> LoggingFmt {
        LoggingFmt {
            style: LoggingFmtStyle::Full,
            colors: false,
        }
    }
}

// ===== impl Datastore =====

impl Datastore {
    pub(crate) fn config(&self) -> DatastoreConfig {
        DatastoreConfig {
            commit_timeout: Duration::from_secs(self.commit_timeout),
            oper_timeout: Duration::from_secs(self.oper_timeout),
        }
    }
}

impl Default for Datastore {
    fn default() -> Datastore {
        Datastore {
            startup_path: "/var/opt/goldstone/startup.db".to_owned(),
            commit_timeout: 60,
            oper_timeout: 10,
        }
    }
}

// ===== impl Northbound =====

impl Northbound {
    pub(crate) fn config(&self) -> ServerConfig {
        ServerConfig {
            revert_timeout: Duration::from_secs(self.revert_timeout),
        }
    }
}

impl Default for Northbound {
    fn default() -> Northbound {
        Northbound {
            revert_timeout: ServerConfig::default().revert_timeout.as_secs(),
        }
    }
}

// ===== impl Telemetry =====

impl Telemetry {
    pub(crate) fn config(&self) -> TelemetryConfig {
        TelemetryConfig {
            update_interval: Duration::from_secs(self.update_interval),
            queue_size: self.queue_size,
        }
    }
}

impl Default for Telemetry {
    fn default() -> Telemetry {
        Telemetry {
            enabled: true,
            update_interval: DEFAULT_UPDATE_INTERVAL.as_secs(),
            queue_size: DEFAULT_QUEUE_SIZE,
        }
    }
}

// ===== impl Liveness =====

impl Default for Liveness {
    fn default() -> Liveness {
        Liveness {
            enabled: true,
            address: "0.0.0.0:8080".to_owned(),
            path: "/healthz".to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config = Config::parse("").unwrap();
        assert!(config.logging.file.enabled);
        assert_eq!(config.logging.file.rotation, LoggingFileRotation::Never);
        assert_eq!(config.datastore.config().commit_timeout.as_secs(), 60);
        assert_eq!(config.datastore.config().oper_timeout.as_secs(), 10);
        assert_eq!(config.telemetry.config().update_interval.as_secs(), 5);
        assert_eq!(config.telemetry.queue_size, 128);
        assert_eq!(config.liveness.address, "0.0.0.0:8080");
        assert_eq!(config.liveness.path, "/healthz");
    }

    #[test]
    fn sections_override_defaults() {
        let config = Config::parse(
            r#"
            [logging.stdout]
            enabled = true
            style = "json"

            [datastore]
            startup_path = "/tmp/startup.db"

            [northbound]
            revert_timeout = 12

            [telemetry]
            update_interval = 1
            queue_size = 16

            [liveness]
            enabled = false
            "#,
        )
        .unwrap();
        assert!(config.logging.stdout.enabled);
        assert_eq!(config.logging.stdout.fmt.style, LoggingFmtStyle::Json);
        assert_eq!(config.datastore.startup_path, "/tmp/startup.db");
        assert_eq!(config.northbound.config().revert_timeout.as_secs(), 12);
        assert_eq!(config.telemetry.config().queue_size, 16);
        assert!(!config.liveness.enabled);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(Config::parse("[datastore]\nstartup = \"x\"").is_err());
        assert!(Config::parse("[plugins]").is_err());
    }
}
