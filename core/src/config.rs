use crate::timestamp;
use chrono::{DateTime, Utc};
use config::{ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub checkpoint_dir: PathBuf,
    pub retry: RetryConfig,
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub inputs: Vec<InputConfig>,
}

/// One configured polling source. The host's input UI is expected to have
/// enforced these ranges already; `validate` re-checks them so a hand-edited
/// config file fails at startup rather than mid-run.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InputConfig {
    /// Namespaced input identity, e.g. `cisco_phishing://prod`.
    pub name: String,
    /// Messages per page, 1-1000.
    pub message_limit: u32,
    /// Settle gap in minutes subtracted from "now" when computing the
    /// window end, 1-60. Avoids fetching messages the remote system has
    /// not finished indexing.
    pub duration: i64,
    /// Where to start on the very first run, `YYYY-MM-DDTHH:MM:SS+00:00`.
    pub initial_start_date: String,
    pub client_id: String,
    /// Either the literal secret or the masked placeholder `**********`,
    /// in which case the secret resolver supplies the real value.
    pub client_secret: String,
    pub token_host: String,
    pub service_host: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    /// Delay between attempts after an HTTP 429.
    pub rate_limit_delay_ms: u64,
    /// Give up after this many rate-limited attempts; `None` retries
    /// until the remote stops returning 429.
    pub max_attempts: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub log_format: LogFormat,
    pub metrics_enabled: bool,
    pub metrics_port: u16,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

impl InputConfig {
    pub fn initial_start(&self) -> Result<DateTime<Utc>, ConfigError> {
        timestamp::parse(&self.initial_start_date).map_err(|_| {
            ConfigError::Message(format!(
                "input {:?}: invalid initial_start_date, use the format 'yyyy-mm-ddThh:mm:ss+00:00'",
                self.name
            ))
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::Message("input name is required".into()));
        }

        if self.message_limit == 0 || self.message_limit > 1000 {
            return Err(ConfigError::Message(format!(
                "input {:?}: message_limit must be between 1 and 1000",
                self.name
            )));
        }

        if self.duration < 1 || self.duration > 60 {
            return Err(ConfigError::Message(format!(
                "input {:?}: duration must be between 1 and 60 minutes",
                self.name
            )));
        }

        self.initial_start()?;

        for (field, value) in [
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
            ("token_host", &self.token_host),
            ("service_host", &self.service_host),
        ] {
            if value.is_empty() {
                return Err(ConfigError::Message(format!(
                    "input {:?}: {} is required",
                    self.name, field
                )));
            }
        }

        Ok(())
    }
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();

        // Load default configuration
        builder = builder.add_source(config::Config::try_from(&Config::default())?);

        // Layer on config file if it exists
        if Path::new("config.toml").exists() {
            builder = builder.add_source(File::with_name("config"));
        }

        // Layer on environment variables (COLLECTOR_ prefix)
        builder = builder.add_source(
            Environment::with_prefix("COLLECTOR")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        let settings: Config = config.try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.checkpoint_dir.as_os_str().is_empty() {
            return Err(ConfigError::Message("checkpoint_dir is required".into()));
        }

        if self.retry.rate_limit_delay_ms == 0 {
            return Err(ConfigError::Message(
                "retry.rate_limit_delay_ms must be greater than 0".into(),
            ));
        }

        for input in &self.inputs {
            input.validate()?;
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            checkpoint_dir: PathBuf::from("checkpoints"),
            retry: RetryConfig {
                rate_limit_delay_ms: 1000,
                max_attempts: None,
            },
            telemetry: TelemetryConfig {
                log_level: "info".to_string(),
                log_format: LogFormat::Pretty,
                metrics_enabled: false,
                metrics_port: 9090,
            },
            inputs: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_input() -> InputConfig {
        InputConfig {
            name: "cisco_phishing://prod".to_string(),
            message_limit: 50,
            duration: 5,
            initial_start_date: "2023-01-01T00:00:00+00:00".to_string(),
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
            token_host: "token.example.com".to_string(),
            service_host: "api.example.com".to_string(),
        }
    }

    #[test]
    fn accepts_valid_input() {
        assert!(sample_input().validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_limit() {
        let mut input = sample_input();
        input.message_limit = 0;
        assert!(input.validate().is_err());
        input.message_limit = 1001;
        assert!(input.validate().is_err());
        input.message_limit = 1000;
        assert!(input.validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_duration() {
        let mut input = sample_input();
        input.duration = 0;
        assert!(input.validate().is_err());
        input.duration = 61;
        assert!(input.validate().is_err());
        input.duration = 60;
        assert!(input.validate().is_ok());
    }

    #[test]
    fn rejects_badly_formatted_start_date() {
        let mut input = sample_input();
        input.initial_start_date = "2023-01-01".to_string();
        assert!(input.validate().is_err());
    }

    #[test]
    fn default_config_validates() {
        assert!(Config::default().validate().is_ok());
    }
}
