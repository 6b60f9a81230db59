//! Configuration for the batch pipeline binary.
//!
//! Values come from serde defaults, then environment variables. CLI flags
//! override the file paths afterwards.

use crate::errors::BatchflowError;
use crate::notify::{
    SmtpSettings, DEFAULT_CHANNEL_ATTEMPTS, DEFAULT_CHANNEL_DELAY, DEFAULT_SMTP_TIMEOUT,
    FAILURE_SUBJECT, SUCCESS_SUBJECT,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Who receives run notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientConfig {
    /// Always notified.
    #[serde(default = "default_admin")]
    pub admin: String,
    /// Notified when set.
    #[serde(default)]
    pub data_team: Option<String>,
    /// Notified when set.
    #[serde(default)]
    pub dev_team: Option<String>,
}

fn default_admin() -> String {
    "admin@example.com".to_string()
}

impl Default for RecipientConfig {
    fn default() -> Self {
        Self {
            admin: default_admin(),
            data_team: None,
            dev_team: None,
        }
    }
}

impl RecipientConfig {
    /// Returns every configured address, admin first.
    #[must_use]
    pub fn all(&self) -> Vec<String> {
        std::iter::once(&self.admin)
            .chain(self.data_team.as_ref())
            .chain(self.dev_team.as_ref())
            .cloned()
            .collect()
    }
}

/// Everything the batch binary needs for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Input CSV.
    #[serde(default = "default_data_file")]
    pub data_file: PathBuf,
    /// Directory for derived datasets and the report.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Directory the fallback mail channel writes to.
    #[serde(default = "default_spool_dir")]
    pub spool_dir: PathBuf,
    /// Mail relay settings.
    #[serde(default)]
    pub smtp: SmtpSettings,
    /// From address.
    #[serde(default = "default_sender")]
    pub sender: String,
    /// Notification recipients.
    #[serde(default)]
    pub recipients: RecipientConfig,
    /// Subject of the success notification.
    #[serde(default = "default_success_subject")]
    pub success_subject: String,
    /// Subject of the failure notification.
    #[serde(default = "default_failure_subject")]
    pub failure_subject: String,
    /// Submissions per channel before falling back.
    #[serde(default = "default_channel_attempts")]
    pub channel_attempts: u32,
    /// Seconds between submissions on one channel.
    #[serde(default = "default_channel_delay_secs")]
    pub channel_delay_secs: u64,
    /// Connect and command timeout for the SMTP relay, in seconds.
    #[serde(default = "default_smtp_timeout_secs")]
    pub smtp_timeout_secs: u64,
}

fn default_data_file() -> PathBuf {
    PathBuf::from("data/sample_data.csv")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("data/processed")
}

fn default_spool_dir() -> PathBuf {
    PathBuf::from("data/mail")
}

fn default_sender() -> String {
    "batchflow@example.com".to_string()
}

fn default_success_subject() -> String {
    SUCCESS_SUBJECT.to_string()
}

fn default_failure_subject() -> String {
    FAILURE_SUBJECT.to_string()
}

fn default_channel_attempts() -> u32 {
    DEFAULT_CHANNEL_ATTEMPTS
}

fn default_channel_delay_secs() -> u64 {
    DEFAULT_CHANNEL_DELAY.as_secs()
}

fn default_smtp_timeout_secs() -> u64 {
    DEFAULT_SMTP_TIMEOUT.as_secs()
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            data_file: default_data_file(),
            output_dir: default_output_dir(),
            spool_dir: default_spool_dir(),
            smtp: SmtpSettings::default(),
            sender: default_sender(),
            recipients: RecipientConfig::default(),
            success_subject: default_success_subject(),
            failure_subject: default_failure_subject(),
            channel_attempts: default_channel_attempts(),
            channel_delay_secs: default_channel_delay_secs(),
            smtp_timeout_secs: default_smtp_timeout_secs(),
        }
    }
}

impl BatchConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// See [`BatchConfig::from_lookup`].
    pub fn from_env() -> Result<Self, BatchflowError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a configuration from a variable lookup, falling back to the
    /// defaults for unset or empty variables.
    ///
    /// The sender defaults to `SMTP_MAIL_FROM`, then `SMTP_USER`.
    ///
    /// # Errors
    ///
    /// Returns `Config` if a numeric or boolean variable does not parse.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, BatchflowError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(path) = get("BATCHFLOW_DATA_FILE") {
            config.data_file = PathBuf::from(path);
        }
        if let Some(path) = get("BATCHFLOW_OUTPUT_DIR") {
            config.output_dir = PathBuf::from(path);
        }
        if let Some(path) = get("BATCHFLOW_SPOOL_DIR") {
            config.spool_dir = PathBuf::from(path);
        }

        if let Some(host) = get("SMTP_HOST") {
            config.smtp.host = host;
        }
        if let Some(port) = get("SMTP_PORT") {
            config.smtp.port = parse_number("SMTP_PORT", &port)?;
        }
        if let Some(user) = get("SMTP_USER") {
            config.smtp.username = user;
        }
        if let Some(secret) = get("SMTP_PASSWORD") {
            config.smtp.secret = secret;
        }
        if let Some(flag) = get("AIRFLOW__SMTP__SMTP_STARTTLS") {
            config.smtp.use_tls = parse_bool("AIRFLOW__SMTP__SMTP_STARTTLS", &flag)?;
        }
        if let Some(flag) = get("AIRFLOW__SMTP__SMTP_SSL") {
            config.smtp.use_ssl = parse_bool("AIRFLOW__SMTP__SMTP_SSL", &flag)?;
        }

        if let Some(sender) = get("SMTP_MAIL_FROM") {
            config.sender = sender;
        } else if config.smtp.has_credentials() {
            config.sender = config.smtp.username.clone();
        }

        if let Some(admin) = get("EMAIL_ADMIN") {
            config.recipients.admin = admin;
        }
        config.recipients.data_team = get("EMAIL_DATA_TEAM");
        config.recipients.dev_team = get("EMAIL_DEV_TEAM");

        if let Some(attempts) = get("BATCHFLOW_CHANNEL_ATTEMPTS") {
            config.channel_attempts = parse_number("BATCHFLOW_CHANNEL_ATTEMPTS", &attempts)?;
        }
        if let Some(delay) = get("BATCHFLOW_CHANNEL_DELAY_SECS") {
            config.channel_delay_secs = parse_number("BATCHFLOW_CHANNEL_DELAY_SECS", &delay)?;
        }
        if let Some(timeout) = get("BATCHFLOW_SMTP_TIMEOUT_SECS") {
            config.smtp_timeout_secs = parse_number("BATCHFLOW_SMTP_TIMEOUT_SECS", &timeout)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Checks values no parser catches.
    ///
    /// # Errors
    ///
    /// Returns `Config` for zero channel attempts.
    pub fn validate(&self) -> Result<(), BatchflowError> {
        if self.channel_attempts == 0 {
            return Err(BatchflowError::Config(
                "channel attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the delay between submissions on one channel.
    #[must_use]
    pub fn channel_delay(&self) -> Duration {
        Duration::from_secs(self.channel_delay_secs)
    }

    /// Returns the SMTP relay timeout.
    #[must_use]
    pub fn smtp_timeout(&self) -> Duration {
        Duration::from_secs(self.smtp_timeout_secs)
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, BatchflowError> {
    value
        .trim()
        .parse()
        .map_err(|_| BatchflowError::Config(format!("{name} is not a valid number: '{value}'")))
}

fn parse_bool(name: &str, value: &str) -> Result<bool, BatchflowError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(BatchflowError::Config(format!(
            "{name} is not a valid boolean: '{value}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults_without_environment() {
        let config = BatchConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, BatchConfig::default());
        assert_eq!(config.recipients.all(), vec!["admin@example.com".to_string()]);
        assert_eq!(config.smtp.relay(), "smtp.gmail.com:587");
        assert_eq!(config.channel_delay(), Duration::from_secs(5));
    }

    #[test]
    fn test_environment_overrides() {
        let config = BatchConfig::from_lookup(lookup(&[
            ("SMTP_HOST", "mail.internal"),
            ("SMTP_PORT", "2525"),
            ("SMTP_USER", "robot@corp.example"),
            ("SMTP_PASSWORD", "s3cret"),
            ("AIRFLOW__SMTP__SMTP_STARTTLS", "False"),
            ("AIRFLOW__SMTP__SMTP_SSL", "True"),
            ("EMAIL_ADMIN", "ops@corp.example"),
            ("EMAIL_DEV_TEAM", "dev@corp.example"),
            ("BATCHFLOW_OUTPUT_DIR", "/srv/out"),
            ("BATCHFLOW_SMTP_TIMEOUT_SECS", "10"),
        ]))
        .unwrap();

        assert_eq!(config.smtp.relay(), "mail.internal:2525");
        assert_eq!(config.smtp.security(), "ssl");
        assert_eq!(config.sender, "robot@corp.example");
        assert_eq!(
            config.recipients.all(),
            vec!["ops@corp.example".to_string(), "dev@corp.example".to_string()]
        );
        assert_eq!(config.output_dir, PathBuf::from("/srv/out"));
        assert_eq!(config.smtp_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_mail_from_wins_over_user() {
        let config = BatchConfig::from_lookup(lookup(&[
            ("SMTP_USER", "robot@corp.example"),
            ("SMTP_MAIL_FROM", "reports@corp.example"),
        ]))
        .unwrap();
        assert_eq!(config.sender, "reports@corp.example");
    }

    #[test]
    fn test_invalid_values_are_config_errors() {
        let err = BatchConfig::from_lookup(lookup(&[("SMTP_PORT", "smtp")])).unwrap_err();
        assert!(matches!(err, BatchflowError::Config(_)));

        let err = BatchConfig::from_lookup(lookup(&[("AIRFLOW__SMTP__SMTP_SSL", "maybe")]))
            .unwrap_err();
        assert!(err.to_string().contains("AIRFLOW__SMTP__SMTP_SSL"));

        let err = BatchConfig::from_lookup(lookup(&[("BATCHFLOW_CHANNEL_ATTEMPTS", "0")]))
            .unwrap_err();
        assert!(matches!(err, BatchflowError::Config(_)));
    }

    #[test]
    fn test_deserialize_partial_config() {
        let config: BatchConfig =
            serde_json::from_str(r#"{"output_dir": "/tmp/out", "smtp": {"port": 465}}"#).unwrap();
        assert_eq!(config.output_dir, PathBuf::from("/tmp/out"));
        assert_eq!(config.smtp.port, 465);
        assert_eq!(config.smtp.host, "smtp.gmail.com");
        assert_eq!(config.channel_attempts, 3);
    }
}
