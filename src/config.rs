//! # Configuration
//!
//! JSON configuration file with serde defaults and a strict validation
//! step. Secrets can be overridden from the environment.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::generate_token;
use crate::http_server::HttpServerConfig;
use crate::notify::EmailConfig;
use crate::scheduler::{SchedulerPolicy, SweepSchedule};
use crate::verification::{DenyPolicy, VerificationPolicy};

pub const MASTER_KEY_ENV: &str = "DEADSWITCH_MASTER_KEY";
pub const SCHEDULER_SECRET_ENV: &str = "DEADSWITCH_SCHEDULER_SECRET";

const MIN_MASTER_KEY_LEN: usize = 32;
const MIN_SCHEDULER_SECRET_LEN: usize = 16;

/// Result type for configuration loading
pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Read(String),

    #[error("Invalid config JSON: {0}")]
    Parse(String),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn status_code(&self) -> u16 {
        match self {
            ConfigError::Read(_) => 500,
            ConfigError::Parse(_) | ConfigError::Invalid(_) => 400,
        }
    }
}

/// Escalation and delivery tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyConfig {
    #[serde(default = "default_reminder_lookahead_hours")]
    pub reminder_lookahead_hours: u32,

    /// OTP lifetime; extended to the verification window when shorter
    #[serde(default = "default_otp_ttl_hours")]
    pub otp_ttl_hours: u32,

    #[serde(default = "default_invite_ttl_days")]
    pub invite_ttl_days: u32,

    /// How long a pending delivery claim blocks other runs
    #[serde(default = "default_delivery_claim_ttl_minutes")]
    pub delivery_claim_ttl_minutes: u32,

    #[serde(default = "default_max_delivery_attempts")]
    pub max_delivery_attempts: u32,

    #[serde(default)]
    pub deny_policy: DenyPolicy,
}

fn default_reminder_lookahead_hours() -> u32 {
    24
}
fn default_otp_ttl_hours() -> u32 {
    72
}
fn default_invite_ttl_days() -> u32 {
    7
}
fn default_delivery_claim_ttl_minutes() -> u32 {
    15
}
fn default_max_delivery_attempts() -> u32 {
    3
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            reminder_lookahead_hours: default_reminder_lookahead_hours(),
            otp_ttl_hours: default_otp_ttl_hours(),
            invite_ttl_days: default_invite_ttl_days(),
            delivery_claim_ttl_minutes: default_delivery_claim_ttl_minutes(),
            max_delivery_attempts: default_max_delivery_attempts(),
            deny_policy: DenyPolicy::default(),
        }
    }
}

impl PolicyConfig {
    pub fn verification(&self) -> VerificationPolicy {
        VerificationPolicy {
            otp_ttl_hours: self.otp_ttl_hours,
            invite_ttl_days: self.invite_ttl_days,
            deny_policy: self.deny_policy,
        }
    }

    pub fn scheduler(&self) -> SchedulerPolicy {
        SchedulerPolicy {
            reminder_lookahead: Duration::hours(i64::from(self.reminder_lookahead_hours)),
            max_delivery_attempts: self.max_delivery_attempts,
        }
    }

    pub fn delivery_claim_ttl(&self) -> Duration {
        Duration::minutes(i64::from(self.delivery_claim_ttl_minutes))
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.otp_ttl_hours == 0 {
            return Err(ConfigError::Invalid("policy.otp_ttl_hours must be > 0".into()));
        }
        if self.invite_ttl_days == 0 {
            return Err(ConfigError::Invalid("policy.invite_ttl_days must be > 0".into()));
        }
        if self.delivery_claim_ttl_minutes == 0 {
            return Err(ConfigError::Invalid(
                "policy.delivery_claim_ttl_minutes must be > 0".into(),
            ));
        }
        if self.max_delivery_attempts == 0 {
            return Err(ConfigError::Invalid(
                "policy.max_delivery_attempts must be > 0".into(),
            ));
        }
        Ok(())
    }
}

/// Configuration file structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Snapshot file of the record store (required)
    pub data_path: PathBuf,

    /// JSON-lines audit file (default: `audit.log` next to the snapshot)
    #[serde(default)]
    pub audit_log_path: Option<PathBuf>,

    /// Master secret for message encryption
    pub master_key: String,

    /// Bearer secret of the scheduler trigger endpoint
    pub scheduler_secret: String,

    #[serde(default = "default_scheduler_cron")]
    pub scheduler_cron: String,

    #[serde(default)]
    pub policy: PolicyConfig,

    #[serde(default)]
    pub http: HttpServerConfig,

    /// SMTP settings; absent means sends are only recorded in memory
    #[serde(default)]
    pub email: Option<EmailConfig>,
}

fn default_scheduler_cron() -> String {
    "*/15 * * * *".to_string()
}

impl Config {
    /// A config with fresh secrets, as written by `init`.
    pub fn generate(data_path: impl Into<PathBuf>) -> Self {
        Self {
            data_path: data_path.into(),
            audit_log_path: None,
            master_key: generate_token(),
            scheduler_secret: generate_token(),
            scheduler_cron: default_scheduler_cron(),
            policy: PolicyConfig::default(),
            http: HttpServerConfig::default(),
            email: None,
        }
    }

    /// Load, apply environment overrides, and validate.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Read(e.to_string()))?;
        let mut config = Self::from_json(&content)?;
        config.apply_env(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(content: &str) -> ConfigResult<Self> {
        serde_json::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Override secrets from `lookup` (the process environment in `load`).
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup(MASTER_KEY_ENV).filter(|v| !v.is_empty()) {
            self.master_key = key;
        }
        if let Some(secret) = lookup(SCHEDULER_SECRET_ENV).filter(|v| !v.is_empty()) {
            self.scheduler_secret = secret;
        }
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.data_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("data_path is required".into()));
        }
        if self.master_key.len() < MIN_MASTER_KEY_LEN {
            return Err(ConfigError::Invalid(format!(
                "master_key must be at least {} characters",
                MIN_MASTER_KEY_LEN
            )));
        }
        if self.scheduler_secret.len() < MIN_SCHEDULER_SECRET_LEN {
            return Err(ConfigError::Invalid(format!(
                "scheduler_secret must be at least {} characters",
                MIN_SCHEDULER_SECRET_LEN
            )));
        }
        SweepSchedule::parse(&self.scheduler_cron).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        self.policy.validate()?;

        if let Some(email) = &self.email {
            if email.smtp_host.trim().is_empty() {
                return Err(ConfigError::Invalid("email.smtp_host is required".into()));
            }
            if !email.from_email.contains('@') {
                return Err(ConfigError::Invalid(format!(
                    "email.from_email is not an address: '{}'",
                    email.from_email
                )));
            }
        }
        Ok(())
    }

    pub fn audit_log_path(&self) -> PathBuf {
        match &self.audit_log_path {
            Some(path) => path.clone(),
            None => self
                .data_path
                .parent()
                .map(|dir| dir.join("audit.log"))
                .unwrap_or_else(|| PathBuf::from("audit.log")),
        }
    }

    pub fn schedule(&self) -> ConfigResult<SweepSchedule> {
        SweepSchedule::parse(&self.scheduler_cron).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn to_json(&self) -> ConfigResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> String {
        r#"{
            "data_path": "/var/lib/deadswitch/store.json",
            "master_key": "0123456789abcdef0123456789abcdef",
            "scheduler_secret": "trigger-secret-0001"
        }"#
        .to_string()
    }

    #[test]
    fn test_defaults_fill_in() {
        let config = Config::from_json(&minimal()).unwrap();
        config.validate().unwrap();

        assert_eq!(config.scheduler_cron, "*/15 * * * *");
        assert_eq!(config.policy, PolicyConfig::default());
        assert_eq!(config.policy.deny_policy, DenyPolicy::Pause);
        assert_eq!(config.http.port, 8787);
        assert!(config.email.is_none());
        assert_eq!(
            config.audit_log_path(),
            PathBuf::from("/var/lib/deadswitch/audit.log")
        );
    }

    #[test]
    fn test_short_secrets_rejected() {
        let mut config = Config::from_json(&minimal()).unwrap();
        config.master_key = "short".into();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = Config::from_json(&minimal()).unwrap();
        config.scheduler_secret = "short".into();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_bad_cron_rejected() {
        let mut config = Config::from_json(&minimal()).unwrap();
        config.scheduler_cron = "whenever".into();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_env_overrides_secrets() {
        let mut config = Config::from_json(&minimal()).unwrap();
        config.apply_env(|name| match name {
            MASTER_KEY_ENV => Some("k".repeat(40)),
            SCHEDULER_SECRET_ENV => Some(String::new()),
            _ => None,
        });
        assert_eq!(config.master_key, "k".repeat(40));
        // Empty values do not override.
        assert_eq!(config.scheduler_secret, "trigger-secret-0001");
    }

    #[test]
    fn test_deny_policy_parses() {
        let json = minimal().replace(
            "\"scheduler_secret\"",
            "\"policy\": { \"deny_policy\": \"reset_to_active\" }, \"scheduler_secret\"",
        );
        let config = Config::from_json(&json).unwrap();
        assert_eq!(config.policy.deny_policy, DenyPolicy::ResetToActive);
        assert_eq!(config.policy.otp_ttl_hours, 72);
    }

    #[test]
    fn test_generated_config_is_valid() {
        let config = Config::generate("./store.json");
        config.validate().unwrap();
        let reloaded = Config::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(reloaded.master_key, config.master_key);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Read(_)));
        assert_eq!(err.status_code(), 500);
    }
}
