//! Service configuration
//!
//! Everything is read from the environment (a `.env` file is loaded first by
//! `main`). Only `DATABASE_URL` is mandatory.

use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_VAPI_BASE_URL: &str = "https://api.vapi.ai";
/// Upper bound on calls one dispatch may place for one campaign.
pub const MAX_CALLS_CEILING: usize = 10;
pub const MAX_TRIAL_NUMBER_HOLD_DAYS: i64 = 365;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// SMTP settings for trial usage alerts
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from_email: String,
    pub from_name: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub port: u16,

    pub vapi_api_key: String,
    pub vapi_base_url: String,
    /// Timeout for a single call-placement request
    pub call_timeout: Duration,

    pub poll_cron: String,
    pub trial_sweep_cron: String,
    pub number_sweep_cron: String,

    /// Calls placed per campaign per poll tick
    pub poll_max_calls: usize,
    /// Placement requests in flight at once within one dispatch
    pub dispatch_concurrency: usize,
    pub trial_number_hold_days: i64,

    pub smtp: Option<SmtpConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            port: 3000,
            vapi_api_key: String::new(),
            vapi_base_url: DEFAULT_VAPI_BASE_URL.to_string(),
            call_timeout: Duration::from_secs(20),
            poll_cron: "0/30 * * * * *".to_string(),
            trial_sweep_cron: "0 0 3 * * *".to_string(),
            number_sweep_cron: "0 30 3 * * *".to_string(),
            poll_max_calls: 1,
            dispatch_concurrency: 1,
            trial_number_hold_days: 14,
            smtp: None,
        }
    }
}

impl AppConfig {
    /// Build config from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| ConfigError::Missing("DATABASE_URL"))?;

        let config = Self {
            database_url,
            port: env_parse("PORT")?.unwrap_or(defaults.port),
            vapi_api_key: std::env::var("VAPI_API_KEY").unwrap_or_default(),
            vapi_base_url: std::env::var("VAPI_BASE_URL").unwrap_or(defaults.vapi_base_url),
            call_timeout: env_parse("CALL_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.call_timeout),
            poll_cron: std::env::var("POLL_CRON").unwrap_or(defaults.poll_cron),
            trial_sweep_cron: std::env::var("TRIAL_SWEEP_CRON").unwrap_or(defaults.trial_sweep_cron),
            number_sweep_cron: std::env::var("NUMBER_SWEEP_CRON").unwrap_or(defaults.number_sweep_cron),
            poll_max_calls: env_parse("POLL_MAX_CALLS")?.unwrap_or(defaults.poll_max_calls),
            dispatch_concurrency: env_parse("DISPATCH_CONCURRENCY")?
                .unwrap_or(defaults.dispatch_concurrency),
            trial_number_hold_days: env_parse("TRIAL_NUMBER_HOLD_DAYS")?
                .unwrap_or(defaults.trial_number_hold_days),
            smtp: SmtpConfig::from_env()?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database_url.is_empty() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }
        if self.poll_max_calls == 0 || self.poll_max_calls > MAX_CALLS_CEILING {
            return Err(ConfigError::Invalid {
                name: "POLL_MAX_CALLS",
                reason: format!("must be between 1 and {}", MAX_CALLS_CEILING),
            });
        }
        if self.dispatch_concurrency == 0 {
            return Err(ConfigError::Invalid {
                name: "DISPATCH_CONCURRENCY",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.call_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                name: "CALL_TIMEOUT_SECS",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.trial_number_hold_days <= 0 || self.trial_number_hold_days > MAX_TRIAL_NUMBER_HOLD_DAYS {
            return Err(ConfigError::Invalid {
                name: "TRIAL_NUMBER_HOLD_DAYS",
                reason: format!("must be between 1 and {}", MAX_TRIAL_NUMBER_HOLD_DAYS),
            });
        }
        Ok(())
    }
}

impl SmtpConfig {
    /// `None` when SMTP_HOST is unset; usage alerts are then only logged.
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let Ok(host) = std::env::var("SMTP_HOST") else {
            return Ok(None);
        };

        Ok(Some(Self {
            host,
            port: env_parse("SMTP_PORT")?.unwrap_or(587),
            username: std::env::var("SMTP_USERNAME")
                .map_err(|_| ConfigError::Missing("SMTP_USERNAME"))?,
            password: std::env::var("SMTP_PASSWORD")
                .map_err(|_| ConfigError::Missing("SMTP_PASSWORD"))?,
            from_email: std::env::var("SMTP_FROM_EMAIL")
                .map_err(|_| ConfigError::Missing("SMTP_FROM_EMAIL"))?,
            from_name: std::env::var("SMTP_FROM_NAME")
                .unwrap_or_else(|_| "Campaign Dialer".to_string()),
        }))
    }
}

fn env_parse<T>(name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::Invalid { name, reason: e.to_string() }),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> AppConfig {
        AppConfig {
            database_url: "postgres://localhost/dialer".to_string(),
            ..AppConfig::default()
        }
    }

    #[test]
    fn test_defaults_validate() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn test_missing_database_url_is_fatal() {
        let config = AppConfig::default();
        assert!(matches!(config.validate(), Err(ConfigError::Missing("DATABASE_URL"))));
    }

    #[test]
    fn test_poll_max_calls_is_capped() {
        let config = AppConfig { poll_max_calls: MAX_CALLS_CEILING + 1, ..valid() };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { name: "POLL_MAX_CALLS", .. })
        ));

        let config = AppConfig { poll_max_calls: 0, ..valid() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_trial_number_hold_days_is_bounded() {
        for days in [0, -3, MAX_TRIAL_NUMBER_HOLD_DAYS + 1, i64::MAX] {
            let config = AppConfig { trial_number_hold_days: days, ..valid() };
            assert!(matches!(
                config.validate(),
                Err(ConfigError::Invalid { name: "TRIAL_NUMBER_HOLD_DAYS", .. })
            ));
        }

        let config = AppConfig { trial_number_hold_days: MAX_TRIAL_NUMBER_HOLD_DAYS, ..valid() };
        assert!(config.validate().is_ok());
    }
}
