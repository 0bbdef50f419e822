use std::time::Duration;

use anyhow::{bail, Context, Result};

pub const DEFAULT_SERVER_URL: &str = "http://localhost:5000";
pub const DEFAULT_SECTION: &str = "Goal Rules";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Base URL of the grammar and rule service.
    pub server_url: String,
    /// Rule section passed as `type` when listing and storing.
    pub section: String,
    pub timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_owned(),
            section: DEFAULT_SECTION.to_owned(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl Config {
    /// Environment variables over defaults.
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let timeout_secs = match lookup("WORKOUT_RULES_TIMEOUT_SECS") {
            Some(raw) => raw
                .trim()
                .parse()
                .context("WORKOUT_RULES_TIMEOUT_SECS must be a whole number of seconds")?,
            None => DEFAULT_TIMEOUT_SECS,
        };

        let config = Self {
            server_url: lookup("WORKOUT_RULES_SERVER_URL").unwrap_or(defaults.server_url),
            section: lookup("WORKOUT_RULES_SECTION").unwrap_or(defaults.section),
            timeout: Duration::from_secs(timeout_secs),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.server_url.starts_with("http://") || self.server_url.starts_with("https://")) {
            bail!("server URL must start with http:// or https://, got {:?}", self.server_url);
        }
        if self.section.trim().is_empty() {
            bail!("rule section cannot be empty");
        }
        if self.timeout.is_zero() {
            bail!("timeout must be greater than zero");
        }
        Ok(())
    }
}
