use std::{path::PathBuf, time::Duration};

use config::{ConfigError, Environment};

use crate::error::AppResult;

/// Settlement cadence the scheduler is built around, in seconds.
pub const SETTLEMENT_PERIOD_SECS: u64 = 60;

#[derive(Debug, Clone)]
pub struct Config {
    pub chain_id: String,
    pub app_id: String,
    /// GraphQL endpoint of the betting application
    pub endpoint: String,
    /// Account passed as `caller` to the settle mutation
    pub keeper_account: String,
    /// Accepted and reported, but the scheduler always ticks on minute boundaries
    pub settlement_interval_secs: u64,
    pub request_timeout: Duration,
    pub log_path: PathBuf,
    pub status_addr: Option<String>,
    pub snapshot_refresh: Duration,
}

impl Config {
    pub fn from_env() -> AppResult<Self> {
        Self::load(Environment::with_prefix("KEEPER"))
    }

    pub fn load(env: Environment) -> AppResult<Self> {
        let settings = config::Config::builder()
            .set_default("host", "localhost")?
            .set_default("port", 8080_i64)?
            .set_default("interval_secs", SETTLEMENT_PERIOD_SECS as i64)?
            .set_default("timeout_secs", 30_i64)?
            .set_default("log_path", "logs/settlement.log")?
            .set_default("snapshot_refresh_secs", 30_i64)?
            .add_source(env)
            .build()?;

        let chain_id = required(&settings, "chain_id")?;
        let app_id = required(&settings, "app_id")?;

        let endpoint = match optional(&settings, "endpoint") {
            Some(endpoint) => endpoint,
            None => format!(
                "http://{}:{}/chains/{}/applications/{}",
                settings.get_string("host")?,
                settings.get_int("port")?,
                chain_id,
                app_id
            ),
        };

        let keeper_account = optional(&settings, "account").unwrap_or_else(|| {
            if app_id.starts_with("0x") {
                app_id.clone()
            } else {
                format!("0x{}", app_id)
            }
        });

        let timeout_secs = positive(&settings, "timeout_secs")?;
        let snapshot_refresh_secs = positive(&settings, "snapshot_refresh_secs")?;

        Ok(Self {
            chain_id,
            app_id,
            endpoint,
            keeper_account,
            settlement_interval_secs: positive(&settings, "interval_secs")?,
            request_timeout: Duration::from_secs(timeout_secs),
            log_path: PathBuf::from(settings.get_string("log_path")?),
            status_addr: optional(&settings, "status_addr"),
            snapshot_refresh: Duration::from_secs(snapshot_refresh_secs),
        })
    }
}

fn optional(settings: &config::Config, key: &str) -> Option<String> {
    settings
        .get_string(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn required(settings: &config::Config, key: &str) -> Result<String, ConfigError> {
    optional(settings, key)
        .ok_or_else(|| ConfigError::Message(format!("KEEPER_{} must be set", key.to_uppercase())))
}

fn positive(settings: &config::Config, key: &str) -> Result<u64, ConfigError> {
    let value = settings.get_int(key)?;
    if value <= 0 {
        return Err(ConfigError::Message(format!(
            "KEEPER_{} must be a positive number of seconds, got {}",
            key.to_uppercase(),
            value
        )));
    }
    Ok(value as u64)
}
