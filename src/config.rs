//! Process configuration, loaded once at startup from the environment
//! (spec §6 "Environment", SPEC_FULL §4.13).

use config::ConfigError;
use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub api_key: String,
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_max_logs_limit")]
    pub max_logs_limit: i64,
    #[serde(default = "default_enable_auto_replay")]
    pub enable_auto_replay: bool,
    #[serde(default = "default_auto_replay_interval_secs")]
    pub auto_replay_interval_secs: u64,
    #[serde(default = "default_auto_replay_batch_size")]
    pub auto_replay_batch_size: i64,
    #[serde(default = "default_mock_agents_url")]
    pub mock_agents_url: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_db_pool_size")]
    pub db_pool_size: u32,
    #[serde(default = "default_db_pool_overflow")]
    pub db_pool_overflow: u32,
    #[serde(default = "default_rate_limit_per_second")]
    pub rate_limit_per_second: u32,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}
fn default_max_logs_limit() -> i64 {
    1000
}
fn default_enable_auto_replay() -> bool {
    true
}
fn default_auto_replay_interval_secs() -> u64 {
    600
}
fn default_auto_replay_batch_size() -> i64 {
    50
}
fn default_mock_agents_url() -> String {
    "http://localhost:9000".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_db_pool_size() -> u32 {
    20
}
fn default_db_pool_overflow() -> u32 {
    30
}
fn default_rate_limit_per_second() -> u32 {
    100
}

impl Config {
    /// Load from the process environment (after merging a `.env` file, if
    /// present), via the `config` crate's builder with explicit defaults and
    /// per-key overrides. Fails fast if `DATABASE_URL` or `API_KEY` is
    /// missing — both are fatal at startup per spec §7.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let mut builder = config::Config::builder()
            .set_default("database_url", "")?
            .set_default("api_key", "")?
            .set_default("bind_addr", default_bind_addr())?
            .set_default("max_logs_limit", default_max_logs_limit())?
            .set_default("enable_auto_replay", default_enable_auto_replay())?
            .set_default("auto_replay_interval_secs", default_auto_replay_interval_secs())?
            .set_default("auto_replay_batch_size", default_auto_replay_batch_size())?
            .set_default("mock_agents_url", default_mock_agents_url())?
            .set_default("log_level", default_log_level())?
            .set_default("db_pool_size", default_db_pool_size())?
            .set_default("db_pool_overflow", default_db_pool_overflow())?
            .set_default("rate_limit_per_second", default_rate_limit_per_second())?;

        if let Ok(v) = env::var("DATABASE_URL") {
            builder = builder.set_override("database_url", v)?;
        }
        if let Ok(v) = env::var("API_KEY") {
            builder = builder.set_override("api_key", v)?;
        }
        if let Ok(v) = env::var("BIND_ADDR") {
            builder = builder.set_override("bind_addr", v)?;
        }
        if let Ok(v) = env::var("MAX_LOGS_LIMIT") {
            builder = builder.set_override("max_logs_limit", v)?;
        }
        if let Ok(v) = env::var("ENABLE_AUTO_REPLAY") {
            builder = builder.set_override("enable_auto_replay", v)?;
        }
        if let Ok(v) = env::var("AUTO_REPLAY_INTERVAL") {
            builder = builder.set_override("auto_replay_interval_secs", v)?;
        }
        if let Ok(v) = env::var("AUTO_REPLAY_BATCH_SIZE") {
            builder = builder.set_override("auto_replay_batch_size", v)?;
        }
        if let Ok(v) = env::var("MOCK_AGENTS_URL") {
            builder = builder.set_override("mock_agents_url", v)?;
        }
        if let Ok(v) = env::var("LOG_LEVEL") {
            builder = builder.set_override("log_level", v)?;
        }
        if let Ok(v) = env::var("RATE_LIMIT_PER_SECOND") {
            builder = builder.set_override("rate_limit_per_second", v)?;
        }

        let config: Self = builder
            .build()?
            .try_deserialize()
            .map_err(|e: ConfigError| anyhow::anyhow!("invalid configuration: {e}"))?;

        if config.database_url.is_empty() {
            anyhow::bail!("DATABASE_URL must be set");
        }
        if config.api_key.is_empty() {
            anyhow::bail!("API_KEY must be set");
        }

        Ok(config)
    }

    pub fn auto_replay_interval(&self) -> Duration {
        Duration::from_secs(self.auto_replay_interval_secs)
    }

    /// Total pool capacity including overflow (spec §5: `size=20`, `overflow=30`).
    pub fn db_pool_max_connections(&self) -> u32 {
        self.db_pool_size + self.db_pool_overflow
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn db_pool_max_connections_sums_size_and_overflow() {
        let config = Config {
            database_url: "postgres://x".to_string(),
            api_key: "k".to_string(),
            bind_addr: default_bind_addr(),
            max_logs_limit: default_max_logs_limit(),
            enable_auto_replay: default_enable_auto_replay(),
            auto_replay_interval_secs: default_auto_replay_interval_secs(),
            auto_replay_batch_size: default_auto_replay_batch_size(),
            mock_agents_url: default_mock_agents_url(),
            log_level: default_log_level(),
            db_pool_size: default_db_pool_size(),
            db_pool_overflow: default_db_pool_overflow(),
            rate_limit_per_second: default_rate_limit_per_second(),
        };
        assert_eq!(config.db_pool_max_connections(), 50);
    }
}
