// region:    --- Imports
use std::{env, fmt::Display, str::FromStr, time::Duration};
use thiserror::Error;
use tracing::{info, warn};

// endregion: --- Imports

// region:    --- Config Error
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("환경 변수 {0} 가 설정되지 않았습니다.")]
    Missing(&'static str),

    #[error("환경 변수 {key} 값이 잘못되었습니다: {reason}")]
    Invalid { key: &'static str, reason: String },
}
// endregion: --- Config Error

// region:    --- Config
/// 서비스 설정 (환경 변수 기반)
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub database_max_connections: u32,
    pub init_database: bool,
    pub kafka_brokers: String,
    pub kafka_topic: String,
    pub kafka_group_id: String,
    pub admin_token: String,
    pub checkout_base_url: String,
    pub tick: Duration,
    pub bid_extension_secs: i64,
}

impl Config {
    /// 환경 변수에서 설정 로드
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            port: try_load("PORT", "3000")?,
            database_url: required("DATABASE_URL")?,
            database_max_connections: try_load("DATABASE_MAX_CONNECTIONS", "5")?,
            init_database: try_load("INIT_DATABASE", "false")?,
            kafka_brokers: try_load("KAFKA_BROKERS", "localhost:9092")?,
            kafka_topic: try_load("KAFKA_TOPIC", "auction-events")?,
            kafka_group_id: try_load("KAFKA_GROUP_ID", "auction-projector")?,
            admin_token: required("ADMIN_TOKEN")?,
            checkout_base_url: try_load("CHECKOUT_BASE_URL", "http://localhost:5173/checkout")?,
            tick: Duration::from_millis(try_load("TICK_MILLIS", "1000")?),
            bid_extension_secs: try_load("BID_EXTENSION_SECS", "0")?,
        })
    }
}
// endregion: --- Config

// region:    --- Helpers
fn required(key: &'static str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| {
        warn!("{:<12} --> {key} 가 설정되지 않았습니다.", "Config");
        ConfigError::Missing(key)
    })
}

fn try_load<T: FromStr>(key: &'static str, default: &str) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    let raw = env::var(key).unwrap_or_else(|_| {
        info!("{:<12} --> {key} 미설정, 기본값 사용: {default}", "Config");
        default.to_string()
    });
    parse_value(key, &raw)
}

fn parse_value<T: FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        reason: e.to_string(),
    })
}
// endregion: --- Helpers
