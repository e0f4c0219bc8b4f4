// region:    --- Imports
use crate::coding::ranking::TieBreak;
use crate::engine::EngineSettings;
use crate::judge::RetryPolicy;
use anyhow::{anyhow, Context, Result};
use std::env;
use std::time::Duration;
// endregion: --- Imports

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub database_url: Option<String>,
    pub database_max_connections: u32,

    pub judge_url: String,
    pub judge_timeout_ms: u64,
    pub judge_max_retries: u32,
    pub judge_backoff_ms: u64,

    pub live_round_secs: u64,
    pub live_coding_secs: u64,
    pub timer_tick_ms: u64,
    pub scheduler_tick_ms: u64,
    pub top_performers: usize,
    pub tie_break: TieBreak,
    pub initial_wallet: i64,

    pub admin_token: String,
    pub confirm_ttl_secs: u64,
    pub log_format: LogFormat,

    pub kafka_brokers: Option<String>,
    pub kafka_topic: String,
}

impl AppConfig {
    /// .env 와 환경 변수에서 설정을 읽는다.
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let judge_url = env_str("JUDGE_URL", None).context("JUDGE_URL must be set")?;
        let admin_token = env_str("ADMIN_TOKEN", None).context("ADMIN_TOKEN must be set")?;
        let tie_break = env_str("TIE_BREAK", Some("user-id".to_string()))
            .unwrap_or_default()
            .parse::<TieBreak>()
            .map_err(|e| anyhow!(e))?;
        let log_format = match env_str("LOG_FORMAT", None)
            .unwrap_or_default()
            .to_lowercase()
            .as_str()
        {
            "json" => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        let config = Self {
            bind_addr: env_str("BIND_ADDR", Some("0.0.0.0:3000".to_string())).unwrap_or_default(),
            database_url: env_str("DATABASE_URL", None).filter(|url| !url.is_empty()),
            database_max_connections: env_u32("DATABASE_MAX_CONNECTIONS", Some(10)).unwrap_or(10),
            judge_url,
            judge_timeout_ms: env_u64("JUDGE_TIMEOUT_MS", Some(10_000)).unwrap_or(10_000),
            judge_max_retries: env_u32("JUDGE_MAX_RETRIES", Some(3)).unwrap_or(3),
            judge_backoff_ms: env_u64("JUDGE_BACKOFF_MS", Some(200)).unwrap_or(200),
            live_round_secs: env_u64("LIVE_ROUND_SECS", Some(60)).unwrap_or(60),
            live_coding_secs: env_u64("LIVE_CODING_SECS", Some(900)).unwrap_or(900),
            timer_tick_ms: env_u64("TIMER_TICK_MS", Some(1000)).unwrap_or(1000),
            scheduler_tick_ms: env_u64("SCHEDULER_TICK_MS", Some(1000)).unwrap_or(1000),
            top_performers: env_usize("TOP_PERFORMERS", Some(3)).unwrap_or(3),
            tie_break,
            initial_wallet: env_i64("INITIAL_WALLET", Some(200)).unwrap_or(200),
            admin_token,
            confirm_ttl_secs: env_u64("CONFIRM_TTL_SECS", Some(120)).unwrap_or(120),
            log_format,
            kafka_brokers: env_str("KAFKA_BROKERS", None),
            kafka_topic: env_str("KAFKA_TOPIC", Some("auction-events".to_string()))
                .unwrap_or_default(),
        };

        if config.live_round_secs == 0 || config.live_coding_secs == 0 {
            return Err(anyhow!("LIVE_ROUND_SECS and LIVE_CODING_SECS must be positive"));
        }
        if config.initial_wallet < 0 {
            return Err(anyhow!("INITIAL_WALLET must not be negative"));
        }
        Ok(config)
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            live_round: Duration::from_secs(self.live_round_secs),
            live_coding: Duration::from_secs(self.live_coding_secs),
            timer_tick: Duration::from_millis(self.timer_tick_ms),
            top_performers: self.top_performers,
            judge_retry: RetryPolicy {
                max_retries: self.judge_max_retries,
                base_backoff: Duration::from_millis(self.judge_backoff_ms),
                attempt_timeout: Duration::from_millis(self.judge_timeout_ms),
            },
        }
    }
}

fn env_str(key: &str, default: Option<String>) -> Option<String> {
    env::var(key).ok().or(default)
}

fn env_u32(key: &str, default: Option<u32>) -> Option<u32> {
    env::var(key).ok().and_then(|v| v.parse().ok()).or(default)
}

fn env_u64(key: &str, default: Option<u64>) -> Option<u64> {
    env::var(key).ok().and_then(|v| v.parse().ok()).or(default)
}

fn env_i64(key: &str, default: Option<i64>) -> Option<i64> {
    env::var(key).ok().and_then(|v| v.parse().ok()).or(default)
}

fn env_usize(key: &str, default: Option<usize>) -> Option<usize> {
    env::var(key).ok().and_then(|v| v.parse().ok()).or(default)
}
