use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context};
use salesflow_core::{DebounceConfig, DebounceMode, RowFilter};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(anyhow!("Unknown log format '{}', expected text or json", other)),
        }
    }
}

pub struct Config {
    pub listen_addr: SocketAddr,
    pub log_format: LogFormat,
    /// `EnvFilter` directives, e.g. `info,salesflow_realtime=debug`.
    pub log_filter: String,
    pub cors_allow: Vec<String>,
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_access_token: Option<String>,
    pub debounce: DebounceConfig,
    pub event_bus_capacity: usize,
    /// Narrows the gamification hook, e.g. `event_type=eq.sale_closed`.
    pub gamification_filter: Option<RowFilter>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key/value source.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let listen_addr: SocketAddr = var("SF_LISTEN_ADDR")
            .unwrap_or_else(|| "0.0.0.0:8080".to_string())
            .parse()
            .context("Invalid SF_LISTEN_ADDR")?;
        let log_format: LogFormat = match var("SF_LOG_FORMAT") {
            Some(raw) => raw.parse().context("Invalid SF_LOG_FORMAT")?,
            None => LogFormat::default(),
        };
        let log_filter = var("RUST_LOG").unwrap_or_else(|| "info".to_string());
        let cors_allow = var("SF_CORS_ALLOW_ORIGINS")
            .unwrap_or_else(|| "*".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let supabase_url = var("SUPABASE_URL").ok_or_else(|| anyhow!("SUPABASE_URL is not set"))?;
        let supabase_anon_key =
            var("SUPABASE_ANON_KEY").ok_or_else(|| anyhow!("SUPABASE_ANON_KEY is not set"))?;
        let supabase_access_token = var("SUPABASE_ACCESS_TOKEN");

        let window_ms: u64 = match var("SF_DEBOUNCE_MS") {
            Some(raw) => raw.parse().context("Invalid SF_DEBOUNCE_MS")?,
            None => DebounceConfig::default().window.as_millis() as u64,
        };
        let mode: DebounceMode = match var("SF_DEBOUNCE_MODE") {
            Some(raw) => raw.parse()?,
            None => DebounceMode::default(),
        };

        let event_bus_capacity: usize = var("SF_EVENT_BUS_CAPACITY")
            .unwrap_or_else(|| "256".into())
            .parse()
            .context("Invalid SF_EVENT_BUS_CAPACITY")?;
        if event_bus_capacity == 0 {
            return Err(anyhow!("SF_EVENT_BUS_CAPACITY must be greater than zero"));
        }

        let gamification_filter = var("SF_GAMIFICATION_FILTER")
            .map(|raw| raw.parse::<RowFilter>())
            .transpose()
            .context("Invalid SF_GAMIFICATION_FILTER")?;

        Ok(Self {
            listen_addr,
            log_format,
            log_filter,
            cors_allow,
            supabase_url,
            supabase_anon_key,
            supabase_access_token,
            debounce: DebounceConfig {
                window: Duration::from_millis(window_ms),
                mode,
            },
            event_bus_capacity,
            gamification_filter,
        })
    }
}
