use std::sync::Arc;

use salesflow_core::hooks::{gamification_hook, leads_hook};
use salesflow_core::{ChangeStream, MountedHook, QueryCache};
use salesflow_realtime::{RealtimeClient, RealtimeConfig};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::{
    cache_bridge::EventBusQueryCache,
    config::{Config, LogFormat},
    events::EventBus,
};

pub struct AppState {
    pub event_bus: EventBus,
    /// Hooks stay mounted for the lifetime of the server.
    pub hooks: Vec<MountedHook>,
}

pub fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_filter).unwrap_or_else(|e| {
        eprintln!("Invalid log filter '{}' ({}), using info", config.log_filter, e);
        EnvFilter::new("info")
    });
    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_current_span(false))
            .init(),
        LogFormat::Text => registry
            .with(fmt::layer().with_target(true).with_line_number(true))
            .init(),
    }
}

/// Connects to Supabase Realtime and mounts every hook against it.
pub async fn build_state(config: &Config) -> anyhow::Result<Arc<AppState>> {
    let mut realtime =
        RealtimeConfig::new(&config.supabase_url, config.supabase_anon_key.clone())?;
    if let Some(token) = &config.supabase_access_token {
        realtime = realtime.with_access_token(token.clone());
    }
    tracing::info!("Realtime project: {}", realtime.project_url());

    let stream: Arc<dyn ChangeStream> = Arc::new(RealtimeClient::new(realtime));
    Ok(build_state_with_stream(config, stream))
}

/// Mounts every hook against `stream`. Must run inside a Tokio runtime.
pub fn build_state_with_stream(config: &Config, stream: Arc<dyn ChangeStream>) -> Arc<AppState> {
    let event_bus = EventBus::new(config.event_bus_capacity);
    let cache: Arc<dyn QueryCache> = Arc::new(EventBusQueryCache::new(event_bus.clone()));

    let hooks = vec![
        leads_hook(None).mount(stream.as_ref(), cache.clone(), config.debounce),
        gamification_hook(None, config.gamification_filter.clone()).mount(
            stream.as_ref(),
            cache,
            config.debounce,
        ),
    ];
    for hook in &hooks {
        let summary = hook.summary();
        tracing::info!(
            hook = %summary.name,
            tables = ?summary.tables,
            "Mounted realtime hook"
        );
    }

    Arc::new(AppState { event_bus, hooks })
}
