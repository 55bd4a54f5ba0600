use std::{convert::Infallible, sync::Arc, time::Duration};

use axum::{
    extract::{Path, Query, State},
    http::HeaderValue,
    response::sse::{Event as SseEvent, KeepAlive, Sse},
    routing::get,
    Json, Router,
};
use futures::Stream;
use salesflow_core::{CacheKey, HookSummary};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::{
    config::Config,
    error::{ApiError, ApiResult},
    events::CACHE_RESYNC,
    main_lib::AppState,
};

pub async fn healthz() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn list_hooks(State(state): State<Arc<AppState>>) -> Json<Vec<HookSummary>> {
    Json(state.hooks.iter().map(|hook| hook.summary()).collect())
}

async fn get_hook(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<Json<HookSummary>> {
    state
        .hooks
        .iter()
        .find(|hook| hook.name() == name)
        .map(|hook| Json(hook.summary()))
        .ok_or_else(|| ApiError::NotFound(format!("No hook named '{}'", name)))
}

#[derive(Debug, Default, Deserialize)]
struct StreamQuery {
    /// Only forward batches related to this key, e.g. `leads/team-7`.
    scope: Option<String>,
}

/// True if any key in the batch covers `scope` or is covered by it.
/// Payloads that are not key lists always pass.
fn touches_scope(payload: &Value, scope: &CacheKey) -> bool {
    match Vec::<CacheKey>::deserialize(payload) {
        Ok(keys) => keys
            .iter()
            .any(|key| key.covers(scope) || scope.covers(key)),
        Err(_) => true,
    }
}

async fn stream_events(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StreamQuery>,
) -> ApiResult<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>> {
    let scope = query
        .scope
        .as_deref()
        .map(str::parse::<CacheKey>)
        .transpose()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let receiver = BroadcastStream::new(state.event_bus.subscribe());
    let stream = tokio_stream::StreamExt::filter_map(receiver, move |event| match event {
        Ok(evt) => {
            if let Some(scope) = &scope {
                if !touches_scope(&evt.payload, scope) {
                    return None;
                }
            }
            match SseEvent::default().event(evt.name).json_data(&evt.payload) {
                Ok(sse_event) => Some(Ok(sse_event)),
                Err(err) => {
                    tracing::error!("Failed to serialize SSE payload for {}: {}", evt.name, err);
                    None
                }
            }
        }
        Err(BroadcastStreamRecvError::Lagged(skipped)) => {
            tracing::warn!(skipped, "SSE client lagged behind the event bus");
            Some(Ok(SseEvent::default().event(CACHE_RESYNC).data("null")))
        }
    });

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    ))
}

pub fn app_router(state: Arc<AppState>, config: &Config) -> Router {
    let cors = if config.cors_allow.iter().any(|o| o == "*") {
        CorsLayer::new().allow_origin(Any)
    } else {
        let origins = config
            .cors_allow
            .iter()
            .filter_map(|o| match o.parse::<HeaderValue>() {
                Ok(origin) => Some(origin),
                Err(_) => {
                    tracing::warn!("Ignoring invalid CORS origin '{}'", o);
                    None
                }
            })
            .collect::<Vec<_>>();
        CorsLayer::new().allow_origin(origins)
    };

    let api = Router::new()
        .route("/healthz", get(healthz))
        .route("/hooks", get(list_hooks))
        .route("/hooks/{name}", get(get_hook))
        .route("/events/stream", get(stream_events));

    Router::new()
        .nest("/api/v1", api)
        .layer(cors)
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .with_state(state)
}
