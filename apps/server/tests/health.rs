use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::Request,
};
use salesflow_core::stream::InMemoryChangeStream;
use salesflow_server::{api::app_router, build_state_with_stream, config::Config};
use tower::ServiceExt;

fn test_config() -> Config {
    Config::from_lookup(|key| match key {
        "SUPABASE_URL" => Some("http://127.0.0.1:54321".to_string()),
        "SUPABASE_ANON_KEY" => Some("anon".to_string()),
        _ => None,
    })
    .unwrap()
}

#[tokio::test]
async fn healthz_works() {
    let config = test_config();
    let state = build_state_with_stream(&config, Arc::new(InMemoryChangeStream::new()));
    let app = app_router(state, &config);

    let response = app
        .oneshot(Request::builder().uri("/api/v1/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert!(response.headers().contains_key("x-request-id"));

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "ok");
}
