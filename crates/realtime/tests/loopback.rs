//! Runs the client against a local WebSocket server speaking the channel
//! protocol.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, accept_hdr_async, WebSocketStream};

use salesflow_core::{ChangeEvent, ChangeKind, ChangeStream, SubscriptionSpec};
use salesflow_realtime::{RealtimeClient, RealtimeConfig};

const WAIT: Duration = Duration::from_secs(5);

async fn next_json(ws: &mut WebSocketStream<TcpStream>) -> Value {
    loop {
        let frame = timeout(WAIT, ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("socket closed")
            .expect("socket error");
        if let Message::Text(text) = frame {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

async fn send_json(ws: &mut WebSocketStream<TcpStream>, value: Value) {
    ws.send(Message::Text(value.to_string().into())).await.unwrap();
}

fn forwarding_callback() -> (
    Arc<dyn Fn(&ChangeEvent) + Send + Sync>,
    mpsc::UnboundedReceiver<ChangeEvent>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let callback: Arc<dyn Fn(&ChangeEvent) + Send + Sync> = Arc::new(move |event: &ChangeEvent| {
        let _ = tx.send(event.clone());
    });
    (callback, rx)
}

#[tokio::test]
async fn joins_delivers_and_leaves() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let config = RealtimeConfig::new(&format!("http://{}", addr), "anon-key")
        .unwrap()
        .with_access_token("user-jwt");
    let client = RealtimeClient::new(config);

    let (callback, mut events) = forwarding_callback();
    let handle = client.subscribe(SubscriptionSpec::new("leads-changes", "leads"), callback);

    let (socket, _) = listener.accept().await.unwrap();
    let request_uri = Arc::new(Mutex::new(String::new()));
    let captured = request_uri.clone();
    let capture_uri = move |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        *captured.lock().unwrap() = request.uri().to_string();
        Ok(response)
    };
    let mut ws = accept_hdr_async(socket, capture_uri).await.unwrap();
    assert_eq!(
        request_uri.lock().unwrap().as_str(),
        "/realtime/v1/websocket?apikey=anon-key&vsn=1.0.0"
    );

    let join = next_json(&mut ws).await;
    assert_eq!(join["event"], "phx_join");
    assert_eq!(join["payload"]["access_token"], "user-jwt");
    assert_eq!(
        join["payload"]["config"]["postgres_changes"][0],
        json!({ "event": "*", "schema": "public", "table": "leads" })
    );
    let topic = join["topic"].as_str().unwrap().to_string();
    assert!(topic.starts_with("realtime:leads-changes:"));

    send_json(
        &mut ws,
        json!({
            "topic": topic,
            "event": "phx_reply",
            "ref": join["ref"],
            "payload": { "status": "ok", "response": { "postgres_changes": [] } }
        }),
    )
    .await;
    send_json(
        &mut ws,
        json!({
            "topic": topic,
            "event": "postgres_changes",
            "ref": null,
            "payload": {
                "ids": [1],
                "data": {
                    "type": "UPDATE",
                    "schema": "public",
                    "table": "leads",
                    "commit_timestamp": "2026-03-02T10:15:30Z",
                    "errors": null,
                    "record": { "id": 7, "status": "won" },
                    "old_record": { "id": 7 }
                }
            }
        }),
    )
    .await;

    let event = timeout(WAIT, events.recv()).await.unwrap().unwrap();
    assert_eq!(event.kind, ChangeKind::Update);
    assert_eq!(event.column("status"), Some(&json!("won")));

    handle.unsubscribe();
    let leave = next_json(&mut ws).await;
    assert_eq!(leave["event"], "phx_leave");
    assert_eq!(leave["topic"], topic.as_str());
    assert_eq!(client.subscription_count(), 0);
}

#[tokio::test]
async fn rejoins_after_socket_loss() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let config = RealtimeConfig::new(&format!("http://{}", addr), "anon-key")
        .unwrap()
        .with_reconnect_backoff(vec![Duration::from_millis(20)]);
    let client = RealtimeClient::new(config);

    let (callback, mut events) = forwarding_callback();
    let _handle = client.subscribe(
        SubscriptionSpec::new("gamification-events", "gamification_events"),
        callback,
    );

    let (socket, _) = listener.accept().await.unwrap();
    let mut ws = accept_async(socket).await.unwrap();
    let first_join = next_json(&mut ws).await;
    drop(ws);

    let (socket, _) = timeout(WAIT, listener.accept()).await.unwrap().unwrap();
    let mut ws = accept_async(socket).await.unwrap();
    let second_join = next_json(&mut ws).await;
    assert_eq!(second_join["event"], "phx_join");
    assert_eq!(second_join["topic"], first_join["topic"]);

    let topic = second_join["topic"].as_str().unwrap().to_string();
    send_json(
        &mut ws,
        json!({
            "topic": topic,
            "event": "postgres_changes",
            "payload": {
                "data": {
                    "type": "INSERT",
                    "schema": "public",
                    "table": "gamification_events",
                    "record": { "event_type": "sale_closed" },
                    "old_record": {}
                }
            }
        }),
    )
    .await;

    let event = timeout(WAIT, events.recv()).await.unwrap().unwrap();
    assert_eq!(event.kind, ChangeKind::Insert);
    assert!(event.old.is_none());
}

#[tokio::test]
async fn ignores_changes_for_other_topics() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let client = RealtimeClient::new(
        RealtimeConfig::new(&format!("http://{}", addr), "anon-key").unwrap(),
    );

    let (callback, mut events) = forwarding_callback();
    let _handle = client.subscribe(SubscriptionSpec::new("leads-changes", "leads"), callback);

    let (socket, _) = listener.accept().await.unwrap();
    let mut ws = accept_async(socket).await.unwrap();
    let join = next_json(&mut ws).await;
    let topic = join["topic"].as_str().unwrap().to_string();

    let change = |topic: &str, table: &str| {
        json!({
            "topic": topic,
            "event": "postgres_changes",
            "payload": {
                "data": {
                    "type": "DELETE",
                    "schema": "public",
                    "table": table,
                    "record": {},
                    "old_record": { "id": 3 }
                }
            }
        })
    };
    send_json(&mut ws, change("realtime:someone-else:1", "leads")).await;
    send_json(&mut ws, change(&topic, "tasks")).await;
    send_json(&mut ws, change(&topic, "leads")).await;

    let event = timeout(WAIT, events.recv()).await.unwrap().unwrap();
    assert_eq!(event.table, "leads");
    assert_eq!(event.kind, ChangeKind::Delete);
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn reconnects_when_heartbeat_goes_unanswered() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let config = RealtimeConfig::new(&format!("http://{}", addr), "anon-key")
        .unwrap()
        .with_heartbeat_interval(Duration::from_millis(100))
        .with_reconnect_backoff(vec![Duration::from_millis(20)]);
    let client = RealtimeClient::new(config);

    let (callback, _events) = forwarding_callback();
    let _handle = client.subscribe(SubscriptionSpec::new("leads-changes", "leads"), callback);

    let (socket, _) = listener.accept().await.unwrap();
    let mut silent = accept_async(socket).await.unwrap();
    let first_join = next_json(&mut silent).await;
    let heartbeat = next_json(&mut silent).await;
    assert_eq!(heartbeat["event"], "heartbeat");
    assert_eq!(heartbeat["topic"], "phoenix");

    // The first socket stays open but never replies.
    let (socket, _) = timeout(WAIT, listener.accept()).await.unwrap().unwrap();
    let mut ws = accept_async(socket).await.unwrap();
    let second_join = next_json(&mut ws).await;
    assert_eq!(second_join["event"], "phx_join");
    assert_eq!(second_join["topic"], first_join["topic"]);
    drop(silent);
}

#[tokio::test]
async fn rejoins_channel_after_server_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let config = RealtimeConfig::new(&format!("http://{}", addr), "anon-key")
        .unwrap()
        .with_heartbeat_interval(Duration::from_millis(200));
    let client = RealtimeClient::new(config);

    let (callback, _events) = forwarding_callback();
    let _handle = client.subscribe(SubscriptionSpec::new("leads-changes", "leads"), callback);

    let (socket, _) = listener.accept().await.unwrap();
    let mut ws = accept_async(socket).await.unwrap();
    let join = next_json(&mut ws).await;
    let topic = join["topic"].as_str().unwrap().to_string();

    send_json(
        &mut ws,
        json!({ "topic": topic, "event": "phx_error", "ref": join["ref"], "payload": {} }),
    )
    .await;

    let heartbeat = next_json(&mut ws).await;
    assert_eq!(heartbeat["event"], "heartbeat");
    assert_eq!(heartbeat["topic"], "phoenix");
    send_json(
        &mut ws,
        json!({
            "topic": "phoenix",
            "event": "phx_reply",
            "ref": heartbeat["ref"],
            "payload": { "status": "ok", "response": {} }
        }),
    )
    .await;

    let rejoin = next_json(&mut ws).await;
    assert_eq!(rejoin["event"], "phx_join");
    assert_eq!(rejoin["topic"], topic.as_str());
    assert_ne!(rejoin["ref"], join["ref"]);
}

#[tokio::test]
async fn joins_subscriptions_made_outside_a_runtime() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let client = RealtimeClient::new(
        RealtimeConfig::new(&format!("http://{}", addr), "anon-key").unwrap(),
    );

    let early_client = client.clone();
    let early = std::thread::spawn(move || {
        let (callback, _events) = forwarding_callback();
        early_client.subscribe(
            SubscriptionSpec::new("gamification-events", "gamification_events"),
            callback,
        )
    })
    .join()
    .unwrap();
    assert!(early.is_active());
    assert_eq!(client.subscription_count(), 1);

    let (callback, _events) = forwarding_callback();
    let _late = client.subscribe(SubscriptionSpec::new("leads-changes", "leads"), callback);

    let (socket, _) = timeout(WAIT, listener.accept()).await.unwrap().unwrap();
    let mut ws = accept_async(socket).await.unwrap();
    let mut topics = Vec::new();
    for _ in 0..2 {
        let join = next_json(&mut ws).await;
        assert_eq!(join["event"], "phx_join");
        topics.push(join["topic"].as_str().unwrap().to_string());
    }
    topics.sort();
    assert!(topics[0].starts_with("realtime:gamification-events:"));
    assert!(topics[1].starts_with("realtime:leads-changes:"));
}
