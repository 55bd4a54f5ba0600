//! Phoenix channel frames as spoken by Supabase Realtime.
//!
//! Every frame is a JSON object `{topic, event, payload, ref, join_ref}`.
//! Row changes arrive as `postgres_changes` events on the channel topic.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use salesflow_core::{ChangeEvent, ChangeKind, SubscriptionSpec};

use crate::error::{RealtimeError, Result};

pub const PHOENIX_TOPIC: &str = "phoenix";

pub const PHX_JOIN: &str = "phx_join";
pub const PHX_LEAVE: &str = "phx_leave";
pub const PHX_REPLY: &str = "phx_reply";
pub const PHX_ERROR: &str = "phx_error";
pub const PHX_CLOSE: &str = "phx_close";
pub const HEARTBEAT: &str = "heartbeat";
pub const POSTGRES_CHANGES: &str = "postgres_changes";
pub const SYSTEM: &str = "system";

/// Raw channel frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PhoenixMessage {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub msg_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_ref: Option<String>,
}

/// Channel topic for a subscription; unique per subscription.
pub fn channel_topic(channel: &str, subscription_id: &str) -> String {
    format!("realtime:{}:{}", channel, subscription_id)
}

/// `phx_join` registering one `postgres_changes` binding.
pub fn join_message(
    topic: &str,
    spec: &SubscriptionSpec,
    access_token: Option<&str>,
    msg_ref: String,
) -> PhoenixMessage {
    let mut binding = json!({
        "event": spec.filter.event_name(),
        "schema": spec.schema,
        "table": spec.table,
    });
    if let Some(row) = &spec.filter.row {
        binding["filter"] = Value::String(row.to_string());
    }

    let mut payload = json!({
        "config": {
            "broadcast": { "ack": false, "self": false },
            "presence": { "key": "" },
            "postgres_changes": [binding],
            "private": false,
        },
    });
    if let Some(token) = access_token {
        payload["access_token"] = Value::String(token.to_string());
    }

    PhoenixMessage {
        topic: topic.to_string(),
        event: PHX_JOIN.to_string(),
        payload,
        join_ref: Some(msg_ref.clone()),
        msg_ref: Some(msg_ref),
    }
}

pub fn leave_message(topic: &str, msg_ref: String) -> PhoenixMessage {
    PhoenixMessage {
        topic: topic.to_string(),
        event: PHX_LEAVE.to_string(),
        payload: json!({}),
        msg_ref: Some(msg_ref),
        join_ref: None,
    }
}

pub fn heartbeat_message(msg_ref: String) -> PhoenixMessage {
    PhoenixMessage {
        topic: PHOENIX_TOPIC.to_string(),
        event: HEARTBEAT.to_string(),
        payload: json!({}),
        msg_ref: Some(msg_ref),
        join_ref: None,
    }
}

/// `payload.data` of a `postgres_changes` frame.
#[derive(Debug, Deserialize)]
struct PostgresChangeData {
    schema: String,
    table: String,
    #[serde(rename = "type")]
    kind: ChangeKind,
    #[serde(default)]
    record: Option<Value>,
    #[serde(default)]
    old_record: Option<Value>,
    #[serde(default)]
    commit_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    errors: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct PostgresChangesPayload {
    data: PostgresChangeData,
}

/// Frames the connection task acts on.
#[derive(Debug, PartialEq)]
pub enum Inbound {
    Change {
        topic: String,
        event: ChangeEvent,
    },
    Reply {
        topic: String,
        msg_ref: Option<String>,
        ok: bool,
        response: Value,
    },
    ChannelError {
        topic: String,
    },
    ChannelClosed {
        topic: String,
    },
    System {
        topic: String,
        ok: bool,
        message: String,
    },
    Other {
        topic: String,
        event: String,
    },
}

/// Decodes one text frame.
pub fn decode(text: &str) -> Result<Inbound> {
    let message: PhoenixMessage = serde_json::from_str(text)?;
    let PhoenixMessage {
        topic,
        event,
        payload,
        msg_ref,
        ..
    } = message;

    let inbound = match event.as_str() {
        POSTGRES_CHANGES => Inbound::Change {
            event: change_event(payload)?,
            topic,
        },
        PHX_REPLY => Inbound::Reply {
            ok: payload.get("status").and_then(Value::as_str) == Some("ok"),
            response: payload.get("response").cloned().unwrap_or(Value::Null),
            msg_ref,
            topic,
        },
        PHX_ERROR => Inbound::ChannelError { topic },
        PHX_CLOSE => Inbound::ChannelClosed { topic },
        SYSTEM => Inbound::System {
            ok: payload.get("status").and_then(Value::as_str) == Some("ok"),
            message: payload
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            topic,
        },
        _ => Inbound::Other { topic, event },
    };
    Ok(inbound)
}

fn change_event(payload: Value) -> Result<ChangeEvent> {
    let PostgresChangesPayload { data } = serde_json::from_value(payload)
        .map_err(|e| RealtimeError::protocol(format!("bad postgres_changes payload: {}", e)))?;

    if let Some(errors) = data.errors.as_ref().filter(|e| !e.is_null()) {
        // Usually row-level security hiding the record; the change still happened.
        log::debug!(
            "Change on {}.{} reported errors: {}",
            data.schema,
            data.table,
            errors
        );
    }

    Ok(ChangeEvent {
        kind: data.kind,
        schema: data.schema,
        table: data.table,
        new: non_empty(data.record),
        old: non_empty(data.old_record),
        commit_timestamp: data.commit_timestamp,
    })
}

/// The server sends `{}` for the side of a change that does not exist.
fn non_empty(row: Option<Value>) -> Option<Value> {
    row.filter(|value| match value {
        Value::Object(map) => !map.is_empty(),
        Value::Null => false,
        _ => true,
    })
}
