//! Socket task: owns the WebSocket, joins one channel per subscription and
//! routes incoming changes to the registry.
//!
//! The task runs until the client's command sender is dropped. A lost socket
//! is reconnected with backoff and every live channel is joined again.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::{Sink, SinkExt, StreamExt};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{interval_at, sleep_until, Instant, MissedTickBehavior};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{self, protocol::Message};

use salesflow_core::stream::{SubscriptionId, SubscriptionRegistry};
use salesflow_core::SubscriptionSpec;

use crate::config::RealtimeConfig;
use crate::error::{RealtimeError, Result};
use crate::protocol::{
    self, channel_topic, heartbeat_message, join_message, leave_message, Inbound,
    PhoenixMessage, PHOENIX_TOPIC,
};

/// Requests from the client to the socket task.
#[derive(Debug)]
pub(crate) enum Command {
    Join {
        id: SubscriptionId,
        spec: Arc<SubscriptionSpec>,
    },
    Leave {
        id: SubscriptionId,
    },
}

struct Channel {
    topic: String,
    spec: Arc<SubscriptionSpec>,
}

/// Channels that should be joined on the current socket.
#[derive(Default)]
struct Channels {
    by_id: HashMap<SubscriptionId, Channel>,
    by_topic: HashMap<String, SubscriptionId>,
    /// Errored or closed by the server; joined again on the next heartbeat.
    needs_rejoin: HashSet<SubscriptionId>,
}

impl Channels {
    fn insert(&mut self, id: SubscriptionId, spec: Arc<SubscriptionSpec>) {
        let topic = channel_topic(&spec.channel, &id.to_string());
        self.by_topic.insert(topic.clone(), id);
        self.by_id.insert(id, Channel { topic, spec });
    }

    fn remove(&mut self, id: SubscriptionId) -> Option<Channel> {
        let channel = self.by_id.remove(&id)?;
        self.by_topic.remove(&channel.topic);
        self.needs_rejoin.remove(&id);
        Some(channel)
    }

    fn id_for(&self, topic: &str) -> Option<SubscriptionId> {
        self.by_topic.get(topic).copied()
    }
}

struct Connection {
    config: RealtimeConfig,
    registry: Arc<SubscriptionRegistry>,
    channels: Channels,
    next_ref: u64,
    pending_heartbeat: Option<String>,
    connected: bool,
}

/// Drives the socket until `commands` closes.
pub(crate) async fn run(
    config: RealtimeConfig,
    registry: Arc<SubscriptionRegistry>,
    mut commands: UnboundedReceiver<Command>,
) {
    let url = match config.websocket_url() {
        Ok(url) => url,
        Err(e) => {
            log::error!("Realtime disabled, cannot build socket URL: {}", e);
            return;
        }
    };

    let mut connection = Connection {
        config,
        registry,
        channels: Channels::default(),
        next_ref: 0,
        pending_heartbeat: None,
        connected: false,
    };

    let mut attempt = 0;
    loop {
        match connection.session(url.as_str(), &mut commands).await {
            Ok(()) => {
                log::debug!("Realtime connection task stopped");
                return;
            }
            Err(e) => {
                if connection.connected {
                    attempt = 0;
                }
                let delay = connection.config.backoff(attempt);
                attempt += 1;
                log::warn!(
                    "Realtime connection lost: {}. Reconnecting in {:?}",
                    e,
                    delay
                );
                if !connection
                    .wait_offline(Instant::now() + delay, &mut commands)
                    .await
                {
                    log::debug!("Realtime connection task stopped while offline");
                    return;
                }
            }
        }
    }
}

impl Connection {
    /// One socket lifetime. `Ok` means the client went away.
    async fn session(
        &mut self,
        url: &str,
        commands: &mut UnboundedReceiver<Command>,
    ) -> Result<()> {
        self.connected = false;
        self.pending_heartbeat = None;
        self.channels.needs_rejoin.clear();

        let (ws_stream, _) = connect_async(url).await?;
        self.connected = true;
        log::info!(
            "Realtime socket connected, joining {} channel(s)",
            self.channels.by_id.len()
        );

        let (mut sink, mut stream) = ws_stream.split();

        let ids: Vec<SubscriptionId> = self.channels.by_id.keys().copied().collect();
        for id in ids {
            if let Some(frame) = self.join_frame(id) {
                send(&mut sink, &frame).await?;
            }
        }

        let interval = self.config.heartbeat_interval;
        let mut heartbeat = interval_at(Instant::now() + interval, interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Join { id, spec }) => {
                        self.channels.insert(id, spec);
                        if let Some(frame) = self.join_frame(id) {
                            send(&mut sink, &frame).await?;
                        }
                    }
                    Some(Command::Leave { id }) => {
                        if let Some(channel) = self.channels.remove(id) {
                            let frame = leave_message(&channel.topic, self.make_ref());
                            send(&mut sink, &frame).await?;
                        }
                    }
                    None => {
                        let _ = sink.close().await;
                        return Ok(());
                    }
                },
                frame = stream.next() => match frame {
                    Some(Ok(Message::Text(text))) => self.handle_text(text.as_str()),
                    Some(Ok(Message::Close(_))) | None => return Err(RealtimeError::Closed),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e.into()),
                },
                _ = heartbeat.tick() => {
                    if self.pending_heartbeat.is_some() {
                        return Err(RealtimeError::HeartbeatTimeout(interval));
                    }
                    let msg_ref = self.make_ref();
                    send(&mut sink, &heartbeat_message(msg_ref.clone())).await?;
                    self.pending_heartbeat = Some(msg_ref);

                    let rejoin: Vec<SubscriptionId> = self.channels.needs_rejoin.drain().collect();
                    for id in rejoin {
                        if let Some(frame) = self.join_frame(id) {
                            send(&mut sink, &frame).await?;
                        }
                    }
                }
            }
        }
    }

    /// Sleeps until `deadline` while keeping the channel set current.
    /// Returns false if the client went away.
    async fn wait_offline(
        &mut self,
        deadline: Instant,
        commands: &mut UnboundedReceiver<Command>,
    ) -> bool {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Join { id, spec }) => self.channels.insert(id, spec),
                    Some(Command::Leave { id }) => {
                        self.channels.remove(id);
                    }
                    None => return false,
                },
                _ = sleep_until(deadline) => return true,
            }
        }
    }

    fn handle_text(&mut self, text: &str) {
        let inbound = match protocol::decode(text) {
            Ok(inbound) => inbound,
            Err(e) => {
                log::warn!("Ignoring realtime frame: {}", e);
                return;
            }
        };

        match inbound {
            Inbound::Change { topic, event } => match self.channels.id_for(&topic) {
                Some(id) => {
                    if !self.registry.deliver_to(id, &event) {
                        log::trace!("{} on {} not delivered on {}", event.kind, event.table, topic);
                    }
                }
                None => log::trace!("Change on unknown topic {}", topic),
            },
            Inbound::Reply {
                topic,
                msg_ref,
                ok,
                response,
            } => {
                if topic == PHOENIX_TOPIC {
                    if msg_ref.is_some() && msg_ref == self.pending_heartbeat {
                        self.pending_heartbeat = None;
                    }
                } else if ok {
                    log::debug!("Channel {} acknowledged", topic);
                } else {
                    log::warn!("Channel {} rejected: {}", topic, response);
                }
            }
            Inbound::ChannelError { topic } | Inbound::ChannelClosed { topic } => {
                if let Some(id) = self.channels.id_for(&topic) {
                    log::warn!("Channel {} dropped by server, rejoining", topic);
                    self.channels.needs_rejoin.insert(id);
                }
            }
            Inbound::System { topic, ok, message } => {
                if ok {
                    log::debug!("{}: {}", topic, message);
                } else {
                    log::warn!("{}: {}", topic, message);
                }
            }
            Inbound::Other { topic, event } => log::trace!("Ignoring {} on {}", event, topic),
        }
    }

    fn join_frame(&mut self, id: SubscriptionId) -> Option<PhoenixMessage> {
        let msg_ref = self.make_ref();
        let channel = self.channels.by_id.get(&id)?;
        Some(join_message(
            &channel.topic,
            &channel.spec,
            self.config.access_token.as_deref(),
            msg_ref,
        ))
    }

    fn make_ref(&mut self) -> String {
        self.next_ref += 1;
        self.next_ref.to_string()
    }
}

async fn send<S>(sink: &mut S, message: &PhoenixMessage) -> Result<()>
where
    S: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    let json = serde_json::to_string(message)?;
    sink.send(Message::Text(json.into())).await?;
    Ok(())
}
