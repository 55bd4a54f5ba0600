use std::sync::{Arc, Mutex, MutexGuard};

use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, UnboundedSender};

use salesflow_core::stream::{
    ChangeCallback, ReleaseSubscription, SubscriptionId, SubscriptionRegistry,
};
use salesflow_core::{ChangeStream, SubscriptionHandle, SubscriptionSpec};

use crate::config::RealtimeConfig;
use crate::connection::{self, Command};

/// Change stream backed by one Supabase Realtime socket.
///
/// The socket task is spawned on the current Tokio runtime by the first
/// `subscribe()` and lives until the client and all of its handles are
/// dropped.
#[derive(Clone)]
pub struct RealtimeClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    config: RealtimeConfig,
    registry: Arc<SubscriptionRegistry>,
    commands: Mutex<Option<UnboundedSender<Command>>>,
}

impl RealtimeClient {
    pub fn new(config: RealtimeConfig) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                config,
                registry: Arc::new(SubscriptionRegistry::new()),
                commands: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &RealtimeConfig {
        &self.inner.config
    }

    /// Number of live subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.inner.registry.len()
    }
}

impl ChangeStream for RealtimeClient {
    fn subscribe(&self, spec: SubscriptionSpec, on_event: ChangeCallback) -> SubscriptionHandle {
        let (id, spec, slot) = self.inner.registry.register(spec, on_event);
        log::debug!(
            "Subscribing {} to {}.{} ({})",
            id,
            spec.schema,
            spec.table,
            spec.filter.event_name()
        );
        self.inner.join(id, spec.clone());
        SubscriptionHandle::new(id, spec, slot, self.inner.clone())
    }
}

impl ClientInner {
    fn join(&self, id: SubscriptionId, spec: Arc<SubscriptionSpec>) {
        let mut commands = self.lock_commands();
        if commands.is_none() {
            match Handle::try_current() {
                Ok(runtime) => {
                    let (tx, rx) = mpsc::unbounded_channel();
                    runtime.spawn(connection::run(
                        self.config.clone(),
                        self.registry.clone(),
                        rx,
                    ));
                    // Also picks up subscriptions made while no runtime was running.
                    for (pending, spec) in self.registry.specs() {
                        let _ = tx.send(Command::Join { id: pending, spec });
                    }
                    *commands = Some(tx);
                    return;
                }
                Err(e) => {
                    log::warn!(
                        "Realtime subscription {} waits for a runtime to join: {}",
                        id,
                        e
                    );
                    return;
                }
            }
        }

        if let Some(tx) = commands.as_ref() {
            if tx.send(Command::Join { id, spec }).is_err() {
                log::debug!("Realtime connection task is gone; {} not joined", id);
            }
        }
    }

    fn lock_commands(&self) -> MutexGuard<'_, Option<UnboundedSender<Command>>> {
        self.commands
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ReleaseSubscription for ClientInner {
    fn release(&self, id: SubscriptionId) {
        if self.registry.remove(id).is_none() {
            return;
        }
        if let Some(tx) = self.lock_commands().as_ref() {
            let _ = tx.send(Command::Leave { id });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use salesflow_core::ChangeEvent;

    fn client() -> RealtimeClient {
        RealtimeClient::new(RealtimeConfig::new("http://127.0.0.1:9", "k").unwrap())
    }

    #[test]
    fn test_subscribe_without_runtime_registers_but_stays_offline() {
        let client = client();
        let handle = client.subscribe(
            SubscriptionSpec::new("leads-changes", "leads"),
            Arc::new(|_event: &ChangeEvent| {}),
        );

        assert_eq!(client.subscription_count(), 1);
        assert!(client.inner.lock_commands().is_none());

        handle.unsubscribe();
        assert_eq!(client.subscription_count(), 0);
        assert!(!handle.is_active());
    }

    #[tokio::test]
    async fn test_dropping_handle_releases_subscription() {
        let client = client();
        let handle = client.subscribe(
            SubscriptionSpec::new("leads-changes", "leads"),
            Arc::new(|_event: &ChangeEvent| {}),
        );
        assert!(client.inner.lock_commands().is_some());

        drop(handle);
        assert_eq!(client.subscription_count(), 0);
    }
}
