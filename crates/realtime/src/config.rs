//! Realtime connection settings.

use std::time::Duration;

use url::Url;

use crate::error::{RealtimeError, Result};

/// Protocol version requested from the server.
const PROTOCOL_VERSION: &str = "1.0.0";

/// Path of the realtime socket under the project URL.
const SOCKET_PATH: &str = "/realtime/v1/websocket";

/// Heartbeat cadence; one unanswered heartbeat marks the socket dead.
const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Reconnect delays by attempt; the last entry repeats.
const DEFAULT_RECONNECT_BACKOFF: [Duration; 4] = [
    Duration::from_secs(1),
    Duration::from_secs(2),
    Duration::from_secs(5),
    Duration::from_secs(10),
];

/// Connection settings for a Supabase project.
#[derive(Clone, Debug)]
pub struct RealtimeConfig {
    project_url: Url,
    api_key: String,
    /// User JWT; without it channels join as the anonymous role.
    pub access_token: Option<String>,
    pub heartbeat_interval: Duration,
    pub reconnect_backoff: Vec<Duration>,
}

impl RealtimeConfig {
    /// # Arguments
    ///
    /// * `project_url` - e.g. "https://abcd.supabase.co"
    /// * `api_key` - the project's public (anon) key
    pub fn new(project_url: &str, api_key: impl Into<String>) -> Result<Self> {
        let project_url = Url::parse(project_url.trim())?;
        match project_url.scheme() {
            "http" | "https" | "ws" | "wss" => {}
            other => {
                return Err(RealtimeError::UnsupportedUrl(format!(
                    "scheme '{}' in {}",
                    other, project_url
                )))
            }
        }

        Ok(Self {
            project_url,
            api_key: api_key.into(),
            access_token: None,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            reconnect_backoff: DEFAULT_RECONNECT_BACKOFF.to_vec(),
        })
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    pub fn with_reconnect_backoff(mut self, backoff: Vec<Duration>) -> Self {
        self.reconnect_backoff = backoff;
        self
    }

    pub fn project_url(&self) -> &Url {
        &self.project_url
    }

    /// Socket URL: `ws(s)://<host>/realtime/v1/websocket?apikey=..&vsn=1.0.0`.
    pub fn websocket_url(&self) -> Result<Url> {
        let mut url = self.project_url.clone();
        let scheme = match url.scheme() {
            "https" | "wss" => "wss",
            _ => "ws",
        };
        url.set_scheme(scheme)
            .map_err(|_| RealtimeError::UnsupportedUrl(self.project_url.to_string()))?;

        let base_path = url.path().trim_end_matches('/').to_string();
        url.set_path(&format!("{}{}", base_path, SOCKET_PATH));
        url.query_pairs_mut()
            .clear()
            .append_pair("apikey", &self.api_key)
            .append_pair("vsn", PROTOCOL_VERSION);
        Ok(url)
    }

    /// Delay before reconnect attempt `attempt` (zero-based).
    pub fn backoff(&self, attempt: usize) -> Duration {
        self.reconnect_backoff
            .get(attempt)
            .or_else(|| self.reconnect_backoff.last())
            .copied()
            .unwrap_or(Duration::from_secs(1))
    }
}
