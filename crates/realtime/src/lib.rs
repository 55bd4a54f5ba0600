//! SalesFlow Realtime - Supabase Realtime change stream.
//!
//! This crate implements `salesflow_core::ChangeStream` over the Supabase
//! Realtime WebSocket (Phoenix channel protocol). One socket is shared by
//! every subscription of a client; each subscription joins its own channel.
//!
//! # Usage
//!
//! ```rust,ignore
//! use salesflow_realtime::{RealtimeClient, RealtimeConfig};
//!
//! let config = RealtimeConfig::new("https://project.supabase.co", "anon-key")?;
//! let client = Arc::new(RealtimeClient::new(config));
//! let hook = leads_hook(None).mount(client.as_ref(), cache, DebounceConfig::default());
//! ```

mod client;
mod config;
mod connection;
mod error;
pub mod protocol;

pub use client::RealtimeClient;
pub use config::RealtimeConfig;
pub use error::{RealtimeError, Result};
