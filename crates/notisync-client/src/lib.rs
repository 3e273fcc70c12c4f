//! # notisync-client
//!
//! Network bindings for the notisync collaborator traits.
//!
//! This crate provides:
//! - [`HttpRemoteSource`]: the REST notification service as a [`RemoteSource`]
//! - [`WebSocketSignalChannel`]: the per-user push channel as a [`SignalChannel`]
//! - [`ClientConfig`]: endpoint and timeout configuration shared by both
//!
//! # Example
//!
//! ```rust,no_run
//! use notisync_client::{ClientConfig, HttpRemoteSource};
//! use notisync_core::RemoteSource;
//!
//! #[tokio::main]
//! async fn main() -> notisync_core::Result<()> {
//!     let remote = HttpRemoteSource::new(ClientConfig::from_env())?;
//!     let unread = remote.fetch_unread_count().await?;
//!     println!("{unread} unread");
//!     Ok(())
//! }
//! ```
//!
//! [`RemoteSource`]: notisync_core::RemoteSource
//! [`SignalChannel`]: notisync_core::SignalChannel

pub mod config;
pub mod http;
pub mod websocket;

pub use config::ClientConfig;
pub use http::HttpRemoteSource;
pub use websocket::{parse_signal_frame, WebSocketSignalChannel};
