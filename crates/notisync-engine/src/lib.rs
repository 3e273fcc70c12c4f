//! # notisync-engine
//!
//! Keeps a local notification store consistent with a remote source, driven
//! by a push signal channel with a polling fallback.
//!
//! - [`Reconciler`]: resolves signals into store mutations, deduplicated
//! - [`OptimisticMutator`]: local-first user actions with rollback/refresh
//! - [`Poller`]: server-timestamp cursor polling
//! - [`SyncSession`]: wires the above, supervises the subscription, and
//!   exposes selectors and commands to a rendering layer
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use notisync_client::{ClientConfig, HttpRemoteSource, WebSocketSignalChannel};
//! use notisync_engine::{SyncConfig, SyncSession};
//!
//! #[tokio::main]
//! async fn main() -> notisync_core::Result<()> {
//!     let client = ClientConfig::from_env();
//!     let session = SyncSession::start(
//!         SyncConfig::for_subscriber("user-42"),
//!         Arc::new(HttpRemoteSource::new(client.clone())?),
//!         Arc::new(WebSocketSignalChannel::new(&client)?),
//!     )?;
//!
//!     println!("{} unread", session.unread_count().await);
//!     session.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod mutator;
pub mod poller;
pub mod reconciler;
pub mod session;

// Mock remote source for testing
#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use config::SyncConfig;
pub use mutator::{MutationOutcome, OptimisticMutator};
pub use poller::{PollReport, Poller, PollerHandle};
pub use reconciler::{Reconciler, SignalOutcome};
pub use session::{backoff_delay, SyncSession};
