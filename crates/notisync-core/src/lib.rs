//! # notisync-core
//!
//! Core types, traits, and the local notification store for notisync.
//!
//! This crate provides the foundational pieces that the client bindings and
//! the sync engine depend on:
//! - the notification record model and its wire normalization
//! - the [`RemoteSource`] and [`SignalChannel`] collaborator traits
//! - the [`NotificationStore`], the single owner of cached notification state
//! - the [`EventBus`] used for side effects (new-notification cues, toasts)

pub mod channel;
pub mod defaults;
pub mod error;
pub mod events;
pub mod logging;
pub mod models;
pub mod store;
pub mod traits;

// Re-export commonly used types at crate root
pub use channel::BroadcastSignalChannel;
pub use error::{Error, Result};
pub use events::{Connectivity, EventBus, Recovery, SyncEnvelope, SyncEvent};
pub use models::*;
pub use store::{LocalStore, NotificationStore, ReadStateEntry, ReadStatePatch, UpsertOutcome};
pub use traits::*;
