//! In-process signal channel.
//!
//! A per-subscriber `tokio::sync::broadcast` hub. Used when the producer of
//! signals lives in the same process (embedding, tests) instead of behind a
//! WebSocket.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::models::Signal;
use crate::traits::{SignalChannel, SignalStream};

/// Broadcast-backed [`SignalChannel`] keyed by subscriber id.
pub struct BroadcastSignalChannel {
    hubs: Mutex<HashMap<String, broadcast::Sender<Signal>>>,
    capacity: usize,
    available: AtomicBool,
}

impl Default for BroadcastSignalChannel {
    fn default() -> Self {
        Self::new(crate::defaults::SIGNAL_BUFFER)
    }
}

impl BroadcastSignalChannel {
    pub fn new(capacity: usize) -> Self {
        Self {
            hubs: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
            available: AtomicBool::new(true),
        }
    }

    /// Deliver a signal to every open stream of `subscriber_id`.
    ///
    /// Returns the number of streams that received it.
    pub async fn publish(&self, subscriber_id: &str, signal: Signal) -> usize {
        let hubs = self.hubs.lock().await;
        match hubs.get(subscriber_id) {
            Some(tx) => tx.send(signal).unwrap_or(0),
            None => 0,
        }
    }

    /// Close every open stream of `subscriber_id`, as a dropped connection would.
    pub async fn disconnect(&self, subscriber_id: &str) {
        let removed = self.hubs.lock().await.remove(subscriber_id);
        if removed.is_some() {
            debug!(subscriber_id, "Signal hub disconnected");
        }
    }

    /// While unavailable, new subscriptions fail.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of open streams for `subscriber_id`.
    pub async fn subscriber_count(&self, subscriber_id: &str) -> usize {
        self.hubs
            .lock()
            .await
            .get(subscriber_id)
            .map_or(0, |tx| tx.receiver_count())
    }
}

#[async_trait]
impl SignalChannel for BroadcastSignalChannel {
    async fn subscribe(&self, subscriber_id: &str) -> Result<SignalStream> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(Error::Channel(format!(
                "signal channel unavailable for {subscriber_id}"
            )));
        }

        let rx = {
            let mut hubs = self.hubs.lock().await;
            hubs.entry(subscriber_id.to_string())
                .or_insert_with(|| broadcast::channel(self.capacity).0)
                .subscribe()
        };

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(signal) => return Some((Ok(signal), rx)),
                    Err(RecvError::Lagged(missed)) => {
                        warn!(missed, "Signal subscriber lagged, missed signals");
                    }
                    Err(RecvError::Closed) => return None,
                }
            }
        });

        Ok(Box::pin(stream))
    }
}
