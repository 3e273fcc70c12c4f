//! WebSocket binding of the [`SignalChannel`] trait.
//!
//! One connection per subscription at `{ws_url}/notifications/{subscriber_id}`.
//! Each text frame carries one JSON signal:
//!
//! ```json
//! {"id": "64f1c0", "action": "new", "timestamp": "2026-10-19T08:00:00.000Z"}
//! ```
//!
//! Frames that do not parse are logged and skipped. Ping/pong and binary
//! frames are ignored. A close frame ends the stream; a transport error is
//! yielded once as [`Error::Channel`] and then the stream ends.

use async_trait::async_trait;
use futures::StreamExt;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{HeaderValue, AUTHORIZATION};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use notisync_core::{Error, Result, Signal, SignalChannel, SignalStream};

use crate::config::ClientConfig;

/// Parse one text frame into a [`Signal`], or `None` if it is malformed.
pub fn parse_signal_frame(text: &str) -> Option<Signal> {
    match serde_json::from_str::<Signal>(text) {
        Ok(signal) if !signal.id.is_empty() => Some(signal),
        Ok(_) => {
            warn!("Skipping signal frame with empty id");
            None
        }
        Err(e) => {
            warn!(error = %e, frame_len = text.len(), "Skipping malformed signal frame");
            None
        }
    }
}

/// Per-user push channel over WebSocket.
#[derive(Debug, Clone)]
pub struct WebSocketSignalChannel {
    base_url: String,
    api_token: Option<String>,
}

impl WebSocketSignalChannel {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            base_url: config.ws_url.trim_end_matches('/').to_string(),
            api_token: config.api_token.clone(),
        })
    }

    /// Endpoint for one subscriber's signals.
    pub fn endpoint(&self, subscriber_id: &str) -> String {
        format!(
            "{}/notifications/{}",
            self.base_url,
            urlencoding::encode(subscriber_id)
        )
    }
}

#[async_trait]
impl SignalChannel for WebSocketSignalChannel {
    async fn subscribe(&self, subscriber_id: &str) -> Result<SignalStream> {
        let url = self.endpoint(subscriber_id);
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| Error::Config(format!("invalid signal endpoint {url}: {e}")))?;
        if let Some(token) = &self.api_token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| Error::Config(format!("invalid api token: {e}")))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        let (ws, response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| Error::Channel(format!("connect {url}: {e}")))?;
        info!(
            subscriber_id,
            status = response.status().as_u16(),
            "Signal channel connected"
        );

        let stream = futures::stream::unfold(Some(ws), |state| async move {
            let mut ws = state?;
            loop {
                match ws.next().await {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(signal) = parse_signal_frame(&text) {
                            return Some((Ok(signal), Some(ws)));
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        debug!(?frame, "Signal channel closed by server");
                        return None;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        return Some((Err(Error::Channel(e.to_string())), None));
                    }
                    None => return None,
                }
            }
        });

        Ok(Box::pin(stream))
    }
}
