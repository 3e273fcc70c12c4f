//! notisync-watch: run a sync session and log what happens.
//!
//! Connects to the configured notification service, keeps a local store in
//! sync, and logs every side-effect event until Ctrl-C.

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use notisync_client::{ClientConfig, HttpRemoteSource, WebSocketSignalChannel};
use notisync_core::SyncEvent;
use notisync_engine::{SyncConfig, SyncSession};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with configurable output
    //
    // Environment variables:
    //   LOG_FORMAT  - "json" or "text" (default: "text")
    //   LOG_FILE    - path to log file (optional, enables file logging)
    //   LOG_ANSI    - "true"/"false" override ANSI colors (auto-detected by default)
    //   RUST_LOG    - standard env filter (default: "notisync=info")
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "notisync_engine=info,notisync_client=info,notisync_core=info,notisync_watch=info".into()
    });

    let registry = tracing_subscriber::registry().with(env_filter);

    // Optionally create a file appender with daily rotation
    let _file_guard = if let Some(ref path) = log_file {
        let file_dir = std::path::Path::new(path)
            .parent()
            .unwrap_or(std::path::Path::new("."));
        let file_name = std::path::Path::new(path)
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("notisync-watch.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .init();
        } else {
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(log_ansi.unwrap_or(false));
            registry.with(layer).init();
        }
        Some(guard)
    } else {
        if log_format == "json" {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        } else {
            let mut layer = tracing_subscriber::fmt::layer();
            if let Some(ansi) = log_ansi {
                layer = layer.with_ansi(ansi);
            }
            registry.with(layer).init();
        }
        None
    };

    info!(
        log_format = %log_format,
        log_file = log_file.as_deref().unwrap_or("(stdout)"),
        "Logging initialized"
    );

    let client_config = ClientConfig::from_env();
    let sync_config = SyncConfig::from_env();
    if sync_config.subscriber_id.is_empty() {
        anyhow::bail!("NOTISYNC_SUBSCRIBER_ID must be set");
    }

    let remote = HttpRemoteSource::new(client_config.clone())
        .context("failed to create HTTP remote source")?;
    let channel = WebSocketSignalChannel::new(&client_config)
        .context("failed to create WebSocket signal channel")?;

    info!(
        api_url = %client_config.api_url,
        ws_url = %client_config.ws_url,
        subscriber_id = %sync_config.subscriber_id,
        "Starting notisync-watch"
    );

    let session = SyncSession::start(sync_config, Arc::new(remote), Arc::new(channel))
        .context("failed to start sync session")?;
    let mut events = session.events();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl-C");
                break;
            }
            received = events.recv() => match received {
                Ok(envelope) => log_event(&envelope.payload),
                Err(RecvError::Lagged(missed)) => warn!(missed, "Event log lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    }

    info!(
        unread_count = session.unread_count().await,
        record_count = session.store().len().await,
        "Final state"
    );
    session.shutdown().await;
    Ok(())
}

fn log_event(event: &SyncEvent) {
    match event {
        SyncEvent::NewNotification { record } => info!(
            notification_id = %record.id,
            category = record.display_category().as_str(),
            priority = record.priority.as_str(),
            title = %record.title,
            "New notification"
        ),
        SyncEvent::ConnectivityChanged { state } => {
            info!(state = state.as_str(), "Connectivity changed")
        }
        SyncEvent::MutationFailed {
            operation,
            notification_id,
            error,
            recovery,
        } => warn!(
            op = %operation,
            notification_id = notification_id.as_deref().unwrap_or("-"),
            error = %error,
            recovery = ?recovery,
            "Mutation failed"
        ),
        SyncEvent::Resynced {
            record_count,
            unread_count,
        } => info!(record_count, unread_count, "Store resynced"),
    }
}
