//! emotion-fusion HTTP server binary.
//!
//! # Environment Variables
//!
//! - `PORT` HTTP port (default: 8080)
//! - `EMOTION_FUSION_CONFIG` Path to a YAML configuration file (default: built-in values)
//! - `RUST_LOG` Tracing filter (default: "info,emotion_fusion=debug")
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin server
//! ```

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;

use emotion_fusion::config::EngineConfig;
use emotion_fusion::publisher::{
    BroadcastPublisher, DirectivePublisher, FanoutPublisher, LoggingPublisher, PublishQueue,
};
use emotion_fusion::server::{app_router, AppState};
use emotion_fusion::service::FusionService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,emotion_fusion=debug".into()),
        )
        .init();

    let port = std::env::var("PORT").unwrap_or_else(|_| "8080".to_string());
    let bind_addr = format!("0.0.0.0:{}", port);

    let config = EngineConfig::from_env().context("Invalid engine configuration")?;

    let broadcast = Arc::new(BroadcastPublisher::new(config.publisher.broadcast_capacity));
    let fanout = FanoutPublisher::new()
        .with(broadcast.clone())
        .with(Arc::new(LoggingPublisher::new(
            config.synthesis.baseline.prompt.clone(),
        )));
    let fanout: Arc<dyn DirectivePublisher> = Arc::new(fanout);
    let (publish_handle, publish_task) =
        PublishQueue::spawn(fanout, config.publisher.queue_capacity);

    let service = Arc::new(FusionService::new(config, publish_handle));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown_tx = Arc::new(shutdown_tx);
    let worker = service.clone().spawn_worker(shutdown_rx.clone());

    let app = app_router(AppState::new(
        service.clone(),
        (*broadcast).clone(),
        shutdown_rx.clone(),
    ));

    tracing::info!("emotion-fusion server starting on {}", bind_addr);
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health         liveness check");
    tracing::info!("  GET  /status         fused state and directive");
    tracing::info!("  POST /update_emotion submit a user's emotion");
    tracing::info!("  POST /join_session   register a user");
    tracing::info!("  POST /leave_session  remove a user");
    tracing::info!("  GET  /directives     directive event stream");

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown({
            let shutdown_tx = Arc::clone(&shutdown_tx);
            async move {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!("Failed to listen for Ctrl-C: {}", e);
                }
                tracing::info!("Shutdown requested");
                // Open event streams must end before graceful shutdown can finish.
                let _ = shutdown_tx.send(true);
            }
        })
        .await
        .context("Server failed")?;

    let _ = shutdown_tx.send(true);
    worker.await.context("Fusion worker panicked")?;
    // The queue drains once the last handle (owned by the service) is gone.
    drop(service);
    if let Err(e) = publish_task.await {
        tracing::warn!("Publish queue ended abnormally: {}", e);
    }
    tracing::info!(
        "Stopped ({} live subscribers at exit)",
        broadcast.subscriber_count()
    );
    Ok(())
}
