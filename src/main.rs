//! Neural Painter - chat bot for image stylization and painting
//!
//! Users pick a flow in the chat, upload a photo and get back the transformed
//! image. Each user's conversation is a small state machine; the slow image
//! transforms run off the event loop.

mod api;
mod catalog;
mod config;
mod jobs;
mod lifecycle;
mod runtime;
mod session;
mod state_machine;
mod transport;

use api::{create_router, AppState};
use catalog::StyleCatalog;
use config::BotConfig;
use jobs::{CommandTransform, JobRunner, Transforms};
use runtime::{RuntimeDeps, RuntimeManager};
use session::InMemorySessionStore;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use transport::telegram::TelegramTransport;
use transport::RetryingTransport;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "neural_painter=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    // Configuration
    let config = BotConfig::from_env()?;

    let catalog = Arc::new(StyleCatalog::new(&config.style_dir));
    let missing = catalog.missing_images();
    if !missing.is_empty() {
        tracing::warn!(
            dir = %catalog.dir().display(),
            missing = missing.len(),
            "Style images missing; the menu will fail to show them"
        );
    }

    let transforms = Transforms {
        stylization: Arc::new(
            CommandTransform::from_command_line(&config.stylization_cmd)
                .ok_or("NEURAL_PAINTER_FNST_CMD is empty")?,
        ),
        painting: Arc::new(
            CommandTransform::from_command_line(&config.painting_cmd)
                .ok_or("NEURAL_PAINTER_GNST_CMD is empty")?,
        ),
    };

    let transport = Arc::new(RetryingTransport::new(TelegramTransport::new(
        &config.api_url,
        &config.token,
    )?));
    let store = Arc::new(InMemorySessionStore::new());

    let manager = Arc::new(RuntimeManager::new(RuntimeDeps {
        store: store.clone(),
        transport: transport.clone(),
        runner: JobRunner::new(transforms, config.max_jobs),
        catalog,
        work_dir: config.work_dir.clone(),
    }));

    lifecycle::on_startup(&config.work_dir, transport.as_ref(), &config.webhook_url()).await?;

    let app = create_router(AppState::new(manager.clone(), &config.token))
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = config.listen_addr();
    tracing::info!(%addr, max_jobs = config.max_jobs, "Neural Painter listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(lifecycle::shutdown_signal())
        .await;

    manager.shutdown();
    lifecycle::on_shutdown(&config.work_dir, store.as_ref(), transport.as_ref()).await;

    served?;
    Ok(())
}
