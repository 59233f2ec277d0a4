//! Test builder web server
//!
//! HTTP API over scenarios, steps, imports and runs.

pub mod api;

use anyhow::{Context, Result};
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;

use crate::runner::ExecutionCoordinator;
use crate::utils::config::ServerConfig;
use api::AppState;

/// Build the application router
pub fn router(coordinator: Arc<ExecutionCoordinator>, confirm_window: Duration) -> Router {
    let state = Arc::new(AppState {
        coordinator,
        confirm_window,
    });
    Router::new()
        .merge(api::api_router())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub struct ApiServer {
    config: ServerConfig,
    coordinator: Arc<ExecutionCoordinator>,
    confirm_window: Duration,
}

impl ApiServer {
    pub fn new(
        config: ServerConfig,
        coordinator: Arc<ExecutionCoordinator>,
        confirm_window: Duration,
    ) -> Self {
        Self {
            config,
            coordinator,
            confirm_window,
        }
    }

    /// Start the server
    pub async fn start(&self) -> Result<()> {
        let app = router(self.coordinator.clone(), self.confirm_window);

        let listener = tokio::net::TcpListener::bind((self.config.host.as_str(), self.config.port))
            .await
            .with_context(|| {
                format!(
                    "Failed to bind {}:{}",
                    self.config.host, self.config.port
                )
            })?;

        println!("\n🧪 Test builder API started!");
        println!(
            "   Listening on: http://{}:{}",
            self.config.host, self.config.port
        );
        println!("\n   Press Ctrl+C to stop.\n");
        log::info!("Serving API on {}:{}", self.config.host, self.config.port);

        axum::serve(listener, app.into_make_service()).await?;

        Ok(())
    }
}
