pub mod rest;
pub mod security;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::Router;
use geodns_core::db::RecordStore;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Maximum request body size (1 MB)
const MAX_BODY_SIZE: usize = 1024 * 1024;

pub struct ApiServer {
    listen_addr: SocketAddr,
    store: Arc<dyn RecordStore>,
    api_key: Option<String>,
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RecordStore>,
    pub api_key: Option<Arc<String>>,
}

impl ApiServer {
    pub fn new(listen_addr: SocketAddr, store: Arc<dyn RecordStore>, api_key: Option<String>) -> Self {
        Self { listen_addr, store, api_key }
    }

    pub async fn run(self, shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let state = AppState {
            store: self.store,
            api_key: self.api_key.map(Arc::new),
        };

        let app = Router::new()
            .nest("/api/v1", rest::router())
            .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
            .layer(TraceLayer::new_for_http())
            .layer(axum::middleware::from_fn_with_state(
                state.clone(),
                security::api_key_auth,
            ))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind(self.listen_addr).await?;
        info!("admin API listening on {}", self.listen_addr);

        let mut shutdown = shutdown;
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.changed().await;
            })
            .await?;

        Ok(())
    }
}
