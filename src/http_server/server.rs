//! # HTTP Server
//!
//! Verifier-facing endpoints, the scheduler trigger, and health.
//! Owner-facing operations stay library calls; the session layer that
//! authenticates owners is external.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::config::HttpServerConfig;
use super::health_routes::health_routes;
use super::scheduler_routes::scheduler_routes;
use super::state::ApiState;
use super::verify_routes::verify_routes;
use crate::store::RecordStore;

/// HTTP server over one deployment
pub struct HttpServer {
    config: HttpServerConfig,
    router: Router,
}

impl HttpServer {
    pub fn new<S: RecordStore + 'static>(config: HttpServerConfig, state: ApiState<S>) -> Self {
        let router = build_router(&config, Arc::new(state));
        Self { config, router }
    }

    /// Get the socket address
    pub fn socket_addr(&self) -> String {
        self.config.socket_addr()
    }

    /// Get the router (for testing)
    pub fn router(self) -> Router {
        self.router
    }

    /// Serve until the listener fails.
    pub async fn start(self) -> Result<(), std::io::Error> {
        let addr: SocketAddr = self
            .config
            .socket_addr()
            .parse()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

        let listener = TcpListener::bind(addr).await?;
        tracing::info!(%addr, "HTTP server listening");
        axum::serve(listener, self.router).await
    }
}

fn build_router<S: RecordStore + 'static>(config: &HttpServerConfig, state: Arc<ApiState<S>>) -> Router {
    // Empty origin list: permissive, for development
    let cors = if config.cors_origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = config
            .cors_origins
            .iter()
            .filter_map(|s| s.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    };

    Router::new()
        .merge(health_routes::<S>())
        .merge(scheduler_routes::<S>())
        .merge(verify_routes::<S>())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
