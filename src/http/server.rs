//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with all handlers
//! - Wire up middleware (gateway, timeout, request ID, tracing)
//! - Bind server to listener
//! - Serve until the shutdown signal fires

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::GuardConfig;
use crate::http::gateway::{gateway_middleware, Collaborators, RequestGateway};
use crate::http::handlers;
use crate::http::request::{propagate_request_id_layer, set_request_id_layer};

/// HTTP server fronting the guarded API.
pub struct HttpServer {
    router: Router,
    gateway: Arc<RequestGateway>,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: GuardConfig, collaborators: Collaborators) -> Self {
        let gateway = Arc::new(RequestGateway::new(config, collaborators));
        let router = Self::build_router(gateway.clone());
        Self { router, gateway }
    }

    /// Build the Axum router with all middleware layers.
    ///
    /// Layers wrap outside-in from the bottom: tracing sees the request id, and
    /// the timeout sits inside the gateway so a 408 still gets security headers.
    #[allow(deprecated)]
    fn build_router(gateway: Arc<RequestGateway>) -> Router {
        let timeout = Duration::from_secs(gateway.config().timeouts.request_secs);

        Router::new()
            .route("/api/health", get(handlers::health))
            .route("/api/auth/password-reset", post(handlers::password_reset))
            .route("/api/contact", post(handlers::contact))
            .route("/api/webhooks/payments", post(handlers::payment_webhook))
            .route("/api/account", get(handlers::account))
            .fallback(handlers::not_found)
            .layer(TimeoutLayer::new(timeout))
            .layer(middleware::from_fn_with_state(gateway.clone(), gateway_middleware))
            .with_state(gateway)
            .layer(propagate_request_id_layer())
            .layer(TraceLayer::new_for_http())
            .layer(set_request_id_layer())
    }

    /// The router, for driving the server in-process.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn gateway(&self) -> &Arc<RequestGateway> {
        &self.gateway
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
