//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the data-plane and control-plane Axum routers
//! - Wire up middleware (tracing, request ID, Server header, timeouts)
//! - Serve both listeners until shutdown

use std::sync::Arc;

use axum::http::header::SERVER;
use axum::http::{HeaderName, HeaderValue};
use axum::routing::any;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::config::GatewayConfig;
use crate::control;
use crate::forward::BackendClient;
use crate::http::cookies::CookieSigner;
use crate::http::handler::gateway_handler;
use crate::routing::RouteTable;

const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub routes: Arc<RouteTable>,
    pub backend: BackendClient,
    pub signer: Arc<CookieSigner>,
    pub config: Arc<GatewayConfig>,
}

impl AppState {
    pub fn new(config: GatewayConfig, routes: Arc<RouteTable>, signer: CookieSigner) -> Self {
        Self {
            backend: BackendClient::new(&config.timeouts),
            routes,
            signer: Arc::new(signer),
            config: Arc::new(config),
        }
    }
}

/// The gateway's two HTTP listeners.
pub struct GatewayServer {
    external: Router,
    internal: Router,
}

impl GatewayServer {
    pub fn new(state: AppState) -> Self {
        let external = Self::build_router(state.clone());
        let internal = control::router(state);
        Self { external, internal }
    }

    /// Build the data-plane router with all middleware layers.
    fn build_router(state: AppState) -> Router {
        let server_name = HeaderValue::from_str(&state.config.server.header_name)
            .unwrap_or_else(|_| HeaderValue::from_static("gateway"));

        Router::new()
            .route("/{*path}", any(gateway_handler))
            .route("/", any(gateway_handler))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::new(X_REQUEST_ID, MakeRequestUuid))
                    .layer(TraceLayer::new_for_http())
                    .layer(PropagateRequestIdLayer::new(X_REQUEST_ID))
                    .layer(SetResponseHeaderLayer::overriding(SERVER, server_name)),
            )
    }

    /// Serve both listeners until the shutdown signal fires.
    pub async fn run(
        self,
        external: TcpListener,
        internal: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        tracing::info!(address = %external.local_addr()?, "Data plane listening");
        tracing::info!(address = %internal.local_addr()?, "Control plane listening");

        let mut control_shutdown = shutdown.resubscribe();
        let data_plane = axum::serve(external, self.external).with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        });
        let control_plane = axum::serve(internal, self.internal).with_graceful_shutdown(async move {
            let _ = control_shutdown.recv().await;
        });

        tokio::try_join!(
            async { data_plane.await },
            async { control_plane.await },
        )?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

