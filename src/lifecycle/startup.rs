//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the cookie signer and the route table from config
//! - Bind both listeners
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Listeners bind last (traffic only when ready)

use std::sync::Arc;

use tokio::net::TcpListener;

use crate::config::schema::CookieConfig;
use crate::config::GatewayConfig;
use crate::http::cookies::CookieSigner;
use crate::http::server::AppState;
use crate::routing::RouteTable;

/// Errors that abort startup.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("invalid cookie secret")]
    CookieSecret,
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },
}

/// Cookie signer from config, or a random per-process one.
pub fn cookie_signer(config: &CookieConfig) -> Result<CookieSigner, StartupError> {
    match &config.secret {
        Some(secret) => CookieSigner::new(secret).map_err(|_| StartupError::CookieSecret),
        None => {
            tracing::warn!("No cookie secret configured; signed cookies will not survive a restart");
            CookieSigner::ephemeral().map_err(|_| StartupError::CookieSecret)
        }
    }
}

/// Restore routes and assemble the shared handler state.
pub fn build_state(config: GatewayConfig) -> Result<AppState, StartupError> {
    let signer = cookie_signer(&config.cookies)?;
    let routes = Arc::new(RouteTable::open(&config.routing));
    tracing::info!(
        routes = routes.len(),
        snapshot = %config.routing.snapshot_path,
        "Route table restored"
    );
    Ok(AppState::new(config, routes, signer))
}

/// Bind the external (data-plane) and internal (control-plane) listeners.
pub async fn bind_listeners(config: &GatewayConfig) -> Result<(TcpListener, TcpListener), StartupError> {
    let external = bind(&config.listener.external_address).await?;
    let internal = bind(&config.listener.internal_address).await?;
    Ok((external, internal))
}

async fn bind(address: &str) -> Result<TcpListener, StartupError> {
    TcpListener::bind(address).await.map_err(|source| StartupError::Bind {
        address: address.to_string(),
        source,
    })
}
