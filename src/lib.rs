//! Event gateway library.
//!
//! Routes plain HTTP requests to registered backend endpoints as JSON events
//! and relays the backends' streamed answers back to the client.

pub mod config;
pub mod control;
pub mod error;
pub mod forward;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod protocol;
pub mod routing;

pub use config::GatewayConfig;
pub use error::GatewayError;
pub use http::{AppState, GatewayServer};
pub use lifecycle::Shutdown;
