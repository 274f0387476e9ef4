//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection (external listener)
//!     → server.rs (Axum setup, request ID, Server header)
//!     → handler.rs (resolve route, build event, forward)
//!     → dispatch.rs (backend instructions → response mutations)
//!     → writer.rs (buffer, commit head, stream body)
//!     → Send to client
//! ```

pub mod cookies;
pub mod dispatch;
pub mod handler;
pub mod server;
pub mod writer;

pub use server::{AppState, GatewayServer};
