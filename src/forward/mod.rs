//! Gateway → backend forwarding.
//!
//! # Data Flow
//! ```text
//! Client request
//!     → envelope.rs (request → EventEnvelope JSON)
//!     → multipart.rs (uploads re-framed, envelope as `__event__` part)
//!     → client.rs (POST to the route endpoint)
//!     → backend response handed to protocol::decoder
//! ```

pub mod client;
pub mod envelope;
pub mod multipart;

pub use client::BackendClient;
pub use envelope::EventEnvelope;
pub use multipart::{FileSource, MemoryFiles, MulterFiles, PartHeader};
