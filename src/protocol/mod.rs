//! Backend instruction protocol.
//!
//! # Data Flow
//! ```text
//! Backend response headers
//!     → decoder.rs (HeaderSniff → Passthrough | Instruction, once)
//! Backend body chunks
//!     → Passthrough: forwarded untouched
//!     → Instruction: buffered, split on '\n'
//!         → instruction.rs (JSON line → StreamInstruction)
//!         → http::dispatch applies it to the client response
//! ```

pub mod decoder;
pub mod instruction;

pub use decoder::{Feed, Mode, ResponseStreamDecoder};
pub use instruction::{CookieSpec, StreamInstruction};

/// Errors in a backend's instruction stream. All are fatal for the request.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("backend stream ended mid-instruction ({0} bytes buffered)")]
    TruncatedStream(usize),
    #[error("instruction is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),
    #[error("malformed instruction: {0}")]
    MalformedInstruction(#[source] serde_json::Error),
    #[error("unsupported instruction: {0}")]
    UnsupportedInstruction(String),
    #[error("invalid instruction value: {0}")]
    InvalidValue(String),
}
