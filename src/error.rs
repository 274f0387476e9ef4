//! Data-plane request errors.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::http::writer::FAILURE_BODY;
use crate::protocol::ProtocolError;

/// Everything that can fail while serving one data-plane request.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("malformed client request: {0}")]
    MalformedClientRequest(String),
    #[error("request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },
    #[error("route endpoint is not usable: {0}")]
    InvalidEndpoint(String),
    #[error("backend unreachable: {0}")]
    BackendUnreachable(#[source] hyper_util::client::legacy::Error),
    #[error("backend did not answer within {0} seconds")]
    BackendTimeout(u64),
    #[error("backend response stream failed: {0}")]
    BackendStream(#[source] hyper::Error),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("failed to encode event: {0}")]
    Envelope(#[from] serde_json::Error),
    #[error("multipart upload failed: {0}")]
    Multipart(#[from] multer::Error),
    #[error("client disconnected")]
    ClientGone,
}

impl GatewayError {
    /// Short label used for the backend error metric.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MalformedClientRequest(_) => "malformed_request",
            Self::PayloadTooLarge { .. } => "payload_too_large",
            Self::InvalidEndpoint(_) => "invalid_endpoint",
            Self::BackendUnreachable(_) => "unreachable",
            Self::BackendTimeout(_) => "timeout",
            Self::BackendStream(_) => "stream",
            Self::Protocol(ProtocolError::TruncatedStream(_)) => "truncated",
            Self::Protocol(ProtocolError::UnsupportedInstruction(_)) => "unsupported_instruction",
            Self::Protocol(_) => "malformed_instruction",
            Self::Envelope(_) => "envelope",
            Self::Multipart(_) => "multipart",
            Self::ClientGone => "client_gone",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::MalformedClientRequest(_) => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Multipart(
                multer::Error::StreamSizeExceeded { .. } | multer::Error::FieldSizeExceeded { .. },
            ) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Multipart(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match status {
            StatusCode::INTERNAL_SERVER_ERROR => FAILURE_BODY.to_string(),
            _ => format!("HTTP {}: {}\n", status.as_u16(), self),
        };
        (status, [(axum::http::header::CONTENT_TYPE, "text/plain; charset=UTF-8")], body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors_keep_their_status() {
        let err = GatewayError::MalformedClientRequest("bad json".into());
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);

        let err = GatewayError::PayloadTooLarge { limit: 10 };
        assert_eq!(err.into_response().status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[test]
    fn test_multipart_errors_are_client_errors() {
        let err = GatewayError::Multipart(multer::Error::IncompleteStream);
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let err = GatewayError::Multipart(multer::Error::StreamSizeExceeded { limit: 8 });
        assert_eq!(err.into_response().status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[test]
    fn test_backend_errors_are_500() {
        let err = GatewayError::BackendTimeout(60);
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.kind(), "timeout");

        let err = GatewayError::from(ProtocolError::UnsupportedInstruction("x".into()));
        assert_eq!(err.kind(), "unsupported_instruction");
    }
}
