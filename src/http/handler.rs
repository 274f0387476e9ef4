//! Data-plane request handler.
//!
//! # Responsibilities
//! - Resolve the route for an incoming request
//! - Build the event (JSON envelope or multipart relay) and POST it
//! - Feed the backend response through the decoder and dispatcher
//!
//! # Design Decisions
//! - Forwarding runs in its own task that owns the decoder and the writer;
//!   the handler only waits for the response head
//! - A dropped handler future or client body aborts the backend fetch
//! - Unmatched GET/HEAD get the static 404 page, other methods 405

use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::State;
use axum::http::header::{ALLOW, CONTENT_LENGTH, CONTENT_TYPE, HOST};
use axum::http::request::Parts;
use axum::http::{Method, Request, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use chrono::Utc;
use http_body_util::BodyExt;
use tokio::sync::oneshot;

use crate::error::GatewayError;
use crate::forward::envelope;
use crate::forward::multipart::{self, MulterFiles};
use crate::http::cookies::request_cookie_names;
use crate::http::dispatch::{Flow, InstructionDispatcher};
use crate::http::server::AppState;
use crate::http::writer::ResponseWriter;
use crate::observability::metrics;
use crate::protocol::{Feed, Mode, ResponseStreamDecoder};
use crate::routing::RouteMatch;

/// Methods advertised in answer to `OPTIONS`.
pub const ALLOWED_METHODS: &str = "GET,HEAD,POST,PUT,PATCH,DELETE,OPTIONS";

const NOT_FOUND_PAGE: &str = include_str!("static/404.html");
const JSON_EVENT_CONTENT_TYPE: &str = "application/json; charset=utf-8";
const X_REQUEST_ID: &str = "x-request-id";

/// Response to a request no route matches.
fn unmatched(method: &Method) -> Response {
    match *method {
        Method::GET | Method::HEAD => (StatusCode::NOT_FOUND, Html(NOT_FOUND_PAGE)).into_response(),
        _ => (StatusCode::METHOD_NOT_ALLOWED, [(ALLOW, "GET,HEAD,OPTIONS")]).into_response(),
    }
}

/// Catch-all data-plane handler.
pub async fn gateway_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let (parts, body) = request.into_parts();
    let method = parts.method.clone();

    let response = if method == Method::OPTIONS {
        (StatusCode::OK, [(ALLOW, ALLOWED_METHODS)]).into_response()
    } else {
        let host = request_host(&parts);
        match state.routes.resolve(method.as_str(), &host, parts.uri.path()) {
            Some(matched) => forward(state, parts, body, matched)
                .await
                .unwrap_or_else(IntoResponse::into_response),
            None => {
                tracing::debug!(method = %method, host = %host, path = %parts.uri.path(), "No route matched");
                unmatched(&method)
            }
        }
    };

    metrics::record_request(method.as_str(), response.status().as_u16(), start);
    response
}

fn request_host(parts: &Parts) -> String {
    parts
        .headers
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| parts.uri.host())
        .unwrap_or_default()
        .to_string()
}

fn request_id(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Prepare the outbound body, start the forwarding task and wait for the
/// response head.
async fn forward(
    state: AppState,
    parts: Parts,
    body: Body,
    matched: RouteMatch,
) -> Result<Response, GatewayError> {
    let request_id = request_id(&parts);
    let (content_type, outbound) = prepare_body(&state, &parts, body, &matched).await?;

    let (head_tx, head_rx) = oneshot::channel();
    let dispatcher = InstructionDispatcher::new(
        ResponseWriter::new(head_tx),
        request_cookie_names(&parts.headers),
        state.signer.clone(),
    );

    tracing::debug!(
        request_id = request_id.as_deref().unwrap_or("unknown"),
        method = %parts.method,
        path = %parts.uri.path(),
        endpoint = %matched.endpoint(),
        "Forwarding request"
    );

    tokio::spawn(run_exchange(
        state,
        dispatcher,
        matched,
        content_type,
        outbound,
        request_id,
    ));

    // The task always answers unless it panicked.
    head_rx.await.map_err(|_| GatewayError::ClientGone)
}

async fn prepare_body(
    state: &AppState,
    parts: &Parts,
    body: Body,
    matched: &RouteMatch,
) -> Result<(String, Body), GatewayError> {
    let limits = &state.config.limits;
    let params = matched.params.clone();

    if envelope::is_multipart(&parts.headers) {
        let content_type = parts
            .headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        let inbound = multer::parse_boundary(content_type)
            .map_err(|e| GatewayError::MalformedClientRequest(format!("invalid multipart boundary: {}", e)))?;

        let event = envelope::build(parts, params, None, Utc::now())?;
        let constraints = multer::Constraints::new()
            .size_limit(multer::SizeLimit::new().whole_stream(limits.max_upload_bytes as u64));
        let source = MulterFiles::new(multer::Multipart::with_constraints(
            body.into_data_stream(),
            inbound,
            constraints,
        ));

        let boundary = multipart::new_boundary();
        let stream = multipart::relay(source, &event, boundary.clone()).await?;
        return Ok((multipart::content_type(&boundary), Body::from_stream(stream)));
    }

    let declared = parts
        .headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    if declared.is_some_and(|len| len > limits.max_body_bytes) {
        return Err(GatewayError::PayloadTooLarge { limit: limits.max_body_bytes });
    }

    let bytes = axum::body::to_bytes(body, limits.max_body_bytes)
        .await
        .map_err(|e| body_error(e, limits.max_body_bytes))?;
    let event = envelope::build(parts, params, Some(&bytes), Utc::now())?;
    Ok((JSON_EVENT_CONTENT_TYPE.to_string(), Body::from(event.to_json()?)))
}

fn body_error(err: axum::Error, limit: usize) -> GatewayError {
    let mut source = std::error::Error::source(&err);
    while let Some(e) = source {
        if e.is::<http_body_util::LengthLimitError>() {
            return GatewayError::PayloadTooLarge { limit };
        }
        source = e.source();
    }
    GatewayError::MalformedClientRequest(format!("failed to read request body: {}", err))
}

/// Owns one backend round-trip. Every outcome ends with the client response
/// completed or failed.
async fn run_exchange(
    state: AppState,
    mut dispatcher: InstructionDispatcher,
    matched: RouteMatch,
    content_type: String,
    body: Body,
    request_id: Option<String>,
) {
    let result = exchange(
        &state,
        &mut dispatcher,
        &matched,
        &content_type,
        body,
        request_id.as_deref(),
    )
    .await;

    let request_id = request_id.as_deref().unwrap_or("unknown");
    match result {
        Ok(()) => {}
        Err(GatewayError::ClientGone) => {
            tracing::debug!(request_id = %request_id, endpoint = %matched.endpoint(), "Client went away, backend fetch dropped");
        }
        Err(err) => {
            tracing::error!(
                request_id = %request_id,
                endpoint = %matched.endpoint(),
                error = %err,
                "Request execution failed"
            );
            metrics::record_backend_error(err.kind());
            if let Err(e) = dispatcher.writer_mut().fail().await {
                tracing::debug!(request_id = %request_id, error = %e, "Could not deliver failure response");
            }
        }
    }
}

async fn exchange(
    state: &AppState,
    dispatcher: &mut InstructionDispatcher,
    matched: &RouteMatch,
    content_type: &str,
    body: Body,
    request_id: Option<&str>,
) -> Result<(), GatewayError> {
    let request_secs = state.backend.request_secs();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(request_secs);

    let response = tokio::select! {
        response = state.backend.post(matched.endpoint(), content_type, body, request_id, deadline) => response?,
        _ = dispatcher.writer_mut().client_gone() => return Err(GatewayError::ClientGone),
    };

    let mut decoder = ResponseStreamDecoder::new(&state.config.protocol.instruction_media_type);
    let backend_type = response.headers().get(CONTENT_TYPE).cloned();
    let mode = decoder.on_headers(backend_type.as_ref().and_then(|v| v.to_str().ok()));
    if mode == Mode::Passthrough {
        if let Some(value) = backend_type {
            dispatcher.writer_mut().set_header(CONTENT_TYPE, value);
        }
    }

    let mut body = response.into_body();
    loop {
        let frame = tokio::select! {
            frame = tokio::time::timeout_at(deadline, body.frame()) => {
                frame.map_err(|_| GatewayError::BackendTimeout(request_secs))?
            }
            _ = dispatcher.writer_mut().client_gone() => return Err(GatewayError::ClientGone),
        };
        let Some(frame) = frame else { break };
        let Ok(chunk) = frame.map_err(GatewayError::BackendStream)?.into_data() else {
            continue;
        };

        match decoder.feed(chunk) {
            Feed::Passthrough(bytes) => dispatcher.passthrough(bytes).await?,
            Feed::Instructions(instructions) => {
                for instruction in instructions {
                    if dispatcher.apply(instruction?).await? == Flow::Finish {
                        return Ok(());
                    }
                }
            }
        }
    }

    decoder.finish()?;
    dispatcher.finish().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unmatched_policy() {
        assert_eq!(unmatched(&Method::GET).status(), StatusCode::NOT_FOUND);
        assert_eq!(unmatched(&Method::HEAD).status(), StatusCode::NOT_FOUND);
        assert_eq!(unmatched(&Method::POST).status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(unmatched(&Method::DELETE).status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[test]
    fn test_request_host_prefers_header() {
        let parts = Request::builder()
            .uri("http://fallback.local/x")
            .header(HOST, "api.example.com:8888")
            .body(())
            .unwrap()
            .into_parts()
            .0;
        assert_eq!(request_host(&parts), "api.example.com:8888");

        let parts = Request::builder()
            .uri("http://fallback.local/x")
            .body(())
            .unwrap()
            .into_parts()
            .0;
        assert_eq!(request_host(&parts), "fallback.local");
    }
}
