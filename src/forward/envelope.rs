//! Event envelope construction.
//!
//! Every data-plane request is described to its backend as one JSON event.

use std::collections::BTreeMap;

use axum::http::request::Parts;
use axum::http::HeaderMap;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::error::GatewayError;

pub const EVENT_TYPE: &str = "http_request";
pub const CLOUD_EVENTS_VERSION: &str = "0.1";
pub const EVENT_SOURCE: &str = "gateway";
pub const EVENT_CONTENT_TYPE: &str = "application/json";

/// The event posted to a backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    pub event_type: &'static str,
    pub cloud_events_version: &'static str,
    pub source: &'static str,
    #[serde(rename = "eventID")]
    pub event_id: String,
    pub event_time: String,
    pub content_type: &'static str,
    pub data: EventData,
}

/// The request as seen by the backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventData {
    pub uri: String,
    pub path: String,
    pub path_params: BTreeMap<String, String>,
    pub headers: BTreeMap<String, String>,
    pub query_params: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl EventEnvelope {
    pub fn to_json(&self) -> Result<Vec<u8>, GatewayError> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// Whether the request carries a JSON body that belongs in the envelope.
pub fn is_json(headers: &HeaderMap) -> bool {
    content_type(headers).is_some_and(|ct| ct.to_ascii_lowercase().contains("application/json"))
}

/// Whether the request is a multipart upload to relay.
pub fn is_multipart(headers: &HeaderMap) -> bool {
    content_type(headers)
        .is_some_and(|ct| ct.trim_start().to_ascii_lowercase().starts_with("multipart/form-data"))
}

fn content_type(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
}

/// Build the envelope for one request.
///
/// `body` is the raw client body when it should be embedded. It is parsed as
/// JSON only when the request declares a JSON content type; an empty body is
/// treated as absent.
pub fn build(
    parts: &Parts,
    path_params: impl IntoIterator<Item = (String, String)>,
    body: Option<&[u8]>,
    now: DateTime<Utc>,
) -> Result<EventEnvelope, GatewayError> {
    let body = match body {
        Some(raw) if is_json(&parts.headers) && !raw.iter().all(u8::is_ascii_whitespace) => Some(
            serde_json::from_slice(raw)
                .map_err(|e| GatewayError::MalformedClientRequest(format!("invalid JSON body: {}", e)))?,
        ),
        _ => None,
    };

    Ok(EventEnvelope {
        event_type: EVENT_TYPE,
        cloud_events_version: CLOUD_EVENTS_VERSION,
        source: EVENT_SOURCE,
        event_id: Uuid::new_v4().to_string(),
        event_time: now.format("%Y-%m-%dT%H:%M:%S").to_string(),
        content_type: EVENT_CONTENT_TYPE,
        data: EventData {
            uri: parts.uri.to_string(),
            path: parts.uri.path().to_string(),
            path_params: path_params.into_iter().collect(),
            headers: header_map(&parts.headers),
            query_params: query_map(parts.uri.query()),
            body,
        },
    })
}

/// Headers keyed by their canonical `Train-Case` name; repeated headers are
/// joined with `", "`.
fn header_map(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut out: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes());
        out.entry(canonical_header_name(name.as_str()))
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert_with(|| value.into_owned());
    }
    out
}

fn canonical_header_name(name: &str) -> String {
    name.split('-')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}

/// First value per key, percent-decoded.
fn query_map(query: Option<&str>) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    if let Some(query) = query {
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            out.entry(key.into_owned()).or_insert_with(|| value.into_owned());
        }
    }
    out
}
