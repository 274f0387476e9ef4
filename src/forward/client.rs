//! Outbound HTTP client for backend endpoints.

use std::time::Duration;

use axum::body::Body;
use axum::http::header::CONTENT_TYPE;
use axum::http::{Method, Request, Response, Uri};
use hyper::body::Incoming;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tokio::time::Instant;
use url::Url;

use crate::config::TimeoutConfig;
use crate::error::GatewayError;

const X_REQUEST_ID: &str = "x-request-id";

/// Keep-alive pooled client posting events to backends.
#[derive(Clone)]
pub struct BackendClient {
    client: Client<HttpConnector, Body>,
    request_secs: u64,
}

impl BackendClient {
    pub fn new(timeouts: &TimeoutConfig) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(Duration::from_secs(timeouts.connect_secs)));
        connector.set_nodelay(true);

        Self {
            client: Client::builder(TokioExecutor::new()).build(connector),
            request_secs: timeouts.request_secs,
        }
    }

    /// Seconds a forwarded request may take end to end.
    pub fn request_secs(&self) -> u64 {
        self.request_secs
    }

    /// POST `body` to `endpoint`, waiting for the response head until `deadline`.
    pub async fn post(
        &self,
        endpoint: &Url,
        content_type: &str,
        body: Body,
        request_id: Option<&str>,
        deadline: Instant,
    ) -> Result<Response<Incoming>, GatewayError> {
        if endpoint.scheme() != "http" {
            return Err(GatewayError::InvalidEndpoint(format!(
                "unsupported scheme {:?} in {}",
                endpoint.scheme(),
                endpoint
            )));
        }
        let uri: Uri = endpoint
            .as_str()
            .parse()
            .map_err(|e| GatewayError::InvalidEndpoint(format!("{}: {}", endpoint, e)))?;

        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(CONTENT_TYPE, content_type);
        if let Some(id) = request_id {
            builder = builder.header(X_REQUEST_ID, id);
        }
        let request = builder
            .body(body)
            .map_err(|e| GatewayError::InvalidEndpoint(e.to_string()))?;

        match tokio::time::timeout_at(deadline, self.client.request(request)).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => Err(GatewayError::BackendUnreachable(e)),
            Err(_) => Err(GatewayError::BackendTimeout(self.request_secs)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rejects_non_http_endpoint() {
        let client = BackendClient::new(&TimeoutConfig::default());
        let endpoint = Url::parse("https://engine.internal/run").unwrap();
        let deadline = Instant::now() + Duration::from_secs(1);
        let err = client
            .post(&endpoint, "application/json", Body::empty(), None, deadline)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::InvalidEndpoint(_)));
    }

    #[tokio::test]
    async fn test_refused_connection_is_unreachable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = BackendClient::new(&TimeoutConfig::default());
        let endpoint = Url::parse(&format!("http://{}/x", addr)).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        let err = client
            .post(&endpoint, "application/json", Body::empty(), None, deadline)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::BackendUnreachable(_)));
    }
}
