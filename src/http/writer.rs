//! Live client response.
//!
//! # Responsibilities
//! - Hold the pending status, headers and buffered body of a response
//! - Commit the head to the client on first flush, then stream body chunks
//! - Detect client disconnects so the backend fetch can be abandoned
//!
//! # Design Decisions
//! - Writes are buffered until a flush, so headers stay mutable until then
//! - A response that never flushes is sent whole, with a Content-Length
//! - Once the head is committed, status and header changes are dropped

use std::convert::Infallible;

use axum::body::Body;
use axum::http::header::{HeaderName, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::Response;
use bytes::{Bytes, BytesMut};
use tokio::sync::{mpsc, oneshot};

use crate::error::GatewayError;

/// Content type of a response until something replaces it.
pub const DEFAULT_CONTENT_TYPE: &str = "text/html; charset=UTF-8";

/// Body of a failed request.
pub const FAILURE_BODY: &str = "HTTP 500: Request execution failed\n";

const BODY_CHANNEL_CAPACITY: usize = 16;

type BodySender = mpsc::Sender<Result<Bytes, Infallible>>;

enum State {
    /// Head not yet sent; the handler is waiting on the receiver.
    Pending(oneshot::Sender<Response>),
    /// Head sent; body chunks flow through the channel.
    Streaming(BodySender),
    Finished,
}

/// The client-facing side of one request.
pub struct ResponseWriter {
    status: StatusCode,
    headers: HeaderMap,
    buffer: BytesMut,
    state: State,
}

impl ResponseWriter {
    pub fn new(head: oneshot::Sender<Response>) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(DEFAULT_CONTENT_TYPE));
        Self {
            status: StatusCode::OK,
            headers,
            buffer: BytesMut::new(),
            state: State::Pending(head),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Whether status and headers have already been sent.
    pub fn is_committed(&self) -> bool {
        !matches!(self.state, State::Pending(_))
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.state, State::Finished)
    }

    pub fn set_status(&mut self, status: StatusCode) {
        if self.is_committed() {
            tracing::warn!(status = %status, "Status set after response head was sent, ignoring");
            return;
        }
        self.status = status;
    }

    /// Replace a header.
    pub fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        if self.is_committed() {
            tracing::warn!(header = %name, "Header set after response head was sent, ignoring");
            return;
        }
        self.headers.insert(name, value);
    }

    /// Add a header value without replacing existing ones (Set-Cookie).
    pub fn append_header(&mut self, name: HeaderName, value: HeaderValue) {
        if self.is_committed() {
            tracing::warn!(header = %name, "Header added after response head was sent, ignoring");
            return;
        }
        self.headers.append(name, value);
    }

    /// Buffer body bytes until the next flush or finish.
    pub fn write(&mut self, bytes: &[u8]) {
        if self.is_finished() {
            return;
        }
        self.buffer.extend_from_slice(bytes);
    }

    /// Send the head if needed, then any buffered body bytes.
    pub async fn flush(&mut self) -> Result<(), GatewayError> {
        if let State::Pending(_) = self.state {
            let (tx, rx) = mpsc::channel(BODY_CHANNEL_CAPACITY);
            let body = Body::from_stream(futures_util::stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|chunk| (chunk, rx))
            }));
            self.send_head(body)?;
            self.state = State::Streaming(tx);
        }

        if self.buffer.is_empty() {
            return Ok(());
        }
        let chunk = self.buffer.split().freeze();
        match &self.state {
            State::Streaming(tx) => tx.send(Ok(chunk)).await.map_err(|_| GatewayError::ClientGone),
            _ => Ok(()),
        }
    }

    /// Complete the response. Unflushed responses are sent in one piece.
    pub async fn finish(&mut self) -> Result<(), GatewayError> {
        match self.state {
            State::Finished => return Ok(()),
            State::Pending(_) => {
                let body = Body::from(self.buffer.split().freeze());
                self.send_head(body)?;
            }
            State::Streaming(_) => self.flush().await?,
        }
        // Dropping the sender ends the client body.
        self.state = State::Finished;
        Ok(())
    }

    /// Terminate a failed request. Before the head is sent the client gets a
    /// plain 500; afterwards the diagnostic is appended to what was already
    /// streamed.
    pub async fn fail(&mut self) -> Result<(), GatewayError> {
        if let State::Pending(_) = self.state {
            self.status = StatusCode::INTERNAL_SERVER_ERROR;
            self.headers.clear();
            self.headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=UTF-8"));
            self.buffer.clear();
        }
        self.write(FAILURE_BODY.as_bytes());
        self.finish().await
    }

    /// Resolves once the client has gone away.
    pub async fn client_gone(&mut self) {
        match &mut self.state {
            State::Pending(head) => head.closed().await,
            State::Streaming(tx) => tx.closed().await,
            State::Finished => std::future::pending().await,
        }
    }

    fn send_head(&mut self, body: Body) -> Result<(), GatewayError> {
        let State::Pending(head) = std::mem::replace(&mut self.state, State::Finished) else {
            return Ok(());
        };
        let mut response = Response::new(body);
        *response.status_mut() = self.status;
        *response.headers_mut() = std::mem::take(&mut self.headers);
        head.send(response).map_err(|_| GatewayError::ClientGone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_text(response: Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_unflushed_response_sent_whole() {
        let (tx, rx) = oneshot::channel();
        let mut writer = ResponseWriter::new(tx);
        writer.set_status(StatusCode::CREATED);
        writer.set_header(HeaderName::from_static("x-data"), HeaderValue::from_static("v"));
        writer.write(b"hello ");
        writer.write(b"world");
        writer.finish().await.unwrap();

        let response = rx.await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()["x-data"], "v");
        assert_eq!(response.headers()[CONTENT_TYPE], DEFAULT_CONTENT_TYPE);
        assert_eq!(body_text(response).await, "hello world");
    }

    #[tokio::test]
    async fn test_flush_commits_head_and_streams() {
        let (tx, rx) = oneshot::channel();
        let mut writer = ResponseWriter::new(tx);
        writer.write(b"a");
        writer.flush().await.unwrap();
        assert!(writer.is_committed());

        let response = rx.await.unwrap();
        writer.set_status(StatusCode::NOT_FOUND);
        assert_eq!(response.status(), StatusCode::OK);

        let collector = tokio::spawn(body_text(response));
        writer.write(b"b");
        writer.flush().await.unwrap();
        writer.write(b"c");
        writer.finish().await.unwrap();
        assert_eq!(collector.await.unwrap(), "abc");
    }

    #[tokio::test]
    async fn test_fail_before_commit() {
        let (tx, rx) = oneshot::channel();
        let mut writer = ResponseWriter::new(tx);
        writer.set_status(StatusCode::CREATED);
        writer.write(b"partial");
        writer.fail().await.unwrap();

        let response = rx.await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_text(response).await, FAILURE_BODY);
    }

    #[tokio::test]
    async fn test_fail_after_commit_appends_diagnostic() {
        let (tx, rx) = oneshot::channel();
        let mut writer = ResponseWriter::new(tx);
        writer.write(b"started\n");
        writer.flush().await.unwrap();
        let response = rx.await.unwrap();
        let collector = tokio::spawn(body_text(response));

        writer.fail().await.unwrap();
        assert_eq!(collector.await.unwrap(), format!("started\n{}", FAILURE_BODY));
    }

    #[tokio::test]
    async fn test_client_gone_before_head() {
        let (tx, rx) = oneshot::channel();
        let mut writer = ResponseWriter::new(tx);
        drop(rx);
        writer.client_gone().await;
        assert!(matches!(writer.finish().await, Err(GatewayError::ClientGone)));
    }
}
