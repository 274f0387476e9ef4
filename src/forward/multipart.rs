//! Streaming multipart relay.
//!
//! # Responsibilities
//! - Re-frame uploaded parts as a fresh `multipart/form-data` body
//! - Append the event envelope as a final `__event__` part
//! - Pull part bytes chunk by chunk so uploads are never held in memory
//!
//! # Design Decisions
//! - Parts come from a `FileSource`: the inbound multipart stream in
//!   production, in-memory files in tests
//! - The gateway always generates its own boundary

use std::collections::VecDeque;

use async_stream::try_stream;
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::Stream;

use crate::error::GatewayError;
use crate::forward::envelope::EventEnvelope;

/// Reserved part name carrying the event envelope.
pub const EVENT_PART_NAME: &str = "__event__";
pub const EVENT_PART_FILENAME: &str = "event.json";

/// Header of one relayed part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartHeader {
    pub name: String,
    /// Client-side file name; `None` for plain form fields.
    pub upload_name: Option<String>,
    pub content_type: Option<String>,
}

/// A sequence of parts whose bodies are read incrementally.
#[async_trait]
pub trait FileSource: Send {
    /// Advance to the next part. Unread bytes of the current part are skipped.
    async fn next_part(&mut self) -> Result<Option<PartHeader>, GatewayError>;

    /// Next chunk of the current part, `None` at its end.
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, GatewayError>;
}

/// Parts held in memory.
#[derive(Debug, Default)]
pub struct MemoryFiles {
    parts: VecDeque<(PartHeader, Vec<Bytes>)>,
    current: VecDeque<Bytes>,
}

impl MemoryFiles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a part whose body is delivered as the given chunks.
    pub fn push(&mut self, header: PartHeader, chunks: Vec<Bytes>) {
        self.parts.push_back((header, chunks));
    }
}

#[async_trait]
impl FileSource for MemoryFiles {
    async fn next_part(&mut self) -> Result<Option<PartHeader>, GatewayError> {
        Ok(self.parts.pop_front().map(|(header, chunks)| {
            self.current = chunks.into();
            header
        }))
    }

    async fn next_chunk(&mut self) -> Result<Option<Bytes>, GatewayError> {
        Ok(self.current.pop_front())
    }
}

/// Parts streamed out of an inbound multipart request.
pub struct MulterFiles {
    multipart: multer::Multipart<'static>,
    field: Option<multer::Field<'static>>,
}

impl MulterFiles {
    pub fn new(multipart: multer::Multipart<'static>) -> Self {
        Self {
            multipart,
            field: None,
        }
    }
}

#[async_trait]
impl FileSource for MulterFiles {
    async fn next_part(&mut self) -> Result<Option<PartHeader>, GatewayError> {
        // A field must be dropped before multer hands out the next one.
        self.field = None;
        let Some(field) = self.multipart.next_field().await? else {
            return Ok(None);
        };
        let header = PartHeader {
            name: field.name().unwrap_or_default().to_string(),
            upload_name: field.file_name().map(str::to_string),
            content_type: field.content_type().map(|m| m.to_string()),
        };
        self.field = Some(field);
        Ok(Some(header))
    }

    async fn next_chunk(&mut self) -> Result<Option<Bytes>, GatewayError> {
        match self.field.as_mut() {
            Some(field) => Ok(field.chunk().await?),
            None => Ok(None),
        }
    }
}

/// A new random boundary: 32 lowercase hex characters.
pub fn new_boundary() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Content type of a relayed body.
pub fn content_type(boundary: &str) -> String {
    format!("multipart/form-data; boundary={}", boundary)
}

/// Relay every part of `source`, followed by the envelope part and the
/// closing delimiter.
///
/// The first part header is read before the stream is returned, so an
/// inbound body that is not multipart at all fails here rather than after
/// the backend request has started.
pub async fn relay<S>(
    mut source: S,
    envelope: &EventEnvelope,
    boundary: String,
) -> Result<impl Stream<Item = Result<Bytes, GatewayError>> + Send + 'static, GatewayError>
where
    S: FileSource + 'static,
{
    let event = Bytes::from(envelope.to_json()?);
    let event_header = PartHeader {
        name: EVENT_PART_NAME.to_string(),
        upload_name: Some(EVENT_PART_FILENAME.to_string()),
        content_type: Some("application/json".to_string()),
    };
    let first = source.next_part().await?;

    Ok(try_stream! {
        let mut relayed = 0usize;
        let mut next = first;
        while let Some(part) = next {
            if part.name == EVENT_PART_NAME {
                tracing::warn!("Client sent a part with the reserved event name, relaying it anyway");
            }
            yield Bytes::from(part_head(&boundary, &part));
            while let Some(chunk) = source.next_chunk().await? {
                relayed += chunk.len();
                yield chunk;
            }
            yield Bytes::from_static(b"\r\n");
            next = source.next_part().await?;
        }
        tracing::debug!(bytes = relayed, "Relayed upload parts");

        yield Bytes::from(part_head(&boundary, &event_header));
        yield event;
        yield Bytes::from(format!("\r\n--{}--\r\n", boundary));
    })
}

fn part_head(boundary: &str, part: &PartHeader) -> String {
    let mut head = format!(
        "--{}\r\nContent-Disposition: form-data; name=\"{}\"",
        boundary,
        quote(&part.name)
    );
    if let Some(upload_name) = &part.upload_name {
        head.push_str(&format!("; filename=\"{}\"", quote(upload_name)));
    }
    head.push_str("\r\n");
    if let Some(content_type) = &part.content_type {
        head.push_str(&format!("Content-Type: {}\r\n", content_type));
    }
    head.push_str("\r\n");
    head
}

/// Escape a value for a quoted `Content-Disposition` parameter.
fn quote(value: &str) -> String {
    value
        .replace('"', "%22")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}
