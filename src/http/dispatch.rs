//! Applies backend instructions to the live client response.
//!
//! # Responsibilities
//! - Translate each `StreamInstruction` into a mutation of the `ResponseWriter`
//! - Sign cookies marked `secure` with the gateway cookie secret
//! - Tell the caller when the request is finished
//!
//! # Design Decisions
//! - Instructions are applied strictly in the order the backend sent them
//! - `redirect` and `finish` end the request; anything after them is ignored
//! - Invalid values (bad status code, bad header) fail the request

use std::sync::Arc;

use axum::http::header::{HeaderName, CONTENT_TYPE, LOCATION, SET_COOKIE};
use axum::http::{HeaderValue, StatusCode};
use bytes::Bytes;
use chrono::Utc;

use crate::error::GatewayError;
use crate::http::cookies::{CookieSigner, SetCookie};
use crate::http::writer::ResponseWriter;
use crate::observability::metrics;
use crate::protocol::instruction::{redirect_target, write_text};
use crate::protocol::{ProtocolError, StreamInstruction};

const JSON_CONTENT_TYPE: &str = "application/json; charset=UTF-8";

/// Whether the request continues after an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Finish,
}

/// Per-request instruction interpreter.
pub struct InstructionDispatcher {
    writer: ResponseWriter,
    /// Cookie names the client sent, for `clear_all_cookie`.
    request_cookies: Vec<String>,
    signer: Arc<CookieSigner>,
}

impl InstructionDispatcher {
    pub fn new(writer: ResponseWriter, request_cookies: Vec<String>, signer: Arc<CookieSigner>) -> Self {
        Self {
            writer,
            request_cookies,
            signer,
        }
    }

    pub fn writer_mut(&mut self) -> &mut ResponseWriter {
        &mut self.writer
    }

    /// Forward one passthrough chunk to the client immediately.
    pub async fn passthrough(&mut self, chunk: Bytes) -> Result<(), GatewayError> {
        self.writer.write(&chunk);
        self.writer.flush().await
    }

    /// Apply one instruction.
    pub async fn apply(&mut self, instruction: StreamInstruction) -> Result<Flow, GatewayError> {
        metrics::record_instruction(instruction.command());
        tracing::trace!(command = instruction.command(), "Applying instruction");

        match instruction {
            StreamInstruction::Write { content, flush } => {
                self.writer.write(write_text(&content).as_bytes());
                if flush {
                    self.writer.flush().await?;
                }
            }
            StreamInstruction::WriteJson { content } => {
                self.writer
                    .set_header(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
                self.writer.write(content.to_string().as_bytes());
                self.writer.flush().await?;
            }
            StreamInstruction::SetStatus { code } => {
                let status = StatusCode::from_u16(code)
                    .map_err(|_| ProtocolError::InvalidValue(format!("status code {}", code)))?;
                self.writer.set_status(status);
            }
            StreamInstruction::SetHeader { key, value } => {
                let (name, value) = header_pair(&key, &value)?;
                self.writer.set_header(name, value);
            }
            StreamInstruction::SetCookie(spec) => {
                let cookie = SetCookie::from_spec(&spec, &self.signer, Utc::now())?;
                self.append_cookie(&cookie)?;
            }
            StreamInstruction::ClearCookie { name, domain, path } => {
                let cookie = SetCookie::expired(&name, domain.as_deref(), path.as_deref(), Utc::now())?;
                self.append_cookie(&cookie)?;
            }
            StreamInstruction::ClearAllCookies { domain, path } => {
                let now = Utc::now();
                let names = std::mem::take(&mut self.request_cookies);
                for name in &names {
                    let cookie = SetCookie::expired(name, domain.as_deref(), path.as_deref(), now)?;
                    self.append_cookie(&cookie)?;
                }
                self.request_cookies = names;
            }
            StreamInstruction::Flush => self.writer.flush().await?,
            StreamInstruction::Redirect { url, query, permanent } => {
                let target = redirect_target(&url, query.as_ref());
                let location = HeaderValue::from_str(&target)
                    .map_err(|_| ProtocolError::InvalidValue(format!("redirect target {:?}", target)))?;
                self.writer.set_status(if permanent {
                    StatusCode::MOVED_PERMANENTLY
                } else {
                    StatusCode::FOUND
                });
                self.writer.set_header(LOCATION, location);
                self.writer.finish().await?;
                return Ok(Flow::Finish);
            }
            StreamInstruction::Finish => {
                self.writer.finish().await?;
                return Ok(Flow::Finish);
            }
        }

        Ok(Flow::Continue)
    }

    /// Complete the response after the backend stream ended.
    pub async fn finish(&mut self) -> Result<(), GatewayError> {
        self.writer.finish().await
    }

    fn append_cookie(&mut self, cookie: &SetCookie) -> Result<(), ProtocolError> {
        let value = HeaderValue::from_str(&cookie.to_header_value())
            .map_err(|_| ProtocolError::InvalidValue(format!("cookie {:?}", cookie.name)))?;
        self.writer.append_header(SET_COOKIE, value);
        Ok(())
    }
}

fn header_pair(key: &str, value: &str) -> Result<(HeaderName, HeaderValue), ProtocolError> {
    let name = HeaderName::from_bytes(key.as_bytes())
        .map_err(|_| ProtocolError::InvalidValue(format!("header name {:?}", key)))?;
    let value = HeaderValue::from_str(value)
        .map_err(|_| ProtocolError::InvalidValue(format!("header value for {}", key)))?;
    Ok((name, value))
}
