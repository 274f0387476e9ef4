//! Backend response stream decoder.
//!
//! # Responsibilities
//! - Pick passthrough or instruction mode once, from the response headers
//! - Reassemble newline-delimited instruction lines across chunk boundaries
//! - Report truncated streams at end of input
//!
//! # Design Decisions
//! - One decoder per backend round-trip; state is never shared
//! - Lines are parsed lazily, so a `finish` instruction leaves the rest unparsed
//! - Passthrough chunks are handed back untouched, never buffered

use bytes::{Buf, Bytes, BytesMut};

use crate::protocol::instruction::StreamInstruction;
use crate::protocol::ProtocolError;

/// Decoder mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// No response headers seen yet.
    HeaderSniff,
    /// Body bytes are forwarded to the client verbatim.
    Passthrough,
    /// Body bytes are newline-delimited JSON instructions.
    Instruction,
}

/// Result of feeding one body chunk.
pub enum Feed<'a> {
    Passthrough(Bytes),
    Instructions(Instructions<'a>),
}

/// Per-request decoding state.
#[derive(Debug)]
pub struct ResponseStreamDecoder {
    mode: Mode,
    media_type: String,
    buffer: BytesMut,
    /// Bytes of `buffer` already scanned without finding a newline.
    scanned: usize,
}

impl ResponseStreamDecoder {
    pub fn new(instruction_media_type: impl Into<String>) -> Self {
        Self {
            mode: Mode::HeaderSniff,
            media_type: instruction_media_type.into().to_ascii_lowercase(),
            buffer: BytesMut::new(),
            scanned: 0,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Select the mode from the backend's `Content-Type`. Only the first call
    /// has an effect.
    ///
    /// A content type that does not start with the instruction media type
    /// selects passthrough; an instruction media type or no content type at
    /// all selects instruction mode.
    pub fn on_headers(&mut self, content_type: Option<&str>) -> Mode {
        if self.mode != Mode::HeaderSniff {
            return self.mode;
        }
        self.mode = match content_type {
            Some(ct) if !ct.trim_start().to_ascii_lowercase().starts_with(&self.media_type) => {
                Mode::Passthrough
            }
            _ => Mode::Instruction,
        };
        self.mode
    }

    /// Feed one body chunk.
    ///
    /// In instruction mode the returned iterator yields every instruction
    /// completed so far; bytes after the last newline stay buffered for the
    /// next chunk. Dropping the iterator early leaves unread lines buffered.
    pub fn feed(&mut self, chunk: Bytes) -> Feed<'_> {
        if self.mode == Mode::HeaderSniff {
            self.mode = Mode::Instruction;
        }
        match self.mode {
            Mode::Passthrough => Feed::Passthrough(chunk),
            _ => {
                self.buffer.extend_from_slice(&chunk);
                Feed::Instructions(Instructions { decoder: self })
            }
        }
    }

    /// Number of bytes buffered but not yet decoded.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Signal end of the backend stream. Leftover bytes mean the backend
    /// closed in the middle of an instruction.
    pub fn finish(self) -> Result<(), ProtocolError> {
        if self.mode == Mode::Instruction && !self.buffer.is_empty() {
            return Err(ProtocolError::TruncatedStream(self.buffer.len()));
        }
        Ok(())
    }

    fn next_line(&mut self) -> Option<Bytes> {
        let pos = self.buffer[self.scanned..].iter().position(|b| *b == b'\n');
        match pos {
            Some(offset) => {
                let end = self.scanned + offset;
                let line = self.buffer.split_to(end).freeze();
                self.buffer.advance(1);
                self.scanned = 0;
                Some(line)
            }
            None => {
                self.scanned = self.buffer.len();
                None
            }
        }
    }
}

/// Iterator over the instructions completed by the last fed chunk.
pub struct Instructions<'a> {
    decoder: &'a mut ResponseStreamDecoder,
}

impl Iterator for Instructions<'_> {
    type Item = Result<StreamInstruction, ProtocolError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = self.decoder.next_line()?;
            // Blank keep-alive lines carry no instruction.
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            return Some(StreamInstruction::from_line(&line));
        }
    }
}
