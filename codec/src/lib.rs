//! WebSocket text-frame codec for the realtime whiteboard transport.
//!
//! ARCHITECTURE
//! ============
//! This crate owns the byte-level wire format: the text-frame subset of
//! RFC 6455 that the session protocol actually uses. It is deliberately
//! free of async and I/O. The server feeds raw socket bytes into a
//! [`FrameDecoder`] and writes [`encode_text`] output back out, so every
//! framing rule is testable with plain byte slices.
//!
//! DESIGN
//! ======
//! - Client frames are masked; server frames are not (RFC 6455 §5.1).
//! - Only `FIN=1` text frames carry protocol payloads. Anything else
//!   (continuations, binary, ping/pong, close) is consumed and skipped;
//!   liveness is handled at the TCP level.
//! - Frames may arrive split across reads, and one read may carry several
//!   frames. The decoder buffers internally and yields complete payloads.

use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Text frame opcode (RFC 6455 §5.2).
const OPCODE_TEXT: u8 = 0x1;

/// FIN bit in the first header byte.
const FIN_BIT: u8 = 0x80;

/// MASK bit in the second header byte.
const MASK_BIT: u8 = 0x80;

/// Default cap on a single frame payload. A whiteboard envelope is a few
/// hundred bytes; anything near this size is a broken or hostile peer.
pub const DEFAULT_MAX_PAYLOAD: usize = 1024 * 1024;

// =============================================================================
// ERRORS
// =============================================================================

/// Error raised while decoding inbound frames. Any of these is fatal to
/// the connection; the caller closes the socket without reply.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Declared payload length exceeds the configured cap.
    #[error("frame payload of {len} bytes exceeds limit of {limit}")]
    PayloadTooLarge { len: u64, limit: usize },
    /// A text frame payload that is not valid UTF-8.
    #[error("frame payload is not valid UTF-8")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
}

// =============================================================================
// ENCODE
// =============================================================================

/// Wrap a UTF-8 payload in a single unmasked text frame.
///
/// Uses the shortest length encoding that fits: 7-bit for payloads under
/// 126 bytes, 16-bit up to 65535, 64-bit beyond.
#[must_use]
pub fn encode_text(payload: &str) -> Bytes {
    let data = payload.as_bytes();
    let mut buf = BytesMut::with_capacity(data.len() + 10);

    buf.put_u8(FIN_BIT | OPCODE_TEXT);

    if data.len() < 126 {
        buf.put_u8(data.len() as u8);
    } else if data.len() <= u16::MAX as usize {
        buf.put_u8(126);
        buf.put_u16(data.len() as u16);
    } else {
        buf.put_u8(127);
        buf.put_u64(data.len() as u64);
    }

    buf.put_slice(data);
    buf.freeze()
}

// =============================================================================
// DECODE
// =============================================================================

/// Outcome of one parse attempt against the buffered bytes.
enum Parsed {
    /// Not enough bytes buffered for a complete frame.
    Incomplete,
    /// A complete non-text or fragmented frame was consumed and skipped.
    Skipped,
    /// A complete text frame payload.
    Text(String),
}

/// Incremental decoder over a growable byte buffer.
///
/// Feed socket reads with [`extend`](Self::extend), then drain complete
/// text payloads with [`next_text`](Self::next_text) until it returns
/// `Ok(None)`.
pub struct FrameDecoder {
    buf: BytesMut,
    max_payload: usize,
}

impl FrameDecoder {
    #[must_use]
    pub fn new(max_payload: usize) -> Self {
        Self { buf: BytesMut::with_capacity(8 * 1024), max_payload }
    }

    /// Append raw bytes from the socket.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Number of bytes currently buffered. Exposed for backpressure checks.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Yield the next complete text payload, skipping non-text frames.
    ///
    /// Returns `Ok(None)` once the buffer holds no complete frame.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] on an oversized or non-UTF-8 payload; the
    /// decoder must not be reused afterwards.
    pub fn next_text(&mut self) -> Result<Option<String>, CodecError> {
        loop {
            match self.parse_one()? {
                Parsed::Incomplete => return Ok(None),
                Parsed::Skipped => {}
                Parsed::Text(text) => return Ok(Some(text)),
            }
        }
    }

    fn parse_one(&mut self) -> Result<Parsed, CodecError> {
        if self.buf.len() < 2 {
            return Ok(Parsed::Incomplete);
        }

        let fin = self.buf[0] & FIN_BIT != 0;
        let opcode = self.buf[0] & 0x0F;
        let masked = self.buf[1] & MASK_BIT != 0;

        // Resolve the length variant: 7-bit inline, 16-bit or 64-bit extended.
        let (header_len, payload_len) = match self.buf[1] & 0x7F {
            126 => {
                if self.buf.len() < 4 {
                    return Ok(Parsed::Incomplete);
                }
                (4, u64::from(u16::from_be_bytes([self.buf[2], self.buf[3]])))
            }
            127 => {
                if self.buf.len() < 10 {
                    return Ok(Parsed::Incomplete);
                }
                let mut bytes = [0u8; 8];
                bytes.copy_from_slice(&self.buf[2..10]);
                (10, u64::from_be_bytes(bytes))
            }
            n => (2, u64::from(n)),
        };

        if payload_len > self.max_payload as u64 {
            return Err(CodecError::PayloadTooLarge { len: payload_len, limit: self.max_payload });
        }
        let payload_len = payload_len as usize;

        let mask_len = if masked { 4 } else { 0 };
        if self.buf.len() < header_len + mask_len + payload_len {
            return Ok(Parsed::Incomplete);
        }

        // A complete frame is buffered; consume it.
        self.buf.advance(header_len);
        let key = if masked {
            let key = [self.buf[0], self.buf[1], self.buf[2], self.buf[3]];
            self.buf.advance(4);
            Some(key)
        } else {
            None
        };

        let mut payload = self.buf.split_to(payload_len).to_vec();

        if !fin || opcode != OPCODE_TEXT {
            return Ok(Parsed::Skipped);
        }

        if let Some(key) = key {
            for (i, byte) in payload.iter_mut().enumerate() {
                *byte ^= key[i % 4];
            }
        }

        Ok(Parsed::Text(String::from_utf8(payload)?))
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PAYLOAD)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;
