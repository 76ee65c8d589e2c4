//! Minimal HTTP layer of the session port.
//!
//! DESIGN
//! ======
//! Every TCP connection starts with one HTTP request head. This module
//! reads and parses it, computes the RFC 6455 accept key for upgrades,
//! and writes raw HTTP responses for the non-WebSocket paths (static
//! images, errors). A client may pipe frames straight behind its
//! handshake, so bytes that arrive after the head are preserved in
//! `leftover` and seed the frame decoder.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use sha1::{Digest, Sha1};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// GUID every WebSocket accept key is derived from (RFC 6455 §1.3).
pub const WEBSOCKET_MAGIC: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Upper bound on a request head; anything larger is a bad request.
const MAX_HEAD_LEN: usize = 16 * 1024;

// =============================================================================
// REQUEST HEAD
// =============================================================================

/// Parsed request line and headers of one HTTP request.
#[derive(Debug)]
pub struct RequestHead {
    pub method: String,
    pub target: String,
    headers: Vec<(String, String)>,
    /// Bytes read past the end of the head.
    pub leftover: Vec<u8>,
}

impl RequestHead {
    /// Case-insensitive header lookup.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Whether this request asks for a WebSocket upgrade with a key.
    #[must_use]
    pub fn is_websocket_upgrade(&self) -> bool {
        self.header("upgrade")
            .is_some_and(|v| v.to_ascii_lowercase().contains("websocket"))
            && self.header("sec-websocket-key").is_some()
    }

    /// Request path without the query string.
    #[must_use]
    pub fn path(&self) -> &str {
        self.target.split('?').next().unwrap_or(&self.target)
    }
}

/// Read one request head from the stream. Returns `None` for a closed,
/// empty, oversized or malformed head; callers answer 400 and close.
///
/// # Errors
///
/// Propagates socket read errors.
pub async fn read_head<S>(stream: &mut S) -> std::io::Result<Option<RequestHead>>
where
    S: AsyncRead + Unpin,
{
    let mut buf: Vec<u8> = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];

    loop {
        if let Some(end) = find_head_end(&buf) {
            let leftover = buf[end..].to_vec();
            return Ok(parse_head(&buf[..end], leftover));
        }
        if buf.len() > MAX_HEAD_LEN {
            return Ok(None);
        }
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(None);
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|pos| pos + 4)
}

fn parse_head(head: &[u8], leftover: Vec<u8>) -> Option<RequestHead> {
    let text = std::str::from_utf8(head).ok()?;
    let mut lines = text.split("\r\n");

    let request_line = lines.next()?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next()?.to_owned();
    let target = parts.next()?.to_owned();

    let mut headers = Vec::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        headers.push((name.trim().to_owned(), value.trim().to_owned()));
    }

    Some(RequestHead { method, target, headers, leftover })
}

// =============================================================================
// HANDSHAKE
// =============================================================================

/// `base64(sha1(key || magic))` per RFC 6455 §4.2.2.
#[must_use]
pub fn compute_accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WEBSOCKET_MAGIC.as_bytes());
    BASE64.encode(hasher.finalize())
}

/// The 101 Switching Protocols response completing the upgrade.
#[must_use]
pub fn handshake_response(accept_key: &str) -> String {
    format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {accept_key}\r\n\
         Access-Control-Allow-Origin: *\r\n\r\n"
    )
}

// =============================================================================
// RESPONSES
// =============================================================================

/// Write a full HTTP response with CORS and close-oriented framing.
///
/// # Errors
///
/// Propagates socket write errors.
pub async fn write_response<S>(
    stream: &mut S,
    status: u16,
    reason: &str,
    content_type: &str,
    body: &[u8],
    extra_headers: &[(&str, &str)],
) -> std::io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    let mut head = format!(
        "HTTP/1.1 {status} {reason}\r\n\
         Content-Type: {content_type}\r\n\
         Content-Length: {}\r\n\
         Access-Control-Allow-Origin: *\r\n",
        body.len()
    );
    for (name, value) in extra_headers {
        head.push_str(name);
        head.push_str(": ");
        head.push_str(value);
        head.push_str("\r\n");
    }
    head.push_str("\r\n");

    stream.write_all(head.as_bytes()).await?;
    stream.write_all(body).await?;
    stream.flush().await
}

/// Plain-text error response, body matching the reason phrase.
///
/// # Errors
///
/// Propagates socket write errors.
pub async fn write_error<S>(stream: &mut S, status: u16, reason: &str) -> std::io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    write_response(stream, status, reason, "text/plain", reason.as_bytes(), &[]).await
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[path = "http_test.rs"]
mod tests;
