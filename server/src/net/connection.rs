//! Per-connection lifecycle on the session port.
//!
//! DESIGN
//! ======
//! One accepted socket is either a WebSocket upgrade, a static image GET,
//! or a 400. Upgraded sessions split into a reader (this task) and one
//! writer task draining the bounded outbound queue through the frame
//! codec. The writer is the only place that touches the socket's write
//! half, which is what makes per-connection ordering hold.
//!
//! LIFECYCLE
//! =========
//! 1. Read the request head; upgrade with the computed accept key.
//! 2. Register the connection, then loop: decode frames → dispatch →
//!    execute actions.
//! 3. On peer close, read/write failure, codec error, or queue-overflow
//!    shutdown: leave the room (announcing `userLeft`), refresh room
//!    lists, deregister, and let the writer drain out.

use std::net::SocketAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{info, warn};
use uuid::Uuid;

use crate::net::http;
use crate::services::image;
use crate::services::router::{self, ConnContext};
use crate::services::fanout;
use crate::state::{AppState, ConnectionEntry, OutboundQueue};

/// Handle one accepted socket to completion.
pub async fn handle(mut stream: TcpStream, peer: SocketAddr, state: AppState) {
    let head = match http::read_head(&mut stream).await {
        Ok(Some(head)) => head,
        Ok(None) => {
            let _ = http::write_error(&mut stream, 400, "Bad Request").await;
            return;
        }
        Err(e) => {
            warn!(%peer, error = %e, "failed reading request head");
            return;
        }
    };

    if head.is_websocket_upgrade() {
        run_session(stream, peer, head, state).await;
    } else if head.method == "GET" && head.path().starts_with("/images/") {
        serve_image(&mut stream, head.path(), &state).await;
    } else {
        let _ = http::write_error(&mut stream, 400, "Bad Request").await;
    }
}

// =============================================================================
// WEBSOCKET SESSION
// =============================================================================

async fn run_session(
    mut stream: TcpStream,
    peer: SocketAddr,
    head: http::RequestHead,
    state: AppState,
) {
    let Some(key) = head.header("sec-websocket-key") else {
        return;
    };
    let response = http::handshake_response(&http::compute_accept_key(key));
    if stream.write_all(response.as_bytes()).await.is_err() {
        return;
    }

    let conn_id = Uuid::new_v4();
    let (queue, mut outbound_rx) = OutboundQueue::new(state.config.outbound_queue_capacity);
    {
        let mut connections = state.connections.write().await;
        connections.insert(conn_id, ConnectionEntry { username: None, outbound: queue.clone() });
    }
    let mut ctx = ConnContext::new(conn_id, queue.clone());
    info!(%conn_id, %peer, "websocket session open");

    let (mut read_half, mut write_half) = stream.into_split();

    // Single writer: drains the queue in enqueue order, encodes, writes.
    let writer = tokio::spawn(async move {
        while let Some(payload) = outbound_rx.recv().await {
            let frame = codec::encode_text(&payload);
            if write_half.write_all(&frame).await.is_err() {
                break;
            }
        }
        let _ = write_half.shutdown().await;
    });

    let shutdown = queue.shutdown_signal();
    let mut decoder = codec::FrameDecoder::new(state.config.max_frame_len);
    decoder.extend(&head.leftover);
    let mut chunk = vec![0u8; 8 * 1024];

    'session: loop {
        // Drain every complete frame before blocking on the socket again.
        loop {
            match decoder.next_text() {
                Ok(Some(text)) => {
                    let actions = router::dispatch(&state, &mut ctx, &text).await;
                    fanout::execute(&state, actions).await;
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(%conn_id, error = %e, "frame decode failed; closing");
                    break 'session;
                }
            }
        }

        tokio::select! {
            result = read_half.read(&mut chunk) => match result {
                Ok(0) => break 'session,
                Ok(n) => decoder.extend(&chunk[..n]),
                Err(_) => break 'session,
            },
            () = shutdown.notified() => {
                info!(%conn_id, "connection evicted (outbound queue overflow or server close)");
                break 'session;
            }
        }
    }

    router::disconnect(&state, &ctx).await;

    // Drop the remaining queue handles so the writer sees end-of-stream,
    // flushes what it can, and closes the socket.
    drop(ctx);
    drop(queue);
    let _ = writer.await;
}

// =============================================================================
// STATIC IMAGES
// =============================================================================

/// `GET /images/<name>` on the session port: serve bytes and close.
async fn serve_image(stream: &mut TcpStream, path: &str, state: &AppState) {
    let filename = &path["/images/".len()..];

    if !image::is_safe_filename(filename) {
        let _ = http::write_error(stream, 403, "Forbidden").await;
        return;
    }

    let full_path = state.boards.images_dir().join(filename);
    let bytes = match tokio::fs::read(&full_path).await {
        Ok(bytes) => bytes,
        Err(_) => {
            let _ = http::write_error(stream, 404, "Not Found").await;
            return;
        }
    };

    let _ = http::write_response(
        stream,
        200,
        "OK",
        image::content_type_for(filename),
        &bytes,
        &[("Cache-Control", "public, max-age=3600")],
    )
    .await;
    info!(%filename, size = bytes.len(), "served static image");
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[path = "connection_test.rs"]
mod tests;
