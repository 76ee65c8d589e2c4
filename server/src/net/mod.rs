//! Network surface of the session layer: accept loop, HTTP head
//! handling, and the per-connection WebSocket lifecycle.

pub mod connection;
pub mod http;
pub mod listener;
