//! Session port accept loop.

use tokio::net::TcpListener;
use tracing::{error, info};

use crate::net::connection;
use crate::state::AppState;

/// Bind the configured session port and serve forever.
///
/// # Errors
///
/// Returns an error only if the bind fails; accept errors are logged
/// and survived.
pub async fn run(state: AppState) -> std::io::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", state.config.ws_port)).await?;
    info!(port = state.config.ws_port, "session listener ready");
    serve(listener, state).await;
    Ok(())
}

/// Accept loop over an already-bound listener. Each connection gets its
/// own task; a failed accept never takes the server down.
pub async fn serve(listener: TcpListener, state: AppState) {
    loop {
        match listener.accept().await {
            Ok((socket, peer)) => {
                let _ = socket.set_nodelay(true);
                let state = state.clone();
                tokio::spawn(async move {
                    connection::handle(socket, peer, state).await;
                });
            }
            Err(e) => {
                error!(error = %e, "failed to accept connection");
            }
        }
    }
}
