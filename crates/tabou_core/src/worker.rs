//! Per-connection handler.
//!
//! Owns the accepted socket for its whole life: the relay runs to
//! completion or failure, then both halves are dropped and the socket
//! closes.

use std::net::SocketAddr;

use tabou_proxy::{relay, RelaySettings};
use tokio::net::TcpStream;
use tracing::{debug, info, instrument};

/// Relays one request for `client_addr`, then lets the socket close.
#[instrument(skip(stream, settings), fields(client = %client_addr))]
pub async fn handle_connection(
    stream: TcpStream,
    client_addr: SocketAddr,
    settings: &RelaySettings,
) -> anyhow::Result<()> {
    info!(target: "tabou::worker", "Handling new client connection");

    if let Err(e) = stream.set_nodelay(true) {
        debug!(target: "tabou::worker", error = ?e, "Could not set TCP_NODELAY on client socket");
    }

    let (rd, wr) = stream.into_split();
    let outcome = relay(rd, wr, settings).await;

    info!(target: "tabou::worker", "Connection closed");

    let state = outcome?;
    debug!(target: "tabou::worker", %state, "Relay finished");
    Ok(())
}
