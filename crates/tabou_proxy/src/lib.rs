//! Forwarding proxy pipeline for one client connection:
//! read request → pick upstream → forward request → relay response.

use tabou_config::{ConfigError, ParentProxy, ProxyConfig};
use tabou_http::{read_request, responses::send_500, LineReader};
use tokio::{
    io::{AsyncRead, AsyncWrite, BufWriter},
    time::Duration,
};
use tracing::{debug, info, instrument};

mod error;
pub mod forward;
pub mod response;
mod state;
pub mod upstream;

pub use error::{RelayError, UpstreamConnectError};
pub use forward::{ForwardMode, OutboundRequest};
pub use state::ConnState;
pub use upstream::UpstreamTarget;

/// Read-only settings shared by every connection.
#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub parent: Option<ParentProxy>,
    pub read_timeout: Duration,
    pub connect_timeout: Duration,
    pub max_line_bytes: usize,
}

impl RelaySettings {
    pub fn from_config(cfg: &ProxyConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            parent: cfg.parent_proxy()?,
            read_timeout: Duration::from_secs(cfg.http.read_timeout_secs),
            connect_timeout: Duration::from_secs(cfg.http.connect_timeout_secs),
            max_line_bytes: cfg.http.max_line_bytes,
        })
    }

    pub fn mode(&self) -> ForwardMode {
        if self.parent.is_some() {
            ForwardMode::Parent
        } else {
            ForwardMode::Direct
        }
    }
}

/// Serves one request on an accepted connection.
///
/// Parse and upstream-connect failures are answered with a synthetic
/// `HTTP/1.0 500`; failures after the request went upstream just end the
/// connection. Returns the final state (`Closed`) or the error that moved
/// the connection to `Errored`. Sockets are dropped on return either way.
#[instrument(skip_all, fields(mode = ?settings.mode()))]
pub async fn relay<R, W>(
    client_rd: R,
    client_wr: W,
    settings: &RelaySettings,
) -> Result<ConnState, RelayError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut state = ConnState::Accepted;
    let mut client =
        LineReader::new(client_rd, settings.read_timeout).with_max_line(settings.max_line_bytes);
    let mut client_out = BufWriter::new(client_wr);

    match relay_stages(&mut state, &mut client, &mut client_out, settings).await {
        Ok(()) => {
            state.advance(ConnState::Closed);
            Ok(state)
        }
        Err(err) => {
            let from = state;
            state.advance(ConnState::Errored);
            debug!(target: "tabou::proxy", %from, error = %err, "Relay failed");

            if err.reports_to_client()
                && let Err(e) = send_500(&mut client_out, &err.to_string()).await
            {
                debug!(target: "tabou::proxy", error = ?e, "Could not deliver error response");
            }
            Err(err)
        }
    }
}

async fn relay_stages<R, W>(
    state: &mut ConnState,
    client: &mut LineReader<R>,
    client_out: &mut W,
    settings: &RelaySettings,
) -> Result<(), RelayError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    // 1) request line + header block
    let Some(request) = read_request(client).await? else {
        debug!(target: "tabou::proxy", "Client closed without sending a request");
        return Ok(());
    };
    state.advance(ConnState::RequestParsed);

    // 2) where to, and the rewritten head (validates Content-Length)
    let target = upstream::select_upstream(request.line(), settings.parent.as_ref())?;
    let outbound = OutboundRequest::prepare(&request, settings.mode())?;

    info!(
        target: "tabou::proxy",
        method = %request.line().method(),
        url = %request.line().target_text(),
        upstream = %target,
        "Forwarding request"
    );

    let upstream_stream = upstream::connect(&target, settings.connect_timeout).await?;
    state.advance(ConnState::UpstreamConnected);

    let (upstream_rd, upstream_wr) = upstream_stream.into_split();
    let mut upstream_out = BufWriter::new(upstream_wr);

    // 3) head + Content-Length body
    let body = outbound.send(client, &mut upstream_out).await?;
    state.advance(ConnState::RequestSent);
    debug!(target: "tabou::proxy", body_bytes = body, "Request sent upstream");

    // 4) verbatim response
    let mut upstream_in = LineReader::new(upstream_rd, settings.read_timeout);
    response::relay_response(&mut upstream_in, client_out).await?;
    state.advance(ConnState::ResponseRelayed);

    Ok(())
}
