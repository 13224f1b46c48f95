use std::fmt;

/// Where a connection is in its single request/response cycle.
///
/// Transitions only move forward. `Errored` is terminal and reachable from
/// any non-terminal state; `Closed` follows `ResponseRelayed`, or `Accepted`
/// when the client hung up without sending a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Accepted,
    RequestParsed,
    UpstreamConnected,
    RequestSent,
    ResponseRelayed,
    Closed,
    Errored,
}

impl ConnState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ConnState::Closed | ConnState::Errored)
    }

    pub fn can_advance_to(self, next: ConnState) -> bool {
        use ConnState::*;

        if self.is_terminal() {
            return false;
        }
        matches!(
            (self, next),
            (_, Errored)
                | (Accepted, RequestParsed)
                | (Accepted, Closed)
                | (RequestParsed, UpstreamConnected)
                | (UpstreamConnected, RequestSent)
                | (RequestSent, ResponseRelayed)
                | (ResponseRelayed, Closed)
        )
    }

    pub(crate) fn advance(&mut self, next: ConnState) {
        debug_assert!(
            self.can_advance_to(next),
            "illegal transition {self} -> {next}"
        );
        tracing::trace!(target: "tabou::proxy", from = %self, to = %next, "Connection state");
        *self = next;
    }
}

impl fmt::Display for ConnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnState::Accepted => "ACCEPTED",
            ConnState::RequestParsed => "REQUEST_PARSED",
            ConnState::UpstreamConnected => "UPSTREAM_CONNECTED",
            ConnState::RequestSent => "REQUEST_SENT",
            ConnState::ResponseRelayed => "RESPONSE_RELAYED",
            ConnState::Closed => "CLOSED",
            ConnState::Errored => "ERRORED",
        };
        f.write_str(s)
    }
}
