use std::io;
use std::net::SocketAddr;

use thiserror::Error;

use super::protocol::{ParseError, Route};

/// Everything that can go wrong while relaying a single datagram.
///
/// None of these are fatal: the listener that hit one logs it and moves on
/// to the next datagram.
#[derive(Debug, Error)]
pub enum HubError {
    /// Inbound datagram could not be decoded
    #[error("malformed datagram: {0}")]
    Parse(#[from] ParseError),

    #[error("failed to encode outbound message: {0}")]
    Encode(#[from] serde_json::Error),

    /// Outbound datagram could not be handed to the network
    #[error("send to {route} sink at {addr} failed: {source}")]
    Send {
        route: Route,
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// Acknowledgment arrived while no emergency is recorded
    #[error("acknowledgment from {responder} has no active emergency to correlate")]
    NoActiveEmergency { responder: String },
}
