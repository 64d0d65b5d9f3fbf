//! Event types for the host layer.
//!
//! This module defines the types surfaced to the owner of a transport:
//! - `ConnectionEvent`: Emitted by the transport manager as socket connections change state
//! - `TransportEvent`: Returned by the client/server adapter's poll loop

use peerlink_core::id::{PeerId, SocketName};

/// Socket connection state changes surfaced by the transport manager.
/// Pushed through the manager's event channel, drained with `recv_event`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// A remote peer opened its side; open the local side to accept or close it to reject.
    IncomingRequest {
        /// Requesting peer
        peer: PeerId,
        /// Requested socket
        socket_name: SocketName,
    },
    /// Both sides have opened the connection. Emitted at most once per connection.
    Opened {
        /// Remote peer
        peer: PeerId,
        /// Opened socket
        socket_name: SocketName,
    },
    /// The connection was closed. Emitted at most once per connection, and only after
    /// `Opened` unless the close was forced.
    Closed {
        /// Remote peer
        peer: PeerId,
        /// Closed socket
        socket_name: SocketName,
    },
}

impl ConnectionEvent {
    /// Returns the remote peer the event is about.
    pub fn peer(&self) -> &PeerId {
        match self {
            ConnectionEvent::IncomingRequest { peer, .. }
            | ConnectionEvent::Opened { peer, .. }
            | ConnectionEvent::Closed { peer, .. } => peer,
        }
    }

    /// Returns the socket the event is about.
    pub fn socket_name(&self) -> &SocketName {
        match self {
            ConnectionEvent::IncomingRequest { socket_name, .. }
            | ConnectionEvent::Opened { socket_name, .. }
            | ConnectionEvent::Closed { socket_name, .. } => socket_name,
        }
    }
}

/// Events returned by [`crate::P2PTransport::poll_event`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    /// A client (or, on a client, the server) connected.
    Connect(u64),
    /// A client (or, on a client, the server) disconnected.
    Disconnect(u64),
    /// A payload was received from the given client id.
    Data(u64, Vec<u8>),
    /// Nothing to report.
    Nothing,
}
