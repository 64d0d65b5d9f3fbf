//! Transport abstraction for the underlying P2P messaging primitive.

use std::fmt;

use crossbeam_channel::Sender;

use crate::{
    constants::DEFAULT_MAX_PACKET_SIZE,
    error::P2PError,
    id::{PeerId, SocketName},
};

/// Reliability class requested for a datagram.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
pub enum PacketReliability {
    /// May be dropped or reordered.
    UnreliableUnordered = 0,
    /// Will be delivered, in any order.
    ReliableUnordered = 1,
    /// Will be delivered in the order it was sent.
    #[default]
    ReliableOrdered = 2,
}

impl TryFrom<u8> for PacketReliability {
    type Error = P2PError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(PacketReliability::UnreliableUnordered),
            1 => Ok(PacketReliability::ReliableUnordered),
            2 => Ok(PacketReliability::ReliableOrdered),
            _ => Err(P2PError::InvalidParameters),
        }
    }
}

/// NAT classification reported by the primitive. Informational only.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum NatType {
    /// Not determined yet.
    #[default]
    Unknown,
    /// All peers can connect directly.
    Open,
    /// Peers behind a strict NAT may need a relay.
    Moderate,
    /// Most connections need a relay.
    Strict,
}

impl fmt::Display for NatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NatType::Unknown => "Unknown",
            NatType::Open => "Open",
            NatType::Moderate => "Moderate",
            NatType::Strict => "Strict",
        };
        f.write_str(name)
    }
}

/// Why the primitive closed a connection.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum ConnectionClosedReason {
    /// No reason given, typically during shutdown.
    #[default]
    Unknown,
    /// Closed by the local user.
    ClosedByLocalUser,
    /// Gracefully closed by the remote user.
    ClosedByPeer,
    /// Locally accepted but never accepted by the remote in time.
    TimedOut,
    /// Too many other connections exist.
    TooManyConnections,
    /// The remote sent an invalid message.
    InvalidMessage,
    /// The remote sent invalid data.
    InvalidData,
    /// A connection could never be established.
    ConnectionFailed,
    /// The peer silently went away.
    ConnectionClosed,
    /// Negotiation with the remote failed.
    NegotiationFailed,
    /// Internal error inside the primitive.
    UnexpectedError,
}

/// Notifications pushed by the primitive to subscribed listeners.
///
/// Socket names are delivered raw; the receiver validates them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PeerNotification {
    /// A remote user asked to open a socket connection with the local user.
    ConnectionRequested {
        /// The local user the request is addressed to
        local: PeerId,
        /// The requesting remote user
        remote: PeerId,
        /// Socket the request is for
        socket_name: String,
    },
    /// A socket connection with a remote user was closed.
    ConnectionClosed {
        /// The local user the connection belonged to
        local: PeerId,
        /// The remote user of the closed connection
        remote: PeerId,
        /// Socket of the closed connection
        socket_name: String,
        /// Why it was closed
        reason: ConnectionClosedReason,
    },
}

/// Handle returned by a notification subscription.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct NotificationId(pub u64);

impl NotificationId {
    /// Id that never refers to an active subscription.
    pub const INVALID: NotificationId = NotificationId(0);
}

/// Everything the primitive needs to send a single datagram.
#[derive(Clone, Debug)]
pub struct OutgoingDatagram<'a> {
    /// Sending user
    pub local: &'a PeerId,
    /// Receiving user
    pub remote: &'a PeerId,
    /// Socket the datagram travels on
    pub socket_name: &'a SocketName,
    /// Channel number
    pub channel: u8,
    /// Reliability class
    pub reliability: PacketReliability,
    /// Allow queueing until the connection is established
    pub allow_delayed_delivery: bool,
    /// Datagram bytes, at most `max_packet_size`
    pub data: &'a [u8],
}

/// Metadata of a datagram pulled from the primitive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IncomingDatagram {
    /// Sending user
    pub remote: PeerId,
    /// Socket the datagram arrived on, unvalidated
    pub socket_name: String,
    /// Channel number
    pub channel: u8,
}

/// Low-level P2P messaging primitive.
///
/// This trait lets various implementations (a vendor SDK binding, an in-memory
/// network for tests) be plugged into the transport manager. All calls are
/// non-blocking.
pub trait P2PInterface {
    /// Largest datagram accepted by `send_packet`.
    fn max_packet_size(&self) -> usize {
        DEFAULT_MAX_PACKET_SIZE
    }

    /// Sends one datagram.
    fn send_packet(&mut self, datagram: OutgoingDatagram<'_>) -> Result<(), P2PError>;

    /// Returns the size of the next pending datagram, if any.
    fn next_received_packet_size(
        &mut self,
        local: &PeerId,
        requested_channel: Option<u8>,
    ) -> Option<usize>;

    /// Receives one datagram into `buffer`.
    ///
    /// Returns `Err(P2PError::NotFound)` when nothing is pending.
    fn receive_packet<'a>(
        &mut self,
        local: &PeerId,
        buffer: &'a mut [u8],
        requested_channel: Option<u8>,
    ) -> Result<(IncomingDatagram, &'a [u8]), P2PError>;

    /// Requests a connection, or accepts a pending request from `remote`.
    fn accept_connection(
        &mut self,
        local: &PeerId,
        remote: &PeerId,
        socket_name: &SocketName,
    ) -> Result<(), P2PError>;

    /// Closes (cancels or rejects) a connection.
    fn close_connection(
        &mut self,
        local: &PeerId,
        remote: &PeerId,
        socket_name: &SocketName,
    ) -> Result<(), P2PError>;

    /// Subscribes to incoming connection requests, optionally for one socket only.
    fn add_notify_peer_connection_request(
        &mut self,
        local: &PeerId,
        socket_name: Option<&SocketName>,
        sender: Sender<PeerNotification>,
    ) -> NotificationId;

    /// Cancels a connection request subscription.
    fn remove_notify_peer_connection_request(&mut self, id: NotificationId);

    /// Subscribes to connection closures, optionally for one socket only.
    fn add_notify_peer_connection_closed(
        &mut self,
        local: &PeerId,
        socket_name: Option<&SocketName>,
        sender: Sender<PeerNotification>,
    ) -> NotificationId;

    /// Cancels a connection closed subscription.
    fn remove_notify_peer_connection_closed(&mut self, id: NotificationId);

    /// Asks the primitive to determine the local NAT type.
    fn query_nat_type(&mut self) -> Result<NatType, P2PError>;

    /// Returns the last NAT type determined by `query_nat_type`.
    fn nat_type(&self) -> Result<NatType, P2PError>;
}

/// Resolves the id of the local user.
pub trait LocalIdentity {
    /// Returns the local user id, if one is logged in.
    fn local_user_id(&self) -> Option<PeerId>;
}

impl LocalIdentity for PeerId {
    fn local_user_id(&self) -> Option<PeerId> {
        Some(self.clone())
    }
}

impl<T: LocalIdentity + ?Sized> LocalIdentity for &T {
    fn local_user_id(&self) -> Option<PeerId> {
        (**self).local_user_id()
    }
}
