#![warn(missing_docs)]

//! Peerlink: a small public API facade for the workspace.
//!
//! This crate re-exports the types needed to run socket connections over a
//! peer-to-peer datagram primitive:
//!
//! - Transport manager and events (`TransportManager`, `ConnectionEvent`)
//! - Client/server adapter (`P2PTransport`, `TransportEvent`, `NetworkDelivery`)
//! - The primitive abstraction and an in-memory implementation (`P2PInterface`, `MemoryNetwork`)
//! - Core configuration and errors (`Config`, `ErrorKind`)
//!
//! Example
//! ```ignore
//! use peerlink::prelude::*;
//!
//! let network = MemoryNetwork::new();
//! let mut alice = TransportManager::new(network.endpoint(), Config::default());
//! let mut bob = TransportManager::new(network.endpoint(), Config::default());
//! alice.initialize(&PeerId::new("alice")).unwrap();
//! bob.initialize(&PeerId::new("bob")).unwrap();
//!
//! alice.open_connection(&PeerId::new("bob"), "Game").unwrap();
//! bob.poll();
//! bob.open_connection(&PeerId::new("alice"), "Game").unwrap();
//! // Alice consumes Bob's confirmation, Bob consumes Alice's echo
//! alice.try_receive_packet();
//! bob.try_receive_packet();
//!
//! alice
//!     .send_packet(&PeerId::new("bob"), "Game", b"hello", 0, false, PacketReliability::ReliableOrdered)
//!     .unwrap();
//! let packet = bob.try_receive_packet().unwrap();
//! assert_eq!(packet.payload(), b"hello");
//! ```

// Core config, errors and the primitive abstraction
pub use peerlink_core::{
    config::Config,
    error::{ErrorKind, P2PError, Result},
    id::{PeerId, SocketName},
    transport::{
        ConnectionClosedReason, IncomingDatagram, LocalIdentity, NatType, NotificationId,
        OutgoingDatagram, P2PInterface, PacketReliability, PeerNotification,
    },
};
// Host: transport manager, adapter and in-memory primitive
pub use peerlink_host::{
    Clock, ConnectionEvent, ManualClock, MemoryEndpoint, MemoryNetwork, NetworkDelivery,
    P2PTransport, SystemClock, TransportEvent, TransportManager,
};
// Connection state and counters
pub use peerlink_peer::{Connection, ConnectionState, TransportStatistics};
// Protocol: received packets
pub use peerlink_protocol::ReceivedPacket;

/// Convenience prelude with the most commonly used items.
pub mod prelude {
    pub use crate::{
        Config, ConnectionEvent, ErrorKind, MemoryNetwork, NetworkDelivery, P2PInterface,
        P2PTransport, PacketReliability, PeerId, ReceivedPacket, SocketName, TransportEvent,
        TransportManager,
    };
}
