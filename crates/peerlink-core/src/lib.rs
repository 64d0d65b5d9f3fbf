#![warn(missing_docs)]

//! peerlink-core: foundational types and utilities.
//!
//! This crate provides the minimal set of core utilities shared across all layers:
//! - Configuration types
//! - Error handling
//! - Protocol constants
//! - Peer and socket identifiers
//! - The datagram primitive and local identity abstractions
//!
//! Protocol-specific logic lives in specialized crates:
//! - `peerlink-protocol`: fragment header codec, packet types
//! - `peerlink-peer`: connection state machine, registry, fragmentation and reassembly
//! - `peerlink-host`: transport manager and client/server transport adapter

/// Protocol constants shared across layers.
pub mod constants {
    /// The size of the fragment header prefixed to every datagram.
    pub const FRAGMENT_HEADER_SIZE: usize = 4;
    /// Maximal number of fragments per message (15-bit fragment index space).
    pub const MAX_FRAGMENTS: usize = 1 << 15;
    /// Largest datagram the underlying P2P primitive accepts, header included.
    pub const DEFAULT_MAX_PACKET_SIZE: usize = 1170;
    /// Maximal number of socket connections with a single remote peer.
    pub const DEFAULT_MAX_CONNECTIONS: usize = 32;
    /// Maximal length of a socket name.
    pub const MAX_SOCKET_NAME_LENGTH: usize = 32;
    /// Size of the buffer offered to the primitive when receiving a datagram.
    pub const DEFAULT_RECEIVE_BUFFER_SIZE: usize = 4096;
    /// Payload of the handshake confirmation packet.
    pub const CONFIRMATION_PACKET: &[u8] = b"READY";
    /// Channel reserved for the handshake confirmation packet.
    pub const CONFIRMATION_CHANNEL: u8 = u8::MAX;
    /// Client id of the server in a client/server topology.
    pub const SERVER_CLIENT_ID: u64 = 0;
    /// Client id that never refers to a connected client.
    pub const INVALID_CLIENT_ID: u64 = u64::MAX;
}

/// Configuration options for the transport.
pub mod config;
/// Error types and results.
pub mod error;
/// Peer and socket identifiers.
pub mod id;
/// Datagram primitive and local identity abstractions.
pub mod transport;
