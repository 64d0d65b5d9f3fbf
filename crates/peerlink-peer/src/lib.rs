#![warn(missing_docs)]

//! peerlink-peer: per-connection state, fragmentation and reassembly.

/// Socket connection with a remote peer.
pub mod connection;
/// Connection state machine.
pub mod connection_state;
/// Reassembly of fragmented inbound messages.
pub mod fragment_buffer;
/// Payload fragmentation.
pub mod fragmenter;
/// Per-peer connection bookkeeping.
pub mod registry;
/// Transport statistics tracking.
pub mod statistics;

pub use connection::Connection;
pub use connection_state::{Announcement, ConnectionState, OpenSide};
pub use fragment_buffer::{InFlightMessage, MessageKey, ReassemblyBuffer};
pub use fragmenter::{Fragmenter, Fragments};
pub use registry::ConnectionRegistry;
pub use statistics::TransportStatistics;
