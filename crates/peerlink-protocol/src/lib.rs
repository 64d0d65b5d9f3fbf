#![warn(missing_docs)]

//! peerlink-protocol: fragment header, packet types and the handshake sentinel.

/// Fragment header codec.
pub mod header;
/// Packet types and structures.
pub mod packet;

pub use header::FragmentHeader;
pub use packet::{is_confirmation_packet, ReceivedPacket};
pub use peerlink_core::transport::{NatType, PacketReliability};
