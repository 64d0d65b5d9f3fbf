//! Packet types handed to the application.

use peerlink_core::{
    constants::{CONFIRMATION_CHANNEL, CONFIRMATION_PACKET},
    id::{PeerId, SocketName},
};

/// A fully reassembled application payload.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ReceivedPacket {
    remote: PeerId,
    socket_name: SocketName,
    channel: u8,
    payload: Vec<u8>,
}

impl ReceivedPacket {
    /// Creates a received packet.
    pub fn new(remote: PeerId, socket_name: SocketName, channel: u8, payload: Vec<u8>) -> Self {
        Self { remote, socket_name, channel, payload }
    }

    /// Returns the sending peer.
    pub fn remote(&self) -> &PeerId {
        &self.remote
    }

    /// Returns the socket the packet arrived on.
    pub fn socket_name(&self) -> &SocketName {
        &self.socket_name
    }

    /// Returns the channel the packet was sent on.
    pub fn channel(&self) -> u8 {
        self.channel
    }

    /// Returns the payload.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Consumes the packet, returning its payload.
    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }
}

/// Returns true if a fragment payload on `channel` is the handshake confirmation.
pub fn is_confirmation_packet(channel: u8, payload: &[u8]) -> bool {
    channel == CONFIRMATION_CHANNEL && payload == CONFIRMATION_PACKET
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confirmation_requires_reserved_channel() {
        assert!(is_confirmation_packet(255, b"READY"));
        assert!(!is_confirmation_packet(0, b"READY"));
        assert!(!is_confirmation_packet(255, b"READY!"));
        assert!(!is_confirmation_packet(255, b"ready"));
    }

    #[test]
    fn test_received_packet_accessors() {
        let packet = ReceivedPacket::new(
            PeerId::new("remote"),
            SocketName::new("Game").unwrap(),
            3,
            vec![1, 2, 3],
        );
        assert_eq!(packet.remote().as_str(), "remote");
        assert_eq!(packet.socket_name().as_str(), "Game");
        assert_eq!(packet.channel(), 3);
        assert_eq!(packet.payload(), &[1, 2, 3]);
        assert_eq!(packet.into_payload(), vec![1, 2, 3]);
    }
}
