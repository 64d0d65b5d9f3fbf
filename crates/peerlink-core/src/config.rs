use std::{default::Default, time::Duration};

use crate::constants::{
    DEFAULT_MAX_CONNECTIONS, DEFAULT_MAX_PACKET_SIZE, DEFAULT_RECEIVE_BUFFER_SIZE,
    FRAGMENT_HEADER_SIZE, MAX_FRAGMENTS,
};

#[derive(Clone, Debug)]
/// Configuration options to tune transport behavior.
pub struct Config {
    /// Max datagram size accepted by the P2P primitive, fragment header included.
    pub max_packet_size: usize,
    /// Max number of socket connections per remote peer.
    pub max_connections: usize,
    /// Max number of fragments a single message may be split into.
    pub max_fragments: usize,
    /// Upper bound on the receive buffer handed to the primitive.
    pub receive_buffer_max_size: usize,
    /// How long an incomplete inbound message is kept before it is evicted.
    pub reassembly_timeout: Duration,
    /// Socket name used by the client/server transport adapter.
    pub transport_socket_name: String,
    /// Initial capacity of the adapter's pending connect/disconnect queue.
    pub event_queue_capacity: usize,
}

impl Config {
    /// Returns the number of payload bytes carried by one fragment.
    pub fn fragment_payload_size(&self) -> usize {
        self.max_packet_size.saturating_sub(FRAGMENT_HEADER_SIZE)
    }

    /// Returns the largest payload that can be sent as one message.
    pub fn max_message_size(&self) -> usize {
        self.fragment_payload_size().saturating_mul(self.max_fragments)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            max_fragments: MAX_FRAGMENTS,
            receive_buffer_max_size: DEFAULT_RECEIVE_BUFFER_SIZE,
            reassembly_timeout: Duration::from_secs(30),
            transport_socket_name: String::from("P2PTransport"),
            event_queue_capacity: 64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limits() {
        let config = Config::default();
        assert_eq!(config.max_packet_size, 1170);
        assert_eq!(config.max_connections, 32);
        assert_eq!(config.max_fragments, 32768);
        assert_eq!(config.fragment_payload_size(), 1166);
        assert_eq!(config.max_message_size(), 1166 * 32768);
    }

    #[test]
    fn test_fragment_payload_size_never_underflows() {
        let mut config = Config::default();
        config.max_packet_size = 2;
        assert_eq!(config.fragment_payload_size(), 0);
        assert_eq!(config.max_message_size(), 0);
    }
}
