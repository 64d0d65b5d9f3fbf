//! Transport statistics tracking.

/// Counters kept by the transport manager.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportStatistics {
    /// Application payloads handed to the pipeline successfully
    pub packets_sent: u64,
    /// Datagrams handed to the primitive
    pub fragments_sent: u64,
    /// Payload bytes sent (excluding fragment headers)
    pub bytes_sent: u64,
    /// Datagrams pulled from the primitive
    pub datagrams_received: u64,
    /// Reassembled payloads returned to the caller
    pub packets_delivered: u64,
    /// Payload bytes returned to the caller
    pub bytes_delivered: u64,
    /// Handshake confirmation packets consumed
    pub confirmations_received: u64,
    /// Datagrams dropped (malformed, unknown sender, connection not open)
    pub datagrams_discarded: u64,
    /// Incomplete messages evicted by the sweep
    pub stale_messages_evicted: u64,
}

impl TransportStatistics {
    /// Returns the share of received datagrams that were discarded (0.0 to 1.0).
    pub fn discard_rate(&self) -> f32 {
        if self.datagrams_received == 0 {
            return 0.0;
        }
        self.datagrams_discarded as f32 / self.datagrams_received as f32
    }

    /// Resets all statistics counters.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statistics_initialized_to_zero() {
        let stats = TransportStatistics::default();
        assert_eq!(stats.packets_sent, 0);
        assert_eq!(stats.datagrams_received, 0);
        assert_eq!(stats.discard_rate(), 0.0);
    }

    #[test]
    fn test_discard_rate() {
        let stats = TransportStatistics {
            datagrams_received: 40,
            datagrams_discarded: 10,
            ..Default::default()
        };
        assert!((stats.discard_rate() - 0.25).abs() < 0.001);
    }

    #[test]
    fn test_statistics_reset() {
        let mut stats = TransportStatistics {
            packets_sent: 3,
            bytes_sent: 300,
            confirmations_received: 1,
            ..Default::default()
        };
        stats.reset();
        assert_eq!(stats, TransportStatistics::default());
    }
}
