//! Reassembly of fragmented inbound messages.
//!
//! Every datagram carries a [`FragmentHeader`]. Fragments of one message share a
//! message index and are collected in an [`InFlightMessage`] keyed by the sender,
//! the socket and the message index. Fragments may arrive in any order and may be
//! duplicated; a message is complete once the end-flag fragment has been seen and
//! every index up to it is present.
//!
//! Incomplete messages (a lost fragment, a sender that aborted mid-message) are
//! evicted by [`ReassemblyBuffer::cleanup_stale`] after the configured timeout.

use std::{
    collections::{BTreeMap, HashMap},
    time::{Duration, Instant},
};

use peerlink_core::id::{PeerId, SocketName};
use peerlink_protocol::FragmentHeader;

/// Identifies the message a fragment belongs to.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MessageKey {
    /// Sending peer
    pub remote: PeerId,
    /// Socket the fragment arrived on
    pub socket_name: SocketName,
    /// Message index from the fragment header
    pub message_index: u16,
}

/// Reassembly state of one inbound message.
#[derive(Debug)]
pub struct InFlightMessage {
    /// Fragments received so far, ordered by fragment index
    fragments: BTreeMap<u16, Vec<u8>>,
    /// Index of the end-flag fragment, once seen
    last_index: Option<u16>,
    /// Timestamp when the first fragment was received
    created_at: Instant,
}

impl InFlightMessage {
    /// Creates an empty message.
    pub fn new(created_at: Instant) -> Self {
        Self { fragments: BTreeMap::new(), last_index: None, created_at }
    }

    /// Stores a fragment. A duplicate index replaces the earlier copy; indexes
    /// past the end-flag fragment are ignored.
    pub fn add_fragment(&mut self, header: FragmentHeader, data: &[u8]) {
        if let Some(last) = self.last_index {
            if header.fragment_index > last {
                return;
            }
        }
        if header.is_last {
            self.last_index = Some(header.fragment_index);
            // Drop anything that claimed to come after the end
            self.fragments.split_off(&(header.fragment_index + 1));
        }
        self.fragments.insert(header.fragment_index, data.to_vec());
    }

    /// Returns true once the end flag was seen and no fragment is missing.
    pub fn is_complete(&self) -> bool {
        self.last_index.is_some_and(|last| self.fragments.len() == usize::from(last) + 1)
    }

    /// Number of distinct fragments received.
    pub fn fragment_count(&self) -> usize {
        self.fragments.len()
    }

    /// Concatenates the fragments in index order.
    pub fn reassemble(self) -> Vec<u8> {
        let size = self.fragments.values().map(Vec::len).sum();
        let mut payload = Vec::with_capacity(size);
        for data in self.fragments.into_values() {
            payload.extend_from_slice(&data);
        }
        payload
    }

    /// Returns the timestamp when the first fragment was received.
    pub fn created_at(&self) -> Instant {
        self.created_at
    }
}

/// In-flight messages of every connection.
#[derive(Debug)]
pub struct ReassemblyBuffer {
    messages: HashMap<MessageKey, InFlightMessage>,
    timeout: Duration,
}

impl ReassemblyBuffer {
    /// Creates a buffer evicting incomplete messages after `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self { messages: HashMap::new(), timeout }
    }

    /// Stores a fragment and returns the payload if it completed its message.
    pub fn insert(
        &mut self,
        key: MessageKey,
        header: FragmentHeader,
        data: &[u8],
        time: Instant,
    ) -> Option<Vec<u8>> {
        // An expired partial under the same key belongs to an older message
        let timeout = self.timeout;
        let expired = self
            .messages
            .get(&key)
            .is_some_and(|message| time.saturating_duration_since(message.created_at()) > timeout);
        if expired {
            tracing::warn!(
                "Dropping expired partial message {} from {} on '{}'",
                key.message_index,
                key.remote,
                key.socket_name
            );
            self.messages.remove(&key);
        }

        // Single-fragment messages skip the map entirely
        if header.is_last && header.fragment_index == 0 && !self.messages.contains_key(&key) {
            return Some(data.to_vec());
        }

        let message = self.messages.entry(key.clone()).or_insert_with(|| InFlightMessage::new(time));
        message.add_fragment(header, data);
        if !message.is_complete() {
            return None;
        }
        self.messages.remove(&key).map(InFlightMessage::reassemble)
    }

    /// Evicts messages older than the timeout and returns how many were dropped.
    pub fn cleanup_stale(&mut self, time: Instant) -> usize {
        let timeout = self.timeout;
        let before = self.messages.len();
        self.messages
            .retain(|_, message| time.saturating_duration_since(message.created_at()) <= timeout);
        let evicted = before - self.messages.len();

        if evicted > 0 {
            tracing::warn!(
                "Cleaning up {} incomplete message(s) that timed out after {:?}",
                evicted,
                timeout
            );
        }
        evicted
    }

    /// Drops every incomplete message received from `remote` on `socket_name` and
    /// returns how many were dropped.
    pub fn remove_connection(&mut self, remote: &PeerId, socket_name: &SocketName) -> usize {
        let before = self.messages.len();
        self.messages
            .retain(|key, _| &key.remote != remote || &key.socket_name != socket_name);
        before - self.messages.len()
    }

    /// Number of incomplete messages.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Returns true if no message is being assembled.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Drops every incomplete message.
    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(message_index: u16) -> MessageKey {
        MessageKey {
            remote: PeerId::new("remote"),
            socket_name: SocketName::new("Game").unwrap(),
            message_index,
        }
    }

    fn header(message_index: u16, fragment_index: u16, is_last: bool) -> FragmentHeader {
        FragmentHeader::new(message_index, fragment_index, is_last)
    }

    #[test]
    fn test_single_fragment_completes_immediately() {
        let mut buffer = ReassemblyBuffer::new(Duration::from_secs(30));
        let result = buffer.insert(key(0), header(0, 0, true), b"hello", Instant::now());
        assert_eq!(result.as_deref(), Some(&b"hello"[..]));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_in_order_reassembly() {
        let mut buffer = ReassemblyBuffer::new(Duration::from_secs(30));
        let now = Instant::now();
        assert!(buffer.insert(key(1), header(1, 0, false), &[1, 2], now).is_none());
        assert!(buffer.insert(key(1), header(1, 1, false), &[3, 4], now).is_none());
        let result = buffer.insert(key(1), header(1, 2, true), &[5], now);
        assert_eq!(result, Some(vec![1, 2, 3, 4, 5]));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_end_flag_first_waits_for_missing_fragments() {
        let mut buffer = ReassemblyBuffer::new(Duration::from_secs(30));
        let now = Instant::now();
        assert!(buffer.insert(key(1), header(1, 2, true), &[5], now).is_none());
        assert!(buffer.insert(key(1), header(1, 0, false), &[1, 2], now).is_none());
        let result = buffer.insert(key(1), header(1, 1, false), &[3, 4], now);
        assert_eq!(result, Some(vec![1, 2, 3, 4, 5]));
    }

    #[test]
    fn test_duplicate_fragment_replaces_earlier_copy() {
        let mut message = InFlightMessage::new(Instant::now());
        message.add_fragment(header(0, 0, false), &[9, 9]);
        message.add_fragment(header(0, 0, false), &[1, 2]);
        message.add_fragment(header(0, 1, true), &[3]);
        assert_eq!(message.fragment_count(), 2);
        assert!(message.is_complete());
        assert_eq!(message.reassemble(), vec![1, 2, 3]);
    }

    #[test]
    fn test_fragments_past_end_are_ignored() {
        let mut message = InFlightMessage::new(Instant::now());
        message.add_fragment(header(0, 3, false), &[7]);
        message.add_fragment(header(0, 1, true), &[2]);
        message.add_fragment(header(0, 2, false), &[8]);
        assert!(!message.is_complete());
        message.add_fragment(header(0, 0, false), &[1]);
        assert!(message.is_complete());
        assert_eq!(message.reassemble(), vec![1, 2]);
    }

    #[test]
    fn test_messages_are_keyed_by_sender_and_socket() {
        let mut buffer = ReassemblyBuffer::new(Duration::from_secs(30));
        let now = Instant::now();
        let other = MessageKey { remote: PeerId::new("other"), ..key(1) };

        assert!(buffer.insert(key(1), header(1, 0, false), &[1], now).is_none());
        assert!(buffer.insert(other.clone(), header(1, 0, false), &[9], now).is_none());
        assert_eq!(buffer.len(), 2);

        assert_eq!(buffer.insert(key(1), header(1, 1, true), &[2], now), Some(vec![1, 2]));
        assert_eq!(buffer.insert(other, header(1, 1, true), &[8], now), Some(vec![9, 8]));
    }

    #[test]
    fn test_cleanup_stale_messages() {
        let mut buffer = ReassemblyBuffer::new(Duration::from_secs(30));
        let start = Instant::now();
        buffer.insert(key(1), header(1, 0, false), &[1], start);

        assert_eq!(buffer.cleanup_stale(start), 0);
        assert_eq!(buffer.len(), 1);

        let later = start + Duration::from_secs(31);
        assert_eq!(buffer.cleanup_stale(later), 1);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_expired_partial_is_replaced_not_merged() {
        let mut buffer = ReassemblyBuffer::new(Duration::from_secs(30));
        let start = Instant::now();
        let later = start + Duration::from_secs(31);
        assert!(buffer.insert(key(1), header(1, 0, false), &[0xEE], start).is_none());

        assert!(buffer.insert(key(1), header(1, 1, true), &[0x22], later).is_none());
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.insert(key(1), header(1, 0, false), &[0x11], later), Some(vec![0x11, 0x22]));
    }

    #[test]
    fn test_expired_partial_does_not_block_single_fragment() {
        let mut buffer = ReassemblyBuffer::new(Duration::from_secs(30));
        let start = Instant::now();
        buffer.insert(key(4), header(4, 0, false), &[0xEE], start);

        let later = start + Duration::from_secs(31);
        assert_eq!(buffer.insert(key(4), header(4, 0, true), &[7], later), Some(vec![7]));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_remove_connection_drops_only_its_messages() {
        let mut buffer = ReassemblyBuffer::new(Duration::from_secs(30));
        let now = Instant::now();
        let other_peer = MessageKey { remote: PeerId::new("other"), ..key(1) };
        let other_socket = MessageKey { socket_name: SocketName::new("Chat").unwrap(), ..key(1) };
        buffer.insert(key(1), header(1, 0, false), &[1], now);
        buffer.insert(key(2), header(2, 0, false), &[2], now);
        buffer.insert(other_peer, header(1, 0, false), &[3], now);
        buffer.insert(other_socket, header(1, 0, false), &[4], now);

        let removed = buffer.remove_connection(&PeerId::new("remote"), &SocketName::new("Game").unwrap());
        assert_eq!(removed, 2);
        assert_eq!(buffer.len(), 2);
        assert!(buffer.insert(key(1), header(1, 1, true), &[9], now).is_none());
    }

    #[test]
    fn test_cleanup_keeps_fresh_messages() {
        let mut buffer = ReassemblyBuffer::new(Duration::from_secs(30));
        let start = Instant::now();
        let later = start + Duration::from_secs(31);
        buffer.insert(key(1), header(1, 0, false), &[1], start);
        buffer.insert(key(2), header(2, 0, false), &[2], later);

        assert_eq!(buffer.cleanup_stale(later), 1);
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.insert(key(2), header(2, 1, true), &[3], later), Some(vec![2, 3]));
    }
}
