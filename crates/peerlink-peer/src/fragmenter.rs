use std::slice::Chunks;

use peerlink_core::{
    constants::{FRAGMENT_HEADER_SIZE, MAX_FRAGMENTS},
    error::{ErrorKind, Result},
};
use peerlink_protocol::FragmentHeader;

/// Splits application payloads into header-prefixed datagrams.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Fragmenter {
    fragment_payload_size: usize,
    max_fragments: usize,
}

impl Fragmenter {
    /// Creates a fragmenter for datagrams of at most `max_packet_size` bytes.
    ///
    /// `max_fragments` is capped to the 15-bit fragment index space.
    pub fn new(max_packet_size: usize, max_fragments: usize) -> Self {
        Self {
            fragment_payload_size: max_packet_size.saturating_sub(FRAGMENT_HEADER_SIZE),
            max_fragments: max_fragments.min(MAX_FRAGMENTS),
        }
    }

    /// Payload bytes carried by a single fragment.
    pub fn fragment_payload_size(&self) -> usize {
        self.fragment_payload_size
    }

    /// Largest payload that fits in one message.
    pub fn max_message_size(&self) -> usize {
        self.fragment_payload_size.saturating_mul(self.max_fragments)
    }

    /// Number of fragments needed for `len` payload bytes.
    pub fn fragment_count(&self, len: usize) -> usize {
        if self.fragment_payload_size == 0 {
            return 0;
        }
        len.div_ceil(self.fragment_payload_size)
    }

    /// Splits `payload` into fragments sharing `message_index`.
    pub fn split<'a>(&self, payload: &'a [u8], message_index: u16) -> Result<Fragments<'a>> {
        if payload.is_empty() {
            return Err(ErrorKind::EmptyPayload);
        }
        if self.fragment_payload_size == 0 || payload.len() > self.max_message_size() {
            return Err(ErrorKind::PayloadTooLarge {
                size: payload.len(),
                max: self.max_message_size(),
            });
        }

        Ok(Fragments {
            chunks: payload.chunks(self.fragment_payload_size),
            message_index,
            next_index: 0,
            count: self.fragment_count(payload.len()),
        })
    }
}

/// Iterator over the datagrams of one message, in fragment order.
#[derive(Debug)]
pub struct Fragments<'a> {
    chunks: Chunks<'a, u8>,
    message_index: u16,
    next_index: usize,
    count: usize,
}

impl Fragments<'_> {
    /// Message index shared by every fragment.
    pub fn message_index(&self) -> u16 {
        self.message_index
    }
}

impl Iterator for Fragments<'_> {
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Self::Item> {
        let chunk = self.chunks.next()?;
        let index = self.next_index;
        self.next_index += 1;

        // index < MAX_FRAGMENTS, so it fits the 15-bit field
        let header = FragmentHeader::new(self.message_index, index as u16, index + 1 == self.count);
        let mut datagram = Vec::with_capacity(FRAGMENT_HEADER_SIZE + chunk.len());
        datagram.extend_from_slice(&header.encode());
        datagram.extend_from_slice(chunk);
        Some(datagram)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.chunks.size_hint()
    }
}

impl ExactSizeIterator for Fragments<'_> {}
