//! The 4-byte header prefixed to every fragment.
//!
//! ```text
//!  0               1               2               3
//! +---------------+---------------+-+-------------+---------------+
//! |        message index          |E|      fragment index         |
//! +---------------+---------------+-+-------------+---------------+
//! ```
//!
//! Both halves are big-endian. `E` marks the last fragment of a message.

use std::io::Cursor;

use byteorder::{BigEndian, ByteOrder, ReadBytesExt};
use peerlink_core::{
    constants::FRAGMENT_HEADER_SIZE,
    error::{ErrorKind, Result},
};

const END_FLAG: u16 = 0x8000;
const FRAGMENT_INDEX_MASK: u16 = 0x7FFF;

/// Decoded fragment header.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct FragmentHeader {
    /// Index of the message this fragment belongs to
    pub message_index: u16,
    /// Position of this fragment inside the message (15 bits)
    pub fragment_index: u16,
    /// Set on the last fragment of the message
    pub is_last: bool,
}

impl FragmentHeader {
    /// Creates a header. `fragment_index` is truncated to 15 bits.
    pub fn new(message_index: u16, fragment_index: u16, is_last: bool) -> Self {
        Self { message_index, fragment_index: fragment_index & FRAGMENT_INDEX_MASK, is_last }
    }

    fn fragment_info(&self) -> u16 {
        let index = self.fragment_index & FRAGMENT_INDEX_MASK;
        if self.is_last {
            index | END_FLAG
        } else {
            index
        }
    }

    /// Returns the encoded header.
    pub fn encode(&self) -> [u8; FRAGMENT_HEADER_SIZE] {
        let mut bytes = [0u8; FRAGMENT_HEADER_SIZE];
        BigEndian::write_u16(&mut bytes[0..2], self.message_index);
        BigEndian::write_u16(&mut bytes[2..4], self.fragment_info());
        bytes
    }

    /// Splits a datagram into its header and payload.
    pub fn parse(datagram: &[u8]) -> Result<(FragmentHeader, &[u8])> {
        if datagram.len() < FRAGMENT_HEADER_SIZE {
            return Err(ErrorKind::ReceivedDataTooShort);
        }
        let mut cursor = Cursor::new(&datagram[..FRAGMENT_HEADER_SIZE]);
        let message_index =
            cursor.read_u16::<BigEndian>().map_err(|_| ErrorKind::ReceivedDataTooShort)?;
        let fragment_info =
            cursor.read_u16::<BigEndian>().map_err(|_| ErrorKind::ReceivedDataTooShort)?;
        let header = FragmentHeader {
            message_index,
            fragment_index: fragment_info & FRAGMENT_INDEX_MASK,
            is_last: fragment_info & END_FLAG != 0,
        };
        Ok((header, &datagram[FRAGMENT_HEADER_SIZE..]))
    }
}
