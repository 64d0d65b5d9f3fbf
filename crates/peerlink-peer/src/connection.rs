use peerlink_core::id::SocketName;

use crate::connection_state::{Announcement, ConnectionState, OpenSide};

/// One logical bidirectional channel with a remote peer on a named socket.
///
/// A connection is never reused once closed; reopening the same socket with the
/// same peer allocates a fresh instance.
#[derive(Debug, Clone)]
pub struct Connection {
    socket_name: SocketName,
    state: ConnectionState,
    announcement: Announcement,
    next_message_index: u16,
}

impl Connection {
    /// Creates an unopened connection for the given socket.
    pub fn new(socket_name: SocketName) -> Self {
        Self {
            socket_name,
            state: ConnectionState::Unopened,
            announcement: Announcement::Silent,
            next_message_index: 0,
        }
    }

    /// Returns the socket name.
    pub fn socket_name(&self) -> &SocketName {
        &self.socket_name
    }

    /// Returns the current state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Returns what has been surfaced to the owner so far.
    pub fn announcement(&self) -> Announcement {
        self.announcement
    }

    /// Returns true once a side has opened and the connection is not closed.
    pub fn is_valid(&self) -> bool {
        self.state.is_valid()
    }

    /// Returns true if the local side has opened.
    pub fn opened_outgoing(&self) -> bool {
        self.state.is_open(OpenSide::Outgoing)
    }

    /// Returns true if the remote side has opened.
    pub fn opened_incoming(&self) -> bool {
        self.state.is_open(OpenSide::Incoming)
    }

    /// Opened locally, waiting for the remote side.
    pub fn is_pending_outgoing(&self) -> bool {
        self.state == ConnectionState::PendingOutgoing
    }

    /// Opened remotely, waiting for the local side.
    pub fn is_pending_incoming(&self) -> bool {
        self.state == ConnectionState::PendingIncoming
    }

    /// Returns true if at least one side has opened.
    pub fn is_half_opened(&self) -> bool {
        self.state.is_half_opened()
    }

    /// Returns true if both sides have opened.
    pub fn is_fully_opened(&self) -> bool {
        self.state == ConnectionState::FullyOpened
    }

    /// Registers `side` as open and returns the resulting state.
    pub fn open(&mut self, side: OpenSide) -> ConnectionState {
        debug_assert!(self.state != ConnectionState::Closed, "closed connections are never reopened");
        self.state = self.state.open(side);
        self.state
    }

    /// Returns the index for the next outgoing message. Wraps at 65536.
    pub fn next_message_index(&mut self) -> u16 {
        let index = self.next_message_index;
        self.next_message_index = self.next_message_index.wrapping_add(1);
        index
    }

    /// Returns true exactly once, the first time it is called on a fully opened connection.
    pub fn announce_opened(&mut self) -> bool {
        if self.is_fully_opened() && self.announcement == Announcement::Silent {
            self.announcement = Announcement::Opened;
            true
        } else {
            false
        }
    }

    /// Returns true if a closed event must be surfaced.
    ///
    /// A close is surfaced only after an open was, unless `forced`. Either way no
    /// further close is surfaced afterwards.
    pub fn announce_closed(&mut self, forced: bool) -> bool {
        let surface = match self.announcement {
            Announcement::Opened => true,
            Announcement::Silent => forced,
            Announcement::Closed => false,
        };
        self.announcement = Announcement::Closed;
        surface
    }

    /// Marks the connection closed. It must not be used afterwards.
    pub fn invalidate(&mut self) {
        self.state = ConnectionState::Closed;
    }

    /// Returns a JSON-shaped description for debug output.
    pub fn debug_json(&self) -> String {
        format!("{{\"SocketName\": \"{}\", \"State\": \"{:?}\"}}", self.socket_name, self.state)
    }
}
