/// Which side of a socket connection is being opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenSide {
    /// Opened locally (we requested or accepted the connection)
    Outgoing,
    /// Opened remotely (the peer requested or confirmed the connection)
    Incoming,
}

/// Socket connection state machine.
///
/// `Unopened → {PendingOutgoing | PendingIncoming} → FullyOpened → Closed`.
/// Closed is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Connection has been created but neither side has registered yet
    #[default]
    Unopened,

    /// We opened our side and are waiting for the peer
    PendingOutgoing,

    /// The peer opened its side and is waiting for us
    PendingIncoming,

    /// Both sides have opened - data may flow
    FullyOpened,

    /// Connection was closed and removed from the registry
    Closed,
}

impl ConnectionState {
    /// Returns true if the connection has been opened by at least one side and not closed
    pub fn is_valid(&self) -> bool {
        !matches!(self, ConnectionState::Unopened | ConnectionState::Closed)
    }

    /// Returns true if at least one side has opened
    pub fn is_half_opened(&self) -> bool {
        matches!(
            self,
            ConnectionState::PendingOutgoing
                | ConnectionState::PendingIncoming
                | ConnectionState::FullyOpened
        )
    }

    /// Returns true if the given side has registered as open
    pub fn is_open(&self, side: OpenSide) -> bool {
        match side {
            OpenSide::Outgoing => {
                matches!(self, ConnectionState::PendingOutgoing | ConnectionState::FullyOpened)
            }
            OpenSide::Incoming => {
                matches!(self, ConnectionState::PendingIncoming | ConnectionState::FullyOpened)
            }
        }
    }

    /// Returns the state reached after `side` registers as open.
    pub fn open(self, side: OpenSide) -> ConnectionState {
        match (self, side) {
            (ConnectionState::Unopened, OpenSide::Outgoing) => ConnectionState::PendingOutgoing,
            (ConnectionState::Unopened, OpenSide::Incoming) => ConnectionState::PendingIncoming,
            (ConnectionState::PendingOutgoing, OpenSide::Incoming)
            | (ConnectionState::PendingIncoming, OpenSide::Outgoing) => ConnectionState::FullyOpened,
            (state, _) => state,
        }
    }
}

/// What has been surfaced to the owner of a connection so far.
///
/// Each transition happens at most once, which gives at-most-once delivery of
/// the opened and closed events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Announcement {
    /// Nothing surfaced yet
    #[default]
    Silent,
    /// The opened event has been surfaced
    Opened,
    /// The closed event has been surfaced (or suppressed); terminal
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outgoing_then_incoming() {
        let state = ConnectionState::Unopened.open(OpenSide::Outgoing);
        assert_eq!(state, ConnectionState::PendingOutgoing);
        assert!(state.is_open(OpenSide::Outgoing));
        assert!(!state.is_open(OpenSide::Incoming));
        assert_eq!(state.open(OpenSide::Incoming), ConnectionState::FullyOpened);
    }

    #[test]
    fn test_incoming_then_outgoing() {
        let state = ConnectionState::Unopened.open(OpenSide::Incoming);
        assert_eq!(state, ConnectionState::PendingIncoming);
        assert_eq!(state.open(OpenSide::Outgoing), ConnectionState::FullyOpened);
    }

    #[test]
    fn test_reopening_same_side_is_noop() {
        let state = ConnectionState::PendingOutgoing;
        assert_eq!(state.open(OpenSide::Outgoing), ConnectionState::PendingOutgoing);
        let full = ConnectionState::FullyOpened;
        assert_eq!(full.open(OpenSide::Incoming), ConnectionState::FullyOpened);
    }

    #[test]
    fn test_closed_is_terminal() {
        let closed = ConnectionState::Closed;
        assert_eq!(closed.open(OpenSide::Outgoing), ConnectionState::Closed);
        assert_eq!(closed.open(OpenSide::Incoming), ConnectionState::Closed);
        assert!(!closed.is_valid());
        assert!(!closed.is_open(OpenSide::Outgoing));
    }

    #[test]
    fn test_validity() {
        assert!(!ConnectionState::Unopened.is_valid());
        assert!(ConnectionState::PendingIncoming.is_valid());
        assert!(ConnectionState::FullyOpened.is_half_opened());
        assert!(!ConnectionState::Unopened.is_half_opened());
    }
}
