//! Error types and results.

use thiserror::Error;

/// Result codes reported by the underlying P2P primitive.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum P2PError {
    /// The requested item (packet, connection, NAT type) does not exist.
    #[error("not found")]
    NotFound,
    /// The primitive rejected the call's parameters.
    #[error("invalid parameters")]
    InvalidParameters,
    /// There is no connection with the remote user on that socket.
    #[error("no connection")]
    NoConnection,
    /// The primitive refused the call because a limit was reached.
    #[error("limit exceeded")]
    LimitExceeded,
    /// The primitive is not connected to its backend.
    #[error("network disconnected")]
    NetworkDisconnected,
    /// The local or remote user is not known to the primitive.
    #[error("invalid user")]
    InvalidUser,
    /// Any other result code.
    #[error("{0}")]
    Other(String),
}

/// Errors raised by the transport layers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ErrorKind {
    /// The transport manager has not been initialized (or was shut down).
    #[error("transport manager is not initialized")]
    NotInitialized,
    /// The local user id could not be resolved or is invalid.
    #[error("local user id is missing or invalid")]
    InvalidLocalUser,
    /// A remote peer id is empty or malformed.
    #[error("peer id '{0}' is invalid")]
    InvalidPeerId(String),
    /// Socket names may only contain 1-32 ASCII alphanumeric characters.
    #[error("socket name '{0}' is invalid (1-32 alphanumeric characters expected)")]
    InvalidSocketName(String),
    /// The remote peer already has the maximal number of socket connections.
    #[error("reached the maximum of {0} connections with the remote peer")]
    TooManyConnections(usize),
    /// No connection exists with the given peer on the given socket.
    #[error("no socket connection named '{socket}' with remote peer '{peer}'")]
    ConnectionNotFound {
        /// Remote peer id
        peer: String,
        /// Socket name
        socket: String,
    },
    /// Payloads must carry at least one byte.
    #[error("payload is empty")]
    EmptyPayload,
    /// The payload would need more fragments than the header can index.
    #[error("payload of {size} bytes exceeds the {max} byte message limit")]
    PayloadTooLarge {
        /// Size of the rejected payload
        size: usize,
        /// Largest size that can be sent
        max: usize,
    },
    /// A datagram was shorter than the fragment header.
    #[error("received data is too short")]
    ReceivedDataTooShort,
    /// The operation is only available in server mode.
    #[error("transport is not running as a server")]
    NotServer,
    /// The operation is only available in client mode.
    #[error("transport is not running as a client")]
    NotClient,
    /// The client id is not mapped to any remote peer.
    #[error("client id {0} is unknown")]
    UnknownClient(u64),
    /// The underlying P2P primitive reported a failure.
    #[error("P2P primitive failure: {0}")]
    Primitive(#[from] P2PError),
}

/// Convenient result alias used across the workspace.
pub type Result<T> = std::result::Result<T, ErrorKind>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_error_converts_into_error_kind() {
        fn fails() -> Result<()> {
            Err::<(), _>(P2PError::NoConnection)?;
            Ok(())
        }
        assert_eq!(fails(), Err(ErrorKind::Primitive(P2PError::NoConnection)));
    }

    #[test]
    fn test_error_messages() {
        let err = ErrorKind::ConnectionNotFound { peer: "abc".into(), socket: "Game".into() };
        assert_eq!(err.to_string(), "no socket connection named 'Game' with remote peer 'abc'");
        assert_eq!(
            ErrorKind::Primitive(P2PError::LimitExceeded).to_string(),
            "P2P primitive failure: limit exceeded"
        );
    }
}
