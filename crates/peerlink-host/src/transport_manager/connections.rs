use peerlink_core::{
    constants::{CONFIRMATION_CHANNEL, CONFIRMATION_PACKET},
    error::{ErrorKind, Result},
    id::{PeerId, SocketName},
    transport::{P2PInterface, PacketReliability, PeerNotification},
};
use peerlink_peer::{Connection, ConnectionState, OpenSide};
use tracing::{debug, error, trace, warn};

use super::TransportManager;
use crate::event_types::ConnectionEvent;

impl<P: P2PInterface> TransportManager<P> {
    /// Opens the local side of a socket connection with `peer`.
    ///
    /// Requests a new connection, or accepts one the peer already requested. Opening
    /// a side that is already open succeeds without touching the primitive.
    pub fn open_connection(&mut self, peer: &PeerId, socket_name: &str) -> Result<()> {
        let local = self.local_user()?;
        let socket_name = SocketName::new(socket_name).inspect_err(|err| {
            error!("Unable to open connection with {}: {}", peer, err);
        })?;
        if !peer.is_valid() {
            error!("Unable to open '{}' connection: invalid peer id '{}'", socket_name, peer);
            return Err(ErrorKind::InvalidPeerId(peer.to_string()));
        }

        self.open_side(&local, peer, &socket_name, OpenSide::Outgoing)
    }

    /// Closes a socket connection with `peer`.
    ///
    /// When the primitive fails to close, `force_close` decides whether the local
    /// state is cleaned up anyway; the primitive's error is returned either way.
    pub fn close_connection(
        &mut self,
        peer: &PeerId,
        socket_name: &str,
        force_close: bool,
    ) -> Result<()> {
        let local = self.local_user()?;
        if !peer.is_valid() {
            error!("Unable to close '{}' connection: invalid peer id '{}'", socket_name, peer);
            return Err(ErrorKind::InvalidPeerId(peer.to_string()));
        }
        let Some(socket) = self.registry.get(peer, socket_name).map(Connection::socket_name).cloned()
        else {
            error!("Unable to close '{}' connection with {}: no such connection", socket_name, peer);
            return Err(ErrorKind::ConnectionNotFound {
                peer: peer.to_string(),
                socket: socket_name.to_owned(),
            });
        };

        let result = self.primitive.close_connection(&local, peer, &socket).map_err(ErrorKind::from);
        if let Err(err) = &result {
            if !force_close {
                error!("Failed to close '{}' connection with {}: {}", socket, peer, err);
                return result;
            }
            warn!("Failed to close '{}' connection with {} ({}), forcing local cleanup", socket, peer, err);
        }

        if let Some(connection) = self.registry.get_mut(peer, socket.as_str()) {
            if connection.announce_closed(force_close) {
                self.event_sink
                    .send(ConnectionEvent::Closed { peer: peer.clone(), socket_name: socket.clone() });
            }
        }
        self.registry.remove(peer, socket.as_str());
        let dropped = self.reassembly.remove_connection(peer, &socket);
        if dropped > 0 {
            trace!("Dropped {} partial message(s) from {} on '{}'", dropped, peer, socket);
        }
        debug!("Closed '{}' connection with {}", socket, peer);
        result
    }

    /// Closes every connection. Returns the first failure after attempting all.
    pub fn close_all_connections(&mut self) -> Result<()> {
        let keys = self.registry.keys_snapshot(None);
        self.close_each(keys)
    }

    /// Closes every connection with `peer`.
    pub fn close_all_connections_with_peer(&mut self, peer: &PeerId) -> Result<()> {
        let keys = self
            .registry
            .sockets_snapshot(peer)
            .into_iter()
            .map(|socket| (peer.clone(), socket))
            .collect();
        self.close_each(keys)
    }

    /// Closes every connection on `socket_name`, whatever the peer.
    pub fn close_all_connections_with_socket_name(&mut self, socket_name: &str) -> Result<()> {
        let keys = self.registry.keys_snapshot(Some(socket_name));
        self.close_each(keys)
    }

    fn close_each(&mut self, keys: Vec<(PeerId, SocketName)>) -> Result<()> {
        let mut first_error = None;
        for (peer, socket) in keys {
            if let Err(err) = self.close_connection(&peer, socket.as_str(), true) {
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Returns true if a connection with `peer` on `socket_name` exists.
    pub fn has_connection(&self, peer: &PeerId, socket_name: &str) -> bool {
        self.registry.contains(peer, socket_name)
    }

    /// Looks up a connection.
    pub fn connection(&self, peer: &PeerId, socket_name: &str) -> Option<&Connection> {
        self.registry.get(peer, socket_name)
    }

    /// Number of connections across all peers.
    pub fn all_connections_count(&self) -> usize {
        self.registry.all_connections_count()
    }

    /// Number of connections waiting for the remote side.
    pub fn pending_outgoing_count(&self) -> usize {
        self.registry.pending_outgoing_count()
    }

    /// Number of connections waiting for the local side.
    pub fn pending_incoming_count(&self) -> usize {
        self.registry.pending_incoming_count()
    }

    /// Number of connections opened by both sides.
    pub fn fully_opened_count(&self) -> usize {
        self.registry.fully_opened_count()
    }

    /// Drives one side of the handshake.
    ///
    /// Only the outgoing side calls the primitive. Reaching `FullyOpened` sends the
    /// confirmation packet and announces the connection.
    pub(super) fn open_side(
        &mut self,
        local: &PeerId,
        peer: &PeerId,
        socket_name: &SocketName,
        side: OpenSide,
    ) -> Result<()> {
        let (connection, created) =
            self.registry.entry_for_open(peer, socket_name).inspect_err(|err| {
                error!("Unable to open '{}' connection with {}: {}", socket_name, peer, err);
            })?;

        if connection.is_fully_opened() {
            warn!("'{}' connection with {} is already fully opened", socket_name, peer);
            return Ok(());
        }
        if connection.state().is_open(side) {
            warn!("{:?} side of '{}' connection with {} is already open", side, socket_name, peer);
            return Ok(());
        }

        if side == OpenSide::Outgoing {
            if let Err(err) = self.primitive.accept_connection(local, peer, socket_name) {
                error!("Failed to open '{}' connection with {}: {}", socket_name, peer, err);
                if created {
                    self.registry.remove(peer, socket_name.as_str());
                }
                return Err(err.into());
            }
        }

        let state = connection.open(side);
        trace!("'{}' connection with {} is now {:?}", socket_name, peer, state);

        if state == ConnectionState::FullyOpened {
            self.send_confirmation(peer, socket_name);
            self.announce_opened(peer, socket_name);
        }
        Ok(())
    }

    fn send_confirmation(&mut self, peer: &PeerId, socket_name: &SocketName) {
        let sent = self.send_packet(
            peer,
            socket_name.as_str(),
            CONFIRMATION_PACKET,
            CONFIRMATION_CHANNEL,
            true,
            PacketReliability::ReliableOrdered,
        );
        if let Err(err) = sent {
            error!("Failed to confirm '{}' connection with {}: {}", socket_name, peer, err);
        }
    }

    fn announce_opened(&mut self, peer: &PeerId, socket_name: &SocketName) {
        let Some(connection) = self.registry.get_mut(peer, socket_name.as_str()) else {
            return;
        };
        if connection.announce_opened() {
            debug!("'{}' connection with {} opened", socket_name, peer);
            self.event_sink
                .send(ConnectionEvent::Opened { peer: peer.clone(), socket_name: socket_name.clone() });
        }
    }

    /// Applies every queued notification from the primitive.
    pub(super) fn process_notifications(&mut self) {
        while let Ok(notification) = self.notification_receiver.try_recv() {
            match notification {
                PeerNotification::ConnectionRequested { local, remote, socket_name } => {
                    if self.local_user.as_ref() == Some(&local) {
                        self.handle_connection_request(&remote, &socket_name);
                    }
                }
                PeerNotification::ConnectionClosed { local, remote, socket_name, reason } => {
                    if self.local_user.as_ref() == Some(&local) {
                        debug!("'{}' connection with {} closed remotely: {:?}", socket_name, remote, reason);
                        self.handle_connection_closed(&remote, &socket_name);
                    }
                }
            }
        }
    }

    fn handle_connection_request(&mut self, remote: &PeerId, socket_name: &str) {
        let Some(local) = self.local_user.clone() else {
            return;
        };
        let socket_name = match SocketName::new(socket_name) {
            Ok(socket_name) => socket_name,
            Err(err) => {
                warn!("Ignoring connection request from {}: {}", remote, err);
                return;
            }
        };
        if !remote.is_valid() {
            warn!("Ignoring '{}' connection request from invalid peer id '{}'", socket_name, remote);
            return;
        }

        if self.open_side(&local, remote, &socket_name, OpenSide::Incoming).is_err() {
            return;
        }
        if self.registry.get(remote, socket_name.as_str()).is_some_and(Connection::is_pending_incoming) {
            debug!("Incoming '{}' connection request from {}", socket_name, remote);
            self.event_sink
                .send(ConnectionEvent::IncomingRequest { peer: remote.clone(), socket_name });
        }
    }

    fn handle_connection_closed(&mut self, remote: &PeerId, socket_name: &str) {
        if !self.registry.contains(remote, socket_name) {
            trace!("Close notification for unknown '{}' connection with {}", socket_name, remote);
            return;
        }
        if let Err(err) = self.close_connection(remote, socket_name, true) {
            warn!("Closing '{}' connection with {} after remote close: {}", socket_name, remote, err);
        }
    }

    /// Handles a confirmation packet: it completes a connection still waiting for
    /// the remote side and is ignored otherwise.
    pub(super) fn handle_confirmation(&mut self, local: &PeerId, remote: &PeerId, socket_name: &SocketName) {
        let pending = self
            .registry
            .get(remote, socket_name.as_str())
            .is_some_and(Connection::is_pending_outgoing);
        if !pending {
            trace!("Ignoring confirmation for '{}' from {}", socket_name, remote);
            return;
        }
        if let Err(err) = self.open_side(local, remote, socket_name, OpenSide::Incoming) {
            error!("Failed to complete '{}' connection with {}: {}", socket_name, remote, err);
        }
    }
}
