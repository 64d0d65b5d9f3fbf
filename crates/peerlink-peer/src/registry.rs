//! Per-peer bookkeeping of socket connections.
//!
//! The registry only stores connections; the handshake itself (primitive calls,
//! confirmation packets, announcements) is driven by the transport manager in
//! `peerlink-host`, which owns one registry.

use std::collections::HashMap;

use peerlink_core::{
    error::{ErrorKind, Result},
    id::{PeerId, SocketName},
};

use crate::connection::Connection;

/// Connections indexed by remote peer, bounded per peer.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: HashMap<PeerId, Vec<Connection>>,
    max_connections: usize,
}

impl ConnectionRegistry {
    /// Creates an empty registry allowing `max_connections` sockets per peer.
    pub fn new(max_connections: usize) -> Self {
        Self { connections: HashMap::new(), max_connections }
    }

    /// Returns the per-peer connection limit.
    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// Looks up the connection with `peer` on `socket_name`.
    pub fn get(&self, peer: &PeerId, socket_name: &str) -> Option<&Connection> {
        self.connections
            .get(peer)?
            .iter()
            .find(|connection| connection.socket_name().as_str() == socket_name)
    }

    /// Mutable variant of [`ConnectionRegistry::get`].
    pub fn get_mut(&mut self, peer: &PeerId, socket_name: &str) -> Option<&mut Connection> {
        self.connections
            .get_mut(peer)?
            .iter_mut()
            .find(|connection| connection.socket_name().as_str() == socket_name)
    }

    /// Returns true if a connection with `peer` on `socket_name` exists.
    pub fn contains(&self, peer: &PeerId, socket_name: &str) -> bool {
        self.get(peer, socket_name).is_some()
    }

    /// Returns true if at least one connection with `peer` exists.
    pub fn has_peer(&self, peer: &PeerId) -> bool {
        self.connections.contains_key(peer)
    }

    /// Number of connections with `peer`.
    pub fn peer_connection_count(&self, peer: &PeerId) -> usize {
        self.connections.get(peer).map_or(0, Vec::len)
    }

    /// Returns the connection to open, creating it if needed.
    ///
    /// The boolean is true when the connection was created by this call. Creating
    /// a connection fails with `TooManyConnections` once the peer has reached the
    /// limit; an existing connection is always returned.
    pub fn entry_for_open(
        &mut self,
        peer: &PeerId,
        socket_name: &SocketName,
    ) -> Result<(&mut Connection, bool)> {
        if !self.contains(peer, socket_name.as_str())
            && self.peer_connection_count(peer) >= self.max_connections
        {
            return Err(ErrorKind::TooManyConnections(self.max_connections));
        }

        let list = self.connections.entry(peer.clone()).or_default();
        match list.iter().position(|connection| connection.socket_name() == socket_name) {
            Some(position) => Ok((&mut list[position], false)),
            None => {
                list.push(Connection::new(socket_name.clone()));
                let position = list.len() - 1;
                Ok((&mut list[position], true))
            }
        }
    }

    /// Removes and invalidates a connection. Drops the peer entry once it is empty.
    pub fn remove(&mut self, peer: &PeerId, socket_name: &str) -> Option<Connection> {
        let list = self.connections.get_mut(peer)?;
        let position =
            list.iter().position(|connection| connection.socket_name().as_str() == socket_name)?;
        let mut connection = list.remove(position);
        connection.invalidate();
        if list.is_empty() {
            self.connections.remove(peer);
        }
        Some(connection)
    }

    /// Returns the peers that currently have connections.
    pub fn peers_snapshot(&self) -> Vec<PeerId> {
        self.connections.keys().cloned().collect()
    }

    /// Returns the socket names of every connection with `peer`.
    pub fn sockets_snapshot(&self, peer: &PeerId) -> Vec<SocketName> {
        self.connections
            .get(peer)
            .map(|list| list.iter().map(|connection| connection.socket_name().clone()).collect())
            .unwrap_or_default()
    }

    /// Returns every (peer, socket) pair, optionally restricted to one socket name.
    pub fn keys_snapshot(&self, socket_name: Option<&str>) -> Vec<(PeerId, SocketName)> {
        self.iter()
            .filter(|(_, connection)| {
                socket_name.map_or(true, |name| connection.socket_name().as_str() == name)
            })
            .map(|(peer, connection)| (peer.clone(), connection.socket_name().clone()))
            .collect()
    }

    /// Iterates over every connection.
    pub fn iter(&self) -> impl Iterator<Item = (&PeerId, &Connection)> {
        self.connections
            .iter()
            .flat_map(|(peer, list)| list.iter().map(move |connection| (peer, connection)))
    }

    /// Number of peers with at least one connection.
    pub fn peer_count(&self) -> usize {
        self.connections.len()
    }

    /// Returns true if there are no connections.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Number of connections across all peers.
    pub fn all_connections_count(&self) -> usize {
        self.connections.values().map(Vec::len).sum()
    }

    /// Number of connections waiting for the remote side.
    pub fn pending_outgoing_count(&self) -> usize {
        self.iter().filter(|(_, connection)| connection.is_pending_outgoing()).count()
    }

    /// Number of connections waiting for the local side.
    pub fn pending_incoming_count(&self) -> usize {
        self.iter().filter(|(_, connection)| connection.is_pending_incoming()).count()
    }

    /// Number of connections opened by both sides.
    pub fn fully_opened_count(&self) -> usize {
        self.iter().filter(|(_, connection)| connection.is_fully_opened()).count()
    }
}
