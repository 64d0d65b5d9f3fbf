use std::time::Instant;

use peerlink_core::{
    error::{ErrorKind, P2PError, Result},
    id::{PeerId, SocketName},
    transport::{OutgoingDatagram, P2PInterface, PacketReliability},
};
use peerlink_peer::{Connection, MessageKey};
use peerlink_protocol::{is_confirmation_packet, FragmentHeader, ReceivedPacket};
use tracing::{error, trace, warn};

use super::TransportManager;

impl<P: P2PInterface> TransportManager<P> {
    /// Sends `payload` to `peer` on an existing socket connection, fragmenting it as
    /// needed. Every fragment uses the given channel, reliability and delayed
    /// delivery flag.
    ///
    /// A failing fragment send aborts the remaining fragments.
    pub fn send_packet(
        &mut self,
        peer: &PeerId,
        socket_name: &str,
        payload: &[u8],
        channel: u8,
        allow_delayed_delivery: bool,
        reliability: PacketReliability,
    ) -> Result<()> {
        let local = self.local_user()?;
        if payload.is_empty() {
            error!("Unable to send to {} on '{}': payload is empty", peer, socket_name);
            return Err(ErrorKind::EmptyPayload);
        }
        if !peer.is_valid() {
            error!("Unable to send on '{}': invalid peer id '{}'", socket_name, peer);
            return Err(ErrorKind::InvalidPeerId(peer.to_string()));
        }
        let max = self.fragmenter.max_message_size();
        if payload.len() > max {
            error!("Unable to send {} bytes to {}: limit is {} bytes", payload.len(), peer, max);
            return Err(ErrorKind::PayloadTooLarge { size: payload.len(), max });
        }

        let Some(connection) = self.registry.get_mut(peer, socket_name) else {
            error!("Unable to send to {}: no '{}' connection", peer, socket_name);
            return Err(ErrorKind::ConnectionNotFound {
                peer: peer.to_string(),
                socket: socket_name.to_owned(),
            });
        };
        let socket = connection.socket_name().clone();
        let message_index = connection.next_message_index();

        let fragments = self.fragmenter.split(payload, message_index)?;
        let count = fragments.len();
        for (index, datagram) in fragments.enumerate() {
            let outgoing = OutgoingDatagram {
                local: &local,
                remote: peer,
                socket_name: &socket,
                channel,
                reliability,
                allow_delayed_delivery,
                data: &datagram,
            };
            if let Err(err) = self.primitive.send_packet(outgoing) {
                error!(
                    "Failed to send fragment {}/{} of message {} to {} on '{}': {}",
                    index + 1,
                    count,
                    message_index,
                    peer,
                    socket,
                    err
                );
                return Err(err.into());
            }
            self.statistics.fragments_sent += 1;
        }

        self.statistics.packets_sent += 1;
        self.statistics.bytes_sent += payload.len() as u64;
        trace!(
            "Sent {} bytes to {} on '{}' channel {} in {} fragment(s)",
            payload.len(),
            peer,
            socket,
            channel,
            count
        );
        Ok(())
    }

    /// Pulls at most one datagram from the primitive and returns a payload if it
    /// completed one.
    ///
    /// Pending notifications are applied first. Confirmation packets, malformed
    /// datagrams and datagrams from peers without a fully opened connection are
    /// consumed without surfacing anything.
    pub fn try_receive_packet(&mut self) -> Option<ReceivedPacket> {
        self.process_notifications();
        let local = self.local_user.clone()?;

        self.primitive.next_received_packet_size(&local, None)?;
        let time = self.clock.now();
        let (incoming, data) = match self.primitive.receive_packet(&local, &mut self.receive_buffer, None) {
            Ok(received) => received,
            Err(P2PError::NotFound) => return None,
            Err(err) => {
                error!("Failed to receive packet: {}", err);
                return None;
            }
        };
        self.statistics.datagrams_received += 1;

        let (header, payload) = match FragmentHeader::parse(data) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!("Discarding datagram from {}: {}", incoming.remote, err);
                self.statistics.datagrams_discarded += 1;
                return None;
            }
        };
        if !incoming.remote.is_valid() {
            warn!("Discarding datagram from invalid peer id '{}'", incoming.remote);
            self.statistics.datagrams_discarded += 1;
            return None;
        }
        let socket_name = match SocketName::new(incoming.socket_name) {
            Ok(socket_name) => socket_name,
            Err(err) => {
                warn!("Discarding datagram from {}: {}", incoming.remote, err);
                self.statistics.datagrams_discarded += 1;
                return None;
            }
        };
        let remote = incoming.remote;

        if is_confirmation_packet(incoming.channel, payload) {
            self.statistics.confirmations_received += 1;
            self.handle_confirmation(&local, &remote, &socket_name);
            return None;
        }

        let is_open = self
            .registry
            .get(&remote, socket_name.as_str())
            .is_some_and(Connection::is_fully_opened);
        if !is_open {
            warn!(
                "Discarding datagram from {} on '{}': connection is not fully opened",
                remote, socket_name
            );
            self.statistics.datagrams_discarded += 1;
            return None;
        }

        let key = MessageKey {
            remote: remote.clone(),
            socket_name: socket_name.clone(),
            message_index: header.message_index,
        };
        let assembled = self.reassembly.insert(key, header, payload, time)?;

        self.statistics.packets_delivered += 1;
        self.statistics.bytes_delivered += assembled.len() as u64;
        trace!("Received {} bytes from {} on '{}'", assembled.len(), remote, socket_name);
        Some(ReceivedPacket::new(remote, socket_name, incoming.channel, assembled))
    }

    /// Evicts incomplete inbound messages older than the reassembly timeout.
    pub fn sweep_stale_messages(&mut self, time: Instant) -> usize {
        let evicted = self.reassembly.cleanup_stale(time);
        self.statistics.stale_messages_evicted += evicted as u64;
        evicted
    }
}
