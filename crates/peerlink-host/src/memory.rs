//! In-memory P2P primitive for tests and demos.
//!
//! A [`MemoryNetwork`] is a hub shared by any number of [`MemoryEndpoint`]s, one per
//! local user. It follows the connection model of a relay based P2P service:
//!
//! - `accept_connection(local, remote, socket)` marks the local side of the socket as
//!   accepted. If the remote side has not accepted yet, the remote receives a
//!   connection request notification.
//! - `close_connection(local, remote, socket)` withdraws the local side. If the remote
//!   had accepted, it receives a connection closed notification.
//! - Datagrams are queued per receiving user in send order and are accepted only from
//!   a user that accepted the socket.
//!
//! Faults (failing accepts, closes or sends) can be injected to exercise the error
//! paths of the transport manager. Queued datagrams can be drained and re-injected,
//! which lets tests reorder, duplicate or forge traffic.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use crossbeam_channel::Sender;
use peerlink_core::{
    constants::DEFAULT_MAX_PACKET_SIZE,
    error::P2PError,
    id::{PeerId, SocketName},
    transport::{
        ConnectionClosedReason, IncomingDatagram, NatType, NotificationId, OutgoingDatagram,
        P2PInterface, PeerNotification,
    },
};
use tracing::trace;

/// A datagram waiting in a user's receive queue.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueuedDatagram {
    /// Sending user
    pub from: PeerId,
    /// Socket the datagram travels on
    pub socket_name: String,
    /// Channel number
    pub channel: u8,
    /// Raw datagram bytes, fragment header included
    pub data: Vec<u8>,
}

#[derive(Debug)]
struct Subscription {
    local: PeerId,
    socket_name: Option<SocketName>,
    sender: Sender<PeerNotification>,
}

impl Subscription {
    fn matches(&self, local: &PeerId, socket_name: &SocketName) -> bool {
        &self.local == local && self.socket_name.as_ref().map_or(true, |name| name == socket_name)
    }
}

#[derive(Debug, Default)]
struct Faults {
    accept: Option<P2PError>,
    close: Option<P2PError>,
    /// Number of sends that still succeed; `None` means unlimited
    send_budget: Option<usize>,
}

#[derive(Debug, Default)]
struct Hub {
    /// (local, remote, socket) triples whose local side accepted
    accepted: HashSet<(PeerId, PeerId, SocketName)>,
    queues: HashMap<PeerId, VecDeque<QueuedDatagram>>,
    request_subscriptions: HashMap<NotificationId, Subscription>,
    closed_subscriptions: HashMap<NotificationId, Subscription>,
    next_subscription: u64,
    faults: Faults,
    nat_type: NatType,
    nat_queried: bool,
    datagrams_sent: u64,
}

impl Hub {
    fn subscribe(
        &mut self,
        request: bool,
        local: &PeerId,
        socket_name: Option<&SocketName>,
        sender: Sender<PeerNotification>,
    ) -> NotificationId {
        self.next_subscription += 1;
        let id = NotificationId(self.next_subscription);
        let subscription =
            Subscription { local: local.clone(), socket_name: socket_name.cloned(), sender };
        if request {
            self.request_subscriptions.insert(id, subscription);
        } else {
            self.closed_subscriptions.insert(id, subscription);
        }
        id
    }

    fn notify_request(&self, to: &PeerId, from: &PeerId, socket_name: &SocketName) {
        for subscription in self.request_subscriptions.values() {
            if subscription.matches(to, socket_name) {
                let notification = PeerNotification::ConnectionRequested {
                    local: to.clone(),
                    remote: from.clone(),
                    socket_name: socket_name.to_string(),
                };
                // A dropped receiver only means the listener went away
                let _ = subscription.sender.send(notification);
            }
        }
    }

    fn notify_closed(
        &self,
        to: &PeerId,
        from: &PeerId,
        socket_name: &SocketName,
        reason: ConnectionClosedReason,
    ) {
        for subscription in self.closed_subscriptions.values() {
            if subscription.matches(to, socket_name) {
                let notification = PeerNotification::ConnectionClosed {
                    local: to.clone(),
                    remote: from.clone(),
                    socket_name: socket_name.to_string(),
                    reason,
                };
                let _ = subscription.sender.send(notification);
            }
        }
    }

    fn is_accepted(&self, local: &PeerId, remote: &PeerId, socket_name: &SocketName) -> bool {
        self.accepted.contains(&(local.clone(), remote.clone(), socket_name.clone()))
    }
}

/// Shared in-memory network.
#[derive(Clone, Debug)]
pub struct MemoryNetwork {
    hub: Arc<Mutex<Hub>>,
    max_packet_size: usize,
}

impl Default for MemoryNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryNetwork {
    /// Creates an empty network accepting datagrams of the default maximal size.
    pub fn new() -> Self {
        Self::with_max_packet_size(DEFAULT_MAX_PACKET_SIZE)
    }

    /// Creates an empty network with a custom datagram ceiling.
    pub fn with_max_packet_size(max_packet_size: usize) -> Self {
        Self { hub: Arc::new(Mutex::new(Hub::default())), max_packet_size }
    }

    /// Returns a new endpoint attached to this network.
    pub fn endpoint(&self) -> MemoryEndpoint {
        MemoryEndpoint { hub: Arc::clone(&self.hub), max_packet_size: self.max_packet_size }
    }

    fn hub(&self) -> MutexGuard<'_, Hub> {
        self.hub.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes every following `accept_connection` fail with `error` (`None` to stop).
    pub fn fail_accept(&self, error: Option<P2PError>) {
        self.hub().faults.accept = error;
    }

    /// Makes every following `close_connection` fail with `error` (`None` to stop).
    pub fn fail_close(&self, error: Option<P2PError>) {
        self.hub().faults.close = error;
    }

    /// Lets only `budget` more sends succeed (`None` for unlimited).
    pub fn limit_sends(&self, budget: Option<usize>) {
        self.hub().faults.send_budget = budget;
    }

    /// Sets the NAT type reported after a query.
    pub fn set_nat_type(&self, nat_type: NatType) {
        self.hub().nat_type = nat_type;
    }

    /// Returns true if `local` accepted `socket_name` with `remote`.
    pub fn is_accepted(&self, local: &PeerId, remote: &PeerId, socket_name: &str) -> bool {
        let hub = self.hub();
        hub.accepted.iter().any(|(l, r, s)| l == local && r == remote && s.as_str() == socket_name)
    }

    /// Number of datagrams waiting for `local`.
    pub fn queued(&self, local: &PeerId) -> usize {
        self.hub().queues.get(local).map_or(0, VecDeque::len)
    }

    /// Total number of datagrams accepted by the network.
    pub fn datagrams_sent(&self) -> u64 {
        self.hub().datagrams_sent
    }

    /// Number of active notification subscriptions.
    pub fn subscription_count(&self) -> usize {
        let hub = self.hub();
        hub.request_subscriptions.len() + hub.closed_subscriptions.len()
    }

    /// Removes and returns every datagram waiting for `local`.
    pub fn drain_queue(&self, local: &PeerId) -> Vec<QueuedDatagram> {
        self.hub().queues.remove(local).map(Vec::from).unwrap_or_default()
    }

    /// Appends a datagram to the queue of `local`, bypassing every check.
    pub fn inject(&self, local: &PeerId, datagram: QueuedDatagram) {
        self.hub().queues.entry(local.clone()).or_default().push_back(datagram);
    }
}

/// One user's view of a [`MemoryNetwork`].
#[derive(Clone, Debug)]
pub struct MemoryEndpoint {
    hub: Arc<Mutex<Hub>>,
    max_packet_size: usize,
}

impl MemoryEndpoint {
    fn hub(&self) -> MutexGuard<'_, Hub> {
        self.hub.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl P2PInterface for MemoryEndpoint {
    fn max_packet_size(&self) -> usize {
        self.max_packet_size
    }

    fn send_packet(&mut self, datagram: OutgoingDatagram<'_>) -> Result<(), P2PError> {
        if datagram.data.len() > self.max_packet_size {
            return Err(P2PError::InvalidParameters);
        }

        let mut hub = self.hub();
        if !hub.is_accepted(datagram.local, datagram.remote, datagram.socket_name) {
            return Err(P2PError::NoConnection);
        }
        if let Some(budget) = hub.faults.send_budget.as_mut() {
            if *budget == 0 {
                return Err(P2PError::LimitExceeded);
            }
            *budget -= 1;
        }

        hub.datagrams_sent += 1;
        hub.queues.entry(datagram.remote.clone()).or_default().push_back(QueuedDatagram {
            from: datagram.local.clone(),
            socket_name: datagram.socket_name.to_string(),
            channel: datagram.channel,
            data: datagram.data.to_vec(),
        });
        Ok(())
    }

    fn next_received_packet_size(
        &mut self,
        local: &PeerId,
        requested_channel: Option<u8>,
    ) -> Option<usize> {
        let hub = self.hub();
        hub.queues
            .get(local)?
            .iter()
            .find(|queued| requested_channel.map_or(true, |channel| queued.channel == channel))
            .map(|queued| queued.data.len())
    }

    fn receive_packet<'a>(
        &mut self,
        local: &PeerId,
        buffer: &'a mut [u8],
        requested_channel: Option<u8>,
    ) -> Result<(IncomingDatagram, &'a [u8]), P2PError> {
        let mut hub = self.hub();
        let queue = hub.queues.get_mut(local).ok_or(P2PError::NotFound)?;
        let position = queue
            .iter()
            .position(|queued| requested_channel.map_or(true, |channel| queued.channel == channel))
            .ok_or(P2PError::NotFound)?;
        let queued = queue.remove(position).ok_or(P2PError::NotFound)?;

        if queued.data.len() > buffer.len() {
            return Err(P2PError::InvalidParameters);
        }
        let length = queued.data.len();
        buffer[..length].copy_from_slice(&queued.data);
        let incoming = IncomingDatagram {
            remote: queued.from,
            socket_name: queued.socket_name,
            channel: queued.channel,
        };
        Ok((incoming, &buffer[..length]))
    }

    fn accept_connection(
        &mut self,
        local: &PeerId,
        remote: &PeerId,
        socket_name: &SocketName,
    ) -> Result<(), P2PError> {
        let mut hub = self.hub();
        if let Some(error) = hub.faults.accept.clone() {
            return Err(error);
        }

        let newly_accepted =
            hub.accepted.insert((local.clone(), remote.clone(), socket_name.clone()));
        if newly_accepted && !hub.is_accepted(remote, local, socket_name) {
            trace!("{} requests '{}' from {}", local, socket_name, remote);
            hub.notify_request(remote, local, socket_name);
        }
        Ok(())
    }

    fn close_connection(
        &mut self,
        local: &PeerId,
        remote: &PeerId,
        socket_name: &SocketName,
    ) -> Result<(), P2PError> {
        let mut hub = self.hub();
        if let Some(error) = hub.faults.close.clone() {
            return Err(error);
        }

        let was_accepted =
            hub.accepted.remove(&(local.clone(), remote.clone(), socket_name.clone()));
        let remote_accepted =
            hub.accepted.remove(&(remote.clone(), local.clone(), socket_name.clone()));
        if remote_accepted {
            let reason = if was_accepted {
                ConnectionClosedReason::ClosedByPeer
            } else {
                ConnectionClosedReason::ConnectionFailed
            };
            trace!("{} closes '{}' with {} ({:?})", local, socket_name, remote, reason);
            hub.notify_closed(remote, local, socket_name, reason);
        }
        Ok(())
    }

    fn add_notify_peer_connection_request(
        &mut self,
        local: &PeerId,
        socket_name: Option<&SocketName>,
        sender: Sender<PeerNotification>,
    ) -> NotificationId {
        self.hub().subscribe(true, local, socket_name, sender)
    }

    fn remove_notify_peer_connection_request(&mut self, id: NotificationId) {
        self.hub().request_subscriptions.remove(&id);
    }

    fn add_notify_peer_connection_closed(
        &mut self,
        local: &PeerId,
        socket_name: Option<&SocketName>,
        sender: Sender<PeerNotification>,
    ) -> NotificationId {
        self.hub().subscribe(false, local, socket_name, sender)
    }

    fn remove_notify_peer_connection_closed(&mut self, id: NotificationId) {
        self.hub().closed_subscriptions.remove(&id);
    }

    fn query_nat_type(&mut self) -> Result<NatType, P2PError> {
        let mut hub = self.hub();
        hub.nat_queried = true;
        Ok(hub.nat_type)
    }

    fn nat_type(&self) -> Result<NatType, P2PError> {
        let hub = self.hub();
        if hub.nat_queried {
            Ok(hub.nat_type)
        } else {
            Err(P2PError::NotFound)
        }
    }
}

#[cfg(test)]
mod tests {
    use crossbeam_channel::unbounded;
    use peerlink_core::transport::PacketReliability;

    use super::*;

    fn socket() -> SocketName {
        SocketName::new("Game").unwrap()
    }

    fn outgoing<'a>(
        local: &'a PeerId,
        remote: &'a PeerId,
        socket_name: &'a SocketName,
        data: &'a [u8],
    ) -> OutgoingDatagram<'a> {
        OutgoingDatagram {
            local,
            remote,
            socket_name,
            channel: 0,
            reliability: PacketReliability::ReliableOrdered,
            allow_delayed_delivery: false,
            data,
        }
    }

    #[test]
    fn test_accept_notifies_remote_once() {
        let network = MemoryNetwork::new();
        let (a, b) = (PeerId::new("alice"), PeerId::new("bob"));
        let mut alice = network.endpoint();
        let mut bob = network.endpoint();
        let (sender, receiver) = unbounded();
        bob.add_notify_peer_connection_request(&b, None, sender);

        alice.accept_connection(&a, &b, &socket()).unwrap();
        alice.accept_connection(&a, &b, &socket()).unwrap();
        assert_eq!(receiver.try_iter().count(), 1);

        // Accepting a pending request does not notify back
        bob.accept_connection(&b, &a, &socket()).unwrap();
        assert!(network.is_accepted(&b, &a, "Game"));
    }

    #[test]
    fn test_socket_filter() {
        let network = MemoryNetwork::new();
        let (a, b) = (PeerId::new("alice"), PeerId::new("bob"));
        let (sender, receiver) = unbounded();
        let chat = SocketName::new("Chat").unwrap();
        network.endpoint().add_notify_peer_connection_request(&b, Some(&chat), sender);

        network.endpoint().accept_connection(&a, &b, &socket()).unwrap();
        assert!(receiver.try_recv().is_err());
        network.endpoint().accept_connection(&a, &b, &chat).unwrap();
        assert!(receiver.try_recv().is_ok());
    }

    #[test]
    fn test_close_notifies_remote() {
        let network = MemoryNetwork::new();
        let (a, b) = (PeerId::new("alice"), PeerId::new("bob"));
        let mut alice = network.endpoint();
        let (sender, receiver) = unbounded();
        alice.add_notify_peer_connection_closed(&a, None, sender);

        alice.accept_connection(&a, &b, &socket()).unwrap();
        network.endpoint().accept_connection(&b, &a, &socket()).unwrap();
        network.endpoint().close_connection(&b, &a, &socket()).unwrap();

        match receiver.try_recv().unwrap() {
            PeerNotification::ConnectionClosed { remote, reason, .. } => {
                assert_eq!(remote, b);
                assert_eq!(reason, ConnectionClosedReason::ClosedByPeer);
            }
            other => panic!("unexpected notification {:?}", other),
        }
        assert!(!network.is_accepted(&a, &b, "Game"));
    }

    #[test]
    fn test_send_requires_accepted_socket() {
        let network = MemoryNetwork::new();
        let (a, b) = (PeerId::new("alice"), PeerId::new("bob"));
        let mut alice = network.endpoint();
        let socket = socket();

        let result = alice.send_packet(outgoing(&a, &b, &socket, b"hi"));
        assert_eq!(result, Err(P2PError::NoConnection));

        alice.accept_connection(&a, &b, &socket).unwrap();
        alice.send_packet(outgoing(&a, &b, &socket, b"hi")).unwrap();
        assert_eq!(network.queued(&b), 1);
    }

    #[test]
    fn test_receive_in_send_order() {
        let network = MemoryNetwork::new();
        let (a, b) = (PeerId::new("alice"), PeerId::new("bob"));
        let mut alice = network.endpoint();
        let mut bob = network.endpoint();
        let socket = socket();
        alice.accept_connection(&a, &b, &socket).unwrap();
        alice.send_packet(outgoing(&a, &b, &socket, b"one")).unwrap();
        alice.send_packet(outgoing(&a, &b, &socket, b"two")).unwrap();

        let mut buffer = [0u8; 16];
        assert_eq!(bob.next_received_packet_size(&b, None), Some(3));
        let (incoming, data) = bob.receive_packet(&b, &mut buffer, None).unwrap();
        assert_eq!(incoming.remote, a);
        assert_eq!(incoming.socket_name, "Game");
        assert_eq!(data, b"one");
        let (_, data) = bob.receive_packet(&b, &mut buffer, None).unwrap();
        assert_eq!(data, b"two");
        assert_eq!(bob.receive_packet(&b, &mut buffer, None).unwrap_err(), P2PError::NotFound);
    }

    #[test]
    fn test_oversized_datagram_rejected() {
        let network = MemoryNetwork::with_max_packet_size(8);
        let (a, b) = (PeerId::new("alice"), PeerId::new("bob"));
        let mut alice = network.endpoint();
        let socket = socket();
        alice.accept_connection(&a, &b, &socket).unwrap();
        let result = alice.send_packet(outgoing(&a, &b, &socket, &[0u8; 9]));
        assert_eq!(result, Err(P2PError::InvalidParameters));
    }

    #[test]
    fn test_send_budget() {
        let network = MemoryNetwork::new();
        let (a, b) = (PeerId::new("alice"), PeerId::new("bob"));
        let mut alice = network.endpoint();
        let socket = socket();
        alice.accept_connection(&a, &b, &socket).unwrap();
        network.limit_sends(Some(1));

        assert!(alice.send_packet(outgoing(&a, &b, &socket, b"x")).is_ok());
        assert_eq!(
            alice.send_packet(outgoing(&a, &b, &socket, b"y")),
            Err(P2PError::LimitExceeded)
        );
    }

    #[test]
    fn test_nat_type_requires_query() {
        let network = MemoryNetwork::new();
        network.set_nat_type(NatType::Moderate);
        let mut endpoint = network.endpoint();
        assert_eq!(endpoint.nat_type(), Err(P2PError::NotFound));
        assert_eq!(endpoint.query_nat_type(), Ok(NatType::Moderate));
        assert_eq!(endpoint.nat_type(), Ok(NatType::Moderate));
    }
}
