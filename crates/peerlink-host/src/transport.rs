use std::{
    collections::{HashMap, VecDeque},
    fmt,
    sync::Arc,
    time::{Duration, Instant},
};

use peerlink_core::{
    config::Config,
    constants::SERVER_CLIENT_ID,
    error::{ErrorKind, Result},
    id::{PeerId, SocketName},
    transport::{LocalIdentity, P2PInterface, PacketReliability},
};
use tracing::{debug, error, trace, warn};

use crate::{
    event_types::{ConnectionEvent, TransportEvent},
    time::{Clock, SystemClock},
    transport_manager::TransportManager,
};

/// Delivery classes offered to the application.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum NetworkDelivery {
    /// May be dropped or reordered.
    Unreliable,
    /// Dropped packets are not resent; delivered in order.
    UnreliableSequenced,
    /// Delivered, in any order.
    Reliable,
    /// Delivered in order.
    ReliableSequenced,
    /// Delivered in order; payloads may exceed one datagram.
    ReliableFragmentedSequenced,
}

impl NetworkDelivery {
    /// Returns the reliability class requested from the primitive.
    pub fn reliability(self) -> PacketReliability {
        match self {
            NetworkDelivery::Unreliable => PacketReliability::UnreliableUnordered,
            NetworkDelivery::Reliable => PacketReliability::ReliableUnordered,
            NetworkDelivery::UnreliableSequenced
            | NetworkDelivery::ReliableSequenced
            | NetworkDelivery::ReliableFragmentedSequenced => PacketReliability::ReliableOrdered,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Mode {
    Idle,
    Server,
    Client { server: PeerId },
}

#[derive(Debug)]
struct PendingEvent {
    peer: PeerId,
    event: TransportEvent,
}

/// Client/server transport over a [`TransportManager`].
///
/// All traffic uses a single socket name (`Config::transport_socket_name`). A server
/// accepts every request on that socket and numbers its clients from 1; a client only
/// talks to the server, which it knows as client id 0.
pub struct P2PTransport<P: P2PInterface> {
    manager: TransportManager<P>,
    socket_name: SocketName,
    mode: Mode,
    next_client_id: u64,
    client_to_peer: HashMap<u64, PeerId>,
    peer_to_client: HashMap<PeerId, u64>,
    pending: VecDeque<PendingEvent>,
    clock: Arc<dyn Clock>,
}

impl<P: P2PInterface> fmt::Debug for P2PTransport<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("P2PTransport")
            .field("manager", &self.manager)
            .field("socket_name", &self.socket_name)
            .field("mode", &self.mode)
            .field("clients", &self.client_to_peer)
            .field("pending", &self.pending)
            .finish()
    }
}

impl<P: P2PInterface> P2PTransport<P> {
    /// Creates an uninitialized transport.
    pub fn new(primitive: P, config: Config) -> Result<Self> {
        Self::with_clock(primitive, config, Arc::new(SystemClock))
    }

    /// Creates an uninitialized transport with a custom clock for testing.
    pub fn with_clock(primitive: P, config: Config, clock: Arc<dyn Clock>) -> Result<Self> {
        let socket_name = SocketName::new(config.transport_socket_name.as_str())?;
        let pending = VecDeque::with_capacity(config.event_queue_capacity);
        Ok(P2PTransport {
            manager: TransportManager::with_clock(primitive, config, Arc::clone(&clock)),
            socket_name,
            mode: Mode::Idle,
            next_client_id: SERVER_CLIENT_ID + 1,
            client_to_peer: HashMap::new(),
            peer_to_client: HashMap::new(),
            pending,
            clock,
        })
    }

    /// Initializes the underlying manager and resets client ids.
    pub fn initialize(&mut self, identity: &impl LocalIdentity) -> Result<()> {
        self.manager.initialize(identity)?;
        self.reset();
        debug!("P2P transport initialized on socket '{}'", self.socket_name);
        Ok(())
    }

    /// Shuts the manager down and forgets every client.
    pub fn shutdown(&mut self) {
        debug!("Shutting down P2P transport");
        self.manager.shutdown();
        // Close events from the shutdown are not reported
        while self.manager.recv_event().is_some() {}
        self.reset();
    }

    fn reset(&mut self) {
        self.mode = Mode::Idle;
        self.next_client_id = SERVER_CLIENT_ID + 1;
        self.client_to_peer.clear();
        self.peer_to_client.clear();
        self.pending.clear();
    }

    /// Enters server mode: incoming requests on the transport socket are accepted.
    pub fn start_server(&mut self) -> Result<()> {
        if !self.manager.is_initialized() {
            error!("Unable to start server: transport is not initialized");
            return Err(ErrorKind::NotInitialized);
        }
        debug!("Entering server mode as {:?}", self.manager.local_user_id());
        self.mode = Mode::Server;
        Ok(())
    }

    /// Enters client mode and requests a connection with `server`.
    pub fn start_client(&mut self, server: &PeerId) -> Result<()> {
        if !self.manager.is_initialized() {
            error!("Unable to start client: transport is not initialized");
            return Err(ErrorKind::NotInitialized);
        }
        if !server.is_valid() {
            error!("Unable to start client: server id '{}' is invalid", server);
            return Err(ErrorKind::InvalidPeerId(server.to_string()));
        }

        self.mode = Mode::Client { server: server.clone() };
        self.manager.open_connection(server, self.socket_name.as_str())?;
        debug!("Requested '{}' connection with server {}", self.socket_name, server);
        Ok(())
    }

    /// Returns true in server mode.
    pub fn is_server(&self) -> bool {
        self.mode == Mode::Server
    }

    /// Disconnects a client from the server.
    pub fn disconnect_remote_client(&mut self, client_id: u64) -> Result<()> {
        if !self.is_server() {
            return Err(ErrorKind::NotServer);
        }
        let peer = self.peer_for(client_id)?;
        debug!("Disconnecting client {} ({})", client_id, peer);
        self.manager.close_connection(&peer, self.socket_name.as_str(), true)
    }

    /// Disconnects the local client from the server.
    pub fn disconnect_local_client(&mut self) -> Result<()> {
        let Mode::Client { server } = &self.mode else {
            return Err(ErrorKind::NotClient);
        };
        let server = server.clone();
        debug!("Disconnecting from server {}", server);
        self.manager.close_connection(&server, self.socket_name.as_str(), true)
    }

    /// Sends a payload to a client (or, on a client, to the server) on channel 0.
    ///
    /// Unordered deliveries are limited to one datagram.
    pub fn send(&mut self, client_id: u64, payload: &[u8], delivery: NetworkDelivery) -> Result<()> {
        let peer = self.peer_for(client_id)?;
        let reliability = delivery.reliability();
        let max = self.manager.max_packet_size();
        if payload.len() > max && reliability != PacketReliability::ReliableOrdered {
            error!(
                "Unable to send {} bytes to client {} with {:?}: limit is {} bytes",
                payload.len(),
                client_id,
                delivery,
                max
            );
            return Err(ErrorKind::PayloadTooLarge { size: payload.len(), max });
        }

        trace!("Sending {} bytes to client {} ({:?})", payload.len(), client_id, delivery);
        self.manager.send_packet(&peer, self.socket_name.as_str(), payload, 0, false, reliability)
    }

    /// Returns the next event. Connects and disconnects are reported before data,
    /// and at most one event is returned per call.
    pub fn poll_event(&mut self) -> TransportEvent {
        if !self.manager.is_initialized() {
            return TransportEvent::Nothing;
        }

        self.drain_connection_events();
        if let Some(pending) = self.pending.pop_front() {
            trace!("Poll event {:?} for {}", pending.event, pending.peer);
            return pending.event;
        }

        let Some(packet) = self.manager.try_receive_packet() else {
            self.drain_connection_events();
            return TransportEvent::Nothing;
        };
        self.drain_connection_events();

        if packet.socket_name() != &self.socket_name {
            warn!("Discarding packet from {} on foreign socket '{}'", packet.remote(), packet.socket_name());
            return TransportEvent::Nothing;
        }
        match self.client_id_for(packet.remote()) {
            Some(client_id) => TransportEvent::Data(client_id, packet.into_payload()),
            None => {
                warn!("Discarding packet from unknown peer {}", packet.remote());
                TransportEvent::Nothing
            }
        }
    }

    /// Per-tick update of the underlying manager.
    pub fn manual_poll(&mut self, time: Instant) {
        self.manager.manual_poll(time);
        self.drain_connection_events();
    }

    /// Polls with the transport's clock.
    pub fn poll(&mut self) {
        let now = self.clock.now();
        self.manual_poll(now);
    }

    /// Round trip time to a client. Not measured at this layer.
    pub fn current_rtt(&self, _client_id: u64) -> Duration {
        Duration::ZERO
    }

    /// Returns the client id assigned to `peer`.
    pub fn client_id_for(&self, peer: &PeerId) -> Option<u64> {
        match &self.mode {
            Mode::Server => self.peer_to_client.get(peer).copied(),
            Mode::Client { server } if server == peer => Some(SERVER_CLIENT_ID),
            _ => None,
        }
    }

    /// Returns the peer behind `client_id`.
    pub fn peer_for(&self, client_id: u64) -> Result<PeerId> {
        let peer = match &self.mode {
            Mode::Server => self.client_to_peer.get(&client_id).cloned(),
            Mode::Client { server } if client_id == SERVER_CLIENT_ID => Some(server.clone()),
            _ => None,
        };
        peer.ok_or(ErrorKind::UnknownClient(client_id))
    }

    /// Returns the underlying manager.
    pub fn manager(&self) -> &TransportManager<P> {
        &self.manager
    }

    /// Returns the underlying manager mutably.
    pub fn manager_mut(&mut self) -> &mut TransportManager<P> {
        &mut self.manager
    }

    fn drain_connection_events(&mut self) {
        while let Some(event) = self.manager.recv_event() {
            match event {
                ConnectionEvent::IncomingRequest { peer, socket_name } => {
                    self.on_incoming_request(&peer, &socket_name)
                }
                ConnectionEvent::Opened { peer, socket_name } => {
                    self.on_connection_opened(peer, &socket_name)
                }
                ConnectionEvent::Closed { peer, socket_name } => {
                    self.on_connection_closed(peer, &socket_name)
                }
            }
        }
    }

    fn on_incoming_request(&mut self, peer: &PeerId, socket_name: &SocketName) {
        if self.is_server() && socket_name == &self.socket_name {
            debug!("Accepting '{}' connection request from {}", socket_name, peer);
            if let Err(err) = self.manager.open_connection(peer, socket_name.as_str()) {
                error!("Failed to accept '{}' connection from {}: {}", socket_name, peer, err);
            }
        } else {
            debug!("Rejecting '{}' connection request from {}", socket_name, peer);
            if let Err(err) = self.manager.close_connection(peer, socket_name.as_str(), true) {
                warn!("Failed to reject '{}' connection from {}: {}", socket_name, peer, err);
            }
        }
    }

    fn on_connection_opened(&mut self, peer: PeerId, socket_name: &SocketName) {
        if socket_name != &self.socket_name {
            return;
        }
        if self.is_server() && !self.peer_to_client.contains_key(&peer) {
            let client_id = self.next_client_id;
            self.next_client_id += 1;
            self.client_to_peer.insert(client_id, peer.clone());
            self.peer_to_client.insert(peer.clone(), client_id);
        }
        match self.client_id_for(&peer) {
            Some(client_id) => {
                debug!("Client {} ({}) connected", client_id, peer);
                self.pending.push_back(PendingEvent { peer, event: TransportEvent::Connect(client_id) });
            }
            None => warn!("Connection opened with unexpected peer {}", peer),
        }
    }

    fn on_connection_closed(&mut self, peer: PeerId, socket_name: &SocketName) {
        if socket_name != &self.socket_name {
            return;
        }
        // Client ids are never reused, so the mapping is kept for late packets
        match self.client_id_for(&peer) {
            Some(client_id) => {
                debug!("Client {} ({}) disconnected", client_id, peer);
                self.pending.push_back(PendingEvent { peer, event: TransportEvent::Disconnect(client_id) });
            }
            None => trace!("Connection closed with unmapped peer {}", peer),
        }
    }
}
