use std::{fmt, sync::Arc, time::Instant};

use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use peerlink_core::{
    config::Config,
    error::{ErrorKind, Result},
    id::PeerId,
    transport::{LocalIdentity, NatType, NotificationId, P2PInterface, PeerNotification},
};
use peerlink_peer::{ConnectionRegistry, Fragmenter, ReassemblyBuffer, TransportStatistics};
use tracing::{debug, error, warn};

use crate::{
    event_types::ConnectionEvent,
    time::{Clock, SystemClock},
};

mod connections;
mod pipeline;

// ============================================================================
// Event Sink (Internal)
// ============================================================================

/// Channel-backed event sink using crossbeam `Sender`.
#[derive(Debug)]
struct ChannelSink<E>(Sender<E>);

impl<E: fmt::Debug> ChannelSink<E> {
    fn send(&self, event: E) {
        if let Err(err) = self.0.send(event) {
            warn!("Dropping event, receiver is gone: {:?}", err.into_inner());
        }
    }
}

/// Manages socket connections with remote peers over a P2P primitive and moves
/// fragmented packets through them.
///
/// Everything happens on the caller's thread. Notifications from the primitive are
/// queued on a channel and applied by [`TransportManager::manual_poll`] and
/// [`TransportManager::try_receive_packet`]. Connection state changes are surfaced as
/// [`ConnectionEvent`]s, read with [`TransportManager::recv_event`].
pub struct TransportManager<P: P2PInterface> {
    primitive: P,
    config: Config,
    clock: Arc<dyn Clock>,
    local_user: Option<PeerId>,
    registry: ConnectionRegistry,
    fragmenter: Fragmenter,
    reassembly: ReassemblyBuffer,
    receive_buffer: Vec<u8>,
    max_packet_size: usize,
    nat_type: NatType,
    notification_sender: Sender<PeerNotification>,
    notification_receiver: Receiver<PeerNotification>,
    request_notification: NotificationId,
    closed_notification: NotificationId,
    event_sink: ChannelSink<ConnectionEvent>,
    event_receiver: Receiver<ConnectionEvent>,
    statistics: TransportStatistics,
}

impl<P: P2PInterface> fmt::Debug for TransportManager<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportManager")
            .field("primitive", &"<primitive>")
            .field("config", &self.config)
            .field("local_user", &self.local_user)
            .field("registry", &self.registry)
            .field("max_packet_size", &self.max_packet_size)
            .field("nat_type", &self.nat_type)
            .field("statistics", &self.statistics)
            .finish()
    }
}

impl<P: P2PInterface> TransportManager<P> {
    /// Creates an uninitialized manager.
    pub fn new(primitive: P, config: Config) -> Self {
        Self::with_clock(primitive, config, Arc::new(SystemClock))
    }

    /// Creates an uninitialized manager with a custom clock for testing.
    pub fn with_clock(primitive: P, config: Config, clock: Arc<dyn Clock>) -> Self {
        let max_packet_size = config.max_packet_size.min(primitive.max_packet_size());
        let receive_buffer_size = config.receive_buffer_max_size.max(max_packet_size);
        let (notification_sender, notification_receiver) = unbounded();
        let (event_sender, event_receiver) = unbounded();

        TransportManager {
            registry: ConnectionRegistry::new(config.max_connections),
            fragmenter: Fragmenter::new(max_packet_size, config.max_fragments),
            reassembly: ReassemblyBuffer::new(config.reassembly_timeout),
            receive_buffer: vec![0; receive_buffer_size],
            max_packet_size,
            nat_type: NatType::Unknown,
            local_user: None,
            notification_sender,
            notification_receiver,
            request_notification: NotificationId::INVALID,
            closed_notification: NotificationId::INVALID,
            event_sink: ChannelSink(event_sender),
            event_receiver,
            statistics: TransportStatistics::default(),
            primitive,
            config,
            clock,
        }
    }

    /// Resolves the local user, subscribes to connection notifications and starts a
    /// NAT type query. Re-initializing shuts the manager down first.
    pub fn initialize(&mut self, identity: &impl LocalIdentity) -> Result<()> {
        if self.is_initialized() {
            warn!("Transport manager is already initialized, shutting down first");
            self.shutdown();
        }

        let local = match identity.local_user_id().filter(PeerId::is_valid) {
            Some(local) => local,
            None => {
                error!("Unable to initialize transport manager: no valid local user id");
                return Err(ErrorKind::InvalidLocalUser);
            }
        };

        self.request_notification = self.primitive.add_notify_peer_connection_request(
            &local,
            None,
            self.notification_sender.clone(),
        );
        if self.request_notification == NotificationId::INVALID {
            error!("Failed to subscribe to connection request notifications");
        }
        self.closed_notification = self.primitive.add_notify_peer_connection_closed(
            &local,
            None,
            self.notification_sender.clone(),
        );
        if self.closed_notification == NotificationId::INVALID {
            error!("Failed to subscribe to connection closed notifications");
        }

        debug!("Transport manager initialized for local user {}", local);
        self.local_user = Some(local);
        if let Err(err) = self.query_nat_type() {
            warn!("NAT type query failed: {}", err);
        }
        Ok(())
    }

    /// Closes every connection, cancels the notification subscriptions and returns to
    /// the uninitialized state.
    pub fn shutdown(&mut self) {
        if !self.is_initialized() {
            warn!("Transport manager is not initialized, nothing to shut down");
            return;
        }
        debug!("Shutting down transport manager: {}", self.debug_string(false));

        if let Err(err) = self.close_all_connections() {
            warn!("Some connections failed to close cleanly during shutdown: {}", err);
        }
        if self.request_notification != NotificationId::INVALID {
            self.primitive.remove_notify_peer_connection_request(self.request_notification);
            self.request_notification = NotificationId::INVALID;
        }
        if self.closed_notification != NotificationId::INVALID {
            self.primitive.remove_notify_peer_connection_closed(self.closed_notification);
            self.closed_notification = NotificationId::INVALID;
        }

        while self.notification_receiver.try_recv().is_ok() {}
        self.reassembly.clear();
        self.nat_type = NatType::Unknown;
        self.local_user = None;
    }

    /// Returns true between `initialize` and `shutdown`.
    pub fn is_initialized(&self) -> bool {
        self.local_user.is_some()
    }

    /// Returns the local user id once initialized.
    pub fn local_user_id(&self) -> Option<&PeerId> {
        self.local_user.as_ref()
    }

    fn local_user(&self) -> Result<PeerId> {
        match &self.local_user {
            Some(local) => Ok(local.clone()),
            None => {
                error!("Transport manager is not initialized");
                Err(ErrorKind::NotInitialized)
            }
        }
    }

    /// Per-tick update: applies pending notifications and evicts stale messages.
    pub fn manual_poll(&mut self, time: Instant) {
        self.process_notifications();
        self.sweep_stale_messages(time);
    }

    /// Polls with the manager's clock.
    pub fn poll(&mut self) {
        let now = self.clock.now();
        self.manual_poll(now);
    }

    /// Returns the next connection event, if any.
    pub fn recv_event(&mut self) -> Option<ConnectionEvent> {
        match self.event_receiver.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Returns the connection event receiver.
    pub fn event_receiver(&self) -> &Receiver<ConnectionEvent> {
        &self.event_receiver
    }

    /// Asks the primitive for the local NAT type.
    pub fn query_nat_type(&mut self) -> Result<NatType> {
        let nat_type = self.primitive.query_nat_type()?;
        self.nat_type = nat_type;
        Ok(nat_type)
    }

    /// Returns the last known NAT type.
    pub fn nat_type(&self) -> NatType {
        self.primitive.nat_type().unwrap_or(self.nat_type)
    }

    /// Returns a JSON formatted summary of the local user, NAT type and, optionally,
    /// every connection.
    pub fn debug_string(&self, include_connections: bool) -> String {
        let Some(local) = &self.local_user else {
            return String::from("{}");
        };

        let mut out = format!("{{\"LocalUserId\": \"{}\", \"NATType\": \"{}\"", local, self.nat_type());
        if include_connections {
            let mut peers = self.registry.peers_snapshot();
            peers.sort();
            let remote_users: Vec<String> = peers
                .iter()
                .map(|peer| {
                    let connections: Vec<String> = self
                        .registry
                        .iter()
                        .filter(|(owner, _)| *owner == peer)
                        .map(|(_, connection)| connection.debug_json())
                        .collect();
                    format!(
                        "{{\"RemoteUserId\": \"{}\", \"Connections\": [{}]}}",
                        peer,
                        connections.join(", ")
                    )
                })
                .collect();
            out.push_str(&format!(", \"RemoteUsers\": [{}]", remote_users.join(", ")));
        }
        out.push('}');
        out
    }

    /// Effective datagram ceiling: the smaller of the configured and the primitive's.
    pub fn max_packet_size(&self) -> usize {
        self.max_packet_size
    }

    /// Largest payload `send_packet` accepts.
    pub fn max_message_size(&self) -> usize {
        self.fragmenter.max_message_size()
    }

    /// Returns the configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the transport counters.
    pub fn statistics(&self) -> &TransportStatistics {
        &self.statistics
    }

    /// Returns the underlying primitive.
    pub fn primitive(&self) -> &P {
        &self.primitive
    }

    /// Returns the underlying primitive mutably.
    pub fn primitive_mut(&mut self) -> &mut P {
        &mut self.primitive
    }

    /// Number of incomplete inbound messages.
    pub fn in_flight_messages(&self) -> usize {
        self.reassembly.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryNetwork;

    fn manager(network: &MemoryNetwork) -> TransportManager<crate::memory::MemoryEndpoint> {
        TransportManager::new(network.endpoint(), Config::default())
    }

    #[test]
    fn test_initialize_requires_valid_local_user() {
        let network = MemoryNetwork::new();
        let mut manager = manager(&network);
        assert_eq!(manager.initialize(&PeerId::invalid()), Err(ErrorKind::InvalidLocalUser));
        assert!(!manager.is_initialized());
        assert_eq!(network.subscription_count(), 0);
    }

    #[test]
    fn test_initialize_and_shutdown_manage_subscriptions() {
        let network = MemoryNetwork::new();
        network.set_nat_type(NatType::Open);
        let mut manager = manager(&network);

        manager.initialize(&PeerId::new("local")).unwrap();
        assert!(manager.is_initialized());
        assert_eq!(manager.local_user_id(), Some(&PeerId::new("local")));
        assert_eq!(manager.nat_type(), NatType::Open);
        assert_eq!(network.subscription_count(), 2);

        manager.shutdown();
        assert!(!manager.is_initialized());
        assert_eq!(network.subscription_count(), 0);
    }

    #[test]
    fn test_reinitialize_does_not_leak_subscriptions() {
        let network = MemoryNetwork::new();
        let mut manager = manager(&network);
        manager.initialize(&PeerId::new("local")).unwrap();
        manager.initialize(&PeerId::new("other")).unwrap();
        assert_eq!(network.subscription_count(), 2);
        assert_eq!(manager.local_user_id(), Some(&PeerId::new("other")));
    }

    #[test]
    fn test_shutdown_uninitialized_is_noop() {
        let network = MemoryNetwork::new();
        let mut manager = manager(&network);
        manager.shutdown();
        assert!(!manager.is_initialized());
    }

    #[test]
    fn test_max_packet_size_is_clamped_to_primitive() {
        let network = MemoryNetwork::with_max_packet_size(600);
        let manager = manager(&network);
        assert_eq!(manager.max_packet_size(), 600);
        assert_eq!(manager.max_message_size(), 596 * 32768);
    }

    #[test]
    fn test_debug_string() {
        let network = MemoryNetwork::new();
        let mut manager = manager(&network);
        assert_eq!(manager.debug_string(true), "{}");

        manager.initialize(&PeerId::new("local")).unwrap();
        assert_eq!(manager.debug_string(false), "{\"LocalUserId\": \"local\", \"NATType\": \"Unknown\"}");

        manager.open_connection(&PeerId::new("remote"), "Game").unwrap();
        let debug = manager.debug_string(true);
        assert!(debug.contains("\"RemoteUserId\": \"remote\""));
        assert!(debug.contains("\"SocketName\": \"Game\""));
        assert!(debug.contains("PendingOutgoing"));
    }
}
