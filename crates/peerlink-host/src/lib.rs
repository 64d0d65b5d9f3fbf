#![warn(missing_docs)]

//! peerlink-host: transport manager and client/server transport over a P2P primitive.

/// Event types (ConnectionEvent, TransportEvent).
pub mod event_types;
/// In-memory P2P primitive for tests and demos.
pub mod memory;
/// Time utilities for the host.
pub mod time;
/// Client/server transport adapter.
pub mod transport;
/// Connection handshake and packet pipeline over a P2P primitive.
pub mod transport_manager;

pub use event_types::{ConnectionEvent, TransportEvent};
pub use memory::{MemoryEndpoint, MemoryNetwork, QueuedDatagram};
pub use time::{Clock, ManualClock, SystemClock};
pub use transport::{NetworkDelivery, P2PTransport};
pub use transport_manager::TransportManager;
