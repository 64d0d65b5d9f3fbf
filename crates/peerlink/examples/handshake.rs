//! Two peers open a socket connection and exchange a fragmented message.
//!
//! Run:
//! - RUST_LOG=trace cargo run -p peerlink --example handshake

use std::time::Instant;

use peerlink::prelude::*;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let network = MemoryNetwork::new();
    let (alice_id, bob_id) = (PeerId::new("alice"), PeerId::new("bob"));

    let mut alice = TransportManager::new(network.endpoint(), Config::default());
    let mut bob = TransportManager::new(network.endpoint(), Config::default());
    alice.initialize(&alice_id)?;
    bob.initialize(&bob_id)?;

    alice.open_connection(&bob_id, "Game")?;
    bob.poll();
    while let Some(event) = bob.recv_event() {
        println!("[bob] {:?}", event);
        if let ConnectionEvent::IncomingRequest { peer, socket_name } = event {
            bob.open_connection(&peer, socket_name.as_str())?;
        }
    }

    // Alice completes the handshake once Bob's confirmation arrives
    while alice.try_receive_packet().is_some() {}
    while bob.try_receive_packet().is_some() {}
    while let Some(event) = alice.recv_event() {
        println!("[alice] {:?}", event);
    }
    println!("alice: {}", alice.debug_string(true));

    let message: Vec<u8> = (0..5000u32).map(|i| (i % 256) as u8).collect();
    alice.send_packet(&bob_id, "Game", &message, 0, false, PacketReliability::ReliableOrdered)?;
    println!("queued {} datagrams for bob", network.queued(&bob_id));

    for _ in 0..network.queued(&bob_id) {
        if let Some(packet) = bob.try_receive_packet() {
            println!(
                "[bob] {} bytes from {} on '{}', intact: {}",
                packet.payload().len(),
                packet.remote(),
                packet.socket_name(),
                packet.payload() == &message[..]
            );
        }
    }

    alice.close_connection(&bob_id, "Game", false)?;
    bob.manual_poll(Instant::now());
    while let Some(event) = bob.recv_event() {
        println!("[bob] {:?}", event);
    }
    println!("statistics: {:?}", bob.statistics());
    Ok(())
}
