//! Echo server with a handful of clients over the in-memory network.
//!
//! Run:
//! - cargo run -p peerlink --example echo
//! - RUST_LOG=peerlink_host=debug cargo run -p peerlink --example echo

use std::{thread, time::Duration};

use peerlink::prelude::*;
use tracing_subscriber::EnvFilter;

const CLIENTS: [&str; 3] = ["ada", "brian", "grace"];

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let network = MemoryNetwork::new();
    let server_id = PeerId::new("server");

    let mut server = P2PTransport::new(network.endpoint(), Config::default())?;
    server.initialize(&server_id)?;
    server.start_server()?;
    println!("Echo server running as '{}'", server_id);

    let mut clients = Vec::new();
    for name in CLIENTS {
        let mut client = P2PTransport::new(network.endpoint(), Config::default())?;
        client.initialize(&PeerId::new(name))?;
        client.start_client(&server_id)?;
        clients.push((name, client));
    }

    let mut echoed = 0;
    for _ in 0..100 {
        server.poll();
        loop {
            match server.poll_event() {
                TransportEvent::Nothing => break,
                TransportEvent::Connect(id) => println!("[server] client {} connected", id),
                TransportEvent::Disconnect(id) => println!("[server] client {} disconnected", id),
                TransportEvent::Data(id, payload) => {
                    println!("[server] {} bytes from client {}", payload.len(), id);
                    server.send(id, &payload, NetworkDelivery::ReliableFragmentedSequenced)?;
                }
            }
        }

        for (name, client) in clients.iter_mut() {
            client.poll();
            loop {
                match client.poll_event() {
                    TransportEvent::Nothing => break,
                    TransportEvent::Connect(_) => {
                        let greeting = format!("hello from {}", name);
                        client.send(0, greeting.as_bytes(), NetworkDelivery::Reliable)?;
                    }
                    TransportEvent::Data(_, payload) => {
                        println!("[{}] echo: \"{}\"", name, String::from_utf8_lossy(&payload));
                        echoed += 1;
                        client.disconnect_local_client()?;
                    }
                    TransportEvent::Disconnect(_) => println!("[{}] disconnected", name),
                }
            }
        }

        if echoed == CLIENTS.len() && server.manager().all_connections_count() == 0 {
            break;
        }
        thread::sleep(Duration::from_millis(10));
    }

    println!("{} echoes, {} datagrams on the wire", echoed, network.datagrams_sent());
    server.shutdown();
    Ok(())
}
