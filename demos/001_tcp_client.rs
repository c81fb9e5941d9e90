//! TCP client pipeline demonstration.
//!
//! Demonstrates:
//! - Bringing up the link (host link, already on a network)
//! - Resolving the peer by multicast DNS name
//! - Heartbeat and interactive producers sharing one session
//! - Ending the session with an empty line
//!
//! The peer must answer `<peer>.local` queries. To try it against a local
//! `nc -lk 3333`, resolve through the OS with `--system --peer localhost`.
//!
//! Usage:
//!   cargo run --example 001_tcp_client
//!   cargo run --example 001_tcp_client -- --peer esp32 --port 3333
//!   cargo run --example 001_tcp_client -- --system --peer localhost
//!   cargo run --example 001_tcp_client -- --config rendezvous.json
//!   cargo run --example 001_tcp_client -- --no-heartbeat --debug

mod common;

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use common::Args;
use wifi_rendezvous::{
    ConnectionLifecycle, DiscoveryEngine, HostLink, LifecycleConfig, MdnsEngine, SystemEngine,
    stdin_lines,
};

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let args = Args::parse();
    common::init_logging(args.debug);

    if let Err(e) = run(args).await {
        eprintln!("\n[ERROR] {e:#}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    println!("=== 001: TCP Client ===\n");

    // ========================================================================
    // Configuration
    // ========================================================================

    println!("[1] Loading configuration...");

    let config = match &args.config {
        Some(path) => {
            println!("    File: {}", path.display());
            LifecycleConfig::from_json_file(path)?
        }
        None => LifecycleConfig::new()
            .with_credentials("host-network", "")
            .with_peer_host(args.peer.as_str(), args.port),
    };

    println!("    Peer: {}", config.peer.query_name());
    println!("    ✓ Configuration ready\n");

    // ========================================================================
    // Lifecycle
    // ========================================================================

    println!("[2] Building lifecycle...");

    let link = HostLink::detect();
    println!("    Host address: {}", link.address());

    let engine: Arc<dyn DiscoveryEngine> = if args.system {
        println!("    Engine: OS resolver");
        Arc::new(SystemEngine::new())
    } else {
        println!("    Engine: multicast DNS");
        Arc::new(MdnsEngine::new()?)
    };

    let lifecycle = ConnectionLifecycle::builder()
        .transport(config.session.tcp_transport())
        .config(config)
        .link_driver(Arc::new(link))
        .engine(engine)
        .observer(Box::new(|response: &[u8]| {
            println!("[Received] {}", String::from_utf8_lossy(response));
        }))
        .build()?;

    println!("    ✓ Lifecycle ready\n");

    // ========================================================================
    // Producers
    // ========================================================================

    println!("[3] Starting producers...");

    let heartbeat = if args.no_heartbeat {
        println!("    Heartbeat disabled");
        None
    } else {
        println!(
            "    Heartbeat every {}ms",
            lifecycle.config().session.heartbeat_interval_ms
        );
        Some(lifecycle.spawn_heartbeat())
    };
    let interactive = lifecycle.spawn_interactive(stdin_lines());

    println!("    ✓ Type a line and press Enter to send; empty line stops\n");

    // ========================================================================
    // Session
    // ========================================================================

    println!("[4] Running session...");

    let outcome = lifecycle.run().await?;

    println!("\n    Session: {}", outcome.session_id);
    println!("    Peer: {}", outcome.peer);
    println!("    Reason: {:?}", outcome.reason);
    println!("    Written: {}", outcome.written);
    println!("    Responses: {}", outcome.responses);
    println!("    Discarded: {}", outcome.discarded);

    if let Some(heartbeat) = heartbeat {
        let stats = heartbeat.await?;
        println!("    Heartbeats: {} sent, {} dropped", stats.sent, stats.dropped);
    }
    if interactive.is_finished() {
        let stats = interactive.await??;
        println!("    Lines: {} sent", stats.sent);
    }

    println!("\n=== Done ===");
    Ok(())
}
