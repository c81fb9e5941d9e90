//! Service query loop demonstration.
//!
//! Demonstrates:
//! - Querying `_service_<port>._udp` pointers
//! - Printing each result set
//! - Selecting a connectable target
//!
//! Queries go out as multicast DNS on the local link. `--sample` answers
//! from a fixed table instead, for machines with no announcing peer.
//!
//! Usage:
//!   cargo run --example 002_query_service
//!   cargo run --example 002_query_service -- --rounds 3
//!   cargo run --example 002_query_service -- --sample --rounds 1

mod common;

// ============================================================================
// Imports
// ============================================================================

use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;

use common::Args;
use wifi_rendezvous::{
    DiscoveryEngine, Error, IpFamily, MdnsEngine, Resolver, ServiceRecord, StaticEngine,
    TxtAttribute,
};

// ============================================================================
// Constants
// ============================================================================

const QUERY_TIMEOUT: Duration = Duration::from_secs(3);
const MAX_RESULTS: usize = 20;
const ROUND_PAUSE: Duration = Duration::from_secs(1);

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
    println!("=== 002: Query Service ===\n");

    let service_type = format!("_service_{}", args.port);
    let engine: Arc<dyn DiscoveryEngine> = if args.sample {
        println!("Engine: sample table\n");
        Arc::new(sample_engine(&service_type, args.port))
    } else {
        println!("Engine: multicast DNS\n");
        Arc::new(MdnsEngine::new()?)
    };
    let resolver = Resolver::new(engine);

    let mut round = 0;
    loop {
        round += 1;
        println!("[Round {round}] Query PTR: {service_type}._udp.local");

        match resolver
            .lookup_service(&service_type, "_udp", QUERY_TIMEOUT, MAX_RESULTS)
            .await
        {
            Ok(records) => {
                println!("{records}");
                match records.select_target() {
                    Some(target) => println!("    ✓ Target: {}", target.socket_addr()),
                    None => println!("    No record carries an IPv4 target"),
                }
            }
            Err(Error::ResolutionNotFound { .. }) => println!("    No results found!"),
            Err(e) => println!("    Query failed: {e}"),
        }

        if args.rounds.is_some_and(|limit| round >= limit) {
            break;
        }
        println!();
        sleep(ROUND_PAUSE).await;
    }

    println!("\n=== Done ===");
    Ok(())
}

/// Engine announcing two instances of the service.
fn sample_engine(service_type: &str, port: u16) -> StaticEngine {
    let board = ServiceRecord::new("sta", IpFamily::V4)
        .with_instance("esp32-A1B2C3", service_type, "_udp")
        .with_srv("esp32-A1B2C3", port)
        .with_ttl(120)
        .with_txt(TxtAttribute::new("board", "esp32"))
        .with_txt(TxtAttribute::new("u", "user"))
        .with_txt(TxtAttribute::flag("p"))
        .with_address(Ipv4Addr::new(192, 168, 4, 2));

    let v6_only = ServiceRecord::new("sta", IpFamily::V6)
        .with_instance("esp32-D4E5F6", service_type, "_udp")
        .with_srv("esp32-D4E5F6", port)
        .with_ttl(120)
        .with_address(Ipv6Addr::new(0xfe80, 0, 0, 0, 0x1, 0x2, 0x3, 0x4));

    StaticEngine::new()
        .with_service(v6_only)
        .with_service(board)
        .with_latency(Duration::from_millis(200))
}
