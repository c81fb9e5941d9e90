//! Shared utilities for demos.
//!
//! Provides common functionality used across all demos:
//! - Command-line argument parsing
//! - Logging initialization

#![allow(dead_code)]

// ============================================================================
// Imports
// ============================================================================

use std::path::PathBuf;

use tracing_subscriber::EnvFilter;

// ============================================================================
// Constants
// ============================================================================

/// Peer host queried when `--peer` is not given.
pub const DEFAULT_PEER: &str = "esp32";

/// Peer port used when `--port` is not given.
pub const DEFAULT_PORT: u16 = 3333;

// ============================================================================
// Types
// ============================================================================

/// Command-line arguments for demos.
#[derive(Debug, Clone)]
pub struct Args {
    pub debug: bool,
    pub no_heartbeat: bool,
    pub system: bool,
    pub sample: bool,
    pub config: Option<PathBuf>,
    pub peer: String,
    pub port: u16,
    pub rounds: Option<usize>,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse() -> Self {
        let args: Vec<String> = std::env::args().collect();
        let value = |flag: &str| {
            args.iter()
                .position(|a| a == flag)
                .and_then(|i| args.get(i + 1))
                .cloned()
        };

        Self {
            debug: args.iter().any(|a| a == "--debug"),
            no_heartbeat: args.iter().any(|a| a == "--no-heartbeat"),
            system: args.iter().any(|a| a == "--system"),
            sample: args.iter().any(|a| a == "--sample"),
            config: value("--config").map(PathBuf::from),
            peer: value("--peer").unwrap_or_else(|| DEFAULT_PEER.to_string()),
            port: value("--port")
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_PORT),
            rounds: value("--rounds").and_then(|r| r.parse().ok()),
        }
    }
}

// ============================================================================
// Functions
// ============================================================================

/// Initialize tracing/logging.
pub fn init_logging(debug: bool) {
    let filter = if debug {
        "wifi_rendezvous=debug"
    } else {
        "wifi_rendezvous=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();
}
