// CLI entry point for the couchsync relay.
//
// Starts a standalone relay server that viewer clients connect to. The
// relay keeps the authoritative playback state per session and rebroadcasts
// viewer actions — it never touches video content. See `server.rs` for the
// networking architecture and `session.rs` for the session state.
//
// Usage:
//   relay [OPTIONS]
//     --port <PORT>    Listen port (default: 8000)

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use couchsync_relay::server::{RelayConfig, start_relay};

fn main() {
    env_logger::init();

    let config = parse_args();

    let (handle, addr) = match start_relay(config) {
        Ok(result) => result,
        Err(e) => {
            eprintln!("Failed to start relay: {e}");
            std::process::exit(1);
        }
    };

    println!("Relay listening on {addr}");
    println!("Press Ctrl+C to stop.");

    // Wait for Ctrl+C.
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = running.clone();
    ctrlc_wait(running_clone);

    while running.load(Ordering::SeqCst) {
        std::thread::sleep(std::time::Duration::from_millis(100));
    }

    println!("\nShutting down...");
    handle.stop();
}

/// Parse command-line arguments into a `RelayConfig`. Uses simple
/// `std::env::args()` matching — no clap dependency.
fn parse_args() -> RelayConfig {
    let mut config = RelayConfig::default();
    let args: Vec<String> = std::env::args().collect();
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "--port" => {
                i += 1;
                config.port = args.get(i).and_then(|s| s.parse().ok()).unwrap_or_else(|| {
                    eprintln!("--port requires a valid port number");
                    std::process::exit(1);
                });
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            other => {
                eprintln!("Unknown argument: {other}");
                print_usage();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    config
}

fn print_usage() {
    println!("Usage: relay [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --port <PORT>    Listen port (default: 8000)");
    println!("  --help, -h       Show this help");
}

/// Block until Ctrl+C is pressed, then set the flag to false.
fn ctrlc_wait(running: Arc<AtomicBool>) {
    // The process exits on SIGINT/SIGTERM by default, which is fine for a
    // relay with no persistent state — the main loop only spins so the
    // handle stays alive. If graceful shutdown is ever needed, add the
    // `ctrlc` crate here.
    let _ = running;
}
