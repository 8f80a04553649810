//! roomcast: A multi-room chat server
//!
//! Clients speak a fixed-layout binary protocol over TCP:
//! - First chat frame registers a username
//! - Room-scoped chat with /join, /leave and /rooms
//! - Direct messages with /dm
//! - Live user list pushed on every join and leave
//!
//! Configuration via CLI arguments or TOML file.

mod config;
mod protocols;
mod runtime;

use config::Config;
use runtime::{EventLoop, Shutdown};
use std::sync::OnceLock;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

static SHUTDOWN: OnceLock<Shutdown> = OnceLock::new();

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        listen = %config.listen,
        max_connections = config.max_connections,
        max_rooms = config.max_rooms,
        max_members = config.max_members,
        "Starting roomcast server"
    );

    let event_loop = match EventLoop::bind(&config) {
        Ok(event_loop) => event_loop,
        Err(e) => {
            error!(listen = %config.listen, error = %e, "Failed to bind");
            return Err(e.into());
        }
    };

    let _ = SHUTDOWN.set(event_loop.shutdown_handle());
    install_signal_handlers();
    info!(addr = %event_loop.local_addr(), "Accepting connections");

    event_loop.run()?;
    info!("Shutdown complete");
    Ok(())
}

extern "C" fn on_signal(_signal: libc::c_int) {
    if let Some(shutdown) = SHUTDOWN.get() {
        shutdown.trigger();
    }
}

/// Route SIGINT and SIGTERM to a graceful shutdown.
fn install_signal_handlers() {
    let handler = on_signal as extern "C" fn(libc::c_int) as libc::sighandler_t;
    unsafe {
        libc::signal(libc::SIGINT, handler);
        libc::signal(libc::SIGTERM, handler);
    }
}
