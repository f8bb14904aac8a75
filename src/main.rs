//! static-responder: answers every TCP connection with one pre-loaded file.
//!
//! At start-up the payload file (`data.json` or `index.html`) is read once.
//! The server then listens on port 8080 and, one client at a time, discards
//! the request, writes a fixed header followed by the payload, and closes.
//!
//! Exit status is 0 after SIGINT/SIGTERM and 1 for any start-up failure,
//! including a missing payload file.

use static_responder::config::{self, Config};
use static_responder::payload::Payload;
use static_responder::response::PAYLOAD_CAPACITY;
use static_responder::runtime::Platform;
use static_responder::server::{Server, ServerError, ServerSettings};
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    // Load configuration
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        variant = ?config.variant,
        content_type = config.variant.content_type(),
        path = %config.variant.payload_path().display(),
        port = config::PORT,
        "Starting static-responder"
    );

    match run(config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(code = e.os_code(), error = %e, "Fatal error");
            ExitCode::FAILURE
        }
    }
}

/// Load the payload, then bind and serve until a shutdown signal arrives.
///
/// The payload is loaded first so a missing file never leaves a socket bound.
fn run(config: Config) -> Result<(), ServerError> {
    let payload = Payload::load(config.variant.payload_path(), PAYLOAD_CAPACITY)?;

    let platform = Platform::acquire().map_err(ServerError::Platform)?;
    let mut server = Server::bind(
        ServerSettings::new(config.listen_addr()),
        config.variant.header(),
        payload,
    )?;
    platform
        .watch(server.shutdown_handle())
        .map_err(ServerError::Platform)?;

    server.run_until(|| platform.shutdown_requested())?;

    // Close the listener before releasing the platform.
    drop(server);
    drop(platform);
    Ok(())
}
