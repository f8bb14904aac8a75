//! static-responder: a single-threaded TCP responder.
//!
//! Reads one file into memory at start-up and answers every connection with
//! a fixed header followed by that file's bytes:
//! - `payload`: Loads the file into a fixed-capacity buffer
//! - `server`: Owns the listener and runs the accept-respond-close loop
//! - `runtime`: Buffers, connection state machine, listener setup, platform guard
//! - `response`: Payload variants and their compile-time headers
//! - `config`: CLI arguments and optional TOML file

pub mod config;
pub mod payload;
pub mod response;
pub mod runtime;
pub mod server;
