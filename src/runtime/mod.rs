//! Blocking, single-threaded runtime pieces for the responder.
//!
//! - `FixedBuffer`: Fixed-capacity buffers with an explicit fill length
//! - `Connection`: Per-exchange state machine (read, write header, write payload, close)
//! - `create_listener`: Listening socket setup
//! - `Platform`: Process-level setup and teardown, uniform across targets
//! - `ShutdownHandle`: Stop condition for the serve loop

mod buffer;
mod connection;
mod listener;
mod platform;
mod shutdown;

pub use buffer::FixedBuffer;
pub use connection::{ConnState, Connection, Deadlines, Segment};
pub use listener::{create_listener, SetupStep, BACKLOG};
pub use platform::Platform;
pub use shutdown::ShutdownHandle;
