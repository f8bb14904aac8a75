//! Listening socket construction.

use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{SocketAddr, TcpListener};

/// Pending-connection queue length. Only one connection is ever in flight.
pub const BACKLOG: i32 = 3;

/// Which step of listener setup failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupStep {
    Socket,
    Bind,
    Listen,
}

/// Create a blocking TCP listener with address reuse enabled.
///
/// Address reuse lets a restarted process bind while old connections from
/// the previous one sit in TIME_WAIT.
pub fn create_listener(addr: SocketAddr, backlog: i32) -> Result<TcpListener, (SetupStep, io::Error)> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
        .map_err(|e| (SetupStep::Socket, e))?;

    #[cfg(not(windows))]
    socket
        .set_reuse_address(true)
        .map_err(|e| (SetupStep::Socket, e))?;

    socket.bind(&addr.into()).map_err(|e| (SetupStep::Bind, e))?;
    socket.listen(backlog).map_err(|e| (SetupStep::Listen, e))?;

    Ok(socket.into())
}
