//! TCP server that answers every connection with the same payload.
//!
//! One connection is served at a time, in arrival order:
//! accept, drain the request, write header and payload, close, repeat.
//! A failure on one connection is logged and forgotten; only setup errors
//! and a broken listener stop the server.

use crate::payload::{Payload, PayloadError};
use crate::runtime::{
    create_listener, Connection, Deadlines, FixedBuffer, SetupStep, ShutdownHandle, BACKLOG,
};
use std::io;
use std::net::{SocketAddr, TcpListener};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Receive buffer size; requests longer than this are cut off unread.
pub const RECV_BUFFER_SIZE: usize = 30000;

/// How long a connection may sit silent before it is answered anyway.
pub const READ_TIMEOUT: Duration = Duration::from_secs(2);

/// How long a stalled reader may block a write.
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Fatal server errors. Per-connection failures never surface here.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Payload(#[from] PayloadError),
    #[error("platform setup failed: {0}")]
    Platform(#[source] io::Error),
    #[error("failed to create socket for {addr}: {source}")]
    Socket {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("failed to listen on {addr}: {source}")]
    Listen {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("listener failed: {0}")]
    Accept(#[source] io::Error),
}

impl ServerError {
    /// Raw OS error code, for operator diagnostics.
    pub fn os_code(&self) -> Option<i32> {
        match self {
            ServerError::Payload(PayloadError::Open { source, .. })
            | ServerError::Payload(PayloadError::Read { source, .. })
            | ServerError::Platform(source)
            | ServerError::Socket { source, .. }
            | ServerError::Bind { source, .. }
            | ServerError::Listen { source, .. }
            | ServerError::Accept(source) => source.raw_os_error(),
        }
    }
}

/// Listener and per-connection settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub backlog: i32,
    pub recv_buffer_size: usize,
    pub read_timeout: Option<Duration>,
    pub write_timeout: Option<Duration>,
}

impl ServerSettings {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            backlog: BACKLOG,
            recv_buffer_size: RECV_BUFFER_SIZE,
            read_timeout: Some(READ_TIMEOUT),
            write_timeout: Some(WRITE_TIMEOUT),
        }
    }
}

/// Counts reported when the serve loop ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServeSummary {
    pub served: u64,
    pub failed: u64,
}

/// Server instance. Owns the listening socket for its whole lifetime.
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    header: &'static [u8],
    payload: Payload,
    recv: FixedBuffer,
    deadlines: Deadlines,
    shutdown: ShutdownHandle,
}

impl Server {
    /// Create, bind and start listening.
    pub fn bind(
        settings: ServerSettings,
        header: &'static [u8],
        payload: Payload,
    ) -> Result<Self, ServerError> {
        let addr = settings.addr;
        let listener = create_listener(addr, settings.backlog).map_err(|(step, source)| {
            match step {
                SetupStep::Socket => ServerError::Socket { addr, source },
                SetupStep::Bind => ServerError::Bind { addr, source },
                SetupStep::Listen => ServerError::Listen { addr, source },
            }
        })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ServerError::Socket { addr, source })?;

        Ok(Server {
            listener,
            local_addr,
            header,
            payload,
            recv: FixedBuffer::new(settings.recv_buffer_size),
            deadlines: Deadlines {
                read: settings.read_timeout,
                write: settings.write_timeout,
            },
            shutdown: ShutdownHandle::new(local_addr),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Handle that stops [`run_until`](Self::run_until) from another thread.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Serve connections until `stop` returns true or the shutdown handle fires.
    ///
    /// The condition is checked before every accept and again after one
    /// returns, so a connection that arrives during shutdown is dropped
    /// unanswered. `stop` alone cannot wake a blocked accept; anything that
    /// must end an idle server goes through [`ShutdownHandle::trigger`].
    pub fn run_until<F>(&mut self, stop: F) -> Result<ServeSummary, ServerError>
    where
        F: Fn() -> bool,
    {
        let should_stop = |shutdown: &ShutdownHandle| stop() || shutdown.is_triggered();
        let mut summary = ServeSummary::default();

        info!(
            addr = %self.local_addr,
            payload_len = self.payload.len(),
            "listening on http://localhost:{}",
            self.local_addr.port()
        );

        while !should_stop(&self.shutdown) {
            let (stream, peer) = match self.listener.accept() {
                Ok(accepted) => accepted,
                Err(e) if is_listener_fatal(&e) => {
                    error!(code = e.raw_os_error(), error = %e, "Listener failed");
                    return Err(ServerError::Accept(e));
                }
                Err(e) => {
                    error!(code = e.raw_os_error(), error = %e, "Failed to accept connection");
                    continue;
                }
            };

            if should_stop(&self.shutdown) {
                debug!(peer = %peer, "Dropping connection accepted during shutdown");
                break;
            }

            debug!(peer = %peer, "New connection");
            let result = Connection::new(stream, peer, self.deadlines).and_then(|conn| {
                conn.serve(&mut self.recv, self.header, self.payload.as_bytes())
            });

            match result {
                Ok(()) => summary.served += 1,
                Err(e) => {
                    summary.failed += 1;
                    warn!(peer = %peer, error = %e, "Connection error");
                }
            }
        }

        info!(
            served = summary.served,
            failed = summary.failed,
            "Server stopped"
        );
        Ok(summary)
    }
}

/// Accept errors that mean the listening socket itself is unusable.
fn is_listener_fatal(e: &io::Error) -> bool {
    #[cfg(unix)]
    {
        matches!(
            e.raw_os_error(),
            Some(libc::EBADF) | Some(libc::EINVAL) | Some(libc::ENOTSOCK)
        )
    }

    #[cfg(not(unix))]
    {
        let _ = e;
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::{Variant, JSON_HEADER};
    use std::io::{Read, Write};
    use std::net::{Shutdown, TcpStream};
    use std::thread::{self, JoinHandle};

    const SCENARIO_RESPONSE: &[u8] =
        b"HTTP/1.1 200 OK\nContent-Type: application/json\nAccess-Control-Allow-Origin: *\n\n{\"ok\":true}";

    fn test_settings() -> ServerSettings {
        let mut settings = ServerSettings::new("127.0.0.1:0".parse().unwrap());
        settings.read_timeout = Some(Duration::from_millis(100));
        settings
    }

    fn spawn_server(
        header: &'static [u8],
        payload: Payload,
    ) -> (
        SocketAddr,
        ShutdownHandle,
        JoinHandle<Result<ServeSummary, ServerError>>,
    ) {
        let mut server = Server::bind(test_settings(), header, payload).unwrap();
        let addr = server.local_addr();
        let handle = server.shutdown_handle();
        let join = thread::spawn(move || server.run_until(|| false));
        (addr, handle, join)
    }

    fn fetch(addr: SocketAddr, request: &[u8]) -> Vec<u8> {
        let mut stream = TcpStream::connect(addr).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(10)))
            .unwrap();
        stream.write_all(request).unwrap();
        let mut response = Vec::new();
        stream.read_to_end(&mut response).unwrap();
        response
    }

    fn stop(handle: ShutdownHandle, join: JoinHandle<Result<ServeSummary, ServerError>>) -> ServeSummary {
        handle.trigger();
        join.join().unwrap().unwrap()
    }

    #[test]
    fn test_json_scenario() {
        let (addr, handle, join) =
            spawn_server(Variant::Json.header(), Payload::from_static(b"{\"ok\":true}"));

        let response = fetch(addr, b"GET / HTTP/1.1\r\n\r\n");
        assert_eq!(response, SCENARIO_RESPONSE);

        let summary = stop(handle, join);
        assert_eq!(summary, ServeSummary { served: 1, failed: 0 });
    }

    #[test]
    fn test_html_header_then_exact_payload() {
        let body = b"<html><body>hi</body></html>";
        let (addr, handle, join) = spawn_server(Variant::Html.header(), Payload::from_static(body));

        let response = fetch(addr, b"GET /index.html HTTP/1.1\r\n\r\n");
        let header = Variant::Html.header();
        assert_eq!(&response[..header.len()], header);
        assert_eq!(&response[header.len()..], body);

        stop(handle, join);
    }

    #[test]
    fn test_truncated_payload_served_as_first_capacity_bytes() {
        let contents: Vec<u8> = (0..100u8).collect();
        let payload = Payload::read_from(&mut &contents[..], 40).unwrap();
        assert!(payload.truncated());
        let (addr, handle, join) = spawn_server(JSON_HEADER, payload);

        let response = fetch(addr, b"GET /");
        assert_eq!(&response[JSON_HEADER.len()..], &contents[..40]);

        stop(handle, join);
    }

    #[test]
    fn test_payload_with_embedded_nul() {
        let (addr, handle, join) = spawn_server(JSON_HEADER, Payload::from_static(b"[0,\0,1]"));

        let response = fetch(addr, b"GET /");
        assert_eq!(&response[JSON_HEADER.len()..], b"[0,\0,1]");

        stop(handle, join);
    }

    #[test]
    fn test_silent_client_is_answered() {
        let (addr, handle, join) =
            spawn_server(JSON_HEADER, Payload::from_static(b"{\"ok\":true}"));

        let response = fetch(addr, b"");
        assert_eq!(response, SCENARIO_RESPONSE);

        stop(handle, join);
    }

    #[test]
    fn test_misbehaving_clients_are_isolated() {
        let (addr, handle, join) =
            spawn_server(JSON_HEADER, Payload::from_static(b"{\"ok\":true}"));

        // Disconnects before the response is written.
        drop(TcpStream::connect(addr).unwrap());

        // Half-closes without sending anything.
        let stream = TcpStream::connect(addr).unwrap();
        stream.shutdown(Shutdown::Write).unwrap();
        drop(stream);

        // Sends far more than the receive buffer holds.
        let mut stream = TcpStream::connect(addr).unwrap();
        stream
            .set_write_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        let _ = stream.write_all(&vec![b'a'; RECV_BUFFER_SIZE * 4]);
        let mut sink = Vec::new();
        let _ = stream.read_to_end(&mut sink);
        drop(stream);

        for _ in 0..3 {
            assert_eq!(fetch(addr, b"GET / HTTP/1.1\r\n\r\n"), SCENARIO_RESPONSE);
        }

        let summary = stop(handle, join);
        assert!(summary.served >= 3);
        assert_eq!(summary.served + summary.failed, 6);
    }

    #[test]
    fn test_concurrent_clients_each_get_full_response() {
        let (addr, handle, join) =
            spawn_server(JSON_HEADER, Payload::from_static(b"{\"ok\":true}"));

        let clients: Vec<_> = (0..6)
            .map(|_| thread::spawn(move || fetch(addr, b"GET / HTTP/1.1\r\n\r\n")))
            .collect();

        for client in clients {
            assert_eq!(client.join().unwrap(), SCENARIO_RESPONSE);
        }

        let summary = stop(handle, join);
        assert_eq!(summary, ServeSummary { served: 6, failed: 0 });
    }

    #[test]
    fn test_trigger_stops_idle_server() {
        let (_addr, handle, join) = spawn_server(JSON_HEADER, Payload::from_static(b"{}"));

        // Let the loop settle into a blocked accept with no clients around.
        thread::sleep(Duration::from_millis(300));
        let trigger = handle.clone();
        thread::spawn(move || trigger.trigger());

        let started = std::time::Instant::now();
        let summary = join.join().unwrap().unwrap();
        assert!(started.elapsed() < Duration::from_secs(3));
        assert_eq!(summary, ServeSummary::default());
    }

    #[test]
    fn test_trigger_before_loop_starts_is_not_lost() {
        let mut server =
            Server::bind(test_settings(), JSON_HEADER, Payload::from_static(b"{}")).unwrap();
        let handle = server.shutdown_handle();

        // Lands before the first accept; the queued wake-up still ends the loop.
        handle.trigger();
        let summary = server.run_until(|| false).unwrap();
        assert_eq!(summary, ServeSummary::default());
    }

    #[test]
    fn test_stop_condition_checked_before_accept() {
        let mut server = Server::bind(test_settings(), JSON_HEADER, Payload::from_static(b"{}")).unwrap();
        let summary = server.run_until(|| true).unwrap();
        assert_eq!(summary, ServeSummary::default());
    }

    #[test]
    fn test_port_in_use_is_bind_error() {
        let server = Server::bind(test_settings(), JSON_HEADER, Payload::from_static(b"{}")).unwrap();

        let err = Server::bind(
            ServerSettings::new(server.local_addr()),
            JSON_HEADER,
            Payload::from_static(b"{}"),
        )
        .err()
        .unwrap();
        assert!(matches!(err, ServerError::Bind { .. }));
        assert!(err.os_code().is_some());
    }

    #[test]
    fn test_listener_fatal_classification() {
        assert!(!is_listener_fatal(&io::Error::from(io::ErrorKind::ConnectionAborted)));
        #[cfg(unix)]
        {
            assert!(is_listener_fatal(&io::Error::from_raw_os_error(libc::EBADF)));
            assert!(!is_listener_fatal(&io::Error::from_raw_os_error(libc::EMFILE)));
        }
    }
}
