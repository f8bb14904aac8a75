//! Injectable stop condition for the serve loop.

use std::net::{SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const WAKE_TIMEOUT: Duration = Duration::from_secs(1);

/// Cloneable handle that stops a running server.
///
/// The loop checks the flag before every accept. Because accept blocks,
/// [`trigger`](Self::trigger) also opens a throw-away connection so the
/// loop wakes up to see it.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    flag: Arc<AtomicBool>,
    wake_addr: SocketAddr,
}

impl ShutdownHandle {
    pub fn new(wake_addr: SocketAddr) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            wake_addr: loopback_for(wake_addr),
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub fn trigger(&self) {
        if self.flag.swap(true, Ordering::SeqCst) {
            return;
        }
        // Failure means the listener is already gone, which is fine.
        if let Err(e) = TcpStream::connect_timeout(&self.wake_addr, WAKE_TIMEOUT) {
            debug!(addr = %self.wake_addr, error = %e, "Shutdown wake-up connect failed");
        }
    }
}

/// A wildcard bind address is not connectable everywhere; use loopback.
fn loopback_for(addr: SocketAddr) -> SocketAddr {
    let mut addr = addr;
    if addr.ip().is_unspecified() {
        match addr {
            SocketAddr::V4(_) => addr.set_ip(std::net::Ipv4Addr::LOCALHOST.into()),
            SocketAddr::V6(_) => addr.set_ip(std::net::Ipv6Addr::LOCALHOST.into()),
        }
    }
    addr
}
