//! Process-level subsystem guard.
//!
//! Whatever the platform needs set up before serving, and torn down after,
//! lives behind [`Platform`]. Callers acquire it once and never branch on the
//! target themselves.
//!
//! - Unix: SIGINT and SIGTERM are blocked in the acquiring thread (and every
//!   thread it spawns afterwards). [`Platform::watch`] starts a thread that
//!   takes them with `sigwait` and fires a [`ShutdownHandle`], which wakes a
//!   blocked `accept` no matter when the signal lands. Dropping the guard
//!   restores the previous signal mask.
//! - Elsewhere: nothing to do. Socket initialisation is handled by the
//!   standard library on first use.

use crate::runtime::ShutdownHandle;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use tracing::debug;

static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Scoped ownership of process-level setup.
pub struct Platform {
    #[cfg(unix)]
    previous_mask: libc::sigset_t,
}

#[cfg(unix)]
fn shutdown_signals() -> libc::sigset_t {
    // SAFETY: sigemptyset initialises the set before sigaddset touches it.
    unsafe {
        let mut set: libc::sigset_t = std::mem::zeroed();
        libc::sigemptyset(&mut set);
        libc::sigaddset(&mut set, libc::SIGINT);
        libc::sigaddset(&mut set, libc::SIGTERM);
        set
    }
}

impl Platform {
    /// Block the shutdown signals in the calling thread.
    ///
    /// Call before spawning other threads so they inherit the mask.
    #[cfg(unix)]
    pub fn acquire() -> io::Result<Self> {
        let set = shutdown_signals();
        // SAFETY: both sets are valid for the duration of the call.
        let previous_mask = unsafe {
            let mut old: libc::sigset_t = std::mem::zeroed();
            let rc = libc::pthread_sigmask(libc::SIG_BLOCK, &set, &mut old);
            if rc != 0 {
                return Err(io::Error::from_raw_os_error(rc));
            }
            old
        };

        debug!("Shutdown signals blocked");
        Ok(Platform { previous_mask })
    }

    #[cfg(not(unix))]
    pub fn acquire() -> io::Result<Self> {
        debug!("No platform setup required");
        Ok(Platform {})
    }

    /// Fire `handle` when SIGINT or SIGTERM arrives.
    ///
    /// Returns the watcher thread; dropping the handle detaches it.
    #[cfg(unix)]
    pub fn watch(&self, handle: ShutdownHandle) -> io::Result<Option<JoinHandle<()>>> {
        let watcher = std::thread::Builder::new()
            .name("signal-watcher".to_string())
            .spawn(move || {
                let set = shutdown_signals();
                let mut signum: libc::c_int = 0;
                loop {
                    // SAFETY: `set` and `signum` outlive the call.
                    let rc = unsafe { libc::sigwait(&set, &mut signum) };
                    if rc == 0 {
                        break;
                    }
                }
                tracing::info!(signal = signum, "Shutdown signal received");
                SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
                handle.trigger();
            })?;
        Ok(Some(watcher))
    }

    #[cfg(not(unix))]
    pub fn watch(&self, handle: ShutdownHandle) -> io::Result<Option<JoinHandle<()>>> {
        let _ = handle;
        Ok(None)
    }

    /// Whether a shutdown signal has arrived since the process started.
    pub fn shutdown_requested(&self) -> bool {
        SHUTDOWN_REQUESTED.load(Ordering::SeqCst)
    }
}

impl Drop for Platform {
    fn drop(&mut self) {
        // SAFETY: `previous_mask` was filled in by a successful pthread_sigmask call.
        #[cfg(unix)]
        unsafe {
            libc::pthread_sigmask(libc::SIG_SETMASK, &self.previous_mask, std::ptr::null_mut());
        }
        debug!("Platform released");
    }
}
