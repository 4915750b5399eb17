use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cancellation state for an event loop.
///
/// A `Shutdown` is a cheap, cloneable handle over a shared flag. Clone it
/// into callbacks or signal handlers that may end the loop, and hand it
/// to [`Manager::run`](crate::Manager::run) or check it in a hand-written
/// `service` loop.
///
/// # Examples
///
/// ```rust,ignore
/// let shutdown = Shutdown::new();
/// shutdown.register_signal(signal_hook::consts::SIGINT)?;
///
/// manager.run(&shutdown, None)?;
/// ```
#[derive(Clone, Debug, Default)]
pub struct Shutdown {
    requested: Arc<AtomicBool>,
}

impl Shutdown {
    /// Creates a handle with no shutdown requested.
    pub fn new() -> Self {
        Self::default()
    }

    /// Asks every loop watching this handle to stop.
    pub fn request(&self) {
        self.requested.store(true, Ordering::Release);
    }

    /// Returns `true` once [`request`](Self::request) was called on any
    /// clone, or a registered signal was delivered.
    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }

    /// Requests shutdown whenever `signal` is delivered to the process.
    ///
    /// The signal interrupts a blocking wait, so a loop driven by
    /// [`Manager::run`](crate::Manager::run) notices it right away.
    pub fn register_signal(&self, signal: libc::c_int) -> io::Result<()> {
        signal_hook::flag::register(signal, Arc::clone(&self.requested))?;
        Ok(())
    }
}
