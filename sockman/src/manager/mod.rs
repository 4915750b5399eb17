//! The event manager.
//!
//! [`Manager`] owns a [`Registry`] of watched descriptors and drives it:
//! each call to [`Manager::service`] waits for one descriptor to become
//! ready and runs that descriptor's callback on the calling thread before
//! returning.
//!
//! Callbacks are handed the registry, so a handler may register new
//! descriptors, remove itself or toggle its interest without any
//! aliasing: no other callback is in flight while it runs.

mod builder;
mod registry;

pub use builder::ManagerBuilder;
pub use registry::{Callback, Registry};

use crate::error::{Error, Result};
use crate::event::{Events, Interest};
use crate::handler::Handler;
use crate::poller::Wait;
use crate::shutdown::Shutdown;

use log::{debug, trace};
use std::os::fd::RawFd;
use std::time::Duration;

/// What a single [`Manager::service`] call did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Serviced {
    /// The callback of this descriptor ran once.
    Dispatched(RawFd),

    /// No callback ran: the timeout elapsed, or the ready event belonged
    /// to a registration that no longer exists.
    Idle,

    /// A signal interrupted the wait before any descriptor was ready.
    Interrupted,
}

/// A single-threaded, readiness-based event loop.
///
/// Dropping the manager deregisters every descriptor and closes the OS
/// polling handle. The descriptors themselves are owned by the caller and
/// are never closed by the manager.
///
/// # Examples
///
/// ```rust,ignore
/// let mut manager = Manager::new()?;
/// let (a, mut b) = UnixStream::pair()?;
///
/// manager.add(a.as_raw_fd(), Interest::READABLE, |_, fd, events| {
///     println!("{fd}: {events:?}");
/// })?;
///
/// b.write_all(b"x")?;
/// manager.service(None)?;
/// ```
#[derive(Debug)]
pub struct Manager {
    registry: Registry,
}

impl Manager {
    /// Creates a manager with the default configuration.
    pub fn new() -> Result<Self> {
        ManagerBuilder::new().build()
    }

    /// Returns a builder to configure a manager before creating it.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// let manager = Manager::builder().capacity(1024).build()?;
    /// ```
    pub fn builder() -> ManagerBuilder {
        ManagerBuilder::new()
    }

    /// See [`Registry::add`].
    pub fn add<F>(&mut self, fd: RawFd, interest: Interest, callback: F) -> Result<()>
    where
        F: FnMut(&mut Registry, RawFd, Events) + 'static,
    {
        self.registry.add(fd, interest, callback)
    }

    /// See [`Registry::add_handler`].
    pub fn add_handler<H>(&mut self, fd: RawFd, interest: Interest, handler: H) -> Result<()>
    where
        H: Handler + 'static,
    {
        self.registry.add_handler(fd, interest, handler)
    }

    /// See [`Registry::remove`].
    pub fn remove(&mut self, fd: RawFd) {
        self.registry.remove(fd);
    }

    /// See [`Registry::set_interest`].
    pub fn set_interest(&mut self, fd: RawFd, flag: Interest, enable: bool) -> Result<()> {
        self.registry.set_interest(fd, flag, enable)
    }

    /// See [`Registry::notify_on_readable`].
    pub fn notify_on_readable(&mut self, fd: RawFd, enable: bool) -> Result<()> {
        self.registry.notify_on_readable(fd, enable)
    }

    /// See [`Registry::notify_on_writable`].
    pub fn notify_on_writable(&mut self, fd: RawFd, enable: bool) -> Result<()> {
        self.registry.notify_on_writable(fd, enable)
    }

    /// See [`Registry::interest`].
    pub fn interest(&self, fd: RawFd) -> Option<Interest> {
        self.registry.interest(fd)
    }

    /// See [`Registry::contains`].
    pub fn contains(&self, fd: RawFd) -> bool {
        self.registry.contains(fd)
    }

    /// See [`Registry::len`].
    pub fn len(&self) -> usize {
        self.registry.len()
    }

    /// See [`Registry::is_empty`].
    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    /// Shared access to the underlying registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Exclusive access to the underlying registry.
    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    /// Waits for the next event and dispatches it.
    ///
    /// Blocks until one registered descriptor reports readiness, hangup or
    /// error, or until `timeout` elapses. `None` waits forever and
    /// `Some(Duration::ZERO)` only polls.
    ///
    /// At most one callback runs per call; it receives the full observed
    /// event set. Callers wanting to drain several ready descriptors call
    /// `service` again.
    ///
    /// # Errors
    ///
    /// [`Error::Os`] if the wait itself fails. This is not retried.
    pub fn service(&mut self, timeout: Option<Duration>) -> Result<Serviced> {
        let wait = self
            .registry
            .wait(timeout)
            .map_err(|source| Error::os("wait", source))?;

        let (token, events) = match wait {
            Wait::Ready { token, events } => (token, events),
            Wait::TimedOut => return Ok(Serviced::Idle),
            Wait::Interrupted => return Ok(Serviced::Interrupted),
        };

        let Some((key, fd, mut callback)) = self.registry.detach(token) else {
            debug!("ignoring {events:?} for stale token {token:#x}");
            return Ok(Serviced::Idle);
        };

        trace!("dispatching {events:?} to descriptor {fd}");
        callback(&mut self.registry, fd, events);
        self.registry.reattach(key, callback);

        Ok(Serviced::Dispatched(fd))
    }

    /// Services events until `shutdown` is requested.
    ///
    /// `timeout` bounds every individual wait, which bounds how long a
    /// request made from another thread can go unnoticed. Signals
    /// registered through [`Shutdown::register_signal`] interrupt the
    /// wait and are noticed immediately.
    ///
    /// # Errors
    ///
    /// Propagates the first error returned by [`service`](Self::service).
    pub fn run(&mut self, shutdown: &Shutdown, timeout: Option<Duration>) -> Result<()> {
        while !shutdown.is_requested() {
            if self.service(timeout)? == Serviced::Interrupted {
                trace!("wait interrupted by a signal");
            }
        }

        debug!("shutdown requested, leaving event loop");
        Ok(())
    }
}
