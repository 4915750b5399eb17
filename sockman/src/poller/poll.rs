//! Portable `poll(2)`-based poller implementation.
//!
//! This backend mirrors the semantics of the `epoll` poller on unix
//! targets without `epoll`. The kernel keeps no registration state for
//! `poll(2)`, so the poller owns the registration table itself and
//! rebuilds the `pollfd` array on every wait.
//!
//! To keep repeated single-event waits fair, the scan for a ready
//! descriptor starts right after the one reported last.
//!
//! On Linux `POLLRDHUP` is always requested so that a peer closing its
//! end of a TCP connection is reported as a hangup.

use super::{Wait, timeout_ms};
use crate::event::{Events, Interest};

use libc::{F_GETFD, POLLERR, POLLHUP, POLLIN, POLLNVAL, POLLOUT, fcntl, nfds_t, pollfd};
use std::io;
use std::os::fd::RawFd;
use std::time::Duration;

#[cfg(any(target_os = "linux", target_os = "android"))]
const POLLRDHUP: i16 = libc::POLLRDHUP;
#[cfg(not(any(target_os = "linux", target_os = "android")))]
const POLLRDHUP: i16 = 0;

/// A single registered descriptor.
struct Registration {
    fd: RawFd,
    token: u64,
    interest: Interest,
}

/// `poll(2)` poller.
///
/// This poller owns:
/// - the registry of monitored descriptors, in registration order,
/// - a reusable buffer of `pollfd` structures,
/// - the scan cursor used for fairness.
pub(crate) struct PollPoller {
    reg: Vec<Registration>,
    fds: Vec<pollfd>,
    cursor: usize,
}

impl PollPoller {
    /// Create a new `PollPoller`.
    ///
    /// There is no kernel object behind this backend, so `close_on_exec`
    /// has nothing to apply to.
    pub(crate) fn new(_close_on_exec: bool) -> io::Result<Self> {
        Ok(Self {
            reg: Vec::new(),
            fds: Vec::new(),
            cursor: 0,
        })
    }

    /// Register a file descriptor with the poller.
    ///
    /// The descriptor must be open; this is checked with `F_GETFD` since
    /// `poll(2)` itself would only report `POLLNVAL` later on.
    pub(crate) fn register(&mut self, fd: RawFd, token: u64, interest: Interest) -> io::Result<()> {
        if unsafe { fcntl(fd, F_GETFD) } < 0 {
            return Err(io::Error::last_os_error());
        }

        if self.position(fd).is_some() {
            return Err(io::Error::from_raw_os_error(libc::EEXIST));
        }

        self.reg.push(Registration {
            fd,
            token,
            interest,
        });

        Ok(())
    }

    /// Update interest flags for an already registered descriptor.
    ///
    /// Fails with `EBADF` if the descriptor was closed behind the poller's
    /// back, like `EPOLL_CTL_MOD` does.
    pub(crate) fn reregister(
        &mut self,
        fd: RawFd,
        token: u64,
        interest: Interest,
    ) -> io::Result<()> {
        if unsafe { fcntl(fd, F_GETFD) } < 0 {
            return Err(io::Error::last_os_error());
        }

        let index = self
            .position(fd)
            .ok_or_else(|| io::Error::from_raw_os_error(libc::ENOENT))?;

        let registration = &mut self.reg[index];
        registration.token = token;
        registration.interest = interest;

        Ok(())
    }

    /// Remove a file descriptor from the poller.
    pub(crate) fn deregister(&mut self, fd: RawFd) -> io::Result<()> {
        let index = self
            .position(fd)
            .ok_or_else(|| io::Error::from_raw_os_error(libc::ENOENT))?;

        self.reg.remove(index);

        Ok(())
    }

    /// Wait for one descriptor to become ready.
    pub(crate) fn wait(&mut self, timeout: Option<Duration>) -> io::Result<Wait> {
        self.fds.clear();
        self.fds.extend(self.reg.iter().map(|r| pollfd {
            fd: r.fd,
            events: interest_to_poll(r.interest),
            revents: 0,
        }));

        let n = unsafe {
            libc::poll(
                self.fds.as_mut_ptr(),
                self.fds.len() as nfds_t,
                timeout_ms(timeout),
            )
        };

        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(Wait::Interrupted);
            }
            return Err(err);
        }

        if n == 0 || self.fds.is_empty() {
            return Ok(Wait::TimedOut);
        }

        let len = self.fds.len();
        let start = self.cursor % len;

        for offset in 0..len {
            let index = (start + offset) % len;
            let revents = self.fds[index].revents;

            if revents != 0 {
                self.cursor = index + 1;

                return Ok(Wait::Ready {
                    token: self.reg[index].token,
                    events: poll_to_events(revents),
                });
            }
        }

        Ok(Wait::TimedOut)
    }

    fn position(&self, fd: RawFd) -> Option<usize> {
        self.reg.iter().position(|r| r.fd == fd)
    }
}

fn interest_to_poll(interest: Interest) -> i16 {
    let mut flags = POLLRDHUP;

    if interest.is_readable() {
        flags |= POLLIN;
    }
    if interest.is_writable() {
        flags |= POLLOUT;
    }

    flags
}

fn poll_to_events(revents: i16) -> Events {
    let mut events = Events::empty();

    if revents & POLLIN != 0 {
        events |= Events::READABLE;
    }
    if revents & POLLOUT != 0 {
        events |= Events::WRITABLE;
    }
    if revents & (POLLHUP | POLLRDHUP) != 0 {
        events |= Events::HANGUP;
    }
    if revents & (POLLERR | POLLNVAL) != 0 {
        events |= Events::ERROR;
    }

    events
}
