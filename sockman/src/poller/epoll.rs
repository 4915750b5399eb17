//! Linux `epoll`-based poller implementation.
//!
//! Responsibilities:
//! - Register file descriptors with read/write interests
//! - Update or drop those registrations
//! - Block until one descriptor is ready, or the timeout expires
//!
//! Registrations are level-triggered and every wait drains a single
//! event, so the kernel's ready list provides round-robin fairness
//! across repeated waits.
//!
//! `EPOLLRDHUP` is always requested: a TCP peer closing its end only
//! raises `EPOLLIN` otherwise, and `EPOLLHUP` waits for both directions.

use super::{Wait, timeout_ms};
use crate::event::{Events, Interest};

use libc::{
    EPOLL_CLOEXEC, EPOLL_CTL_ADD, EPOLL_CTL_DEL, EPOLL_CTL_MOD, EPOLLERR, EPOLLHUP, EPOLLIN,
    EPOLLOUT, EPOLLRDHUP, epoll_create1, epoll_ctl, epoll_event, epoll_wait,
};
use std::io;
use std::os::fd::RawFd;
use std::time::Duration;

/// Linux `epoll` poller.
///
/// Owns the epoll instance and closes it on drop.
pub(crate) struct EpollPoller {
    /// Epoll file descriptor.
    epoll: RawFd,
}

impl EpollPoller {
    /// Create a new epoll instance.
    pub(crate) fn new(close_on_exec: bool) -> io::Result<Self> {
        let flags = if close_on_exec { EPOLL_CLOEXEC } else { 0 };

        let epoll = unsafe { epoll_create1(flags) };
        if epoll < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(Self { epoll })
    }

    /// Register a file descriptor with the poller.
    pub(crate) fn register(&mut self, fd: RawFd, token: u64, interest: Interest) -> io::Result<()> {
        self.ctl(EPOLL_CTL_ADD, fd, token, interest)
    }

    /// Update interest flags for an already registered descriptor.
    pub(crate) fn reregister(
        &mut self,
        fd: RawFd,
        token: u64,
        interest: Interest,
    ) -> io::Result<()> {
        self.ctl(EPOLL_CTL_MOD, fd, token, interest)
    }

    /// Remove a file descriptor from the poller.
    pub(crate) fn deregister(&mut self, fd: RawFd) -> io::Result<()> {
        let rc = unsafe { epoll_ctl(self.epoll, EPOLL_CTL_DEL, fd, std::ptr::null_mut()) };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// Wait for one descriptor to become ready.
    ///
    /// `EINTR` is reported as [`Wait::Interrupted`] rather than retried, so
    /// the caller gets a chance to look at its shutdown state.
    pub(crate) fn wait(&mut self, timeout: Option<Duration>) -> io::Result<Wait> {
        let mut event = epoll_event { events: 0, u64: 0 };

        let n = unsafe { epoll_wait(self.epoll, &mut event, 1, timeout_ms(timeout)) };

        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(Wait::Interrupted);
            }
            return Err(err);
        }

        if n == 0 {
            return Ok(Wait::TimedOut);
        }

        Ok(Wait::Ready {
            token: event.u64,
            events: epoll_to_events(event.events),
        })
    }

    fn ctl(&mut self, op: i32, fd: RawFd, token: u64, interest: Interest) -> io::Result<()> {
        let mut event = epoll_event {
            events: interest_to_epoll(interest),
            u64: token,
        };

        let rc = unsafe { epoll_ctl(self.epoll, op, fd, &mut event) };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

impl Drop for EpollPoller {
    fn drop(&mut self) {
        unsafe { libc::close(self.epoll) };
    }
}

fn interest_to_epoll(interest: Interest) -> u32 {
    let mut flags = EPOLLRDHUP;

    if interest.is_readable() {
        flags |= EPOLLIN;
    }
    if interest.is_writable() {
        flags |= EPOLLOUT;
    }

    flags as u32
}

fn epoll_to_events(flags: u32) -> Events {
    let mut events = Events::empty();

    if flags & EPOLLIN as u32 != 0 {
        events |= Events::READABLE;
    }
    if flags & EPOLLOUT as u32 != 0 {
        events |= Events::WRITABLE;
    }
    if flags & (EPOLLHUP | EPOLLRDHUP) as u32 != 0 {
        events |= Events::HANGUP;
    }
    if flags & EPOLLERR as u32 != 0 {
        events |= Events::ERROR;
    }

    events
}
