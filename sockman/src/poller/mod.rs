//! Platform-specific polling handle.
//!
//! This module provides a unified interface over the OS readiness
//! facilities used by the manager:
//! - `epoll` on Linux,
//! - `poll(2)` on every other unix target, or on Linux when the `poll`
//!   feature is enabled.
//!
//! The concrete implementation is selected at compile time. Both
//! backends are level-triggered and hand back at most one ready
//! descriptor per wait.

use crate::event::Events;

use std::time::Duration;

#[cfg(all(target_os = "linux", not(feature = "poll")))]
mod epoll;

#[cfg(any(not(target_os = "linux"), feature = "poll"))]
mod poll;

#[cfg(all(target_os = "linux", not(feature = "poll")))]
pub(crate) type Poller = epoll::EpollPoller;

#[cfg(any(not(target_os = "linux"), feature = "poll"))]
pub(crate) type Poller = poll::PollPoller;

/// Outcome of a single wait on the polling handle.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Wait {
    /// One registered descriptor is ready.
    Ready { token: u64, events: Events },

    /// The timeout elapsed.
    TimedOut,

    /// A signal interrupted the wait.
    Interrupted,
}

/// Converts a wait timeout into the millisecond argument of the syscalls.
///
/// `None` blocks forever (`-1`). Non-zero durations shorter than a
/// millisecond round up so they never degrade into a busy poll.
pub(crate) fn timeout_ms(timeout: Option<Duration>) -> i32 {
    match timeout {
        None => -1,
        Some(t) => {
            let ms = t.as_nanos().div_ceil(1_000_000);
            ms.min(i32::MAX as u128) as i32
        }
    }
}
