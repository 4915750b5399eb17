//! # sockman
//!
//! **sockman** is a small, single-threaded socket event manager. It lets a
//! process watch any number of file descriptors (sockets, pipes) for
//! readability and writability, and calls back into user code whenever the
//! operating system reports a matching event, a hangup or an error.
//!
//! It is the substrate for reactive services such as chat relays, echo
//! servers or request/response protocols, without each of them
//! re-implementing readiness polling:
//!
//! - a **registry** of descriptors, interest masks and callbacks, kept in
//!   lock-step with the OS polling handle (`epoll` on Linux, `poll(2)`
//!   elsewhere),
//! - a blocking **service** call that waits for one ready descriptor and
//!   runs its callback on the calling thread,
//! - explicit **shutdown** state that signals can flip.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use sockman::{Interest, Manager, Shutdown};
//! use std::os::fd::AsRawFd;
//! use std::os::unix::net::UnixListener;
//!
//! let listener = UnixListener::bind("/tmp/sockman.sock")?;
//! let shutdown = Shutdown::new();
//! shutdown.register_signal(signal_hook::consts::SIGINT)?;
//!
//! let mut manager = Manager::new()?;
//! manager.add(listener.as_raw_fd(), Interest::READABLE, move |registry, _, events| {
//!     if events.is_readable() {
//!         // accept, then registry.add(...) the new connection
//!     }
//! })?;
//!
//! manager.run(&shutdown, None)?;
//! ```
//!
//! ## Ownership
//!
//! The manager never opens or closes caller descriptors. Remove a
//! descriptor before closing it; the manager does not remove descriptors
//! on hangup or error either, that decision belongs to the callback.

mod error;
mod event;
mod handler;
mod manager;
mod poller;
mod shutdown;
mod utils;

pub use error::{Error, Result};
pub use event::{Condition, Events, Interest};
pub use handler::Handler;
pub use manager::{Callback, Manager, ManagerBuilder, Registry, Serviced};
pub use shutdown::Shutdown;
