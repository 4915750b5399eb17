//! Interest masks and observed event sets.
//!
//! [`Interest`] is what a caller asks the manager to watch for on a
//! descriptor. [`Events`] is what the operating system actually reported
//! when the descriptor woke the manager up. The two are deliberately
//! separate types: hangup and error can be observed without ever having
//! been requested.

use bitflags::bitflags;
use std::fmt;

bitflags! {
    /// Conditions a caller wants to be notified about.
    ///
    /// An empty interest is valid: the descriptor stays registered and
    /// still reports hangup and error conditions.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct Interest: u8 {
        /// Notify when the descriptor can be read without blocking.
        const READABLE = 0b0001;
        /// Notify when the descriptor can be written without blocking.
        const WRITABLE = 0b0010;
    }
}

impl Interest {
    /// Returns `self` with `flag` set or cleared depending on `enable`.
    pub fn with(self, flag: Interest, enable: bool) -> Interest {
        if enable { self | flag } else { self - flag }
    }

    /// Returns `true` if readable notifications are requested.
    pub fn is_readable(&self) -> bool {
        self.contains(Interest::READABLE)
    }

    /// Returns `true` if writable notifications are requested.
    pub fn is_writable(&self) -> bool {
        self.contains(Interest::WRITABLE)
    }
}

bitflags! {
    /// Conditions observed on a descriptor at wake time.
    ///
    /// The flags are not mutually exclusive: a socket whose peer closed
    /// usually reports both [`READABLE`](Events::READABLE) and
    /// [`HANGUP`](Events::HANGUP).
    #[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub struct Events: u8 {
        const READABLE = 0b0001;
        const WRITABLE = 0b0010;
        const HANGUP = 0b0100;
        const ERROR = 0b1000;
    }
}

impl Events {
    /// Data can be read without blocking, or the peer closed its end.
    pub fn is_readable(&self) -> bool {
        self.contains(Events::READABLE)
    }

    /// Data can be written without blocking.
    pub fn is_writable(&self) -> bool {
        self.contains(Events::WRITABLE)
    }

    /// The peer closed the connection, or at least its writing side.
    pub fn is_hangup(&self) -> bool {
        self.contains(Events::HANGUP)
    }

    /// An error condition is pending on the descriptor.
    pub fn is_error(&self) -> bool {
        self.contains(Events::ERROR)
    }

    /// Picks the single most significant condition of this set.
    ///
    /// Precedence is fixed: error, then hangup, then readable, then
    /// writable. Returns `None` for an empty set.
    pub fn condition(&self) -> Option<Condition> {
        if self.is_error() {
            Some(Condition::Error)
        } else if self.is_hangup() {
            Some(Condition::Hangup)
        } else if self.is_readable() {
            Some(Condition::Readable)
        } else if self.is_writable() {
            Some(Condition::Writable)
        } else {
            None
        }
    }
}

impl fmt::Debug for Events {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Events")
            .field("readable", &self.is_readable())
            .field("writable", &self.is_writable())
            .field("hangup", &self.is_hangup())
            .field("error", &self.is_error())
            .finish()
    }
}

/// A single condition selected out of an [`Events`] set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Condition {
    Error,
    /// The peer closed the connection.
    Hangup,
    Readable,
    Writable,
}
