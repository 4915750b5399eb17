use std::io;
use std::os::fd::RawFd;

use thiserror::Error;

/// Errors reported by the event manager.
///
/// Hangup and error conditions on a watched descriptor are not errors:
/// they are delivered to the callback as part of its [`Events`](crate::Events).
#[derive(Error, Debug)]
pub enum Error {
    /// The OS polling handle could not be created.
    #[error("failed to create polling handle: {0}")]
    ResourceExhausted(#[source] io::Error),

    /// Registration was attempted on a negative, closed or unpollable descriptor.
    #[error("descriptor {fd} cannot be registered: {source}")]
    InvalidDescriptor {
        fd: RawFd,
        #[source]
        source: io::Error,
    },

    /// The descriptor has no entry in the registry.
    #[error("descriptor {0} is not registered")]
    NotRegistered(RawFd),

    /// A control or wait call on the polling handle failed.
    #[error("{op} failed: {source}")]
    Os {
        op: &'static str,
        #[source]
        source: io::Error,
    },
}

impl Error {
    pub(crate) fn os(op: &'static str, source: io::Error) -> Self {
        Error::Os { op, source }
    }
}

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
