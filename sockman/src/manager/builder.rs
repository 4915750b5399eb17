use super::{Manager, Registry};
use crate::error::{Error, Result};
use crate::poller::Poller;

/// Builder for configuring and creating a [`Manager`].
///
/// # Examples
///
/// ```rust,ignore
/// let manager = Manager::builder()
///     .capacity(1024)
///     .close_on_exec(false)
///     .build()?;
/// ```
#[derive(Debug, Clone)]
pub struct ManagerBuilder {
    /// Number of registrations to pre-allocate room for.
    capacity: usize,

    /// Whether the polling handle is closed across `exec`.
    close_on_exec: bool,
}

impl ManagerBuilder {
    /// Creates a new `ManagerBuilder` with default configuration.
    ///
    /// By default room is reserved for 64 descriptors and the polling
    /// handle is created close-on-exec.
    pub fn new() -> Self {
        Self {
            capacity: 64,
            close_on_exec: true,
        }
    }

    /// Sets how many registrations are pre-allocated.
    ///
    /// The registry still grows past this value on demand.
    ///
    /// # Panics
    ///
    /// Panics if `n == 0`.
    pub fn capacity(mut self, n: usize) -> Self {
        assert!(n > 0, "capacity must be > 0");

        self.capacity = n;
        self
    }

    /// Sets whether the polling handle is closed when the process `exec`s.
    pub fn close_on_exec(mut self, enable: bool) -> Self {
        self.close_on_exec = enable;
        self
    }

    /// Builds the manager with the configured options.
    ///
    /// # Errors
    ///
    /// [`Error::ResourceExhausted`] if the OS polling handle cannot be
    /// created.
    pub fn build(self) -> Result<Manager> {
        let poller = Poller::new(self.close_on_exec).map_err(Error::ResourceExhausted)?;

        Ok(Manager {
            registry: Registry::new(poller, self.capacity),
        })
    }
}

impl Default for ManagerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
