use crate::error::{Error, Result};
use crate::event::{Events, Interest};
use crate::handler::{self, Handler};
use crate::poller::{Poller, Wait};
use crate::utils::{Key, Slab};

use log::{debug, error, warn};
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::os::fd::RawFd;
use std::time::Duration;

/// Callback invoked when a registered descriptor reports an event.
///
/// It receives the registry itself, so it can add, remove or re-arm any
/// descriptor (including its own) while it runs, followed by the
/// descriptor and the observed event set.
pub type Callback = Box<dyn FnMut(&mut Registry, RawFd, Events)>;

/// A registered descriptor.
struct Entry {
    fd: RawFd,

    /// Mask last applied to the poller for `fd`.
    interest: Interest,

    /// `None` while the callback is being dispatched.
    callback: Option<Callback>,
}

/// The table of watched descriptors.
///
/// The registry keeps every descriptor's interest mask and callback in
/// lock-step with the OS polling handle it owns. Entries live in a slab;
/// the poller carries the slab key of each entry so a ready event is
/// resolved without going through the descriptor map.
pub struct Registry {
    poller: Poller,
    entries: Slab<Entry>,
    index: HashMap<RawFd, Key>,
}

impl Registry {
    pub(crate) fn new(poller: Poller, capacity: usize) -> Self {
        Self {
            poller,
            entries: Slab::new(capacity),
            index: HashMap::with_capacity(capacity),
        }
    }

    /// Registers `fd` with the given interest and callback.
    ///
    /// If `fd` is already registered, the previous entry is removed first
    /// and its callback will never run again.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidDescriptor`] if `fd` is negative, closed, or of a
    /// kind the poller refuses. [`Error::Os`] for any other failure of the
    /// registration call.
    pub fn add<F>(&mut self, fd: RawFd, interest: Interest, callback: F) -> Result<()>
    where
        F: FnMut(&mut Registry, RawFd, Events) + 'static,
    {
        self.insert(fd, interest, Box::new(callback))
    }

    /// Registers `fd` with a [`Handler`] instead of a closure.
    ///
    /// The handler gets one hook call per dispatch, chosen by
    /// [`Events::condition`].
    pub fn add_handler<H>(&mut self, fd: RawFd, interest: Interest, handler: H) -> Result<()>
    where
        H: Handler + 'static,
    {
        self.insert(fd, interest, Box::new(handler::into_callback(handler)))
    }

    fn insert(&mut self, fd: RawFd, interest: Interest, callback: Callback) -> Result<()> {
        if fd < 0 {
            return Err(Error::InvalidDescriptor {
                fd,
                source: io::Error::from_raw_os_error(libc::EBADF),
            });
        }

        self.remove(fd);

        let key = self.entries.insert(Entry {
            fd,
            interest,
            callback: Some(callback),
        });

        if let Err(source) = self.poller.register(fd, key.to_token(), interest) {
            self.entries.remove(key);
            return Err(registration_error(fd, source));
        }

        self.index.insert(fd, key);
        debug!("registered descriptor {fd} with {interest:?}");

        Ok(())
    }

    /// Deregisters `fd` and drops its callback.
    ///
    /// Does nothing if `fd` is not registered. A failure to deregister
    /// from the poller (typically because the descriptor was already
    /// closed) is logged and otherwise ignored.
    pub fn remove(&mut self, fd: RawFd) {
        let Some(key) = self.index.remove(&fd) else {
            return;
        };

        if let Err(err) = self.poller.deregister(fd) {
            warn!("failed to deregister descriptor {fd}: {err}");
        }

        self.entries.remove(key);
        debug!("removed descriptor {fd}");
    }

    /// Enables or disables `flag` in the interest mask of `fd`.
    ///
    /// The poller is only touched when the mask actually changes.
    ///
    /// # Errors
    ///
    /// [`Error::NotRegistered`] if `fd` is unknown. [`Error::Os`] if the
    /// poller rejects the new mask, including when `fd` was closed without
    /// being removed first; the stored mask is left unchanged.
    pub fn set_interest(&mut self, fd: RawFd, flag: Interest, enable: bool) -> Result<()> {
        let key = *self.index.get(&fd).ok_or(Error::NotRegistered(fd))?;
        let entry = self
            .entries
            .get_mut(key)
            .ok_or(Error::NotRegistered(fd))?;

        let interest = entry.interest.with(flag, enable);
        if interest == entry.interest {
            return Ok(());
        }

        if let Err(source) = self.poller.reregister(fd, key.to_token(), interest) {
            error!("failed to change interest of descriptor {fd} to {interest:?}: {source}");
            return Err(Error::os("modify interest", source));
        }

        entry.interest = interest;
        debug!("descriptor {fd} now watches {interest:?}");

        Ok(())
    }

    /// Enables or disables readable notifications for `fd`.
    pub fn notify_on_readable(&mut self, fd: RawFd, enable: bool) -> Result<()> {
        self.set_interest(fd, Interest::READABLE, enable)
    }

    /// Enables or disables writable notifications for `fd`.
    pub fn notify_on_writable(&mut self, fd: RawFd, enable: bool) -> Result<()> {
        self.set_interest(fd, Interest::WRITABLE, enable)
    }

    /// Returns the interest mask currently applied to `fd`.
    pub fn interest(&self, fd: RawFd) -> Option<Interest> {
        let key = self.index.get(&fd)?;
        self.entries.get(*key).map(|entry| entry.interest)
    }

    /// Returns `true` if `fd` is registered.
    pub fn contains(&self, fd: RawFd) -> bool {
        self.index.contains_key(&fd)
    }

    /// Number of registered descriptors.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no descriptor is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterates over the registered descriptors, in no particular order.
    pub fn descriptors(&self) -> impl Iterator<Item = RawFd> + '_ {
        self.index.keys().copied()
    }

    /// Removes every registered descriptor.
    pub fn clear(&mut self) {
        let fds: Vec<RawFd> = self.descriptors().collect();
        for fd in fds {
            self.remove(fd);
        }
    }

    pub(crate) fn wait(&mut self, timeout: Option<Duration>) -> io::Result<Wait> {
        self.poller.wait(timeout)
    }

    /// Takes the callback of the entry behind `token` out for dispatch.
    pub(crate) fn detach(&mut self, token: u64) -> Option<(Key, RawFd, Callback)> {
        let key = Key::from_token(token);
        let entry = self.entries.get_mut(key)?;
        let callback = entry.callback.take()?;

        Some((key, entry.fd, callback))
    }

    /// Puts a dispatched callback back, unless its entry went away meanwhile.
    pub(crate) fn reattach(&mut self, key: Key, callback: Callback) {
        if let Some(entry) = self.entries.get_mut(key) {
            if entry.callback.is_none() {
                entry.callback = Some(callback);
            }
        }
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        self.clear();
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (fd, key) in &self.index {
            if let Some(entry) = self.entries.get(*key) {
                map.entry(fd, &entry.interest);
            }
        }
        map.finish()
    }
}

/// Classifies a failed registration.
fn registration_error(fd: RawFd, source: io::Error) -> Error {
    match source.raw_os_error() {
        Some(libc::EBADF) | Some(libc::EPERM) | Some(libc::EINVAL) => {
            Error::InvalidDescriptor { fd, source }
        }
        _ => Error::os("register", source),
    }
}
