//! Object-style event handlers.
//!
//! Closures are the primary way to react to events, but a stateful
//! connection object often reads better as a type with one method per
//! condition. [`Handler`] provides that shape on top of the callback
//! contract: every dispatch calls exactly one hook.

use crate::event::{Condition, Events};
use crate::manager::Registry;

use std::cell::RefCell;
use std::os::fd::RawFd;
use std::rc::Rc;

/// A descriptor handler with one hook per condition.
///
/// Every hook defaults to doing nothing, so implementors only override
/// what they care about. When several conditions are reported at once,
/// only the most significant one is delivered, in the order error,
/// hangup, readable, writable.
pub trait Handler {
    fn on_readable(&mut self, _registry: &mut Registry, _fd: RawFd) {}

    fn on_writable(&mut self, _registry: &mut Registry, _fd: RawFd) {}

    fn on_hungup(&mut self, _registry: &mut Registry, _fd: RawFd) {}

    fn on_error(&mut self, _registry: &mut Registry, _fd: RawFd) {}
}

/// Shared handlers, for objects also reachable from other callbacks.
impl<H: Handler> Handler for Rc<RefCell<H>> {
    fn on_readable(&mut self, registry: &mut Registry, fd: RawFd) {
        self.borrow_mut().on_readable(registry, fd);
    }

    fn on_writable(&mut self, registry: &mut Registry, fd: RawFd) {
        self.borrow_mut().on_writable(registry, fd);
    }

    fn on_hungup(&mut self, registry: &mut Registry, fd: RawFd) {
        self.borrow_mut().on_hungup(registry, fd);
    }

    fn on_error(&mut self, registry: &mut Registry, fd: RawFd) {
        self.borrow_mut().on_error(registry, fd);
    }
}

/// Adapts a handler into a registry callback.
pub(crate) fn into_callback<H>(mut handler: H) -> impl FnMut(&mut Registry, RawFd, Events) + 'static
where
    H: Handler + 'static,
{
    move |registry, fd, events| match events.condition() {
        Some(Condition::Error) => handler.on_error(registry, fd),
        Some(Condition::Hangup) => handler.on_hungup(registry, fd),
        Some(Condition::Readable) => handler.on_readable(registry, fd),
        Some(Condition::Writable) => handler.on_writable(registry, fd),
        None => {}
    }
}
