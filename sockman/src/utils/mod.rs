//! Internal data structures.
//!
//! This module exposes a generation-tagged [`Slab`] used by the registry
//! to turn poller tokens back into entries in constant time.

mod slab;

pub(crate) use slab::{Key, Slab};
