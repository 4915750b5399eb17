//! Example: timers driving `service` timeouts.
//!
//! The manager has nothing registered here; the point is the loop shape.
//! A timer queue computes how long the next `service` call may block and
//! fires expired timers after each wake-up.
//!
//! Expected output: a few `loop` lines, then `1st timeout` after two
//! seconds and `final timeout` after five. The three-second timer is
//! cancelled by the first one and never fires.

mod common;

use sockman::{Manager, Shutdown};

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::error::Error;
use std::time::{Duration, Instant};

type Action = Box<dyn FnOnce(&mut Timers)>;

/// An entry in the timer queue.
///
/// Ordered by deadline, then by id, so that a `BinaryHeap<TimerEntry>`
/// pops the earliest deadline first.
#[derive(PartialEq, Eq)]
struct TimerEntry {
    deadline: Instant,
    id: u64,
}

impl Ord for TimerEntry {
    /// The comparison is **reversed** to turn the heap into a min-heap.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Default)]
struct Timers {
    next_id: u64,
    queue: BinaryHeap<TimerEntry>,
    actions: HashMap<u64, Action>,
}

impl Timers {
    fn add(&mut self, after: Duration, action: impl FnOnce(&mut Timers) + 'static) -> u64 {
        self.next_id += 1;
        let id = self.next_id;

        self.queue.push(TimerEntry {
            deadline: Instant::now() + after,
            id,
        });
        self.actions.insert(id, Box::new(action));

        id
    }

    /// Cancels a pending timer. Its queue entry is skipped when it expires.
    fn cancel(&mut self, id: u64) {
        self.actions.remove(&id);
    }

    /// Fires every expired timer and returns how long until the next one.
    ///
    /// `None` means no timer is pending and the caller may block forever.
    fn poll(&mut self) -> Option<Duration> {
        loop {
            let now = Instant::now();
            let entry = self.queue.peek()?;

            if !self.actions.contains_key(&entry.id) {
                self.queue.pop();
                continue;
            }

            if entry.deadline > now {
                return Some(entry.deadline - now);
            }

            let id = entry.id;
            self.queue.pop();
            if let Some(action) = self.actions.remove(&id) {
                action(self);
            }
        }
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    common::init_logging();

    let shutdown = Shutdown::new();
    let mut manager = Manager::new()?;
    let mut timers = Timers::default();

    let hidden = timers.add(Duration::from_secs(3), |_| {
        println!("this should not be shown");
    });

    timers.add(Duration::from_secs(2), move |timers| {
        println!("1st timeout");
        timers.cancel(hidden);
    });

    let stop = shutdown.clone();
    timers.add(Duration::from_secs(5), move |_| {
        println!("final timeout");
        stop.request();
    });

    let mut timeout = timers.poll();
    while !shutdown.is_requested() {
        println!("loop");
        manager.service(timeout)?;
        timeout = timers.poll();
    }

    Ok(())
}
