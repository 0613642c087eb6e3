//! Scheduler backed by host OS threads.
//!
//! Each std thread is one execution context. Blocking parks the thread,
//! waking unparks it, and the priority used for wait-queue ordering is a
//! per-thread value set with [`HostScheduler::set_priority`]. The host OS
//! still decides who actually runs; only wake order is priority-based.

use super::{priority, Scheduler};
use crate::sync::SpinLockGuard;
use crate::time::Instant;
use std::cell::Cell;
use std::thread::{self, Thread};

thread_local! {
    static PRIORITY: Cell<u8> = const { Cell::new(priority::NORMAL) };
}

/// Thread-backed [`Scheduler`] for hosted builds and tests.
#[derive(Debug, Clone)]
pub struct HostScheduler {
    epoch: std::time::Instant,
}

impl HostScheduler {
    /// Create a scheduler whose clock starts now.
    pub fn new() -> Self {
        Self {
            epoch: std::time::Instant::now(),
        }
    }

    /// Set the wait-queue priority of the calling thread.
    pub fn set_priority(priority: u8) {
        PRIORITY.with(|p| p.set(priority));
    }

    /// Wait-queue priority of the calling thread.
    pub fn priority() -> u8 {
        PRIORITY.with(Cell::get)
    }
}

impl Default for HostScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for HostScheduler {
    type Thread = Thread;

    fn current(&self) -> Thread {
        thread::current()
    }

    fn current_priority(&self) -> u8 {
        Self::priority()
    }

    fn now(&self) -> Instant {
        let nanos = self.epoch.elapsed().as_nanos();
        Instant::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }

    fn block(&self, deadline: Option<Instant>) {
        match deadline {
            None => thread::park(),
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(self.now());
                if !remaining.is_zero() {
                    thread::park_timeout(remaining.into());
                }
            }
        }
    }

    fn wake_up(&self, thread: &Thread) {
        thread.unpark();
    }

    fn reschedule<T>(&self, guard: SpinLockGuard<'_, T>) {
        drop(guard);
        thread::yield_now();
    }
}
