//! Scheduler for builds without concurrency support.

use super::{priority, Scheduler};
use crate::arch::{Arch, DefaultArch};
use crate::time::Instant;
use core::marker::PhantomData;

/// A single execution context that can never be suspended.
///
/// With this scheduler every blocking request degrades to no-wait:
/// an exhausted slab reports out-of-resources instead of pending.
pub struct SingleThreaded<A: Arch = DefaultArch> {
    _arch: PhantomData<fn() -> A>,
}

impl<A: Arch> SingleThreaded<A> {
    /// Create the scheduler.
    pub const fn new() -> Self {
        Self { _arch: PhantomData }
    }
}

impl<A: Arch> Default for SingleThreaded<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: Arch> core::fmt::Debug for SingleThreaded<A> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("SingleThreaded")
    }
}

impl<A: Arch> Scheduler for SingleThreaded<A> {
    type Thread = ();

    fn current(&self) -> Self::Thread {}

    fn current_priority(&self) -> u8 {
        priority::NORMAL
    }

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn can_block(&self) -> bool {
        false
    }

    fn block(&self, _deadline: Option<Instant>) {
        A::relax();
    }

    fn wake_up(&self, _thread: &()) {}
}
