//! The boundary between blocking primitives and whatever runs contexts.

use crate::sync::SpinLockGuard;
use crate::time::Instant;

/// Scheduler services needed to suspend and resume execution contexts.
///
/// Blocking primitives in this crate never switch contexts themselves. They
/// record the caller in a wait queue, release their lock and ask the
/// scheduler to suspend it; a releasing context later hands over the
/// resource and asks the scheduler to make the waiter runnable again.
pub trait Scheduler: Send + Sync {
    /// Handle used to wake one suspended context.
    type Thread: Clone + Send + Sync;

    /// The calling context.
    fn current(&self) -> Self::Thread;

    /// Priority of the calling context (0-255, higher = more important).
    fn current_priority(&self) -> u8;

    /// Monotonic time used for deadlines.
    fn now(&self) -> Instant;

    /// Whether the calling context may be suspended at all.
    ///
    /// Runtimes without concurrency support return `false`, which turns
    /// every timeout into no-wait.
    fn can_block(&self) -> bool {
        true
    }

    /// Suspend the calling context until woken or until `deadline`.
    ///
    /// May return early or spuriously; callers re-check their condition.
    fn block(&self, deadline: Option<Instant>);

    /// Make a suspended context runnable again. Never blocks.
    fn wake_up(&self, thread: &Self::Thread);

    /// Release `guard` and let a context readied under it run.
    ///
    /// The default only drops the guard; preemptive schedulers yield here
    /// when the readied context outranks the caller.
    fn reschedule<T>(&self, guard: SpinLockGuard<'_, T>) {
        drop(guard);
    }
}

impl<S: Scheduler> Scheduler for &S {
    type Thread = S::Thread;

    fn current(&self) -> Self::Thread {
        (**self).current()
    }

    fn current_priority(&self) -> u8 {
        (**self).current_priority()
    }

    fn now(&self) -> Instant {
        (**self).now()
    }

    fn can_block(&self) -> bool {
        (**self).can_block()
    }

    fn block(&self, deadline: Option<Instant>) {
        (**self).block(deadline)
    }

    fn wake_up(&self, thread: &Self::Thread) {
        (**self).wake_up(thread)
    }

    fn reschedule<T>(&self, guard: SpinLockGuard<'_, T>) {
        (**self).reschedule(guard)
    }
}

/// Common priority levels. Waiters with a higher value are released first.
pub mod priority {
    /// Background work that may wait indefinitely
    pub const IDLE: u8 = 0;

    /// Low priority
    pub const LOW: u8 = 64;

    /// Default for contexts that never set one
    pub const NORMAL: u8 = 128;

    /// High priority
    pub const HIGH: u8 = 192;

    /// Released ahead of every other waiter
    pub const REALTIME: u8 = 255;
}
