//! Wait queues of contexts blocked on a resource.
//!
//! A [`WaitQueue`] lives inside the state guarded by the resource's
//! [`SpinLock`]. Every mutation happens with that lock held, which is what
//! makes a release's hand-off and a waiter's timeout mutually exclusive:
//! whichever takes the lock first decides the waiter's fate.
//!
//! Each waiter owns a single payload slot. A releasing context places the
//! resource directly into the slot of the waiter it unpends, so the resource
//! never becomes visible to a third context in between.

use crate::errors::PendError;
use crate::mem::ArcLite;
use crate::sched::Scheduler;
use crate::sync::{SpinLock, SpinLockGuard};
use crate::time::Timeout;
use portable_atomic::{AtomicU8, Ordering};

use alloc::collections::VecDeque;

/// Order in which waiters are released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitPolicy {
    /// Highest priority first; equal priorities in arrival order.
    #[default]
    Priority,
    /// Strict arrival order, priorities ignored.
    Fifo,
}

/// Lifecycle of one waiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WaitState {
    /// Queued and suspended.
    Pending = 0,
    /// Unpended by a release; the payload slot is filled.
    Ready = 1,
    /// Removed from the queue by its own deadline.
    TimedOut = 2,
}

/// One blocked context.
pub struct Waiter<H, T> {
    thread: H,
    priority: u8,
    state: AtomicU8,
    payload: spin::Mutex<Option<T>>,
}

impl<H, T> Waiter<H, T> {
    fn new(thread: H, priority: u8) -> Self {
        Self {
            thread,
            priority,
            state: AtomicU8::new(WaitState::Pending as u8),
            payload: spin::Mutex::new(None),
        }
    }

    /// Wake handle of the blocked context.
    pub fn thread(&self) -> &H {
        &self.thread
    }

    /// Priority captured when the context blocked.
    pub fn priority(&self) -> u8 {
        self.priority
    }

    /// Current state.
    pub fn state(&self) -> WaitState {
        match self.state.load(Ordering::Acquire) {
            0 => WaitState::Pending,
            1 => WaitState::Ready,
            _ => WaitState::TimedOut,
        }
    }

    fn set_state(&self, state: WaitState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Fill the slot and mark the waiter ready. Called with the queue's
    /// lock held, after the waiter left the queue.
    fn hand_off(&self, payload: T) {
        *self.payload.lock() = Some(payload);
        self.set_state(WaitState::Ready);
    }

    /// Take the handed-off payload, if any.
    fn take(&self) -> Option<T> {
        if self.state() == WaitState::Ready {
            self.payload.lock().take()
        } else {
            None
        }
    }
}

impl<H, T> core::fmt::Debug for Waiter<H, T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Waiter")
            .field("priority", &self.priority)
            .field("state", &self.state())
            .finish()
    }
}

/// Contexts blocked on one resource, kept in wake order.
pub struct WaitQueue<H, T> {
    policy: WaitPolicy,
    waiters: VecDeque<ArcLite<Waiter<H, T>>>,
}

impl<H, T> WaitQueue<H, T> {
    /// An empty queue with the given release order.
    pub const fn new(policy: WaitPolicy) -> Self {
        Self {
            policy,
            waiters: VecDeque::new(),
        }
    }

    /// Release order of this queue.
    pub fn policy(&self) -> WaitPolicy {
        self.policy
    }

    /// Number of blocked contexts.
    pub fn len(&self) -> usize {
        self.waiters.len()
    }

    /// Whether no context is blocked.
    pub fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }

    /// Record a context as blocked and return its waiter.
    pub fn enqueue(&mut self, thread: H, priority: u8) -> ArcLite<Waiter<H, T>> {
        let waiter = ArcLite::new(Waiter::new(thread, priority));
        let at = match self.policy {
            WaitPolicy::Fifo => self.waiters.len(),
            // Behind every waiter of equal or higher priority.
            WaitPolicy::Priority => self
                .waiters
                .iter()
                .position(|w| w.priority < priority)
                .unwrap_or(self.waiters.len()),
        };
        self.waiters.insert(at, waiter.clone());
        waiter
    }

    /// Remove the waiter that should be released next, without readying it.
    pub fn unpend_first(&mut self) -> Option<ArcLite<Waiter<H, T>>> {
        self.waiters.pop_front()
    }

    /// Remove a specific waiter. Returns `false` if it was no longer queued.
    pub fn remove(&mut self, waiter: &ArcLite<Waiter<H, T>>) -> bool {
        match self.waiters.iter().position(|w| ArcLite::ptr_eq(w, waiter)) {
            Some(at) => {
                self.waiters.remove(at);
                true
            }
            None => false,
        }
    }

    /// Priorities of the queued waiters in release order.
    pub fn priorities(&self) -> impl Iterator<Item = u8> + '_ {
        self.waiters.iter().map(|w| w.priority)
    }
}

impl<H, T> Default for WaitQueue<H, T> {
    fn default() -> Self {
        Self::new(WaitPolicy::default())
    }
}

impl<H, T> core::fmt::Debug for WaitQueue<H, T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WaitQueue")
            .field("policy", &self.policy)
            .field("len", &self.waiters.len())
            .finish()
    }
}

/// Hand `payload` to an unpended waiter and make its context runnable.
///
/// Must be called with the lock that guards the waiter's queue still held.
/// Does not yield; pair with [`Scheduler::reschedule`] when releasing the
/// lock.
pub fn ready<S: Scheduler, T>(
    scheduler: &S,
    waiter: &ArcLite<Waiter<S::Thread, T>>,
    payload: T,
) {
    waiter.hand_off(payload);
    scheduler.wake_up(waiter.thread());
}

/// Block the calling context on the queue selected by `queue_of`.
///
/// `guard` must be the held guard of `lock`. The caller is queued while the
/// guard is held, then the guard is released and the context suspended, so
/// a release between the two cannot be missed.
///
/// Returns the payload handed over by [`ready`], or
/// - [`PendError::WouldBlock`] for [`Timeout::NoWait`], without queueing;
/// - [`PendError::TimedOut`] once the deadline has passed with no hand-off.
///
/// A hand-off that races with the deadline wins: the timeout path re-takes
/// the lock and only reports `TimedOut` if the waiter is still queued.
pub fn pend<'a, S, D, T, F>(
    scheduler: &S,
    lock: &'a SpinLock<D>,
    mut guard: SpinLockGuard<'a, D>,
    queue_of: F,
    timeout: Timeout,
) -> Result<T, PendError>
where
    S: Scheduler,
    F: Fn(&mut D) -> &mut WaitQueue<S::Thread, T>,
{
    if timeout.is_no_wait() {
        return Err(PendError::WouldBlock);
    }
    let deadline = timeout.deadline(scheduler.now());
    let waiter = queue_of(&mut *guard).enqueue(scheduler.current(), scheduler.current_priority());
    drop(guard);

    loop {
        if let Some(payload) = waiter.take() {
            return Ok(payload);
        }
        if let Some(deadline) = deadline {
            if scheduler.now() >= deadline {
                let mut guard = lock.lock();
                if queue_of(&mut *guard).remove(&waiter) {
                    waiter.set_state(WaitState::TimedOut);
                    drop(guard);
                    log::trace!("pend: deadline {:?} passed", deadline);
                    return Err(PendError::TimedOut);
                }
                // Unpended by a release before we got the lock; the slot is
                // filled and the next pass takes it.
                continue;
            }
        }
        scheduler.block(deadline);
    }
}
