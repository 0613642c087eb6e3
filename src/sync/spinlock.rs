//! Interrupt-masking spinlock.
//!
//! [`SpinLock::lock`] masks local interrupts, then spins on an atomic flag
//! until it is acquired. The returned guard carries the interrupt key and
//! gives both back when dropped, on every exit path.
//!
//! Critical sections must be short and must never suspend the calling
//! context. Code that needs to wait hands its guard to
//! [`pend`](crate::sched::wait_queue::pend), which releases it before
//! blocking.

use crate::arch::{Arch, DefaultArch, IrqKey};
use core::fmt;
use core::mem::ManuallyDrop;
use core::ops::{Deref, DerefMut};

/// A spinlock that masks local interrupts while held.
pub struct SpinLock<T> {
    inner: spin::Mutex<T>,
}

/// RAII guard for [`SpinLock`].
///
/// Releases the flag and then restores the saved interrupt state when
/// dropped.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct SpinLockGuard<'a, T> {
    guard: ManuallyDrop<spin::MutexGuard<'a, T>>,
    key: IrqKey,
}

impl<T> SpinLock<T> {
    /// Create a new, unlocked spinlock.
    pub const fn new(data: T) -> Self {
        Self {
            inner: spin::Mutex::new(data),
        }
    }

    /// Acquire the lock, spinning until it is available.
    ///
    /// Deadlocks if the calling context already holds it.
    #[inline]
    pub fn lock(&self) -> SpinLockGuard<'_, T> {
        let key = DefaultArch::irq_save();
        let guard = loop {
            if let Some(guard) = self.inner.try_lock() {
                break guard;
            }
            while self.inner.is_locked() {
                DefaultArch::relax();
            }
        };
        SpinLockGuard {
            guard: ManuallyDrop::new(guard),
            key,
        }
    }

    /// Try to acquire the lock without spinning.
    ///
    /// The interrupt state is left as it was when the lock is busy.
    #[inline]
    pub fn try_lock(&self) -> Option<SpinLockGuard<'_, T>> {
        let key = DefaultArch::irq_save();
        match self.inner.try_lock() {
            Some(guard) => Some(SpinLockGuard {
                guard: ManuallyDrop::new(guard),
                key,
            }),
            None => {
                DefaultArch::irq_restore(key);
                None
            }
        }
    }

    /// Check if the lock is currently held.
    ///
    /// The answer may be stale by the time it is returned. Never use it for
    /// synchronization.
    #[inline]
    pub fn is_locked(&self) -> bool {
        self.inner.is_locked()
    }

    /// Mutable access without locking; the `&mut` proves exclusivity.
    #[inline]
    pub fn get_mut(&mut self) -> &mut T {
        self.inner.get_mut()
    }

    /// Consume the lock and return the protected value.
    pub fn into_inner(self) -> T {
        self.inner.into_inner()
    }
}

impl<T: Default> Default for SpinLock<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for SpinLock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.try_lock() {
            Some(guard) => f.debug_struct("SpinLock").field("data", &&*guard).finish(),
            None => f
                .debug_struct("SpinLock")
                .field("data", &"<locked>")
                .finish(),
        }
    }
}

impl<T> Deref for SpinLockGuard<'_, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for SpinLockGuard<'_, T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<T: fmt::Debug> fmt::Debug for SpinLockGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

impl<T> Drop for SpinLockGuard<'_, T> {
    #[inline]
    fn drop(&mut self) {
        // Flag first, then interrupts: an interrupt taken right after the
        // restore must find the lock free.
        unsafe { ManuallyDrop::drop(&mut self.guard) };
        DefaultArch::irq_restore(self.key);
    }
}
