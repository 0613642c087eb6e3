//! Synchronization primitives shared by the wait queue and the slab.

pub mod spinlock;

pub use spinlock::{SpinLock, SpinLockGuard};
