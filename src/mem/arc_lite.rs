//! Lightweight atomic reference counting for no_std environments.
//!
//! A waiter record is shared by exactly two parties: the wait queue and the
//! pending context. `ArcLite` gives that sharing without pulling in weak
//! counts or `alloc::sync`, which is missing on targets without native
//! pointer-width atomics.

use core::alloc::Layout;
use core::ops::Deref;
use core::ptr::NonNull;
use portable_atomic::{AtomicUsize, Ordering};

/// Shared ownership of a heap value with an atomic strong count.
pub struct ArcLite<T> {
    ptr: NonNull<ArcLiteInner<T>>,
}

struct ArcLiteInner<T> {
    count: AtomicUsize,
    data: T,
}

impl<T> ArcLite<T> {
    /// Move `data` to the heap with a reference count of 1.
    pub fn new(data: T) -> Self {
        let layout = Layout::new::<ArcLiteInner<T>>();
        let raw = unsafe { alloc::alloc::alloc(layout) } as *mut ArcLiteInner<T>;
        let Some(ptr) = NonNull::new(raw) else {
            alloc::alloc::handle_alloc_error(layout);
        };

        unsafe {
            ptr.as_ptr().write(ArcLiteInner {
                count: AtomicUsize::new(1),
                data,
            });
        }

        Self { ptr }
    }

    /// Get the current reference count.
    ///
    /// The value may change immediately after being read.
    pub fn ref_count(&self) -> usize {
        self.inner().count.load(Ordering::Acquire)
    }

    /// Whether both handles point at the same allocation.
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        this.ptr == other.ptr
    }

    fn inner(&self) -> &ArcLiteInner<T> {
        unsafe { self.ptr.as_ref() }
    }
}

impl<T> Clone for ArcLite<T> {
    fn clone(&self) -> Self {
        self.inner().count.fetch_add(1, Ordering::Relaxed);
        Self { ptr: self.ptr }
    }
}

impl<T> Drop for ArcLite<T> {
    fn drop(&mut self) {
        if self.inner().count.fetch_sub(1, Ordering::Release) != 1 {
            return;
        }
        // Synchronize with every earlier release before tearing down.
        portable_atomic::fence(Ordering::Acquire);
        unsafe {
            core::ptr::drop_in_place(self.ptr.as_ptr());
            alloc::alloc::dealloc(
                self.ptr.as_ptr() as *mut u8,
                Layout::new::<ArcLiteInner<T>>(),
            );
        }
    }
}

impl<T> Deref for ArcLite<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.inner().data
    }
}

impl<T: core::fmt::Debug> core::fmt::Debug for ArcLite<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Debug::fmt(&**self, f)
    }
}

unsafe impl<T: Send + Sync> Send for ArcLite<T> {}
unsafe impl<T: Send + Sync> Sync for ArcLite<T> {}
