#![cfg_attr(not(any(test, feature = "std-shim")), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]
#![forbid(unreachable_pub)]

//! Blocking fixed-block memory pools for kernels and bare-metal runtimes.
//!
//! A [`MemSlab`] hands out equally sized blocks from a buffer it owns.
//! Allocation never searches: free blocks sit on an index stack and are
//! popped in O(1). When the pool is exhausted a caller may wait with a
//! [`Timeout`]; the next [`MemSlab::free`] gives the released block directly
//! to the highest-priority waiter.
//!
//! # Features
//!
//! - `trace-max-utilization`: track the high-water mark of allocated blocks (default)
//! - `std-shim`: enable [`HostScheduler`] so slabs can block host threads
//!
//! # Quick Start
//!
//! ```ignore
//! use kslab::{MemSlabBuilder, HostScheduler, Timeout};
//!
//! let slab = MemSlabBuilder::new(64, 4).build(HostScheduler::new())?;
//!
//! let mut block = slab.alloc(Timeout::from_millis(10))?;
//! block.as_mut_slice().fill(0);
//! slab.free(block);
//! ```
//!
//! # Architecture
//!
//! - [`sync`]: interrupt-masking spinlock with an RAII guard
//! - [`sched`]: the [`Scheduler`] seam and priority-ordered wait queues
//! - [`mem`]: backing buffers, the free-index stack and the slab itself
//! - [`arch`]: per-architecture interrupt masking

// Core modules
pub mod arch;
pub mod errors;
pub mod mem;
pub mod sched;
pub mod sync;
pub mod time;

extern crate alloc;

#[cfg(test)]
mod tests;

// ============================================================================
// Public API
// ============================================================================

// Architecture abstraction
pub use arch::{Arch, DefaultArch, IrqKey, NoOpArch};

// Slab
pub use mem::{Block, MemSlab, MemSlabBuilder, MemoryStats, SlabBuffer};

// Scheduler
#[cfg(any(test, feature = "std-shim"))]
pub use sched::HostScheduler;
pub use sched::{priority, Scheduler, SingleThreaded, WaitPolicy};

// Synchronization
pub use sync::{SpinLock, SpinLockGuard};

// Time
pub use time::{Duration, Instant, Timeout};

// Errors
pub use errors::{ArgumentError, PendError, SlabError, SlabResult};
