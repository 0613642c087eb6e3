//! Scheduler seam and wait queues.
//!
//! Blocking primitives talk to the runtime only through [`Scheduler`].
//! Two implementations ship with the crate: [`SingleThreaded`] for builds
//! without concurrency, and `HostScheduler` on std threads behind the
//! `std-shim` feature.

pub mod single;
pub mod trait_def;
pub mod wait_queue;

#[cfg(any(test, feature = "std-shim"))]
pub mod host;

#[cfg(any(test, feature = "std-shim"))]
pub use host::HostScheduler;
pub use single::SingleThreaded;
pub use trait_def::{priority, Scheduler};
pub use wait_queue::{pend, ready, WaitPolicy, WaitQueue, WaitState, Waiter};
