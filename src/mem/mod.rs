//! Block memory: backing buffers, free-index bookkeeping and the slab.
//!
//! Also provides the reference-counted handle shared between a wait queue
//! and the context waiting on it, in a no_std environment.

pub mod arc_lite;
pub mod free_list;
pub mod slab;

pub use arc_lite::ArcLite;
pub use free_list::{word_round_up, FreeList, SlabBuffer, WORD};
pub use slab::{Block, MemSlab, MemSlabBuilder, MemoryStats};
