//! Test helper utilities and common functionality.

use crate::mem::{MemSlab, MemSlabBuilder};
use crate::sched::{HostScheduler, Scheduler, WaitPolicy};
use std::time::{Duration, Instant};

/// Upper bound on how long a helper waits for other threads to settle.
const SETTLE_LIMIT: Duration = Duration::from_secs(5);

/// A heap-backed slab whose waiters are host threads.
pub(crate) fn host_slab(block_size: usize, num_blocks: u32, policy: WaitPolicy) -> MemSlab<HostScheduler> {
    MemSlabBuilder::new(block_size, num_blocks)
        .wait_policy(policy)
        .build(HostScheduler::new())
        .expect("valid slab geometry")
}

/// Spin until exactly `count` contexts are queued on `slab`.
pub(crate) fn wait_for_waiters<S: Scheduler>(slab: &MemSlab<S>, count: usize) {
    let start = Instant::now();
    while slab.num_waiters() != count {
        assert!(
            start.elapsed() < SETTLE_LIMIT,
            "expected {} waiters, found {}",
            count,
            slab.num_waiters()
        );
        std::thread::yield_now();
    }
}

/// Fill a block with a pattern derived from `tag`.
pub(crate) fn stamp(block: &mut [u8], tag: u8) {
    for (i, byte) in block.iter_mut().enumerate() {
        *byte = tag.wrapping_add(i as u8);
    }
}

/// Whether a block still holds the pattern written by [`stamp`].
pub(crate) fn has_stamp(block: &[u8], tag: u8) -> bool {
    block
        .iter()
        .enumerate()
        .all(|(i, &byte)| byte == tag.wrapping_add(i as u8))
}
