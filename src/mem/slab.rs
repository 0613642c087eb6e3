//! Blocking fixed-size block pool.
//!
//! A [`MemSlab`] carves a buffer into `num_blocks` blocks of `block_size`
//! bytes. Allocation is O(1) while a block is free. When the pool is
//! exhausted a caller may wait: it is queued on the slab's wait queue and a
//! later [`MemSlab::free`] hands the released block straight to the first
//! waiter instead of returning it to the free list, so no third context can
//! take it in between.
//!
//! All bookkeeping lives behind one [`SpinLock`]; nothing in here suspends
//! while that lock is held.

use crate::errors::{ArgumentError, SlabError, SlabResult};
use crate::mem::free_list::{carve, word_round_up, FreeList, SlabBuffer, WORD};
use crate::sched::{pend, ready, Scheduler, WaitPolicy, WaitQueue};
use crate::sync::SpinLock;
use crate::time::Timeout;
use core::marker::PhantomData;
use core::ptr::NonNull;

/// Memory usage snapshot of a slab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemoryStats {
    /// Bytes in blocks currently allocated
    pub allocated_bytes: usize,
    /// Bytes in blocks currently free
    pub free_bytes: usize,
    /// High-water mark of `allocated_bytes` since creation or the last reset
    pub max_allocated_bytes: usize,
}

/// Mutable slab state, guarded by the slab lock.
struct SlabState<H> {
    free_list: FreeList,
    num_used: u32,
    #[cfg(feature = "trace-max-utilization")]
    max_used: u32,
    wait_q: WaitQueue<H, u32>,
}

impl<H> SlabState<H> {
    fn take_free(&mut self) -> Option<u32> {
        let index = self.free_list.pop()?;
        self.num_used += 1;
        #[cfg(feature = "trace-max-utilization")]
        {
            self.max_used = self.max_used.max(self.num_used);
        }
        Some(index)
    }

    fn max_used(&self) -> u32 {
        #[cfg(feature = "trace-max-utilization")]
        {
            self.max_used
        }
        #[cfg(not(feature = "trace-max-utilization"))]
        {
            0
        }
    }
}

/// A pool of equally sized blocks that callers can wait on.
///
/// # Example
///
/// ```ignore
/// use kslab::{MemSlabBuilder, SingleThreaded, Timeout};
///
/// let scheduler: SingleThreaded = SingleThreaded::new();
/// let slab = MemSlabBuilder::new(64, 4).build(scheduler)?;
/// let block = slab.alloc(Timeout::NoWait)?;
/// slab.free(block);
/// ```
pub struct MemSlab<S: Scheduler> {
    scheduler: S,
    block_size: usize,
    num_blocks: u32,
    buffer: SlabBuffer,
    state: SpinLock<SlabState<S::Thread>>,
}

impl<S: Scheduler> MemSlab<S> {
    /// Create a slab over `buffer` with priority-ordered waiters.
    ///
    /// # Arguments
    ///
    /// * `buffer` - Backing storage, owned by the slab from now on
    /// * `block_size` - Bytes per block; a non-zero multiple of the word size
    /// * `num_blocks` - Number of blocks carved from the front of `buffer`
    /// * `scheduler` - Runtime used to suspend and wake waiters
    ///
    /// # Errors
    ///
    /// [`SlabError::InvalidArgument`] if the block size or buffer address is
    /// not word aligned, or the buffer is too small.
    pub fn new(
        buffer: SlabBuffer,
        block_size: usize,
        num_blocks: u32,
        scheduler: S,
    ) -> SlabResult<Self> {
        Self::with_policy(buffer, block_size, num_blocks, WaitPolicy::default(), scheduler)
    }

    /// Create a slab whose waiters are released in `policy` order.
    pub fn with_policy(
        buffer: SlabBuffer,
        block_size: usize,
        num_blocks: u32,
        policy: WaitPolicy,
        scheduler: S,
    ) -> SlabResult<Self> {
        let free_list = carve(&buffer, block_size, num_blocks)?;
        log::debug!(
            "slab: {} blocks of {} bytes at {:p}, {:?} wake order",
            num_blocks,
            block_size,
            buffer.base(),
            policy
        );
        Ok(Self {
            scheduler,
            block_size,
            num_blocks,
            buffer,
            state: SpinLock::new(SlabState {
                free_list,
                num_used: 0,
                #[cfg(feature = "trace-max-utilization")]
                max_used: 0,
                wait_q: WaitQueue::new(policy),
            }),
        })
    }

    /// Allocate a block, waiting up to `timeout` for one to be freed.
    ///
    /// # Errors
    ///
    /// - [`SlabError::OutOfResources`] if the pool is exhausted and `timeout`
    ///   is no-wait, or the scheduler cannot suspend the caller.
    /// - [`SlabError::TimedOut`] if no block was released to this caller
    ///   before the timeout elapsed. Pool state is unchanged in that case.
    pub fn alloc(&self, timeout: Timeout) -> SlabResult<Block<'_>> {
        let mut state = self.state.lock();

        if let Some(index) = state.take_free() {
            drop(state);
            return Ok(self.block_at(index));
        }

        if timeout.is_no_wait() || !self.scheduler.can_block() {
            return Err(SlabError::OutOfResources);
        }

        log::trace!("slab {:p}: exhausted, pending {:?}", self.buffer.base(), timeout);
        let index = pend(&self.scheduler, &self.state, state, |s| &mut s.wait_q, timeout)?;
        Ok(self.block_at(index))
    }

    /// Return a block to the pool.
    ///
    /// If a context is waiting, the block goes directly to the first waiter
    /// and the pool's usage count is unchanged. Otherwise it is pushed back
    /// on the free list.
    ///
    /// # Panics
    ///
    /// If `block` was not allocated from this slab.
    pub fn free(&self, block: Block<'_>) {
        assert!(self.contains(&block), "block freed to the wrong slab");
        let index = block.index;
        let mut state = self.state.lock();

        if let Some(waiter) = state.wait_q.unpend_first() {
            log::trace!("slab {:p}: block {} handed off", self.buffer.base(), index);
            ready(&self.scheduler, &waiter, index);
            self.scheduler.reschedule(state);
            return;
        }

        state.free_list.push(index);
        state.num_used -= 1;
    }

    /// Consistent usage snapshot.
    pub fn stats(&self) -> MemoryStats {
        let state = self.state.lock();
        let used = state.num_used as usize;
        MemoryStats {
            allocated_bytes: used * self.block_size,
            free_bytes: (self.num_blocks as usize - used) * self.block_size,
            max_allocated_bytes: state.max_used() as usize * self.block_size,
        }
    }

    /// Restart the high-water mark from the current usage.
    pub fn reset_max(&self) {
        #[cfg(feature = "trace-max-utilization")]
        {
            let mut state = self.state.lock();
            let used = state.num_used;
            state.max_used = used;
        }
    }

    /// Number of blocks currently allocated.
    pub fn num_used(&self) -> u32 {
        self.state.lock().num_used
    }

    /// Number of blocks currently free.
    pub fn num_free(&self) -> u32 {
        self.num_blocks - self.num_used()
    }

    /// Most blocks allocated at once since creation or the last reset.
    ///
    /// Always 0 without the `trace-max-utilization` feature.
    pub fn max_used(&self) -> u32 {
        self.state.lock().max_used()
    }

    /// Size of each block in bytes.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Total number of blocks.
    pub fn num_blocks(&self) -> u32 {
        self.num_blocks
    }

    /// Number of contexts waiting for a block.
    pub fn num_waiters(&self) -> usize {
        self.state.lock().wait_q.len()
    }

    /// Release order of waiters.
    pub fn wait_policy(&self) -> WaitPolicy {
        self.state.lock().wait_q.policy()
    }

    /// Whether `block` was carved from this slab.
    pub fn contains(&self, block: &Block<'_>) -> bool {
        block.index < self.num_blocks
            && block.ptr.as_ptr() as usize
                == self.buffer.base().as_ptr() as usize + block.index as usize * self.block_size
    }

    /// The scheduler waiters are suspended through.
    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    fn block_at(&self, index: u32) -> Block<'_> {
        let offset = index as usize * self.block_size;
        // SAFETY: `carve` checked that every block lies inside the buffer.
        let ptr = unsafe { NonNull::new_unchecked(self.buffer.base().as_ptr().add(offset)) };
        Block {
            ptr,
            len: self.block_size,
            index,
            _slab: PhantomData,
        }
    }
}

impl<S: Scheduler> core::fmt::Debug for MemSlab<S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MemSlab")
            .field("block_size", &self.block_size)
            .field("num_blocks", &self.num_blocks)
            .field("num_used", &state.num_used)
            .field("waiters", &state.wait_q.len())
            .field("buffer", &self.buffer)
            .finish()
    }
}

/// One allocated block.
///
/// Exclusively owned by the caller until passed back to [`MemSlab::free`].
/// Dropping it without freeing leaks the block for the life of the slab.
#[must_use = "dropping a block leaks it; pass it to MemSlab::free"]
pub struct Block<'a> {
    ptr: NonNull<u8>,
    len: usize,
    index: u32,
    _slab: PhantomData<&'a [u8]>,
}

impl<'a> Block<'a> {
    /// Start of the block.
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Size of the block in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the block has no bytes.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Position of the block within its slab.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Block contents.
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: the block is in bounds, initialized, and owned by `self`.
        unsafe { core::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    /// Mutable block contents.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: as above; `&mut self` makes the access exclusive.
        unsafe { core::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl core::fmt::Debug for Block<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Block")
            .field("index", &self.index)
            .field("ptr", &self.ptr)
            .field("len", &self.len)
            .finish()
    }
}

// A block is plain memory owned by exactly one handle.
unsafe impl Send for Block<'_> {}
unsafe impl Sync for Block<'_> {}

/// Builder mirroring a static slab definition.
///
/// The block size is rounded up to a whole number of words and the buffer
/// is aligned to `max(align, word)`. Only the first block is guaranteed the
/// requested alignment unless the rounded block size is a multiple of it.
#[derive(Debug, Clone, Copy)]
pub struct MemSlabBuilder {
    block_size: usize,
    num_blocks: u32,
    align: usize,
    policy: WaitPolicy,
}

impl MemSlabBuilder {
    /// Start a slab of `num_blocks` blocks of at least `block_size` bytes.
    pub const fn new(block_size: usize, num_blocks: u32) -> Self {
        Self {
            block_size,
            num_blocks,
            align: WORD,
            policy: WaitPolicy::Priority,
        }
    }

    /// Buffer alignment. Must be a power of two.
    pub const fn align(mut self, align: usize) -> Self {
        self.align = align;
        self
    }

    /// Order in which waiters are released.
    pub const fn wait_policy(mut self, policy: WaitPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Block size after word rounding, or `None` if rounding overflows.
    pub fn rounded_block_size(&self) -> Option<usize> {
        word_round_up(self.block_size)
    }

    /// Allocate a buffer from the global allocator and build the slab.
    pub fn build<S: Scheduler>(self, scheduler: S) -> SlabResult<MemSlab<S>> {
        if !self.align.is_power_of_two() {
            return Err(ArgumentError::InvalidAlignment(self.align).into());
        }
        let block_size = self.rounded_block_size().ok_or(ArgumentError::SizeOverflow)?;
        let len = block_size
            .checked_mul(self.num_blocks as usize)
            .ok_or(ArgumentError::SizeOverflow)?;
        let buffer = SlabBuffer::allocate(len, self.align)?;
        MemSlab::with_policy(buffer, block_size, self.num_blocks, self.policy, scheduler)
    }

    /// Build the slab over a caller-provided buffer.
    ///
    /// No rounding is applied; the block size and buffer must already be
    /// word aligned and the buffer must honour the requested alignment.
    pub fn build_in<S: Scheduler>(self, buffer: SlabBuffer, scheduler: S) -> SlabResult<MemSlab<S>> {
        if !self.align.is_power_of_two() {
            return Err(ArgumentError::InvalidAlignment(self.align).into());
        }
        let base = buffer.base().as_ptr() as usize;
        if self.num_blocks > 0 && base % self.align != 0 {
            return Err(ArgumentError::MisalignedBuffer(base).into());
        }
        MemSlab::with_policy(buffer, self.block_size, self.num_blocks, self.policy, scheduler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::NoOpArch;
    use crate::sched::{HostScheduler, SingleThreaded};

    fn slab_4x64() -> MemSlab<HostScheduler> {
        MemSlabBuilder::new(64, 4).build(HostScheduler::new()).unwrap()
    }

    #[test]
    fn test_four_blocks_then_exhausted() {
        let slab = slab_4x64();
        let blocks: Vec<_> = (0..4).map(|_| slab.alloc(Timeout::NoWait).unwrap()).collect();

        let mut addrs: Vec<usize> = blocks.iter().map(|b| b.as_ptr() as usize).collect();
        addrs.sort_unstable();
        addrs.dedup();
        assert_eq!(addrs.len(), 4);
        assert!(addrs.windows(2).all(|w| w[1] - w[0] >= 64));

        assert_eq!(slab.alloc(Timeout::NoWait).unwrap_err(), SlabError::OutOfResources);

        let mut blocks = blocks;
        let freed = blocks.pop().unwrap();
        let freed_addr = freed.as_ptr();
        slab.free(freed);
        let again = slab.alloc(Timeout::NoWait).unwrap();
        assert_eq!(again.as_ptr(), freed_addr);

        slab.free(again);
        for block in blocks {
            slab.free(block);
        }
        assert_eq!(slab.num_used(), 0);
    }

    #[test]
    fn test_stats_track_usage() {
        let slab = slab_4x64();
        assert_eq!(
            slab.stats(),
            MemoryStats {
                allocated_bytes: 0,
                free_bytes: 256,
                max_allocated_bytes: 0
            }
        );

        let a = slab.alloc(Timeout::NoWait).unwrap();
        let b = slab.alloc(Timeout::NoWait).unwrap();
        assert_eq!(slab.num_used(), 2);
        assert_eq!(slab.num_free(), 2);
        slab.free(a);

        let stats = slab.stats();
        assert_eq!(stats.allocated_bytes, 64);
        assert_eq!(stats.free_bytes, 192);
        #[cfg(feature = "trace-max-utilization")]
        assert_eq!(stats.max_allocated_bytes, 128);
        #[cfg(not(feature = "trace-max-utilization"))]
        assert_eq!(stats.max_allocated_bytes, 0);
        slab.free(b);
    }

    #[test]
    fn test_alloc_free_round_trip_keeps_stats() {
        let slab = slab_4x64();
        let held = slab.alloc(Timeout::NoWait).unwrap();
        let before = slab.stats();

        let block = slab.alloc(Timeout::NoWait).unwrap();
        slab.free(block);

        let after = slab.stats();
        assert_eq!(after.allocated_bytes, before.allocated_bytes);
        assert_eq!(after.free_bytes, before.free_bytes);
        assert!(after.max_allocated_bytes >= before.max_allocated_bytes);
        slab.free(held);
    }

    #[cfg(feature = "trace-max-utilization")]
    #[test]
    fn test_reset_max_is_idempotent() {
        let slab = slab_4x64();
        let blocks: Vec<_> = (0..3).map(|_| slab.alloc(Timeout::NoWait).unwrap()).collect();
        let mut blocks = blocks.into_iter();
        slab.free(blocks.next().unwrap());
        assert_eq!(slab.max_used(), 3);

        slab.reset_max();
        assert_eq!(slab.stats().max_allocated_bytes, 2 * 64);
        slab.reset_max();
        assert_eq!(slab.stats().max_allocated_bytes, 2 * 64);
        assert_eq!(slab.max_used(), slab.num_used());

        for block in blocks {
            slab.free(block);
        }
    }

    #[test]
    fn test_init_rejects_bad_arguments() {
        let buffer = SlabBuffer::allocate(256, 8).unwrap();
        let err = MemSlab::new(buffer, WORD + 1, 4, HostScheduler::new()).unwrap_err();
        assert_eq!(err, SlabError::from(ArgumentError::MisalignedBlockSize(WORD + 1)));
        assert_eq!(err.errno(), -22);

        let buffer = SlabBuffer::allocate(128, 8).unwrap();
        assert!(matches!(
            MemSlab::new(buffer, 64, 4, HostScheduler::new()),
            Err(SlabError::InvalidArgument(ArgumentError::BufferTooSmall { .. }))
        ));

        assert_eq!(
            MemSlabBuilder::new(64, 4)
                .align(24)
                .build(HostScheduler::new())
                .unwrap_err(),
            SlabError::from(ArgumentError::InvalidAlignment(24))
        );
    }

    #[test]
    fn test_single_threaded_never_waits() {
        let slab = MemSlabBuilder::new(32, 1)
            .build(SingleThreaded::<NoOpArch>::new())
            .unwrap();
        let block = slab.alloc(Timeout::Forever).unwrap();
        assert_eq!(slab.alloc(Timeout::Forever).unwrap_err(), SlabError::OutOfResources);
        assert_eq!(slab.alloc(Timeout::from_millis(5)).unwrap_err(), SlabError::OutOfResources);
        assert_eq!(slab.num_waiters(), 0);
        slab.free(block);
        assert_eq!(slab.num_free(), 1);
    }

    #[test]
    fn test_builder_rejects_overflowing_block_size() {
        let builder = MemSlabBuilder::new(usize::MAX, 1);
        assert_eq!(builder.rounded_block_size(), None);
        assert_eq!(
            builder.build(HostScheduler::new()).unwrap_err(),
            SlabError::from(ArgumentError::SizeOverflow)
        );
    }

    #[test]
    fn test_builder_rounds_and_aligns() {
        let slab = MemSlabBuilder::new(WORD + 1, 3)
            .align(64)
            .wait_policy(WaitPolicy::Fifo)
            .build(HostScheduler::new())
            .unwrap();
        assert_eq!(slab.block_size(), 2 * WORD);
        assert_eq!(slab.num_blocks(), 3);
        assert_eq!(slab.wait_policy(), WaitPolicy::Fifo);

        let first = slab.alloc(Timeout::NoWait).unwrap();
        assert_eq!(first.index(), 0);
        assert_eq!(first.as_ptr() as usize % 64, 0);
        slab.free(first);
    }

    #[repr(C, align(4096))]
    struct Page([u8; 4096]);

    fn leak_page() -> &'static mut [u8] {
        let page: &'static mut Page = Box::leak(Box::new(Page([0; 4096])));
        &mut page.0
    }

    #[test]
    fn test_build_in_static_buffer() {
        let storage = leak_page();
        let base = storage.as_ptr() as usize;
        let slab = MemSlabBuilder::new(64, 4)
            .align(4096)
            .build_in(SlabBuffer::from_static(storage), HostScheduler::new())
            .unwrap();
        assert_eq!(slab.block_size(), 64);

        let blocks: Vec<_> = (0..4).map(|_| slab.alloc(Timeout::NoWait).unwrap()).collect();
        for (i, block) in blocks.iter().enumerate() {
            assert_eq!(block.as_ptr() as usize, base + i * 64);
        }
        assert_eq!(slab.alloc(Timeout::NoWait).unwrap_err(), SlabError::OutOfResources);
        for block in blocks {
            slab.free(block);
        }
        assert_eq!(slab.num_free(), 4);
    }

    #[test]
    fn test_build_in_rejects_underaligned_buffer() {
        let page = leak_page();
        let storage: &'static mut [u8] = &mut page[WORD..];
        let base = storage.as_ptr() as usize;
        let result = MemSlabBuilder::new(64, 4)
            .align(4096)
            .build_in(SlabBuffer::from_static(storage), HostScheduler::new());
        assert_eq!(
            result.unwrap_err(),
            SlabError::from(ArgumentError::MisalignedBuffer(base))
        );
    }

    #[test]
    #[should_panic(expected = "block freed to the wrong slab")]
    fn test_free_to_other_slab_panics() {
        let a_slab = MemSlabBuilder::new(64, 1).build(HostScheduler::new()).unwrap();
        let b_slab = MemSlabBuilder::new(64, 1).build(HostScheduler::new()).unwrap();
        let a = a_slab.alloc(Timeout::NoWait).unwrap();
        let _b = b_slab.alloc(Timeout::NoWait).unwrap();
        b_slab.free(a);
    }

    #[test]
    fn test_block_contents_are_owned() {
        let slab = slab_4x64();
        let mut a = slab.alloc(Timeout::NoWait).unwrap();
        let mut b = slab.alloc(Timeout::NoWait).unwrap();
        a.as_mut_slice().fill(0xAA);
        b.as_mut_slice().fill(0x55);
        assert!(a.as_slice().iter().all(|&x| x == 0xAA));
        assert!(b.as_slice().iter().all(|&x| x == 0x55));
        assert_eq!(a.len(), 64);
        assert!(slab.contains(&a));

        let other = slab_4x64();
        assert!(!other.contains(&a));
        slab.free(a);
        slab.free(b);
    }

    #[test]
    fn test_zero_blocks_is_always_exhausted() {
        let slab = MemSlabBuilder::new(16, 0).build(HostScheduler::new()).unwrap();
        assert_eq!(slab.num_free(), 0);
        assert_eq!(slab.alloc(Timeout::NoWait).unwrap_err(), SlabError::OutOfResources);
        assert_eq!(slab.alloc(Timeout::from_millis(1)).unwrap_err(), SlabError::TimedOut);
    }
}
