//! Backing storage and free-block bookkeeping for a slab.
//!
//! Blocks are identified by index into a contiguous buffer. The set of free
//! blocks is a stack of indices kept beside the buffer rather than links
//! written into the free blocks themselves, so block memory is never
//! reinterpreted and a stale handle cannot corrupt the list.

use crate::errors::ArgumentError;
use core::alloc::Layout;
use core::ptr::NonNull;

use alloc::vec::Vec;

/// Minimum alignment of buffers and block sizes: one machine word.
pub const WORD: usize = core::mem::size_of::<usize>();

/// Round `size` up to a multiple of the machine word, or `None` on overflow.
pub const fn word_round_up(size: usize) -> Option<usize> {
    match size.checked_add(WORD - 1) {
        Some(size) => Some(size & !(WORD - 1)),
        None => None,
    }
}

/// Memory a slab carves its blocks from.
///
/// Owned exclusively by the slab for the slab's whole lifetime.
pub struct SlabBuffer {
    base: NonNull<u8>,
    len: usize,
    /// Set when the buffer came from the global allocator and must be freed.
    layout: Option<Layout>,
}

impl SlabBuffer {
    /// Take ownership of a statically allocated buffer.
    pub fn from_static(buffer: &'static mut [u8]) -> Self {
        Self {
            base: NonNull::from(&mut *buffer).cast(),
            len: buffer.len(),
            layout: None,
        }
    }

    /// Allocate a zeroed buffer from the global allocator.
    pub fn allocate(len: usize, align: usize) -> Result<Self, ArgumentError> {
        if !align.is_power_of_two() {
            return Err(ArgumentError::InvalidAlignment(align));
        }
        if len == 0 {
            return Ok(Self {
                base: NonNull::<usize>::dangling().cast(),
                len: 0,
                layout: None,
            });
        }
        let layout =
            Layout::from_size_align(len, align.max(WORD)).map_err(|_| ArgumentError::SizeOverflow)?;
        let raw = unsafe { alloc::alloc::alloc_zeroed(layout) };
        let Some(base) = NonNull::new(raw) else {
            alloc::alloc::handle_alloc_error(layout);
        };
        Ok(Self {
            base,
            len,
            layout: Some(layout),
        })
    }

    /// First byte of the buffer.
    pub fn base(&self) -> NonNull<u8> {
        self.base
    }

    /// Size of the buffer in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether `addr` falls inside the buffer.
    pub fn contains(&self, addr: usize) -> bool {
        let base = self.base.as_ptr() as usize;
        addr >= base && addr < base + self.len
    }
}

impl Drop for SlabBuffer {
    fn drop(&mut self) {
        if let Some(layout) = self.layout {
            unsafe { alloc::alloc::dealloc(self.base.as_ptr(), layout) };
        }
    }
}

impl core::fmt::Debug for SlabBuffer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SlabBuffer")
            .field("base", &self.base)
            .field("len", &self.len)
            .field("owned", &self.layout.is_some())
            .finish()
    }
}

// The buffer is only ever addressed through exclusively owned blocks.
unsafe impl Send for SlabBuffer {}
unsafe impl Sync for SlabBuffer {}

/// Stack of free block indices.
///
/// Capacity is reserved up front for every block, so `push` never
/// reallocates and both operations are O(1).
#[derive(Debug)]
pub struct FreeList {
    free: Vec<u32>,
}

impl FreeList {
    /// A list holding every block of an `num_blocks` pool, lowest index on top.
    pub fn new(num_blocks: u32) -> Self {
        let mut free = Vec::with_capacity(num_blocks as usize);
        free.extend((0..num_blocks).rev());
        Self { free }
    }

    /// Remove the next free block.
    #[inline]
    pub fn pop(&mut self) -> Option<u32> {
        self.free.pop()
    }

    /// Return a block; it becomes the next one popped.
    ///
    /// The caller guarantees `index` belongs to this pool and is not already
    /// free.
    #[inline]
    pub fn push(&mut self, index: u32) {
        debug_assert!(self.free.len() < self.free.capacity());
        self.free.push(index);
    }

    /// Number of free blocks.
    #[inline]
    pub fn len(&self) -> usize {
        self.free.len()
    }

    /// Whether no block is free.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.free.is_empty()
    }
}

/// Validate the geometry of a pool over `buffer` and build its free list.
///
/// Every block must be able to start on a word boundary, so both the buffer
/// address and the block size must be word multiples.
pub fn carve(
    buffer: &SlabBuffer,
    block_size: usize,
    num_blocks: u32,
) -> Result<FreeList, ArgumentError> {
    if block_size == 0 {
        return Err(ArgumentError::ZeroBlockSize);
    }
    if block_size % WORD != 0 {
        return Err(ArgumentError::MisalignedBlockSize(block_size));
    }
    let base = buffer.base().as_ptr() as usize;
    if num_blocks > 0 && base % WORD != 0 {
        return Err(ArgumentError::MisalignedBuffer(base));
    }
    let required = block_size
        .checked_mul(num_blocks as usize)
        .ok_or(ArgumentError::SizeOverflow)?;
    if required > buffer.len() {
        return Err(ArgumentError::BufferTooSmall {
            required,
            provided: buffer.len(),
        });
    }
    Ok(FreeList::new(num_blocks))
}
