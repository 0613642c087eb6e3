//! Error types for slab configuration, allocation and waiting.
//!
//! Errors are returned synchronously as values. Nothing in this crate retries
//! on the caller's behalf; exhaustion and timeouts are reported and the caller
//! decides what to do with them.

#![allow(clippy::uninlined_format_args)]

use core::fmt;

/// Result type for slab operations.
pub type SlabResult<T> = Result<T, SlabError>;

/// Errno value for an invalid argument.
pub const EINVAL: i32 = 22;
/// Errno value for an exhausted resource.
pub const ENOMEM: i32 = 12;
/// Errno value for an operation that timed out and may be retried.
pub const EAGAIN: i32 = 11;

/// Error type for all slab operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlabError {
    /// Malformed configuration at creation time
    InvalidArgument(ArgumentError),
    /// No block was free and the caller could not wait for one
    OutOfResources,
    /// The caller waited for the full timeout without a block being released
    TimedOut,
}

/// Reasons a slab configuration is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgumentError {
    /// Block size of zero cannot host a block
    ZeroBlockSize,
    /// Block size is not a multiple of the machine word
    MisalignedBlockSize(usize),
    /// Buffer base address is not word aligned
    MisalignedBuffer(usize),
    /// Requested alignment is not a power of two
    InvalidAlignment(usize),
    /// Buffer cannot hold the requested number of blocks
    BufferTooSmall {
        /// Bytes needed for all blocks
        required: usize,
        /// Bytes actually provided
        provided: usize,
    },
    /// `block_size * num_blocks` does not fit in the address space
    SizeOverflow,
}

/// Errors reported by a pending wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendError {
    /// The caller asked not to wait
    WouldBlock,
    /// The deadline passed before the waiter was readied
    TimedOut,
}

impl SlabError {
    /// The negative errno the equivalent C API reports for this error.
    pub fn errno(self) -> i32 {
        match self {
            SlabError::InvalidArgument(_) => -EINVAL,
            SlabError::OutOfResources => -ENOMEM,
            SlabError::TimedOut => -EAGAIN,
        }
    }

    /// Whether retrying later could succeed.
    pub fn is_transient(self) -> bool {
        matches!(self, SlabError::OutOfResources | SlabError::TimedOut)
    }
}

impl fmt::Display for SlabError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlabError::InvalidArgument(e) => write!(f, "Invalid argument: {}", e),
            SlabError::OutOfResources => write!(f, "No free block available"),
            SlabError::TimedOut => write!(f, "Timed out waiting for a free block"),
        }
    }
}

impl fmt::Display for ArgumentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgumentError::ZeroBlockSize => write!(f, "block size must be non-zero"),
            ArgumentError::MisalignedBlockSize(size) => {
                write!(f, "block size {} is not a multiple of the word size", size)
            }
            ArgumentError::MisalignedBuffer(addr) => {
                write!(f, "buffer address {:#x} is not word aligned", addr)
            }
            ArgumentError::InvalidAlignment(align) => {
                write!(f, "alignment {} is not a power of two", align)
            }
            ArgumentError::BufferTooSmall { required, provided } => write!(
                f,
                "buffer holds {} bytes but {} are required",
                provided, required
            ),
            ArgumentError::SizeOverflow => write!(f, "slab size overflows the address space"),
        }
    }
}

impl fmt::Display for PendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PendError::WouldBlock => write!(f, "Operation would block"),
            PendError::TimedOut => write!(f, "Wait timed out"),
        }
    }
}

impl From<ArgumentError> for SlabError {
    fn from(error: ArgumentError) -> Self {
        SlabError::InvalidArgument(error)
    }
}

impl From<PendError> for SlabError {
    fn from(error: PendError) -> Self {
        match error {
            PendError::WouldBlock => SlabError::OutOfResources,
            PendError::TimedOut => SlabError::TimedOut,
        }
    }
}
