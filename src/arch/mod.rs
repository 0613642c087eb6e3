//! Architecture abstraction for local interrupt masking.
//!
//! The spinlock masks interrupts on the local CPU before taking its flag so an
//! interrupt handler on the same CPU can never spin on a lock its own
//! interrupted context holds. Each architecture supplies the save/restore
//! primitives through [`Arch`].

/// Interrupt state captured when entering a critical section.
///
/// Passing the key back to [`Arch::irq_restore`] restores exactly the state
/// that was observed, so nested critical sections unwind correctly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "dropping the key leaves interrupts masked"]
pub struct IrqKey(usize);

impl IrqKey {
    /// Build a key from raw architecture flags.
    pub const fn from_raw(flags: usize) -> Self {
        Self(flags)
    }

    /// Raw architecture flags stored in the key.
    pub const fn raw(self) -> usize {
        self.0
    }
}

/// Architecture abstraction trait.
///
/// Implementations only need the three basic interrupt operations; the
/// save/restore pair has a portable default built on top of them.
pub trait Arch {
    /// Enable interrupts on the current CPU.
    fn enable_interrupts();

    /// Disable interrupts on the current CPU.
    fn disable_interrupts();

    /// Check if interrupts are currently enabled.
    fn interrupts_enabled() -> bool;

    /// Mask interrupts and return the previous state.
    #[inline]
    fn irq_save() -> IrqKey {
        let was_enabled = Self::interrupts_enabled();
        Self::disable_interrupts();
        IrqKey(was_enabled as usize)
    }

    /// Restore the interrupt state captured by [`Arch::irq_save`].
    #[inline]
    fn irq_restore(key: IrqKey) {
        if key.0 != 0 {
            Self::enable_interrupts();
        }
    }

    /// Hint that the caller is busy-waiting for another context.
    #[inline]
    fn relax() {
        core::hint::spin_loop();
    }
}

/// Architecture used on hosted targets, where a user process cannot mask
/// interrupts. Mutual exclusion still comes from the spinlock flag.
pub struct NoOpArch;

impl Arch for NoOpArch {
    fn enable_interrupts() {}

    fn disable_interrupts() {}

    fn interrupts_enabled() -> bool {
        true
    }
}

#[cfg(all(target_arch = "aarch64", target_os = "none"))]
pub mod aarch64;

#[cfg(all(target_arch = "aarch64", target_os = "none"))]
pub use aarch64::Aarch64Arch as DefaultArch;

#[cfg(not(all(target_arch = "aarch64", target_os = "none")))]
pub use NoOpArch as DefaultArch;
