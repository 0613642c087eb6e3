//! AArch64 interrupt masking through the DAIF register.

use super::{Arch, IrqKey};
use core::arch::asm;

/// IRQ mask bit in DAIF.
const DAIF_I: u64 = 1 << 7;

/// AArch64 at EL1, masking IRQs only.
pub struct Aarch64Arch;

impl Arch for Aarch64Arch {
    fn enable_interrupts() {
        unsafe {
            asm!("msr daifclr, #2", options(nomem, nostack));
        }
    }

    fn disable_interrupts() {
        unsafe {
            asm!("msr daifset, #2", options(nomem, nostack));
        }
    }

    fn interrupts_enabled() -> bool {
        (read_daif() & DAIF_I) == 0
    }

    #[inline]
    fn irq_save() -> IrqKey {
        let daif = read_daif();
        Self::disable_interrupts();
        IrqKey::from_raw(daif as usize)
    }

    #[inline]
    fn irq_restore(key: IrqKey) {
        // Only the I bit is ours to restore; leave D, A and F untouched.
        if (key.raw() as u64 & DAIF_I) == 0 {
            Self::enable_interrupts();
        }
    }

    #[inline]
    fn relax() {
        unsafe {
            asm!("yield", options(nomem, nostack));
        }
    }
}

#[inline]
fn read_daif() -> u64 {
    let daif: u64;
    unsafe {
        asm!(
            "mrs {daif}, daif",
            daif = out(reg) daif,
            options(nostack, readonly)
        );
    }
    daif
}
