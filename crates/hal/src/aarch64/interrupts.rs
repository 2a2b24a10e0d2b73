// AArch64 interrupt control via DAIF.
// Behaviors: [I1]-[I6] interrupt enable/disable/restore cycle

use aarch64_cpu::registers::{DAIF, Readable, Writeable};

/// [I1] Masks IRQs, [I2] returns the full DAIF value from before
#[inline(always)]
pub fn disable() -> u64 {
    let state = DAIF.get();
    // SAFETY: daifset takes an immediate, aarch64-cpu has no wrapper for it
    unsafe { core::arch::asm!("msr daifset, #2", options(nomem, nostack)) };
    state
}

/// [I7] Unmasks IRQs
#[inline(always)]
pub unsafe fn enable() {
    // SAFETY: daifclr takes an immediate, aarch64-cpu has no wrapper for it
    unsafe { core::arch::asm!("msr daifclr, #2", options(nomem, nostack)) };
}

/// [I3] Writes back a state returned by `disable`
#[inline(always)]
pub fn restore(state: u64) {
    DAIF.set(state);
}

/// [I4][I5] IRQ mask bit clear means enabled
#[inline(always)]
pub fn is_enabled() -> bool {
    !DAIF.is_set(DAIF::I)
}
