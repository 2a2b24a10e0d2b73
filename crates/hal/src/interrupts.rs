// Generic interrupt control wrapper.
// Delegates to the AArch64 DAIF implementation on target. `std` builds run as
// host processes, where DAIF is out of reach, so they keep a per-thread mask
// instead and IrqSafeLock can be exercised by unit tests.

#[cfg(all(target_arch = "aarch64", not(feature = "std")))]
use crate::aarch64::interrupts as arch_interrupts;

#[cfg(feature = "std")]
mod host {
    use core::cell::Cell;

    /// Mirrors the DAIF.I bit position so saved states look like the real thing.
    pub const IRQ_MASK_BIT: u64 = 1 << 7;

    std::thread_local! {
        static MASKED: Cell<bool> = const { Cell::new(false) };
    }

    pub fn disable() -> u64 {
        MASKED.with(|m| {
            let prev = m.replace(true);
            if prev { IRQ_MASK_BIT } else { 0 }
        })
    }

    pub fn enable() {
        MASKED.with(|m| m.set(false));
    }

    pub fn restore(state: u64) {
        MASKED.with(|m| m.set(state & IRQ_MASK_BIT != 0));
    }

    pub fn is_enabled() -> bool {
        MASKED.with(|m| !m.get())
    }
}

#[cfg(feature = "std")]
use host as arch_interrupts;

/// [I1] Disables interrupts, [I2] returns previous state
#[inline(always)]
pub fn disable() -> u64 {
    #[cfg(any(target_arch = "aarch64", feature = "std"))]
    {
        arch_interrupts::disable()
    }
    #[cfg(not(any(target_arch = "aarch64", feature = "std")))]
    {
        0
    }
}

/// [I7] Unconditionally enables interrupts
///
/// # Safety
/// This function can cause race conditions if not used carefully.
#[inline(always)]
pub unsafe fn enable() {
    #[cfg(all(target_arch = "aarch64", not(feature = "std")))]
    {
        unsafe {
            arch_interrupts::enable();
        }
    }
    #[cfg(feature = "std")]
    {
        arch_interrupts::enable();
    }
}

/// [I3] Restores previous interrupt state
#[inline(always)]
pub fn restore(state: u64) {
    #[cfg(any(target_arch = "aarch64", feature = "std"))]
    {
        arch_interrupts::restore(state);
    }
    #[cfg(not(any(target_arch = "aarch64", feature = "std")))]
    {
        let _ = state;
    }
}

/// [I4] Returns true when enabled, [I5] returns false when disabled
#[inline(always)]
pub fn is_enabled() -> bool {
    #[cfg(any(target_arch = "aarch64", feature = "std"))]
    {
        arch_interrupts::is_enabled()
    }
    #[cfg(not(any(target_arch = "aarch64", feature = "std")))]
    {
        true
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;

    /// Tests: [I1] disable, [I2] previous state, [I3] restore, [I6] nesting
    #[test]
    fn test_disable_restore_cycle() {
        assert!(is_enabled());
        let outer = disable();
        assert!(!is_enabled());
        let inner = disable();
        restore(inner);
        assert!(!is_enabled()); // [I6] inner restore keeps outer mask
        restore(outer);
        assert!(is_enabled());
    }

    /// Tests: [I7] enable
    #[test]
    fn test_enable_unmasks() {
        let _ = disable();
        assert!(!is_enabled());
        // SAFETY: host mock, no real interrupts
        unsafe { enable() };
        assert!(is_enabled());
    }
}
