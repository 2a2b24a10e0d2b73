#![cfg_attr(not(feature = "std"), no_std)]

// Quill HAL: memory bring-up for the AArch64 board.
// Root holds the portable logic; register and interrupt access for the real
// CPU is isolated in aarch64/.

pub mod boot;
pub mod hw_ptr;
pub mod interrupts;
pub mod layout;
pub mod memory;
pub mod mmu;
pub mod sysreg;
pub mod traits;

pub use hw_ptr::{HwPtr, HwPtrError};
pub use memory::{
    BootFrameTable, FrameAllocator, FrameError, FrameOwner, FrameState, LockedFrameAllocator,
};
pub use mmu::{LockedTableBuilder, MappingStats, MmuError, TableArena, TranslationTableBuilder};
pub use sysreg::{Barrier, SysReg, SystemRegisters};
pub use traits::PageAllocator;

#[cfg(target_arch = "aarch64")]
pub mod aarch64;
#[cfg(target_arch = "aarch64")]
pub use self::aarch64 as arch;

use core::mem::ManuallyDrop;
use quill_utils::{Mutex, MutexGuard};

/// IRQ-safe lock that disables interrupts while held.
/// Behaviors: [L1]-[L4] interrupt-safe locking
pub struct IrqSafeLock<T> {
    inner: Mutex<T>,
}

impl<T> IrqSafeLock<T> {
    pub const fn new(data: T) -> Self {
        Self {
            inner: Mutex::new(data),
        }
    }

    /// [L1] Disables interrupts before acquiring, [L4] data accessible through guard
    pub fn lock(&self) -> IrqSafeLockGuard<'_, T> {
        let state = interrupts::disable();
        let guard = self.inner.lock();
        IrqSafeLockGuard {
            guard: ManuallyDrop::new(guard),
            state,
        }
    }

    /// Try to acquire without spinning. Interrupts are restored if the lock is held.
    pub fn try_lock(&self) -> Option<IrqSafeLockGuard<'_, T>> {
        let state = interrupts::disable();
        match self.inner.try_lock() {
            Some(guard) => Some(IrqSafeLockGuard {
                guard: ManuallyDrop::new(guard),
                state,
            }),
            None => {
                interrupts::restore(state);
                None
            }
        }
    }

    /// Consume the lock and return the protected value.
    pub fn into_inner(self) -> T {
        self.inner.into_inner()
    }
}

pub struct IrqSafeLockGuard<'a, T> {
    guard: ManuallyDrop<MutexGuard<'a, T>>,
    state: u64,
}

impl<T> core::ops::Deref for IrqSafeLockGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> core::ops::DerefMut for IrqSafeLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<T> Drop for IrqSafeLockGuard<'_, T> {
    /// [L2] Restores interrupts after releasing
    fn drop(&mut self) {
        // SAFETY: guard is only dropped once, here, before interrupts come back
        unsafe { ManuallyDrop::drop(&mut self.guard) };
        interrupts::restore(self.state);
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;

    /// Tests: [L1] disable before acquire, [L2] restore after release, [L4] data access
    #[test]
    fn test_irq_safe_lock_behavior() {
        let lock = IrqSafeLock::new(10);

        assert!(interrupts::is_enabled());
        {
            let mut guard = lock.lock(); // [L1]
            assert_eq!(*guard, 10); // [L4]
            *guard = 20;
            assert!(!interrupts::is_enabled());
        } // [L2]
        assert!(interrupts::is_enabled());
        assert_eq!(*lock.lock(), 20);
    }

    /// Tests: [L3] nested locks keep interrupts masked until the outer guard drops
    #[test]
    fn test_irq_safe_lock_nested() {
        let lock1 = IrqSafeLock::new(1);
        let lock2 = IrqSafeLock::new(2);

        {
            let _g1 = lock1.lock();
            {
                let _g2 = lock2.lock();
                assert!(!interrupts::is_enabled());
            }
            assert!(!interrupts::is_enabled()); // [L3]
        }
        assert!(interrupts::is_enabled());
    }

    #[test]
    fn test_try_lock_contended_restores_interrupts() {
        let lock = IrqSafeLock::new(0u32);
        let held = lock.lock();
        assert!(lock.try_lock().is_none());
        assert!(!interrupts::is_enabled()); // still masked by `held`
        drop(held);
        assert!(interrupts::is_enabled());
        assert!(lock.try_lock().is_some());
        assert_eq!(lock.into_inner(), 0);
    }
}
