#![cfg_attr(not(feature = "std"), no_std)]

pub mod align;

pub use align::{align_down, align_up, is_aligned};

// Re-export spin crate types as our lock API
pub use spin::Once;
pub use spin::{Mutex, MutexGuard};

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;

    /// Tests: [S1] exclusive access, [S3] release on drop, [S4] read, [S5] write
    #[test]
    fn test_spinlock_basic() {
        let lock = Mutex::new(42);
        {
            let mut guard = lock.lock(); // [S1] acquire
            assert_eq!(*guard, 42); // [S4] read access
            *guard = 43; // [S5] write access
        } // [S3] release on drop
        assert_eq!(*lock.lock(), 43);
    }

    /// Tests: [S2] try_lock fails while held
    #[test]
    fn test_spinlock_try_lock_contended() {
        let lock = Mutex::new(());
        let held = lock.lock();
        assert!(lock.try_lock().is_none());
        drop(held);
        assert!(lock.try_lock().is_some());
    }

    #[test]
    fn test_once_initializes_once() {
        let once: Once<u32> = Once::new();
        assert_eq!(*once.call_once(|| 7), 7);
        assert_eq!(*once.call_once(|| 9), 7);
    }
}
