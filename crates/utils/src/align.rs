//! Power-of-two alignment helpers shared by the frame allocator, the
//! translation table builder and the block layer.
//!
//! All arithmetic is unsigned 64-bit. `align` must be a non-zero power of two;
//! callers pass compile-time constants (page and block sizes).

/// Round `value` down to a multiple of `align`.
#[inline]
pub const fn align_down(value: u64, align: u64) -> u64 {
    debug_assert!(align.is_power_of_two());
    value & !(align - 1)
}

/// Round `value` up to a multiple of `align`.
///
/// Returns `None` when the result does not fit in 64 bits.
#[inline]
pub const fn align_up(value: u64, align: u64) -> Option<u64> {
    debug_assert!(align.is_power_of_two());
    match value.checked_add(align - 1) {
        Some(v) => Some(v & !(align - 1)),
        None => None,
    }
}

/// Check whether `value` is a multiple of `align`.
#[inline]
pub const fn is_aligned(value: u64, align: u64) -> bool {
    debug_assert!(align.is_power_of_two());
    value & (align - 1) == 0
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;

    #[test]
    fn test_align_down() {
        assert_eq!(align_down(0x1234, 0x1000), 0x1000);
        assert_eq!(align_down(0x2000, 0x1000), 0x2000);
        assert_eq!(align_down(0x1F_FFFF, 0x20_0000), 0);
    }

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0x1234, 0x1000), Some(0x2000));
        assert_eq!(align_up(0x2000, 0x1000), Some(0x2000));
        assert_eq!(align_up(0, 0x1000), Some(0));
    }

    #[test]
    fn test_align_up_overflow() {
        assert_eq!(align_up(u64::MAX, 0x1000), None);
        assert_eq!(align_up(u64::MAX - 0xFFF, 0x1000), Some(u64::MAX - 0xFFF));
    }

    #[test]
    fn test_is_aligned() {
        assert!(is_aligned(0x4000_0000, 0x20_0000));
        assert!(!is_aligned(0x4008_0000, 0x20_0000)); // 512KB offset
        assert!(is_aligned(0, 512));
    }
}
