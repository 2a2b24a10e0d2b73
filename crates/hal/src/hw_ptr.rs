//! Typed pointers to memory-mapped hardware.
//!
//! A [`HwPtr`] holds a physical address and dereferences through the kernel's
//! high-half offset mapping, which covers the whole peripheral window once
//! the boot mappings are active.

use core::fmt;
use core::marker::PhantomData;

use quill_error::define_kernel_error;

use crate::layout::{RESERVED_ADDRESS_MASK, phys_to_virt};

define_kernel_error! {
    /// Hardware pointer error type (0x04xx).
    pub enum HwPtrError(0x04) {
        /// One of the top 16 address bits is set
        ReservedBits = 0x01 => "Physical address uses reserved top bits",
        /// Address not aligned for the pointee type
        Misaligned = 0x02 => "Physical address misaligned for target type",
    }
}

/// Physical address of a `T` living in device or RAM space.
pub struct HwPtr<T> {
    pa: u64,
    _marker: PhantomData<*mut T>,
}

// SAFETY: HwPtr is an address; every access goes through the unsafe
// read/write below, whose callers own the synchronization.
unsafe impl<T> Send for HwPtr<T> {}
// SAFETY: see Send
unsafe impl<T> Sync for HwPtr<T> {}

impl<T> HwPtr<T> {
    /// Wrap `pa`. Rejects addresses with any of bits [63:48] set and
    /// addresses misaligned for `T`.
    pub const fn new(pa: u64) -> Result<Self, HwPtrError> {
        if pa & RESERVED_ADDRESS_MASK != 0 {
            return Err(HwPtrError::ReservedBits);
        }
        if pa % (core::mem::align_of::<T>() as u64) != 0 {
            return Err(HwPtrError::Misaligned);
        }
        Ok(Self {
            pa,
            _marker: PhantomData,
        })
    }

    /// The physical address.
    #[inline]
    pub const fn raw(&self) -> u64 {
        self.pa
    }

    /// Address through the high-half mapping.
    #[inline]
    pub const fn mapped(&self) -> *mut T {
        phys_to_virt(self.pa) as usize as *mut T
    }

    /// Pointer `bytes` past this one, same pointee type.
    pub const fn offset(&self, bytes: u64) -> Result<Self, HwPtrError> {
        match self.pa.checked_add(bytes) {
            Some(pa) => Self::new(pa),
            None => Err(HwPtrError::ReservedBits),
        }
    }

    /// Reinterpret as a pointer to `U` at the same address.
    pub const fn cast<U>(&self) -> Result<HwPtr<U>, HwPtrError> {
        HwPtr::new(self.pa)
    }

    /// Volatile read through the high-half mapping.
    ///
    /// # Safety
    /// Translation must be active with this address mapped, and the location
    /// must hold a valid `T`.
    #[inline]
    pub unsafe fn read(&self) -> T {
        // SAFETY: upheld by caller
        unsafe { core::ptr::read_volatile(self.mapped()) }
    }

    /// Volatile write through the high-half mapping.
    ///
    /// # Safety
    /// Translation must be active with this address mapped writable, and no
    /// other reference may alias the location.
    #[inline]
    pub unsafe fn write(&self, value: T) {
        // SAFETY: upheld by caller
        unsafe { core::ptr::write_volatile(self.mapped(), value) }
    }
}

impl<T> Clone for HwPtr<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for HwPtr<T> {}

impl<T> PartialEq for HwPtr<T> {
    fn eq(&self, other: &Self) -> bool {
        self.pa == other.pa
    }
}

impl<T> Eq for HwPtr<T> {}

impl<T> fmt::Debug for HwPtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HwPtr({:#x})", self.pa)
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use crate::layout::KERNEL_VIRT_BASE;

    #[test]
    fn test_rejects_top_bits() {
        assert_eq!(HwPtr::<u32>::new(1 << 48).err(), Some(HwPtrError::ReservedBits));
        assert_eq!(
            HwPtr::<u32>::new(0x8000_0000_3F20_0000).err(),
            Some(HwPtrError::ReservedBits)
        );
        assert!(HwPtr::<u32>::new((1 << 48) - 4).is_ok());
    }

    #[test]
    fn test_rejects_misaligned() {
        assert_eq!(HwPtr::<u32>::new(0x3F20_0002).err(), Some(HwPtrError::Misaligned));
        assert!(HwPtr::<u8>::new(0x3F20_0003).is_ok());
    }

    #[test]
    fn test_mapped_address() {
        let gpio = HwPtr::<u32>::new(0x3F20_0000).unwrap();
        assert_eq!(gpio.raw(), 0x3F20_0000);
        assert_eq!(gpio.mapped() as usize as u64, KERNEL_VIRT_BASE | 0x3F20_0000);
    }

    #[test]
    fn test_offset_and_cast() {
        let base = HwPtr::<u32>::new(0x3F20_0000).unwrap();
        let gpset0 = base.offset(0x1C).unwrap();
        assert_eq!(gpset0.raw(), 0x3F20_001C);
        assert_eq!(base.offset(0x2).err(), Some(HwPtrError::Misaligned));
        assert_eq!(base.offset(u64::MAX).err(), Some(HwPtrError::ReservedBits));

        let wide = base.cast::<u64>().unwrap();
        assert_eq!(wide.raw(), base.raw());
        assert_eq!(gpset0.cast::<u64>().err(), Some(HwPtrError::Misaligned));
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(HwPtrError::ReservedBits.code(), 0x0401);
        assert!(!HwPtrError::ReservedBits.is_boot_fatal());
    }
}
