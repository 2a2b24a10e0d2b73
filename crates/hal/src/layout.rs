//! Physical memory layout of the target board.
//!
//! These constants are the kernel's compile-time configuration: the frame
//! table, the boot mappings and the hardware pointer all derive their bounds
//! from them.

use quill_utils::is_aligned;

/// Page size: 4KB
pub const PAGE_SIZE: u64 = 4096;
/// Page shift (log2 of page size)
pub const PAGE_SHIFT: u64 = 12;
/// Entries per page table (512 for 4KB pages with 8-byte entries)
pub const ENTRIES_PER_TABLE: usize = 512;

/// Amount of physical memory the kernel manages (1GB board).
pub const ADDRESSABLE_MEMORY: u64 = 0x4000_0000;
/// Physical start of the peripheral window. Everything from here up to
/// `ADDRESSABLE_MEMORY` is device memory.
pub const PERIPHERAL_OFFSET: u64 = 0x3F00_0000;
/// Number of frames tracked by a frame table covering all addressable memory.
pub const FRAME_COUNT: usize = (ADDRESSABLE_MEMORY / PAGE_SIZE) as usize;

/// Base of the kernel's offset-mapped view of physical memory (TTBR1 half).
pub const KERNEL_VIRT_BASE: u64 = 0xFFFF_0000_0000_0000;
/// Highest address bit usable by a 48-bit translation regime.
pub const ADDRESS_BITS: u32 = 48;
/// Bits that must be clear in any physical or table-indexed virtual address.
pub const RESERVED_ADDRESS_MASK: u64 = !((1 << ADDRESS_BITS) - 1);

/// Lowest address translated through TTBR1 when each half spans `va_bits` bits.
#[inline]
pub const fn high_half_base(va_bits: u32) -> u64 {
    if va_bits >= 64 { 0 } else { !((1u64 << va_bits) - 1) }
}

/// Converts a kernel high-half VA to PA; low addresses pass through unchanged.
#[inline]
pub const fn virt_to_phys(va: u64) -> u64 {
    if va >= KERNEL_VIRT_BASE {
        va - KERNEL_VIRT_BASE
    } else {
        va
    }
}

/// Converts a PA to its kernel high-half VA.
#[inline]
pub const fn phys_to_virt(pa: u64) -> u64 {
    pa | KERNEL_VIRT_BASE
}

/// A contiguous range of physical memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhysicalRegion {
    pub start: u64,
    pub size: u64,
}

impl PhysicalRegion {
    pub const fn new(start: u64, size: u64) -> Self {
        Self { start, size }
    }

    /// One past the last byte of the region.
    #[inline]
    pub const fn end(&self) -> u64 {
        self.start + self.size
    }

    pub const fn contains(&self, addr: u64) -> bool {
        addr >= self.start && addr < self.end()
    }

    pub const fn overlaps(&self, other: &PhysicalRegion) -> bool {
        other.start < self.end() && other.end() > self.start
    }

    pub const fn is_page_aligned(&self) -> bool {
        is_aligned(self.start, PAGE_SIZE) && is_aligned(self.size, PAGE_SIZE)
    }

    /// Number of frames needed to cover the region, counting partial frames.
    pub const fn frame_count(&self) -> usize {
        let first = self.start / PAGE_SIZE;
        let last = (self.end() + PAGE_SIZE - 1) / PAGE_SIZE;
        (last - first) as usize
    }
}
