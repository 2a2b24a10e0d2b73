//! Hardware register access capability.
//!
//! The translation table builder never issues `msr`/`mrs` or barrier
//! instructions itself. It talks to a [`SystemRegisters`] backend so the
//! activation sequence is a list of explicit calls in a fixed order, and so
//! the same logic runs against the real CPU or against a recording double in
//! host tests.

use bitflags::bitflags;

/// System registers touched while bringing up translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SysReg {
    /// Memory attribute indirection register
    MairEl1,
    /// Translation control register
    TcrEl1,
    /// Translation table base for the low half
    Ttbr0El1,
    /// Translation table base for the high half
    Ttbr1El1,
    /// System control register (holds the MMU enable bit)
    SctlrEl1,
    /// Memory model feature register 0 (read-only)
    IdAa64Mmfr0El1,
}

/// Barrier instructions the activation sequence orders its writes with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Barrier {
    /// Data synchronization barrier, inner shareable
    DsbIsh,
    /// Data synchronization barrier, full system
    DsbSy,
    /// Instruction synchronization barrier
    Isb,
}

/// Narrow capability over the CPU's system registers.
pub trait SystemRegisters {
    /// Read a system register.
    fn read(&self, reg: SysReg) -> u64;

    /// Write a system register. Writes to read-only registers are ignored.
    fn write(&mut self, reg: SysReg, value: u64);

    /// Issue a barrier instruction.
    fn barrier(&mut self, barrier: Barrier);

    /// Invalidate all stage 1 EL1 TLB entries.
    fn invalidate_tlb(&mut self);
}

// ============================================================================
// ID_AA64MMFR0_EL1 decoding
// ============================================================================

/// PARange field, bits [3:0]
const MMFR0_PARANGE_MASK: u64 = 0xF;
/// TGran4 field, bits [31:28]
const MMFR0_TGRAN4_SHIFT: u64 = 28;
/// TGran4 value meaning "4KB granule not implemented"
const MMFR0_TGRAN4_UNSUPPORTED: u64 = 0xF;

/// Physical address range implemented by the CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhysAddrRange {
    /// Raw PARange encoding, also the TCR_EL1.IPS encoding
    encoding: u64,
}

impl PhysAddrRange {
    /// Decode the PARange field of an `ID_AA64MMFR0_EL1` value.
    pub const fn from_mmfr0(mmfr0: u64) -> Self {
        Self {
            encoding: mmfr0 & MMFR0_PARANGE_MASK,
        }
    }

    /// Number of physical address bits, or `None` for a reserved encoding.
    pub const fn bits(&self) -> Option<u32> {
        match self.encoding {
            0b0000 => Some(32),
            0b0001 => Some(36),
            0b0010 => Some(40),
            0b0011 => Some(42),
            0b0100 => Some(44),
            0b0101 => Some(48),
            0b0110 => Some(52),
            _ => None,
        }
    }

    /// Whether `max_address` (exclusive end of the mapped physical range) fits.
    pub const fn covers(&self, max_address: u64) -> bool {
        match self.bits() {
            Some(bits) if bits >= 64 => true,
            Some(bits) => max_address <= (1u64 << bits),
            None => false,
        }
    }

    /// Encoding for TCR_EL1.IPS. With a 4KB granule the output size caps at 48 bits.
    pub const fn ips(&self) -> u64 {
        if self.encoding > 0b0101 {
            0b0101
        } else {
            self.encoding
        }
    }
}

/// Whether the CPU implements the 4KB translation granule.
pub const fn supports_4k_granule(mmfr0: u64) -> bool {
    (mmfr0 >> MMFR0_TGRAN4_SHIFT) & 0xF != MMFR0_TGRAN4_UNSUPPORTED
}

// ============================================================================
// TCR_EL1
// ============================================================================

// TG0 = 0b00 => 4KB granule
// TG1 = 0b10 => 4KB granule
// SH0/SH1 = 0b11 => Inner Shareable
// ORGN/IRGN = 0b01 => Write-Back Read-Allocate Write-Allocate Cacheable
// EPD0/EPD1 = 0 => both halves walk their tables
const TCR_TG0_4KB: u64 = 0b00 << 14;
const TCR_TG1_4KB: u64 = 0b10 << 30;
const TCR_SH0_INNER: u64 = 0b11 << 12;
const TCR_SH1_INNER: u64 = 0b11 << 28;
const TCR_ORGN0_WB_WA: u64 = 0b01 << 10;
const TCR_IRGN0_WB_WA: u64 = 0b01 << 8;
const TCR_ORGN1_WB_WA: u64 = 0b01 << 26;
const TCR_IRGN1_WB_WA: u64 = 0b01 << 24;
const TCR_T1SZ_SHIFT: u64 = 16;
const TCR_IPS_SHIFT: u64 = 32;

/// Build a TCR_EL1 value for `va_bits`-wide halves with the given IPS encoding.
///
/// Top byte ignore stays off (TBI0/TBI1 = 0).
pub const fn tcr_value(va_bits: u32, ips: u64) -> u64 {
    let tsz = (64 - va_bits) as u64;
    tsz | (tsz << TCR_T1SZ_SHIFT)
        | TCR_TG0_4KB
        | TCR_TG1_4KB
        | TCR_SH0_INNER
        | TCR_SH1_INNER
        | TCR_ORGN0_WB_WA
        | TCR_IRGN0_WB_WA
        | TCR_ORGN1_WB_WA
        | TCR_IRGN1_WB_WA
        | (ips << TCR_IPS_SHIFT)
}

// ============================================================================
// SCTLR_EL1
// ============================================================================

bitflags! {
    /// SCTLR_EL1 bits the activation sequence sets or clears.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct SctlrFlags: u64 {
        /// MMU enable
        const M   = 1 << 0;
        /// Alignment check
        const A   = 1 << 1;
        /// Data cache enable
        const C   = 1 << 2;
        /// Stack alignment check (EL1)
        const SA  = 1 << 3;
        /// Stack alignment check (EL0)
        const SA0 = 1 << 4;
        /// Reserved, RES1
        const RES1_11 = 1 << 11;
        /// Instruction cache enable
        const I   = 1 << 12;
        /// Write implies execute-never
        const WXN = 1 << 19;
        /// Reserved, RES1
        const RES1_22 = 1 << 22;
        /// Reserved, RES1
        const RES1_23 = 1 << 23;
        /// Endianness of EL0 data accesses
        const E0E = 1 << 24;
        /// Endianness of EL1 data accesses and table walks
        const EE  = 1 << 25;
    }
}

impl SctlrFlags {
    /// Bits that must read as one.
    pub const RES1: SctlrFlags = SctlrFlags::RES1_11
        .union(SctlrFlags::RES1_22)
        .union(SctlrFlags::RES1_23);

    /// Bits cleared for early boot: little endian walks, no caches,
    /// no alignment or WXN checking.
    pub const BOOT_CLEAR: SctlrFlags = SctlrFlags::EE
        .union(SctlrFlags::E0E)
        .union(SctlrFlags::WXN)
        .union(SctlrFlags::I)
        .union(SctlrFlags::SA0)
        .union(SctlrFlags::SA)
        .union(SctlrFlags::C)
        .union(SctlrFlags::A);
}

/// Compute the SCTLR_EL1 value that turns translation on, keeping any bit
/// this sequence does not own.
pub const fn sctlr_enable_value(current: u64) -> u64 {
    (current | SctlrFlags::RES1.bits() | SctlrFlags::M.bits()) & !SctlrFlags::BOOT_CLEAR.bits()
}
