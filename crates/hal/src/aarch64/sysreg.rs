//! Real system register backend.

use aarch64_cpu::asm::barrier;
use aarch64_cpu::registers::{
    ID_AA64MMFR0_EL1, MAIR_EL1, Readable, SCTLR_EL1, TCR_EL1, TTBR0_EL1, TTBR1_EL1, Writeable,
};

use crate::sysreg::{Barrier, SysReg, SystemRegisters};

/// Backend that issues `mrs`/`msr`, `dsb`/`isb` and `tlbi` on the running CPU.
///
/// Only one should exist, and only on the boot CPU while it is at EL1.
pub struct Aarch64Registers {
    _private: (),
}

impl Aarch64Registers {
    /// # Safety
    /// The caller must be running at EL1 with exclusive control of the
    /// translation registers.
    pub const unsafe fn new() -> Self {
        Self { _private: () }
    }
}

impl SystemRegisters for Aarch64Registers {
    fn read(&self, reg: SysReg) -> u64 {
        match reg {
            SysReg::MairEl1 => MAIR_EL1.get(),
            SysReg::TcrEl1 => TCR_EL1.get(),
            SysReg::Ttbr0El1 => TTBR0_EL1.get(),
            SysReg::Ttbr1El1 => TTBR1_EL1.get(),
            SysReg::SctlrEl1 => SCTLR_EL1.get(),
            SysReg::IdAa64Mmfr0El1 => ID_AA64MMFR0_EL1.get(),
        }
    }

    fn write(&mut self, reg: SysReg, value: u64) {
        match reg {
            SysReg::MairEl1 => MAIR_EL1.set(value),
            SysReg::TcrEl1 => TCR_EL1.set(value),
            SysReg::Ttbr0El1 => TTBR0_EL1.set(value),
            SysReg::Ttbr1El1 => TTBR1_EL1.set(value),
            SysReg::SctlrEl1 => SCTLR_EL1.set(value),
            SysReg::IdAa64Mmfr0El1 => {
                log::warn!("[MMU] ignoring write to read-only ID_AA64MMFR0_EL1");
            }
        }
    }

    fn barrier(&mut self, which: Barrier) {
        match which {
            Barrier::DsbIsh => barrier::dsb(barrier::ISH),
            Barrier::DsbSy => barrier::dsb(barrier::SY),
            Barrier::Isb => barrier::isb(barrier::SY),
        }
    }

    fn invalidate_tlb(&mut self) {
        // SAFETY: tlbi only drops cached translations, aarch64-cpu has no wrapper for it
        unsafe {
            core::arch::asm!("tlbi vmalle1", options(nostack));
        }
        barrier::dsb(barrier::ISH);
        barrier::isb(barrier::SY);
    }
}
