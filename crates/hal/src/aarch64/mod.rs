// AArch64 HAL module structure.

pub mod interrupts;
pub mod sysreg;

pub use sysreg::Aarch64Registers;
