//! Early boot: build the fixed boot mappings, switch translation on, then
//! hand physical memory to the frame allocator.
//!
//! Everything before `activate` returns runs with the MMU off and no logger,
//! so failures there are reported by pulsing a status pin.

use quill_error::define_kernel_error;

use crate::layout::{ADDRESSABLE_MEMORY, PERIPHERAL_OFFSET, PhysicalRegion};
use crate::memory::{BootFrameTable, FrameAllocator, FrameError, FrameOwner, FrameState};
use crate::mmu::{AccessFlags, AttributeIndex, MmuError, TableArena, TranslationTableBuilder};
use crate::sysreg::SystemRegisters;

define_kernel_error! {
    /// Boot sequencer error type (0x03xx).
    pub enum BootError(0x03) {
        /// Identity map of RAM failed
        RamMapping(MmuError) = 0x01 => "Mapping RAM failed",
        /// Identity map of the peripheral window failed
        PeripheralMapping(MmuError) = 0x02 => "Mapping peripherals failed",
        /// Register programming refused
        Activation(MmuError) = 0x03 => "Enabling translation failed",
        /// Boot regions do not fit the frame table
        FrameTable(FrameError) = 0x04 => "Registering boot regions failed" [fatal],
    }
}

impl BootError {
    /// Pulses on the status pin identifying the failed step.
    pub const fn blink_count(&self) -> u32 {
        match self {
            BootError::RamMapping(_) => 1,
            BootError::PeripheralMapping(_) => 2,
            BootError::Activation(_) => 3,
            BootError::FrameTable(_) => 4,
        }
    }
}

/// Pre-MMU diagnostic output: a single GPIO line, usually an LED.
pub trait StatusPin {
    fn set(&mut self, high: bool);
    /// Busy-wait long enough for a pulse to be visible.
    fn delay(&mut self);
}

/// Pulse `pin` `count` times.
pub fn blink<P: StatusPin>(pin: &mut P, count: u32) {
    for _ in 0..count {
        pin.set(true);
        pin.delay();
        pin.set(false);
        pin.delay();
    }
}

/// Physical regions in use before the frame allocator exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootLayout {
    /// Translation table arena
    pub arena: PhysicalRegion,
    /// Kernel text, data, bss and boot stack
    pub kernel_image: PhysicalRegion,
}

#[cfg(all(target_arch = "aarch64", not(feature = "std")))]
impl BootLayout {
    /// Read the layout from linker script symbols.
    ///
    /// # Safety
    /// Must only be called while the kernel runs at its physical load
    /// address, so symbol addresses are physical.
    pub unsafe fn from_linker() -> Self {
        unsafe extern "C" {
            static __kernel_start: u8;
            static __kernel_end: u8;
            static __page_table_start: u8;
            static __page_table_end: u8;
        }

        let kernel_start = core::ptr::addr_of!(__kernel_start) as u64;
        let kernel_end = core::ptr::addr_of!(__kernel_end) as u64;
        let arena_start = core::ptr::addr_of!(__page_table_start) as u64;
        let arena_end = core::ptr::addr_of!(__page_table_end) as u64;

        Self {
            arena: PhysicalRegion::new(arena_start, arena_end - arena_start),
            kernel_image: PhysicalRegion::new(kernel_start, kernel_end - kernel_start),
        }
    }
}

/// Map the board's fixed layout into `builder` and switch translation on.
///
/// RAM below `PERIPHERAL_OFFSET` is identity-mapped as normal memory, the
/// peripheral window above it as device memory. Both become visible in the
/// high half too, since TTBR1 shares the root. On failure the pin pulses
/// [`BootError::blink_count`] times and the error is returned.
pub fn bring_up<'a, R, P>(
    mut builder: TranslationTableBuilder<'a>,
    regs: &mut R,
    pin: &mut P,
) -> Result<TranslationTableBuilder<'a>, BootError>
where
    R: SystemRegisters,
    P: StatusPin,
{
    let result = map_and_activate(&mut builder, regs);
    match result {
        Ok(()) => Ok(builder),
        Err(err) => {
            blink(pin, err.blink_count());
            Err(err)
        }
    }
}

fn map_and_activate<R: SystemRegisters>(
    builder: &mut TranslationTableBuilder<'_>,
    regs: &mut R,
) -> Result<(), BootError> {
    builder
        .map_region(0, 0, PERIPHERAL_OFFSET, AccessFlags::KERNEL_RWX, AttributeIndex::NORMAL)
        .map_err(BootError::RamMapping)?;
    builder
        .map_region(
            PERIPHERAL_OFFSET,
            PERIPHERAL_OFFSET,
            ADDRESSABLE_MEMORY - PERIPHERAL_OFFSET,
            AccessFlags::DEVICE,
            AttributeIndex::DEVICE,
        )
        .map_err(BootError::PeripheralMapping)?;
    builder.activate(48, regs).map_err(BootError::Activation)
}

/// Build the boot tables in `arena` and switch translation on.
pub fn early_boot<'a, R, P>(
    arena: TableArena<'a>,
    regs: &mut R,
    pin: &mut P,
) -> Result<TranslationTableBuilder<'a>, BootError>
where
    R: SystemRegisters,
    P: StatusPin,
{
    bring_up(TranslationTableBuilder::new(arena), regs, pin)
}

/// Set up the frame table over `storage`, registering the kernel image and
/// the table arena as in use.
pub fn init_frame_allocator<'a>(
    storage: &'a mut [FrameState],
    layout: &BootLayout,
) -> Result<FrameAllocator<'a>, BootError> {
    let mut table = BootFrameTable::new(storage);
    table
        .mark_region_reserved(layout.kernel_image, FrameOwner::Kernel)
        .map_err(BootError::FrameTable)?;
    table
        .mark_region_reserved(layout.arena, FrameOwner::PageTables)
        .map_err(BootError::FrameTable)?;
    Ok(table.finish())
}
