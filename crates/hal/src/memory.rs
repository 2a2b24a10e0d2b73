//! Physical frame ownership tracking.
//!
//! One [`FrameState`] per 4KB frame of addressable memory, indexed by
//! `physical_address / PAGE_SIZE`. The table lives in caller-provided storage
//! so it works before any heap exists.
//!
//! The table goes through two phases:
//! - [`BootFrameTable`]: boot-time bookkeeping. Regions already in use
//!   (kernel image, table arena) are registered with `mark_reserved`.
//! - [`FrameAllocator`]: runtime. Only `reserve` and `release` mutate it.
//!
//! `finish()` is the one-way transition between the two, so the unconditional
//! `mark_reserved` cannot be reached once boot is over.

use quill_error::define_kernel_error;
use quill_utils::{align_down, is_aligned};

use crate::IrqSafeLock;
use crate::layout::{PAGE_SIZE, PhysicalRegion};
use crate::traits::PageAllocator;

define_kernel_error! {
    /// Frame allocator error type (0x02xx).
    pub enum FrameError(0x02) {
        /// No run of free frames long enough
        OutOfMemory = 0x01 => "No free frame run of the requested length",
        /// Release of a frame that is already free
        DoubleFree = 0x02 => "Release of a frame that is already free",
        /// Address is not frame-aligned
        Misaligned = 0x03 => "Address is not frame-aligned",
        /// Run extends past the end of the frame table
        OutOfRange = 0x04 => "Frame run extends past the frame table",
        /// Zero-length request
        InvalidCount = 0x05 => "Frame count must be non-zero",
    }
}

/// Subsystem holding a reserved frame. Diagnostic only, never used for access control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOwner {
    /// Kernel image (text, data, bss, boot stack)
    Kernel,
    /// Translation table pages
    PageTables,
    /// General-purpose kernel heap
    Heap,
    /// Driver-owned buffers
    DeviceBuffer,
    /// DMA-visible memory
    Dma,
    /// Anything else, tagged by the caller
    Other(u8),
}

/// State of a single physical frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameState {
    #[default]
    Free,
    Reserved(FrameOwner),
}

impl FrameState {
    #[inline]
    pub const fn is_free(&self) -> bool {
        matches!(self, FrameState::Free)
    }
}

/// Shared view over the frame table storage.
struct FrameTable<'a> {
    frames: &'a mut [FrameState],
}

impl<'a> FrameTable<'a> {
    fn new(frames: &'a mut [FrameState]) -> Self {
        frames.fill(FrameState::Free);
        Self { frames }
    }

    /// Validate `(base, count)` and return the frame index range it covers.
    fn run(&self, base: u64, count: usize) -> Result<core::ops::Range<usize>, FrameError> {
        if count == 0 {
            return Err(FrameError::InvalidCount);
        }
        if !is_aligned(base, PAGE_SIZE) {
            return Err(FrameError::Misaligned);
        }
        let first = usize::try_from(base / PAGE_SIZE).map_err(|_| FrameError::OutOfRange)?;
        let end = first.checked_add(count).ok_or(FrameError::OutOfRange)?;
        if end > self.frames.len() {
            return Err(FrameError::OutOfRange);
        }
        Ok(first..end)
    }

    fn state_of(&self, addr: u64) -> Option<FrameState> {
        let index = usize::try_from(addr / PAGE_SIZE).ok()?;
        self.frames.get(index).copied()
    }

    fn free_frames(&self) -> usize {
        self.frames.iter().filter(|f| f.is_free()).count()
    }
}

/// Boot-phase frame table: accepts unconditional reservations of regions
/// that are already in use.
pub struct BootFrameTable<'a> {
    table: FrameTable<'a>,
}

impl<'a> BootFrameTable<'a> {
    /// Take ownership of `storage` and mark every frame `Free`.
    ///
    /// `storage.len()` frames are tracked, covering `[0, len * PAGE_SIZE)`.
    pub fn new(storage: &'a mut [FrameState]) -> Self {
        Self {
            table: FrameTable::new(storage),
        }
    }

    /// Mark `count` frames starting at `base` as reserved by `owner`,
    /// whatever their current state. A second mark overwrites the owner tag.
    pub fn mark_reserved(
        &mut self,
        base: u64,
        count: usize,
        owner: FrameOwner,
    ) -> Result<(), FrameError> {
        let run = self.table.run(base, count)?;
        log::debug!(
            "[FRAME] boot reservation {:#x}..{:#x} for {:?}",
            base,
            base + (count as u64) * PAGE_SIZE,
            owner
        );
        self.table.frames[run].fill(FrameState::Reserved(owner));
        Ok(())
    }

    /// Mark every frame touched by `region` as reserved, rounding outward to
    /// frame boundaries. Empty regions are a no-op.
    pub fn mark_region_reserved(
        &mut self,
        region: PhysicalRegion,
        owner: FrameOwner,
    ) -> Result<(), FrameError> {
        if region.size == 0 {
            return Ok(());
        }
        self.mark_reserved(align_down(region.start, PAGE_SIZE), region.frame_count(), owner)
    }

    pub fn state_of(&self, addr: u64) -> Option<FrameState> {
        self.table.state_of(addr)
    }

    pub fn free_frames(&self) -> usize {
        self.table.free_frames()
    }

    /// End boot-time bookkeeping. The returned allocator has no unconditional
    /// reservation primitive.
    pub fn finish(self) -> FrameAllocator<'a> {
        log::debug!(
            "[FRAME] frame table ready: {} of {} frames free",
            self.table.free_frames(),
            self.table.frames.len()
        );
        FrameAllocator { table: self.table }
    }
}

/// Runtime frame allocator: first-fit reservation of contiguous frame runs.
pub struct FrameAllocator<'a> {
    table: FrameTable<'a>,
}

impl FrameAllocator<'_> {
    /// Reserve the lowest run of `count` consecutive free frames.
    ///
    /// Returns the physical base address of the run. On `OutOfMemory` the
    /// table is left untouched.
    pub fn reserve(&mut self, count: usize, owner: FrameOwner) -> Result<u64, FrameError> {
        if count == 0 {
            return Err(FrameError::InvalidCount);
        }

        let mut run_start = 0;
        let mut run_len = 0;
        for (index, state) in self.table.frames.iter().enumerate() {
            if !state.is_free() {
                run_len = 0;
                continue;
            }
            if run_len == 0 {
                run_start = index;
            }
            run_len += 1;
            if run_len == count {
                break;
            }
        }

        if run_len < count {
            log::warn!("[FRAME] out of memory reserving {} frames for {:?}", count, owner);
            return Err(FrameError::OutOfMemory);
        }

        self.table.frames[run_start..run_start + count].fill(FrameState::Reserved(owner));
        Ok(run_start as u64 * PAGE_SIZE)
    }

    /// Return `count` frames starting at `base` to the free pool.
    ///
    /// If any frame of the run is already free nothing is changed and
    /// `DoubleFree` is returned.
    pub fn release(&mut self, base: u64, count: usize) -> Result<(), FrameError> {
        let run = self.table.run(base, count)?;
        if self.table.frames[run.clone()].iter().any(FrameState::is_free) {
            log::warn!("[FRAME] double free of {} frames at {:#x}", count, base);
            return Err(FrameError::DoubleFree);
        }
        self.table.frames[run].fill(FrameState::Free);
        Ok(())
    }

    /// State of the frame containing `addr`, `None` past the end of the table.
    pub fn state_of(&self, addr: u64) -> Option<FrameState> {
        self.table.state_of(addr)
    }

    pub fn free_frames(&self) -> usize {
        self.table.free_frames()
    }

    pub fn frame_count(&self) -> usize {
        self.table.frames.len()
    }
}

/// Frame allocator behind the kernel's interrupt-safe lock.
///
/// Every mutating call runs with interrupts masked, which is the only
/// exclusion needed on a single core and the hook multicore support builds on.
pub struct LockedFrameAllocator<'a> {
    inner: IrqSafeLock<FrameAllocator<'a>>,
}

impl<'a> LockedFrameAllocator<'a> {
    pub const fn new(allocator: FrameAllocator<'a>) -> Self {
        Self {
            inner: IrqSafeLock::new(allocator),
        }
    }

    pub fn reserve(&self, count: usize, owner: FrameOwner) -> Result<u64, FrameError> {
        self.inner.lock().reserve(count, owner)
    }

    pub fn release(&self, base: u64, count: usize) -> Result<(), FrameError> {
        self.inner.lock().release(base, count)
    }

    pub fn state_of(&self, addr: u64) -> Option<FrameState> {
        self.inner.lock().state_of(addr)
    }

    pub fn free_frames(&self) -> usize {
        self.inner.lock().free_frames()
    }
}

impl PageAllocator for LockedFrameAllocator<'_> {
    fn alloc_page(&self) -> Result<u64, FrameError> {
        self.reserve(1, FrameOwner::PageTables)
    }

    fn free_page(&self, pa: u64) -> Result<(), FrameError> {
        self.release(pa, 1)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;

    const FRAMES: usize = 64;

    fn fresh(storage: &mut [FrameState]) -> FrameAllocator<'_> {
        BootFrameTable::new(storage).finish()
    }

    #[test]
    fn test_new_table_is_all_free() {
        let mut storage = [FrameState::Reserved(FrameOwner::Heap); FRAMES];
        let alloc = fresh(&mut storage);
        assert_eq!(alloc.free_frames(), FRAMES);
        assert_eq!(alloc.frame_count(), FRAMES);
    }

    #[test]
    fn test_reserve_aligned_and_reserved() {
        let mut storage = [FrameState::Free; FRAMES];
        let mut alloc = fresh(&mut storage);

        let base = alloc.reserve(3, FrameOwner::Heap).unwrap();
        assert!(is_aligned(base, PAGE_SIZE));
        for i in 0..3 {
            assert_eq!(
                alloc.state_of(base + i * PAGE_SIZE),
                Some(FrameState::Reserved(FrameOwner::Heap))
            );
        }
        assert_eq!(alloc.state_of(base + 3 * PAGE_SIZE), Some(FrameState::Free));
    }

    #[test]
    fn test_reserve_first_fit_lowest_address() {
        let mut storage = [FrameState::Free; FRAMES];
        let mut boot = BootFrameTable::new(&mut storage);
        // Holes: [0,2) free, [2,3) used, [3,8) free
        boot.mark_reserved(2 * PAGE_SIZE, 1, FrameOwner::Kernel).unwrap();
        let mut alloc = boot.finish();

        assert_eq!(alloc.reserve(2, FrameOwner::Dma), Ok(0));
        // Next two-frame run skips the reserved frame
        assert_eq!(alloc.reserve(2, FrameOwner::Dma), Ok(3 * PAGE_SIZE));
    }

    #[test]
    fn test_reserve_zero_count() {
        let mut storage = [FrameState::Free; FRAMES];
        let mut alloc = fresh(&mut storage);
        assert_eq!(alloc.reserve(0, FrameOwner::Heap), Err(FrameError::InvalidCount));
        assert_eq!(alloc.free_frames(), FRAMES);
    }

    #[test]
    fn test_release_after_reserve_restores_free() {
        let mut storage = [FrameState::Free; FRAMES];
        let mut alloc = fresh(&mut storage);

        let base = alloc.reserve(4, FrameOwner::DeviceBuffer).unwrap();
        alloc.release(base, 4).unwrap();
        assert_eq!(alloc.free_frames(), FRAMES);
        for i in 0..4 {
            assert_eq!(alloc.state_of(base + i * PAGE_SIZE), Some(FrameState::Free));
        }
    }

    #[test]
    fn test_release_free_frame_is_double_free() {
        let mut storage = [FrameState::Free; FRAMES];
        let mut alloc = fresh(&mut storage);

        assert_eq!(alloc.release(5 * PAGE_SIZE, 1), Err(FrameError::DoubleFree));

        let base = alloc.reserve(2, FrameOwner::Heap).unwrap();
        alloc.release(base, 2).unwrap();
        assert_eq!(alloc.release(base, 2), Err(FrameError::DoubleFree));
    }

    #[test]
    fn test_release_partially_free_run_changes_nothing() {
        let mut storage = [FrameState::Free; FRAMES];
        let mut alloc = fresh(&mut storage);

        let base = alloc.reserve(2, FrameOwner::Heap).unwrap();
        // Run of 3 whose last frame is free
        assert_eq!(alloc.release(base, 3), Err(FrameError::DoubleFree));
        assert_eq!(alloc.state_of(base), Some(FrameState::Reserved(FrameOwner::Heap)));
        assert_eq!(alloc.free_frames(), FRAMES - 2);
    }

    #[test]
    fn test_release_validation() {
        let mut storage = [FrameState::Free; FRAMES];
        let mut alloc = fresh(&mut storage);
        assert_eq!(alloc.release(0x1234, 1), Err(FrameError::Misaligned));
        assert_eq!(
            alloc.release((FRAMES as u64 - 1) * PAGE_SIZE, 2),
            Err(FrameError::OutOfRange)
        );
        assert_eq!(alloc.release(0, 0), Err(FrameError::InvalidCount));
    }

    #[test]
    fn test_exhaustion_leaves_table_unchanged() {
        let mut storage = [FrameState::Free; FRAMES];
        let mut alloc = fresh(&mut storage);

        while alloc.reserve(8, FrameOwner::Heap).is_ok() {}
        assert_eq!(alloc.free_frames(), 0);

        let before: Vec<_> = (0..FRAMES as u64).map(|i| alloc.state_of(i * PAGE_SIZE)).collect();
        assert_eq!(alloc.reserve(1, FrameOwner::Heap), Err(FrameError::OutOfMemory));
        let after: Vec<_> = (0..FRAMES as u64).map(|i| alloc.state_of(i * PAGE_SIZE)).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_fragmented_table_out_of_memory() {
        let mut storage = [FrameState::Free; 8];
        let mut boot = BootFrameTable::new(&mut storage);
        // Every other frame used: no run of 2 exists
        for i in (0..8).step_by(2) {
            boot.mark_reserved(i * PAGE_SIZE, 1, FrameOwner::Kernel).unwrap();
        }
        let mut alloc = boot.finish();
        assert_eq!(alloc.reserve(2, FrameOwner::Heap), Err(FrameError::OutOfMemory));
        assert_eq!(alloc.free_frames(), 4);
    }

    #[test]
    fn test_run_at_table_end() {
        let mut storage = [FrameState::Free; 4];
        let mut boot = BootFrameTable::new(&mut storage);
        boot.mark_reserved(0, 2, FrameOwner::Kernel).unwrap();
        let mut alloc = boot.finish();
        assert_eq!(alloc.reserve(2, FrameOwner::Heap), Ok(2 * PAGE_SIZE));
        assert_eq!(alloc.reserve(1, FrameOwner::Heap), Err(FrameError::OutOfMemory));
    }

    #[test]
    fn test_mark_reserved_overwrites_owner() {
        let mut storage = [FrameState::Free; FRAMES];
        let mut boot = BootFrameTable::new(&mut storage);
        boot.mark_reserved(0, 4, FrameOwner::Kernel).unwrap();
        boot.mark_reserved(PAGE_SIZE, 1, FrameOwner::PageTables).unwrap();
        assert_eq!(boot.state_of(0), Some(FrameState::Reserved(FrameOwner::Kernel)));
        assert_eq!(
            boot.state_of(PAGE_SIZE),
            Some(FrameState::Reserved(FrameOwner::PageTables))
        );
        assert_eq!(boot.free_frames(), FRAMES - 4);
    }

    #[test]
    fn test_mark_region_reserved_rounds_outward() {
        let mut storage = [FrameState::Free; FRAMES];
        let mut boot = BootFrameTable::new(&mut storage);
        boot.mark_region_reserved(PhysicalRegion::new(0x1800, 0x1000), FrameOwner::Kernel)
            .unwrap();
        assert_eq!(boot.state_of(0x1000), Some(FrameState::Reserved(FrameOwner::Kernel)));
        assert_eq!(boot.state_of(0x2000), Some(FrameState::Reserved(FrameOwner::Kernel)));
        assert_eq!(boot.free_frames(), FRAMES - 2);

        assert_eq!(
            boot.mark_region_reserved(PhysicalRegion::new(0, 0), FrameOwner::Kernel),
            Ok(())
        );
        assert_eq!(
            boot.mark_region_reserved(
                PhysicalRegion::new(FRAMES as u64 * PAGE_SIZE, PAGE_SIZE),
                FrameOwner::Kernel
            ),
            Err(FrameError::OutOfRange)
        );
    }

    #[test]
    fn test_state_of_past_end() {
        let mut storage = [FrameState::Free; FRAMES];
        let alloc = fresh(&mut storage);
        assert_eq!(alloc.state_of(FRAMES as u64 * PAGE_SIZE), None);
    }

    #[test]
    fn test_locked_allocator_page_interface() {
        let mut storage = [FrameState::Free; FRAMES];
        let locked = LockedFrameAllocator::new(fresh(&mut storage));

        let pa = locked.alloc_page().unwrap();
        assert_eq!(locked.state_of(pa), Some(FrameState::Reserved(FrameOwner::PageTables)));
        assert!(crate::interrupts::is_enabled()); // lock released, IRQs restored
        locked.free_page(pa).unwrap();
        assert_eq!(locked.free_page(pa), Err(FrameError::DoubleFree));
        assert_eq!(locked.free_frames(), FRAMES);
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(FrameError::OutOfMemory.code(), 0x0201);
        assert_eq!(FrameError::DoubleFree.code(), 0x0202);
        assert!(!FrameError::OutOfMemory.is_boot_fatal());
        assert_eq!(
            format!("{}", FrameError::DoubleFree),
            "E0202: Release of a frame that is already free"
        );
    }
}
