//! AArch64 stage 1 translation tables and MMU activation.
//!
//! 4KB granule, 48-bit virtual addresses, four levels (L0..L3). Table pages
//! come from a [`TableArena`], a bump allocator over memory reserved at link
//! time. The builder prefers the largest block a request allows at each level
//! (1GB at L1, 2MB at L2) and only descends to 4KB pages where alignment or
//! length force it.
//!
//! Activation goes through a [`SystemRegisters`] backend, so the whole
//! register sequence can be checked on the host.

use bitflags::bitflags;

use quill_error::define_kernel_error;
use quill_utils::is_aligned;

use crate::layout::{
    ENTRIES_PER_TABLE, KERNEL_VIRT_BASE, PAGE_SIZE, PhysicalRegion, RESERVED_ADDRESS_MASK,
    high_half_base,
};
use crate::sysreg::{
    Barrier, PhysAddrRange, SysReg, SystemRegisters, sctlr_enable_value, supports_4k_granule,
    tcr_value,
};

define_kernel_error! {
    /// MMU error type (0x01xx).
    pub enum MmuError(0x01) {
        /// Target entry already holds a different mapping
        MappingConflict = 0x01 => "Region overlaps an existing mapping" [fatal],
        /// Table arena has no page left
        ArenaExhausted = 0x02 => "Translation table arena exhausted" [fatal],
        /// CPU lacks a capability the mappings need
        Unsupported = 0x03 => "Hardware lacks a required addressing capability" [fatal],
        /// Address or length not 4KB-aligned
        Misaligned = 0x04 => "Address or length not page-aligned",
        /// Address uses bits above bit 47
        AddressOutOfRange = 0x05 => "Address outside the 48-bit range",
        /// Builder already switched translation on
        AlreadyActive = 0x06 => "Translation already active",
        /// A table descriptor names a page outside the arena
        ForeignTable = 0x07 => "Table descriptor points outside the arena" [fatal],
    }
}

/// Output address bits [47:12] of a descriptor.
const ADDRESS_MASK: u64 = 0x0000_FFFF_FFFF_F000;

/// Widest virtual address space a 4KB granule walk from L0 can translate.
pub const MAX_VA_BITS: u32 = 48;

// ============================================================================
// Page Table Entry
// ============================================================================

/// A 64-bit translation table descriptor.
#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct PageTableEntry(u64);

impl PageTableEntry {
    /// Create an empty (invalid) entry.
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Descriptor pointing at a next-level table.
    pub const fn table(table_pa: u64) -> Self {
        Self((table_pa & ADDRESS_MASK) | PageFlags::VALID.bits() | PageFlags::TABLE.bits())
    }

    /// Block (L1/L2) or page (L3) descriptor.
    pub const fn leaf(pa: u64, level: TableLevel, attributes: u64) -> Self {
        let kind = match level {
            TableLevel::L3 => PageFlags::VALID.bits() | PageFlags::TABLE.bits(),
            _ => PageFlags::VALID.bits(),
        };
        Self((pa & ADDRESS_MASK) | attributes | kind)
    }

    #[inline]
    pub const fn raw(&self) -> u64 {
        self.0
    }

    #[inline]
    pub const fn is_valid(&self) -> bool {
        self.0 & PageFlags::VALID.bits() != 0
    }

    /// Whether this is a table descriptor when found at `level`.
    /// L3 has no tables: bits[1:0] = 0b11 there means a page.
    #[inline]
    pub const fn is_table_at(&self, level: TableLevel) -> bool {
        !matches!(level, TableLevel::L3) && self.0 & 0b11 == 0b11
    }

    /// Whether this is a block or page descriptor when found at `level`.
    #[inline]
    pub const fn is_leaf_at(&self, level: TableLevel) -> bool {
        match level {
            TableLevel::L0 => false,
            TableLevel::L1 | TableLevel::L2 => self.0 & 0b11 == 0b01,
            TableLevel::L3 => self.0 & 0b11 == 0b11,
        }
    }

    /// Output address (bits [47:12]).
    #[inline]
    pub const fn address(&self) -> u64 {
        self.0 & ADDRESS_MASK
    }

    #[inline]
    pub const fn flags(&self) -> PageFlags {
        PageFlags::from_bits_truncate(self.0)
    }
}

impl core::fmt::Debug for PageTableEntry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "PageTableEntry({:#018x})", self.0)
    }
}

// ============================================================================
// Page Flags
// ============================================================================

bitflags! {
    /// AArch64 stage 1 descriptor bits.
    /// Behaviors: [M1] VALID bit 0, [M2] TABLE bit 1, [M3] block has TABLE=0, [M4] table has TABLE=1
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct PageFlags: u64 {
        /// [M1] Entry is valid
        const VALID       = 1 << 0;
        /// [M2] Table descriptor, or page descriptor at L3
        const TABLE       = 1 << 1;
        /// MAIR index, AttrIndx[2:0]
        const ATTR_INDX   = 0b111 << 2;
        /// Non-secure
        const NS          = 1 << 5;
        /// EL0 access (AP[1])
        const AP_EL0      = 1 << 6;
        /// Read-only (AP[2])
        const AP_RO       = 1 << 7;
        /// Outer Shareable
        const SH_OUTER    = 0b10 << 8;
        /// Inner Shareable
        const SH_INNER    = 0b11 << 8;
        /// Access Flag, must be set or the first access faults
        const AF          = 1 << 10;
        /// Not Global
        const NG          = 1 << 11;
        /// Privileged Execute Never
        const PXN         = 1 << 53;
        /// User Execute Never
        const UXN         = 1 << 54;
    }
}

impl PageFlags {
    /// MAIR index encoded in these flags.
    pub const fn attribute_index(&self) -> AttributeIndex {
        AttributeIndex(((self.bits() >> 2) & 0b111) as u8)
    }
}

bitflags! {
    /// Access permissions and attributes of a leaf mapping, excluding the
    /// descriptor type and memory attribute index.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct AccessFlags: u64 {
        const EL0_ACCESS   = PageFlags::AP_EL0.bits();
        const READ_ONLY    = PageFlags::AP_RO.bits();
        const INNER_SHARED = PageFlags::SH_INNER.bits();
        const ACCESSED     = PageFlags::AF.bits();
        const NOT_GLOBAL   = PageFlags::NG.bits();
        const PXN          = PageFlags::PXN.bits();
        const UXN          = PageFlags::UXN.bits();
    }
}

impl AccessFlags {
    /// Kernel read-write, executable at EL1. Used for the boot identity map
    /// of RAM, which the kernel keeps executing from.
    pub const KERNEL_RWX: AccessFlags = AccessFlags::ACCESSED
        .union(AccessFlags::INNER_SHARED)
        .union(AccessFlags::UXN);

    /// Kernel code: read-only, executable at EL1
    pub const KERNEL_CODE: AccessFlags = AccessFlags::ACCESSED
        .union(AccessFlags::INNER_SHARED)
        .union(AccessFlags::READ_ONLY)
        .union(AccessFlags::UXN);

    /// Kernel data: read-write, never executable
    pub const KERNEL_DATA: AccessFlags = AccessFlags::ACCESSED
        .union(AccessFlags::INNER_SHARED)
        .union(AccessFlags::PXN)
        .union(AccessFlags::UXN);

    /// Device registers: read-write, never executable
    pub const DEVICE: AccessFlags = AccessFlags::ACCESSED
        .union(AccessFlags::PXN)
        .union(AccessFlags::UXN);
}

/// Index into MAIR_EL1 (0..=7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeIndex(u8);

impl AttributeIndex {
    /// Normal memory slot in the boot MAIR layout
    pub const NORMAL: AttributeIndex = AttributeIndex(0);
    /// Device memory slot in the boot MAIR layout
    pub const DEVICE: AttributeIndex = AttributeIndex(1);

    pub const fn new(index: u8) -> Option<Self> {
        if index < 8 { Some(Self(index)) } else { None }
    }

    pub const fn get(&self) -> u8 {
        self.0
    }

    const fn descriptor_bits(&self) -> u64 {
        (self.0 as u64) << 2
    }
}

// ============================================================================
// MAIR_EL1
// ============================================================================

/// MAIR_EL1 contents: one attribute byte per [`AttributeIndex`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryAttributes {
    attrs: [u8; 8],
}

impl MemoryAttributes {
    /// Normal memory, inner and outer non-cacheable
    pub const NORMAL_NON_CACHEABLE: u8 = 0x44;
    /// Normal memory, inner and outer write-back read/write-allocate
    pub const NORMAL_WRITE_BACK: u8 = 0xFF;
    /// Device-nGnRnE
    pub const DEVICE_NGNRNE: u8 = 0x00;
    /// Device-nGnRE
    pub const DEVICE_NGNRE: u8 = 0x04;

    /// Boot layout: attr 0 normal non-cacheable, attr 1 device nGnRnE.
    pub const fn boot() -> Self {
        let mut attrs = [0u8; 8];
        attrs[AttributeIndex::NORMAL.0 as usize] = Self::NORMAL_NON_CACHEABLE;
        attrs[AttributeIndex::DEVICE.0 as usize] = Self::DEVICE_NGNRNE;
        Self { attrs }
    }

    #[must_use]
    pub const fn with(mut self, index: AttributeIndex, attr: u8) -> Self {
        self.attrs[index.0 as usize] = attr;
        self
    }

    pub const fn get(&self, index: AttributeIndex) -> u8 {
        self.attrs[index.0 as usize]
    }

    pub const fn mair_value(&self) -> u64 {
        u64::from_le_bytes(self.attrs)
    }
}

impl Default for MemoryAttributes {
    fn default() -> Self {
        Self::boot()
    }
}

// ============================================================================
// Levels
// Behaviors: [M7]-[M10] VA index extraction
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableLevel {
    L0,
    L1,
    L2,
    L3,
}

impl TableLevel {
    /// Bit position of the lowest VA bit this level indexes.
    pub const fn shift(&self) -> u32 {
        match self {
            TableLevel::L0 => 39,
            TableLevel::L1 => 30,
            TableLevel::L2 => 21,
            TableLevel::L3 => 12,
        }
    }

    /// Bytes covered by one entry at this level.
    pub const fn block_size(&self) -> u64 {
        1 << self.shift()
    }

    /// [M7]-[M10] Entry index for `va` at this level.
    pub const fn index_of(&self, va: u64) -> usize {
        ((va >> self.shift()) & 0x1FF) as usize
    }

    /// Whether an entry at this level may map memory directly.
    pub const fn supports_block(&self) -> bool {
        !matches!(self, TableLevel::L0)
    }

    pub const fn next(&self) -> Option<TableLevel> {
        match self {
            TableLevel::L0 => Some(TableLevel::L1),
            TableLevel::L1 => Some(TableLevel::L2),
            TableLevel::L2 => Some(TableLevel::L3),
            TableLevel::L3 => None,
        }
    }
}

// ============================================================================
// Page Table
// ============================================================================

/// A 4KB-aligned page table with 512 entries.
#[repr(C, align(4096))]
pub struct PageTable {
    entries: [PageTableEntry; ENTRIES_PER_TABLE],
}

impl PageTable {
    pub const fn new() -> Self {
        Self {
            entries: [PageTableEntry::empty(); ENTRIES_PER_TABLE],
        }
    }

    pub fn zero(&mut self) {
        self.entries.fill(PageTableEntry::empty());
    }

    #[inline]
    pub fn entry(&self, index: usize) -> PageTableEntry {
        self.entries[index]
    }

    #[inline]
    fn set_entry(&mut self, index: usize, entry: PageTableEntry) {
        self.entries[index] = entry;
    }

    pub fn is_empty(&self) -> bool {
        self.entries.iter().all(|e| !e.is_valid())
    }
}

impl Default for PageTable {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Table Arena
// ============================================================================

/// Bump allocator for table pages. Pages are handed out strictly forward and
/// never returned. Page 0 is the root.
pub struct TableArena<'a> {
    pages: &'a mut [PageTable],
    phys_base: u64,
    next: usize,
}

impl<'a> TableArena<'a> {
    /// Wrap `pages`, whose first page sits at physical address `phys_base`.
    /// Allocates and zeroes the root.
    pub fn new(pages: &'a mut [PageTable], phys_base: u64) -> Result<Self, MmuError> {
        if !is_aligned(phys_base, PAGE_SIZE) {
            return Err(MmuError::Misaligned);
        }
        if pages.is_empty() {
            return Err(MmuError::ArenaExhausted);
        }
        let size = pages.len() as u64 * PAGE_SIZE;
        let end = phys_base.checked_add(size).ok_or(MmuError::AddressOutOfRange)?;
        if (end - 1) & RESERVED_ADDRESS_MASK != 0 {
            return Err(MmuError::AddressOutOfRange);
        }

        let mut arena = Self {
            pages,
            phys_base,
            next: 0,
        };
        arena.allocate()?;
        Ok(arena)
    }

    /// Zero the next free page and return its physical address.
    pub fn allocate(&mut self) -> Result<u64, MmuError> {
        let page = self.pages.get_mut(self.next).ok_or(MmuError::ArenaExhausted)?;
        page.zero();
        let pa = self.phys_base + self.next as u64 * PAGE_SIZE;
        self.next += 1;
        Ok(pa)
    }

    pub const fn root_pa(&self) -> u64 {
        self.phys_base
    }

    /// Pages handed out so far, root included.
    pub const fn used(&self) -> usize {
        self.next
    }

    pub const fn capacity(&self) -> usize {
        self.pages.len()
    }

    /// Physical memory backing the arena.
    pub const fn region(&self) -> PhysicalRegion {
        PhysicalRegion::new(self.phys_base, self.pages.len() as u64 * PAGE_SIZE)
    }

    fn index_of(&self, table_pa: u64) -> Option<usize> {
        let offset = table_pa.checked_sub(self.phys_base)?;
        let index = usize::try_from(offset / PAGE_SIZE).ok()?;
        (index < self.next).then_some(index)
    }

    fn table(&self, table_pa: u64) -> Result<&PageTable, MmuError> {
        let index = self.index_of(table_pa).ok_or(MmuError::ForeignTable)?;
        Ok(&self.pages[index])
    }

    fn table_mut(&mut self, table_pa: u64) -> Result<&mut PageTable, MmuError> {
        let index = self.index_of(table_pa).ok_or(MmuError::ForeignTable)?;
        Ok(&mut self.pages[index])
    }
}

// ============================================================================
// Translation Table Builder
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuilderState {
    /// Accepting `map_region`
    Building,
    /// Translation is on; terminal
    Active,
}

/// Leaf descriptors installed by one `map_region` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MappingStats {
    pub blocks_1gb: usize,
    pub blocks_2mb: usize,
    pub pages_4kb: usize,
}

impl MappingStats {
    /// Total bytes covered by newly installed descriptors
    pub const fn total_bytes(&self) -> u64 {
        self.blocks_1gb as u64 * TableLevel::L1.block_size()
            + self.blocks_2mb as u64 * TableLevel::L2.block_size()
            + self.pages_4kb as u64 * TableLevel::L3.block_size()
    }

    fn count(&mut self, level: TableLevel) {
        match level {
            TableLevel::L1 => self.blocks_1gb += 1,
            TableLevel::L2 => self.blocks_2mb += 1,
            TableLevel::L3 => self.pages_4kb += 1,
            TableLevel::L0 => {}
        }
    }
}

/// One contiguous piece of a region request, within a single table.
#[derive(Clone, Copy)]
struct Span {
    va: u64,
    pa: u64,
    len: u64,
    /// Leaf attribute bits (access flags and AttrIndx)
    attributes: u64,
}

/// Builder shared beyond its owner: every mutating call runs under the lock
/// with interrupts masked, like [`LockedFrameAllocator`](crate::LockedFrameAllocator).
pub type LockedTableBuilder<'a> = crate::IrqSafeLock<TranslationTableBuilder<'a>>;

/// Builds the boot translation tables and switches translation on.
///
/// `Building` accepts [`map_region`](Self::map_region); a successful
/// [`activate`](Self::activate) moves to `Active`, after which every
/// mutating call fails with `AlreadyActive`.
pub struct TranslationTableBuilder<'a> {
    arena: TableArena<'a>,
    state: BuilderState,
    attributes: MemoryAttributes,
    /// Exclusive end of the highest mapped VA (0 while nothing is mapped)
    va_end: u64,
    /// Exclusive end of the highest mapped PA
    pa_end: u64,
}

impl<'a> TranslationTableBuilder<'a> {
    pub fn new(arena: TableArena<'a>) -> Self {
        Self {
            arena,
            state: BuilderState::Building,
            attributes: MemoryAttributes::boot(),
            va_end: 0,
            pa_end: 0,
        }
    }

    pub const fn state(&self) -> BuilderState {
        self.state
    }

    pub const fn arena(&self) -> &TableArena<'a> {
        &self.arena
    }

    pub const fn root_pa(&self) -> u64 {
        self.arena.root_pa()
    }

    pub const fn memory_attributes(&self) -> MemoryAttributes {
        self.attributes
    }

    /// Replace the MAIR layout programmed by `activate`.
    pub fn set_memory_attributes(&mut self, attributes: MemoryAttributes) -> Result<(), MmuError> {
        if self.state == BuilderState::Active {
            return Err(MmuError::AlreadyActive);
        }
        self.attributes = attributes;
        Ok(())
    }

    /// Map `[va, va + len)` to `[pa, pa + len)`.
    ///
    /// All three values must be 4KB-aligned and every address must fit in
    /// 48 bits. Re-mapping an identical range is accepted and installs
    /// nothing; any other overlap with an existing leaf is `MappingConflict`
    /// and leaves the tables untouched. `ArenaExhausted` can leave a prefix
    /// of the region mapped.
    pub fn map_region(
        &mut self,
        va: u64,
        pa: u64,
        len: u64,
        access: AccessFlags,
        attr: AttributeIndex,
    ) -> Result<MappingStats, MmuError> {
        if self.state == BuilderState::Active {
            return Err(MmuError::AlreadyActive);
        }
        if !is_aligned(va, PAGE_SIZE) || !is_aligned(pa, PAGE_SIZE) || !is_aligned(len, PAGE_SIZE) {
            return Err(MmuError::Misaligned);
        }
        if len == 0 {
            return Ok(MappingStats::default());
        }
        let va_end = va.checked_add(len).ok_or(MmuError::AddressOutOfRange)?;
        let pa_end = pa.checked_add(len).ok_or(MmuError::AddressOutOfRange)?;
        if (va_end - 1) & RESERVED_ADDRESS_MASK != 0 || (pa_end - 1) & RESERVED_ADDRESS_MASK != 0 {
            return Err(MmuError::AddressOutOfRange);
        }

        let span = Span {
            va,
            pa,
            len,
            // Unnamed bits could forge a descriptor type or output address
            attributes: AccessFlags::from_bits_truncate(access.bits()).bits() | attr.descriptor_bits(),
        };
        let root = self.arena.root_pa();
        let mut stats = MappingStats::default();

        // Dry run first: a conflict anywhere must not leave a partial mapping
        self.map_span(root, TableLevel::L0, span, false, &mut stats)?;
        self.map_span(root, TableLevel::L0, span, true, &mut stats)?;

        self.va_end = self.va_end.max(va_end);
        self.pa_end = self.pa_end.max(pa_end);
        log::debug!(
            "[MMU] mapped {:#x}..{:#x} -> {:#x} ({} x 1G, {} x 2M, {} x 4K)",
            va,
            va_end,
            pa,
            stats.blocks_1gb,
            stats.blocks_2mb,
            stats.pages_4kb
        );
        Ok(stats)
    }

    /// Install `span` into the table at `table_pa`, which sits at `level`.
    ///
    /// With `commit == false` nothing is written or allocated; missing
    /// subtables count as empty.
    fn map_span(
        &mut self,
        table_pa: u64,
        level: TableLevel,
        span: Span,
        commit: bool,
        stats: &mut MappingStats,
    ) -> Result<(), MmuError> {
        let size = level.block_size();
        let mut va = span.va;
        let mut pa = span.pa;
        let mut remaining = span.len;

        while remaining > 0 {
            let index = level.index_of(va);
            let chunk = (size - (va & (size - 1))).min(remaining);
            let fits_leaf = level.supports_block() && chunk == size && is_aligned(pa, size);
            let existing = self.arena.table(table_pa)?.entry(index);
            let sub = Span {
                va,
                pa,
                len: chunk,
                attributes: span.attributes,
            };

            if existing.is_table_at(level) {
                // Finer mappings already live here; merge into them
                let next = level.next().ok_or(MmuError::MappingConflict)?;
                self.map_span(existing.address(), next, sub, commit, stats)?;
            } else if fits_leaf {
                let desired = PageTableEntry::leaf(pa, level, span.attributes);
                if existing.is_valid() {
                    if existing != desired {
                        return Err(MmuError::MappingConflict);
                    }
                } else if commit {
                    self.arena.table_mut(table_pa)?.set_entry(index, desired);
                    stats.count(level);
                    #[cfg(feature = "verbose")]
                    log::trace!("[MMU] {:?}[{}] = {:?}", level, index, desired);
                }
            } else if existing.is_valid() {
                // A block covers part of the request
                return Err(MmuError::MappingConflict);
            } else if commit {
                let next = level.next().ok_or(MmuError::Misaligned)?;
                let child = self.arena.allocate()?;
                self.arena
                    .table_mut(table_pa)?
                    .set_entry(index, PageTableEntry::table(child));
                self.map_span(child, next, sub, commit, stats)?;
            }

            va += chunk;
            pa += chunk;
            remaining -= chunk;
        }
        Ok(())
    }

    /// Walk the tables for `va`. Returns the physical address `va` resolves to
    /// and the flags of the leaf descriptor that maps it.
    ///
    /// High-half addresses resolve through the same tables, as they do once
    /// TTBR1 points at the root.
    pub fn translate(&self, va: u64) -> Option<(u64, PageFlags)> {
        let top = va & RESERVED_ADDRESS_MASK;
        if top != 0 && top != RESERVED_ADDRESS_MASK {
            return None;
        }

        let mut table_pa = self.arena.root_pa();
        let mut level = TableLevel::L0;
        loop {
            let entry = self.arena.table(table_pa).ok()?.entry(level.index_of(va));
            if !entry.is_valid() {
                return None;
            }
            if entry.is_leaf_at(level) {
                let offset = va & (level.block_size() - 1);
                let base = entry.address() & !(level.block_size() - 1);
                return Some((base | offset, entry.flags()));
            }
            if !entry.is_table_at(level) {
                return None;
            }
            table_pa = entry.address();
            level = level.next()?;
        }
    }

    /// Program MAIR, TCR, both TTBRs and SCTLR, then mark the builder `Active`.
    ///
    /// Every capability check runs before the first register write, so an
    /// `Unsupported` failure leaves the hardware untouched. Calling this
    /// again after success returns `AlreadyActive` without touching any
    /// register.
    pub fn activate<R: SystemRegisters>(&mut self, va_bits: u32, regs: &mut R) -> Result<(), MmuError> {
        if self.state == BuilderState::Active {
            return Err(MmuError::AlreadyActive);
        }

        let mmfr0 = regs.read(SysReg::IdAa64Mmfr0El1);
        if !supports_4k_granule(mmfr0) {
            log::error!("[MMU] CPU does not implement the 4KB granule");
            return Err(MmuError::Unsupported);
        }
        let pa_range = PhysAddrRange::from_mmfr0(mmfr0);
        if !pa_range.covers(self.pa_end) {
            log::error!(
                "[MMU] PA range {:?} bits too small for mappings ending at {:#x}",
                pa_range.bits(),
                self.pa_end
            );
            return Err(MmuError::Unsupported);
        }
        if va_bits > MAX_VA_BITS || self.va_end > (1u64 << va_bits) {
            log::error!("[MMU] {}-bit address space unusable (mapped up to {:#x})", va_bits, self.va_end);
            return Err(MmuError::Unsupported);
        }
        // TTBR1 must still translate the offset view HwPtr and phys_to_virt use
        if high_half_base(va_bits) > KERNEL_VIRT_BASE {
            log::error!(
                "[MMU] {}-bit high half starts at {:#x}, above the kernel base {:#x}",
                va_bits,
                high_half_base(va_bits),
                KERNEL_VIRT_BASE
            );
            return Err(MmuError::Unsupported);
        }

        let root = self.arena.root_pa();

        regs.write(SysReg::MairEl1, self.attributes.mair_value());
        regs.write(SysReg::TcrEl1, tcr_value(va_bits, pa_range.ips()));
        regs.barrier(Barrier::Isb);

        // Low half stays identity-mapped for now; high half is the offset view
        regs.write(SysReg::Ttbr0El1, root);
        regs.write(SysReg::Ttbr1El1, root);
        regs.barrier(Barrier::DsbIsh);
        regs.invalidate_tlb();
        regs.barrier(Barrier::Isb);

        let sctlr = regs.read(SysReg::SctlrEl1);
        regs.write(SysReg::SctlrEl1, sctlr_enable_value(sctlr));
        regs.barrier(Barrier::Isb);

        self.state = BuilderState::Active;
        log::info!(
            "[MMU] translation active: root {:#x}, {} of {} table pages used",
            root,
            self.arena.used(),
            self.arena.capacity()
        );
        Ok(())
    }
}

// ============================================================================
// Unit Tests
// Run with: cargo test -p quill_hal --features std
// ============================================================================
