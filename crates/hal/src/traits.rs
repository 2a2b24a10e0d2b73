//! Architecture-independent traits for hardware abstraction.

use crate::memory::FrameError;

/// Physical page allocation for page-table growth once translation is live.
pub trait PageAllocator: Send + Sync {
    /// Allocate one 4KB physical page.
    fn alloc_page(&self) -> Result<u64, FrameError>;
    /// Return a page obtained from `alloc_page`.
    fn free_page(&self, pa: u64) -> Result<(), FrameError>;
}
