//! Block device capability and byte-addressed I/O on top of it.
//!
//! Drivers implement [`BlockDevice`], which moves bytes within a single
//! block. [`read_bytes`] and [`write_bytes`] split an arbitrary byte range
//! into those per-block calls, so filesystems never deal with block
//! boundaries themselves.

#![cfg_attr(not(feature = "std"), no_std)]

use quill_error::define_kernel_error;

define_kernel_error! {
    /// Block device error type (0x06xx).
    pub enum BlockError(0x06) {
        /// The device reported a failed transfer
        DeviceError = 0x01 => "Block device transfer failed",
        /// Write attempted on a read-only device
        ReadOnly = 0x02 => "Block device is read-only",
        /// Block index past the end of the device
        OutOfBounds = 0x03 => "Block index out of bounds",
        /// Buffer shorter than the requested byte count
        BufferTooSmall = 0x04 => "Buffer smaller than requested byte count",
        /// Device reports a zero block size
        InvalidBlockSize = 0x05 => "Block size must be non-zero",
    }
}

/// A device addressed in fixed-size blocks.
///
/// `read_block`/`write_block` transfer `buf.len()` bytes starting `offset`
/// bytes into block `index`. Callers keep `offset + buf.len()` within one
/// block.
pub trait BlockDevice {
    /// Block size in bytes.
    fn block_size(&self) -> usize;

    /// Whether `write_block` may be called.
    fn supports_writes(&self) -> bool;

    /// Number of blocks, if the device knows it.
    fn block_count(&self) -> Option<u64> {
        None
    }

    fn read_block(&mut self, index: u64, offset: usize, buf: &mut [u8]) -> Result<(), BlockError>;

    fn write_block(&mut self, index: u64, offset: usize, buf: &[u8]) -> Result<(), BlockError>;
}

impl<D: BlockDevice + ?Sized> BlockDevice for &mut D {
    fn block_size(&self) -> usize {
        (**self).block_size()
    }

    fn supports_writes(&self) -> bool {
        (**self).supports_writes()
    }

    fn block_count(&self) -> Option<u64> {
        (**self).block_count()
    }

    fn read_block(&mut self, index: u64, offset: usize, buf: &mut [u8]) -> Result<(), BlockError> {
        (**self).read_block(index, offset, buf)
    }

    fn write_block(&mut self, index: u64, offset: usize, buf: &[u8]) -> Result<(), BlockError> {
        (**self).write_block(index, offset, buf)
    }
}

// ============================================================================
// Byte-range translation
// ============================================================================

/// Walk `[start, start + count)` one block at a time, calling `op` with the
/// block index, the offset inside it, and the matching range of the caller's
/// buffer. Only the first block can have a non-zero offset; the walk stops
/// at the last byte, so a range ending on a boundary touches no extra block.
fn for_each_block<F>(start: u64, count: usize, block_size: usize, mut op: F) -> Result<(), BlockError>
where
    F: FnMut(u64, usize, core::ops::Range<usize>) -> Result<(), BlockError>,
{
    if block_size == 0 {
        return Err(BlockError::InvalidBlockSize);
    }
    let bs = block_size as u64;
    let mut index = start / bs;
    let mut offset = (start % bs) as usize;
    let mut done = 0;

    while done < count {
        let len = (block_size - offset).min(count - done);
        op(index, offset, done..done + len)?;
        done += len;
        offset = 0;
        if done < count {
            index = index.checked_add(1).ok_or(BlockError::OutOfBounds)?;
        }
    }
    Ok(())
}

/// Read `count` bytes starting at byte `start` of `device` into `buffer`.
///
/// A failing block aborts the request; bytes of earlier blocks are already
/// in `buffer` and the rest of it is unspecified.
pub fn read_bytes<D: BlockDevice + ?Sized>(
    device: &mut D,
    start: u64,
    buffer: &mut [u8],
    count: usize,
) -> Result<(), BlockError> {
    if count == 0 {
        return Ok(());
    }
    if buffer.len() < count {
        return Err(BlockError::BufferTooSmall);
    }
    for_each_block(start, count, device.block_size(), |index, offset, range| {
        log::trace!("[BLK] read block {} +{} len {}", index, offset, range.len());
        device.read_block(index, offset, &mut buffer[range]).inspect_err(|e| {
            log::warn!("[BLK] read of block {} failed: {}", index, e);
        })
    })
}

/// Write `count` bytes from `buffer` to `device` starting at byte `start`.
///
/// Does not check [`BlockDevice::supports_writes`]; use
/// [`write_bytes_checked`] when the device may be read-only.
pub fn write_bytes<D: BlockDevice + ?Sized>(
    device: &mut D,
    start: u64,
    buffer: &[u8],
    count: usize,
) -> Result<(), BlockError> {
    if count == 0 {
        return Ok(());
    }
    if buffer.len() < count {
        return Err(BlockError::BufferTooSmall);
    }
    for_each_block(start, count, device.block_size(), |index, offset, range| {
        log::trace!("[BLK] write block {} +{} len {}", index, offset, range.len());
        device.write_block(index, offset, &buffer[range]).inspect_err(|e| {
            log::warn!("[BLK] write of block {} failed: {}", index, e);
        })
    })
}

/// [`write_bytes`] that first rejects read-only devices.
pub fn write_bytes_checked<D: BlockDevice + ?Sized>(
    device: &mut D,
    start: u64,
    buffer: &[u8],
    count: usize,
) -> Result<(), BlockError> {
    if !device.supports_writes() {
        return Err(BlockError::ReadOnly);
    }
    write_bytes(device, start, buffer, count)
}

// ============================================================================
// Partition
// ============================================================================

/// A window of `block_count` blocks starting at `first_block` on another
/// device. Block 0 of the partition is `first_block` of the device.
pub struct Partition<D> {
    device: D,
    first_block: u64,
    block_count: u64,
}

impl<D: BlockDevice> Partition<D> {
    /// Fails with `OutOfBounds` when the window does not fit a device of
    /// known size.
    pub fn new(device: D, first_block: u64, block_count: u64) -> Result<Self, BlockError> {
        let end = first_block
            .checked_add(block_count)
            .ok_or(BlockError::OutOfBounds)?;
        if device.block_count().is_some_and(|total| end > total) {
            return Err(BlockError::OutOfBounds);
        }
        Ok(Self {
            device,
            first_block,
            block_count,
        })
    }

    pub fn first_block(&self) -> u64 {
        self.first_block
    }

    pub fn into_inner(self) -> D {
        self.device
    }

    fn device_index(&self, index: u64) -> Result<u64, BlockError> {
        if index >= self.block_count {
            return Err(BlockError::OutOfBounds);
        }
        Ok(self.first_block + index)
    }
}

impl<D: BlockDevice> BlockDevice for Partition<D> {
    fn block_size(&self) -> usize {
        self.device.block_size()
    }

    fn supports_writes(&self) -> bool {
        self.device.supports_writes()
    }

    fn block_count(&self) -> Option<u64> {
        Some(self.block_count)
    }

    fn read_block(&mut self, index: u64, offset: usize, buf: &mut [u8]) -> Result<(), BlockError> {
        let index = self.device_index(index)?;
        self.device.read_block(index, offset, buf)
    }

    fn write_block(&mut self, index: u64, offset: usize, buf: &[u8]) -> Result<(), BlockError> {
        let index = self.device_index(index)?;
        self.device.write_block(index, offset, buf)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
