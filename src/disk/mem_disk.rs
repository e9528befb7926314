//! In-memory block device
//!
//! Backs the cache with a plain map for tests, benchmarks, and the demo
//! binary. Blocks that were never written read as zeroes.

use crate::disk::error::{DiskError, DiskResult};
use crate::disk::BlockDevice;
use crate::types::{BlockNo, DeviceId, BLOCK_SIZE};
use parking_lot::Mutex;
use std::collections::HashMap;

/// In-memory device keyed by (device id, block number)
pub struct MemDisk {
    blocks: Mutex<HashMap<(DeviceId, BlockNo), Box<[u8]>>>,
}

impl MemDisk {
    /// Create an empty in-memory device
    pub fn new() -> Self {
        MemDisk {
            blocks: Mutex::new(HashMap::new()),
        }
    }

    /// Number of blocks that have been written at least once
    pub fn block_count(&self) -> usize {
        self.blocks.lock().len()
    }

    fn check_len(len: usize) -> DiskResult<()> {
        if len != BLOCK_SIZE {
            return Err(DiskError::InvalidArgument(format!(
                "transfer buffer is {} bytes, expected {}",
                len, BLOCK_SIZE
            )));
        }
        Ok(())
    }
}

impl Default for MemDisk {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockDevice for MemDisk {
    fn read_block(&self, device: DeviceId, blockno: BlockNo, buf: &mut [u8]) -> DiskResult<()> {
        Self::check_len(buf.len())?;
        match self.blocks.lock().get(&(device, blockno)) {
            Some(stored) => buf.copy_from_slice(stored),
            None => buf.fill(0),
        }
        Ok(())
    }

    fn write_block(&self, device: DeviceId, blockno: BlockNo, buf: &[u8]) -> DiskResult<()> {
        Self::check_len(buf.len())?;
        self.blocks
            .lock()
            .insert((device, blockno), buf.to_vec().into_boxed_slice());
        Ok(())
    }
}
