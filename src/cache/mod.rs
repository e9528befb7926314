//! Sharded block cache
//!
//! A fixed pool of buffer slots holding cached copies of disk blocks. The
//! pool is partitioned into independently locked buckets, each owning a
//! circular list of the slots that currently live there; a block's bucket
//! is derived from its block number. Misses recycle the least recently
//! used unreferenced slot found by a bounded walk over the buckets.
//!
//! Interface:
//! * To get a block, call [`BlockCache::read`]; it returns a locked guard.
//! * After changing the payload, call [`BlockGuard::write`] to flush it.
//! * Dropping the guard releases the block.
//! * [`BlockGuard::pin`] / [`BlockCache::unpin`] keep a block resident
//!   across guard lifetimes.
//!
//! Only one thread at a time can hold a given block's guard, so guards
//! should not be kept longer than necessary.

mod ilist;

use crate::clock::RecencyClock;
use crate::disk::{BlockDevice, DiskError};
use crate::types::{BlockNo, CacheConfig, DeviceId, BLOCK_SIZE};
use ilist::LinkTable;
use parking_lot::{Mutex, MutexGuard};
use std::fmt;
use std::mem::ManuallyDrop;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

/// Cache errors
#[derive(Debug)]
pub enum CacheError {
    /// Device transfer failed
    Io(DiskError),
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::Io(err) => write!(f, "device transfer failed: {}", err),
        }
    }
}

impl std::error::Error for CacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CacheError::Io(err) => Some(err),
        }
    }
}

impl From<DiskError> for CacheError {
    fn from(err: DiskError) -> Self {
        CacheError::Io(err)
    }
}

/// Result type for cache operations
pub type CacheResult<T> = Result<T, CacheError>;

/// Pack a (device, block) identity into one comparable word.
fn pack_key(device: DeviceId, blockno: BlockNo) -> u64 {
    ((device as u64) << 32) | blockno as u64
}

/// One block payload. The surrounding mutex is the slot's exclusive-use
/// lock: its holder may block while a device transfer is in flight.
struct Block {
    bytes: Box<[u8]>,
}

/// One slot of the fixed buffer pool.
///
/// The atomic fields are written only while holding the lock of the bucket
/// the slot currently belongs to; `valid` is additionally written by the
/// read path under the exclusive-use lock. Atomicity makes the cross-bucket
/// reads sound, the bucket-lock discipline preserves the invariants, so
/// relaxed ordering suffices.
struct BufSlot {
    /// Packed (device, block) identity; immutable while `refcnt > 0`
    key: AtomicU64,
    /// Number of active holders between acquire and release
    refcnt: AtomicU32,
    /// Recency timestamp from the shared clock
    stamp: AtomicU64,
    /// Whether the payload reflects the on-device block
    valid: AtomicBool,
    /// Exclusive-use lock around the payload
    data: Mutex<Block>,
}

impl BufSlot {
    fn new() -> Self {
        BufSlot {
            key: AtomicU64::new(u64::MAX),
            refcnt: AtomicU32::new(0),
            stamp: AtomicU64::new(0),
            valid: AtomicBool::new(false),
            data: Mutex::new(Block {
                bytes: vec![0u8; BLOCK_SIZE].into_boxed_slice(),
            }),
        }
    }
}

/// Per-bucket state behind the bucket lock.
struct Shard {
    /// Handle of this bucket's sentinel node in the link table
    sentinel: usize,
}

/// Sharded block cache over a fixed slot arena.
pub struct BlockCache {
    device: Arc<dyn BlockDevice>,
    clock: Arc<RecencyClock>,
    shards: Box<[Mutex<Shard>]>,
    slots: Box<[BufSlot]>,
    links: LinkTable,
}

impl BlockCache {
    /// Create a cache with `config.blocks` slots spread over
    /// `config.buckets` buckets. Every slot starts on bucket 0's list.
    pub fn new(config: CacheConfig, device: Arc<dyn BlockDevice>, clock: Arc<RecencyClock>) -> Self {
        assert!(
            config.blocks > 0 && config.buckets > 0,
            "block cache: empty configuration"
        );

        let slots = (0..config.blocks)
            .map(|_| BufSlot::new())
            .collect::<Vec<_>>()
            .into_boxed_slice();
        // Sentinel handles follow the slot handles.
        let shards = (0..config.buckets)
            .map(|i| {
                Mutex::new(Shard {
                    sentinel: config.blocks + i,
                })
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();
        let links = LinkTable::new(config.blocks + config.buckets);
        for handle in 0..config.blocks {
            links.push_front(config.blocks, handle);
        }

        BlockCache {
            device,
            clock,
            shards,
            slots,
            links,
        }
    }

    /// Number of buffer slots in the pool
    pub fn blocks(&self) -> usize {
        self.slots.len()
    }

    /// Number of buckets
    pub fn buckets(&self) -> usize {
        self.shards.len()
    }

    fn bucket_of(&self, blockno: BlockNo) -> usize {
        blockno as usize % self.shards.len()
    }

    /// Look through the cache for the block, or recycle a victim slot for
    /// it. Returns a guard holding the slot's exclusive-use lock.
    fn get(&self, device: DeviceId, blockno: BlockNo) -> BlockGuard<'_> {
        let key = pack_key(device, blockno);
        let bucket = self.bucket_of(blockno);
        let shard = self.shards[bucket].lock();

        // Is the block already cached?
        let mut handle = self.links.next_of(shard.sentinel);
        while handle != shard.sentinel {
            let slot = &self.slots[handle];
            if slot.key.load(Ordering::Relaxed) == key {
                slot.refcnt.fetch_add(1, Ordering::Relaxed);
                slot.stamp.store(self.clock.now(), Ordering::Relaxed);
                drop(shard);
                return self.lock_slot(handle, device, blockno);
            }
            handle = self.links.next_of(handle);
        }

        // Not cached. Recycle the least recently used unreferenced slot,
        // visiting buckets in index order from this one and wrapping. The
        // walk ends at the first bucket that yields any candidate and takes
        // that bucket's minimum-stamp slot, which is cheaper than a true
        // global LRU and weaker than one. Foreign buckets held by another
        // concurrent walk are skipped rather than waited on, so two walks
        // can never deadlock each other.
        for step in 0..self.shards.len() {
            let index = (bucket + step) % self.shards.len();
            let other: Option<MutexGuard<'_, Shard>> = if index == bucket {
                None
            } else {
                match self.shards[index].try_lock() {
                    Some(guard) => Some(guard),
                    None => continue,
                }
            };
            let sentinel = match &other {
                Some(guard) => guard.sentinel,
                None => shard.sentinel,
            };

            let mut victim = None;
            let mut min_stamp = u64::MAX;
            let mut handle = self.links.next_of(sentinel);
            while handle != sentinel {
                let slot = &self.slots[handle];
                if slot.refcnt.load(Ordering::Relaxed) == 0 {
                    let stamp = slot.stamp.load(Ordering::Relaxed);
                    if stamp < min_stamp {
                        min_stamp = stamp;
                        victim = Some(handle);
                    }
                }
                handle = self.links.next_of(handle);
            }

            if let Some(found) = victim {
                if index != bucket {
                    // Migrate: unlink under the foreign bucket's lock,
                    // release it, then splice into the owning bucket's
                    // list, which stays locked until the rekey is done.
                    self.links.remove(found);
                    drop(other);
                    self.links.push_front(shard.sentinel, found);
                }
                let slot = &self.slots[found];
                slot.key.store(key, Ordering::Relaxed);
                slot.valid.store(false, Ordering::Relaxed);
                slot.refcnt.store(1, Ordering::Relaxed);
                slot.stamp.store(self.clock.now(), Ordering::Relaxed);
                drop(shard);
                return self.lock_slot(found, device, blockno);
            }
        }

        // Every bucket was visited and every slot is referenced.
        panic!("block cache: out of buffers");
    }

    fn lock_slot(&self, handle: usize, device: DeviceId, blockno: BlockNo) -> BlockGuard<'_> {
        // May block until the current holder drops its guard.
        let data = self.slots[handle].data.lock();
        BlockGuard {
            cache: self,
            slot: handle,
            device,
            blockno,
            data: ManuallyDrop::new(data),
        }
    }

    /// Return a locked guard with the contents of the indicated block,
    /// transferring it from the device if the cached copy is not valid.
    pub fn read(&self, device: DeviceId, blockno: BlockNo) -> CacheResult<BlockGuard<'_>> {
        let mut guard = self.get(device, blockno);
        if !self.slots[guard.slot].valid.load(Ordering::Relaxed) {
            self.device
                .read_block(device, blockno, &mut guard.data.bytes)?;
            self.slots[guard.slot].valid.store(true, Ordering::Relaxed);
        }
        Ok(guard)
    }

    /// Drop a pin taken with [`BlockGuard::pin`].
    pub fn unpin(&self, pin: PinnedBlock) {
        let shard = self.shards[self.bucket_of(pin.blockno)].lock();
        self.slots[pin.slot].refcnt.fetch_sub(1, Ordering::Relaxed);
        drop(shard);
    }
}

impl fmt::Debug for BlockCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockCache")
            .field("blocks", &self.slots.len())
            .field("buckets", &self.shards.len())
            .finish_non_exhaustive()
    }
}

/// Extra reference that keeps a block resident after its guard is gone,
/// for callers (e.g. a write-ahead log) that relock the block later.
/// Must be returned through [`BlockCache::unpin`].
#[derive(Debug)]
pub struct PinnedBlock {
    slot: usize,
    blockno: BlockNo,
}

/// Locked handle to one cached block. Holding the guard is holding the
/// slot's exclusive-use lock; dropping it releases the block.
pub struct BlockGuard<'a> {
    cache: &'a BlockCache,
    slot: usize,
    device: DeviceId,
    blockno: BlockNo,
    data: ManuallyDrop<MutexGuard<'a, Block>>,
}

impl BlockGuard<'_> {
    /// Device this block belongs to
    pub fn device_id(&self) -> DeviceId {
        self.device
    }

    /// Block number on the device
    pub fn block_number(&self) -> BlockNo {
        self.blockno
    }

    /// Write the payload back to the device.
    pub fn write(&mut self) -> CacheResult<()> {
        self.cache
            .device
            .write_block(self.device, self.blockno, &self.data.bytes)?;
        Ok(())
    }

    /// Take an extra reference on the block without touching the
    /// exclusive-use lock.
    pub fn pin(&self) -> PinnedBlock {
        let shard = self.cache.shards[self.cache.bucket_of(self.blockno)].lock();
        self.cache.slots[self.slot]
            .refcnt
            .fetch_add(1, Ordering::Relaxed);
        drop(shard);
        PinnedBlock {
            slot: self.slot,
            blockno: self.blockno,
        }
    }
}

impl Deref for BlockGuard<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data.bytes
    }
}

impl DerefMut for BlockGuard<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.data.bytes
    }
}

impl Drop for BlockGuard<'_> {
    fn drop(&mut self) {
        // Exclusive-use lock first, then the bucket bookkeeping; the slot
        // must be relockable while the bucket update runs.
        unsafe { ManuallyDrop::drop(&mut self.data) };
        let shard = self.cache.shards[self.cache.bucket_of(self.blockno)].lock();
        let slot = &self.cache.slots[self.slot];
        slot.refcnt.fetch_sub(1, Ordering::Relaxed);
        slot.stamp.store(self.cache.clock.now(), Ordering::Relaxed);
        drop(shard);
    }
}

impl fmt::Debug for BlockGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockGuard")
            .field("device", &self.device)
            .field("blockno", &self.blockno)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    include!("tests.rs");
}
