//! Memory pool
//!
//! A bounded allocator. Requests of at most half a block are rounded up to a power of two and
//! served from per size free lists ("buckets"). An empty bucket is refilled by splitting a
//! larger free chunk (or a fresh block) in halves, parking every unused half on its own
//! bucket. Larger requests are rounded up to whole blocks and served from an address sorted
//! free block list, falling back to the system allocator.
//!
//! A separate, fixed emergency area is reserved up front for code paths which must not fail
//! because the pool is exhausted.
//!
//! All state lives behind a single mutex which is held for the duration of each call.

use std::alloc::{self, Layout};
use std::collections::BTreeMap;
use std::mem;
use std::ptr::{self, NonNull};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::cell::{CellList, CELL_SIZE};

/// Size of a pool block.
pub const BLOCK_SIZE: usize = 8 << 10;

/// Largest request served from the buckets.
pub const HALF_BLOCK_SIZE: usize = BLOCK_SIZE / 2;

/// Granularity of the emergency area.
pub const EMERGENCY_BLOCK_SIZE: usize = CELL_SIZE;

const MIN_CHUNK_SIZE: usize = mem::size_of::<*mut u8>();

const BUCKET_COUNT: usize =
    (HALF_BLOCK_SIZE.trailing_zeros() - MIN_CHUNK_SIZE.trailing_zeros()) as usize + 1;

const OS_ALIGN: usize = 16;

/// Memory pool errors.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryError {
    /// Zero sized request, or a limit below what is already allocated
    #[error("bad argument")]
    BadArgument,

    /// Request larger than the total pool limit
    #[error("request exceeds the pool limit")]
    OverPoolLimit,

    /// Request would take the pool over its limit
    #[error("pool limit reached")]
    PoolLimitSize,

    /// The system allocator failed
    #[error("system allocation failed")]
    OsAlloc,

    /// Emergency area exhausted
    #[error("emergency area limit reached")]
    EmergencyLimit,

    /// Emergency area resized while in use
    #[error("emergency area is in use")]
    EmergencyAreaUsed,

    /// Pointer handed to `free_emergency` isn't from the emergency area
    #[error("pointer is not in the emergency area")]
    NotFreeEmergencyArea,

    /// Region freed which is already free
    #[error("freeing memory which isn't allocated")]
    FreeUnAllocated,
}

impl MemoryError {
    /// Can the caller release other memory and retry the same request?
    ///
    /// Negotiable errors are never recorded as the pool's last error.
    pub fn is_negotiable(&self) -> bool {
        matches!(self, MemoryError::PoolLimitSize | MemoryError::OsAlloc)
    }
}

/// Pool configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Upper bound of memory taken from the system, in KB
    pub total_limit_kb: usize,
    /// Size of the emergency area, in KB
    pub emergency_limit_kb: usize,
    /// Share (percent) of allocated memory which may sit unused on the free block list before
    /// it is handed back to the system. 100 never hands anything back.
    pub free_area_percent: u32,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            total_limit_kb: 100,
            emergency_limit_kb: 1,
            free_area_percent: 100,
        }
    }
}

#[derive(Debug)]
struct EmergencyArea {
    base: NonNull<u8>,
    layout: Layout,
    free: CellList,
}

impl EmergencyArea {
    fn contains(&self, p: NonNull<u8>) -> bool {
        let start = self.base.as_ptr() as usize;
        (start..start + self.layout.size()).contains(&(p.as_ptr() as usize))
    }
}

#[derive(Debug)]
struct PoolState {
    limit: usize,
    size: usize,
    allocated: usize,
    free_area_percent: u32,
    buckets: [*mut u8; BUCKET_COUNT],
    free_blocks: CellList,
    segments: BTreeMap<usize, Layout>,
    emergency: Option<EmergencyArea>,
    emergency_limit: usize,
    emergency_size: usize,
    last_error: Option<MemoryError>,
}

// SAFETY: the raw pointers in PoolState all refer to memory owned by the pool itself and are
// only dereferenced while the pool mutex is held.
unsafe impl Send for PoolState {}

/// A bounded, size classed memory pool.
#[derive(Debug)]
pub struct MemoryPool {
    state: Mutex<PoolState>,
}

fn round_up(size: usize, unit: usize) -> Option<usize> {
    size.div_ceil(unit).checked_mul(unit)
}

fn kb_to_bytes(kb: usize) -> Result<usize, MemoryError> {
    kb.checked_mul(1 << 10).ok_or(MemoryError::BadArgument)
}

fn chunk_size(size: usize) -> usize {
    size.next_power_of_two().max(MIN_CHUNK_SIZE)
}

fn bucket_index(chunk: usize) -> usize {
    (chunk.trailing_zeros() - MIN_CHUNK_SIZE.trailing_zeros()) as usize
}

fn emergency_size(size: usize) -> Option<usize> {
    size.max(EMERGENCY_BLOCK_SIZE).checked_next_power_of_two()
}

impl MemoryPool {
    /// Create a pool and reserve its emergency area.
    pub fn try_new(config: &PoolConfig) -> Result<Self, MemoryError> {
        let mut state = PoolState {
            limit: kb_to_bytes(config.total_limit_kb)?,
            size: 0,
            allocated: 0,
            free_area_percent: config.free_area_percent,
            buckets: [ptr::null_mut(); BUCKET_COUNT],
            free_blocks: CellList::default(),
            segments: BTreeMap::new(),
            emergency: None,
            emergency_limit: 0,
            emergency_size: 0,
            last_error: None,
        };
        state.set_emergency_limit(config.emergency_limit_kb)?;
        tracing::info!(
            limit = state.limit,
            emergency_limit = state.emergency_limit,
            "created memory pool"
        );
        Ok(Self {
            state: Mutex::new(state),
        })
    }

    /// Allocate at least `size` bytes.
    ///
    /// The contents of the region are unspecified. [`MemoryError::PoolLimitSize`] and
    /// [`MemoryError::OsAlloc`] may be retried once other memory has been freed.
    pub fn allocate(&self, size: usize) -> Result<NonNull<u8>, MemoryError> {
        let mut state = self.state.lock();
        let result = state.allocate(size);
        result.map_err(|e| state.note(e))
    }

    /// Return memory obtained from [`MemoryPool::allocate`]. A null pointer is ignored.
    ///
    /// # Safety
    ///
    /// `p` must have been returned by `allocate` on this pool with the same `size`, and must
    /// not be used after this call.
    pub unsafe fn free(&self, p: *mut u8, size: usize) -> Result<(), MemoryError> {
        let Some(p) = NonNull::new(p) else {
            return Ok(());
        };
        let mut state = self.state.lock();
        let result = state.free(p, size);
        result.map_err(|e| state.note(e))
    }

    /// Allocate from the emergency area.
    ///
    /// The request is rounded up to a power of two multiple of [`EMERGENCY_BLOCK_SIZE`]. The
    /// emergency area never grows.
    pub fn allocate_emergency(&self, size: usize) -> Result<NonNull<u8>, MemoryError> {
        let mut state = self.state.lock();
        let result = state.allocate_emergency(size);
        result.map_err(|e| state.note(e))
    }

    /// Return memory obtained from [`MemoryPool::allocate_emergency`]. A null pointer is
    /// ignored.
    ///
    /// # Safety
    ///
    /// `p` must have been returned by `allocate_emergency` on this pool with the same `size`,
    /// and must not be used after this call.
    pub unsafe fn free_emergency(&self, p: *mut u8, size: usize) -> Result<(), MemoryError> {
        let Some(p) = NonNull::new(p) else {
            return Ok(());
        };
        let mut state = self.state.lock();
        let result = state.free_emergency(p, size);
        result.map_err(|e| state.note(e))
    }

    /// Change the total limit, in KB.
    pub fn set_total_limit(&self, kb: usize) -> Result<(), MemoryError> {
        let mut state = self.state.lock();
        let bytes = kb_to_bytes(kb).map_err(|e| state.note(e))?;
        if bytes < state.allocated {
            return Err(state.note(MemoryError::BadArgument));
        }
        state.limit = bytes;
        Ok(())
    }

    /// Replace the emergency area with one of `kb` KB.
    ///
    /// Fails with [`MemoryError::EmergencyAreaUsed`] while any emergency memory is allocated.
    pub fn set_emergency_limit(&self, kb: usize) -> Result<(), MemoryError> {
        let mut state = self.state.lock();
        let result = state.set_emergency_limit(kb);
        result.map_err(|e| state.note(e))
    }

    /// Bytes currently handed out to callers (excluding the emergency area).
    pub fn size(&self) -> usize {
        self.state.lock().size
    }

    /// Bytes currently taken from the system (excluding the emergency area).
    pub fn allocated(&self) -> usize {
        self.state.lock().allocated
    }

    /// Total limit in bytes.
    pub fn limit(&self) -> usize {
        self.state.lock().limit
    }

    /// Bytes currently handed out from the emergency area.
    pub fn emergency_size(&self) -> usize {
        self.state.lock().emergency_size
    }

    /// Size of the emergency area in bytes.
    pub fn emergency_limit(&self) -> usize {
        self.state.lock().emergency_limit
    }

    /// The last recorded (non negotiable) error.
    pub fn last_error(&self) -> Option<MemoryError> {
        self.state.lock().last_error
    }

    /// Forget the last recorded error.
    pub fn clear_error(&self) {
        self.state.lock().last_error = None;
    }
}

impl PoolState {
    fn note(&mut self, error: MemoryError) -> MemoryError {
        if error.is_negotiable() {
            tracing::debug!(%error, size = self.size, allocated = self.allocated, "pool exhausted");
        } else {
            tracing::error!(%error, "memory pool error");
            self.last_error = Some(error);
        }
        error
    }

    fn allocate(&mut self, size: usize) -> Result<NonNull<u8>, MemoryError> {
        if size == 0 {
            return Err(MemoryError::BadArgument);
        }
        if size > self.limit {
            return Err(MemoryError::OverPoolLimit);
        }

        if size > HALF_BLOCK_SIZE {
            let size = round_up(size, BLOCK_SIZE).ok_or(MemoryError::OverPoolLimit)?;
            let p = self.allocate_block(size)?;
            self.size += size;
            return Ok(p);
        }

        let chunk = chunk_size(size);
        if let Some(p) = self.pop(chunk) {
            self.size += chunk;
            return Ok(p);
        }

        let mut large = chunk << 1;
        let p = loop {
            if large >= BLOCK_SIZE {
                large = BLOCK_SIZE;
                break self.allocate_block(BLOCK_SIZE)?;
            }
            if let Some(p) = self.pop(large) {
                break p;
            }
            large <<= 1;
        };

        // Park the unused halves, largest first
        while large > chunk {
            large >>= 1;
            // SAFETY: p starts a free region of at least 2 * large bytes.
            let rest = unsafe { NonNull::new_unchecked(p.as_ptr().add(large)) };
            self.push(large, rest);
        }

        self.size += chunk;
        Ok(p)
    }

    fn allocate_block(&mut self, size: usize) -> Result<NonNull<u8>, MemoryError> {
        if size > self.limit {
            return Err(MemoryError::OverPoolLimit);
        }

        let divide = self.free_area_percent >= 100;
        // SAFETY: the free block list only holds regions of our own segments.
        if let Some(p) = unsafe { self.free_blocks.search(size, BLOCK_SIZE, divide) } {
            return Ok(p);
        }

        if size > BLOCK_SIZE && self.should_release() {
            self.release_free_blocks();
        }

        if size > self.limit.saturating_sub(self.allocated) {
            return Err(MemoryError::PoolLimitSize);
        }

        let layout = Layout::from_size_align(size, OS_ALIGN).map_err(|_| MemoryError::OsAlloc)?;
        // SAFETY: layout has a non zero size.
        let p = NonNull::new(unsafe { alloc::alloc(layout) }).ok_or(MemoryError::OsAlloc)?;
        self.segments.insert(p.as_ptr() as usize, layout);
        self.allocated += size;
        tracing::debug!(size, allocated = self.allocated, "allocated block");
        Ok(p)
    }

    fn should_release(&self) -> bool {
        match self.free_area_percent {
            0 => true,
            pct if pct < 100 && self.allocated > 0 => {
                f64::from(pct) / 100.0
                    < (self.allocated - self.size) as f64 / self.allocated as f64
            }
            _ => false,
        }
    }

    /// Hand free blocks covering a whole segment back to the system.
    fn release_free_blocks(&mut self) {
        let segments = &mut self.segments;
        let mut released = 0;
        // SAFETY: cells are regions of our segments; a released cell covers its segment exactly
        // so nothing else refers to the memory.
        unsafe {
            self.free_blocks.retain_unless(|addr, size| {
                match segments.get(&addr) {
                    Some(layout) if layout.size() == size => {
                        let layout = *layout;
                        segments.remove(&addr);
                        alloc::dealloc(addr as *mut u8, layout);
                        released += size;
                        true
                    }
                    _ => false,
                }
            });
        }
        self.allocated -= released;
        tracing::debug!(released, allocated = self.allocated, "released free blocks");
    }

    fn free(&mut self, p: NonNull<u8>, size: usize) -> Result<(), MemoryError> {
        if size == 0 {
            return Err(MemoryError::BadArgument);
        }

        let size = if size > HALF_BLOCK_SIZE {
            round_up(size, BLOCK_SIZE).ok_or(MemoryError::FreeUnAllocated)?
        } else {
            chunk_size(size)
        };
        if size > self.size {
            return Err(MemoryError::FreeUnAllocated);
        }

        if size > HALF_BLOCK_SIZE {
            let segments = &self.segments;
            // SAFETY: the caller guarantees p was allocated by us with this size.
            unsafe {
                self.free_blocks.chain(p, size, BLOCK_SIZE, |lo, hi| {
                    same_segment(segments, lo, hi)
                })?;
            }
        } else {
            self.push(size, p);
        }
        self.size -= size;
        Ok(())
    }

    fn pop(&mut self, chunk: usize) -> Option<NonNull<u8>> {
        let index = bucket_index(chunk);
        let head = NonNull::new(self.buckets[index])?;
        // SAFETY: bucket chunks are free regions of at least a pointer in size, aligned for one.
        self.buckets[index] = unsafe { head.as_ptr().cast::<*mut u8>().read() };
        Some(head)
    }

    fn push(&mut self, chunk: usize, p: NonNull<u8>) {
        let index = bucket_index(chunk);
        // SAFETY: as for pop; p is now free and owned by the bucket.
        unsafe { p.as_ptr().cast::<*mut u8>().write(self.buckets[index]) };
        self.buckets[index] = p.as_ptr();
    }

    fn allocate_emergency(&mut self, size: usize) -> Result<NonNull<u8>, MemoryError> {
        if size == 0 {
            return Err(MemoryError::BadArgument);
        }
        let rounded = emergency_size(size).ok_or(MemoryError::EmergencyLimit)?;
        if self.emergency_limit < rounded || self.emergency_limit - rounded < self.emergency_size {
            return Err(MemoryError::EmergencyLimit);
        }
        let area = self.emergency.as_mut().ok_or(MemoryError::EmergencyLimit)?;
        // SAFETY: the emergency list only holds regions of the emergency area.
        let p = unsafe { area.free.search(rounded, EMERGENCY_BLOCK_SIZE, true) }
            .ok_or(MemoryError::EmergencyLimit)?;
        self.emergency_size += rounded;
        Ok(p)
    }

    fn free_emergency(&mut self, p: NonNull<u8>, size: usize) -> Result<(), MemoryError> {
        let rounded = emergency_size(size).ok_or(MemoryError::FreeUnAllocated)?;
        let area = self
            .emergency
            .as_mut()
            .filter(|area| area.contains(p))
            .ok_or(MemoryError::NotFreeEmergencyArea)?;
        if rounded > self.emergency_size {
            return Err(MemoryError::FreeUnAllocated);
        }
        // SAFETY: p lies in the emergency area and the caller guarantees the size.
        unsafe { area.free.chain(p, rounded, EMERGENCY_BLOCK_SIZE, |_, _| true)? };
        self.emergency_size -= rounded;
        Ok(())
    }

    fn set_emergency_limit(&mut self, kb: usize) -> Result<(), MemoryError> {
        let bytes = round_up(kb_to_bytes(kb)?, EMERGENCY_BLOCK_SIZE)
            .ok_or(MemoryError::BadArgument)?;
        if bytes == self.emergency_limit && (bytes == 0 || self.emergency.is_some()) {
            return Ok(());
        }
        if self.emergency_size > 0 {
            return Err(MemoryError::EmergencyAreaUsed);
        }

        self.release_emergency_area();

        if bytes > 0 {
            let layout =
                Layout::from_size_align(bytes, OS_ALIGN).map_err(|_| MemoryError::OsAlloc)?;
            // SAFETY: layout has a non zero size.
            let base = NonNull::new(unsafe { alloc::alloc(layout) }).ok_or(MemoryError::OsAlloc)?;
            let mut free = CellList::default();
            // SAFETY: base is a fresh allocation of `bytes` bytes.
            unsafe { free.chain(base, bytes, EMERGENCY_BLOCK_SIZE, |_, _| true)? };
            self.emergency = Some(EmergencyArea { base, layout, free });
        }
        self.emergency_limit = bytes;
        tracing::info!(emergency_limit = bytes, "reserved emergency area");
        Ok(())
    }

    fn release_emergency_area(&mut self) {
        if let Some(mut area) = self.emergency.take() {
            area.free.clear();
            // SAFETY: the area was allocated with this layout and nothing is checked out.
            unsafe { alloc::dealloc(area.base.as_ptr(), area.layout) };
        }
    }
}

fn same_segment(segments: &BTreeMap<usize, Layout>, lo: usize, hi: usize) -> bool {
    segments
        .range(..=lo)
        .next_back()
        .is_some_and(|(start, layout)| hi < start + layout.size())
}

impl Drop for PoolState {
    fn drop(&mut self) {
        self.free_blocks.clear();
        self.buckets = [ptr::null_mut(); BUCKET_COUNT];
        for (addr, layout) in std::mem::take(&mut self.segments) {
            // SAFETY: every segment was allocated by us with this layout.
            unsafe { alloc::dealloc(addr as *mut u8, layout) };
        }
        self.release_emergency_area();
    }
}
