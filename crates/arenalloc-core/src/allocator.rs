//! First-fit heap allocator.
//!
//! [`HeapAllocator`] hands out byte runs from a fixed-size arena. Occupancy
//! is tracked per byte with a countdown (see [`crate::occupancy`]), the search
//! is a single first-fit pass from the arena start, and every operation runs
//! under one per-instance `parking_lot::Mutex`.

use std::collections::BTreeSet;
use std::ptr::NonNull;

use parking_lot::Mutex;
use serde::Serialize;

use crate::config::HeapConfig;
use crate::error::HeapError;
use crate::log::{Event, HeapLogLevel, HeapLogRecord, Journal, Snapshot};
use crate::occupancy;
use crate::region::{BackingKind, Region, Storage};
use crate::static_heap::StaticHeap;

/// Where `init` takes its storage from.
#[derive(Debug, Clone, Copy)]
pub enum Backing {
    /// A fresh arena of exactly the requested capacity, released at teardown.
    Dynamic,
    /// The given static heap. Only one allocator may hold it at a time; the
    /// storage is zeroed and handed back at teardown, never released.
    Static(&'static StaticHeap),
}

impl Backing {
    /// The process-wide static heap.
    #[must_use]
    pub fn global_static() -> Self {
        Self::Static(StaticHeap::global())
    }
}

/// Point-in-time allocator statistics.
///
/// `used_bytes` is the number of occupied arena bytes. `live_blocks` counts
/// blocks whose base byte is still allocated; under
/// [`crate::FreePolicy::Compat`] a block whose tail was freed from an interior
/// address still counts, and its orphaned head stays in `used_bytes`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HeapStats {
    pub backing: BackingKind,
    pub capacity: usize,
    pub used_bytes: usize,
    pub free_bytes: usize,
    pub live_blocks: usize,
    pub largest_free_run: usize,
    pub allocations: u64,
    pub frees: u64,
    pub failed_allocations: u64,
    pub rejected_frees: u64,
}

/// Storage plus accounting for an initialized allocator.
#[derive(Debug)]
struct HeapState {
    storage: Storage,
    capacity: usize,
    used_bytes: usize,
    /// Base offsets of live blocks.
    bases: BTreeSet<usize>,
    allocations: u64,
    frees: u64,
    failed_allocations: u64,
    rejected_frees: u64,
}

impl HeapState {
    fn new(storage: Storage, capacity: usize) -> Self {
        Self {
            storage,
            capacity,
            used_bytes: 0,
            bases: BTreeSet::new(),
            allocations: 0,
            frees: 0,
            failed_allocations: 0,
            rejected_frees: 0,
        }
    }

    fn region(&self) -> &Region {
        self.storage.region()
    }

    fn table(&self) -> &[usize] {
        &self.storage.region().table[..self.capacity]
    }

    fn table_mut(&mut self) -> &mut [usize] {
        let capacity = self.capacity;
        &mut self.storage.region_mut().table[..capacity]
    }

    /// Arena offset of `ptr`, if it falls inside the live capacity.
    fn offset_of(&self, ptr: *const u8) -> Option<usize> {
        let offset = (ptr as usize).checked_sub(self.region().arena.base_addr())?;
        (offset < self.capacity).then_some(offset)
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            capacity: self.capacity,
            used_bytes: self.used_bytes,
            live_blocks: self.bases.len(),
        }
    }

    fn stats(&self) -> HeapStats {
        HeapStats {
            backing: self.storage.kind(),
            capacity: self.capacity,
            used_bytes: self.used_bytes,
            free_bytes: self.capacity - self.used_bytes,
            live_blocks: self.bases.len(),
            largest_free_run: occupancy::largest_free_run(self.table()),
            allocations: self.allocations,
            frees: self.frees,
            failed_allocations: self.failed_allocations,
            rejected_frees: self.rejected_frees,
        }
    }

    /// Scrub the live prefix and give the storage up.
    fn release(self) {
        match self.storage {
            Storage::Dynamic(mut region) => region.zero_prefix(self.capacity),
            // The lease scrubs on its way back to the static heap.
            Storage::Static(lease) => drop(lease),
        }
    }
}

#[derive(Debug)]
struct Inner {
    heap: Option<HeapState>,
    journal: Journal,
}

/// Thread-safe first-fit allocator over a fixed-size byte arena.
///
/// Created uninitialized; [`HeapAllocator::init`] attaches storage and
/// [`HeapAllocator::teardown`] detaches it again. Every public method takes
/// the instance lock for its whole duration, so concurrent callers are fully
/// serialized.
///
/// Addresses returned by [`HeapAllocator::allocate`] stay valid until they
/// are freed or the allocator is torn down. Reading and writing through them
/// is up to the caller; [`HeapAllocator::write_block`] and
/// [`HeapAllocator::read_block`] do it safely under the lock.
#[derive(Debug)]
pub struct HeapAllocator {
    config: HeapConfig,
    inner: Mutex<Inner>,
}

impl HeapAllocator {
    /// An uninitialized allocator with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(HeapConfig::default())
    }

    /// An uninitialized allocator with the given configuration.
    #[must_use]
    pub fn with_config(config: HeapConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                heap: None,
                journal: Journal::new(config.journal_capacity),
            }),
        }
    }

    /// Create and initialize in one step.
    pub fn with_capacity(capacity: usize, backing: Backing) -> Result<Self, HeapError> {
        let allocator = Self::new();
        allocator.init(capacity, backing)?;
        Ok(allocator)
    }

    #[must_use]
    pub fn config(&self) -> HeapConfig {
        self.config
    }

    /// Attach `capacity` bytes of storage from `backing`.
    ///
    /// Both the arena and the occupancy table are zeroed on success. On
    /// failure nothing stays reserved and the allocator remains
    /// uninitialized.
    pub fn init(&self, capacity: usize, backing: Backing) -> Result<(), HeapError> {
        let mut guard = self.inner.lock();
        let Inner { heap, journal } = &mut *guard;

        if let Some(state) = heap.as_ref() {
            journal.record(
                Event::new(HeapLogLevel::Warn, "init", "already_initialized", "denied")
                    .size(capacity),
                state.snapshot(),
            );
            return Err(HeapError::AlreadyInitialized);
        }

        let storage = match backing {
            Backing::Dynamic => Region::acquire(capacity).map(Storage::Dynamic),
            Backing::Static(static_heap) => static_heap.lease(capacity).map(Storage::Static),
        };

        match storage {
            Ok(storage) => {
                let kind = storage.kind();
                let state = heap.insert(HeapState::new(storage, capacity));
                journal.record(
                    Event::new(HeapLogLevel::Info, "init", "init", "success")
                        .size(capacity)
                        .details(format!(
                            "backing={} free_policy={}",
                            kind.as_str(),
                            self.config.free_policy.as_str()
                        )),
                    state.snapshot(),
                );
                Ok(())
            }
            Err(err) => {
                let level = match err {
                    HeapError::ArenaUnavailable { .. } | HeapError::TableUnavailable { .. } => {
                        HeapLogLevel::Error
                    }
                    _ => HeapLogLevel::Warn,
                };
                journal.record(
                    Event::new(level, "init", "init_failed", "denied")
                        .size(capacity)
                        .details(err.to_string()),
                    Snapshot::default(),
                );
                Err(err)
            }
        }
    }

    /// Reserve `size` contiguous bytes, first fit from the arena start.
    ///
    /// Returns `None` for `size == 0`, an uninitialized allocator, or when no
    /// free run is long enough.
    #[must_use]
    pub fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        self.try_allocate(size).ok()
    }

    /// [`HeapAllocator::allocate`] with the reason for failure.
    pub fn try_allocate(&self, size: usize) -> Result<NonNull<u8>, HeapError> {
        let mut guard = self.inner.lock();
        let Inner { heap, journal } = &mut *guard;

        let Some(state) = heap.as_mut() else {
            journal.record(
                Event::new(HeapLogLevel::Warn, "allocate", "not_initialized", "denied").size(size),
                Snapshot::default(),
            );
            return Err(HeapError::NotInitialized);
        };

        if size == 0 {
            state.failed_allocations += 1;
            journal.record(
                Event::new(HeapLogLevel::Debug, "allocate", "zero_size", "denied").size(0),
                state.snapshot(),
            );
            return Err(HeapError::ZeroSize);
        }

        let Some(base) = occupancy::find_first_fit(state.table(), size) else {
            let largest_free_run = occupancy::largest_free_run(state.table());
            state.failed_allocations += 1;
            journal.record(
                Event::new(HeapLogLevel::Warn, "allocate", "exhausted", "oom")
                    .size(size)
                    .details(format!(
                        "largest_free_run={largest_free_run} free_bytes={}",
                        state.capacity - state.used_bytes
                    )),
                state.snapshot(),
            );
            return Err(HeapError::Exhausted {
                requested: size,
                largest_free_run,
            });
        };

        occupancy::mark_block(state.table_mut(), base, size);
        state.used_bytes += size;
        state.bases.insert(base);
        state.allocations += 1;
        journal.record(
            Event::new(HeapLogLevel::Trace, "allocate", "alloc", "success")
                .offset(base)
                .size(size),
            state.snapshot(),
        );
        Ok(state.region().arena.ptr_at(base))
    }

    /// Release the block at `ptr`.
    ///
    /// Returns false only for addresses outside the arena (or, under
    /// [`crate::FreePolicy::Checked`], addresses that are not a block base).
    pub fn free(&self, ptr: *const u8) -> bool {
        self.try_free(ptr).is_ok()
    }

    /// [`HeapAllocator::free`] returning the number of occupied bytes released.
    ///
    /// The countdown at `ptr` decides how many bytes are cleared. Under the
    /// default policy an interior address clears only the tail of its block
    /// and an already-free byte clears nothing; both still succeed.
    pub fn try_free(&self, ptr: *const u8) -> Result<usize, HeapError> {
        let mut guard = self.inner.lock();
        let Inner { heap, journal } = &mut *guard;

        let Some(state) = heap.as_mut() else {
            journal.record(
                Event::new(HeapLogLevel::Warn, "free", "not_initialized", "ignored"),
                Snapshot::default(),
            );
            return Err(HeapError::NotInitialized);
        };

        let Some(offset) = state.offset_of(ptr) else {
            state.rejected_frees += 1;
            journal.record(
                Event::new(HeapLogLevel::Warn, "free", "out_of_range", "ignored")
                    .details(format!("addr={:#x}", ptr as usize)),
                state.snapshot(),
            );
            return Err(HeapError::OutOfRange);
        };

        let countdown = state.table()[offset];
        let is_base = state.bases.contains(&offset);
        if self.config.free_policy.requires_base() && !is_base {
            state.rejected_frees += 1;
            let (event, err) = if countdown == 0 {
                ("unallocated_free", HeapError::Unallocated { offset })
            } else {
                ("interior_free", HeapError::NotBlockBase { offset })
            };
            journal.record(
                Event::new(HeapLogLevel::Warn, "free", event, "rejected")
                    .offset(offset)
                    .details("free_policy=checked"),
                state.snapshot(),
            );
            return Err(err);
        }

        let cleared = occupancy::clear_from(state.table_mut(), offset);
        state.region().arena.zero_range(offset, cleared.len);
        if cleared.occupied > 0 {
            state.frees += 1;
        }
        // Every base inside the span is gone, including blocks allocated
        // into the freed tail of an orphaned head.
        let doomed: Vec<usize> = state
            .bases
            .range(offset..offset + cleared.len)
            .copied()
            .collect();
        for base in &doomed {
            state.bases.remove(base);
        }

        match state.used_bytes.checked_sub(cleared.occupied) {
            Some(next) => state.used_bytes = next,
            None => {
                state.used_bytes = 0;
                journal.record(
                    Event::new(HeapLogLevel::Error, "free", "invariant_used_bytes_underflow", "recovered")
                        .offset(offset)
                        .size(cleared.occupied),
                    state.snapshot(),
                );
            }
        }

        let event = if cleared.occupied == 0 {
            Event::new(HeapLogLevel::Info, "free", "free_unallocated", "noop")
        } else if !is_base {
            Event::new(HeapLogLevel::Warn, "free", "partial_free", "success")
                .details("head_of_block_left_allocated")
        } else if doomed.len() > 1 || cleared.occupied < cleared.len {
            Event::new(HeapLogLevel::Warn, "free", "orphan_span_free", "success").details(format!(
                "span={} blocks_cleared={}",
                cleared.len,
                doomed.len()
            ))
        } else {
            Event::new(HeapLogLevel::Trace, "free", "free", "success")
        };
        journal.record(event.offset(offset).size(cleared.occupied), state.snapshot());
        Ok(cleared.occupied)
    }

    /// Copy `data` into the live block bytes starting at `ptr`.
    pub fn write_block(&self, ptr: *const u8, data: &[u8]) -> Result<(), HeapError> {
        let guard = self.inner.lock();
        let state = guard.heap.as_ref().ok_or(HeapError::NotInitialized)?;
        let (offset, available) = live_span(state, ptr)?;
        if data.len() > available {
            return Err(HeapError::BlockOverflow {
                len: data.len(),
                available,
            });
        }
        state.region().arena.write_at(offset, data);
        Ok(())
    }

    /// Copy out the live block bytes from `ptr` to the end of its block.
    pub fn read_block(&self, ptr: *const u8) -> Result<Vec<u8>, HeapError> {
        let guard = self.inner.lock();
        let state = guard.heap.as_ref().ok_or(HeapError::NotInitialized)?;
        let (offset, available) = live_span(state, ptr)?;
        Ok(state.region().arena.read_at(offset, available))
    }

    /// Zero the arena and table and give the storage up.
    ///
    /// Dynamic storage is released; static storage goes back to its
    /// [`StaticHeap`]. The allocator is uninitialized afterwards and may be
    /// initialized again.
    pub fn teardown(&self) {
        let mut guard = self.inner.lock();
        let Inner { heap, journal } = &mut *guard;

        match heap.take() {
            Some(state) => {
                let snapshot = state.snapshot();
                let details = format!(
                    "backing={} leaked_bytes={} allocations={} frees={}",
                    state.storage.kind().as_str(),
                    state.used_bytes,
                    state.allocations,
                    state.frees
                );
                state.release();
                journal.record(
                    Event::new(HeapLogLevel::Info, "teardown", "teardown", "released")
                        .size(snapshot.capacity)
                        .details(details),
                    snapshot,
                );
            }
            None => journal.record(
                Event::new(HeapLogLevel::Debug, "teardown", "teardown_uninitialized", "noop"),
                Snapshot::default(),
            ),
        }
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.inner.lock().heap.is_some()
    }

    /// Arena capacity, if initialized.
    #[must_use]
    pub fn capacity(&self) -> Option<usize> {
        self.inner.lock().heap.as_ref().map(|state| state.capacity)
    }

    #[must_use]
    pub fn backing_kind(&self) -> Option<BackingKind> {
        self.inner.lock().heap.as_ref().map(|state| state.storage.kind())
    }

    /// Returns true if `ptr` lies inside the live arena.
    #[must_use]
    pub fn contains(&self, ptr: *const u8) -> bool {
        self.inner
            .lock()
            .heap
            .as_ref()
            .is_some_and(|state| state.offset_of(ptr).is_some())
    }

    /// Countdown at `ptr`: the block size at a base, the remaining block
    /// bytes at an interior address. `None` for free or foreign addresses.
    #[must_use]
    pub fn block_len(&self, ptr: *const u8) -> Option<usize> {
        let guard = self.inner.lock();
        let state = guard.heap.as_ref()?;
        let offset = state.offset_of(ptr)?;
        let countdown = state.table()[offset];
        (countdown != 0).then_some(countdown)
    }

    #[must_use]
    pub fn stats(&self) -> Option<HeapStats> {
        self.inner.lock().heap.as_ref().map(HeapState::stats)
    }

    /// Take all buffered lifecycle records, oldest first.
    pub fn drain_lifecycle_logs(&self) -> Vec<HeapLogRecord> {
        self.inner.lock().journal.drain()
    }

    /// Lifecycle records evicted because the journal was full.
    #[must_use]
    pub fn dropped_lifecycle_logs(&self) -> u64 {
        self.inner.lock().journal.dropped()
    }
}

impl Default for HeapAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for HeapAllocator {
    fn drop(&mut self) {
        let inner = self.inner.get_mut();
        if let Some(state) = inner.heap.take() {
            let snapshot = state.snapshot();
            state.release();
            inner.journal.record(
                Event::new(HeapLogLevel::Debug, "teardown", "teardown_on_drop", "released"),
                snapshot,
            );
        }
    }
}

/// Offset of `ptr` and the live bytes from there to the end of its block.
fn live_span(state: &HeapState, ptr: *const u8) -> Result<(usize, usize), HeapError> {
    let offset = state.offset_of(ptr).ok_or(HeapError::OutOfRange)?;
    match state.table()[offset] {
        0 => Err(HeapError::Unallocated { offset }),
        available => Ok((offset, available)),
    }
}
