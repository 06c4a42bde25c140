//! Process-wide static heap.
//!
//! A [`StaticHeap`] is a fixed-maximum arena + occupancy table meant to live
//! in a `static` and be lent to one allocator at a time. Storage is reserved
//! on the first lease and kept for the life of the heap; teardown zeroes the
//! borrowed prefix and hands the storage back rather than releasing it.
//!
//! Allocators name the heap they borrow explicitly through
//! [`crate::Backing::Static`]. [`StaticHeap::global`] is the shared
//! process-wide instance sized to [`STATIC_HEAP_SIZE`].

use std::mem::ManuallyDrop;

use parking_lot::Mutex;

use crate::error::HeapError;
use crate::region::Region;
use crate::units;

/// Maximum capacity of the process-wide static heap.
pub const STATIC_HEAP_SIZE: usize = units::mib(5);

static GLOBAL_STATIC_HEAP: StaticHeap = StaticHeap::new();

#[derive(Debug)]
enum Slot {
    /// Storage has never been reserved.
    Unreserved,
    /// Reserved, zeroed, and free to lease.
    Available(Region),
    /// Lent to an allocator.
    Leased,
}

/// Fixed-size storage lent to at most one allocator at a time.
#[derive(Debug)]
pub struct StaticHeap {
    max_capacity: usize,
    slot: Mutex<Slot>,
}

impl StaticHeap {
    /// A heap with the default [`STATIC_HEAP_SIZE`] maximum.
    #[must_use]
    pub const fn new() -> Self {
        Self::with_max_capacity(STATIC_HEAP_SIZE)
    }

    /// A heap with a custom maximum, for statics sized to a workload.
    #[must_use]
    pub const fn with_max_capacity(max_capacity: usize) -> Self {
        Self {
            max_capacity,
            slot: parking_lot::const_mutex(Slot::Unreserved),
        }
    }

    /// The process-wide static heap.
    #[must_use]
    pub fn global() -> &'static StaticHeap {
        &GLOBAL_STATIC_HEAP
    }

    #[must_use]
    pub fn max_capacity(&self) -> usize {
        self.max_capacity
    }

    /// Returns true while an allocator holds the storage.
    #[must_use]
    pub fn is_leased(&self) -> bool {
        matches!(*self.slot.lock(), Slot::Leased)
    }

    /// Returns true once storage has been reserved.
    #[must_use]
    pub fn is_reserved(&self) -> bool {
        !matches!(*self.slot.lock(), Slot::Unreserved)
    }

    /// Lend the storage for an allocator of `capacity` bytes.
    ///
    /// The first `capacity` arena bytes and table entries are zeroed before
    /// the lease is returned, and again when it is given back.
    pub(crate) fn lease(&'static self, capacity: usize) -> Result<StaticLease, HeapError> {
        if capacity == 0 {
            return Err(HeapError::ZeroCapacity);
        }
        if capacity > self.max_capacity {
            return Err(HeapError::StaticCapacityExceeded {
                requested: capacity,
                max: self.max_capacity,
            });
        }

        let mut slot = self.slot.lock();
        let mut region = match std::mem::replace(&mut *slot, Slot::Leased) {
            Slot::Available(region) => region,
            Slot::Unreserved => match Region::acquire(self.max_capacity) {
                Ok(region) => region,
                Err(err) => {
                    *slot = Slot::Unreserved;
                    return Err(err);
                }
            },
            Slot::Leased => return Err(HeapError::StaticBackingInUse),
        };
        region.zero_prefix(capacity);

        Ok(StaticLease {
            heap: self,
            region: ManuallyDrop::new(region),
            capacity,
        })
    }

    fn give_back(&self, mut region: Region, capacity: usize) {
        region.zero_prefix(capacity);
        *self.slot.lock() = Slot::Available(region);
    }
}

impl Default for StaticHeap {
    fn default() -> Self {
        Self::new()
    }
}

/// Exclusive use of a [`StaticHeap`]'s storage. Returned to the heap on drop.
#[derive(Debug)]
pub(crate) struct StaticLease {
    heap: &'static StaticHeap,
    /// Moved back into the heap in `drop`, never dropped in place.
    region: ManuallyDrop<Region>,
    capacity: usize,
}

impl StaticLease {
    pub(crate) fn region(&self) -> &Region {
        &self.region
    }

    pub(crate) fn region_mut(&mut self) -> &mut Region {
        &mut self.region
    }
}

impl Drop for StaticLease {
    #[allow(unsafe_code)]
    fn drop(&mut self) {
        // SAFETY: `region` is taken exactly once, here, and the lease is
        // never touched again.
        let region = unsafe { ManuallyDrop::take(&mut self.region) };
        self.heap.give_back(region, self.capacity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_is_reserved_lazily() {
        static HEAP: StaticHeap = StaticHeap::with_max_capacity(64);
        assert!(!HEAP.is_reserved());
        let lease = HEAP.lease(16).unwrap();
        assert!(HEAP.is_reserved());
        assert!(HEAP.is_leased());
        assert_eq!(lease.region().len(), 64);
        drop(lease);
        assert!(HEAP.is_reserved());
        assert!(!HEAP.is_leased());
    }

    #[test]
    fn capacity_above_maximum_is_refused() {
        static HEAP: StaticHeap = StaticHeap::with_max_capacity(64);
        assert_eq!(
            HEAP.lease(65).unwrap_err(),
            HeapError::StaticCapacityExceeded {
                requested: 65,
                max: 64
            }
        );
        assert!(!HEAP.is_reserved());
        assert!(HEAP.lease(64).is_ok());
    }

    #[test]
    fn second_lease_is_refused_until_first_returns() {
        static HEAP: StaticHeap = StaticHeap::with_max_capacity(32);
        let first = HEAP.lease(32).unwrap();
        assert_eq!(HEAP.lease(8).unwrap_err(), HeapError::StaticBackingInUse);
        drop(first);
        assert!(HEAP.lease(8).is_ok());
    }

    #[test]
    fn storage_is_reused_and_zeroed_between_leases() {
        static HEAP: StaticHeap = StaticHeap::with_max_capacity(16);
        let mut lease = HEAP.lease(8).unwrap();
        let first_base = lease.region().arena.base_addr();
        lease.region().arena.write_at(0, &[0xAB; 8]);
        lease.region_mut().table[..8].fill(3);
        drop(lease);

        let lease = HEAP.lease(16).unwrap();
        assert_eq!(lease.region().arena.base_addr(), first_base);
        assert!(lease.region().arena.read_at(0, 16).iter().all(|&b| b == 0));
        assert!(lease.region().table.iter().all(|&v| v == 0));
    }

    #[test]
    fn global_heap_uses_default_size() {
        assert_eq!(StaticHeap::global().max_capacity(), STATIC_HEAP_SIZE);
        assert_eq!(STATIC_HEAP_SIZE, 5 * 1024 * 1024);
    }
}
