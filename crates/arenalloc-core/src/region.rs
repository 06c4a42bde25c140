//! Arena + occupancy table pairs, and the backing they come from.

use crate::error::HeapError;
use crate::raw::RawBuffer;
use crate::static_heap::StaticLease;

/// An arena and its occupancy table, allocated together.
///
/// The table always has as many entries as the arena has bytes. An
/// allocator may use only a prefix of both (static backing).
#[derive(Debug)]
pub(crate) struct Region {
    pub(crate) arena: RawBuffer,
    pub(crate) table: Vec<usize>,
}

impl Region {
    /// Reserve a zeroed region of `capacity` bytes.
    pub(crate) fn acquire(capacity: usize) -> Result<Self, HeapError> {
        Self::acquire_with(capacity, zeroed_table)
    }

    /// [`Region::acquire`] with the table reservation supplied by the caller.
    ///
    /// The arena is reserved first. If the table then fails, `arena` goes out
    /// of scope at the `?` and `RawBuffer::drop` releases it before the error
    /// reaches the caller.
    fn acquire_with(
        capacity: usize,
        table: impl FnOnce(usize) -> Option<Vec<usize>>,
    ) -> Result<Self, HeapError> {
        if capacity == 0 {
            return Err(HeapError::ZeroCapacity);
        }
        let arena = RawBuffer::zeroed(capacity).ok_or(HeapError::ArenaUnavailable { capacity })?;
        let table = table(capacity).ok_or(HeapError::TableUnavailable { capacity })?;
        Ok(Self { arena, table })
    }

    #[must_use]
    pub(crate) fn len(&self) -> usize {
        self.arena.len()
    }

    /// Zero the first `len` arena bytes and table entries.
    pub(crate) fn zero_prefix(&mut self, len: usize) {
        self.arena.zero_range(0, len);
        self.table[..len].fill(0);
    }
}

fn zeroed_table(capacity: usize) -> Option<Vec<usize>> {
    let mut table = Vec::new();
    table.try_reserve_exact(capacity).ok()?;
    table.resize(capacity, 0);
    Some(table)
}

/// Where an initialized allocator's storage lives.
#[derive(Debug)]
pub(crate) enum Storage {
    Dynamic(Region),
    Static(StaticLease),
}

impl Storage {
    pub(crate) fn region(&self) -> &Region {
        match self {
            Self::Dynamic(region) => region,
            Self::Static(lease) => lease.region(),
        }
    }

    pub(crate) fn region_mut(&mut self) -> &mut Region {
        match self {
            Self::Dynamic(region) => region,
            Self::Static(lease) => lease.region_mut(),
        }
    }

    pub(crate) fn kind(&self) -> BackingKind {
        match self {
            Self::Dynamic(_) => BackingKind::Dynamic,
            Self::Static(_) => BackingKind::Static,
        }
    }
}

/// Which kind of storage backs an allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackingKind {
    Dynamic,
    Static,
}

impl BackingKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Dynamic => "dynamic",
            Self::Static => "static",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_zeroes_both_halves() {
        let region = Region::acquire(32).unwrap();
        assert_eq!(region.len(), 32);
        assert_eq!(region.table.len(), 32);
        assert!(region.table.iter().all(|&v| v == 0));
        assert!(region.arena.read_at(0, 32).iter().all(|&b| b == 0));
    }

    #[test]
    fn acquire_rejects_zero_capacity() {
        assert_eq!(Region::acquire(0).unwrap_err(), HeapError::ZeroCapacity);
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn acquire_reports_arena_failure() {
        let capacity = 1_usize << 62;
        assert_eq!(
            Region::acquire(capacity).unwrap_err(),
            HeapError::ArenaUnavailable { capacity }
        );
    }

    #[test]
    fn table_failure_is_reported_after_arena_succeeds() {
        let mut arena_seen = false;
        let err = Region::acquire_with(64, |capacity| {
            arena_seen = true;
            assert_eq!(capacity, 64);
            None
        })
        .unwrap_err();
        assert!(arena_seen);
        assert_eq!(err, HeapError::TableUnavailable { capacity: 64 });

        // The released arena leaves nothing behind that blocks a retry.
        let region = Region::acquire_with(64, zeroed_table).unwrap();
        assert_eq!(region.table.len(), 64);
    }

    #[test]
    fn table_reservation_overflow_is_refused() {
        assert!(zeroed_table(usize::MAX).is_none());
    }

    #[test]
    fn zero_prefix_leaves_tail_alone() {
        let mut region = Region::acquire(8).unwrap();
        region.arena.write_at(0, &[9; 8]);
        region.table.fill(7);
        region.zero_prefix(5);
        assert_eq!(region.arena.read_at(0, 8), vec![0, 0, 0, 0, 0, 9, 9, 9]);
        assert_eq!(region.table, vec![0, 0, 0, 0, 0, 7, 7, 7]);
    }
}
