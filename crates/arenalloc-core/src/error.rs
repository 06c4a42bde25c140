//! Heap error types.

use thiserror::Error;

/// Why a heap operation was refused.
///
/// The boolean/`Option` surface of [`crate::HeapAllocator`] collapses these;
/// the `try_*` methods return them as-is.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HeapError {
    #[error("heap capacity must be non-zero")]
    ZeroCapacity,
    #[error("requested {requested} bytes exceeds the static heap maximum of {max} bytes")]
    StaticCapacityExceeded { requested: usize, max: usize },
    #[error("static heap storage is leased by another allocator")]
    StaticBackingInUse,
    #[error("could not reserve a {capacity}-byte arena")]
    ArenaUnavailable { capacity: usize },
    #[error("could not reserve a {capacity}-entry occupancy table")]
    TableUnavailable { capacity: usize },
    #[error("allocator is already initialized")]
    AlreadyInitialized,
    #[error("allocator is not initialized")]
    NotInitialized,
    #[error("zero-byte allocation requested")]
    ZeroSize,
    #[error("no free run of {requested} bytes (largest free run is {largest_free_run} bytes)")]
    Exhausted {
        requested: usize,
        largest_free_run: usize,
    },
    #[error("address is outside the arena")]
    OutOfRange,
    #[error("arena offset {offset} is inside a block, not at its base")]
    NotBlockBase { offset: usize },
    #[error("arena offset {offset} is not part of a live block")]
    Unallocated { offset: usize },
    #[error("{len} bytes do not fit in a block with {available} bytes available")]
    BlockOverflow { len: usize, available: usize },
}
