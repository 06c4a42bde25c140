//! Occupancy table: per-byte countdown bookkeeping.
//!
//! Entry `i` describes arena byte `i`. Zero means free. A live block over
//! `[base, base + n)` stores `n, n - 1, ..., 1`, so the value at any byte is
//! the number of block bytes from there to the block's end, and the value at
//! the base is the block size.
//!
//! Everything here is a pure function over the live prefix of the table; the
//! allocator supplies the slice and holds the lock.

/// First-fit search for `size` contiguous free entries.
///
/// Walks forward from the start. A tentative run that hits an occupied entry
/// resumes at the first free entry at or after the collision. Returns the
/// base offset of the first run that fits.
#[must_use]
pub fn find_first_fit(table: &[usize], size: usize) -> Option<usize> {
    if size == 0 || size > table.len() {
        return None;
    }

    let end = table.len();
    let mut cursor = 0;
    while cursor < end {
        let base = cursor;
        let mut run = 0;
        while cursor < end && run < size && table[cursor] == 0 {
            cursor += 1;
            run += 1;
        }
        if run == size {
            return Some(base);
        }
        while cursor < end && table[cursor] != 0 {
            cursor += 1;
        }
    }
    None
}

/// Write the countdown for a block of `size` entries at `base`.
///
/// # Panics
///
/// Panics if the block does not fit in `table`.
pub fn mark_block(table: &mut [usize], base: usize, size: usize) {
    for (slot, remaining) in table[base..base + size].iter_mut().zip((1..=size).rev()) {
        *slot = remaining;
    }
}

/// Entries zeroed by [`clear_from`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cleared {
    /// Span length, taken from the countdown at the starting offset.
    pub len: usize,
    /// Entries in the span that were occupied before clearing.
    pub occupied: usize,
}

/// Clear the countdown starting at `offset`.
///
/// The value at `offset` decides the span, so clearing from an interior
/// byte only clears the tail of that block. A later block can land in that
/// freed tail; clearing from the orphaned head then wipes free entries and
/// the newer block too, so `occupied` can be smaller than `len`.
pub fn clear_from(table: &mut [usize], offset: usize) -> Cleared {
    let len = table[offset].min(table.len() - offset);
    let span = &mut table[offset..offset + len];
    let occupied = span.iter().filter(|&&v| v != 0).count();
    span.fill(0);
    Cleared { len, occupied }
}

/// Number of occupied entries.
#[must_use]
pub fn used_entries(table: &[usize]) -> usize {
    table.iter().filter(|&&v| v != 0).count()
}

/// Length of the longest run of free entries.
#[must_use]
pub fn largest_free_run(table: &[usize]) -> usize {
    let mut best = 0;
    let mut current = 0;
    for &value in table {
        if value == 0 {
            current += 1;
            best = best.max(current);
        } else {
            current = 0;
        }
    }
    best
}
