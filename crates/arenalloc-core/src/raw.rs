//! Raw arena memory.
//!
//! The only place in the crate that touches the system allocator. Callers
//! write through pointers handed out by `allocate` while the heap zeroes
//! other blocks, so arena bytes are only ever reached through raw pointers,
//! never through a slice spanning the whole buffer.

#![allow(unsafe_code)]

use std::alloc::Layout;
use std::ptr::NonNull;

/// A zero-initialised heap buffer released on drop.
#[derive(Debug)]
pub(crate) struct RawBuffer {
    ptr: NonNull<u8>,
    len: usize,
}

// SAFETY: the buffer is uniquely owned; concurrent access is serialized by the
// allocator lock that owns it.
unsafe impl Send for RawBuffer {}

impl RawBuffer {
    /// Reserve `len` zeroed bytes. Returns `None` for `len == 0` or when the
    /// system allocator refuses.
    pub(crate) fn zeroed(len: usize) -> Option<Self> {
        if len == 0 {
            return None;
        }
        let layout = Layout::array::<u8>(len).ok()?;
        // SAFETY: layout has non-zero size.
        let raw = unsafe { std::alloc::alloc_zeroed(layout) };
        let ptr = NonNull::new(raw)?;
        Some(Self { ptr, len })
    }

    #[must_use]
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub(crate) fn base_addr(&self) -> usize {
        self.ptr.as_ptr() as usize
    }

    /// Pointer to the byte at `offset`.
    ///
    /// # Panics
    ///
    /// Panics if `offset` is outside the buffer.
    pub(crate) fn ptr_at(&self, offset: usize) -> NonNull<u8> {
        assert!(offset < self.len, "offset {offset} outside {}-byte buffer", self.len);
        // SAFETY: offset is in bounds of the allocation.
        unsafe { self.ptr.add(offset) }
    }

    /// Zero `len` bytes starting at `offset`.
    ///
    /// # Panics
    ///
    /// Panics if the range is not inside the buffer.
    pub(crate) fn zero_range(&self, offset: usize, len: usize) {
        self.check_range(offset, len);
        if len == 0 {
            return;
        }
        // SAFETY: range checked above; the allocator lock is held by the caller.
        unsafe { self.ptr.as_ptr().add(offset).write_bytes(0, len) };
    }

    /// Copy `src` into the buffer at `offset`.
    ///
    /// # Panics
    ///
    /// Panics if the destination range is not inside the buffer.
    pub(crate) fn write_at(&self, offset: usize, src: &[u8]) {
        self.check_range(offset, src.len());
        // SAFETY: destination checked above; `src` cannot alias the arena
        // mutably because arena bytes are never exposed as slices.
        unsafe {
            std::ptr::copy_nonoverlapping(src.as_ptr(), self.ptr.as_ptr().add(offset), src.len());
        }
    }

    /// Copy `len` bytes starting at `offset` out of the buffer.
    ///
    /// # Panics
    ///
    /// Panics if the range is not inside the buffer.
    pub(crate) fn read_at(&self, offset: usize, len: usize) -> Vec<u8> {
        self.check_range(offset, len);
        let mut out = vec![0_u8; len];
        // SAFETY: source checked above; `out` is a fresh allocation.
        unsafe {
            std::ptr::copy_nonoverlapping(self.ptr.as_ptr().add(offset), out.as_mut_ptr(), len);
        }
        out
    }

    fn check_range(&self, offset: usize, len: usize) {
        assert!(
            offset.checked_add(len).is_some_and(|end| end <= self.len),
            "range of {len} bytes at {offset} outside {}-byte buffer",
            self.len
        );
    }
}

impl Drop for RawBuffer {
    fn drop(&mut self) {
        // SAFETY: `zeroed` produced this pointer from a byte-array layout of
        // exactly `len` bytes, which was valid then and is valid now.
        unsafe {
            let layout = Layout::from_size_align_unchecked(self.len, 1);
            std::alloc::dealloc(self.ptr.as_ptr(), layout);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_length_is_refused() {
        assert!(RawBuffer::zeroed(0).is_none());
    }

    #[test]
    fn fresh_buffer_reads_zero() {
        let buf = RawBuffer::zeroed(64).unwrap();
        assert_eq!(buf.len(), 64);
        assert!(buf.read_at(0, 64).iter().all(|&b| b == 0));
    }

    #[test]
    fn write_then_zero_range() {
        let buf = RawBuffer::zeroed(16).unwrap();
        buf.write_at(4, &[1, 2, 3, 4, 5]);
        assert_eq!(buf.read_at(4, 5), vec![1, 2, 3, 4, 5]);
        buf.zero_range(5, 3);
        assert_eq!(buf.read_at(3, 7), vec![0, 1, 0, 0, 0, 5, 0]);
    }

    #[test]
    fn ptr_at_is_offset_from_base() {
        let buf = RawBuffer::zeroed(8).unwrap();
        assert_eq!(buf.ptr_at(0).as_ptr() as usize, buf.base_addr());
        assert_eq!(buf.ptr_at(7).as_ptr() as usize, buf.base_addr() + 7);
    }

    #[test]
    #[should_panic(expected = "outside")]
    fn ptr_at_past_end_panics() {
        let buf = RawBuffer::zeroed(8).unwrap();
        let _ = buf.ptr_at(8);
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn absurd_reservation_fails_cleanly() {
        // Far larger than any 48-bit address space.
        assert!(RawBuffer::zeroed(1_usize << 62).is_none());
    }
}
