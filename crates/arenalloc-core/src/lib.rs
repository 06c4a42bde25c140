//! # arenalloc-core
//!
//! A thread-safe first-fit heap allocator over a single fixed-size byte
//! arena.
//!
//! Each arena byte has a matching occupancy entry holding a countdown: the
//! number of block bytes from that byte to the end of its block, or zero when
//! free. Storage comes either from a fresh dynamic reservation or from a
//! [`StaticHeap`] lent to one allocator at a time.
//!
//! ```
//! use arenalloc_core::{Backing, HeapAllocator, units};
//!
//! let heap = HeapAllocator::with_capacity(units::kib(4), Backing::Dynamic).unwrap();
//! let block = heap.allocate(128).unwrap();
//! heap.write_block(block.as_ptr(), b"hello").unwrap();
//! assert!(heap.free(block.as_ptr()));
//! heap.teardown();
//! ```
//!
//! Unsafe code is confined to the raw arena buffer and the hand-back of a
//! static lease.

#![deny(unsafe_code)]

pub mod allocator;
pub mod config;
pub mod error;
pub mod log;
pub mod occupancy;
mod raw;
mod region;
pub mod static_heap;
pub mod units;

pub use allocator::{Backing, HeapAllocator, HeapStats};
pub use config::{FreePolicy, HeapConfig};
pub use error::HeapError;
pub use log::{HeapLogLevel, HeapLogRecord};
pub use region::BackingKind;
pub use static_heap::{STATIC_HEAP_SIZE, StaticHeap};
