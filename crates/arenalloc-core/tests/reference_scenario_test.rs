use arenalloc_core::{Backing, BackingKind, HeapAllocator, HeapLogLevel, StaticHeap, units};

fn offset_of(heap_base: *const u8, ptr: *const u8) -> usize {
    ptr as usize - heap_base as usize
}

/// 512-byte dynamic heap: after freeing the first block, 128 reuses offset 0.
#[test]
fn dynamic_reference_walkthrough() {
    let heap = HeapAllocator::with_capacity(512, Backing::Dynamic).unwrap();

    let a = heap.allocate(256).unwrap();
    let b = heap.allocate(64).unwrap();
    let base = a.as_ptr().cast_const();
    assert_eq!(offset_of(base, b.as_ptr()), 256);

    assert!(heap.allocate(256).is_none());
    assert!(heap.free(a.as_ptr()));

    let c = heap.allocate(128).unwrap();
    assert_eq!(c.as_ptr().cast_const(), base);
    let d = heap.allocate(128).unwrap();
    assert_eq!(offset_of(base, d.as_ptr()), 128);

    let e = heap.allocate(192).unwrap();
    assert_eq!(offset_of(base, e.as_ptr()), 320);
    assert!(heap.allocate(1).is_none());

    let stats = heap.stats().unwrap();
    assert_eq!(stats.used_bytes, 512);
    assert_eq!(stats.live_blocks, 4);
    assert_eq!(stats.largest_free_run, 0);

    heap.teardown();
    assert!(!heap.is_initialized());
}

/// 1 KiB heap: 512, 256 fit; 512 does not; 256 fills the tail.
#[test]
fn kib_heap_rejects_oversized_then_fills_tail() {
    let heap = HeapAllocator::with_capacity(units::kib(1), Backing::Dynamic).unwrap();
    let a = heap.allocate(512).unwrap();
    let b = heap.allocate(256).unwrap();
    assert!(heap.allocate(512).is_none());
    let c = heap.allocate(256).unwrap();

    let base = a.as_ptr() as usize;
    assert_eq!(b.as_ptr() as usize - base, 512);
    assert_eq!(c.as_ptr() as usize - base, 768);

    assert!(heap.free(a.as_ptr()));
    assert!(heap.free(c.as_ptr()));
    assert!(heap.free(b.as_ptr()));
    let outside = [0_u8; 4];
    assert!(!heap.free(outside.as_ptr()));
    assert_eq!(heap.stats().unwrap().used_bytes, 0);
    assert!(heap.allocate(units::kib(1)).is_some());
}

#[test]
fn static_reference_walkthrough() {
    static HEAP: StaticHeap = StaticHeap::with_max_capacity(units::kib(2));

    let heap = HeapAllocator::new();
    heap.init(units::kib(1), Backing::Static(&HEAP)).unwrap();
    assert_eq!(heap.backing_kind(), Some(BackingKind::Static));
    assert_eq!(heap.capacity(), Some(1024));

    let a = heap.allocate(1000).unwrap();
    assert!(heap.allocate(25).is_none());
    let b = heap.allocate(24).unwrap();
    assert_eq!(b.as_ptr() as usize - a.as_ptr() as usize, 1000);
    heap.teardown();

    // Storage survives teardown and comes back zeroed at a larger size.
    heap.init(units::kib(2), Backing::Static(&HEAP)).unwrap();
    let c = heap.allocate(units::kib(2)).unwrap();
    assert_eq!(c, a);
    assert!(heap.read_block(c.as_ptr()).unwrap().iter().all(|&byte| byte == 0));
}

#[test]
fn fresh_blocks_read_as_zero_after_reuse() {
    let heap = HeapAllocator::with_capacity(64, Backing::Dynamic).unwrap();
    let a = heap.allocate(32).unwrap();
    heap.write_block(a.as_ptr(), &[0xA5; 32]).unwrap();
    assert!(heap.free(a.as_ptr()));

    let b = heap.allocate(16).unwrap();
    assert_eq!(b, a);
    assert_eq!(heap.read_block(b.as_ptr()).unwrap(), vec![0; 16]);
}

#[test]
fn lifecycle_journal_round_trips_through_json() {
    let heap = HeapAllocator::with_capacity(32, Backing::Dynamic).unwrap();
    let a = heap.allocate(8).unwrap();
    assert!(!heap.free(std::ptr::null()));
    assert!(heap.free(a.as_ptr()));
    heap.teardown();

    let logs = heap.drain_lifecycle_logs();
    assert_eq!(logs.first().map(|r| r.symbol), Some("init"));
    assert_eq!(logs.last().map(|r| r.symbol), Some("teardown"));
    let warn = logs
        .iter()
        .find(|r| r.level == HeapLogLevel::Warn)
        .expect("out-of-range free is logged");
    assert_eq!(warn.event, "out_of_range");

    for record in &logs {
        let line = serde_json::to_string(record).unwrap();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["decision_id"], record.decision_id);
        assert!(value["trace_id"].as_str().unwrap().contains(record.symbol));
    }
}
