use arenalloc_core::{Backing, BackingKind, FreePolicy, HeapAllocator, HeapConfig, StaticHeap};
use arenalloc_harness::scenario::{self, ChurnConfig};
use arenalloc_harness::{HarnessError, LogEmitter, LogEntry, LogLevel};

#[test]
fn reference_passes_on_dynamic_backing() {
    let heap = HeapAllocator::new();
    let report = scenario::run_reference(&heap, Backing::Dynamic).unwrap();
    assert!(report.passed, "{report:#?}");
    assert_eq!(report.backing, BackingKind::Dynamic);
    assert_eq!(report.steps.len(), 8);

    let offsets: Vec<Option<usize>> = report.steps[..4].iter().map(|s| s.offset).collect();
    assert_eq!(offsets, vec![Some(0), Some(512), None, Some(768)]);
    assert!(!heap.is_initialized());
}

#[test]
fn reference_passes_on_static_backing() {
    static HEAP: StaticHeap = StaticHeap::with_max_capacity(scenario::REFERENCE_CAPACITY);
    let heap = HeapAllocator::new();
    let report = scenario::run_reference(&heap, Backing::Static(&HEAP)).unwrap();
    assert!(report.passed, "{report:#?}");
    assert_eq!(report.backing, BackingKind::Static);
    assert!(!HEAP.is_leased());
}

#[test]
fn reference_surfaces_init_failure() {
    static HEAP: StaticHeap = StaticHeap::with_max_capacity(512);
    let heap = HeapAllocator::new();
    let err = scenario::run_reference(&heap, Backing::Static(&HEAP)).unwrap_err();
    assert!(matches!(err, HarnessError::Heap(_)));
}

#[test]
fn reference_passes_under_checked_policy() {
    let heap =
        HeapAllocator::with_config(HeapConfig::default().with_free_policy(FreePolicy::Checked));
    assert!(scenario::run_reference(&heap, Backing::Dynamic).unwrap().passed);
}

#[test]
fn threads_against_one_kib() {
    let heap = HeapAllocator::new();
    let report = scenario::run_threads(&heap, 1024, &[512, 256, 2048]).unwrap();
    assert!(report.passed, "{report:#?}");
    assert_eq!(report.overlaps, 0);
    assert!(report.foreign_free_rejected);

    let granted: Vec<usize> = report
        .threads
        .iter()
        .filter(|t| t.offset.is_some())
        .map(|t| t.size)
        .collect();
    assert_eq!(granted, vec![512, 256]);
}

#[test]
fn threads_all_fit_in_a_larger_heap() {
    let heap = HeapAllocator::new();
    let report = scenario::run_threads(&heap, 4096, &[512, 256, 2048, 1024, 256]).unwrap();
    assert!(report.passed);
    assert!(report.threads.iter().all(|t| t.freed));
}

#[test]
fn threads_requires_sizes() {
    let heap = HeapAllocator::new();
    assert!(matches!(
        scenario::run_threads(&heap, 1024, &[]),
        Err(HarnessError::InvalidArgument(_))
    ));
}

#[test]
fn churn_is_clean_and_deterministic() {
    let config = ChurnConfig {
        seed: 0x5EED,
        ops: 4_000,
        capacity: 16 * 1024,
        max_size: 300,
    };
    let first = scenario::run_churn(&HeapAllocator::new(), config).unwrap();
    assert!(first.passed, "{:?}", first.violations);
    assert!(first.allocations > 0 && first.frees > 0);
    assert!(first.peak_used_bytes <= config.capacity);

    let second = scenario::run_churn(&HeapAllocator::new(), config).unwrap();
    assert_eq!(first.allocations, second.allocations);
    assert_eq!(first.frees, second.frees);
    assert_eq!(first.failed_allocations, second.failed_allocations);
}

#[test]
fn churn_under_pressure_records_failures_without_violations() {
    let config = ChurnConfig {
        seed: 42,
        ops: 2_000,
        capacity: 1024,
        max_size: 400,
    };
    let heap =
        HeapAllocator::with_config(HeapConfig::default().with_free_policy(FreePolicy::Checked));
    let report = scenario::run_churn(&heap, config).unwrap();
    assert!(report.passed, "{:?}", report.violations);
    assert!(report.failed_allocations > 0);
}

#[test]
fn heap_records_land_in_the_jsonl_log() {
    let heap = HeapAllocator::new();
    scenario::run_reference(&heap, Backing::Dynamic).unwrap();
    let records = heap.drain_lifecycle_logs();

    let path = std::env::temp_dir().join(format!(
        "arenalloc-scenario-{}.jsonl",
        std::process::id()
    ));
    {
        let mut emitter = LogEmitter::to_file(&path, "reference-test").unwrap();
        emitter
            .emit_entry(LogEntry::new("", LogLevel::Info, "scenario_start"))
            .unwrap();
        assert_eq!(emitter.emit_heap_records("reference", &records).unwrap(), records.len());
        emitter.flush().unwrap();
    }
    let text = std::fs::read_to_string(&path).unwrap();
    let _ = std::fs::remove_file(&path);

    let lines: Vec<serde_json::Value> = text
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(lines.len(), records.len() + 1);
    assert_eq!(lines[1]["symbol"], "init");
    assert_eq!(lines[1]["scenario"], "reference");
    assert!(lines.iter().any(|l| l["event"] == "exhausted" && l["level"] == "warn"));
    assert!(lines.iter().any(|l| l["event"] == "out_of_range"));
    assert_eq!(lines.last().unwrap()["symbol"], "teardown");
}
