//! Harness scenarios.
//!
//! Each scenario drives a caller-supplied [`HeapAllocator`] from init to
//! teardown and returns a serializable report. The allocator is borrowed so
//! the caller can drain its lifecycle journal afterwards.

use std::collections::BTreeMap;
use std::thread;

use arenalloc_core::{Backing, BackingKind, HeapAllocator, HeapStats, units};
use serde::Serialize;

use crate::error::HarnessError;

/// Parse a `--backing` value.
pub fn parse_backing(raw: &str) -> Result<Backing, HarnessError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "dynamic" => Ok(Backing::Dynamic),
        "static" => Ok(Backing::global_static()),
        other => Err(HarnessError::InvalidArgument(format!(
            "unknown backing `{other}` (expected `dynamic` or `static`)"
        ))),
    }
}

/// Parse a size like `512`, `4k`, `2m`, `1g` (binary multiples).
pub fn parse_size(raw: &str) -> Result<usize, HarnessError> {
    let raw = raw.trim().to_ascii_lowercase();
    let (digits, scale): (&str, fn(usize) -> Option<usize>) = match raw.as_bytes().last() {
        Some(b'k') => (&raw[..raw.len() - 1], units::checked_kib),
        Some(b'm') => (&raw[..raw.len() - 1], units::checked_mib),
        Some(b'g') => (&raw[..raw.len() - 1], units::checked_gib),
        _ => (raw.as_str(), Some),
    };
    let n: usize = digits
        .parse()
        .map_err(|_| HarnessError::InvalidArgument(format!("bad size `{raw}`")))?;
    scale(n).ok_or_else(|| HarnessError::InvalidArgument(format!("size `{raw}` overflows")))
}

// ---------------------------------------------------------------------------
// Reference walkthrough
// ---------------------------------------------------------------------------

pub const REFERENCE_CAPACITY: usize = units::kib(1);

/// One step of the reference walkthrough.
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub step: usize,
    pub op: &'static str,
    pub label: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,
    pub expected_ok: bool,
    pub ok: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReferenceReport {
    pub backing: BackingKind,
    pub capacity: usize,
    pub steps: Vec<StepReport>,
    /// Stats just before teardown.
    pub final_stats: Option<HeapStats>,
    pub passed: bool,
}

struct StepLog {
    base: usize,
    steps: Vec<StepReport>,
}

impl StepLog {
    fn push(
        &mut self,
        op: &'static str,
        label: &'static str,
        size: Option<usize>,
        addr: Option<usize>,
        expected_ok: bool,
        ok: bool,
    ) {
        self.steps.push(StepReport {
            step: self.steps.len() + 1,
            op,
            label,
            size,
            offset: addr.and_then(|a| a.checked_sub(self.base)),
            expected_ok,
            ok,
        });
    }
}

/// init(1 KiB); A=512, B=256, 512 fails, C=256; free A, C, B; foreign free fails.
pub fn run_reference(
    heap: &HeapAllocator,
    backing: Backing,
) -> Result<ReferenceReport, HarnessError> {
    heap.init(REFERENCE_CAPACITY, backing)?;
    let backing_kind = heap.backing_kind().unwrap_or(BackingKind::Dynamic);

    let a = heap.allocate(512);
    let mut log = StepLog {
        base: a.map_or(0, |p| p.as_ptr() as usize),
        steps: Vec::new(),
    };
    let addr = |p: Option<std::ptr::NonNull<u8>>| p.map(|p| p.as_ptr() as usize);

    log.push("allocate", "A", Some(512), addr(a), true, a.is_some());
    let b = heap.allocate(256);
    log.push("allocate", "B", Some(256), addr(b), true, b.is_some());
    let too_big = heap.allocate(512);
    log.push("allocate", "-", Some(512), addr(too_big), false, too_big.is_some());
    let c = heap.allocate(256);
    log.push("allocate", "C", Some(256), addr(c), true, c.is_some());

    for (label, block) in [("A", a), ("C", c), ("B", b)] {
        let ok = block.is_some_and(|p| heap.free(p.as_ptr()));
        log.push("free", label, None, addr(block), true, ok);
    }

    let foreign = [0_u8; 1];
    let ok = heap.free(foreign.as_ptr());
    log.push("free", "foreign", None, None, false, ok);

    let final_stats = heap.stats();
    heap.teardown();

    let passed = log.steps.iter().all(|s| s.ok == s.expected_ok)
        && final_stats.is_some_and(|s| s.used_bytes == 0);
    Ok(ReferenceReport {
        backing: backing_kind,
        capacity: REFERENCE_CAPACITY,
        steps: log.steps,
        final_stats,
        passed,
    })
}

// ---------------------------------------------------------------------------
// Contended threads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct ThreadOutcome {
    pub thread: usize,
    pub size: usize,
    pub offset: Option<usize>,
    pub freed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ThreadsReport {
    pub capacity: usize,
    pub threads: Vec<ThreadOutcome>,
    pub overlaps: usize,
    pub foreign_free_rejected: bool,
    pub final_stats: Option<HeapStats>,
    pub passed: bool,
}

/// One thread per entry of `sizes`, each allocating once, all released by a
/// barrier at the same time. Successful blocks are checked for overlap,
/// tagged, verified and freed.
pub fn run_threads(
    heap: &HeapAllocator,
    capacity: usize,
    sizes: &[usize],
) -> Result<ThreadsReport, HarnessError> {
    if sizes.is_empty() {
        return Err(HarnessError::InvalidArgument(
            "at least one request size is required".to_string(),
        ));
    }
    heap.init(capacity, Backing::Dynamic)?;
    let barrier = std::sync::Barrier::new(sizes.len());

    let grants: Vec<Option<usize>> = thread::scope(|scope| {
        let handles: Vec<_> = sizes
            .iter()
            .enumerate()
            .map(|(idx, &size)| {
                let barrier = &barrier;
                scope.spawn(move || {
                    barrier.wait();
                    let ptr = heap.allocate(size)?;
                    heap.write_block(ptr.as_ptr(), &vec![tag_for(idx); size]).ok()?;
                    Some(ptr.as_ptr() as usize)
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap_or(None))
            .collect()
    });

    let mut spans: Vec<(usize, usize)> = grants
        .iter()
        .zip(sizes)
        .filter_map(|(addr, &size)| addr.map(|a| (a, size)))
        .collect();
    spans.sort_unstable();
    let overlaps = spans
        .windows(2)
        .filter(|pair| pair[0].0 + pair[0].1 > pair[1].0)
        .count();
    let base = spans.first().map_or(0, |&(a, _)| a);

    let mut threads = Vec::with_capacity(sizes.len());
    for (idx, (&size, grant)) in sizes.iter().zip(&grants).enumerate() {
        let freed = grant.is_some_and(|addr| {
            let intact = heap
                .read_block(addr as *const u8)
                .is_ok_and(|bytes| bytes.iter().all(|&b| b == tag_for(idx)));
            intact && heap.free(addr as *const u8)
        });
        threads.push(ThreadOutcome {
            thread: idx,
            size,
            offset: grant.map(|addr| addr - base),
            freed,
        });
    }

    let foreign = 0_u64;
    let foreign_free_rejected = !heap.free(std::ptr::from_ref(&foreign).cast());
    let final_stats = heap.stats();
    heap.teardown();

    let passed = overlaps == 0
        && foreign_free_rejected
        && threads.iter().all(|t| t.offset.is_some() == t.freed)
        && final_stats.is_some_and(|s| s.used_bytes == 0 && s.live_blocks == 0);
    Ok(ThreadsReport {
        capacity,
        threads,
        overlaps,
        foreign_free_rejected,
        final_stats,
        passed,
    })
}

fn tag_for(idx: usize) -> u8 {
    (idx % 255) as u8 + 1
}

// ---------------------------------------------------------------------------
// Seeded churn
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug)]
struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    fn new(seed: u64) -> Self {
        // Zero is a fixed point of xorshift.
        Self {
            state: if seed == 0 { 0x9E37_79B9_7F4A_7C15 } else { seed },
        }
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }

    fn gen_range(&mut self, low: usize, high_inclusive: usize) -> usize {
        let span = high_inclusive - low + 1;
        low + (self.next_u64() as usize % span)
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ChurnConfig {
    pub seed: u64,
    pub ops: usize,
    pub capacity: usize,
    pub max_size: usize,
}

impl Default for ChurnConfig {
    fn default() -> Self {
        Self {
            seed: 0xDEAD_BEEF,
            ops: 10_000,
            capacity: units::kib(64),
            max_size: 512,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChurnReport {
    pub config: ChurnConfig,
    pub allocations: usize,
    pub frees: usize,
    pub failed_allocations: usize,
    pub peak_used_bytes: usize,
    pub violations: Vec<String>,
    /// Stats after the workload, before the final drain.
    pub final_stats: Option<HeapStats>,
    pub passed: bool,
}

#[derive(Clone, Copy, Debug)]
struct Live {
    size: usize,
    tag: u8,
}

/// Random allocate/free mix checked against a shadow map of live blocks.
///
/// Verifies no overlap with any live block, zero contents on allocation,
/// intact contents on free, and `stats()` against the shadow totals.
pub fn run_churn(heap: &HeapAllocator, config: ChurnConfig) -> Result<ChurnReport, HarnessError> {
    if config.max_size == 0 {
        return Err(HarnessError::InvalidArgument(
            "max size must be non-zero".to_string(),
        ));
    }
    heap.init(config.capacity, Backing::Dynamic)?;
    torn_down_after(heap, |heap| churn_workload(heap, config))
}

/// Run `work` on an initialized heap and tear it down whatever `work` returns.
fn torn_down_after<T>(
    heap: &HeapAllocator,
    work: impl FnOnce(&HeapAllocator) -> Result<T, HarnessError>,
) -> Result<T, HarnessError> {
    let result = work(heap);
    heap.teardown();
    result
}

fn churn_workload(heap: &HeapAllocator, config: ChurnConfig) -> Result<ChurnReport, HarnessError> {
    let mut rng = XorShift64::new(config.seed);
    let mut live: BTreeMap<usize, Live> = BTreeMap::new();
    let mut violations = Vec::new();
    let (mut allocations, mut frees, mut failed_allocations) = (0, 0, 0);
    let mut used = 0_usize;
    let mut peak_used_bytes = 0_usize;

    for op in 0..config.ops {
        if live.is_empty() || rng.gen_range(0, 99) < 60 {
            let size = rng.gen_range(1, config.max_size);
            let Some(ptr) = heap.allocate(size) else {
                failed_allocations += 1;
                continue;
            };
            let addr = ptr.as_ptr() as usize;
            if let Some(other) = overlapping(&live, addr, size) {
                violations.push(format!("op {op}: block {addr:#x}+{size} overlaps {other:#x}"));
            }
            let contents = heap.read_block(ptr.as_ptr())?;
            if contents.len() != size || contents.iter().any(|&b| b != 0) {
                violations.push(format!("op {op}: block {addr:#x} not zeroed on allocation"));
            }
            let tag = (op % 251) as u8 + 1;
            heap.write_block(ptr.as_ptr(), &vec![tag; size])?;
            live.insert(addr, Live { size, tag });
            allocations += 1;
            used += size;
            peak_used_bytes = peak_used_bytes.max(used);
        } else {
            let pick = rng.gen_range(0, live.len() - 1);
            let Some((&addr, &block)) = live.iter().nth(pick) else {
                continue;
            };
            live.remove(&addr);
            let contents = heap.read_block(addr as *const u8)?;
            if contents != vec![block.tag; block.size] {
                violations.push(format!("op {op}: block {addr:#x} contents changed"));
            }
            let cleared = heap.try_free(addr as *const u8)?;
            if cleared != block.size {
                violations.push(format!(
                    "op {op}: free of {addr:#x} cleared {cleared} bytes, expected {}",
                    block.size
                ));
            }
            frees += 1;
            used -= block.size;
        }
    }

    let final_stats = heap.stats();
    if let Some(stats) = final_stats {
        if stats.used_bytes != used {
            violations.push(format!(
                "stats report {} used bytes, shadow has {used}",
                stats.used_bytes
            ));
        }
        if stats.live_blocks != live.len() {
            violations.push(format!(
                "stats report {} live blocks, shadow has {}",
                stats.live_blocks,
                live.len()
            ));
        }
    }

    for &addr in live.keys() {
        if !heap.free(addr as *const u8) {
            violations.push(format!("final free of {addr:#x} rejected"));
        }
    }
    if heap.stats().is_some_and(|s| s.largest_free_run != config.capacity) {
        violations.push("arena not fully free after draining live blocks".to_string());
    }

    Ok(ChurnReport {
        config,
        allocations,
        frees,
        failed_allocations,
        peak_used_bytes,
        passed: violations.is_empty(),
        violations,
        final_stats,
    })
}

/// Start address of a live block intersecting `[addr, addr + size)`.
fn overlapping(live: &BTreeMap<usize, Live>, addr: usize, size: usize) -> Option<usize> {
    let end = addr + size;
    if let Some((&prev, block)) = live.range(..=addr).next_back() {
        if prev + block.size > addr {
            return Some(prev);
        }
    }
    live.range(addr..end).next().map(|(&next, _)| next)
}
