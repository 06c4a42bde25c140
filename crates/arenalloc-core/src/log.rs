//! Structured heap lifecycle records.
//!
//! Every public allocator operation leaves a [`HeapLogRecord`] in a bounded
//! in-memory journal. Callers drain it with
//! [`crate::HeapAllocator::drain_lifecycle_logs`] and decide where it goes
//! (the harness writes it out as JSONL).

use std::collections::VecDeque;

use serde::Serialize;

/// Heap lifecycle log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HeapLogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// Structured heap lifecycle record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeapLogRecord {
    /// Monotonic decision/event id, unique per allocator.
    pub decision_id: u64,
    /// Correlation id for this record.
    pub trace_id: String,
    pub level: HeapLogLevel,
    /// API symbol (`init`, `allocate`, `free`, `teardown`, ...).
    pub symbol: &'static str,
    /// Event kind (`alloc`, `free`, `exhausted`, ...).
    pub event: &'static str,
    /// Arena offset involved in the event.
    pub offset: Option<usize>,
    /// Size value involved in the event.
    pub size: Option<usize>,
    /// Machine-readable outcome label.
    pub outcome: &'static str,
    /// Free-form details for debugging.
    pub details: String,
    /// Snapshot: arena capacity (0 when uninitialized).
    pub capacity: usize,
    /// Snapshot: occupied arena bytes.
    pub used_bytes: usize,
    /// Snapshot: live block count.
    pub live_blocks: usize,
}

/// Snapshot fields attached to each record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Snapshot {
    pub(crate) capacity: usize,
    pub(crate) used_bytes: usize,
    pub(crate) live_blocks: usize,
}

/// What happened, minus the bookkeeping fields the journal fills in.
#[derive(Debug)]
pub(crate) struct Event {
    pub(crate) level: HeapLogLevel,
    pub(crate) symbol: &'static str,
    pub(crate) event: &'static str,
    pub(crate) offset: Option<usize>,
    pub(crate) size: Option<usize>,
    pub(crate) outcome: &'static str,
    pub(crate) details: String,
}

impl Event {
    pub(crate) fn new(
        level: HeapLogLevel,
        symbol: &'static str,
        event: &'static str,
        outcome: &'static str,
    ) -> Self {
        Self {
            level,
            symbol,
            event,
            offset: None,
            size: None,
            outcome,
            details: String::new(),
        }
    }

    pub(crate) fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    pub(crate) fn size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }

    pub(crate) fn details(mut self, details: impl Into<String>) -> Self {
        self.details = details.into();
        self
    }
}

/// Bounded record buffer; the oldest record is dropped when full.
#[derive(Debug)]
pub(crate) struct Journal {
    records: VecDeque<HeapLogRecord>,
    capacity: usize,
    next_decision_id: u64,
    dropped: u64,
}

impl Journal {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            records: VecDeque::new(),
            capacity,
            next_decision_id: 1,
            dropped: 0,
        }
    }

    fn next_decision_id(&mut self) -> u64 {
        let id = self.next_decision_id;
        self.next_decision_id = self.next_decision_id.wrapping_add(1);
        id
    }

    pub(crate) fn record(&mut self, event: Event, snapshot: Snapshot) {
        let decision_id = self.next_decision_id();
        if self.capacity == 0 {
            return;
        }
        if self.records.len() == self.capacity {
            self.records.pop_front();
            self.dropped += 1;
        }
        let trace_id = format!("core::heap::{}::{:016x}", event.symbol, decision_id);
        self.records.push_back(HeapLogRecord {
            decision_id,
            trace_id,
            level: event.level,
            symbol: event.symbol,
            event: event.event,
            offset: event.offset,
            size: event.size,
            outcome: event.outcome,
            details: event.details,
            capacity: snapshot.capacity,
            used_bytes: snapshot.used_bytes,
            live_blocks: snapshot.live_blocks,
        });
    }

    pub(crate) fn drain(&mut self) -> Vec<HeapLogRecord> {
        self.records.drain(..).collect()
    }

    /// Records evicted because the journal was full.
    pub(crate) fn dropped(&self) -> u64 {
        self.dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(name: &'static str) -> Event {
        Event::new(HeapLogLevel::Trace, "allocate", name, "success")
    }

    #[test]
    fn records_carry_ids_and_snapshot() {
        let mut journal = Journal::new(8);
        journal.record(
            event("alloc").offset(4).size(16).details("path=first_fit"),
            Snapshot {
                capacity: 64,
                used_bytes: 16,
                live_blocks: 1,
            },
        );
        let records = journal.drain();
        assert_eq!(records.len(), 1);
        let rec = &records[0];
        assert_eq!(rec.decision_id, 1);
        assert_eq!(rec.trace_id, "core::heap::allocate::0000000000000001");
        assert_eq!(rec.offset, Some(4));
        assert_eq!(rec.size, Some(16));
        assert_eq!(rec.details, "path=first_fit");
        assert_eq!(rec.used_bytes, 16);
        assert!(journal.drain().is_empty());
    }

    #[test]
    fn full_journal_drops_oldest() {
        let mut journal = Journal::new(2);
        for name in ["a", "b", "c"] {
            journal.record(event(name), Snapshot::default());
        }
        let records = journal.drain();
        let events: Vec<&str> = records.iter().map(|r| r.event).collect();
        assert_eq!(events, vec!["b", "c"]);
        assert_eq!(journal.dropped(), 1);
    }

    #[test]
    fn zero_capacity_disables_journal_but_keeps_ids_moving() {
        let mut journal = Journal::new(0);
        journal.record(event("a"), Snapshot::default());
        assert!(journal.drain().is_empty());
        assert_eq!(journal.next_decision_id, 2);
    }

    #[test]
    fn records_serialize_with_lowercase_level() {
        let mut journal = Journal::new(1);
        journal.record(
            Event::new(HeapLogLevel::Warn, "free", "out_of_range", "ignored"),
            Snapshot::default(),
        );
        let json = serde_json::to_value(&journal.drain()[0]).unwrap();
        assert_eq!(json["level"], "warn");
        assert_eq!(json["symbol"], "free");
        assert_eq!(json["offset"], serde_json::Value::Null);
    }
}
