//! Scenario harness for arenalloc.
//!
//! This crate provides:
//! - Scenarios: the reference walkthrough, contended threads, seeded churn
//! - Reports: serde-serializable per-scenario results
//! - Structured logs: JSONL harness events plus drained heap lifecycle records

#![forbid(unsafe_code)]

pub mod error;
pub mod scenario;
pub mod structured_log;

pub use error::HarnessError;
pub use scenario::{ChurnConfig, ChurnReport, ReferenceReport, ThreadsReport};
pub use structured_log::{LogEmitter, LogEntry, LogLevel, Outcome};
