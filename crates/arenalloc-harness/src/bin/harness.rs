//! CLI entrypoint for the arenalloc scenario harness.

use std::path::{Path, PathBuf};
use std::time::Instant;

use arenalloc_core::{FreePolicy, HeapAllocator, HeapConfig};
use arenalloc_harness::scenario::{self, ChurnConfig};
use arenalloc_harness::{HarnessError, LogEmitter, LogEntry, LogLevel, Outcome};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;

/// Scenario runner for the arenalloc first-fit heap.
#[derive(Debug, Parser)]
#[command(name = "arenalloc-harness")]
#[command(about = "Scenario runner for the arenalloc first-fit heap")]
struct Cli {
    /// Write harness events and heap lifecycle records here as JSONL.
    #[arg(long, global = true)]
    log: Option<PathBuf>,
    /// Free policy override (`compat` or `checked`); defaults to the environment.
    #[arg(long, global = true)]
    free_policy: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the 1 KiB reference walkthrough.
    Reference {
        /// Storage backing (`dynamic` or `static`).
        #[arg(long, default_value = "dynamic")]
        backing: String,
    },
    /// Race one allocation per thread against a shared heap.
    Threads {
        /// Heap capacity (accepts `k`/`m`/`g` suffixes).
        #[arg(long, default_value = "1k")]
        capacity: String,
        /// Request sizes, one thread each.
        #[arg(long, value_delimiter = ',', default_value = "512,256,2048")]
        sizes: Vec<String>,
    },
    /// Seeded random allocate/free workload with shadow verification.
    Churn {
        /// Root seed (decimal or 0x...).
        #[arg(long, default_value = "0xDEAD_BEEF")]
        seed: String,
        /// Number of operations.
        #[arg(long, default_value_t = 10_000)]
        ops: usize,
        /// Heap capacity (accepts `k`/`m`/`g` suffixes).
        #[arg(long, default_value = "64k")]
        capacity: String,
        /// Largest single request.
        #[arg(long, default_value_t = 512)]
        max_size: usize,
    },
}

fn parse_seed(raw: &str) -> Result<u64, HarnessError> {
    let cleaned = raw.trim().replace('_', "");
    let parsed = match cleaned
        .strip_prefix("0x")
        .or_else(|| cleaned.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => cleaned.parse(),
    };
    parsed.map_err(|_| HarnessError::InvalidArgument(format!("bad seed `{raw}`")))
}

/// Print the report, write the log if asked, and fail on a failed scenario.
fn finish<R: Serialize>(
    name: &'static str,
    report: &R,
    passed: bool,
    heap: &HeapAllocator,
    log: Option<&Path>,
    started: Instant,
) -> Result<(), HarnessError> {
    println!("{}", serde_json::to_string_pretty(report)?);

    if let Some(path) = log {
        let run_id = format!("{name}-{}", std::process::id());
        let mut emitter = LogEmitter::to_file(path, &run_id)?;
        emitter.emit_entry(LogEntry::new("", LogLevel::Info, "scenario_start").with_scenario(name))?;
        let records = heap.drain_lifecycle_logs();
        emitter.emit_heap_records(name, &records)?;
        let level = if passed { LogLevel::Info } else { LogLevel::Error };
        emitter.emit_entry(
            LogEntry::new("", level, "scenario_end")
                .with_scenario(name)
                .with_outcome(Outcome::from_passed(passed))
                .with_duration_ms(u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX))
                .with_details(json!({
                    "heap_records": records.len(),
                    "dropped_heap_records": heap.dropped_lifecycle_logs(),
                })),
        )?;
        emitter.flush()?;
    }

    if passed {
        Ok(())
    } else {
        Err(HarnessError::ScenarioFailed(name))
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let mut config = HeapConfig::from_env();
    if let Some(raw) = cli.free_policy.as_deref() {
        config = config.with_free_policy(FreePolicy::from_str_loose(raw));
    }
    let heap = HeapAllocator::with_config(config);
    let log = cli.log.as_deref();
    let started = Instant::now();

    match cli.command {
        Command::Reference { backing } => {
            let report = scenario::run_reference(&heap, scenario::parse_backing(&backing)?)?;
            finish("reference", &report, report.passed, &heap, log, started)?;
        }
        Command::Threads { capacity, sizes } => {
            let capacity = scenario::parse_size(&capacity)?;
            let sizes = sizes
                .iter()
                .map(|s| scenario::parse_size(s))
                .collect::<Result<Vec<_>, _>>()?;
            let report = scenario::run_threads(&heap, capacity, &sizes)?;
            finish("threads", &report, report.passed, &heap, log, started)?;
        }
        Command::Churn {
            seed,
            ops,
            capacity,
            max_size,
        } => {
            let churn = ChurnConfig {
                seed: parse_seed(&seed)?,
                ops,
                capacity: scenario::parse_size(&capacity)?,
                max_size,
            };
            let report = scenario::run_churn(&heap, churn)?;
            finish("churn", &report, report.passed, &heap, log, started)?;
        }
    }
    Ok(())
}
