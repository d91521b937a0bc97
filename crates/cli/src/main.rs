//! bustrace CLI: read-only inspection of trace directories.
//!
//! ```text
//! bustrace <dir> records [--direction sent|received] [--limit N]
//! bustrace <dir> get <record_id>
//! bustrace <dir> lookup|chain|children|deliveries <message_id>
//! bustrace <dir> summary
//! ```
//!
//! `--json` switches every command to JSON output. Logs go to stderr.

mod commands;
mod format;
mod parse;

use std::path::Path;
use std::process;

use bustrace_core::{Direction, CORRELATION_PARTITION};
use bustrace_engine::TraceInspector;
use bustrace_storage::{LogSnapshot, LogStore, StoreReader};
use tracing::{debug, warn};

use commands::build_cli;
use format::{format_error, format_record, format_records, format_summary, OutputMode, Summary};
use parse::{matches_to_query, Query};

fn main() {
    let matches = build_cli().get_matches();

    let output_mode = if matches.get_flag("json") {
        OutputMode::Json
    } else {
        OutputMode::Human
    };
    init_logging(matches.get_flag("verbose"));

    let query = match matches_to_query(&matches) {
        Ok(q) => q,
        Err(e) => {
            eprintln!("{}", format_error(&e, output_mode));
            process::exit(1);
        }
    };

    // `dir` is required by clap
    let dir = matches
        .get_one::<String>("dir")
        .map(String::as_str)
        .unwrap_or(".");

    match open(Path::new(dir)).and_then(|inspector| run(&inspector, query, output_mode)) {
        Ok(out) => println!("{}", out),
        Err(e) => {
            eprintln!("{}", format_error(&e, output_mode));
            process::exit(1);
        }
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .with_target(false)
        .init();
}

fn open(dir: &Path) -> Result<TraceInspector<LogSnapshot>, String> {
    let snapshot = LogStore::read(dir).map_err(|e| e.to_string())?;
    let recovery = snapshot.recovery();
    debug!(dir = %dir.display(), frames = recovery.frames, "Trace log replayed");
    if recovery.torn_bytes > 0 {
        warn!(
            torn_bytes = recovery.torn_bytes,
            "Trace log ends in a torn frame, tail ignored"
        );
    }
    Ok(TraceInspector::new(snapshot))
}

fn run(
    inspector: &TraceInspector<LogSnapshot>,
    query: Query,
    mode: OutputMode,
) -> Result<String, String> {
    let out = match query {
        Query::Records { direction, limit } => {
            let records = inspector.records().map_err(|e| e.to_string())?;
            let filtered: Vec<_> = records
                .into_iter()
                .filter(|r| direction.map_or(true, |d| r.direction == d))
                .take(limit.unwrap_or(usize::MAX))
                .collect();
            format_records(&filtered, mode)
        }
        Query::Get { record_id } => {
            let record = inspector.record(record_id).map_err(|e| e.to_string())?;
            format_record(record.as_ref(), mode)
        }
        Query::Lookup { message_id } => {
            let record = inspector.lookup(&message_id).map_err(|e| e.to_string())?;
            format_record(record.as_ref(), mode)
        }
        Query::Chain { message_id } => {
            format_records(&inspector.chain(&message_id).map_err(|e| e.to_string())?, mode)
        }
        Query::Children { message_id } => format_records(
            &inspector.children(&message_id).map_err(|e| e.to_string())?,
            mode,
        ),
        Query::Deliveries { message_id } => format_records(
            &inspector.deliveries(&message_id).map_err(|e| e.to_string())?,
            mode,
        ),
        Query::Summary => format_summary(&summarize(inspector)?, mode),
    };
    Ok(out)
}

fn summarize(inspector: &TraceInspector<LogSnapshot>) -> Result<Summary, String> {
    let records = inspector.records().map_err(|e| e.to_string())?;
    let indexed = inspector
        .reader()
        .count(CORRELATION_PARTITION)
        .map_err(|e| e.to_string())?;

    let mut summary = Summary {
        records: records.len(),
        indexed,
        recovery: inspector.reader().recovery(),
        ..Summary::default()
    };
    for r in &records {
        match r.direction {
            Direction::Sent => summary.sent += 1,
            Direction::Received => {
                summary.received += 1;
                if r.message_id.is_empty() {
                    summary.unlabeled += 1;
                }
            }
        }
    }
    Ok(summary)
}
