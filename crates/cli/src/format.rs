//! Output formatting: human-readable text or JSON.

use bustrace_core::TraceRecord;
use bustrace_storage::RecoveryInfo;
use serde_json::json;

/// Output mode selected on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    Json,
}

/// Counts shown by `summary`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Summary {
    pub records: usize,
    pub sent: usize,
    pub received: usize,
    pub unlabeled: usize,
    pub indexed: usize,
    pub recovery: RecoveryInfo,
}

/// Format a list of records.
pub fn format_records(records: &[TraceRecord], mode: OutputMode) -> String {
    match mode {
        OutputMode::Json => {
            serde_json::to_string_pretty(records).unwrap_or_else(|e| format!("\"{}\"", e))
        }
        OutputMode::Human => {
            if records.is_empty() {
                return "(empty)".to_string();
            }
            records
                .iter()
                .map(record_line)
                .collect::<Vec<_>>()
                .join("\n")
        }
    }
}

/// Format a single record, or its absence.
pub fn format_record(record: Option<&TraceRecord>, mode: OutputMode) -> String {
    match (record, mode) {
        (None, OutputMode::Json) => "null".to_string(),
        (None, OutputMode::Human) => "(nil)".to_string(),
        (Some(r), OutputMode::Json) => {
            serde_json::to_string_pretty(r).unwrap_or_else(|e| format!("\"{}\"", e))
        }
        (Some(r), OutputMode::Human) => {
            let mut out = vec![
                format!("record_id:      {}", r.record_id),
                format!("message_id:     {}", or_dash(&r.message_id)),
                format!("parent_ids:     {}", join_or_dash(&r.parent_ids)),
                format!("label:          {}", or_dash(&r.label)),
                format!("direction:      {}", r.direction),
                format!("timestamp:      {}", timestamp(r.timestamp)),
                format!("target_address: {}", r.target_address),
                format!("reply_address:  {}", or_dash(&r.reply_address)),
            ];
            if !r.headers.is_empty() {
                out.push("headers:".to_string());
                out.extend(r.headers.lines().map(|l| format!("  {}", l)));
            }
            out.push(format!("body:           {}", r.body));
            out.join("\n")
        }
    }
}

/// Format the `summary` output.
pub fn format_summary(summary: &Summary, mode: OutputMode) -> String {
    match mode {
        OutputMode::Json => json!({
            "records": summary.records,
            "sent": summary.sent,
            "received": summary.received,
            "unlabeled": summary.unlabeled,
            "indexed": summary.indexed,
            "recovered_frames": summary.recovery.frames,
            "torn_bytes": summary.recovery.torn_bytes,
        })
        .to_string(),
        OutputMode::Human => {
            let mut out = format!(
                "records:   {}\nsent:      {}\nreceived:  {} ({} unlabeled)\nindexed:   {}",
                summary.records,
                summary.sent,
                summary.received,
                summary.unlabeled,
                summary.indexed
            );
            if summary.recovery.torn_bytes > 0 {
                out.push_str(&format!(
                    "\nwarning:   {} torn bytes ignored at log tail",
                    summary.recovery.torn_bytes
                ));
            }
            out
        }
    }
}

/// Format an error message.
pub fn format_error(message: &str, mode: OutputMode) -> String {
    match mode {
        OutputMode::Json => json!({ "error": message }).to_string(),
        OutputMode::Human => format!("(error) {}", message),
    }
}

fn record_line(r: &TraceRecord) -> String {
    format!(
        "{:>6}  {:<8}  {}  {:<16}  {:<16}  {}",
        r.record_id,
        r.direction,
        timestamp(r.timestamp),
        or_dash(&r.message_id),
        join_or_dash(&r.parent_ids),
        r.target_address
    )
}

fn timestamp(millis: i64) -> String {
    chrono::DateTime::from_timestamp_millis(millis)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S%.3f").to_string())
        .unwrap_or_else(|| millis.to_string())
}

fn or_dash(s: &str) -> &str {
    if s.is_empty() {
        "-"
    } else {
        s
    }
}

fn join_or_dash(ids: &[String]) -> String {
    if ids.is_empty() {
        "-".to_string()
    } else {
        ids.join(",")
    }
}
