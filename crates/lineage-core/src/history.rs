//! Commit log parsing.
//!
//! The log is requested in a fixed record format (see
//! [`lineage_vcs::LOG_FORMAT`]): records end with `0x1e` and fields are
//! separated by `0x1f`. Parsing is best-effort: a bad record is logged and
//! skipped, and the remaining records keep the tool's native order.

use chrono::{DateTime, Utc};
use lineage_vcs::{LOG_FIELD_SEP, LOG_RECORD_SEP};
use tracing::warn;

use crate::domain::{Commit, ParseError};

const FIELD_COUNT: usize = 7;

/// Parse raw log output into commits, newest first as emitted.
pub fn parse_log(raw: &str) -> Vec<Commit> {
    raw.split(LOG_RECORD_SEP)
        .enumerate()
        .filter_map(|(index, record)| {
            let record = record.trim_start_matches(['\n', '\r']);
            if record.trim().is_empty() {
                return None;
            }
            match parse_record(record) {
                Ok(commit) => Some(commit),
                Err(e) => {
                    warn!(record = index, error = %e, "skipping malformed log record");
                    None
                }
            }
        })
        .collect()
}

fn parse_record(record: &str) -> Result<Commit, ParseError> {
    let fields: Vec<&str> = record.splitn(FIELD_COUNT, LOG_FIELD_SEP).collect();
    if fields.len() != FIELD_COUNT {
        return Err(ParseError::new(
            "log record",
            format!("expected {FIELD_COUNT} fields, found {}", fields.len()),
        ));
    }

    let hash = fields[0].trim();
    if !is_object_id(hash) {
        return Err(ParseError::new(
            "log record",
            format!("invalid commit hash {hash:?}"),
        ));
    }

    let parent_hashes: Vec<String> = fields[1].split_whitespace().map(str::to_string).collect();
    if let Some(bad) = parent_hashes.iter().find(|p| !is_object_id(p)) {
        return Err(ParseError::new(
            "log record",
            format!("invalid parent hash {bad:?} in {hash}"),
        ));
    }

    let timestamp = parse_timestamp(hash, fields[4].trim());

    Ok(Commit {
        hash: hash.to_string(),
        parent_hashes,
        author: fields[2].to_string(),
        author_email: fields[3].to_string(),
        timestamp,
        message: fields[5].to_string(),
        body: fields[6].trim().to_string(),
        changed_files: Vec::new(),
    })
}

fn parse_timestamp(hash: &str, value: &str) -> Option<DateTime<Utc>> {
    if value.is_empty() {
        warn!(commit = %hash, "log record has no timestamp");
        return None;
    }
    match DateTime::parse_from_rfc3339(value) {
        Ok(ts) => Some(ts.with_timezone(&Utc)),
        Err(e) => {
            warn!(commit = %hash, value = %value, error = %e, "unparseable commit timestamp");
            None
        }
    }
}

/// Full SHA-1 or SHA-256 object name.
fn is_object_id(value: &str) -> bool {
    matches!(value.len(), 40 | 64) && value.chars().all(|c| c.is_ascii_hexdigit())
}

/// Human-friendly age of `ts` relative to `now` for timeline display.
pub fn relative_age(ts: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = now.signed_duration_since(ts);
    if elapsed.num_seconds() < 0 {
        return "just now".to_string();
    }

    let days = elapsed.num_days();
    match days {
        0 => {
            let secs = elapsed.num_seconds();
            if secs < 3600 {
                plural(secs / 60, "minute")
            } else {
                plural(secs / 3600, "hour")
            }
        }
        1 => "Yesterday".to_string(),
        2..=6 => format!("{days} days ago"),
        7..=29 => plural(days / 7, "week"),
        30..=364 => plural(days / 30, "month"),
        _ => plural(days / 365, "year"),
    }
}

fn plural(n: i64, unit: &str) -> String {
    if n == 1 {
        format!("1 {unit} ago")
    } else {
        format!("{n} {unit}s ago")
    }
}
