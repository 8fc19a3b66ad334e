use std::{fs, path::Path};

use crate::config::NotifyConfig;
use crate::core::{error::SyncError, time::now_utc, types::RunSummary};

const TIME_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

pub fn subject(cfg: &NotifyConfig, flagged: bool) -> String {
    let base = format!("{}: {}", cfg.subject, now_utc().format(TIME_FORMAT));
    if flagged {
        format!("{}{}", cfg.error_subject_prefix, base)
    } else {
        base
    }
}

/// Subject flag for a finished run: set when something unexpected happened.
pub fn summary_flagged(summary: &RunSummary) -> bool {
    summary.unexpected_errors > 0 || (!summary.watermark_saved && !summary.no_updates())
}

pub fn summary_lines(summary: &RunSummary) -> Vec<String> {
    let mut lines = vec![format!(
        "started: {}",
        summary.started_at.format(TIME_FORMAT)
    )];

    if summary.no_updates() {
        lines.push("no new reports today".to_string());
    } else {
        if let Some(newest) = &summary.newest_date {
            lines.push(format!("newest history date: {newest}"));
        }
        lines.push(format!(
            "events registered / total: {}/{}",
            summary.succeeded, summary.entries_total
        ));
        if summary.duplicates > 0 {
            lines.push(format!("already present: {}", summary.duplicates));
        }
        lines.push(format!(
            "events failed / total: {}/{}",
            summary.failed, summary.entries_total
        ));
        lines.push(format!(
            "files downloaded / expected: {}/{}",
            summary.files_downloaded,
            summary.files_expected()
        ));
        if !summary.errors.is_empty() {
            lines.push("errors:".to_string());
            lines.extend(summary.errors.iter().map(|e| format!("  {e}")));
        }
        if !summary.warnings.is_empty() {
            lines.push("warnings:".to_string());
            lines.extend(summary.warnings.iter().map(|w| format!("  {w}")));
        }
    }

    if let Some(done) = summary.finished_at {
        lines.push(format!("finished: {}", done.format(TIME_FORMAT)));
    }
    lines
}

pub fn failure_lines(err: &SyncError) -> Vec<String> {
    let hint = if err.is_fatal() {
        "check the ANY.RUN API key and connectivity; the watermark was not changed"
    } else {
        "check the watermark file and storage settings"
    };
    vec![
        "run aborted before any report was imported".to_string(),
        format!("cause: {err}"),
        hint.to_string(),
    ]
}

pub fn write_summary_json(summary: &RunSummary, path: &Path) -> Result<(), SyncError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(summary)?;
    fs::write(path, json)?;
    Ok(())
}
