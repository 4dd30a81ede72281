// Rendering an import result for the terminal and for spreadsheets.

use std::fmt::Write as _;
use std::io::Write;

use anyhow::{Context, Result};
use serde::Serialize;

use drumstats_core::result::{EtlResult, Issue};

/// Severity column of the issues CSV.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Serialize)]
struct IssueRecord<'a> {
    severity: Severity,
    code: &'a str,
    sheet: Option<&'a str>,
    row: Option<usize>,
    message: &'a str,
    timestamp: String,
}

impl<'a> IssueRecord<'a> {
    fn new(severity: Severity, issue: &'a Issue) -> Self {
        IssueRecord {
            severity,
            code: &issue.code,
            sheet: issue.context.sheet.as_deref(),
            row: issue.context.row,
            message: &issue.message,
            timestamp: issue.timestamp.to_rfc3339(),
        }
    }
}

/// Write every error, then every warning, as CSV rows with a header.
pub fn write_issues_csv<W: Write>(result: &EtlResult, out: W) -> Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    let rows = result
        .errors
        .iter()
        .map(|i| IssueRecord::new(Severity::Error, i))
        .chain(
            result
                .warnings
                .iter()
                .map(|i| IssueRecord::new(Severity::Warning, i)),
        );
    for record in rows {
        writer
            .serialize(record)
            .context("failed to write issue row")?;
    }
    writer.flush().context("failed to flush issues CSV")?;
    Ok(())
}

pub fn to_json(result: &EtlResult) -> Result<String> {
    serde_json::to_string_pretty(result).context("failed to serialize import result")
}

/// Short human-readable summary.
pub fn summary(result: &EtlResult) -> String {
    let mut out = String::new();
    let status = if result.success { "succeeded" } else { "finished with errors" };
    let elapsed = result.finished_at - result.started_at;
    let _ = writeln!(
        out,
        "Import {} in {:.2}s",
        status,
        elapsed.num_milliseconds() as f64 / 1000.0
    );

    for (entity, counts) in &result.counts {
        let _ = writeln!(
            out,
            "  {:<18} {:>4} created {:>4} updated {:>4} skipped",
            format!("{entity:?}"),
            counts.created,
            counts.updated,
            counts.skipped
        );
    }

    let _ = writeln!(
        out,
        "{} errors, {} warnings",
        result.errors.len(),
        result.warnings.len()
    );
    for issue in &result.errors {
        let _ = writeln!(out, "  error   {}", describe(issue));
    }
    out
}

fn describe(issue: &Issue) -> String {
    let location = match (&issue.context.sheet, issue.context.row) {
        (Some(sheet), Some(row)) => format!(" [{sheet} row {row}]"),
        (Some(sheet), None) => format!(" [{sheet}]"),
        (None, _) => String::new(),
    };
    format!("{}: {}{}", issue.code, issue.message, location)
}
