// Structured outcome of an import run.
//
// Every phase returns its data alongside an `Issues` accumulator. The run
// folds those into an `EtlRun`, and `EtlRun::finish` freezes everything into
// the `EtlResult` handed back to callers.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::EtlError;

// ---------------------------------------------------------------------------
// Issues
// ---------------------------------------------------------------------------

/// Where in the workbook an issue was found.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IssueContext {
    pub sheet: Option<String>,
    /// 1-based spreadsheet row.
    pub row: Option<usize>,
}

impl IssueContext {
    pub fn none() -> Self {
        IssueContext::default()
    }

    pub fn sheet(name: &str) -> Self {
        IssueContext {
            sheet: Some(name.to_string()),
            row: None,
        }
    }

    /// Attach a 0-based grid row; it is stored 1-based as users see it.
    pub fn at_row(mut self, row: usize) -> Self {
        self.row = Some(row + 1);
        self
    }
}

/// A single error or warning.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Issue {
    pub code: String,
    pub message: String,
    #[serde(flatten)]
    pub context: IssueContext,
    pub timestamp: DateTime<Utc>,
}

/// Ordered errors and warnings collected by one phase.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Issues {
    pub errors: Vec<Issue>,
    pub warnings: Vec<Issue>,
}

impl Issues {
    pub fn new() -> Self {
        Issues::default()
    }

    pub fn error(&mut self, code: &str, message: impl Into<String>, context: IssueContext) {
        self.errors.push(issue(code, message.into(), context));
    }

    pub fn warning(&mut self, code: &str, message: impl Into<String>, context: IssueContext) {
        self.warnings.push(issue(code, message.into(), context));
    }

    /// Record an `EtlError` under its own code.
    pub fn record(&mut self, err: &EtlError, context: IssueContext) {
        self.error(err.code(), err.to_string(), context);
    }

    /// Append another accumulator, keeping order.
    pub fn extend(&mut self, other: Issues) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty() && self.warnings.is_empty()
    }

    /// Count of warnings carrying `code`.
    pub fn warnings_with(&self, code: &str) -> usize {
        self.warnings.iter().filter(|w| w.code == code).count()
    }

    /// Count of errors carrying `code`.
    pub fn errors_with(&self, code: &str) -> usize {
        self.errors.iter().filter(|e| e.code == code).count()
    }
}

fn issue(code: &str, message: String, context: IssueContext) -> Issue {
    Issue {
        code: code.to_string(),
        message,
        context,
        timestamp: Utc::now(),
    }
}

// ---------------------------------------------------------------------------
// Counts
// ---------------------------------------------------------------------------

/// Entities whose writes are counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Entity {
    Season,
    Competition,
    Team,
    Match,
    TeamStatistics,
    Player,
    PlayerStatistics,
    KpiDefinition,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EntityCounts {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
}

impl EntityCounts {
    pub fn merge(&mut self, other: EntityCounts) {
        self.created += other.created;
        self.updated += other.updated;
        self.skipped += other.skipped;
    }
}

// ---------------------------------------------------------------------------
// Run accumulator and final result
// ---------------------------------------------------------------------------

/// Mutable state of a run in progress.
#[derive(Debug)]
pub struct EtlRun {
    started_at: DateTime<Utc>,
    counts: BTreeMap<Entity, EntityCounts>,
    issues: Issues,
}

impl EtlRun {
    pub fn start() -> Self {
        EtlRun {
            started_at: Utc::now(),
            counts: BTreeMap::new(),
            issues: Issues::new(),
        }
    }

    pub fn issues_mut(&mut self) -> &mut Issues {
        &mut self.issues
    }

    pub fn absorb(&mut self, issues: Issues) {
        self.issues.extend(issues);
    }

    pub fn record(&mut self, err: &EtlError, context: IssueContext) {
        self.issues.record(err, context);
    }

    pub fn counts_mut(&mut self, entity: Entity) -> &mut EntityCounts {
        self.counts.entry(entity).or_default()
    }

    pub fn add_counts(&mut self, entity: Entity, counts: EntityCounts) {
        self.counts_mut(entity).merge(counts);
    }

    pub fn has_errors(&self) -> bool {
        self.issues.has_errors()
    }

    /// Freeze the run. Success means no error was recorded.
    pub fn finish(self) -> EtlResult {
        EtlResult {
            success: !self.issues.has_errors(),
            started_at: self.started_at,
            finished_at: Utc::now(),
            counts: self.counts,
            errors: self.issues.errors,
            warnings: self.issues.warnings,
        }
    }
}

/// Final outcome handed to callers.
#[derive(Debug, Clone, Serialize)]
pub struct EtlResult {
    pub success: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub counts: BTreeMap<Entity, EntityCounts>,
    pub errors: Vec<Issue>,
    pub warnings: Vec<Issue>,
}

impl EtlResult {
    pub fn counts(&self, entity: Entity) -> EntityCounts {
        self.counts.get(&entity).copied().unwrap_or_default()
    }

    pub fn errors_with(&self, code: &str) -> usize {
        self.errors.iter().filter(|e| e.code == code).count()
    }

    pub fn warnings_with(&self, code: &str) -> usize {
        self.warnings.iter().filter(|w| w.code == code).count()
    }
}
