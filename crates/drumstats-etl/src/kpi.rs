// KPI definition sheet transform.
//
// The sheet groups outcomes under merged event cells, so the event number and
// name appear only on the first row of each group and must be carried down.
// Reading stops after a run of blank rows.

use std::collections::HashSet;
use std::ops::ControlFlow;

use tracing::{debug, warn};

use drumstats_core::error::EtlError;
use drumstats_core::model::{KpiDefinition, TeamAssignment};
use drumstats_core::result::{IssueContext, Issues};

use crate::cell::{cell_f64, cell_i64, cell_text, is_blank};
use crate::workbook::{Sheet, Workbook};

pub const KPI_SHEET: &str = "KPI Definitions";

pub const HEADER_ROW: usize = 0;
pub const FIRST_DATA_ROW: usize = 1;

pub const COL_EVENT_NUMBER: usize = 0;
pub const COL_EVENT_NAME: usize = 1;
pub const COL_OUTCOME: usize = 2;
pub const COL_TEAM: usize = 3;
pub const COL_PSR: usize = 4;
pub const COL_DEFINITION: usize = 5;
const COLUMN_COUNT: usize = 6;

/// Consecutive blank rows that end the data.
pub const BLANK_RUN_LIMIT: usize = 5;

pub const MAX_NAME_LEN: usize = 100;
pub const MAX_DEFINITION_LEN: usize = 1000;
pub const PSR_RANGE: (f64, f64) = (-10.0, 10.0);

/// Exact name first, then a case-insensitive or truncated match.
pub fn find_kpi_sheet(workbook: &Workbook) -> Option<&Sheet> {
    workbook
        .sheet(KPI_SHEET)
        .or_else(|| workbook.find_sheet_ci(KPI_SHEET))
}

// ---------------------------------------------------------------------------
// Extraction with forward fill
// ---------------------------------------------------------------------------

/// One data row after forward fill, before validation.
#[derive(Debug, Clone, PartialEq)]
pub struct RawKpiRow {
    /// 0-based sheet row.
    pub row: usize,
    pub event_number: Option<i64>,
    pub event_name: Option<String>,
    pub outcome: Option<String>,
    pub team: Option<String>,
    pub psr: Option<f64>,
    /// Raw PSR text when the cell is not numeric.
    pub psr_text: Option<String>,
    pub definition: Option<String>,
}

/// Carried state of the scan: the last event seen and the current run of
/// blank rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FillState {
    pub event_number: Option<i64>,
    pub event_name: Option<String>,
    pub blank_run: usize,
}

impl FillState {
    fn blank(self) -> FillState {
        FillState {
            blank_run: self.blank_run + 1,
            ..self
        }
    }

    /// Fill the row's empty event cells from the state, and carry its
    /// non-empty ones forward.
    fn fill(self, mut row: RawKpiRow) -> (FillState, RawKpiRow) {
        let event_number = row.event_number.or(self.event_number);
        let event_name = row.event_name.clone().or(self.event_name);
        row.event_number = event_number;
        row.event_name = event_name.clone();
        (
            FillState {
                event_number,
                event_name,
                blank_run: 0,
            },
            row,
        )
    }
}

fn read_row(sheet: &Sheet, row: usize) -> Option<RawKpiRow> {
    if (0..COLUMN_COUNT).all(|c| is_blank(sheet.cell(row, c))) {
        return None;
    }
    let psr_cell = sheet.cell(row, COL_PSR);
    let psr = cell_f64(psr_cell);
    Some(RawKpiRow {
        row,
        event_number: cell_i64(sheet.cell(row, COL_EVENT_NUMBER)),
        event_name: cell_text(sheet.cell(row, COL_EVENT_NAME)),
        outcome: cell_text(sheet.cell(row, COL_OUTCOME)),
        team: cell_text(sheet.cell(row, COL_TEAM)),
        psr,
        psr_text: psr.is_none().then(|| cell_text(psr_cell)).flatten(),
        definition: cell_text(sheet.cell(row, COL_DEFINITION)),
    })
}

/// Data rows with event cells forward-filled.
pub fn extract_kpi_rows(sheet: &Sheet) -> Vec<RawKpiRow> {
    let scan = (FIRST_DATA_ROW..sheet.height()).try_fold(
        (FillState::default(), Vec::new()),
        |(state, mut rows), r| match read_row(sheet, r) {
            None => {
                let state = state.blank();
                if state.blank_run >= BLANK_RUN_LIMIT {
                    ControlFlow::Break(rows)
                } else {
                    ControlFlow::Continue((state, rows))
                }
            }
            Some(raw) => {
                let (state, filled) = state.fill(raw);
                rows.push(filled);
                ControlFlow::Continue((state, rows))
            }
        },
    );
    match scan {
        ControlFlow::Break(rows) | ControlFlow::Continue((_, rows)) => rows,
    }
}

// ---------------------------------------------------------------------------
// Normalization and validation
// ---------------------------------------------------------------------------

/// Fix known spellings and casing of a team assignment.
pub fn normalize_team(text: &str) -> Option<TeamAssignment> {
    let lower = text.trim().to_lowercase();
    let fixed = match lower.as_str() {
        "oppostion" | "oposition" | "opp" => "opposition",
        other => other,
    };
    TeamAssignment::from_name(fixed)
}

/// Definitions that passed validation plus everything found wrong.
#[derive(Debug, Clone, Default)]
pub struct KpiBatch {
    pub definitions: Vec<KpiDefinition>,
    pub issues: Issues,
}

impl KpiBatch {
    /// A batch with any error must not be loaded.
    pub fn is_valid(&self) -> bool {
        !self.issues.has_errors()
    }
}

/// Extract, normalize and validate every KPI definition on the sheet.
pub fn transform_kpis(sheet: &Sheet) -> KpiBatch {
    let mut batch = KpiBatch::default();
    let mut keys = HashSet::new();

    for raw in extract_kpi_rows(sheet) {
        let ctx = IssueContext::sheet(sheet.name()).at_row(raw.row);
        match validate_row(&raw) {
            Ok(def) => {
                let key = def.key();
                if !keys.insert(key.clone()) {
                    warn!("duplicate KPI key {} on row {}", key, raw.row + 1);
                    batch.issues.record(
                        &EtlError::DuplicateKey {
                            key: key.to_string(),
                        },
                        ctx,
                    );
                    continue;
                }
                if def.team_assignment.as_str() != raw.team.as_deref().unwrap_or_default().trim() {
                    debug!(
                        "row {}: team `{}` normalized to {}",
                        raw.row + 1,
                        raw.team.as_deref().unwrap_or_default(),
                        def.team_assignment.as_str()
                    );
                }
                batch.definitions.push(def);
            }
            Err(errors) => {
                for err in errors {
                    batch.issues.record(&err, ctx.clone());
                }
            }
        }
    }

    if !batch.is_valid() {
        warn!(
            "KPI sheet `{}` rejected: {} errors",
            sheet.name(),
            batch.issues.errors.len()
        );
    }
    batch
}

fn validate_row(raw: &RawKpiRow) -> Result<KpiDefinition, Vec<EtlError>> {
    let row = raw.row + 1;
    let mut errors = Vec::new();
    let mut fail = |field: &str, message: String| {
        errors.push(EtlError::FieldValidation {
            field: field.to_string(),
            row,
            message,
        });
    };

    let event_number = match raw.event_number {
        Some(n) if n > 0 && n <= i64::from(u32::MAX) => Some(n as u32),
        Some(n) => {
            fail("event_number", format!("event number {n} must be positive"));
            None
        }
        None => {
            fail("event_number", "missing event number".into());
            None
        }
    };

    let mut text_field = |field: &str, value: &Option<String>, max: usize| -> Option<String> {
        match value.as_deref().map(str::trim) {
            None | Some("") => {
                fail(field, format!("{field} is empty"));
                None
            }
            Some(v) if v.chars().count() > max => {
                fail(field, format!("{field} is longer than {max} characters"));
                None
            }
            Some(v) => Some(v.to_string()),
        }
    };
    let event_name = text_field("event_name", &raw.event_name, MAX_NAME_LEN);
    let outcome = text_field("outcome", &raw.outcome, MAX_NAME_LEN);

    let team_assignment = match raw.team.as_deref() {
        Some(t) => {
            let team = normalize_team(t);
            if team.is_none() {
                fail("team_assignment", format!("unknown team assignment `{t}`"));
            }
            team
        }
        None => {
            fail("team_assignment", "missing team assignment".into());
            None
        }
    };

    let psr_value = match (raw.psr, raw.psr_text.as_deref()) {
        (Some(v), _) if (PSR_RANGE.0..=PSR_RANGE.1).contains(&v) => Some(v),
        (Some(v), _) => {
            fail(
                "psr_value",
                format!("PSR {v} is outside [{}, {}]", PSR_RANGE.0, PSR_RANGE.1),
            );
            None
        }
        (None, Some(text)) => {
            fail("psr_value", format!("PSR `{text}` is not a number"));
            None
        }
        (None, None) => {
            fail("psr_value", "missing PSR value".into());
            None
        }
    };

    let definition = raw
        .definition
        .as_deref()
        .map(str::trim)
        .unwrap_or_default()
        .to_string();
    if definition.chars().count() > MAX_DEFINITION_LEN {
        fail(
            "definition",
            format!("definition is longer than {MAX_DEFINITION_LEN} characters"),
        );
    }

    match (event_number, event_name, outcome, team_assignment, psr_value) {
        (Some(event_number), Some(event_name), Some(outcome), Some(team_assignment), Some(psr_value))
            if errors.is_empty() =>
        {
            Ok(KpiDefinition {
                event_number,
                event_name,
                outcome,
                team_assignment,
                psr_value,
                definition,
            })
        }
        _ => Err(errors),
    }
}
