// Position mapping from the four position-category sheets.
//
// Each sheet lists players in a fixed stride: the first name sits at row 2,
// column 0, and each following player block starts four rows further down.

use std::collections::HashMap;

use tracing::{info, warn};

use drumstats_core::model::PositionCode;
use drumstats_core::result::{IssueContext, Issues};

use crate::cell::{cell_text, normalize_name};
use crate::workbook::Workbook;

/// Sheets read, in order. Later sheets win on duplicate names.
pub const POSITION_SHEETS: [(&str, PositionCode); 4] = [
    ("Goalkeepers", PositionCode::GK),
    ("Defenders", PositionCode::DEF),
    ("Midfielders", PositionCode::MID),
    ("Forwards", PositionCode::FWD),
];

pub const FIRST_PLAYER_ROW: usize = 2;
pub const PLAYER_ROW_STRIDE: usize = 4;
pub const NAME_COL: usize = 0;

/// Normalized player name → position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PositionMapping {
    positions: HashMap<String, PositionCode>,
}

impl PositionMapping {
    pub fn get(&self, name: &str) -> Option<PositionCode> {
        self.positions.get(&normalize_name(name)).copied()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Insert, returning the position the name previously had.
    pub fn insert(&mut self, name: &str, position: PositionCode) -> Option<PositionCode> {
        self.positions.insert(normalize_name(name), position)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PositionMappingOutcome {
    Loaded {
        mapping: PositionMapping,
        sheets_read: usize,
    },
    /// No position sheet could be read. Callers fall back to inference.
    Failed,
}

impl PositionMappingOutcome {
    pub fn mapping(&self) -> Option<&PositionMapping> {
        match self {
            PositionMappingOutcome::Loaded { mapping, .. } => Some(mapping),
            PositionMappingOutcome::Failed => None,
        }
    }
}

/// Read all position sheets present in the workbook.
pub fn read_position_mapping(workbook: &Workbook) -> (PositionMappingOutcome, Issues) {
    let mut issues = Issues::new();
    let mut mapping = PositionMapping::default();
    let mut sheets_read = 0;

    for (sheet_name, code) in POSITION_SHEETS {
        let Some(sheet) = workbook.find_sheet_ci(sheet_name) else {
            warn!("position sheet `{}` not found", sheet_name);
            issues.warning(
                "MISSING_POSITION_SHEET",
                format!("no `{sheet_name}` sheet; its players will have inferred positions"),
                IssueContext::none(),
            );
            continue;
        };
        sheets_read += 1;

        let mut row = FIRST_PLAYER_ROW;
        let mut count = 0;
        while row < sheet.height() {
            let Some(name) = cell_text(sheet.cell(row, NAME_COL)) else {
                break;
            };
            if let Some(previous) = mapping.insert(&name, code) {
                let message = if previous == code {
                    format!("`{name}` listed twice as {code}")
                } else {
                    format!("`{name}` listed as both {previous} and {code}; using {code}")
                };
                warn!("{}", message);
                issues.warning(
                    "DUPLICATE_POSITION_MAPPING",
                    message,
                    IssueContext::sheet(sheet.name()).at_row(row),
                );
            }
            count += 1;
            row += PLAYER_ROW_STRIDE;
        }
        info!("read {} {} from `{}`", count, code.name().to_lowercase(), sheet.name());
    }

    if sheets_read == 0 {
        warn!("no position sheets found; positions will be inferred");
        return (PositionMappingOutcome::Failed, issues);
    }
    (
        PositionMappingOutcome::Loaded {
            mapping,
            sheets_read,
        },
        issues,
    )
}
