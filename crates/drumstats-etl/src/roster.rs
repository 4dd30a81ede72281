// Player statistics extraction from a roster sheet.
//
// Row 1 holds headers, data starts on row 2. Column positions vary between
// sheets, so a `FieldMap` is built from the header row once per sheet.

use std::collections::BTreeMap;

use calamine::Data;
use tracing::{debug, warn};

use drumstats_core::model::{FieldKind, FieldValue, PlayerField};
use drumstats_core::model::fields::normalize_header;
use drumstats_core::result::{IssueContext, Issues};

use crate::cell::{cell_decimal, cell_f64, cell_i64, cell_text, collapse_whitespace, is_blank};
use crate::workbook::Sheet;

pub const HEADER_ROW: usize = 1;
pub const FIRST_DATA_ROW: usize = 2;

/// Decimal fields are stored to this many places.
const DECIMAL_PLACES: u32 = 2;

const JERSEY_HEADERS: [&str; 5] = ["#", "no", "no.", "number", "jersey"];
const NAME_HEADERS: [&str; 3] = ["name", "player", "player name"];

// ---------------------------------------------------------------------------
// Field map
// ---------------------------------------------------------------------------

/// Column index → field, for one sheet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldMap {
    pub jersey_col: Option<usize>,
    pub name_col: Option<usize>,
    pub fields: Vec<(usize, PlayerField)>,
}

impl FieldMap {
    /// Map header cells to columns. Unrecognized headers are reported.
    pub fn build(sheet: &str, headers: &[(usize, String)]) -> (FieldMap, Issues) {
        let mut map = FieldMap::default();
        let mut issues = Issues::new();
        let ctx = || IssueContext::sheet(sheet).at_row(HEADER_ROW);

        for (col, text) in headers {
            let key = normalize_header(text);
            if key.is_empty() {
                continue;
            }
            if JERSEY_HEADERS.contains(&key.as_str()) {
                map.jersey_col.get_or_insert(*col);
                continue;
            }
            if NAME_HEADERS.contains(&key.as_str()) {
                map.name_col.get_or_insert(*col);
                continue;
            }
            match PlayerField::from_header(&key) {
                Some(field) if map.column_of(field).is_some() => {
                    issues.warning(
                        "DUPLICATE_COLUMN",
                        format!("`{text}` maps to {} again; keeping the first column", field.column()),
                        ctx(),
                    );
                }
                Some(field) => map.fields.push((*col, field)),
                None => {
                    debug!("sheet `{}`: unmapped header `{}`", sheet, text);
                    issues.warning(
                        "UNMAPPED_COLUMN",
                        format!("column {} header `{text}` matches no statistic", col + 1),
                        ctx(),
                    );
                }
            }
        }
        (map, issues)
    }

    /// Build from the header row of a sheet.
    pub fn from_sheet(sheet: &Sheet) -> (FieldMap, Issues) {
        let headers: Vec<(usize, String)> = (0..sheet.width())
            .filter_map(|col| cell_text(sheet.cell(HEADER_ROW, col)).map(|t| (col, t)))
            .collect();
        FieldMap::build(sheet.name(), &headers)
    }

    /// No statistic columns were recognized.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn column_of(&self, field: PlayerField) -> Option<usize> {
        self.fields.iter().find(|(_, f)| *f == field).map(|(c, _)| *c)
    }
}

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

/// One player's line on a roster sheet.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerRow {
    /// 0-based sheet row.
    pub row: usize,
    pub jersey: Option<i64>,
    pub name: Option<String>,
    pub values: BTreeMap<PlayerField, FieldValue>,
    /// Non-blank cells that could not be coerced to their field's kind,
    /// with the raw text.
    pub invalid: Vec<(PlayerField, String)>,
}

impl PlayerRow {
    pub fn new(row: usize, jersey: Option<i64>, name: Option<&str>) -> Self {
        PlayerRow {
            row,
            jersey,
            name: name.map(str::to_string),
            values: BTreeMap::new(),
            invalid: Vec::new(),
        }
    }

    /// Builder-style setter, handy when constructing rows by hand.
    pub fn with(mut self, field: PlayerField, value: i64) -> Self {
        self.values.insert(field, FieldValue::Integer(value));
        self
    }

    /// Integer value of a field; absent or non-integer reads as 0.
    pub fn int(&self, field: PlayerField) -> i64 {
        self.values.get(&field).and_then(FieldValue::as_i64).unwrap_or(0)
    }

    /// Integer value when present.
    pub fn get_int(&self, field: PlayerField) -> Option<i64> {
        self.values.get(&field).and_then(FieldValue::as_i64)
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("(unnamed)")
    }
}

#[derive(Debug, Clone)]
pub struct RosterExtraction {
    pub field_map: FieldMap,
    pub players: Vec<PlayerRow>,
    pub issues: Issues,
}

/// Read every player row until one has neither jersey nor name.
pub fn extract_roster(sheet: &Sheet) -> RosterExtraction {
    let (field_map, issues) = FieldMap::from_sheet(sheet);
    if field_map.name_col.is_none() {
        warn!("sheet `{}`: no player name column", sheet.name());
    }

    let mut players = Vec::new();
    for row in FIRST_DATA_ROW..sheet.height() {
        let jersey_cell = field_map.jersey_col.map(|c| sheet.cell(row, c));
        let name_cell = field_map.name_col.map(|c| sheet.cell(row, c));
        let blank = |cell: Option<&Data>| cell.map_or(true, is_blank);
        if blank(jersey_cell) && blank(name_cell) {
            break;
        }

        let jersey = jersey_cell.and_then(cell_i64);
        let name = name_cell.and_then(cell_text).map(|n| collapse_whitespace(&n));
        let mut player = PlayerRow {
            row,
            jersey,
            name,
            values: BTreeMap::new(),
            invalid: Vec::new(),
        };

        for &(col, field) in &field_map.fields {
            let cell = sheet.cell(row, col);
            if is_blank(cell) {
                continue;
            }
            match coerce(field.kind(), cell) {
                Some(value) => {
                    player.values.insert(field, value);
                }
                None => player
                    .invalid
                    .push((field, cell_text(cell).unwrap_or_default())),
            }
        }
        players.push(player);
    }

    debug!("sheet `{}`: {} player rows", sheet.name(), players.len());
    RosterExtraction {
        field_map,
        players,
        issues,
    }
}

fn coerce(kind: FieldKind, cell: &Data) -> Option<FieldValue> {
    match kind {
        FieldKind::Integer => cell_i64(cell).map(FieldValue::Integer),
        FieldKind::Decimal => cell_decimal(cell, DECIMAL_PLACES).map(FieldValue::Decimal),
        FieldKind::Ratio => cell_f64(cell).map(FieldValue::Decimal),
        FieldKind::Text => cell_text(cell).map(FieldValue::Text),
    }
}
