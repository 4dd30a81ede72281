// Workbook access over calamine.
//
// All sheets are read into memory up front. Coordinates are absolute and
// 0-based, matching the fixed layout conventions of the club's workbook.

use std::path::{Path, PathBuf};

use calamine::{open_workbook_auto, Data, Range, Reader};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum WorkbookError {
    #[error("workbook not found: {path}")]
    NotFound { path: PathBuf },

    #[error("failed to open workbook {path}: {source}")]
    Open {
        path: PathBuf,
        source: calamine::Error,
    },

    #[error("failed to read sheet `{name}`: {source}")]
    Sheet {
        name: String,
        source: calamine::Error,
    },
}

static EMPTY: Data = Data::Empty;

/// A single worksheet.
#[derive(Debug, Clone)]
pub struct Sheet {
    name: String,
    range: Range<Data>,
}

impl Sheet {
    pub fn new(name: impl Into<String>, range: Range<Data>) -> Self {
        Sheet {
            name: name.into(),
            range,
        }
    }

    /// Build a sheet from row-major cells starting at A1.
    pub fn from_rows(name: impl Into<String>, rows: Vec<Vec<Data>>) -> Self {
        let height = rows.len();
        let width = rows.iter().map(|r| r.len()).max().unwrap_or(0);
        if height == 0 || width == 0 {
            return Sheet::new(name, Range::empty());
        }
        let mut range = Range::new((0, 0), ((height - 1) as u32, (width - 1) as u32));
        for (r, row) in rows.into_iter().enumerate() {
            for (c, value) in row.into_iter().enumerate() {
                range.set_value((r as u32, c as u32), value);
            }
        }
        Sheet::new(name, range)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Cell at an absolute position. Anything outside the used range is Empty.
    pub fn cell(&self, row: usize, col: usize) -> &Data {
        self.range
            .get_value((row as u32, col as u32))
            .unwrap_or(&EMPTY)
    }

    /// One past the last used row.
    pub fn height(&self) -> usize {
        self.range.end().map(|(r, _)| r as usize + 1).unwrap_or(0)
    }

    /// One past the last used column.
    pub fn width(&self) -> usize {
        self.range.end().map(|(_, c)| c as usize + 1).unwrap_or(0)
    }
}

/// An in-memory workbook: sheets in their original order.
#[derive(Debug, Clone, Default)]
pub struct Workbook {
    sheets: Vec<Sheet>,
}

impl Workbook {
    /// Read every sheet of an xlsx/xls/xlsb/ods file.
    pub fn open(path: &Path) -> Result<Self, WorkbookError> {
        if !path.exists() {
            return Err(WorkbookError::NotFound {
                path: path.to_path_buf(),
            });
        }
        let mut workbook = open_workbook_auto(path).map_err(|e| WorkbookError::Open {
            path: path.to_path_buf(),
            source: e,
        })?;

        let mut sheets = Vec::new();
        for name in workbook.sheet_names() {
            let range = workbook
                .worksheet_range(&name)
                .map_err(|e| WorkbookError::Sheet {
                    name: name.clone(),
                    source: e,
                })?;
            debug!("read sheet `{}` ({:?})", name, range.end());
            sheets.push(Sheet::new(name, range));
        }
        Ok(Workbook { sheets })
    }

    pub fn from_sheets(sheets: Vec<Sheet>) -> Self {
        Workbook { sheets }
    }

    pub fn sheets(&self) -> &[Sheet] {
        &self.sheets
    }

    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|s| s.name()).collect()
    }

    /// Exact-name lookup.
    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|s| s.name == name)
    }

    /// Case-insensitive lookup that tolerates truncation: an exact
    /// case-insensitive match wins, then a sheet whose name is a prefix of
    /// `name` (truncated tab), then one that `name` is a prefix of.
    pub fn find_sheet_ci(&self, name: &str) -> Option<&Sheet> {
        let wanted = name.trim().to_lowercase();
        if wanted.is_empty() {
            return None;
        }
        let lowered: Vec<(String, &Sheet)> = self
            .sheets
            .iter()
            .map(|s| (s.name.trim().to_lowercase(), s))
            .collect();

        lowered
            .iter()
            .find(|(n, _)| *n == wanted)
            .or_else(|| {
                lowered
                    .iter()
                    .find(|(n, _)| n.len() >= 3 && wanted.starts_with(n.as_str()))
            })
            .or_else(|| lowered.iter().find(|(n, _)| n.starts_with(&wanted)))
            .map(|(_, s)| *s)
    }
}
