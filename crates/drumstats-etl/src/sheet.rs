// Sheet classification and match metadata parsing.
//
// Match sheets are named "<n>. <competition> <home> vs <opposition> <date>",
// but tab names are truncated at 31 characters, so the full title is read
// from cell A1 first and the sheet name is only a fallback.

use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;
use tracing::{debug, warn};

use drumstats_core::error::EtlError;
use drumstats_core::model::{CompetitionType, MatchMetadata};
use drumstats_core::result::{IssueContext, Issues};

use crate::cell::{cell_text, collapse_whitespace};
use crate::workbook::Sheet;

/// Cell holding the composite match title.
pub const TITLE_CELL: (usize, usize) = (0, 0);
/// Cell holding the venue.
pub const VENUE_CELL: (usize, usize) = (1, 1);

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

fn match_sheet_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^\d+\.\s+\w[\w\s]*?\s+vs\s+").expect("match sheet pattern is valid")
    })
}

fn leading_number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*(\d+)\.").expect("leading number pattern is valid"))
}

fn mentions_player(name: &str) -> bool {
    name.to_lowercase().contains("player")
}

/// A sheet carrying one match's team statistics grid.
pub fn is_match_sheet(name: &str) -> bool {
    match_sheet_re().is_match(name) && !mentions_player(name)
}

/// A sheet carrying one match's player statistics.
pub fn is_roster_sheet(name: &str) -> bool {
    leading_number_re().is_match(name) && mentions_player(name)
}

/// The "<n>." prefix of a match or roster sheet name.
pub fn sheet_number(name: &str) -> Option<u32> {
    leading_number_re()
        .captures(name)
        .and_then(|c| c[1].parse().ok())
}

/// What role a sheet plays in the workbook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SheetKind {
    Match { number: u32 },
    Roster { number: u32 },
    Kpi,
    Position,
    Other,
}

pub fn classify(name: &str) -> SheetKind {
    let trimmed = name.trim();
    if is_match_sheet(trimmed) {
        if let Some(number) = sheet_number(trimmed) {
            return SheetKind::Match { number };
        }
    }
    if is_roster_sheet(trimmed) {
        if let Some(number) = sheet_number(trimmed) {
            return SheetKind::Roster { number };
        }
    }
    let lower = trimmed.to_lowercase();
    if lower == crate::kpi::KPI_SHEET.to_lowercase() {
        return SheetKind::Kpi;
    }
    if crate::positions::POSITION_SHEETS
        .iter()
        .any(|(sheet, _)| lower == sheet.to_lowercase())
    {
        return SheetKind::Position;
    }
    SheetKind::Other
}

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

/// Where the metadata was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataSource {
    TitleCell,
    SheetName,
}

#[derive(Debug, Clone)]
pub struct ParsedMetadata {
    pub metadata: MatchMetadata,
    pub source: MetadataSource,
    pub issues: Issues,
}

/// Fields pulled out of a title before normalization.
#[derive(Debug, Clone, PartialEq)]
struct TitleParts {
    number: u32,
    competition: String,
    home: String,
    opposition: String,
    date: Option<(u32, u32, i32)>,
}

/// Parses match titles for one home club. Patterns are compiled once.
pub struct MetadataParser {
    home_team: String,
    default_competition: CompetitionType,
    anchored: Regex,
    generic: Regex,
}

const DATE_TAIL: &str = r"(?:\s+(\d{1,2})[./-](\d{1,2})[./-](\d{4}|\d{2}))?\s*$";

impl MetadataParser {
    pub fn new(home_team: &str, default_competition: CompetitionType) -> Self {
        let anchored = Regex::new(&format!(
            r"(?i)^\s*(\d+)\.\s*(.+?)\s+({})\s+vs\.?\s+(.+?){DATE_TAIL}",
            regex::escape(home_team.trim())
        ))
        .expect("escaped home team always forms a valid pattern");
        let generic = Regex::new(&format!(
            r"(?i)^\s*(\d+)\.\s*(\S+)\s+(.+?)\s+vs\.?\s+(.+?){DATE_TAIL}"
        ))
        .expect("generic title pattern is valid");

        MetadataParser {
            home_team: home_team.trim().to_string(),
            default_competition,
            anchored,
            generic,
        }
    }

    /// Read the match identity from the title cell, falling back to the
    /// sheet name.
    pub fn parse_match_metadata(&self, sheet: &Sheet) -> Result<ParsedMetadata, EtlError> {
        let name = sheet.name();
        let title = cell_text(sheet.cell(TITLE_CELL.0, TITLE_CELL.1));

        let (parts, source) = match title.as_deref().and_then(|t| self.split_title(t)) {
            Some(parts) => (parts, MetadataSource::TitleCell),
            None => match self.split_title(name) {
                Some(parts) => (parts, MetadataSource::SheetName),
                None => {
                    return Err(EtlError::Parsing {
                        sheet: name.to_string(),
                        message: format!(
                            "no match title in cell A1 ({}) or the sheet name",
                            title.as_deref().unwrap_or("blank")
                        ),
                    })
                }
            },
        };
        debug!("sheet `{}` metadata from {:?}: {:?}", name, source, parts);

        let mut issues = Issues::new();
        let ctx = IssueContext::sheet(name);

        if let Some(tab_number) = sheet_number(name) {
            if tab_number != parts.number {
                warn!(
                    "sheet `{}` is numbered {} but its title says {}",
                    name, tab_number, parts.number
                );
                issues.warning(
                    "MATCH_NUMBER_MISMATCH",
                    format!(
                        "sheet is numbered {tab_number} but its title says {}",
                        parts.number
                    ),
                    ctx.clone(),
                );
            }
        }

        let competition = match CompetitionType::from_name(&parts.competition) {
            Some(c) => c,
            None => {
                warn!(
                    "sheet `{}`: unknown competition `{}`, using {}",
                    name, parts.competition, self.default_competition
                );
                issues.warning(
                    "UNKNOWN_COMPETITION",
                    format!(
                        "unknown competition `{}`; recorded as {}",
                        parts.competition, self.default_competition
                    ),
                    ctx.clone(),
                );
                self.default_competition
            }
        };

        let date = match parts.date {
            Some((day, month, year)) => match NaiveDate::from_ymd_opt(year, month, day) {
                Some(d) => Some(d),
                None => {
                    return Err(EtlError::Parsing {
                        sheet: name.to_string(),
                        message: format!("invalid match date {day:02}.{month:02}.{year}"),
                    })
                }
            },
            None => {
                warn!("sheet `{}`: no match date found", name);
                issues.warning("MISSING_DATE", "no match date in title", ctx.clone());
                None
            }
        };

        let venue = cell_text(sheet.cell(VENUE_CELL.0, VENUE_CELL.1));

        Ok(ParsedMetadata {
            metadata: MatchMetadata {
                match_number: parts.number,
                competition,
                home_team: parts.home,
                opposition: parts.opposition,
                date,
                venue,
            },
            source,
            issues,
        })
    }

    fn split_title(&self, text: &str) -> Option<TitleParts> {
        let text = collapse_whitespace(text);
        let caps = self
            .anchored
            .captures(&text)
            .or_else(|| self.generic.captures(&text))?;

        let number: u32 = caps[1].parse().ok()?;
        let competition = caps[2].trim().to_string();
        let home = if caps[3].eq_ignore_ascii_case(&self.home_team) {
            self.home_team.clone()
        } else {
            caps[3].trim().to_string()
        };
        let opposition = strip_partial_date(caps[4].trim());
        if opposition.is_empty() || competition.is_empty() {
            return None;
        }

        let date = match (caps.get(5), caps.get(6), caps.get(7)) {
            (Some(d), Some(m), Some(y)) => {
                let day: u32 = d.as_str().parse().ok()?;
                let month: u32 = m.as_str().parse().ok()?;
                let year_text = y.as_str();
                let mut year: i32 = year_text.parse().ok()?;
                if year_text.len() == 2 {
                    year += 2000;
                }
                Some((day, month, year))
            }
            _ => None,
        };

        Some(TitleParts {
            number,
            competition,
            home,
            opposition,
            date,
        })
    }
}

/// A truncated tab can end in part of a date ("Slaughtmanus 26.0"). Drop a
/// trailing token made only of digits and separators.
fn strip_partial_date(opposition: &str) -> String {
    match opposition.rsplit_once(' ') {
        Some((head, tail))
            if !tail.is_empty()
                && tail.chars().any(|c| c.is_ascii_digit())
                && tail.chars().all(|c| c.is_ascii_digit() || matches!(c, '.' | '/' | '-')) =>
        {
            head.trim().to_string()
        }
        _ => opposition.to_string(),
    }
}
