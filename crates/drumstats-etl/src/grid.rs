// Positional extraction of the team statistics grid on a match sheet.
//
// Layout (0-based, version 1):
//
//   column = ANCHOR_COL + period * 3 + team      period: 1st, 2nd, Full
//                                                team:   home, opposition
//   ANCHOR_ROW + 0        score ("G-PP")
//   ANCHOR_ROW + 1        possession (fraction, or percent when > 1)
//   ANCHOR_ROW + 2..=9    score sources
//   ANCHOR_ROW + 10..=17  shot sources
//
// The third column of each period block is a spacer.

use tracing::{debug, warn};

use drumstats_core::config::Thresholds;
use drumstats_core::error::EtlError;
use drumstats_core::model::{
    MatchScores, Period, SourceCounters, TeamPeriodStats, TeamSide,
};
use drumstats_core::result::{IssueContext, Issues};
use drumstats_core::score::Score;

use crate::cell::{cell_f64, cell_i64, cell_text, is_blank};
use crate::workbook::Sheet;

pub const LAYOUT_VERSION: u32 = 1;

pub const ANCHOR_ROW: usize = 3;
pub const ANCHOR_COL: usize = 1;
pub const PERIOD_STRIDE: usize = 3;

pub const SCORE_OFFSET: usize = 0;
pub const POSSESSION_OFFSET: usize = 1;
pub const SCORE_SOURCES_OFFSET: usize = 2;
pub const SHOT_SOURCES_OFFSET: usize = 10;
const SOURCE_COUNT: usize = 8;

/// One record per team per period.
pub const EXPECTED_RECORDS: usize = 6;

/// Column of the (period, side) block.
pub fn grid_column(period: Period, side: TeamSide) -> usize {
    let p = match period {
        Period::First => 0,
        Period::Second => 1,
        Period::Full => 2,
    };
    let t = match side {
        TeamSide::Home => 0,
        TeamSide::Opposition => 1,
    };
    ANCHOR_COL + p * PERIOD_STRIDE + t
}

#[derive(Debug, Clone)]
pub struct GridExtraction {
    pub stats: Vec<TeamPeriodStats>,
    pub scores: MatchScores,
    pub issues: Issues,
}

/// Read all six team-period blocks from a match sheet.
///
/// A block whose cells are all blank is treated as missing, which makes the
/// record count short and fails the sheet with `GridCount`.
pub fn extract_grid(sheet: &Sheet, thresholds: &Thresholds) -> Result<GridExtraction, EtlError> {
    let name = sheet.name();
    let mut issues = Issues::new();
    let mut stats = Vec::with_capacity(EXPECTED_RECORDS);
    let mut scores = MatchScores::default();

    for period in Period::ALL {
        for side in TeamSide::ALL {
            let col = grid_column(period, side);
            if block_is_blank(sheet, col) {
                warn!(
                    "sheet `{}`: no data for {:?} {} (column {})",
                    name,
                    side,
                    period.as_str(),
                    col
                );
                continue;
            }

            let score_row = ANCHOR_ROW + SCORE_OFFSET;
            let score = read_score(sheet, score_row, col, &mut issues);
            scores.set(side, period, score);

            let possession = read_possession(sheet, col, &mut issues);
            let score_sources = read_counters(sheet, ANCHOR_ROW + SCORE_SOURCES_OFFSET, col);
            let shot_sources = read_counters(sheet, ANCHOR_ROW + SHOT_SOURCES_OFFSET, col);

            stats.push(TeamPeriodStats {
                side,
                period,
                possession,
                score_sources,
                shot_sources,
            });
        }
    }

    if stats.len() != EXPECTED_RECORDS {
        return Err(EtlError::GridCount {
            sheet: name.to_string(),
            expected: EXPECTED_RECORDS,
            found: stats.len(),
        });
    }

    check_possession(name, &stats, thresholds, &mut issues);
    check_scores(name, &scores, thresholds, &mut issues);

    debug!(
        "sheet `{}`: extracted {} team-period records (layout v{})",
        name,
        stats.len(),
        LAYOUT_VERSION
    );
    Ok(GridExtraction {
        stats,
        scores,
        issues,
    })
}

fn block_is_blank(sheet: &Sheet, col: usize) -> bool {
    (ANCHOR_ROW..ANCHOR_ROW + SHOT_SOURCES_OFFSET + SOURCE_COUNT)
        .all(|row| is_blank(sheet.cell(row, col)))
}

fn read_score(sheet: &Sheet, row: usize, col: usize, issues: &mut Issues) -> Option<Score> {
    let text = cell_text(sheet.cell(row, col))?;
    match text.parse::<Score>() {
        Ok(score) => Some(score),
        Err(e) => {
            warn!("sheet `{}`: {}", sheet.name(), e);
            issues.warning(
                "INVALID_SCORE",
                format!("{e} in column {col}"),
                IssueContext::sheet(sheet.name()).at_row(row),
            );
            None
        }
    }
}

fn read_possession(sheet: &Sheet, col: usize, issues: &mut Issues) -> f64 {
    let row = ANCHOR_ROW + POSSESSION_OFFSET;
    let ctx = || IssueContext::sheet(sheet.name()).at_row(row);
    let cell = sheet.cell(row, col);

    let Some(mut value) = cell_f64(cell) else {
        let message = if is_blank(cell) {
            format!("blank possession in column {col}, recorded as 0")
        } else {
            format!("non-numeric possession in column {col}, recorded as 0")
        };
        issues.warning("MISSING_POSSESSION", message, ctx());
        return 0.0;
    };

    if value > 1.0 {
        value /= 100.0;
    }
    if !(0.0..=1.0).contains(&value) {
        issues.warning(
            "POSSESSION_RANGE",
            format!("possession {value} in column {col} is outside [0, 1]"),
            ctx(),
        );
        value = value.clamp(0.0, 1.0);
    }
    value
}

fn read_counters(sheet: &Sheet, first_row: usize, col: usize) -> SourceCounters {
    let mut values = [0i64; SOURCE_COUNT];
    for (i, slot) in values.iter_mut().enumerate() {
        *slot = cell_i64(sheet.cell(first_row + i, col)).unwrap_or(0);
    }
    SourceCounters::from_array(values)
}

// ---------------------------------------------------------------------------
// Consistency checks
// ---------------------------------------------------------------------------

fn check_possession(
    sheet: &str,
    stats: &[TeamPeriodStats],
    thresholds: &Thresholds,
    issues: &mut Issues,
) {
    for period in Period::ALL {
        let pair: Vec<f64> = stats
            .iter()
            .filter(|s| s.period == period)
            .map(|s| s.possession)
            .collect();
        if pair.len() != 2 || pair.iter().any(|&p| p == 0.0) {
            continue;
        }
        let sum = pair[0] + pair[1];
        if (sum - 1.0).abs() > thresholds.possession_tolerance {
            warn!(
                "sheet `{}`: {} possession sums to {:.2}",
                sheet,
                period.as_str(),
                sum
            );
            issues.warning(
                "POSSESSION_SUM",
                format!(
                    "{} possession {:.2} + {:.2} = {:.2}, expected 1.00 ± {:.2}",
                    period.as_str(),
                    pair[0],
                    pair[1],
                    sum,
                    thresholds.possession_tolerance
                ),
                IssueContext::sheet(sheet).at_row(ANCHOR_ROW + POSSESSION_OFFSET),
            );
        }
    }
}

fn check_scores(sheet: &str, scores: &MatchScores, thresholds: &Thresholds, issues: &mut Issues) {
    for side in TeamSide::ALL {
        let (Some(first), Some(second), Some(full)) = (
            scores.get(side, Period::First),
            scores.get(side, Period::Second),
            scores.get(side, Period::Full),
        ) else {
            continue;
        };

        let halves = first.add(second).total_points() as f64;
        let full_total = full.total_points() as f64;
        let consistent = if full_total == 0.0 {
            halves == 0.0
        } else {
            (halves - full_total).abs() / full_total <= thresholds.score_tolerance
        };
        if !consistent {
            warn!(
                "sheet `{}`: {:?} halves {} + {} do not add up to {}",
                sheet, side, first, second, full
            );
            issues.warning(
                "SCORE_MISMATCH",
                format!("{side:?} half-time scores {first} + {second} disagree with full time {full}"),
                IssueContext::sheet(sheet).at_row(ANCHOR_ROW + SCORE_OFFSET),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calamine::Data;

    /// Build a sheet whose grid blocks hold the given (score, possession)
    /// pairs, in [home 1st, opp 1st, home 2nd, opp 2nd, home full, opp full]
    /// order. Counters are filled with `base + row offset`.
    fn grid_sheet(name: &str, blocks: &[(Option<&str>, Data)]) -> Sheet {
        let height = ANCHOR_ROW + SHOT_SOURCES_OFFSET + SOURCE_COUNT;
        let width = ANCHOR_COL + 3 * PERIOD_STRIDE;
        let mut rows = vec![vec![Data::Empty; width]; height];
        let order = [
            (Period::First, TeamSide::Home),
            (Period::First, TeamSide::Opposition),
            (Period::Second, TeamSide::Home),
            (Period::Second, TeamSide::Opposition),
            (Period::Full, TeamSide::Home),
            (Period::Full, TeamSide::Opposition),
        ];
        for ((period, side), (score, possession)) in order.iter().zip(blocks) {
            let col = grid_column(*period, *side);
            if let Some(s) = score {
                rows[ANCHOR_ROW][col] = Data::String(s.to_string());
            }
            rows[ANCHOR_ROW + POSSESSION_OFFSET][col] = possession.clone();
            for i in 0..SOURCE_COUNT {
                rows[ANCHOR_ROW + SCORE_SOURCES_OFFSET + i][col] = Data::Float(i as f64);
                rows[ANCHOR_ROW + SHOT_SOURCES_OFFSET + i][col] = Data::Float((i * 2) as f64);
            }
        }
        Sheet::from_rows(name, rows)
    }

    fn full_blocks() -> Vec<(Option<&'static str>, Data)> {
        vec![
            (Some("0-06"), Data::Float(0.55)),
            (Some("0-04"), Data::Float(0.45)),
            (Some("1-05"), Data::Float(0.50)),
            (Some("0-07"), Data::Float(0.50)),
            (Some("1-11"), Data::Float(0.52)),
            (Some("0-11"), Data::Float(0.48)),
        ]
    }

    #[test]
    fn column_arithmetic() {
        assert_eq!(grid_column(Period::First, TeamSide::Home), 1);
        assert_eq!(grid_column(Period::First, TeamSide::Opposition), 2);
        assert_eq!(grid_column(Period::Second, TeamSide::Home), 4);
        assert_eq!(grid_column(Period::Full, TeamSide::Opposition), 8);
    }

    #[test]
    fn extracts_six_records() {
        let sheet = grid_sheet("1. League Drum vs Glack", &full_blocks());
        let grid = extract_grid(&sheet, &Thresholds::default()).unwrap();

        assert_eq!(grid.stats.len(), EXPECTED_RECORDS);
        assert_eq!(grid.scores.home_full_time, Some(Score::new(1, 11)));
        assert_eq!(grid.scores.away_first_half, Some(Score::new(0, 4)));

        let home_first = &grid.stats[0];
        assert_eq!(home_first.side, TeamSide::Home);
        assert_eq!(home_first.period, Period::First);
        assert!((home_first.possession - 0.55).abs() < 1e-9);
        assert_eq!(home_first.score_sources.to_array(), [0, 1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(home_first.shot_sources.throw_up, 14);
        assert!(grid.issues.is_empty(), "{:?}", grid.issues);
    }

    #[test]
    fn percentage_possession_is_scaled() {
        let mut blocks = full_blocks();
        blocks[0].1 = Data::Float(55.0);
        blocks[1].1 = Data::String("45%".into());
        let grid = extract_grid(&grid_sheet("s", &blocks), &Thresholds::default()).unwrap();
        assert!((grid.stats[0].possession - 0.55).abs() < 1e-9);
        assert!((grid.stats[1].possession - 0.45).abs() < 1e-9);
    }

    #[test]
    fn possession_outside_tolerance_warns() {
        let mut blocks = full_blocks();
        blocks[0].1 = Data::Float(0.62);
        blocks[1].1 = Data::Float(0.44);
        let grid = extract_grid(&grid_sheet("s", &blocks), &Thresholds::default()).unwrap();
        assert_eq!(grid.stats.len(), EXPECTED_RECORDS);
        assert_eq!(grid.issues.warnings_with("POSSESSION_SUM"), 1);
        assert!(grid.issues.warnings[0].message.contains("1.06"));
    }

    #[test]
    fn blank_possession_is_zero_with_warning() {
        let mut blocks = full_blocks();
        blocks[3].1 = Data::Empty;
        let grid = extract_grid(&grid_sheet("s", &blocks), &Thresholds::default()).unwrap();
        assert_eq!(grid.stats[3].possession, 0.0);
        assert_eq!(grid.issues.warnings_with("MISSING_POSSESSION"), 1);
        // A zero possession is not also reported as a bad sum.
        assert_eq!(grid.issues.warnings_with("POSSESSION_SUM"), 0);
    }

    #[test]
    fn halves_not_matching_full_time_warns() {
        let mut blocks = full_blocks();
        blocks[4].0 = Some("2-15");
        let grid = extract_grid(&grid_sheet("s", &blocks), &Thresholds::default()).unwrap();
        assert_eq!(grid.issues.warnings_with("SCORE_MISMATCH"), 1);
    }

    #[test]
    fn bad_score_text_warns_and_is_dropped() {
        let mut blocks = full_blocks();
        blocks[2].0 = Some("one-five");
        let grid = extract_grid(&grid_sheet("s", &blocks), &Thresholds::default()).unwrap();
        assert_eq!(grid.scores.home_second_half, None);
        assert_eq!(grid.issues.warnings_with("INVALID_SCORE"), 1);
    }

    #[test]
    fn missing_block_is_grid_count_error() {
        let blocks = full_blocks();
        let sheet = grid_sheet("s", &blocks[..5]);
        let err = extract_grid(&sheet, &Thresholds::default()).unwrap_err();
        match err {
            EtlError::GridCount {
                expected, found, ..
            } => {
                assert_eq!(expected, 6);
                assert_eq!(found, 5);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
