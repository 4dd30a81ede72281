// The six standard validation layers.

use std::collections::HashMap;

use drumstats_core::error::EtlError;
use drumstats_core::model::{FieldCategory, FieldKind, FieldValue, PlayerField, PositionCode};
use drumstats_core::result::{IssueContext, Issues};
use drumstats_core::score::Score;

use super::{LayerReport, ValidationInput, ValidationLayer};
use crate::roster::PlayerRow;

/// Largest plausible per-match count for any counting statistic.
pub const MAX_COUNT: i64 = 500;
pub const MIN_JERSEY: i64 = 1;
pub const MAX_JERSEY: i64 = 99;

fn row_ctx(sheet: &str, player: &PlayerRow) -> IssueContext {
    IssueContext::sheet(sheet).at_row(player.row)
}

fn field_error(
    issues: &mut Issues,
    sheet: &str,
    player: &PlayerRow,
    field: &str,
    message: String,
) {
    let err = EtlError::FieldValidation {
        field: field.to_string(),
        row: player.row + 1,
        message,
    };
    issues.record(&err, row_ctx(sheet, player));
}

// ---------------------------------------------------------------------------
// 1. Structure
// ---------------------------------------------------------------------------

/// The sheet has recognizable statistic columns and at least one player.
pub struct StructureLayer;

impl ValidationLayer for StructureLayer {
    fn name(&self) -> &'static str {
        "structure"
    }

    fn is_gate(&self) -> bool {
        true
    }

    fn validate(&self, input: &ValidationInput<'_>) -> LayerReport {
        let roster = input.roster;
        let mut report = LayerReport::default();
        let ctx = || IssueContext::sheet(roster.sheet);

        if roster.field_map.is_empty() {
            report.issues.error(
                "STRUCTURE_ERROR",
                "no recognizable statistic columns in the header row",
                ctx(),
            );
            report.fatal = true;
        }
        if roster.players.is_empty() {
            report
                .issues
                .error("STRUCTURE_ERROR", "roster has no player rows", ctx());
            report.fatal = true;
        }
        report
    }
}

// ---------------------------------------------------------------------------
// 2. Identification
// ---------------------------------------------------------------------------

/// Every player has a usable jersey number and a name.
pub struct IdentificationLayer;

impl ValidationLayer for IdentificationLayer {
    fn name(&self) -> &'static str {
        "identification"
    }

    fn validate(&self, input: &ValidationInput<'_>) -> LayerReport {
        let sheet = input.roster.sheet;
        let mut report = LayerReport::default();
        let mut seen: HashMap<i64, &str> = HashMap::new();

        for (idx, player, _) in input.accepted_players() {
            let name = player.name.as_deref().filter(|n| !n.trim().is_empty());
            let Some(name) = name else {
                field_error(
                    &mut report.issues,
                    sheet,
                    player,
                    "name",
                    "player name is empty; row skipped".into(),
                );
                report.rejected.insert(idx);
                continue;
            };

            let jersey = match player.jersey {
                Some(j) if (MIN_JERSEY..=MAX_JERSEY).contains(&j) => j,
                other => {
                    let shown = other.map_or("missing".to_string(), |j| j.to_string());
                    field_error(
                        &mut report.issues,
                        sheet,
                        player,
                        "jersey",
                        format!("jersey number {shown} for {name} is not in {MIN_JERSEY}..={MAX_JERSEY}; row skipped"),
                    );
                    report.rejected.insert(idx);
                    continue;
                }
            };

            if let Some(first) = seen.insert(jersey, name) {
                report.issues.warning(
                    "DUPLICATE_JERSEY",
                    format!("jersey {jersey} is worn by both {first} and {name}"),
                    row_ctx(sheet, player),
                );
            }
        }
        report
    }
}

// ---------------------------------------------------------------------------
// 3. Data types and ranges
// ---------------------------------------------------------------------------

/// Values are numbers where numbers are expected and within plausible ranges.
pub struct DataTypeLayer;

impl ValidationLayer for DataTypeLayer {
    fn name(&self) -> &'static str {
        "data-type"
    }

    fn validate(&self, input: &ValidationInput<'_>) -> LayerReport {
        let sheet = input.roster.sheet;
        let max_minutes = input.roster.thresholds.max_minutes;
        let mut report = LayerReport::default();

        for (_, player, _) in input.accepted_players() {
            for (field, raw) in &player.invalid {
                field_error(
                    &mut report.issues,
                    sheet,
                    player,
                    field.column(),
                    format!("`{raw}` is not a valid {:?} value", field.kind()),
                );
            }

            for (&field, value) in &player.values {
                if let Some(message) = range_problem(field, value, max_minutes) {
                    field_error(&mut report.issues, sheet, player, field.column(), message);
                }
            }
        }
        report
    }
}

fn range_problem(field: PlayerField, value: &FieldValue, max_minutes: i64) -> Option<String> {
    match (field, field.kind()) {
        (PlayerField::MinutesPlayed, _) => {
            let minutes = value.as_i64()?;
            (!(0..=max_minutes).contains(&minutes))
                .then(|| format!("minutes played {minutes} is not in 0..={max_minutes}"))
        }
        (PlayerField::Scores, _) => {
            let text = value.as_text()?;
            text.parse::<Score>()
                .err()
                .map(|e| e.to_string())
        }
        (_, FieldKind::Integer) => {
            let count = value.as_i64()?;
            (!(0..=MAX_COUNT).contains(&count))
                .then(|| format!("{count} is not in 0..={MAX_COUNT}"))
        }
        (_, FieldKind::Ratio) => {
            let ratio = value.as_f64()?;
            (!(0.0..=1.0).contains(&ratio)).then(|| format!("ratio {ratio} is not in [0, 1]"))
        }
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// 4. Cross-field consistency
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    Equals,
    AtLeast,
    AtMost,
}

/// `total <relation> sum(parts)`.
pub struct CrossFieldRule {
    pub total: PlayerField,
    pub relation: Relation,
    pub parts: &'static [PlayerField],
}

pub const CROSS_FIELD_RULES: &[CrossFieldRule] = &[
    CrossFieldRule {
        total: PlayerField::Shots,
        relation: Relation::Equals,
        parts: &[
            PlayerField::ShotPoints,
            PlayerField::ShotTwoPointers,
            PlayerField::ShotGoals,
            PlayerField::ShotWides,
            PlayerField::ShotShort,
            PlayerField::ShotSaved,
            PlayerField::ShotWoodwork,
            PlayerField::ShotBlocked,
        ],
    },
    CrossFieldRule {
        total: PlayerField::FreesTaken,
        relation: Relation::Equals,
        parts: &[
            PlayerField::FreePoints,
            PlayerField::FreeTwoPointers,
            PlayerField::FreeGoals,
            PlayerField::FreeWides,
            PlayerField::FreeShort,
            PlayerField::FreeSaved,
            PlayerField::FreeWoodwork,
        ],
    },
    CrossFieldRule {
        total: PlayerField::Tackles,
        relation: Relation::Equals,
        parts: &[PlayerField::TacklesContact, PlayerField::TacklesMissed],
    },
    CrossFieldRule {
        total: PlayerField::TacklesWon,
        relation: Relation::AtMost,
        parts: &[PlayerField::Tackles],
    },
    CrossFieldRule {
        total: PlayerField::GkKickoutsTotal,
        relation: Relation::Equals,
        parts: &[PlayerField::GkKickoutsRetained, PlayerField::GkKickoutsLost],
    },
    CrossFieldRule {
        total: PlayerField::AssistsTotal,
        relation: Relation::AtLeast,
        parts: &[
            PlayerField::AssistsPoint,
            PlayerField::AssistsGoal,
            PlayerField::AssistsTwoPoint,
        ],
    },
];

/// Totals agree with their breakdowns. A rule applies only when the sheet
/// carries the total and every part; blank cells count as zero.
pub struct CrossFieldLayer;

impl ValidationLayer for CrossFieldLayer {
    fn name(&self) -> &'static str {
        "cross-field"
    }

    fn validate(&self, input: &ValidationInput<'_>) -> LayerReport {
        let roster = input.roster;
        let mut report = LayerReport::default();
        let rules: Vec<&CrossFieldRule> = CROSS_FIELD_RULES
            .iter()
            .filter(|rule| {
                roster.field_map.column_of(rule.total).is_some()
                    && rule
                        .parts
                        .iter()
                        .all(|&p| roster.field_map.column_of(p).is_some())
            })
            .collect();

        for (_, player, _) in input.accepted_players() {
            for rule in &rules {
                let total = player.int(rule.total);
                let sum = rule
                    .parts
                    .iter()
                    .fold(0i64, |acc, &p| acc.saturating_add(player.int(p)));
                let ok = match rule.relation {
                    Relation::Equals => total == sum,
                    Relation::AtLeast => total >= sum,
                    Relation::AtMost => total <= sum,
                };
                if !ok {
                    let parts: Vec<&str> = rule.parts.iter().map(|p| p.column()).collect();
                    let op = match rule.relation {
                        Relation::Equals => "=",
                        Relation::AtLeast => ">=",
                        Relation::AtMost => "<=",
                    };
                    field_error(
                        &mut report.issues,
                        roster.sheet,
                        player,
                        rule.total.column(),
                        format!(
                            "{} for {}: {total} {op} {} ({sum}) does not hold",
                            rule.total.column(),
                            player.display_name(),
                            parts.join(" + ")
                        ),
                    );
                }
            }
        }
        report
    }
}

// ---------------------------------------------------------------------------
// 5. Position-specific plausibility
// ---------------------------------------------------------------------------

pub const GK_MAX_SHOTS: i64 = 3;
pub const FWD_IDLE_MINUTES: i64 = 30;

/// Statistics that look out of place for the player's position.
pub struct PositionLayer;

impl ValidationLayer for PositionLayer {
    fn name(&self) -> &'static str {
        "position"
    }

    fn validate(&self, input: &ValidationInput<'_>) -> LayerReport {
        let sheet = input.roster.sheet;
        let mut report = LayerReport::default();

        for (_, player, position) in input.accepted_players() {
            let Some(position) = position else { continue };
            let mut warn = |message: String| {
                report
                    .issues
                    .warning("POSITION_RULE", message, row_ctx(sheet, player));
            };
            let name = player.display_name();

            match position {
                PositionCode::GK => {
                    let shots = player.int(PlayerField::Shots);
                    if shots > GK_MAX_SHOTS {
                        warn(format!("goalkeeper {name} has {shots} shots"));
                    }
                }
                other => {
                    let gk_stats: Vec<&str> = player
                        .values
                        .iter()
                        .filter(|(f, v)| {
                            f.category() == FieldCategory::Goalkeeper
                                && v.as_f64().is_some_and(|n| n != 0.0)
                        })
                        .map(|(f, _)| f.column())
                        .collect();
                    if !gk_stats.is_empty() {
                        warn(format!(
                            "{} {name} has goalkeeper statistics: {}",
                            other.name().to_lowercase(),
                            gk_stats.join(", ")
                        ));
                    }
                    if other == PositionCode::FWD {
                        let involvement = player
                            .int(PlayerField::Shots)
                            .saturating_add(player.int(PlayerField::Attacks))
                            .saturating_add(player.int(PlayerField::AssistsTotal));
                        let minutes = player.int(PlayerField::MinutesPlayed);
                        if involvement == 0 && minutes > FWD_IDLE_MINUTES {
                            warn(format!(
                                "forward {name} played {minutes} minutes with no shots, attacks or assists"
                            ));
                        }
                    }
                }
            }
        }
        report
    }
}

// ---------------------------------------------------------------------------
// 6. Business rules
// ---------------------------------------------------------------------------

pub const MAX_RED_CARDS: i64 = 1;
pub const MAX_YELLOW_CARDS: i64 = 2;
pub const MAX_BLACK_CARDS: i64 = 1;

/// Discipline limits, roster size, and player scores against the team total.
pub struct BusinessRuleLayer;

impl ValidationLayer for BusinessRuleLayer {
    fn name(&self) -> &'static str {
        "business-rule"
    }

    fn validate(&self, input: &ValidationInput<'_>) -> LayerReport {
        let roster = input.roster;
        let sheet = roster.sheet;
        let thresholds = roster.thresholds;
        let mut report = LayerReport::default();
        let mut scored = 0i64;

        for (_, player, _) in input.accepted_players() {
            let name = player.display_name();
            let red = player.int(PlayerField::RedCards);
            if red > MAX_RED_CARDS {
                field_error(
                    &mut report.issues,
                    sheet,
                    player,
                    PlayerField::RedCards.column(),
                    format!("{name} has {red} red cards"),
                );
            }
            let yellow = player.int(PlayerField::YellowCards);
            if yellow > MAX_YELLOW_CARDS {
                report.issues.warning(
                    "DISCIPLINE",
                    format!("{name} has {yellow} yellow cards"),
                    row_ctx(sheet, player),
                );
            }
            let black = player.int(PlayerField::BlackCards);
            if black > MAX_BLACK_CARDS {
                report.issues.warning(
                    "DISCIPLINE",
                    format!("{name} has {black} black cards"),
                    row_ctx(sheet, player),
                );
            }
            scored = scored.saturating_add(points_scored(player));
        }

        let size = input.accepted.len();
        if size < thresholds.min_roster_size || size > thresholds.max_roster_size {
            report.issues.warning(
                "ROSTER_SIZE",
                format!(
                    "{size} players on the roster, expected {}..={}",
                    thresholds.min_roster_size, thresholds.max_roster_size
                ),
                IssueContext::sheet(sheet),
            );
        }

        if let Some(full_time) = roster.team.and_then(|t| t.full_time) {
            let team_total = i64::from(full_time.total_points());
            if scored > team_total {
                report.issues.warning(
                    "SCORE_TOTAL",
                    format!(
                        "players account for {scored} points but the team scored {full_time} ({team_total})"
                    ),
                    IssueContext::sheet(sheet),
                );
            }
        }
        report
    }
}

/// Points a player scored: the `Scores` cell when it parses, otherwise the
/// shot and free outcomes. Saturates rather than wrapping on absurd counts.
pub fn points_scored(player: &PlayerRow) -> i64 {
    let from_text = player
        .values
        .get(&PlayerField::Scores)
        .and_then(FieldValue::as_text)
        .and_then(|t| t.parse::<Score>().ok());
    if let Some(score) = from_text {
        return i64::from(score.total_points());
    }
    [
        (PlayerField::ShotPoints, 1),
        (PlayerField::ShotTwoPointers, 2),
        (PlayerField::ShotGoals, 3),
        (PlayerField::FreePoints, 1),
        (PlayerField::FreeTwoPointers, 2),
        (PlayerField::FreeGoals, 3),
    ]
    .into_iter()
    .fold(0i64, |acc, (field, worth)| {
        acc.saturating_add(player.int(field).saturating_mul(worth))
    })
}
