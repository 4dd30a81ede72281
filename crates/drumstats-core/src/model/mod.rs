// Domain model shared by the extractors, validators and the store.

pub mod fields;

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::score::Score;

pub use fields::{FieldCategory, FieldKind, FieldSpec, FieldValue, PlayerField};

// ---------------------------------------------------------------------------
// Competitions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompetitionType {
    Championship,
    League,
    Cup,
    Friendly,
}

impl CompetitionType {
    pub const ALL: [CompetitionType; 4] = [
        CompetitionType::Championship,
        CompetitionType::League,
        CompetitionType::Cup,
        CompetitionType::Friendly,
    ];

    /// Case-insensitive parse of a competition name.
    pub fn from_name(s: &str) -> Option<Self> {
        let lower = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().to_lowercase() == lower)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CompetitionType::Championship => "Championship",
            CompetitionType::League => "League",
            CompetitionType::Cup => "Cup",
            CompetitionType::Friendly => "Friendly",
        }
    }
}

impl fmt::Display for CompetitionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Positions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PositionCode {
    GK,
    DEF,
    MID,
    FWD,
}

impl PositionCode {
    pub const ALL: [PositionCode; 4] = [
        PositionCode::GK,
        PositionCode::DEF,
        PositionCode::MID,
        PositionCode::FWD,
    ];

    pub fn from_code(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "GK" => Some(PositionCode::GK),
            "DEF" => Some(PositionCode::DEF),
            "MID" => Some(PositionCode::MID),
            "FWD" => Some(PositionCode::FWD),
            _ => None,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            PositionCode::GK => "GK",
            PositionCode::DEF => "DEF",
            PositionCode::MID => "MID",
            PositionCode::FWD => "FWD",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PositionCode::GK => "Goalkeeper",
            PositionCode::DEF => "Defender",
            PositionCode::MID => "Midfielder",
            PositionCode::FWD => "Forward",
        }
    }
}

impl fmt::Display for PositionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

// ---------------------------------------------------------------------------
// Team statistics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Period {
    First,
    Second,
    Full,
}

impl Period {
    pub const ALL: [Period; 3] = [Period::First, Period::Second, Period::Full];

    pub fn as_str(&self) -> &'static str {
        match self {
            Period::First => "1st",
            Period::Second => "2nd",
            Period::Full => "Full",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TeamSide {
    Home,
    Opposition,
}

impl TeamSide {
    pub const ALL: [TeamSide; 2] = [TeamSide::Home, TeamSide::Opposition];
}

/// Where a possession that ended in a score (or shot) began.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceCounters {
    pub kickout_long: i64,
    pub kickout_short: i64,
    pub opp_kickout_long: i64,
    pub opp_kickout_short: i64,
    pub turnover: i64,
    pub possession_lost: i64,
    pub shot_short: i64,
    pub throw_up: i64,
}

impl SourceCounters {
    pub const NAMES: [&'static str; 8] = [
        "kickout_long",
        "kickout_short",
        "opp_kickout_long",
        "opp_kickout_short",
        "turnover",
        "possession_lost",
        "shot_short",
        "throw_up",
    ];

    pub fn from_array(v: [i64; 8]) -> Self {
        SourceCounters {
            kickout_long: v[0],
            kickout_short: v[1],
            opp_kickout_long: v[2],
            opp_kickout_short: v[3],
            turnover: v[4],
            possession_lost: v[5],
            shot_short: v[6],
            throw_up: v[7],
        }
    }

    pub fn to_array(&self) -> [i64; 8] {
        [
            self.kickout_long,
            self.kickout_short,
            self.opp_kickout_long,
            self.opp_kickout_short,
            self.turnover,
            self.possession_lost,
            self.shot_short,
            self.throw_up,
        ]
    }

    pub fn total(&self) -> i64 {
        self.to_array().iter().sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamPeriodStats {
    pub side: TeamSide,
    pub period: Period,
    /// Fraction in [0, 1].
    pub possession: f64,
    pub score_sources: SourceCounters,
    pub shot_sources: SourceCounters,
}

/// Half-time and full-time scores for both teams.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchScores {
    pub home_first_half: Option<Score>,
    pub home_second_half: Option<Score>,
    pub home_full_time: Option<Score>,
    pub away_first_half: Option<Score>,
    pub away_second_half: Option<Score>,
    pub away_full_time: Option<Score>,
}

impl MatchScores {
    pub fn get(&self, side: TeamSide, period: Period) -> Option<Score> {
        match (side, period) {
            (TeamSide::Home, Period::First) => self.home_first_half,
            (TeamSide::Home, Period::Second) => self.home_second_half,
            (TeamSide::Home, Period::Full) => self.home_full_time,
            (TeamSide::Opposition, Period::First) => self.away_first_half,
            (TeamSide::Opposition, Period::Second) => self.away_second_half,
            (TeamSide::Opposition, Period::Full) => self.away_full_time,
        }
    }

    pub fn set(&mut self, side: TeamSide, period: Period, score: Option<Score>) {
        let slot = match (side, period) {
            (TeamSide::Home, Period::First) => &mut self.home_first_half,
            (TeamSide::Home, Period::Second) => &mut self.home_second_half,
            (TeamSide::Home, Period::Full) => &mut self.home_full_time,
            (TeamSide::Opposition, Period::First) => &mut self.away_first_half,
            (TeamSide::Opposition, Period::Second) => &mut self.away_second_half,
            (TeamSide::Opposition, Period::Full) => &mut self.away_full_time,
        };
        *slot = score;
    }
}

// ---------------------------------------------------------------------------
// Matches
// ---------------------------------------------------------------------------

/// Identity of a match as read from its sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchMetadata {
    pub match_number: u32,
    pub competition: CompetitionType,
    pub home_team: String,
    pub opposition: String,
    pub date: Option<NaiveDate>,
    pub venue: Option<String>,
}

// ---------------------------------------------------------------------------
// Players
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub id: i64,
    pub jersey_number: u32,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
    pub position: Option<PositionCode>,
    pub is_active: bool,
}

// ---------------------------------------------------------------------------
// KPI definitions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TeamAssignment {
    Home,
    Opposition,
    Both,
}

impl TeamAssignment {
    pub fn from_name(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "home" => Some(TeamAssignment::Home),
            "opposition" => Some(TeamAssignment::Opposition),
            "both" => Some(TeamAssignment::Both),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TeamAssignment::Home => "Home",
            TeamAssignment::Opposition => "Opposition",
            TeamAssignment::Both => "Both",
        }
    }
}

/// Unique key of a KPI definition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct KpiKey {
    pub event_number: u32,
    pub event_name: String,
    pub outcome: String,
    pub team_assignment: TeamAssignment,
}

impl fmt::Display for KpiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, {}, {})",
            self.event_number,
            self.event_name,
            self.outcome,
            self.team_assignment.as_str()
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiDefinition {
    pub event_number: u32,
    pub event_name: String,
    pub outcome: String,
    pub team_assignment: TeamAssignment,
    pub psr_value: f64,
    pub definition: String,
}

impl KpiDefinition {
    pub fn key(&self) -> KpiKey {
        KpiKey {
            event_number: self.event_number,
            event_name: self.event_name.clone(),
            outcome: self.outcome.clone(),
            team_assignment: self.team_assignment,
        }
    }
}
