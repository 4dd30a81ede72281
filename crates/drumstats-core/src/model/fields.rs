// The closed set of per-player statistic fields recorded on roster sheets.

use std::collections::HashMap;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

/// Grouping used for display and for the position-specific rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldCategory {
    Summary,
    PossessionPlay,
    KickoutAnalysis,
    AttackingPlay,
    Shooting,
    Frees,
    Assists,
    Tackles,
    Discipline,
    Goalkeeper,
}

/// How a field's cell is coerced and stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldKind {
    /// Non-negative counter.
    Integer,
    /// Free-range decimal (two places).
    Decimal,
    /// Decimal constrained to [0, 1].
    Ratio,
    Text,
}

impl FieldKind {
    /// SQLite column affinity.
    pub fn sql_type(self) -> &'static str {
        match self {
            FieldKind::Integer => "INTEGER",
            FieldKind::Decimal | FieldKind::Ratio => "REAL",
            FieldKind::Text => "TEXT",
        }
    }
}

/// Static description of one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    /// Column name in `match_player_statistics`.
    pub column: &'static str,
    /// Canonical header text on the roster sheet.
    pub header: &'static str,
    pub category: FieldCategory,
    pub kind: FieldKind,
}

macro_rules! player_fields {
    ($( $variant:ident => ($column:literal, $header:literal, $category:ident, $kind:ident) ),+ $(,)?) => {
        /// One of the statistics recorded per player per match.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub enum PlayerField {
            $($variant),+
        }

        impl PlayerField {
            /// Every field, in sheet/column order.
            pub const ALL: &'static [PlayerField] = &[$(PlayerField::$variant),+];

            pub fn spec(self) -> FieldSpec {
                match self {
                    $(PlayerField::$variant => FieldSpec {
                        column: $column,
                        header: $header,
                        category: FieldCategory::$category,
                        kind: FieldKind::$kind,
                    }),+
                }
            }
        }
    };
}

player_fields! {
    // Summary
    MinutesPlayed => ("minutes_played", "Minutes Played", Summary, Integer),
    TotalEngagements => ("total_engagements", "Total Engagements", Summary, Integer),
    EngagementEfficiency => ("engagement_efficiency", "Engagement Efficiency", Summary, Ratio),
    Scores => ("scores", "Scores", Summary, Text),
    Psr => ("psr", "PSR", Summary, Decimal),
    PsrPerTouch => ("psr_per_touch", "PSR per Touch", Summary, Decimal),
    TotalPossessions => ("total_possessions", "Possessions", Summary, Integer),
    PossessionSuccess => ("possession_success", "Possession Success", Summary, Ratio),

    // Possession play
    Touches => ("touches", "Touches", PossessionPlay, Integer),
    Carries => ("carries", "Carries", PossessionPlay, Integer),
    PossessionsRetained => ("possessions_retained", "Possessions Retained", PossessionPlay, Integer),
    PossessionsLost => ("possessions_lost", "Possessions Lost", PossessionPlay, Integer),
    KickPasses => ("kick_passes", "Kick Passes", PossessionPlay, Integer),
    HandPasses => ("hand_passes", "Hand Passes", PossessionPlay, Integer),
    HandlingErrors => ("handling_errors", "Handling Errors", PossessionPlay, Integer),
    TurnoversWon => ("turnovers_won", "Turnovers Won", PossessionPlay, Integer),
    Interceptions => ("interceptions", "Interceptions", PossessionPlay, Integer),

    // Kickout analysis (as a receiver)
    KickoutDrumWon => ("kickout_drum_won", "KO Drum Won", KickoutAnalysis, Integer),
    KickoutDrumLost => ("kickout_drum_lost", "KO Drum Lost", KickoutAnalysis, Integer),
    KickoutDrumBreakWon => ("kickout_drum_break_won", "KO Drum Break Won", KickoutAnalysis, Integer),
    KickoutOppWon => ("kickout_opp_won", "KO Opp Won", KickoutAnalysis, Integer),
    KickoutOppLost => ("kickout_opp_lost", "KO Opp Lost", KickoutAnalysis, Integer),
    KickoutOppBreakWon => ("kickout_opp_break_won", "KO Opp Break Won", KickoutAnalysis, Integer),
    KickoutShortWon => ("kickout_short_won", "KO Short Won", KickoutAnalysis, Integer),
    KickoutLongWon => ("kickout_long_won", "KO Long Won", KickoutAnalysis, Integer),
    KickoutFoulsWon => ("kickout_fouls_won", "KO Fouls Won", KickoutAnalysis, Integer),

    // Attacking play
    Attacks => ("attacks", "Attacks", AttackingPlay, Integer),
    AttacksScored => ("attacks_scored", "Attacks Scored", AttackingPlay, Integer),
    AttacksWide => ("attacks_wide", "Attacks Wide", AttackingPlay, Integer),
    AttacksLost => ("attacks_lost", "Attacks Lost", AttackingPlay, Integer),
    KickInsRetained => ("kick_ins_retained", "Kick Ins Retained", AttackingPlay, Integer),
    KickInsLost => ("kick_ins_lost", "Kick Ins Lost", AttackingPlay, Integer),
    CarryInsRetained => ("carry_ins_retained", "Carry Ins Retained", AttackingPlay, Integer),
    CarryInsLost => ("carry_ins_lost", "Carry Ins Lost", AttackingPlay, Integer),

    // Shooting from play
    Shots => ("shots", "Shots", Shooting, Integer),
    ShotPoints => ("shot_points", "Points", Shooting, Integer),
    ShotTwoPointers => ("shot_two_pointers", "2 Pointers", Shooting, Integer),
    ShotGoals => ("shot_goals", "Goals", Shooting, Integer),
    ShotWides => ("shot_wides", "Wides", Shooting, Integer),
    ShotShort => ("shot_short", "Short", Shooting, Integer),
    ShotSaved => ("shot_saved", "Saved", Shooting, Integer),
    ShotWoodwork => ("shot_woodwork", "Woodwork", Shooting, Integer),
    ShotBlocked => ("shot_blocked", "Blocked", Shooting, Integer),
    FortyFivesWon => ("forty_fives_won", "45s Won", Shooting, Integer),

    // Frees
    FreesTaken => ("frees_taken", "Frees Taken", Frees, Integer),
    FreePoints => ("free_points", "Free Points", Frees, Integer),
    FreeTwoPointers => ("free_two_pointers", "Free 2 Pointers", Frees, Integer),
    FreeGoals => ("free_goals", "Free Goals", Frees, Integer),
    FreeWides => ("free_wides", "Free Wides", Frees, Integer),
    FreeShort => ("free_short", "Free Short", Frees, Integer),
    FreeSaved => ("free_saved", "Free Saved", Frees, Integer),
    FreeWoodwork => ("free_woodwork", "Free Woodwork", Frees, Integer),
    QuickFrees => ("quick_frees", "Quick Frees", Frees, Integer),
    FreesWon => ("frees_won", "Frees Won", Frees, Integer),

    // Assists
    AssistsTotal => ("assists_total", "Assists", Assists, Integer),
    AssistsPoint => ("assists_point", "Assists Point", Assists, Integer),
    AssistsGoal => ("assists_goal", "Assists Goal", Assists, Integer),
    AssistsTwoPoint => ("assists_two_point", "Assists 2 Point", Assists, Integer),
    AssistsFreeWon => ("assists_free_won", "Assists Free Won", Assists, Integer),
    AssistsShotMissed => ("assists_shot_missed", "Assists Shot Missed", Assists, Integer),

    // Tackles
    Tackles => ("tackles", "Tackles", Tackles, Integer),
    TacklesContact => ("tackles_contact", "Tackles Contact", Tackles, Integer),
    TacklesMissed => ("tackles_missed", "Tackles Missed", Tackles, Integer),
    TacklesWon => ("tackles_won", "Tackles Won", Tackles, Integer),
    TacklePercentage => ("tackle_percentage", "Tackle %", Tackles, Ratio),
    Blocks => ("blocks", "Blocks", Tackles, Integer),
    TurnoversForced => ("turnovers_forced", "Turnovers Forced", Tackles, Integer),
    Dispossessions => ("dispossessions", "Dispossessions", Tackles, Integer),

    // Discipline
    FreesConcededAttack => ("frees_conceded_attack", "Frees Conceded Attack", Discipline, Integer),
    FreesConcededMidfield => ("frees_conceded_midfield", "Frees Conceded Midfield", Discipline, Integer),
    FreesConcededDefence => ("frees_conceded_defence", "Frees Conceded Defence", Discipline, Integer),
    PenaltiesConceded => ("penalties_conceded", "Penalties Conceded", Discipline, Integer),
    YellowCards => ("yellow_cards", "Yellow Cards", Discipline, Integer),
    BlackCards => ("black_cards", "Black Cards", Discipline, Integer),
    RedCards => ("red_cards", "Red Cards", Discipline, Integer),
    DisciplineNotes => ("discipline_notes", "Discipline Notes", Discipline, Text),

    // Goalkeeper
    GkKickoutsTotal => ("gk_kickouts_total", "GK Kickouts", Goalkeeper, Integer),
    GkKickoutsRetained => ("gk_kickouts_retained", "GK Kickouts Retained", Goalkeeper, Integer),
    GkKickoutsLost => ("gk_kickouts_lost", "GK Kickouts Lost", Goalkeeper, Integer),
    GkKickoutsShort => ("gk_kickouts_short", "GK Kickouts Short", Goalkeeper, Integer),
    GkKickoutsLong => ("gk_kickouts_long", "GK Kickouts Long", Goalkeeper, Integer),
    GkKickoutPercentage => ("gk_kickout_percentage", "GK Kickout %", Goalkeeper, Ratio),
    GkSaves => ("gk_saves", "GK Saves", Goalkeeper, Integer),
    GkGoalsConceded => ("gk_goals_conceded", "GK Goals Conceded", Goalkeeper, Integer),
    GkPointsConceded => ("gk_points_conceded", "GK Points Conceded", Goalkeeper, Integer),
    GkPenaltiesSaved => ("gk_penalties_saved", "GK Penalties Saved", Goalkeeper, Integer),
}

/// Extra header spellings seen on older sheets.
const HEADER_ALIASES: &[(&str, PlayerField)] = &[
    ("mins", PlayerField::MinutesPlayed),
    ("minutes", PlayerField::MinutesPlayed),
    ("te", PlayerField::TotalEngagements),
    ("te/psr", PlayerField::EngagementEfficiency),
    ("psr/tp", PlayerField::PsrPerTouch),
    ("tp", PlayerField::TotalPossessions),
    ("total possessions", PlayerField::TotalPossessions),
    ("shots total", PlayerField::Shots),
    ("total shots", PlayerField::Shots),
    ("2pt", PlayerField::ShotTwoPointers),
    ("frees", PlayerField::FreesTaken),
    ("total assists", PlayerField::AssistsTotal),
    ("tackle percentage", PlayerField::TacklePercentage),
    ("yellow", PlayerField::YellowCards),
    ("black", PlayerField::BlackCards),
    ("red", PlayerField::RedCards),
    ("kickouts", PlayerField::GkKickoutsTotal),
    ("gk kickout percentage", PlayerField::GkKickoutPercentage),
];

/// Lowercase, trim, and collapse internal whitespace.
pub fn normalize_header(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn header_table() -> &'static HashMap<String, PlayerField> {
    static TABLE: OnceLock<HashMap<String, PlayerField>> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut table = HashMap::new();
        for &field in PlayerField::ALL {
            let spec = field.spec();
            table.insert(normalize_header(spec.header), field);
            table.insert(spec.column.replace('_', " "), field);
        }
        for &(alias, field) in HEADER_ALIASES {
            table.insert(alias.to_string(), field);
        }
        table
    })
}

impl PlayerField {
    /// Resolve header text from a roster sheet to a field.
    pub fn from_header(text: &str) -> Option<PlayerField> {
        header_table().get(&normalize_header(text)).copied()
    }

    pub fn column(self) -> &'static str {
        self.spec().column
    }

    pub fn kind(self) -> FieldKind {
        self.spec().kind
    }

    pub fn category(self) -> FieldCategory {
        self.spec().category
    }
}

// ---------------------------------------------------------------------------
// Field values
// ---------------------------------------------------------------------------

/// A coerced cell value for one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Integer(i64),
    Decimal(f64),
    Text(String),
}

impl FieldValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(v) => Some(*v),
            FieldValue::Decimal(v) if v.fract() == 0.0 => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Integer(v) => Some(*v as f64),
            FieldValue::Decimal(v) => Some(*v),
            FieldValue::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }
}
