// Whole-workbook imports against an in-memory store.

use calamine::Data;

use drumstats_core::config::Config;
use drumstats_core::db::{player_stat_i64, Database, StoreTable};
use drumstats_core::model::{Period, PlayerField, PositionCode, TeamAssignment, TeamSide};
use drumstats_core::result::{Entity, EtlResult};
use drumstats_etl::grid::{
    grid_column, ANCHOR_COL, ANCHOR_ROW, PERIOD_STRIDE, POSSESSION_OFFSET, SCORE_SOURCES_OFFSET,
    SHOT_SOURCES_OFFSET,
};
use drumstats_etl::kpi::KPI_SHEET;
use drumstats_etl::{CancelFlag, EtlPipeline, Sheet, Workbook};

// ---------------------------------------------------------------------------
// Workbook builders
// ---------------------------------------------------------------------------

fn s(v: &str) -> Data {
    Data::String(v.into())
}

fn f(v: f64) -> Data {
    Data::Float(v)
}

/// Scores and possession for the six blocks, home first within each period.
type Blocks = [(&'static str, f64); 6];

const STANDARD: Blocks = [
    ("0-06", 0.55),
    ("0-04", 0.45),
    ("1-05", 0.50),
    ("0-07", 0.50),
    ("1-11", 0.52),
    ("0-11", 0.48),
];

fn match_sheet(name: &str, title: &str, blocks: &Blocks) -> Sheet {
    let height = ANCHOR_ROW + SHOT_SOURCES_OFFSET + 8;
    let width = ANCHOR_COL + 3 * PERIOD_STRIDE;
    let mut rows = vec![vec![Data::Empty; width]; height];
    rows[0][0] = s(title);
    rows[1][0] = s("Venue");
    rows[1][1] = s("Pairc Na Drom");

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
        rows[ANCHOR_ROW][col] = s(score);
        rows[ANCHOR_ROW + POSSESSION_OFFSET][col] = f(*possession);
        for i in 0..8 {
            rows[ANCHOR_ROW + SCORE_SOURCES_OFFSET + i][col] = f(i as f64);
            rows[ANCHOR_ROW + SHOT_SOURCES_OFFSET + i][col] = f((i + 1) as f64);
        }
    }
    Sheet::from_rows(name, rows)
}

/// (jersey, name, minutes, shots, scores)
type PlayerLine = (f64, &'static str, f64, f64, &'static str);

fn roster_sheet(number: u32, players: &[PlayerLine]) -> Sheet {
    let mut rows = vec![
        vec![s("Player statistics")],
        vec![s("No."), s("Player Name"), s("Mins"), s("Shots"), s("Scores")],
    ];
    for &(jersey, name, minutes, shots, scores) in players {
        let scores = if scores.is_empty() { Data::Empty } else { s(scores) };
        rows.push(vec![f(jersey), s(name), f(minutes), f(shots), scores]);
    }
    Sheet::from_rows(format!("{number}. Player Stats"), rows)
}

fn position_sheet(name: &str, players: &[&str]) -> Sheet {
    let mut rows = vec![vec![s(name)], vec![s("Name")]];
    for player in players {
        rows.push(vec![s(player)]);
        rows.push(vec![s("Mins"), f(60.0)]);
        rows.push(vec![s("Rating"), f(7.0)]);
        rows.push(vec![]);
    }
    Sheet::from_rows(name, rows)
}

fn kpi_sheet() -> Sheet {
    let row = |number: Option<f64>, name: Option<&str>, outcome: &str, team: &str, psr: f64| {
        vec![
            number.map(f).unwrap_or(Data::Empty),
            name.map(s).unwrap_or(Data::Empty),
            s(outcome),
            s(team),
            f(psr),
            s(&format!("{outcome} event")),
        ]
    };
    Sheet::from_rows(
        KPI_SHEET,
        vec![
            ["Event #", "Event", "Outcome", "Team", "PSR", "Definition"]
                .into_iter()
                .map(s)
                .collect(),
            row(Some(1.0), Some("Kickout"), "Won Clean", "Home", 1.0),
            row(None, None, "Lost Clean", "Oppostion", -1.0),
            row(Some(2.0), Some("Attack"), "Score", "Both", 2.0),
            row(None, None, "Wide", "Both", -0.5),
        ],
    )
}

fn position_sheets() -> Vec<Sheet> {
    vec![
        position_sheet("Goalkeepers", &["Oisin Doherty"]),
        position_sheet("Defenders", &["Sean Murphy", "Mark Kelly"]),
        position_sheet("Midfielders", &["Mark Kelly"]),
        position_sheet("Forwards", &["Ciaran O'Kane"]),
    ]
}

const FIRST_ROSTER: [PlayerLine; 4] = [
    (1.0, "Oisin Doherty", 60.0, 0.0, ""),
    (6.0, "Mark Kelly", 60.0, 1.0, "0-01"),
    (11.0, "Ciaran O'Kane", 60.0, 6.0, "1-05"),
    (14.0, "Sean Murphy", 45.0, 1.0, ""),
];

fn season_workbook() -> Workbook {
    let mut sheets = vec![kpi_sheet()];
    sheets.extend(position_sheets());
    sheets.push(match_sheet(
        "1. League Drum vs Glack",
        "1. League Drum vs Glack 14.03.25",
        &STANDARD,
    ));
    sheets.push(roster_sheet(1, &FIRST_ROSTER));
    Workbook::from_sheets(sheets)
}

fn import(db: &Database, workbook: &Workbook) -> EtlResult {
    import_with(Config::default(), db, workbook)
}

fn import_with(config: Config, db: &Database, workbook: &Workbook) -> EtlResult {
    let mut pipeline = EtlPipeline::new(config, db);
    pipeline.run(workbook, &CancelFlag::new()).unwrap()
}

fn match_column(db: &Database, match_number: u32, column: &str) -> Option<String> {
    let conn = db.connection();
    conn.query_row(
        &format!("SELECT {column} FROM matches WHERE match_number = ?1"),
        [match_number],
        |row| row.get(0),
    )
    .unwrap()
}

fn match_id(db: &Database, match_number: u32) -> i64 {
    let conn = db.connection();
    conn.query_row(
        "SELECT id FROM matches WHERE match_number = ?1",
        [match_number],
        |row| row.get(0),
    )
    .unwrap()
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn imports_a_full_season_workbook() {
    let db = Database::open(":memory:").unwrap();
    let result = import(&db, &season_workbook());

    assert!(result.success, "errors: {:?}", result.errors);
    assert_eq!(result.counts(Entity::Match).created, 1);
    assert_eq!(result.counts(Entity::TeamStatistics).created, 6);
    assert_eq!(result.counts(Entity::Player).created, 4);
    assert_eq!(result.counts(Entity::PlayerStatistics).created, 4);
    assert_eq!(result.counts(Entity::KpiDefinition).created, 4);

    assert_eq!(db.count_rows(StoreTable::Matches).unwrap(), 1);
    assert_eq!(db.count_rows(StoreTable::TeamStatistics).unwrap(), 6);
    assert_eq!(db.count_rows(StoreTable::PlayerStatistics).unwrap(), 4);
}

#[test]
fn scores_and_date_survive_the_store() {
    let db = Database::open(":memory:").unwrap();
    import(&db, &season_workbook());

    assert_eq!(match_column(&db, 1, "home_first_half").as_deref(), Some("0-06"));
    assert_eq!(match_column(&db, 1, "home_full_time").as_deref(), Some("1-11"));
    assert_eq!(match_column(&db, 1, "away_full_time").as_deref(), Some("0-11"));
    assert_eq!(match_column(&db, 1, "match_date").as_deref(), Some("2025-03-14"));
    assert_eq!(match_column(&db, 1, "venue").as_deref(), Some("Pairc Na Drom"));

    let conn = db.connection();
    let year: i32 = conn
        .query_row("SELECT year FROM seasons", [], |row| row.get(0))
        .unwrap();
    assert_eq!(year, 2025);
}

#[test]
fn later_position_sheet_wins_duplicates() {
    let db = Database::open(":memory:").unwrap();
    let result = import(&db, &season_workbook());

    assert_eq!(result.warnings_with("DUPLICATE_POSITION_MAPPING"), 1);
    let players = db.list_players().unwrap();
    let kelly = players.iter().find(|p| p.full_name == "Mark Kelly").unwrap();
    assert_eq!(kelly.position, Some(PositionCode::MID));
    let keeper = players.iter().find(|p| p.jersey_number == 1).unwrap();
    assert_eq!(keeper.position, Some(PositionCode::GK));
}

#[test]
fn misspelled_opposition_is_normalized() {
    let db = Database::open(":memory:").unwrap();
    import(&db, &season_workbook());

    let kpis = db.list_kpis().unwrap();
    let lost = kpis.iter().find(|k| k.outcome == "Lost Clean").unwrap();
    assert_eq!(lost.team_assignment, TeamAssignment::Opposition);
    assert_eq!(lost.event_name, "Kickout");
    assert_eq!(lost.event_number, 1);
}

#[test]
fn kpi_import_is_idempotent() {
    let db = Database::open(":memory:").unwrap();
    let workbook = Workbook::from_sheets(vec![kpi_sheet()]);
    let mut pipeline = EtlPipeline::new(Config::default(), &db);

    let first = pipeline.run_kpi_only(&workbook).unwrap();
    assert_eq!(first.counts(Entity::KpiDefinition).created, 4);

    let second = pipeline.run_kpi_only(&workbook).unwrap();
    assert!(second.success);
    assert_eq!(second.counts(Entity::KpiDefinition).created, 0);
    assert_eq!(second.counts(Entity::KpiDefinition).skipped, 4);
    assert_eq!(db.count_rows(StoreTable::KpiDefinitions).unwrap(), 4);
}

#[test]
fn truncated_tab_takes_metadata_from_title_cell() {
    let db = Database::open(":memory:").unwrap();
    let workbook = Workbook::from_sheets(vec![
        match_sheet(
            "9. Championship Drum vs Slaught",
            "09. Championship Drum vs Slaughtmanus 26.09.25",
            &STANDARD,
        ),
        roster_sheet(9, &FIRST_ROSTER),
    ]);
    let result = import(&db, &workbook);
    assert!(result.success, "errors: {:?}", result.errors);
    assert_eq!(result.warnings_with("MATCH_NUMBER_MISMATCH"), 0);

    let conn = db.connection();
    let (competition, opposition, date): (String, String, String) = conn
        .query_row(
            "SELECT c.name, t.name, m.match_date
             FROM matches m
             JOIN competitions c ON c.id = m.competition_id
             JOIN teams t ON t.id = m.away_team_id
             WHERE m.match_number = 9",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .unwrap();
    assert_eq!(competition, "Championship");
    assert_eq!(opposition, "Slaughtmanus");
    assert_eq!(date, "2025-09-26");
}

#[test]
fn unknown_competition_falls_back_to_league() {
    let db = Database::open(":memory:").unwrap();
    let workbook = Workbook::from_sheets(vec![match_sheet(
        "2. Hurling Drum vs Banagher",
        "2. Hurling Drum vs Banagher 21.03.25",
        &STANDARD,
    )]);
    let result = import(&db, &workbook);
    assert_eq!(result.warnings_with("UNKNOWN_COMPETITION"), 1);

    let conn = db.connection();
    let name: String = conn
        .query_row("SELECT name FROM competitions", [], |row| row.get(0))
        .unwrap();
    assert_eq!(name, "League");
}

#[test]
fn similar_names_on_one_jersey_are_the_same_player() {
    let db = Database::open(":memory:").unwrap();
    let workbook = Workbook::from_sheets(vec![
        match_sheet("1. League Drum vs Glack", "1. League Drum vs Glack 14.03.25", &STANDARD),
        roster_sheet(
            1,
            &[
                (11.0, "Ciaran O'Kane", 60.0, 6.0, "1-05"),
                (14.0, "Sean Murphy", 60.0, 1.0, ""),
            ],
        ),
        match_sheet("2. League Drum vs Banagher", "2. League Drum vs Banagher 21.03.25", &STANDARD),
        roster_sheet(
            2,
            &[
                (11.0, "Ciaran OKane", 60.0, 7.0, "0-06"),
                (14.0, "Shane Mulholland", 60.0, 2.0, ""),
            ],
        ),
    ]);
    let result = import(&db, &workbook);
    assert!(result.success, "errors: {:?}", result.errors);
    assert_eq!(result.warnings_with("FUZZY_MATCH"), 1);

    let players = db.list_players().unwrap();
    assert_eq!(players.len(), 3);
    let ciaran = players.iter().find(|p| p.jersey_number == 11).unwrap();
    assert_eq!(ciaran.full_name, "Ciaran O'Kane");
    assert!(players.iter().any(|p| p.full_name == "Shane Mulholland"));

    let second = match_id(&db, 2);
    let conn = db.connection();
    let shots = player_stat_i64(&conn, second, ciaran.id, PlayerField::Shots).unwrap();
    assert_eq!(shots, Some(7));
}

#[test]
fn lopsided_possession_warns_but_loads() {
    let db = Database::open(":memory:").unwrap();
    let mut blocks = STANDARD;
    blocks[0].1 = 0.62;
    blocks[1].1 = 0.44;
    let workbook = Workbook::from_sheets(vec![
        match_sheet("1. League Drum vs Glack", "1. League Drum vs Glack 14.03.25", &blocks),
        roster_sheet(1, &FIRST_ROSTER),
    ]);
    let result = import(&db, &workbook);

    assert!(result.success, "errors: {:?}", result.errors);
    assert_eq!(result.warnings_with("POSSESSION_SUM"), 1);
    assert_eq!(db.count_rows(StoreTable::TeamStatistics).unwrap(), 6);
}

#[test]
fn percent_possession_is_scaled() {
    let db = Database::open(":memory:").unwrap();
    let mut blocks = STANDARD;
    blocks[0].1 = 55.0;
    blocks[1].1 = 45.0;
    let workbook = Workbook::from_sheets(vec![match_sheet(
        "1. League Drum vs Glack",
        "1. League Drum vs Glack 14.03.25",
        &blocks,
    )]);
    let result = import(&db, &workbook);
    assert_eq!(result.warnings_with("POSSESSION_SUM"), 0);

    let conn = db.connection();
    let possession: f64 = conn
        .query_row(
            "SELECT s.possession FROM match_team_statistics s
             JOIN teams t ON t.id = s.team_id
             WHERE t.name = 'Drum' AND s.period = ?1",
            [Period::First.as_str()],
            |row| row.get(0),
        )
        .unwrap();
    assert!((possession - 0.55).abs() < 1e-9);
}

#[test]
fn reimport_reports_conflict_and_keeps_store() {
    let db = Database::open(":memory:").unwrap();
    let workbook = season_workbook();
    import(&db, &workbook);

    let again = import(&db, &workbook);
    assert!(!again.success);
    assert_eq!(again.errors_with("CONFLICT_ERROR"), 1);
    assert_eq!(again.counts(Entity::KpiDefinition).skipped, 4);
    assert_eq!(db.count_rows(StoreTable::Matches).unwrap(), 1);
    assert_eq!(db.count_rows(StoreTable::TeamStatistics).unwrap(), 6);
    assert_eq!(db.count_rows(StoreTable::PlayerStatistics).unwrap(), 4);
}

#[test]
fn short_grid_fails_only_that_sheet() {
    let db = Database::open(":memory:").unwrap();
    let mut broken = match_sheet(
        "2. League Drum vs Banagher",
        "2. League Drum vs Banagher 21.03.25",
        &STANDARD,
    );
    // Rebuild without the full-time opposition block.
    let col = grid_column(Period::Full, TeamSide::Opposition);
    let mut rows: Vec<Vec<Data>> = (0..broken.height())
        .map(|r| (0..broken.width()).map(|c| broken.cell(r, c).clone()).collect())
        .collect();
    for row in rows.iter_mut() {
        row[col] = Data::Empty;
    }
    broken = Sheet::from_rows(broken.name(), rows);

    let workbook = Workbook::from_sheets(vec![
        match_sheet("1. League Drum vs Glack", "1. League Drum vs Glack 14.03.25", &STANDARD),
        broken,
    ]);
    let result = import(&db, &workbook);

    assert!(!result.success);
    assert_eq!(result.errors_with("GRID_COUNT_ERROR"), 1);
    assert_eq!(db.count_rows(StoreTable::Matches).unwrap(), 1);
    assert_eq!(db.count_rows(StoreTable::TeamStatistics).unwrap(), 6);
}

#[test]
fn bad_player_rows_are_rejected_individually() {
    let db = Database::open(":memory:").unwrap();
    let workbook = Workbook::from_sheets(vec![
        match_sheet("1. League Drum vs Glack", "1. League Drum vs Glack 14.03.25", &STANDARD),
        roster_sheet(
            1,
            &[
                (11.0, "Ciaran O'Kane", 60.0, 6.0, "1-05"),
                (120.0, "Too Big", 60.0, 1.0, ""),
            ],
        ),
    ]);
    let result = import(&db, &workbook);

    assert!(!result.success);
    assert_eq!(result.errors_with("FIELD_VALIDATION_ERROR"), 1);
    assert_eq!(result.counts(Entity::Player).created, 1);
    assert_eq!(db.count_rows(StoreTable::Matches).unwrap(), 1);
}

#[test]
fn two_rows_for_one_player_keep_the_first() {
    let db = Database::open(":memory:").unwrap();
    let workbook = Workbook::from_sheets(vec![
        match_sheet("1. League Drum vs Glack", "1. League Drum vs Glack 14.03.25", &STANDARD),
        roster_sheet(
            1,
            &[
                (5.0, "John Smith", 60.0, 4.0, ""),
                (5.0, "Jon Smith", 60.0, 1.0, ""),
            ],
        ),
    ]);
    let result = import(&db, &workbook);

    assert!(!result.success);
    assert_eq!(result.errors_with("FIELD_VALIDATION_ERROR"), 1);
    assert_eq!(result.warnings_with("DUPLICATE_JERSEY"), 1);
    assert_eq!(result.counts(Entity::PlayerStatistics).created, 1);
    assert_eq!(result.counts(Entity::PlayerStatistics).updated, 0);
    assert_eq!(db.count_rows(StoreTable::PlayerStatistics).unwrap(), 1);

    let players = db.list_players().unwrap();
    assert_eq!(players.len(), 1);
    let id = match_id(&db, 1);
    let conn = db.connection();
    let shots = player_stat_i64(&conn, id, players[0].id, PlayerField::Shots).unwrap();
    assert_eq!(shots, Some(4));
}

#[test]
fn absurd_counters_are_errors_not_crashes() {
    let db = Database::open(":memory:").unwrap();
    let huge = f(9e18);
    let headers = [
        "No.", "Player Name", "Mins", "Shots", "Points", "2 Pointers", "Goals", "Wides",
        "Short", "Saved", "Woodwork", "Blocked",
    ];
    let roster = Sheet::from_rows(
        "1. Player Stats",
        vec![
            vec![s("Player statistics")],
            headers.into_iter().map(s).collect(),
            vec![
                f(11.0),
                s("Ciaran O'Kane"),
                f(60.0),
                f(1.0),
                huge.clone(),
                f(0.0),
                f(0.0),
                huge,
                f(0.0),
                f(0.0),
                f(0.0),
                f(0.0),
            ],
        ],
    );
    let workbook = Workbook::from_sheets(vec![
        match_sheet("1. League Drum vs Glack", "1. League Drum vs Glack 14.03.25", &STANDARD),
        roster,
    ]);
    let result = import(&db, &workbook);

    assert!(!result.success);
    assert!(result.errors_with("FIELD_VALIDATION_ERROR") >= 1);
    assert!(result
        .errors
        .iter()
        .any(|e| e.message.contains("shots for Ciaran O'Kane")));
    assert_eq!(db.count_rows(StoreTable::Matches).unwrap(), 1);
}

#[test]
fn match_without_roster_still_loads_team_stats() {
    let db = Database::open(":memory:").unwrap();
    let workbook = Workbook::from_sheets(vec![match_sheet(
        "1. League Drum vs Glack",
        "1. League Drum vs Glack 14.03.25",
        &STANDARD,
    )]);
    let result = import(&db, &workbook);

    assert!(result.success);
    assert_eq!(result.warnings_with("MISSING_ROSTER"), 1);
    assert_eq!(result.warnings_with("POSITION_MAPPING_UNAVAILABLE"), 1);
    assert_eq!(db.count_rows(StoreTable::TeamStatistics).unwrap(), 6);
    assert_eq!(db.count_rows(StoreTable::Players).unwrap(), 0);
}

#[test]
fn configured_season_overrides_match_date() {
    let db = Database::open(":memory:").unwrap();
    let mut config = Config::default();
    config.import.season_year = Some(2024);
    import_with(config, &db, &season_workbook());

    let conn = db.connection();
    let year: i32 = conn
        .query_row("SELECT year FROM seasons", [], |row| row.get(0))
        .unwrap();
    assert_eq!(year, 2024);
}

#[test]
fn cancelled_run_loads_nothing() {
    let db = Database::open(":memory:").unwrap();
    let cancel = CancelFlag::new();
    cancel.cancel();
    let mut pipeline = EtlPipeline::new(Config::default(), &db);
    let result = pipeline.run(&season_workbook(), &cancel).unwrap();

    assert!(!result.success);
    assert_eq!(result.errors_with("CANCELLED"), 1);
    assert_eq!(db.count_rows(StoreTable::Matches).unwrap(), 0);
    assert_eq!(db.count_rows(StoreTable::KpiDefinitions).unwrap(), 0);
}

#[test]
fn workbook_without_match_or_kpi_sheets_is_fatal() {
    let db = Database::open(":memory:").unwrap();
    let workbook = Workbook::from_sheets(position_sheets());
    let mut pipeline = EtlPipeline::new(Config::default(), &db);
    let err = pipeline.run(&workbook, &CancelFlag::new()).unwrap_err();
    assert!(err.is_fatal());
    assert_eq!(err.code(), "MISSING_SHEET");
}
