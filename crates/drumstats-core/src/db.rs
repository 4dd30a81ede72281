// SQLite persistence layer for the normalized match-statistics store.
//
// `Database` owns the connection. Writes that must share a transaction are
// free functions over `&Connection`, so callers can run them inside
// `conn.transaction()` and roll back as a unit.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

use crate::model::{
    FieldKind, FieldValue, KpiDefinition, KpiKey, MatchScores, Player, PlayerField, PositionCode,
    SourceCounters, TeamAssignment, TeamPeriodStats,
};

/// SQLite-backed store for seasons, competitions, teams, matches, players,
/// statistics and KPI definitions.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) a SQLite database at `path` and ensure all tables
    /// exist. Pass `":memory:"` for an ephemeral in-memory database (useful
    /// for tests).
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {path}"))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA foreign_keys = ON;",
        )
        .context("failed to set database pragmas")?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS seasons (
                id   INTEGER PRIMARY KEY AUTOINCREMENT,
                year INTEGER NOT NULL UNIQUE
            );

            CREATE TABLE IF NOT EXISTS competitions (
                id        INTEGER PRIMARY KEY AUTOINCREMENT,
                season_id INTEGER NOT NULL REFERENCES seasons(id),
                name      TEXT NOT NULL,
                UNIQUE(season_id, name)
            );

            CREATE TABLE IF NOT EXISTS teams (
                id      INTEGER PRIMARY KEY AUTOINCREMENT,
                name    TEXT NOT NULL UNIQUE,
                is_home INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS positions (
                id   INTEGER PRIMARY KEY AUTOINCREMENT,
                code TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS players (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                jersey_number INTEGER NOT NULL,
                first_name    TEXT NOT NULL,
                last_name     TEXT NOT NULL,
                full_name     TEXT NOT NULL,
                position_id   INTEGER REFERENCES positions(id),
                is_active     INTEGER NOT NULL DEFAULT 1,
                updated_at    TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE INDEX IF NOT EXISTS idx_players_jersey ON players(jersey_number);

            CREATE TABLE IF NOT EXISTS matches (
                id               INTEGER PRIMARY KEY AUTOINCREMENT,
                competition_id   INTEGER NOT NULL REFERENCES competitions(id),
                match_number     INTEGER NOT NULL,
                home_team_id     INTEGER NOT NULL REFERENCES teams(id),
                away_team_id     INTEGER NOT NULL REFERENCES teams(id),
                match_date       TEXT,
                venue            TEXT,
                home_first_half  TEXT,
                home_second_half TEXT,
                home_full_time   TEXT,
                away_first_half  TEXT,
                away_second_half TEXT,
                away_full_time   TEXT,
                created_at       TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                UNIQUE(competition_id, match_number)
            );

            CREATE TABLE IF NOT EXISTS kpi_definitions (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                event_number    INTEGER NOT NULL,
                event_name      TEXT NOT NULL,
                outcome         TEXT NOT NULL,
                team_assignment TEXT NOT NULL,
                psr_value       REAL NOT NULL,
                definition      TEXT NOT NULL DEFAULT '',
                UNIQUE(event_number, event_name, outcome, team_assignment)
            );
            ",
        )
        .context("failed to create database schema")?;

        conn.execute_batch(&team_statistics_ddl())
            .context("failed to create match_team_statistics table")?;
        conn.execute_batch(&player_statistics_ddl())
            .context("failed to create match_player_statistics table")?;

        for code in PositionCode::ALL {
            conn.execute(
                "INSERT OR IGNORE INTO positions (code, name) VALUES (?1, ?2)",
                params![code.code(), code.name()],
            )
            .context("failed to seed positions")?;
        }

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Lock the store for a unit of work. The loader holds the guard for
    /// a whole match transaction, so keep it out of long-lived state.
    ///
    /// A poisoned lock means an earlier import panicked mid-write; that
    /// is treated as fatal.
    pub fn connection(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("database mutex poisoned")
    }

    /// Row count of one of the store's tables.
    pub fn count_rows(&self, table: StoreTable) -> Result<usize> {
        let conn = self.connection();
        let count: i64 = conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", table.name()), [], |row| {
                row.get(0)
            })
            .with_context(|| format!("failed to count rows in {}", table.name()))?;
        Ok(count as usize)
    }

    /// All players ordered by jersey number, then id.
    pub fn list_players(&self) -> Result<Vec<Player>> {
        let conn = self.connection();
        let mut stmt = conn
            .prepare(&format!("{PLAYER_SELECT} ORDER BY p.jersey_number, p.id"))
            .context("failed to prepare list_players query")?;
        let players = stmt
            .query_map([], player_from_row)
            .context("failed to query players")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map player rows")?;
        Ok(players)
    }

    /// All KPI definitions keyed by their unique key.
    pub fn list_kpis(&self) -> Result<Vec<KpiDefinition>> {
        let conn = self.connection();
        let existing = kpi_definitions(&conn)?;
        let mut defs: Vec<KpiDefinition> = existing
            .into_iter()
            .map(|(key, row)| KpiDefinition {
                event_number: key.event_number,
                event_name: key.event_name,
                outcome: key.outcome,
                team_assignment: key.team_assignment,
                psr_value: row.psr_value,
                definition: row.definition,
            })
            .collect();
        defs.sort_by(|a, b| a.key().cmp(&b.key()));
        Ok(defs)
    }
}

/// Tables a caller may count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreTable {
    Seasons,
    Competitions,
    Teams,
    Positions,
    Players,
    Matches,
    TeamStatistics,
    PlayerStatistics,
    KpiDefinitions,
}

impl StoreTable {
    fn name(self) -> &'static str {
        match self {
            StoreTable::Seasons => "seasons",
            StoreTable::Competitions => "competitions",
            StoreTable::Teams => "teams",
            StoreTable::Positions => "positions",
            StoreTable::Players => "players",
            StoreTable::Matches => "matches",
            StoreTable::TeamStatistics => "match_team_statistics",
            StoreTable::PlayerStatistics => "match_player_statistics",
            StoreTable::KpiDefinitions => "kpi_definitions",
        }
    }
}

// ---------------------------------------------------------------------------
// Generated DDL
// ---------------------------------------------------------------------------

fn team_statistics_columns() -> Vec<String> {
    let mut cols = Vec::with_capacity(16);
    for prefix in ["score", "shot"] {
        for name in SourceCounters::NAMES {
            cols.push(format!("{prefix}_{name}"));
        }
    }
    cols
}

fn team_statistics_ddl() -> String {
    let counters: Vec<String> = team_statistics_columns()
        .iter()
        .map(|c| format!("    {c} INTEGER NOT NULL DEFAULT 0,"))
        .collect();
    format!(
        "CREATE TABLE IF NOT EXISTS match_team_statistics (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    match_id   INTEGER NOT NULL REFERENCES matches(id),
    team_id    INTEGER NOT NULL REFERENCES teams(id),
    period     TEXT NOT NULL,
    possession REAL NOT NULL,
{}
    UNIQUE(match_id, team_id, period)
);",
        counters.join("\n")
    )
}

fn player_statistics_ddl() -> String {
    let fields: Vec<String> = PlayerField::ALL
        .iter()
        .map(|f| format!("    {} {},", f.column(), f.kind().sql_type()))
        .collect();
    format!(
        "CREATE TABLE IF NOT EXISTS match_player_statistics (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    match_id  INTEGER NOT NULL REFERENCES matches(id),
    player_id INTEGER NOT NULL REFERENCES players(id),
{}
    UNIQUE(match_id, player_id)
);",
        fields.join("\n")
    )
}

// ---------------------------------------------------------------------------
// Reference data
// ---------------------------------------------------------------------------

/// Row id plus whether this call created the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Upserted {
    pub id: i64,
    pub created: bool,
}

fn get_or_insert(
    conn: &Connection,
    select: &str,
    insert: &str,
    params: &[&dyn rusqlite::ToSql],
    what: &str,
) -> Result<Upserted> {
    let existing: Option<i64> = conn
        .query_row(select, params, |row| row.get(0))
        .optional()
        .with_context(|| format!("failed to look up {what}"))?;
    if let Some(id) = existing {
        return Ok(Upserted { id, created: false });
    }
    conn.execute(insert, params)
        .with_context(|| format!("failed to insert {what}"))?;
    Ok(Upserted {
        id: conn.last_insert_rowid(),
        created: true,
    })
}

/// Idempotent insert of a season keyed by year.
pub fn upsert_season(conn: &Connection, year: i32) -> Result<Upserted> {
    get_or_insert(
        conn,
        "SELECT id FROM seasons WHERE year = ?1",
        "INSERT INTO seasons (year) VALUES (?1)",
        &[&year],
        "season",
    )
}

/// Idempotent insert of a competition keyed by (season, name).
pub fn upsert_competition(conn: &Connection, season_id: i64, name: &str) -> Result<Upserted> {
    get_or_insert(
        conn,
        "SELECT id FROM competitions WHERE season_id = ?1 AND name = ?2",
        "INSERT INTO competitions (season_id, name) VALUES (?1, ?2)",
        &[&season_id, &name],
        "competition",
    )
}

/// Idempotent insert of a team keyed by name. Case-insensitive, so a
/// re-typed opposition name does not fork the team.
pub fn upsert_team(conn: &Connection, name: &str, is_home: bool) -> Result<Upserted> {
    let existing: Option<i64> = conn
        .query_row(
            "SELECT id FROM teams WHERE lower(name) = lower(?1)",
            params![name],
            |row| row.get(0),
        )
        .optional()
        .context("failed to look up team")?;
    if let Some(id) = existing {
        return Ok(Upserted { id, created: false });
    }
    conn.execute(
        "INSERT INTO teams (name, is_home) VALUES (?1, ?2)",
        params![name, is_home],
    )
    .context("failed to insert team")?;
    Ok(Upserted {
        id: conn.last_insert_rowid(),
        created: true,
    })
}

/// Position code → row id for every seeded position.
pub fn position_ids(conn: &Connection) -> Result<HashMap<PositionCode, i64>> {
    let mut stmt = conn
        .prepare("SELECT code, id FROM positions")
        .context("failed to prepare positions query")?;
    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
        .context("failed to query positions")?
        .collect::<std::result::Result<Vec<_>, _>>()
        .context("failed to map position rows")?;
    Ok(rows
        .into_iter()
        .filter_map(|(code, id)| PositionCode::from_code(&code).map(|c| (c, id)))
        .collect())
}

// ---------------------------------------------------------------------------
// Matches and team statistics
// ---------------------------------------------------------------------------

/// Everything needed to insert a match row.
#[derive(Debug, Clone)]
pub struct NewMatch<'a> {
    pub competition_id: i64,
    pub match_number: u32,
    pub home_team_id: i64,
    pub away_team_id: i64,
    pub date: Option<NaiveDate>,
    pub venue: Option<&'a str>,
    pub scores: &'a MatchScores,
}

pub fn find_match(conn: &Connection, competition_id: i64, match_number: u32) -> Result<Option<i64>> {
    conn.query_row(
        "SELECT id FROM matches WHERE competition_id = ?1 AND match_number = ?2",
        params![competition_id, match_number],
        |row| row.get(0),
    )
    .optional()
    .context("failed to look up match")
}

/// Insert a match row. Callers check `find_match` first; a duplicate here
/// surfaces as a UNIQUE constraint error.
pub fn insert_match(conn: &Connection, m: &NewMatch<'_>) -> Result<i64> {
    let s = m.scores;
    let fmt = |score: Option<crate::score::Score>| score.map(|s| s.to_string());
    conn.execute(
        "INSERT INTO matches
            (competition_id, match_number, home_team_id, away_team_id, match_date, venue,
             home_first_half, home_second_half, home_full_time,
             away_first_half, away_second_half, away_full_time)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            m.competition_id,
            m.match_number,
            m.home_team_id,
            m.away_team_id,
            m.date.map(|d| d.format("%Y-%m-%d").to_string()),
            m.venue,
            fmt(s.home_first_half),
            fmt(s.home_second_half),
            fmt(s.home_full_time),
            fmt(s.away_first_half),
            fmt(s.away_second_half),
            fmt(s.away_full_time),
        ],
    )
    .context("failed to insert match")?;
    Ok(conn.last_insert_rowid())
}

/// Insert one team-period statistics row.
pub fn insert_team_statistics(
    conn: &Connection,
    match_id: i64,
    team_id: i64,
    stats: &TeamPeriodStats,
) -> Result<()> {
    let columns = team_statistics_columns();
    let placeholders: Vec<String> = (5..5 + columns.len()).map(|i| format!("?{i}")).collect();
    let sql = format!(
        "INSERT INTO match_team_statistics (match_id, team_id, period, possession, {})
         VALUES (?1, ?2, ?3, ?4, {})",
        columns.join(", "),
        placeholders.join(", ")
    );

    let mut values: Vec<rusqlite::types::Value> = vec![
        match_id.into(),
        team_id.into(),
        stats.period.as_str().to_string().into(),
        stats.possession.into(),
    ];
    values.extend(stats.score_sources.to_array().iter().map(|&v| v.into()));
    values.extend(stats.shot_sources.to_array().iter().map(|&v| v.into()));

    conn.execute(&sql, params_from_iter(values))
        .context("failed to insert team statistics")?;
    Ok(())
}

pub fn count_team_statistics(conn: &Connection, match_id: i64) -> Result<usize> {
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM match_team_statistics WHERE match_id = ?1",
            params![match_id],
            |row| row.get(0),
        )
        .context("failed to count team statistics")?;
    Ok(count as usize)
}

// ---------------------------------------------------------------------------
// Players
// ---------------------------------------------------------------------------

const PLAYER_SELECT: &str = "SELECT p.id, p.jersey_number, p.first_name, p.last_name, p.full_name,
        pos.code, p.is_active
     FROM players p LEFT JOIN positions pos ON pos.id = p.position_id";

fn player_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Player> {
    let code: Option<String> = row.get(5)?;
    Ok(Player {
        id: row.get(0)?,
        jersey_number: row.get(1)?,
        first_name: row.get(2)?,
        last_name: row.get(3)?,
        full_name: row.get(4)?,
        position: code.as_deref().and_then(PositionCode::from_code),
        is_active: row.get(6)?,
    })
}

/// Active players wearing `jersey`, oldest first.
pub fn players_by_jersey(conn: &Connection, jersey: u32) -> Result<Vec<Player>> {
    let mut stmt = conn
        .prepare(&format!(
            "{PLAYER_SELECT} WHERE p.jersey_number = ?1 AND p.is_active = 1 ORDER BY p.id"
        ))
        .context("failed to prepare players_by_jersey query")?;
    let players = stmt
        .query_map(params![jersey], player_from_row)
        .context("failed to query players by jersey")?
        .collect::<std::result::Result<Vec<_>, _>>()
        .context("failed to map player rows")?;
    Ok(players)
}

/// Case-insensitive full-name match within a jersey number.
pub fn find_player_exact(conn: &Connection, jersey: u32, full_name: &str) -> Result<Option<Player>> {
    conn.query_row(
        &format!(
            "{PLAYER_SELECT} WHERE p.jersey_number = ?1 AND lower(p.full_name) = lower(?2)
             AND p.is_active = 1 ORDER BY p.id LIMIT 1"
        ),
        params![jersey, full_name],
        player_from_row,
    )
    .optional()
    .context("failed to look up player")
}

pub struct NewPlayer<'a> {
    pub jersey_number: u32,
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub full_name: &'a str,
    pub position_id: Option<i64>,
}

pub fn insert_player(conn: &Connection, p: &NewPlayer<'_>) -> Result<i64> {
    conn.execute(
        "INSERT INTO players (jersey_number, first_name, last_name, full_name, position_id)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![p.jersey_number, p.first_name, p.last_name, p.full_name, p.position_id],
    )
    .context("failed to insert player")?;
    Ok(conn.last_insert_rowid())
}

pub fn update_player_position(conn: &Connection, player_id: i64, position_id: i64) -> Result<()> {
    conn.execute(
        "UPDATE players SET position_id = ?2,
            updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
         WHERE id = ?1",
        params![player_id, position_id],
    )
    .context("failed to update player position")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Player statistics
// ---------------------------------------------------------------------------

fn field_sql_value(field: PlayerField, value: Option<&FieldValue>) -> rusqlite::types::Value {
    use rusqlite::types::Value;
    match (field.kind(), value) {
        (_, None) => Value::Null,
        (FieldKind::Integer, Some(v)) => v.as_i64().map(Value::Integer).unwrap_or(Value::Null),
        (FieldKind::Decimal | FieldKind::Ratio, Some(v)) => {
            v.as_f64().map(Value::Real).unwrap_or(Value::Null)
        }
        (FieldKind::Text, Some(FieldValue::Text(s))) => Value::Text(s.clone()),
        (FieldKind::Text, Some(v)) => v
            .as_f64()
            .map(|n| Value::Text(n.to_string()))
            .unwrap_or(Value::Null),
    }
}

/// Insert or replace the statistics row for (match, player). Returns `true`
/// when a new row was created.
pub fn upsert_player_statistics(
    conn: &Connection,
    match_id: i64,
    player_id: i64,
    values: &BTreeMap<PlayerField, FieldValue>,
) -> Result<bool> {
    let existed: bool = conn
        .query_row(
            "SELECT EXISTS(SELECT 1 FROM match_player_statistics WHERE match_id = ?1 AND player_id = ?2)",
            params![match_id, player_id],
            |row| row.get(0),
        )
        .context("failed to check player statistics")?;

    let columns: Vec<&str> = PlayerField::ALL.iter().map(|f| f.column()).collect();
    let placeholders: Vec<String> = (3..3 + columns.len()).map(|i| format!("?{i}")).collect();
    let updates: Vec<String> = columns.iter().map(|c| format!("{c} = excluded.{c}")).collect();
    let sql = format!(
        "INSERT INTO match_player_statistics (match_id, player_id, {})
         VALUES (?1, ?2, {})
         ON CONFLICT(match_id, player_id) DO UPDATE SET {}",
        columns.join(", "),
        placeholders.join(", "),
        updates.join(", ")
    );

    let mut sql_values: Vec<rusqlite::types::Value> = vec![match_id.into(), player_id.into()];
    sql_values.extend(
        PlayerField::ALL
            .iter()
            .map(|&f| field_sql_value(f, values.get(&f))),
    );

    conn.execute(&sql, params_from_iter(sql_values))
        .context("failed to upsert player statistics")?;
    Ok(!existed)
}

/// Read back one stored integer statistic. Used by tests and reporting.
pub fn player_stat_i64(
    conn: &Connection,
    match_id: i64,
    player_id: i64,
    field: PlayerField,
) -> Result<Option<i64>> {
    conn.query_row(
        &format!(
            "SELECT {} FROM match_player_statistics WHERE match_id = ?1 AND player_id = ?2",
            field.column()
        ),
        params![match_id, player_id],
        |row| row.get::<_, Option<i64>>(0),
    )
    .optional()
    .map(|v| v.flatten())
    .context("failed to read player statistic")
}

// ---------------------------------------------------------------------------
// KPI definitions
// ---------------------------------------------------------------------------

/// Stored mutable part of a KPI definition.
#[derive(Debug, Clone, PartialEq)]
pub struct KpiRow {
    pub id: i64,
    pub psr_value: f64,
    pub definition: String,
}

pub fn kpi_definitions(conn: &Connection) -> Result<HashMap<KpiKey, KpiRow>> {
    let mut stmt = conn
        .prepare(
            "SELECT id, event_number, event_name, outcome, team_assignment, psr_value, definition
             FROM kpi_definitions",
        )
        .context("failed to prepare kpi query")?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, u32>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, f64>(5)?,
                row.get::<_, String>(6)?,
            ))
        })
        .context("failed to query kpi definitions")?
        .collect::<std::result::Result<Vec<_>, _>>()
        .context("failed to map kpi rows")?;

    let mut map = HashMap::with_capacity(rows.len());
    for (id, event_number, event_name, outcome, team, psr_value, definition) in rows {
        let Some(team_assignment) = TeamAssignment::from_name(&team) else {
            continue;
        };
        map.insert(
            KpiKey {
                event_number,
                event_name,
                outcome,
                team_assignment,
            },
            KpiRow {
                id,
                psr_value,
                definition,
            },
        );
    }
    Ok(map)
}

pub fn insert_kpi(conn: &Connection, def: &KpiDefinition) -> Result<i64> {
    conn.execute(
        "INSERT INTO kpi_definitions
            (event_number, event_name, outcome, team_assignment, psr_value, definition)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            def.event_number,
            def.event_name,
            def.outcome,
            def.team_assignment.as_str(),
            def.psr_value,
            def.definition,
        ],
    )
    .context("failed to insert kpi definition")?;
    Ok(conn.last_insert_rowid())
}

pub fn update_kpi(conn: &Connection, id: i64, psr_value: f64, definition: &str) -> Result<()> {
    conn.execute(
        "UPDATE kpi_definitions SET psr_value = ?2, definition = ?3 WHERE id = ?1",
        params![id, psr_value, definition],
    )
    .context("failed to update kpi definition")?;
    Ok(())
}
