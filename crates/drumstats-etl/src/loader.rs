// Transactional loading of one match, and of the KPI definitions.
//
// Each match is written in its own transaction: reference data, the match
// row, its six team-period rows and every accepted player's statistics. Any
// failure rolls the whole match back and leaves other matches untouched.

use std::collections::{BTreeMap, HashMap, HashSet};

use rusqlite::{Connection, TransactionBehavior};
use tracing::{debug, info, warn};

use drumstats_core::db::{self, Database, NewMatch};
use drumstats_core::error::EtlError;
use drumstats_core::model::{
    FieldValue, KpiDefinition, MatchMetadata, MatchScores, PlayerField, PositionCode,
    TeamPeriodStats, TeamSide,
};
use drumstats_core::result::{Entity, EntityCounts, IssueContext, Issues};

use crate::grid::EXPECTED_RECORDS;
use crate::identity::{IdentityResolver, MatchOutcome};

/// Two PSR values closer than this are the same.
const PSR_EPSILON: f64 = 1e-9;

// ---------------------------------------------------------------------------
// Reference data
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferenceIds {
    pub season_id: i64,
    pub competition_id: i64,
    pub home_team_id: i64,
    pub away_team_id: i64,
}

/// Idempotently make sure the season, competition and both teams exist.
pub fn ensure_reference_data(
    conn: &Connection,
    season_year: i32,
    competition: &str,
    home: &str,
    opposition: &str,
    counts: &mut BTreeMap<Entity, EntityCounts>,
) -> anyhow::Result<ReferenceIds> {
    let mut tally = |entity: Entity, created: bool| {
        let c = counts.entry(entity).or_default();
        if created {
            c.created += 1;
        } else {
            c.skipped += 1;
        }
    };

    let season = db::upsert_season(conn, season_year)?;
    tally(Entity::Season, season.created);
    let comp = db::upsert_competition(conn, season.id, competition)?;
    tally(Entity::Competition, comp.created);
    let home_team = db::upsert_team(conn, home, true)?;
    tally(Entity::Team, home_team.created);
    let away_team = db::upsert_team(conn, opposition, false)?;
    tally(Entity::Team, away_team.created);

    Ok(ReferenceIds {
        season_id: season.id,
        competition_id: comp.id,
        home_team_id: home_team.id,
        away_team_id: away_team.id,
    })
}

// ---------------------------------------------------------------------------
// Match load
// ---------------------------------------------------------------------------

/// One accepted roster line ready to load.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerLoad {
    /// 0-based sheet row, for issue context.
    pub row: usize,
    pub jersey: u32,
    pub name: String,
    pub position: Option<PositionCode>,
    pub values: BTreeMap<PlayerField, FieldValue>,
}

/// Everything extracted for one match.
#[derive(Debug, Clone)]
pub struct MatchLoad<'a> {
    pub sheet: &'a str,
    /// Roster sheet the players came from, if any.
    pub roster_sheet: Option<&'a str>,
    pub metadata: &'a MatchMetadata,
    pub season_year: i32,
    pub scores: &'a MatchScores,
    pub team_stats: &'a [TeamPeriodStats],
    pub players: Vec<PlayerLoad>,
}

#[derive(Debug, Clone, Default)]
pub struct MatchLoadOutcome {
    pub match_id: i64,
    pub counts: BTreeMap<Entity, EntityCounts>,
    pub issues: Issues,
}

/// Load one match atomically.
pub fn load_match(
    db: &Database,
    resolver: &mut IdentityResolver,
    load: &MatchLoad<'_>,
) -> Result<MatchLoadOutcome, EtlError> {
    let mut conn = db.connection();
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(|e| EtlError::transaction("starting match transaction", e))?;

    let outcome = write_match(&tx, resolver, load)?;

    tx.commit()
        .map_err(|e| EtlError::transaction("committing match", e))?;
    info!(
        "loaded match {} ({} vs {}): {} players",
        load.metadata.match_number,
        load.metadata.home_team,
        load.metadata.opposition,
        load.players.len()
    );
    Ok(outcome)
}

fn write_match(
    conn: &Connection,
    resolver: &mut IdentityResolver,
    load: &MatchLoad<'_>,
) -> Result<MatchLoadOutcome, EtlError> {
    let m = load.metadata;
    let mut outcome = MatchLoadOutcome::default();

    if load.team_stats.len() != EXPECTED_RECORDS {
        return Err(EtlError::GridCount {
            sheet: load.sheet.to_string(),
            expected: EXPECTED_RECORDS,
            found: load.team_stats.len(),
        });
    }

    let ids = ensure_reference_data(
        conn,
        load.season_year,
        m.competition.as_str(),
        &m.home_team,
        &m.opposition,
        &mut outcome.counts,
    )
    .map_err(|e| EtlError::transaction("upserting reference data", e))?;

    let existing = db::find_match(conn, ids.competition_id, m.match_number)
        .map_err(|e| EtlError::transaction("looking up match", e))?;
    if existing.is_some() {
        return Err(EtlError::Conflict {
            competition: m.competition.to_string(),
            match_number: m.match_number,
        });
    }

    let match_id = db::insert_match(
        conn,
        &NewMatch {
            competition_id: ids.competition_id,
            match_number: m.match_number,
            home_team_id: ids.home_team_id,
            away_team_id: ids.away_team_id,
            date: m.date,
            venue: m.venue.as_deref(),
            scores: load.scores,
        },
    )
    .map_err(|e| EtlError::transaction("inserting match", e))?;
    outcome.match_id = match_id;
    outcome.counts.entry(Entity::Match).or_default().created += 1;

    for stats in load.team_stats {
        let team_id = match stats.side {
            TeamSide::Home => ids.home_team_id,
            TeamSide::Opposition => ids.away_team_id,
        };
        db::insert_team_statistics(conn, match_id, team_id, stats)
            .map_err(|e| EtlError::transaction("inserting team statistics", e))?;
    }
    let stored = db::count_team_statistics(conn, match_id)
        .map_err(|e| EtlError::transaction("counting team statistics", e))?;
    if stored != EXPECTED_RECORDS {
        return Err(EtlError::GridCount {
            sheet: load.sheet.to_string(),
            expected: EXPECTED_RECORDS,
            found: stored,
        });
    }
    outcome
        .counts
        .entry(Entity::TeamStatistics)
        .or_default()
        .created += stored;

    let roster_sheet = load.roster_sheet.unwrap_or(load.sheet);
    // A player gets one statistics row per match; later rows never overwrite it.
    let mut written: HashSet<i64> = HashSet::new();
    for player in &load.players {
        let resolution = resolver
            .resolve(conn, player.jersey, &player.name, player.position)
            .map_err(|e| EtlError::transaction("resolving player identity", e))?;

        let ctx = IssueContext::sheet(roster_sheet).at_row(player.row);
        if !written.insert(resolution.player_id) {
            warn!(
                "#{} `{}` resolves to `{}` who already has statistics for this match",
                player.jersey, player.name, resolution.stored_name
            );
            outcome.issues.record(
                &EtlError::FieldValidation {
                    field: "name".into(),
                    row: player.row + 1,
                    message: format!(
                        "#{} `{}` is the same player as `{}` already loaded for this match; row skipped",
                        player.jersey, player.name, resolution.stored_name
                    ),
                },
                ctx,
            );
            outcome
                .counts
                .entry(Entity::PlayerStatistics)
                .or_default()
                .skipped += 1;
            continue;
        }
        let players = outcome.counts.entry(Entity::Player).or_default();
        match resolution.outcome {
            MatchOutcome::Created => players.created += 1,
            MatchOutcome::Matched if !resolution.position_changed => players.skipped += 1,
            MatchOutcome::Matched => players.updated += 1,
            MatchOutcome::Fuzzy { distance } => {
                players.updated += 1;
                warn!(
                    "#{} `{}` matched stored player `{}` at distance {}",
                    player.jersey, player.name, resolution.stored_name, distance
                );
                outcome.issues.warning(
                    "FUZZY_MATCH",
                    format!(
                        "#{} `{}` matched stored player `{}` (edit distance {distance})",
                        player.jersey, player.name, resolution.stored_name
                    ),
                    ctx.clone(),
                );
            }
        }
        if resolution.position_changed {
            if let Some(position) = player.position {
                outcome.issues.warning(
                    "POSITION_CHANGED",
                    format!("{} now recorded as {}", resolution.stored_name, position),
                    ctx,
                );
            }
        }

        let created = db::upsert_player_statistics(conn, match_id, resolution.player_id, &player.values)
            .map_err(|e| EtlError::transaction("writing player statistics", e))?;
        let stats = outcome.counts.entry(Entity::PlayerStatistics).or_default();
        if created {
            stats.created += 1;
        } else {
            stats.updated += 1;
        }
    }

    debug!(
        "match {} written as id {} with {} team rows",
        m.match_number, match_id, stored
    );
    Ok(outcome)
}

// ---------------------------------------------------------------------------
// KPI definitions
// ---------------------------------------------------------------------------

/// Diff-based upsert of KPI definitions in one transaction.
pub fn load_kpis(db: &Database, definitions: &[KpiDefinition]) -> Result<EntityCounts, EtlError> {
    let mut conn = db.connection();
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(|e| EtlError::transaction("starting KPI transaction", e))?;

    let existing: HashMap<_, _> = db::kpi_definitions(&tx)
        .map_err(|e| EtlError::transaction("reading KPI definitions", e))?;

    let mut counts = EntityCounts::default();
    for def in definitions {
        match existing.get(&def.key()) {
            None => {
                db::insert_kpi(&tx, def)
                    .map_err(|e| EtlError::transaction("inserting KPI definition", e))?;
                counts.created += 1;
            }
            Some(row)
                if (row.psr_value - def.psr_value).abs() < PSR_EPSILON
                    && row.definition == def.definition =>
            {
                counts.skipped += 1;
            }
            Some(row) => {
                db::update_kpi(&tx, row.id, def.psr_value, &def.definition)
                    .map_err(|e| EtlError::transaction("updating KPI definition", e))?;
                counts.updated += 1;
            }
        }
    }

    tx.commit()
        .map_err(|e| EtlError::transaction("committing KPI definitions", e))?;
    info!(
        "KPI definitions: {} created, {} updated, {} unchanged",
        counts.created, counts.updated, counts.skipped
    );
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use drumstats_core::db::StoreTable;
    use drumstats_core::model::{CompetitionType, Period, SourceCounters, TeamAssignment};
    use drumstats_core::score::Score;

    fn metadata(number: u32) -> MatchMetadata {
        MatchMetadata {
            match_number: number,
            competition: CompetitionType::Championship,
            home_team: "Drum".into(),
            opposition: "Slaughtmanus".into(),
            date: NaiveDate::from_ymd_opt(2025, 9, 26),
            venue: Some("Owenbeg".into()),
        }
    }

    fn team_stats() -> Vec<TeamPeriodStats> {
        let mut stats = Vec::new();
        for period in Period::ALL {
            for side in TeamSide::ALL {
                stats.push(TeamPeriodStats {
                    side,
                    period,
                    possession: 0.5,
                    score_sources: SourceCounters::from_array([1, 0, 0, 0, 2, 0, 0, 0]),
                    shot_sources: SourceCounters::default(),
                });
            }
        }
        stats
    }

    fn scores() -> MatchScores {
        MatchScores {
            home_full_time: Some(Score::new(1, 10)),
            away_full_time: Some(Score::new(0, 9)),
            ..MatchScores::default()
        }
    }

    fn player(jersey: u32, name: &str, shots: i64) -> PlayerLoad {
        PlayerLoad {
            row: jersey as usize + 1,
            jersey,
            name: name.into(),
            position: Some(PositionCode::FWD),
            values: BTreeMap::from([(PlayerField::Shots, FieldValue::Integer(shots))]),
        }
    }

    fn kpi(number: u32, outcome: &str, psr: f64) -> KpiDefinition {
        KpiDefinition {
            event_number: number,
            event_name: "Kickout".into(),
            outcome: outcome.into(),
            team_assignment: TeamAssignment::Home,
            psr_value: psr,
            definition: format!("{outcome} kickout"),
        }
    }

    // -----------------------------------------------------------------------
    // Matches
    // -----------------------------------------------------------------------

    #[test]
    fn loads_match_with_six_team_rows() {
        let db = Database::open(":memory:").unwrap();
        let mut resolver = IdentityResolver::new(3);
        let meta = metadata(9);
        let stats = team_stats();
        let scores = scores();
        let load = MatchLoad {
            sheet: "09. Championship Drum vs Slaughtmanus",
            roster_sheet: Some("09. Player Stats"),
            metadata: &meta,
            season_year: 2025,
            scores: &scores,
            team_stats: &stats,
            players: vec![player(14, "Ciaran O'Kane", 4), player(15, "Sean Murphy", 2)],
        };

        let outcome = load_match(&db, &mut resolver, &load).unwrap();
        assert_eq!(outcome.counts[&Entity::Match].created, 1);
        assert_eq!(outcome.counts[&Entity::TeamStatistics].created, 6);
        assert_eq!(outcome.counts[&Entity::Team].created, 2);
        assert_eq!(outcome.counts[&Entity::Player].created, 2);
        assert_eq!(outcome.counts[&Entity::PlayerStatistics].created, 2);

        assert_eq!(db.count_rows(StoreTable::TeamStatistics).unwrap(), 6);
        assert_eq!(db.count_rows(StoreTable::PlayerStatistics).unwrap(), 2);

        let conn = db.connection();
        let player_id = db::find_player_exact(&conn, 14, "Ciaran O'Kane").unwrap().unwrap().id;
        assert_eq!(
            db::player_stat_i64(&conn, outcome.match_id, player_id, PlayerField::Shots).unwrap(),
            Some(4)
        );
    }

    #[test]
    fn reloading_match_conflicts_and_rolls_back() {
        let db = Database::open(":memory:").unwrap();
        let mut resolver = IdentityResolver::new(3);
        let meta = metadata(9);
        let stats = team_stats();
        let scores = scores();
        let load = MatchLoad {
            sheet: "09. Championship Drum vs Slaughtmanus",
            roster_sheet: None,
            metadata: &meta,
            season_year: 2025,
            scores: &scores,
            team_stats: &stats,
            players: vec![player(14, "Ciaran O'Kane", 4)],
        };
        load_match(&db, &mut resolver, &load).unwrap();

        let again = MatchLoad {
            players: vec![player(20, "New Sub", 0)],
            ..load.clone()
        };
        let err = load_match(&db, &mut resolver, &again).unwrap_err();
        assert_eq!(err.code(), "CONFLICT_ERROR");

        assert_eq!(db.count_rows(StoreTable::Matches).unwrap(), 1);
        assert_eq!(db.count_rows(StoreTable::Players).unwrap(), 1);
    }

    #[test]
    fn short_grid_is_grid_count_error() {
        let db = Database::open(":memory:").unwrap();
        let mut resolver = IdentityResolver::new(3);
        let meta = metadata(3);
        let stats = team_stats();
        let scores = scores();
        let load = MatchLoad {
            sheet: "3. Championship Drum vs Slaughtmanus",
            roster_sheet: None,
            metadata: &meta,
            season_year: 2025,
            scores: &scores,
            team_stats: &stats[..4],
            players: Vec::new(),
        };
        let err = load_match(&db, &mut resolver, &load).unwrap_err();
        assert!(matches!(err, EtlError::GridCount { found: 4, .. }));
        assert_eq!(db.count_rows(StoreTable::Matches).unwrap(), 0);
        assert_eq!(db.count_rows(StoreTable::Seasons).unwrap(), 0);
    }

    #[test]
    fn fuzzy_match_is_reported() {
        let db = Database::open(":memory:").unwrap();
        let mut resolver = IdentityResolver::new(3);
        let stats = team_stats();
        let scores = scores();

        let first = metadata(1);
        load_match(
            &db,
            &mut resolver,
            &MatchLoad {
                sheet: "1. Championship Drum vs Slaughtmanus",
                roster_sheet: None,
                metadata: &first,
                season_year: 2025,
                scores: &scores,
                team_stats: &stats,
                players: vec![player(14, "Ciaran O'Kane", 4)],
            },
        )
        .unwrap();

        let second = metadata(2);
        let outcome = load_match(
            &db,
            &mut resolver,
            &MatchLoad {
                sheet: "2. Championship Drum vs Slaughtmanus",
                roster_sheet: None,
                metadata: &second,
                season_year: 2025,
                scores: &scores,
                team_stats: &stats,
                players: vec![player(14, "Ciaran OKane", 1)],
            },
        )
        .unwrap();
        assert_eq!(outcome.issues.warnings_with("FUZZY_MATCH"), 1);
        assert_eq!(outcome.counts[&Entity::Player].updated, 1);
        assert_eq!(outcome.counts[&Entity::Season].skipped, 1);
        assert_eq!(db.count_rows(StoreTable::Players).unwrap(), 1);
    }

    #[test]
    fn second_row_for_same_player_is_not_loaded() {
        let db = Database::open(":memory:").unwrap();
        let mut resolver = IdentityResolver::new(3);
        let meta = metadata(4);
        let stats = team_stats();
        let scores = scores();
        let load = MatchLoad {
            sheet: "4. League Drum vs Glack",
            roster_sheet: Some("4. Player Stats"),
            metadata: &meta,
            season_year: 2025,
            scores: &scores,
            team_stats: &stats,
            players: vec![player(5, "John Smith", 4), player(5, "Jon Smith", 1)],
        };

        let outcome = load_match(&db, &mut resolver, &load).unwrap();
        assert_eq!(outcome.issues.errors_with("FIELD_VALIDATION_ERROR"), 1);
        assert!(outcome.issues.errors[0].message.contains("Jon Smith"));
        assert_eq!(outcome.counts[&Entity::PlayerStatistics].created, 1);
        assert_eq!(outcome.counts[&Entity::PlayerStatistics].updated, 0);
        assert_eq!(outcome.counts[&Entity::PlayerStatistics].skipped, 1);
        assert_eq!(db.count_rows(StoreTable::PlayerStatistics).unwrap(), 1);

        let conn = db.connection();
        let player_id = db::find_player_exact(&conn, 5, "John Smith").unwrap().unwrap().id;
        assert_eq!(
            db::player_stat_i64(&conn, outcome.match_id, player_id, PlayerField::Shots).unwrap(),
            Some(4)
        );
    }

    // -----------------------------------------------------------------------
    // KPI definitions
    // -----------------------------------------------------------------------

    #[test]
    fn kpi_reload_is_idempotent() {
        let db = Database::open(":memory:").unwrap();
        let defs = vec![kpi(1, "Won", 1.0), kpi(1, "Lost", -1.0)];

        let first = load_kpis(&db, &defs).unwrap();
        assert_eq!((first.created, first.updated, first.skipped), (2, 0, 0));

        let second = load_kpis(&db, &defs).unwrap();
        assert_eq!((second.created, second.updated, second.skipped), (0, 0, 2));
    }

    #[test]
    fn changed_psr_is_updated() {
        let db = Database::open(":memory:").unwrap();
        load_kpis(&db, &[kpi(1, "Won", 1.0)]).unwrap();

        let counts = load_kpis(&db, &[kpi(1, "Won", 1.5), kpi(2, "Won", 0.5)]).unwrap();
        assert_eq!((counts.created, counts.updated, counts.skipped), (1, 1, 0));

        let stored = db.list_kpis().unwrap();
        let won = stored
            .iter()
            .find(|k| k.event_number == 1)
            .unwrap();
        assert_eq!(won.psr_value, 1.5);
    }
}
