// End-to-end import of one workbook.
//
// Phases run in a fixed order: classify sheets, KPI definitions, position
// mapping, then every match sheet by match number. A failure inside one
// sheet is recorded and the run moves on; only a missing workbook or a
// workbook with nothing to import ends the run early.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{Datelike, Utc};
use tracing::{info, warn};

use drumstats_core::config::Config;
use drumstats_core::db::Database;
use drumstats_core::error::EtlError;
use drumstats_core::model::{CompetitionType, PositionCode};
use drumstats_core::result::{Entity, EtlResult, EtlRun, IssueContext};
use drumstats_core::score::Score;

use crate::grid::extract_grid;
use crate::identity::{infer_position, IdentityResolver};
use crate::kpi::{find_kpi_sheet, transform_kpis, KPI_SHEET};
use crate::loader::{load_kpis, load_match, MatchLoad, PlayerLoad};
use crate::positions::{read_position_mapping, PositionMapping, PositionMappingOutcome};
use crate::roster::extract_roster;
use crate::sheet::{classify, MetadataParser, SheetKind};
use crate::validation::{RosterInput, RosterValidator, TeamContext};
use crate::workbook::{Sheet, Workbook, WorkbookError};

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// Cooperative cancellation, checked between sheets.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        CancelFlag::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Workbook plan
// ---------------------------------------------------------------------------

/// Open a workbook file, mapping a missing file to the fatal error.
pub fn open_workbook(path: &Path) -> Result<Workbook, EtlError> {
    Workbook::open(path).map_err(|e| match e {
        WorkbookError::NotFound { path } => EtlError::FileNotFound { path },
        other => EtlError::Parsing {
            sheet: path.display().to_string(),
            message: other.to_string(),
        },
    })
}

/// Which sheet plays which part.
#[derive(Debug, Default)]
pub struct SheetPlan<'w> {
    /// Match sheets ordered by match number.
    pub matches: Vec<(u32, &'w Sheet)>,
    pub rosters: HashMap<u32, &'w Sheet>,
    pub kpi: Option<&'w Sheet>,
}

pub fn plan_sheets<'w>(workbook: &'w Workbook, run: &mut EtlRun) -> SheetPlan<'w> {
    let mut plan = SheetPlan {
        kpi: find_kpi_sheet(workbook),
        ..SheetPlan::default()
    };
    for sheet in workbook.sheets() {
        match classify(sheet.name()) {
            SheetKind::Match { number } => plan.matches.push((number, sheet)),
            SheetKind::Roster { number } => {
                if let Some(first) = plan.rosters.get(&number) {
                    warn!(
                        "two roster sheets for match {}: `{}` and `{}`",
                        number,
                        first.name(),
                        sheet.name()
                    );
                    run.issues_mut().warning(
                        "DUPLICATE_ROSTER_SHEET",
                        format!("match {number} already has roster `{}`; ignoring this one", first.name()),
                        IssueContext::sheet(sheet.name()),
                    );
                } else {
                    plan.rosters.insert(number, sheet);
                }
            }
            SheetKind::Kpi | SheetKind::Position | SheetKind::Other => {}
        }
    }
    plan.matches.sort_by_key(|(number, _)| *number);
    plan
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

pub struct EtlPipeline<'a> {
    config: Config,
    db: &'a Database,
    resolver: IdentityResolver,
    validator: RosterValidator,
    metadata: MetadataParser,
}

impl<'a> EtlPipeline<'a> {
    pub fn new(config: Config, db: &'a Database) -> Self {
        let default_competition = CompetitionType::from_name(&config.import.default_competition)
            .unwrap_or(CompetitionType::League);
        let metadata = MetadataParser::new(&config.import.home_team, default_competition);
        let resolver = IdentityResolver::new(config.thresholds.fuzzy_max_distance);
        EtlPipeline {
            config,
            db,
            resolver,
            validator: RosterValidator::default(),
            metadata,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Open and import a workbook file.
    pub fn import_file(&mut self, path: &Path, cancel: &CancelFlag) -> Result<EtlResult, EtlError> {
        let workbook = open_workbook(path)?;
        info!("opened {} ({} sheets)", path.display(), workbook.sheets().len());
        self.run(&workbook, cancel)
    }

    /// Import everything the workbook holds.
    pub fn run(&mut self, workbook: &Workbook, cancel: &CancelFlag) -> Result<EtlResult, EtlError> {
        let mut run = EtlRun::start();
        self.resolver.invalidate_cache();

        let plan = plan_sheets(workbook, &mut run);
        info!(
            "{} match sheets, {} roster sheets, KPI sheet {}",
            plan.matches.len(),
            plan.rosters.len(),
            if plan.kpi.is_some() { "present" } else { "absent" }
        );
        if plan.matches.is_empty() && plan.kpi.is_none() {
            return Err(EtlError::MissingSheet {
                name: format!("match sheets or `{KPI_SHEET}`"),
            });
        }

        if let Some(sheet) = plan.kpi {
            if cancelled(cancel, &mut run) {
                return Ok(run.finish());
            }
            self.import_kpis(sheet, &mut run);
        }

        let (outcome, issues) = read_position_mapping(workbook);
        run.absorb(issues);
        let mapping = match &outcome {
            PositionMappingOutcome::Loaded {
                mapping,
                sheets_read,
            } => {
                info!(
                    "position mapping: {} players from {} sheets",
                    mapping.len(),
                    sheets_read
                );
                Some(mapping)
            }
            PositionMappingOutcome::Failed => {
                run.issues_mut().warning(
                    "POSITION_MAPPING_UNAVAILABLE",
                    "no position sheets found; positions inferred from statistics",
                    IssueContext::none(),
                );
                None
            }
        };

        for (number, sheet) in &plan.matches {
            if cancelled(cancel, &mut run) {
                break;
            }
            let roster = plan.rosters.get(number).copied();
            if let Err(err) = self.import_match(sheet, roster, mapping, &mut run) {
                warn!("sheet `{}` failed: {}", sheet.name(), err);
                run.record(&err, IssueContext::sheet(sheet.name()));
            }
        }

        let result = run.finish();
        info!(
            "import finished: success={}, {} errors, {} warnings",
            result.success,
            result.errors.len(),
            result.warnings.len()
        );
        Ok(result)
    }

    /// Import only the KPI definitions sheet.
    pub fn run_kpi_only(&mut self, workbook: &Workbook) -> Result<EtlResult, EtlError> {
        let mut run = EtlRun::start();
        let sheet = find_kpi_sheet(workbook).ok_or_else(|| EtlError::MissingSheet {
            name: KPI_SHEET.to_string(),
        })?;
        self.import_kpis(sheet, &mut run);
        Ok(run.finish())
    }

    fn import_kpis(&mut self, sheet: &Sheet, run: &mut EtlRun) {
        info!("importing KPI definitions from `{}`", sheet.name());
        let batch = transform_kpis(sheet);
        let valid = batch.is_valid();
        run.absorb(batch.issues);
        if !valid {
            warn!("KPI sheet `{}` has errors; no definitions loaded", sheet.name());
            run.issues_mut().warning(
                "KPI_BATCH_REJECTED",
                format!("{} definitions not loaded because the sheet has errors", batch.definitions.len()),
                IssueContext::sheet(sheet.name()),
            );
            return;
        }
        match load_kpis(self.db, &batch.definitions) {
            Ok(counts) => run.add_counts(Entity::KpiDefinition, counts),
            Err(err) => run.record(&err, IssueContext::sheet(sheet.name())),
        }
    }

    fn import_match(
        &mut self,
        sheet: &Sheet,
        roster_sheet: Option<&Sheet>,
        mapping: Option<&PositionMapping>,
        run: &mut EtlRun,
    ) -> Result<(), EtlError> {
        let name = sheet.name();
        let parsed = self.metadata.parse_match_metadata(sheet)?;
        run.absorb(parsed.issues);
        let metadata = parsed.metadata;

        let grid = extract_grid(sheet, &self.config.thresholds)?;
        run.absorb(grid.issues);

        let season_year = match (self.config.import.season_year, metadata.date) {
            (Some(year), _) => year,
            (None, Some(date)) => date.year(),
            (None, None) => {
                let year = Utc::now().year();
                run.issues_mut().warning(
                    "SEASON_ASSUMED",
                    format!("match has no date; filed under season {year}"),
                    IssueContext::sheet(name),
                );
                year
            }
        };

        let players = match roster_sheet {
            Some(roster) => self.roster_players(roster, mapping, grid.scores.home_full_time, run),
            None => {
                warn!("no roster sheet for match {}", metadata.match_number);
                run.issues_mut().warning(
                    "MISSING_ROSTER",
                    format!("no player sheet numbered {}", metadata.match_number),
                    IssueContext::sheet(name),
                );
                Vec::new()
            }
        };

        let load = MatchLoad {
            sheet: name,
            roster_sheet: roster_sheet.map(Sheet::name),
            metadata: &metadata,
            season_year,
            scores: &grid.scores,
            team_stats: &grid.stats,
            players,
        };
        let outcome = load_match(self.db, &mut self.resolver, &load)?;
        run.absorb(outcome.issues);
        for (entity, counts) in outcome.counts {
            run.add_counts(entity, counts);
        }
        Ok(())
    }

    /// Extract, position and validate a roster; returns the loadable players.
    fn roster_players(
        &self,
        sheet: &Sheet,
        mapping: Option<&PositionMapping>,
        home_full_time: Option<Score>,
        run: &mut EtlRun,
    ) -> Vec<PlayerLoad> {
        let roster = extract_roster(sheet);
        run.absorb(roster.issues);

        let positions: Vec<PositionCode> = roster
            .players
            .iter()
            .map(|p| {
                p.name
                    .as_deref()
                    .and_then(|n| mapping.and_then(|m| m.get(n)))
                    .unwrap_or_else(|| infer_position(p))
            })
            .collect();

        let team = TeamContext {
            full_time: home_full_time,
        };
        let validation = self.validator.validate(RosterInput {
            sheet: sheet.name(),
            field_map: &roster.field_map,
            players: &roster.players,
            positions: &positions,
            team: Some(&team),
            thresholds: &self.config.thresholds,
        });
        run.absorb(validation.issues);
        if validation.halted {
            return Vec::new();
        }

        validation
            .accepted
            .iter()
            .filter_map(|&idx| {
                let row = &roster.players[idx];
                let jersey = u32::try_from(row.jersey?).ok()?;
                Some(PlayerLoad {
                    row: row.row,
                    jersey,
                    name: row.name.clone()?,
                    position: Some(positions[idx]),
                    values: row.values.clone(),
                })
            })
            .collect()
    }
}

fn cancelled(cancel: &CancelFlag, run: &mut EtlRun) -> bool {
    if cancel.is_cancelled() {
        warn!("import cancelled");
        run.record(&EtlError::Cancelled, IssueContext::none());
        true
    } else {
        false
    }
}
