// Roster validation: six ordered layers over one sheet's player rows.
//
// Every layer sees the same roster and the set of players still accepted.
// Layers report issues and may reject players; only a gate layer can stop
// the chain, and then nothing from the sheet is loaded.

pub mod layers;

use std::collections::BTreeSet;

use tracing::{debug, warn};

use drumstats_core::config::Thresholds;
use drumstats_core::model::PositionCode;
use drumstats_core::result::Issues;
use drumstats_core::score::Score;

use crate::roster::{FieldMap, PlayerRow};

pub use layers::{
    BusinessRuleLayer, CrossFieldLayer, DataTypeLayer, IdentificationLayer, PositionLayer,
    StructureLayer,
};

// ---------------------------------------------------------------------------
// Inputs and reports
// ---------------------------------------------------------------------------

/// Team-level facts some rules compare players against.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TeamContext {
    pub full_time: Option<Score>,
}

/// A roster sheet ready for validation.
#[derive(Debug, Clone, Copy)]
pub struct RosterInput<'a> {
    pub sheet: &'a str,
    pub field_map: &'a FieldMap,
    pub players: &'a [PlayerRow],
    /// Assigned or inferred position of each player, parallel to `players`.
    pub positions: &'a [PositionCode],
    pub team: Option<&'a TeamContext>,
    pub thresholds: &'a Thresholds,
}

/// What a layer is given: the roster plus the players still accepted.
#[derive(Debug, Clone, Copy)]
pub struct ValidationInput<'a> {
    pub roster: RosterInput<'a>,
    pub accepted: &'a BTreeSet<usize>,
}

impl<'a> ValidationInput<'a> {
    /// Accepted players with their index and position.
    pub fn accepted_players(
        &self,
    ) -> impl Iterator<Item = (usize, &'a PlayerRow, Option<PositionCode>)> + '_ {
        let roster = self.roster;
        self.accepted.iter().filter_map(move |&idx| {
            roster
                .players
                .get(idx)
                .map(|p| (idx, p, roster.positions.get(idx).copied()))
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct LayerReport {
    pub issues: Issues,
    pub rejected: BTreeSet<usize>,
    /// Stop the chain. Honoured only for gate layers.
    pub fatal: bool,
}

/// One validation layer.
pub trait ValidationLayer {
    fn name(&self) -> &'static str;

    /// Whether a fatal report from this layer stops the chain.
    fn is_gate(&self) -> bool {
        false
    }

    fn validate(&self, input: &ValidationInput<'_>) -> LayerReport;
}

/// Outcome of running every layer over a roster.
#[derive(Debug, Clone, Default)]
pub struct RosterValidation {
    /// Indices into the roster of players that may be loaded.
    pub accepted: Vec<usize>,
    pub issues: Issues,
    /// A gate layer failed; nothing from the sheet may be loaded.
    pub halted: bool,
}

// ---------------------------------------------------------------------------
// Orchestration
// ---------------------------------------------------------------------------

pub struct RosterValidator {
    layers: Vec<Box<dyn ValidationLayer>>,
}

impl Default for RosterValidator {
    fn default() -> Self {
        RosterValidator::new(default_layers())
    }
}

/// The six standard layers in order.
pub fn default_layers() -> Vec<Box<dyn ValidationLayer>> {
    vec![
        Box::new(StructureLayer),
        Box::new(IdentificationLayer),
        Box::new(DataTypeLayer),
        Box::new(CrossFieldLayer),
        Box::new(PositionLayer),
        Box::new(BusinessRuleLayer),
    ]
}

impl RosterValidator {
    pub fn new(layers: Vec<Box<dyn ValidationLayer>>) -> Self {
        RosterValidator { layers }
    }

    pub fn validate(&self, roster: RosterInput<'_>) -> RosterValidation {
        let mut accepted: BTreeSet<usize> = (0..roster.players.len()).collect();
        let mut issues = Issues::new();

        for layer in &self.layers {
            let input = ValidationInput {
                roster,
                accepted: &accepted,
            };
            let report = layer.validate(&input);
            debug!(
                "sheet `{}`: layer {} -> {} errors, {} warnings, {} rejected",
                roster.sheet,
                layer.name(),
                report.issues.errors.len(),
                report.issues.warnings.len(),
                report.rejected.len()
            );
            issues.extend(report.issues);

            if report.fatal && layer.is_gate() {
                warn!(
                    "sheet `{}`: {} validation failed, skipping sheet",
                    roster.sheet,
                    layer.name()
                );
                return RosterValidation {
                    accepted: Vec::new(),
                    issues,
                    halted: true,
                };
            }
            for idx in &report.rejected {
                accepted.remove(idx);
            }
        }

        RosterValidation {
            accepted: accepted.into_iter().collect(),
            issues,
            halted: false,
        }
    }
}

/// Run the standard layers over a roster.
pub fn validate_roster(roster: RosterInput<'_>) -> RosterValidation {
    RosterValidator::default().validate(roster)
}
