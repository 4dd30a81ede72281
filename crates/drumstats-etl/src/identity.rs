// Player identity resolution and position inference.
//
// Names are typed by hand on every roster sheet, so the same player turns up
// as "Ciaran O'Kane", "Ciaran OKane" or "Ciarán O'Kane". A roster line is
// resolved to a stored player by jersey number plus an exact or near name
// match, and a new player is created only when neither finds one.

use std::collections::HashMap;

use anyhow::{Context, Result};
use rusqlite::Connection;
use tracing::{debug, info};

use drumstats_core::db::{self, NewPlayer};
use drumstats_core::model::{Player, PlayerField, PositionCode};

use crate::cell::{collapse_whitespace, normalize_name};
use crate::roster::PlayerRow;

// ---------------------------------------------------------------------------
// Position cache
// ---------------------------------------------------------------------------

/// Position code → row id, loaded from the store on first use.
#[derive(Debug, Default)]
pub struct PositionCache {
    ids: Option<HashMap<PositionCode, i64>>,
}

impl PositionCache {
    pub fn new() -> Self {
        PositionCache::default()
    }

    pub fn get_or_load(&mut self, conn: &Connection) -> Result<&HashMap<PositionCode, i64>> {
        if self.ids.is_none() {
            let ids = db::position_ids(conn).context("failed to load position ids")?;
            debug!("position cache loaded with {} entries", ids.len());
            self.ids = Some(ids);
        }
        Ok(self.ids.get_or_insert_with(HashMap::new))
    }

    pub fn id_for(&mut self, conn: &Connection, code: PositionCode) -> Result<Option<i64>> {
        Ok(self.get_or_load(conn)?.get(&code).copied())
    }

    pub fn invalidate(&mut self) {
        self.ids = None;
    }

    pub fn is_loaded(&self) -> bool {
        self.ids.is_some()
    }
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome {
    /// Same jersey and same name, ignoring case.
    Matched,
    /// Same jersey, name within the edit-distance limit.
    Fuzzy { distance: usize },
    Created,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub player_id: i64,
    pub outcome: MatchOutcome,
    /// Stored name of the matched player.
    pub stored_name: String,
    /// The stored position was updated to the supplied one.
    pub position_changed: bool,
}

/// Resolves roster lines to stored players. Owns its position cache.
#[derive(Debug)]
pub struct IdentityResolver {
    cache: PositionCache,
    max_distance: usize,
}

impl IdentityResolver {
    pub fn new(max_distance: usize) -> Self {
        IdentityResolver {
            cache: PositionCache::new(),
            max_distance,
        }
    }

    pub fn cache(&self) -> &PositionCache {
        &self.cache
    }

    pub fn invalidate_cache(&mut self) {
        self.cache.invalidate();
    }

    /// Find or create the player wearing `jersey` named `raw_name`.
    pub fn resolve(
        &mut self,
        conn: &Connection,
        jersey: u32,
        raw_name: &str,
        position: Option<PositionCode>,
    ) -> Result<Resolution> {
        let full_name = collapse_whitespace(raw_name);

        if let Some(player) = db::find_player_exact(conn, jersey, &full_name)? {
            let position_changed = self.sync_position(conn, &player, position)?;
            return Ok(Resolution {
                player_id: player.id,
                outcome: MatchOutcome::Matched,
                stored_name: player.full_name,
                position_changed,
            });
        }

        let candidates = db::players_by_jersey(conn, jersey)?;
        if let Some((player, distance)) = closest(&candidates, &full_name, self.max_distance) {
            info!(
                "matched #{} `{}` to stored `{}` (distance {})",
                jersey, full_name, player.full_name, distance
            );
            let position_changed = self.sync_position(conn, player, position)?;
            return Ok(Resolution {
                player_id: player.id,
                outcome: MatchOutcome::Fuzzy { distance },
                stored_name: player.full_name.clone(),
                position_changed,
            });
        }

        let (first_name, last_name) = split_name(&full_name);
        let position_id = match position {
            Some(code) => self.cache.id_for(conn, code)?,
            None => None,
        };
        let player_id = db::insert_player(
            conn,
            &NewPlayer {
                jersey_number: jersey,
                first_name: &first_name,
                last_name: &last_name,
                full_name: &full_name,
                position_id,
            },
        )?;
        debug!("created player #{} `{}` (id {})", jersey, full_name, player_id);
        Ok(Resolution {
            player_id,
            outcome: MatchOutcome::Created,
            stored_name: full_name,
            position_changed: false,
        })
    }

    fn sync_position(
        &mut self,
        conn: &Connection,
        player: &Player,
        position: Option<PositionCode>,
    ) -> Result<bool> {
        let Some(code) = position else {
            return Ok(false);
        };
        if player.position == Some(code) {
            return Ok(false);
        }
        let Some(position_id) = self.cache.id_for(conn, code)? else {
            return Ok(false);
        };
        db::update_player_position(conn, player.id, position_id)?;
        info!(
            "{} moved from {} to {}",
            player.full_name,
            player.position.map_or("none", |p| p.code()),
            code
        );
        Ok(true)
    }
}

/// Lowest edit distance within `max_distance`. Ties keep the earliest
/// candidate, and candidates arrive oldest first.
fn closest<'p>(candidates: &'p [Player], name: &str, max_distance: usize) -> Option<(&'p Player, usize)> {
    let wanted = normalize_name(name);
    let mut best: Option<(&Player, usize)> = None;
    for player in candidates {
        let distance = strsim::levenshtein(&wanted, &normalize_name(&player.full_name));
        if distance > max_distance {
            continue;
        }
        if best.map_or(true, |(_, d)| distance < d) {
            best = Some((player, distance));
        }
    }
    best
}

/// First token is the first name, the rest is the last name. A single token
/// fills both.
pub fn split_name(full_name: &str) -> (String, String) {
    let full_name = full_name.trim();
    match full_name.split_once(char::is_whitespace) {
        Some((first, rest)) => (first.to_string(), rest.trim().to_string()),
        None => (full_name.to_string(), full_name.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Position inference
// ---------------------------------------------------------------------------

pub const FWD_MIN_SHOTS: i64 = 5;
pub const FWD_MIN_ATTACKS: i64 = 10;
pub const DEF_MIN_TACKLES: i64 = 3;
pub const DEF_MAX_SHOTS: i64 = 2;

/// Guess a position from a player's statistics when no mapping names them.
pub fn infer_position(player: &PlayerRow) -> PositionCode {
    let shots = player.int(PlayerField::Shots);
    if player.int(PlayerField::GkKickoutsTotal) > 0 {
        PositionCode::GK
    } else if shots > FWD_MIN_SHOTS || player.int(PlayerField::Attacks) > FWD_MIN_ATTACKS {
        PositionCode::FWD
    } else if player.int(PlayerField::Tackles) > DEF_MIN_TACKLES && shots <= DEF_MAX_SHOTS {
        PositionCode::DEF
    } else {
        PositionCode::MID
    }
}
