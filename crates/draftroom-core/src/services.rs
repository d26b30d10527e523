// External collaborators: league configuration and player eligibility.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::draft::order::DraftOrderMode;
use crate::draft::pool::PlayerRecord;
use crate::draft::roster::RosterRules;
use crate::draft::sequencer::DraftType;

fn default_total_rounds() -> u32 {
    15
}

fn default_pick_time_seconds() -> u32 {
    90
}

/// Draft-relevant configuration for one league.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeagueSettings {
    pub league_id: String,
    pub team_ids: Vec<String>,
    #[serde(default = "default_total_rounds")]
    pub total_rounds: u32,
    #[serde(default = "default_pick_time_seconds")]
    pub pick_time_seconds: u32,
    #[serde(default)]
    pub draft_type: DraftType,
    #[serde(default)]
    pub draft_order_mode: DraftOrderMode,
    /// Only read in `manual` order mode.
    #[serde(default)]
    pub manual_order: Vec<String>,
    /// Prior-season finish, champion first. Only read in `standings` mode.
    #[serde(default)]
    pub standings: Vec<String>,
    /// Fixes the `random` shuffle; tests and replays only.
    #[serde(default)]
    pub order_seed: Option<u64>,
    /// Required starters per position, e.g. `QB = 1`.
    #[serde(default)]
    pub roster: HashMap<String, usize>,
    /// Maximum players per position, e.g. `K = 1`.
    #[serde(default)]
    pub position_limits: HashMap<String, usize>,
}

impl LeagueSettings {
    pub fn new(league_id: impl Into<String>, team_ids: Vec<String>) -> Self {
        LeagueSettings {
            league_id: league_id.into(),
            team_ids,
            total_rounds: default_total_rounds(),
            pick_time_seconds: default_pick_time_seconds(),
            draft_type: DraftType::default(),
            draft_order_mode: DraftOrderMode::default(),
            manual_order: Vec::new(),
            standings: Vec::new(),
            order_seed: None,
            roster: HashMap::new(),
            position_limits: HashMap::new(),
        }
    }

    pub fn roster_rules(&self) -> RosterRules {
        RosterRules::new(&self.roster, &self.position_limits)
    }
}

/// League/roster service.
#[async_trait]
pub trait LeagueService: Send + Sync {
    /// `Ok(None)` when the league does not exist.
    async fn league_config(&self, league_id: &str) -> Result<Option<LeagueSettings>>;

    async fn notify_draft_started(&self, league_id: &str) -> Result<()>;

    /// Mark the league active/post-draft. May be called more than once.
    async fn notify_draft_complete(&self, league_id: &str) -> Result<()>;
}

/// Player eligibility service.
#[async_trait]
pub trait PlayerService: Send + Sync {
    /// The draftable pool for a league. Records flagged `eligible = false`
    /// may be included so the engine can tell "ineligible" from "unknown".
    async fn list_eligible_players(&self, league_id: &str) -> Result<Vec<PlayerRecord>>;
}

// ---------------------------------------------------------------------------
// Static league directory
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeagueNotification {
    DraftStarted(String),
    DraftComplete(String),
}

/// Leagues fixed at startup (from the config file). Notifications are logged
/// and recorded.
#[derive(Debug, Default)]
pub struct StaticLeagueDirectory {
    leagues: HashMap<String, LeagueSettings>,
    notifications: Mutex<Vec<LeagueNotification>>,
}

impl StaticLeagueDirectory {
    pub fn new(leagues: impl IntoIterator<Item = LeagueSettings>) -> Self {
        StaticLeagueDirectory {
            leagues: leagues
                .into_iter()
                .map(|l| (l.league_id.clone(), l))
                .collect(),
            notifications: Mutex::new(Vec::new()),
        }
    }

    pub fn league_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.leagues.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Notifications received so far, oldest first.
    pub fn notifications(&self) -> Vec<LeagueNotification> {
        self.notifications
            .lock()
            .map(|n| n.clone())
            .unwrap_or_default()
    }

    fn record(&self, notification: LeagueNotification) {
        if let Ok(mut n) = self.notifications.lock() {
            n.push(notification);
        }
    }
}

#[async_trait]
impl LeagueService for StaticLeagueDirectory {
    async fn league_config(&self, league_id: &str) -> Result<Option<LeagueSettings>> {
        Ok(self.leagues.get(league_id).cloned())
    }

    async fn notify_draft_started(&self, league_id: &str) -> Result<()> {
        info!("League {} is drafting", league_id);
        self.record(LeagueNotification::DraftStarted(league_id.to_string()));
        Ok(())
    }

    async fn notify_draft_complete(&self, league_id: &str) -> Result<()> {
        info!("League {} draft complete, rosters are final", league_id);
        self.record(LeagueNotification::DraftComplete(league_id.to_string()));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Static player directory
// ---------------------------------------------------------------------------

/// One player pool shared by every league, with optional per-league
/// overrides.
#[derive(Debug, Clone, Default)]
pub struct StaticPlayerDirectory {
    default_pool: Vec<PlayerRecord>,
    per_league: HashMap<String, Vec<PlayerRecord>>,
}

impl StaticPlayerDirectory {
    pub fn new(players: Vec<PlayerRecord>) -> Self {
        StaticPlayerDirectory {
            default_pool: players,
            per_league: HashMap::new(),
        }
    }

    pub fn with_league(mut self, league_id: impl Into<String>, players: Vec<PlayerRecord>) -> Self {
        self.per_league.insert(league_id.into(), players);
        self
    }

    /// Load the shared pool from a CSV file with a
    /// `player_id,name,position,team,rank,eligible` header.
    pub fn from_csv(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("failed to open player file {}", path.display()))?;
        let players = load_players_from_reader(file)
            .with_context(|| format!("failed to parse player file {}", path.display()))?;
        info!("Loaded {} players from {}", players.len(), path.display());
        Ok(Self::new(players))
    }

    pub fn len(&self) -> usize {
        self.default_pool.len()
    }

    pub fn is_empty(&self) -> bool {
        self.default_pool.is_empty()
    }
}

/// Malformed rows are skipped with a warning; a broken header is an error.
fn load_players_from_reader<R: Read>(rdr: R) -> Result<Vec<PlayerRecord>, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(rdr);
    reader.headers()?;

    let mut players = Vec::new();
    for result in reader.deserialize::<PlayerRecord>() {
        match result {
            Ok(record) => players.push(record),
            Err(e) => warn!("skipping malformed player row: {}", e),
        }
    }
    Ok(players)
}

#[async_trait]
impl PlayerService for StaticPlayerDirectory {
    async fn list_eligible_players(&self, league_id: &str) -> Result<Vec<PlayerRecord>> {
        Ok(self
            .per_league
            .get(league_id)
            .unwrap_or(&self.default_pool)
            .clone())
    }
}
