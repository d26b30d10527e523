// Individual pick representation and player positions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::pool::PlayerRecord;
use super::state::DraftState;

/// Football positions used for roster need and limit tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Position {
    Quarterback,
    RunningBack,
    WideReceiver,
    TightEnd,
    Kicker,
    Defense,
}

impl Position {
    /// All positions in roster display order.
    pub const ALL: [Position; 6] = [
        Position::Quarterback,
        Position::RunningBack,
        Position::WideReceiver,
        Position::TightEnd,
        Position::Kicker,
        Position::Defense,
    ];

    /// Parse a position string into a Position enum.
    ///
    /// Accepts the common abbreviations:
    /// - "QB", "RB", "WR", "TE"
    /// - "K"/"PK" -> Kicker
    /// - "DEF"/"DST"/"D/ST" -> Defense
    pub fn from_str_pos(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "QB" => Some(Position::Quarterback),
            "RB" => Some(Position::RunningBack),
            "WR" => Some(Position::WideReceiver),
            "TE" => Some(Position::TightEnd),
            "K" | "PK" => Some(Position::Kicker),
            "DEF" | "DST" | "D/ST" => Some(Position::Defense),
            _ => None,
        }
    }

    /// Return the display string for this position.
    pub fn display_str(&self) -> &'static str {
        match self {
            Position::Quarterback => "QB",
            Position::RunningBack => "RB",
            Position::WideReceiver => "WR",
            Position::TightEnd => "TE",
            Position::Kicker => "K",
            Position::Defense => "DEF",
        }
    }

    /// Deterministic ordering index, used to break ties between equally
    /// depleted positions.
    pub fn sort_order(&self) -> u8 {
        match self {
            Position::Quarterback => 0,
            Position::RunningBack => 1,
            Position::WideReceiver => 2,
            Position::TightEnd => 3,
            Position::Kicker => 4,
            Position::Defense => 5,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_str())
    }
}

/// A single resolved turn. Append-only: written once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftPick {
    pub league_id: String,
    /// Absolute position of the turn across all rounds (1-indexed).
    pub overall_pick_number: u32,
    pub round: u32,
    pub pick_index_in_round: u32,
    /// Team the player was drafted to.
    pub team_id: String,
    pub player_id: String,
    /// Snapshot of the player's name at pick time.
    pub player_name: String,
    /// Snapshot of the position string at pick time (e.g. "QB").
    pub position: String,
    /// Snapshot of the player's real-life team at pick time.
    pub team: String,
    pub timestamp: DateTime<Utc>,
    pub is_autopick: bool,
    /// Who submitted the pick when it differs from `team_id`
    /// (commissioner override). `None` for autopicks and normal picks.
    #[serde(default)]
    pub by: Option<String>,
}

impl DraftPick {
    /// The pick that resolves `state`'s current turn with `player`.
    pub fn for_turn(
        state: &DraftState,
        player: &PlayerRecord,
        at: DateTime<Utc>,
        is_autopick: bool,
    ) -> Self {
        DraftPick {
            league_id: state.draft_id.clone(),
            overall_pick_number: state.overall_pick_number,
            round: state.round,
            pick_index_in_round: state.pick_index_in_round,
            team_id: state.on_clock_team_id.clone().unwrap_or_default(),
            player_id: player.player_id.clone(),
            player_name: player.name.clone(),
            position: player.position.clone(),
            team: player.team.clone(),
            timestamp: at,
            is_autopick,
            by: None,
        }
    }

    /// Whether this recorded pick is the one a caller asked for.
    pub fn matches_intent(&self, team_id: &str, player_id: &str) -> bool {
        !self.is_autopick && self.team_id == team_id && self.player_id == player_id
    }
}
