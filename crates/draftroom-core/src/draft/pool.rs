// Player pool index: read-only lookup of draftable players.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::pick::Position;

fn default_eligible() -> bool {
    true
}

/// One player as reported by the eligibility service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerRecord {
    pub player_id: String,
    pub name: String,
    /// Position string (e.g. "QB", "WR").
    pub position: String,
    /// Real-life team.
    #[serde(default)]
    pub team: String,
    /// Overall ranking; 1 is the best player.
    pub rank: u32,
    #[serde(default = "default_eligible")]
    pub eligible: bool,
}

impl PlayerRecord {
    pub fn parsed_position(&self) -> Option<Position> {
        Position::from_str_pos(&self.position)
    }
}

/// Index over the player list for one draft.
#[derive(Debug, Clone, Default)]
pub struct PlayerPool {
    players: HashMap<String, PlayerRecord>,
    /// Eligible player IDs ordered best first, ties broken by player ID.
    ranked: Vec<String>,
}

impl PlayerPool {
    /// Build the index. When an ID appears twice the first record wins.
    pub fn new(records: Vec<PlayerRecord>) -> Self {
        let mut players: HashMap<String, PlayerRecord> = HashMap::with_capacity(records.len());
        for record in records {
            if players.contains_key(&record.player_id) {
                warn!("Duplicate player id '{}' in pool, keeping first", record.player_id);
                continue;
            }
            players.insert(record.player_id.clone(), record);
        }

        let mut ranked: Vec<&PlayerRecord> = players.values().filter(|p| p.eligible).collect();
        ranked.sort_by(|a, b| {
            a.rank
                .cmp(&b.rank)
                .then_with(|| a.player_id.cmp(&b.player_id))
        });
        let ranked = ranked.into_iter().map(|p| p.player_id.clone()).collect();

        PlayerPool { players, ranked }
    }

    pub fn get(&self, player_id: &str) -> Option<&PlayerRecord> {
        self.players.get(player_id)
    }

    /// The record for `player_id` if it exists and may be drafted.
    pub fn eligible(&self, player_id: &str) -> Option<&PlayerRecord> {
        self.players.get(player_id).filter(|p| p.eligible)
    }

    /// Eligible players, best first.
    pub fn ranked(&self) -> impl Iterator<Item = &PlayerRecord> {
        self.ranked.iter().filter_map(|id| self.players.get(id))
    }

    pub fn eligible_count(&self) -> usize {
        self.ranked.len()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }
}
