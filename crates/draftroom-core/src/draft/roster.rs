// Roster bindings and per-team roster composition.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::pick::{DraftPick, Position};

/// Durable binding of a drafted player to the team that drafted them.
/// Keyed by `(league_id, player_id)`: a player belongs to exactly one team.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterSlot {
    pub league_id: String,
    pub team_id: String,
    pub player_id: String,
    pub position: String,
    pub overall_pick_number: u32,
    pub acquired_at: DateTime<Utc>,
}

impl RosterSlot {
    pub fn from_pick(pick: &DraftPick) -> Self {
        RosterSlot {
            league_id: pick.league_id.clone(),
            team_id: pick.team_id.clone(),
            player_id: pick.player_id.clone(),
            position: pick.position.clone(),
            overall_pick_number: pick.overall_pick_number,
            acquired_at: pick.timestamp,
        }
    }
}

/// League roster rules: how many players a team needs at each position and
/// the most it may hold.
#[derive(Debug, Clone, Default)]
pub struct RosterRules {
    required: HashMap<Position, usize>,
    limits: HashMap<Position, usize>,
}

impl RosterRules {
    /// Build rules from the league config's position-string maps, e.g.
    /// `{"QB": 1, "RB": 2, "WR": 3}`. Unknown position strings are ignored.
    pub fn new(required: &HashMap<String, usize>, limits: &HashMap<String, usize>) -> Self {
        fn parse(map: &HashMap<String, usize>) -> HashMap<Position, usize> {
            map.iter()
                .filter_map(|(pos, &n)| Position::from_str_pos(pos).map(|p| (p, n)))
                .collect()
        }
        RosterRules {
            required: parse(required),
            limits: parse(limits),
        }
    }

    pub fn required(&self, pos: Position) -> usize {
        self.required.get(&pos).copied().unwrap_or(0)
    }

    pub fn limit(&self, pos: Position) -> Option<usize> {
        self.limits.get(&pos).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.required.is_empty() && self.limits.is_empty()
    }
}

/// Position counts for one team, derived from its picks.
#[derive(Debug, Clone, Default)]
pub struct TeamRoster {
    pub team_id: String,
    counts: HashMap<Position, usize>,
    total: usize,
}

impl TeamRoster {
    pub fn from_picks<'a>(team_id: &str, picks: impl IntoIterator<Item = &'a DraftPick>) -> Self {
        let mut roster = TeamRoster {
            team_id: team_id.to_string(),
            ..Default::default()
        };
        for pick in picks.into_iter().filter(|p| p.team_id == team_id) {
            roster.total += 1;
            if let Some(pos) = Position::from_str_pos(&pick.position) {
                *roster.counts.entry(pos).or_insert(0) += 1;
            }
        }
        roster
    }

    pub fn count(&self, pos: Position) -> usize {
        self.counts.get(&pos).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// Unfilled required positions as `(position, missing)`, most depleted
    /// first; ties follow position order.
    pub fn needs(&self, rules: &RosterRules) -> Vec<(Position, usize)> {
        let mut needs: Vec<(Position, usize)> = Position::ALL
            .iter()
            .filter_map(|&pos| {
                let missing = rules.required(pos).saturating_sub(self.count(pos));
                (missing > 0).then_some((pos, missing))
            })
            .collect();
        needs.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.sort_order().cmp(&b.0.sort_order())));
        needs
    }

    /// Whether adding another player at `pos` would exceed the limit.
    pub fn at_limit(&self, pos: Position, rules: &RosterRules) -> bool {
        rules.limit(pos).is_some_and(|max| self.count(pos) >= max)
    }
}
