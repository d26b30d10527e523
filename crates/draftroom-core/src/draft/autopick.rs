// Autopick: choose a player for a team that let its clock run out.

use std::collections::HashSet;

use super::pick::Position;
use super::pool::{PlayerPool, PlayerRecord};
use super::roster::{RosterRules, TeamRoster};
use crate::error::DraftError;

/// Why the resolver chose the player it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutopickReason {
    /// Fills the team's most depleted required position that still has
    /// players available.
    RosterNeed(Position),
    /// Highest-ranked available player.
    BestAvailable,
}

#[derive(Debug, Clone, Copy)]
pub struct AutopickChoice<'a> {
    pub player: &'a PlayerRecord,
    pub reason: AutopickReason,
}

/// Pick for `roster`'s team from `pool`, skipping everything in `drafted`.
///
/// Candidates are eligible, undrafted players in rank order (ties by player
/// ID). Players at a position where the team already holds its limit are
/// skipped unless nothing else remains. Among candidates, the best player
/// at the most depleted required position is preferred over pure best
/// available.
pub fn choose<'a>(
    roster: &TeamRoster,
    pool: &'a PlayerPool,
    drafted: &HashSet<String>,
    rules: &RosterRules,
) -> Result<AutopickChoice<'a>, DraftError> {
    let available: Vec<&PlayerRecord> = pool
        .ranked()
        .filter(|p| !drafted.contains(&p.player_id))
        .collect();

    let within_limits: Vec<&PlayerRecord> = available
        .iter()
        .copied()
        .filter(|p| {
            p.parsed_position()
                .map_or(true, |pos| !roster.at_limit(pos, rules))
        })
        .collect();

    let candidates = if within_limits.is_empty() {
        available
    } else {
        within_limits
    };

    let Some(&best) = candidates.first() else {
        return Err(DraftError::NoEligiblePlayersRemaining {
            team_id: roster.team_id.clone(),
        });
    };

    for (pos, _missing) in roster.needs(rules) {
        if let Some(&player) = candidates
            .iter()
            .find(|p| p.parsed_position() == Some(pos))
        {
            return Ok(AutopickChoice {
                player,
                reason: AutopickReason::RosterNeed(pos),
            });
        }
    }

    Ok(AutopickChoice {
        player: best,
        reason: AutopickReason::BestAvailable,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::Utc;

    use super::*;
    use crate::draft::pick::DraftPick;

    fn player(id: &str, pos: &str, rank: u32) -> PlayerRecord {
        PlayerRecord {
            player_id: id.to_string(),
            name: format!("Player {id}"),
            position: pos.to_string(),
            team: "State".to_string(),
            rank,
            eligible: true,
        }
    }

    fn pool() -> PlayerPool {
        PlayerPool::new(vec![
            player("qb1", "QB", 1),
            player("rb1", "RB", 2),
            player("wr1", "WR", 3),
            player("qb2", "QB", 4),
            player("k1", "K", 5),
        ])
    }

    fn pick(team: &str, player_id: &str, pos: &str) -> DraftPick {
        DraftPick {
            league_id: "lg".into(),
            overall_pick_number: 1,
            round: 1,
            pick_index_in_round: 1,
            team_id: team.into(),
            player_id: player_id.into(),
            player_name: player_id.into(),
            position: pos.into(),
            team: "State".into(),
            timestamp: Utc::now(),
            is_autopick: false,
            by: None,
        }
    }

    fn rules(required: &[(&str, usize)], limits: &[(&str, usize)]) -> RosterRules {
        let to_map = |pairs: &[(&str, usize)]| -> HashMap<String, usize> {
            pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
        };
        RosterRules::new(&to_map(required), &to_map(limits))
    }

    #[test]
    fn best_available_without_rules() {
        let roster = TeamRoster::from_picks("A", &Vec::<DraftPick>::new());
        let pool = pool();
        let choice = choose(&roster, &pool, &HashSet::new(), &RosterRules::default()).unwrap();
        assert_eq!(choice.player.player_id, "qb1");
        assert_eq!(choice.reason, AutopickReason::BestAvailable);
    }

    #[test]
    fn skips_drafted_players() {
        let roster = TeamRoster::from_picks("A", &Vec::<DraftPick>::new());
        let drafted: HashSet<String> = ["qb1".to_string(), "rb1".to_string()].into();
        let pool = pool();
        let choice = choose(&roster, &pool, &drafted, &RosterRules::default()).unwrap();
        assert_eq!(choice.player.player_id, "wr1");
    }

    #[test]
    fn prefers_most_depleted_position() {
        let picks = vec![pick("A", "x", "QB")];
        let roster = TeamRoster::from_picks("A", &picks);
        let r = rules(&[("QB", 1), ("RB", 1), ("WR", 2)], &[]);
        let pool = pool();
        let choice = choose(&roster, &pool, &HashSet::new(), &r).unwrap();
        assert_eq!(choice.player.player_id, "wr1");
        assert_eq!(choice.reason, AutopickReason::RosterNeed(Position::WideReceiver));
    }

    #[test]
    fn falls_through_needs_with_no_players_left() {
        let roster = TeamRoster::from_picks("A", &Vec::<DraftPick>::new());
        let r = rules(&[("TE", 2), ("RB", 1)], &[]);
        let pool = pool();
        let choice = choose(&roster, &pool, &HashSet::new(), &r).unwrap();
        // No tight ends in the pool, so the next need wins.
        assert_eq!(choice.player.player_id, "rb1");
        assert_eq!(choice.reason, AutopickReason::RosterNeed(Position::RunningBack));
    }

    #[test]
    fn respects_position_limits() {
        let picks = vec![pick("A", "x", "QB")];
        let roster = TeamRoster::from_picks("A", &picks);
        let r = rules(&[], &[("QB", 1)]);
        let pool = pool();
        let choice = choose(&roster, &pool, &HashSet::new(), &r).unwrap();
        assert_eq!(choice.player.player_id, "rb1");
    }

    #[test]
    fn limits_yield_when_nothing_else_remains() {
        let picks = vec![pick("A", "x", "K")];
        let roster = TeamRoster::from_picks("A", &picks);
        let r = rules(&[], &[("K", 1)]);
        let drafted: HashSet<String> = ["qb1", "rb1", "wr1", "qb2"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let pool = pool();
        let choice = choose(&roster, &pool, &drafted, &r).unwrap();
        assert_eq!(choice.player.player_id, "k1");
    }

    #[test]
    fn ties_break_by_player_id() {
        let pool = PlayerPool::new(vec![player("b", "RB", 1), player("a", "RB", 1)]);
        let roster = TeamRoster::from_picks("A", &Vec::<DraftPick>::new());
        let choice = choose(&roster, &pool, &HashSet::new(), &RosterRules::default()).unwrap();
        assert_eq!(choice.player.player_id, "a");
    }

    #[test]
    fn exhausted_pool_fails() {
        let roster = TeamRoster::from_picks("A", &Vec::<DraftPick>::new());
        let drafted: HashSet<String> = ["qb1", "rb1", "wr1", "qb2", "k1"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let pool = pool();
        let err = choose(&roster, &pool, &drafted, &RosterRules::default()).unwrap_err();
        assert!(matches!(err, DraftError::NoEligiblePlayersRemaining { ref team_id } if team_id == "A"));
    }
}
