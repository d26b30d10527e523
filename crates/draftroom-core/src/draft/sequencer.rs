// Turn sequencing: whose turn is next, and when the draft is over.
//
// Everything here is a pure function of its inputs so that replaying a
// persisted cursor after a restart always lands on the same team.

use serde::{Deserialize, Serialize};

/// How the draft order evolves from round to round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DraftType {
    /// Odd rounds run the order forward, even rounds run it reversed.
    #[default]
    Snake,
    /// Every round uses the same order.
    Linear,
    /// The order grants nomination rights; it repeats every round.
    Auction,
}

/// A resolved position in the draft.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub round: u32,
    pub pick_index_in_round: u32,
    pub overall_pick_number: u32,
    pub team_id: String,
    /// True when reaching this turn rolled over into a new round.
    pub is_round_complete: bool,
}

/// Result of advancing past a turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advance {
    Next(Turn),
    Complete,
}

/// `(round - 1) * team_count + pick_index_in_round`, or `None` when round
/// is zero or the result does not fit a `u32`.
pub fn overall_pick_number(round: u32, pick_index_in_round: u32, team_count: usize) -> Option<u32> {
    round
        .checked_sub(1)?
        .checked_mul(u32::try_from(team_count).ok()?)?
        .checked_add(pick_index_in_round)
}

/// The team entitled to pick at `(round, pick_index_in_round)`.
///
/// Returns `None` for an empty order or an out-of-range cursor.
pub fn team_on_clock(
    order: &[String],
    round: u32,
    pick_index_in_round: u32,
    draft_type: DraftType,
) -> Option<&str> {
    let n = order.len() as u32;
    if round == 0 || pick_index_in_round == 0 || pick_index_in_round > n {
        return None;
    }
    let idx = match draft_type {
        DraftType::Snake if round % 2 == 0 => n - pick_index_in_round,
        _ => pick_index_in_round - 1,
    };
    order.get(idx as usize).map(String::as_str)
}

/// The opening turn of a draft (round 1, pick 1).
pub fn first_turn(order: &[String], draft_type: DraftType) -> Option<Turn> {
    let team_id = team_on_clock(order, 1, 1, draft_type)?;
    Some(Turn {
        round: 1,
        pick_index_in_round: 1,
        overall_pick_number: 1,
        team_id: team_id.to_string(),
        is_round_complete: false,
    })
}

/// Advance past the turn at `(round, pick_index_in_round)`.
pub fn next(
    order: &[String],
    round: u32,
    pick_index_in_round: u32,
    draft_type: DraftType,
    total_rounds: u32,
) -> Advance {
    let team_count = order.len() as u32;
    if team_count == 0 {
        return Advance::Complete;
    }

    let (mut next_round, mut next_index) = (round, pick_index_in_round + 1);
    let is_round_complete = next_index > team_count;
    if is_round_complete {
        next_round += 1;
        next_index = 1;
    }
    if next_round > total_rounds {
        return Advance::Complete;
    }

    match (
        team_on_clock(order, next_round, next_index, draft_type),
        overall_pick_number(next_round, next_index, order.len()),
    ) {
        (Some(team_id), Some(overall)) => Advance::Next(Turn {
            round: next_round,
            pick_index_in_round: next_index,
            overall_pick_number: overall,
            team_id: team_id.to_string(),
            is_round_complete,
        }),
        _ => Advance::Complete,
    }
}

/// Every turn of the draft in order. Used for previews and checks.
pub fn schedule(order: &[String], draft_type: DraftType, total_rounds: u32) -> Vec<Turn> {
    let mut turns = Vec::with_capacity(order.len().saturating_mul(total_rounds as usize));
    if total_rounds == 0 {
        return turns;
    }
    let Some(mut turn) = first_turn(order, draft_type) else {
        return turns;
    };
    loop {
        let advance = next(
            order,
            turn.round,
            turn.pick_index_in_round,
            draft_type,
            total_rounds,
        );
        turns.push(turn);
        match advance {
            Advance::Next(t) => turn = t,
            Advance::Complete => break,
        }
    }
    turns
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn teams(turns: &[Turn]) -> Vec<&str> {
        turns.iter().map(|t| t.team_id.as_str()).collect()
    }

    #[test]
    fn snake_three_teams_three_rounds() {
        let turns = schedule(&order(&["A", "B", "C"]), DraftType::Snake, 3);
        assert_eq!(teams(&turns), vec!["A", "B", "C", "C", "B", "A", "A", "B", "C"]);
    }

    #[test]
    fn linear_repeats_order() {
        let turns = schedule(&order(&["A", "B", "C"]), DraftType::Linear, 2);
        assert_eq!(teams(&turns), vec!["A", "B", "C", "A", "B", "C"]);
    }

    #[test]
    fn auction_nomination_order_repeats() {
        let turns = schedule(&order(&["A", "B"]), DraftType::Auction, 2);
        assert_eq!(teams(&turns), vec!["A", "B", "A", "B"]);
    }

    #[test]
    fn overall_numbers_are_contiguous() {
        let turns = schedule(&order(&["A", "B", "C", "D"]), DraftType::Snake, 3);
        let overall: Vec<u32> = turns.iter().map(|t| t.overall_pick_number).collect();
        assert_eq!(overall, (1..=12).collect::<Vec<_>>());
        for t in &turns {
            assert_eq!(
                t.overall_pick_number,
                overall_pick_number(t.round, t.pick_index_in_round, 4).unwrap()
            );
        }
    }

    #[test]
    fn next_rolls_over_round() {
        let o = order(&["A", "B", "C"]);
        match next(&o, 1, 3, DraftType::Snake, 3) {
            Advance::Next(t) => {
                assert_eq!(t.round, 2);
                assert_eq!(t.pick_index_in_round, 1);
                assert_eq!(t.team_id, "C");
                assert!(t.is_round_complete);
                assert_eq!(t.overall_pick_number, 4);
            }
            Advance::Complete => panic!("draft should continue"),
        }
        match next(&o, 2, 1, DraftType::Snake, 3) {
            Advance::Next(t) => assert!(!t.is_round_complete),
            Advance::Complete => panic!("draft should continue"),
        }
    }

    #[test]
    fn next_completes_after_final_round() {
        let o = order(&["A", "B"]);
        assert_eq!(next(&o, 2, 2, DraftType::Snake, 2), Advance::Complete);
        assert_eq!(next(&o, 2, 2, DraftType::Linear, 2), Advance::Complete);
    }

    #[test]
    fn next_is_idempotent() {
        let o = order(&["A", "B", "C", "D"]);
        let a = next(&o, 2, 3, DraftType::Snake, 5);
        let b = next(&o, 2, 3, DraftType::Snake, 5);
        assert_eq!(a, b);
    }

    #[test]
    fn team_on_clock_rejects_bad_cursor() {
        let o = order(&["A", "B"]);
        assert_eq!(team_on_clock(&o, 0, 1, DraftType::Snake), None);
        assert_eq!(team_on_clock(&o, 1, 0, DraftType::Snake), None);
        assert_eq!(team_on_clock(&o, 1, 3, DraftType::Snake), None);
        assert_eq!(team_on_clock(&[], 1, 1, DraftType::Snake), None);
    }

    #[test]
    fn empty_order_has_no_schedule() {
        assert!(schedule(&[], DraftType::Snake, 3).is_empty());
        assert!(schedule(&order(&["A"]), DraftType::Snake, 0).is_empty());
        assert_eq!(next(&[], 1, 1, DraftType::Snake, 3), Advance::Complete);
    }

    #[test]
    fn single_team_snake() {
        let turns = schedule(&order(&["solo"]), DraftType::Snake, 3);
        assert_eq!(teams(&turns), vec!["solo", "solo", "solo"]);
        assert!(turns[1].is_round_complete);
    }

    #[test]
    fn overall_number_rejects_overflow() {
        assert_eq!(overall_pick_number(3, 2, 10), Some(22));
        assert_eq!(overall_pick_number(0, 1, 10), None);
        assert_eq!(overall_pick_number(u32::MAX, 1, 2), None);
        assert_eq!(overall_pick_number(2, u32::MAX, 1), None);
    }
}
