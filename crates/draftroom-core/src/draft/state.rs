// Draft state: the persisted snapshot one league's draft is driven from.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::pick::DraftPick;
use super::sequencer::{self, DraftType, Turn};

/// Lifecycle of a draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DraftStatus {
    PreDraft,
    Drafting,
    /// Administrative hold: no deadline, no picks, no timeouts.
    Paused,
    /// Terminal.
    Complete,
    /// Terminal.
    Canceled,
}

impl DraftStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DraftStatus::Complete | DraftStatus::Canceled)
    }
}

impl fmt::Display for DraftStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DraftStatus::PreDraft => "pre-draft",
            DraftStatus::Drafting => "drafting",
            DraftStatus::Paused => "paused",
            DraftStatus::Complete => "complete",
            DraftStatus::Canceled => "canceled",
        };
        f.write_str(s)
    }
}

/// The complete persisted state of one league's draft.
///
/// The gateway stores this as a versioned document; the version lives
/// beside the document, not inside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftState {
    /// Same as the league identifier.
    pub draft_id: String,
    pub status: DraftStatus,
    #[serde(default)]
    pub draft_type: DraftType,
    /// Round 1 order, fixed for the lifetime of the draft.
    pub draft_order: Vec<String>,
    pub round: u32,
    pub pick_index_in_round: u32,
    pub overall_pick_number: u32,
    /// Cached result of the sequencer for the current cursor. `None` before
    /// the draft starts and after it ends.
    pub on_clock_team_id: Option<String>,
    /// Authoritative deadline for the current turn. Set iff drafting.
    pub deadline_at: Option<DateTime<Utc>>,
    pub pick_time_seconds: u32,
    pub total_rounds: u32,
    /// The pick that produced this snapshot. Re-applied to the logs on load
    /// so a crash between the snapshot write and the log writes loses nothing.
    #[serde(default)]
    pub last_pick: Option<DraftPick>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    /// Rosters materialized and the league notified.
    #[serde(default)]
    pub finalized: bool,
}

impl DraftState {
    /// A draft that has its order but has not started.
    pub fn pre_draft(
        draft_id: &str,
        draft_type: DraftType,
        draft_order: Vec<String>,
        pick_time_seconds: u32,
        total_rounds: u32,
    ) -> Self {
        DraftState {
            draft_id: draft_id.to_string(),
            status: DraftStatus::PreDraft,
            draft_type,
            draft_order,
            round: 1,
            pick_index_in_round: 1,
            overall_pick_number: 1,
            on_clock_team_id: None,
            deadline_at: None,
            pick_time_seconds,
            total_rounds,
            last_pick: None,
            started_at: None,
            completed_at: None,
            finalized: false,
        }
    }

    pub fn team_count(&self) -> usize {
        self.draft_order.len()
    }

    /// Number of picks in a full draft, saturating at `u32::MAX`. Drafts
    /// that overflow are rejected at start.
    pub fn total_picks(&self) -> u32 {
        self.checked_total_picks().unwrap_or(u32::MAX)
    }

    /// Number of picks in a full draft, or `None` if it does not fit a `u32`.
    pub fn checked_total_picks(&self) -> Option<u32> {
        u32::try_from(self.team_count())
            .ok()?
            .checked_mul(self.total_rounds)
    }

    /// Picks resolved so far.
    pub fn picks_made(&self) -> u32 {
        match self.status {
            DraftStatus::Complete => self.total_picks(),
            _ => self.overall_pick_number.saturating_sub(1),
        }
    }

    /// The turn the cursor points at, when a team is on the clock.
    pub fn current_turn(&self) -> Option<Turn> {
        let team_id = self.on_clock_team_id.clone()?;
        Some(Turn {
            round: self.round,
            pick_index_in_round: self.pick_index_in_round,
            overall_pick_number: self.overall_pick_number,
            team_id,
            is_round_complete: false,
        })
    }

    /// Move the cursor onto `turn`.
    pub fn move_to(&mut self, turn: &Turn) {
        self.round = turn.round;
        self.pick_index_in_round = turn.pick_index_in_round;
        self.overall_pick_number = turn.overall_pick_number;
        self.on_clock_team_id = Some(turn.team_id.clone());
    }

    /// Check the structural invariants of the snapshot. Returns a
    /// description of the first violation.
    pub fn check_invariants(&self) -> Result<(), String> {
        let expected = sequencer::overall_pick_number(
            self.round.max(1),
            self.pick_index_in_round,
            self.team_count(),
        );
        if expected != Some(self.overall_pick_number) {
            return Err(format!(
                "overall pick {} does not match round {} pick {}",
                self.overall_pick_number, self.round, self.pick_index_in_round
            ));
        }
        if self.pick_index_in_round == 0 || self.pick_index_in_round as usize > self.team_count() {
            return Err(format!("pick index {} out of range", self.pick_index_in_round));
        }
        if self.status == DraftStatus::Drafting {
            if self.deadline_at.is_none() {
                return Err("drafting without a deadline".into());
            }
            let expected_team = sequencer::team_on_clock(
                &self.draft_order,
                self.round,
                self.pick_index_in_round,
                self.draft_type,
            );
            if self.on_clock_team_id.as_deref() != expected_team {
                return Err(format!(
                    "cached on-clock team {:?} differs from sequencer {:?}",
                    self.on_clock_team_id, expected_team
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn order() -> Vec<String> {
        vec!["A".into(), "B".into(), "C".into(), "D".into()]
    }

    #[test]
    fn pre_draft_defaults() {
        let state = DraftState::pre_draft("lg", DraftType::Snake, order(), 30, 2);
        assert_eq!(state.status, DraftStatus::PreDraft);
        assert_eq!(state.overall_pick_number, 1);
        assert_eq!(state.total_picks(), 8);
        assert_eq!(state.picks_made(), 0);
        assert!(state.on_clock_team_id.is_none());
        assert!(state.current_turn().is_none());
        assert!(state.check_invariants().is_ok());
    }

    #[test]
    fn total_picks_saturates_on_overflow() {
        let state = DraftState::pre_draft("lg", DraftType::Snake, order(), 30, u32::MAX / 2);
        assert_eq!(state.checked_total_picks(), None);
        assert_eq!(state.total_picks(), u32::MAX);

        let state = DraftState::pre_draft("lg", DraftType::Snake, order(), 30, 15);
        assert_eq!(state.checked_total_picks(), Some(60));
    }

    #[test]
    fn snapshot_round_trips_through_json() {
        let mut state = DraftState::pre_draft("lg", DraftType::Linear, order(), 90, 15);
        state.status = DraftStatus::Drafting;
        state.on_clock_team_id = Some("A".into());
        state.deadline_at = Some(Utc.with_ymd_and_hms(2026, 9, 1, 18, 0, 0).unwrap());

        let value = serde_json::to_value(&state).unwrap();
        assert_eq!(value["draftId"], "lg");
        assert_eq!(value["status"], "drafting");
        assert_eq!(value["draftType"], "linear");
        assert_eq!(value["pickIndexInRound"], 1);
        assert_eq!(value["onClockTeamId"], "A");

        let back: DraftState = serde_json::from_value(value).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn minimal_snapshot_deserializes() {
        let value = serde_json::json!({
            "draftId": "lg",
            "status": "drafting",
            "draftOrder": ["A", "B"],
            "round": 1,
            "pickIndexInRound": 2,
            "overallPickNumber": 2,
            "onClockTeamId": "B",
            "deadlineAt": "2026-09-01T18:00:00Z",
            "pickTimeSeconds": 30,
            "totalRounds": 3
        });
        let state: DraftState = serde_json::from_value(value).unwrap();
        assert_eq!(state.draft_type, DraftType::Snake);
        assert!(state.last_pick.is_none());
        assert!(!state.finalized);
        assert!(state.check_invariants().is_ok());
    }

    #[test]
    fn invariants_catch_mismatched_cursor() {
        let mut state = DraftState::pre_draft("lg", DraftType::Snake, order(), 30, 2);
        state.round = 2;
        assert!(state.check_invariants().is_err());
        state.overall_pick_number = 5;
        assert!(state.check_invariants().is_ok());
    }

    #[test]
    fn invariants_require_deadline_while_drafting() {
        let mut state = DraftState::pre_draft("lg", DraftType::Snake, order(), 30, 2);
        state.status = DraftStatus::Drafting;
        state.on_clock_team_id = Some("A".into());
        assert!(state.check_invariants().is_err());
        state.deadline_at = Some(Utc::now());
        assert!(state.check_invariants().is_ok());
        state.on_clock_team_id = Some("B".into());
        assert!(state.check_invariants().is_err());
    }

    #[test]
    fn move_to_updates_cursor() {
        let mut state = DraftState::pre_draft("lg", DraftType::Snake, order(), 30, 2);
        let turn = Turn {
            round: 2,
            pick_index_in_round: 1,
            overall_pick_number: 5,
            team_id: "D".into(),
            is_round_complete: true,
        };
        state.move_to(&turn);
        assert_eq!(state.round, 2);
        assert_eq!(state.overall_pick_number, 5);
        assert_eq!(state.on_clock_team_id.as_deref(), Some("D"));
        assert_eq!(state.picks_made(), 4);
    }

    #[test]
    fn status_display_and_terminal() {
        assert_eq!(DraftStatus::PreDraft.to_string(), "pre-draft");
        assert!(DraftStatus::Complete.is_terminal());
        assert!(DraftStatus::Canceled.is_terminal());
        assert!(!DraftStatus::Paused.is_terminal());
    }
}
