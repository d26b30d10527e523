// Immutable audit trail of draft transitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::pick::DraftPick;
use super::state::DraftState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DraftEventKind {
    Started,
    Pick,
    Autopick,
    Paused,
    Resumed,
    Canceled,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftEvent {
    pub draft_id: String,
    pub kind: DraftEventKind,
    pub ts: DateTime<Utc>,
    pub round: u32,
    pub overall: u32,
    #[serde(default)]
    pub team_id: Option<String>,
    #[serde(default)]
    pub player_id: Option<String>,
    /// Actor that caused the event, when known.
    #[serde(default)]
    pub by: Option<String>,
}

impl DraftEvent {
    /// Lifecycle event taken from the snapshot it produced.
    pub fn lifecycle(
        kind: DraftEventKind,
        state: &DraftState,
        ts: DateTime<Utc>,
        by: Option<&str>,
    ) -> Self {
        DraftEvent {
            draft_id: state.draft_id.clone(),
            kind,
            ts,
            round: state.round,
            overall: state.overall_pick_number,
            team_id: state.on_clock_team_id.clone(),
            player_id: None,
            by: by.map(str::to_string),
        }
    }

    pub fn from_pick(pick: &DraftPick) -> Self {
        DraftEvent {
            draft_id: pick.league_id.clone(),
            kind: if pick.is_autopick {
                DraftEventKind::Autopick
            } else {
                DraftEventKind::Pick
            },
            ts: pick.timestamp,
            round: pick.round,
            overall: pick.overall_pick_number,
            team_id: Some(pick.team_id.clone()),
            player_id: Some(pick.player_id.clone()),
            by: pick.by.clone(),
        }
    }

    /// Key that makes re-appending the same event a no-op. Pause and resume
    /// can repeat, so they are keyed by the snapshot version they produced.
    pub fn unique_key(&self, version: u64) -> String {
        match self.kind {
            DraftEventKind::Pick | DraftEventKind::Autopick => format!("pick:{}", self.overall),
            DraftEventKind::Paused => format!("paused:{version}"),
            DraftEventKind::Resumed => format!("resumed:{version}"),
            DraftEventKind::Started => "started".to_string(),
            DraftEventKind::Canceled => "canceled".to_string(),
            DraftEventKind::Completed => "completed".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::draft::sequencer::DraftType;

    #[test]
    fn pick_events_are_keyed_by_overall() {
        let pick = DraftPick {
            league_id: "lg".into(),
            overall_pick_number: 9,
            round: 3,
            pick_index_in_round: 1,
            team_id: "A".into(),
            player_id: "p".into(),
            player_name: "P".into(),
            position: "QB".into(),
            team: "State".into(),
            timestamp: Utc::now(),
            is_autopick: true,
            by: None,
        };
        let event = DraftEvent::from_pick(&pick);
        assert_eq!(event.kind, DraftEventKind::Autopick);
        assert_eq!(event.unique_key(12), "pick:9");
    }

    #[test]
    fn pause_events_are_keyed_by_version() {
        let state = DraftState::pre_draft("lg", DraftType::Snake, vec!["A".into()], 30, 1);
        let event = DraftEvent::lifecycle(DraftEventKind::Paused, &state, Utc::now(), Some("commish"));
        assert_eq!(event.unique_key(4), "paused:4");
        assert_eq!(event.by.as_deref(), Some("commish"));
        let started = DraftEvent::lifecycle(DraftEventKind::Started, &state, Utc::now(), None);
        assert_eq!(started.unique_key(1), "started");
    }
}
