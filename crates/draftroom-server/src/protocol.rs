// Wire protocol for the draft room WebSocket.
//
// Each text frame carries one JSON object tagged by `type`. Requests come
// from league clients and schedulers; every request gets exactly one reply.

use serde::{Deserialize, Serialize};

use draftroom_core::draft::events::DraftEvent;
use draftroom_core::draft::pick::DraftPick;
use draftroom_core::draft::roster::RosterSlot;
use draftroom_core::draft::state::DraftState;
use draftroom_core::{DraftError, PickRequest};

/// Reply text for errors that are not the caller's fault.
pub const GENERIC_ERROR_MESSAGE: &str = "draft error, please retry";

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    Prepare {
        league_id: String,
    },
    Start {
        league_id: String,
    },
    SubmitPick {
        league_id: String,
        team_id: String,
        player_id: String,
        /// Defaults to `team_id`.
        #[serde(default)]
        acting_team_id: Option<String>,
        #[serde(default)]
        commissioner_override: bool,
        #[serde(default)]
        expected_overall_pick_number: Option<u32>,
    },
    /// Scheduler callback. `deadline_at` is the deadline the scheduler armed
    /// the timer for; omit it to resolve whatever turn is current.
    Timeout {
        league_id: String,
        #[serde(default)]
        deadline_at: Option<chrono::DateTime<chrono::Utc>>,
    },
    GetState {
        league_id: String,
    },
    ListPicks {
        league_id: String,
    },
    ListRosters {
        league_id: String,
    },
    ListEvents {
        league_id: String,
    },
    Pause {
        league_id: String,
        #[serde(default)]
        by: Option<String>,
    },
    Resume {
        league_id: String,
        #[serde(default)]
        by: Option<String>,
    },
    Cancel {
        league_id: String,
        #[serde(default)]
        by: Option<String>,
    },
}

impl Request {
    pub fn league_id(&self) -> &str {
        match self {
            Request::Prepare { league_id }
            | Request::Start { league_id }
            | Request::SubmitPick { league_id, .. }
            | Request::Timeout { league_id, .. }
            | Request::GetState { league_id }
            | Request::ListPicks { league_id }
            | Request::ListRosters { league_id }
            | Request::ListEvents { league_id }
            | Request::Pause { league_id, .. }
            | Request::Resume { league_id, .. }
            | Request::Cancel { league_id, .. } => league_id,
        }
    }

    /// Build the engine's pick request. `None` for every other variant.
    pub fn to_pick_request(&self) -> Option<PickRequest> {
        match self {
            Request::SubmitPick {
                league_id,
                team_id,
                player_id,
                acting_team_id,
                commissioner_override,
                expected_overall_pick_number,
            } => Some(PickRequest {
                league_id: league_id.clone(),
                team_id: team_id.clone(),
                player_id: player_id.clone(),
                acting_team_id: acting_team_id.clone().unwrap_or_else(|| team_id.clone()),
                commissioner_override: *commissioner_override,
                expected_overall_pick_number: *expected_overall_pick_number,
            }),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Replies
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Reply {
    State {
        state: DraftState,
    },
    PickAccepted {
        pick: DraftPick,
        state: DraftState,
    },
    TimeoutResolved {
        autopick: Option<DraftPick>,
        state: DraftState,
    },
    Picks {
        league_id: String,
        picks: Vec<DraftPick>,
    },
    Rosters {
        league_id: String,
        rosters: Vec<RosterSlot>,
    },
    Events {
        league_id: String,
        events: Vec<DraftEvent>,
    },
    Error {
        code: String,
        message: String,
    },
}

impl Reply {
    /// Error reply for an engine failure. Only user-facing rejections carry
    /// their own text.
    pub fn from_error(err: &DraftError) -> Self {
        let message = if err.is_user_facing() {
            err.to_string()
        } else {
            GENERIC_ERROR_MESSAGE.to_string()
        };
        Reply::Error {
            code: err.code().to_string(),
            message,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Reply::Error {
            code: "bad_request".to_string(),
            message: message.into(),
        }
    }
}

/// Parse a raw JSON text frame into a [`Request`].
pub fn parse_request(text: &str) -> Result<Request, serde_json::Error> {
    serde_json::from_str(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn submit_pick_defaults_optional_fields() {
        let req = parse_request(
            r#"{"type":"submit_pick","league_id":"lg","team_id":"A","player_id":"p1"}"#,
        )
        .unwrap();
        let pick = req.to_pick_request().unwrap();
        assert_eq!(pick.acting_team_id, "A");
        assert!(!pick.commissioner_override);
        assert_eq!(pick.expected_overall_pick_number, None);
        assert_eq!(req.league_id(), "lg");
    }

    #[test]
    fn commissioner_pick_keeps_actor() {
        let req = parse_request(
            r#"{"type":"submit_pick","league_id":"lg","team_id":"A","player_id":"p1",
                "acting_team_id":"commish","commissioner_override":true,
                "expected_overall_pick_number":4}"#,
        )
        .unwrap();
        let pick = req.to_pick_request().unwrap();
        assert_eq!(pick.acting_team_id, "commish");
        assert!(pick.commissioner_override);
        assert_eq!(pick.expected_overall_pick_number, Some(4));
    }

    #[test]
    fn timeout_carries_observed_deadline() {
        let req = parse_request(
            r#"{"type":"timeout","league_id":"lg","deadline_at":"2026-09-01T18:00:30Z"}"#,
        )
        .unwrap();
        match req {
            Request::Timeout { deadline_at, .. } => assert!(deadline_at.is_some()),
            other => panic!("expected timeout, got {other:?}"),
        }
        assert!(parse_request(r#"{"type":"timeout","league_id":"lg"}"#).is_ok());
    }

    #[test]
    fn admin_requests_parse() {
        assert_eq!(
            parse_request(r#"{"type":"pause","league_id":"lg","by":"commish"}"#).unwrap(),
            Request::Pause {
                league_id: "lg".into(),
                by: Some("commish".into())
            }
        );
        assert_eq!(
            parse_request(r#"{"type":"cancel","league_id":"lg"}"#).unwrap(),
            Request::Cancel {
                league_id: "lg".into(),
                by: None
            }
        );
        assert!(parse_request(r#"{"type":"get_state","league_id":"lg"}"#).is_ok());
    }

    #[test]
    fn unknown_type_is_rejected() {
        assert!(parse_request(r#"{"type":"trade","league_id":"lg"}"#).is_err());
        assert!(parse_request("not json").is_err());
    }

    #[test]
    fn user_facing_errors_keep_their_text() {
        let reply = Reply::from_error(&DraftError::PlayerAlreadyDrafted {
            player_id: "p1".into(),
        });
        assert_eq!(
            serde_json::to_value(&reply).unwrap(),
            json!({
                "type": "error",
                "code": "player_already_drafted",
                "message": "player `p1` has already been drafted"
            })
        );
    }

    #[test]
    fn internal_errors_are_generic() {
        let reply = Reply::from_error(&DraftError::TurnAlreadyResolved {
            overall_pick_number: 3,
        });
        match reply {
            Reply::Error { code, message } => {
                assert_eq!(code, "turn_already_resolved");
                assert_eq!(message, GENERIC_ERROR_MESSAGE);
            }
            other => panic!("expected error reply, got {other:?}"),
        }
    }
}
