// Error taxonomy for the draft engine and the persistence gateway.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::draft::state::DraftStatus;

// ---------------------------------------------------------------------------
// Gateway errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum GatewayError {
    /// A conditional write lost the race: the stored version is not the one
    /// the caller read.
    #[error("version conflict on `{key}` (expected {expected:?})")]
    VersionConflict { key: String, expected: Option<u64> },

    /// An append collided with an existing entry carrying the same unique key.
    #[error("duplicate key `{unique_key}` in log `{log_key}`")]
    DuplicateKey { log_key: String, unique_key: String },

    /// The store could not be reached. Safe to retry.
    #[error("persistence unavailable: {0}")]
    Unavailable(String),

    #[error("storage failure: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("corrupt stored value: {0}")]
    Corrupt(#[from] serde_json::Error),
}

impl GatewayError {
    /// Whether the failure is worth retrying at the gateway boundary.
    pub fn is_transient(&self) -> bool {
        match self {
            GatewayError::Unavailable(_) => true,
            GatewayError::Storage(rusqlite::Error::SqliteFailure(e, _)) => matches!(
                e.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Engine errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum DraftError {
    #[error("invalid draft configuration: {0}")]
    InvalidConfiguration(String),

    #[error("no draft found for league `{league_id}`")]
    NotFound { league_id: String },

    #[error("cannot {operation} while draft is {status}")]
    InvalidState {
        operation: &'static str,
        status: DraftStatus,
    },

    #[error("team `{team_id}` is not on the clock (on clock: `{on_clock}`)")]
    NotYourTurn { team_id: String, on_clock: String },

    #[error("pick deadline passed at {deadline_at}")]
    DeadlineExpired { deadline_at: DateTime<Utc> },

    #[error("player `{player_id}` has already been drafted")]
    PlayerAlreadyDrafted { player_id: String },

    #[error("player `{player_id}` is not eligible in this draft")]
    PlayerIneligible { player_id: String },

    #[error("pick {overall_pick_number} was already resolved")]
    TurnAlreadyResolved { overall_pick_number: u32 },

    #[error("draft `{league_id}` kept changing underneath the transition")]
    VersionConflict { league_id: String },

    #[error("no eligible players remain for team `{team_id}`")]
    NoEligiblePlayersRemaining { team_id: String },

    /// The pick log of a completed draft has holes; rosters cannot be
    /// finalized until they are filled.
    #[error("draft `{league_id}` is missing picks {missing:?}")]
    IncompletePickLog { league_id: String, missing: Vec<u32> },

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("failed to decode draft snapshot: {0}")]
    Snapshot(#[from] serde_json::Error),

    #[error(transparent)]
    Collaborator(#[from] anyhow::Error),
}

impl DraftError {
    /// Stable machine-readable code, used by the trigger surface.
    pub fn code(&self) -> &'static str {
        match self {
            DraftError::InvalidConfiguration(_) => "invalid_configuration",
            DraftError::NotFound { .. } => "not_found",
            DraftError::InvalidState { .. } => "invalid_state",
            DraftError::NotYourTurn { .. } => "not_your_turn",
            DraftError::DeadlineExpired { .. } => "deadline_expired",
            DraftError::PlayerAlreadyDrafted { .. } => "player_already_drafted",
            DraftError::PlayerIneligible { .. } => "player_ineligible",
            DraftError::TurnAlreadyResolved { .. } => "turn_already_resolved",
            DraftError::VersionConflict { .. } => "version_conflict",
            DraftError::NoEligiblePlayersRemaining { .. } => "no_eligible_players_remaining",
            DraftError::IncompletePickLog { .. } => "incomplete_pick_log",
            DraftError::Gateway(_) => "persistence_error",
            DraftError::Snapshot(_) => "snapshot_error",
            DraftError::Collaborator(_) => "collaborator_error",
        }
    }

    /// Expected rejections shown to the user verbatim. Never logged as
    /// system errors.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            DraftError::NotYourTurn { .. }
                | DraftError::DeadlineExpired { .. }
                | DraftError::PlayerAlreadyDrafted { .. }
                | DraftError::PlayerIneligible { .. }
        )
    }

    /// Someone else resolved the turn first; re-fetch the state.
    pub fn is_concurrency_conflict(&self) -> bool {
        matches!(
            self,
            DraftError::TurnAlreadyResolved { .. } | DraftError::VersionConflict { .. }
        )
    }

    /// Indicates a configuration bug operators must look at.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DraftError::NoEligiblePlayersRemaining { .. } | DraftError::InvalidConfiguration(_)
        )
    }
}
