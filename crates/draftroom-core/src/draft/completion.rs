// Draft completion: materialize final rosters from the pick log.

use std::collections::HashMap;

use tracing::{error, info, warn};

use super::pick::DraftPick;
use super::roster::RosterSlot;
use super::state::DraftState;
use crate::error::{DraftError, GatewayError};
use crate::gateway::{keys, PersistenceGateway};
use crate::services::LeagueService;

/// What a completion pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompletionReport {
    /// Picks in the log, including a final pick restored from the snapshot.
    pub picks: usize,
    /// Roster slots written by this pass.
    pub slots_written: usize,
    /// Roster slots that already existed for the right team.
    pub slots_confirmed: usize,
}

/// Write or confirm a roster slot for every pick of a completed draft, then
/// tell the league service the draft is over.
///
/// Safe to run any number of times: slots are appended keyed by player, so
/// a second pass only confirms what the first wrote. The snapshot's last
/// pick is restored to the log first, since its log write may have been
/// lost after the snapshot committed. Any other hole in `1..=total` fails
/// the pass with [`DraftError::IncompletePickLog`] before the league is
/// notified.
pub async fn finalize(
    gateway: &dyn PersistenceGateway,
    leagues: &dyn LeagueService,
    state: &DraftState,
) -> Result<CompletionReport, DraftError> {
    let league_id = state.draft_id.as_str();
    let picks_key = keys::picks(league_id);

    let mut picks: Vec<DraftPick> = gateway
        .read_log(&picks_key)
        .await?
        .into_iter()
        .map(serde_json::from_value)
        .collect::<Result<_, _>>()?;

    if let Some(last) = &state.last_pick {
        if !picks.iter().any(|p| p.overall_pick_number == last.overall_pick_number) {
            warn!(
                "Draft {}: restoring pick {} from the snapshot",
                league_id, last.overall_pick_number
            );
            let value = serde_json::to_value(last)?;
            match gateway
                .append_unique(&picks_key, &last.overall_pick_number.to_string(), value)
                .await
            {
                Ok(()) | Err(GatewayError::DuplicateKey { .. }) => {}
                Err(e) => return Err(e.into()),
            }
            picks.push(last.clone());
        }
    }
    picks.sort_by_key(|p| p.overall_pick_number);

    let mut report = CompletionReport {
        picks: picks.len(),
        ..Default::default()
    };

    let existing: HashMap<String, String> = gateway
        .read_log(&keys::rosters(league_id))
        .await?
        .into_iter()
        .map(serde_json::from_value::<RosterSlot>)
        .map(|slot| slot.map(|s| (s.player_id, s.team_id)))
        .collect::<Result<_, _>>()?;

    let rosters_key = keys::rosters(league_id);
    for pick in &picks {
        match existing.get(&pick.player_id) {
            Some(team) if *team == pick.team_id => report.slots_confirmed += 1,
            Some(team) => {
                error!(
                    "Player {} is rostered to {} but pick {} went to {}",
                    pick.player_id, team, pick.overall_pick_number, pick.team_id
                );
            }
            None => {
                let slot = serde_json::to_value(RosterSlot::from_pick(pick))?;
                match gateway.append_unique(&rosters_key, &pick.player_id, slot).await {
                    Ok(()) => report.slots_written += 1,
                    Err(GatewayError::DuplicateKey { .. }) => report.slots_confirmed += 1,
                    Err(e) => return Err(e.into()),
                }
            }
        }
    }

    let missing = missing_picks(&picks, state.total_picks());
    if !missing.is_empty() {
        warn!(
            "Draft {} has {} of {} picks (missing {:?})",
            league_id,
            picks.len(),
            state.total_picks(),
            missing
        );
        return Err(DraftError::IncompletePickLog {
            league_id: league_id.to_string(),
            missing,
        });
    }

    leagues.notify_draft_complete(league_id).await?;

    info!(
        "Finalized draft {}: {} picks, {} slots written, {} confirmed",
        league_id, report.picks, report.slots_written, report.slots_confirmed
    );
    Ok(report)
}

/// Overall pick numbers in `1..=total` absent from `picks` (sorted).
fn missing_picks(picks: &[DraftPick], total: u32) -> Vec<u32> {
    let mut recorded = picks.iter().map(|p| p.overall_pick_number).peekable();
    let mut missing = Vec::new();
    for n in 1..=total {
        while recorded.next_if(|&r| r < n).is_some() {}
        if recorded.next_if_eq(&n).is_none() {
            missing.push(n);
        }
    }
    missing
}
