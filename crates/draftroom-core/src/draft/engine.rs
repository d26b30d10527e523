// Draft state machine.
//
// Every operation is load -> compute -> conditional write of the snapshot.
// The snapshot CAS is the only linearization point: whoever wins it owns
// the turn. Log writes follow the CAS and are idempotent, and a load
// re-applies the snapshot's `last_pick` until this process has seen it
// logged, so a crash between the two loses nothing.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, error, info, warn};

use super::autopick::{self, AutopickReason};
use super::clock::{Clock, PickClock};
use super::completion;
use super::events::{DraftEvent, DraftEventKind};
use super::order::build_order;
use super::pick::DraftPick;
use super::pool::PlayerPool;
use super::roster::{RosterRules, RosterSlot, TeamRoster};
use super::sequencer::{self, Advance};
use super::state::{DraftState, DraftStatus};
use crate::error::{DraftError, GatewayError};
use crate::gateway::{keys, PersistenceGateway};
use crate::services::{LeagueService, LeagueSettings, PlayerService};

/// Engine tunables.
#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    /// Slack added to every deadline before a turn counts as expired.
    pub deadline_grace: Duration,
    /// How many times a transition reloads and retries after losing a
    /// version race before giving up with `VersionConflict`.
    pub max_transition_attempts: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings {
            deadline_grace: Duration::zero(),
            max_transition_attempts: 8,
        }
    }
}

/// A pick submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PickRequest {
    pub league_id: String,
    /// Team the player is drafted to.
    pub team_id: String,
    pub player_id: String,
    /// Team (or commissioner) making the request.
    pub acting_team_id: String,
    /// Skip the acting-team check. Uniqueness and eligibility still apply.
    pub commissioner_override: bool,
    /// The turn the caller believes it is picking for.
    pub expected_overall_pick_number: Option<u32>,
}

impl PickRequest {
    /// A team picking for itself.
    pub fn new(
        league_id: impl Into<String>,
        team_id: impl Into<String>,
        player_id: impl Into<String>,
    ) -> Self {
        let team_id = team_id.into();
        PickRequest {
            league_id: league_id.into(),
            acting_team_id: team_id.clone(),
            team_id,
            player_id: player_id.into(),
            commissioner_override: false,
            expected_overall_pick_number: None,
        }
    }

    pub fn acting_as(mut self, acting_team_id: impl Into<String>) -> Self {
        self.acting_team_id = acting_team_id.into();
        self
    }

    pub fn with_override(mut self) -> Self {
        self.commissioner_override = true;
        self
    }

    pub fn expecting(mut self, overall_pick_number: u32) -> Self {
        self.expected_overall_pick_number = Some(overall_pick_number);
        self
    }
}

/// A recorded pick and the snapshot it produced.
#[derive(Debug, Clone, PartialEq)]
pub struct PickOutcome {
    pub pick: DraftPick,
    pub state: DraftState,
}

/// Result of a timeout evaluation. `autopick` is `None` when there was
/// nothing to resolve: the turn was not expired, the timer was stale, the
/// draft was not drafting, or someone else resolved the turn first.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeoutOutcome {
    pub autopick: Option<DraftPick>,
    pub state: DraftState,
}

/// Tally of one sweep over all drafts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub examined: usize,
    pub autopicks: usize,
    pub failures: usize,
}

/// A snapshot and the version it was read at.
struct Loaded {
    version: u64,
    state: DraftState,
}

fn is_version_conflict(e: &DraftError) -> bool {
    matches!(e, DraftError::Gateway(GatewayError::VersionConflict { .. }))
}

/// The draft engine. Holds no draft state between calls; share it behind
/// an `Arc`.
pub struct DraftEngine {
    gateway: Arc<dyn PersistenceGateway>,
    leagues: Arc<dyn LeagueService>,
    players: Arc<dyn PlayerService>,
    clock: Arc<dyn Clock>,
    settings: EngineSettings,
    /// Highest overall pick per league whose logs this process has written
    /// or confirmed. Logs are append-only, so an entry never goes stale.
    logged: Mutex<HashMap<String, u32>>,
}

impl DraftEngine {
    pub fn new(
        gateway: Arc<dyn PersistenceGateway>,
        leagues: Arc<dyn LeagueService>,
        players: Arc<dyn PlayerService>,
        clock: Arc<dyn Clock>,
        settings: EngineSettings,
    ) -> Self {
        DraftEngine {
            gateway,
            leagues,
            players,
            clock,
            settings,
            logged: Mutex::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    fn attempts(&self) -> u32 {
        self.settings.max_transition_attempts.max(1)
    }

    fn pick_clock(&self, state: &DraftState) -> PickClock {
        PickClock::new(state.pick_time_seconds, self.settings.deadline_grace)
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Persist a PreDraft snapshot with the round 1 order, so it can be
    /// shown before the draft. Returns any existing snapshot unchanged.
    pub async fn prepare(&self, league_id: &str) -> Result<DraftState, DraftError> {
        for _ in 0..self.attempts() {
            if let Some(loaded) = self.load(league_id).await? {
                return Ok(loaded.state);
            }
            let settings = self.league_settings(league_id).await?;
            let order = order_for(&settings)?;
            let state = DraftState::pre_draft(
                league_id,
                settings.draft_type,
                order,
                settings.pick_time_seconds,
                settings.total_rounds,
            );
            match self.save(&state, None).await {
                Ok(_) => {
                    info!("Prepared draft {} with order {:?}", league_id, state.draft_order);
                    return Ok(state);
                }
                Err(e) if is_version_conflict(&e) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(DraftError::VersionConflict {
            league_id: league_id.to_string(),
        })
    }

    /// Start the draft. Idempotent: a draft that is already past PreDraft is
    /// returned unchanged.
    pub async fn start(&self, league_id: &str) -> Result<DraftState, DraftError> {
        for _ in 0..self.attempts() {
            let existing = self.load(league_id).await?;
            if let Some(loaded) = &existing {
                if loaded.state.status != DraftStatus::PreDraft {
                    debug!(
                        "Start for {} ignored, draft is already {}",
                        league_id, loaded.state.status
                    );
                    self.repair_start(&loaded.state, loaded.version).await;
                    return Ok(loaded.state.clone());
                }
            }

            let settings = self.league_settings(league_id).await?;
            let (mut state, expected) = match existing {
                Some(loaded) => (loaded.state, Some(loaded.version)),
                None => {
                    let order = order_for(&settings)?;
                    let state = DraftState::pre_draft(
                        league_id,
                        settings.draft_type,
                        order,
                        settings.pick_time_seconds,
                        settings.total_rounds,
                    );
                    (state, None)
                }
            };
            validate_draft(&state)?;

            let pool = self.pool(league_id).await?;
            if (pool.eligible_count() as u64) < u64::from(state.total_picks()) {
                return Err(DraftError::InvalidConfiguration(format!(
                    "{} eligible players cannot fill {} picks",
                    pool.eligible_count(),
                    state.total_picks()
                )));
            }

            let first = sequencer::first_turn(&state.draft_order, state.draft_type).ok_or_else(
                || DraftError::InvalidConfiguration("draft order is empty".into()),
            )?;
            let now = self.clock.now();
            state.status = DraftStatus::Drafting;
            state.move_to(&first);
            state.deadline_at = Some(self.pick_clock(&state).arm(now));
            state.started_at = Some(now);

            match self.save(&state, expected).await {
                Ok(version) => {
                    info!(
                        "Draft {} started: {} teams, {} rounds, {} on the clock",
                        league_id,
                        state.team_count(),
                        state.total_rounds,
                        first.team_id
                    );
                    let event = DraftEvent::lifecycle(DraftEventKind::Started, &state, now, None);
                    self.record_event(&event, version).await;
                    if let Err(e) = self.leagues.notify_draft_started(league_id).await {
                        warn!("League service did not take draft start for {}: {:#}", league_id, e);
                    }
                    return Ok(state);
                }
                Err(e) if is_version_conflict(&e) => {
                    debug!("Concurrent start for {}, reloading", league_id);
                    continue;
                }
                Err(e) => return Err(e),
            }
        }
        Err(DraftError::VersionConflict {
            league_id: league_id.to_string(),
        })
    }

    /// Freeze the clock. Pausing a paused draft is a no-op.
    pub async fn pause(&self, league_id: &str, by: Option<&str>) -> Result<DraftState, DraftError> {
        self.transition(league_id, "pause", DraftEventKind::Paused, by, |state, _now, _clock| {
            let status = state.status;
            match status {
                DraftStatus::Paused => Ok(false),
                DraftStatus::Drafting => {
                    state.status = DraftStatus::Paused;
                    state.deadline_at = None;
                    Ok(true)
                }
                status => Err(DraftError::InvalidState {
                    operation: "pause",
                    status,
                }),
            }
        })
        .await
    }

    /// Resume a paused draft with a full pick window for the team on the
    /// clock. Resuming a running draft is a no-op.
    pub async fn resume(&self, league_id: &str, by: Option<&str>) -> Result<DraftState, DraftError> {
        self.transition(league_id, "resume", DraftEventKind::Resumed, by, |state, now, clock| {
            let status = state.status;
            match status {
                DraftStatus::Drafting => Ok(false),
                DraftStatus::Paused => {
                    state.status = DraftStatus::Drafting;
                    state.deadline_at = Some(clock.arm(now));
                    Ok(true)
                }
                status => Err(DraftError::InvalidState {
                    operation: "resume",
                    status,
                }),
            }
        })
        .await
    }

    /// Administrative stop. Valid while drafting or paused; terminal.
    pub async fn cancel(&self, league_id: &str, by: Option<&str>) -> Result<DraftState, DraftError> {
        self.transition(league_id, "cancel", DraftEventKind::Canceled, by, |state, _now, _clock| {
            let status = state.status;
            match status {
                DraftStatus::Canceled => Ok(false),
                DraftStatus::Drafting | DraftStatus::Paused => {
                    state.status = DraftStatus::Canceled;
                    state.deadline_at = None;
                    state.on_clock_team_id = None;
                    Ok(true)
                }
                status => Err(DraftError::InvalidState {
                    operation: "cancel",
                    status,
                }),
            }
        })
        .await
    }

    /// Shared load/apply/CAS loop for administrative transitions. `apply`
    /// returns `Ok(false)` when the draft is already in the target state.
    async fn transition<F>(
        &self,
        league_id: &str,
        operation: &'static str,
        kind: DraftEventKind,
        by: Option<&str>,
        apply: F,
    ) -> Result<DraftState, DraftError>
    where
        F: Fn(&mut DraftState, DateTime<Utc>, &PickClock) -> Result<bool, DraftError> + Send + Sync,
    {
        for _ in 0..self.attempts() {
            let loaded = self.load_required(league_id).await?;
            let mut state = loaded.state;
            let now = self.clock.now();
            let clock = self.pick_clock(&state);
            if !apply(&mut state, now, &clock)? {
                return Ok(state);
            }
            match self.save(&state, Some(loaded.version)).await {
                Ok(version) => {
                    info!("Draft {}: {} by {}", league_id, operation, by.unwrap_or("system"));
                    let event = DraftEvent::lifecycle(kind, &state, now, by);
                    self.record_event(&event, version).await;
                    return Ok(state);
                }
                Err(e) if is_version_conflict(&e) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(DraftError::VersionConflict {
            league_id: league_id.to_string(),
        })
    }

    // -----------------------------------------------------------------------
    // Picks
    // -----------------------------------------------------------------------

    /// Record a pick for the team on the clock.
    ///
    /// At most one pick is ever recorded per turn. A caller that loses the
    /// race gets `TurnAlreadyResolved`, or the winning pick itself if it is
    /// exactly what the caller asked for.
    pub async fn submit_pick(&self, req: &PickRequest) -> Result<PickOutcome, DraftError> {
        let league_id = req.league_id.as_str();
        let mut expected = req.expected_overall_pick_number;

        for _ in 0..self.attempts() {
            let loaded = self.load_required(league_id).await?;
            let state = &loaded.state;

            if let Some(n) = expected {
                if state.overall_pick_number != n || state.status == DraftStatus::Complete {
                    return self.resolve_stale(req, n, state).await;
                }
            }
            if state.status != DraftStatus::Drafting {
                return Err(DraftError::InvalidState {
                    operation: "submit a pick",
                    status: state.status,
                });
            }

            let now = self.clock.now();
            let deadline = state.deadline_at.ok_or_else(|| {
                DraftError::InvalidConfiguration(format!("draft {league_id} is drafting without a deadline"))
            })?;
            if self.pick_clock(state).is_expired(deadline, now) {
                // The expired turn belongs to the autopick path.
                match self.timeout_at(league_id, Some(deadline)).await {
                    Ok(_) => {}
                    Err(e) if e.is_concurrency_conflict() => {}
                    Err(e) => warn!("Lazy timeout for {} failed: {}", league_id, e),
                }
                debug!("Rejected late pick from {} in {}", req.acting_team_id, league_id);
                return Err(DraftError::DeadlineExpired { deadline_at: deadline });
            }

            let on_clock = state.on_clock_team_id.clone().unwrap_or_default();
            if req.team_id != on_clock
                || (!req.commissioner_override && req.acting_team_id != on_clock)
            {
                let team_id = if req.commissioner_override {
                    req.team_id.clone()
                } else {
                    req.acting_team_id.clone()
                };
                debug!("Rejected out-of-turn pick from {} in {}", team_id, league_id);
                return Err(DraftError::NotYourTurn { team_id, on_clock });
            }

            let drafted = self.drafted_players(league_id).await?;
            if drafted.contains(&req.player_id) {
                debug!("Rejected pick of drafted player {} in {}", req.player_id, league_id);
                return Err(DraftError::PlayerAlreadyDrafted {
                    player_id: req.player_id.clone(),
                });
            }
            let pool = self.pool(league_id).await?;
            let Some(player) = pool.eligible(&req.player_id) else {
                debug!("Rejected pick of ineligible player {} in {}", req.player_id, league_id);
                return Err(DraftError::PlayerIneligible {
                    player_id: req.player_id.clone(),
                });
            };

            let mut pick = DraftPick::for_turn(state, player, now, false);
            if req.acting_team_id != req.team_id {
                pick.by = Some(req.acting_team_id.clone());
            }

            match self.commit_pick(&loaded, pick).await {
                Ok(outcome) => return Ok(outcome),
                Err(e) if is_version_conflict(&e) => {
                    debug!(
                        "Pick {} in {} lost a version race, reloading",
                        state.overall_pick_number, league_id
                    );
                    expected.get_or_insert(state.overall_pick_number);
                }
                Err(e) => return Err(e),
            }
        }
        Err(DraftError::VersionConflict {
            league_id: league_id.to_string(),
        })
    }

    /// The draft moved past the turn the caller was aiming at.
    async fn resolve_stale(
        &self,
        req: &PickRequest,
        expected: u32,
        state: &DraftState,
    ) -> Result<PickOutcome, DraftError> {
        let picks = self.pick_log(&req.league_id).await?;
        match picks.into_iter().find(|p| p.overall_pick_number == expected) {
            Some(pick) if pick.matches_intent(&req.team_id, &req.player_id) => {
                debug!("Duplicate submit of pick {} in {} accepted", expected, req.league_id);
                Ok(PickOutcome {
                    pick,
                    state: state.clone(),
                })
            }
            Some(_) => {
                info!("Pick {} in {} was resolved by someone else", expected, req.league_id);
                Err(DraftError::TurnAlreadyResolved {
                    overall_pick_number: expected,
                })
            }
            None if state.status != DraftStatus::Drafting => Err(DraftError::InvalidState {
                operation: "submit a pick",
                status: state.status,
            }),
            None => Err(DraftError::NotYourTurn {
                team_id: req.acting_team_id.clone(),
                on_clock: state.on_clock_team_id.clone().unwrap_or_default(),
            }),
        }
    }

    /// CAS the snapshot that records `pick` and advances the cursor, then
    /// write the logs.
    async fn commit_pick(&self, loaded: &Loaded, pick: DraftPick) -> Result<PickOutcome, DraftError> {
        let mut next = loaded.state.clone();
        let now = pick.timestamp;
        next.last_pick = Some(pick.clone());

        match sequencer::next(
            &next.draft_order,
            next.round,
            next.pick_index_in_round,
            next.draft_type,
            next.total_rounds,
        ) {
            Advance::Next(turn) => {
                next.move_to(&turn);
                next.deadline_at = Some(self.pick_clock(&next).arm(now));
            }
            Advance::Complete => {
                next.status = DraftStatus::Complete;
                next.on_clock_team_id = None;
                next.deadline_at = None;
                next.completed_at = Some(now);
            }
        }

        let version = self.save(&next, Some(loaded.version)).await?;
        if pick.is_autopick {
            info!(
                "Autopick {} in {}: {} takes {} ({})",
                pick.overall_pick_number, pick.league_id, pick.team_id, pick.player_name, pick.position
            );
        } else {
            info!(
                "Pick {} in {}: {} takes {} ({})",
                pick.overall_pick_number, pick.league_id, pick.team_id, pick.player_name, pick.position
            );
        }

        if let Err(e) = self.record_pick_logs(&pick).await {
            // Committed already; the next load re-applies `last_pick`.
            warn!("Log write for pick {} in {} deferred: {}", pick.overall_pick_number, pick.league_id, e);
        }

        if next.status == DraftStatus::Complete {
            info!("Draft {} complete after {} picks", next.draft_id, next.total_picks());
            next = self.finalize(next, version).await;
        }
        Ok(PickOutcome { pick, state: next })
    }

    // -----------------------------------------------------------------------
    // Timeouts
    // -----------------------------------------------------------------------

    /// Autopick for the team on the clock if its deadline has passed.
    pub async fn timeout(&self, league_id: &str) -> Result<TimeoutOutcome, DraftError> {
        self.timeout_at(league_id, None).await
    }

    /// Like [`timeout`](Self::timeout), for a timer armed at
    /// `observed_deadline`. Does nothing unless that is still the persisted
    /// deadline.
    pub async fn timeout_at(
        &self,
        league_id: &str,
        observed_deadline: Option<DateTime<Utc>>,
    ) -> Result<TimeoutOutcome, DraftError> {
        let mut observed = observed_deadline;

        for _ in 0..self.attempts() {
            let loaded = self.load_required(league_id).await?;
            let state = &loaded.state;
            let idle = || {
                Ok(TimeoutOutcome {
                    autopick: None,
                    state: state.clone(),
                })
            };

            if state.status != DraftStatus::Drafting {
                return idle();
            }
            let Some(deadline) = state.deadline_at else {
                warn!("Draft {} is drafting without a deadline", league_id);
                return idle();
            };
            if let Some(seen) = observed {
                if !PickClock::is_current(seen, state.deadline_at) {
                    debug!("Stale timer for {} (armed {}, now {})", league_id, seen, deadline);
                    return idle();
                }
            }
            let now = self.clock.now();
            if !self.pick_clock(state).is_expired(deadline, now) {
                return idle();
            }

            let Some(team_id) = state.on_clock_team_id.clone() else {
                return idle();
            };
            let picks = self.pick_log(league_id).await?;
            let drafted: HashSet<String> = picks.iter().map(|p| p.player_id.clone()).collect();
            let roster = TeamRoster::from_picks(&team_id, picks.iter().filter(|p| p.team_id == team_id));
            let rules = match self.leagues.league_config(league_id).await? {
                Some(settings) => settings.roster_rules(),
                None => RosterRules::default(),
            };
            let pool = self.pool(league_id).await?;

            let choice = match autopick::choose(&roster, &pool, &drafted, &rules) {
                Ok(choice) => choice,
                Err(e) => {
                    error!("Autopick for {} in {} failed: {}", team_id, league_id, e);
                    return Err(e);
                }
            };
            match choice.reason {
                AutopickReason::RosterNeed(pos) => debug!("Autopick for {} fills {}", team_id, pos),
                AutopickReason::BestAvailable => debug!("Autopick for {} takes best available", team_id),
            }

            let pick = DraftPick::for_turn(state, choice.player, now, true);
            match self.commit_pick(&loaded, pick).await {
                Ok(outcome) => {
                    return Ok(TimeoutOutcome {
                        autopick: Some(outcome.pick),
                        state: outcome.state,
                    })
                }
                Err(e) if is_version_conflict(&e) => {
                    // Only retry for this same turn.
                    observed.get_or_insert(deadline);
                }
                Err(e) => return Err(e),
            }
        }
        Err(DraftError::VersionConflict {
            league_id: league_id.to_string(),
        })
    }

    /// Resolve every expired turn and retry every unfinished completion.
    /// One draft failing does not stop the sweep.
    pub async fn evaluate_timeouts(&self) -> Result<SweepReport, DraftError> {
        let mut report = SweepReport::default();
        for key in self.gateway.list_keys(keys::DRAFT_PREFIX).await? {
            let Some(league_id) = keys::league_from_state_key(&key) else {
                continue;
            };
            report.examined += 1;
            match self.sweep_one(league_id).await {
                Ok(true) => report.autopicks += 1,
                Ok(false) => {}
                Err(e) if e.is_concurrency_conflict() => {
                    debug!("Sweep of {} raced another resolver: {}", league_id, e);
                }
                Err(e) => {
                    error!("Sweep of {} failed: {}", league_id, e);
                    report.failures += 1;
                }
            }
        }
        Ok(report)
    }

    async fn sweep_one(&self, league_id: &str) -> Result<bool, DraftError> {
        let Some(loaded) = self.load(league_id).await? else {
            return Ok(false);
        };
        let state = loaded.state;
        match (state.status, state.deadline_at) {
            (DraftStatus::Complete, _) if !state.finalized => {
                self.finalize(state, loaded.version).await;
                Ok(false)
            }
            (DraftStatus::Drafting, Some(deadline))
                if self.pick_clock(&state).is_expired(deadline, self.clock.now()) =>
            {
                let outcome = self.timeout_at(league_id, Some(deadline)).await?;
                Ok(outcome.autopick.is_some())
            }
            _ => Ok(false),
        }
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Current snapshot. An expired turn is resolved first and an unfinished
    /// completion is retried.
    pub async fn state(&self, league_id: &str) -> Result<DraftState, DraftError> {
        let loaded = self.load_required(league_id).await?;
        let state = loaded.state;
        match (state.status, state.deadline_at) {
            (DraftStatus::Complete, _) if !state.finalized => {
                Ok(self.finalize(state, loaded.version).await)
            }
            (DraftStatus::Drafting, Some(deadline))
                if self.pick_clock(&state).is_expired(deadline, self.clock.now()) =>
            {
                match self.timeout_at(league_id, Some(deadline)).await {
                    Ok(outcome) => Ok(outcome.state),
                    Err(e) if e.is_concurrency_conflict() => {
                        Ok(self.load_required(league_id).await?.state)
                    }
                    Err(e) => Err(e),
                }
            }
            _ => Ok(state),
        }
    }

    /// Recorded picks in overall order.
    pub async fn picks(&self, league_id: &str) -> Result<Vec<DraftPick>, DraftError> {
        self.load_required(league_id).await?;
        self.pick_log(league_id).await
    }

    /// Roster bindings in the order they were written.
    pub async fn rosters(&self, league_id: &str) -> Result<Vec<RosterSlot>, DraftError> {
        self.load_required(league_id).await?;
        self.gateway
            .read_log(&keys::rosters(league_id))
            .await?
            .into_iter()
            .map(|v| serde_json::from_value(v).map_err(DraftError::from))
            .collect()
    }

    /// Audit trail, oldest first.
    pub async fn events(&self, league_id: &str) -> Result<Vec<DraftEvent>, DraftError> {
        self.load_required(league_id).await?;
        self.gateway
            .read_log(&keys::events(league_id))
            .await?
            .into_iter()
            .map(|v| serde_json::from_value(v).map_err(DraftError::from))
            .collect()
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    async fn load(&self, league_id: &str) -> Result<Option<Loaded>, DraftError> {
        let Some(doc) = self.gateway.get(&keys::state(league_id)).await? else {
            return Ok(None);
        };
        let state: DraftState = serde_json::from_value(doc.value)?;
        if let Err(violation) = state.check_invariants() {
            warn!("Draft {} snapshot v{} is inconsistent: {}", league_id, doc.version, violation);
        }
        if let Some(pick) = &state.last_pick {
            if !self.is_logged(pick) {
                self.record_pick_logs(pick).await?;
            }
        }
        Ok(Some(Loaded {
            version: doc.version,
            state,
        }))
    }

    async fn load_required(&self, league_id: &str) -> Result<Loaded, DraftError> {
        self.load(league_id).await?.ok_or_else(|| DraftError::NotFound {
            league_id: league_id.to_string(),
        })
    }

    async fn save(&self, state: &DraftState, expected: Option<u64>) -> Result<u64, DraftError> {
        let value = serde_json::to_value(state)?;
        Ok(self
            .gateway
            .put(&keys::state(&state.draft_id), value, expected)
            .await?)
    }

    /// Append `entry` unless it is already there. `Ok(false)` on duplicate.
    async fn append_once(
        &self,
        log_key: &str,
        unique_key: &str,
        entry: serde_json::Value,
    ) -> Result<bool, DraftError> {
        match self.gateway.append_unique(log_key, unique_key, entry).await {
            Ok(()) => Ok(true),
            Err(GatewayError::DuplicateKey { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Pick log, roster slot and event for a committed pick.
    async fn record_pick_logs(&self, pick: &DraftPick) -> Result<(), DraftError> {
        let league_id = pick.league_id.as_str();
        let appended = self
            .append_once(
                &keys::picks(league_id),
                &pick.overall_pick_number.to_string(),
                serde_json::to_value(pick)?,
            )
            .await?;
        self.append_once(
            &keys::rosters(league_id),
            &pick.player_id,
            serde_json::to_value(RosterSlot::from_pick(pick))?,
        )
        .await?;
        let event = DraftEvent::from_pick(pick);
        self.append_once(
            &keys::events(league_id),
            &event.unique_key(0),
            serde_json::to_value(&event)?,
        )
        .await?;
        if appended {
            debug!("Logged pick {} for {}", pick.overall_pick_number, league_id);
        }
        if let Ok(mut logged) = self.logged.lock() {
            let seen = logged.entry(league_id.to_string()).or_insert(0);
            *seen = (*seen).max(pick.overall_pick_number);
        }
        Ok(())
    }

    fn is_logged(&self, pick: &DraftPick) -> bool {
        self.logged
            .lock()
            .map(|logged| {
                logged
                    .get(&pick.league_id)
                    .is_some_and(|&seen| seen >= pick.overall_pick_number)
            })
            .unwrap_or(false)
    }

    /// Redo the Started event and league notification for a draft whose
    /// start committed without them. A retried put can land and still
    /// report a conflict, which sends `start` down the already-started path.
    async fn repair_start(&self, state: &DraftState, version: u64) {
        let Some(started_at) = state.started_at else {
            return;
        };
        let recorded = match self.gateway.read_log(&keys::events(&state.draft_id)).await {
            Ok(entries) => entries
                .into_iter()
                .filter_map(|v| serde_json::from_value::<DraftEvent>(v).ok())
                .any(|e| e.kind == DraftEventKind::Started),
            Err(e) => {
                warn!("Could not read events for {}: {}", state.draft_id, e);
                return;
            }
        };
        if recorded {
            return;
        }

        warn!("Draft {} is running without a start record, repairing", state.draft_id);
        let event = DraftEvent::lifecycle(DraftEventKind::Started, state, started_at, None);
        self.record_event(&event, version).await;
        if let Err(e) = self.leagues.notify_draft_started(&state.draft_id).await {
            warn!("League service did not take draft start for {}: {:#}", state.draft_id, e);
        }
    }

    /// Events are audit data; failing to write one never fails a transition.
    async fn record_event(&self, event: &DraftEvent, version: u64) {
        let value = match serde_json::to_value(event) {
            Ok(v) => v,
            Err(e) => {
                warn!("Could not encode {:?} event for {}: {}", event.kind, event.draft_id, e);
                return;
            }
        };
        if let Err(e) = self
            .append_once(&keys::events(&event.draft_id), &event.unique_key(version), value)
            .await
        {
            warn!("Could not log {:?} event for {}: {}", event.kind, event.draft_id, e);
        }
    }

    /// Materialize rosters, notify the league, and mark the snapshot
    /// finalized. Failures leave `finalized` unset for the next state read
    /// or sweep to retry.
    async fn finalize(&self, mut state: DraftState, version: u64) -> DraftState {
        match completion::finalize(self.gateway.as_ref(), self.leagues.as_ref(), &state).await {
            Ok(_) => {
                let ts = state.completed_at.unwrap_or_else(|| self.clock.now());
                let event = DraftEvent::lifecycle(DraftEventKind::Completed, &state, ts, None);
                self.record_event(&event, version).await;

                state.finalized = true;
                match self.save(&state, Some(version)).await {
                    Ok(_) => {}
                    Err(e) if is_version_conflict(&e) => {
                        debug!("Draft {} was finalized concurrently", state.draft_id);
                    }
                    Err(e) => warn!("Could not mark draft {} finalized: {}", state.draft_id, e),
                }
            }
            Err(e) => error!("Finalizing draft {} failed, will retry: {}", state.draft_id, e),
        }
        state
    }

    async fn league_settings(&self, league_id: &str) -> Result<LeagueSettings, DraftError> {
        self.leagues
            .league_config(league_id)
            .await?
            .ok_or_else(|| DraftError::NotFound {
                league_id: league_id.to_string(),
            })
    }

    async fn pool(&self, league_id: &str) -> Result<PlayerPool, DraftError> {
        Ok(PlayerPool::new(self.players.list_eligible_players(league_id).await?))
    }

    async fn pick_log(&self, league_id: &str) -> Result<Vec<DraftPick>, DraftError> {
        let mut picks: Vec<DraftPick> = self
            .gateway
            .read_log(&keys::picks(league_id))
            .await?
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<_, _>>()?;
        picks.sort_by_key(|p| p.overall_pick_number);
        Ok(picks)
    }

    async fn drafted_players(&self, league_id: &str) -> Result<HashSet<String>, DraftError> {
        Ok(self
            .pick_log(league_id)
            .await?
            .into_iter()
            .map(|p| p.player_id)
            .collect())
    }
}

fn order_for(settings: &LeagueSettings) -> Result<Vec<String>, DraftError> {
    build_order(
        &settings.team_ids,
        settings.draft_order_mode,
        &settings.manual_order,
        &settings.standings,
        settings.order_seed,
    )
}

fn validate_draft(state: &DraftState) -> Result<(), DraftError> {
    if state.total_rounds == 0 {
        return Err(DraftError::InvalidConfiguration("total rounds must be at least 1".into()));
    }
    if state.pick_time_seconds == 0 {
        return Err(DraftError::InvalidConfiguration("pick time must be at least 1 second".into()));
    }
    if state.draft_order.is_empty() {
        return Err(DraftError::InvalidConfiguration("draft order is empty".into()));
    }
    if state.checked_total_picks().is_none() {
        return Err(DraftError::InvalidConfiguration(format!(
            "{} rounds of {} teams is too many picks",
            state.total_rounds,
            state.team_count()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::draft::sequencer::DraftType;

    #[test]
    fn pick_request_defaults_to_self() {
        let req = PickRequest::new("lg", "A", "p1");
        assert_eq!(req.acting_team_id, "A");
        assert!(!req.commissioner_override);
        assert!(req.expected_overall_pick_number.is_none());

        let req = req.acting_as("commish").with_override().expecting(3);
        assert_eq!(req.team_id, "A");
        assert_eq!(req.acting_team_id, "commish");
        assert!(req.commissioner_override);
        assert_eq!(req.expected_overall_pick_number, Some(3));
    }

    #[test]
    fn validate_draft_rejects_degenerate_setups() {
        let ok = DraftState::pre_draft("lg", DraftType::Snake, vec!["A".into()], 30, 1);
        assert!(validate_draft(&ok).is_ok());

        let mut no_rounds = ok.clone();
        no_rounds.total_rounds = 0;
        assert!(matches!(validate_draft(&no_rounds), Err(DraftError::InvalidConfiguration(_))));

        let mut no_time = ok.clone();
        no_time.pick_time_seconds = 0;
        assert!(validate_draft(&no_time).is_err());

        let mut no_teams = ok.clone();
        no_teams.draft_order.clear();
        assert!(validate_draft(&no_teams).is_err());

        let mut oversized = ok;
        oversized.draft_order = vec!["A".into(), "B".into(), "C".into()];
        oversized.total_rounds = u32::MAX / 2;
        assert!(matches!(validate_draft(&oversized), Err(DraftError::InvalidConfiguration(_))));
    }

    #[test]
    fn only_gateway_conflicts_count_as_version_races() {
        let race = DraftError::Gateway(GatewayError::VersionConflict {
            key: "k".into(),
            expected: Some(1),
        });
        assert!(is_version_conflict(&race));
        assert!(!is_version_conflict(&DraftError::VersionConflict {
            league_id: "lg".into()
        }));
    }
}
