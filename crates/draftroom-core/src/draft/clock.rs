// Pick clock: deadlines as persisted data, plus the background sweep.
//
// No in-memory timer is authoritative. A turn's deadline is whatever the
// snapshot says; anything that observes `now > deadline` may resolve it.

use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::engine::DraftEngine;

/// Source of "now". Injected so deadlines can be tested without sleeping.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        ManualClock {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().expect("clock mutex poisoned");
        *now += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock().expect("clock mutex poisoned") = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("clock mutex poisoned")
    }
}

/// Deadline arithmetic for one draft.
#[derive(Debug, Clone, Copy)]
pub struct PickClock {
    pick_time: Duration,
    grace: Duration,
}

impl PickClock {
    pub fn new(pick_time_seconds: u32, grace: Duration) -> Self {
        PickClock {
            pick_time: Duration::seconds(i64::from(pick_time_seconds)),
            grace,
        }
    }

    /// Deadline for a turn that starts at `now`.
    pub fn arm(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + self.pick_time
    }

    /// Whether a turn with `deadline` has run out at `now`.
    pub fn is_expired(&self, deadline: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now > deadline + self.grace
    }

    /// Last deadline wins: a timer armed for `observed` may only fire if that
    /// is still the persisted deadline.
    pub fn is_current(observed: DateTime<Utc>, persisted: Option<DateTime<Utc>>) -> bool {
        persisted == Some(observed)
    }
}

// ---------------------------------------------------------------------------
// Background sweep
// ---------------------------------------------------------------------------

/// Periodically resolve expired turns across all drafts until `shutdown`
/// flips to `true` or its sender is dropped.
pub async fn run_sweeper(
    engine: Arc<DraftEngine>,
    every: StdDuration,
    mut shutdown: watch::Receiver<bool>,
) {
    info!("Timeout sweeper started (every {:?})", every);
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                match engine.evaluate_timeouts().await {
                    Ok(report) if report.autopicks > 0 || report.failures > 0 => {
                        info!(
                            "Sweep examined {} drafts: {} autopicks, {} failures",
                            report.examined, report.autopicks, report.failures
                        );
                    }
                    Ok(report) => debug!("Sweep examined {} drafts, nothing expired", report.examined),
                    Err(e) => warn!("Timeout sweep failed: {}", e),
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    info!("Timeout sweeper stopped");
}
