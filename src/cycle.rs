// Boost cycle: threshold, selection and boosting, once per tick.
//
// `Ambassador` owns everything a cycle touches, including the threshold
// cache, so there is no global state. Cycles run inline on one task and
// take `&mut self`; one can't start while another is in flight.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use crate::actuator::{self, RepostSummary};
use crate::db::models::{AccountId, StatusId};
use crate::db::MirrorStore;
use crate::mastodon::SocialClient;
use crate::selection::{SelectionSettings, Selector};
use crate::threshold::{ThresholdEstimator, ThresholdSettings, ThresholdState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    Running,
}

/// What to do when a cycle fails before boosting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Log the failure and try again on the next tick.
    SkipCycle,
    /// Stop the process with the error.
    Exit,
}

/// Result of one completed cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub account_id: AccountId,
    pub threshold: f64,
    pub selected: Vec<StatusId>,
    pub reposts: RepostSummary,
}

pub struct Ambassador {
    store: Arc<dyn MirrorStore>,
    client: Arc<dyn SocialClient>,
    estimator: ThresholdEstimator,
    selector: Selector,
    batch_size: usize,
    state: CycleState,
}

impl Ambassador {
    pub fn new(
        store: Arc<dyn MirrorStore>,
        client: Arc<dyn SocialClient>,
        threshold: ThresholdSettings,
        selection: SelectionSettings,
        batch_size: usize,
    ) -> Self {
        Self {
            store,
            client,
            estimator: ThresholdEstimator::new(threshold),
            selector: Selector::new(selection),
            batch_size,
            state: CycleState::Idle,
        }
    }

    pub fn state(&self) -> CycleState {
        self.state
    }

    pub fn threshold_state(&self) -> &ThresholdState {
        self.estimator.state()
    }

    /// Run one cycle against the current wall clock.
    pub async fn run_cycle(&mut self) -> Result<CycleReport> {
        self.run_cycle_at(Utc::now()).await
    }

    /// Run one cycle as if the time were `now`.
    ///
    /// Errors before the boost step abort the cycle with nothing boosted.
    /// Boost failures never fail the cycle; they are counted in the report.
    pub async fn run_cycle_at(&mut self, now: DateTime<Utc>) -> Result<CycleReport> {
        if self.state == CycleState::Running {
            // Only reachable if a previous cycle's future was dropped mid-flight
            anyhow::bail!("A previous cycle did not finish; refusing to start another");
        }

        self.state = CycleState::Running;
        let result = self.execute(now).await;
        self.state = CycleState::Idle;
        result
    }

    async fn execute(&mut self, now: DateTime<Utc>) -> Result<CycleReport> {
        info!("Cycle beginning");

        let account = self
            .client
            .verify_credentials()
            .await
            .context("Failed to resolve the controlled account")?;
        info!(
            account_id = %account.id,
            display_name = account.display_name.as_str(),
            "Authenticated as {} ({})", account.id, account.display_name
        );

        // One connection for every read in this cycle, opened after the API
        // lookup and dropped before boosting. Early returns drop it too.
        let mut session = self
            .store
            .open_session()
            .await
            .context("Error connecting to the mirror database")?;

        let threshold = self
            .estimator
            .current(session.as_mut(), now)
            .await
            .context("No usable popularity threshold; skipping selection")?;
        info!(threshold = threshold.value(), "Current threshold: {threshold}");

        let selected = self
            .selector
            .select(
                session.as_mut(),
                &threshold,
                account.id,
                self.batch_size,
                now,
            )
            .await
            .with_context(|| {
                format!(
                    "Error running candidate query (threshold {}, account {}, batch size {})",
                    threshold, account.id, self.batch_size
                )
            })?;
        drop(session);

        let ids: Vec<i64> = selected.iter().map(|id| id.0).collect();
        info!(?ids, "Selected {} post(s) to boost", selected.len());

        let reposts = actuator::repost_all(self.client.as_ref(), &selected).await;
        info!(
            selected = selected.len(),
            reblogged = reposts.reblogged,
            already_reblogged = reposts.already_reblogged,
            not_allowed = reposts.not_allowed,
            failed = reposts.failed,
            "Cycle complete"
        );

        Ok(CycleReport {
            account_id: account.id,
            threshold: threshold.value(),
            selected,
            reposts,
        })
    }
}

/// Run cycles forever: one immediately, then one per `interval`.
///
/// Returns `Ok` on Ctrl-C, or the cycle error under `FailurePolicy::Exit`.
pub async fn run_forever(
    ambassador: &mut Ambassador,
    interval: Duration,
    policy: FailurePolicy,
) -> Result<()> {
    run_until(ambassador, interval, policy, tokio::signal::ctrl_c()).await
}

/// Like `run_forever`, but stops when `shutdown` resolves.
///
/// `shutdown` is polled for the whole run, so a signal that arrives while a
/// cycle is in flight stops the loop once that cycle returns. A pending
/// shutdown wins over a due tick.
pub async fn run_until<F>(
    ambassador: &mut Ambassador,
    interval: Duration,
    policy: FailurePolicy,
    shutdown: F,
) -> Result<()>
where
    F: Future,
{
    let mut ticker = tokio::time::interval(interval);
    // A slow cycle pushes the schedule back rather than causing a burst
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
        interval_secs = interval.as_secs(),
        ?policy,
        "Scheduler started"
    );

    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => {
                info!("Shutdown requested, stopping scheduler");
                return Ok(());
            }
            _ = ticker.tick() => {}
        }

        if let Err(e) = ambassador.run_cycle().await {
            match policy {
                FailurePolicy::SkipCycle => {
                    error!(error = %format!("{e:#}"), "Cycle failed; retrying on the next tick");
                }
                FailurePolicy::Exit => return Err(e),
            }
        }
    }
}
