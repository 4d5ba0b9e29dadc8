// Adaptive popularity threshold.
//
// The cutoff is the rounded-up average favourite count of recent posts,
// scaled by a tunable ratio. Computing it scans a month of posts, so the
// value is cached and only recomputed every `check_interval` cycles.

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tracing::{debug, info};

use crate::db::MirrorSession;

/// The smallest usable cutoff. Anything lower would select every post.
pub const MIN_THRESHOLD: f64 = 1.0;

#[derive(Debug, Error)]
pub enum ThresholdError {
    #[error("could not read average engagement: {0:#}")]
    Store(anyhow::Error),

    #[error("no posts with more than one favourite in the last {window_days} days")]
    NoData { window_days: i64 },

    #[error("threshold too low: {0}")]
    BelowMinimum(f64),
}

/// Tuning knobs for the threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdSettings {
    /// How far back the average looks.
    pub recency_window: Duration,
    /// Cycles a computed value is reused before recomputing.
    pub check_interval: i64,
    pub numerator: f64,
    pub denominator: f64,
}

impl Default for ThresholdSettings {
    fn default() -> Self {
        Self {
            recency_window: Duration::days(30),
            check_interval: 15,
            numerator: 1.0,
            denominator: 1.0,
        }
    }
}

/// A cutoff that has been checked against `MIN_THRESHOLD`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Threshold(f64);

impl Threshold {
    pub fn new(value: f64) -> Result<Self, ThresholdError> {
        // NaN fails this comparison too
        if value >= MIN_THRESHOLD {
            Ok(Self(value))
        } else {
            Err(ThresholdError::BelowMinimum(value))
        }
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    /// The favourite count a candidate needs: `ceil(value)`.
    pub fn min_favourites(&self) -> i64 {
        self.0.ceil() as i64
    }
}

impl std::fmt::Display for Threshold {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Cached threshold plus the countdown to its next recompute.
///
/// Starts stale so the first cycle always computes a value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThresholdState {
    pub value: Option<Threshold>,
    pub remaining_cycles: i64,
}

impl ThresholdState {
    pub fn is_stale(&self) -> bool {
        self.remaining_cycles <= 0 || self.value.is_none()
    }
}

/// Apply the sensitivity ratio to a raw (already rounded-up) average.
pub fn scale(average: f64, settings: &ThresholdSettings) -> Result<Threshold, ThresholdError> {
    Threshold::new(average * settings.numerator / settings.denominator)
}

pub struct ThresholdEstimator {
    settings: ThresholdSettings,
    state: ThresholdState,
}

impl ThresholdEstimator {
    pub fn new(settings: ThresholdSettings) -> Self {
        Self {
            settings,
            state: ThresholdState::default(),
        }
    }

    pub fn state(&self) -> &ThresholdState {
        &self.state
    }

    /// Return the cached threshold, recomputing it first when stale.
    ///
    /// A failed recompute leaves the state stale, so the next call tries
    /// again instead of reusing a bad value.
    pub async fn current(
        &mut self,
        session: &mut dyn MirrorSession,
        now: DateTime<Utc>,
    ) -> Result<Threshold, ThresholdError> {
        if let Some(cached) = self.state.value.filter(|_| !self.state.is_stale()) {
            self.state.remaining_cycles -= 1;
            info!(
                remaining_cycles = self.state.remaining_cycles,
                "Cycles until next threshold update: {}", self.state.remaining_cycles
            );
            return Ok(cached);
        }

        info!("Threshold is stale, recalculating...");
        self.state.value = None;

        let since = now - self.settings.recency_window;
        let average = session
            .average_engagement(since)
            .await
            .map_err(ThresholdError::Store)?
            .filter(|avg| *avg > 0.0)
            .ok_or(ThresholdError::NoData {
                window_days: self.settings.recency_window.num_days(),
            })?;

        let threshold = scale(average, &self.settings)?;
        debug!(
            average,
            numerator = self.settings.numerator,
            denominator = self.settings.denominator,
            threshold = threshold.value(),
            "Threshold recomputed"
        );

        self.state = ThresholdState {
            value: Some(threshold),
            remaining_cycles: self.settings.check_interval,
        };
        Ok(threshold)
    }
}
