use super::focus::FocusChannel;
use super::poll::poll_until;
use super::protocol::{new_sentinel, AutomationSession, TextAutomation};
use anyhow::{bail, Result};
use serde::ser::{Serialize, Serializer};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

pub const CALIBRATION_TRIALS: usize = 5;
pub const SYNC_DELAY_STEP_MS: u64 = 25;
pub const MIN_SYNC_DELAY_MS: u64 = 50;
pub const MAX_SYNC_DELAY_MS: u64 = 2000;

const CALIBRATION_POLL_INTERVAL: Duration = Duration::from_millis(5);
const TRIAL_TIMEOUT: Duration = Duration::from_millis(MAX_SYNC_DELAY_MS);

#[derive(Debug, Clone, PartialEq, serde::Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClipboardMeasurement {
    pub samples_ms: Vec<f64>,
    pub p95_ms: f64,
    pub max_ms: f64,
}

impl ClipboardMeasurement {
    pub fn from_samples(samples_ms: Vec<f64>) -> Option<Self> {
        let p95_ms = percentile(&samples_ms, 95.0)?;
        let max_ms = samples_ms.iter().copied().fold(f64::MIN, f64::max);
        Some(Self {
            samples_ms,
            p95_ms,
            max_ms,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendedDelays {
    pub clipboard_sync_delay_ms: u64,
    pub selection_delay_ms: u64,
}

/// Result of a calibration run. Failures are ordinary values: a calibration
/// that cannot proceed is something to show the user, not a bug.
#[derive(Debug, Clone, PartialEq)]
pub enum CalibrationOutcome {
    Success {
        measured_clipboard_ms: ClipboardMeasurement,
        recommended: RecommendedDelays,
    },
    Failure {
        reason: String,
    },
}

impl CalibrationOutcome {
    pub fn failure(reason: impl fmt::Display) -> Self {
        CalibrationOutcome::Failure {
            reason: format!("Calibration failed: {reason}"),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, CalibrationOutcome::Success { .. })
    }
}

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct OutcomePayload<'a> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    measured_clipboard_ms: Option<&'a ClipboardMeasurement>,
    #[serde(skip_serializing_if = "Option::is_none")]
    recommended: Option<&'a RecommendedDelays>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'a str>,
}

impl Serialize for CalibrationOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let payload = match self {
            CalibrationOutcome::Success {
                measured_clipboard_ms,
                recommended,
            } => OutcomePayload {
                success: true,
                measured_clipboard_ms: Some(measured_clipboard_ms),
                recommended: Some(recommended),
                reason: None,
            },
            CalibrationOutcome::Failure { reason } => OutcomePayload {
                success: false,
                measured_clipboard_ms: None,
                recommended: None,
                reason: Some(reason),
            },
        };
        payload.serialize(serializer)
    }
}

/// Percentile with linear interpolation between the closest ranks.
pub fn percentile(samples: &[f64], pct: f64) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }

    let mut sorted = samples.to_vec();
    sorted.sort_by(f64::total_cmp);

    let rank = (pct.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let weight = rank - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * weight)
}

/// Rounds a measured latency up to the next step and clamps it to the
/// supported sync window.
pub fn recommend_sync_delay_ms(p95_ms: f64) -> u64 {
    let step = SYNC_DELAY_STEP_MS as f64;
    let rounded = (p95_ms.max(0.0) / step).ceil() * step;
    (rounded as u64).clamp(MIN_SYNC_DELAY_MS, MAX_SYNC_DELAY_MS)
}

/// Measures how long this machine takes to land a simulated copy on the
/// clipboard.
#[derive(Debug, Clone)]
pub struct Calibrator {
    trials: usize,
    poll_interval: Duration,
    trial_timeout: Duration,
}

impl Default for Calibrator {
    fn default() -> Self {
        Self {
            trials: CALIBRATION_TRIALS,
            poll_interval: CALIBRATION_POLL_INTERVAL,
            trial_timeout: TRIAL_TIMEOUT,
        }
    }
}

impl Calibrator {
    pub fn with_trials(mut self, trials: usize) -> Self {
        self.trials = trials.max(1);
        self
    }

    /// Runs the trials against the control the focus channel vouches for.
    ///
    /// The clipboard is backed up once before the first trial and restored
    /// once after the last, whichever way the run ends.
    pub async fn run(
        &self,
        automation: &mut TextAutomation,
        focus: &mut FocusChannel,
        expected_text: &str,
    ) -> CalibrationOutcome {
        if expected_text.trim().is_empty() {
            return CalibrationOutcome::failure("Calibration text is empty.");
        }

        let selection_delay_ms = automation.delays().selection_delay_ms();

        let mut session = match automation.begin_session() {
            Ok(session) => session,
            Err(err) => return CalibrationOutcome::failure(format!("{err:#}")),
        };

        info!(
            "🧪 Calibrating clipboard timing over {} trials",
            self.trials
        );
        let samples = self.run_trials(&mut session, focus, expected_text).await;

        if let Err(err) = session.finish() {
            warn!("Failed to restore clipboard after calibration: {err:#}");
        }

        let samples = match samples {
            Ok(samples) => samples,
            Err(err) => {
                let outcome = CalibrationOutcome::failure(format!("{err:#}"));
                if let CalibrationOutcome::Failure { reason } = &outcome {
                    warn!("{reason}");
                }
                return outcome;
            }
        };

        let Some(measured) = ClipboardMeasurement::from_samples(samples) else {
            return CalibrationOutcome::failure("No samples were collected.");
        };

        let recommended = RecommendedDelays {
            clipboard_sync_delay_ms: recommend_sync_delay_ms(measured.p95_ms),
            selection_delay_ms,
        };
        info!(
            p95_ms = measured.p95_ms,
            max_ms = measured.max_ms,
            recommended_ms = recommended.clipboard_sync_delay_ms,
            "✅ Calibration complete"
        );

        CalibrationOutcome::Success {
            measured_clipboard_ms: measured,
            recommended,
        }
    }

    async fn run_trials(
        &self,
        session: &mut AutomationSession<'_>,
        focus: &mut FocusChannel,
        expected_text: &str,
    ) -> Result<Vec<f64>> {
        let mut samples = Vec::with_capacity(self.trials);

        for trial in 1..=self.trials {
            let response = focus.verify(expected_text).await?;
            if !response.ok {
                let reason = response
                    .reason
                    .unwrap_or_else(|| "Calibration field could not be focused.".to_string());
                bail!("{reason}");
            }

            let sentinel = new_sentinel();
            session.clipboard().write_clipboard(&sentinel)?;

            let started = Instant::now();
            session.keyboard().press_copy_shortcut().await?;

            let clipboard = session.clipboard();
            let changed = poll_until(self.poll_interval, self.trial_timeout, || {
                Ok(clipboard.read_clipboard()? != sentinel)
            })
            .await?;
            let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

            if !changed {
                bail!(
                    "Clipboard did not update within {} ms.",
                    self.trial_timeout.as_millis()
                );
            }

            let copied = session.clipboard().read_clipboard()?;
            if copied.trim() != expected_text.trim() {
                bail!("Copied text did not match the calibration text.");
            }

            debug!(trial, elapsed_ms, "Calibration trial finished");
            samples.push(elapsed_ms);
        }

        Ok(samples)
    }
}
