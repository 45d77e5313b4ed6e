use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::sync::watch;
use tokio::time::{self, Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::{
    capture::{lock, SharedCapture, SharedEstimator},
    db::Database,
    posture::{analyze, BadPostureAccumulator, LandmarkSet, TickVerdict},
    settings::MonitorSettings,
};

use super::{
    events::{Cadence, EventBus, MonitorEvent},
    state::{AnalysisSnapshot, LiveTally, Overlay, PreviewFrame, TickDiagnostics},
};

// Set to false to silence per-tick logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

/// State shared by the controller and both cadence tasks.
pub(crate) struct MonitorShared {
    pub capture: SharedCapture,
    pub estimator: SharedEstimator,
    pub db: Database,
    pub events: EventBus,
    pub settings: watch::Sender<MonitorSettings>,
    pub accumulator: Mutex<BadPostureAccumulator>,
    pub tally: Mutex<LiveTally>,
    pub last_result: watch::Sender<Option<Arc<AnalysisSnapshot>>>,
    pub preview: watch::Sender<Option<Arc<PreviewFrame>>>,
    pub diagnostics: TickDiagnostics,
}

impl MonitorShared {
    pub fn new(
        capture: SharedCapture,
        estimator: SharedEstimator,
        db: Database,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            capture,
            estimator,
            db,
            events: EventBus::new(),
            settings: watch::Sender::new(settings),
            accumulator: Mutex::new(BadPostureAccumulator::new()),
            tally: Mutex::new(LiveTally::default()),
            last_result: watch::Sender::new(None),
            preview: watch::Sender::new(None),
            diagnostics: TickDiagnostics::default(),
        }
    }

    pub fn settings(&self) -> MonitorSettings {
        self.settings.borrow().clone()
    }
}

pub(crate) async fn blocking<T, F>(task: F) -> Result<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .context("blocking capture task failed")
}

fn finish_tick(shared: &MonitorShared, cadence: Cadence, started: Instant, period: Duration) {
    let elapsed = started.elapsed();
    if shared.diagnostics.cadence(cadence).record(elapsed, period) {
        let elapsed_ms = elapsed.as_millis() as u64;
        log_warn!(
            "{cadence:?} tick took {elapsed_ms}ms, longer than its {}ms period",
            period.as_millis()
        );
        shared.events.emit(MonitorEvent::TickOverrun {
            cadence,
            elapsed_ms,
        });
    }
}

pub(crate) async fn preview_loop(
    shared: Arc<MonitorShared>,
    period: Duration,
    cancel_token: CancellationToken,
) {
    let mut ticker = time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut capture_ok = true;

    loop {
        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => {
                log_info!("preview cadence shutting down");
                break;
            }
            _ = ticker.tick() => {
                let started = Instant::now();
                let ok = run_preview_tick(&shared).await;
                // Report the first failure of a run, not every frame.
                if capture_ok && !ok {
                    shared.events.emit(MonitorEvent::CaptureError {
                        message: "preview frame unavailable".into(),
                    });
                }
                capture_ok = ok;
                finish_tick(&shared, Cadence::Preview, started, period);
            }
        }
    }
}

/// Grab a frame and publish it with the current overlay. Returns false when
/// no frame could be read.
pub(crate) async fn run_preview_tick(shared: &MonitorShared) -> bool {
    let capture = shared.capture.clone();
    let frame = match blocking(move || lock(&capture).read_frame()).await {
        Ok(Some(frame)) => frame,
        Ok(None) => {
            log_warn!("preview frame read returned nothing");
            return false;
        }
        Err(err) => {
            log_error!("preview frame read failed: {err:#}");
            return false;
        }
    };

    let overlay = Overlay::from_snapshot(shared.last_result.borrow().as_deref());
    shared.preview.send_replace(Some(Arc::new(PreviewFrame {
        frame: Arc::new(frame),
        overlay,
        captured_at: Utc::now(),
    })));
    true
}

pub(crate) async fn analysis_loop(
    shared: Arc<MonitorShared>,
    first_tick: Instant,
    period: Duration,
    cancel_token: CancellationToken,
) {
    let mut ticker = time::interval_at(first_tick, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => {
                log_info!("analysis cadence shutting down");
                break;
            }
            _ = ticker.tick() => {
                let started = Instant::now();
                run_analysis_tick(&shared).await;
                finish_tick(&shared, Cadence::Analysis, started, period);
            }
        }
    }
}

/// Read a frame and run the estimator on it. `None` means no frame.
async fn read_and_estimate(shared: &MonitorShared) -> Option<Option<LandmarkSet>> {
    let capture = shared.capture.clone();
    let estimator = shared.estimator.clone();
    let outcome = blocking(move || {
        let frame = lock(&capture).read_frame()?;
        Some(lock(&estimator).estimate(&frame))
    })
    .await;

    match outcome {
        Ok(outcome) => outcome,
        Err(err) => {
            log_error!("analysis capture failed: {err:#}");
            None
        }
    }
}

/// One full pipeline pass: classify, fold into the accumulator, persist, notify.
pub(crate) async fn run_analysis_tick(shared: &MonitorShared) {
    let settings = shared.settings();

    let Some(landmarks) = read_and_estimate(shared).await else {
        log_warn!("analysis tick skipped: no frame from capture source");
        shared.events.emit(MonitorEvent::CaptureError {
            message: "analysis frame unavailable".into(),
        });
        return;
    };

    let result = landmarks
        .as_ref()
        .and_then(|landmarks| analyze(landmarks, settings.posture_threshold));
    shared
        .last_result
        .send_replace(Some(Arc::new(AnalysisSnapshot {
            result,
            at: Utc::now(),
        })));

    let verdict = TickVerdict::from_result(result.map(|result| result.is_good));
    let alert = lock(&shared.accumulator).record(
        verdict,
        settings.analysis_interval_secs(),
        settings.alert_threshold_secs,
    );
    lock(&shared.tally).record(verdict);

    let (is_good, score, detected) = match &result {
        Some(result) => (result.is_good, result.score, true),
        None => (false, 0.0, false),
    };
    if let Err(err) = shared.db.add_check(is_good, score, detected).await {
        log_error!("failed to persist posture check: {err:#}");
        lock(&shared.tally).data_loss += 1;
        shared.events.emit(MonitorEvent::DataLoss {
            message: format!("{err:#}"),
        });
    }

    match result {
        Some(result) => shared.events.emit(MonitorEvent::PostureChecked {
            is_good: result.is_good,
            score: result.score,
            side: result.used_side,
        }),
        None => shared.events.emit(MonitorEvent::DetectionFailed),
    }

    if let Some(duration_secs) = alert {
        log_warn!("bad posture sustained for {duration_secs}s");
        shared
            .events
            .emit(MonitorEvent::SustainedBadPosture { duration_secs });
    }
}
