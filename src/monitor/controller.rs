use std::sync::{Arc, Mutex as StdMutex};

use anyhow::{Context, Result};
use tokio::{
    sync::{broadcast, watch, Mutex},
    task::JoinHandle,
    time::Instant,
};
use tokio_util::sync::CancellationToken;

use crate::{
    capture::{lock, CaptureHandle, FrameSource, PoseEstimator},
    db::{Database, Session},
    settings::MonitorSettings,
};

use super::{
    events::MonitorEvent,
    loop_worker::{analysis_loop, blocking, preview_loop, MonitorShared},
    state::{AnalysisSnapshot, LiveTally, MonitorSnapshot, MonitorStatus, PreviewFrame},
};

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

struct LoopHandle {
    handle: JoinHandle<()>,
    cancel_token: CancellationToken,
}

impl LoopHandle {
    fn spawn<F, Fut>(start: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(start(cancel_token.clone()));
        Self {
            handle,
            cancel_token,
        }
    }

    /// Cancel and wait, so the cadence never fires again once this returns.
    async fn shutdown(self) {
        self.cancel_token.cancel();
        if let Err(err) = self.handle.await {
            log_error!("cadence task failed to join: {err}");
        }
    }
}

#[derive(Default)]
struct ControllerState {
    status: MonitorStatus,
    preview: Option<LoopHandle>,
    analysis: Option<LoopHandle>,
}

/// Preview/monitoring state machine.
///
/// `Idle -> PreviewOnly -> Monitoring` and back. Monitoring never outlives its
/// preview: stopping the preview stops monitoring first.
#[derive(Clone)]
pub struct MonitorController {
    shared: Arc<MonitorShared>,
    state: Arc<Mutex<ControllerState>>,
}

impl MonitorController {
    pub fn new(
        source: Box<dyn FrameSource>,
        estimator: Box<dyn PoseEstimator>,
        db: Database,
        settings: MonitorSettings,
    ) -> Result<Self> {
        settings.validate().context("invalid monitor settings")?;

        let shared = MonitorShared::new(
            Arc::new(StdMutex::new(CaptureHandle::new(source))),
            Arc::new(StdMutex::new(estimator)),
            db,
            settings,
        );

        Ok(Self {
            shared: Arc::new(shared),
            state: Arc::new(Mutex::new(ControllerState::default())),
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.shared.events.subscribe()
    }

    pub fn preview_frames(&self) -> watch::Receiver<Option<Arc<PreviewFrame>>> {
        self.shared.preview.subscribe()
    }

    pub fn settings_changes(&self) -> watch::Receiver<MonitorSettings> {
        self.shared.settings.subscribe()
    }

    pub fn settings(&self) -> MonitorSettings {
        self.shared.settings()
    }

    pub fn last_result(&self) -> Option<Arc<AnalysisSnapshot>> {
        self.shared.last_result.borrow().clone()
    }

    pub fn tally(&self) -> LiveTally {
        *lock(&self.shared.tally)
    }

    pub async fn status(&self) -> MonitorStatus {
        self.state.lock().await.status
    }

    pub async fn snapshot(&self) -> MonitorSnapshot {
        let status = self.state.lock().await.status;
        MonitorSnapshot {
            status,
            settings: self.settings(),
            tally: self.tally(),
            bad_posture_secs: lock(&self.shared.accumulator).duration_secs(),
            last_result: self.last_result().map(|snapshot| *snapshot),
            diagnostics: self.shared.diagnostics.snapshot(),
        }
    }

    pub async fn start_preview(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        self.start_preview_locked(&mut state).await
    }

    pub async fn stop_preview(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        self.stop_preview_locked(&mut state).await;
        Ok(())
    }

    /// Open a session and start analysing. From `Idle` the preview is started
    /// first.
    pub async fn start_monitoring(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.status.is_monitoring() {
            return Ok(());
        }
        if !state.status.is_capturing() {
            self.start_preview_locked(&mut state).await?;
        }

        lock(&self.shared.accumulator).reset();
        *lock(&self.shared.tally) = LiveTally::default();

        match self.shared.db.start_session().await {
            Ok(session_id) => log_info!("monitoring session {session_id} opened"),
            Err(err) => {
                // The first stored check opens a session on its own.
                log_error!("failed to open monitoring session: {err:#}");
                self.shared.events.emit(MonitorEvent::DataLoss {
                    message: format!("{err:#}"),
                });
            }
        }

        state.analysis = Some(self.spawn_analysis(Instant::now()));
        self.set_status(&mut state, MonitorStatus::Monitoring);
        Ok(())
    }

    /// Stop analysing and close the session. Returns the closed session when
    /// one was open.
    pub async fn stop_monitoring(&self) -> Result<Option<Session>> {
        let mut state = self.state.lock().await;
        Ok(self.stop_monitoring_locked(&mut state).await)
    }

    pub async fn set_preview_fps(&self, fps: u32) -> Result<()> {
        let mut state = self.state.lock().await;
        let settings = self.update_settings(|settings| settings.preview_fps = fps)?;

        if let Some(preview) = state.preview.take() {
            preview.shutdown().await;
            state.preview = Some(self.spawn_preview(settings.preview_period()));
        }
        log_info!("preview rate set to {fps} Hz");
        self.shared
            .events
            .emit(MonitorEvent::PreviewRateChanged { fps });
        Ok(())
    }

    /// Change the analysis period. A running cadence is re-armed with its
    /// next tick one full period away; accumulated state is kept.
    pub async fn set_analysis_interval(&self, interval_ms: u64) -> Result<()> {
        let mut state = self.state.lock().await;
        let settings = self.update_settings(|settings| settings.analysis_interval_ms = interval_ms)?;

        if let Some(analysis) = state.analysis.take() {
            analysis.shutdown().await;
            let first_tick = Instant::now() + settings.analysis_interval();
            state.analysis = Some(self.spawn_analysis(first_tick));
        }
        log_info!("analysis interval set to {interval_ms} ms");
        Ok(())
    }

    pub async fn set_posture_threshold(&self, threshold: f64) -> Result<()> {
        let _state = self.state.lock().await;
        self.update_settings(|settings| settings.posture_threshold = threshold)?;
        Ok(())
    }

    pub async fn set_alert_threshold(&self, alert_threshold_secs: u64) -> Result<()> {
        let _state = self.state.lock().await;
        self.update_settings(|settings| settings.alert_threshold_secs = alert_threshold_secs)?;
        Ok(())
    }

    /// Switch capture source. Only the preview cadence is restarted; the open
    /// session and the accumulator carry over. If the new source cannot be
    /// opened everything is torn down to `Idle`.
    pub async fn set_capture_source(&self, source_id: u32) -> Result<()> {
        let mut state = self.state.lock().await;
        let settings = self.update_settings(|settings| settings.capture_source = source_id)?;
        if !state.status.is_capturing() {
            return Ok(());
        }

        if let Some(preview) = state.preview.take() {
            preview.shutdown().await;
        }

        if let Err(err) = self.open_capture(source_id).await {
            log_warn!("capture source {source_id} unavailable, stopping: {err:#}");
            self.stop_preview_locked(&mut state).await;
            return Err(err);
        }

        state.preview = Some(self.spawn_preview(settings.preview_period()));
        log_info!("capture source switched to {source_id}");
        Ok(())
    }

    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        self.stop_preview_locked(&mut state).await;
    }

    async fn start_preview_locked(&self, state: &mut ControllerState) -> Result<()> {
        if state.status.is_capturing() {
            return Ok(());
        }

        let source_id = self.settings().capture_source;
        self.open_capture(source_id).await?;

        state.preview = Some(self.spawn_preview(self.settings().preview_period()));
        self.set_status(state, MonitorStatus::PreviewOnly);
        Ok(())
    }

    async fn stop_preview_locked(&self, state: &mut ControllerState) {
        if state.status.is_monitoring() {
            self.stop_monitoring_locked(state).await;
        }
        if let Some(preview) = state.preview.take() {
            preview.shutdown().await;
        }

        let capture = self.shared.capture.clone();
        if let Err(err) = blocking(move || lock(&capture).release()).await {
            log_error!("failed to release capture source: {err:#}");
        }
        self.shared.preview.send_replace(None);

        if state.status.is_capturing() {
            self.set_status(state, MonitorStatus::Idle);
        }
    }

    async fn stop_monitoring_locked(&self, state: &mut ControllerState) -> Option<Session> {
        if !state.status.is_monitoring() {
            return None;
        }
        if let Some(analysis) = state.analysis.take() {
            analysis.shutdown().await;
        }

        self.shared.last_result.send_replace(None);
        lock(&self.shared.accumulator).reset();
        self.set_status(state, MonitorStatus::PreviewOnly);

        match self.shared.db.end_session().await {
            Ok(session) => session,
            Err(err) => {
                log_error!("failed to close monitoring session: {err:#}");
                self.shared.events.emit(MonitorEvent::DataLoss {
                    message: format!("{err:#}"),
                });
                None
            }
        }
    }

    async fn open_capture(&self, source_id: u32) -> Result<()> {
        let capture = self.shared.capture.clone();
        let opened = blocking(move || lock(&capture).open(source_id))
            .await
            .and_then(|result| result);

        if let Err(err) = &opened {
            log_warn!("failed to open capture source {source_id}: {err:#}");
            self.shared.events.emit(MonitorEvent::CaptureError {
                message: format!("{err:#}"),
            });
        }
        opened
    }

    fn spawn_preview(&self, period: std::time::Duration) -> LoopHandle {
        let shared = self.shared.clone();
        LoopHandle::spawn(move |cancel_token| preview_loop(shared, period, cancel_token))
    }

    fn spawn_analysis(&self, first_tick: Instant) -> LoopHandle {
        let shared = self.shared.clone();
        let period = self.settings().analysis_interval();
        LoopHandle::spawn(move |cancel_token| {
            analysis_loop(shared, first_tick, period, cancel_token)
        })
    }

    fn update_settings<F>(&self, apply: F) -> Result<MonitorSettings>
    where
        F: FnOnce(&mut MonitorSettings),
    {
        let mut next = self.settings();
        apply(&mut next);
        next.validate()?;
        self.shared.settings.send_replace(next.clone());
        Ok(next)
    }

    fn set_status(&self, state: &mut ControllerState, status: MonitorStatus) {
        state.status = status;
        log_info!("monitor status -> {status:?}");
        self.shared
            .events
            .emit(MonitorEvent::StatusChanged { status });
    }
}
