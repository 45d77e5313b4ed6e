use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    capture::RawImage,
    posture::{PostureResult, TickVerdict},
    settings::MonitorSettings,
};

use super::events::Cadence;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum MonitorStatus {
    #[default]
    Idle,
    PreviewOnly,
    Monitoring,
}

impl MonitorStatus {
    pub fn is_capturing(&self) -> bool {
        !matches!(self, MonitorStatus::Idle)
    }

    pub fn is_monitoring(&self) -> bool {
        matches!(self, MonitorStatus::Monitoring)
    }
}

/// In-memory tick counts for the current monitoring run. Updated even when
/// the matching check could not be persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveTally {
    pub good: u64,
    pub bad: u64,
    pub undetected: u64,
    pub data_loss: u64,
}

impl LiveTally {
    pub fn record(&mut self, verdict: TickVerdict) {
        match verdict {
            TickVerdict::Good => self.good += 1,
            TickVerdict::Bad => self.bad += 1,
            TickVerdict::Undetected => self.undetected += 1,
        }
    }
}

/// Latest analysis outcome, replaced as a whole on every analysis tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisSnapshot {
    pub result: Option<PostureResult>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Overlay {
    /// Not monitoring, or no analysis has completed yet.
    Hidden,
    NoPerson,
    Posture(PostureResult),
}

impl Overlay {
    pub fn from_snapshot(snapshot: Option<&AnalysisSnapshot>) -> Self {
        match snapshot {
            None => Overlay::Hidden,
            Some(AnalysisSnapshot { result: None, .. }) => Overlay::NoPerson,
            Some(AnalysisSnapshot {
                result: Some(result),
                ..
            }) => Overlay::Posture(*result),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PreviewFrame {
    pub frame: Arc<RawImage>,
    pub overlay: Overlay,
    pub captured_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct CadenceCounters {
    ticks: AtomicU64,
    missed: AtomicU64,
}

impl CadenceCounters {
    /// Count a finished tick. Returns true when it overran `period`.
    pub fn record(&self, elapsed: Duration, period: Duration) -> bool {
        self.ticks.fetch_add(1, Ordering::Relaxed);
        let overran = elapsed > period;
        if overran {
            self.missed.fetch_add(1, Ordering::Relaxed);
        }
        overran
    }

    pub fn stats(&self) -> CadenceStats {
        CadenceStats {
            ticks: self.ticks.load(Ordering::Relaxed),
            missed_ticks: self.missed.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Default)]
pub struct TickDiagnostics {
    pub preview: CadenceCounters,
    pub analysis: CadenceCounters,
}

impl TickDiagnostics {
    pub fn cadence(&self, cadence: Cadence) -> &CadenceCounters {
        match cadence {
            Cadence::Preview => &self.preview,
            Cadence::Analysis => &self.analysis,
        }
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            preview: self.preview.stats(),
            analysis: self.analysis.stats(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CadenceStats {
    pub ticks: u64,
    pub missed_ticks: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsSnapshot {
    pub preview: CadenceStats,
    pub analysis: CadenceStats,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorSnapshot {
    pub status: MonitorStatus,
    pub settings: MonitorSettings,
    pub tally: LiveTally,
    pub bad_posture_secs: u64,
    pub last_result: Option<AnalysisSnapshot>,
    pub diagnostics: DiagnosticsSnapshot,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::fakes::landmarks_with_score;
    use crate::posture::analyze;

    #[test]
    fn overlay_follows_last_result() {
        assert_eq!(Overlay::from_snapshot(None), Overlay::Hidden);

        let missing = AnalysisSnapshot {
            result: None,
            at: Utc::now(),
        };
        assert_eq!(Overlay::from_snapshot(Some(&missing)), Overlay::NoPerson);

        let result = analyze(&landmarks_with_score(0.2), 0.12).unwrap();
        let seen = AnalysisSnapshot {
            result: Some(result),
            at: Utc::now(),
        };
        assert_eq!(Overlay::from_snapshot(Some(&seen)), Overlay::Posture(result));
    }

    #[test]
    fn overruns_are_counted() {
        let counters = CadenceCounters::default();
        let period = Duration::from_millis(100);
        assert!(!counters.record(Duration::from_millis(40), period));
        assert!(!counters.record(period, period));
        assert!(counters.record(Duration::from_millis(250), period));
        assert_eq!(
            counters.stats(),
            CadenceStats {
                ticks: 3,
                missed_ticks: 1
            }
        );
    }

    #[test]
    fn tally_counts_each_verdict() {
        let mut tally = LiveTally::default();
        for verdict in [TickVerdict::Good, TickVerdict::Bad, TickVerdict::Bad, TickVerdict::Undetected] {
            tally.record(verdict);
        }
        assert_eq!((tally.good, tally.bad, tally.undetected, tally.data_loss), (1, 2, 1, 0));
        assert!(MonitorStatus::Monitoring.is_capturing());
        assert!(!MonitorStatus::PreviewOnly.is_monitoring());
    }
}
