use serde::{Deserialize, Serialize};

pub const DEFAULT_ALERT_THRESHOLD_SECS: u64 = 30;

/// What one completed analysis tick saw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TickVerdict {
    Good,
    Bad,
    Undetected,
}

impl TickVerdict {
    pub fn from_result(is_good: Option<bool>) -> Self {
        match is_good {
            Some(true) => TickVerdict::Good,
            Some(false) => TickVerdict::Bad,
            None => TickVerdict::Undetected,
        }
    }
}

/// Sustained bad posture timer.
///
/// The alert is level-triggered: once the duration reaches the threshold every
/// further bad tick returns an alert until a good or undetected tick resets it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BadPostureAccumulator {
    duration_secs: u64,
    last_was_bad: bool,
}

impl BadPostureAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn duration_secs(&self) -> u64 {
        self.duration_secs
    }

    pub fn last_was_bad(&self) -> bool {
        self.last_was_bad
    }

    /// Fold one tick in. Returns the current duration when an alert is due.
    pub fn record(
        &mut self,
        verdict: TickVerdict,
        interval_secs: u64,
        alert_threshold_secs: u64,
    ) -> Option<u64> {
        match verdict {
            TickVerdict::Good | TickVerdict::Undetected => {
                self.reset();
                None
            }
            TickVerdict::Bad => {
                self.duration_secs = self.duration_secs.saturating_add(interval_secs);
                self.last_was_bad = true;
                (self.duration_secs >= alert_threshold_secs).then_some(self.duration_secs)
            }
        }
    }

    pub fn reset(&mut self) {
        self.duration_secs = 0;
        self.last_was_bad = false;
    }
}
