use serde::Serialize;
use tokio::sync::broadcast;

use crate::posture::BodySide;

use super::state::MonitorStatus;

const EVENT_CAPACITY: usize = 128;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Cadence {
    Preview,
    Analysis,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum MonitorEvent {
    StatusChanged { status: MonitorStatus },
    CaptureError { message: String },
    PostureChecked { is_good: bool, score: f64, side: BodySide },
    DetectionFailed,
    SustainedBadPosture { duration_secs: u64 },
    /// A check was classified but could not be stored.
    DataLoss { message: String },
    PreviewRateChanged { fps: u32 },
    TickOverrun { cadence: Cadence, elapsed_ms: u64 },
}

/// Fan-out to any number of subscribers. Emitting with none attached is a no-op.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<MonitorEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: MonitorEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
