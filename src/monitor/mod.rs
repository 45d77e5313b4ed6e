mod controller;
pub mod events;
mod loop_worker;
pub mod state;

pub use controller::MonitorController;
pub use events::{Cadence, EventBus, MonitorEvent};
pub use state::{
    AnalysisSnapshot, CadenceStats, DiagnosticsSnapshot, LiveTally, MonitorSnapshot,
    MonitorStatus, Overlay, PreviewFrame,
};
