pub mod accumulator;
pub mod classifier;
pub mod landmarks;
pub mod selector;

pub use accumulator::{BadPostureAccumulator, TickVerdict, DEFAULT_ALERT_THRESHOLD_SECS};
pub use classifier::{analyze, classify, is_good_score, PostureResult, DEFAULT_POSTURE_THRESHOLD};
pub use landmarks::{BodySide, LandmarkKind, LandmarkPoint, LandmarkSet, SideReading};
pub use selector::{select_side, MIN_TORSO_LENGTH_PX};
