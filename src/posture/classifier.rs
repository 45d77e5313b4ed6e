use serde::{Deserialize, Serialize};

use super::{
    landmarks::{BodySide, LandmarkPoint, LandmarkSet, SideReading},
    selector::{select_from_landmarks, MIN_TORSO_LENGTH_PX},
};

pub const DEFAULT_POSTURE_THRESHOLD: f64 = 0.12;

/// Outcome of one successful classification.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostureResult {
    pub is_good: bool,
    /// Normalised slouch score: |ear offset from hip-shoulder line| / torso length.
    pub score: f64,
    /// Signed ear offset in pixels, kept for overlays.
    pub raw_offset: f64,
    pub torso_length: f64,
    pub used_side: BodySide,
    pub shoulder: LandmarkPoint,
    pub hip: LandmarkPoint,
    pub ear: LandmarkPoint,
}

/// Signed perpendicular distance of `point` from the line through `line_start`
/// and `line_end` (2D cross product over the segment length).
pub fn signed_offset(point: &LandmarkPoint, line_start: &LandmarkPoint, line_end: &LandmarkPoint) -> f64 {
    let dx = line_end.x - line_start.x;
    let dy = line_end.y - line_start.y;
    let length = (dx * dx + dy * dy).sqrt();
    if length == 0.0 {
        return 0.0;
    }
    let cross = dx * (point.y - line_start.y) - dy * (point.x - line_start.x);
    cross / length
}

/// Good posture is a score at or below the threshold.
pub fn is_good_score(score: f64, threshold: f64) -> bool {
    score <= threshold
}

/// Classify an already selected side. `None` is a detection failure.
pub fn classify(side: &SideReading, threshold: f64) -> Option<PostureResult> {
    let (shoulder, hip, ear) = side.points()?;
    let torso_length = side.torso_length;
    if torso_length < MIN_TORSO_LENGTH_PX {
        return None;
    }

    let raw_offset = signed_offset(&ear, &hip, &shoulder);
    let score = raw_offset.abs() / torso_length;

    Some(PostureResult {
        is_good: is_good_score(score, threshold),
        score,
        raw_offset,
        torso_length,
        used_side: side.side,
        shoulder,
        hip,
        ear,
    })
}

/// Side selection followed by classification.
pub fn analyze(landmarks: &LandmarkSet, threshold: f64) -> Option<PostureResult> {
    let side = select_from_landmarks(landmarks)?;
    classify(&side, threshold)
}
