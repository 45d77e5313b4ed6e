use super::landmarks::{BodySide, LandmarkSet, SideReading};

/// Shorter torsos make the normalised score numerically unstable.
pub const MIN_TORSO_LENGTH_PX: f64 = 20.0;

impl SideReading {
    pub fn is_usable(&self) -> bool {
        self.points().is_some() && self.torso_length >= MIN_TORSO_LENGTH_PX
    }
}

/// Pick the better visible body side: the one with the longer torso, left on a
/// tie. Returns `None` when the winner is not usable.
pub fn select_side<'a>(left: &'a SideReading, right: &'a SideReading) -> Option<&'a SideReading> {
    let candidate = if left.torso_length >= right.torso_length && left.torso_length > 0.0 {
        left
    } else if right.torso_length > 0.0 {
        right
    } else {
        return None;
    };

    candidate.is_usable().then_some(candidate)
}

/// Build both side readings from a landmark set and select one.
pub fn select_from_landmarks(landmarks: &LandmarkSet) -> Option<SideReading> {
    let left = SideReading::from_landmarks(landmarks, BodySide::Left);
    let right = SideReading::from_landmarks(landmarks, BodySide::Right);
    select_side(&left, &right).copied()
}
