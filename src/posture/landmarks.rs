//! Landmark types handed over by the pose estimator.
//!
//! Positions are in frame pixels. The estimator itself usually works in
//! normalised coordinates; `LandmarkSet::from_pose_landmarks` does the scaling.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Points below this confidence are treated as not detected.
pub const MIN_LANDMARK_VISIBILITY: f64 = 0.5;

/// Number of points in a full-body pose output (MediaPipe topology).
pub const POSE_LANDMARK_COUNT: usize = 33;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LandmarkPoint {
    pub x: f64,
    pub y: f64,
    pub visibility: f64,
}

impl LandmarkPoint {
    pub fn new(x: f64, y: f64, visibility: f64) -> Self {
        Self { x, y, visibility }
    }

    pub fn distance_to(&self, other: &LandmarkPoint) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BodySide {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LandmarkKind {
    LeftEar,
    RightEar,
    LeftShoulder,
    RightShoulder,
    LeftHip,
    RightHip,
}

impl LandmarkKind {
    pub const ALL: [LandmarkKind; 6] = [
        LandmarkKind::LeftEar,
        LandmarkKind::RightEar,
        LandmarkKind::LeftShoulder,
        LandmarkKind::RightShoulder,
        LandmarkKind::LeftHip,
        LandmarkKind::RightHip,
    ];

    /// Index of this point in a 33-point pose output.
    pub fn pose_index(&self) -> usize {
        match self {
            LandmarkKind::LeftEar => 7,
            LandmarkKind::RightEar => 8,
            LandmarkKind::LeftShoulder => 11,
            LandmarkKind::RightShoulder => 12,
            LandmarkKind::LeftHip => 23,
            LandmarkKind::RightHip => 24,
        }
    }

    pub fn ear(side: BodySide) -> Self {
        match side {
            BodySide::Left => LandmarkKind::LeftEar,
            BodySide::Right => LandmarkKind::RightEar,
        }
    }

    pub fn shoulder(side: BodySide) -> Self {
        match side {
            BodySide::Left => LandmarkKind::LeftShoulder,
            BodySide::Right => LandmarkKind::RightShoulder,
        }
    }

    pub fn hip(side: BodySide) -> Self {
        match side {
            BodySide::Left => LandmarkKind::LeftHip,
            BodySide::Right => LandmarkKind::RightHip,
        }
    }
}

/// Named landmarks for one subject in one frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LandmarkSet {
    points: HashMap<LandmarkKind, LandmarkPoint>,
}

impl LandmarkSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scale a normalised 33-point pose output `(x, y, visibility)` to pixel
    /// coordinates. Returns `None` when the output is shorter than the topology.
    pub fn from_pose_landmarks(
        normalized: &[(f64, f64, f64)],
        frame_width: u32,
        frame_height: u32,
    ) -> Option<Self> {
        if normalized.len() < POSE_LANDMARK_COUNT {
            return None;
        }

        let width = f64::from(frame_width);
        let height = f64::from(frame_height);
        let mut set = Self::new();
        for kind in LandmarkKind::ALL {
            let (x, y, visibility) = normalized[kind.pose_index()];
            set.insert(kind, LandmarkPoint::new(x * width, y * height, visibility));
        }
        Some(set)
    }

    pub fn with(mut self, kind: LandmarkKind, point: LandmarkPoint) -> Self {
        self.insert(kind, point);
        self
    }

    pub fn insert(&mut self, kind: LandmarkKind, point: LandmarkPoint) {
        self.points.insert(kind, point);
    }

    pub fn get(&self, kind: LandmarkKind) -> Option<&LandmarkPoint> {
        self.points.get(&kind)
    }

    /// The point if it was detected with enough confidence.
    pub fn visible(&self, kind: LandmarkKind) -> Option<LandmarkPoint> {
        self.points
            .get(&kind)
            .filter(|point| point.visibility >= MIN_LANDMARK_VISIBILITY)
            .copied()
    }
}

/// The three points of one body side plus its torso length.
///
/// `torso_length` is also the side's visibility score: it is 0 whenever any of
/// the three points is missing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SideReading {
    pub side: BodySide,
    pub shoulder: Option<LandmarkPoint>,
    pub hip: Option<LandmarkPoint>,
    pub ear: Option<LandmarkPoint>,
    pub torso_length: f64,
}

impl SideReading {
    pub fn from_landmarks(landmarks: &LandmarkSet, side: BodySide) -> Self {
        let shoulder = landmarks.visible(LandmarkKind::shoulder(side));
        let hip = landmarks.visible(LandmarkKind::hip(side));
        let ear = landmarks.visible(LandmarkKind::ear(side));

        match (shoulder, hip, ear) {
            (Some(s), Some(h), Some(_)) => Self {
                side,
                shoulder,
                hip,
                ear,
                torso_length: s.distance_to(&h),
            },
            _ => Self::missing(side),
        }
    }

    pub fn missing(side: BodySide) -> Self {
        Self {
            side,
            shoulder: None,
            hip: None,
            ear: None,
            torso_length: 0.0,
        }
    }

    pub fn points(&self) -> Option<(LandmarkPoint, LandmarkPoint, LandmarkPoint)> {
        Some((self.shoulder?, self.hip?, self.ear?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_side(set: LandmarkSet, side: BodySide, visibility: f64) -> LandmarkSet {
        set.with(LandmarkKind::shoulder(side), LandmarkPoint::new(100.0, 100.0, visibility))
            .with(LandmarkKind::hip(side), LandmarkPoint::new(100.0, 300.0, visibility))
            .with(LandmarkKind::ear(side), LandmarkPoint::new(110.0, 50.0, visibility))
    }

    #[test]
    fn side_reading_measures_torso() {
        let set = full_side(LandmarkSet::new(), BodySide::Left, 0.9);
        let reading = SideReading::from_landmarks(&set, BodySide::Left);
        assert_eq!(reading.torso_length, 200.0);
        assert!(reading.points().is_some());
    }

    #[test]
    fn low_visibility_point_makes_side_missing() {
        let set = full_side(LandmarkSet::new(), BodySide::Right, 0.9)
            .with(LandmarkKind::RightEar, LandmarkPoint::new(110.0, 50.0, 0.3));
        let reading = SideReading::from_landmarks(&set, BodySide::Right);
        assert_eq!(reading.torso_length, 0.0);
        assert!(reading.ear.is_none());
    }

    #[test]
    fn other_side_is_ignored() {
        let set = full_side(LandmarkSet::new(), BodySide::Left, 0.9);
        let reading = SideReading::from_landmarks(&set, BodySide::Right);
        assert_eq!(reading, SideReading::missing(BodySide::Right));
    }

    #[test]
    fn pose_output_is_scaled_to_pixels() {
        let mut raw = vec![(0.0, 0.0, 0.0); POSE_LANDMARK_COUNT];
        raw[11] = (0.5, 0.25, 0.99);
        let set = LandmarkSet::from_pose_landmarks(&raw, 640, 480).unwrap();
        let shoulder = set.get(LandmarkKind::LeftShoulder).unwrap();
        assert_eq!((shoulder.x, shoulder.y), (320.0, 120.0));
        assert!(set.visible(LandmarkKind::LeftHip).is_none());
    }

    #[test]
    fn short_pose_output_is_rejected() {
        let raw = vec![(0.0, 0.0, 1.0); 12];
        assert!(LandmarkSet::from_pose_landmarks(&raw, 640, 480).is_none());
    }
}
