#![allow(dead_code)]

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use anyhow::Result;
use posture_monitor::{
    posture::{BodySide, LandmarkKind, LandmarkPoint, LandmarkSet},
    FrameSource, PoseEstimator, RawImage,
};

#[derive(Default)]
pub struct Releases(AtomicUsize);

impl Releases {
    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// Always-on camera producing blank frames.
pub struct StillCamera {
    pub releases: Arc<Releases>,
}

impl StillCamera {
    pub fn new() -> (Self, Arc<Releases>) {
        let releases = Arc::new(Releases::default());
        (
            Self {
                releases: releases.clone(),
            },
            releases,
        )
    }
}

impl FrameSource for StillCamera {
    fn open(&mut self, _source_id: u32) -> Result<()> {
        Ok(())
    }

    fn read_frame(&mut self) -> Option<RawImage> {
        Some(RawImage::new(32, 24))
    }

    fn release(&mut self) {
        self.releases.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// Plays back scores in order, then keeps repeating the last one.
pub struct ScoreScript {
    scores: Vec<Option<f64>>,
    next: usize,
}

impl ScoreScript {
    pub fn new(scores: Vec<Option<f64>>) -> Self {
        Self { scores, next: 0 }
    }
}

impl PoseEstimator for ScoreScript {
    fn estimate(&mut self, _image: &RawImage) -> Option<LandmarkSet> {
        let index = self.next.min(self.scores.len().saturating_sub(1));
        self.next += 1;
        self.scores.get(index).copied().flatten().map(side_view)
    }
}

/// Right-side profile with a 200px torso and the ear pushed forward so the
/// normalised slouch score equals `score`.
pub fn side_view(score: f64) -> LandmarkSet {
    let side = BodySide::Right;
    LandmarkSet::new()
        .with(LandmarkKind::shoulder(side), LandmarkPoint::new(320.0, 140.0, 0.9))
        .with(LandmarkKind::hip(side), LandmarkPoint::new(320.0, 340.0, 0.9))
        .with(
            LandmarkKind::ear(side),
            LandmarkPoint::new(320.0 + score * 200.0, 90.0, 0.9),
        )
}
