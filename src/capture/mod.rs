//! Seams to the frame source and the pose estimator.
//!
//! Both collaborators are blocking and potentially slow; callers run them on
//! the blocking pool. Backend selection and fallback happen wherever the boxed
//! trait objects are constructed, never in here.

use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Result;
use log::info;

use crate::posture::LandmarkSet;

/// One captured frame.
pub type RawImage = image::RgbImage;

pub trait FrameSource: Send {
    fn open(&mut self, source_id: u32) -> Result<()>;

    fn read_frame(&mut self) -> Option<RawImage>;

    fn release(&mut self);
}

pub trait PoseEstimator: Send {
    fn estimate(&mut self, image: &RawImage) -> Option<LandmarkSet>;
}

/// Owns the frame source and guarantees the backend is released at most once
/// per successful open.
pub struct CaptureHandle {
    source: Box<dyn FrameSource>,
    opened: Option<u32>,
}

impl CaptureHandle {
    pub fn new(source: Box<dyn FrameSource>) -> Self {
        Self {
            source,
            opened: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.opened.is_some()
    }

    pub fn source_id(&self) -> Option<u32> {
        self.opened
    }

    /// Open `source_id`, releasing whatever was open before.
    pub fn open(&mut self, source_id: u32) -> Result<()> {
        self.release();
        self.source.open(source_id)?;
        self.opened = Some(source_id);
        info!("Capture source {source_id} opened");
        Ok(())
    }

    pub fn read_frame(&mut self) -> Option<RawImage> {
        if self.opened.is_none() {
            return None;
        }
        self.source.read_frame()
    }

    pub fn release(&mut self) {
        if let Some(source_id) = self.opened.take() {
            self.source.release();
            info!("Capture source {source_id} released");
        }
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        self.release();
    }
}

pub type SharedCapture = Arc<Mutex<CaptureHandle>>;
pub type SharedEstimator = Arc<Mutex<Box<dyn PoseEstimator>>>;

pub(crate) fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
pub(crate) mod fakes {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::posture::{BodySide, LandmarkKind, LandmarkPoint};

    /// Counts calls so tests can assert on open/release pairing.
    #[derive(Default)]
    pub struct CallCounts {
        pub opens: AtomicUsize,
        pub releases: AtomicUsize,
        pub reads: AtomicUsize,
    }

    pub struct FakeCamera {
        pub counts: Arc<CallCounts>,
        pub fail_open: bool,
        pub fail_source: Option<u32>,
        pub drop_frames: bool,
    }

    impl FakeCamera {
        pub fn new() -> (Self, Arc<CallCounts>) {
            let counts = Arc::new(CallCounts::default());
            (
                Self {
                    counts: counts.clone(),
                    fail_open: false,
                    fail_source: None,
                    drop_frames: false,
                },
                counts,
            )
        }
    }

    impl FrameSource for FakeCamera {
        fn open(&mut self, source_id: u32) -> Result<()> {
            if self.fail_open || self.fail_source == Some(source_id) {
                anyhow::bail!("camera {source_id} unavailable");
            }
            self.counts.opens.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn read_frame(&mut self) -> Option<RawImage> {
            self.counts.reads.fetch_add(1, Ordering::SeqCst);
            if self.drop_frames {
                None
            } else {
                Some(RawImage::new(64, 48))
            }
        }

        fn release(&mut self) {
            self.counts.releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Replays a fixed list of scores; `None` entries are detection failures.
    /// The last entry repeats once the script runs out.
    pub struct ScriptedEstimator {
        pub scores: Vec<Option<f64>>,
        pub next: usize,
    }

    impl ScriptedEstimator {
        pub fn new(scores: Vec<Option<f64>>) -> Self {
            Self { scores, next: 0 }
        }
    }

    impl PoseEstimator for ScriptedEstimator {
        fn estimate(&mut self, _image: &RawImage) -> Option<LandmarkSet> {
            let index = self.next.min(self.scores.len().saturating_sub(1));
            self.next += 1;
            let score = (*self.scores.get(index)?)?;
            Some(landmarks_with_score(score))
        }
    }

    /// Upright 200px left torso with the ear shifted forward by `score * 200`.
    pub fn landmarks_with_score(score: f64) -> LandmarkSet {
        let side = BodySide::Left;
        LandmarkSet::new()
            .with(LandmarkKind::shoulder(side), LandmarkPoint::new(100.0, 100.0, 0.95))
            .with(LandmarkKind::hip(side), LandmarkPoint::new(100.0, 300.0, 0.95))
            .with(
                LandmarkKind::ear(side),
                LandmarkPoint::new(100.0 + score * 200.0, 50.0, 0.95),
            )
    }
}
