// src/detection/engine.rs
//
// The detection+tracking engine boundary. The pipeline only ever sees
// `Observation`s through this trait, so tests can substitute a scripted
// engine for the real YOLO + tracker pair.

use crate::detection::tracker::AssociationTracker;
use crate::detection::yolo::YoloDetector;
use crate::error::PipelineError;
use crate::types::{Frame, TrackerStrategy};

/// One engine output box for a single frame. `track_id` is `None` when the
/// engine could not associate the box — the adapter deals with that.
#[derive(Debug, Clone)]
pub struct Observation {
    pub track_id: Option<u64>,
    pub bbox: [f32; 4],
    pub confidence: f32,
    pub class_id: u32,
}

pub trait DetectionEngine {
    /// Detect and associate one frame. An `Err` is a hard engine failure
    /// and aborts the job; an empty list is a normal result.
    fn observe(&mut self, frame: &Frame) -> Result<Vec<Observation>, PipelineError>;
}

/// The production engine: ONNX YOLO detection followed by track association
/// with the strategy fixed at construction.
pub struct YoloTrackEngine {
    detector: YoloDetector,
    tracker: AssociationTracker,
}

impl YoloTrackEngine {
    pub fn new(detector: YoloDetector, strategy: TrackerStrategy) -> Self {
        Self {
            detector,
            tracker: AssociationTracker::new(strategy),
        }
    }
}

impl DetectionEngine for YoloTrackEngine {
    fn observe(&mut self, frame: &Frame) -> Result<Vec<Observation>, PipelineError> {
        let detections = self.detector.detect(frame)?;
        let tracked = self.tracker.update(&detections);

        Ok(tracked
            .into_iter()
            .map(|t| Observation {
                track_id: Some(t.id),
                bbox: t.bbox,
                confidence: t.confidence,
                class_id: t.class_id,
            })
            .collect())
    }
}
