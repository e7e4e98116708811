// src/detection/adapter.rs
//
// Normalizes engine output into the pipeline's `Detection` record. When the
// engine fails to supply persistent identifiers for a frame, sequential
// fallback ids 0..k-1 are synthesized for that frame. This breaks
// cross-frame identity continuity for the affected frames — an accepted
// limitation of degraded mode, logged rather than hidden.

use tracing::warn;

use crate::detection::engine::{DetectionEngine, Observation};
use crate::error::PipelineError;
use crate::types::{Detection, Frame};

pub struct DetectionAdapter<E: DetectionEngine> {
    engine: E,
    degraded_frames: u64,
}

impl<E: DetectionEngine> DetectionAdapter<E> {
    pub fn new(engine: E) -> Self {
        Self {
            engine,
            degraded_frames: 0,
        }
    }

    /// Frames the adapter had to re-identify with fallback ids.
    pub fn degraded_frames(&self) -> u64 {
        self.degraded_frames
    }

    /// One frame's normalized detections. Track ids are unique within the
    /// returned list. A hard engine failure propagates and aborts the job.
    pub fn observe(&mut self, frame: &Frame) -> Result<Vec<Detection>, PipelineError> {
        let observations = self.engine.observe(frame)?;

        let ids = match engine_ids(&observations) {
            Some(ids) => ids,
            None => {
                // Degraded mode: identity is lost for this frame
                self.degraded_frames += 1;
                warn!(
                    "frame {}: engine returned no usable track ids, assigning 0..{}",
                    frame.index,
                    observations.len()
                );
                (0..observations.len() as u64).collect()
            }
        };

        Ok(observations
            .iter()
            .zip(ids)
            .map(|(obs, track_id)| to_detection(obs, track_id))
            .collect())
    }
}

/// Engine-supplied ids, but only if every observation has one and they are
/// unique within the frame. Missing or colliding ids degrade the whole
/// frame to fallback numbering, mirroring the engine's all-or-nothing
/// identifier contract.
fn engine_ids(observations: &[Observation]) -> Option<Vec<u64>> {
    let mut ids = Vec::with_capacity(observations.len());
    for obs in observations {
        ids.push(obs.track_id?);
    }

    let mut sorted = ids.clone();
    sorted.sort_unstable();
    sorted.dedup();
    if sorted.len() != ids.len() {
        return None;
    }

    Some(ids)
}

fn to_detection(obs: &Observation, track_id: u64) -> Detection {
    let [x1, y1, x2, y2] = obs.bbox;
    Detection {
        track_id,
        center: ((x1 + x2) * 0.5, (y1 + y2) * 0.5),
        size: (x2 - x1, y2 - y1),
        confidence: obs.confidence,
        class_id: obs.class_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ScriptedEngine {
        frames: Vec<Result<Vec<Observation>, PipelineError>>,
        cursor: usize,
    }

    impl ScriptedEngine {
        fn new(frames: Vec<Result<Vec<Observation>, PipelineError>>) -> Self {
            Self { frames, cursor: 0 }
        }
    }

    impl DetectionEngine for ScriptedEngine {
        fn observe(&mut self, _frame: &Frame) -> Result<Vec<Observation>, PipelineError> {
            let result = self.frames[self.cursor].as_ref();
            self.cursor += 1;
            match result {
                Ok(obs) => Ok(obs.clone()),
                Err(_) => Err(PipelineError::Engine("scripted failure".to_string())),
            }
        }
    }

    fn obs(track_id: Option<u64>, x: f32) -> Observation {
        Observation {
            track_id,
            bbox: [x, 10.0, x + 20.0, 40.0],
            confidence: 0.8,
            class_id: 2,
        }
    }

    fn frame() -> Frame {
        Frame {
            data: vec![0; 12],
            width: 2,
            height: 2,
            index: 0,
        }
    }

    #[test]
    fn engine_ids_pass_through() {
        let engine = ScriptedEngine::new(vec![Ok(vec![obs(Some(7), 0.0), obs(Some(3), 100.0)])]);
        let mut adapter = DetectionAdapter::new(engine);

        let detections = adapter.observe(&frame()).unwrap();
        assert_eq!(detections[0].track_id, 7);
        assert_eq!(detections[1].track_id, 3);
        assert_eq!(adapter.degraded_frames(), 0);
    }

    #[test]
    fn missing_ids_become_sequential_fallback() {
        let engine = ScriptedEngine::new(vec![Ok(vec![
            obs(None, 0.0),
            obs(None, 100.0),
            obs(None, 200.0),
        ])]);
        let mut adapter = DetectionAdapter::new(engine);

        let detections = adapter.observe(&frame()).unwrap();
        let ids: Vec<u64> = detections.iter().map(|d| d.track_id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
        assert_eq!(adapter.degraded_frames(), 1);
    }

    #[test]
    fn partial_ids_degrade_the_whole_frame() {
        let engine = ScriptedEngine::new(vec![Ok(vec![obs(Some(9), 0.0), obs(None, 100.0)])]);
        let mut adapter = DetectionAdapter::new(engine);

        let detections = adapter.observe(&frame()).unwrap();
        let ids: Vec<u64> = detections.iter().map(|d| d.track_id).collect();
        assert_eq!(ids, vec![0, 1]);
    }

    #[test]
    fn duplicate_ids_degrade_the_whole_frame() {
        let engine = ScriptedEngine::new(vec![Ok(vec![obs(Some(5), 0.0), obs(Some(5), 100.0)])]);
        let mut adapter = DetectionAdapter::new(engine);

        let detections = adapter.observe(&frame()).unwrap();
        let ids: Vec<u64> = detections.iter().map(|d| d.track_id).collect();
        assert_eq!(ids, vec![0, 1]);
        assert_eq!(adapter.degraded_frames(), 1);
    }

    #[test]
    fn center_and_size_derived_from_bbox() {
        let engine = ScriptedEngine::new(vec![Ok(vec![obs(Some(1), 10.0)])]);
        let mut adapter = DetectionAdapter::new(engine);

        let detections = adapter.observe(&frame()).unwrap();
        assert_eq!(detections[0].center, (20.0, 25.0));
        assert_eq!(detections[0].size, (20.0, 30.0));
    }

    #[test]
    fn engine_failure_propagates() {
        let engine = ScriptedEngine::new(vec![Err(PipelineError::Engine("boom".to_string()))]);
        let mut adapter = DetectionAdapter::new(engine);
        assert!(matches!(
            adapter.observe(&frame()),
            Err(PipelineError::Engine(_))
        ));
    }
}
