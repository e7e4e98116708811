// src/detection/tracker.rs
//
// Multi-object track association over per-frame detections. Two mutually
// exclusive strategies, selected once at job start:
//
//   bot  — greedy IoU matching plus a centroid-distance rescue pass for
//          detections that lost box overlap between frames
//   byte — ByteTrack-style two-round matching: high-score detections match
//          all predicted tracks first, low-score detections then rescue the
//          remaining tracks; only high-score detections may open new tracks
//
// Both use a constant-velocity prediction of each track's box and coast
// through short detection gaps before a track is dropped.

use tracing::debug;

use crate::detection::yolo::{calculate_iou, RawDetection};
use crate::types::TrackerStrategy;

const MAX_COAST_FRAMES: u32 = 30; // ~1s at 30fps
const BOT_MIN_IOU: f32 = 0.2;
const BOT_RESCUE_DISTANCE_FACTOR: f32 = 1.5;
const BYTE_HIGH_SCORE: f32 = 0.5;
const BYTE_HIGH_IOU: f32 = 0.3;
const BYTE_LOW_IOU: f32 = 0.5;

/// A detection with a persistent identity attached.
#[derive(Debug, Clone)]
pub struct TrackedObject {
    pub id: u64,
    pub bbox: [f32; 4],
    pub confidence: f32,
    pub class_id: u32,
}

struct Track {
    id: u64,
    bbox: [f32; 4],
    velocity: (f32, f32),
    class_id: u32,
    coast_frames: u32,
}

impl Track {
    fn new(id: u64, detection: &RawDetection) -> Self {
        Self {
            id,
            bbox: detection.bbox,
            velocity: (0.0, 0.0),
            class_id: detection.class_id,
            coast_frames: 0,
        }
    }

    fn center(&self) -> (f32, f32) {
        (
            (self.bbox[0] + self.bbox[2]) * 0.5,
            (self.bbox[1] + self.bbox[3]) * 0.5,
        )
    }

    /// Constant-velocity forecast of the box for the current frame.
    fn predicted_bbox(&self) -> [f32; 4] {
        let (vx, vy) = self.velocity;
        [
            self.bbox[0] + vx,
            self.bbox[1] + vy,
            self.bbox[2] + vx,
            self.bbox[3] + vy,
        ]
    }

    fn update(&mut self, detection: &RawDetection) {
        let (old_cx, old_cy) = self.center();
        let (new_cx, new_cy) = detection.center();
        self.velocity = (new_cx - old_cx, new_cy - old_cy);
        self.bbox = detection.bbox;
        self.class_id = detection.class_id;
        self.coast_frames = 0;
    }

    fn max_dimension(&self) -> f32 {
        (self.bbox[2] - self.bbox[0]).max(self.bbox[3] - self.bbox[1])
    }
}

pub struct AssociationTracker {
    strategy: TrackerStrategy,
    tracks: Vec<Track>,
    next_id: u64,
}

impl AssociationTracker {
    pub fn new(strategy: TrackerStrategy) -> Self {
        Self {
            strategy,
            tracks: Vec::new(),
            next_id: 1,
        }
    }

    /// Associate one frame's detections. The returned list is parallel in
    /// order to the input detections that received an identity.
    pub fn update(&mut self, detections: &[RawDetection]) -> Vec<TrackedObject> {
        let assigned = match self.strategy {
            TrackerStrategy::Bot => self.associate_bot(detections),
            TrackerStrategy::Byte => self.associate_byte(detections),
        };

        // Coast unmatched tracks, drop the ones gone too long
        let before = self.tracks.len();
        self.tracks.retain(|t| t.coast_frames <= MAX_COAST_FRAMES);
        if self.tracks.len() < before {
            debug!("dropped {} stale tracks", before - self.tracks.len());
        }

        let mut output = Vec::with_capacity(detections.len());
        for (det_idx, detection) in detections.iter().enumerate() {
            if let Some(id) = assigned[det_idx] {
                output.push(TrackedObject {
                    id,
                    bbox: detection.bbox,
                    confidence: detection.confidence,
                    class_id: detection.class_id,
                });
            }
        }
        output
    }

    /// Greedy IoU pass over every detection, then a centroid-distance rescue
    /// pass for detections whose box jumped too far to overlap.
    fn associate_bot(&mut self, detections: &[RawDetection]) -> Vec<Option<u64>> {
        let mut assigned: Vec<Option<u64>> = vec![None; detections.len()];
        let mut track_taken = vec![false; self.tracks.len()];

        let all_dets: Vec<usize> = (0..detections.len()).collect();
        let pairs = self.greedy_iou_match(detections, &all_dets, &track_taken, BOT_MIN_IOU);
        for (det_idx, track_idx) in pairs {
            self.tracks[track_idx].update(&detections[det_idx]);
            assigned[det_idx] = Some(self.tracks[track_idx].id);
            track_taken[track_idx] = true;
        }

        // Rescue: nearest free track within a distance scaled by its size
        for (det_idx, detection) in detections.iter().enumerate() {
            if assigned[det_idx].is_some() {
                continue;
            }
            let (dx, dy) = detection.center();
            let mut best: Option<(f32, usize)> = None;
            for (track_idx, track) in self.tracks.iter().enumerate() {
                if track_taken[track_idx] {
                    continue;
                }
                let (tx, ty) = track.center();
                let dist = ((dx - tx).powi(2) + (dy - ty).powi(2)).sqrt();
                if dist <= track.max_dimension() * BOT_RESCUE_DISTANCE_FACTOR
                    && best.map_or(true, |(d, _)| dist < d)
                {
                    best = Some((dist, track_idx));
                }
            }
            if let Some((_, track_idx)) = best {
                self.tracks[track_idx].update(detection);
                assigned[det_idx] = Some(self.tracks[track_idx].id);
                track_taken[track_idx] = true;
            }
        }

        self.coast_unmatched(&track_taken);

        // Every remaining detection opens a new track
        for (det_idx, detection) in detections.iter().enumerate() {
            if assigned[det_idx].is_none() {
                assigned[det_idx] = Some(self.spawn_track(detection));
            }
        }

        assigned
    }

    /// ByteTrack two-round matching. Unmatched low-score detections are
    /// discarded without an identity.
    fn associate_byte(&mut self, detections: &[RawDetection]) -> Vec<Option<u64>> {
        let mut assigned: Vec<Option<u64>> = vec![None; detections.len()];
        let mut track_taken = vec![false; self.tracks.len()];

        let mut high: Vec<usize> = Vec::new();
        let mut low: Vec<usize> = Vec::new();
        for (idx, det) in detections.iter().enumerate() {
            if det.confidence >= BYTE_HIGH_SCORE {
                high.push(idx);
            } else {
                low.push(idx);
            }
        }

        // Round 1: high-score detections against all predicted tracks
        let pairs = self.greedy_iou_match(detections, &high, &track_taken, BYTE_HIGH_IOU);
        for (det_idx, track_idx) in pairs {
            self.tracks[track_idx].update(&detections[det_idx]);
            assigned[det_idx] = Some(self.tracks[track_idx].id);
            track_taken[track_idx] = true;
        }

        // Round 2: low-score detections rescue the remaining tracks
        let pairs = self.greedy_iou_match(detections, &low, &track_taken, BYTE_LOW_IOU);
        for (det_idx, track_idx) in pairs {
            self.tracks[track_idx].update(&detections[det_idx]);
            assigned[det_idx] = Some(self.tracks[track_idx].id);
            track_taken[track_idx] = true;
        }

        self.coast_unmatched(&track_taken);

        // Only unmatched high-score detections open new tracks
        for &det_idx in &high {
            if assigned[det_idx].is_none() {
                assigned[det_idx] = Some(self.spawn_track(&detections[det_idx]));
            }
        }

        assigned
    }

    /// Deterministic greedy matching: candidate pairs above `min_iou`,
    /// best IoU first, ties broken by (detection, track) index.
    fn greedy_iou_match(
        &self,
        detections: &[RawDetection],
        det_indices: &[usize],
        track_taken: &[bool],
        min_iou: f32,
    ) -> Vec<(usize, usize)> {
        let mut candidates = Vec::new();
        for &det_idx in det_indices {
            for (track_idx, track) in self.tracks.iter().enumerate() {
                if track_taken[track_idx] {
                    continue;
                }
                let iou = calculate_iou(&detections[det_idx].bbox, &track.predicted_bbox());
                if iou >= min_iou {
                    candidates.push((iou, det_idx, track_idx));
                }
            }
        }

        candidates.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap()
                .then(a.1.cmp(&b.1))
                .then(a.2.cmp(&b.2))
        });

        let mut pairs = Vec::new();
        let mut det_used = vec![false; detections.len()];
        let mut trk_used = vec![false; self.tracks.len()];
        for (_, det_idx, track_idx) in candidates {
            if !det_used[det_idx] && !trk_used[track_idx] {
                pairs.push((det_idx, track_idx));
                det_used[det_idx] = true;
                trk_used[track_idx] = true;
            }
        }
        pairs
    }

    fn coast_unmatched(&mut self, track_taken: &[bool]) {
        for (track_idx, track) in self.tracks.iter_mut().enumerate() {
            if !track_taken[track_idx] {
                track.coast_frames += 1;
                // Keep the prediction moving so a later rescue still overlaps
                track.bbox = {
                    let (vx, vy) = track.velocity;
                    [
                        track.bbox[0] + vx,
                        track.bbox[1] + vy,
                        track.bbox[2] + vx,
                        track.bbox[3] + vy,
                    ]
                };
            }
        }
    }

    fn spawn_track(&mut self, detection: &RawDetection) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.tracks.push(Track::new(id, detection));
        id
    }
}
