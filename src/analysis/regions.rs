// src/analysis/regions.rs
//
// Polygonal regions of interest and per-frame occupancy evaluation.
// Containment uses a ray-casting test; points on the polygon boundary
// count as inside, matching cv2.pointPolygonTest(..) >= 0.

use std::collections::HashSet;

use crate::error::PipelineError;
use crate::types::Detection;

/// An immutable named polygon, fixed for the whole job.
#[derive(Debug, Clone)]
pub struct Region {
    name: String,
    polygon: Vec<(f32, f32)>,
}

const EDGE_EPSILON: f32 = 1e-4;

impl Region {
    pub fn new(name: impl Into<String>, polygon: Vec<(f32, f32)>) -> Result<Self, PipelineError> {
        let name = name.into();
        if polygon.len() < 3 {
            return Err(PipelineError::Config(format!(
                "region '{}' has {} vertices, need at least 3",
                name,
                polygon.len()
            )));
        }
        Ok(Self { name, polygon })
    }

    /// The default region when none are configured: the full video frame.
    pub fn full_frame(width: f32, height: f32) -> Self {
        Self {
            name: "frame".to_string(),
            polygon: vec![(0.0, 0.0), (width, 0.0), (width, height), (0.0, height)],
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn polygon(&self) -> &[(f32, f32)] {
        &self.polygon
    }

    /// Boundary-inclusive point-in-polygon test.
    pub fn contains(&self, point: (f32, f32)) -> bool {
        let (x, y) = point;
        let n = self.polygon.len();
        let mut inside = false;

        let mut j = n - 1;
        for i in 0..n {
            let (xi, yi) = self.polygon[i];
            let (xj, yj) = self.polygon[j];

            if on_segment((xi, yi), (xj, yj), point) {
                return true;
            }

            if (yi > y) != (yj > y) {
                let x_cross = (xj - xi) * (y - yi) / (yj - yi) + xi;
                if x < x_cross {
                    inside = !inside;
                }
            }
            j = i;
        }

        inside
    }
}

fn on_segment(a: (f32, f32), b: (f32, f32), p: (f32, f32)) -> bool {
    let cross = (b.0 - a.0) * (p.1 - a.1) - (b.1 - a.1) * (p.0 - a.0);
    if cross.abs() > EDGE_EPSILON * ((b.0 - a.0).abs() + (b.1 - a.1).abs()).max(1.0) {
        return false;
    }
    p.0 >= a.0.min(b.0) - EDGE_EPSILON
        && p.0 <= a.0.max(b.0) + EDGE_EPSILON
        && p.1 >= a.1.min(b.1) - EDGE_EPSILON
        && p.1 <= a.1.max(b.1) + EDGE_EPSILON
}

/// For every detection, test its center against every region. A detection
/// may occupy several regions at once. The result is indexed parallel to
/// `regions` and is derived fresh each frame, never stored.
pub fn occupancy(detections: &[Detection], regions: &[Region]) -> Vec<HashSet<u64>> {
    let mut occupants: Vec<HashSet<u64>> = vec![HashSet::new(); regions.len()];

    for detection in detections {
        for (idx, region) in regions.iter().enumerate() {
            if region.contains(detection.center) {
                occupants[idx].insert(detection.track_id);
            }
        }
    }

    occupants
}
