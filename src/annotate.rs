// src/annotate.rs
//
// Burns the per-frame overlays into an owned copy of the frame: detection
// boxes with id/confidence labels, per-track trails, region outlines, and a
// fixed-position status block with per-region congestion labels. The input
// frame itself is never touched.

use std::collections::HashMap;

use opencv::{
    core::{Mat, Point, Rect, Scalar},
    imgproc,
    prelude::*,
};

use crate::analysis::congestion::CongestionLevel;
use crate::analysis::regions::Region;
use crate::analysis::track_history::TrackHistoryStore;
use crate::error::PipelineError;
use crate::types::{Detection, Frame};

/// Overlay palette (BGR, as OpenCV expects).
mod colors {
    use opencv::core::Scalar;

    pub const REGION_OUTLINE: Scalar = Scalar::new(0.0, 255.0, 255.0, 0.0);
    pub const STATUS_BG: Scalar = Scalar::new(0.0, 0.0, 0.0, 0.0);
    pub const STATUS_TEXT: Scalar = Scalar::new(0.0, 255.0, 0.0, 0.0);
    pub const LABEL_TEXT: Scalar = Scalar::new(0.0, 0.0, 0.0, 0.0);

    pub const LEVEL_SMOOTH: Scalar = Scalar::new(0.0, 255.0, 0.0, 0.0);
    pub const LEVEL_MODERATE: Scalar = Scalar::new(0.0, 255.0, 255.0, 0.0);
    pub const LEVEL_HEAVY: Scalar = Scalar::new(0.0, 0.0, 255.0, 0.0);
}

const TEXT_FONT: i32 = imgproc::FONT_HERSHEY_SIMPLEX;
const TEXT_PADDING: i32 = 5;
const STATUS_X: i32 = 7;
const STATUS_Y: i32 = 50;
const STATUS_LINE_STEP: i32 = 40;

/// Per-region input to the status block.
#[derive(Debug, Clone, Copy)]
pub struct RegionStatus {
    pub count: usize,
    pub level: CongestionLevel,
}

pub struct FrameAnnotator {
    // Colors are computed once per track id and reused for the whole job
    track_colors: HashMap<u64, Scalar>,
}

impl FrameAnnotator {
    pub fn new() -> Self {
        Self {
            track_colors: HashMap::new(),
        }
    }

    /// Produce the annotated BGR copy of `frame` that goes to the sink.
    pub fn annotate(
        &mut self,
        frame: &Frame,
        detections: &[Detection],
        history: &TrackHistoryStore,
        regions: &[Region],
        statuses: &[RegionStatus],
    ) -> Result<Mat, PipelineError> {
        let mat = Mat::from_slice(&frame.data).map_err(cv_err)?;
        let mat = mat.reshape(3, frame.height as i32).map_err(cv_err)?;

        let mut output = Mat::default();
        imgproc::cvt_color(&mat, &mut output, imgproc::COLOR_RGB2BGR, 0).map_err(cv_err)?;

        for region in regions {
            draw_region_outline(&mut output, region)?;
        }

        for detection in detections {
            let color = self.color_for(detection.track_id);
            draw_detection(&mut output, detection, color)?;
            draw_trail(&mut output, history, detection.track_id, color)?;
        }

        draw_status_block(&mut output, detections.len(), regions, statuses)?;

        Ok(output)
    }

    fn color_for(&mut self, track_id: u64) -> Scalar {
        *self
            .track_colors
            .entry(track_id)
            .or_insert_with(|| color_from_id(track_id))
    }
}

impl Default for FrameAnnotator {
    fn default() -> Self {
        Self::new()
    }
}

/// Stable per-track color from an FNV-1a hash of the id. No global random
/// state: the same id maps to the same color in every run.
fn color_from_id(track_id: u64) -> Scalar {
    const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

    let mut hash = FNV_OFFSET;
    for byte in track_id.to_le_bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }

    // Keep channels in [60, 255] so labels stay visible on dark footage
    let channel = |shift: u64| 60.0 + ((hash >> shift) & 0xFF) as f64 % 196.0;
    Scalar::new(channel(0), channel(8), channel(16), 0.0)
}

fn draw_detection(output: &mut Mat, detection: &Detection, color: Scalar) -> Result<(), PipelineError> {
    let [x1, y1, x2, y2] = detection.bbox();
    let rect = Rect::new(
        x1 as i32,
        y1 as i32,
        (x2 - x1).max(1.0) as i32,
        (y2 - y1).max(1.0) as i32,
    );
    imgproc::rectangle(output, rect, color, 2, imgproc::LINE_8, 0).map_err(cv_err)?;

    let label = format!("ID: {} ({:.2})", detection.track_id, detection.confidence);
    draw_text_with_background(
        output,
        &label,
        Point::new(x1 as i32, (y1 as i32 - 8).max(14)),
        0.5,
        colors::LABEL_TEXT,
        color,
    )?;

    // Center dot marks the point used for region occupancy
    let (cx, cy) = detection.center;
    imgproc::circle(
        output,
        Point::new(cx as i32, cy as i32),
        3,
        color,
        -1,
        imgproc::LINE_8,
        0,
    )
    .map_err(cv_err)?;

    Ok(())
}

fn draw_trail(
    output: &mut Mat,
    history: &TrackHistoryStore,
    track_id: u64,
    color: Scalar,
) -> Result<(), PipelineError> {
    let points: Vec<Point> = history
        .history(track_id)
        .map(|(x, y)| Point::new(x as i32, y as i32))
        .collect();

    for pair in points.windows(2) {
        imgproc::line(output, pair[0], pair[1], color, 2, imgproc::LINE_AA, 0).map_err(cv_err)?;
    }
    Ok(())
}

fn draw_region_outline(output: &mut Mat, region: &Region) -> Result<(), PipelineError> {
    let polygon = region.polygon();
    let n = polygon.len();
    for i in 0..n {
        let (x1, y1) = polygon[i];
        let (x2, y2) = polygon[(i + 1) % n];
        imgproc::line(
            output,
            Point::new(x1 as i32, y1 as i32),
            Point::new(x2 as i32, y2 as i32),
            colors::REGION_OUTLINE,
            2,
            imgproc::LINE_AA,
            0,
        )
        .map_err(cv_err)?;
    }
    Ok(())
}

fn draw_status_block(
    output: &mut Mat,
    total: usize,
    regions: &[Region],
    statuses: &[RegionStatus],
) -> Result<(), PipelineError> {
    draw_text_with_background(
        output,
        &format!("Total Vehicles: {}", total),
        Point::new(STATUS_X, STATUS_Y),
        0.8,
        colors::STATUS_TEXT,
        colors::STATUS_BG,
    )?;

    for (idx, (region, status)) in regions.iter().zip(statuses).enumerate() {
        let text = format!("{}: {} ({})", region.name(), status.count, status.level);
        let text_color = match status.level {
            CongestionLevel::Smooth => colors::LEVEL_SMOOTH,
            CongestionLevel::Moderate => colors::LEVEL_MODERATE,
            CongestionLevel::Heavy => colors::LEVEL_HEAVY,
        };
        draw_text_with_background(
            output,
            &text,
            Point::new(STATUS_X, STATUS_Y + STATUS_LINE_STEP * (idx as i32 + 1)),
            0.8,
            text_color,
            colors::STATUS_BG,
        )?;
    }

    Ok(())
}

/// Text over a filled rectangle so labels stay legible on any footage.
fn draw_text_with_background(
    output: &mut Mat,
    text: &str,
    position: Point,
    font_scale: f64,
    text_color: Scalar,
    bg_color: Scalar,
) -> Result<(), PipelineError> {
    let thickness = 2;
    let mut baseline = 0;
    let size = imgproc::get_text_size(text, TEXT_FONT, font_scale, thickness, &mut baseline)
        .map_err(cv_err)?;

    let rect = Rect::new(
        position.x,
        position.y - size.height - TEXT_PADDING,
        size.width + TEXT_PADDING * 2,
        size.height + TEXT_PADDING * 2,
    );
    imgproc::rectangle(output, rect, bg_color, -1, imgproc::LINE_8, 0).map_err(cv_err)?;

    imgproc::put_text(
        output,
        text,
        Point::new(position.x + TEXT_PADDING, position.y),
        TEXT_FONT,
        font_scale,
        text_color,
        thickness,
        imgproc::LINE_AA,
        false,
    )
    .map_err(cv_err)?;

    Ok(())
}

fn cv_err(e: opencv::Error) -> PipelineError {
    PipelineError::Io(format!("annotation: {}", e))
}
