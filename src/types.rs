// src/types.rs

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub model: ModelConfig,
    pub detection: DetectionConfig,
    pub congestion: CongestionConfig,
    #[serde(default)]
    pub regions: Vec<RegionConfig>,
    pub video: VideoConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    pub path: String,
    #[serde(default = "default_input_size")]
    pub input_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DetectionConfig {
    /// YOLO class IDs to keep (COCO: 2=car, 3=motorcycle, 5=bus, 7=truck)
    pub classes: Vec<u32>,
    /// Applied to raw detections before track association
    #[serde(default = "default_confidence_floor")]
    pub confidence_floor: f32,
    #[serde(default)]
    pub strategy: TrackerStrategy,
}

/// Track association strategy, fixed for the whole job. A closed enum:
/// anything but the two known values fails at config load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TrackerStrategy {
    /// IoU-greedy association with centroid-distance rescue
    #[default]
    Bot,
    /// ByteTrack two-round association (high-score first, low-score rescue)
    Byte,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CongestionConfig {
    #[serde(default = "default_moderate_threshold")]
    pub moderate_threshold: u32,
    #[serde(default = "default_heavy_threshold")]
    pub heavy_threshold: u32,
}

/// A named polygon region of interest. When the config lists none, a single
/// region covering the full frame is created at job start.
#[derive(Debug, Clone, Deserialize)]
pub struct RegionConfig {
    pub name: String,
    pub polygon: Vec<[f32; 2]>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VideoConfig {
    pub input_dir: String,
    pub output_dir: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

fn default_input_size() -> usize {
    640
}

fn default_confidence_floor() -> f32 {
    0.15
}

fn default_moderate_threshold() -> u32 {
    10
}

fn default_heavy_threshold() -> u32 {
    15
}

/// One decoded video frame, RGB, row-major. Read-only once produced by the
/// source; the annotator always works on its own copy.
#[derive(Debug, Clone)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: usize,
    pub height: usize,
    pub index: u64,
}

/// One normalized object observation for a single frame. Never persisted
/// beyond the frame except through the track history store.
#[derive(Debug, Clone)]
pub struct Detection {
    pub track_id: u64,
    pub center: (f32, f32),
    pub size: (f32, f32),
    pub confidence: f32,
    pub class_id: u32,
}

impl Detection {
    pub fn bbox(&self) -> [f32; 4] {
        let (cx, cy) = self.center;
        let (w, h) = self.size;
        [cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0]
    }
}
