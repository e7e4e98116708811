// src/detection/mod.rs

pub mod adapter;
pub mod engine;
pub mod tracker;
pub mod yolo;

pub use adapter::DetectionAdapter;
pub use engine::{DetectionEngine, Observation, YoloTrackEngine};
pub use yolo::YoloDetector;
