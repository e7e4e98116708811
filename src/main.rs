// src/main.rs

mod analysis;
mod annotate;
mod config;
mod detection;
mod error;
mod pipeline;
mod types;
mod video;

use std::path::Path;

use anyhow::Result;
use tracing::{error, info};

use detection::{YoloDetector, YoloTrackEngine};
use error::PipelineError;
use pipeline::{CongestionPipeline, JobSummary};
use types::Config;
use video::{find_video_files, output_path_for, FrameSource, VideoFileSink, VideoFileSource};

fn main() -> Result<()> {
    let config = Config::load("config.yaml")?;

    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "congestion_detection={},ort=warn",
            config.logging.level
        ))
        .init();

    info!("🚦 Traffic Congestion Detection Starting");
    info!(
        "Thresholds: moderate={}, heavy={} | strategy={:?} | floor={:.2}",
        config.congestion.moderate_threshold,
        config.congestion.heavy_threshold,
        config.detection.strategy,
        config.detection.confidence_floor
    );
    if config.regions.is_empty() {
        info!("No regions configured — using the full frame");
    } else {
        info!("{} region(s) configured", config.regions.len());
    }

    let videos = find_video_files(&config.video.input_dir)?;
    if videos.is_empty() {
        error!("No video files found in {}", config.video.input_dir);
        return Ok(());
    }

    for (idx, video_path) in videos.iter().enumerate() {
        info!(
            "Processing video {}/{}: {}",
            idx + 1,
            videos.len(),
            video_path.display()
        );
        match run_job(&config, video_path) {
            Ok(summary) => {
                info!(
                    "✓ {} frames written, final levels {:?}",
                    summary.frames, summary.final_levels
                );
                if summary.degraded_frames > 0 {
                    info!(
                        "note: {} frame(s) used fallback track ids",
                        summary.degraded_frames
                    );
                }
            }
            Err(e) => error!("✗ Job failed for {}: {}", video_path.display(), e),
        }
    }

    Ok(())
}

/// One video = one job. Every job builds fully independent state — its own
/// engine, tracker, history store, and annotator — so nothing leaks between
/// files.
fn run_job(config: &Config, input: &Path) -> Result<JobSummary, PipelineError> {
    let detector = YoloDetector::new(
        &config.model.path,
        config.model.input_size,
        config.detection.classes.clone(),
        config.detection.confidence_floor,
    )?;
    let engine = YoloTrackEngine::new(detector, config.detection.strategy);
    let mut pipeline = CongestionPipeline::new(engine, config)?;

    let mut source = VideoFileSource::open(input)?;
    let output_path = output_path_for(input, &config.video.output_dir);
    let mut sink = VideoFileSink::create(
        &output_path,
        source.width(),
        source.height(),
        source.fps(),
    )?;

    pipeline.run(&mut source, &mut sink)
}
