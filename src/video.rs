// src/video.rs
//
// Sequential video decode and encode. The file-backed source and sink each
// own exactly one OS handle for the duration of a job; the pipeline
// guarantees release on every exit path and discards partial output after a
// failure.

use std::path::{Path, PathBuf};

use opencv::{
    core::{Mat, Size},
    imgproc,
    prelude::*,
    videoio::{self, VideoCapture, VideoCaptureTraitConst, VideoWriter},
};
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::error::PipelineError;
use crate::types::Frame;

/// Used when the container reports a zero frame rate.
pub const FALLBACK_FPS: f64 = 30.0;

pub trait FrameSource {
    /// Pull the next frame, `None` once the source is exhausted.
    fn next_frame(&mut self) -> Result<Option<Frame>, PipelineError>;
    fn width(&self) -> i32;
    fn height(&self) -> i32;
    fn fps(&self) -> f64;
}

pub trait FrameSink {
    /// Frames must arrive in strict sequential order.
    fn write(&mut self, frame: &Mat) -> Result<(), PipelineError>;
    /// Flush and close the output. The sink is unusable afterwards.
    fn release(&mut self) -> Result<(), PipelineError>;
    /// Drop any partially written output after a failed job.
    fn discard(&mut self);
}

pub struct VideoFileSource {
    cap: VideoCapture,
    width: i32,
    height: i32,
    fps: f64,
    frame_index: u64,
}

impl VideoFileSource {
    pub fn open(path: &Path) -> Result<Self, PipelineError> {
        info!("Opening video: {}", path.display());

        let cap = VideoCapture::from_file(
            path.to_str()
                .ok_or_else(|| PipelineError::Io(format!("non-UTF-8 path: {:?}", path)))?,
            videoio::CAP_ANY,
        )
        .map_err(cv_err)?;

        if !cap.is_opened().map_err(cv_err)? {
            return Err(PipelineError::Io(format!(
                "failed to open video file {}",
                path.display()
            )));
        }

        let mut fps = cap.get(videoio::CAP_PROP_FPS).map_err(cv_err)?;
        if fps <= 0.0 {
            warn!("container reports no frame rate, falling back to {}", FALLBACK_FPS);
            fps = FALLBACK_FPS;
        }
        let width = cap.get(videoio::CAP_PROP_FRAME_WIDTH).map_err(cv_err)? as i32;
        let height = cap.get(videoio::CAP_PROP_FRAME_HEIGHT).map_err(cv_err)? as i32;

        info!("Video properties: {}x{} @ {:.1} FPS", width, height, fps);

        Ok(Self {
            cap,
            width,
            height,
            fps,
            frame_index: 0,
        })
    }
}

impl FrameSource for VideoFileSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, PipelineError> {
        let mut mat = Mat::default();
        if !self.cap.read(&mut mat).map_err(cv_err)? || mat.empty() {
            return Ok(None);
        }

        let mut rgb = Mat::default();
        imgproc::cvt_color(&mat, &mut rgb, imgproc::COLOR_BGR2RGB, 0).map_err(cv_err)?;
        let data = rgb.data_bytes().map_err(cv_err)?.to_vec();

        let frame = Frame {
            data,
            width: self.width as usize,
            height: self.height as usize,
            index: self.frame_index,
        };
        self.frame_index += 1;
        Ok(Some(frame))
    }

    fn width(&self) -> i32 {
        self.width
    }

    fn height(&self) -> i32 {
        self.height
    }

    fn fps(&self) -> f64 {
        self.fps
    }
}

pub struct VideoFileSink {
    writer: VideoWriter,
    path: PathBuf,
}

impl VideoFileSink {
    /// Sized to match the source: same resolution, same frame rate.
    pub fn create(path: &Path, width: i32, height: i32, fps: f64) -> Result<Self, PipelineError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| PipelineError::Io(format!("cannot create {}: {}", parent.display(), e)))?;
        }

        let fourcc = VideoWriter::fourcc('m', 'p', '4', 'v').map_err(cv_err)?;
        let writer = VideoWriter::new(
            path.to_str()
                .ok_or_else(|| PipelineError::Io(format!("non-UTF-8 path: {:?}", path)))?,
            fourcc,
            fps,
            Size::new(width, height),
            true,
        )
        .map_err(cv_err)?;

        if !writer.is_opened().map_err(cv_err)? {
            return Err(PipelineError::Io(format!(
                "failed to open output video {}",
                path.display()
            )));
        }

        info!("Output video: {}", path.display());
        Ok(Self {
            writer,
            path: path.to_path_buf(),
        })
    }
}

impl FrameSink for VideoFileSink {
    fn write(&mut self, frame: &Mat) -> Result<(), PipelineError> {
        self.writer.write(frame).map_err(cv_err)
    }

    fn release(&mut self) -> Result<(), PipelineError> {
        self.writer.release().map_err(cv_err)
    }

    fn discard(&mut self) {
        if let Err(e) = self.writer.release() {
            warn!("releasing failed sink: {}", e);
        }
        // No partial video is a valid result
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!("could not remove partial output {}: {}", self.path.display(), e);
        } else {
            info!("Discarded partial output {}", self.path.display());
        }
    }
}

/// All processable videos under the input directory, one job each.
pub fn find_video_files(input_dir: &str) -> Result<Vec<PathBuf>, PipelineError> {
    let video_extensions = ["mp4", "avi", "mov", "mkv", "MP4", "AVI", "MOV", "MKV"];

    let mut videos = Vec::new();
    for entry in WalkDir::new(input_dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if let Some(ext) = path.extension() {
            if video_extensions.contains(&ext.to_str().unwrap_or("")) {
                videos.push(path.to_path_buf());
            }
        }
    }

    videos.sort();
    info!("Found {} video files", videos.len());
    Ok(videos)
}

pub fn output_path_for(input_path: &Path, output_dir: &str) -> PathBuf {
    let stem = input_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("video");
    PathBuf::from(output_dir).join(format!("{}_annotated.mp4", stem))
}

fn cv_err(e: opencv::Error) -> PipelineError {
    PipelineError::Io(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_name_keeps_stem() {
        let out = output_path_for(Path::new("/videos/cam_03.mp4"), "results");
        assert_eq!(out, PathBuf::from("results/cam_03_annotated.mp4"));
    }

    #[test]
    fn opening_missing_file_is_fatal() {
        let result = VideoFileSource::open(Path::new("/nonexistent/clip.mp4"));
        assert!(matches!(result, Err(PipelineError::Io(_))));
    }
}
