// src/pipeline.rs
//
// Per-job orchestration: INIT -> RUNNING -> CLOSE -> DONE, with FAILED
// reachable from anywhere. One job is strictly sequential — the tracker and
// the history store both depend on frame order, so there is no parallel
// frame processing. All per-job state lives here and is never shared
// between jobs.

use opencv::core::Mat;
use tracing::{debug, info};

use crate::analysis::congestion::{self, CongestionLevel};
use crate::analysis::regions::{self, Region};
use crate::analysis::track_history::TrackHistoryStore;
use crate::annotate::{FrameAnnotator, RegionStatus};
use crate::detection::{DetectionAdapter, DetectionEngine};
use crate::error::PipelineError;
use crate::types::{Config, Frame};
use crate::video::{FrameSink, FrameSource};

const PROGRESS_LOG_INTERVAL: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Init,
    Running,
    Close,
    Done,
    Failed,
}

#[derive(Debug)]
pub struct JobSummary {
    pub frames: u64,
    pub final_levels: Vec<CongestionLevel>,
    pub degraded_frames: u64,
}

pub struct CongestionPipeline<E: DetectionEngine> {
    adapter: DetectionAdapter<E>,
    history: TrackHistoryStore,
    annotator: FrameAnnotator,
    regions: Vec<Region>,
    moderate_threshold: u32,
    heavy_threshold: u32,
    state: JobState,
}

impl<E: DetectionEngine> CongestionPipeline<E> {
    /// Validates the configuration and builds the configured regions.
    /// Nothing here touches a frame: configuration problems surface before
    /// any processing starts.
    pub fn new(engine: E, config: &Config) -> Result<Self, PipelineError> {
        config.validate()?;

        let mut regions = Vec::with_capacity(config.regions.len());
        for region_config in &config.regions {
            regions.push(Region::new(
                region_config.name.clone(),
                region_config.polygon.iter().map(|p| (p[0], p[1])).collect(),
            )?);
        }

        Ok(Self {
            adapter: DetectionAdapter::new(engine),
            history: TrackHistoryStore::new(),
            annotator: FrameAnnotator::new(),
            regions,
            moderate_threshold: config.congestion.moderate_threshold,
            heavy_threshold: config.congestion.heavy_threshold,
            state: JobState::Init,
        })
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    /// Drive the whole job. The sink is released on success and discarded on
    /// failure; the source handle closes when it is dropped by the caller.
    pub fn run(
        &mut self,
        source: &mut impl FrameSource,
        sink: &mut impl FrameSink,
    ) -> Result<JobSummary, PipelineError> {
        self.begin(source.width() as f32, source.height() as f32)?;

        let result = self.run_loop(source, sink);

        self.state = JobState::Close;
        match result {
            Ok(summary) => match sink.release() {
                Ok(()) => {
                    self.state = JobState::Done;
                    info!(
                        "✓ Job done: {} frames, {} tracks seen",
                        summary.frames,
                        self.history.track_count()
                    );
                    Ok(summary)
                }
                Err(e) => {
                    sink.discard();
                    self.state = JobState::Failed;
                    Err(e)
                }
            },
            Err(e) => {
                sink.discard();
                self.state = JobState::Failed;
                Err(e)
            }
        }
    }

    /// INIT -> RUNNING. Resolves the default full-frame region now that the
    /// source dimensions are known.
    fn begin(&mut self, width: f32, height: f32) -> Result<(), PipelineError> {
        if self.state != JobState::Init {
            return Err(PipelineError::Config(
                "pipeline instance already consumed by a job".to_string(),
            ));
        }
        if self.regions.is_empty() {
            self.regions.push(Region::full_frame(width, height));
        }
        self.state = JobState::Running;
        Ok(())
    }

    fn run_loop(
        &mut self,
        source: &mut impl FrameSource,
        sink: &mut impl FrameSink,
    ) -> Result<JobSummary, PipelineError> {
        let mut frames = 0u64;
        let mut final_levels = vec![CongestionLevel::Smooth; self.regions.len()];

        while let Some(frame) = source.next_frame()? {
            let (annotated, levels) = self.process_frame(&frame)?;
            sink.write(&annotated)?;

            frames += 1;
            final_levels = levels;
            if frames % PROGRESS_LOG_INTERVAL == 0 {
                info!("processed {} frames", frames);
            }
        }

        Ok(JobSummary {
            frames,
            final_levels,
            degraded_frames: self.adapter.degraded_frames(),
        })
    }

    /// One frame through the whole chain: observe, update histories,
    /// evaluate occupancy, classify, annotate.
    fn process_frame(
        &mut self,
        frame: &Frame,
    ) -> Result<(Mat, Vec<CongestionLevel>), PipelineError> {
        let detections = self.adapter.observe(frame)?;

        for detection in &detections {
            self.history.append(detection.track_id, detection.center);
        }

        let occupants = regions::occupancy(&detections, &self.regions);
        let statuses: Vec<RegionStatus> = occupants
            .iter()
            .map(|ids| RegionStatus {
                count: ids.len(),
                level: congestion::classify(
                    ids.len(),
                    self.moderate_threshold,
                    self.heavy_threshold,
                ),
            })
            .collect();

        debug!(
            "frame {}: {} detections, levels {:?}",
            frame.index,
            detections.len(),
            statuses.iter().map(|s| s.level).collect::<Vec<_>>()
        );

        let annotated =
            self.annotator
                .annotate(frame, &detections, &self.history, &self.regions, &statuses)?;

        Ok((annotated, statuses.iter().map(|s| s.level).collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::Observation;
    use crate::types::*;
    use opencv::prelude::*;

    const TEST_W: usize = 64;
    const TEST_H: usize = 48;

    /// Deterministic engine: frame n yields `counts[n]` observations with
    /// stable ids, all centered well inside the test frame.
    struct StubEngine {
        counts: Vec<usize>,
        fail_at: Option<u64>,
    }

    impl DetectionEngine for StubEngine {
        fn observe(&mut self, frame: &Frame) -> Result<Vec<Observation>, PipelineError> {
            if Some(frame.index) == self.fail_at {
                return Err(PipelineError::Engine("stub blew up".to_string()));
            }
            let count = self.counts[frame.index as usize];
            Ok((0..count)
                .map(|i| {
                    let x = (i % 8) as f32 * 8.0;
                    let y = (i / 8) as f32 * 12.0;
                    Observation {
                        track_id: Some(i as u64),
                        bbox: [x, y, x + 6.0, y + 8.0],
                        confidence: 0.9,
                        class_id: 2,
                    }
                })
                .collect())
        }
    }

    struct MemorySource {
        total: u64,
        cursor: u64,
    }

    impl FrameSource for MemorySource {
        fn next_frame(&mut self) -> Result<Option<Frame>, PipelineError> {
            if self.cursor >= self.total {
                return Ok(None);
            }
            let frame = Frame {
                data: vec![100; TEST_W * TEST_H * 3],
                width: TEST_W,
                height: TEST_H,
                index: self.cursor,
            };
            self.cursor += 1;
            Ok(Some(frame))
        }

        fn width(&self) -> i32 {
            TEST_W as i32
        }

        fn height(&self) -> i32 {
            TEST_H as i32
        }

        fn fps(&self) -> f64 {
            30.0
        }
    }

    #[derive(Default)]
    struct MemorySink {
        written: Vec<(i32, i32)>,
        released: bool,
        discarded: bool,
    }

    impl FrameSink for MemorySink {
        fn write(&mut self, frame: &Mat) -> Result<(), PipelineError> {
            self.written.push((frame.cols(), frame.rows()));
            Ok(())
        }

        fn release(&mut self) -> Result<(), PipelineError> {
            self.released = true;
            Ok(())
        }

        fn discard(&mut self) {
            self.discarded = true;
        }
    }

    fn test_config() -> Config {
        Config {
            model: ModelConfig {
                path: "unused.onnx".to_string(),
                input_size: 640,
            },
            detection: DetectionConfig {
                classes: vec![2],
                confidence_floor: 0.15,
                strategy: TrackerStrategy::Bot,
            },
            congestion: CongestionConfig {
                moderate_threshold: 10,
                heavy_threshold: 15,
            },
            regions: Vec::new(),
            video: VideoConfig {
                input_dir: "in".to_string(),
                output_dir: "out".to_string(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }

    fn level_sequence(counts: Vec<usize>) -> Vec<CongestionLevel> {
        let total = counts.len() as u64;
        let engine = StubEngine {
            counts,
            fail_at: None,
        };
        let mut pipeline = CongestionPipeline::new(engine, &test_config()).unwrap();
        pipeline.begin(TEST_W as f32, TEST_H as f32).unwrap();

        let mut source = MemorySource { total, cursor: 0 };
        let mut levels = Vec::new();
        while let Some(frame) = source.next_frame().unwrap() {
            let (_, frame_levels) = pipeline.process_frame(&frame).unwrap();
            assert_eq!(frame_levels.len(), 1); // default full-frame region
            levels.push(frame_levels[0]);
        }
        levels
    }

    #[test]
    fn end_to_end_congestion_sequence() {
        // 12 vehicles on frames 1-3, 16 on frames 4-5, thresholds (10, 15)
        let levels = level_sequence(vec![12, 12, 12, 16, 16]);
        assert_eq!(
            levels,
            vec![
                CongestionLevel::Moderate,
                CongestionLevel::Moderate,
                CongestionLevel::Moderate,
                CongestionLevel::Heavy,
                CongestionLevel::Heavy,
            ]
        );
    }

    #[test]
    fn classification_is_deterministic_across_runs() {
        let counts = vec![3, 11, 9, 15, 16, 0, 12];
        let first = level_sequence(counts.clone());
        let second = level_sequence(counts);
        assert_eq!(first, second);
    }

    #[test]
    fn run_preserves_frame_count_and_resolution() {
        let engine = StubEngine {
            counts: vec![2, 2, 2, 2],
            fail_at: None,
        };
        let mut pipeline = CongestionPipeline::new(engine, &test_config()).unwrap();
        let mut source = MemorySource { total: 4, cursor: 0 };
        let mut sink = MemorySink::default();

        let summary = pipeline.run(&mut source, &mut sink).unwrap();

        assert_eq!(summary.frames, 4);
        assert_eq!(sink.written.len(), 4);
        assert!(sink
            .written
            .iter()
            .all(|&(w, h)| w == TEST_W as i32 && h == TEST_H as i32));
        assert!(sink.released);
        assert!(!sink.discarded);
        assert_eq!(pipeline.state(), JobState::Done);
    }

    #[test]
    fn engine_failure_discards_partial_output() {
        let engine = StubEngine {
            counts: vec![2, 2, 2, 2],
            fail_at: Some(2),
        };
        let mut pipeline = CongestionPipeline::new(engine, &test_config()).unwrap();
        let mut source = MemorySource { total: 4, cursor: 0 };
        let mut sink = MemorySink::default();

        let result = pipeline.run(&mut source, &mut sink);

        assert!(matches!(result, Err(PipelineError::Engine(_))));
        assert!(sink.discarded);
        assert!(!sink.released);
        assert_eq!(pipeline.state(), JobState::Failed);
    }

    #[test]
    fn default_region_covers_full_frame() {
        let engine = StubEngine {
            counts: vec![1],
            fail_at: None,
        };
        let mut pipeline = CongestionPipeline::new(engine, &test_config()).unwrap();
        pipeline.begin(TEST_W as f32, TEST_H as f32).unwrap();

        assert_eq!(pipeline.regions.len(), 1);
        let region = &pipeline.regions[0];
        for corner in [
            (0.0, 0.0),
            (TEST_W as f32, 0.0),
            (TEST_W as f32, TEST_H as f32),
            (0.0, TEST_H as f32),
            (32.0, 24.0),
        ] {
            assert!(region.contains(corner));
        }
    }

    #[test]
    fn pipeline_cannot_run_twice() {
        let engine = StubEngine {
            counts: vec![1],
            fail_at: None,
        };
        let mut pipeline = CongestionPipeline::new(engine, &test_config()).unwrap();
        let mut source = MemorySource { total: 1, cursor: 0 };
        let mut sink = MemorySink::default();
        pipeline.run(&mut source, &mut sink).unwrap();

        let mut source = MemorySource { total: 1, cursor: 0 };
        let mut sink = MemorySink::default();
        assert!(matches!(
            pipeline.run(&mut source, &mut sink),
            Err(PipelineError::Config(_))
        ));
    }

    #[test]
    fn inverted_thresholds_rejected_before_any_frame() {
        let mut config = test_config();
        config.congestion.moderate_threshold = 20;
        let engine = StubEngine {
            counts: vec![],
            fail_at: None,
        };
        assert!(matches!(
            CongestionPipeline::new(engine, &config),
            Err(PipelineError::Config(_))
        ));
    }

    #[test]
    fn configured_regions_report_independent_levels() {
        // Two disjoint regions; all stub detections land in the left half
        let mut config = test_config();
        config.congestion.moderate_threshold = 2;
        config.congestion.heavy_threshold = 4;
        config.regions = vec![
            RegionConfig {
                name: "left".to_string(),
                polygon: vec![[0.0, 0.0], [32.0, 0.0], [32.0, 48.0], [0.0, 48.0]],
            },
            RegionConfig {
                name: "right".to_string(),
                polygon: vec![[33.0, 0.0], [64.0, 0.0], [64.0, 48.0], [33.0, 48.0]],
            },
        ];

        // 4 observations at x in {0, 8, 16, 24}: centers all below x=32
        let engine = StubEngine {
            counts: vec![4],
            fail_at: None,
        };
        let mut pipeline = CongestionPipeline::new(engine, &config).unwrap();
        pipeline.begin(TEST_W as f32, TEST_H as f32).unwrap();

        let frame = Frame {
            data: vec![100; TEST_W * TEST_H * 3],
            width: TEST_W,
            height: TEST_H,
            index: 0,
        };
        let (_, levels) = pipeline.process_frame(&frame).unwrap();
        assert_eq!(levels, vec![CongestionLevel::Heavy, CongestionLevel::Smooth]);
    }
}
