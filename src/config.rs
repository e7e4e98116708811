// src/config.rs

use std::fs;

use crate::error::PipelineError;
use crate::types::Config;

impl Config {
    pub fn load(path: &str) -> Result<Self, PipelineError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| PipelineError::Config(format!("cannot read {}: {}", path, e)))?;
        let config: Config = serde_yaml::from_str(&contents)
            .map_err(|e| PipelineError::Config(format!("cannot parse {}: {}", path, e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects invalid configurations before any frame is processed.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.congestion.moderate_threshold > self.congestion.heavy_threshold {
            return Err(PipelineError::Config(format!(
                "moderate_threshold ({}) must be <= heavy_threshold ({})",
                self.congestion.moderate_threshold, self.congestion.heavy_threshold
            )));
        }

        let floor = self.detection.confidence_floor;
        if !(0.0..=1.0).contains(&floor) {
            return Err(PipelineError::Config(format!(
                "confidence_floor must be in [0, 1], got {}",
                floor
            )));
        }

        if self.detection.classes.is_empty() {
            return Err(PipelineError::Config(
                "detection.classes must list at least one class id".to_string(),
            ));
        }

        for region in &self.regions {
            if region.polygon.len() < 3 {
                return Err(PipelineError::Config(format!(
                    "region '{}' has {} vertices, need at least 3",
                    region.name,
                    region.polygon.len()
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::types::*;

    fn base_config() -> Config {
        Config {
            model: ModelConfig {
                path: "models/yolov8n.onnx".to_string(),
                input_size: 640,
            },
            detection: DetectionConfig {
                classes: vec![2, 3, 5, 7],
                confidence_floor: 0.15,
                strategy: TrackerStrategy::Bot,
            },
            congestion: CongestionConfig {
                moderate_threshold: 10,
                heavy_threshold: 15,
            },
            regions: Vec::new(),
            video: VideoConfig {
                input_dir: "videos".to_string(),
                output_dir: "output".to_string(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }

    #[test]
    fn accepts_default_thresholds() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn rejects_inverted_thresholds() {
        let mut config = base_config();
        config.congestion.moderate_threshold = 20;
        config.congestion.heavy_threshold = 15;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_degenerate_region() {
        let mut config = base_config();
        config.regions.push(RegionConfig {
            name: "sliver".to_string(),
            polygon: vec![[0.0, 0.0], [10.0, 10.0]],
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_out_of_range_floor() {
        let mut config = base_config();
        config.detection.confidence_floor = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_strategy_fails_at_parse() {
        let yaml = r#"
model:
  path: models/yolov8n.onnx
detection:
  classes: [2, 3, 5, 7]
  strategy: kalman
congestion: {}
video:
  input_dir: videos
  output_dir: output
logging:
  level: info
"#;
        let parsed: Result<Config, _> = serde_yaml::from_str(yaml);
        assert!(parsed.is_err());
    }

    #[test]
    fn strategy_names_round_trip() {
        let yaml = r#"
model:
  path: models/yolov8n.onnx
detection:
  classes: [2]
  strategy: byte
congestion: {}
video:
  input_dir: videos
  output_dir: output
logging:
  level: info
"#;
        let parsed: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(parsed.detection.strategy, TrackerStrategy::Byte);
        assert_eq!(parsed.congestion.moderate_threshold, 10);
        assert_eq!(parsed.congestion.heavy_threshold, 15);
    }
}
