// src/error.rs
//
// Error taxonomy for the congestion pipeline. Every category aborts the
// whole job; malformed per-frame observations are the one recoverable case
// and are normalized by the detection adapter instead of being propagated.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// Invalid thresholds, malformed region, bad confidence floor.
    /// Raised before any frame is processed.
    #[error("configuration error: {0}")]
    Config(String),

    /// Source unreadable or sink unwritable. Fatal.
    #[error("video I/O error: {0}")]
    Io(String),

    /// The detector/tracker engine failed hard (not merely "no detections").
    /// Fatal, no per-frame retry.
    #[error("detection engine error: {0}")]
    Engine(String),
}
