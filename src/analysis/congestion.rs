// src/analysis/congestion.rs
//
// Ordinal congestion classification from a per-region occupant count.

use std::fmt;

/// Road condition for one region in one frame. Ordered: a higher count can
/// never map to a lower level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CongestionLevel {
    Smooth,
    Moderate,
    Heavy,
}

impl CongestionLevel {
    pub fn label(&self) -> &'static str {
        match self {
            CongestionLevel::Smooth => "smooth",
            CongestionLevel::Moderate => "moderate",
            CongestionLevel::Heavy => "heavy",
        }
    }
}

impl fmt::Display for CongestionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Pure threshold classification. Callers must have validated
/// `moderate_threshold <= heavy_threshold` at job start.
pub fn classify(count: usize, moderate_threshold: u32, heavy_threshold: u32) -> CongestionLevel {
    if count >= heavy_threshold as usize {
        CongestionLevel::Heavy
    } else if count >= moderate_threshold as usize {
        CongestionLevel::Moderate
    } else {
        CongestionLevel::Smooth
    }
}
