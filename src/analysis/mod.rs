// src/analysis/mod.rs

pub mod congestion;
pub mod regions;
pub mod track_history;

pub use congestion::CongestionLevel;
pub use regions::Region;
pub use track_history::TrackHistoryStore;
