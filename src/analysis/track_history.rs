// src/analysis/track_history.rs
//
// Per-track bounded trajectory buffer used for trail rendering. A track is
// created on first observation of its id and never removed for the rest of
// the job; only the fixed-length eviction trims points. For very long
// inputs this grows with the number of distinct ids seen.

use std::collections::{hash_map::Entry, HashMap, VecDeque};

/// Maximum trail points kept per track, oldest evicted first.
pub const TRAIL_CAPACITY: usize = 15;

#[derive(Debug, Default)]
pub struct TrackHistoryStore {
    tracks: HashMap<u64, VecDeque<(f32, f32)>>,
}

impl TrackHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push the current center point for a track, evicting the oldest point
    /// once the trail exceeds `TRAIL_CAPACITY`.
    pub fn append(&mut self, track_id: u64, point: (f32, f32)) {
        let trail = match self.tracks.entry(track_id) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(VecDeque::with_capacity(TRAIL_CAPACITY + 1)),
        };
        trail.push_back(point);
        if trail.len() > TRAIL_CAPACITY {
            trail.pop_front();
        }
    }

    /// Trail points in arrival order, empty for an unseen id.
    pub fn history(&self, track_id: u64) -> impl Iterator<Item = (f32, f32)> + '_ {
        self.tracks
            .get(&track_id)
            .into_iter()
            .flat_map(|trail| trail.iter().copied())
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unseen_track_has_empty_history() {
        let store = TrackHistoryStore::new();
        assert_eq!(store.history(7).count(), 0);
    }

    #[test]
    fn points_arrive_in_order() {
        let mut store = TrackHistoryStore::new();
        for i in 0..5 {
            store.append(1, (i as f32, i as f32 * 2.0));
        }
        let trail: Vec<_> = store.history(1).collect();
        assert_eq!(trail.len(), 5);
        assert_eq!(trail[0], (0.0, 0.0));
        assert_eq!(trail[4], (4.0, 8.0));
    }

    #[test]
    fn trail_never_exceeds_capacity() {
        let mut store = TrackHistoryStore::new();
        for i in 0..100 {
            store.append(3, (i as f32, 0.0));
            assert!(store.history(3).count() <= TRAIL_CAPACITY);
        }
        // Always reflects the most recent points in arrival order
        let trail: Vec<_> = store.history(3).collect();
        assert_eq!(trail.len(), TRAIL_CAPACITY);
        assert_eq!(trail[0], (85.0, 0.0));
        assert_eq!(trail[TRAIL_CAPACITY - 1], (99.0, 0.0));
    }

    #[test]
    fn tracks_are_independent() {
        let mut store = TrackHistoryStore::new();
        store.append(1, (1.0, 1.0));
        store.append(2, (2.0, 2.0));
        store.append(1, (3.0, 3.0));

        assert_eq!(store.history(1).count(), 2);
        assert_eq!(store.history(2).count(), 1);
        assert_eq!(store.track_count(), 2);
    }
}
