//! # Free Segments
//!
//! A free segment is a maximal simple path whose edges all carry the same track
//! set and whose interior locations are neither track ends nor crossings.
//! Segments are handed out one at a time by [`GraphStore::next_free_segment`];
//! every edge belongs to exactly one segment per pass.
//!
//! Traversal is driven by the `processed` flags of edges; locations carry the same
//! flag as a record of what a pass has visited. Call
//! [`GraphStore::reset_processed`] before starting a pass.

use std::collections::{BTreeSet, HashSet};

use log::debug;

use crate::store::GraphStore;
use crate::{EdgeKey, LocationId, NetError, Result, TrackId};

impl GraphStore {
    /// Clear the traversal flag on every location and edge.
    pub fn reset_processed(&mut self) {
        for location in self.index.locations_mut() {
            location.processed = false;
        }
        for edge in self.edges.values_mut() {
            edge.processed = false;
        }
    }

    /// Take the next unprocessed segment of the current pass.
    ///
    /// The segment is seeded from the unprocessed edge with the lowest key and grown
    /// from both of its ends. The path runs in the seed's direction, from its lower
    /// to its higher id. Returns an empty path once every edge is processed.
    ///
    /// # Example
    /// ```
    /// use geonet::{GpsPoint, GraphStore, NetConfig, TrackMeta};
    ///
    /// let points: Vec<GpsPoint> = (0..4)
    ///     .map(|i| GpsPoint::new(50.0 + i as f64 * 0.002, 14.0))
    ///     .collect();
    /// let mut store = GraphStore::new(NetConfig::default());
    /// store.add_track(TrackMeta::titled("line"), &points).unwrap();
    ///
    /// store.reset_processed();
    /// let segment = store.next_free_segment().unwrap();
    /// assert_eq!(segment.len(), 4);
    /// assert!(store.next_free_segment().unwrap().is_empty());
    /// ```
    pub fn next_free_segment(&mut self) -> Result<Vec<LocationId>> {
        let Some(seed) = self.edges.values_mut().find(|edge| !edge.processed) else {
            return Ok(Vec::new());
        };
        seed.processed = true;
        let key = seed.id;
        let tracks = seed.tracks.clone();

        for id in [key.first(), key.second()] {
            let location = self
                .index
                .get_mut(id)
                .ok_or(NetError::MissingEndpoint { edge: key, location: id })?;
            location.processed = true;
        }

        let mut path = vec![key.first(), key.second()];
        let mut visited: HashSet<LocationId> = path.iter().copied().collect();

        self.extend_segment(&mut path, &mut visited, &tracks)?;
        path.reverse();
        self.extend_segment(&mut path, &mut visited, &tracks)?;
        path.reverse();

        debug!(
            "[Segmentation] segment from edge {}: {} points",
            key,
            path.len()
        );
        Ok(path)
    }

    /// Grow `path` from its last location until it hits a stopping point.
    fn extend_segment(
        &mut self,
        path: &mut Vec<LocationId>,
        visited: &mut HashSet<LocationId>,
        tracks: &BTreeSet<TrackId>,
    ) -> Result<()> {
        while let Some((next, key)) = self.next_point(path, visited, tracks)? {
            if let Some(edge) = self.edges.get_mut(&key) {
                edge.processed = true;
            }
            if let Some(location) = self.index.get_mut(next) {
                location.processed = true;
            }
            visited.insert(next);
            path.push(next);
        }
        Ok(())
    }

    /// Pick the location that continues `path`, if any.
    ///
    /// Only unprocessed edges with exactly `tracks` lead anywhere. An ordinary
    /// neighbour is preferred (lowest id first); otherwise the segment closes on a
    /// special neighbour.
    fn next_point(
        &self,
        path: &[LocationId],
        visited: &HashSet<LocationId>,
        tracks: &BTreeSet<TrackId>,
    ) -> Result<Option<(LocationId, EdgeKey)>> {
        let (tail_id, previous) = match path {
            [.., previous, tail] => (*tail, *previous),
            _ => return Ok(None),
        };
        let tail = self.index.get(tail_id).ok_or(NetError::MissingEndpoint {
            edge: EdgeKey::new(previous, tail_id),
            location: tail_id,
        })?;
        if tail.is_special() {
            return Ok(None);
        }

        let mut closing = None;
        for (&neighbour, &key) in &tail.edges {
            if visited.contains(&neighbour) {
                continue;
            }
            let edge = self.edges.get(&key).ok_or(NetError::MissingEdge {
                location: tail_id,
                edge: key,
            })?;
            if edge.processed || edge.tracks != *tracks {
                continue;
            }
            let next = self.index.get(neighbour).ok_or(NetError::MissingEndpoint {
                edge: key,
                location: neighbour,
            })?;
            if !next.is_special() {
                return Ok(Some((neighbour, key)));
            }
            if closing.is_none() {
                closing = Some((neighbour, key));
            }
        }
        Ok(closing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::{crossing_store, straight_track};
    use crate::{NetConfig, TrackMeta};

    /// Drain one pass, with each segment oriented from its lower end id.
    fn all_segments(store: &mut GraphStore) -> Vec<Vec<LocationId>> {
        store.reset_processed();
        let mut segments = Vec::new();
        loop {
            let mut segment = store.next_free_segment().unwrap();
            if segment.len() < 2 {
                break;
            }
            if segment[0] > segment[segment.len() - 1] {
                segment.reverse();
            }
            segments.push(segment);
        }
        segments.sort();
        segments
    }

    #[test]
    fn test_single_track_is_one_segment() {
        let mut store = GraphStore::new(NetConfig::default());
        store.add_track(TrackMeta::titled("t1"), &straight_track(7)).unwrap();

        let segments = all_segments(&mut store);
        assert_eq!(segments, vec![vec![1, 2, 3, 4, 5, 6, 7]]);
    }

    #[test]
    fn test_two_point_track() {
        let mut store = GraphStore::new(NetConfig::default());
        store.add_track(TrackMeta::titled("short"), &straight_track(2)).unwrap();

        assert_eq!(all_segments(&mut store), vec![vec![1, 2]]);
    }

    #[test]
    fn test_empty_store_has_no_segments() {
        let mut store = GraphStore::new(NetConfig::default());
        store.reset_processed();
        assert!(store.next_free_segment().unwrap().is_empty());
    }

    #[test]
    fn test_segments_split_at_crossings() {
        let mut store = crossing_store();
        let segments = all_segments(&mut store);

        assert_eq!(
            segments,
            vec![
                vec![1, 2, 3, 4],
                vec![4, 5],
                vec![4, 8],
                vec![5, 6, 7],
                vec![5, 9, 10],
            ]
        );
    }

    #[test]
    fn test_segments_partition_edges() {
        let mut store = crossing_store();
        let segments = all_segments(&mut store);

        let edge_total: usize = segments.iter().map(|s| s.len() - 1).sum();
        assert_eq!(edge_total, store.edge_count());

        let mut seen = BTreeSet::new();
        for segment in &segments {
            for pair in segment.windows(2) {
                assert!(seen.insert(EdgeKey::new(pair[0], pair[1])));
            }
            for id in &segment[1..segment.len() - 1] {
                assert!(!store.location(*id).unwrap().is_special());
            }
        }
        assert!(store.edges().all(|e| e.processed));
    }

    #[test]
    fn test_segment_follows_seed_direction() {
        let mut store = crossing_store();
        store.reset_processed();

        assert_eq!(store.next_free_segment().unwrap(), vec![1, 2, 3, 4]);
        assert_eq!(store.next_free_segment().unwrap(), vec![4, 5]);
        assert_eq!(store.next_free_segment().unwrap(), vec![4, 8]);
    }

    #[test]
    fn test_pass_marks_visited_locations() {
        let mut store = crossing_store();
        store.reset_processed();
        assert!(store.locations().all(|l| !l.processed));

        store.next_free_segment().unwrap();
        let visited: Vec<LocationId> = store
            .locations()
            .filter(|l| l.processed)
            .map(|l| l.id)
            .collect();
        assert_eq!(visited, vec![1, 2, 3, 4]);

        all_segments(&mut store);
        assert!(store.locations().all(|l| l.processed));
    }

    #[test]
    fn test_reset_starts_a_new_pass() {
        let mut store = crossing_store();
        let first = all_segments(&mut store);
        let second = all_segments(&mut store);
        assert_eq!(first, second);
    }

    #[test]
    fn test_dangling_adjacency_is_reported() {
        let mut store = GraphStore::new(NetConfig::default());
        store.add_track(TrackMeta::titled("t1"), &straight_track(3)).unwrap();
        store
            .index
            .get_mut(2)
            .unwrap()
            .edges
            .insert(0, EdgeKey::new(0, 2));

        store.reset_processed();
        let result = store.next_free_segment();
        assert!(matches!(
            result,
            Err(NetError::MissingEdge { location: 2, .. })
        ));
    }
}
