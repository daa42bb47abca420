//! # Network Simplification
//!
//! Reduces point density segment by segment with Ramer-Douglas-Peucker while
//! keeping the graph connected. Within a free segment every run of dropped points
//! is replaced by a single edge between the retained points around it, carrying
//! the run's track set.
//!
//! Segment ends are always retained, so track ends and crossings survive.

use geo::{LineString, SimplifyIdx};
use log::{debug, info};

use crate::geo_utils::project_local;
use crate::index::Location;
use crate::store::{Edge, GraphStore};
use crate::{EdgeKey, GpsPoint, LocationId, NetError, Result};

/// Indices of the points kept by Douglas-Peucker at `tolerance` meters.
///
/// Points are projected onto a local metric plane around the first point, so
/// the tolerance is a perpendicular distance in meters. The first and last
/// indices are always kept. Paths shorter than 3 points are returned whole.
///
/// # Example
/// ```
/// use geonet::{GpsPoint, simplify_path};
///
/// let points = vec![
///     GpsPoint::new(50.000, 14.0),
///     GpsPoint::new(50.001, 14.00001),
///     GpsPoint::new(50.002, 14.0),
/// ];
/// assert_eq!(simplify_path(&points, 10.0), vec![0, 2]);
/// ```
pub fn simplify_path(points: &[GpsPoint], tolerance: f64) -> Vec<usize> {
    if points.len() < 3 {
        return (0..points.len()).collect();
    }
    let line = LineString::from(project_local(points));
    line.simplify_idx(&tolerance)
}

impl GraphStore {
    /// Simplify every free segment at `simplify_min_distance` meters.
    pub fn simplify(&mut self) -> Result<()> {
        let tolerance = self.config.simplify_min_distance;
        let locations_before = self.location_count();
        let edges_before = self.edge_count();

        self.reset_processed();
        loop {
            let path = self.next_free_segment()?;
            if path.len() < 2 {
                break;
            }
            self.stats.segments_processed += 1;

            let points = self.path_points(&path)?;
            let retained = simplify_path(&points, tolerance);
            if self.adapt_edges(&path, &retained)? {
                self.stats.segments_simplified += 1;
            }
        }

        info!(
            "[Simplify] tolerance {}m: {} -> {} locations, {} -> {} edges",
            tolerance,
            locations_before,
            self.location_count(),
            edges_before,
            self.edge_count()
        );
        Ok(())
    }

    fn path_points(&self, path: &[LocationId]) -> Result<Vec<GpsPoint>> {
        path.iter()
            .enumerate()
            .map(|(i, &id)| {
                let neighbour = if i == 0 { path[1] } else { path[i - 1] };
                self.index
                    .get(id)
                    .map(Location::point)
                    .ok_or(NetError::MissingEndpoint {
                        edge: EdgeKey::new(neighbour, id),
                        location: id,
                    })
            })
            .collect()
    }

    /// Collapse every gap between consecutive retained indices of `path`.
    /// Returns whether anything was collapsed.
    fn adapt_edges(&mut self, path: &[LocationId], retained: &[usize]) -> Result<bool> {
        let mut collapsed = false;
        for pair in retained.windows(2) {
            let (from, to) = (pair[0], pair[1]);
            if to - from >= 2 {
                self.collapse_chain(&path[from..=to])?;
                collapsed = true;
            }
        }
        Ok(collapsed)
    }

    /// Replace the edges along `chain` with one edge between its ends and drop the
    /// interior locations.
    ///
    /// Every chain edge must exist; otherwise nothing is modified.
    fn collapse_chain(&mut self, chain: &[LocationId]) -> Result<()> {
        let (begin, end) = match chain {
            [begin, .., end] if chain.len() >= 3 => (*begin, *end),
            _ => return Ok(()),
        };

        let keys: Vec<EdgeKey> = chain
            .windows(2)
            .map(|pair| EdgeKey::new(pair[0], pair[1]))
            .collect();
        if let Some(missing) = keys.iter().find(|key| !self.edges.contains_key(key)) {
            return Err(NetError::InconsistentChain { edge: *missing });
        }

        let key = EdgeKey::new(begin, end);
        for id in [begin, end] {
            if !self.index.contains(id) {
                return Err(NetError::MissingEndpoint { edge: key, location: id });
            }
        }

        let tracks = self
            .edges
            .get(&keys[0])
            .map(|edge| edge.tracks.clone())
            .unwrap_or_default();

        let removed = self.remove_edges(&keys);

        let mut replacement = Edge::new(key, tracks);
        replacement.processed = true;
        self.add_edge(replacement)?;

        let interior = &chain[1..chain.len() - 1];
        for &id in interior {
            self.remove_location(id);
        }

        debug!(
            "[Simplify] collapsed {} points into edge {}",
            interior.len(),
            key
        );
        self.stats.points_simplified += interior.len() as u64;
        self.stats.edges_simplified += removed as u64;
        Ok(())
    }
}
