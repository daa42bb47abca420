//! # Export
//!
//! Read-out of the network as geometry features with track attribution. Which
//! features are produced depends on [`NetConfig`](crate::NetConfig):
//!
//! | Flags | Output |
//! |-------|--------|
//! | `show_points` | one [`PointFeature`] per location |
//! | `show_edges` | one two-vertex [`LineFeature`] per edge |
//! | `show_edges` + `merge_edges` | one [`LineFeature`] per free segment |
//!
//! Coordinates follow `geo` conventions: x is longitude, y is latitude.

use std::collections::BTreeSet;

use geo::{Coord, LineString, Point};
use log::{debug, info};

use crate::store::GraphStore;
use crate::{EdgeKey, LocationId, NetError, Result, TrackId};

/// Merged lines with at least this many points are named by their ends only.
const MAX_LISTED_IDS: usize = 10;

/// A location as exported.
#[derive(Debug, Clone, PartialEq)]
pub struct PointFeature {
    pub id: LocationId,
    pub point: Point<f64>,
    pub tracks: BTreeSet<TrackId>,
    pub begin: bool,
    pub end: bool,
    pub crossing: bool,
}

/// An edge, or a whole free segment when edges are merged.
#[derive(Debug, Clone, PartialEq)]
pub struct LineFeature {
    /// `"a-b"` for an edge, the joined location ids for a segment
    pub id: String,
    pub line: LineString<f64>,
    pub tracks: BTreeSet<TrackId>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Feature {
    Point(PointFeature),
    Line(LineFeature),
}

impl GraphStore {
    /// Export the network as features.
    ///
    /// Takes `&mut self` because merged export runs a segmentation pass and all
    /// modes update the render counters.
    ///
    /// # Example
    /// ```
    /// use geonet::{Feature, GpsPoint, GraphStore, NetConfig, TrackMeta};
    ///
    /// let points = vec![GpsPoint::new(50.0, 14.0), GpsPoint::new(50.002, 14.0)];
    /// let mut store = GraphStore::new(NetConfig::default());
    /// store.add_track(TrackMeta::titled("short"), &points).unwrap();
    ///
    /// let features = store.export().unwrap();
    /// assert_eq!(features.len(), 1);
    /// assert!(matches!(&features[0], Feature::Line(line) if line.id == "1-2"));
    /// ```
    pub fn export(&mut self) -> Result<Vec<Feature>> {
        self.stats.points_final = 0;
        self.stats.edges_final = 0;
        self.stats.edges_rendered = 0;
        self.stats.segments_rendered = 0;

        let mut features = Vec::new();

        if self.config.show_points {
            features.extend(self.index.locations().map(|location| {
                Feature::Point(PointFeature {
                    id: location.id,
                    point: Point::new(location.lng, location.lat),
                    tracks: location.tracks.clone(),
                    begin: location.begin,
                    end: location.end,
                    crossing: location.crossing,
                })
            }));
            self.stats.points_rendered = self.index.len() as u64;
            self.stats.points_final = self.index.len() as u64;
        }

        if self.config.show_edges {
            if self.config.merge_edges {
                self.export_segments(&mut features)?;
            } else {
                self.export_edges(&mut features)?;
            }
            self.stats.edges_final = self.edges.len() as u64;
        }

        info!(
            "[Export] {} features ({} points, {} edges, {} segments)",
            features.len(),
            self.stats.points_rendered,
            self.stats.edges_rendered,
            self.stats.segments_rendered
        );
        Ok(features)
    }

    fn export_edges(&mut self, features: &mut Vec<Feature>) -> Result<()> {
        for edge in self.edges.values() {
            let line = self.line_through(&[edge.id.first(), edge.id.second()])?;
            features.push(Feature::Line(LineFeature {
                id: edge.id.to_string(),
                line,
                tracks: edge.tracks.clone(),
            }));
            self.stats.edges_rendered += 1;
        }
        Ok(())
    }

    fn export_segments(&mut self, features: &mut Vec<Feature>) -> Result<()> {
        self.reset_processed();
        loop {
            let path = self.next_free_segment()?;
            if path.len() < 2 {
                break;
            }
            debug!("[Export] segment {:?}", path);

            let first_edge = EdgeKey::new(path[0], path[1]);
            let tracks = self
                .edges
                .get(&first_edge)
                .map(|edge| edge.tracks.clone())
                .ok_or(NetError::MissingEdge {
                    location: path[0],
                    edge: first_edge,
                })?;

            features.push(Feature::Line(LineFeature {
                id: segment_id(&path),
                line: self.line_through(&path)?,
                tracks,
            }));
            self.stats.segments_rendered += 1;
        }
        Ok(())
    }

    /// Line through the given locations, which must be consecutive neighbours.
    fn line_through(&self, path: &[LocationId]) -> Result<LineString<f64>> {
        let coords = path
            .iter()
            .enumerate()
            .map(|(i, &id)| {
                let neighbour = if i == 0 { path.get(1) } else { path.get(i - 1) };
                self.index
                    .get(id)
                    .map(|location| Coord {
                        x: location.lng,
                        y: location.lat,
                    })
                    .ok_or(NetError::MissingEndpoint {
                        edge: EdgeKey::new(neighbour.copied().unwrap_or(id), id),
                        location: id,
                    })
            })
            .collect::<Result<Vec<Coord<f64>>>>()?;
        Ok(LineString::new(coords))
    }
}

/// `"1-5-3"` for short paths, `"first-last"` for long ones.
fn segment_id(path: &[LocationId]) -> String {
    match path {
        [first, .., last] if path.len() >= MAX_LISTED_IDS => format!("{}-{}", first, last),
        _ => path
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join("-"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::{crossing_store, straight_track};
    use crate::{NetConfig, TrackMeta};

    fn lines(features: &[Feature]) -> Vec<&LineFeature> {
        features
            .iter()
            .filter_map(|f| match f {
                Feature::Line(line) => Some(line),
                Feature::Point(_) => None,
            })
            .collect()
    }

    #[test]
    fn test_segment_id() {
        assert_eq!(segment_id(&[1, 5, 3]), "1-5-3");
        assert_eq!(segment_id(&(1..=9).collect::<Vec<_>>()), "1-2-3-4-5-6-7-8-9");
        assert_eq!(segment_id(&(1..=10).collect::<Vec<_>>()), "1-10");
    }

    #[test]
    fn test_flat_export() {
        let mut store = crossing_store();
        let features = store.export().unwrap();

        let lines = lines(&features);
        assert_eq!(lines.len(), 9);
        assert!(lines.iter().all(|l| l.line.0.len() == 2));
        assert_eq!(lines[0].id, "1-2");
        assert_eq!(store.stats().edges_rendered, 9);
        assert_eq!(store.stats().edges_final, 9);
        assert_eq!(store.stats().points_rendered, 0);
    }

    #[test]
    fn test_flat_export_geometry() {
        let mut store = GraphStore::new(NetConfig::default());
        store.add_track(TrackMeta::titled("t1"), &straight_track(2)).unwrap();

        let features = store.export().unwrap();
        let line = lines(&features)[0];
        assert_eq!(line.line.0[0], Coord { x: 14.0, y: 50.0 });
        assert_eq!(line.tracks, BTreeSet::from([1]));
    }

    #[test]
    fn test_point_export() {
        let mut store = crossing_store();
        store.config.show_points = true;
        store.config.show_edges = false;

        let features = store.export().unwrap();
        assert_eq!(features.len(), 10);
        let crossings: Vec<LocationId> = features
            .iter()
            .filter_map(|f| match f {
                Feature::Point(p) if p.crossing => Some(p.id),
                _ => None,
            })
            .collect();
        assert_eq!(crossings, vec![4, 5]);
        assert_eq!(store.stats().points_rendered, 10);
        assert_eq!(store.stats().points_final, 10);
        assert_eq!(store.stats().edges_final, 0);
    }

    #[test]
    fn test_merged_export() {
        let mut store = crossing_store();
        store.config.merge_edges = true;

        let features = store.export().unwrap();
        let lines = lines(&features);

        assert_eq!(lines.len(), 5);
        assert_eq!(store.stats().segments_rendered, 5);
        let vertices: usize = lines.iter().map(|l| l.line.0.len() - 1).sum();
        assert_eq!(vertices, store.edge_count());

        let shared = lines.iter().find(|l| l.id == "4-5").unwrap();
        assert_eq!(shared.tracks, BTreeSet::from([1, 2]));
        let branch = lines.iter().find(|l| l.id == "5-9-10").unwrap();
        assert_eq!(branch.tracks, BTreeSet::from([2]));
    }

    #[test]
    fn test_merged_export_long_segment_id() {
        let mut store = GraphStore::new(NetConfig {
            merge_edges: true,
            ..Default::default()
        });
        store.add_track(TrackMeta::titled("long"), &straight_track(12)).unwrap();

        let features = store.export().unwrap();
        let lines = lines(&features);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].id, "1-12");
        assert_eq!(lines[0].line.0.len(), 12);
    }

    #[test]
    fn test_export_missing_endpoint() {
        let mut store = GraphStore::new(NetConfig::default());
        store.add_track(TrackMeta::titled("t1"), &straight_track(2)).unwrap();
        // Drop the location behind the store's back
        store.index.remove(2);

        let result = store.export();
        assert!(matches!(
            result,
            Err(NetError::MissingEndpoint { location: 2, .. })
        ));
    }

    #[test]
    fn test_repeated_export_does_not_accumulate() {
        let mut store = crossing_store();
        store.export().unwrap();
        store.export().unwrap();
        assert_eq!(store.stats().edges_rendered, 9);
    }
}
