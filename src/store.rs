//! # Graph Store
//!
//! Owns every location (through the [`SpatialIndex`]), every edge and the track
//! registry. Locations and edges refer to each other only by id: a location's
//! adjacency maps neighbour ids to [`EdgeKey`]s, and an edge names its endpoints
//! through its key.
//!
//! ## Ingestion
//!
//! Tracks are folded onto the graph point by point:
//! 1. The closest location within `match_max_distance` is reused, otherwise a new
//!    location is created
//! 2. Consecutive distinct locations are joined by an edge, reusing an existing
//!    edge between the same pair
//! 3. A location whose degree exceeds 2 becomes a crossing (never cleared)

use std::collections::{BTreeMap, BTreeSet};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::index::{Location, SpatialIndex};
use crate::stats::NetStats;
use crate::{EdgeKey, GpsPoint, LocationId, NetConfig, NetError, Result, TrackId};

/// An undirected connection between two locations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeKey,
    /// Tracks that traverse this edge
    pub tracks: BTreeSet<TrackId>,
    /// Traversal flag, reset before each segmentation pass
    #[serde(skip)]
    pub processed: bool,
}

impl Edge {
    pub fn new(id: EdgeKey, tracks: BTreeSet<TrackId>) -> Self {
        Self {
            id,
            tracks,
            processed: false,
        }
    }
}

/// Metadata supplied with a track. Opaque to the network itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackMeta {
    #[serde(rename = "sourceid")]
    pub source_id: String,
    pub title: String,
    pub url: String,
    pub creators: Vec<String>,
}

impl TrackMeta {
    /// Metadata with only a title set.
    pub fn titled(title: &str) -> Self {
        Self {
            title: title.to_string(),
            ..Default::default()
        }
    }
}

/// A registered track. Its geometry lives in the network, not here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub id: TrackId,
    pub meta: TrackMeta,
}

/// Monotonic id generator scoped to one store.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct IdSequence {
    last: u64,
}

impl IdSequence {
    pub(crate) fn starting_after(last: u64) -> Self {
        Self { last }
    }

    pub(crate) fn next_id(&mut self) -> u64 {
        self.last += 1;
        self.last
    }

    pub(crate) fn last(&self) -> u64 {
        self.last
    }
}

/// The network: spatial index of locations, flat edge map and track registry.
#[derive(Debug, Clone)]
pub struct GraphStore {
    pub(crate) config: NetConfig,
    pub(crate) index: SpatialIndex,
    pub(crate) edges: BTreeMap<EdgeKey, Edge>,
    pub(crate) tracks: BTreeMap<TrackId, Track>,
    pub(crate) point_ids: IdSequence,
    pub(crate) track_ids: IdSequence,
    pub(crate) stats: NetStats,
}

impl GraphStore {
    /// Create an empty store. The index cell level is taken from `config` and fixed
    /// from now on.
    pub fn new(config: NetConfig) -> Self {
        let index = SpatialIndex::new(config.cell_level);
        Self {
            config,
            index,
            edges: BTreeMap::new(),
            tracks: BTreeMap::new(),
            point_ids: IdSequence::default(),
            track_ids: IdSequence::default(),
            stats: NetStats::default(),
        }
    }

    // ------------------------------------------------------------------------
    // Ingestion
    // ------------------------------------------------------------------------

    /// Fold a track onto the network and return its id.
    ///
    /// Points with invalid coordinates are skipped; `begin`/`end` flags refer to the
    /// first and last valid point.
    ///
    /// # Example
    /// ```
    /// use geonet::{GpsPoint, GraphStore, NetConfig, TrackMeta};
    ///
    /// let mut store = GraphStore::new(NetConfig::default());
    /// let points = vec![
    ///     GpsPoint::new(50.000, 14.0),
    ///     GpsPoint::new(50.002, 14.0),
    ///     GpsPoint::new(50.004, 14.0),
    /// ];
    ///
    /// let id = store.add_track(TrackMeta::titled("ridge"), &points).unwrap();
    /// assert_eq!(id, 1);
    /// assert_eq!(store.location_count(), 3);
    /// assert_eq!(store.edge_count(), 2);
    /// ```
    pub fn add_track(&mut self, meta: TrackMeta, points: &[GpsPoint]) -> Result<TrackId> {
        let track_id = self.track_ids.next_id();
        debug!("[GraphStore] registering track {} ({})", track_id, meta.title);
        self.tracks.insert(track_id, Track { id: track_id, meta });
        self.stats.tracks_processed += 1;

        let valid: Vec<&GpsPoint> = points.iter().filter(|p| p.is_valid()).collect();
        if valid.len() < points.len() {
            warn!(
                "[GraphStore] track {}: skipped {} points with invalid coordinates",
                track_id,
                points.len() - valid.len()
            );
        }

        let mut previous: Option<LocationId> = None;
        for (i, point) in valid.iter().enumerate() {
            self.stats.points_processed += 1;
            let is_begin = i == 0;
            let is_end = i == valid.len() - 1;

            let current = self.resolve_location(point, track_id, is_begin, is_end);

            // Repeated matches of the same location produce no self-edge
            if let Some(prev) = previous.filter(|&prev| prev != current) {
                self.link(prev, current, track_id)?;
            }
            previous = Some(current);
        }

        info!(
            "[GraphStore] track {} ingested: {} points, network has {} locations and {} edges",
            track_id,
            valid.len(),
            self.index.len(),
            self.edges.len()
        );
        Ok(track_id)
    }

    /// Reuse the closest location within the match radius or create a new one.
    fn resolve_location(
        &mut self,
        point: &GpsPoint,
        track_id: TrackId,
        is_begin: bool,
        is_end: bool,
    ) -> LocationId {
        let nearest = self
            .index
            .nearest(point.latitude, point.longitude, self.config.match_max_distance)
            .first()
            .map(|n| (n.location.id, n.distance_meters));

        if let Some((id, distance)) = nearest {
            if let Some(location) = self.index.get_mut(id) {
                debug!("[GraphStore] reusing point {} {:.1}m", id, distance);
                location.begin |= is_begin;
                location.end |= is_end;
                location.tracks.insert(track_id);
                self.stats.points_reused += 1;
                return id;
            }
        }

        let id = self.point_ids.next_id();
        debug!("[GraphStore] adding point {}", id);
        let mut location = Location::new(id, point.latitude, point.longitude);
        location.begin = is_begin;
        location.end = is_end;
        location.tracks.insert(track_id);
        self.index.insert(location);
        self.stats.points_created += 1;
        id
    }

    /// Record that `track_id` moved from `from` to `to`.
    fn link(&mut self, from: LocationId, to: LocationId, track_id: TrackId) -> Result<()> {
        let key = EdgeKey::new(from, to);
        if let Some(edge) = self.edges.get_mut(&key) {
            debug!("[GraphStore] reusing existing edge {}", key);
            edge.tracks.insert(track_id);
            self.stats.edges_reused += 1;
            return Ok(());
        }

        debug!("[GraphStore] registering new edge {}", key);
        self.add_edge(Edge::new(key, BTreeSet::from([track_id])))?;
        self.stats.edges_created += 1;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Consistency primitives
    // ------------------------------------------------------------------------

    /// Register an edge in the flat map and in both endpoints' adjacency, then
    /// recompute crossings.
    ///
    /// An edge with the same key already in the store absorbs `edge.tracks`.
    /// Fails without modifying anything if an endpoint is missing or both ends are
    /// the same location.
    pub fn add_edge(&mut self, edge: Edge) -> Result<()> {
        let key = edge.id;
        if key.is_loop() {
            return Err(NetError::SelfEdge { edge: key });
        }
        for location in [key.first(), key.second()] {
            if !self.index.contains(location) {
                return Err(NetError::MissingEndpoint { edge: key, location });
            }
        }

        match self.edges.get_mut(&key) {
            Some(existing) => existing.tracks.extend(edge.tracks),
            None => {
                self.edges.insert(key, edge);
            }
        }

        for (at, neighbour) in [(key.first(), key.second()), (key.second(), key.first())] {
            if let Some(location) = self.index.get_mut(at) {
                location.edges.insert(neighbour, key);
            }
        }

        self.update_crossing(key)
    }

    /// Remove edges from the flat map and from their endpoints' adjacency.
    ///
    /// Unknown keys are ignored. Returns the number of edges removed.
    pub fn remove_edges(&mut self, keys: &[EdgeKey]) -> usize {
        let mut removed = 0;
        for key in keys {
            if self.edges.remove(key).is_none() {
                continue;
            }
            removed += 1;
            for (at, neighbour) in [(key.first(), key.second()), (key.second(), key.first())] {
                if let Some(location) = self.index.get_mut(at) {
                    location.edges.remove(&neighbour);
                }
            }
        }
        removed
    }

    /// Remove a location together with any edges still attached to it.
    pub fn remove_location(&mut self, id: LocationId) -> Option<Location> {
        let attached: Vec<EdgeKey> = self.index.get(id)?.edges.values().copied().collect();
        if !attached.is_empty() {
            self.remove_edges(&attached);
        }
        self.index.remove(id)
    }

    /// Mark the endpoints of `key` as crossings when their degree exceeds 2.
    pub fn update_crossing(&mut self, key: EdgeKey) -> Result<()> {
        for id in [key.first(), key.second()] {
            let location = self
                .index
                .get_mut(id)
                .ok_or(NetError::MissingEndpoint { edge: key, location: id })?;
            if location.degree() > 2 && !location.crossing {
                debug!("[GraphStore] point {} became a crossing", id);
                location.crossing = true;
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    pub fn config(&self) -> &NetConfig {
        &self.config
    }

    pub fn index(&self) -> &SpatialIndex {
        &self.index
    }

    pub fn stats(&self) -> &NetStats {
        &self.stats
    }

    pub fn location(&self, id: LocationId) -> Option<&Location> {
        self.index.get(id)
    }

    /// All locations in ascending id order.
    pub fn locations(&self) -> impl Iterator<Item = &Location> {
        self.index.locations()
    }

    pub fn edge(&self, key: EdgeKey) -> Option<&Edge> {
        self.edges.get(&key)
    }

    /// All edges in ascending key order.
    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.values()
    }

    pub fn edges_filtered<F>(&self, filter: F) -> Vec<&Edge>
    where
        F: Fn(&Edge) -> bool,
    {
        self.edges.values().filter(|e| filter(e)).collect()
    }

    pub fn track(&self, id: TrackId) -> Option<&Track> {
        self.tracks.get(&id)
    }

    /// All registered tracks in ascending id order.
    pub fn tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.values()
    }

    pub fn location_count(&self) -> usize {
        self.index.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    /// Id given to the most recently created location (0 if none).
    pub fn last_location_id(&self) -> LocationId {
        self.point_ids.last()
    }

    /// Id given to the most recently registered track (0 if none).
    pub fn last_track_id(&self) -> TrackId {
        self.track_ids.last()
    }
}
