//! # Snapshots
//!
//! Serializable state of a [`GraphStore`]: tracks, edges, locations and the id
//! sequences. Adjacency and traversal flags are not stored; loading rebuilds
//! adjacency by re-adding every edge, so a snapshot whose edges reference missing
//! locations is rejected.
//!
//! The stream format is JSON:
//!
//! ```json
//! {
//!   "tracks": [{ "id": 1, "meta": { "sourceid": "", "title": "t1", "url": "", "creators": [] } }],
//!   "edges": [{ "id": [1, 2], "tracks": [1] }],
//!   "locations": [{ "id": 1, "lat": 50.0, "lng": 14.0, "tracks": [1], "begin": true, "end": false, "crossing": false }],
//!   "last-point-id": 2,
//!   "last-track-id": 1
//! }
//! ```

use std::io::{Read, Write};

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::index::Location;
use crate::store::{Edge, GraphStore, IdSequence, Track};
use crate::{LocationId, NetConfig, NetError, Result, TrackId};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub tracks: Vec<Track>,
    #[serde(default)]
    pub edges: Vec<Edge>,
    #[serde(default)]
    pub locations: Vec<Location>,
    #[serde(rename = "last-point-id", default)]
    pub last_point_id: LocationId,
    #[serde(rename = "last-track-id", default)]
    pub last_track_id: TrackId,
}

impl GraphStore {
    /// Capture the current state, every collection ordered by id.
    pub fn to_snapshot(&self) -> Snapshot {
        let locations = self
            .index
            .locations()
            .map(|location| {
                let mut location = location.clone();
                location.edges.clear();
                location.processed = false;
                location
            })
            .collect();
        let edges = self
            .edges
            .values()
            .map(|edge| Edge::new(edge.id, edge.tracks.clone()))
            .collect();

        Snapshot {
            tracks: self.tracks.values().cloned().collect(),
            edges,
            locations,
            last_point_id: self.point_ids.last(),
            last_track_id: self.track_ids.last(),
        }
    }

    /// Rebuild a store from a snapshot.
    ///
    /// Locations are indexed first, then every edge goes through [`add_edge`], which
    /// restores adjacency and crossings. Id sequences continue after the larger of
    /// the recorded last id and the highest id present.
    ///
    /// [`add_edge`]: GraphStore::add_edge
    pub fn from_snapshot(config: NetConfig, snapshot: Snapshot) -> Result<Self> {
        let Snapshot {
            tracks,
            edges,
            locations,
            last_point_id,
            last_track_id,
        } = snapshot;

        let mut store = GraphStore::new(config);

        store.stats.tracks_loaded = tracks.len() as u64;
        for track in tracks {
            store.tracks.insert(track.id, track);
        }

        store.stats.points_loaded = locations.len() as u64;
        for mut location in locations {
            location.edges.clear();
            location.processed = false;
            store.index.insert(location);
        }

        store.stats.edges_loaded = edges.len() as u64;
        for mut edge in edges {
            edge.processed = false;
            store.add_edge(edge)?;
        }

        let max_location = store.index.locations().map(|l| l.id).max().unwrap_or(0);
        let max_track = store.tracks.keys().next_back().copied().unwrap_or(0);
        if last_point_id < max_location || last_track_id < max_track {
            warn!(
                "[Snapshot] recorded last ids ({}, {}) are behind stored ids ({}, {})",
                last_point_id, last_track_id, max_location, max_track
            );
        }
        store.point_ids = IdSequence::starting_after(last_point_id.max(max_location));
        store.track_ids = IdSequence::starting_after(last_track_id.max(max_track));

        info!(
            "[Snapshot] loaded {} tracks, {} locations, {} edges",
            store.stats.tracks_loaded, store.stats.points_loaded, store.stats.edges_loaded
        );
        Ok(store)
    }

    /// Write the snapshot as pretty-printed JSON.
    pub fn save<W: Write>(&self, writer: W) -> Result<()> {
        let snapshot = self.to_snapshot();
        serde_json::to_writer_pretty(writer, &snapshot).map_err(NetError::SaveWrite)?;
        info!(
            "[Snapshot] saved {} tracks, {} locations, {} edges",
            snapshot.tracks.len(),
            snapshot.locations.len(),
            snapshot.edges.len()
        );
        Ok(())
    }

    /// Read a JSON snapshot and rebuild the store from it.
    ///
    /// # Example
    /// ```
    /// use geonet::{GpsPoint, GraphStore, NetConfig, TrackMeta};
    ///
    /// let points = vec![GpsPoint::new(50.0, 14.0), GpsPoint::new(50.002, 14.0)];
    /// let mut store = GraphStore::new(NetConfig::default());
    /// store.add_track(TrackMeta::titled("short"), &points).unwrap();
    ///
    /// let mut buffer = Vec::new();
    /// store.save(&mut buffer).unwrap();
    ///
    /// let restored = GraphStore::load(NetConfig::default(), buffer.as_slice()).unwrap();
    /// assert_eq!(restored.edge_count(), 1);
    /// assert_eq!(restored.last_location_id(), 2);
    /// ```
    pub fn load<R: Read>(config: NetConfig, reader: R) -> Result<Self> {
        let snapshot: Snapshot = serde_json::from_reader(reader).map_err(NetError::LoadParse)?;
        Self::from_snapshot(config, snapshot)
    }
}
