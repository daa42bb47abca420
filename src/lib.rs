//! # Geonet
//!
//! Builds a deduplicated geographic network out of GPS tracks.
//!
//! Every ingested track is folded onto a shared graph: waypoints that fall within
//! `match_max_distance` of an existing location reuse it, consecutive waypoints
//! become edges, and every location and edge remembers which tracks touched it.
//!
//! This library provides:
//! - A fixed-level geodesic cell index for approximate radius search
//! - Track ingestion with point and edge deduplication
//! - Free-segment traversal (maximal simple paths between track ends and junctions)
//! - Douglas-Peucker simplification that keeps the network connected
//! - Flat or merged export of geometry with per-feature track attribution
//! - JSON snapshots that rebuild the graph exactly
//!
//! ## Quick Start
//!
//! ```rust
//! use geonet::{GpsPoint, GraphStore, NetConfig, TrackMeta};
//!
//! // Five points roughly 220m apart
//! let points: Vec<GpsPoint> = (0..5)
//!     .map(|i| GpsPoint::new(50.0 + i as f64 * 0.002, 14.0))
//!     .collect();
//!
//! let mut store = GraphStore::new(NetConfig::default());
//! store.add_track(TrackMeta::titled("morning"), &points).unwrap();
//! store.add_track(TrackMeta::titled("evening"), &points).unwrap();
//!
//! // The second track reused every location and edge
//! assert_eq!(store.location_count(), 5);
//! assert_eq!(store.edge_count(), 4);
//! assert_eq!(store.stats().points_reused, 5);
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

pub mod export;
pub mod geo_utils;
pub mod index;
pub mod segmentation;
pub mod simplify;
pub mod snapshot;
pub mod stats;
pub mod store;

pub use export::{Feature, LineFeature, PointFeature};
pub use index::{CellId, Location, NearestResult, SpatialIndex, MAX_CELL_LEVEL};
pub use simplify::simplify_path;
pub use snapshot::Snapshot;
pub use stats::NetStats;
pub use store::{Edge, GraphStore, Track, TrackMeta};

// ============================================================================
// Core Types
// ============================================================================

/// Identifier of a [`Location`], assigned by the owning [`GraphStore`].
pub type LocationId = u64;

/// Identifier of a [`Track`], assigned by the owning [`GraphStore`].
pub type TrackId = u64;

/// A GPS coordinate with latitude and longitude.
///
/// # Example
/// ```
/// use geonet::GpsPoint;
/// let point = GpsPoint::new(50.0755, 14.4378); // Prague
/// assert!(point.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GpsPoint {
    /// Create a new GPS point.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }
}

/// Canonical identity of an undirected edge.
///
/// The two location ids are always stored as `(min, max)`, so the key does not
/// depend on the direction a track moved along the edge.
///
/// ```
/// use geonet::EdgeKey;
/// assert_eq!(EdgeKey::new(7, 3), EdgeKey::new(3, 7));
/// assert_eq!(EdgeKey::new(7, 3).to_string(), "3-7");
/// ```
///
/// Deserialization goes through [`EdgeKey::new`], so `[2, 1]` reads as `1-2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "(LocationId, LocationId)")]
pub struct EdgeKey(LocationId, LocationId);

impl EdgeKey {
    pub fn new(a: LocationId, b: LocationId) -> Self {
        Self(a.min(b), a.max(b))
    }

    /// Smaller of the two endpoint ids.
    pub fn first(&self) -> LocationId {
        self.0
    }

    /// Larger of the two endpoint ids.
    pub fn second(&self) -> LocationId {
        self.1
    }

    /// The endpoint opposite to `id`, if `id` is one of the endpoints.
    pub fn other(&self, id: LocationId) -> Option<LocationId> {
        if id == self.0 {
            Some(self.1)
        } else if id == self.1 {
            Some(self.0)
        } else {
            None
        }
    }

    pub fn contains(&self, id: LocationId) -> bool {
        self.0 == id || self.1 == id
    }

    /// Both ends are the same location.
    pub fn is_loop(&self) -> bool {
        self.0 == self.1
    }
}

impl From<(LocationId, LocationId)> for EdgeKey {
    fn from((a, b): (LocationId, LocationId)) -> Self {
        Self::new(a, b)
    }
}

impl fmt::Display for EdgeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.0, self.1)
    }
}

/// Configuration for network building and export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetConfig {
    /// Radius within which an incoming point reuses an existing location (meters).
    /// Default: 75.0
    pub match_max_distance: f64,

    /// Douglas-Peucker tolerance used by [`GraphStore::simplify`] (meters).
    /// Default: 50.0
    pub simplify_min_distance: f64,

    /// Subdivision level of the geodesic grid used by the spatial index.
    /// Fixed for the lifetime of a store. Default: 18 (~75m x ~150m cells at 50°N)
    pub cell_level: u8,

    /// Emit one point feature per location on export. Default: false
    pub show_points: bool,

    /// Emit line features for edges on export. Default: true
    pub show_edges: bool,

    /// Export free segments as continuous lines instead of one line per edge.
    /// Default: false
    pub merge_edges: bool,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            match_max_distance: 75.0,
            simplify_min_distance: 50.0,
            cell_level: 18,
            show_points: false,
            show_edges: true,
            merge_edges: false,
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Errors surfaced by graph maintenance, traversal and snapshots.
#[derive(Debug, thiserror::Error)]
pub enum NetError {
    #[error("inconsistent data, edge {edge} references missing location {location}")]
    MissingEndpoint { edge: EdgeKey, location: LocationId },

    #[error("inconsistent data, location {location} lists missing edge {edge}")]
    MissingEdge { location: LocationId, edge: EdgeKey },

    #[error("inconsistent data, edge {edge} joins a location to itself")]
    SelfEdge { edge: EdgeKey },

    #[error("inconsistent chain, edge {edge} not found")]
    InconsistentChain { edge: EdgeKey },

    #[error("snapshot parse error: {0}")]
    LoadParse(#[source] serde_json::Error),

    #[error("snapshot write error: {0}")]
    SaveWrite(#[source] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, NetError>;

// ============================================================================
// Tests
// ============================================================================
