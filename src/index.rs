//! Fixed-level geodesic cell index over network locations.
//!
//! Latitude [-90, 90] and longitude [-180, 180] are each split into `2^level`
//! bands, giving a grid of cells addressed by `(row, col)`. Every location lives
//! in exactly one bucket, keyed by the cell its coordinates fall into, and in a
//! flat id -> location map for direct lookup.
//!
//! Radius search only scans cells whose rectangle comes within the search radius
//! of the query, then filters every candidate by exact haversine distance.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use log::warn;
use serde::{Deserialize, Serialize};

use crate::geo_utils::{haversine_distance, meters_to_lat_degrees, meters_to_lng_degrees};
use crate::{EdgeKey, GpsPoint, LocationId, TrackId};

/// Finest supported grid level (row and column must fit into 32 bits each).
pub const MAX_CELL_LEVEL: u8 = 30;

/// Above this many candidate cells a covering tests occupied cells only.
const MAX_SCANNED_CELLS: u64 = 1024;

/// A deduplicated waypoint of the network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub id: LocationId,
    pub lat: f64,
    pub lng: f64,
    /// Tracks that passed through this location
    pub tracks: BTreeSet<TrackId>,
    /// First point of at least one track
    pub begin: bool,
    /// Last point of at least one track
    pub end: bool,
    /// More than two edges meet here
    pub crossing: bool,
    /// Set once a segmentation pass has visited this location. Traversal itself
    /// follows edge flags; this one is for callers inspecting a pass.
    #[serde(skip)]
    pub processed: bool,
    /// Neighbour id -> key of the connecting edge. Maintained by the graph store.
    #[serde(skip)]
    pub edges: BTreeMap<LocationId, EdgeKey>,
}

impl Location {
    pub fn new(id: LocationId, lat: f64, lng: f64) -> Self {
        Self {
            id,
            lat,
            lng,
            tracks: BTreeSet::new(),
            begin: false,
            end: false,
            crossing: false,
            processed: false,
            edges: BTreeMap::new(),
        }
    }

    pub fn point(&self) -> GpsPoint {
        GpsPoint::new(self.lat, self.lng)
    }

    /// Begin, end and crossing locations are deliberate stopping points for traversal.
    pub fn is_special(&self) -> bool {
        self.begin || self.end || self.crossing
    }

    /// Number of edges incident to this location.
    pub fn degree(&self) -> usize {
        self.edges.len()
    }
}

/// A location found by [`SpatialIndex::nearest`] together with its distance.
#[derive(Debug, Clone, Copy)]
pub struct NearestResult<'a> {
    pub location: &'a Location,
    pub distance_meters: f64,
}

/// Grid cell identifier: row in the upper 32 bits, column in the lower 32 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CellId(u64);

impl CellId {
    fn new(row: u64, col: u64) -> Self {
        Self((row << 32) | col)
    }

    pub fn row(&self) -> u64 {
        self.0 >> 32
    }

    pub fn col(&self) -> u64 {
        self.0 & 0xFFFF_FFFF
    }
}

/// Spatial index over locations.
#[derive(Debug, Clone)]
pub struct SpatialIndex {
    level: u8,
    /// Cells per axis, `2^level`
    cells_per_axis: u64,
    buckets: HashMap<CellId, Vec<LocationId>>,
    flat: BTreeMap<LocationId, Location>,
}

impl SpatialIndex {
    /// Create an empty index. `level` is clamped to `1..=MAX_CELL_LEVEL`.
    pub fn new(level: u8) -> Self {
        let clamped = level.clamp(1, MAX_CELL_LEVEL);
        if clamped != level {
            warn!("[SpatialIndex] cell level {} out of range, using {}", level, clamped);
        }
        Self {
            level: clamped,
            cells_per_axis: 1u64 << clamped,
            buckets: HashMap::new(),
            flat: BTreeMap::new(),
        }
    }

    pub fn level(&self) -> u8 {
        self.level
    }

    fn row_of(&self, lat: f64) -> i64 {
        ((lat + 90.0) / 180.0 * self.cells_per_axis as f64).floor() as i64
    }

    /// Unwrapped column, may fall outside `0..cells_per_axis` for longitudes past ±180.
    fn col_of(&self, lng: f64) -> i64 {
        ((lng + 180.0) / 360.0 * self.cells_per_axis as f64).floor() as i64
    }

    fn clamp_row(&self, row: i64) -> u64 {
        row.clamp(0, self.cells_per_axis as i64 - 1) as u64
    }

    fn wrap_col(&self, col: i64) -> u64 {
        col.rem_euclid(self.cells_per_axis as i64) as u64
    }

    /// Cell containing the given coordinates.
    pub fn cell_id(&self, lat: f64, lng: f64) -> CellId {
        CellId::new(self.clamp_row(self.row_of(lat)), self.wrap_col(self.col_of(lng)))
    }

    /// Cells intersecting the disc of `radius_meters` around (`lat`, `lng`).
    ///
    /// A cell is taken when the great-circle distance from the query to the closest
    /// point of its lat/lng rectangle is within the radius. The cell containing the
    /// query is always included.
    ///
    /// When the disc spans more grid cells than are occupied (near the poles, or for
    /// large radii at fine levels) only occupied cells are tested, so the result can
    /// omit empty cells that intersect the disc.
    pub fn covering(&self, lat: f64, lng: f64, radius_meters: f64) -> Vec<CellId> {
        let radius = radius_meters.max(0.0);
        let query = GpsPoint::new(lat, lng);

        let dlat = meters_to_lat_degrees(radius);
        let lat_min = (lat - dlat).max(-90.0);
        let lat_max = (lat + dlat).min(90.0);
        let row_min = self.clamp_row(self.row_of(lat_min));
        let row_max = self.clamp_row(self.row_of(lat_max));

        // Columns are widest at the latitude closest to a pole
        let polar_lat = lat_min.abs().max(lat_max.abs());
        let dlng = meters_to_lng_degrees(radius, polar_lat);
        let (col_min, col_max) = if polar_lat >= 90.0 || dlng >= 180.0 {
            (0, self.cells_per_axis as i64 - 1)
        } else {
            (self.col_of(lng - dlng), self.col_of(lng + dlng))
        };

        let span = (row_max - row_min + 1).saturating_mul((col_max - col_min + 1) as u64);
        let mut cells = if span > MAX_SCANNED_CELLS.max(self.buckets.len() as u64) {
            self.occupied_cells_within(&query, radius)
        } else {
            let mut cells = Vec::new();
            for row in row_min..=row_max {
                for col in col_min..=col_max {
                    if self.distance_to_cell(&query, row, col) <= radius {
                        cells.push(CellId::new(row, self.wrap_col(col)));
                    }
                }
            }
            cells
        };
        cells.push(self.cell_id(lat, lng));

        cells.sort_unstable();
        cells.dedup();
        cells
    }

    /// Occupied cells within `radius` of `query`, in no particular order.
    fn occupied_cells_within(&self, query: &GpsPoint, radius: f64) -> Vec<CellId> {
        self.buckets
            .keys()
            .copied()
            .filter(|cell| self.distance_to_cell(query, cell.row(), cell.col() as i64) <= radius)
            .collect()
    }

    /// Distance from `query` to cell (`row`, `col`), with `col` possibly unwrapped.
    fn distance_to_cell(&self, query: &GpsPoint, row: u64, col: i64) -> f64 {
        let n = self.cells_per_axis as f64;
        let lat_min = row as f64 / n * 180.0 - 90.0;
        let lat_max = (row + 1) as f64 / n * 180.0 - 90.0;
        let lng_min = col as f64 / n * 360.0 - 180.0;
        let lng_max = (col + 1) as f64 / n * 360.0 - 180.0;
        distance_to_rect(query, (lat_min, lat_max), (lng_min, lng_max))
    }

    /// Insert a location, replacing any previous location with the same id.
    pub fn insert(&mut self, location: Location) {
        if self.flat.contains_key(&location.id) {
            self.remove(location.id);
        }
        let cell = self.cell_id(location.lat, location.lng);
        self.buckets.entry(cell).or_default().push(location.id);
        self.flat.insert(location.id, location);
    }

    /// Remove a location by id. Returns `None` if it was not indexed.
    pub fn remove(&mut self, id: LocationId) -> Option<Location> {
        let location = self.flat.remove(&id)?;
        let cell = self.cell_id(location.lat, location.lng);
        if let Some(bucket) = self.buckets.get_mut(&cell) {
            bucket.retain(|&other| other != id);
            if bucket.is_empty() {
                self.buckets.remove(&cell);
            }
        }
        Some(location)
    }

    /// Locations within `radius_meters`, closest first. Equal distances are ordered
    /// by ascending id.
    pub fn nearest(&self, lat: f64, lng: f64, radius_meters: f64) -> Vec<NearestResult<'_>> {
        let query = GpsPoint::new(lat, lng);

        let mut results: Vec<NearestResult<'_>> = self
            .covering(lat, lng, radius_meters)
            .iter()
            .filter_map(|cell| self.buckets.get(cell))
            .flatten()
            .filter_map(|id| self.flat.get(id))
            .filter_map(|location| {
                let distance_meters = haversine_distance(&query, &location.point());
                (distance_meters <= radius_meters).then_some(NearestResult {
                    location,
                    distance_meters,
                })
            })
            .collect();

        results.sort_by(|a, b| {
            a.distance_meters
                .total_cmp(&b.distance_meters)
                .then(a.location.id.cmp(&b.location.id))
        });
        results
    }

    pub fn get(&self, id: LocationId) -> Option<&Location> {
        self.flat.get(&id)
    }

    pub fn get_mut(&mut self, id: LocationId) -> Option<&mut Location> {
        self.flat.get_mut(&id)
    }

    pub fn contains(&self, id: LocationId) -> bool {
        self.flat.contains_key(&id)
    }

    /// All locations in ascending id order.
    pub fn locations(&self) -> impl Iterator<Item = &Location> {
        self.flat.values()
    }

    pub(crate) fn locations_mut(&mut self) -> impl Iterator<Item = &mut Location> {
        self.flat.values_mut()
    }

    pub fn locations_filtered<F>(&self, filter: F) -> Vec<&Location>
    where
        F: Fn(&Location) -> bool,
    {
        self.flat.values().filter(|loc| filter(loc)).collect()
    }

    /// Some location matching `filter`. Callers must not rely on which one.
    pub fn first_location<F>(&self, filter: F) -> Option<&Location>
    where
        F: Fn(&Location) -> bool,
    {
        self.flat.values().find(|loc| filter(loc))
    }

    pub fn len(&self) -> usize {
        self.flat.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flat.is_empty()
    }

    /// Number of non-empty cells.
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }
}

/// Great-circle distance from `query` to the closest point of a lat/lng rectangle.
///
/// Longitudes are compared modulo 360, so the rectangle may be given in an
/// unwrapped frame. Rectangles wider than 180° of longitude are not supported.
fn distance_to_rect(query: &GpsPoint, lats: (f64, f64), lngs: (f64, f64)) -> f64 {
    let (lat_min, lat_max) = lats;
    let to_min = wrap_degrees(lngs.0 - query.longitude);
    let to_max = wrap_degrees(lngs.1 - query.longitude);

    if to_min <= 0.0 && to_max >= 0.0 {
        let nearest = GpsPoint::new(query.latitude.clamp(lat_min, lat_max), query.longitude);
        return haversine_distance(query, &nearest);
    }

    // Otherwise the closest point is on the nearer bounding meridian, at the foot
    // of the perpendicular from the query (or the pole on its side past 90°)
    let delta = if to_min.abs() <= to_max.abs() { to_min } else { to_max };
    let cos_delta = delta.to_radians().cos();
    let foot_lat = if cos_delta > 0.0 {
        (query.latitude.to_radians().tan() / cos_delta).atan().to_degrees()
    } else if query.latitude >= 0.0 {
        90.0
    } else {
        -90.0
    };
    let nearest = GpsPoint::new(foot_lat.clamp(lat_min, lat_max), query.longitude + delta);
    haversine_distance(query, &nearest)
}

/// Angle in degrees folded into `[-180, 180)`.
fn wrap_degrees(degrees: f64) -> f64 {
    (degrees + 180.0).rem_euclid(360.0) - 180.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn location(id: LocationId, lat: f64, lng: f64) -> Location {
        Location::new(id, lat, lng)
    }

    #[test]
    fn test_insert_and_get() {
        let mut index = SpatialIndex::new(18);
        index.insert(location(1, 50.0, 14.0));
        index.insert(location(2, 50.01, 14.0));

        assert_eq!(index.len(), 2);
        assert_eq!(index.get(1).unwrap().lat, 50.0);
        assert!(index.get(3).is_none());
    }

    #[test]
    fn test_remove() {
        let mut index = SpatialIndex::new(18);
        index.insert(location(1, 50.0, 14.0));

        assert!(index.remove(1).is_some());
        assert!(index.remove(1).is_none());
        assert!(index.is_empty());
        assert_eq!(index.bucket_count(), 0);
        assert!(index.nearest(50.0, 14.0, 100.0).is_empty());
    }

    #[test]
    fn test_insert_same_id_replaces() {
        let mut index = SpatialIndex::new(18);
        index.insert(location(1, 50.0, 14.0));
        index.insert(location(1, 10.0, 10.0));

        assert_eq!(index.len(), 1);
        assert_eq!(index.bucket_count(), 1);
        assert!(index.nearest(50.0, 14.0, 100.0).is_empty());
        assert_eq!(index.nearest(10.0, 10.0, 1.0).len(), 1);
    }

    #[test]
    fn test_nearest_sorted_and_filtered() {
        let mut index = SpatialIndex::new(18);
        index.insert(location(1, 50.0003, 14.0)); // ~33m
        index.insert(location(2, 50.0001, 14.0)); // ~11m
        index.insert(location(3, 50.0100, 14.0)); // ~1.1km

        let results = index.nearest(50.0, 14.0, 75.0);
        let ids: Vec<LocationId> = results.iter().map(|r| r.location.id).collect();
        assert_eq!(ids, vec![2, 1]);
        assert!(results[0].distance_meters < results[1].distance_meters);
    }

    #[test]
    fn test_nearest_tie_break_by_id() {
        let mut index = SpatialIndex::new(18);
        // Two coincident locations
        index.insert(location(7, 50.0002, 14.0));
        index.insert(location(3, 50.0002, 14.0));

        let results = index.nearest(50.0, 14.0, 75.0);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].location.id, 3);
        assert_eq!(results[1].location.id, 7);
    }

    #[test]
    fn test_nearest_across_cell_boundary() {
        let index = SpatialIndex::new(18);
        let cell = index.cell_id(50.0, 14.0);
        // Longitude of the western edge of the query cell
        let n = (1u64 << 18) as f64;
        let edge_lng = cell.col() as f64 / n * 360.0 - 180.0;

        let mut index = index;
        index.insert(location(1, 50.0, edge_lng - 0.0001));

        let results = index.nearest(50.0, edge_lng + 0.0001, 75.0);
        assert_eq!(results.len(), 1);
        assert_ne!(
            index.cell_id(50.0, edge_lng - 0.0001),
            index.cell_id(50.0, edge_lng + 0.0001)
        );
    }

    #[test]
    fn test_covering_contains_query_cell() {
        let index = SpatialIndex::new(18);
        let cells = index.covering(50.0, 14.0, 75.0);
        assert!(cells.contains(&index.cell_id(50.0, 14.0)));
        // A 75m disc touches only a handful of ~75m x ~150m cells
        assert!(cells.len() <= 9);
    }

    #[test]
    fn test_covering_wraps_antimeridian() {
        let index = SpatialIndex::new(18);
        let cells = index.covering(0.0, 179.99999, 100.0);
        assert!(cells.contains(&index.cell_id(0.0, -179.99999)));
    }

    #[test]
    fn test_covering_zero_radius() {
        let index = SpatialIndex::new(18);
        let cells = index.covering(50.0, 14.0, 0.0);
        assert_eq!(cells, vec![index.cell_id(50.0, 14.0)]);
    }

    #[test]
    fn test_covering_near_pole_scans_occupied_cells() {
        let mut index = SpatialIndex::new(MAX_CELL_LEVEL);
        index.insert(location(1, 89.9999, 10.0));
        // ~22m away, on the other side of the pole
        index.insert(location(2, 89.9999, -170.0));
        index.insert(location(3, 50.0, 14.0));

        let cells = index.covering(89.9999, 10.0, 75.0);
        assert!(cells.len() <= 3);
        assert!(!cells.contains(&index.cell_id(50.0, 14.0)));

        let ids: Vec<LocationId> = index
            .nearest(89.9999, 10.0, 75.0)
            .iter()
            .map(|r| r.location.id)
            .collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_covering_near_pole_on_empty_index() {
        let index = SpatialIndex::new(24);
        let cells = index.covering(-89.9999, 10.0, 75.0);
        assert_eq!(cells, vec![index.cell_id(-89.9999, 10.0)]);
    }

    #[test]
    fn test_distance_to_rect_off_meridian_at_high_latitude() {
        let query = GpsPoint::new(80.0, 0.0);
        let lats = (80.0, 80.1);
        let lngs = (5.0, 6.0);

        // Dense walk along all four sides
        let steps = 10_000;
        let mut brute = f64::INFINITY;
        for i in 0..=steps {
            let t = i as f64 / steps as f64;
            let lat = lats.0 + (lats.1 - lats.0) * t;
            let lng = lngs.0 + (lngs.1 - lngs.0) * t;
            for p in [
                GpsPoint::new(lat, lngs.0),
                GpsPoint::new(lat, lngs.1),
                GpsPoint::new(lats.0, lng),
                GpsPoint::new(lats.1, lng),
            ] {
                brute = brute.min(haversine_distance(&query, &p));
            }
        }

        let exact = distance_to_rect(&query, lats, lngs);
        assert!((exact - brute).abs() < 1.0);
        // The corner on the query's parallel is tens of meters further away
        let corner = haversine_distance(&query, &GpsPoint::new(80.0, 5.0));
        assert!(exact < corner - 20.0);
    }

    #[test]
    fn test_distance_to_rect_across_antimeridian() {
        let query = GpsPoint::new(0.0, 179.9);
        let wrapped = distance_to_rect(&query, (-1.0, 1.0), (-180.0, -179.0));
        let unwrapped = distance_to_rect(&query, (-1.0, 1.0), (180.0, 181.0));
        let expected = haversine_distance(&query, &GpsPoint::new(0.0, 180.0));

        assert!((wrapped - expected).abs() < 1e-6);
        assert!((unwrapped - expected).abs() < 1e-6);
    }

    #[test]
    fn test_distance_to_rect_inside_band() {
        let query = GpsPoint::new(50.0, 14.5);
        let distance = distance_to_rect(&query, (50.01, 50.02), (14.0, 15.0));
        let expected = haversine_distance(&query, &GpsPoint::new(50.01, 14.5));
        assert!((distance - expected).abs() < 1e-9);
        assert_eq!(distance_to_rect(&query, (49.0, 51.0), (14.0, 15.0)), 0.0);
    }

    #[test]
    fn test_level_is_clamped() {
        assert_eq!(SpatialIndex::new(0).level(), 1);
        assert_eq!(SpatialIndex::new(40).level(), MAX_CELL_LEVEL);
    }

    #[test]
    fn test_filtered_queries() {
        let mut index = SpatialIndex::new(18);
        let mut begin = location(1, 50.0, 14.0);
        begin.begin = true;
        index.insert(begin);
        index.insert(location(2, 50.01, 14.0));

        assert_eq!(index.locations_filtered(|l| l.begin).len(), 1);
        assert_eq!(index.first_location(|l| !l.begin).unwrap().id, 2);
        assert!(index.first_location(|l| l.crossing).is_none());
    }
}
