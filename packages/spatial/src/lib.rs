#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Spatial helpers for pothole reports and hotspots.
//!
//! Provides great-circle distance, degree bounding boxes around a point,
//! an R-tree backed [`PointIndex`] for radius lookups, and GeoJSON heatmap
//! export. Used by the aggregator to find candidate hotspots and by the
//! dashboard queries (nearby search, heatmap).

pub mod heatmap;

use road_intel_hotspot_models::BoundingBox;
use road_intel_report_models::Coordinates;
use rstar::{AABB, RTree, RTreeObject};

/// Mean Earth radius used by the haversine formula, in kilometers.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Approximate length of one degree of latitude, in meters.
const METERS_PER_DEGREE_LAT: f64 = 111_320.0;

/// Haversine great-circle distance between two points in kilometers.
#[must_use]
pub fn haversine_km(a: Coordinates, b: Coordinates) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let dlat = (b.latitude - a.latitude).to_radians();
    let dlng = (b.longitude - a.longitude).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

/// Haversine great-circle distance between two points in meters.
#[must_use]
pub fn haversine_m(a: Coordinates, b: Coordinates) -> f64 {
    haversine_km(a, b) * 1000.0
}

/// Degree bounding box that contains every point within `radius_m` of
/// `center`.
///
/// The box is a superset of the circle; callers filter with
/// [`haversine_m`]. Boxes are clamped to the valid coordinate range and do
/// not wrap across the antimeridian.
#[must_use]
pub fn bbox_around(center: Coordinates, radius_m: f64) -> BoundingBox {
    let lat_delta = radius_m / METERS_PER_DEGREE_LAT;
    let south = (center.latitude - lat_delta).max(-90.0);
    let north = (center.latitude + lat_delta).min(90.0);

    // Longitude degrees shrink towards the poles; use the widest latitude
    // the box touches.
    let widest = south.abs().max(north.abs()).to_radians().cos();
    let lng_delta = if widest <= 1e-9 {
        180.0
    } else {
        (radius_m / (METERS_PER_DEGREE_LAT * widest)).min(180.0)
    };

    BoundingBox::new(
        (center.longitude - lng_delta).max(-180.0),
        south,
        (center.longitude + lng_delta).min(180.0),
        north,
    )
}

/// An item stored in the R-tree at a single point.
struct IndexedPoint<T> {
    coordinates: Coordinates,
    item: T,
}

impl<T> RTreeObject for IndexedPoint<T> {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point([self.coordinates.longitude, self.coordinates.latitude])
    }
}

/// Immutable R-tree of items keyed by their coordinates.
///
/// Built once per query batch with [`PointIndex::new`]; lookups prefilter
/// by bounding box and then compute exact great-circle distances.
pub struct PointIndex<T> {
    tree: RTree<IndexedPoint<T>>,
}

impl<T> PointIndex<T> {
    /// Bulk-loads the index.
    #[must_use]
    pub fn new(items: impl IntoIterator<Item = (Coordinates, T)>) -> Self {
        let entries: Vec<IndexedPoint<T>> = items
            .into_iter()
            .map(|(coordinates, item)| IndexedPoint { coordinates, item })
            .collect();
        Self {
            tree: RTree::bulk_load(entries),
        }
    }

    /// Number of indexed items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tree.size()
    }

    /// Whether the index is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// Items within `radius_m` meters of `center`, nearest first, with
    /// their distance in meters.
    #[must_use]
    pub fn within_radius(&self, center: Coordinates, radius_m: f64) -> Vec<(&T, f64)> {
        let bbox = bbox_around(center, radius_m);
        let envelope = AABB::from_corners([bbox.west, bbox.south], [bbox.east, bbox.north]);

        let mut hits: Vec<(&T, f64)> = self
            .tree
            .locate_in_envelope(&envelope)
            .filter_map(|entry| {
                let distance = haversine_m(center, entry.coordinates);
                (distance <= radius_m).then_some((&entry.item, distance))
            })
            .collect();

        hits.sort_by(|a, b| a.1.total_cmp(&b.1));
        log::trace!(
            "Radius lookup {radius_m}m around ({center}) matched {} of {} points",
            hits.len(),
            self.len()
        );
        hits
    }
}
