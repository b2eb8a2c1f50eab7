//! GeoJSON heatmap export.
//!
//! Produces a `FeatureCollection` of report points with a numeric `weight`
//! property derived from severity, the shape consumed by deck.gl /
//! `MapLibre` heatmap layers.

use geojson::{Feature, FeatureCollection, Geometry, JsonObject, feature::Id};
use road_intel_report_models::Report;

/// Converts a single report into a weighted point feature.
#[must_use]
pub fn report_feature(report: &Report) -> Feature {
    let point = geo::Point::new(report.coordinates.longitude, report.coordinates.latitude);

    let mut properties = JsonObject::new();
    properties.insert("weight".to_string(), report.severity.weight().into());
    properties.insert("severity".to_string(), report.severity.as_ref().into());
    properties.insert("status".to_string(), report.status.as_ref().into());
    properties.insert("city".to_string(), report.city.clone().into());

    Feature {
        bbox: None,
        geometry: Some(Geometry::new(geojson::Value::from(&point))),
        id: Some(Id::String(report.id.to_string())),
        properties: Some(properties),
        foreign_members: None,
    }
}

/// Builds a heatmap `FeatureCollection` from reports.
#[must_use]
pub fn feature_collection<'a>(reports: impl IntoIterator<Item = &'a Report>) -> FeatureCollection {
    FeatureCollection {
        bbox: None,
        features: reports.into_iter().map(report_feature).collect(),
        foreign_members: None,
    }
}
