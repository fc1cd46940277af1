//! GeoJSON input and output.
//!
//! Inputs are ordinary FeatureCollections:
//! - trains: LineString features, origin = first coordinate, destination = last
//! - stations: Point features with a `name` property
//! - rail lines: LineString / MultiLineString features
//!
//! Output is one LineString feature per trajectory with a parallel
//! `timestamps` array in its properties.

use std::fs;
use std::path::Path;

use geojson::{Feature, FeatureCollection, GeoJson, Geometry, JsonObject, JsonValue, Value};
use log::{info, warn};

use crate::error::{Result, TrackError};
use crate::{FleetResult, GeoPoint, LineNetwork, StationSet, TrainDescriptor, Trajectory};

fn parse_collection(json: &str) -> Result<FeatureCollection> {
    let geojson: GeoJson = json.parse().map_err(|e: geojson::Error| TrackError::GeoJson {
        message: e.to_string(),
    })?;
    match geojson {
        GeoJson::FeatureCollection(fc) => Ok(fc),
        GeoJson::Feature(f) => Ok(FeatureCollection {
            bbox: None,
            features: vec![f],
            foreign_members: None,
        }),
        GeoJson::Geometry(_) => Err(TrackError::GeoJson {
            message: "expected a Feature or FeatureCollection, found a bare Geometry".to_string(),
        }),
    }
}

fn string_property(feature: &Feature, key: &str) -> Option<String> {
    match feature.property(key)? {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn feature_id(feature: &Feature) -> Option<String> {
    match feature.id.as_ref()? {
        geojson::feature::Id::String(s) => Some(s.clone()),
        geojson::feature::Id::Number(n) => Some(n.to_string()),
    }
}

fn to_points(positions: &[Vec<f64>]) -> Vec<GeoPoint> {
    positions
        .iter()
        .filter_map(|p| GeoPoint::from_position(p))
        .collect()
}

/// Polylines carried by a feature (a MultiLineString yields several).
fn feature_lines(feature: &Feature) -> Vec<Vec<GeoPoint>> {
    match feature.geometry.as_ref().map(|g| &g.value) {
        Some(Value::LineString(line)) => vec![to_points(line)],
        Some(Value::MultiLineString(lines)) => lines.iter().map(|l| to_points(l)).collect(),
        _ => Vec::new(),
    }
}

// ============================================================================
// Loading
// ============================================================================

/// Parse train descriptors.
///
/// The id comes from `id_property`, then `train_id`, `route`, the feature id,
/// and finally the feature index. Features without a usable line are skipped.
pub fn parse_trains(json: &str, id_property: &str) -> Result<Vec<TrainDescriptor>> {
    let collection = parse_collection(json)?;
    let mut trains = Vec::with_capacity(collection.features.len());

    for (i, feature) in collection.features.iter().enumerate() {
        let id = string_property(feature, id_property)
            .or_else(|| string_property(feature, "train_id"))
            .or_else(|| string_property(feature, "route"))
            .or_else(|| feature_id(feature))
            .unwrap_or_else(|| format!("train-{}", i));

        let line = feature_lines(feature).into_iter().find(|l| !l.is_empty());
        let Some(line) = line else {
            warn!("[geojson] Skipping train {}: no line geometry", id);
            continue;
        };
        let (origin, destination) = (line[0], line[line.len() - 1]);

        let name = string_property(feature, "name")
            .or_else(|| string_property(feature, "route"))
            .filter(|n| *n != id);

        trains.push(TrainDescriptor {
            id,
            name,
            origin,
            destination,
        });
    }

    info!("[geojson] Loaded {} trains", trains.len());
    Ok(trains)
}

/// Parse station points. Unnamed stations get an empty name.
pub fn parse_stations(json: &str) -> Result<StationSet> {
    let collection = parse_collection(json)?;
    let mut stations = StationSet::new();

    for feature in &collection.features {
        let Some(Value::Point(position)) = feature.geometry.as_ref().map(|g| &g.value) else {
            continue;
        };
        if let Some(point) = GeoPoint::from_position(position) {
            stations.insert(string_property(feature, "name").unwrap_or_default(), point);
        }
    }

    info!("[geojson] Loaded {} stations", stations.len());
    Ok(stations)
}

/// Parse rail polylines.
pub fn parse_lines(json: &str) -> Result<LineNetwork> {
    let collection = parse_collection(json)?;
    let mut network = LineNetwork::default();

    for feature in &collection.features {
        for line in feature_lines(feature) {
            if !line.is_empty() {
                network.push(line);
            }
        }
    }

    info!("[geojson] Loaded {} rail lines", network.lines().len());
    Ok(network)
}

pub fn load_trains(path: impl AsRef<Path>, id_property: &str) -> Result<Vec<TrainDescriptor>> {
    parse_trains(&fs::read_to_string(path)?, id_property)
}

pub fn load_stations(path: impl AsRef<Path>) -> Result<StationSet> {
    parse_stations(&fs::read_to_string(path)?)
}

pub fn load_lines(path: impl AsRef<Path>) -> Result<LineNetwork> {
    parse_lines(&fs::read_to_string(path)?)
}

// ============================================================================
// Output
// ============================================================================

/// One LineString feature for a trajectory.
pub fn trajectory_feature(trajectory: &Trajectory) -> Feature {
    let coordinates: Vec<Vec<f64>> = trajectory
        .samples
        .iter()
        .map(|s| s.position.to_position())
        .collect();
    let timestamps: Vec<JsonValue> = trajectory
        .samples
        .iter()
        .map(|s| JsonValue::String(s.timestamp.to_rfc3339()))
        .collect();

    let mut properties = JsonObject::new();
    properties.insert("train_id".to_string(), JsonValue::from(trajectory.train_id.clone()));
    properties.insert("timestamps".to_string(), JsonValue::Array(timestamps));
    properties.insert(
        "start_time".to_string(),
        JsonValue::String(trajectory.start_time.to_rfc3339()),
    );
    if let Some(name) = &trajectory.name {
        properties.insert("route".to_string(), JsonValue::from(name.clone()));
    }
    if let Some(origin) = trajectory.origin {
        properties.insert("origin".to_string(), point_json(origin));
    }
    if let Some(destination) = trajectory.destination {
        properties.insert("destination".to_string(), point_json(destination));
    }

    Feature {
        bbox: None,
        geometry: Some(Geometry::new(Value::LineString(coordinates))),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

fn point_json(p: GeoPoint) -> JsonValue {
    serde_json::json!({ "latitude": p.latitude, "longitude": p.longitude })
}

pub fn feature_collection(result: &FleetResult) -> FeatureCollection {
    FeatureCollection {
        bbox: None,
        features: result.trajectories.iter().map(trajectory_feature).collect(),
        foreign_members: None,
    }
}

/// Write the fleet result as a FeatureCollection.
///
/// An empty result writes nothing and returns `Ok(false)`.
pub fn write_feature_collection(path: impl AsRef<Path>, result: &FleetResult) -> Result<bool> {
    let path = path.as_ref();
    if result.is_empty() {
        info!("[geojson] No data to write");
        return Ok(false);
    }

    fs::write(path, feature_collection(result).to_string())?;
    info!(
        "[geojson] Wrote {} trajectories to {}",
        result.len(),
        path.display()
    );
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TrajectorySample;
    use chrono::{Duration, TimeZone, Utc};

    const ROUTES: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "properties": { "route": "Colombo Fort - Kandy" },
                "geometry": { "type": "LineString", "coordinates": [[79.8500, 6.9339], [80.3917, 7.3225], [80.6350, 7.2917]] }
            },
            {
                "type": "Feature",
                "properties": { "train_id": 1045, "route": "Coast Line" },
                "geometry": { "type": "MultiLineString", "coordinates": [[[79.85, 6.93], [80.22, 6.03]]] }
            },
            {
                "type": "Feature",
                "properties": { "route": "Broken" },
                "geometry": null
            }
        ]
    }"#;

    #[test]
    fn test_parse_trains() {
        let trains = parse_trains(ROUTES, "route").unwrap();
        assert_eq!(trains.len(), 2);

        assert_eq!(trains[0].id, "Colombo Fort - Kandy");
        assert_eq!(trains[0].name, None);
        assert_eq!(trains[0].origin, GeoPoint::new(6.9339, 79.8500));
        assert_eq!(trains[0].destination, GeoPoint::new(7.2917, 80.6350));

        let trains = parse_trains(ROUTES, "train_id").unwrap();
        assert_eq!(trains[1].id, "1045");
        assert_eq!(trains[1].name.as_deref(), Some("Coast Line"));
        assert_eq!(trains[1].destination, GeoPoint::new(6.03, 80.22));
    }

    #[test]
    fn test_parse_stations_and_lines() {
        let stations = parse_stations(
            r#"{"type": "FeatureCollection", "features": [
                {"type": "Feature", "properties": {"name": "Kandy"}, "geometry": {"type": "Point", "coordinates": [80.635, 7.2917]}},
                {"type": "Feature", "properties": {}, "geometry": {"type": "Point", "coordinates": [79.85, 6.9339]}},
                {"type": "Feature", "properties": {"name": "Track"}, "geometry": {"type": "LineString", "coordinates": [[0, 0], [1, 1]]}}
            ]}"#,
        )
        .unwrap();
        assert_eq!(stations.len(), 2);
        assert_eq!(stations.get("Kandy"), Some(GeoPoint::new(7.2917, 80.635)));
        assert_eq!(stations.get(""), Some(GeoPoint::new(6.9339, 79.85)));

        let lines = parse_lines(ROUTES).unwrap();
        assert_eq!(lines.lines().len(), 2);
        assert_eq!(lines.lines()[0].len(), 3);
    }

    #[test]
    fn test_parse_rejects_invalid_json() {
        assert!(matches!(
            parse_trains("{ not geojson", "route"),
            Err(TrackError::GeoJson { .. })
        ));
        assert!(parse_stations(r#"{"type": "Point", "coordinates": [0, 0]}"#).is_err());
    }

    fn sample_result() -> FleetResult {
        let start = Utc.with_ymd_and_hms(2024, 8, 1, 6, 0, 0).unwrap();
        let origin = GeoPoint::new(6.9339, 79.85);
        let destination = GeoPoint::new(7.2917, 80.635);
        let trajectory = Trajectory {
            train_id: "1001".to_string(),
            start_time: start,
            samples: vec![
                TrajectorySample { position: origin, timestamp: start },
                TrajectorySample {
                    position: destination,
                    timestamp: start + Duration::minutes(1),
                },
            ],
            name: Some("Podi Menike".to_string()),
            origin: Some(origin),
            destination: Some(destination),
        };
        FleetResult {
            trajectories: vec![trajectory],
            failures: Vec::new(),
        }
    }

    #[test]
    fn test_trajectory_feature_properties() {
        let result = sample_result();
        let feature = trajectory_feature(&result.trajectories[0]);

        let Some(Value::LineString(coords)) = feature.geometry.as_ref().map(|g| &g.value) else {
            panic!("expected LineString geometry");
        };
        assert_eq!(coords[0], vec![79.85, 6.9339]);

        let timestamps = feature.property("timestamps").unwrap().as_array().unwrap();
        assert_eq!(timestamps.len(), coords.len());
        assert_eq!(timestamps[0], "2024-08-01T06:00:00+00:00");
        assert_eq!(feature.property("train_id").unwrap(), "1001");
        assert_eq!(feature.property("route").unwrap(), "Podi Menike");
        assert_eq!(feature.property("origin").unwrap()["latitude"], 6.9339);
    }

    #[test]
    fn test_write_feature_collection() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("train_tracking_data.geojson");

        assert!(write_feature_collection(&path, &sample_result()).unwrap());
        let written = fs::read_to_string(&path).unwrap();
        let collection = parse_collection(&written).unwrap();
        assert_eq!(collection.features.len(), 1);

        let empty_path = dir.path().join("empty.geojson");
        assert!(!write_feature_collection(&empty_path, &FleetResult::default()).unwrap());
        assert!(!empty_path.exists());
    }
}
