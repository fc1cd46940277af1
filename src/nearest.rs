//! Nearest-point lookups against a reference network.
//!
//! All queries are linear scans using haversine distance. Ties go to the
//! first candidate encountered, so results are deterministic for a given
//! input order. For large networks use [`crate::SpatialIndex`], which gives
//! the same answers.
//!
//! Network snapping compares segment *endpoints* only; there is no
//! projection onto the interior of a segment.

use serde::{Deserialize, Serialize};

use crate::geo_utils::haversine_distance;
use crate::GeoPoint;

/// Named station locations, in load order.
///
/// Names need not be unique; order decides ties.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StationSet {
    stations: Vec<(String, GeoPoint)>,
}

impl StationSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, location: GeoPoint) {
        self.stations.push((name.into(), location));
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &GeoPoint)> {
        self.stations.iter().map(|(name, p)| (name.as_str(), p))
    }

    /// First station registered under `name`.
    pub fn get(&self, name: &str) -> Option<GeoPoint> {
        self.stations
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, p)| *p)
    }
}

impl<S: Into<String>> FromIterator<(S, GeoPoint)> for StationSet {
    fn from_iter<I: IntoIterator<Item = (S, GeoPoint)>>(iter: I) -> Self {
        Self {
            stations: iter.into_iter().map(|(n, p)| (n.into(), p)).collect(),
        }
    }
}

/// A set of rail polylines.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LineNetwork {
    lines: Vec<Vec<GeoPoint>>,
}

impl LineNetwork {
    pub fn new(lines: Vec<Vec<GeoPoint>>) -> Self {
        Self { lines }
    }

    pub fn push(&mut self, line: Vec<GeoPoint>) {
        self.lines.push(line);
    }

    pub fn lines(&self) -> &[Vec<GeoPoint>] {
        &self.lines
    }

    /// True when the network has no points at all.
    pub fn is_empty(&self) -> bool {
        self.lines.iter().all(|l| l.is_empty())
    }

    /// Every point in the order the endpoint scan visits them.
    ///
    /// Interior vertices appear twice (as the end of one segment and the start
    /// of the next). Visiting them twice never changes the first minimum, so
    /// indexes built from this order tie-break the same way as the scan.
    pub fn candidates(&self) -> impl Iterator<Item = &GeoPoint> {
        self.lines.iter().flat_map(|line| {
            let lone = if line.len() == 1 { line.first() } else { None };
            line.windows(2).flat_map(|w| [&w[0], &w[1]]).chain(lone)
        })
    }
}

/// Reference geometry used for snapping.
///
/// Loaded once per run and shared read-only by all simulations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ReferenceNetwork {
    Stations(StationSet),
    Lines(LineNetwork),
}

impl ReferenceNetwork {
    /// Closest reference point to `query`, or `None` if the network is empty.
    pub fn nearest(&self, query: &GeoPoint) -> Option<GeoPoint> {
        match self {
            ReferenceNetwork::Stations(stations) => nearest_station(query, stations),
            ReferenceNetwork::Lines(network) => nearest_on_network(query, network),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            ReferenceNetwork::Stations(stations) => stations.is_empty(),
            ReferenceNetwork::Lines(network) => network.is_empty(),
        }
    }
}

/// Nearest station to `query`. `None` only for an empty set.
pub fn nearest_station(query: &GeoPoint, stations: &StationSet) -> Option<GeoPoint> {
    first_minimum(query, stations.iter().map(|(_, p)| p))
}

/// Nearest segment endpoint in the network. `None` only for an empty network.
pub fn nearest_on_network(query: &GeoPoint, network: &LineNetwork) -> Option<GeoPoint> {
    first_minimum(query, network.candidates())
}

/// Rail line that best connects `origin` to `destination`.
///
/// Scores every segment by `d(origin, start) + d(destination, end)` and
/// returns the whole polyline that owns the best segment.
pub fn nearest_line<'a>(
    origin: &GeoPoint,
    destination: &GeoPoint,
    network: &'a LineNetwork,
) -> Option<&'a [GeoPoint]> {
    let mut best: Option<(f64, &'a [GeoPoint])> = None;

    for line in network.lines() {
        for w in line.windows(2) {
            let score = haversine_distance(origin, &w[0]) + haversine_distance(destination, &w[1]);
            if best.map_or(true, |(d, _)| score < d) {
                best = Some((score, line.as_slice()));
            }
        }
    }

    best.map(|(_, line)| line)
}

fn first_minimum<'a>(
    query: &GeoPoint,
    candidates: impl Iterator<Item = &'a GeoPoint>,
) -> Option<GeoPoint> {
    let mut best: Option<(f64, GeoPoint)> = None;

    for candidate in candidates {
        let d = haversine_distance(query, candidate);
        // Strict comparison keeps the first of equal candidates
        if best.map_or(true, |(min, _)| d < min) {
            best = Some((d, *candidate));
        }
    }

    best.map(|(_, p)| p)
}
