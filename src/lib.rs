//! # Rail Tracks
//!
//! Train movement simulation along railway routes, producing timestamped
//! geospatial tracks.
//!
//! This library provides:
//! - Great-circle distance and fractional interpolation between GPS points
//! - Nearest station / nearest rail-network point snapping
//! - Route retrieval through a pluggable directions provider with mode fallback
//! - Per-minute trajectory sampling at a given speed
//! - Concurrent simulation of whole fleets with bounded parallelism
//!
//! ## Features
//!
//! - **`parallel`** - Enable rayon for batch simulation of pre-fetched routes
//! - **`http`** - Enable the Google Directions provider and the HTTP sample publisher
//! - **`persistence`** - Enable the SQLite trajectory store
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use chrono::{TimeZone, Utc};
//! use rail_tracks::{GeoPoint, Route, SimulationConfig, TrajectorySimulator};
//!
//! let route = Route::new(vec![
//!     GeoPoint::new(6.9271, 79.8612), // Colombo
//!     GeoPoint::new(7.2906, 80.6337), // Kandy
//! ]);
//!
//! let simulator = TrajectorySimulator::new(SimulationConfig::default()).unwrap();
//! let start = Utc.with_ymd_and_hms(2024, 1, 1, 6, 0, 0).unwrap();
//! let trajectory = simulator.simulate("podi-menike", &route, start);
//!
//! assert_eq!(trajectory.samples[0].timestamp, start);
//! assert_eq!(trajectory.last_position(), Some(GeoPoint::new(7.2906, 80.6337)));
//! ```

use chrono::{DateTime, Utc};
use geo::{Coord, LineString};
use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{OptionExt, Result, TrackError};

// Geographic utilities (distance, interpolation, lengths)
pub mod geo_utils;

// Nearest station / network point lookups
pub mod nearest;
pub use nearest::{
    nearest_line, nearest_on_network, nearest_station, LineNetwork, ReferenceNetwork, StationSet,
};

// R-tree backed nearest lookups for large networks
pub mod spatial;
pub use spatial::SpatialIndex;

// Directions provider boundary
pub mod directions;
pub use directions::{DirectionsOutcome, DirectionsProvider, TravelMode};

// Route retrieval with snapping and mode fallback
pub mod route_source;
pub use route_source::{RouteSource, RouteStrategy};

// Time-parameterised route sampling
pub mod simulator;
pub use simulator::{Sampler, SimulationConfig, TrajectorySimulator};

// Concurrent fleet orchestration
pub mod fleet;
pub use fleet::{simulate_batch, CancelToken, FleetConfig, FleetRunner, ProgressCallback};

// GeoJSON loading and FeatureCollection output
pub mod geojson_io;

// HTTP collaborators (directions API, sample publishing)
#[cfg(feature = "http")]
pub mod http;
#[cfg(feature = "http")]
pub use http::{GoogleDirectionsProvider, HttpSamplePublisher};

// SQLite trajectory store
#[cfg(feature = "persistence")]
pub mod persistence;
#[cfg(feature = "persistence")]
pub use persistence::TrajectoryStore;

// ============================================================================
// Core Types
// ============================================================================

/// A geographic coordinate with latitude and longitude in degrees.
///
/// # Example
/// ```
/// use rail_tracks::GeoPoint;
/// let colombo = GeoPoint::new(6.9271, 79.8612);
/// assert!(colombo.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    /// Create a new point.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Create a point from a GeoJSON position (`[longitude, latitude, ...]`).
    ///
    /// Returns `None` if the position has fewer than two components.
    pub fn from_position(position: &[f64]) -> Option<Self> {
        match position {
            [lng, lat, ..] => Some(Self::new(*lat, *lng)),
            _ => None,
        }
    }

    /// GeoJSON position order: `[longitude, latitude]`.
    pub fn to_position(&self) -> Vec<f64> {
        vec![self.longitude, self.latitude]
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

impl From<Coord> for GeoPoint {
    fn from(c: Coord) -> Self {
        GeoPoint::new(c.y, c.x)
    }
}

impl From<GeoPoint> for Coord {
    fn from(p: GeoPoint) -> Self {
        Coord {
            x: p.longitude,
            y: p.latitude,
        }
    }
}

/// An ordered polyline from an origin to a destination.
///
/// An empty route is the explicit "no path found" state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Route(Vec<GeoPoint>);

impl Route {
    pub fn new(points: Vec<GeoPoint>) -> Self {
        Self(points)
    }

    /// The "no path found" route.
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn points(&self) -> &[GeoPoint] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn first(&self) -> Option<GeoPoint> {
        self.0.first().copied()
    }

    pub fn last(&self) -> Option<GeoPoint> {
        self.0.last().copied()
    }

    /// Total great-circle length in meters.
    pub fn length_meters(&self) -> f64 {
        geo_utils::polyline_length(&self.0)
    }
}

impl From<LineString> for Route {
    fn from(line: LineString) -> Self {
        Route(line.0.into_iter().map(GeoPoint::from).collect())
    }
}

/// A train to simulate: where it starts and where it is heading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainDescriptor {
    /// Unique identifier for the train
    pub id: String,
    /// Display name (e.g. the route name from the input file)
    pub name: Option<String>,
    pub origin: GeoPoint,
    pub destination: GeoPoint,
}

impl TrainDescriptor {
    pub fn new(id: impl Into<String>, origin: GeoPoint, destination: GeoPoint) -> Self {
        Self {
            id: id.into(),
            name: None,
            origin,
            destination,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// One position fix of a simulated train.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrajectorySample {
    pub position: GeoPoint,
    pub timestamp: DateTime<Utc>,
}

/// The simulated track of one train.
///
/// Samples are in non-decreasing timestamp order. A trajectory is never
/// mutated once handed to the fleet aggregator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    pub train_id: String,
    pub start_time: DateTime<Utc>,
    pub samples: Vec<TrajectorySample>,
    /// Display name carried over from the descriptor
    pub name: Option<String>,
    /// Requested origin (before any snapping)
    pub origin: Option<GeoPoint>,
    /// Requested destination (before any snapping)
    pub destination: Option<GeoPoint>,
}

impl Trajectory {
    /// Attach descriptor metadata (name, requested endpoints).
    pub fn with_descriptor(mut self, train: &TrainDescriptor) -> Self {
        self.name = train.name.clone();
        self.origin = Some(train.origin);
        self.destination = Some(train.destination);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn last_position(&self) -> Option<GeoPoint> {
        self.samples.last().map(|s| s.position)
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.samples.last().map(|s| s.timestamp)
    }
}

/// A train that did not produce a trajectory, and why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainFailure {
    pub train_id: String,
    pub reason: String,
}

/// Aggregated output of one fleet run.
///
/// `trajectories` holds one entry per train that produced a non-empty track,
/// in completion order. `failures` is diagnostic only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FleetResult {
    pub trajectories: Vec<Trajectory>,
    pub failures: Vec<TrainFailure>,
}

impl FleetResult {
    pub fn len(&self) -> usize {
        self.trajectories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trajectories.is_empty()
    }

    pub fn get(&self, train_id: &str) -> Option<&Trajectory> {
        self.trajectories.iter().find(|t| t.train_id == train_id)
    }

    /// [`get`](Self::get), with a missing train reported as [`TrackError::NotFound`].
    pub fn require(&self, train_id: &str) -> Result<&Trajectory> {
        self.get(train_id)
            .ok_or_not_found(&format!("trajectory for train {}", train_id))
    }

    /// Total number of samples across all trajectories.
    pub fn sample_count(&self) -> usize {
        self.trajectories.iter().map(|t| t.samples.len()).sum()
    }
}

// ============================================================================
// Tests
// ============================================================================
