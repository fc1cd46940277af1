//! Directions provider boundary.
//!
//! The core never talks to a routing service directly. It asks a
//! [`DirectionsProvider`] for a path in a given [`TravelMode`] and gets back a
//! typed [`DirectionsOutcome`].

use std::fmt;
use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::{GeoPoint, Route};

/// Travel mode requested from the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TravelMode {
    /// Rail/transit routing (tried first)
    Rail,
    /// Generic road routing (fallback)
    Driving,
}

impl fmt::Display for TravelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TravelMode::Rail => write!(f, "rail"),
            TravelMode::Driving => write!(f, "driving"),
        }
    }
}

/// What a provider returned for one request.
#[derive(Debug, Clone, PartialEq)]
pub enum DirectionsOutcome {
    Found(Route),
    /// The provider answered but has no path in this mode
    NoPath,
    /// Transport, auth, quota or response-format failure
    ApiError(String),
}

/// A source of raw routes between two points.
///
/// Implementations are shared across all concurrent simulations, so they
/// must be usable through `&self` from many tasks at once.
pub trait DirectionsProvider: Send + Sync + 'static {
    fn directions(
        &self,
        origin: GeoPoint,
        destination: GeoPoint,
        mode: TravelMode,
    ) -> impl Future<Output = DirectionsOutcome> + Send;
}
