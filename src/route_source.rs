//! Route retrieval with travel-mode fallback and optional network snapping.
//!
//! Failures never escape: a provider error, a missing path or an impossible
//! snap all come back as [`Route::empty`] and are logged here.

use std::sync::Arc;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::directions::{DirectionsOutcome, DirectionsProvider, TravelMode};
use crate::error::TrackError;
use crate::nearest::nearest_line;
use crate::{GeoPoint, ReferenceNetwork, Route, SpatialIndex, TrainDescriptor};

/// How a train's raw route is obtained.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteStrategy {
    /// Ask the provider for origin -> destination as given
    #[default]
    Direct,
    /// Snap endpoints to the reference network, fetch, then snap every point
    Snapped,
    /// Use the best matching rail polyline from the network, no provider call
    NetworkLine,
}

/// Produces routes for trains from a directions provider and an optional
/// reference network.
pub struct RouteSource<P> {
    provider: Arc<P>,
    network: Option<Arc<ReferenceNetwork>>,
    index: Option<Arc<SpatialIndex>>,
}

impl<P> Clone for RouteSource<P> {
    fn clone(&self) -> Self {
        Self {
            provider: Arc::clone(&self.provider),
            network: self.network.clone(),
            index: self.index.clone(),
        }
    }
}

impl<P: DirectionsProvider> RouteSource<P> {
    pub fn new(provider: Arc<P>) -> Self {
        Self {
            provider,
            network: None,
            index: None,
        }
    }

    /// Attach the reference network used for snapping.
    pub fn with_network(mut self, network: Arc<ReferenceNetwork>) -> Self {
        self.network = Some(network);
        self.index = None;
        self
    }

    /// Answer snap queries from an R-tree instead of a linear scan.
    ///
    /// No-op without a network.
    pub fn with_spatial_index(mut self) -> Self {
        if let Some(network) = &self.network {
            self.index = Some(Arc::new(SpatialIndex::from_network(network)));
        }
        self
    }

    /// Nearest reference point, `None` without a network or with an empty one.
    pub fn snap(&self, point: &GeoPoint) -> Option<GeoPoint> {
        match (&self.index, &self.network) {
            (Some(index), _) => index.nearest(point),
            (None, Some(network)) => network.nearest(point),
            (None, None) => None,
        }
    }

    /// Fetch a route, retrying once in driving mode if rail finds nothing.
    pub async fn fetch_route(&self, origin: GeoPoint, destination: GeoPoint) -> Route {
        debug!(
            "[RouteSource] Requesting route from ({:.5}, {:.5}) to ({:.5}, {:.5})",
            origin.latitude, origin.longitude, destination.latitude, destination.longitude
        );

        for mode in [TravelMode::Rail, TravelMode::Driving] {
            match self.provider.directions(origin, destination, mode).await {
                DirectionsOutcome::Found(route) if !route.is_empty() => {
                    debug!(
                        "[RouteSource] {} route found: {} points, {:.0}m",
                        mode,
                        route.len(),
                        route.length_meters()
                    );
                    return route;
                }
                DirectionsOutcome::Found(_) | DirectionsOutcome::NoPath => {
                    info!("[RouteSource] No directions found using {} mode", mode);
                }
                DirectionsOutcome::ApiError(message) => {
                    warn!("[RouteSource] Directions API error ({} mode): {}", mode, message);
                    return Route::empty();
                }
            }
        }

        info!("[RouteSource] {}", TrackError::NoPath);
        Route::empty()
    }

    /// Snap both endpoints, fetch between the snapped points, then snap every
    /// point of the result.
    ///
    /// Deterministic for a fixed provider and network.
    pub async fn fetch_snapped_route(&self, origin: GeoPoint, destination: GeoPoint) -> Route {
        let (snapped_origin, snapped_destination) = match (self.snap(&origin), self.snap(&destination)) {
            (Some(o), Some(d)) => (o, d),
            _ => {
                let err = TrackError::NotFound {
                    what: format!(
                        "origin ({:.5}, {:.5}) or destination ({:.5}, {:.5})",
                        origin.latitude, origin.longitude, destination.latitude, destination.longitude
                    ),
                };
                warn!("[RouteSource] {}", err);
                return Route::empty();
            }
        };

        let raw = self.fetch_route(snapped_origin, snapped_destination).await;
        let snapped: Vec<GeoPoint> = raw.points().iter().filter_map(|p| self.snap(p)).collect();
        Route::new(snapped)
    }

    /// Pick the rail polyline that best joins origin to destination.
    ///
    /// Needs a line network; returns an empty route otherwise.
    pub fn network_line_route(&self, origin: GeoPoint, destination: GeoPoint) -> Route {
        let Some(ReferenceNetwork::Lines(lines)) = self.network.as_deref() else {
            warn!("[RouteSource] Network line routing requires a line network");
            return Route::empty();
        };

        match nearest_line(&origin, &destination, lines) {
            Some(line) => Route::new(line.to_vec()),
            None => {
                info!("[RouteSource] No suitable railway line found");
                Route::empty()
            }
        }
    }

    /// Route for one train under the given strategy.
    pub async fn route_for(&self, train: &TrainDescriptor, strategy: RouteStrategy) -> Route {
        match strategy {
            RouteStrategy::Direct => self.fetch_route(train.origin, train.destination).await,
            RouteStrategy::Snapped => {
                self.fetch_snapped_route(train.origin, train.destination)
                    .await
            }
            RouteStrategy::NetworkLine => self.network_line_route(train.origin, train.destination),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{LineNetwork, StationSet};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Provider answering from a fixed outcome per mode, counting calls.
    struct ScriptedProvider {
        rail: DirectionsOutcome,
        driving: DirectionsOutcome,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        fn new(rail: DirectionsOutcome, driving: DirectionsOutcome) -> Arc<Self> {
            Arc::new(Self {
                rail,
                driving,
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl DirectionsProvider for ScriptedProvider {
        async fn directions(
            &self,
            _origin: GeoPoint,
            _destination: GeoPoint,
            mode: TravelMode,
        ) -> DirectionsOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match mode {
                TravelMode::Rail => self.rail.clone(),
                TravelMode::Driving => self.driving.clone(),
            }
        }
    }

    /// Provider that echoes a straight line between the requested points.
    struct StraightLine;

    impl DirectionsProvider for StraightLine {
        async fn directions(
            &self,
            origin: GeoPoint,
            destination: GeoPoint,
            _mode: TravelMode,
        ) -> DirectionsOutcome {
            let mid = crate::geo_utils::interpolate(&origin, &destination, 0.5);
            DirectionsOutcome::Found(Route::new(vec![origin, mid, destination]))
        }
    }

    fn colombo_kandy() -> Route {
        Route::new(vec![GeoPoint::new(6.9271, 79.8612), GeoPoint::new(7.2906, 80.6337)])
    }

    fn stations() -> Arc<ReferenceNetwork> {
        let set: StationSet = [
            ("Colombo Fort", GeoPoint::new(6.9339, 79.8500)),
            ("Rambukkana", GeoPoint::new(7.3225, 80.3917)),
            ("Kandy", GeoPoint::new(7.2917, 80.6350)),
        ]
        .into_iter()
        .collect();
        Arc::new(ReferenceNetwork::Stations(set))
    }

    #[tokio::test]
    async fn test_rail_route_used_first() {
        let provider = ScriptedProvider::new(
            DirectionsOutcome::Found(colombo_kandy()),
            DirectionsOutcome::NoPath,
        );
        let source = RouteSource::new(provider.clone());
        let route = source
            .fetch_route(GeoPoint::new(6.9271, 79.8612), GeoPoint::new(7.2906, 80.6337))
            .await;
        assert_eq!(route, colombo_kandy());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_falls_back_to_driving() {
        let provider = ScriptedProvider::new(
            DirectionsOutcome::NoPath,
            DirectionsOutcome::Found(colombo_kandy()),
        );
        let source = RouteSource::new(provider.clone());
        let route = source
            .fetch_route(GeoPoint::new(6.9271, 79.8612), GeoPoint::new(7.2906, 80.6337))
            .await;
        assert_eq!(route, colombo_kandy());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_no_path_in_any_mode_is_empty() {
        let provider = ScriptedProvider::new(DirectionsOutcome::NoPath, DirectionsOutcome::NoPath);
        let source = RouteSource::new(provider.clone());
        let route = source
            .fetch_route(GeoPoint::new(0.0, 0.0), GeoPoint::new(1.0, 1.0))
            .await;
        assert!(route.is_empty());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_api_error_is_empty_without_retry() {
        let provider = ScriptedProvider::new(
            DirectionsOutcome::ApiError("REQUEST_DENIED".to_string()),
            DirectionsOutcome::Found(colombo_kandy()),
        );
        let source = RouteSource::new(provider.clone());
        let route = source
            .fetch_route(GeoPoint::new(0.0, 0.0), GeoPoint::new(1.0, 1.0))
            .await;
        assert!(route.is_empty());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_snapped_route_lands_on_stations() {
        let network = stations();
        let source = RouteSource::new(Arc::new(StraightLine)).with_network(network.clone());

        let route = source
            .fetch_snapped_route(GeoPoint::new(6.9271, 79.8612), GeoPoint::new(7.2906, 80.6337))
            .await;

        assert_eq!(route.len(), 3);
        assert_eq!(route.first(), Some(GeoPoint::new(6.9339, 79.8500)));
        assert_eq!(route.last(), Some(GeoPoint::new(7.2917, 80.6350)));
        let ReferenceNetwork::Stations(set) = network.as_ref() else {
            unreachable!()
        };
        for p in route.points() {
            assert!(set.iter().any(|(_, s)| s == p));
        }
    }

    #[tokio::test]
    async fn test_snapped_route_is_deterministic() {
        let source = RouteSource::new(Arc::new(StraightLine)).with_network(stations());
        let origin = GeoPoint::new(6.95, 79.9);
        let destination = GeoPoint::new(7.3, 80.5);

        let first = source.fetch_snapped_route(origin, destination).await;
        let second = source.fetch_snapped_route(origin, destination).await;
        assert_eq!(first, second);

        let indexed = source.clone().with_spatial_index();
        assert_eq!(indexed.fetch_snapped_route(origin, destination).await, first);
    }

    #[tokio::test]
    async fn test_snap_failure_skips_provider() {
        let provider = ScriptedProvider::new(
            DirectionsOutcome::Found(colombo_kandy()),
            DirectionsOutcome::NoPath,
        );
        let empty = Arc::new(ReferenceNetwork::Stations(StationSet::new()));
        let source = RouteSource::new(provider.clone()).with_network(empty);

        let route = source
            .fetch_snapped_route(GeoPoint::new(6.9, 79.8), GeoPoint::new(7.3, 80.6))
            .await;
        assert!(route.is_empty());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);

        // No network at all behaves the same
        let bare = RouteSource::new(provider.clone());
        assert!(bare
            .fetch_snapped_route(GeoPoint::new(6.9, 79.8), GeoPoint::new(7.3, 80.6))
            .await
            .is_empty());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_network_line_strategy() {
        let main_line = vec![
            GeoPoint::new(6.93, 79.85),
            GeoPoint::new(7.25, 80.35),
            GeoPoint::new(7.29, 80.63),
        ];
        let network = Arc::new(ReferenceNetwork::Lines(LineNetwork::new(vec![main_line.clone()])));
        let provider = ScriptedProvider::new(DirectionsOutcome::NoPath, DirectionsOutcome::NoPath);
        let source = RouteSource::new(provider.clone()).with_network(network);

        let train = TrainDescriptor::new(
            "main",
            GeoPoint::new(6.9271, 79.8612),
            GeoPoint::new(7.2906, 80.6337),
        );
        let route = source.route_for(&train, RouteStrategy::NetworkLine).await;
        assert_eq!(route.points(), main_line.as_slice());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);

        let stations_only = RouteSource::new(provider).with_network(stations());
        assert!(stations_only
            .route_for(&train, RouteStrategy::NetworkLine)
            .await
            .is_empty());
    }
}
