//! R-tree indexed reference points.
//!
//! Points are stored as unit-sphere vectors. Chord length is monotonic in
//! great-circle distance, so the R-tree's Euclidean ordering is the haversine
//! ordering and the index returns exactly what the linear scan in
//! [`crate::nearest`] returns, including first-occurrence tie-breaks.

use rstar::{PointDistance, RTree, RTreeObject, AABB};

use crate::geo_utils::haversine_distance;
use crate::{GeoPoint, ReferenceNetwork};

/// Squared-chord slack when collecting near-equal candidates (~6 m on Earth).
const TIE_WINDOW: f64 = 1e-12;

/// A reference point with its scan-order index for R-tree queries
#[derive(Debug, Clone, Copy)]
pub struct IndexedPoint {
    pub idx: usize,
    pub point: GeoPoint,
    xyz: [f64; 3],
}

impl IndexedPoint {
    fn new(idx: usize, point: GeoPoint) -> Self {
        Self {
            idx,
            point,
            xyz: unit_vector(&point),
        }
    }
}

impl RTreeObject for IndexedPoint {
    type Envelope = AABB<[f64; 3]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.xyz)
    }
}

impl PointDistance for IndexedPoint {
    fn distance_2(&self, point: &[f64; 3]) -> f64 {
        let dx = self.xyz[0] - point[0];
        let dy = self.xyz[1] - point[1];
        let dz = self.xyz[2] - point[2];
        dx * dx + dy * dy + dz * dz
    }
}

fn unit_vector(p: &GeoPoint) -> [f64; 3] {
    let lat = p.latitude.to_radians();
    let lng = p.longitude.to_radians();
    [lat.cos() * lng.cos(), lat.cos() * lng.sin(), lat.sin()]
}

/// Nearest-point index over a reference network.
///
/// Build once per run and share read-only.
pub struct SpatialIndex {
    tree: RTree<IndexedPoint>,
}

impl SpatialIndex {
    /// Build from points in tie-break order.
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a GeoPoint>) -> Self {
        let indexed: Vec<IndexedPoint> = points
            .into_iter()
            .enumerate()
            .map(|(i, p)| IndexedPoint::new(i, *p))
            .collect();
        Self {
            tree: RTree::bulk_load(indexed),
        }
    }

    pub fn from_network(network: &ReferenceNetwork) -> Self {
        match network {
            ReferenceNetwork::Stations(stations) => Self::from_points(stations.iter().map(|(_, p)| p)),
            ReferenceNetwork::Lines(lines) => Self::from_points(lines.candidates()),
        }
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// Closest indexed point to `query`, or `None` for an empty index.
    pub fn nearest(&self, query: &GeoPoint) -> Option<GeoPoint> {
        let target = unit_vector(query);
        let mut candidates = self.tree.nearest_neighbor_iter_with_distance_2(&target);

        let (first, first_d2) = candidates.next()?;
        let mut best = (haversine_distance(query, &first.point), first.idx, first.point);

        // Re-rank everything within rounding distance of the R-tree winner
        for (candidate, d2) in candidates {
            if d2 > first_d2 + TIE_WINDOW {
                break;
            }
            let d = haversine_distance(query, &candidate.point);
            if d < best.0 || (d == best.0 && candidate.idx < best.1) {
                best = (d, candidate.idx, candidate.point);
            }
        }

        Some(best.2)
    }
}
