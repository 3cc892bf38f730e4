use std::sync::Arc;

use tracker_shared::{Geometry, RouteResult};

/// Merge per-segment results, in order, into one route.
///
/// Each segment after the first starts where the previous one ended, so its
/// first vertex is dropped to avoid a duplicate at the boundary. Distance and
/// duration are summed.
pub fn combine_routes(routes: &[Arc<RouteResult>]) -> Option<Arc<RouteResult>> {
    match routes {
        [] => None,
        [single] => Some(Arc::clone(single)),
        _ => {
            let capacity = routes
                .iter()
                .map(|route| route.geometry.coordinates.len())
                .sum();
            let mut coordinates = Vec::with_capacity(capacity);
            let mut distance = 0.0;
            let mut duration = 0.0;

            for (index, route) in routes.iter().enumerate() {
                let skip = usize::from(index > 0);
                coordinates.extend(route.geometry.coordinates.iter().skip(skip).copied());
                distance += route.distance;
                duration += route.duration;
            }

            Some(Arc::new(RouteResult {
                distance,
                duration,
                geometry: Geometry::line_string(coordinates),
            }))
        }
    }
}
