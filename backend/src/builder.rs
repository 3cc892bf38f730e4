//! Incremental route builder: full-route cache, then per-segment cache, then
//! serial upstream fetches for whatever is still missing.

use std::{sync::Arc, time::Duration};

use tracker_shared::{LatLng, RouteResult, SegmentCounts};

use crate::{
    cache::RouteCaches,
    error::{BuildError, SegmentFailure},
    fetcher::RetryingFetcher,
    keys::{route_key, segment_key},
    routing::combine_routes,
};

/// Bookkeeping for one build; the route itself does not carry it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildStats {
    pub requested: usize,
    pub cached: usize,
    pub fetched: usize,
    pub failed: usize,
    pub from_full_cache: bool,
}

impl From<BuildStats> for SegmentCounts {
    fn from(stats: BuildStats) -> Self {
        Self {
            total: stats.requested,
            cached: stats.cached,
            fetched: stats.fetched,
            failed: stats.failed,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BuiltRoute {
    pub route: Arc<RouteResult>,
    pub stats: BuildStats,
}

#[derive(Debug, Clone, Copy)]
pub struct Segment {
    pub index: usize,
    pub from: LatLng,
    pub to: LatLng,
}

/// Segments of one waypoint sequence and what is already known about them.
#[derive(Debug)]
pub struct SegmentPlan {
    route_key: String,
    segments: Vec<Segment>,
    resolved: Vec<Option<Arc<RouteResult>>>,
    cached: usize,
}

impl SegmentPlan {
    pub fn route_key(&self) -> &str {
        &self.route_key
    }

    pub fn total(&self) -> usize {
        self.segments.len()
    }

    pub fn cached(&self) -> usize {
        self.cached
    }

    /// Segments served from the segment cache, in waypoint order.
    pub fn cached_segments(&self) -> impl Iterator<Item = (Segment, &Arc<RouteResult>)> + '_ {
        self.segments
            .iter()
            .zip(&self.resolved)
            .filter_map(|(segment, route)| route.as_ref().map(|route| (*segment, route)))
    }

    /// Segments that still need an upstream call, in waypoint order.
    pub fn missing(&self) -> Vec<Segment> {
        self.segments
            .iter()
            .zip(&self.resolved)
            .filter(|(_, route)| route.is_none())
            .map(|(segment, _)| *segment)
            .collect()
    }

    pub fn resolve(&mut self, index: usize, route: Arc<RouteResult>) {
        if let Some(slot) = self.resolved.get_mut(index) {
            *slot = Some(route);
        }
    }

    fn collected(&self) -> Vec<Arc<RouteResult>> {
        self.resolved.iter().flatten().cloned().collect()
    }
}

#[derive(Clone)]
pub struct RouteBuilder {
    caches: Arc<RouteCaches>,
    fetcher: Arc<RetryingFetcher>,
    pacing_delay: Duration,
}

impl RouteBuilder {
    pub fn new(caches: Arc<RouteCaches>, fetcher: Arc<RetryingFetcher>, pacing_delay: Duration) -> Self {
        Self {
            caches,
            fetcher,
            pacing_delay,
        }
    }

    pub fn cached_route(&self, route_key: &str) -> Option<Arc<RouteResult>> {
        self.caches.routes.get_valid(route_key)
    }

    /// Split into directed pairs and look each one up in the segment cache.
    pub fn plan(&self, waypoints: &[LatLng]) -> SegmentPlan {
        let segments: Vec<Segment> = waypoints
            .windows(2)
            .enumerate()
            .map(|(index, pair)| Segment {
                index,
                from: pair[0],
                to: pair[1],
            })
            .collect();

        let resolved: Vec<Option<Arc<RouteResult>>> = segments
            .iter()
            .map(|segment| {
                let key = segment_key(segment.from, segment.to);
                let hit = self.caches.segments.get_valid(&key);
                tracing::debug!(
                    "segment {} {}: {key}",
                    segment.index,
                    if hit.is_some() { "cache hit" } else { "cache miss" }
                );
                hit
            })
            .collect();
        let cached = resolved.iter().filter(|route| route.is_some()).count();

        SegmentPlan {
            route_key: route_key(waypoints),
            segments,
            resolved,
            cached,
        }
    }

    /// Fetch one segment and store it in the segment cache on success.
    pub async fn fetch_segment(&self, segment: Segment) -> Result<Arc<RouteResult>, SegmentFailure> {
        let route = self.fetcher.fetch(segment.from, segment.to).await?;
        self.caches
            .segments
            .set(segment_key(segment.from, segment.to), Arc::clone(&route));
        Ok(route)
    }

    /// Pause between two upstream fetches of the same build.
    pub async fn pace(&self) {
        if !self.pacing_delay.is_zero() {
            tokio::time::sleep(self.pacing_delay).await;
        }
    }

    /// Combine whatever resolved and write the full-route cache, partial or not.
    pub fn finish(&self, plan: &SegmentPlan) -> Result<Arc<RouteResult>, BuildError> {
        let collected = plan.collected();
        let failed = plan.total() - collected.len();
        let route = combine_routes(&collected).ok_or(BuildError::NoSegments {
            requested: plan.total(),
            failed,
        })?;
        self.caches
            .routes
            .set(plan.route_key().to_string(), Arc::clone(&route));
        Ok(route)
    }

    pub async fn build(&self, waypoints: &[LatLng]) -> Result<BuiltRoute, BuildError> {
        if waypoints.len() < 2 {
            return Err(BuildError::TooFewWaypoints);
        }
        let requested = waypoints.len() - 1;

        let key = route_key(waypoints);
        if let Some(route) = self.cached_route(&key) {
            tracing::info!("returning cached full route ({requested} segments)");
            return Ok(BuiltRoute {
                route,
                stats: BuildStats {
                    requested,
                    cached: requested,
                    from_full_cache: true,
                    ..BuildStats::default()
                },
            });
        }

        let mut plan = self.plan(waypoints);
        let mut stats = BuildStats {
            requested,
            cached: plan.cached(),
            ..BuildStats::default()
        };

        for (position, segment) in plan.missing().into_iter().enumerate() {
            if position > 0 {
                self.pace().await;
            }
            match self.fetch_segment(segment).await {
                Ok(route) => {
                    plan.resolve(segment.index, route);
                    stats.fetched += 1;
                }
                Err(failure) => {
                    tracing::error!("failed to fetch segment {}: {failure}", segment.index);
                    stats.failed += 1;
                }
            }
        }

        let route = self.finish(&plan).inspect_err(|_| {
            tracing::error!("no segment of {requested} could be resolved");
        })?;

        if stats.failed > 0 {
            tracing::warn!(
                "caching partial route: {} of {} segments missing",
                stats.failed,
                requested
            );
        }
        tracing::info!(
            "built route from {} segments ({} fetched, {} cached, {} failed)",
            stats.fetched + stats.cached,
            stats.fetched,
            stats.cached,
            stats.failed
        );

        Ok(BuiltRoute { route, stats })
    }
}
