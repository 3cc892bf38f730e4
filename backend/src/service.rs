//! The route service: owns both caches, the three pending registries and the
//! fetcher, and exposes the operations behind the HTTP boundary.

use std::{num::NonZeroUsize, sync::Arc, time::Duration};

use tokio::task::JoinHandle;
use tracker_shared::{CacheStats, EvictionReport, LatLng};

use crate::{
    builder::{BuiltRoute, RouteBuilder},
    cache::RouteCaches,
    error::BuildError,
    fetcher::{RetryPolicy, RetryingFetcher},
    keys::route_key,
    pending::PendingRegistry,
    stream::StreamOutcome,
    upstream::RoutingUpstream,
};

pub type RouteOutcome = Result<Arc<BuiltRoute>, BuildError>;

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub cache_ttl: Duration,
    pub pending_ttl: Duration,
    pub segment_capacity: NonZeroUsize,
    pub route_capacity: NonZeroUsize,
    pub pacing_delay: Duration,
    pub retry: RetryPolicy,
    pub max_waypoints: usize,
    /// Events buffered ahead of a slow stream consumer.
    pub stream_buffer: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(24 * 60 * 60),
            pending_ttl: Duration::from_secs(5 * 60),
            segment_capacity: NonZeroUsize::new(10_000).unwrap_or(NonZeroUsize::MIN),
            route_capacity: NonZeroUsize::new(1_000).unwrap_or(NonZeroUsize::MIN),
            pacing_delay: Duration::from_millis(100),
            retry: RetryPolicy::default(),
            max_waypoints: 100,
            stream_buffer: 32,
        }
    }
}

pub struct RouteService {
    pub(crate) caches: Arc<RouteCaches>,
    pub(crate) fetcher: Arc<RetryingFetcher>,
    pub(crate) builder: RouteBuilder,
    pub(crate) full_routes: PendingRegistry<RouteOutcome>,
    pub(crate) streams: PendingRegistry<StreamOutcome>,
    pub(crate) config: ServiceConfig,
}

impl RouteService {
    pub fn new(upstream: Arc<dyn RoutingUpstream>, config: ServiceConfig) -> Self {
        let caches = Arc::new(RouteCaches::new(
            config.segment_capacity,
            config.route_capacity,
            config.cache_ttl,
        ));
        let fetcher = Arc::new(RetryingFetcher::new(upstream, config.retry, config.pending_ttl));
        let builder = RouteBuilder::new(Arc::clone(&caches), Arc::clone(&fetcher), config.pacing_delay);
        Self {
            caches,
            fetcher,
            builder,
            full_routes: PendingRegistry::new("full-route", config.pending_ttl),
            streams: PendingRegistry::new("stream", config.pending_ttl),
            config,
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn caches(&self) -> &RouteCaches {
        &self.caches
    }

    pub fn max_waypoints(&self) -> usize {
        self.config.max_waypoints
    }

    /// Build (or join the in-flight build of) the route through `waypoints`.
    pub async fn compute_route(&self, waypoints: Vec<LatLng>) -> RouteOutcome {
        let key = route_key(&waypoints);
        let builder = self.builder.clone();
        self.full_routes
            .get_or_create(&key, move || async move {
                builder.build(&waypoints).await.map(Arc::new)
            })
            .wait()
            .await
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            total_routes_in_cache: self.caches.routes.len(),
            valid_routes_in_cache: self.caches.routes.count_valid(),
            total_segments_in_cache: self.caches.segments.len(),
            valid_segments_in_cache: self.caches.segments.count_valid(),
            pending_full_routes: self.full_routes.len(),
            pending_segments: self.fetcher.pending().len(),
            pending_streams: self.streams.len(),
            cache_ttl: duration_millis(self.config.cache_ttl),
            pending_request_ttl: duration_millis(self.config.pending_ttl),
        }
    }

    /// Drop expired cache entries and forget every pending request.
    pub fn evict(&self) -> EvictionReport {
        let evicted = self.caches.evict_expired();
        let report = EvictionReport {
            message: "Cache cleanup completed".to_string(),
            deleted_routes: evicted.routes,
            deleted_segments: evicted.segments,
            cleared_pending_full_routes: self.full_routes.clear(),
            cleared_pending_segments: self.fetcher.pending().clear(),
            cleared_pending_streams: self.streams.clear(),
        };
        tracing::info!(
            "cache cleanup: {} routes, {} segments evicted",
            report.deleted_routes,
            report.deleted_segments
        );
        report
    }

    /// Remove pending entries that outlived the pending TTL in all registries.
    pub fn sweep_pending(&self) -> usize {
        self.full_routes.sweep_expired()
            + self.fetcher.pending().sweep_expired()
            + self.streams.sweep_expired()
    }
}

/// Periodically sweep abandoned pending entries.
pub fn spawn_maintenance(service: Arc<RouteService>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let swept = service.sweep_pending();
            if swept > 0 {
                tracing::info!("maintenance removed {swept} abandoned pending request(s)");
            }
        }
    })
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
