//! Test helpers shared by unit tests (in `src/`) and integration tests (in `tests/`).
//!
//! Compiled for `cfg(test)` and behind the `test-support` feature.

use std::{
    collections::HashMap,
    num::NonZeroUsize,
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracker_shared::{Geometry, LatLng, RouteResult};

use crate::{
    error::UpstreamError,
    fetcher::RetryPolicy,
    keys::segment_key,
    service::{RouteService, ServiceConfig},
    upstream::RoutingUpstream,
};

pub fn point(lat: f64, lng: f64) -> LatLng {
    LatLng::new(lat, lng)
}

/// Three-vertex route from `from` to `to`: 1 km and one minute per segment.
pub fn straight_route(from: LatLng, to: LatLng) -> RouteResult {
    let mid = [(from.lng + to.lng) / 2.0, (from.lat + to.lat) / 2.0];
    RouteResult {
        distance: 1_000.0,
        duration: 60.0,
        geometry: Geometry::line_string(vec![from.to_position(), mid, to.to_position()]),
    }
}

/// In-memory routing engine that counts calls per directed segment.
#[derive(Default)]
pub struct ScriptedUpstream {
    calls: Mutex<HashMap<String, usize>>,
    // remaining forced failures per segment; `usize::MAX` fails forever
    failures: Mutex<HashMap<String, usize>>,
    latency: Duration,
}

impl ScriptedUpstream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    /// Every attempt for `from -> to` answers with an engine error.
    pub fn fail_segment(&self, from: LatLng, to: LatLng) {
        self.fail_segment_times(from, to, usize::MAX);
    }

    /// The next `times` attempts for `from -> to` fail, later ones succeed.
    pub fn fail_segment_times(&self, from: LatLng, to: LatLng, times: usize) {
        self.failures.lock().insert(segment_key(from, to), times);
    }

    pub fn calls_for(&self, from: LatLng, to: LatLng) -> usize {
        self.calls
            .lock()
            .get(&segment_key(from, to))
            .copied()
            .unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().values().sum()
    }
}

#[async_trait]
impl RoutingUpstream for ScriptedUpstream {
    async fn route(&self, from: LatLng, to: LatLng) -> Result<RouteResult, UpstreamError> {
        let key = segment_key(from, to);
        *self.calls.lock().entry(key.clone()).or_insert(0) += 1;

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let should_fail = match self.failures.lock().get_mut(&key) {
            Some(remaining) if *remaining > 0 => {
                if *remaining != usize::MAX {
                    *remaining -= 1;
                }
                true
            }
            _ => false,
        };

        if should_fail {
            Err(UpstreamError::Engine {
                code: "NoRoute".to_string(),
                message: format!("scripted failure for {key}"),
            })
        } else {
            Ok(straight_route(from, to))
        }
    }
}

/// Service settings with short delays so tests do not wait on real clocks.
pub fn fast_config() -> ServiceConfig {
    ServiceConfig {
        retry: RetryPolicy {
            retries: 2,
            delay: Duration::from_millis(1),
            timeout: Duration::from_secs(5),
        },
        pacing_delay: Duration::from_millis(1),
        segment_capacity: NonZeroUsize::new(1_000).expect("non-zero"),
        route_capacity: NonZeroUsize::new(100).expect("non-zero"),
        ..ServiceConfig::default()
    }
}

pub fn test_service(upstream: Arc<ScriptedUpstream>) -> Arc<RouteService> {
    Arc::new(RouteService::new(upstream, fast_config()))
}
