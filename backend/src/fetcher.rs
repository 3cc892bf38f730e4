//! Retrying, coalescing segment fetcher.

use std::{sync::Arc, time::Duration};

use tracker_shared::{LatLng, RouteResult};

use crate::{
    error::{SegmentFailure, UpstreamError},
    keys::segment_key,
    pending::PendingRegistry,
    upstream::RoutingUpstream,
};

pub type SegmentOutcome = Result<Arc<RouteResult>, SegmentFailure>;

/// Fixed-delay retry budget for one segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first one.
    pub retries: u32,
    /// Pause between two attempts. No backoff.
    pub delay: Duration,
    /// Upper bound for a single attempt.
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 2,
            delay: Duration::from_secs(1),
            timeout: Duration::from_secs(10),
        }
    }
}

pub struct RetryingFetcher {
    upstream: Arc<dyn RoutingUpstream>,
    policy: RetryPolicy,
    pending: PendingRegistry<SegmentOutcome>,
}

impl RetryingFetcher {
    pub fn new(upstream: Arc<dyn RoutingUpstream>, policy: RetryPolicy, pending_ttl: Duration) -> Self {
        Self {
            upstream,
            policy,
            pending: PendingRegistry::new("segment", pending_ttl),
        }
    }

    pub fn pending(&self) -> &PendingRegistry<SegmentOutcome> {
        &self.pending
    }

    /// Fetch `from -> to`, sharing the upstream attempts with any concurrent
    /// caller asking for the same directed pair.
    pub async fn fetch(&self, from: LatLng, to: LatLng) -> SegmentOutcome {
        let key = segment_key(from, to);
        let upstream = Arc::clone(&self.upstream);
        let policy = self.policy;
        self.pending
            .get_or_create(&key, move || fetch_with_retry(upstream, policy, from, to))
            .wait()
            .await
    }
}

async fn fetch_with_retry(
    upstream: Arc<dyn RoutingUpstream>,
    policy: RetryPolicy,
    from: LatLng,
    to: LatLng,
) -> SegmentOutcome {
    let budget = policy.retries + 1;
    let mut attempt = 1;
    loop {
        let result = match tokio::time::timeout(policy.timeout, upstream.route(from, to)).await {
            Ok(result) => result,
            Err(_) => Err(UpstreamError::Timeout(format!(
                "no answer within {} ms",
                policy.timeout.as_millis()
            ))),
        };

        match result {
            Ok(route) => return Ok(Arc::new(route)),
            Err(err) if attempt < budget => {
                tracing::warn!(
                    "segment {:?} -> {:?} attempt {}/{} failed: {}",
                    from,
                    to,
                    attempt,
                    budget,
                    err
                );
                tokio::time::sleep(policy.delay).await;
                attempt += 1;
            }
            Err(err) => {
                tracing::error!(
                    "segment {:?} -> {:?} failed after {} attempt(s): {}",
                    from,
                    to,
                    attempt,
                    err
                );
                return Err(SegmentFailure {
                    attempts: attempt,
                    source: err,
                });
            }
        }
    }
}
