//! Progressive route computation as a sequence of [`RouteEvent`]s.
//!
//! The stream runs on its own task and writes into a bounded channel. A closed
//! channel means the consumer went away: this is checked before every write
//! and before every upstream call, and stops further upstream work. Segment
//! cache entries written up to that point are kept.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracker_shared::{LatLng, RouteEvent, RouteResult, SegmentCounts};

use crate::{builder::RouteBuilder, error::BuildError, keys::route_key, service::RouteService};

/// What a leading stream settled on, shared with identical streams waiting on
/// it. `None` when its consumer went away before the route was decided.
pub type StreamOutcome = Option<Result<Arc<RouteResult>, BuildError>>;

#[derive(Debug, Clone, Copy)]
struct ConsumerGone;

impl RouteService {
    /// Start streaming the route through `waypoints`.
    ///
    /// At most one stream per distinct waypoint sequence computes at a time; a
    /// concurrent identical request waits for it and then replays its outcome.
    /// It only computes on its own when the leader was abandoned midway.
    pub fn stream_route(self: &Arc<Self>, waypoints: Vec<LatLng>) -> mpsc::Receiver<RouteEvent> {
        let (events, receiver) = mpsc::channel(self.config.stream_buffer.max(1));
        let service = Arc::clone(self);
        tokio::spawn(async move { service.drive_stream(waypoints, events).await });
        receiver
    }

    async fn drive_stream(self: Arc<Self>, waypoints: Vec<LatLng>, events: mpsc::Sender<RouteEvent>) {
        let key = route_key(&waypoints);
        let mut emitter = Some(StreamEmitter {
            builder: self.builder.clone(),
            waypoints,
            events,
        });

        let handle = self.streams.get_or_create(&key, || {
            let leader = emitter.take();
            async move {
                match leader {
                    Some(leader) => leader.run().await,
                    None => None,
                }
            }
        });
        if handle.started() {
            return;
        }

        let Some(follower) = emitter else { return };
        tracing::debug!("stream for {key} already running, waiting for its result");
        let waiting = RouteEvent::Status {
            message: "Identical route already in progress, waiting for it".to_string(),
            total_segments: follower.total_segments(),
        };
        if follower.emit(waiting).await.is_err() {
            return;
        }
        match handle.wait().await {
            Some(Ok(route)) => {
                if follower.replay(route).await.is_err() {
                    tracing::debug!("stream for {key} closed before replay");
                }
            }
            Some(Err(err)) => {
                follower
                    .emit(RouteEvent::Error {
                        message: err.to_string(),
                    })
                    .await
                    .ok();
            }
            None => {
                follower.run().await;
            }
        }
    }
}

struct StreamEmitter {
    builder: RouteBuilder,
    waypoints: Vec<LatLng>,
    events: mpsc::Sender<RouteEvent>,
}

impl StreamEmitter {
    fn total_segments(&self) -> usize {
        self.waypoints.len().saturating_sub(1)
    }

    async fn emit(&self, event: RouteEvent) -> Result<(), ConsumerGone> {
        if self.events.is_closed() {
            return Err(ConsumerGone);
        }
        self.events.send(event).await.map_err(|_| ConsumerGone)
    }

    fn status(&self) -> RouteEvent {
        RouteEvent::Status {
            message: format!("Calculating route for {} waypoints", self.waypoints.len()),
            total_segments: self.total_segments(),
        }
    }

    fn complete_from_cache(&self, route: Arc<RouteResult>) -> RouteEvent {
        let total = self.total_segments();
        RouteEvent::CompleteRoute {
            route,
            waypoints: self.waypoints.len(),
            segments: SegmentCounts {
                total,
                cached: total,
                ..SegmentCounts::default()
            },
        }
    }

    /// Replay a route another stream already computed.
    async fn replay(&self, route: Arc<RouteResult>) -> Result<(), ConsumerGone> {
        self.emit(self.status()).await?;
        self.emit(self.complete_from_cache(route)).await
    }

    async fn run(self) -> StreamOutcome {
        match self.try_run().await {
            Ok(outcome) => Some(outcome),
            Err(ConsumerGone) => {
                tracing::warn!(
                    "route stream consumer disconnected, stopping ({} waypoints)",
                    self.waypoints.len()
                );
                None
            }
        }
    }

    /// Emits the event sequence and returns the terminal outcome. Once the
    /// outcome is decided, a consumer leaving no longer matters.
    async fn try_run(&self) -> Result<Result<Arc<RouteResult>, BuildError>, ConsumerGone> {
        let total = self.total_segments();
        self.emit(self.status()).await?;

        if total == 0 {
            let err = BuildError::TooFewWaypoints;
            self.emit(RouteEvent::Error {
                message: err.to_string(),
            })
            .await
            .ok();
            return Ok(Err(err));
        }

        if let Some(route) = self.builder.cached_route(&route_key(&self.waypoints)) {
            self.emit(self.complete_from_cache(Arc::clone(&route)))
                .await
                .ok();
            return Ok(Ok(route));
        }

        let mut plan = self.builder.plan(&self.waypoints);
        let mut counts = SegmentCounts {
            total,
            cached: plan.cached(),
            ..SegmentCounts::default()
        };
        let mut progress = 0;

        for (segment, route) in plan.cached_segments() {
            progress += 1;
            self.emit(RouteEvent::Segment {
                index: segment.index,
                progress,
                total,
                cached: true,
                route: Arc::clone(route),
            })
            .await?;
        }

        let missing = plan.missing();
        if !missing.is_empty() {
            self.emit(RouteEvent::Status {
                message: format!("Fetching {} missing segments", missing.len()),
                total_segments: total,
            })
            .await?;
        }

        let mut failed_segments = Vec::new();
        for (position, segment) in missing.into_iter().enumerate() {
            if position > 0 {
                self.builder.pace().await;
            }
            if self.events.is_closed() {
                return Err(ConsumerGone);
            }

            progress += 1;
            match self.builder.fetch_segment(segment).await {
                Ok(route) => {
                    counts.fetched += 1;
                    plan.resolve(segment.index, Arc::clone(&route));
                    self.emit(RouteEvent::Segment {
                        index: segment.index,
                        progress,
                        total,
                        cached: false,
                        route,
                    })
                    .await?;
                }
                Err(failure) => {
                    counts.failed += 1;
                    failed_segments.push(segment.index);
                    self.emit(RouteEvent::SegmentError {
                        index: segment.index,
                        progress,
                        total,
                        error: failure.to_string(),
                    })
                    .await?;
                }
            }
        }

        if !failed_segments.is_empty() {
            self.emit(RouteEvent::Warning {
                message: format!(
                    "{} of {} segments could not be routed, the route is partial",
                    failed_segments.len(),
                    total
                ),
                failed_segments,
            })
            .await?;
        }

        if self.events.is_closed() {
            return Err(ConsumerGone);
        }
        let outcome = self.builder.finish(&plan);
        let terminal = match &outcome {
            Ok(route) => {
                tracing::info!(
                    "streamed route from {} segments ({} fetched, {} cached, {} failed)",
                    counts.fetched + counts.cached,
                    counts.fetched,
                    counts.cached,
                    counts.failed
                );
                RouteEvent::CompleteRoute {
                    route: Arc::clone(route),
                    waypoints: self.waypoints.len(),
                    segments: counts,
                }
            }
            Err(err) => {
                tracing::error!("streamed route failed: {err}");
                RouteEvent::Error {
                    message: err.to_string(),
                }
            }
        };
        self.emit(terminal).await.ok();
        Ok(outcome)
    }
}
