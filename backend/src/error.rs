use thiserror::Error;

/// Rejected client input. Never reaches the caches or the upstream engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Invalid waypoints provided")]
    InvalidWaypoints,
    #[error("At least 2 valid waypoints required")]
    TooFewWaypoints,
    #[error("Too many waypoints (max {max})")]
    TooManyWaypoints { max: usize },
}

/// One failed call to the routing engine. Every variant is retried.
#[derive(Debug, Clone, Error)]
pub enum UpstreamError {
    #[error("upstream request failed: {0}")]
    Transport(String),
    #[error("upstream request timed out: {0}")]
    Timeout(String),
    #[error("upstream returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("routing engine error: {code} - {message}")]
    Engine { code: String, message: String },
    #[error("invalid upstream payload: {0}")]
    Decode(String),
}

/// A segment that could not be resolved within the attempt budget.
#[derive(Debug, Clone, Error)]
#[error("segment failed after {attempts} attempt(s): {source}")]
pub struct SegmentFailure {
    pub attempts: u32,
    #[source]
    pub source: UpstreamError,
}

/// Total failure of a route build: no segment could be resolved.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("No valid route segments available")]
    NoSegments { requested: usize, failed: usize },
    #[error("At least 2 valid waypoints required")]
    TooFewWaypoints,
}
