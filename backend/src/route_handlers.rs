// Handlers for the routing API: compute (sync or streamed), cache stats, cache cleanup

use std::{convert::Infallible, sync::Arc};

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use tokio_stream::{wrappers::ReceiverStream, StreamExt};
use tracker_shared::{
    ApiError, CacheStatsResponse, ComputeRouteResponse, EvictionReport, LatLng, RouteEvent,
};

use crate::{error::ValidationError, models::parse_route_request, AppState};

type ApiResult<T> = Result<T, (StatusCode, Json<ApiError>)>;

/// POST /api/routing - compute a route, or stream it when `stream` is truthy
pub async fn compute_route(State(state): State<AppState>, body: Bytes) -> ApiResult<Response> {
    let request =
        parse_route_request(&body, state.service.max_waypoints()).map_err(validation_error)?;

    tracing::info!(
        "route request: {} waypoints, stream={}",
        request.waypoints.len(),
        request.stream
    );

    if request.stream {
        return Ok(stream_response(&state, request.waypoints));
    }

    let waypoints = request.waypoints.len();
    let built = state
        .service
        .compute_route(request.waypoints)
        .await
        .map_err(|err| api_error(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))?;

    Ok(Json(ComputeRouteResponse {
        success: true,
        route: Arc::clone(&built.route),
        cached: true,
        waypoints,
    })
    .into_response())
}

/// GET /api/routing - cache statistics
pub async fn cache_stats(State(state): State<AppState>) -> Json<CacheStatsResponse> {
    Json(CacheStatsResponse {
        stats: state.service.stats(),
    })
}

/// DELETE /api/routing - evict expired entries and clear pending requests
pub async fn evict_cache(State(state): State<AppState>) -> Json<EvictionReport> {
    Json(state.service.evict())
}

/// GET /health
pub async fn health() -> &'static str {
    "ok"
}

fn stream_response(state: &AppState, waypoints: Vec<LatLng>) -> Response {
    let events = ReceiverStream::new(state.service.stream_route(waypoints)).map(encode_event);

    let mut response = Body::from_stream(events).into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/x-ndjson"),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert("x-accel-buffering", HeaderValue::from_static("no"));
    response
}

/// One event per line.
fn encode_event(event: RouteEvent) -> Result<Bytes, Infallible> {
    let mut line = serde_json::to_vec(&event).unwrap_or_else(|err| {
        tracing::error!("failed to encode route event: {err}");
        serde_json::to_vec(&RouteEvent::Error {
            message: "failed to encode route event".to_string(),
        })
        .unwrap_or_default()
    });
    line.push(b'\n');
    Ok(Bytes::from(line))
}

fn validation_error(err: ValidationError) -> (StatusCode, Json<ApiError>) {
    tracing::debug!("rejected route request: {err}");
    api_error(StatusCode::BAD_REQUEST, err.to_string())
}

fn api_error(status: StatusCode, message: String) -> (StatusCode, Json<ApiError>) {
    if status.is_server_error() {
        tracing::error!("routing API error: {message}");
    }
    (status, Json(ApiError { error: message }))
}
