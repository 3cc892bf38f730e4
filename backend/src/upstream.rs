//! The turn-by-turn routing engine this service sits in front of.
//!
//! [`RoutingUpstream`] is the seam: production uses the reqwest-backed
//! [`OsrmClient`], tests substitute scripted fakes.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use tracker_shared::{Geometry, LatLng, RouteResult};

use crate::error::UpstreamError;

const BODY_PREVIEW_CHARS: usize = 200;

/// One directed routing query against the engine.
///
/// Implementations perform a single attempt; retries, timeouts and
/// coalescing are layered on top by [`crate::fetcher::RetryingFetcher`].
#[async_trait]
pub trait RoutingUpstream: Send + Sync {
    async fn route(&self, from: LatLng, to: LatLng) -> Result<RouteResult, UpstreamError>;
}

#[derive(Debug, Clone)]
pub struct OsrmSettings {
    pub base_url: Url,
    pub profile: String,
    pub user_agent: String,
    pub timeout: Duration,
}

impl OsrmSettings {
    /// Driving profile, 10 s timeout and the tracker's user agent.
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            profile: "driving".to_string(),
            user_agent: "Saint-Tracker/1.0".to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

pub struct OsrmClient {
    client: Client,
    base_url: String,
    profile: String,
}

impl OsrmClient {
    /// # Errors
    /// Returns the reqwest error when the HTTP client cannot be built.
    pub fn new(settings: OsrmSettings) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(settings.user_agent)
            .timeout(settings.timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: settings.base_url.as_str().trim_end_matches('/').to_string(),
            profile: settings.profile,
        })
    }

    /// `{base}/route/v1/{profile}/{lng},{lat};{lng},{lat}`; query parameters are added per request.
    pub fn route_url(&self, from: LatLng, to: LatLng) -> String {
        format!(
            "{}/route/v1/{}/{},{};{},{}",
            self.base_url, self.profile, from.lng, from.lat, to.lng, to.lat
        )
    }
}

#[async_trait]
impl RoutingUpstream for OsrmClient {
    async fn route(&self, from: LatLng, to: LatLng) -> Result<RouteResult, UpstreamError> {
        let url = self.route_url(from, to);
        tracing::debug!("fetching segment from OSRM: {url}");

        let response = self
            .client
            .get(&url)
            .query(&[("overview", "full"), ("geometries", "geojson")])
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        let body = response.bytes().await.map_err(map_transport_error)?;
        if !status.is_success() {
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body: body_preview(&body),
            });
        }

        parse_route(&body)
    }
}

#[derive(Debug, Deserialize)]
struct OsrmResponseDto {
    code: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    routes: Vec<OsrmRouteDto>,
}

#[derive(Debug, Deserialize)]
struct OsrmRouteDto {
    #[serde(default)]
    distance: f64,
    #[serde(default)]
    duration: f64,
    geometry: Geometry,
}

fn parse_route(body: &[u8]) -> Result<RouteResult, UpstreamError> {
    let decoded: OsrmResponseDto = serde_json::from_slice(body)
        .map_err(|err| UpstreamError::Decode(format!("invalid OSRM JSON payload: {err}")))?;

    if decoded.code != "Ok" {
        return Err(UpstreamError::Engine {
            code: decoded.code,
            message: decoded
                .message
                .unwrap_or_else(|| "Unknown error".to_string()),
        });
    }

    let route = decoded
        .routes
        .into_iter()
        .next()
        .ok_or_else(|| UpstreamError::Decode("OSRM answered Ok without routes".to_string()))?;

    Ok(RouteResult {
        distance: route.distance,
        duration: route.duration,
        geometry: route.geometry,
    })
}

fn map_transport_error(err: reqwest::Error) -> UpstreamError {
    if err.is_timeout() {
        UpstreamError::Timeout(err.to_string())
    } else {
        UpstreamError::Transport(err.to_string())
    }
}

fn body_preview(body: &[u8]) -> String {
    String::from_utf8_lossy(body)
        .chars()
        .take(BODY_PREVIEW_CHARS)
        .collect::<String>()
        .trim()
        .to_string()
}
