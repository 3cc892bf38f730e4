use serde::Deserialize;
use serde_json::Value;
use tracker_shared::LatLng;

use crate::error::ValidationError;

/// Body of `POST /api/routing` before validation.
///
/// Both fields stay loosely typed: the tracker sends noisy points (strings,
/// nulls, sentinel zeros) which are filtered out rather than rejected.
#[derive(Debug, Deserialize)]
pub struct RawRouteRequest {
    #[serde(default)]
    pub waypoints: Option<Value>,
    #[serde(default)]
    pub stream: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RouteRequest {
    pub waypoints: Vec<LatLng>,
    pub stream: bool,
}

pub fn parse_route_request(body: &[u8], max_waypoints: usize) -> Result<RouteRequest, ValidationError> {
    let raw: RawRouteRequest =
        serde_json::from_slice(body).map_err(|_| ValidationError::InvalidWaypoints)?;
    let Some(Value::Array(entries)) = raw.waypoints else {
        return Err(ValidationError::InvalidWaypoints);
    };

    let waypoints: Vec<LatLng> = entries
        .iter()
        .filter_map(parse_waypoint)
        .filter(LatLng::is_valid)
        .collect();

    if waypoints.len() < 2 {
        return Err(ValidationError::TooFewWaypoints);
    }
    if waypoints.len() > max_waypoints {
        return Err(ValidationError::TooManyWaypoints { max: max_waypoints });
    }

    Ok(RouteRequest {
        waypoints,
        stream: raw.stream.as_ref().is_some_and(is_truthy),
    })
}

fn parse_waypoint(value: &Value) -> Option<LatLng> {
    match value.as_array()?.as_slice() {
        [lat, lng] => Some(LatLng::new(parse_number(lat)?, parse_number(lng)?)),
        _ => None,
    }
}

fn parse_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
