use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// A waypoint in degrees, as sent by the tracker (`[lat, lng]` on the wire).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Finite, inside the WGS84 ranges, and not the `(0, 0)` "no fix" sentinel.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && self.lat.abs() <= 90.0
            && self.lng.abs() <= 180.0
            && !(self.lat == 0.0 && self.lng == 0.0)
    }

    /// GeoJSON position order.
    pub fn to_position(self) -> [f64; 2] {
        [self.lng, self.lat]
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeometryKind {
    #[default]
    LineString,
}

/// GeoJSON-style LineString, positions in `[lng, lat]` order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    #[serde(rename = "type", default)]
    pub kind: GeometryKind,
    pub coordinates: Vec<[f64; 2]>,
}

impl Geometry {
    pub fn line_string(coordinates: Vec<[f64; 2]>) -> Self {
        Self {
            kind: GeometryKind::LineString,
            coordinates,
        }
    }
}

/// One driving route: meters, seconds and the polyline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteResult {
    pub distance: f64,
    pub duration: f64,
    pub geometry: Geometry,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentCounts {
    pub total: usize,
    pub cached: usize,
    pub fetched: usize,
    pub failed: usize,
}

/// One line of the newline-delimited JSON route stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum RouteEvent {
    Status {
        message: String,
        total_segments: usize,
    },
    Segment {
        index: usize,
        progress: usize,
        total: usize,
        cached: bool,
        route: Arc<RouteResult>,
    },
    SegmentError {
        index: usize,
        progress: usize,
        total: usize,
        error: String,
    },
    Warning {
        message: String,
        failed_segments: Vec<usize>,
    },
    CompleteRoute {
        route: Arc<RouteResult>,
        waypoints: usize,
        segments: SegmentCounts,
    },
    Error {
        message: String,
    },
}

impl RouteEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::CompleteRoute { .. } | Self::Error { .. })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputeRouteResponse {
    pub success: bool,
    pub route: Arc<RouteResult>,
    pub cached: bool,
    pub waypoints: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub total_routes_in_cache: usize,
    pub valid_routes_in_cache: usize,
    pub total_segments_in_cache: usize,
    pub valid_segments_in_cache: usize,
    pub pending_full_routes: usize,
    pub pending_segments: usize,
    pub pending_streams: usize,
    /// Milliseconds.
    #[serde(rename = "cacheTTL")]
    pub cache_ttl: u64,
    /// Milliseconds.
    #[serde(rename = "pendingRequestTTL")]
    pub pending_request_ttl: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStatsResponse {
    pub stats: CacheStats,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvictionReport {
    pub message: String,
    pub deleted_routes: usize,
    pub deleted_segments: usize,
    pub cleared_pending_full_routes: usize,
    pub cleared_pending_segments: usize,
    pub cleared_pending_streams: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinel_origin_is_invalid() {
        assert!(!LatLng::new(0.0, 0.0).is_valid());
        assert!(LatLng::new(0.0, 12.5).is_valid());
        assert!(LatLng::new(-33.9, 0.0).is_valid());
    }

    #[test]
    fn test_out_of_range_and_non_finite_are_invalid() {
        assert!(!LatLng::new(91.0, 0.0).is_valid());
        assert!(!LatLng::new(45.0, -180.5).is_valid());
        assert!(!LatLng::new(f64::NAN, 5.0).is_valid());
        assert!(!LatLng::new(45.0, f64::INFINITY).is_valid());
        assert!(LatLng::new(90.0, 180.0).is_valid());
    }

    #[test]
    fn test_event_wire_format() {
        let event = RouteEvent::SegmentError {
            index: 2,
            progress: 3,
            total: 4,
            error: "boom".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "segment_error");
        assert_eq!(json["progress"], 3);

        let status = RouteEvent::Status {
            message: "start".to_string(),
            total_segments: 4,
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["totalSegments"], 4);
    }

    #[test]
    fn test_stats_ttl_field_names() {
        let json = serde_json::to_value(CacheStats::default()).unwrap();
        assert!(json.get("cacheTTL").is_some());
        assert!(json.get("pendingRequestTTL").is_some());
        assert!(json.get("validSegmentsInCache").is_some());
    }

    #[test]
    fn test_geometry_type_tag() {
        let geometry = Geometry::line_string(vec![[5.0, 45.0]]);
        let json = serde_json::to_value(&geometry).unwrap();
        assert_eq!(json["type"], "LineString");
    }
}
