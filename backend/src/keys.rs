//! Cache keys for waypoint sequences and single segments.
//!
//! Coordinates are quantized to [`KEY_PRECISION`] fractional digits before
//! formatting, so float encodings that differ only past the sixth decimal
//! (roughly 11 cm) land on the same key.

use tracker_shared::LatLng;

pub const KEY_PRECISION: usize = 6;

/// Directed key for the `from -> to` segment.
pub fn segment_key(from: LatLng, to: LatLng) -> String {
    format!("{}-{}", coordinate_key(from), coordinate_key(to))
}

/// Key for a whole ordered waypoint sequence.
pub fn route_key(waypoints: &[LatLng]) -> String {
    waypoints
        .iter()
        .map(|waypoint| coordinate_key(*waypoint))
        .collect::<Vec<_>>()
        .join("|")
}

pub fn coordinate_key(coord: LatLng) -> String {
    format!("{},{}", quantize(coord.lat), quantize(coord.lng))
}

fn quantize(value: f64) -> String {
    let formatted = format!("{value:.KEY_PRECISION$}");
    match formatted.strip_prefix('-') {
        // -0.0000001 rounds to "-0.000000", which must collide with "0.000000"
        Some(magnitude) if magnitude.bytes().all(|b| b == b'0' || b == b'.') => {
            magnitude.to_string()
        }
        _ => formatted,
    }
}
