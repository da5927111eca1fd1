use crate::models::courier::GeoPoint;

/// Coordinates are plain floating-point degrees; the only requirement is
/// that both components are finite numbers.
pub fn is_finite_point(point: &GeoPoint) -> bool {
    point.lat.is_finite() && point.lng.is_finite()
}

/// Linear interpolation between two points, `progress` clamped to [0, 1].
/// Good enough for the simulated-delivery marker; no great-circle math is
/// needed at city scale.
pub fn lerp(from: &GeoPoint, to: &GeoPoint, progress: f64) -> GeoPoint {
    let t = progress.clamp(0.0, 1.0);
    // Weighted form so t = 1.0 lands exactly on `to`.
    GeoPoint {
        lat: from.lat * (1.0 - t) + to.lat * t,
        lng: from.lng * (1.0 - t) + to.lng * t,
    }
}
