use crate::geo::{haversine_distance, GeoPoint};
use crate::physics::refraction::{curvature_drop, RefractionParams};

/// Compass heading in degrees from `from` to `to`, in `[0, 360)`.
pub fn horizontal_bearing(from: GeoPoint, to: GeoPoint) -> f64 {
    let lat1 = from.latitude.to_radians();
    let lat2 = to.latitude.to_radians();
    let dlon = (to.longitude - from.longitude).to_radians();

    let y = dlon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();
    let bearing = y.atan2(x).to_degrees().rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negative inputs
    if bearing >= 360.0 { 0.0 } else { bearing }
}

/// Elevation angle from `from` to `to`, shifted so that 90° is level with
/// the observer, 180° straight up and 0° straight down.
///
/// Returns NaN when both points coincide.
pub fn vertical_bearing(from: GeoPoint, to: GeoPoint, refraction: Option<RefractionParams>) -> f64 {
    let distance = haversine_distance(from, to);
    let mut height_diff = to.altitude - from.altitude;

    if distance == 0.0 && height_diff == 0.0 {
        return f64::NAN;
    }

    if let Some(params) = refraction {
        height_diff -= curvature_drop(distance, params);
    }

    height_diff.atan2(distance).to_degrees() + 90.0
}

/// Bearing computation bound to one refraction model.
#[derive(Clone, Copy, Debug, Default)]
pub struct BearingCalculator {
    /// `None` disables the curvature correction of vertical bearings.
    pub refraction: Option<RefractionParams>,
}

impl BearingCalculator {
    pub fn new(refraction: Option<RefractionParams>) -> Self {
        Self { refraction }
    }

    pub fn horizontal(&self, from: GeoPoint, to: GeoPoint) -> f64 {
        horizontal_bearing(from, to)
    }

    pub fn vertical(&self, from: GeoPoint, to: GeoPoint) -> f64 {
        vertical_bearing(from, to, self.refraction)
    }

    /// `(horizontal, vertical)` bearings of `to` seen from `from`.
    pub fn bearings(&self, from: GeoPoint, to: GeoPoint) -> (f64, f64) {
        (self.horizontal(from, to), self.vertical(from, to))
    }
}
