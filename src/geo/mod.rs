use serde::{Deserialize, Serialize};

use crate::error::{PeakError, Result};

pub const EARTH_RADIUS: f64 = 6378137.0;

/// Meters per degree of latitude on the reference sphere.
pub const METERS_PER_DEGREE: f64 = EARTH_RADIUS * std::f64::consts::PI / 180.0;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64, // AMSL, 0 when unknown
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64, altitude: f64) -> Result<Self> {
        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            return Err(PeakError::InvalidArgument(format!(
                "coordinates out of range: ({latitude}, {longitude})"
            )));
        }
        if !altitude.is_finite() {
            return Err(PeakError::InvalidArgument(format!("altitude {altitude}")));
        }
        Ok(Self { latitude, longitude, altitude })
    }

    /// True for the (0, 0) placeholder reported before any location fix.
    pub fn is_unset(&self) -> bool {
        self.latitude == 0.0 && self.longitude == 0.0
    }

    pub fn with_altitude(self, altitude: f64) -> Self {
        Self { altitude, ..self }
    }

    /// Great-circle surface distance in meters, altitude ignored.
    pub fn distance_to(&self, other: &GeoPoint) -> f64 {
        haversine_distance(*self, *other)
    }
}

pub fn haversine_distance(p1: GeoPoint, p2: GeoPoint) -> f64 {
    let lat1 = p1.latitude.to_radians();
    let lat2 = p2.latitude.to_radians();
    let dlat = (p2.latitude - p1.latitude).to_radians();
    let dlon = (p2.longitude - p1.longitude).to_radians();

    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS * c
}

/// Point at `fraction` of the great-circle route from `start` to `end`.
///
/// Altitude is left at 0; callers sample terrain for it.
pub fn intermediate_point(start: GeoPoint, end: GeoPoint, fraction: f64) -> GeoPoint {
    let lat1 = start.latitude.to_radians();
    let lon1 = start.longitude.to_radians();
    let lat2 = end.latitude.to_radians();
    let lon2 = end.longitude.to_radians();

    let (lat1_sin, lat1_cos) = lat1.sin_cos();
    let (lat2_sin, lat2_cos) = lat2.sin_cos();

    let k = (((lat1 - lat2) / 2.0).sin().powi(2)
        + lat1_cos * lat2_cos * ((lon1 - lon2) / 2.0).sin().powi(2))
    .sqrt();
    let d = 2.0 * k.asin();

    if d.abs() < f64::EPSILON {
        return GeoPoint { altitude: 0.0, ..start };
    }

    let a = ((1.0 - fraction) * d).sin() / d.sin();
    let b = (fraction * d).sin() / d.sin();

    let x = a * lat1_cos * lon1.cos() + b * lat2_cos * lon2.cos();
    let y = a * lat1_cos * lon1.sin() + b * lat2_cos * lon2.sin();
    let z = a * lat1_sin + b * lat2_sin;

    GeoPoint {
        latitude: z.atan2(x.hypot(y)).to_degrees(),
        longitude: y.atan2(x).to_degrees(),
        altitude: 0.0,
    }
}

/// Rectangular lat/lon region in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
}

impl BoundingBox {
    pub fn new(north: f64, south: f64, east: f64, west: f64) -> Result<Self> {
        let finite = [north, south, east, west].iter().all(|v| v.is_finite());
        if !finite || north < south || east < west {
            return Err(PeakError::InvalidArgument(format!(
                "malformed bounding box n={north} s={south} e={east} w={west}"
            )));
        }
        if !(-90.0..=90.0).contains(&south) || !(-90.0..=90.0).contains(&north) {
            return Err(PeakError::InvalidArgument(format!("latitude span {south}..{north}")));
        }
        if !(-180.0..=180.0).contains(&west) || !(-180.0..=180.0).contains(&east) {
            return Err(PeakError::InvalidArgument(format!("longitude span {west}..{east}")));
        }
        Ok(Self { north, south, east, west })
    }

    /// Box reaching `range_km` from `center` in each cardinal direction.
    pub fn around(center: GeoPoint, range_km: f64) -> Result<Self> {
        if !(range_km > 0.0) {
            return Err(PeakError::InvalidArgument(format!("range {range_km} km")));
        }
        let d_lat = range_km * 1000.0 / METERS_PER_DEGREE;
        // Longitude degrees shrink with cos(lat); clamp near the poles.
        let cos_lat = center.latitude.to_radians().cos().max(1e-6);
        let d_lon = (d_lat / cos_lat).min(180.0);

        Self::new(
            (center.latitude + d_lat).min(90.0),
            (center.latitude - d_lat).max(-90.0),
            (center.longitude + d_lon).min(180.0),
            (center.longitude - d_lon).max(-180.0),
        )
    }

    pub fn contains(&self, point: &GeoPoint) -> bool {
        (self.south..=self.north).contains(&point.latitude)
            && (self.west..=self.east).contains(&point.longitude)
    }

    pub fn is_empty(&self) -> bool {
        self.north - self.south <= 0.0 || self.east - self.west <= 0.0
    }

    pub fn center(&self) -> GeoPoint {
        GeoPoint {
            latitude: (self.north + self.south) / 2.0,
            longitude: (self.east + self.west) / 2.0,
            altitude: 0.0,
        }
    }

    pub fn lat_span(&self) -> f64 {
        self.north - self.south
    }

    pub fn lon_span(&self) -> f64 {
        self.east - self.west
    }
}
