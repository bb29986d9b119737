use serde::{Deserialize, Serialize};

use crate::geo::EARTH_RADIUS;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RefractionParams {
    pub k_factor: f64,
}

impl Default for RefractionParams {
    fn default() -> Self {
        Self { k_factor: 4.0 / 3.0 }
    }
}

pub fn effective_earth_radius(params: RefractionParams) -> f64 {
    EARTH_RADIUS * params.k_factor
}

/// Apparent drop (meters) of a point `distance_m` away below the observer's
/// tangent plane.
pub fn curvature_drop(distance_m: f64, params: RefractionParams) -> f64 {
    (distance_m * distance_m) / (2.0 * effective_earth_radius(params))
}
