use log::trace;

use crate::error::Result;
use crate::geo::{haversine_distance, intermediate_point, GeoPoint};
use crate::physics::refraction::{curvature_drop, RefractionParams};
use crate::terrain::ElevationGrid;

/// Hard cap on terrain samples per ray.
const MAX_SAMPLES: usize = 100_000;

pub trait TerrainProvider {
    /// Ground elevation at `loc` (altitude ignored), or `OutOfBounds`.
    fn elevation_at(&self, loc: GeoPoint) -> Result<f64>;

    /// Grid node that `elevation_at(loc)` reads, for node-based terrain.
    /// Samples on the observer's or the target's own node are skipped.
    fn node_at(&self, _loc: GeoPoint) -> Option<(usize, usize)> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LosResult {
    pub is_visible: bool,
    /// Smallest gap (meters) between sightline and terrain plus clearance.
    /// Zero or negative when occluded.
    pub margin_m: f64,
    /// Distance from the observer of the first blocking sample.
    pub obstruction_dist_m: Option<f64>,
    /// Terrain was missing somewhere along the path.
    pub out_of_bounds: bool,
}

#[derive(Clone, Copy, Debug)]
pub struct LineOfSightEngine {
    pub refraction: RefractionParams,
    pub earth_curvature: bool,
    /// Eye height added to the observer's altitude.
    pub observer_height_m: f64,
    /// Terrain must stay this far below the sightline.
    pub clearance_m: f64,
}

impl Default for LineOfSightEngine {
    fn default() -> Self {
        Self {
            refraction: RefractionParams::default(),
            earth_curvature: true,
            observer_height_m: 0.0,
            clearance_m: 1.0,
        }
    }
}

impl LineOfSightEngine {
    pub fn new(refraction: RefractionParams) -> Self {
        Self {
            refraction,
            ..Self::default()
        }
    }

    /// True when nothing in `grid` rises into the sightline from `user` to
    /// `target`. Missing terrain counts as blocking.
    pub fn is_visible(&self, user: GeoPoint, target: GeoPoint, grid: &ElevationGrid) -> bool {
        if grid.is_empty() {
            return false;
        }
        let step_m = sample_step_m(grid, user, target);
        self.check(user, target, grid, step_m).is_visible
    }

    pub fn check<T: TerrainProvider>(
        &self,
        user: GeoPoint,
        target: GeoPoint,
        terrain: &T,
        step_m: f64,
    ) -> LosResult {
        let dist_m = haversine_distance(user, target);

        if dist_m < 1.0 {
            return LosResult {
                is_visible: true,
                margin_m: f64::INFINITY,
                obstruction_dist_m: None,
                out_of_bounds: false,
            };
        }

        let steps = ((dist_m / step_m.max(1.0)).ceil() as usize).clamp(1, MAX_SAMPLES);

        let h_user = user.altitude + self.observer_height_m;
        let h_target = target.altitude - self.drop(dist_m);

        let mut margin = f64::INFINITY;

        // The observer's ground and the summit are not in the way.
        let own_nodes = [terrain.node_at(user), terrain.node_at(target)];

        for i in 1..steps {
            let fraction = i as f64 / steps as f64;
            let d = fraction * dist_m;
            let pos = intermediate_point(user, target, fraction);

            if terrain.node_at(pos).is_some_and(|node| own_nodes.contains(&Some(node))) {
                continue;
            }

            let h_terr = match terrain.elevation_at(pos) {
                Ok(h) => h,
                Err(e) => {
                    trace!("line of sight fails soft at {d:.0} m: {e}");
                    return LosResult {
                        is_visible: false,
                        margin_m: f64::NEG_INFINITY,
                        obstruction_dist_m: Some(d),
                        out_of_bounds: true,
                    };
                }
            };

            let h_line = h_user + (h_target - h_user) * fraction;
            let h_eff = h_terr - self.drop(d) + self.clearance_m;
            let gap = h_line - h_eff;

            // Grazing counts as blocked.
            if gap <= 0.0 {
                return LosResult {
                    is_visible: false,
                    margin_m: gap,
                    obstruction_dist_m: Some(d),
                    out_of_bounds: false,
                };
            }
            margin = margin.min(gap);
        }

        LosResult {
            is_visible: true,
            margin_m: margin,
            obstruction_dist_m: None,
            out_of_bounds: false,
        }
    }

    fn drop(&self, distance_m: f64) -> f64 {
        if self.earth_curvature {
            curvature_drop(distance_m, self.refraction)
        } else {
            0.0
        }
    }
}

/// Ray step that lands at least one sample in every grid cell crossed.
pub(crate) fn sample_step_m(grid: &ElevationGrid, user: GeoPoint, target: GeoPoint) -> f64 {
    // Longitude cells narrow towards the pole; size the step for the narrowest.
    let latitude = user.latitude.abs().max(target.latitude.abs()).min(89.0);
    grid.cell_size_m() * latitude.to_radians().cos() / 2.0
}
