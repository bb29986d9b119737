use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PeakError, Result};
use crate::physics::refraction::RefractionParams;

pub const DEFAULT_RANGE_IN_KM: f64 = 20.0;
pub const DEFAULT_QUERY_MAX_RESULTS: usize = 300;
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 10;

/// One arc-second, the finest public DEM resolution.
pub const MIN_GRID_CELL_DEG: f64 = 1.0 / 3600.0;

/// Which labeled peaks the overlay asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayMode {
    #[default]
    All,
    InSight,
    OutOfSight,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub range_km: f64,
    pub max_results: usize,
    pub timeout_secs: u64,
    pub offline_mode: bool,
    pub display_mode: DisplayMode,
    pub filter_pois: bool,
    pub overpass_url: String,
    pub elevation_url: String,
    pub grid_cell_deg: f64,
    /// User movement below this distance does not trigger a refresh.
    pub min_movement_m: f64,
    pub observer_height_m: f64,
    pub clearance_m: f64,
    pub k_factor: f64,
    pub earth_curvature: bool,
    pub offline_file: PathBuf,
    pub cache_capacity: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            range_km: DEFAULT_RANGE_IN_KM,
            max_results: DEFAULT_QUERY_MAX_RESULTS,
            timeout_secs: DEFAULT_QUERY_TIMEOUT_SECS,
            offline_mode: false,
            display_mode: DisplayMode::All,
            filter_pois: true,
            overpass_url: "https://overpass-api.de/api/interpreter".to_string(),
            elevation_url: "https://api.opentopodata.org/v1/srtm90m".to_string(),
            grid_cell_deg: 0.01,
            min_movement_m: 50.0,
            observer_height_m: 0.0,
            clearance_m: 1.0,
            k_factor: RefractionParams::default().k_factor,
            earth_curvature: true,
            offline_file: PathBuf::from("offline_content.json"),
            cache_capacity: 16,
        }
    }
}

impl Settings {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        let settings: Settings = serde_json::from_reader(reader)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(PeakError::InvalidArgument(msg));

        if !(self.range_km > 0.1) {
            return invalid(format!("range_km {} must exceed 0.1", self.range_km));
        }
        if self.max_results < 1 {
            return invalid("max_results must be at least 1".to_string());
        }
        if self.timeout_secs < 1 {
            return invalid("timeout_secs must be at least 1".to_string());
        }
        if !(self.grid_cell_deg >= MIN_GRID_CELL_DEG) || !self.grid_cell_deg.is_finite() {
            return invalid(format!(
                "grid_cell_deg {} must be at least {MIN_GRID_CELL_DEG}",
                self.grid_cell_deg
            ));
        }
        if !(self.k_factor > 0.0) {
            return invalid(format!("k_factor {}", self.k_factor));
        }
        if !(self.min_movement_m >= 0.0) || !(self.clearance_m >= 0.0) {
            return invalid("distances must be non-negative".to_string());
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn refraction(&self) -> RefractionParams {
        RefractionParams { k_factor: self.k_factor }
    }
}
