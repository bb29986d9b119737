mod remote;

pub use remote::RemoteElevationSource;

use serde::{Deserialize, Serialize};

use crate::error::{PeakError, Result};
use crate::geo::{BoundingBox, GeoPoint};
use crate::physics::los::TerrainProvider;

/// How `ElevationGrid::sample_at` turns grid nodes into an elevation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Interpolation {
    /// Value of the closest grid node.
    #[default]
    Nearest,
    /// Weighted mix of the four surrounding nodes.
    Bilinear,
}

/// Elevation samples over a bounding box.
///
/// Row 0 is the northern edge, column 0 the western edge; node `(r, c)`
/// sits at `(north - r * cell, west + c * cell)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ElevationGrid {
    origin: BoundingBox,
    cell_size_deg: f64,
    rows: usize,
    cols: usize,
    samples: Vec<f64>, // row-major
    interpolation: Interpolation,
}

impl ElevationGrid {
    pub fn new(origin: BoundingBox, cell_size_deg: f64, samples: Vec<Vec<f64>>) -> Result<Self> {
        if !(cell_size_deg > 0.0) || !cell_size_deg.is_finite() {
            return Err(PeakError::InvalidArgument(format!("cell size {cell_size_deg}")));
        }

        let rows = samples.len();
        let cols = samples.first().map_or(0, Vec::len);
        if samples.iter().any(|row| row.len() != cols) {
            return Err(PeakError::InvalidArgument("ragged elevation rows".to_string()));
        }
        if rows == 0 || cols == 0 {
            return Ok(Self::empty(origin));
        }

        // Nodes must not extend past the box by more than rounding slack.
        let slack = cell_size_deg * 1e-6;
        if (rows - 1) as f64 * cell_size_deg > origin.lat_span() + slack
            || (cols - 1) as f64 * cell_size_deg > origin.lon_span() + slack
        {
            return Err(PeakError::InvalidArgument(format!(
                "{rows}x{cols} grid at {cell_size_deg}° exceeds bounding box {origin:?}"
            )));
        }

        Ok(Self {
            origin,
            cell_size_deg,
            rows,
            cols,
            samples: samples.into_iter().flatten().collect(),
            interpolation: Interpolation::default(),
        })
    }

    /// Grid without samples; every lookup is out of bounds.
    pub fn empty(origin: BoundingBox) -> Self {
        Self {
            origin,
            cell_size_deg: 1.0,
            rows: 0,
            cols: 0,
            samples: Vec::new(),
            interpolation: Interpolation::default(),
        }
    }

    /// Grid covering `origin` at `cell_size_deg` with every node at `elevation`.
    pub fn flat(origin: BoundingBox, cell_size_deg: f64, elevation: f64) -> Result<Self> {
        let (rows, cols) = dimensions_for(&origin, cell_size_deg)?;
        Self::new(origin, cell_size_deg, vec![vec![elevation; cols]; rows])
    }

    pub fn with_interpolation(mut self, interpolation: Interpolation) -> Self {
        self.interpolation = interpolation;
        self
    }

    /// Copy of this grid with one node replaced.
    pub fn with_sample(mut self, row: usize, col: usize, elevation: f64) -> Result<Self> {
        if row >= self.rows || col >= self.cols {
            return Err(PeakError::InvalidArgument(format!(
                "node ({row}, {col}) outside {}x{} grid",
                self.rows, self.cols
            )));
        }
        self.samples[row * self.cols + col] = elevation;
        Ok(self)
    }

    pub fn origin(&self) -> &BoundingBox {
        &self.origin
    }

    pub fn cell_size_deg(&self) -> f64 {
        self.cell_size_deg
    }

    pub fn dimensions(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Grid cell size in meters along a meridian.
    pub fn cell_size_m(&self) -> f64 {
        self.cell_size_deg * crate::geo::METERS_PER_DEGREE
    }

    /// Node position of `(row, col)`, `None` outside the grid.
    pub fn node_location(&self, row: usize, col: usize) -> Option<GeoPoint> {
        Some(GeoPoint {
            latitude: self.origin.north - row as f64 * self.cell_size_deg,
            longitude: self.origin.west + col as f64 * self.cell_size_deg,
            altitude: self.get_height(row, col)?,
        })
    }

    pub fn get_height(&self, row: usize, col: usize) -> Option<f64> {
        (row < self.rows && col < self.cols).then(|| self.height(row, col))
    }

    #[inline(always)]
    fn height(&self, row: usize, col: usize) -> f64 {
        self.samples[row * self.cols + col]
    }

    /// Closest node to `(latitude, longitude)`, `None` outside the grid.
    pub fn nearest_node(&self, latitude: f64, longitude: f64) -> Option<(usize, usize)> {
        if self.is_empty() {
            return None;
        }
        let row = ((self.origin.north - latitude) / self.cell_size_deg).round();
        let col = ((longitude - self.origin.west) / self.cell_size_deg).round();
        let inside = (0.0..=(self.rows - 1) as f64).contains(&row)
            && (0.0..=(self.cols - 1) as f64).contains(&col);
        inside.then_some((row as usize, col as usize))
    }

    /// Rows of samples, north first.
    pub fn sample_rows(&self) -> impl Iterator<Item = &[f64]> + '_ {
        // chunks_exact panics on 0
        self.samples.chunks_exact(self.cols.max(1))
    }

    pub fn sample_at(&self, latitude: f64, longitude: f64) -> Result<f64> {
        let out_of_bounds = || PeakError::OutOfBounds { latitude, longitude };

        if self.is_empty()
            || !self.origin.contains(&GeoPoint { latitude, longitude, altitude: 0.0 })
        {
            return Err(out_of_bounds());
        }

        let row = (self.origin.north - latitude) / self.cell_size_deg;
        let col = (longitude - self.origin.west) / self.cell_size_deg;
        let max_row = (self.rows - 1) as f64;
        let max_col = (self.cols - 1) as f64;

        match self.interpolation {
            Interpolation::Nearest => {
                let (r, c) = self.nearest_node(latitude, longitude).ok_or_else(out_of_bounds)?;
                Ok(self.height(r, c))
            }
            Interpolation::Bilinear => {
                if row < 0.0 || row > max_row || col < 0.0 || col > max_col {
                    return Err(out_of_bounds());
                }
                let r0 = row.floor() as usize;
                let c0 = col.floor() as usize;
                let r1 = (r0 + 1).min(self.rows - 1);
                let c1 = (c0 + 1).min(self.cols - 1);

                let tr = row - r0 as f64;
                let tc = col - c0 as f64;

                let h00 = self.height(r0, c0);
                let h01 = self.height(r0, c1);
                let h10 = self.height(r1, c0);
                let h11 = self.height(r1, c1);

                let h0 = h00 * (1.0 - tc) + h01 * tc;
                let h1 = h10 * (1.0 - tc) + h11 * tc;

                Ok(h0 * (1.0 - tr) + h1 * tr)
            }
        }
    }
}

impl TerrainProvider for ElevationGrid {
    fn elevation_at(&self, loc: GeoPoint) -> Result<f64> {
        self.sample_at(loc.latitude, loc.longitude)
    }

    fn node_at(&self, loc: GeoPoint) -> Option<(usize, usize)> {
        self.nearest_node(loc.latitude, loc.longitude)
    }
}

/// Node count `(rows, cols)` needed to cover `bbox` at `cell_size_deg`.
pub fn dimensions_for(bbox: &BoundingBox, cell_size_deg: f64) -> Result<(usize, usize)> {
    if !(cell_size_deg > 0.0) || !cell_size_deg.is_finite() {
        return Err(PeakError::InvalidArgument(format!("cell size {cell_size_deg}")));
    }
    if bbox.is_empty() {
        return Ok((0, 0));
    }
    let rows = (bbox.lat_span() / cell_size_deg + 1e-9).floor() as usize + 1;
    let cols = (bbox.lon_span() / cell_size_deg + 1e-9).floor() as usize + 1;
    Ok((rows, cols))
}

/// Anything that can produce an elevation grid for a bounding box.
pub trait ElevationSource: Send + Sync {
    fn load(&self, bbox: &BoundingBox) -> Result<ElevationGrid>;
}
