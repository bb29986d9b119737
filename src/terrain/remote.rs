use std::thread;
use std::time::{Duration, Instant};

use log::debug;
use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde::Deserialize;

use super::{dimensions_for, ElevationGrid, ElevationSource};
use crate::error::{PeakError, Result};
use crate::geo::BoundingBox;

/// Locations per request accepted by the public OpenTopoData instance.
const LOCATIONS_PER_REQUEST: usize = 100;

/// Upper bound on nodes fetched for one grid; the cell size grows to fit.
const MAX_GRID_NODES: usize = 4_096;

/// The public OpenTopoData instance allows one call per second.
const DEFAULT_MIN_REQUEST_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Deserialize)]
struct ElevationResponse {
    status: String,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    results: Vec<ElevationResult>,
}

#[derive(Debug, Deserialize)]
struct ElevationResult {
    /// `null` over oceans and data voids.
    elevation: Option<f64>,
}

enum BatchOutcome {
    Elevations(Vec<f64>),
    RateLimited,
}

/// Elevation grids sampled from an OpenTopoData-compatible service.
///
/// Requests are spaced at least `min_interval` apart and one `load` never
/// outlives `timeout`; the grid is coarsened until its requests fit.
pub struct RemoteElevationSource {
    client: Client,
    url: String,
    cell_size_deg: f64,
    timeout: Duration,
    min_interval: Duration,
}

impl RemoteElevationSource {
    pub fn new(url: impl Into<String>, cell_size_deg: f64, timeout: Duration) -> Result<Self> {
        if timeout.is_zero() {
            return Err(PeakError::InvalidArgument("zero timeout".to_string()));
        }
        if !(cell_size_deg > 0.0) {
            return Err(PeakError::InvalidArgument(format!("cell size {cell_size_deg}")));
        }
        Ok(Self {
            client: Client::builder().build()?,
            url: url.into(),
            cell_size_deg,
            timeout,
            min_interval: DEFAULT_MIN_REQUEST_INTERVAL,
        })
    }

    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    /// Spacing between consecutive requests, for instances with other limits.
    pub fn with_min_interval(mut self, min_interval: Duration) -> Self {
        self.min_interval = min_interval;
        self
    }

    /// Nodes that fit in one `load`. Half the deadline is spent on pacing,
    /// the rest is left for the requests themselves.
    fn node_budget(&self) -> usize {
        if self.min_interval.is_zero() {
            return MAX_GRID_NODES;
        }
        let requests = (self.timeout.as_secs_f64() / self.min_interval.as_secs_f64() / 2.0).floor();
        let requests = (requests as usize).max(1);
        (requests * LOCATIONS_PER_REQUEST).min(MAX_GRID_NODES)
    }

    /// Cell size actually used for `bbox`, coarsened to fit the node budget.
    fn cell_size_for(&self, bbox: &BoundingBox) -> Result<f64> {
        let budget = self.node_budget();
        let mut cell = self.cell_size_deg;
        loop {
            let (rows, cols) = dimensions_for(bbox, cell)?;
            if rows * cols <= budget {
                return Ok(cell);
            }
            cell *= 1.5;
        }
    }

    /// Waits for the next request slot and retries rate-limited calls until
    /// `deadline`.
    fn fetch_paced(&self, locations: &str, deadline: Instant, last_request: &mut Option<Instant>) -> Result<Vec<f64>> {
        loop {
            if let Some(last) = *last_request {
                let slot = last + self.min_interval;
                if slot >= deadline {
                    return Err(PeakError::Network("timed out: elevation grid deadline".to_string()));
                }
                let now = Instant::now();
                if slot > now {
                    thread::sleep(slot - now);
                }
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(PeakError::Network("timed out: elevation grid deadline".to_string()));
            }

            *last_request = Some(Instant::now());
            match self.fetch_batch(locations, remaining)? {
                BatchOutcome::Elevations(values) => return Ok(values),
                BatchOutcome::RateLimited => debug!("elevation service rate limited; backing off"),
            }
        }
    }

    fn fetch_batch(&self, locations: &str, timeout: Duration) -> Result<BatchOutcome> {
        let response = self
            .client
            .get(&self.url)
            .query(&[("locations", locations)])
            .timeout(timeout)
            .send()?;

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            return Ok(BatchOutcome::RateLimited);
        }
        let response: ElevationResponse = response.error_for_status()?.json()?;

        if response.status != "OK" {
            return Err(PeakError::Network(
                response.error.unwrap_or(response.status),
            ));
        }

        Ok(BatchOutcome::Elevations(
            response
                .results
                .into_iter()
                .map(|r| r.elevation.unwrap_or(0.0))
                .collect(),
        ))
    }
}

impl ElevationSource for RemoteElevationSource {
    fn load(&self, bbox: &BoundingBox) -> Result<ElevationGrid> {
        if bbox.is_empty() {
            return Ok(ElevationGrid::empty(*bbox));
        }

        let now = Instant::now();
        let deadline = now + self.timeout;
        let cell = self.cell_size_for(bbox)?;
        let (rows, cols) = dimensions_for(bbox, cell)?;

        let nodes: Vec<(f64, f64)> = (0..rows)
            .flat_map(|r| {
                (0..cols).map(move |c| (bbox.north - r as f64 * cell, bbox.west + c as f64 * cell))
            })
            .collect();

        let mut elevations = Vec::with_capacity(nodes.len());
        let mut last_request = None;
        for batch in nodes.chunks(LOCATIONS_PER_REQUEST) {
            let locations = batch
                .iter()
                .map(|(lat, lon)| format!("{lat:.6},{lon:.6}"))
                .collect::<Vec<_>>()
                .join("|");
            let values = self.fetch_paced(&locations, deadline, &mut last_request)?;
            if values.len() != batch.len() {
                return Err(PeakError::Parse(format!(
                    "expected {} elevations, got {}",
                    batch.len(),
                    values.len()
                )));
            }
            elevations.extend(values);
        }

        debug!(
            "elevation grid; {rows}x{cols} at {cell:.4}°, fetch: {:?}",
            now.elapsed()
        );

        let samples = elevations.chunks(cols).map(<[f64]>::to_vec).collect();
        ElevationGrid::new(*bbox, cell, samples)
    }
}
