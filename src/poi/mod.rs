use std::collections::HashMap;
use std::time::{Duration, Instant};

use log::{debug, warn};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use crate::error::{PeakError, Result};
use crate::geo::{BoundingBox, GeoPoint};

/// A named peak.
///
/// Equality covers name and position only; bearings are derived per
/// pipeline cycle relative to the current user location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoiPoint {
    pub name: String,
    #[serde(flatten)]
    pub position: GeoPoint,
    #[serde(skip, default = "unset_bearing")]
    pub horizontal_bearing: f64,
    #[serde(skip, default = "unset_bearing")]
    pub vertical_bearing: f64,
}

fn unset_bearing() -> f64 {
    f64::NAN
}

impl PoiPoint {
    pub fn new(name: impl Into<String>, latitude: f64, longitude: f64, altitude: f64) -> Self {
        Self {
            name: name.into(),
            position: GeoPoint { latitude, longitude, altitude },
            horizontal_bearing: f64::NAN,
            vertical_bearing: f64::NAN,
        }
    }

    pub fn with_bearings(mut self, horizontal: f64, vertical: f64) -> Self {
        self.horizontal_bearing = horizontal;
        self.vertical_bearing = vertical;
        self
    }
}

impl PartialEq for PoiPoint {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.position == other.position
    }
}

/// Outcome of a POI query. Failures never escape as errors.
#[derive(Debug)]
pub enum PoiBatch {
    Received(Vec<PoiPoint>),
    Unavailable(PeakError),
}

impl PoiBatch {
    pub fn into_points(self) -> Vec<PoiPoint> {
        match self {
            PoiBatch::Received(points) => points,
            PoiBatch::Unavailable(_) => Vec::new(),
        }
    }

    pub fn is_received(&self) -> bool {
        matches!(self, PoiBatch::Received(_))
    }
}

pub trait PoiProvider: Send + Sync {
    fn fetch_pois(&self, bbox: &BoundingBox, max_results: usize, timeout: Duration) -> PoiBatch;
}

#[derive(Debug, Deserialize)]
struct OverpassResponse {
    elements: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct OverpassElement {
    #[serde(rename = "type")]
    kind: String,
    lat: Option<f64>,
    lon: Option<f64>,
    #[serde(default)]
    tags: HashMap<String, String>,
}

impl OverpassElement {
    fn into_poi(self) -> Option<PoiPoint> {
        if self.kind != "node" {
            return None;
        }
        let (lat, lon) = (self.lat?, self.lon?);
        let name = self.tags.get("name").filter(|n| !n.trim().is_empty())?;
        let altitude = self.tags.get("ele").and_then(|e| parse_elevation(e))?;
        if altitude == 0.0 {
            return None;
        }
        Some(PoiPoint::new(name.clone(), lat, lon, altitude))
    }
}

/// Reads OSM `ele` values such as `"4808.7"`, `"4,478"` or `"3798 m"`.
pub fn parse_elevation(raw: &str) -> Option<f64> {
    let cleaned: String = raw.chars().filter(|c| *c != ',').collect();
    let cleaned = cleaned.trim();
    let cleaned = cleaned.strip_suffix('m').unwrap_or(cleaned).trim_end();
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parses an Overpass JSON body, dropping unusable elements one by one.
pub fn parse_overpass(body: &str) -> Result<Vec<PoiPoint>> {
    let response: OverpassResponse =
        serde_json::from_str(body).map_err(|e| PeakError::Parse(e.to_string()))?;

    let total = response.elements.len();
    let points: Vec<PoiPoint> = response
        .elements
        .into_iter()
        .filter_map(|value| serde_json::from_value::<OverpassElement>(value).ok())
        .filter_map(OverpassElement::into_poi)
        .collect();

    debug!("overpass; kept {} of {} elements", points.len(), total);
    Ok(points)
}

/// Overpass QL for `natural=peak` nodes inside `bbox`.
pub fn overpass_query(bbox: &BoundingBox, max_results: usize, timeout: Duration) -> Result<String> {
    if max_results < 1 {
        return Err(PeakError::InvalidArgument("max_results must be at least 1".to_string()));
    }
    if timeout.as_secs() < 1 {
        return Err(PeakError::InvalidArgument(format!("timeout {timeout:?}")));
    }
    Ok(format!(
        "[out:json][timeout:{}];node[\"natural\"=\"peak\"]({},{},{},{});out body {};",
        timeout.as_secs(),
        bbox.south,
        bbox.west,
        bbox.north,
        bbox.east,
        max_results
    ))
}

pub struct OverpassProvider {
    client: Client,
    url: String,
}

impl OverpassProvider {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: Client::builder().build()?,
            url: url.into(),
        })
    }

    fn try_fetch(&self, bbox: &BoundingBox, max_results: usize, timeout: Duration) -> Result<Vec<PoiPoint>> {
        let query = overpass_query(bbox, max_results, timeout)?;
        let body = self
            .client
            .get(&self.url)
            .query(&[("data", query.as_str())])
            .timeout(timeout)
            .send()?
            .error_for_status()?
            .text()?;
        parse_overpass(&body)
    }
}

impl PoiProvider for OverpassProvider {
    fn fetch_pois(&self, bbox: &BoundingBox, max_results: usize, timeout: Duration) -> PoiBatch {
        if bbox.is_empty() {
            return PoiBatch::Received(Vec::new());
        }
        let now = Instant::now();
        match self.try_fetch(bbox, max_results, timeout) {
            Ok(points) => {
                debug!("overpass; {} peaks in {:?}", points.len(), now.elapsed());
                PoiBatch::Received(points)
            }
            Err(e) => {
                warn!("overpass query failed: {e}");
                PoiBatch::Unavailable(e)
            }
        }
    }
}
