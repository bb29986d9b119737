use crate::error::{PeakError, Result};
use crate::pipeline::LabeledPoi;
use crate::poi::PoiPoint;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Heading {
    /// Compass direction the camera faces, degrees clockwise from north.
    pub azimuth_deg: f64,
    /// Camera tilt, 0 at the horizon and positive upwards.
    pub pitch_deg: f64,
}

pub trait HeadingSource {
    /// Latest heading, `None` until the sensors have settled.
    fn heading(&self) -> Option<Heading>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldOfView {
    pub horizontal_deg: f64,
    pub vertical_deg: f64,
}

impl FieldOfView {
    pub fn new(horizontal_deg: f64, vertical_deg: f64) -> Result<Self> {
        let valid = |v: f64| v > 0.0 && v <= 360.0;
        if !valid(horizontal_deg) || !valid(vertical_deg) {
            return Err(PeakError::InvalidArgument(format!(
                "field of view {horizontal_deg}x{vertical_deg}"
            )));
        }
        Ok(Self { horizontal_deg, vertical_deg })
    }

    /// Swaps axes for portrait/landscape rotation.
    pub fn rotated(self) -> Self {
        Self {
            horizontal_deg: self.vertical_deg,
            vertical_deg: self.horizontal_deg,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FrameLabel<'a> {
    pub poi: &'a PoiPoint,
    pub visible: bool,
    /// 0 at the left edge, 1 at the right edge.
    pub x: f64,
    /// 0 at the top edge, 1 at the bottom edge.
    pub y: f64,
}

/// Signed angle from `from` to `to` in `[-180, 180)`.
pub fn azimuth_delta(from: f64, to: f64) -> f64 {
    (to - from + 180.0).rem_euclid(360.0) - 180.0
}

pub fn frame_labels<'a, I>(labels: I, heading: Heading, fov: FieldOfView) -> Vec<FrameLabel<'a>>
where
    I: IntoIterator<Item = &'a LabeledPoi>,
{
    labels
        .into_iter()
        .filter_map(|label| {
            let poi = &label.poi;
            if !poi.horizontal_bearing.is_finite() || !poi.vertical_bearing.is_finite() {
                return None;
            }

            let dx = azimuth_delta(heading.azimuth_deg, poi.horizontal_bearing);
            // Vertical bearings put the horizon at 90°.
            let dy = (poi.vertical_bearing - 90.0) - heading.pitch_deg;

            let x = 0.5 + dx / fov.horizontal_deg;
            let y = 0.5 - dy / fov.vertical_deg;
            let inside = (0.0..=1.0).contains(&x) && (0.0..=1.0).contains(&y);

            inside.then_some(FrameLabel {
                poi,
                visible: label.visible,
                x,
                y,
            })
        })
        .collect()
}

/// `frame_labels` using the current reading of `source`; empty without one.
pub fn frame_labels_from<'a, I, S>(labels: I, source: &S, fov: FieldOfView) -> Vec<FrameLabel<'a>>
where
    I: IntoIterator<Item = &'a LabeledPoi>,
    S: HeadingSource + ?Sized,
{
    match source.heading() {
        Some(heading) => frame_labels(labels, heading, fov),
        None => Vec::new(),
    }
}
