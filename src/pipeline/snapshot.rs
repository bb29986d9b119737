use std::collections::HashSet;

use itertools::Itertools;

use crate::config::DisplayMode;
use crate::geo::{BoundingBox, GeoPoint};
use crate::poi::PoiPoint;

#[derive(Debug, Clone, PartialEq)]
pub struct LabeledPoi {
    pub poi: PoiPoint,
    /// Line of sight from the user is clear.
    pub visible: bool,
}

/// One published pipeline result. Never mutated after construction.
#[derive(Debug, Clone, Default)]
pub struct LabeledPoiSet {
    generation: u64,
    user: Option<GeoPoint>,
    bounding_box: Option<BoundingBox>,
    entries: Vec<LabeledPoi>,
    line_of_sight_available: bool,
}

impl LabeledPoiSet {
    /// Keeps the first entry of any duplicated peak.
    pub fn new(
        generation: u64,
        user: GeoPoint,
        bounding_box: BoundingBox,
        labeled: impl IntoIterator<Item = LabeledPoi>,
        line_of_sight_available: bool,
    ) -> Self {
        let mut entries: Vec<LabeledPoi> = Vec::new();
        for item in labeled {
            if !entries.iter().any(|e| e.poi == item.poi) {
                entries.push(item);
            }
        }
        Self {
            generation,
            user: Some(user),
            bounding_box: Some(bounding_box),
            entries,
            line_of_sight_available,
        }
    }

    pub fn empty(generation: u64) -> Self {
        Self {
            generation,
            ..Self::default()
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn user(&self) -> Option<GeoPoint> {
        self.user
    }

    pub fn bounding_box(&self) -> Option<BoundingBox> {
        self.bounding_box
    }

    /// False when no terrain was available and every peak is marked hidden
    /// for lack of data rather than by obstruction.
    pub fn line_of_sight_available(&self) -> bool {
        self.line_of_sight_available
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, poi: &PoiPoint) -> Option<bool> {
        self.entries.iter().find(|e| e.poi == *poi).map(|e| e.visible)
    }

    /// Peaks in acquisition order.
    pub fn pois(&self) -> Vec<&PoiPoint> {
        self.entries.iter().map(|e| &e.poi).collect()
    }

    pub fn all(&self) -> Vec<&LabeledPoi> {
        self.entries.iter().collect()
    }

    pub fn in_sight(&self) -> Vec<&LabeledPoi> {
        self.entries.iter().filter(|e| e.visible).collect()
    }

    pub fn out_of_sight(&self) -> Vec<&LabeledPoi> {
        self.entries.iter().filter(|e| !e.visible).collect()
    }

    pub fn filtered(&self) -> Vec<&LabeledPoi> {
        filter_by_bearing(self.all())
    }

    pub fn filtered_in_sight(&self) -> Vec<&LabeledPoi> {
        filter_by_bearing(self.in_sight())
    }

    pub fn filtered_out_of_sight(&self) -> Vec<&LabeledPoi> {
        filter_by_bearing(self.out_of_sight())
    }

    pub fn view(&self, mode: DisplayMode, filter: bool) -> Vec<&LabeledPoi> {
        let selected = match mode {
            DisplayMode::All => self.all(),
            DisplayMode::InSight => self.in_sight(),
            DisplayMode::OutOfSight => self.out_of_sight(),
        };
        if filter { filter_by_bearing(selected) } else { selected }
    }
}

/// Keeps, per whole degree of horizontal bearing, only the peak standing
/// highest in the view. Peaks without a bearing are dropped.
fn filter_by_bearing(labeled: Vec<&LabeledPoi>) -> Vec<&LabeledPoi> {
    let keep: HashSet<usize> = labeled
        .iter()
        .enumerate()
        .filter(|(_, l)| l.poi.horizontal_bearing.is_finite())
        .into_group_map_by(|(_, l)| l.poi.horizontal_bearing.floor() as i64)
        .into_values()
        .filter_map(|column| {
            column
                .into_iter()
                .max_by(|(_, a), (_, b)| a.poi.vertical_bearing.total_cmp(&b.poi.vertical_bearing))
                .map(|(index, _)| index)
        })
        .collect();

    labeled
        .into_iter()
        .enumerate()
        .filter(|(index, _)| keep.contains(index))
        .map(|(_, l)| l)
        .collect()
}
