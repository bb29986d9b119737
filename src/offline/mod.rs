use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::geo::{BoundingBox, GeoPoint};
use crate::poi::PoiPoint;
use crate::terrain::ElevationGrid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Topography {
    /// Rows north to south, columns west to east.
    pub elevation_map: Vec<Vec<f64>>,
    /// Degrees between neighbouring nodes.
    pub cell_size: f64,
}

/// Area saved for use without network access.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfflineSnapshot {
    #[serde(rename = "boundingBox")]
    pub bounding_box: BoundingBox,
    pub topography: Topography,
    #[serde(rename = "POIPoints")]
    pub poi_points: Vec<PoiPoint>,
}

impl OfflineSnapshot {
    pub fn capture(bounding_box: BoundingBox, grid: &ElevationGrid, poi_points: Vec<PoiPoint>) -> Self {
        Self {
            bounding_box,
            topography: Topography {
                elevation_map: grid.sample_rows().map(<[f64]>::to_vec).collect(),
                cell_size: grid.cell_size_deg(),
            },
            poi_points,
        }
    }

    pub fn grid(&self) -> Result<ElevationGrid> {
        ElevationGrid::new(
            self.bounding_box,
            self.topography.cell_size,
            self.topography.elevation_map.clone(),
        )
    }
}

/// What the offline path hands the pipeline for one location.
#[derive(Debug, Clone)]
pub struct OfflineContent {
    pub bounding_box: BoundingBox,
    pub poi_points: Vec<PoiPoint>,
    pub grid: ElevationGrid,
}

/// Single snapshot file, rewritten whole on every save.
#[derive(Debug, Clone)]
pub struct OfflineStore {
    path: PathBuf,
}

impl OfflineStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save(&self, snapshot: &OfflineSnapshot) -> Result<()> {
        let tmp = self.path.with_extension("tmp");
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            serde_json::to_writer_pretty(&mut writer, snapshot)?;
            writer.flush()?;
        }
        std::fs::rename(&tmp, &self.path)?;
        debug!(
            "saved offline snapshot with {} peaks to {:?}",
            snapshot.poi_points.len(),
            self.path
        );
        Ok(())
    }

    /// `Ok(None)` when nothing has been saved yet.
    pub fn load(&self) -> Result<Option<OfflineSnapshot>> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let snapshot = serde_json::from_reader(BufReader::new(file))?;
        Ok(Some(snapshot))
    }

    /// Saved content usable at `user`.
    ///
    /// Peaks are only returned while `user` stands inside the saved box;
    /// elsewhere the list is empty.
    pub fn load_for(&self, user: GeoPoint) -> Result<Option<OfflineContent>> {
        let Some(snapshot) = self.load()? else {
            return Ok(None);
        };

        let grid = snapshot.grid().unwrap_or_else(|e| {
            warn!("offline topography unusable: {e}");
            ElevationGrid::empty(snapshot.bounding_box)
        });

        let poi_points = if snapshot.bounding_box.contains(&user) {
            snapshot.poi_points
        } else {
            debug!("user {user:?} outside saved area {:?}", snapshot.bounding_box);
            Vec::new()
        };

        Ok(Some(OfflineContent {
            bounding_box: snapshot.bounding_box,
            poi_points,
            grid,
        }))
    }
}
