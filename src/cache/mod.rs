use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, PoisonError};

use crate::geo::BoundingBox;
use crate::poi::PoiPoint;
use crate::terrain::ElevationGrid;

/// Bounding box rounded to 1e-4 degrees (about 11 m).
#[derive(Hash, PartialEq, Eq, Clone, Copy, Debug)]
pub struct AreaKey {
    pub north: i64,
    pub south: i64,
    pub east: i64,
    pub west: i64,
}

impl From<&BoundingBox> for AreaKey {
    fn from(bbox: &BoundingBox) -> Self {
        let q = |v: f64| (v * 1e4).round() as i64;
        Self {
            north: q(bbox.north),
            south: q(bbox.south),
            east: q(bbox.east),
            west: q(bbox.west),
        }
    }
}

/// Peaks and terrain acquired together for one area.
#[derive(Debug, Clone)]
pub struct Acquisition {
    pub pois: Vec<PoiPoint>,
    pub grid: Arc<ElevationGrid>,
}

pub struct AcquisitionCache {
    cache: Mutex<LruCache<AreaKey, Arc<Acquisition>>>,
}

impl Default for AcquisitionCache {
    fn default() -> Self {
        Self::new(16)
    }
}

impl AcquisitionCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn get(&self, bbox: &BoundingBox) -> Option<Arc<Acquisition>> {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache.get(&AreaKey::from(bbox)).cloned()
    }

    pub fn insert(&self, bbox: &BoundingBox, acquisition: Arc<Acquisition>) {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache.put(AreaKey::from(bbox), acquisition);
    }

    pub fn len(&self) -> usize {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache.clear();
    }
}
