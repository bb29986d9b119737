mod snapshot;
mod worker;

pub use snapshot::{LabeledPoi, LabeledPoiSet};
pub use worker::PipelineWorker;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread;
use std::time::Instant;

use log::{debug, info, warn};

use crate::cache::{Acquisition, AcquisitionCache};
use crate::config::Settings;
use crate::error::{PeakError, Result};
use crate::geo::{BoundingBox, GeoPoint};
use crate::offline::{OfflineSnapshot, OfflineStore};
use crate::physics::bearing::BearingCalculator;
use crate::physics::los::LineOfSightEngine;
use crate::poi::{OverpassProvider, PoiBatch, PoiProvider};
use crate::terrain::{ElevationGrid, ElevationSource, RemoteElevationSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PipelineState {
    #[default]
    Idle,
    BoundingBoxComputed,
    AwaitingPoiAndGrid,
    BearingsComputed,
    VisibilityComputed,
    Published,
}

#[derive(Debug, Default)]
struct UserState {
    current: Option<GeoPoint>,
    /// Location that last triggered a refresh.
    anchor: Option<GeoPoint>,
}

/// Refresh cycle turning a user location into labeled peaks.
///
/// Results are published by swapping an `Arc<LabeledPoiSet>`; a cycle
/// overtaken by a newer location or refresh is dropped.
pub struct Pipeline {
    settings: RwLock<Settings>,
    pois: Arc<dyn PoiProvider>,
    elevation: Arc<dyn ElevationSource>,
    offline: OfflineStore,
    cache: AcquisitionCache,
    user: Mutex<UserState>,
    state: Mutex<PipelineState>,
    generation: AtomicU64,
    published: RwLock<Arc<LabeledPoiSet>>,
    last_online: Mutex<Option<(BoundingBox, Arc<Acquisition>)>>,
}

impl Pipeline {
    pub fn new(
        settings: Settings,
        pois: Arc<dyn PoiProvider>,
        elevation: Arc<dyn ElevationSource>,
    ) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            offline: OfflineStore::new(settings.offline_file.clone()),
            cache: AcquisitionCache::new(settings.cache_capacity),
            settings: RwLock::new(settings),
            pois,
            elevation,
            user: Mutex::new(UserState::default()),
            state: Mutex::new(PipelineState::Idle),
            generation: AtomicU64::new(0),
            published: RwLock::new(Arc::new(LabeledPoiSet::empty(0))),
            last_online: Mutex::new(None),
        })
    }

    /// Pipeline backed by the Overpass and OpenTopoData HTTP services.
    pub fn from_settings(settings: Settings) -> Result<Self> {
        settings.validate()?;
        let pois = OverpassProvider::new(settings.overpass_url.clone())?;
        let elevation = RemoteElevationSource::new(
            settings.elevation_url.clone(),
            settings.grid_cell_deg,
            settings.timeout(),
        )?;
        Self::new(settings, Arc::new(pois), Arc::new(elevation))
    }

    pub fn settings(&self) -> Settings {
        self.settings.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Applies `change` to the settings; a cycle is requested when the
    /// change affects acquisition. Returns whether a refresh is due.
    pub fn update_settings(&self, change: impl FnOnce(&mut Settings)) -> Result<bool> {
        let mut settings = self.settings.write().unwrap_or_else(PoisonError::into_inner);
        let mut updated = settings.clone();
        change(&mut updated);
        updated.validate()?;

        let display_only = Settings {
            display_mode: settings.display_mode,
            filter_pois: settings.filter_pois,
            ..updated.clone()
        } == *settings;
        *settings = updated;

        if display_only {
            Ok(false)
        } else {
            self.refresh();
            Ok(true)
        }
    }

    pub fn state(&self) -> PipelineState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn user_location(&self) -> Option<GeoPoint> {
        self.user.lock().unwrap_or_else(PoisonError::into_inner).current
    }

    /// Records a new user location. Returns true, and supersedes any cycle
    /// in flight, when the user moved at least `min_movement_m` since the
    /// location of the last refresh.
    pub fn update_location(&self, location: GeoPoint) -> bool {
        let min_movement_m = self.settings.read().unwrap_or_else(PoisonError::into_inner).min_movement_m;
        let mut user = self.user.lock().unwrap_or_else(PoisonError::into_inner);
        user.current = Some(location);

        let moved = match user.anchor {
            Some(anchor) => anchor.distance_to(&location) >= min_movement_m,
            None => true,
        };
        if moved {
            user.anchor = Some(location);
            let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            debug!("user moved to {location:?}; generation {generation}");
        }
        moved
    }

    /// Forces the next cycle and supersedes any cycle in flight.
    pub fn refresh(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// The latest published result.
    pub fn snapshot(&self) -> Arc<LabeledPoiSet> {
        self.published.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Labels selected by the configured display mode and filter toggle.
    pub fn preferred_view(&self) -> Vec<LabeledPoi> {
        let settings = self.settings();
        self.snapshot()
            .view(settings.display_mode, settings.filter_pois)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Runs one refresh cycle on the calling thread.
    ///
    /// Returns the new snapshot, or `None` when a newer location or refresh
    /// arrived while the cycle ran and its result was dropped.
    pub fn run_cycle(&self) -> Option<Arc<LabeledPoiSet>> {
        let generation = self.generation.load(Ordering::SeqCst);
        let settings = self.settings();
        let now = Instant::now();

        let labeled = self.compute(generation, &settings);
        let published = self.publish(labeled, generation);

        debug!("cycle {generation} finished in {:?}", now.elapsed());
        self.enter(PipelineState::Idle);
        published
    }

    fn compute(&self, generation: u64, settings: &Settings) -> LabeledPoiSet {
        let Some(user) = self.user_location() else {
            debug!("no user location yet");
            return LabeledPoiSet::empty(generation);
        };
        if user.is_unset() {
            debug!("user location unset; publishing nothing");
            return LabeledPoiSet::empty(generation);
        }

        let bbox = match BoundingBox::around(user, settings.range_km) {
            Ok(bbox) => bbox,
            Err(e) => {
                warn!("cannot build bounding box: {e}");
                return LabeledPoiSet::empty(generation);
            }
        };
        self.enter(PipelineState::BoundingBoxComputed);

        self.enter(PipelineState::AwaitingPoiAndGrid);
        let Some(acquisition) = self.acquire(user, &bbox, settings) else {
            return LabeledPoiSet::empty(generation);
        };

        let calculator = BearingCalculator::new(settings.earth_curvature.then(|| settings.refraction()));
        let pois: Vec<_> = acquisition
            .pois
            .iter()
            .map(|poi| {
                let (horizontal, vertical) = calculator.bearings(user, poi.position);
                poi.clone().with_bearings(horizontal, vertical)
            })
            .collect();
        self.enter(PipelineState::BearingsComputed);

        let engine = LineOfSightEngine {
            refraction: settings.refraction(),
            earth_curvature: settings.earth_curvature,
            observer_height_m: settings.observer_height_m,
            clearance_m: settings.clearance_m,
        };
        let grid = &acquisition.grid;
        let labeled: Vec<LabeledPoi> = pois
            .into_iter()
            .map(|poi| {
                let visible = engine.is_visible(user, poi.position, grid);
                LabeledPoi { poi, visible }
            })
            .collect();
        self.enter(PipelineState::VisibilityComputed);

        LabeledPoiSet::new(generation, user, bbox, labeled, !grid.is_empty())
    }

    /// POIs and terrain for `bbox`, falling back from the network to the
    /// cache and then to the offline snapshot. `None` means nothing usable.
    fn acquire(&self, user: GeoPoint, bbox: &BoundingBox, settings: &Settings) -> Option<Arc<Acquisition>> {
        if settings.offline_mode {
            return self.acquire_offline(user);
        }

        let timeout = settings.timeout();
        let (batch, grid) = thread::scope(|s| {
            let poi_task = s.spawn(|| self.pois.fetch_pois(bbox, settings.max_results, timeout));
            let grid_task = s.spawn(|| self.elevation.load(bbox));
            (
                poi_task
                    .join()
                    .unwrap_or_else(|_| PoiBatch::Unavailable(worker_panicked("poi"))),
                grid_task.join().unwrap_or_else(|_| Err(worker_panicked("elevation"))),
            )
        });

        match (batch, grid) {
            (PoiBatch::Received(pois), Ok(grid)) => {
                let acquisition = Arc::new(Acquisition {
                    pois,
                    grid: Arc::new(grid),
                });
                self.cache.insert(bbox, acquisition.clone());
                *self.last_online.lock().unwrap_or_else(PoisonError::into_inner) =
                    Some((*bbox, acquisition.clone()));
                Some(acquisition)
            }
            (batch, grid) => {
                if let PoiBatch::Unavailable(e) = batch {
                    warn!("peaks unavailable: {e}");
                }
                if let Err(e) = grid {
                    warn!("terrain unavailable: {e}");
                }
                if let Some(cached) = self.cache.get(bbox) {
                    info!("using cached acquisition for {bbox:?}");
                    return Some(cached);
                }
                self.acquire_offline(user)
            }
        }
    }

    fn acquire_offline(&self, user: GeoPoint) -> Option<Arc<Acquisition>> {
        match self.offline.load_for(user) {
            Ok(Some(content)) => Some(Arc::new(Acquisition {
                pois: content.poi_points,
                grid: Arc::new(content.grid),
            })),
            Ok(None) => {
                warn!("no offline snapshot at {:?}", self.offline.path());
                None
            }
            Err(e) => {
                warn!("offline snapshot unreadable: {e}");
                None
            }
        }
    }

    fn publish(&self, labeled: LabeledPoiSet, generation: u64) -> Option<Arc<LabeledPoiSet>> {
        let mut published = self.published.write().unwrap_or_else(PoisonError::into_inner);
        if self.generation.load(Ordering::SeqCst) != generation || published.generation() > generation {
            debug!("dropping superseded cycle {generation}");
            return None;
        }
        let labeled = Arc::new(labeled);
        *published = labeled.clone();
        drop(published);

        self.enter(PipelineState::Published);
        info!(
            "published {} peaks ({} in sight)",
            labeled.len(),
            labeled.in_sight().len()
        );
        Some(labeled)
    }

    /// Writes the last online acquisition as the offline snapshot.
    pub fn save_offline_area(&self) -> Result<()> {
        let last = self.last_online.lock().unwrap_or_else(PoisonError::into_inner).clone();
        let Some((bbox, acquisition)) = last else {
            return Err(PeakError::InvalidArgument("no area downloaded yet".to_string()));
        };
        let snapshot = OfflineSnapshot::capture(bbox, &acquisition.grid, acquisition.pois.clone());
        self.offline.save(&snapshot)
    }

    pub fn offline_store(&self) -> &OfflineStore {
        &self.offline
    }

    /// Terrain of the last online acquisition, if any.
    pub fn last_grid(&self) -> Option<Arc<ElevationGrid>> {
        self.last_online
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|(_, acquisition)| acquisition.grid.clone())
    }

    fn enter(&self, next: PipelineState) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        debug!("pipeline {:?} -> {:?}", *state, next);
        *state = next;
    }
}

fn worker_panicked(what: &str) -> PeakError {
    PeakError::Network(format!("{what} acquisition panicked"))
}
