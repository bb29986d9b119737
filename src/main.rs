use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::info;
use serde::Serialize;

use peak_sight::config::{DisplayMode, Settings};
use peak_sight::geo::GeoPoint;
use peak_sight::pipeline::Pipeline;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    All,
    InSight,
    OutOfSight,
}

impl From<Mode> for DisplayMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::All => DisplayMode::All,
            Mode::InSight => DisplayMode::InSight,
            Mode::OutOfSight => DisplayMode::OutOfSight,
        }
    }
}

/// Lists the peaks around a location and whether each one is in sight.
#[derive(Debug, Parser)]
#[command(version)]
struct Cli {
    /// Observer latitude in degrees.
    #[arg(long, allow_negative_numbers = true)]
    lat: f64,

    /// Observer longitude in degrees.
    #[arg(long, allow_negative_numbers = true)]
    lon: f64,

    /// Observer altitude in meters.
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    alt: f64,

    /// JSON settings file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Use the saved offline area instead of the network.
    #[arg(long)]
    offline: bool,

    /// Which peaks to print.
    #[arg(long, value_enum)]
    mode: Option<Mode>,

    /// Print every peak instead of one per degree of bearing.
    #[arg(long)]
    no_filter: bool,

    /// Save the downloaded area for offline use.
    #[arg(long)]
    save_offline: bool,
}

#[derive(Debug, Serialize)]
struct Row<'a> {
    name: &'a str,
    latitude: f64,
    longitude: f64,
    altitude: f64,
    horizontal_bearing: f64,
    vertical_bearing: f64,
    visible: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let mut settings = match &cli.config {
        Some(path) => Settings::load(path).with_context(|| format!("Failed to load {path:?}"))?,
        None => Settings::default(),
    };
    settings.offline_mode |= cli.offline;
    if let Some(mode) = cli.mode {
        settings.display_mode = mode.into();
    }
    if cli.no_filter {
        settings.filter_pois = false;
    }
    let (mode, filter) = (settings.display_mode, settings.filter_pois);

    let user = GeoPoint::new(cli.lat, cli.lon, cli.alt)?;
    let pipeline = Pipeline::from_settings(settings)?;
    pipeline.update_location(user);

    let snapshot = pipeline.run_cycle().context("refresh cycle was superseded")?;
    info!(
        "{} peaks around {:?}, line of sight {}",
        snapshot.len(),
        user,
        if snapshot.line_of_sight_available() { "available" } else { "unavailable" }
    );

    if cli.save_offline {
        pipeline.save_offline_area().context("Failed to save offline area")?;
        info!("offline area written to {:?}", pipeline.offline_store().path());
    }

    let mut writer = csv::Writer::from_writer(std::io::stdout());
    for label in snapshot.view(mode, filter) {
        writer.serialize(Row {
            name: &label.poi.name,
            latitude: label.poi.position.latitude,
            longitude: label.poi.position.longitude,
            altitude: label.poi.position.altitude,
            horizontal_bearing: label.poi.horizontal_bearing,
            vertical_bearing: label.poi.vertical_bearing,
            visible: label.visible,
        })?;
    }
    writer.flush()?;

    Ok(())
}
