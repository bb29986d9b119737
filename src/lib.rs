pub mod cache;
pub mod config;
pub mod error;
pub mod geo;
pub mod offline;
pub mod overlay;
pub mod physics;
pub mod pipeline;
pub mod poi;
pub mod terrain;

pub use crate::error::{PeakError, Result};
