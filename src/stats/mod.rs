//! Statistics for supervised cameras

pub mod metrics;

pub use metrics::{CameraStats, FpsMeter};
