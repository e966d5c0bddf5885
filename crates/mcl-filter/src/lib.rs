//! `mcl-filter` – Monte Carlo Localization engine.
//!
//! Estimates the robot's planar pose on a known map with a population of
//! weighted pose hypotheses, updated recursively from odometry and laser
//! scans.
//!
//! # Modules
//!
//! - [`params`] – [`FilterParams`][params::FilterParams] and
//!   [`Frames`][params::Frames]: every tunable, with validation.
//! - [`particle`] – [`Particle`][particle::Particle] and
//!   [`Population`][particle::Population]; normalization hands out a
//!   [`NormalizedParticles`][particle::NormalizedParticles] view, the only
//!   input the estimator and resampler accept.
//! - [`motion`] – [`MotionModel`][motion::MotionModel]: odometry-driven
//!   propagation with motion-proportional Gaussian noise.
//! - [`sensor`] – [`SensorModel`][sensor::SensorModel]: likelihood-field
//!   scoring of a stride-subsampled scan.
//! - [`resample`] – [`Resampler`][resample::Resampler]: elite draw by CDF
//!   inversion followed by jittered replication.
//! - [`estimate`] – [`estimate_pose`][estimate::estimate_pose]: weighted mean
//!   position and circular mean heading.
//! - [`corrector`] – [`FrameCorrector`][corrector::FrameCorrector]: the
//!   map ← odom transform that keeps odometry consistent with the belief.
//! - [`localizer`] – [`Localizer`][localizer::Localizer]: the update
//!   scheduler that owns the population and drives a full cycle per scan.

pub mod corrector;
pub mod estimate;
pub mod localizer;
pub mod motion;
mod noise;
pub mod params;
pub mod particle;
pub mod resample;
pub mod sensor;

use mcl_types::LocError;
use thiserror::Error;

pub use corrector::{FrameCorrection, FrameCorrector};
pub use estimate::estimate_pose;
pub use localizer::{Localizer, TrackingState, UpdateOutcome};
pub use motion::{MotionModel, OdometryDelta};
pub use params::{FilterParams, Frames};
pub use particle::{NormalizedParticles, Particle, Population};
pub use resample::Resampler;
pub use sensor::SensorModel;

/// Errors raised by the filter engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FilterError {
    /// A parameter combination the filter cannot run with.
    #[error("invalid filter configuration: {0}")]
    InvalidConfig(String),

    /// The weights cannot form a distribution.  The sensor model's floor
    /// term makes this unreachable, so seeing it indicates a defect.
    #[error("particle weights sum to {total}; cannot normalize")]
    DegenerateWeights { total: f64 },
}

impl From<FilterError> for LocError {
    fn from(err: FilterError) -> Self {
        match err {
            FilterError::InvalidConfig(msg) => LocError::InvalidConfig(msg),
            FilterError::DegenerateWeights { .. } => LocError::DegenerateWeights(err.to_string()),
        }
    }
}
