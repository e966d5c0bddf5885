//! Filter tunables.
//!
//! [`FilterParams`] is what the runtime pushes over its watch channel; the
//! [`Localizer`][crate::Localizer] snapshots it at cycle boundaries.  Every
//! field has a serde default so partial TOML tables deserialize cleanly.

use std::f64::consts::FRAC_PI_6;

use serde::{Deserialize, Serialize};

use crate::FilterError;

// ────────────────────────────────────────────────────────────────────────────
// Defaults
// ────────────────────────────────────────────────────────────────────────────

fn default_particle_count() -> usize {
    300
}
fn default_sample_factor() -> f64 {
    0.25
}
fn default_distance_threshold() -> f64 {
    0.2
}
fn default_angle_threshold() -> f64 {
    FRAC_PI_6
}
fn default_max_penalty_distance() -> f64 {
    5.0
}
fn default_model_noise_rate() -> f64 {
    0.05
}
fn default_model_noise_floor() -> f64 {
    0.05
}
fn default_linear_initialization_sigma() -> f64 {
    0.2
}
fn default_angular_initialization_sigma() -> f64 {
    5f64.to_radians()
}
fn default_linear_resample_sigma() -> f64 {
    0.1
}
fn default_angular_resample_sigma() -> f64 {
    5f64.to_radians()
}
fn default_laser_stride() -> usize {
    5
}
fn default_linear_noise_fraction() -> f64 {
    0.2
}
fn default_angular_noise_fraction() -> f64 {
    0.05
}

// ────────────────────────────────────────────────────────────────────────────
// FilterParams
// ────────────────────────────────────────────────────────────────────────────

/// Every knob of the particle filter.  Angles are in radians.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterParams {
    /// Target population size `N`.
    #[serde(default = "default_particle_count")]
    pub particle_count: usize,
    /// Fraction of `N` drawn as elites on each resample.
    #[serde(default = "default_sample_factor")]
    pub sample_factor: f64,
    /// Planar travel (metres) that triggers an update.
    #[serde(default = "default_distance_threshold")]
    pub distance_threshold: f64,
    /// Rotation that triggers an update.
    #[serde(default = "default_angle_threshold")]
    pub angle_threshold: f64,
    /// Distance charged to beams with no usable field value.
    #[serde(default = "default_max_penalty_distance")]
    pub max_penalty_distance: f64,
    /// σ of the per-beam Gaussian kernel.
    #[serde(default = "default_model_noise_rate")]
    pub model_noise_rate: f64,
    /// Constant added to every beam likelihood; keeps weights positive.
    #[serde(default = "default_model_noise_floor")]
    pub model_noise_floor: f64,
    #[serde(default = "default_linear_initialization_sigma")]
    pub linear_initialization_sigma: f64,
    #[serde(default = "default_angular_initialization_sigma")]
    pub angular_initialization_sigma: f64,
    #[serde(default = "default_linear_resample_sigma")]
    pub linear_resample_sigma: f64,
    #[serde(default = "default_angular_resample_sigma")]
    pub angular_resample_sigma: f64,
    /// Only every `laser_stride`-th beam is scored.
    #[serde(default = "default_laser_stride")]
    pub laser_stride: usize,
    /// Motion noise sd as a fraction of each translation component.
    #[serde(default = "default_linear_noise_fraction")]
    pub linear_noise_fraction: f64,
    /// Motion noise sd as a fraction of the rotation.
    #[serde(default = "default_angular_noise_fraction")]
    pub angular_noise_fraction: f64,
    /// Fixed RNG seed for reproducible runs; entropy-seeded when absent.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for FilterParams {
    fn default() -> Self {
        Self {
            particle_count: default_particle_count(),
            sample_factor: default_sample_factor(),
            distance_threshold: default_distance_threshold(),
            angle_threshold: default_angle_threshold(),
            max_penalty_distance: default_max_penalty_distance(),
            model_noise_rate: default_model_noise_rate(),
            model_noise_floor: default_model_noise_floor(),
            linear_initialization_sigma: default_linear_initialization_sigma(),
            angular_initialization_sigma: default_angular_initialization_sigma(),
            linear_resample_sigma: default_linear_resample_sigma(),
            angular_resample_sigma: default_angular_resample_sigma(),
            laser_stride: default_laser_stride(),
            linear_noise_fraction: default_linear_noise_fraction(),
            angular_noise_fraction: default_angular_noise_fraction(),
            seed: None,
        }
    }
}

impl FilterParams {
    /// Number of elites drawn per resample: `floor(N · sample_factor)`.
    pub fn elite_count(&self) -> usize {
        (self.particle_count as f64 * self.sample_factor).floor() as usize
    }

    /// Reject combinations the filter cannot run with.
    ///
    /// # Errors
    ///
    /// [`FilterError::InvalidConfig`] naming the first offending field.
    pub fn validate(&self) -> Result<(), FilterError> {
        if self.particle_count == 0 {
            return Err(invalid("particle_count must be at least 1"));
        }
        if !(self.sample_factor > 0.0 && self.sample_factor <= 1.0) {
            return Err(invalid(format!(
                "sample_factor must lie in (0, 1], got {}",
                self.sample_factor
            )));
        }
        if self.elite_count() == 0 {
            return Err(invalid(format!(
                "particle_count {} with sample_factor {} draws no elites",
                self.particle_count, self.sample_factor
            )));
        }
        if self.laser_stride == 0 {
            return Err(invalid("laser_stride must be at least 1"));
        }
        if !(self.model_noise_rate > 0.0 && self.model_noise_rate.is_finite()) {
            return Err(invalid("model_noise_rate must be positive"));
        }
        if !(self.model_noise_floor > 0.0 && self.model_noise_floor.is_finite()) {
            return Err(invalid("model_noise_floor must be positive"));
        }
        if !(self.max_penalty_distance > 0.0 && self.max_penalty_distance.is_finite()) {
            return Err(invalid("max_penalty_distance must be positive"));
        }

        let non_negative = [
            ("distance_threshold", self.distance_threshold),
            ("angle_threshold", self.angle_threshold),
            ("linear_initialization_sigma", self.linear_initialization_sigma),
            ("angular_initialization_sigma", self.angular_initialization_sigma),
            ("linear_resample_sigma", self.linear_resample_sigma),
            ("angular_resample_sigma", self.angular_resample_sigma),
            ("linear_noise_fraction", self.linear_noise_fraction),
            ("angular_noise_fraction", self.angular_noise_fraction),
        ];
        for (name, value) in non_negative {
            if !(value >= 0.0 && value.is_finite()) {
                return Err(invalid(format!("{name} must be finite and >= 0, got {value}")));
            }
        }
        Ok(())
    }
}

fn invalid(msg: impl Into<String>) -> FilterError {
    FilterError::InvalidConfig(msg.into())
}

// ────────────────────────────────────────────────────────────────────────────
// Frames
// ────────────────────────────────────────────────────────────────────────────

fn default_map_frame() -> String {
    "map".to_string()
}
fn default_odom_frame() -> String {
    "odom".to_string()
}
fn default_base_frame() -> String {
    "base_link".to_string()
}
fn default_laser_frame() -> String {
    "laser".to_string()
}

/// Names of the coordinate frames the filter works with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frames {
    #[serde(default = "default_map_frame")]
    pub map: String,
    #[serde(default = "default_odom_frame")]
    pub odom: String,
    #[serde(default = "default_base_frame")]
    pub base_link: String,
    /// Used for scans that arrive without a `frame_id`.
    #[serde(default = "default_laser_frame")]
    pub laser: String,
}

impl Default for Frames {
    fn default() -> Self {
        Self {
            map: default_map_frame(),
            odom: default_odom_frame(),
            base_link: default_base_frame(),
            laser: default_laser_frame(),
        }
    }
}
