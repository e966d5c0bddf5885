//! `mcl-types` – shared vocabulary of the localization workspace.
//!
//! Plain, serializable data carried between the filter, the runtime and the
//! event bus: planar poses, laser scans, odometry samples, stamped transforms
//! and the workspace-wide [`LocError`].

use std::f64::consts::PI;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// ────────────────────────────────────────────────────────────────────────────
// Angles
// ────────────────────────────────────────────────────────────────────────────

/// Wrap `angle` into the half-open interval `(-π, π]`.
pub fn normalize_angle(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(2.0 * PI);
    if wrapped > PI { wrapped - 2.0 * PI } else { wrapped }
}

/// Signed shortest rotation taking heading `from` to heading `to`, in `(-π, π]`.
pub fn angle_diff(to: f64, from: f64) -> f64 {
    normalize_angle(to - from)
}

// ────────────────────────────────────────────────────────────────────────────
// Poses
// ────────────────────────────────────────────────────────────────────────────

/// A planar pose: position in metres and heading in radians.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose2D {
    pub x: f64,
    pub y: f64,
    /// Counter-clockwise from +X, wrapped to `(-π, π]`.
    pub heading: f64,
}

impl Pose2D {
    /// Create a pose; `heading` is wrapped to `(-π, π]`.
    pub fn new(x: f64, y: f64, heading: f64) -> Self {
        Self {
            x,
            y,
            heading: normalize_angle(heading),
        }
    }

    /// The origin pose.
    pub fn origin() -> Self {
        Self::default()
    }
}

/// Pose of the robot base in the odometry frame, as reported by dead
/// reckoning at `stamp` (seconds).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OdometrySample {
    pub stamp: f64,
    pub pose: Pose2D,
}

/// External request to re-seed the filter around a known pose in the map
/// frame (e.g. an operator clicking "2D pose estimate").
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InitialPose {
    pub pose: Pose2D,
}

/// A [`Pose2D`] tagged with the frame it is expressed in and its timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseStamped2D {
    pub stamp: f64,
    pub frame_id: String,
    pub pose: Pose2D,
}

/// A single weighted hypothesis as published for visualization.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightedPose {
    pub pose: Pose2D,
    pub weight: f64,
}

/// Snapshot of the whole particle population.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticleCloud {
    pub stamp: f64,
    pub frame_id: String,
    pub particles: Vec<WeightedPose>,
}

// ────────────────────────────────────────────────────────────────────────────
// Sensor data
// ────────────────────────────────────────────────────────────────────────────

/// A planar range scan.
///
/// Beam `i` points at `angle_min + i * angle_increment` in the sensor frame.
/// Non-finite entries are valid and mean "no return".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaserScan {
    pub stamp: f64,
    pub frame_id: String,
    pub angle_min: f64,
    pub angle_increment: f64,
    pub range_min: f64,
    pub range_max: f64,
    pub ranges: Vec<f64>,
}

impl LaserScan {
    /// Bearing of beam `index` in the sensor frame.
    pub fn beam_angle(&self, index: usize) -> f64 {
        self.angle_min + index as f64 * self.angle_increment
    }

    /// `true` when `range` is a usable return for this sensor.
    pub fn is_valid_range(&self, range: f64) -> bool {
        range.is_finite() && range >= self.range_min && range <= self.range_max
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Transforms
// ────────────────────────────────────────────────────────────────────────────

/// A rigid transform `parent_frame ← child_frame` at `stamp`, in the flat
/// form used on the wire.
///
/// `rotation` is a unit quaternion in `(w, x, y, z)` order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformStamped {
    pub stamp: f64,
    pub parent_frame: String,
    pub child_frame: String,
    pub translation: [f64; 3],
    pub rotation: [f64; 4],
}

// ────────────────────────────────────────────────────────────────────────────
// Events
// ────────────────────────────────────────────────────────────────────────────

/// Unified event wrapper for the in-process event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g., "mcl-runtime::node"
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    /// Wrap `payload` in a fresh event stamped with the current wall time.
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Variants of data that can be routed over the event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    Odometry(OdometrySample),
    Scan(LaserScan),
    InitialPose(InitialPose),
    ParticleCloud(ParticleCloud),
    PoseEstimate(PoseStamped2D),
    FrameCorrection(TransformStamped),
    Diagnostic { component: String, message: String },
}

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

/// Workspace-wide error type.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LocError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Transform {target} <- {source_frame} unavailable at t={stamp}")]
    TransformUnavailable {
        target: String,
        source_frame: String,
        stamp: f64,
    },

    #[error("Map error: {0}")]
    Map(String),

    #[error("Degenerate particle weights: {0}")]
    DegenerateWeights(String),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn normalize_angle_wraps_into_half_open_interval() {
        assert!((normalize_angle(3.0 * PI - 0.5) - (PI - 0.5)).abs() < 1e-12);
        assert!((normalize_angle(-PI) - PI).abs() < 1e-12);
        assert!((normalize_angle(-FRAC_PI_2) + FRAC_PI_2).abs() < 1e-12);
        assert!(normalize_angle(2.0 * PI).abs() < 1e-12);
    }

    #[test]
    fn angle_diff_takes_short_way_round() {
        let d = angle_diff(-PI + 0.1, PI - 0.1);
        assert!((d - 0.2).abs() < 1e-9, "d={d}");
    }

    #[test]
    fn pose_new_wraps_heading() {
        let p = Pose2D::new(1.0, 2.0, 5.0 * FRAC_PI_2);
        assert!((p.heading - FRAC_PI_2).abs() < 1e-12);
    }

    #[test]
    fn laser_scan_beam_geometry() {
        let scan = LaserScan {
            stamp: 0.0,
            frame_id: "laser".to_string(),
            angle_min: -FRAC_PI_2,
            angle_increment: 0.5,
            range_min: 0.1,
            range_max: 10.0,
            ranges: vec![1.0; 4],
        };
        assert!((scan.beam_angle(2) - (-FRAC_PI_2 + 1.0)).abs() < 1e-12);
        assert!(scan.is_valid_range(1.0));
        assert!(!scan.is_valid_range(f64::INFINITY));
        assert!(!scan.is_valid_range(f64::NAN));
        assert!(!scan.is_valid_range(0.05));
    }

    #[test]
    fn event_roundtrip() {
        let event = Event::new(
            "mcl-runtime::node",
            EventPayload::PoseEstimate(PoseStamped2D {
                stamp: 1.5,
                frame_id: "map".to_string(),
                pose: Pose2D::new(1.0, 2.0, 0.5),
            }),
        );
        let json = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(event.id, back.id);
        assert_eq!(event.source, back.source);
        match back.payload {
            EventPayload::PoseEstimate(p) => assert_eq!(p.frame_id, "map"),
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn loc_error_display() {
        let err = LocError::TransformUnavailable {
            target: "odom".to_string(),
            source_frame: "base_link".to_string(),
            stamp: 2.0,
        };
        assert!(err.to_string().contains("odom <- base_link"));

        let err2 = LocError::InvalidConfig("sample_factor too small".to_string());
        assert!(err2.to_string().contains("sample_factor"));
    }
}
