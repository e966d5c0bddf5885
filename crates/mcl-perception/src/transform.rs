//! Transform Frame (TF) Engine.
//!
//! Maintains a graph of named reference frames and the time-stamped rigid
//! transforms (translation + quaternion rotation) that relate them.  Given any
//! two frame names and a timestamp the engine composes a chain of transforms
//! via BFS, walking edges in either direction, to produce the combined
//! [`Transform3D`].
//!
//! The localizer never talks to [`TfEngine`] directly: it is written against
//! the [`TransformProvider`] trait so tests can inject a fake.
//!
//! # Example
//!
//! ```rust
//! use mcl_perception::transform::{TfEngine, Transform3D, TransformProvider, Vec3, Quaternion};
//!
//! let mut tf = TfEngine::new();
//!
//! // base_link is 1 m forward of the odometry origin at t = 1 s.
//! tf.set_transform("odom", "base_link",
//!     Transform3D::new(Vec3::new(1.0, 0.0, 0.0), Quaternion::identity()), 1.0);
//!
//! // The laser is mounted 0.5 m forward of base_link.
//! tf.set_static_transform("base_link", "laser",
//!     Transform3D::new(Vec3::new(0.5, 0.0, 0.0), Quaternion::identity()));
//!
//! let t = tf.lookup("odom", "laser", 1.0).unwrap();
//! assert!((t.translation.x - 1.5).abs() < 1e-9);
//! ```

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use mcl_types::{LocError, Pose2D, TransformStamped};
use thiserror::Error;
use tracing::trace;

/// Timestamp meaning "whatever is newest", mirroring `Time(0)` in tf.
///
/// Every stamp `<= LATEST` is read this way, so recorded samples must carry
/// positive stamps.
pub const LATEST: f64 = 0.0;

/// Samples kept per dynamic edge.
const DEFAULT_HISTORY: usize = 256;

/// Sleep between availability checks in [`TransformProvider::wait_for_transform`].
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(5);

// ────────────────────────────────────────────────────────────────────────────
// Primitive types
// ────────────────────────────────────────────────────────────────────────────

/// A 3-D translation vector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    /// Create a new vector.
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// The zero vector.
    pub fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    pub fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }

    pub fn scale(self, k: f64) -> Self {
        Self::new(self.x * k, self.y * k, self.z * k)
    }

    fn lerp(self, other: Self, t: f64) -> Self {
        self.add(other.add(self.scale(-1.0)).scale(t))
    }
}

/// A unit quaternion representing a 3-D rotation (w, x, y, z convention).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quaternion {
    pub w: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Quaternion {
    /// Create a quaternion.  The caller is responsible for providing a unit
    /// quaternion (|q| = 1).
    pub fn new(w: f64, x: f64, y: f64, z: f64) -> Self {
        Self { w, x, y, z }
    }

    /// The identity rotation (no rotation).
    pub fn identity() -> Self {
        Self::new(1.0, 0.0, 0.0, 0.0)
    }

    /// Rotation of `yaw` radians about +Z.
    pub fn from_yaw(yaw: f64) -> Self {
        let half = 0.5 * yaw;
        Self::new(half.cos(), 0.0, 0.0, half.sin())
    }

    /// Heading about +Z implied by this rotation.
    pub fn yaw(self) -> f64 {
        let siny_cosp = 2.0 * (self.w * self.z + self.x * self.y);
        let cosy_cosp = 1.0 - 2.0 * (self.y * self.y + self.z * self.z);
        siny_cosp.atan2(cosy_cosp)
    }

    /// Hamilton product: compose two rotations.
    pub fn mul(self, rhs: Self) -> Self {
        Self::new(
            self.w * rhs.w - self.x * rhs.x - self.y * rhs.y - self.z * rhs.z,
            self.w * rhs.x + self.x * rhs.w + self.y * rhs.z - self.z * rhs.y,
            self.w * rhs.y - self.x * rhs.z + self.y * rhs.w + self.z * rhs.x,
            self.w * rhs.z + self.x * rhs.y - self.y * rhs.x + self.z * rhs.w,
        )
    }

    /// Conjugate (== inverse for a unit quaternion).
    pub fn conjugate(self) -> Self {
        Self::new(self.w, -self.x, -self.y, -self.z)
    }

    /// Rescale to unit length.  A zero quaternion becomes the identity.
    pub fn normalized(self) -> Self {
        let n = (self.w * self.w + self.x * self.x + self.y * self.y + self.z * self.z).sqrt();
        if n <= f64::EPSILON {
            return Self::identity();
        }
        Self::new(self.w / n, self.x / n, self.y / n, self.z / n)
    }

    /// Rotate a vector by this quaternion: p' = q * p * q*.
    pub fn rotate(self, v: Vec3) -> Vec3 {
        let p = Self::new(0.0, v.x, v.y, v.z);
        let rotated = self.mul(p).mul(self.conjugate());
        Vec3::new(rotated.x, rotated.y, rotated.z)
    }

    /// Spherical interpolation, `t = 0` gives `self`, `t = 1` gives `other`.
    pub fn slerp(self, other: Self, t: f64) -> Self {
        let mut dot = self.w * other.w + self.x * other.x + self.y * other.y + self.z * other.z;
        let mut other = other;
        if dot < 0.0 {
            other = Self::new(-other.w, -other.x, -other.y, -other.z);
            dot = -dot;
        }
        if dot > 0.9995 {
            // Nearly parallel: normalized lerp is accurate and avoids 0/0.
            return Self::new(
                self.w + t * (other.w - self.w),
                self.x + t * (other.x - self.x),
                self.y + t * (other.y - self.y),
                self.z + t * (other.z - self.z),
            )
            .normalized();
        }
        let theta = dot.clamp(-1.0, 1.0).acos();
        let sin_theta = theta.sin();
        let a = ((1.0 - t) * theta).sin() / sin_theta;
        let b = (t * theta).sin() / sin_theta;
        Self::new(
            a * self.w + b * other.w,
            a * self.x + b * other.x,
            a * self.y + b * other.y,
            a * self.z + b * other.z,
        )
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Transform3D
// ────────────────────────────────────────────────────────────────────────────

/// A rigid-body 3-D transform: translation followed by rotation.
///
/// Represents the pose of frame B relative to frame A (written `T_A_B`): to
/// convert a point expressed in frame B into frame A, rotate it by `rotation`
/// then add `translation`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform3D {
    pub translation: Vec3,
    pub rotation: Quaternion,
}

impl Transform3D {
    /// Create a transform from a translation and rotation.
    pub fn new(translation: Vec3, rotation: Quaternion) -> Self {
        Self {
            translation,
            rotation,
        }
    }

    /// The identity transform (no translation, no rotation).
    pub fn identity() -> Self {
        Self::new(Vec3::zero(), Quaternion::identity())
    }

    /// Lift a planar pose into a transform (z = 0, rotation about +Z).
    pub fn from_pose2d(pose: Pose2D) -> Self {
        Self::new(
            Vec3::new(pose.x, pose.y, 0.0),
            Quaternion::from_yaw(pose.heading),
        )
    }

    /// Project onto the plane: keep x, y and the yaw component.
    pub fn to_pose2d(self) -> Pose2D {
        Pose2D::new(self.translation.x, self.translation.y, self.rotation.yaw())
    }

    /// Compose two transforms: `self` applied first, then `other`.
    ///
    /// If `self` = T_A_B and `other` = T_B_C, the result is T_A_C.
    pub fn compose(self, other: Self) -> Self {
        let translated = self.translation.add(self.rotation.rotate(other.translation));
        let rotated = self.rotation.mul(other.rotation).normalized();
        Self::new(translated, rotated)
    }

    /// Inverse transform: T_A_B becomes T_B_A.
    pub fn inverse(self) -> Self {
        let inv_rot = self.rotation.conjugate();
        let inv_trans = inv_rot.rotate(self.translation).scale(-1.0);
        Self::new(inv_trans, inv_rot)
    }

    /// Map a point expressed in the child frame into the parent frame.
    pub fn apply(self, point: Vec3) -> Vec3 {
        self.translation.add(self.rotation.rotate(point))
    }

    /// Interpolate between two transforms.
    pub fn interpolate(self, other: Self, t: f64) -> Self {
        Self::new(
            self.translation.lerp(other.translation, t),
            self.rotation.slerp(other.rotation, t),
        )
    }

    /// Flatten into the wire form used on the event bus.
    pub fn to_stamped(self, stamp: f64, parent_frame: &str, child_frame: &str) -> TransformStamped {
        TransformStamped {
            stamp,
            parent_frame: parent_frame.to_string(),
            child_frame: child_frame.to_string(),
            translation: [self.translation.x, self.translation.y, self.translation.z],
            rotation: [self.rotation.w, self.rotation.x, self.rotation.y, self.rotation.z],
        }
    }

    /// Rebuild from the wire form.
    pub fn from_stamped(msg: &TransformStamped) -> Self {
        let [x, y, z] = msg.translation;
        let [qw, qx, qy, qz] = msg.rotation;
        Self::new(Vec3::new(x, y, z), Quaternion::new(qw, qx, qy, qz).normalized())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

/// Why a lookup could not be answered.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TfError {
    #[error("frame `{0}` has never been published")]
    UnknownFrame(String),

    #[error("no transform {target} <- {source_frame} available at t={stamp}")]
    Unavailable {
        target: String,
        source_frame: String,
        stamp: f64,
    },

    #[error("timed out after {waited:?} waiting for {target} <- {source_frame} at t={stamp}")]
    Timeout {
        target: String,
        source_frame: String,
        stamp: f64,
        waited: Duration,
    },
}

impl From<TfError> for LocError {
    fn from(err: TfError) -> Self {
        match err {
            TfError::UnknownFrame(frame) => LocError::TransformUnavailable {
                target: frame.clone(),
                source_frame: frame,
                stamp: LATEST,
            },
            TfError::Unavailable {
                target,
                source_frame,
                stamp,
            }
            | TfError::Timeout {
                target,
                source_frame,
                stamp,
                ..
            } => LocError::TransformUnavailable {
                target,
                source_frame,
                stamp,
            },
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// TransformProvider
// ────────────────────────────────────────────────────────────────────────────

/// Capability the localizer uses to resolve coordinate frames.
///
/// `lookup(target, source, stamp)` returns `T_target_source`: the pose of
/// `source` expressed in `target`.  A `stamp` of [`LATEST`] asks for the
/// newest data available.
pub trait TransformProvider {
    fn lookup(&self, target_frame: &str, source_frame: &str, stamp: f64)
    -> Result<Transform3D, TfError>;

    fn can_transform(&self, target_frame: &str, source_frame: &str, stamp: f64) -> bool {
        self.lookup(target_frame, source_frame, stamp).is_ok()
    }

    /// Block for at most `timeout` until the transform becomes available.
    ///
    /// Returns `true` as soon as [`can_transform`][Self::can_transform]
    /// succeeds, `false` once the deadline passes.
    fn wait_for_transform(
        &self,
        target_frame: &str,
        source_frame: &str,
        stamp: f64,
        timeout: Duration,
    ) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.can_transform(target_frame, source_frame, stamp) {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            std::thread::sleep(WAIT_POLL_INTERVAL.min(deadline - now));
        }
    }

    /// Re-express a planar pose given in `source_frame` in `target_frame`.
    fn transform_pose(
        &self,
        target_frame: &str,
        source_frame: &str,
        pose: Pose2D,
        stamp: f64,
    ) -> Result<Pose2D, TfError> {
        let t = self.lookup(target_frame, source_frame, stamp)?;
        Ok(t.compose(Transform3D::from_pose2d(pose)).to_pose2d())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Edge history
// ────────────────────────────────────────────────────────────────────────────

/// Time-ordered samples of one parent → child transform.
#[derive(Debug, Clone)]
struct EdgeBuffer {
    is_static: bool,
    samples: VecDeque<(f64, Transform3D)>,
    capacity: usize,
}

impl EdgeBuffer {
    fn dynamic(capacity: usize) -> Self {
        Self {
            is_static: false,
            samples: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    fn insert(&mut self, stamp: f64, transform: Transform3D) {
        let pos = self.samples.partition_point(|(s, _)| *s < stamp);
        match self.samples.get_mut(pos) {
            Some((s, t)) if *s == stamp => *t = transform,
            _ => self.samples.insert(pos, (stamp, transform)),
        }
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
    }

    /// The transform at `stamp`, linearly interpolated between the two
    /// bracketing samples.  `None` when `stamp` lies outside the history.
    fn sample_at(&self, stamp: f64) -> Option<Transform3D> {
        let (newest_stamp, newest) = *self.samples.back()?;
        if self.is_static || stamp <= LATEST {
            return Some(newest);
        }
        if stamp > newest_stamp {
            return None;
        }
        let pos = self.samples.partition_point(|(s, _)| *s < stamp);
        let (after_stamp, after) = *self.samples.get(pos)?;
        if after_stamp == stamp {
            return Some(after);
        }
        let (before_stamp, before) = *self.samples.get(pos.checked_sub(1)?)?;
        let t = (stamp - before_stamp) / (after_stamp - before_stamp);
        Some(before.interpolate(after, t))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// TfEngine
// ────────────────────────────────────────────────────────────────────────────

/// A graph of named reference frames and the [`Transform3D`]s that relate
/// them over time.
///
/// Edges are stored parent → child but traversed in both directions; walking
/// an edge backwards uses the inverse transform.
#[derive(Debug, Default)]
pub struct TfEngine {
    /// `edges[parent][child] = history`
    edges: HashMap<String, HashMap<String, EdgeBuffer>>,
    /// `parents[child] = {parent, ..}`, for backward traversal.
    parents: HashMap<String, HashSet<String>>,
}

impl TfEngine {
    /// Create an empty TF engine.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the transform `parent_frame ← child_frame` observed at `stamp`.
    pub fn set_transform(
        &mut self,
        parent_frame: &str,
        child_frame: &str,
        transform: Transform3D,
        stamp: f64,
    ) {
        self.edge_mut(parent_frame, child_frame)
            .insert(stamp, transform);
    }

    /// Register a transform that is valid at every timestamp (sensor mounts).
    pub fn set_static_transform(
        &mut self,
        parent_frame: &str,
        child_frame: &str,
        transform: Transform3D,
    ) {
        let edge = self.edge_mut(parent_frame, child_frame);
        edge.is_static = true;
        edge.samples.clear();
        edge.samples.push_back((LATEST, transform));
    }

    /// `true` when `frame` appears on either end of any edge.
    pub fn has_frame(&self, frame: &str) -> bool {
        self.edges.contains_key(frame) || self.parents.contains_key(frame)
    }

    fn edge_mut(&mut self, parent_frame: &str, child_frame: &str) -> &mut EdgeBuffer {
        self.parents
            .entry(child_frame.to_string())
            .or_default()
            .insert(parent_frame.to_string());
        self.edges
            .entry(parent_frame.to_string())
            .or_default()
            .entry(child_frame.to_string())
            .or_insert_with(|| EdgeBuffer::dynamic(DEFAULT_HISTORY))
    }

    /// Neighbours of `frame` with the transform `T_frame_next` at `stamp`.
    fn neighbours(&self, frame: &str, stamp: f64) -> Vec<(&str, Transform3D)> {
        let mut out = Vec::new();
        if let Some(children) = self.edges.get(frame) {
            for (child, edge) in children {
                if let Some(t) = edge.sample_at(stamp) {
                    out.push((child.as_str(), t));
                }
            }
        }
        if let Some(parents) = self.parents.get(frame) {
            for parent in parents {
                let edge = self.edges.get(parent).and_then(|c| c.get(frame));
                if let Some(t) = edge.and_then(|e| e.sample_at(stamp)) {
                    out.push((parent.as_str(), t.inverse()));
                }
            }
        }
        out
    }
}

impl TransformProvider for TfEngine {
    fn lookup(
        &self,
        target_frame: &str,
        source_frame: &str,
        stamp: f64,
    ) -> Result<Transform3D, TfError> {
        if target_frame == source_frame {
            return Ok(Transform3D::identity());
        }
        for frame in [target_frame, source_frame] {
            if !self.has_frame(frame) {
                return Err(TfError::UnknownFrame(frame.to_string()));
            }
        }

        // BFS from the target; each queue item carries T_target_current.
        let mut queue: VecDeque<(&str, Transform3D)> = VecDeque::new();
        let mut visited: HashSet<&str> = HashSet::new();
        queue.push_back((target_frame, Transform3D::identity()));
        visited.insert(target_frame);

        while let Some((current, accumulated)) = queue.pop_front() {
            for (next, edge_tf) in self.neighbours(current, stamp) {
                if !visited.insert(next) {
                    continue;
                }
                let composed = accumulated.compose(edge_tf);
                if next == source_frame {
                    trace!(target_frame, source_frame, stamp, "tf lookup resolved");
                    return Ok(composed);
                }
                queue.push_back((next, composed));
            }
        }

        Err(TfError::Unavailable {
            target: target_frame.to_string(),
            source_frame: source_frame.to_string(),
            stamp,
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// SharedTf
// ────────────────────────────────────────────────────────────────────────────

/// Thread-safe handle to a [`TfEngine`].  Clones share the same buffer: the
/// runtime writes odometry into it while the update cycle reads from it.
#[derive(Debug, Clone, Default)]
pub struct SharedTf(Arc<RwLock<TfEngine>>);

impl SharedTf {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_transform(
        &self,
        parent_frame: &str,
        child_frame: &str,
        transform: Transform3D,
        stamp: f64,
    ) {
        let mut tf = self.0.write().unwrap_or_else(|e| e.into_inner());
        tf.set_transform(parent_frame, child_frame, transform, stamp);
    }

    pub fn set_static_transform(&self, parent_frame: &str, child_frame: &str, transform: Transform3D) {
        let mut tf = self.0.write().unwrap_or_else(|e| e.into_inner());
        tf.set_static_transform(parent_frame, child_frame, transform);
    }
}

impl TransformProvider for SharedTf {
    fn lookup(
        &self,
        target_frame: &str,
        source_frame: &str,
        stamp: f64,
    ) -> Result<Transform3D, TfError> {
        let tf = self.0.read().unwrap_or_else(|e| e.into_inner());
        tf.lookup(target_frame, source_frame, stamp)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::{FRAC_1_SQRT_2, FRAC_PI_2};

    fn tx(x: f64) -> Transform3D {
        Transform3D::new(Vec3::new(x, 0.0, 0.0), Quaternion::identity())
    }

    // ── Quaternion ──────────────────────────────────────────────────────────

    #[test]
    fn quaternion_identity_rotate_is_noop() {
        let r = Quaternion::identity().rotate(Vec3::new(1.0, 2.0, 3.0));
        assert!((r.x - 1.0).abs() < 1e-12);
        assert!((r.y - 2.0).abs() < 1e-12);
        assert!((r.z - 3.0).abs() < 1e-12);
    }

    #[test]
    fn quaternion_90deg_yaw_rotates_x_to_y() {
        let q = Quaternion::new(FRAC_1_SQRT_2, 0.0, 0.0, FRAC_1_SQRT_2);
        let r = q.rotate(Vec3::new(1.0, 0.0, 0.0));
        assert!(r.x.abs() < 1e-9, "x should be ~0, got {}", r.x);
        assert!((r.y - 1.0).abs() < 1e-9, "y should be ~1, got {}", r.y);
    }

    #[test]
    fn quaternion_yaw_roundtrip() {
        for yaw in [-3.0, -1.0, 0.0, 0.4, 2.5] {
            assert!((Quaternion::from_yaw(yaw).yaw() - yaw).abs() < 1e-9);
        }
    }

    #[test]
    fn slerp_halfway_between_yaws() {
        let q = Quaternion::from_yaw(0.0).slerp(Quaternion::from_yaw(FRAC_PI_2), 0.5);
        assert!((q.yaw() - FRAC_PI_2 / 2.0).abs() < 1e-9);
    }

    // ── Transform3D ─────────────────────────────────────────────────────────

    #[test]
    fn transform_compose_translations_add() {
        let composed = tx(1.0).compose(tx(2.0));
        assert!((composed.translation.x - 3.0).abs() < 1e-12);
    }

    #[test]
    fn transform_inverse_composes_to_identity() {
        let t = Transform3D::from_pose2d(Pose2D::new(1.0, -2.0, 0.7));
        let id = t.compose(t.inverse()).to_pose2d();
        assert!(id.x.abs() < 1e-9 && id.y.abs() < 1e-9 && id.heading.abs() < 1e-9);
    }

    #[test]
    fn pose2d_roundtrip() {
        let p = Pose2D::new(3.0, 4.0, -2.0);
        let back = Transform3D::from_pose2d(p).to_pose2d();
        assert!((back.x - 3.0).abs() < 1e-12);
        assert!((back.y - 4.0).abs() < 1e-12);
        assert!((back.heading + 2.0).abs() < 1e-9);
    }

    #[test]
    fn stamped_roundtrip_preserves_transform() {
        let t = Transform3D::from_pose2d(Pose2D::new(0.5, 0.25, 1.2));
        let msg = t.to_stamped(3.0, "map", "odom");
        assert_eq!(msg.parent_frame, "map");
        let back = Transform3D::from_stamped(&msg).to_pose2d();
        assert!((back.heading - 1.2).abs() < 1e-9);
    }

    // ── TfEngine ────────────────────────────────────────────────────────────

    #[test]
    fn lookup_same_frame_returns_identity() {
        let tf = TfEngine::new();
        assert_eq!(tf.lookup("map", "map", LATEST).unwrap(), Transform3D::identity());
    }

    #[test]
    fn lookup_unknown_frame_is_reported() {
        let mut tf = TfEngine::new();
        tf.set_transform("odom", "base_link", tx(1.0), 1.0);
        assert_eq!(
            tf.lookup("odom", "ghost", LATEST),
            Err(TfError::UnknownFrame("ghost".to_string()))
        );
    }

    #[test]
    fn lookup_walks_edges_backwards_using_inverse() {
        let mut tf = TfEngine::new();
        tf.set_transform("odom", "base_link", tx(2.0), 1.0);
        let t = tf.lookup("base_link", "odom", 1.0).unwrap();
        assert!((t.translation.x + 2.0).abs() < 1e-12);
    }

    #[test]
    fn lookup_composed_chain_with_static_mount() {
        let mut tf = TfEngine::new();
        tf.set_transform("odom", "base_link", tx(1.0), 5.0);
        tf.set_static_transform("base_link", "laser", tx(0.5));
        let t = tf.lookup("odom", "laser", 5.0).unwrap();
        assert!((t.translation.x - 1.5).abs() < 1e-12);
    }

    #[test]
    fn lookup_respects_rotation_in_chain() {
        let mut tf = TfEngine::new();
        tf.set_transform(
            "odom",
            "base_link",
            Transform3D::new(Vec3::zero(), Quaternion::from_yaw(FRAC_PI_2)),
            1.0,
        );
        tf.set_static_transform("base_link", "laser", tx(1.0));
        let t = tf.lookup("odom", "laser", 1.0).unwrap();
        assert!(t.translation.x.abs() < 1e-9, "x={}", t.translation.x);
        assert!((t.translation.y - 1.0).abs() < 1e-9, "y={}", t.translation.y);
    }

    #[test]
    fn lookup_interpolates_between_samples() {
        let mut tf = TfEngine::new();
        tf.set_transform("odom", "base_link", tx(0.0), 1.0);
        tf.set_transform("odom", "base_link", tx(2.0), 3.0);
        let t = tf.lookup("odom", "base_link", 2.0).unwrap();
        assert!((t.translation.x - 1.0).abs() < 1e-12);
    }

    #[test]
    fn lookup_in_the_future_is_unavailable() {
        let mut tf = TfEngine::new();
        tf.set_transform("odom", "base_link", tx(0.0), 1.0);
        assert!(!tf.can_transform("odom", "base_link", 1.5));
        assert!(tf.can_transform("odom", "base_link", LATEST));
    }

    #[test]
    fn lookup_before_history_is_unavailable() {
        let mut tf = TfEngine::new();
        tf.set_transform("odom", "base_link", tx(0.0), 4.0);
        tf.set_transform("odom", "base_link", tx(1.0), 5.0);
        assert!(!tf.can_transform("odom", "base_link", 3.0));
    }

    #[test]
    fn out_of_order_samples_are_kept_sorted() {
        let mut tf = TfEngine::new();
        tf.set_transform("odom", "base_link", tx(3.0), 3.0);
        tf.set_transform("odom", "base_link", tx(1.0), 1.0);
        let t = tf.lookup("odom", "base_link", 2.0).unwrap();
        assert!((t.translation.x - 2.0).abs() < 1e-12);
    }

    #[test]
    fn transform_pose_re_expresses_in_target_frame() {
        let mut tf = TfEngine::new();
        tf.set_transform(
            "odom",
            "base_link",
            Transform3D::from_pose2d(Pose2D::new(1.0, 0.0, FRAC_PI_2)),
            1.0,
        );
        let p = tf
            .transform_pose("odom", "base_link", Pose2D::new(1.0, 0.0, 0.0), 1.0)
            .unwrap();
        assert!((p.x - 1.0).abs() < 1e-9);
        assert!((p.y - 1.0).abs() < 1e-9);
        assert!((p.heading - FRAC_PI_2).abs() < 1e-9);
    }

    // ── wait_for_transform / SharedTf ───────────────────────────────────────

    #[test]
    fn wait_for_transform_times_out() {
        let tf = TfEngine::new();
        let start = Instant::now();
        assert!(!tf.wait_for_transform("odom", "base_link", 1.0, Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn wait_for_transform_sees_late_publication() {
        let shared = SharedTf::new();
        shared.set_transform("odom", "base_link", tx(0.0), 0.5);
        let writer = shared.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            writer.set_transform("odom", "base_link", tx(1.0), 1.0);
        });
        assert!(shared.wait_for_transform("odom", "base_link", 1.0, Duration::from_secs(2)));
        handle.join().unwrap();
    }

    #[test]
    fn tf_error_converts_into_loc_error() {
        let err: LocError = TfError::Unavailable {
            target: "odom".to_string(),
            source_frame: "base_link".to_string(),
            stamp: 1.0,
        }
        .into();
        assert!(matches!(err, LocError::TransformUnavailable { .. }));
    }
}
