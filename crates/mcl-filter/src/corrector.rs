//! map ← odom frame correction.
//!
//! Odometry drifts; the filter does not.  The correction is the transform
//! that, composed with the current odom ← base transform, puts the robot at
//! the filter's estimate:
//!
//! ```text
//! T_map_odom = T_map_base(estimate) ∘ T_odom_base⁻¹
//! ```

use std::time::Duration;

use mcl_perception::{TfError, Transform3D, TransformProvider};
use mcl_types::{Pose2D, TransformStamped};
use tracing::debug;

use crate::params::Frames;

/// A computed map ← odom transform and the stamp it was computed for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameCorrection {
    pub stamp: f64,
    pub transform: Transform3D,
}

impl FrameCorrection {
    /// Wire form, `frames.map ← frames.odom`.
    pub fn to_stamped(&self, frames: &Frames) -> TransformStamped {
        self.to_stamped_at(self.stamp, frames)
    }

    /// Wire form re-stamped at `stamp`, for periodic rebroadcast.
    pub fn to_stamped_at(&self, stamp: f64, frames: &Frames) -> TransformStamped {
        self.transform.to_stamped(stamp, &frames.map, &frames.odom)
    }

    /// Where an odometry-frame pose lands in the map.
    pub fn apply(&self, odom_pose: Pose2D) -> Pose2D {
        self.transform
            .compose(Transform3D::from_pose2d(odom_pose))
            .to_pose2d()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameCorrector {
    timeout: Duration,
}

impl FrameCorrector {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Correction that maps the odometry pose at `stamp` onto `estimate`.
    ///
    /// Waits at most the configured timeout for odom ← base at `stamp`.
    ///
    /// # Errors
    ///
    /// [`TfError::Timeout`] when the transform never appears, or the lookup
    /// error if it disappears between the wait and the lookup.
    pub fn compute<T>(
        &self,
        estimate: Pose2D,
        tf: &T,
        frames: &Frames,
        stamp: f64,
    ) -> Result<FrameCorrection, TfError>
    where
        T: TransformProvider + ?Sized,
    {
        if !tf.wait_for_transform(&frames.odom, &frames.base_link, stamp, self.timeout) {
            return Err(TfError::Timeout {
                target: frames.odom.clone(),
                source_frame: frames.base_link.clone(),
                stamp,
                waited: self.timeout,
            });
        }
        let odom_base = tf.lookup(&frames.odom, &frames.base_link, stamp)?;
        let transform = Transform3D::from_pose2d(estimate).compose(odom_base.inverse());
        debug!(stamp, ?estimate, "frame correction computed");
        Ok(FrameCorrection { stamp, transform })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcl_perception::TfEngine;

    fn close(a: Pose2D, b: Pose2D) -> bool {
        (a.x - b.x).abs() < 1e-9
            && (a.y - b.y).abs() < 1e-9
            && mcl_types::angle_diff(a.heading, b.heading).abs() < 1e-9
    }

    fn tf_with_odom(pose: Pose2D, stamp: f64) -> TfEngine {
        let mut tf = TfEngine::new();
        tf.set_transform("odom", "base_link", Transform3D::from_pose2d(pose), stamp);
        tf
    }

    #[test]
    fn correction_maps_odometry_pose_onto_estimate() {
        let odom_pose = Pose2D::new(2.0, 1.0, 0.3);
        let estimate = Pose2D::new(5.0, -1.0, 1.2);
        let tf = tf_with_odom(odom_pose, 4.0);
        let corrector = FrameCorrector::new(Duration::from_millis(50));

        let c = corrector
            .compute(estimate, &tf, &Frames::default(), 4.0)
            .unwrap();
        assert!(close(c.apply(odom_pose), estimate));
        assert_eq!(c.stamp, 4.0);
    }

    #[test]
    fn identity_when_odometry_agrees() {
        let pose = Pose2D::new(-3.0, 0.5, -2.0);
        let tf = tf_with_odom(pose, 1.0);
        let c = FrameCorrector::new(Duration::from_millis(10))
            .compute(pose, &tf, &Frames::default(), 1.0)
            .unwrap();
        assert!(close(c.transform.to_pose2d(), Pose2D::origin()));
    }

    #[test]
    fn missing_odometry_times_out() {
        let tf = TfEngine::new();
        let err = FrameCorrector::new(Duration::from_millis(20))
            .compute(Pose2D::origin(), &tf, &Frames::default(), 1.0)
            .unwrap_err();
        assert!(matches!(err, TfError::Timeout { .. }));
    }

    #[test]
    fn stamped_form_names_map_and_odom() {
        let c = FrameCorrection {
            stamp: 2.0,
            transform: Transform3D::from_pose2d(Pose2D::new(1.0, 2.0, 0.0)),
        };
        let msg = c.to_stamped_at(3.0, &Frames::default());
        assert_eq!(msg.parent_frame, "map");
        assert_eq!(msg.child_frame, "odom");
        assert_eq!(msg.stamp, 3.0);
        assert_eq!(msg.translation, [1.0, 2.0, 0.0]);
    }
}
