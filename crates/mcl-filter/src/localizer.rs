//! The update scheduler.
//!
//! [`Localizer`] owns the live population, the current estimate and the
//! current frame correction.  Each incoming scan drives at most one cycle:
//!
//! ```text
//! Uninitialized ──first scan with frames──▶ Tracking
//!       ▲                                     │
//!       └────── initial pose, no odometry ────┘
//!
//! Tracking, per scan:
//!   delta = odom(scan.stamp) − baseline
//!   below thresholds → no-op
//!   otherwise        → motion → sensor → estimate → resample → correction
//! ```

use std::time::Duration;

use mcl_perception::{DistanceField, TransformProvider};
use mcl_types::{LaserScan, ParticleCloud, Pose2D, PoseStamped2D, TransformStamped};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, info, instrument, warn};

use crate::FilterError;
use crate::corrector::{FrameCorrection, FrameCorrector};
use crate::estimate::estimate_pose;
use crate::motion::{MotionModel, OdometryDelta};
use crate::noise::gaussian;
use crate::params::{FilterParams, Frames};
use crate::particle::{Particle, Population};
use crate::resample::Resampler;
use crate::sensor::SensorModel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingState {
    Uninitialized,
    Tracking,
}

/// What a call to [`Localizer::process_scan`] or
/// [`Localizer::set_initial_pose`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Required transforms were missing at the scan stamp; nothing changed.
    FramesUnavailable,
    /// The population was (re)seeded.
    Initialized { correction_updated: bool },
    /// The robot has not moved far enough since the baseline.
    BelowThreshold,
    /// A full motion/sensor/resample cycle ran.
    Updated { correction_updated: bool },
}

impl UpdateOutcome {
    /// `true` when the population (and estimate) changed.
    pub fn population_changed(&self) -> bool {
        matches!(self, Self::Initialized { .. } | Self::Updated { .. })
    }
}

/// Single owner of the filter state.
#[derive(Debug)]
pub struct Localizer {
    params: FilterParams,
    frames: Frames,
    motion: MotionModel,
    sensor: SensorModel,
    resampler: Resampler,
    corrector: FrameCorrector,
    population: Population,
    state: TrackingState,
    baseline: Option<Pose2D>,
    estimate: Option<Pose2D>,
    correction: Option<FrameCorrection>,
    pending_initial_pose: Option<Pose2D>,
    stamp: f64,
    rng: StdRng,
}

impl Localizer {
    /// # Errors
    ///
    /// [`FilterError::InvalidConfig`] if `params` fails validation.
    pub fn new(
        params: FilterParams,
        frames: Frames,
        transform_timeout: Duration,
    ) -> Result<Self, FilterError> {
        params.validate()?;
        let rng = params
            .seed
            .map_or_else(StdRng::from_os_rng, StdRng::seed_from_u64);
        Ok(Self {
            motion: MotionModel::from_params(&params),
            sensor: SensorModel::from_params(&params),
            resampler: Resampler::from_params(&params)?,
            corrector: FrameCorrector::new(transform_timeout),
            params,
            frames,
            population: Population::default(),
            state: TrackingState::Uninitialized,
            baseline: None,
            estimate: None,
            correction: None,
            pending_initial_pose: None,
            stamp: 0.0,
            rng,
        })
    }

    // ── Accessors ───────────────────────────────────────────────────────────

    pub fn state(&self) -> TrackingState {
        self.state
    }

    pub fn params(&self) -> &FilterParams {
        &self.params
    }

    pub fn frames(&self) -> &Frames {
        &self.frames
    }

    pub fn population(&self) -> &Population {
        &self.population
    }

    /// Odometry pose at the last update.
    pub fn baseline(&self) -> Option<Pose2D> {
        self.baseline
    }

    /// Current best estimate of the robot pose in the map frame.
    pub fn estimate(&self) -> Option<Pose2D> {
        self.estimate
    }

    /// Last successfully computed map ← odom correction.
    pub fn correction(&self) -> Option<FrameCorrection> {
        self.correction
    }

    /// Stamp of the observation that last changed the population.
    pub fn stamp(&self) -> f64 {
        self.stamp
    }

    pub fn pose_stamped(&self) -> Option<PoseStamped2D> {
        self.estimate.map(|pose| PoseStamped2D {
            stamp: self.stamp,
            frame_id: self.frames.map.clone(),
            pose,
        })
    }

    pub fn particle_cloud(&self) -> ParticleCloud {
        self.population.to_cloud(self.stamp, &self.frames.map)
    }

    pub fn correction_stamped(&self) -> Option<TransformStamped> {
        self.correction.map(|c| c.to_stamped(&self.frames))
    }

    // ── Parameters ──────────────────────────────────────────────────────────

    /// Swap in new parameters between cycles.
    ///
    /// A new `particle_count` takes effect at the next resample.  The RNG
    /// seed is only honoured at construction.
    ///
    /// # Errors
    ///
    /// [`FilterError::InvalidConfig`]; the current parameters stay in force.
    pub fn update_params(&mut self, params: FilterParams) -> Result<(), FilterError> {
        if params == self.params {
            return Ok(());
        }
        if let Err(e) = params.validate() {
            warn!(error = %e, "rejected parameter update; keeping previous parameters");
            return Err(e);
        }
        self.resampler = Resampler::from_params(&params)?;
        self.motion = MotionModel::from_params(&params);
        self.sensor = SensorModel::from_params(&params);
        info!(
            particles = params.particle_count,
            sample_factor = params.sample_factor,
            "filter parameters updated"
        );
        self.params = params;
        Ok(())
    }

    // ── Re-initialization ───────────────────────────────────────────────────

    /// Discard the population and reseed it around `pose` (map frame).
    ///
    /// The correction is recomputed against the odometry at `stamp`, which
    /// also stamps the estimate.  [`mcl_perception::LATEST`] uses the newest
    /// odometry but leaves the estimate stamped at zero.  Without odometry the
    /// pose is held until the next scan and the filter drops back to
    /// [`TrackingState::Uninitialized`].
    ///
    /// # Errors
    ///
    /// [`FilterError::DegenerateWeights`] only on an internal defect.
    pub fn set_initial_pose<T>(
        &mut self,
        pose: Pose2D,
        tf: &T,
        stamp: f64,
    ) -> Result<UpdateOutcome, FilterError>
    where
        T: TransformProvider + ?Sized,
    {
        self.population = Population::default();
        let odom_pose = match tf.lookup(&self.frames.odom, &self.frames.base_link, stamp) {
            Ok(t) => t.to_pose2d(),
            Err(e) => {
                info!(?pose, reason = %e, "initial pose deferred until odometry arrives");
                self.pending_initial_pose = Some(pose);
                self.state = TrackingState::Uninitialized;
                self.baseline = None;
                self.estimate = None;
                return Ok(UpdateOutcome::FramesUnavailable);
            }
        };

        self.pending_initial_pose = None;
        self.seed_population(pose)?;
        self.baseline = Some(odom_pose);
        self.state = TrackingState::Tracking;
        self.stamp = stamp;
        let correction_updated = self.refresh_correction(tf, stamp);
        info!(?pose, particles = self.population.len(), "filter re-initialized");
        Ok(UpdateOutcome::Initialized { correction_updated })
    }

    // ── Update cycle ────────────────────────────────────────────────────────

    /// Run at most one filter cycle for `scan`.
    ///
    /// # Errors
    ///
    /// [`FilterError::DegenerateWeights`] only on an internal defect; frame
    /// problems are reported as [`UpdateOutcome::FramesUnavailable`].
    #[instrument(skip_all, fields(stamp = scan.stamp, beams = scan.ranges.len()))]
    pub fn process_scan<T, F>(
        &mut self,
        scan: &LaserScan,
        tf: &T,
        field: &F,
    ) -> Result<UpdateOutcome, FilterError>
    where
        T: TransformProvider + ?Sized,
        F: DistanceField + ?Sized,
    {
        let Some((mount, odom_pose)) = self.resolve_frames(scan, tf) else {
            return Ok(UpdateOutcome::FramesUnavailable);
        };

        let baseline = match (self.state, self.baseline) {
            (TrackingState::Tracking, Some(baseline)) => baseline,
            _ => {
                let centre = self.pending_initial_pose.take().unwrap_or(odom_pose);
                self.seed_population(centre)?;
                self.baseline = Some(odom_pose);
                self.state = TrackingState::Tracking;
                self.stamp = scan.stamp;
                let correction_updated = self.refresh_correction(tf, scan.stamp);
                info!(?centre, particles = self.population.len(), "filter initialized");
                return Ok(UpdateOutcome::Initialized { correction_updated });
            }
        };

        let delta = OdometryDelta::between(baseline, odom_pose);
        if delta.distance() <= self.params.distance_threshold
            && delta.dtheta.abs() <= self.params.angle_threshold
        {
            return Ok(UpdateOutcome::BelowThreshold);
        }

        self.motion
            .apply(&mut self.population, &delta, baseline.heading, &mut self.rng);
        self.sensor
            .weigh(&mut self.population, scan, mount, field);
        let next = {
            let normalized = self.population.normalize()?;
            self.estimate = Some(estimate_pose(&normalized));
            self.resampler.resample(&normalized, &mut self.rng)
        };
        self.population = next;
        self.baseline = Some(odom_pose);
        self.stamp = scan.stamp;
        let correction_updated = self.refresh_correction(tf, scan.stamp);

        debug!(
            dx = delta.dx,
            dy = delta.dy,
            dtheta = delta.dtheta,
            estimate = ?self.estimate,
            correction_updated,
            "filter cycle complete"
        );
        Ok(UpdateOutcome::Updated { correction_updated })
    }

    /// Laser mount in the base frame and odometry pose at the scan stamp,
    /// or `None` if either transform is missing.
    fn resolve_frames<T>(&self, scan: &LaserScan, tf: &T) -> Option<(Pose2D, Pose2D)>
    where
        T: TransformProvider + ?Sized,
    {
        let laser = if scan.frame_id.is_empty() {
            self.frames.laser.as_str()
        } else {
            scan.frame_id.as_str()
        };
        let base = self.frames.base_link.as_str();
        let odom = self.frames.odom.as_str();

        if !tf.can_transform(base, laser, scan.stamp) || !tf.can_transform(base, odom, scan.stamp) {
            debug!(laser, base, odom, "frames unavailable; scan skipped");
            return None;
        }
        let mount = tf
            .lookup(base, laser, mcl_perception::LATEST)
            .or_else(|_| tf.lookup(base, laser, scan.stamp));
        let odom_base = tf.lookup(odom, base, scan.stamp);
        match (mount, odom_base) {
            (Ok(mount), Ok(odom_base)) => Some((mount.to_pose2d(), odom_base.to_pose2d())),
            (Err(e), _) | (_, Err(e)) => {
                debug!(error = %e, "frame lookup failed; scan skipped");
                None
            }
        }
    }

    /// Replace the population with `N` particles drawn around `centre` and
    /// refresh the estimate.
    fn seed_population(&mut self, centre: Pose2D) -> Result<(), FilterError> {
        let linear = self.params.linear_initialization_sigma;
        let angular = self.params.angular_initialization_sigma;
        let rng = &mut self.rng;
        let particles = (0..self.params.particle_count)
            .map(|_| {
                Particle::new(
                    gaussian(rng, centre.x, linear),
                    gaussian(rng, centre.y, linear),
                    gaussian(rng, centre.heading, angular),
                    1.0,
                )
            })
            .collect();
        self.population = Population::from_particles(particles);
        self.estimate = Some(estimate_pose(&self.population.normalize()?));
        Ok(())
    }

    /// Recompute the correction from the current estimate.  On failure the
    /// previous correction is kept.
    fn refresh_correction<T>(&mut self, tf: &T, stamp: f64) -> bool
    where
        T: TransformProvider + ?Sized,
    {
        let Some(estimate) = self.estimate else {
            return false;
        };
        match self.corrector.compute(estimate, tf, &self.frames, stamp) {
            Ok(correction) => {
                self.correction = Some(correction);
                true
            }
            Err(e) => {
                warn!(error = %e, "frame correction skipped; keeping previous");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcl_perception::{CellState, LikelihoodField, OccupancyGrid, TfEngine, Transform3D};
    use std::f64::consts::{FRAC_PI_2, PI};

    const TIMEOUT: Duration = Duration::from_millis(20);

    fn params() -> FilterParams {
        FilterParams {
            seed: Some(42),
            ..FilterParams::default()
        }
    }

    fn localizer(params: FilterParams) -> Localizer {
        Localizer::new(params, Frames::default(), TIMEOUT).unwrap()
    }

    fn tf_with_mount() -> TfEngine {
        let mut tf = TfEngine::new();
        tf.set_static_transform("base_link", "laser", Transform3D::identity());
        tf
    }

    fn publish_odom(tf: &mut TfEngine, stamp: f64, pose: Pose2D) {
        tf.set_transform("odom", "base_link", Transform3D::from_pose2d(pose), stamp);
    }

    fn blank_scan(stamp: f64) -> LaserScan {
        LaserScan {
            stamp,
            frame_id: "laser".into(),
            angle_min: -FRAC_PI_2,
            angle_increment: PI / 18.0,
            range_min: 0.05,
            range_max: 6.0,
            ranges: vec![f64::NAN; 19],
        }
    }

    /// Stands in for a map: distance to the line `y = 0`.
    struct Floor;

    impl DistanceField for Floor {
        fn closest_obstacle_distance(&self, _x: f64, y: f64) -> Option<f64> {
            Some(y.abs())
        }
    }

    // ── Construction ────────────────────────────────────────────────────────

    #[test]
    fn invalid_params_refuse_to_construct() {
        let bad = FilterParams {
            sample_factor: 0.0,
            ..FilterParams::default()
        };
        assert!(matches!(
            Localizer::new(bad, Frames::default(), TIMEOUT),
            Err(FilterError::InvalidConfig(_))
        ));
    }

    // ── Scheduling ──────────────────────────────────────────────────────────

    #[test]
    fn missing_frames_leave_state_untouched() {
        let mut loc = localizer(params());
        let tf = TfEngine::new();
        let outcome = loc.process_scan(&blank_scan(1.0), &tf, &Floor).unwrap();
        assert_eq!(outcome, UpdateOutcome::FramesUnavailable);
        assert_eq!(loc.state(), TrackingState::Uninitialized);
        assert!(loc.population().is_empty());
        assert!(loc.estimate().is_none());
    }

    #[test]
    fn missing_laser_mount_skips_scan() {
        let mut loc = localizer(params());
        let mut tf = TfEngine::new();
        publish_odom(&mut tf, 1.0, Pose2D::origin());
        let outcome = loc.process_scan(&blank_scan(1.0), &tf, &Floor).unwrap();
        assert_eq!(outcome, UpdateOutcome::FramesUnavailable);
    }

    #[test]
    fn first_scan_initializes_around_odometry() {
        let mut loc = localizer(params());
        let mut tf = tf_with_mount();
        publish_odom(&mut tf, 1.0, Pose2D::new(3.0, -2.0, 0.5));

        let outcome = loc.process_scan(&blank_scan(1.0), &tf, &Floor).unwrap();
        assert_eq!(outcome, UpdateOutcome::Initialized { correction_updated: true });
        assert_eq!(loc.state(), TrackingState::Tracking);
        assert_eq!(loc.population().len(), 300);

        let est = loc.estimate().unwrap();
        assert!((est.x - 3.0).abs() < 0.1 && (est.y + 2.0).abs() < 0.1);
        assert!((est.heading - 0.5).abs() < 0.05);

        let c = loc.correction().unwrap();
        let mapped = c.apply(Pose2D::new(3.0, -2.0, 0.5));
        assert!((mapped.x - est.x).abs() < 1e-9 && (mapped.y - est.y).abs() < 1e-9);
    }

    #[test]
    fn small_motion_is_a_no_op() {
        let mut loc = localizer(params());
        let mut tf = tf_with_mount();
        publish_odom(&mut tf, 1.0, Pose2D::origin());
        loc.process_scan(&blank_scan(1.0), &tf, &Floor).unwrap();
        let before = loc.population().clone();

        publish_odom(&mut tf, 2.0, Pose2D::new(0.1, 0.05, 0.2));
        let outcome = loc.process_scan(&blank_scan(2.0), &tf, &Floor).unwrap();
        assert_eq!(outcome, UpdateOutcome::BelowThreshold);
        assert_eq!(loc.population(), &before);
        assert_eq!(loc.baseline(), Some(Pose2D::origin()));
    }

    #[test]
    fn rotation_alone_triggers_update() {
        let mut loc = localizer(params());
        let mut tf = tf_with_mount();
        publish_odom(&mut tf, 1.0, Pose2D::origin());
        loc.process_scan(&blank_scan(1.0), &tf, &Floor).unwrap();

        publish_odom(&mut tf, 2.0, Pose2D::new(0.0, 0.0, 1.0));
        let outcome = loc.process_scan(&blank_scan(2.0), &tf, &Floor).unwrap();
        assert!(matches!(outcome, UpdateOutcome::Updated { .. }));
        assert!((loc.estimate().unwrap().heading - 1.0).abs() < 0.1);
    }

    #[test]
    fn forward_metre_moves_the_estimate() {
        let mut loc = localizer(params());
        let mut tf = tf_with_mount();
        publish_odom(&mut tf, 1.0, Pose2D::origin());
        loc.process_scan(&blank_scan(1.0), &tf, &Floor).unwrap();

        publish_odom(&mut tf, 2.0, Pose2D::new(1.0, 0.0, 0.0));
        let outcome = loc.process_scan(&blank_scan(2.0), &tf, &Floor).unwrap();
        assert_eq!(outcome, UpdateOutcome::Updated { correction_updated: true });

        let est = loc.estimate().unwrap();
        assert!((est.x - 1.0).abs() < 0.1, "x={}", est.x);
        assert!(est.y.abs() < 0.1, "y={}", est.y);
        assert!(est.heading.abs() < 0.05, "heading={}", est.heading);
        assert_eq!(loc.population().len(), 300);
        assert_eq!(loc.baseline(), Some(Pose2D::new(1.0, 0.0, 0.0)));
        let total = loc.population().total_weight();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn scan_beyond_odometry_history_keeps_correction() {
        let mut loc = localizer(params());
        let mut tf = tf_with_mount();
        publish_odom(&mut tf, 1.0, Pose2D::origin());
        loc.process_scan(&blank_scan(1.0), &tf, &Floor).unwrap();
        let first = loc.correction().unwrap();

        // Frame checks use the scan stamp; a scan from the future fails them.
        let outcome = loc.process_scan(&blank_scan(9.0), &tf, &Floor).unwrap();
        assert_eq!(outcome, UpdateOutcome::FramesUnavailable);
        assert_eq!(loc.correction(), Some(first));
    }

    // ── Initial pose ────────────────────────────────────────────────────────

    #[test]
    fn initial_pose_reseeds_and_recomputes_correction() {
        let mut loc = localizer(params());
        let mut tf = tf_with_mount();
        let odom = Pose2D::new(1.0, 1.0, 0.0);
        publish_odom(&mut tf, 1.0, odom);
        loc.process_scan(&blank_scan(1.0), &tf, &Floor).unwrap();

        let target = Pose2D::new(5.0, 5.0, 1.0);
        let outcome = loc
            .set_initial_pose(target, &tf, mcl_perception::LATEST)
            .unwrap();
        assert!(outcome.population_changed());
        let est = loc.estimate().unwrap();
        assert!((est.x - 5.0).abs() < 0.1 && (est.y - 5.0).abs() < 0.1);

        let mapped = loc.correction().unwrap().apply(odom);
        assert!((mapped.x - est.x).abs() < 1e-9);
        assert!((mapped.y - est.y).abs() < 1e-9);
        assert!((mapped.heading - est.heading).abs() < 1e-9);
    }

    #[test]
    fn initial_pose_without_odometry_waits_for_next_scan() {
        let mut loc = localizer(params());
        let mut tf = tf_with_mount();
        let outcome = loc
            .set_initial_pose(Pose2D::new(-4.0, 2.0, 0.0), &tf, mcl_perception::LATEST)
            .unwrap();
        assert_eq!(outcome, UpdateOutcome::FramesUnavailable);
        assert_eq!(loc.state(), TrackingState::Uninitialized);

        publish_odom(&mut tf, 1.0, Pose2D::origin());
        loc.process_scan(&blank_scan(1.0), &tf, &Floor).unwrap();
        let est = loc.estimate().unwrap();
        assert!((est.x + 4.0).abs() < 0.1 && (est.y - 2.0).abs() < 0.1);
    }

    // ── Parameters ──────────────────────────────────────────────────────────

    #[test]
    fn invalid_update_keeps_previous_params() {
        let mut loc = localizer(params());
        let bad = FilterParams {
            laser_stride: 0,
            ..params()
        };
        assert!(loc.update_params(bad).is_err());
        assert_eq!(loc.params().laser_stride, 5);
    }

    #[test]
    fn particle_count_change_applies_at_next_resample() {
        let mut loc = localizer(params());
        let mut tf = tf_with_mount();
        publish_odom(&mut tf, 1.0, Pose2D::origin());
        loc.process_scan(&blank_scan(1.0), &tf, &Floor).unwrap();

        loc.update_params(FilterParams {
            particle_count: 120,
            ..params()
        })
        .unwrap();
        assert_eq!(loc.population().len(), 300);

        publish_odom(&mut tf, 2.0, Pose2D::new(1.0, 0.0, 0.0));
        loc.process_scan(&blank_scan(2.0), &tf, &Floor).unwrap();
        assert_eq!(loc.population().len(), 120);
    }

    // ── Corridor tracking ───────────────────────────────────────────────────

    const RESOLUTION: f64 = 0.1;

    /// 20 m × 4.1 m corridor with walls along the top and bottom rows.
    fn corridor() -> LikelihoodField {
        let (width, height) = (200, 41);
        let wall = "#".repeat(width);
        let free = ".".repeat(width);
        let mut rows = vec![wall.clone()];
        rows.extend(std::iter::repeat_n(free, height - 2));
        rows.push(wall);
        let grid = OccupancyGrid::parse_ascii(&rows.join("\n"), RESOLUTION, (0.0, 0.0)).unwrap();
        LikelihoodField::from_grid(grid).unwrap()
    }

    /// March each beam until it enters an occupied cell.
    fn simulate_scan(grid: &OccupancyGrid, pose: Pose2D, stamp: f64) -> LaserScan {
        let mut scan = blank_scan(stamp);
        for i in 0..scan.ranges.len() {
            let bearing = pose.heading + scan.beam_angle(i);
            let (sin, cos) = bearing.sin_cos();
            let mut r = scan.range_min;
            scan.ranges[i] = f64::INFINITY;
            while r <= scan.range_max {
                let hit = grid
                    .world_to_cell(pose.x + r * cos, pose.y + r * sin)
                    .and_then(|(ix, iy)| grid.cell(ix, iy));
                if hit == Some(CellState::Occupied) {
                    scan.ranges[i] = r;
                    break;
                }
                r += 0.01;
            }
        }
        scan
    }

    #[test]
    fn tracks_robot_down_a_corridor() {
        let field = corridor();
        let mut loc = localizer(FilterParams {
            laser_stride: 1,
            ..params()
        });
        let mut tf = tf_with_mount();

        for step in 0..4 {
            let stamp = 1.0 + step as f64;
            let truth = Pose2D::new(2.0 + step as f64, 2.05, 0.0);
            publish_odom(&mut tf, stamp, truth);
            let scan = simulate_scan(field.grid(), truth, stamp);
            let outcome = loc.process_scan(&scan, &tf, &field).unwrap();
            assert!(outcome.population_changed(), "step {step}: {outcome:?}");

            let est = loc.estimate().unwrap();
            assert!((est.x - truth.x).abs() < 0.3, "step {step}: x={}", est.x);
            assert!((est.y - truth.y).abs() < 0.15, "step {step}: y={}", est.y);
            assert!(est.heading.abs() < 0.1, "step {step}: heading={}", est.heading);
        }
    }
}
