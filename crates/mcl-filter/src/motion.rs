//! Odometry-driven particle propagation.

use mcl_types::{Pose2D, angle_diff, normalize_angle};
use rand::Rng;

use crate::noise::gaussian;
use crate::params::FilterParams;
use crate::particle::Population;

/// Displacement between two odometry poses, in the odometry frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct OdometryDelta {
    pub dx: f64,
    pub dy: f64,
    /// Shortest signed rotation, in `(-π, π]`.
    pub dtheta: f64,
}

impl OdometryDelta {
    pub fn new(dx: f64, dy: f64, dtheta: f64) -> Self {
        Self { dx, dy, dtheta }
    }

    /// Motion from `from` (the baseline) to `to`.
    pub fn between(from: Pose2D, to: Pose2D) -> Self {
        Self {
            dx: to.x - from.x,
            dy: to.y - from.y,
            dtheta: angle_diff(to.heading, from.heading),
        }
    }

    /// Planar travel distance.
    pub fn distance(&self) -> f64 {
        self.dx.hypot(self.dy)
    }

    pub fn is_zero(&self) -> bool {
        self.dx == 0.0 && self.dy == 0.0 && self.dtheta == 0.0
    }

    /// `(forward, lateral)` components in the robot body frame, for a robot
    /// that was facing `heading` when the motion started.
    pub fn body_frame(&self, heading: f64) -> (f64, f64) {
        let (sin, cos) = heading.sin_cos();
        (cos * self.dx + sin * self.dy, -sin * self.dx + cos * self.dy)
    }
}

/// Moves every particle by the odometry delta plus motion-proportional noise.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionModel {
    linear_noise_fraction: f64,
    angular_noise_fraction: f64,
}

impl MotionModel {
    pub fn new(linear_noise_fraction: f64, angular_noise_fraction: f64) -> Self {
        Self {
            linear_noise_fraction,
            angular_noise_fraction,
        }
    }

    pub fn from_params(params: &FilterParams) -> Self {
        Self::new(params.linear_noise_fraction, params.angular_noise_fraction)
    }

    /// Propagate `population` in place.
    ///
    /// The delta is resolved into body-frame components at
    /// `baseline_heading`, then replayed in each particle's own heading frame.
    /// A zero delta leaves the population untouched.
    pub fn apply<R: Rng + ?Sized>(
        &self,
        population: &mut Population,
        delta: &OdometryDelta,
        baseline_heading: f64,
        rng: &mut R,
    ) {
        if delta.is_zero() {
            return;
        }
        let (forward, lateral) = delta.body_frame(baseline_heading);

        for p in population.particles_mut() {
            let (sin, cos) = p.heading.sin_cos();
            let dx = cos * forward - sin * lateral;
            let dy = sin * forward + cos * lateral;
            p.x += gaussian(rng, dx, self.linear_noise_fraction * dx.abs());
            p.y += gaussian(rng, dy, self.linear_noise_fraction * dy.abs());
            let dtheta = gaussian(
                rng,
                delta.dtheta,
                self.angular_noise_fraction * delta.dtheta.abs(),
            );
            p.heading = normalize_angle(p.heading + dtheta);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::particle::Particle;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::f64::consts::{FRAC_PI_2, PI};

    fn cloud_around(centre: Pose2D, n: usize, rng: &mut StdRng) -> Population {
        Population::from_particles(
            (0..n)
                .map(|_| {
                    Particle::new(
                        gaussian(rng, centre.x, 0.2),
                        gaussian(rng, centre.y, 0.2),
                        gaussian(rng, centre.heading, 5f64.to_radians()),
                        1.0,
                    )
                })
                .collect(),
        )
    }

    #[test]
    fn delta_wraps_heading_across_pi() {
        let d = OdometryDelta::between(Pose2D::new(0.0, 0.0, PI - 0.1), Pose2D::new(0.0, 0.0, -PI + 0.1));
        assert!((d.dtheta - 0.2).abs() < 1e-9);
    }

    #[test]
    fn body_frame_rotates_into_robot_axes() {
        let d = OdometryDelta::new(0.0, 1.0, 0.0);
        let (forward, lateral) = d.body_frame(FRAC_PI_2);
        assert!((forward - 1.0).abs() < 1e-12);
        assert!(lateral.abs() < 1e-12);
    }

    #[test]
    fn zero_motion_leaves_population_unchanged() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut pop = cloud_around(Pose2D::new(1.0, -2.0, 0.4), 100, &mut rng);
        let before = pop.clone();
        MotionModel::from_params(&FilterParams::default()).apply(
            &mut pop,
            &OdometryDelta::default(),
            0.4,
            &mut rng,
        );
        assert_eq!(pop, before);
    }

    #[test]
    fn noiseless_motion_follows_each_particle_heading() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut pop = Population::from_particles(vec![
            Particle::new(0.0, 0.0, 0.0, 1.0),
            Particle::new(0.0, 0.0, FRAC_PI_2, 1.0),
        ]);
        let model = MotionModel::new(0.0, 0.0);
        model.apply(&mut pop, &OdometryDelta::new(1.0, 0.0, 0.1), 0.0, &mut rng);

        let a = pop.particles()[0];
        assert!((a.x - 1.0).abs() < 1e-12 && a.y.abs() < 1e-12);
        assert!((a.heading - 0.1).abs() < 1e-12);
        let b = pop.particles()[1];
        assert!(b.x.abs() < 1e-12 && (b.y - 1.0).abs() < 1e-12);
    }

    #[test]
    fn forward_metre_moves_cloud_mean_by_a_metre() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut pop = cloud_around(Pose2D::origin(), 300, &mut rng);
        MotionModel::from_params(&FilterParams::default()).apply(
            &mut pop,
            &OdometryDelta::new(1.0, 0.0, 0.0),
            0.0,
            &mut rng,
        );
        let n = pop.len() as f64;
        let mx = pop.particles().iter().map(|p| p.x).sum::<f64>() / n;
        let my = pop.particles().iter().map(|p| p.y).sum::<f64>() / n;
        assert!((mx - 1.0).abs() < 0.1, "mean x = {mx}");
        assert!(my.abs() < 0.1, "mean y = {my}");
    }
}
