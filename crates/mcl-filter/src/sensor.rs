//! Likelihood-field sensor model.
//!
//! Each scored beam endpoint is looked up in a [`DistanceField`]; the
//! distance feeds a Gaussian kernel plus a constant floor, and a particle's
//! weight is the **sum** over beams.  Summing (instead of multiplying) keeps
//! the weights well inside `f64` range for long scans.

use std::f64::consts::{FRAC_1_SQRT_2, FRAC_2_SQRT_PI};

use mcl_perception::DistanceField;
use mcl_types::{LaserScan, Pose2D};

use crate::params::FilterParams;
use crate::particle::Population;

/// Kernel peak, `sqrt(2 / π)`.
const KERNEL_PEAK: f64 = FRAC_2_SQRT_PI * FRAC_1_SQRT_2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorModel {
    stride: usize,
    sigma: f64,
    floor: f64,
    max_penalty_distance: f64,
}

impl SensorModel {
    pub fn from_params(params: &FilterParams) -> Self {
        Self {
            stride: params.laser_stride.max(1),
            sigma: params.model_noise_rate,
            floor: params.model_noise_floor,
            max_penalty_distance: params.max_penalty_distance,
        }
    }

    /// Likelihood contribution of one beam whose endpoint lies `distance`
    /// from the nearest obstacle.
    pub fn beam_likelihood(&self, distance: f64) -> f64 {
        KERNEL_PEAK * (-(distance * distance) / (2.0 * self.sigma * self.sigma)).exp() + self.floor
    }

    /// Number of beams of `scan` that get scored.
    pub fn scored_beams(&self, scan: &LaserScan) -> usize {
        scan.ranges.len().div_ceil(self.stride)
    }

    /// Field distance charged to beam `index` for a sensor at `origin`.
    fn beam_distance<F>(&self, scan: &LaserScan, index: usize, origin: Pose2D, field: &F) -> f64
    where
        F: DistanceField + ?Sized,
    {
        let range = scan.ranges[index];
        if !scan.is_valid_range(range) {
            return self.max_penalty_distance;
        }
        let bearing = origin.heading + scan.beam_angle(index);
        let (sin, cos) = bearing.sin_cos();
        field
            .closest_obstacle_distance(origin.x + range * cos, origin.y + range * sin)
            .filter(|d| d.is_finite())
            .map_or(self.max_penalty_distance, |d| d.min(self.max_penalty_distance))
    }

    /// Score one hypothetical robot pose against `scan`.
    ///
    /// `mount` is the laser pose in the robot base frame.
    pub fn score<F>(&self, pose: Pose2D, scan: &LaserScan, mount: Pose2D, field: &F) -> f64
    where
        F: DistanceField + ?Sized,
    {
        let (sin, cos) = pose.heading.sin_cos();
        let origin = Pose2D {
            x: pose.x + cos * mount.x - sin * mount.y,
            y: pose.y + sin * mount.x + cos * mount.y,
            heading: pose.heading + mount.heading,
        };
        (0..scan.ranges.len())
            .step_by(self.stride)
            .map(|i| self.beam_likelihood(self.beam_distance(scan, i, origin, field)))
            .sum()
    }

    /// Replace every particle's weight with its scan score.
    ///
    /// A scan with no beams carries no information, so weights are kept.
    pub fn weigh<F>(&self, population: &mut Population, scan: &LaserScan, mount: Pose2D, field: &F)
    where
        F: DistanceField + ?Sized,
    {
        if scan.ranges.is_empty() {
            return;
        }
        for p in population.particles_mut() {
            p.weight = self.score(p.pose(), scan, mount, field);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::particle::Particle;
    use std::f64::consts::FRAC_PI_2;

    /// A single wall along `y = 2`.
    struct Wall;

    impl DistanceField for Wall {
        fn closest_obstacle_distance(&self, _x: f64, y: f64) -> Option<f64> {
            if y.abs() > 10.0 { None } else { Some((y - 2.0).abs()) }
        }
    }

    fn scan(ranges: Vec<f64>) -> LaserScan {
        LaserScan {
            stamp: 1.0,
            frame_id: "laser".into(),
            angle_min: FRAC_PI_2,
            angle_increment: 0.0,
            range_min: 0.05,
            range_max: 8.0,
            ranges,
        }
    }

    fn model() -> SensorModel {
        SensorModel::from_params(&FilterParams {
            laser_stride: 1,
            ..FilterParams::default()
        })
    }

    #[test]
    fn kernel_peaks_at_zero_distance() {
        let m = model();
        assert!((m.beam_likelihood(0.0) - (KERNEL_PEAK + 0.05)).abs() < 1e-12);
        assert!((KERNEL_PEAK - (2.0 / std::f64::consts::PI).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn likelihood_decreases_with_distance() {
        let m = model();
        let mut last = f64::INFINITY;
        for d in [0.0, 0.01, 0.05, 0.1, 0.5, 5.0] {
            let l = m.beam_likelihood(d);
            assert!(l < last || d == 0.0);
            assert!(l >= 0.05);
            last = l;
        }
    }

    #[test]
    fn closer_beam_endpoints_score_higher() {
        // Beam points straight up (+Y); true wall is 2 m away.
        let m = model();
        let s = scan(vec![2.0; 4]);
        let exact = m.score(Pose2D::origin(), &s, Pose2D::origin(), &Wall);
        let near = m.score(Pose2D::new(0.0, 0.03, 0.0), &s, Pose2D::origin(), &Wall);
        let far = m.score(Pose2D::new(0.0, 0.3, 0.0), &s, Pose2D::origin(), &Wall);
        assert!(exact > near && near > far);
    }

    #[test]
    fn stride_subsamples_beams() {
        let m = SensorModel::from_params(&FilterParams::default());
        assert_eq!(m.scored_beams(&scan(vec![2.0; 11])), 3);
        let all_invalid = m.score(Pose2D::origin(), &scan(vec![f64::NAN; 11]), Pose2D::origin(), &Wall);
        assert!((all_invalid - 3.0 * m.beam_likelihood(5.0)).abs() < 1e-12);
    }

    #[test]
    fn mount_offset_shifts_beam_origin() {
        let m = model();
        let s = scan(vec![1.5; 2]);
        // Laser sits 0.5 m ahead of the base; robot faces +Y.
        let mount = Pose2D::new(0.5, 0.0, 0.0);
        let facing_up = Pose2D::new(0.0, 0.0, FRAC_PI_2);
        let beams_forward = LaserScan { angle_min: 0.0, ..s };
        let score = m.score(facing_up, &beams_forward, mount, &Wall);
        assert!((score - 2.0 * m.beam_likelihood(0.0)).abs() < 1e-9);
    }

    #[test]
    fn undefined_scan_keeps_weights_positive() {
        let m = model();
        let mut pop = Population::from_particles(vec![
            Particle::new(0.0, 0.0, 0.0, 1.0),
            Particle::new(50.0, 50.0, 1.0, 1.0),
        ]);
        let s = scan(vec![f64::NAN, f64::INFINITY, 0.0, 100.0]);
        m.weigh(&mut pop, &s, Pose2D::origin(), &Wall);
        for p in pop.particles() {
            assert!(p.weight > 0.0 && p.weight.is_finite());
        }
        assert!(pop.normalize().is_ok());
    }

    #[test]
    fn empty_scan_keeps_weights() {
        let m = model();
        let mut pop = Population::from_particles(vec![Particle::new(0.0, 0.0, 0.0, 0.7)]);
        m.weigh(&mut pop, &scan(Vec::new()), Pose2D::origin(), &Wall);
        assert_eq!(pop.particles()[0].weight, 0.7);
    }
}
