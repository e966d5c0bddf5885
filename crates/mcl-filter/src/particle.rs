//! Particles and the population that owns them.

use std::ops::Deref;

use mcl_types::{ParticleCloud, Pose2D, WeightedPose, normalize_angle};

use crate::FilterError;

/// One pose hypothesis.  Weights are unnormalized until
/// [`Population::normalize`] runs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Particle {
    pub x: f64,
    pub y: f64,
    pub heading: f64,
    pub weight: f64,
}

impl Particle {
    pub fn new(x: f64, y: f64, heading: f64, weight: f64) -> Self {
        Self {
            x,
            y,
            heading: normalize_angle(heading),
            weight,
        }
    }

    pub fn from_pose(pose: Pose2D, weight: f64) -> Self {
        Self::new(pose.x, pose.y, pose.heading, weight)
    }

    pub fn pose(&self) -> Pose2D {
        Pose2D::new(self.x, self.y, self.heading)
    }
}

/// The live set of particles.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Population {
    particles: Vec<Particle>,
}

impl Population {
    pub fn from_particles(particles: Vec<Particle>) -> Self {
        Self { particles }
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn particles_mut(&mut self) -> &mut [Particle] {
        &mut self.particles
    }

    pub fn total_weight(&self) -> f64 {
        self.particles.iter().map(|p| p.weight).sum()
    }

    /// Scale weights so they sum to one and hand out the normalized view.
    ///
    /// Normalizing an already-normalized population leaves it unchanged up
    /// to floating-point rounding.
    ///
    /// # Errors
    ///
    /// [`FilterError::DegenerateWeights`] if the total is zero, negative or
    /// not finite (this includes an empty population).
    pub fn normalize(&mut self) -> Result<NormalizedParticles<'_>, FilterError> {
        let total = self.total_weight();
        if !(total.is_finite() && total > 0.0) {
            return Err(FilterError::DegenerateWeights { total });
        }
        for p in &mut self.particles {
            p.weight /= total;
        }
        Ok(NormalizedParticles {
            particles: &self.particles,
        })
    }

    /// Snapshot for publication.
    pub fn to_cloud(&self, stamp: f64, frame_id: &str) -> ParticleCloud {
        ParticleCloud {
            stamp,
            frame_id: frame_id.to_string(),
            particles: self
                .particles
                .iter()
                .map(|p| WeightedPose {
                    pose: p.pose(),
                    weight: p.weight,
                })
                .collect(),
        }
    }
}

/// Read-only view of a population whose weights sum to one.
///
/// Only [`Population::normalize`] can produce one.
#[derive(Debug, Clone, Copy)]
pub struct NormalizedParticles<'a> {
    particles: &'a [Particle],
}

impl Deref for NormalizedParticles<'_> {
    type Target = [Particle];

    fn deref(&self) -> &[Particle] {
        self.particles
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn population(weights: &[f64]) -> Population {
        Population::from_particles(
            weights
                .iter()
                .enumerate()
                .map(|(i, &w)| Particle::new(i as f64, 0.0, 0.0, w))
                .collect(),
        )
    }

    #[test]
    fn normalize_sums_to_one() {
        let mut pop = population(&[1.0, 3.0, 4.0]);
        let view = pop.normalize().unwrap();
        let total: f64 = view.iter().map(|p| p.weight).sum();
        assert!((total - 1.0).abs() < 1e-12);
        assert!((view[2].weight - 0.5).abs() < 1e-12);
    }

    #[test]
    fn normalize_is_idempotent() {
        let mut pop = population(&[0.2, 7.5, 1e-3, 42.0]);
        pop.normalize().unwrap();
        let once: Vec<f64> = pop.particles().iter().map(|p| p.weight).collect();
        pop.normalize().unwrap();
        for (a, b) in once.iter().zip(pop.particles()) {
            assert!((a - b.weight).abs() < 1e-12);
        }
    }

    #[test]
    fn zero_total_is_degenerate() {
        let mut pop = population(&[0.0, 0.0]);
        assert_eq!(
            pop.normalize().unwrap_err(),
            FilterError::DegenerateWeights { total: 0.0 }
        );
    }

    #[test]
    fn non_finite_total_is_degenerate() {
        let mut pop = population(&[1.0, f64::INFINITY]);
        assert!(matches!(
            pop.normalize(),
            Err(FilterError::DegenerateWeights { .. })
        ));
    }

    #[test]
    fn empty_population_is_degenerate() {
        let mut pop = Population::default();
        assert!(pop.normalize().is_err());
    }

    #[test]
    fn particle_heading_is_wrapped() {
        let p = Particle::new(0.0, 0.0, 3.0 * std::f64::consts::PI - 0.5, 1.0);
        assert!((p.heading - (std::f64::consts::PI - 0.5)).abs() < 1e-9);
    }

    #[test]
    fn cloud_snapshot_keeps_order_and_weights() {
        let pop = population(&[1.0, 2.0]);
        let cloud = pop.to_cloud(3.5, "map");
        assert_eq!(cloud.frame_id, "map");
        assert_eq!(cloud.stamp, 3.5);
        assert_eq!(cloud.particles.len(), 2);
        assert_eq!(cloud.particles[1].pose.x, 1.0);
        assert_eq!(cloud.particles[1].weight, 2.0);
    }
}
