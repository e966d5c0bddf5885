//! Elite resampling with jittered replication.
//!
//! Phase one draws `floor(N · sample_factor)` elites with replacement by
//! inverting the weight CDF.  Phase two emits every elite once, verbatim,
//! followed by Gaussian-jittered copies until the population is back to `N`.

use mcl_types::normalize_angle;
use rand::Rng;

use crate::FilterError;
use crate::noise::gaussian;
use crate::params::FilterParams;
use crate::particle::{NormalizedParticles, Particle, Population};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resampler {
    target: usize,
    elites: usize,
    linear_sigma: f64,
    angular_sigma: f64,
}

impl Resampler {
    /// # Errors
    ///
    /// [`FilterError::InvalidConfig`] if the parameters draw no elites.
    pub fn from_params(params: &FilterParams) -> Result<Self, FilterError> {
        let elites = params.elite_count();
        if params.particle_count == 0 || elites == 0 {
            return Err(FilterError::InvalidConfig(format!(
                "resampling {} particles with sample_factor {} draws no elites",
                params.particle_count, params.sample_factor
            )));
        }
        Ok(Self {
            target: params.particle_count,
            elites,
            linear_sigma: params.linear_resample_sigma,
            angular_sigma: params.angular_resample_sigma,
        })
    }

    /// Output population size.
    pub fn target(&self) -> usize {
        self.target
    }

    pub fn elites(&self) -> usize {
        self.elites
    }

    /// Draw `count` indices with probability proportional to weight.
    pub fn draw_indices<R: Rng + ?Sized>(
        particles: &NormalizedParticles<'_>,
        count: usize,
        rng: &mut R,
    ) -> Vec<usize> {
        let mut cdf = Vec::with_capacity(particles.len());
        let mut acc = 0.0;
        for p in particles.iter() {
            acc += p.weight;
            cdf.push(acc);
        }
        let last = particles.len().saturating_sub(1);
        (0..count)
            .map(|_| {
                let u = rng.random::<f64>() * acc;
                cdf.partition_point(|&c| c <= u).min(last)
            })
            .collect()
    }

    /// Build the next population from a normalized one.
    ///
    /// The result has exactly [`target`][Self::target] particles, each of
    /// weight `1 / target`.
    pub fn resample<R: Rng + ?Sized>(
        &self,
        particles: &NormalizedParticles<'_>,
        rng: &mut R,
    ) -> Population {
        let picks = Self::draw_indices(particles, self.elites, rng);
        let share = self.target / self.elites;
        let extra = self.target % self.elites;
        let weight = 1.0 / self.target as f64;

        let mut next = Vec::with_capacity(self.target);
        for (k, &idx) in picks.iter().enumerate() {
            let elite = particles[idx];
            let slots = share + usize::from(k < extra);
            next.push(Particle { weight, ..elite });
            for _ in 1..slots {
                next.push(Particle {
                    x: gaussian(rng, elite.x, self.linear_sigma),
                    y: gaussian(rng, elite.y, self.linear_sigma),
                    heading: normalize_angle(gaussian(rng, elite.heading, self.angular_sigma)),
                    weight,
                });
            }
        }
        Population::from_particles(next)
    }
}
