//! Pose estimate from a normalized population.

use mcl_types::Pose2D;

use crate::particle::NormalizedParticles;

/// Weighted mean position and circular weighted mean heading.
///
/// Headings are averaged as unit vectors: a cloud straddling ±π averages to
/// ±π, not 0.
pub fn estimate_pose(particles: &NormalizedParticles<'_>) -> Pose2D {
    let (mut x, mut y, mut sin, mut cos) = (0.0, 0.0, 0.0, 0.0);
    for p in particles.iter() {
        x += p.weight * p.x;
        y += p.weight * p.y;
        let (s, c) = p.heading.sin_cos();
        sin += p.weight * s;
        cos += p.weight * c;
    }
    Pose2D::new(x, y, sin.atan2(cos))
}
