use rand::Rng;
use rand_distr::{Distribution, Normal};

/// One draw from `Normal(mean, sd)`.  A zero (or unusable) spread yields
/// `mean` exactly, so zero motion never produces jitter.
pub(crate) fn gaussian<R: Rng + ?Sized>(rng: &mut R, mean: f64, sd: f64) -> f64 {
    if !(sd > 0.0) {
        return mean;
    }
    Normal::new(mean, sd).map_or(mean, |n| n.sample(rng))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn zero_spread_returns_mean_exactly() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(gaussian(&mut rng, 1.25, 0.0), 1.25);
        assert_eq!(gaussian(&mut rng, -3.0, f64::NAN), -3.0);
    }

    #[test]
    fn samples_centre_on_mean() {
        let mut rng = StdRng::seed_from_u64(7);
        let n = 5_000;
        let mean = (0..n).map(|_| gaussian(&mut rng, 2.0, 0.5)).sum::<f64>() / n as f64;
        assert!((mean - 2.0).abs() < 0.05, "mean={mean}");
    }
}
