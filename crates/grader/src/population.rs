//! Synthetic user populations.

use crate::error::ConfigError;
use crate::user::{Population, User};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// ChaCha stream reserved for population generation, so drawing users never
/// shifts the run's own random sequence.
const POPULATION_STREAM: u64 = 1;

/// Generator for the population of a run seeded with `seed`.
pub fn population_rng(seed: u64) -> ChaCha8Rng {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    rng.set_stream(POPULATION_STREAM);
    rng
}

/// Draw `count` users named `USER0..`, each fast with probability
/// `fast_ratio` and with an ability sampled once.
pub fn generate<R: Rng + ?Sized>(
    count: usize,
    fast_ratio: f64,
    rng: &mut R,
) -> Result<Vec<User>, ConfigError> {
    if !(0.0..=1.0).contains(&fast_ratio) {
        return Err(ConfigError::InvalidRatio(fast_ratio));
    }
    let users = (0..count)
        .map(|i| {
            let population = if rng.gen::<f64>() < fast_ratio {
                Population::Fast
            } else {
                Population::Slow
            };
            User::sample(format!("USER{i}"), population, rng)
        })
        .collect();
    Ok(users)
}
