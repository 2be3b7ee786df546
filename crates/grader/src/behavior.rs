//! Model constants and the random draws that shape user behaviour.
//!
//! Every draw takes the generator explicitly so a run is reproducible from
//! its seed alone.

use gradesim::SimTime;
use rand::Rng;
use rand_distr::StandardNormal;

/// Ticks per simulated minute.
pub const TICKS_PER_MINUTE: SimTime = 2;

/// Rolling window over which `tag_limit` applies.
///
/// Deliberately 60 ticks, not an hour on the `TICKS_PER_MINUTE` scale
/// (which would be 120): a user's `tag_limit + 1`-th failed attempt is
/// deferred until the oldest one is 60 ticks old.
pub const RATE_WINDOW: SimTime = 60;

/// Wait before a rate-limited user tries again.
pub const RATE_LIMIT_RETRY: SimTime = TICKS_PER_MINUTE;

/// Poll interval of the background loops (sampler, backup drain).
pub const POLL_INTERVAL: SimTime = 1;

/// Service time multiplier for the slow population.
pub const SLOW_SERVICE_FACTOR: SimTime = 2;

const ABILITY_MEAN: f64 = 0.6;
const ABILITY_SD: f64 = 0.075;
const ABILITY_MIN: f64 = 0.2;
const ABILITY_MAX: f64 = 0.75;

fn gaussian<R: Rng + ?Sized>(rng: &mut R, mean: f64, sd: f64) -> f64 {
    let z: f64 = rng.sample(StandardNormal);
    mean + sd * z
}

fn minutes<R: Rng + ?Sized>(rng: &mut R, mean: f64, sd: f64) -> SimTime {
    let drawn = gaussian(rng, mean, sd).max(1.0).round();
    drawn as SimTime * TICKS_PER_MINUTE
}

/// Base pass probability of a new user.
pub fn ability<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    gaussian(rng, ABILITY_MEAN, ABILITY_SD).clamp(ABILITY_MIN, ABILITY_MAX)
}

/// Time spent working on an exercise before the first attempt.
pub fn think_time<R: Rng + ?Sized>(rng: &mut R) -> SimTime {
    minutes(rng, 45.0, 15.0)
}

/// Time spent fixing a failed attempt.
pub fn rework_time<R: Rng + ?Sized>(rng: &mut R) -> SimTime {
    minutes(rng, 15.0, 5.0)
}

/// Backoff after a stage refused the commit.
pub fn refusal_backoff<R: Rng + ?Sized>(rng: &mut R) -> SimTime {
    rng.gen_range(4..=10u64) * TICKS_PER_MINUTE
}

/// Backoff after the dam turned the user away.
pub fn dam_backoff<R: Rng + ?Sized>(rng: &mut R) -> SimTime {
    rng.gen_range(1..=3u64)
}

/// Pass probability gained from a failed attempt.
pub fn learning_boost<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    gaussian(rng, 0.1, 0.015).clamp(0.05, 0.2)
}

/// Draw the outcome of a delivered result.
pub fn passes<R: Rng + ?Sized>(rng: &mut R, chance: f64) -> bool {
    rng.gen::<f64>() <= chance
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn draws_stay_within_model_bounds() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for _ in 0..1_000 {
            let skill = ability(&mut rng);
            assert!((ABILITY_MIN..=ABILITY_MAX).contains(&skill));

            let boost = learning_boost(&mut rng);
            assert!((0.05..=0.2).contains(&boost));

            let backoff = refusal_backoff(&mut rng);
            assert!((8..=20).contains(&backoff));
            assert_eq!(backoff % TICKS_PER_MINUTE, 0);

            assert!((1..=3).contains(&dam_backoff(&mut rng)));
            assert!(think_time(&mut rng) >= TICKS_PER_MINUTE);
            assert!(rework_time(&mut rng) >= TICKS_PER_MINUTE);
        }
    }

    #[test]
    fn rate_window_is_sixty_ticks_not_an_hour_of_minutes() {
        assert_eq!(RATE_WINDOW, 60);
        assert_eq!(RATE_WINDOW, 30 * TICKS_PER_MINUTE);
    }

    #[test]
    fn certain_chance_always_passes() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert!((0..100).all(|_| passes(&mut rng, 1.0)));
    }

    #[test]
    fn same_seed_same_draws() {
        let mut first = ChaCha8Rng::seed_from_u64(99);
        let mut second = ChaCha8Rng::seed_from_u64(99);
        let a: Vec<_> = (0..16).map(|_| think_time(&mut first)).collect();
        let b: Vec<_> = (0..16).map(|_| think_time(&mut second)).collect();
        assert_eq!(a, b);
    }
}
