//! Users, their submissions and rate-limit bookkeeping.

use crate::behavior;
use gradesim::SimTime;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

/// Index of a user inside its topology.
pub type UserId = usize;

/// Cohort a user belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Population {
    /// Regular service profile; the cohort the dam regulates.
    Fast,
    /// Tests take `SLOW_SERVICE_FACTOR` times longer.
    Slow,
}

impl Population {
    pub fn service_factor(&self) -> SimTime {
        match self {
            Population::Fast => 1,
            Population::Slow => behavior::SLOW_SERVICE_FACTOR,
        }
    }
}

/// Timestamps of a user's recent failed submissions.
///
/// A submission is admitted while fewer than `limit` are recorded, or once
/// the oldest has aged out of the window, in which case it is evicted.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SubmissionHistory {
    limit: usize,
    times: VecDeque<SimTime>,
}

impl SubmissionHistory {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            times: VecDeque::with_capacity(limit),
        }
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn admit(&mut self, now: SimTime, window: SimTime) -> bool {
        if self.times.len() < self.limit {
            return true;
        }
        match self.times.front() {
            Some(&oldest) if oldest.saturating_add(window) > now => false,
            _ => {
                self.times.pop_front();
                true
            }
        }
    }

    pub fn record(&mut self, at: SimTime) {
        if self.limit > 0 && self.times.len() >= self.limit {
            self.times.pop_front();
        }
        self.times.push_back(at);
    }

    pub fn clear(&mut self) {
        self.times.clear();
    }
}

/// A student working through the exercises.
#[derive(Clone, Debug, PartialEq)]
pub struct User {
    pub name: String,
    pub population: Population,
    /// Base pass probability, fixed at creation.
    pub ability: f64,
    /// 1-based; `nb_exos + 1` means finished.
    pub current_exo: u32,
    pub history: SubmissionHistory,
}

impl User {
    pub fn new(name: impl Into<String>, population: Population, ability: f64) -> Self {
        Self {
            name: name.into(),
            population,
            ability: ability.clamp(0.0, 1.0),
            current_exo: 1,
            history: SubmissionHistory::default(),
        }
    }

    /// Create a user whose ability is drawn from the model distribution.
    pub fn sample<R: Rng + ?Sized>(
        name: impl Into<String>,
        population: Population,
        rng: &mut R,
    ) -> Self {
        let ability = behavior::ability(rng);
        Self::new(name, population, ability)
    }

    pub fn is_finished(&self, nb_exos: u32) -> bool {
        self.current_exo > nb_exos
    }

    /// Move on to the next exercise after a pass.
    pub fn advance(&mut self) {
        self.current_exo += 1;
        self.history.clear();
    }
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} - {:?}]", self.name, self.population)
    }
}

/// Correlates one submission across stages and metrics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CommitKey {
    pub user: UserId,
    /// Per-user submission counter.
    pub sequence: u64,
}

impl fmt::Display for CommitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "u{}#{}", self.user, self.sequence)
    }
}

/// One submission attempt.
#[derive(Clone, Debug, PartialEq)]
pub struct Commit {
    pub key: CommitKey,
    pub submitted_at: SimTime,
    pub exercise: u32,
    /// Effective pass probability of this attempt.
    pub chance: f64,
}

impl Commit {
    pub fn user(&self) -> UserId {
        self.key.user
    }
}

/// A tested commit waiting in backup storage for the result stage.
#[derive(Clone, Debug, PartialEq)]
pub struct BackupRecord {
    pub commit: Commit,
    pub backed_up_at: SimTime,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior::RATE_WINDOW;

    #[test]
    fn history_admits_until_limit() {
        let mut history = SubmissionHistory::new(2);
        assert!(history.admit(0, RATE_WINDOW));
        history.record(0);
        assert!(history.admit(5, RATE_WINDOW));
        history.record(5);

        assert!(!history.admit(10, RATE_WINDOW));
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn extra_submission_waits_for_oldest_to_age_out() {
        let limit = 3;
        let mut history = SubmissionHistory::new(limit);
        for at in [0, 10, 20] {
            assert!(history.admit(at, RATE_WINDOW));
            history.record(at);
        }

        // The (limit + 1)-th attempt is deferred for the rest of the window.
        for now in [21, 40, 59] {
            assert!(!history.admit(now, RATE_WINDOW), "admitted at {now}");
        }

        assert!(history.admit(60, RATE_WINDOW));
        assert_eq!(history.len(), limit - 1);
    }

    #[test]
    fn advancing_clears_history() {
        let mut user = User::new("USER0", Population::Fast, 0.5);
        user.history = SubmissionHistory::new(5);
        user.history.record(3);

        user.advance();

        assert_eq!(user.current_exo, 2);
        assert!(user.history.is_empty());
        assert!(user.is_finished(1));
        assert!(!user.is_finished(2));
    }

    #[test]
    fn explicit_ability_is_a_probability() {
        assert_eq!(User::new("a", Population::Slow, 1.7).ability, 1.0);
        assert_eq!(User::new("b", Population::Slow, -0.2).ability, 0.0);
    }

    #[test]
    fn slow_population_doubles_service() {
        assert_eq!(Population::Fast.service_factor(), 1);
        assert_eq!(Population::Slow.service_factor(), 2);
    }
}
