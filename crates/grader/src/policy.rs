//! Admission, overflow and gating strategies for each topology.
//!
//! The four networks share one commit lifecycle; they differ only in the
//! policy values selected here at construction.

use crate::config::TopologyKind;
use crate::user::Population;
use gradesim::SimTime;

/// Entry rule of a stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    /// No occupancy tracking, nothing is refused.
    Open,
    /// At most this many users may occupy the stage.
    Bounded(usize),
}

impl Admission {
    pub fn limit(&self) -> Option<usize> {
        match self {
            Admission::Open => None,
            Admission::Bounded(limit) => Some(*limit),
        }
    }

    pub fn is_bounded(&self) -> bool {
        matches!(self, Admission::Bounded(_))
    }
}

/// What happens to a tested commit refused by the result stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Overflow {
    /// Dropped; the user resubmits after a backoff.
    Retry,
    /// Parked in backup storage for later delivery; the user still backs off.
    Backup,
}

/// Extra gate in front of the test stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Gate {
    None,
    Dam {
        population: Population,
        block_for: SimTime,
        enforced: bool,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Policy {
    pub test: Admission,
    pub result: Admission,
    pub overflow: Overflow,
    pub gate: Gate,
}

impl Policy {
    pub fn for_topology(kind: &TopologyKind) -> Self {
        match *kind {
            TopologyKind::Unbounded => Policy {
                test: Admission::Open,
                result: Admission::Open,
                overflow: Overflow::Retry,
                gate: Gate::None,
            },
            TopologyKind::Bounded { ks, kf } => Policy {
                test: Admission::Bounded(ks),
                result: Admission::Bounded(kf),
                overflow: Overflow::Retry,
                gate: Gate::None,
            },
            TopologyKind::Backup { ks, kf } => Policy {
                test: Admission::Bounded(ks),
                result: Admission::Bounded(kf),
                overflow: Overflow::Backup,
                gate: Gate::None,
            },
            TopologyKind::Regulated {
                ks,
                kf,
                tb,
                block_option,
            } => Policy {
                test: Admission::Bounded(ks),
                result: Admission::Bounded(kf),
                overflow: Overflow::Backup,
                gate: Gate::Dam {
                    population: Population::Fast,
                    block_for: tb,
                    enforced: block_option,
                },
            },
        }
    }

    pub fn uses_backup(&self) -> bool {
        self.overflow == Overflow::Backup
    }

    pub fn has_regulator(&self) -> bool {
        matches!(self.gate, Gate::Dam { .. })
    }

    /// Whether the dam applies to `population` at all.
    ///
    /// A dam with `enforced = false` still runs but is never consulted.
    pub fn gates(&self, population: Population) -> bool {
        match self.gate {
            Gate::Dam {
                population: gated,
                enforced: true,
                ..
            } => gated == population,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unbounded_tracks_no_occupancy() {
        let policy = Policy::for_topology(&TopologyKind::Unbounded);
        assert!(!policy.test.is_bounded());
        assert!(!policy.result.is_bounded());
        assert!(!policy.uses_backup());
        assert!(!policy.has_regulator());
    }

    #[test]
    fn disabled_dam_runs_but_gates_nobody() {
        let policy = Policy::for_topology(&TopologyKind::Regulated {
            ks: 15,
            kf: 8,
            tb: 10,
            block_option: false,
        });
        assert!(policy.has_regulator());
        assert!(policy.uses_backup());
        assert!(!policy.gates(Population::Fast));
        assert!(!policy.gates(Population::Slow));
    }

    #[test]
    fn enforced_dam_gates_only_the_fast_population() {
        let policy = Policy::for_topology(&TopologyKind::Regulated {
            ks: 15,
            kf: 8,
            tb: 10,
            block_option: true,
        });
        assert!(policy.gates(Population::Fast));
        assert!(!policy.gates(Population::Slow));
        assert_eq!(policy.test.limit(), Some(15));
    }
}
