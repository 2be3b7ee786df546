//! grader: queuing-network model of an automated grading pipeline.
//!
//! Users submit commits to a pool of test servers; tested commits then go
//! through a single result server that delivers the verdict. Four networks
//! are modelled, from fully open to bounded stages with backup storage and a
//! periodic admission dam. All of them run on the `gradesim` kernel.

pub mod backup;
pub mod behavior;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod metrics;
pub mod policy;
pub mod population;
pub mod regulator;
pub mod sampler;
pub mod topology;
pub mod user;

pub use config::{NetworkConfig, TopologyKind};
pub use error::{ConfigError, GraderError};
pub use metrics::{MetricsRecorder, MetricsSnapshot, QueueStats, Sample, SojournTimes, Spread};
pub use policy::{Admission, Gate, Overflow, Policy};
pub use population::{generate, population_rng};
pub use topology::{GradingSetup, Topology};
pub use user::{Commit, CommitKey, Population, User, UserId};

use gradesim::{EngineConfig, SimTime, SimulationOutcome};
use tracing::info;

/// Build the network, register `users` and run it.
///
/// Without `until` the run lasts until every user has finished and the
/// network has drained.
pub fn run_network(
    network: NetworkConfig,
    users: Vec<User>,
    seed: u64,
    until: Option<SimTime>,
) -> Result<SimulationOutcome<Topology>, GraderError> {
    let config = EngineConfig {
        seed,
        until,
        system_config: GradingSetup { network, users },
    };
    let outcome = gradesim::simulate::<Topology>(config)?;
    info!(
        finished_at = outcome.summary.finished_at,
        events = outcome.summary.events,
        exhausted = outcome.summary.exhausted,
        "run complete"
    );
    Ok(outcome)
}
