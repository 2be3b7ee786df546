//! gradesim-core: deterministic discrete-event simulation kernel.
//!
//! This crate provides the scheduler, the process model and the two shared
//! primitives processes contend for: capacity-bounded resources and bounded
//! FIFO stores. Models plug in by implementing [`World`] for their shared
//! state and [`Process`] for each kind of actor, then [`SimulationSystem`]
//! to be driven by [`simulate`].

mod error;
mod event;
mod process;
mod resource;
mod scheduler;
mod store;
mod world;

use serde::{Deserialize, Serialize};

pub use error::KernelError;
pub use event::{Agenda, EventKey, Resumption};
pub use process::{Awaitable, Matcher, Process, ProcessId, ResourceId, Step, StoreId, Wake};
pub use resource::Resource;
pub use scheduler::{Context, RunSummary, Simulation};
pub use store::Store;
pub use world::World;

/// Simulated time, in integer ticks.
pub type SimTime = u64;

/// Configuration for an engine run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig<C> {
    /// Seed for the run's random generator.
    pub seed: u64,
    /// Optional time limit; `None` runs until nothing is runnable.
    pub until: Option<SimTime>,
    /// Model-provided system configuration.
    pub system_config: C,
}

/// Outcome of a completed run.
pub struct SimulationOutcome<S>
where
    S: SimulationSystem,
{
    pub config: EngineConfig<S::Config>,
    pub summary: RunSummary,
    pub system: S,
}

impl<S: SimulationSystem> SimulationOutcome<S> {
    /// Read-only observation of the finished system.
    pub fn observe(&self) -> S::Snapshot {
        self.system.observe()
    }
}

/// Trait implemented by models that can be driven by [`simulate`].
pub trait SimulationSystem: World + Sized + 'static {
    type Config: Clone;
    type Error: From<KernelError>;
    type Snapshot;

    /// Build the world, rejecting invalid configurations.
    fn init(config: Self::Config, seed: u64) -> Result<Self, Self::Error>;

    /// Spawn the model's initial processes.
    fn launch(simulation: &mut Simulation<Self>);

    /// Capture a deterministic observation of the current state.
    fn observe(&self) -> Self::Snapshot;
}

/// Run a model from construction to completion.
///
/// Mirrors the run lifecycle: init -> launch -> run -> hand back the world.
pub fn simulate<S>(config: EngineConfig<S::Config>) -> Result<SimulationOutcome<S>, S::Error>
where
    S: SimulationSystem,
{
    let system = S::init(config.system_config.clone(), config.seed)?;
    let mut simulation = Simulation::new(system);
    S::launch(&mut simulation);
    let summary = simulation.run(config.until)?;

    Ok(SimulationOutcome {
        config,
        summary,
        system: simulation.into_world(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_config_round_trips_through_json() {
        let config = EngineConfig {
            seed: 42,
            until: Some(500),
            system_config: "network".to_string(),
        };

        let encoded = serde_json::to_string(&config).unwrap();
        let decoded: EngineConfig<String> = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, config);
    }
}
