//! Network configuration consumed at topology construction.

use crate::error::ConfigError;
use gradesim::SimTime;
use serde::{Deserialize, Serialize};

/// Which queuing network to build.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TopologyKind {
    /// Both stages accept everything.
    Unbounded,
    /// Stage capacities `ks` and `kf`; refusals retry.
    Bounded { ks: usize, kf: usize },
    /// As `Bounded`, but refused results go to backup storage.
    Backup { ks: usize, kf: usize },
    /// As `Backup`, plus a periodic dam on the fast population.
    Regulated {
        ks: usize,
        kf: usize,
        tb: SimTime,
        block_option: bool,
    },
}

impl TopologyKind {
    pub fn label(&self) -> &'static str {
        match self {
            TopologyKind::Unbounded => "unbounded",
            TopologyKind::Bounded { .. } => "bounded",
            TopologyKind::Backup { .. } => "backup",
            TopologyKind::Regulated { .. } => "regulated",
        }
    }
}

/// Parameters of a grading network.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Number of test servers (`K`).
    pub servers: usize,
    /// Test service duration, before the population factor.
    pub process_time: SimTime,
    /// Result delivery duration.
    pub result_time: SimTime,
    /// Failed submissions allowed per rolling window.
    pub tag_limit: usize,
    /// Exercises each user must pass.
    pub nb_exos: u32,
    pub topology: TopologyKind,
}

impl NetworkConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.servers == 0 {
            return Err(ConfigError::NoServers);
        }
        if self.tag_limit == 0 {
            return Err(ConfigError::ZeroTagLimit);
        }
        if let TopologyKind::Regulated { tb: 0, .. } = self.topology {
            return Err(ConfigError::ZeroBlockDuration);
        }
        Ok(())
    }
}
