use gradesim::KernelError;
use thiserror::Error;

/// Configuration rejected at construction; the run never starts.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("the test stage needs at least one server")]
    NoServers,
    #[error("tag_limit must allow at least one submission per window")]
    ZeroTagLimit,
    #[error("block duration tb must be positive")]
    ZeroBlockDuration,
    #[error("fast population ratio must lie in [0, 1], got {0}")]
    InvalidRatio(f64),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum GraderError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("simulation kernel failure: {0}")]
    Kernel(#[from] KernelError),
}
