use crate::process::{ProcessId, ResourceId, StoreId};
use thiserror::Error;

/// Failures raised by the kernel itself.
///
/// These never describe modelled outcomes (a full queue, a deferred
/// submission); they indicate that a process asked for something the
/// world cannot provide, which is a bug in the model.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KernelError {
    #[error("resource {0:?} is not registered with the world")]
    UnknownResource(ResourceId),
    #[error("store {0:?} is not registered with the world")]
    UnknownStore(StoreId),
    #[error("process {0} was woken but is not runnable")]
    UnknownProcess(ProcessId),
    #[error("process {process} released resource {resource:?} without holding it")]
    NotHolder {
        process: ProcessId,
        resource: ResourceId,
    },
    #[error("process {process} cannot continue: {detail}")]
    Inconsistent {
        process: ProcessId,
        detail: &'static str,
    },
}
