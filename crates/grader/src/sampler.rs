//! Periodic sampling of stage occupancy.

use crate::behavior;
use crate::topology::Topology;
use crate::user::UserId;
use gradesim::{Context, KernelError, Process, Step, Wake};
use tracing::trace;

/// Records one [`Sample`](crate::metrics::Sample) per tick until the network
/// is quiescent.
#[derive(Debug, Default)]
pub struct MetricsSampler;

impl MetricsSampler {
    pub fn new() -> Self {
        Self
    }
}

impl Process<Topology> for MetricsSampler {
    fn name(&self) -> &'static str {
        "metrics-sampler"
    }

    fn resume(
        &mut self,
        ctx: &mut Context<'_, Topology>,
        _wake: Wake<UserId>,
    ) -> Result<Step<UserId>, KernelError> {
        let now = ctx.now();
        let topology = ctx.world();
        if topology.quiescent() {
            return Ok(Step::Done);
        }
        let sample = topology.sample(now);
        trace!(
            now,
            test_length = sample.test_length,
            result_length = sample.result_length,
            backup_length = sample.backup_length,
            "sampled"
        );
        topology.metrics_mut().record_sample(sample);
        Ok(Step::timeout(behavior::POLL_INTERVAL))
    }
}
