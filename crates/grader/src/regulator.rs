//! Periodic admission dam in front of the test stage.

use crate::policy::Gate;
use crate::topology::Topology;
use crate::user::UserId;
use gradesim::{Context, KernelError, Process, Step, Wake};
use tracing::info;

/// Alternates the dam between closed for `tb` ticks and open for `tb / 2`.
///
/// Only users of the gated population look at the dam, and only when the
/// topology enforces it; the cycle itself runs either way until the network
/// has drained.
#[derive(Debug, Default)]
pub struct Regulator {
    closed: bool,
}

impl Regulator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Process<Topology> for Regulator {
    fn name(&self) -> &'static str {
        "regulator"
    }

    fn resume(
        &mut self,
        ctx: &mut Context<'_, Topology>,
        _wake: Wake<UserId>,
    ) -> Result<Step<UserId>, KernelError> {
        let now = ctx.now();
        let topology = ctx.world();
        let Gate::Dam { block_for, .. } = topology.policy().gate else {
            return Ok(Step::Done);
        };

        if self.closed {
            self.closed = false;
            topology.set_dam_closed(false);
            info!(now, reopens_for = block_for / 2, "dam opened");
            return Ok(Step::timeout(block_for / 2));
        }

        if topology.drained() {
            topology.set_dam_closed(false);
            return Ok(Step::Done);
        }
        self.closed = true;
        topology.set_dam_closed(true);
        info!(now, closes_for = block_for, "dam closed");
        Ok(Step::timeout(block_for))
    }
}
