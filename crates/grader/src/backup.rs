//! Delivery of results parked in backup storage.
//!
//! The drain polls backup every tick. Whenever the result stage has room it
//! takes the oldest record and hands it to a short-lived [`BackupDelivery`],
//! which goes through the result stage on behalf of the user.

use crate::behavior;
use crate::topology::{Topology, RESULT_OCCUPANCY, RESULT_SERVER};
use crate::user::{BackupRecord, UserId};
use gradesim::{Context, KernelError, Matcher, Process, Step, Wake};
use tracing::debug;

/// Background loop feeding backup records into the result stage.
#[derive(Debug, Default)]
pub struct BackupDrain;

impl BackupDrain {
    pub fn new() -> Self {
        Self
    }
}

impl Process<Topology> for BackupDrain {
    fn name(&self) -> &'static str {
        "backup-drain"
    }

    fn resume(
        &mut self,
        ctx: &mut Context<'_, Topology>,
        _wake: Wake<UserId>,
    ) -> Result<Step<UserId>, KernelError> {
        let now = ctx.now();
        let topology = ctx.world();
        if topology.drained() {
            debug!(now, "backup drained");
            return Ok(Step::Done);
        }
        if topology.result_stage_full() {
            return Ok(Step::timeout(behavior::POLL_INTERVAL));
        }
        if let Some(record) = topology.take_from_backup() {
            debug!(
                commit = %record.commit.key,
                parked_for = now - record.backed_up_at,
                now,
                "backup record released"
            );
            ctx.spawn(Box::new(BackupDelivery::new(record)));
        }
        Ok(Step::timeout(behavior::POLL_INTERVAL))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum DeliveryPhase {
    Enter,
    AwaitServer,
    Delivering,
    Leave,
    Release,
}

/// Carries one backup record through the result stage.
///
/// The outcome is drawn again at delivery time; the user only advances when
/// the record still concerns the exercise they are working on.
pub struct BackupDelivery {
    record: BackupRecord,
    phase: DeliveryPhase,
}

impl BackupDelivery {
    pub fn new(record: BackupRecord) -> Self {
        Self {
            record,
            phase: DeliveryPhase::Enter,
        }
    }

    fn user(&self) -> UserId {
        self.record.commit.user()
    }

    fn finish(&mut self, ctx: &mut Context<'_, Topology>) -> Result<Step<UserId>, KernelError> {
        ctx.release(RESULT_SERVER)?;
        let now = ctx.now();
        let commit = &self.record.commit;
        let topology = ctx.world();
        topology.metrics_mut().record_result_exit(commit.key, now);

        let nb_exos = topology.network().nb_exos;
        let passed = behavior::passes(topology.rng(), commit.chance);
        let Some(user) = topology.user_mut(commit.user()) else {
            return Ok(Step::Done);
        };
        if passed && commit.exercise == user.current_exo && !user.is_finished(nb_exos) {
            user.advance();
            debug!(commit = %commit.key, exercise = commit.exercise, now, "backup delivery passed");
        } else {
            debug!(commit = %commit.key, exercise = commit.exercise, passed, now, "backup delivery discarded");
        }
        Ok(Step::Done)
    }
}

impl Process<Topology> for BackupDelivery {
    fn name(&self) -> &'static str {
        "backup-delivery"
    }

    fn resume(
        &mut self,
        ctx: &mut Context<'_, Topology>,
        _wake: Wake<UserId>,
    ) -> Result<Step<UserId>, KernelError> {
        match self.phase {
            DeliveryPhase::Enter => {
                let now = ctx.now();
                let key = self.record.commit.key;
                debug!(commit = %key, now, "backup delivery enters the result queue");
                ctx.world().metrics_mut().record_result_entry(key, now);
                self.phase = DeliveryPhase::AwaitServer;
                Ok(Step::put(RESULT_OCCUPANCY, self.user()))
            }
            DeliveryPhase::AwaitServer => {
                self.phase = DeliveryPhase::Delivering;
                Ok(Step::acquire(RESULT_SERVER))
            }
            DeliveryPhase::Delivering => {
                self.phase = DeliveryPhase::Leave;
                Ok(Step::timeout(ctx.world().network().result_time))
            }
            DeliveryPhase::Leave => {
                self.phase = DeliveryPhase::Release;
                Ok(Step::get(RESULT_OCCUPANCY, Matcher::Exact(self.user())))
            }
            DeliveryPhase::Release => self.finish(ctx),
        }
    }
}
