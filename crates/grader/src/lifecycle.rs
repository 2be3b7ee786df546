//! Per-user commit lifecycle.
//!
//! ```text
//! Idle -> Submit -> [EnterTest] -> AwaitTester -> Testing -> [LeaveTest]
//!      -> [EnterResult] -> AwaitDelivery -> Delivering -> [LeaveResult]
//!      -> decision -> Submit | Finished
//! ```
//!
//! Bracketed phases only exist for bounded stages, where the user is also
//! tracked in the stage's occupancy store. Refusals, rate limiting and the
//! dam all loop back to `Submit` after a wait.

use crate::behavior;
use crate::policy::Overflow;
use crate::topology::{Topology, RESULT_OCCUPANCY, RESULT_SERVER, TEST_OCCUPANCY, TEST_SERVERS};
use crate::user::{BackupRecord, Commit, CommitKey, UserId};
use gradesim::{Context, KernelError, Matcher, Process, ProcessId, Step, Wake};
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Idle,
    Submit,
    EnterTest,
    AwaitTester,
    Testing,
    LeaveTest,
    EnterResult,
    AwaitDelivery,
    Delivering,
    LeaveResult,
}

type Ctx<'a, 'b> = &'a mut Context<'b, Topology>;

fn no_commit(process: ProcessId) -> KernelError {
    KernelError::Inconsistent {
        process,
        detail: "no commit in flight",
    }
}

/// Drives one user through every exercise.
pub struct CommitLifecycle {
    user: UserId,
    phase: Phase,
    commit: Option<Commit>,
    /// Pass probability carried over from a failed attempt, with the
    /// exercise it was earned on.
    carried_chance: Option<(u32, f64)>,
    submissions: u64,
}

impl CommitLifecycle {
    pub fn new(user: UserId) -> Self {
        Self {
            user,
            phase: Phase::Idle,
            commit: None,
            carried_chance: None,
            submissions: 0,
        }
    }

    fn wait(&mut self, ticks: gradesim::SimTime) -> Step<UserId> {
        self.phase = Phase::Submit;
        Step::timeout(ticks)
    }

    /// Pass probability of the next attempt at `exercise`.
    ///
    /// A boost earned on another exercise is dropped: the exercise was
    /// settled elsewhere, by a backup delivery.
    fn adopt_chance(&mut self, exercise: u32, ability: f64) -> f64 {
        match self.carried_chance {
            Some((earned_on, chance)) if earned_on == exercise => chance,
            _ => {
                self.carried_chance = None;
                ability
            }
        }
    }

    fn current_commit(&self, pid: ProcessId) -> Result<&Commit, KernelError> {
        self.commit.as_ref().ok_or(no_commit(pid))
    }

    fn submit(&mut self, ctx: Ctx<'_, '_>) -> Result<Step<UserId>, KernelError> {
        let now = ctx.now();
        let topology = ctx.world();
        let nb_exos = topology.network().nb_exos;
        let Some(user) = topology.user(self.user) else {
            return Ok(Step::Done);
        };
        if user.is_finished(nb_exos) {
            return Ok(Step::Done);
        }

        if topology.dammed(user) {
            debug!(user = %user, now, "held back by the dam");
            topology.metrics_mut().record_dam_deferral();
            let backoff = behavior::dam_backoff(topology.rng());
            return Ok(self.wait(backoff));
        }

        let admitted = topology
            .user_mut(self.user)
            .map_or(false, |user| user.history.admit(now, behavior::RATE_WINDOW));
        if !admitted {
            return Ok(self.wait(behavior::RATE_LIMIT_RETRY));
        }

        let Some(user) = topology.user(self.user) else {
            return Ok(Step::Done);
        };
        let (exercise, ability) = (user.current_exo, user.ability);
        let commit = Commit {
            key: CommitKey {
                user: self.user,
                sequence: self.submissions,
            },
            submitted_at: now,
            exercise,
            chance: self.adopt_chance(exercise, ability),
        };
        let population = user.population;
        self.submissions += 1;
        topology.metrics_mut().record_submission(commit.key, population);

        if topology.test_stage_full() {
            debug!(commit = %commit.key, exercise = commit.exercise, now, "refused at test queue (full)");
            topology.metrics_mut().record_test_blocked(now);
            let backoff = behavior::refusal_backoff(topology.rng());
            return Ok(self.wait(backoff));
        }

        debug!(commit = %commit.key, exercise = commit.exercise, now, "enters the test queue");
        topology.metrics_mut().record_test_entry(commit.key, now);
        let bounded = topology.policy().test.is_bounded();
        self.commit = Some(commit);

        if bounded {
            self.phase = Phase::EnterTest;
            Ok(Step::put(TEST_OCCUPANCY, self.user))
        } else {
            self.phase = Phase::AwaitTester;
            Ok(Step::acquire(TEST_SERVERS))
        }
    }

    fn start_testing(&mut self, ctx: Ctx<'_, '_>) -> Result<Step<UserId>, KernelError> {
        let (now, pid) = (ctx.now(), ctx.pid());
        let topology = ctx.world();
        let factor = topology
            .user(self.user)
            .map_or(1, |user| user.population.service_factor());
        let duration = topology.network().process_time * factor;
        let key = self.current_commit(pid)?.key;
        debug!(commit = %key, now, duration, "starts testing");
        self.phase = Phase::Testing;
        Ok(Step::timeout(duration))
    }

    fn finish_testing(&mut self, ctx: Ctx<'_, '_>) -> Result<Step<UserId>, KernelError> {
        if ctx.world().policy().test.is_bounded() {
            self.phase = Phase::LeaveTest;
            return Ok(Step::get(TEST_OCCUPANCY, Matcher::Exact(self.user)));
        }
        self.leave_test(ctx)
    }

    fn leave_test(&mut self, ctx: Ctx<'_, '_>) -> Result<Step<UserId>, KernelError> {
        ctx.release(TEST_SERVERS)?;
        let (now, pid) = (ctx.now(), ctx.pid());
        let commit = self.current_commit(pid)?.clone();
        let topology = ctx.world();
        debug!(commit = %commit.key, now, "finishes testing");
        topology.metrics_mut().record_test_exit(commit.key, now);

        if topology.result_stage_full() {
            topology.metrics_mut().record_result_blocked(now);
            if topology.policy().overflow == Overflow::Backup {
                debug!(commit = %commit.key, now, "refused at result queue (full), result backed up");
                topology.park_in_backup(
                    pid,
                    BackupRecord {
                        commit,
                        backed_up_at: now,
                    },
                )?;
            } else {
                debug!(commit = %commit.key, now, "refused at result queue (full)");
            }
            self.commit = None;
            let backoff = behavior::refusal_backoff(topology.rng());
            return Ok(self.wait(backoff));
        }

        debug!(commit = %commit.key, now, "enters the result queue");
        topology.metrics_mut().record_result_entry(commit.key, now);
        if topology.policy().result.is_bounded() {
            self.phase = Phase::EnterResult;
            Ok(Step::put(RESULT_OCCUPANCY, self.user))
        } else {
            self.phase = Phase::AwaitDelivery;
            Ok(Step::acquire(RESULT_SERVER))
        }
    }

    fn start_delivery(&mut self, ctx: Ctx<'_, '_>) -> Result<Step<UserId>, KernelError> {
        let now = ctx.now();
        let duration = ctx.world().network().result_time;
        let key = self.current_commit(ctx.pid())?.key;
        debug!(commit = %key, now, "starts result processing");
        self.phase = Phase::Delivering;
        Ok(Step::timeout(duration))
    }

    fn finish_delivery(&mut self, ctx: Ctx<'_, '_>) -> Result<Step<UserId>, KernelError> {
        if ctx.world().policy().result.is_bounded() {
            self.phase = Phase::LeaveResult;
            return Ok(Step::get(RESULT_OCCUPANCY, Matcher::Exact(self.user)));
        }
        self.leave_result(ctx)
    }

    fn leave_result(&mut self, ctx: Ctx<'_, '_>) -> Result<Step<UserId>, KernelError> {
        ctx.release(RESULT_SERVER)?;
        let now = ctx.now();
        let commit = self.commit.take().ok_or(no_commit(ctx.pid()))?;
        let topology = ctx.world();
        debug!(commit = %commit.key, now, "finishes result processing");
        topology.metrics_mut().record_result_exit(commit.key, now);

        let nb_exos = topology.network().nb_exos;
        let stale = topology
            .user(self.user)
            .map_or(true, |user| user.current_exo != commit.exercise);
        if stale {
            // A backup delivery already settled this exercise.
            debug!(commit = %commit.key, exercise = commit.exercise, "result superseded");
            self.carried_chance = None;
            if topology.user(self.user).map_or(true, |user| user.is_finished(nb_exos)) {
                return Ok(Step::Done);
            }
            let think = behavior::think_time(topology.rng());
            return Ok(self.wait(think));
        }

        if behavior::passes(topology.rng(), commit.chance) {
            debug!(commit = %commit.key, exercise = commit.exercise, "commit passed");
            self.carried_chance = None;
            let finished = match topology.user_mut(self.user) {
                Some(user) => {
                    user.advance();
                    user.is_finished(nb_exos)
                }
                None => true,
            };
            if finished {
                return Ok(Step::Done);
            }
            let think = behavior::think_time(topology.rng());
            Ok(self.wait(think))
        } else {
            let boost = behavior::learning_boost(topology.rng());
            let chance = (commit.chance + boost).min(1.0);
            debug!(
                commit = %commit.key,
                exercise = commit.exercise,
                next_chance = chance,
                "commit failed"
            );
            self.carried_chance = Some((commit.exercise, chance));
            if let Some(user) = topology.user_mut(self.user) {
                user.history.record(commit.submitted_at);
            }
            let rework = behavior::rework_time(topology.rng());
            Ok(self.wait(rework))
        }
    }
}

impl Process<Topology> for CommitLifecycle {
    fn name(&self) -> &'static str {
        "commit-lifecycle"
    }

    fn resume(
        &mut self,
        ctx: &mut Context<'_, Topology>,
        _wake: Wake<UserId>,
    ) -> Result<Step<UserId>, KernelError> {
        match self.phase {
            Phase::Idle => {
                let think = behavior::think_time(ctx.world().rng());
                Ok(self.wait(think))
            }
            Phase::Submit => self.submit(ctx),
            Phase::EnterTest => {
                self.phase = Phase::AwaitTester;
                Ok(Step::acquire(TEST_SERVERS))
            }
            Phase::AwaitTester => self.start_testing(ctx),
            Phase::Testing => self.finish_testing(ctx),
            Phase::LeaveTest => self.leave_test(ctx),
            Phase::EnterResult => {
                self.phase = Phase::AwaitDelivery;
                Ok(Step::acquire(RESULT_SERVER))
            }
            Phase::AwaitDelivery => self.start_delivery(ctx),
            Phase::Delivering => self.finish_delivery(ctx),
            Phase::LeaveResult => self.leave_result(ctx),
        }
    }
}
