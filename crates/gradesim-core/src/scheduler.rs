//! Clock and event scheduler.
//!
//! The scheduler pops the earliest pending resumption (ties broken by
//! scheduling order), moves the clock to its time and resumes the owning
//! process. Whatever the process yields next is serviced against the
//! world's resources and stores before the following event is popped.

use crate::error::KernelError;
use crate::event::{Agenda, Resumption};
use crate::process::{Awaitable, Process, ProcessId, ResourceId, Step, Wake};
use crate::world::World;
use crate::SimTime;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// Summary of a completed run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Clock value when the run stopped.
    pub finished_at: SimTime,
    /// Number of events fired.
    pub events: u64,
    /// Processes still suspended when the run stopped.
    pub live_processes: usize,
    /// `true` when the run ended because nothing was left to do.
    pub exhausted: bool,
}

/// View handed to a process while it runs.
pub struct Context<'a, W: World> {
    pid: ProcessId,
    world: &'a mut W,
    agenda: &'a mut Agenda<W::Item>,
    spawned: &'a mut Vec<Box<dyn Process<W>>>,
}

impl<'a, W: World> Context<'a, W> {
    pub fn pid(&self) -> ProcessId {
        self.pid
    }

    pub fn now(&self) -> SimTime {
        self.agenda.now()
    }

    pub fn world(&mut self) -> &mut W {
        self.world
    }

    /// Give back the slot this process holds on `resource`.
    ///
    /// Never suspends; the next waiter, if any, is resumed at the current
    /// time.
    pub fn release(&mut self, resource: ResourceId) -> Result<(), KernelError> {
        let promoted = self
            .world
            .resource_mut(resource)
            .ok_or(KernelError::UnknownResource(resource))?
            .release(self.pid)?;
        if let Some(next) = promoted {
            self.agenda.schedule(0, next, Wake::Granted);
        }
        Ok(())
    }

    /// Start another process at the current time.
    pub fn spawn(&mut self, process: Box<dyn Process<W>>) {
        self.spawned.push(process);
    }
}

/// A single-threaded discrete-event simulation over a world `W`.
pub struct Simulation<W: World> {
    world: W,
    agenda: Agenda<W::Item>,
    processes: Vec<Option<Box<dyn Process<W>>>>,
    events: u64,
}

impl<W: World> Simulation<W> {
    pub fn new(world: W) -> Self {
        Self {
            world,
            agenda: Agenda::new(),
            processes: Vec::new(),
            events: 0,
        }
    }

    pub fn now(&self) -> SimTime {
        self.agenda.now()
    }

    pub fn world(&self) -> &W {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut W {
        &mut self.world
    }

    pub fn into_world(self) -> W {
        self.world
    }

    /// Number of processes that have not terminated.
    pub fn live_processes(&self) -> usize {
        self.processes.iter().filter(|slot| slot.is_some()).count()
    }

    /// Register a process; it first runs at the current time.
    pub fn spawn(&mut self, process: Box<dyn Process<W>>) -> ProcessId {
        let pid = self.processes.len();
        trace!(pid, name = process.name(), now = self.now(), "spawn");
        self.processes.push(Some(process));
        self.agenda.schedule(0, pid, Wake::Start);
        pid
    }

    /// Fire the next event. Returns `false` when nothing is pending.
    pub fn step(&mut self) -> Result<bool, KernelError> {
        let Some((key, Resumption { pid, wake })) = self.agenda.advance() else {
            return Ok(false);
        };
        self.events += 1;

        let mut process = self
            .processes
            .get_mut(pid)
            .and_then(Option::take)
            .ok_or(KernelError::UnknownProcess(pid))?;
        trace!(
            time = key.time,
            sequence = key.sequence,
            pid,
            name = process.name(),
            "resume"
        );

        let mut spawned = Vec::new();
        let step = {
            let mut ctx = Context {
                pid,
                world: &mut self.world,
                agenda: &mut self.agenda,
                spawned: &mut spawned,
            };
            process.resume(&mut ctx, wake)?
        };

        match step {
            Step::Done => {
                debug!(pid, name = process.name(), now = self.now(), "process finished");
            }
            Step::Wait(awaitable) => {
                self.processes[pid] = Some(process);
                self.suspend(pid, awaitable)?;
            }
        }

        for child in spawned {
            self.spawn(child);
        }
        Ok(true)
    }

    /// Run until the agenda is empty or the clock reaches `until`.
    ///
    /// Events due at or after `until` are left pending and the clock is set
    /// to `until`.
    pub fn run(&mut self, until: Option<SimTime>) -> Result<RunSummary, KernelError> {
        let exhausted = loop {
            match (self.agenda.next_time(), until) {
                (None, _) => break true,
                (Some(next), Some(limit)) if next >= limit => {
                    self.agenda.fast_forward(limit);
                    break false;
                }
                _ => {
                    self.step()?;
                }
            }
        };

        let summary = RunSummary {
            finished_at: self.now(),
            events: self.events,
            live_processes: self.live_processes(),
            exhausted,
        };
        debug!(?summary, "run stopped");
        Ok(summary)
    }

    fn suspend(&mut self, pid: ProcessId, awaitable: Awaitable<W::Item>) -> Result<(), KernelError> {
        match awaitable {
            Awaitable::Timeout(ticks) => {
                self.agenda.schedule(ticks, pid, Wake::Elapsed);
            }
            Awaitable::Acquire(id) => {
                let resource = self
                    .world
                    .resource_mut(id)
                    .ok_or(KernelError::UnknownResource(id))?;
                if resource.request(pid) {
                    self.agenda.schedule(0, pid, Wake::Granted);
                }
            }
            Awaitable::Put(id, item) => {
                let store = self
                    .world
                    .store_mut(id)
                    .ok_or(KernelError::UnknownStore(id))?;
                store.offer(pid, item);
                let ready = store.settle();
                self.agenda.wake_all(ready);
            }
            Awaitable::Get(id, matcher) => {
                let store = self
                    .world
                    .store_mut(id)
                    .ok_or(KernelError::UnknownStore(id))?;
                store.demand(pid, matcher);
                let ready = store.settle();
                self.agenda.wake_all(ready);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{Matcher, StoreId};
    use crate::resource::Resource;
    use crate::store::Store;

    #[derive(Default)]
    struct Bench {
        servers: Option<Resource>,
        buffer: Option<Store<u32>>,
        log: Vec<(SimTime, &'static str)>,
    }

    impl World for Bench {
        type Item = u32;

        fn resource_mut(&mut self, id: ResourceId) -> Option<&mut Resource> {
            self.servers.as_mut().filter(|resource| resource.id() == id)
        }

        fn store_mut(&mut self, id: StoreId) -> Option<&mut Store<u32>> {
            self.buffer.as_mut().filter(|store| store.id() == id)
        }
    }

    /// Sleeps, then logs its label.
    struct Sleeper {
        label: &'static str,
        ticks: SimTime,
    }

    impl Process<Bench> for Sleeper {
        fn name(&self) -> &'static str {
            self.label
        }

        fn resume(
            &mut self,
            ctx: &mut Context<'_, Bench>,
            wake: Wake<u32>,
        ) -> Result<Step<u32>, KernelError> {
            match wake {
                Wake::Start => Ok(Step::timeout(self.ticks)),
                _ => {
                    let now = ctx.now();
                    ctx.world().log.push((now, self.label));
                    Ok(Step::Done)
                }
            }
        }
    }

    /// Holds one server for `hold` ticks.
    struct Customer {
        label: &'static str,
        hold: SimTime,
        serving: bool,
    }

    impl Process<Bench> for Customer {
        fn name(&self) -> &'static str {
            self.label
        }

        fn resume(
            &mut self,
            ctx: &mut Context<'_, Bench>,
            wake: Wake<u32>,
        ) -> Result<Step<u32>, KernelError> {
            match (wake, self.serving) {
                (Wake::Start, _) => Ok(Step::acquire(ResourceId(0))),
                (Wake::Granted, _) => {
                    self.serving = true;
                    let now = ctx.now();
                    ctx.world().log.push((now, self.label));
                    Ok(Step::timeout(self.hold))
                }
                (_, true) => {
                    ctx.release(ResourceId(0))?;
                    Ok(Step::Done)
                }
                (_, false) => Ok(Step::Done),
            }
        }
    }

    /// Puts its value, then finishes.
    struct Producer(u32);

    impl Process<Bench> for Producer {
        fn name(&self) -> &'static str {
            "producer"
        }

        fn resume(
            &mut self,
            ctx: &mut Context<'_, Bench>,
            wake: Wake<u32>,
        ) -> Result<Step<u32>, KernelError> {
            match wake {
                Wake::Start => Ok(Step::put(StoreId(0), self.0)),
                _ => {
                    let now = ctx.now();
                    ctx.world().log.push((now, "stored"));
                    Ok(Step::Done)
                }
            }
        }
    }

    /// Waits for a specific value.
    struct Consumer(u32);

    impl Process<Bench> for Consumer {
        fn name(&self) -> &'static str {
            "consumer"
        }

        fn resume(
            &mut self,
            ctx: &mut Context<'_, Bench>,
            wake: Wake<u32>,
        ) -> Result<Step<u32>, KernelError> {
            match wake {
                Wake::Start => Ok(Step::get(StoreId(0), Matcher::Exact(self.0))),
                Wake::Got(item) => {
                    assert_eq!(item, self.0);
                    let now = ctx.now();
                    ctx.world().log.push((now, "got"));
                    Ok(Step::Done)
                }
                _ => Ok(Step::Done),
            }
        }
    }

    /// Spawns a sleeper and exits.
    struct Parent;

    impl Process<Bench> for Parent {
        fn name(&self) -> &'static str {
            "parent"
        }

        fn resume(
            &mut self,
            ctx: &mut Context<'_, Bench>,
            _wake: Wake<u32>,
        ) -> Result<Step<u32>, KernelError> {
            ctx.spawn(Box::new(Sleeper {
                label: "child",
                ticks: 2,
            }));
            Ok(Step::Done)
        }
    }

    #[test]
    fn simultaneous_events_fire_in_scheduling_order() {
        let mut sim = Simulation::new(Bench::default());
        for label in ["a", "b", "c"] {
            sim.spawn(Box::new(Sleeper { label, ticks: 4 }));
        }

        let summary = sim.run(None).unwrap();

        assert!(summary.exhausted);
        assert_eq!(summary.finished_at, 4);
        assert_eq!(summary.live_processes, 0);
        assert_eq!(sim.world().log, vec![(4, "a"), (4, "b"), (4, "c")]);
    }

    #[test]
    fn resource_grants_follow_request_order() {
        let mut sim = Simulation::new(Bench {
            servers: Some(Resource::new(ResourceId(0), 1)),
            ..Bench::default()
        });
        for label in ["first", "second", "third"] {
            sim.spawn(Box::new(Customer {
                label,
                hold: 3,
                serving: false,
            }));
        }

        sim.run(None).unwrap();

        assert_eq!(
            sim.world().log,
            vec![(0, "first"), (3, "second"), (6, "third")]
        );
    }

    #[test]
    fn time_limit_stops_before_due_events() {
        let mut sim = Simulation::new(Bench::default());
        sim.spawn(Box::new(Sleeper {
            label: "late",
            ticks: 10,
        }));

        let summary = sim.run(Some(10)).unwrap();

        assert!(!summary.exhausted);
        assert_eq!(summary.finished_at, 10);
        assert_eq!(summary.live_processes, 1);
        assert!(sim.world().log.is_empty());
    }

    #[test]
    fn get_suspends_until_matching_put() {
        let mut sim = Simulation::new(Bench {
            buffer: Some(Store::bounded(StoreId(0), 1)),
            ..Bench::default()
        });
        sim.spawn(Box::new(Consumer(5)));
        sim.spawn(Box::new(Producer(5)));

        sim.run(None).unwrap();

        assert_eq!(sim.world().log, vec![(0, "stored"), (0, "got")]);
        assert_eq!(sim.world().buffer.as_ref().map(Store::len), Some(0));
    }

    #[test]
    fn spawned_children_start_at_current_time() {
        let mut sim = Simulation::new(Bench::default());
        sim.spawn(Box::new(Parent));

        sim.run(None).unwrap();

        assert_eq!(sim.world().log, vec![(2, "child")]);
    }

    #[test]
    fn unknown_resource_aborts_the_run() {
        let mut sim = Simulation::new(Bench::default());
        sim.spawn(Box::new(Customer {
            label: "lost",
            hold: 1,
            serving: false,
        }));

        assert_eq!(
            sim.run(None),
            Err(KernelError::UnknownResource(ResourceId(0)))
        );
    }
}
