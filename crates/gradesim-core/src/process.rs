//! Process model.
//!
//! A process is an explicit state machine. Each time the scheduler resumes
//! it, the process receives the outcome of the awaitable it last yielded
//! (a [`Wake`]) and answers with its next [`Step`]: either another
//! awaitable to suspend on, or termination.

use crate::error::KernelError;
use crate::scheduler::Context;
use crate::world::World;
use crate::SimTime;
use serde::{Deserialize, Serialize};

/// Index of a process inside a simulation.
pub type ProcessId = usize;

/// Handle to a capacity-bounded resource owned by the world.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceId(pub usize);

/// Handle to a bounded store owned by the world.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StoreId(pub usize);

/// Selects which item a waiting `get` accepts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Matcher<I> {
    /// First item in insertion order.
    Any,
    /// First item equal to the given one.
    Exact(I),
}

impl<I: PartialEq> Matcher<I> {
    pub fn matches(&self, item: &I) -> bool {
        match self {
            Matcher::Any => true,
            Matcher::Exact(wanted) => wanted == item,
        }
    }
}

/// The closed set of operations a process may suspend on.
#[derive(Clone, Debug, PartialEq)]
pub enum Awaitable<I> {
    /// Resume after the given number of ticks.
    Timeout(SimTime),
    /// Resume once a server slot of the resource is held.
    Acquire(ResourceId),
    /// Resume once the item has been appended to the store.
    Put(StoreId, I),
    /// Resume with the first item accepted by the matcher.
    Get(StoreId, Matcher<I>),
}

/// Outcome delivered to a process when it is resumed.
#[derive(Clone, Debug, PartialEq)]
pub enum Wake<I> {
    /// First resumption after spawning.
    Start,
    /// A timeout expired.
    Elapsed,
    /// A resource slot was granted.
    Granted,
    /// A put completed.
    Stored,
    /// A get completed with this item.
    Got(I),
}

/// What a process wants next.
#[derive(Clone, Debug, PartialEq)]
pub enum Step<I> {
    Wait(Awaitable<I>),
    Done,
}

impl<I> Step<I> {
    pub fn timeout(ticks: SimTime) -> Self {
        Step::Wait(Awaitable::Timeout(ticks))
    }

    pub fn acquire(resource: ResourceId) -> Self {
        Step::Wait(Awaitable::Acquire(resource))
    }

    pub fn put(store: StoreId, item: I) -> Self {
        Step::Wait(Awaitable::Put(store, item))
    }

    pub fn get(store: StoreId, matcher: Matcher<I>) -> Self {
        Step::Wait(Awaitable::Get(store, matcher))
    }
}

/// A resumable unit of work driven by the scheduler.
///
/// Exactly one process runs at any instant, so a process may read and
/// mutate the world freely between two suspension points.
pub trait Process<W: World> {
    /// Short label used in trace output.
    fn name(&self) -> &'static str;

    /// Advance the state machine until it suspends again or finishes.
    fn resume(
        &mut self,
        ctx: &mut Context<'_, W>,
        wake: Wake<W::Item>,
    ) -> Result<Step<W::Item>, KernelError>;
}
