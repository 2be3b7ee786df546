use crate::process::{ResourceId, StoreId};
use crate::resource::Resource;
use crate::store::Store;
use std::fmt::Debug;

/// Shared state a simulation operates on.
///
/// The world owns every resource and store that processes may suspend on;
/// the scheduler reaches them through these accessors when it services an
/// awaitable.
pub trait World {
    /// Item type carried by the stores processes suspend on.
    type Item: Clone + PartialEq + Debug;

    fn resource_mut(&mut self, id: ResourceId) -> Option<&mut Resource>;

    fn store_mut(&mut self, id: StoreId) -> Option<&mut Store<Self::Item>>;
}
