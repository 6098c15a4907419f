//! Component state deltas exchanged between processes.

use tandem_core::{ComponentTypeId, Entity};

use crate::component::ComponentValue;

/// One changed component of one entity.
#[derive(Clone, Debug)]
pub struct StateEntry {
    /// Owner of the component.
    pub entity: Entity,
    /// The component's current value.
    pub value: Box<dyn ComponentValue>,
}

impl StateEntry {
    /// Type id of the carried component.
    pub fn component_type(&self) -> ComponentTypeId {
        self.value.component_type()
    }
}

/// A batch of component values to apply to another manager.
///
/// Produced by [`EntityComponentManager::state`](crate::EntityComponentManager::state)
/// on a secondary and applied with
/// [`EntityComponentManager::set_state`](crate::EntityComponentManager::set_state)
/// on the primary.
#[derive(Clone, Debug, Default)]
pub struct StateDelta {
    /// Changed components, grouped by entity in entity-table order.
    pub entries: Vec<StateEntry>,
}

impl StateDelta {
    /// Whether the delta carries nothing.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of component values carried.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Append another delta.
    pub fn extend(&mut self, other: StateDelta) {
        self.entries.extend(other.entries);
    }
}
