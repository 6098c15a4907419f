//! Type-erased per-type component storage.
//!
//! Each component type owns one dense storage. The manager keeps them in
//! a map keyed by [`ComponentTypeId`] and talks to them only through the
//! [`ComponentStorage`] capability trait; typed access goes through a
//! downcast to the crate-private `TypedStorage<T>`.
//!
//! # Layout
//!
//! ```text
//! values: [ v0 | v1 | v2 | v3 ]     dense, no holes
//! ids:    [ c4 | c1 | c7 | c2 ]     slot -> id back-reference
//! slots:  { c1:1, c2:3, c4:0, c7:2 }  id -> slot
//! ```
//!
//! Removal moves the back element into the freed slot, rewrites exactly
//! one `slots` entry, and pops. Keys never encode slots, so only code
//! inside this module ever sees slot indices.

use std::any::Any;
use std::collections::{HashMap, HashSet};

use tandem_core::{ComponentId, ComponentTypeId};

use crate::component::{downcast_value, Component, ComponentValue};

/// Capability interface every component storage exposes to the manager.
pub trait ComponentStorage: Send + Sync {
    /// Type id of the stored components.
    fn component_type(&self) -> ComponentTypeId;

    /// Rust type name of the stored components, for collision reports.
    fn type_name(&self) -> &'static str;

    /// Whether `value` has exactly this storage's Rust type.
    fn accepts(&self, value: &dyn ComponentValue) -> bool;

    /// Store a new value and return its fresh id.
    ///
    /// Hands `value` back unchanged if its type does not match.
    fn create(&mut self, value: Box<dyn ComponentValue>)
        -> Result<ComponentId, Box<dyn ComponentValue>>;

    /// Overwrite the value behind `id`.
    ///
    /// `Ok(false)` if `id` is not live; `Err` hands back a mismatched value.
    fn replace(
        &mut self,
        id: ComponentId,
        value: Box<dyn ComponentValue>,
    ) -> Result<bool, Box<dyn ComponentValue>>;

    /// Remove the component with `id`. Returns `false` if it was not live.
    fn remove(&mut self, id: ComponentId) -> bool;

    /// Drop every stored component.
    fn remove_all(&mut self);

    /// Whether `id` is live.
    fn contains(&self, id: ComponentId) -> bool;

    /// Number of live components.
    fn len(&self) -> usize;

    /// Whether the storage holds no components.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clone the value behind `id` into a box.
    fn clone_value(&self, id: ComponentId) -> Option<Box<dyn ComponentValue>>;

    /// Flag `id` as modified since the last [`clear_changed`](Self::clear_changed).
    fn mark_changed(&mut self, id: ComponentId);

    /// Whether `id` was modified since the last [`clear_changed`](Self::clear_changed).
    fn is_changed(&self, id: ComponentId) -> bool;

    /// Forget all modification flags.
    fn clear_changed(&mut self);

    /// Borrow as [`Any`] for typed downcasting.
    fn as_any(&self) -> &dyn Any;

    /// Mutably borrow as [`Any`] for typed downcasting.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Dense storage for one component type.
pub(crate) struct TypedStorage<T> {
    next_id: u64,
    values: Vec<T>,
    ids: Vec<ComponentId>,
    slots: HashMap<ComponentId, usize>,
    changed: HashSet<ComponentId>,
}

impl<T: Component> TypedStorage<T> {
    pub(crate) fn new() -> Self {
        Self {
            next_id: 0,
            values: Vec::new(),
            ids: Vec::new(),
            slots: HashMap::new(),
            changed: HashSet::new(),
        }
    }

    pub(crate) fn insert(&mut self, value: T) -> ComponentId {
        let id = ComponentId(self.next_id);
        self.next_id += 1;
        self.slots.insert(id, self.values.len());
        self.values.push(value);
        self.ids.push(id);
        id
    }

    pub(crate) fn get(&self, id: ComponentId) -> Option<&T> {
        self.slots.get(&id).map(|&slot| &self.values[slot])
    }

    pub(crate) fn get_mut(&mut self, id: ComponentId) -> Option<&mut T> {
        let slot = *self.slots.get(&id)?;
        Some(&mut self.values[slot])
    }

    /// Swap-to-back removal.
    pub(crate) fn remove_id(&mut self, id: ComponentId) -> bool {
        let Some(slot) = self.slots.remove(&id) else {
            return false;
        };
        self.values.swap_remove(slot);
        self.ids.swap_remove(slot);
        if slot < self.ids.len() {
            // The former back element now lives in `slot`.
            self.slots.insert(self.ids[slot], slot);
        }
        self.changed.remove(&id);
        true
    }

    /// Density invariant: one slot per live id, and each id's slot points back at it.
    #[cfg(test)]
    pub(crate) fn is_dense(&self) -> bool {
        self.values.len() == self.ids.len()
            && self.ids.len() == self.slots.len()
            && self
                .slots
                .iter()
                .all(|(id, &slot)| self.ids.get(slot) == Some(id))
    }
}

impl<T: Component> ComponentStorage for TypedStorage<T> {
    fn component_type(&self) -> ComponentTypeId {
        T::TYPE_ID
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn accepts(&self, value: &dyn ComponentValue) -> bool {
        value.as_any().is::<T>()
    }

    fn create(
        &mut self,
        value: Box<dyn ComponentValue>,
    ) -> Result<ComponentId, Box<dyn ComponentValue>> {
        downcast_value::<T>(value).map(|typed| self.insert(typed))
    }

    fn replace(
        &mut self,
        id: ComponentId,
        value: Box<dyn ComponentValue>,
    ) -> Result<bool, Box<dyn ComponentValue>> {
        let typed = downcast_value::<T>(value)?;
        match self.get_mut(id) {
            Some(slot) => {
                *slot = typed;
                self.changed.insert(id);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn remove(&mut self, id: ComponentId) -> bool {
        self.remove_id(id)
    }

    fn remove_all(&mut self) {
        self.values.clear();
        self.ids.clear();
        self.slots.clear();
        self.changed.clear();
    }

    fn contains(&self, id: ComponentId) -> bool {
        self.slots.contains_key(&id)
    }

    fn len(&self) -> usize {
        self.values.len()
    }

    fn clone_value(&self, id: ComponentId) -> Option<Box<dyn ComponentValue>> {
        self.get(id)
            .map(|value| Box::new(value.clone()) as Box<dyn ComponentValue>)
    }

    fn mark_changed(&mut self, id: ComponentId) {
        if self.slots.contains_key(&id) {
            self.changed.insert(id);
        }
    }

    fn is_changed(&self, id: ComponentId) -> bool {
        self.changed.contains(&id)
    }

    fn clear_changed(&mut self) {
        self.changed.clear();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
