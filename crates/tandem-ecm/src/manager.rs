//! The [`EntityComponentManager`].
//!
//! Owns entity ids, binds components to entities, and answers typed
//! queries. Every write, structural or value-only, needs `&mut self`;
//! reads work on `&self` under the per-type storage lock, so a shared
//! borrow is a read-only view of the world.
//!
//! Entity erasure is two-phase. [`request_remove_entity`] only marks;
//! the runner calls [`process_remove_entity_requests`] at the step
//! boundary, so nothing observes a half-erased entity mid-step.
//!
//! [`request_remove_entity`]: EntityComponentManager::request_remove_entity
//! [`process_remove_entity_requests`]: EntityComponentManager::process_remove_entity_requests

use std::collections::HashMap;
use std::fmt;

use indexmap::{IndexMap, IndexSet};
use parking_lot::{MappedRwLockReadGuard, Mutex, RwLock, RwLockReadGuard};

use tandem_core::{ComponentId, ComponentKey, ComponentTypeId, Entity};

use crate::component::{Component, ComponentValue};
use crate::components::{EntityKind, Name, ParentEntity};
use crate::error::EcmError;
use crate::query::{Column, ComponentMap, ComponentQuery, EntityQuery, ViewRegistry};
use crate::state::{StateDelta, StateEntry};
use crate::storage::{ComponentStorage, TypedStorage};

/// Read-locked reference to one component value.
pub type ComponentRef<'a, T> = MappedRwLockReadGuard<'a, T>;

type StorageCell = RwLock<Box<dyn ComponentStorage>>;

/// Entity and component store for one world.
pub struct EntityComponentManager {
    next_entity: u64,
    entities: IndexMap<Entity, ComponentMap>,
    stores: IndexMap<ComponentTypeId, StorageCell>,
    pending_removal: IndexSet<Entity>,
    views: Mutex<ViewRegistry>,
    structure_changed: bool,
}

impl EntityComponentManager {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self {
            next_entity: 0,
            entities: IndexMap::new(),
            stores: IndexMap::new(),
            pending_removal: IndexSet::new(),
            views: Mutex::new(ViewRegistry::default()),
            structure_changed: false,
        }
    }

    // ── Entities ───────────────────────────────────────────────────

    /// Allocate a new entity with no components.
    pub fn create_entity(&mut self) -> Result<Entity, EcmError> {
        if self.next_entity == Entity::NULL.0 {
            tracing::error!("entity id space exhausted");
            return Err(EcmError::IdSpaceExhausted);
        }
        let entity = Entity(self.next_entity);
        self.next_entity += 1;
        self.entities.insert(entity, ComponentMap::new());
        self.structure_changed = true;
        Ok(entity)
    }

    /// Insert an entity with a caller-chosen id, as received from a peer.
    ///
    /// Returns `false` if it already exists or is [`Entity::NULL`].
    pub fn insert_entity(&mut self, entity: Entity) -> bool {
        if entity.is_null() || self.entities.contains_key(&entity) {
            return false;
        }
        self.entities.insert(entity, ComponentMap::new());
        self.next_entity = self.next_entity.max(entity.0 + 1);
        self.structure_changed = true;
        true
    }

    /// Whether `entity` exists.
    pub fn has_entity(&self, entity: Entity) -> bool {
        self.entities.contains_key(&entity)
    }

    /// Number of live entities, including ones marked for removal.
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// All live entities in creation order.
    pub fn entities(&self) -> impl Iterator<Item = Entity> + '_ {
        self.entities.keys().copied()
    }

    /// Mark `entity` (and with `recursive`, all its descendants) for removal.
    ///
    /// Returns `false` if the entity does not exist.
    pub fn request_remove_entity(&mut self, entity: Entity, recursive: bool) -> bool {
        if !self.entities.contains_key(&entity) {
            return false;
        }
        if recursive {
            let doomed = self.descendants(entity);
            self.pending_removal.extend(doomed);
        } else {
            self.pending_removal.insert(entity);
        }
        true
    }

    /// Mark every entity for removal.
    pub fn request_remove_entities(&mut self) {
        let all: Vec<Entity> = self.entities.keys().copied().collect();
        self.pending_removal.extend(all);
    }

    /// Whether `entity` is marked and waiting for the next compaction.
    pub fn is_marked_for_removal(&self, entity: Entity) -> bool {
        self.pending_removal.contains(&entity)
    }

    /// Whether any entity is waiting for the next compaction.
    pub fn has_entities_marked_for_removal(&self) -> bool {
        !self.pending_removal.is_empty()
    }

    /// Erase every marked entity and destroy its components.
    ///
    /// Returns how many entities were erased.
    pub fn process_remove_entity_requests(&mut self) -> usize {
        let pending = std::mem::take(&mut self.pending_removal);
        let mut removed = 0;
        for entity in pending {
            let Some(components) = self.entities.shift_remove(&entity) else {
                continue;
            };
            for (type_id, id) in components {
                if let Some(cell) = self.stores.get_mut(&type_id) {
                    cell.get_mut().remove(id);
                }
            }
            self.views.get_mut().forget(entity);
            removed += 1;
        }
        if removed > 0 {
            self.structure_changed = true;
            tracing::debug!(removed, "erased entities");
        }
        removed
    }

    // ── Components ─────────────────────────────────────────────────

    /// Attach `data` to `entity`, registering storage for `T` on first use.
    ///
    /// If the entity already has a `T`, its value is replaced in place and
    /// the existing key is returned.
    pub fn create_component<T: Component>(
        &mut self,
        entity: Entity,
        data: T,
    ) -> Result<ComponentKey, EcmError> {
        let existing = match self.entities.get(&entity) {
            Some(components) => components.get(&T::TYPE_ID).copied(),
            None => return Err(EcmError::UnknownEntity(entity)),
        };
        let storage = self.ensure_storage::<T>().map_err(report)?;
        let id = match existing {
            Some(id) if storage.contains(id) => {
                if let Some(slot) = storage.get_mut(id) {
                    *slot = data;
                }
                id
            }
            _ => storage.insert(data),
        };
        storage.mark_changed(id);
        self.bind(entity, T::TYPE_ID, id, existing.is_none());
        Ok(ComponentKey::new(T::TYPE_ID, id))
    }

    /// Attach a value whose type is only known at runtime.
    ///
    /// Fails with [`EcmError::TypeMismatch`] (logged, store unchanged) if
    /// the value is not of component type `type_id`, or is a different
    /// Rust type than the one registered under that id.
    pub fn create_component_erased(
        &mut self,
        entity: Entity,
        type_id: ComponentTypeId,
        value: Box<dyn ComponentValue>,
    ) -> Result<ComponentKey, EcmError> {
        let existing = match self.entities.get(&entity) {
            Some(components) => components.get(&type_id).copied(),
            None => return Err(EcmError::UnknownEntity(entity)),
        };
        let mismatch = EcmError::TypeMismatch {
            entity,
            expected: type_id,
            found: value.component_name(),
        };
        if value.component_type() != type_id {
            return Err(report(mismatch));
        }
        let storage = self
            .stores
            .entry(type_id)
            .or_insert_with(|| RwLock::new(value.new_storage()))
            .get_mut();
        let result = match existing {
            Some(id) if storage.contains(id) => storage.replace(id, value).map(|_| id),
            _ => storage.create(value),
        };
        let Ok(id) = result else {
            return Err(report(mismatch));
        };
        storage.mark_changed(id);
        self.bind(entity, type_id, id, existing.is_none());
        Ok(ComponentKey::new(type_id, id))
    }

    /// Read-lock and borrow the `T` attached to `entity`.
    ///
    /// The storage for `T` stays read-locked while the reference lives.
    pub fn component<T: Component>(&self, entity: Entity) -> Option<ComponentRef<'_, T>> {
        let id = *self.entities.get(&entity)?.get(&T::TYPE_ID)?;
        self.component_by_id::<T>(id)
    }

    /// Borrow the component behind `key`, if it is a live `T`.
    pub fn component_by_key<T: Component>(&self, key: ComponentKey) -> Option<ComponentRef<'_, T>> {
        if key.type_id != T::TYPE_ID {
            return None;
        }
        self.component_by_id::<T>(key.id)
    }

    /// Clone the `T` attached to `entity`.
    pub fn component_data<T: Component>(&self, entity: Entity) -> Option<T> {
        self.component::<T>(entity).map(|value| value.clone())
    }

    /// Mutably borrow the `T` attached to `entity`, flagging it changed.
    pub fn component_mut<T: Component>(&mut self, entity: Entity) -> Option<&mut T> {
        let id = *self.entities.get(&entity)?.get(&T::TYPE_ID)?;
        let storage = self.typed_mut::<T>()?;
        storage.mark_changed(id);
        storage.get_mut(id)
    }

    /// Overwrite the `T` attached to `entity`, flagging it changed.
    ///
    /// Returns `false` if the entity has no `T`.
    pub fn set_component_data<T: Component>(&mut self, entity: Entity, value: T) -> bool {
        let Some(&id) = self.entities.get(&entity).and_then(|c| c.get(&T::TYPE_ID)) else {
            return false;
        };
        let Some(storage) = self.typed_mut::<T>() else {
            return false;
        };
        match storage.get_mut(id) {
            Some(slot) => *slot = value,
            None => return false,
        }
        storage.mark_changed(id);
        true
    }

    /// Key of the `T` attached to `entity`.
    pub fn component_key<T: Component>(&self, entity: Entity) -> Option<ComponentKey> {
        let id = *self.entities.get(&entity)?.get(&T::TYPE_ID)?;
        Some(ComponentKey::new(T::TYPE_ID, id))
    }

    /// Detach and destroy the component behind `key`.
    ///
    /// Returns `false`, with no state change, if `entity` does not own `key`.
    pub fn remove_component(&mut self, entity: Entity, key: ComponentKey) -> bool {
        let Some(components) = self.entities.get_mut(&entity) else {
            return false;
        };
        if components.get(&key.type_id) != Some(&key.id) {
            return false;
        }
        components.shift_remove(&key.type_id);
        if let Some(cell) = self.stores.get_mut(&key.type_id) {
            cell.get_mut().remove(key.id);
        }
        self.structure_changed = true;
        true
    }

    /// Detach and destroy the `T` attached to `entity`.
    pub fn remove_component_of<T: Component>(&mut self, entity: Entity) -> bool {
        match self.component_key::<T>(entity) {
            Some(key) => self.remove_component(entity, key),
            None => false,
        }
    }

    /// Whether storage for `type_id` has been registered.
    pub fn has_component_type(&self, type_id: ComponentTypeId) -> bool {
        self.stores.contains_key(&type_id)
    }

    /// Whether `entity` owns exactly the component behind `key`.
    pub fn entity_has_component(&self, entity: Entity, key: ComponentKey) -> bool {
        self.entities
            .get(&entity)
            .is_some_and(|c| c.get(&key.type_id) == Some(&key.id))
    }

    /// Whether `entity` owns a component of type `type_id`.
    pub fn entity_has_component_type(&self, entity: Entity, type_id: ComponentTypeId) -> bool {
        self.entities
            .get(&entity)
            .is_some_and(|c| c.contains_key(&type_id))
    }

    /// Component types attached to `entity`, in attachment order.
    pub fn component_types(&self, entity: Entity) -> Vec<ComponentTypeId> {
        self.entities
            .get(&entity)
            .map(|c| c.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Number of live components of type `type_id`.
    pub fn component_count(&self, type_id: ComponentTypeId) -> usize {
        self.stores.get(&type_id).map_or(0, |cell| cell.read().len())
    }

    /// Read-lock the whole storage of `T`.
    pub fn column<T: Component>(&self) -> Option<Column<'_, T>> {
        let cell = self.stores.get(&T::TYPE_ID)?;
        RwLockReadGuard::try_map(cell.read(), |s| s.as_any().downcast_ref::<TypedStorage<T>>())
            .ok()
            .map(Column::new)
    }

    // ── Iteration ──────────────────────────────────────────────────

    /// Visit every entity that has all components in `Q`.
    ///
    /// The callback returns `false` to stop. Storages in `Q` stay
    /// read-locked for the duration, so the callback must not write to
    /// those component types; collect first or use [`each_mut`](Self::each_mut).
    pub fn each<Q: ComponentQuery>(&self, f: impl FnMut(Entity, Q::Item<'_>) -> bool) {
        self.add_query(EntityQuery::of::<Q>());
        self.scan::<Q>(f);
    }

    /// [`each`](Self::each) without registering a view.
    ///
    /// For one-off lookups; nothing is added to the per-step
    /// [`advance_views`](Self::advance_views) work.
    pub fn scan<Q: ComponentQuery>(&self, mut f: impl FnMut(Entity, Q::Item<'_>) -> bool) {
        let Some(columns) = Q::columns(self) else {
            return;
        };
        for (entity, components) in &self.entities {
            if let Some(item) = Q::fetch(&columns, components) {
                if !f(*entity, item) {
                    break;
                }
            }
        }
    }

    /// Visit entities that started matching `Q` during the previous step.
    ///
    /// An entity is reported in every call during the one step after it
    /// first matches, and not again while it keeps matching.
    pub fn each_new<Q: ComponentQuery>(&self, mut f: impl FnMut(Entity, Q::Item<'_>) -> bool) {
        let (index, _) = self.add_query(EntityQuery::of::<Q>());
        let fresh = self.views.lock().fresh(index);
        let Some(columns) = Q::columns(self) else {
            return;
        };
        for entity in fresh {
            let Some(components) = self.entities.get(&entity) else {
                continue;
            };
            if let Some(item) = Q::fetch(&columns, components) {
                if !f(entity, item) {
                    break;
                }
            }
        }
    }

    /// Visit entities matching `Q` that are marked for removal.
    ///
    /// Their components are still intact until the step boundary.
    pub fn each_removed<Q: ComponentQuery>(
        &self,
        mut f: impl FnMut(Entity, Q::Item<'_>) -> bool,
    ) {
        self.add_query(EntityQuery::of::<Q>());
        let Some(columns) = Q::columns(self) else {
            return;
        };
        for entity in &self.pending_removal {
            let Some(components) = self.entities.get(entity) else {
                continue;
            };
            if let Some(item) = Q::fetch(&columns, components) {
                if !f(*entity, item) {
                    break;
                }
            }
        }
    }

    /// Visit every `T` mutably, flagging each visited value changed.
    pub fn each_mut<T: Component>(&mut self, mut f: impl FnMut(Entity, &mut T) -> bool) {
        self.add_query(EntityQuery::new([T::TYPE_ID]));
        let Some(storage) = self
            .stores
            .get_mut(&T::TYPE_ID)
            .and_then(|cell| cell.get_mut().as_any_mut().downcast_mut::<TypedStorage<T>>())
        else {
            return;
        };
        for (entity, components) in &self.entities {
            let Some(&id) = components.get(&T::TYPE_ID) else {
                continue;
            };
            if let Some(value) = storage.get_mut(id) {
                let keep_going = f(*entity, value);
                storage.mark_changed(id);
                if !keep_going {
                    break;
                }
            }
        }
    }

    // ── Queries and views ──────────────────────────────────────────

    /// Register a query, returning its index and whether it was new.
    pub fn add_query(&self, query: EntityQuery) -> (usize, bool) {
        self.views.lock().add(query, &self.entities)
    }

    /// The query registered at `index`.
    pub fn query(&self, index: usize) -> Option<EntityQuery> {
        self.views.lock().query(index).cloned()
    }

    /// Index of an already registered query.
    pub fn find_query(&self, query: &EntityQuery) -> Option<usize> {
        self.views.lock().find(query)
    }

    /// Number of registered queries.
    pub fn query_count(&self) -> usize {
        self.views.lock().len()
    }

    /// Entities currently matching a registered query.
    pub fn query_entities(&self, index: usize) -> Vec<Entity> {
        let Some(query) = self.query(index) else {
            return Vec::new();
        };
        self.entities
            .iter()
            .filter(|(_, components)| query.matches(components))
            .map(|(entity, _)| *entity)
            .collect()
    }

    /// Step boundary: roll every view forward so entities that matched for
    /// the first time during the finished step become "new".
    pub fn advance_views(&mut self) {
        self.views.get_mut().advance(&self.entities);
    }

    // ── Names and hierarchy ────────────────────────────────────────

    /// First entity (in creation order) whose [`Name`] is `name`.
    pub fn entity_by_name(&self, name: &str) -> Option<Entity> {
        let mut found = None;
        self.scan::<(Name,)>(|entity, (n,)| {
            if n.0 == name {
                found = Some(entity);
                return false;
            }
            true
        });
        found
    }

    /// All entities whose `T` equals `value`.
    pub fn entities_by_component<T: Component + PartialEq>(&self, value: &T) -> Vec<Entity> {
        let mut out = Vec::new();
        self.scan::<(T,)>(|entity, (v,)| {
            if v == value {
                out.push(entity);
            }
            true
        });
        out
    }

    /// Parent of `entity` from its [`ParentEntity`].
    pub fn parent(&self, entity: Entity) -> Option<Entity> {
        self.component::<ParentEntity>(entity).map(|p| p.0)
    }

    /// Direct children of `entity`, in creation order.
    pub fn children(&self, entity: Entity) -> Vec<Entity> {
        let mut out = Vec::new();
        self.scan::<(ParentEntity,)>(|child, (parent,)| {
            if parent.0 == entity {
                out.push(child);
            }
            true
        });
        out
    }

    /// `entity` and everything below it, breadth first.
    ///
    /// Empty if `entity` does not exist.
    pub fn descendants(&self, entity: Entity) -> IndexSet<Entity> {
        let mut out = IndexSet::new();
        if !self.has_entity(entity) {
            return out;
        }
        let mut children: HashMap<Entity, Vec<Entity>> = HashMap::new();
        self.scan::<(ParentEntity,)>(|child, (parent,)| {
            children.entry(parent.0).or_default().push(child);
            true
        });
        out.insert(entity);
        let mut cursor = 0;
        while let Some(&current) = out.get_index(cursor) {
            if let Some(kids) = children.get(&current) {
                for kid in kids {
                    out.insert(*kid);
                }
            }
            cursor += 1;
        }
        out
    }

    /// Names from the root down to `entity`, joined by `delimiter`.
    ///
    /// Unnamed ancestors are skipped.
    pub fn scoped_name(&self, entity: Entity, delimiter: &str) -> String {
        let mut names = Vec::new();
        let mut current = Some(entity);
        while let Some(e) = current {
            if let Some(name) = self.component::<Name>(e) {
                names.push(name.0.clone());
            }
            current = self.parent(e).filter(|p| *p != e);
        }
        names.reverse();
        names.join(delimiter)
    }

    /// Outermost model containing `entity` (possibly itself).
    pub fn top_level_model(&self, entity: Entity) -> Option<Entity> {
        let mut model = None;
        let mut current = Some(entity);
        while let Some(e) = current {
            if self.component_data::<EntityKind>(e) == Some(EntityKind::Model) {
                model = Some(e);
            }
            current = self.parent(e).filter(|p| *p != e);
        }
        model
    }

    // ── State exchange ─────────────────────────────────────────────

    /// Collect components of `entities`: all of them with `full`, otherwise
    /// only those changed since the last
    /// [`set_all_components_unchanged`](Self::set_all_components_unchanged).
    pub fn state(&self, entities: impl IntoIterator<Item = Entity>, full: bool) -> StateDelta {
        let mut delta = StateDelta::default();
        for entity in entities {
            let Some(components) = self.entities.get(&entity) else {
                continue;
            };
            for (type_id, id) in components {
                let Some(cell) = self.stores.get(type_id) else {
                    continue;
                };
                let storage = cell.read();
                if full || storage.is_changed(*id) {
                    if let Some(value) = storage.clone_value(*id) {
                        delta.entries.push(StateEntry { entity, value });
                    }
                }
            }
        }
        delta
    }

    /// Apply a delta, creating missing entities with their original ids.
    ///
    /// Returns the number of component values applied; mismatched entries
    /// are logged and skipped.
    pub fn set_state(&mut self, delta: StateDelta) -> usize {
        let mut applied = 0;
        for StateEntry { entity, value } in delta.entries {
            self.insert_entity(entity);
            let type_id = value.component_type();
            if self.create_component_erased(entity, type_id, value).is_ok() {
                applied += 1;
            }
        }
        applied
    }

    /// Clear every storage's changed flags.
    pub fn set_all_components_unchanged(&mut self) {
        for cell in self.stores.values_mut() {
            cell.get_mut().clear_changed();
        }
    }

    /// Whether entities or component attachments changed since the last call.
    pub fn take_structure_changed(&mut self) -> bool {
        std::mem::take(&mut self.structure_changed)
    }

    // ── Internals ──────────────────────────────────────────────────

    fn component_by_id<T: Component>(&self, id: ComponentId) -> Option<ComponentRef<'_, T>> {
        let cell = self.stores.get(&T::TYPE_ID)?;
        RwLockReadGuard::try_map(cell.read(), |s| {
            s.as_any().downcast_ref::<TypedStorage<T>>()?.get(id)
        })
        .ok()
    }

    fn typed_mut<T: Component>(&mut self) -> Option<&mut TypedStorage<T>> {
        self.stores
            .get_mut(&T::TYPE_ID)?
            .get_mut()
            .as_any_mut()
            .downcast_mut::<TypedStorage<T>>()
    }

    fn ensure_storage<T: Component>(&mut self) -> Result<&mut TypedStorage<T>, EcmError> {
        let storage = self
            .stores
            .entry(T::TYPE_ID)
            .or_insert_with(|| RwLock::new(Box::new(TypedStorage::<T>::new())))
            .get_mut();
        let registered = storage.type_name();
        storage
            .as_any_mut()
            .downcast_mut::<TypedStorage<T>>()
            .ok_or(EcmError::TypeCollision {
                type_id: T::TYPE_ID,
                name: std::any::type_name::<T>(),
                registered,
            })
    }

    fn bind(&mut self, entity: Entity, type_id: ComponentTypeId, id: ComponentId, is_new: bool) {
        if let Some(components) = self.entities.get_mut(&entity) {
            components.insert(type_id, id);
        }
        if is_new {
            self.structure_changed = true;
        }
    }
}

fn report(err: EcmError) -> EcmError {
    tracing::error!(error = %err, "component creation rejected");
    err
}

impl Default for EntityComponentManager {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EntityComponentManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityComponentManager")
            .field("entities", &self.entities.len())
            .field("component_types", &self.stores.len())
            .field("pending_removal", &self.pending_removal.len())
            .finish()
    }
}

// Compile-time assertion: the manager is shared across runner and pool threads.
const _: () = {
    fn _assert_send_sync<T: Send + Sync>() {}
    fn _check() {
        _assert_send_sync::<EntityComponentManager>();
    }
};
