//! Component-set queries and the views kept for them.
//!
//! A query is the set of component types an entity must have. Typed
//! iteration is expressed with tuples implementing [`ComponentQuery`]:
//! `(A,)`, `(A, B)`, `(A, B, C)` and `(A, B, C, D)`. Every query used for
//! iteration is registered with the manager, which keeps a view per query
//! so "newly matching" entities can be reported once per step.

use indexmap::{IndexMap, IndexSet};
use parking_lot::MappedRwLockReadGuard;
use smallvec::{smallvec, SmallVec};

use tandem_core::{ComponentId, ComponentTypeId, Entity};

use crate::component::Component;
use crate::manager::EntityComponentManager;
use crate::storage::TypedStorage;

/// Components owned by one entity: type → instance id.
pub type ComponentMap = IndexMap<ComponentTypeId, ComponentId>;

// ── EntityQuery ────────────────────────────────────────────────────

/// An unordered set of required component types.
///
/// Stored sorted and deduplicated, so two queries over the same types in
/// different orders compare equal and share one view.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EntityQuery {
    types: SmallVec<[ComponentTypeId; 4]>,
}

impl EntityQuery {
    /// Build a query from component type ids in any order.
    pub fn new(types: impl IntoIterator<Item = ComponentTypeId>) -> Self {
        let mut types: SmallVec<[ComponentTypeId; 4]> = types.into_iter().collect();
        types.sort_unstable();
        types.dedup();
        Self { types }
    }

    /// The query matching a [`ComponentQuery`] tuple.
    pub fn of<Q: ComponentQuery>() -> Self {
        Self::new(Q::type_ids())
    }

    /// Required types, sorted.
    pub fn types(&self) -> &[ComponentTypeId] {
        &self.types
    }

    /// Whether an entity with `components` satisfies the query.
    pub fn matches(&self, components: &ComponentMap) -> bool {
        self.types.iter().all(|t| components.contains_key(t))
    }
}

// ── Column ─────────────────────────────────────────────────────────

/// Read-locked, typed access to one component storage.
///
/// Holding a column keeps that storage's read lock; writers of the same
/// component type block until it is dropped.
pub struct Column<'e, T: Component> {
    storage: MappedRwLockReadGuard<'e, TypedStorage<T>>,
}

impl<'e, T: Component> Column<'e, T> {
    pub(crate) fn new(storage: MappedRwLockReadGuard<'e, TypedStorage<T>>) -> Self {
        Self { storage }
    }

    /// The component with instance id `id`, if live.
    pub fn get(&self, id: ComponentId) -> Option<&T> {
        self.storage.get(id)
    }

    /// Number of live components of this type.
    pub fn len(&self) -> usize {
        use crate::storage::ComponentStorage;
        self.storage.len()
    }

    /// Whether no component of this type is live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ── ComponentQuery ─────────────────────────────────────────────────

/// A tuple of component types that can be iterated together.
///
/// Implemented for tuples of one to four [`Component`] types. Not meant
/// to be implemented outside this crate.
pub trait ComponentQuery {
    /// Locked columns for every type in the tuple.
    type Columns<'e>;

    /// References handed to iteration callbacks.
    type Item<'c>;

    /// Component type ids in tuple order.
    fn type_ids() -> SmallVec<[ComponentTypeId; 4]>;

    /// Read-lock every storage in the tuple. `None` if any type has no storage yet.
    fn columns(ecm: &EntityComponentManager) -> Option<Self::Columns<'_>>;

    /// Resolve one entity's components, `None` if any is missing.
    fn fetch<'c>(columns: &'c Self::Columns<'_>, components: &ComponentMap)
        -> Option<Self::Item<'c>>;
}

macro_rules! impl_component_query {
    ($($ty:ident $col:ident),+) => {
        impl<$($ty: Component),+> ComponentQuery for ($($ty,)+) {
            type Columns<'e> = ($(Column<'e, $ty>,)+);
            type Item<'c> = ($(&'c $ty,)+);

            fn type_ids() -> SmallVec<[ComponentTypeId; 4]> {
                smallvec![$($ty::TYPE_ID),+]
            }

            fn columns(ecm: &EntityComponentManager) -> Option<Self::Columns<'_>> {
                Some(($(ecm.column::<$ty>()?,)+))
            }

            fn fetch<'c>(
                columns: &'c Self::Columns<'_>,
                components: &ComponentMap,
            ) -> Option<Self::Item<'c>> {
                let ($($col,)+) = columns;
                Some(($($col.get(*components.get(&$ty::TYPE_ID)?)?,)+))
            }
        }
    };
}

impl_component_query!(A a);
impl_component_query!(A a, B b);
impl_component_query!(A a, B b, C c);
impl_component_query!(A a, B b, C c, D d);

// ── Views ──────────────────────────────────────────────────────────

/// Per-query bookkeeping for the "newly matching" flavor.
#[derive(Debug, Default)]
struct View {
    /// Entities that matched at the last step boundary.
    matched: IndexSet<Entity>,
    /// Entities that started matching in the step before the last boundary.
    fresh: IndexSet<Entity>,
}

/// Registered queries and their views, indexed by registration order.
#[derive(Debug, Default)]
pub(crate) struct ViewRegistry {
    queries: IndexSet<EntityQuery>,
    views: Vec<View>,
}

impl ViewRegistry {
    /// Register `query`, returning its index and whether it was new.
    ///
    /// A view created mid-run treats everything currently matching as new
    /// for the rest of the current step.
    pub(crate) fn add(
        &mut self,
        query: EntityQuery,
        entities: &IndexMap<Entity, ComponentMap>,
    ) -> (usize, bool) {
        if let Some(index) = self.queries.get_index_of(&query) {
            return (index, false);
        }
        let matched: IndexSet<Entity> = entities
            .iter()
            .filter(|(_, components)| query.matches(components))
            .map(|(entity, _)| *entity)
            .collect();
        let (index, _) = self.queries.insert_full(query);
        self.views.push(View {
            fresh: matched.clone(),
            matched,
        });
        (index, true)
    }

    pub(crate) fn query(&self, index: usize) -> Option<&EntityQuery> {
        self.queries.get_index(index)
    }

    pub(crate) fn find(&self, query: &EntityQuery) -> Option<usize> {
        self.queries.get_index_of(query)
    }

    pub(crate) fn len(&self) -> usize {
        self.queries.len()
    }

    /// Snapshot of the entities reported as new by view `index`.
    pub(crate) fn fresh(&self, index: usize) -> Vec<Entity> {
        self.views
            .get(index)
            .map(|v| v.fresh.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Step boundary: recompute each view against the current entity table.
    pub(crate) fn advance(&mut self, entities: &IndexMap<Entity, ComponentMap>) {
        for (query, view) in self.queries.iter().zip(self.views.iter_mut()) {
            let current: IndexSet<Entity> = entities
                .iter()
                .filter(|(_, components)| query.matches(components))
                .map(|(entity, _)| *entity)
                .collect();
            view.fresh = current.difference(&view.matched).copied().collect();
            view.matched = current;
        }
    }

    /// Drop an erased entity from every view.
    pub(crate) fn forget(&mut self, entity: Entity) {
        for view in &mut self.views {
            view.matched.shift_remove(&entity);
            view.fresh.shift_remove(&entity);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(types: &[u64]) -> ComponentMap {
        types
            .iter()
            .enumerate()
            .map(|(i, t)| (ComponentTypeId(*t), ComponentId(i as u64)))
            .collect()
    }

    #[test]
    fn query_is_order_insensitive() {
        let a = EntityQuery::new([ComponentTypeId(2), ComponentTypeId(1)]);
        let b = EntityQuery::new([ComponentTypeId(1), ComponentTypeId(2), ComponentTypeId(1)]);
        assert_eq!(a, b);
        assert_eq!(a.types(), &[ComponentTypeId(1), ComponentTypeId(2)]);
    }

    #[test]
    fn query_matching() {
        let q = EntityQuery::new([ComponentTypeId(1), ComponentTypeId(3)]);
        assert!(q.matches(&map(&[1, 2, 3])));
        assert!(!q.matches(&map(&[1, 2])));
        assert!(EntityQuery::new([]).matches(&map(&[])));
    }

    #[test]
    fn registry_deduplicates() {
        let mut reg = ViewRegistry::default();
        let entities = IndexMap::new();
        let (i, new) = reg.add(EntityQuery::new([ComponentTypeId(1)]), &entities);
        assert!(new);
        let (j, new_again) = reg.add(EntityQuery::new([ComponentTypeId(1)]), &entities);
        assert_eq!(i, j);
        assert!(!new_again);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn advance_reports_each_entity_once() {
        let mut reg = ViewRegistry::default();
        let mut entities: IndexMap<Entity, ComponentMap> = IndexMap::new();
        let (idx, _) = reg.add(EntityQuery::new([ComponentTypeId(1)]), &entities);
        assert!(reg.fresh(idx).is_empty());

        entities.insert(Entity(0), map(&[1]));
        reg.advance(&entities);
        assert_eq!(reg.fresh(idx), vec![Entity(0)]);

        reg.advance(&entities);
        assert!(reg.fresh(idx).is_empty());

        // Loses the component, then regains it.
        entities.insert(Entity(0), map(&[]));
        reg.advance(&entities);
        assert!(reg.fresh(idx).is_empty());
        entities.insert(Entity(0), map(&[1]));
        reg.advance(&entities);
        assert_eq!(reg.fresh(idx), vec![Entity(0)]);
    }

    #[test]
    fn view_created_mid_run_reports_current_matches() {
        let mut reg = ViewRegistry::default();
        let mut entities: IndexMap<Entity, ComponentMap> = IndexMap::new();
        entities.insert(Entity(3), map(&[1]));
        let (idx, _) = reg.add(EntityQuery::new([ComponentTypeId(1)]), &entities);
        assert_eq!(reg.fresh(idx), vec![Entity(3)]);
        reg.forget(Entity(3));
        assert!(reg.fresh(idx).is_empty());
    }
}
