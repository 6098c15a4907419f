//! Strongly-typed identifiers for entities and components.

use std::fmt;

/// Opaque identifier for a simulated object.
///
/// Entities carry no data themselves; all state lives in components.
/// Ids are handed out monotonically by the entity/component manager and
/// are never reused within one manager. [`Entity::NULL`] denotes absence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Entity(pub u64);

impl Entity {
    /// The distinguished "no entity" value.
    pub const NULL: Entity = Entity(u64::MAX);

    /// Whether this is [`Entity::NULL`].
    pub fn is_null(self) -> bool {
        self == Self::NULL
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "null")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl From<u64> for Entity {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

/// Process-wide stable identifier of a component type.
///
/// Derived from the component's stable name with 64-bit FNV-1a, so two
/// processes built from the same sources agree on every id without any
/// registration handshake. This is what lets state deltas cross the
/// primary/secondary boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentTypeId(pub u64);

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

impl ComponentTypeId {
    /// Hash a stable component name into its type id.
    pub const fn from_name(name: &str) -> Self {
        let bytes = name.as_bytes();
        let mut hash = FNV_OFFSET;
        let mut i = 0;
        while i < bytes.len() {
            hash ^= bytes[i] as u64;
            hash = hash.wrapping_mul(FNV_PRIME);
            i += 1;
        }
        Self(hash)
    }
}

impl fmt::Display for ComponentTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

impl From<u64> for ComponentTypeId {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

/// Identifies one component instance within its type's storage.
///
/// Allocated from a per-storage counter and never reused, so a stale id
/// simply fails to resolve after its component is removed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(pub u64);

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ComponentId {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

/// Handle to one component instance: `(type, id)`.
///
/// A key stays valid until its component is removed. It never encodes a
/// storage slot, so compaction inside the storage does not invalidate it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentKey {
    /// Type of the component.
    pub type_id: ComponentTypeId,
    /// Instance id within the type's storage.
    pub id: ComponentId,
}

impl ComponentKey {
    /// Build a key from its parts.
    pub fn new(type_id: ComponentTypeId, id: ComponentId) -> Self {
        Self { type_id, id }
    }
}

impl fmt::Display for ComponentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.type_id, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_entity_is_distinguished() {
        assert!(Entity::NULL.is_null());
        assert!(!Entity(0).is_null());
        assert_eq!(Entity::NULL.to_string(), "null");
        assert_eq!(Entity(42).to_string(), "42");
    }

    #[test]
    fn type_id_matches_reference_fnv1a() {
        // Reference values for 64-bit FNV-1a.
        assert_eq!(ComponentTypeId::from_name("").0, 0xcbf2_9ce4_8422_2325);
        assert_eq!(ComponentTypeId::from_name("a").0, 0xaf63_dc4c_8601_ec8c);
    }

    #[test]
    fn type_id_is_usable_in_const_context() {
        const NAME_ID: ComponentTypeId = ComponentTypeId::from_name("tandem.Name");
        assert_eq!(NAME_ID, ComponentTypeId::from_name("tandem.Name"));
    }

    #[test]
    fn key_display_joins_parts() {
        let key = ComponentKey::new(ComponentTypeId(1), ComponentId(7));
        assert_eq!(key.to_string(), "0x0000000000000001:7");
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn type_id_is_deterministic(name in "[a-z_.]{0,32}") {
                prop_assert_eq!(
                    ComponentTypeId::from_name(&name),
                    ComponentTypeId::from_name(&name.clone()),
                );
            }

            #[test]
            fn single_byte_suffix_changes_id(name in "[a-z_.]{0,32}", c in proptest::char::range('a', 'z')) {
                let mut longer = name.clone();
                longer.push(c);
                prop_assert_ne!(
                    ComponentTypeId::from_name(&name),
                    ComponentTypeId::from_name(&longer),
                );
            }
        }
    }
}
