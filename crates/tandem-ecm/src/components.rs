//! Built-in components understood by the runtime itself.
//!
//! World loading attaches [`Name`], [`EntityKind`] and [`ParentEntity`] to
//! every entity it creates. The network layer reads [`PerformerLevels`] to
//! partition work and records the outcome as [`PerformerAffinity`].

use std::collections::BTreeSet;

use tandem_core::Entity;

use crate::component::Component;

/// Human-readable entity name, unique among siblings.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Name(pub String);

impl Component for Name {
    const NAME: &'static str = "tandem.Name";
}

impl From<&str> for Name {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Parent in the entity tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ParentEntity(pub Entity);

impl Component for ParentEntity {
    const NAME: &'static str = "tandem.ParentEntity";
}

/// What an entity represents in the world description.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntityKind {
    /// Root of one world.
    World,
    /// A model: a group of links and joints.
    Model,
    /// A rigid body of a model.
    Link,
    /// A joint between two links.
    Joint,
    /// A light source.
    Light,
    /// A sensor attached to a link.
    Sensor,
    /// An animated actor.
    Actor,
    /// A spatial level used for work partitioning.
    Level,
    /// An entity whose simulation can be delegated to a secondary.
    Performer,
    /// Anything else.
    Other,
}

impl Component for EntityKind {
    const NAME: &'static str = "tandem.EntityKind";
}

/// Levels a performer currently occupies.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PerformerLevels(pub BTreeSet<Entity>);

impl Component for PerformerLevels {
    const NAME: &'static str = "tandem.PerformerLevels";
}

/// Namespace prefix of the secondary that simulates a performer.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PerformerAffinity(pub String);

impl Component for PerformerAffinity {
    const NAME: &'static str = "tandem.PerformerAffinity";
}
