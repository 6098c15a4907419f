//! Already-parsed world descriptions and loading them into a manager.

use std::collections::HashSet;
use std::time::Duration;

use tandem_core::Entity;
use tandem_ecm::{Component, ComponentValue, EntityComponentManager, EntityKind, Name, ParentEntity};
use tandem_system::{PluginDescription, SystemLoader, SystemRegistry};

use crate::config::ConfigError;

/// One world: a named tree of entities plus world-level plugins.
#[derive(Clone, Debug, Default)]
pub struct WorldDescription {
    /// Unique, non-empty world name.
    pub name: String,
    /// Overrides [`RunnerConfig::step_size`](crate::RunnerConfig::step_size).
    pub step_size: Option<Duration>,
    /// Top-level entities (models, lights, actors, ...).
    pub entities: Vec<EntityDescription>,
    /// Plugins configured against the world entity.
    pub plugins: Vec<PluginDescription>,
}

impl WorldDescription {
    /// An empty world called `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Set the step size override.
    pub fn with_step_size(mut self, step_size: Duration) -> Self {
        self.step_size = Some(step_size);
        self
    }

    /// Append a top-level entity.
    pub fn with_entity(mut self, entity: EntityDescription) -> Self {
        self.entities.push(entity);
        self
    }

    /// Append a world-level plugin.
    pub fn with_plugin(mut self, plugin: PluginDescription) -> Self {
        self.plugins.push(plugin);
        self
    }
}

/// One entity of a world description with its subtree.
#[derive(Clone, Debug)]
pub struct EntityDescription {
    /// Structural kind, stored as an [`EntityKind`] component.
    pub kind: EntityKind,
    /// Name, unique among siblings.
    pub name: String,
    /// Extra components attached after the built-in ones.
    pub components: Vec<Box<dyn ComponentValue>>,
    /// Child entities, loaded depth-first.
    pub children: Vec<EntityDescription>,
    /// Plugins configured against this entity.
    pub plugins: Vec<PluginDescription>,
}

impl EntityDescription {
    /// A childless entity with no extra components.
    pub fn new(kind: EntityKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            components: Vec::new(),
            children: Vec::new(),
            plugins: Vec::new(),
        }
    }

    /// Attach a component.
    pub fn with_component<T: Component>(mut self, component: T) -> Self {
        self.components.push(Box::new(component));
        self
    }

    /// Append a child.
    pub fn with_child(mut self, child: EntityDescription) -> Self {
        self.children.push(child);
        self
    }

    /// Append a plugin.
    pub fn with_plugin(mut self, plugin: PluginDescription) -> Self {
        self.plugins.push(plugin);
        self
    }
}

/// Populate `ecm` from `desc` and register its plugins in `systems`.
///
/// The world entity comes first, then every description depth-first with
/// [`Name`], [`EntityKind`], [`ParentEntity`] and its own components.
/// Plugins are instantiated once the whole tree exists, world plugins
/// first. Unknown plugins and failed configures are logged and skipped;
/// structural problems are fatal. Returns the world entity.
pub fn load_world(
    desc: &WorldDescription,
    ecm: &mut EntityComponentManager,
    loader: &SystemLoader,
    systems: &mut SystemRegistry,
) -> Result<Entity, ConfigError> {
    if desc.name.trim().is_empty() {
        return Err(ConfigError::EmptyWorldName);
    }
    let fail = |reason: String| ConfigError::WorldLoad {
        world: desc.name.clone(),
        reason,
    };

    let world = ecm.create_entity().map_err(|e| fail(e.to_string()))?;
    ecm.create_component(world, Name(desc.name.clone()))
        .map_err(|e| fail(e.to_string()))?;
    ecm.create_component(world, EntityKind::World)
        .map_err(|e| fail(e.to_string()))?;

    let mut plugins: Vec<(Entity, &PluginDescription)> =
        desc.plugins.iter().map(|p| (world, p)).collect();
    load_children(&desc.name, world, &desc.entities, ecm, &mut plugins, &fail)?;

    for (entity, plugin) in plugins {
        let Ok(record) = loader.load(plugin) else {
            continue;
        };
        // Configure failures are logged by the registry.
        let _ = systems.add(record, entity, ecm);
    }

    tracing::info!(
        world = %desc.name,
        entities = ecm.entity_count(),
        systems = systems.len(),
        "world loaded"
    );
    Ok(world)
}

fn load_children<'d>(
    parent_name: &str,
    parent: Entity,
    children: &'d [EntityDescription],
    ecm: &mut EntityComponentManager,
    plugins: &mut Vec<(Entity, &'d PluginDescription)>,
    fail: &dyn Fn(String) -> ConfigError,
) -> Result<(), ConfigError> {
    let mut names = HashSet::new();
    for child in children {
        if !names.insert(child.name.as_str()) {
            return Err(ConfigError::DuplicateSiblingName {
                parent: parent_name.to_owned(),
                name: child.name.clone(),
            });
        }
        let entity = ecm.create_entity().map_err(|e| fail(e.to_string()))?;
        ecm.create_component(entity, Name(child.name.clone()))
            .map_err(|e| fail(e.to_string()))?;
        ecm.create_component(entity, child.kind)
            .map_err(|e| fail(e.to_string()))?;
        ecm.create_component(entity, ParentEntity(parent))
            .map_err(|e| fail(e.to_string()))?;
        for component in &child.components {
            let value = component.clone();
            ecm.create_component_erased(entity, value.component_type(), value)
                .map_err(|e| fail(e.to_string()))?;
        }
        plugins.extend(child.plugins.iter().map(|p| (entity, p)));

        let scoped = format!("{parent_name}::{}", child.name);
        load_children(&scoped, entity, &child.children, ecm, plugins, fail)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_ecm::PerformerLevels;
    use tandem_test_utils::{register_mocks, JointVelocity};

    fn robot() -> EntityDescription {
        EntityDescription::new(EntityKind::Model, "robot")
            .with_child(EntityDescription::new(EntityKind::Link, "base"))
            .with_child(
                EntityDescription::new(EntityKind::Joint, "wheel")
                    .with_component(JointVelocity(0.0))
                    .with_plugin(PluginDescription::new("test.FirstOrderJoint")),
            )
    }

    #[test]
    fn loads_tree_depth_first_with_names_and_parents() {
        let desc = WorldDescription::new("shapes")
            .with_entity(robot())
            .with_entity(EntityDescription::new(EntityKind::Light, "sun"));
        let mut ecm = EntityComponentManager::new();
        let mut loader = SystemLoader::new();
        register_mocks(&mut loader);
        let mut systems = SystemRegistry::new();

        let world = load_world(&desc, &mut ecm, &loader, &mut systems).unwrap();
        assert_eq!(ecm.entity_count(), 5);
        assert_eq!(ecm.component_data::<EntityKind>(world), Some(EntityKind::World));

        let robot = ecm.entity_by_name("robot").unwrap();
        let base = ecm.entity_by_name("base").unwrap();
        let wheel = ecm.entity_by_name("wheel").unwrap();
        let sun = ecm.entity_by_name("sun").unwrap();
        assert_eq!(ecm.parent(robot), Some(world));
        assert_eq!(ecm.parent(wheel), Some(robot));
        assert_eq!(ecm.parent(sun), Some(world));
        assert!(base < wheel && wheel < sun);
        assert_eq!(ecm.component_data::<JointVelocity>(wheel), Some(JointVelocity(0.0)));
        assert_eq!(ecm.scoped_name(wheel, "::"), "shapes::robot::wheel");

        assert_eq!(systems.names(), vec!["first_order_joint"]);
        assert_eq!(systems.entities(), vec![wheel]);
    }

    #[test]
    fn unknown_plugins_and_failed_configures_are_not_fatal() {
        let desc = WorldDescription::new("w")
            .with_plugin(PluginDescription::new("nobody.Missing"))
            .with_entity(
                EntityDescription::new(EntityKind::Model, "m")
                    // No JointVelocity on the model: configure fails.
                    .with_plugin(PluginDescription::new("test.VelocityController")),
            );
        let mut ecm = EntityComponentManager::new();
        let mut loader = SystemLoader::new();
        register_mocks(&mut loader);
        let mut systems = SystemRegistry::new();

        load_world(&desc, &mut ecm, &loader, &mut systems).unwrap();
        assert!(systems.is_empty());
        assert_eq!(ecm.entity_count(), 2);
    }

    #[test]
    fn duplicate_sibling_names_are_fatal() {
        let desc = WorldDescription::new("w").with_entity(
            EntityDescription::new(EntityKind::Model, "m")
                .with_child(EntityDescription::new(EntityKind::Link, "l"))
                .with_child(EntityDescription::new(EntityKind::Link, "l")),
        );
        let mut ecm = EntityComponentManager::new();
        let err = load_world(&desc, &mut ecm, &SystemLoader::new(), &mut SystemRegistry::new())
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::DuplicateSiblingName {
                parent: "w::m".into(),
                name: "l".into()
            }
        );
    }

    #[test]
    fn same_name_under_different_parents_is_fine() {
        let desc = WorldDescription::new("w")
            .with_entity(
                EntityDescription::new(EntityKind::Model, "a")
                    .with_child(EntityDescription::new(EntityKind::Link, "link")),
            )
            .with_entity(
                EntityDescription::new(EntityKind::Model, "b")
                    .with_child(EntityDescription::new(EntityKind::Link, "link"))
                    .with_component(PerformerLevels::default()),
            );
        let mut ecm = EntityComponentManager::new();
        load_world(&desc, &mut ecm, &SystemLoader::new(), &mut SystemRegistry::new()).unwrap();
        assert_eq!(ecm.entity_count(), 5);
    }

    #[test]
    fn empty_world_name_is_fatal() {
        let mut ecm = EntityComponentManager::new();
        assert_eq!(
            load_world(
                &WorldDescription::new(""),
                &mut ecm,
                &SystemLoader::new(),
                &mut SystemRegistry::new()
            ),
            Err(ConfigError::EmptyWorldName)
        );
        assert_eq!(ecm.entity_count(), 0);
    }
}
