//! Benchmark profiles for the Tandem simulation runtime.
//!
//! - [`populated_ecm`]: a manager with `n` entities carrying a mix of components
//! - [`robot_world`]: a world description of velocity-controlled robots
//! - [`robot_runner`]: a loaded, unthrottled runner over [`robot_world`]

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use tandem_core::CancellationToken;
use tandem_ecm::{EntityComponentManager, EntityKind, Name};
use tandem_engine::{EntityDescription, RunnerConfig, SimulationRunner, WorldDescription};
use tandem_system::{PluginDescription, SystemLoader};
use tandem_test_utils::{register_mocks, Counter, JointVelocity, Label};

/// A manager with `n` entities. Every entity has a [`Counter`]; every
/// second one a [`JointVelocity`]; every tenth one a [`Name`] and [`Label`].
pub fn populated_ecm(n: u64) -> EntityComponentManager {
    let mut ecm = EntityComponentManager::new();
    for i in 0..n {
        let Ok(entity) = ecm.create_entity() else {
            break;
        };
        let _ = ecm.create_component(entity, Counter(i));
        if i % 2 == 0 {
            let _ = ecm.create_component(entity, JointVelocity(i as f64));
        }
        if i % 10 == 0 {
            let _ = ecm.create_component(entity, Name(format!("entity_{i}")));
            let _ = ecm.create_component(entity, Label("bench".into()));
        }
    }
    ecm
}

/// `models` robots, each a model with one link and `joints` controlled joints.
pub fn robot_world(models: usize, joints: usize) -> WorldDescription {
    let mut world = WorldDescription::new("bench");
    for m in 0..models {
        let mut model = EntityDescription::new(EntityKind::Model, format!("robot_{m}"))
            .with_child(EntityDescription::new(EntityKind::Link, "base"));
        for j in 0..joints {
            model = model.with_child(
                EntityDescription::new(EntityKind::Joint, format!("joint_{j}"))
                    .with_component(JointVelocity(0.0))
                    .with_plugin(
                        PluginDescription::new("test.VelocityController").with_param("target", "1"),
                    ),
            );
        }
        world = world.with_entity(model);
    }
    world.with_plugin(PluginDescription::new("test.FirstOrderJoint"))
}

/// Load [`robot_world`] into an unthrottled runner.
pub fn robot_runner(models: usize, joints: usize) -> SimulationRunner {
    let mut loader = SystemLoader::new();
    register_mocks(&mut loader);
    match SimulationRunner::from_description(
        &robot_world(models, joints),
        RunnerConfig::unthrottled(),
        &loader,
        CancellationToken::new(),
    ) {
        Ok(runner) => runner,
        Err(err) => panic!("benchmark world failed to load: {err}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profiles_build() {
        let ecm = populated_ecm(100);
        assert_eq!(ecm.entity_count(), 100);
        assert!(ecm.entity_by_name("entity_10").is_some());

        let runner = robot_runner(3, 2);
        // World, 3 models, 3 links, 6 joints.
        assert_eq!(runner.ecm().entity_count(), 13);
        // One joint system plus a controller per joint.
        assert_eq!(runner.systems().len(), 7);
    }
}
