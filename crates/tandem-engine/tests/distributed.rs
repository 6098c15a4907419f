//! A primary server and a secondary runner stepping one world over a
//! `LocalBus`.

use std::thread;
use std::time::Duration;

use tandem_core::CancellationToken;
use tandem_ecm::{EntityKind, PerformerAffinity, PerformerLevels};
use tandem_engine::{
    EntityDescription, NetworkEndpoint, NetworkSetup, RunnerConfig, Server, ServerConfig,
    SimulationRunner, WorldDescription,
};
use tandem_network::{LocalBus, NetworkConfig, NetworkSecondary};
use tandem_system::{PluginDescription, SystemLoader};
use tandem_test_utils::{init_tracing, register_mocks, JointVelocity};

const SECONDARY_ID: &str = "0badcafe-runner";
const ITERATIONS: u64 = 40;

/// The same tree on both sides; only the secondary simulates the joint.
fn world(simulate_joint: bool) -> WorldDescription {
    let mut joint = EntityDescription::new(EntityKind::Joint, "hinge").with_component(JointVelocity(0.0));
    if simulate_joint {
        joint = joint
            .with_plugin(PluginDescription::new("test.FirstOrderJoint"))
            .with_plugin(PluginDescription::new("test.VelocityController").with_param("target", "10"));
    }
    WorldDescription::new("shared").with_entity(
        EntityDescription::new(EntityKind::Model, "door")
            .with_child(EntityDescription::new(EntityKind::Link, "panel"))
            .with_child(joint)
            .with_child(
                EntityDescription::new(EntityKind::Performer, "door_performer")
                    .with_component(PerformerLevels::default()),
            ),
    )
}

fn expected_velocity(steps: u64) -> f64 {
    10.0 * (1.0 - 0.9f64.powi(steps as i32))
}

#[test]
fn primary_mirrors_joint_simulated_by_secondary() {
    init_tracing();
    let bus = LocalBus::new();

    let mut loader = SystemLoader::new();
    register_mocks(&mut loader);
    let cancel = CancellationToken::new();
    let mut secondary = SimulationRunner::from_description(
        &world(true),
        RunnerConfig::unthrottled(),
        &loader,
        cancel.clone(),
    )
    .unwrap()
    .with_network(NetworkSecondary::new(NetworkConfig::secondary(), bus.secondary(SECONDARY_ID)).into());
    assert_eq!(secondary.systems().len(), 2);
    let secondary = thread::spawn(move || {
        let executed = secondary.run(ITERATIONS);
        (executed, secondary)
    });

    let mut config = ServerConfig::new([world(false)]);
    config.runner = RunnerConfig::unthrottled();
    config.network = Some(NetworkSetup {
        config: NetworkConfig {
            secondary_iterations: 6,
            barrier_timeout: Duration::from_secs(5),
            ..NetworkConfig::primary(1)
        },
        endpoint: NetworkEndpoint::Primary(Box::new(bus.primary())),
    });
    let mut server = Server::new(config).unwrap();
    assert_eq!(server.system_count(0), Some(0));
    server.run(true, ITERATIONS, false).unwrap();

    let stats = server.statistics(0).unwrap();
    assert_eq!(stats.iterations, ITERATIONS);
    assert_eq!(stats.barrier_timeouts, 0);

    let joint = server.entity_by_name("hinge", 0).unwrap();
    let performer = server.entity_by_name("door_performer", 0).unwrap();
    let (velocity, affinity) = server
        .with_ecm(0, |ecm| {
            (
                ecm.component_data::<JointVelocity>(joint),
                ecm.component_data::<PerformerAffinity>(performer),
            )
        })
        .unwrap();
    let velocity = velocity.unwrap().0;
    assert!(
        (velocity - expected_velocity(ITERATIONS)).abs() < 1e-9,
        "velocity {velocity}"
    );
    assert_eq!(affinity, Some(PerformerAffinity("0badcafe".into())));

    let (executed, secondary) = secondary.join().unwrap();
    assert_eq!(executed.unwrap(), ITERATIONS);
    assert_eq!(secondary.last_info().iterations, ITERATIONS);
    assert_eq!(
        secondary.last_info().sim_time,
        Duration::from_millis(ITERATIONS)
    );
    let local = secondary.ecm().component_data::<JointVelocity>(joint).unwrap().0;
    assert!((local - velocity).abs() < 1e-12);
}

#[test]
fn cancelled_secondary_runner_returns_without_stepping() {
    let bus = LocalBus::new();
    let cancel = CancellationToken::new();
    let mut runner = SimulationRunner::new("idle", RunnerConfig::unthrottled(), cancel.clone())
        .with_network(NetworkSecondary::new(NetworkConfig::secondary(), bus.secondary(SECONDARY_ID)).into());
    let handle = thread::spawn(move || {
        let executed = runner.run(0);
        (executed, runner.last_info().iterations)
    });
    thread::sleep(Duration::from_millis(20));
    cancel.cancel();
    let (executed, iterations) = handle.join().unwrap();
    assert_eq!(executed.unwrap(), 0);
    assert_eq!(iterations, 0);
}
