//! Integration test: entity lifecycle across simulated step boundaries.
//!
//! Drives the manager the way the runner does (mutations during a step,
//! then compaction, view advance and change reset at the boundary) and
//! checks what each iteration flavor and state extraction observe.

use tandem_ecm::{
    Component, ComponentTypeId, EcmError, Entity, EntityComponentManager, EntityKind, Name,
    ParentEntity, StateDelta,
};

// ── Fixtures ────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq)]
struct Charge(f64);

impl Component for Charge {
    const NAME: &'static str = "it.Charge";
}

#[derive(Clone, Debug, PartialEq)]
struct Tag;

impl Component for Tag {
    const NAME: &'static str = "it.Tag";
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// What the runner does between two steps.
fn boundary(ecm: &mut EntityComponentManager) {
    ecm.process_remove_entity_requests();
    ecm.advance_views();
    ecm.set_all_components_unchanged();
}

fn new_charged(ecm: &mut EntityComponentManager) -> Vec<Entity> {
    let mut seen = Vec::new();
    ecm.each_new::<(Charge,)>(|e, _| {
        seen.push(e);
        true
    });
    seen
}

// ── Tests ───────────────────────────────────────────────────────────

#[test]
fn new_entities_show_up_exactly_one_step_later() {
    init_tracing();
    let mut ecm = EntityComponentManager::new();
    assert!(new_charged(&mut ecm).is_empty());

    let a = ecm.create_entity().unwrap();
    ecm.create_component(a, Charge(1.0)).unwrap();
    assert!(new_charged(&mut ecm).is_empty());
    boundary(&mut ecm);

    let b = ecm.create_entity().unwrap();
    ecm.create_component(b, Charge(2.0)).unwrap();
    assert_eq!(new_charged(&mut ecm), vec![a]);
    boundary(&mut ecm);

    assert_eq!(new_charged(&mut ecm), vec![b]);
    boundary(&mut ecm);

    assert!(new_charged(&mut ecm).is_empty());
}

#[test]
fn removed_entities_are_visible_until_the_boundary() {
    init_tracing();
    let mut ecm = EntityComponentManager::new();
    let doomed = ecm.create_entity().unwrap();
    ecm.create_component(doomed, Charge(3.0)).unwrap();
    ecm.create_component(doomed, Tag).unwrap();
    boundary(&mut ecm);

    ecm.request_remove_entity(doomed, false);

    let mut removed = Vec::new();
    ecm.each_removed::<(Charge, Tag)>(|e, (c, _)| {
        removed.push((e, c.0));
        true
    });
    assert_eq!(removed, vec![(doomed, 3.0)]);

    // Ordinary iteration still sees it this step.
    let mut all = 0;
    ecm.each::<(Charge,)>(|_, _| {
        all += 1;
        true
    });
    assert_eq!(all, 1);

    boundary(&mut ecm);
    assert!(!ecm.has_entity(doomed));
    let mut removed_after = 0;
    ecm.each_removed::<(Charge,)>(|_, _| {
        removed_after += 1;
        true
    });
    assert_eq!(removed_after, 0);
    assert_eq!(ecm.component_count(Charge::TYPE_ID), 0);
}

#[test]
fn created_and_removed_in_same_step_is_never_new() {
    let mut ecm = EntityComponentManager::new();
    new_charged(&mut ecm);
    let e = ecm.create_entity().unwrap();
    ecm.create_component(e, Charge(0.0)).unwrap();
    ecm.request_remove_entity(e, false);
    boundary(&mut ecm);
    assert!(new_charged(&mut ecm).is_empty());
}

#[test]
fn recursive_removal_of_a_model_subtree() {
    let mut ecm = EntityComponentManager::new();
    let world = ecm.create_entity().unwrap();
    ecm.create_component(world, EntityKind::World).unwrap();
    let model = ecm.create_entity().unwrap();
    ecm.create_component(model, EntityKind::Model).unwrap();
    ecm.create_component(model, ParentEntity(world)).unwrap();
    let links: Vec<Entity> = (0..3)
        .map(|i| {
            let l = ecm.create_entity().unwrap();
            ecm.create_component(l, Name(format!("link{i}"))).unwrap();
            ecm.create_component(l, ParentEntity(model)).unwrap();
            l
        })
        .collect();

    ecm.request_remove_entity(model, true);
    boundary(&mut ecm);

    assert!(ecm.has_entity(world));
    assert!(!ecm.has_entity(model));
    for l in links {
        assert!(!ecm.has_entity(l));
    }
    assert_eq!(ecm.entity_count(), 1);
    assert_eq!(ecm.component_count(Name::TYPE_ID), 0);
}

#[test]
fn remove_all_then_repopulate() {
    let mut ecm = EntityComponentManager::new();
    for _ in 0..4 {
        let e = ecm.create_entity().unwrap();
        ecm.create_component(e, Tag).unwrap();
    }
    ecm.request_remove_entities();
    boundary(&mut ecm);
    assert_eq!(ecm.entity_count(), 0);

    let e = ecm.create_entity().unwrap();
    assert_eq!(e, Entity(4));
    ecm.create_component(e, Tag).unwrap();
    assert_eq!(ecm.component_count(Tag::TYPE_ID), 1);
}

#[test]
fn deltas_move_only_what_changed_between_boundaries() {
    init_tracing();
    let mut secondary = EntityComponentManager::new();
    let mut primary = EntityComponentManager::new();

    let e = secondary.create_entity().unwrap();
    secondary.create_component(e, Charge(0.0)).unwrap();
    secondary.create_component(e, Name::from("cell")).unwrap();
    primary.set_state(secondary.state([e], true));
    boundary(&mut secondary);

    for step in 1..=3 {
        secondary.set_component_data(e, Charge(step as f64));
        let delta: StateDelta = secondary.state([e], false);
        assert_eq!(delta.len(), 1);
        assert_eq!(primary.set_state(delta), 1);
        boundary(&mut secondary);
        assert_eq!(primary.component_data::<Charge>(e), Some(Charge(step as f64)));
        assert_eq!(
            primary.component_data::<Name>(e),
            Some(Name::from("cell"))
        );
    }
}

#[test]
fn mismatched_delta_entries_are_skipped() {
    init_tracing();
    let mut ecm = EntityComponentManager::new();
    let e = ecm.create_entity().unwrap();
    let err = ecm
        .create_component_erased(e, ComponentTypeId::from_name("it.Charge"), Box::new(Tag))
        .unwrap_err();
    assert!(matches!(err, EcmError::TypeMismatch { .. }));
    assert!(ecm.component_types(e).is_empty());
}
