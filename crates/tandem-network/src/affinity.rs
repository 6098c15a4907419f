//! Performer-to-secondary assignment.

use std::collections::{BTreeMap, BTreeSet};

use tandem_core::Entity;
use tandem_ecm::{Component, EntityComponentManager, PerformerAffinity, PerformerLevels};

use crate::message::Affinity;

/// Compute the first affinity assignment and record it on the primary.
///
/// Levels are taken in ascending entity order and handed to secondaries
/// round-robin, so every performer in a level lands on the same
/// secondary. Performers in no level continue the rotation one by one.
/// Each performer is assigned once; one in several levels goes with the
/// first.
///
/// Returns nothing if no secondaries are given or if any performer already
/// carries a [`PerformerAffinity`]: reassignment is not supported.
pub fn assign_affinities(ecm: &mut EntityComponentManager, secondaries: &[String]) -> Vec<Affinity> {
    if secondaries.is_empty() {
        return Vec::new();
    }

    let mut already_assigned = false;
    let mut unassigned: BTreeSet<Entity> = BTreeSet::new();
    let mut by_level: BTreeMap<Entity, BTreeSet<Entity>> = BTreeMap::new();
    ecm.scan::<(PerformerLevels,)>(|performer, (levels,)| {
        unassigned.insert(performer);
        for level in &levels.0 {
            by_level.entry(*level).or_default().insert(performer);
        }
        true
    });
    for performer in &unassigned {
        if ecm.entity_has_component_type(*performer, PerformerAffinity::TYPE_ID) {
            already_assigned = true;
            break;
        }
    }
    if already_assigned || unassigned.is_empty() {
        return Vec::new();
    }

    let mut out = Vec::new();
    let mut next = secondaries.iter().cycle();
    for performers in by_level.values() {
        let Some(prefix) = next.next() else { break };
        for performer in performers {
            if unassigned.remove(performer) {
                out.push(Affinity {
                    performer: *performer,
                    secondary_prefix: prefix.clone(),
                });
            }
        }
    }
    for performer in unassigned {
        let Some(prefix) = next.next() else { break };
        out.push(Affinity {
            performer,
            secondary_prefix: prefix.clone(),
        });
    }

    for affinity in &out {
        let record = PerformerAffinity(affinity.secondary_prefix.clone());
        if ecm.create_component(affinity.performer, record).is_ok() {
            tracing::info!(
                performer = %affinity.performer,
                secondary = %affinity.secondary_prefix,
                "assigned performer affinity"
            );
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn performer(ecm: &mut EntityComponentManager, levels: &[Entity]) -> Entity {
        let e = ecm.create_entity().unwrap();
        ecm.create_component(e, PerformerLevels(levels.iter().copied().collect()))
            .unwrap();
        e
    }

    fn prefixes(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn owner(out: &[Affinity], p: Entity) -> &str {
        &out.iter().find(|a| a.performer == p).unwrap().secondary_prefix
    }

    #[test]
    fn levels_round_robin_then_levelless_performers() {
        let mut ecm = EntityComponentManager::new();
        let l1 = Entity(100);
        let l2 = Entity(200);
        let l3 = Entity(300);
        let p1 = performer(&mut ecm, &[l1]);
        let p2 = performer(&mut ecm, &[l1]);
        let p3 = performer(&mut ecm, &[l2]);
        let p4 = performer(&mut ecm, &[l3]);
        let p5 = performer(&mut ecm, &[]);

        let out = assign_affinities(&mut ecm, &prefixes(&["s1", "s2"]));
        assert_eq!(out.len(), 5);
        assert_eq!(owner(&out, p1), "s1");
        assert_eq!(owner(&out, p2), "s1");
        assert_eq!(owner(&out, p3), "s2");
        assert_eq!(owner(&out, p4), "s1");
        assert_eq!(owner(&out, p5), "s2");

        assert_eq!(
            ecm.component_data::<PerformerAffinity>(p3),
            Some(PerformerAffinity("s2".into()))
        );
        assert!(ecm.has_component_type(PerformerAffinity::TYPE_ID));
    }

    #[test]
    fn performer_in_two_levels_is_assigned_once() {
        let mut ecm = EntityComponentManager::new();
        let p = performer(&mut ecm, &[Entity(1), Entity(2)]);
        let out = assign_affinities(&mut ecm, &prefixes(&["a", "b"]));
        assert_eq!(out.len(), 1);
        assert_eq!(owner(&out, p), "a");
    }

    #[test]
    fn only_first_assignment_is_made() {
        let mut ecm = EntityComponentManager::new();
        performer(&mut ecm, &[Entity(1)]);
        assert_eq!(assign_affinities(&mut ecm, &prefixes(&["a"])).len(), 1);
        performer(&mut ecm, &[Entity(2)]);
        assert!(assign_affinities(&mut ecm, &prefixes(&["a"])).is_empty());
    }

    #[test]
    fn nothing_to_do_without_secondaries_or_performers() {
        let mut ecm = EntityComponentManager::new();
        assert!(assign_affinities(&mut ecm, &prefixes(&["a"])).is_empty());
        performer(&mut ecm, &[]);
        assert!(assign_affinities(&mut ecm, &[]).is_empty());
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn every_performer_assigned_once_and_levels_stay_together(
                levels in prop::collection::vec(prop::option::of(0u64..5), 1..40),
                secondaries in 1usize..5,
            ) {
                let mut ecm = EntityComponentManager::new();
                let mut performers = Vec::new();
                for level in &levels {
                    let set: Vec<Entity> = level.iter().map(|l| Entity(1000 + l)).collect();
                    performers.push((performer(&mut ecm, &set), *level));
                }
                let names: Vec<String> = (0..secondaries).map(|i| format!("sec{i:05}")).collect();
                let out = assign_affinities(&mut ecm, &names);

                prop_assert_eq!(out.len(), performers.len());
                for (p, level) in &performers {
                    let prefix = owner(&out, *p);
                    prop_assert!(names.iter().any(|n| n == prefix));
                    if let Some(level) = level {
                        for (q, other) in &performers {
                            if other == &Some(*level) {
                                prop_assert_eq!(owner(&out, *q), prefix);
                            }
                        }
                    }
                }
            }
        }
    }
}
