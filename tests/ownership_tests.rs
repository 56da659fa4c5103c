mod support;

use nalgebra::{Point3, Vector3};
use portalsim::{
    EntityId, EntityKind, PhysicsEnvironment, PortalError, float_types::Real,
    physics::PhysicsContext,
};
use support::{Callback, Note, RecordingCallbacks, RecordingHost, linked_world, new_world, yaw};

fn half() -> Vector3<Real> {
    Vector3::new(4.0, 4.0, 4.0)
}

#[test]
fn fresh_simulator_is_unlinked_and_has_no_hole() {
    let mut host = RecordingHost::default();
    let mut world = new_world();
    let sim = world.create_simulator();
    let inside = host.add_box(1, Vector3::zeros(), half());
    assert_eq!(world.linked_portal_simulator(sim), None);
    assert!(!world.entity_is_in_portal_hole(sim, inside, &host));
    assert!(world.owned_entities(sim).is_empty());
    assert!(world.is_simulating_physics(sim));
    assert_eq!(world.take_ownership_of_entity(sim, inside, &mut host), Ok(true));
    assert!(!world.simulator(sim).unwrap().owned(inside).unwrap().in_hole);
}

#[test]
fn taking_over_releases_the_previous_owner_once() {
    let mut host = RecordingHost::default();
    let (mut world, x, y) = linked_world(&mut host);
    let callbacks = RecordingCallbacks::default();
    world.set_callbacks(Box::new(callbacks.clone()));
    let e = host.add_box(1, Vector3::new(20.0, 0.0, 0.0), half());

    assert_eq!(world.take_ownership_of_entity(x, e, &mut host), Ok(true));
    assert_eq!(world.owner_of(e), Some(x));
    assert_eq!(world.take_ownership_of_entity(y, e, &mut host), Ok(true));

    assert_eq!(world.owner_of(e), Some(y));
    assert_eq!(world.owned_entities(y), vec![e]);
    assert!(world.owned_entities(x).is_empty());
    assert!(world.simulator(x).unwrap().owned(e).is_none());
    assert_eq!(callbacks.count(Callback::Release(x, e)), 1);
    assert_eq!(callbacks.count(Callback::Take(y, e)), 1);
    assert_eq!(
        callbacks.events(),
        vec![
            Callback::Take(x, e),
            Callback::Release(x, e),
            Callback::Take(y, e)
        ]
    );
}

#[test]
fn retaking_and_foreign_release_are_no_ops() {
    let mut host = RecordingHost::default();
    let (mut world, a, b) = linked_world(&mut host);
    let callbacks = RecordingCallbacks::default();
    world.set_callbacks(Box::new(callbacks.clone()));
    let e = host.add_box(1, Vector3::new(20.0, 0.0, 0.0), half());

    assert_eq!(world.take_ownership_of_entity(a, e, &mut host), Ok(true));
    assert_eq!(world.take_ownership_of_entity(a, e, &mut host), Ok(false));
    assert_eq!(world.release_ownership_of_entity(b, e, &mut host), Ok(false));
    assert_eq!(world.owner_of(e), Some(a));
    assert_eq!(callbacks.events(), vec![Callback::Take(a, e)]);

    assert_eq!(world.release_ownership_of_entity(a, e, &mut host), Ok(true));
    assert_eq!(world.owner_of(e), None);
    assert_eq!(world.release_ownership_of_entity(a, e, &mut host), Ok(false));
}

#[test]
fn world_geometry_and_vehicles_are_never_owned() {
    let mut host = RecordingHost::default();
    let (mut world, a, _) = linked_world(&mut host);
    let wall = host.add_box(1, Vector3::zeros(), half());
    let car = host.add_box(2, Vector3::zeros(), half());
    host.set_kind(wall, EntityKind::World);
    host.set_kind(car, EntityKind::Vehicle);

    assert_eq!(world.take_ownership_of_entity(a, wall, &mut host), Ok(false));
    assert_eq!(world.take_ownership_of_entity(a, car, &mut host), Ok(false));
    assert_eq!(
        world.take_ownership_of_entity(a, EntityId(404), &mut host),
        Err(PortalError::UnknownEntity(EntityId(404)))
    );
    assert!(world.owned_entities(a).is_empty());
}

#[test]
fn children_follow_their_parent() {
    let mut host = RecordingHost::default();
    let (mut world, a, b) = linked_world(&mut host);
    let parent = host.add_box(1, Vector3::new(20.0, 0.0, 0.0), half());
    let child = host.add_box(2, Vector3::new(20.0, 0.0, 10.0), half());
    host.entity_mut(parent).children.push(child);

    world.take_ownership_of_entity(b, child, &mut host).unwrap();
    world.take_ownership_of_entity(a, parent, &mut host).unwrap();
    assert_eq!(world.owner_of(parent), Some(a));
    assert_eq!(world.owner_of(child), Some(a));
    assert!(world.owned_entities(b).is_empty());

    world.release_ownership_of_entity(a, parent, &mut host).unwrap();
    assert_eq!(world.owner_of(child), None);
}

#[test]
fn every_entity_has_at_most_one_owner() {
    let mut host = RecordingHost::default();
    let (mut world, a, b) = linked_world(&mut host);
    let entities: Vec<EntityId> = (1..=6)
        .map(|i| host.add_box(i, Vector3::new(10.0 * i as f64, 0.0, 0.0), half()))
        .collect();
    for (i, e) in entities.iter().enumerate() {
        let sim = if i % 2 == 0 { a } else { b };
        world.take_ownership_of_entity(sim, *e, &mut host).unwrap();
    }
    for e in &entities[..3] {
        world.take_ownership_of_entity(b, *e, &mut host).unwrap();
    }
    for e in &entities {
        let owners = [a, b]
            .iter()
            .filter(|s| world.owned_entities(**s).contains(e))
            .count();
        assert_eq!(owners, 1);
    }
    assert_eq!(world.owned_entities(a), vec![entities[4]]);
}

#[test]
fn physics_ownership_clones_into_the_linked_simulator() {
    let mut host = RecordingHost::default();
    let (mut world, a, b) = linked_world(&mut host);
    let callbacks = RecordingCallbacks::default();
    world.set_callbacks(Box::new(callbacks.clone()));
    let (e, body) = host.add_body(world.physics_mut(), 1, Vector3::new(20.0, 0.0, 0.0), half());

    world.take_ownership_of_entity(a, e, &mut host).unwrap();
    let state = *world.simulator(a).unwrap().owned(e).unwrap();
    assert!(state.owns_physics);
    assert!(state.cloned_from_main);
    assert_eq!(
        world.physics().body_context(body),
        Some((a.context(), false))
    );
    assert_eq!(callbacks.count(Callback::TakePhysics(a, e)), 1);
    assert!(host.rules_changed(e) >= 1);

    let clones = world.shadow_clones_of(b);
    assert_eq!(clones.len(), 1);
    assert_eq!(clones[0].entity, e);
    assert_eq!(clones[0].source, a);
    assert!(world.physics().body_exists(clones[0].body));
    // The clone sits where the entity appears on the other side
    let expected = world.transform_through_portal(a, &world.physics().position(body).unwrap()).unwrap();
    let actual = world.physics().position(clones[0].body).unwrap();
    assert!((expected.translation.vector - actual.translation.vector).norm() < 1e-9);

    world.release_physics_ownership(a, e, &mut host).unwrap();
    assert!(world.shadow_clones_of(b).is_empty());
    assert!(!world.physics().body_exists(clones[0].body));
    assert_eq!(
        world.physics().body_context(body),
        Some((PhysicsContext::Default, false))
    );
    assert_eq!(world.owner_of(e), Some(a));
    assert_eq!(callbacks.count(Callback::ReleasePhysics(a, e)), 1);
}

#[test]
fn clones_are_unique_per_entity_and_target() {
    let mut host = RecordingHost::default();
    let (mut world, a, b) = linked_world(&mut host);
    let (e, _) = host.add_body(world.physics_mut(), 1, Vector3::new(20.0, 0.0, 0.0), half());
    world.take_ownership_of_entity(a, e, &mut host).unwrap();

    // Re-placing and re-enabling rebuild clones without duplicating them
    world
        .move_to(a, Point3::new(0.0, 0.0, 1.0), yaw(0.0), &mut host)
        .unwrap();
    world.set_physics_simulation_enabled(b, false, &mut host).unwrap();
    assert!(world.shadow_clones_of(b).is_empty());
    world.set_physics_simulation_enabled(b, true, &mut host).unwrap();
    assert_eq!(world.shadow_clones_of(b).len(), 1);
    world.attach_to(a, b, &mut host).unwrap();
    assert_eq!(world.shadow_clones_of(b).len(), 1);
    assert!(world.shadow_clones_of(a).is_empty());
}

#[test]
fn detaching_removes_every_clone_on_both_sides() {
    let mut host = RecordingHost::default();
    let (mut world, a, b) = linked_world(&mut host);
    let (near_a, _) = host.add_body(world.physics_mut(), 1, Vector3::new(20.0, 0.0, 0.0), half());
    let (near_b, _) = host.add_body(world.physics_mut(), 2, Vector3::new(980.0, 0.0, 0.0), half());
    world.take_ownership_of_entity(a, near_a, &mut host).unwrap();
    world.take_ownership_of_entity(b, near_b, &mut host).unwrap();

    let clone_bodies: Vec<_> = world
        .shadow_clones_of(a)
        .into_iter()
        .chain(world.shadow_clones_of(b))
        .map(|c| c.body)
        .collect();
    assert_eq!(clone_bodies.len(), 2);

    world.detach_from_linked(a, &mut host).unwrap();
    assert!(world.shadow_clones_of(a).is_empty());
    assert!(world.shadow_clones_of(b).is_empty());
    assert!(clone_bodies.iter().all(|b| !world.physics().body_exists(*b)));
    assert!(!world.simulator(a).unwrap().owned(near_a).unwrap().cloned_from_main);
    assert!(!world.simulator(b).unwrap().owned(near_b).unwrap().cloned_from_main);
    // Ownership itself survives the detach
    assert_eq!(world.owner_of(near_a), Some(a));
    assert_eq!(world.owner_of(near_b), Some(b));
}

#[test]
fn held_entities_are_dropped_around_clone_changes() {
    let mut host = RecordingHost::default();
    let (mut world, a, _) = linked_world(&mut host);
    let player = host.add_box(9, Vector3::new(40.0, 0.0, 0.0), half());
    host.set_kind(player, EntityKind::Vehicle);
    let (crate_box, _) = host.add_body(world.physics_mut(), 1, Vector3::new(20.0, 0.0, 0.0), half());
    host.entity_mut(crate_box).holder = Some(player);

    world.take_ownership_of_entity(a, crate_box, &mut host).unwrap();
    world.release_ownership_of_entity(a, crate_box, &mut host).unwrap();

    let holds: Vec<_> = host
        .log
        .iter()
        .filter(|n| matches!(n, Note::DropHold(..) | Note::ReacquireHold(..)))
        .copied()
        .collect();
    assert_eq!(
        holds,
        vec![
            Note::DropHold(player, crate_box),
            Note::ReacquireHold(player, crate_box),
            Note::DropHold(player, crate_box),
            Note::ReacquireHold(player, crate_box),
        ]
    );
}

#[test]
fn in_hole_state_is_stable_while_nothing_moves() {
    let mut host = RecordingHost::default();
    let (mut world, a, _) = linked_world(&mut host);
    let (e, body) = host.add_body(world.physics_mut(), 1, Vector3::new(2.0, 0.0, 0.0), half());
    world.take_ownership_of_entity(a, e, &mut host).unwrap();
    assert!(world.entity_is_in_portal_hole(a, e, &host));
    assert!(world.simulator(a).unwrap().owned(e).unwrap().in_hole);

    let notes = host.rules_changed(e);
    for _ in 0..3 {
        world.pre_phys_frame(&mut host);
    }
    assert_eq!(host.rules_changed(e), notes);
    assert!(world.simulator(a).unwrap().owned(e).unwrap().in_hole);
    assert_eq!(world.physics().body_context(body), Some((a.context(), true)));
}

#[test]
fn entering_the_hole_updates_body_and_clones() {
    let mut host = RecordingHost::default();
    let (mut world, a, _) = linked_world(&mut host);
    let (e, body) = host.add_body(world.physics_mut(), 1, Vector3::new(40.0, 0.0, 0.0), half());
    world.take_ownership_of_entity(a, e, &mut host).unwrap();
    assert!(!world.simulator(a).unwrap().owned(e).unwrap().in_hole);

    let notes = host.rules_changed(e);
    host.move_box(e, Vector3::new(1.0, 0.0, 0.0));
    world.pre_phys_frame(&mut host);
    assert!(world.simulator(a).unwrap().owned(e).unwrap().in_hole);
    assert_eq!(host.rules_changed(e), notes + 1);
    assert_eq!(world.physics().body_context(body), Some((a.context(), true)));

    // Sleeping entities keep their last state
    host.move_box(e, Vector3::new(40.0, 0.0, 0.0));
    host.entity_mut(e).asleep = true;
    world.pre_phys_frame(&mut host);
    assert!(world.simulator(a).unwrap().owned(e).unwrap().in_hole);
}

#[test]
fn post_phys_frame_returns_strays_to_the_default_context() {
    let mut host = RecordingHost::default();
    let (mut world, a, _) = linked_world(&mut host);
    let (e, body) = host.add_body(world.physics_mut(), 1, Vector3::new(20.0, 0.0, 0.0), half());
    let gone = host.add_box(2, Vector3::new(20.0, 10.0, 0.0), half());
    world.take_ownership_of_entity(a, e, &mut host).unwrap();
    world.take_ownership_of_entity(a, gone, &mut host).unwrap();

    world.post_phys_frame(&mut host);
    assert_eq!(world.owned_entities(a), vec![e, gone]);

    host.entities.remove(&gone);
    host.move_box(e, Vector3::new(5000.0, 0.0, 0.0));
    world.post_phys_frame(&mut host);
    assert!(world.owned_entities(a).is_empty());
    assert_eq!(
        world.physics().body_context(body),
        Some((PhysicsContext::Default, false))
    );
}

#[test]
fn post_phys_frame_repairs_drifted_contexts() {
    let mut host = RecordingHost::default();
    let (mut world, a, _) = linked_world(&mut host);
    let (e, body) = host.add_body(world.physics_mut(), 1, Vector3::new(20.0, 0.0, 0.0), half());
    world.take_ownership_of_entity(a, e, &mut host).unwrap();
    world
        .physics_mut()
        .set_body_context(body, PhysicsContext::Default, false);

    world.post_phys_frame(&mut host);
    assert_eq!(world.physics().body_context(body), Some((a.context(), false)));
}

#[test]
fn disabling_physics_keeps_ownership_but_not_bodies() {
    let mut host = RecordingHost::default();
    let (mut world, a, b) = linked_world(&mut host);
    let (e, body) = host.add_body(world.physics_mut(), 1, Vector3::new(20.0, 0.0, 0.0), half());
    world.take_ownership_of_entity(a, e, &mut host).unwrap();
    assert!(world.stats(a).unwrap().static_bodies > 0);

    world.set_physics_simulation_enabled(a, false, &mut host).unwrap();
    assert!(!world.is_simulating_physics(a));
    assert_eq!(world.stats(a).unwrap().static_bodies, 0);
    assert_eq!(world.owner_of(e), Some(a));
    assert!(!world.simulator(a).unwrap().owned(e).unwrap().owns_physics);
    assert_eq!(
        world.physics().body_context(body),
        Some((PhysicsContext::Default, false))
    );
    assert!(world.shadow_clones_of(b).is_empty());

    world.set_physics_simulation_enabled(a, true, &mut host).unwrap();
    assert!(world.simulator(a).unwrap().owned(e).unwrap().owns_physics);
    assert_eq!(world.physics().body_context(body), Some((a.context(), false)));
    assert_eq!(world.shadow_clones_of(b).len(), 1);
}

#[test]
fn teleport_hands_the_entity_to_the_linked_simulator() {
    let mut host = RecordingHost::default();
    let (mut world, a, b) = linked_world(&mut host);
    let (e, body) = host.add_body(world.physics_mut(), 1, Vector3::new(2.0, 0.0, 0.0), half());
    world
        .physics_mut()
        .set_velocity(body, Vector3::new(-10.0, 0.0, 0.0), Vector3::zeros());
    world.take_ownership_of_entity(a, e, &mut host).unwrap();

    assert_eq!(world.teleport_entity(a, e, &mut host), Ok(true));
    assert_eq!(world.owner_of(e), Some(b));
    assert_eq!(host.count(Note::Teleported(e)), 1);
    // Two units in front of A maps to two units behind B, still heading out of B's front
    let position = world.physics().position(body).unwrap();
    assert!((position.translation.vector - Vector3::new(1002.0, 0.0, 0.0)).norm() < 1e-9);
    let (linear, _) = world.physics().velocity(body).unwrap();
    assert!((linear - Vector3::new(-10.0, 0.0, 0.0)).norm() < 1e-9);
    assert_eq!(world.shadow_clones_of(a).len(), 1);
    assert!(world.shadow_clones_of(b).is_empty());
}

#[test]
fn destroy_and_shutdown_release_everything() {
    let mut host = RecordingHost::default();
    let (mut world, a, b) = linked_world(&mut host);
    let callbacks = RecordingCallbacks::default();
    world.set_callbacks(Box::new(callbacks.clone()));
    let (e1, _) = host.add_body(world.physics_mut(), 1, Vector3::new(20.0, 0.0, 0.0), half());
    let (e2, _) = host.add_body(world.physics_mut(), 2, Vector3::new(980.0, 0.0, 0.0), half());
    world.take_ownership_of_entity(a, e1, &mut host).unwrap();
    world.take_ownership_of_entity(b, e2, &mut host).unwrap();

    world.destroy_simulator(a, &mut host).unwrap();
    assert_eq!(world.owner_of(e1), None);
    assert_eq!(world.linked_portal_simulator(b), None);
    assert!(world.shadow_clones_of(b).is_empty());
    assert_eq!(callbacks.count(Callback::Release(a, e1)), 1);

    world.shutdown(&mut host);
    assert_eq!(world.owner_of(e2), None);
    assert!(world.simulators().is_empty());
    assert!(world.cache().is_empty());
    // Only the two entity bodies remain in the physics world
    assert_eq!(world.physics().body_count(), 2);
}
