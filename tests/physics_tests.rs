mod support;

use nalgebra::{Isometry3, Point3, Vector3};
use portalsim::{
    PhysicsEnvironment,
    float_types::{PI, Real, parry3d::shape::SharedShape},
    physics::PhysicsContext,
};
use support::{RecordingHost, linked_world, new_world, two_room_level, yaw};

const DT: Real = 1.0 / 60.0;

#[test]
fn static_bodies_follow_local_and_linked_collision() {
    let mut host = RecordingHost::default();
    let (mut world, a, b) = linked_world(&mut host);
    // A: wall, tube and B's block seen through the hole. B: its block, wall and tube.
    assert_eq!(world.stats(a).unwrap().static_bodies, 3);
    assert_eq!(world.stats(b).unwrap().static_bodies, 3);
    let bodies: Vec<_> = world.simulator(a).unwrap().physics().bodies().collect();
    assert!(bodies.iter().all(|body| world.physics().body_exists(*body)));
    assert!(
        bodies
            .iter()
            .all(|body| world.physics().body_context(*body).map(|(c, _)| c) == Some(a.context()))
    );

    let remote = world.simulator(a).unwrap().physics().remote_world.unwrap();
    world.detach_from_linked(a, &mut host).unwrap();
    assert_eq!(world.stats(a).unwrap().static_bodies, 2);
    assert!(world.simulator(a).unwrap().physics().remote_world.is_none());
    assert!(!world.physics().body_exists(remote));

    // Moving keeps the body count but rebuilds every body
    let before: Vec<_> = world.simulator(b).unwrap().physics().bodies().collect();
    world
        .move_to(b, Point3::new(1000.0, 0.0, 20.0), yaw(PI), &mut host)
        .unwrap();
    assert_eq!(world.stats(b).unwrap().static_bodies, 3);
    assert!(before.iter().all(|body| !world.physics().body_exists(*body)));
}

#[test]
fn unplaced_or_disabled_simulators_have_no_bodies() {
    let mut host = RecordingHost::default();
    let mut world = new_world();
    world.load_level(Box::new(two_room_level()), &mut host);
    let sim = world.create_simulator();
    assert_eq!(world.stats(sim).unwrap().static_bodies, 0);

    world.set_physics_simulation_enabled(sim, false, &mut host).unwrap();
    world
        .move_to(sim, Point3::origin(), yaw(0.0), &mut host)
        .unwrap();
    assert_eq!(world.stats(sim).unwrap().static_bodies, 0);

    world.set_physics_simulation_enabled(sim, true, &mut host).unwrap();
    assert_eq!(world.stats(sim).unwrap().static_bodies, 2);
    assert_eq!(world.physics().body_count(), 2);

    world.unload_level(&mut host);
    assert_eq!(world.stats(sim).unwrap().static_bodies, 0);
    assert_eq!(world.physics().body_count(), 0);
}

#[test]
fn portal_owned_bodies_ignore_level_geometry() {
    let mut host = RecordingHost::default();
    let mut world = new_world();
    let floor = world.physics_mut().add_level_collider(
        SharedShape::cuboid(100.0, 100.0, 1.0),
        Isometry3::translation(3000.0, 0.0, -1.0),
    );
    let half = Vector3::new(1.0, 1.0, 1.0);
    let (resting, resting_body) =
        host.add_body(world.physics_mut(), 1, Vector3::new(3000.0, 0.0, 3.0), half);
    let (falling, falling_body) =
        host.add_body(world.physics_mut(), 2, Vector3::new(3010.0, 0.0, 3.0), half);

    let portal = world.create_simulator();
    world
        .move_to(portal, Point3::new(0.0, 500.0, 0.0), yaw(0.0), &mut host)
        .unwrap();
    assert_eq!(world.take_ownership_of_entity(portal, falling, &mut host), Ok(true));
    assert_eq!(
        world.physics().body_context(falling_body),
        Some((portal.context(), false))
    );
    assert_eq!(
        world.physics().body_context(resting_body),
        Some((PhysicsContext::Default, false))
    );
    assert_eq!(world.owner_of(resting), None);

    for _ in 0..60 {
        world.pre_phys_frame(&mut host);
        world.physics_mut().step(DT);
    }
    let rest_z = world.physics().position(resting_body).unwrap().translation.vector.z;
    let fall_z = world.physics().position(falling_body).unwrap().translation.vector.z;
    assert!(rest_z > 0.5, "default-context body sank to {rest_z}");
    assert!(fall_z < -1.0, "portal-owned body stopped at {fall_z}");
    assert!(world.physics().body_exists(floor));
}

#[test]
fn simulators_without_static_bodies_leave_bodies_in_the_default_context() {
    let mut host = RecordingHost::default();
    let mut world = new_world();
    world.physics_mut().add_level_collider(
        SharedShape::cuboid(100.0, 100.0, 1.0),
        Isometry3::translation(0.0, 0.0, -1.0),
    );
    let (e, body) = host.add_body(
        world.physics_mut(),
        1,
        Vector3::new(0.0, 0.0, 2.0),
        Vector3::new(1.0, 1.0, 1.0),
    );

    let sim = world.create_simulator();
    assert_eq!(world.take_ownership_of_entity(sim, e, &mut host), Ok(true));
    assert!(!world.simulator(sim).unwrap().owned(e).unwrap().owns_physics);
    assert_eq!(
        world.physics().body_context(body),
        Some((PhysicsContext::Default, false))
    );
    for _ in 0..120 {
        world.pre_phys_frame(&mut host);
        world.physics_mut().step(DT);
    }
    let z = world.physics().position(body).unwrap().translation.vector.z;
    assert!(z > 0.5, "body owned by an unplaced simulator sank to {z}");

    // Placing the simulator creates its bodies and picks the entity up
    world
        .move_to(sim, Point3::new(0.0, 500.0, 0.0), yaw(0.0), &mut host)
        .unwrap();
    assert!(world.simulator(sim).unwrap().owned(e).unwrap().owns_physics);
    assert_eq!(world.physics().body_context(body), Some((sim.context(), false)));

    world.unload_level(&mut host);
    assert_eq!(world.owner_of(e), Some(sim));
    assert!(!world.simulator(sim).unwrap().owned(e).unwrap().owns_physics);
    assert_eq!(
        world.physics().body_context(body),
        Some((PhysicsContext::Default, false))
    );
}
