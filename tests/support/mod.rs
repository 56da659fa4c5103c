//! Test support library
//! Level builders, a recording entity host and a recording callback sink.
#![allow(dead_code)]

use hashbrown::HashMap;
use nalgebra::{Isometry3, Point3, UnitQuaternion, Vector3};
use portalsim::{
    EntityBounds, EntityHost, EntityId, EntityKind, PortalWorld, RapierEnvironment,
    SimulatorCallbacks, SimulatorConfig, SimulatorHandle, StaticLevel,
    float_types::{PI, Real, parry3d::shape::SharedShape},
    physics::BodyHandle,
};
use std::cell::RefCell;
use std::rc::Rc;

/// Quick helper to compare floating-point results with an acceptable tolerance.
pub fn approx_eq(a: Real, b: Real, eps: Real) -> bool {
    (a - b).abs() < eps
}

pub fn points_close(a: &Point3<Real>, b: &Point3<Real>, eps: Real) -> bool {
    (a - b).norm() < eps
}

/// Rotation about +Z; `yaw(0.0)` faces +X, `yaw(PI)` faces -X.
pub fn yaw(angle: Real) -> UnitQuaternion<Real> {
    UnitQuaternion::from_axis_angle(&Vector3::z_axis(), angle)
}

/// Portal A sits at the origin facing +X, portal B at (1000, 0, 0) facing -X.
pub const B_ORIGIN: [Real; 3] = [1000.0, 0.0, 0.0];

/// A thick wall behind each portal, plus a 10-unit block 90 units in front of portal B.
pub fn two_room_level() -> StaticLevel {
    let mut level = StaticLevel::new();
    level.add_box(Point3::new(-16.0, -256.0, -256.0), Point3::new(0.0, 256.0, 256.0));
    level.add_box(
        Point3::new(1000.0, -256.0, -256.0),
        Point3::new(1016.0, 256.0, 256.0),
    );
    level.add_box(Point3::new(900.0, -20.0, -20.0), Point3::new(910.0, 20.0, 20.0));
    level
}

pub fn new_world() -> PortalWorld {
    PortalWorld::new(SimulatorConfig::default(), RapierEnvironment::default())
}

/// World with [`two_room_level`] loaded and the A/B pair placed and linked.
pub fn linked_world(host: &mut RecordingHost) -> (PortalWorld, SimulatorHandle, SimulatorHandle) {
    let mut world = new_world();
    world.load_level(Box::new(two_room_level()), host);
    let a = world.create_simulator();
    let b = world.create_simulator();
    world
        .move_to(a, Point3::origin(), yaw(0.0), host)
        .expect("place A");
    world
        .move_to(b, Point3::from(B_ORIGIN), yaw(PI), host)
        .expect("place B");
    world.attach_to(a, b, host).expect("link");
    (world, a, b)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Note {
    RulesChanged(EntityId),
    Teleported(EntityId),
    DropHold(EntityId, EntityId),
    ReacquireHold(EntityId, EntityId),
}

#[derive(Debug, Clone)]
pub struct TestEntity {
    pub kind: EntityKind,
    pub bounds: Option<EntityBounds>,
    pub body: Option<BodyHandle>,
    pub children: Vec<EntityId>,
    pub holder: Option<EntityId>,
    pub asleep: bool,
}

/// Entity host backed by a map, logging every notification it receives.
#[derive(Debug, Default)]
pub struct RecordingHost {
    pub entities: HashMap<EntityId, TestEntity>,
    pub log: Vec<Note>,
}

impl RecordingHost {
    /// Dynamic entity with an axis-aligned box and no physics body.
    pub fn add_box(&mut self, id: u64, center: Vector3<Real>, half_extents: Vector3<Real>) -> EntityId {
        let entity = EntityId(id);
        self.entities.insert(
            entity,
            TestEntity {
                kind: EntityKind::Dynamic,
                bounds: Some(EntityBounds::axis_aligned(center, half_extents)),
                body: None,
                children: Vec::new(),
                holder: None,
                asleep: false,
            },
        );
        entity
    }

    /// Dynamic entity with a matching rapier body in the default context.
    pub fn add_body(
        &mut self,
        physics: &mut RapierEnvironment,
        id: u64,
        center: Vector3<Real>,
        half_extents: Vector3<Real>,
    ) -> (EntityId, BodyHandle) {
        let entity = self.add_box(id, center, half_extents);
        let body = physics.add_dynamic_body(
            SharedShape::cuboid(half_extents.x, half_extents.y, half_extents.z),
            Isometry3::translation(center.x, center.y, center.z),
            entity,
        );
        if let Some(e) = self.entities.get_mut(&entity) {
            e.body = Some(body);
        }
        (entity, body)
    }

    pub fn set_kind(&mut self, entity: EntityId, kind: EntityKind) {
        if let Some(e) = self.entities.get_mut(&entity) {
            e.kind = kind;
        }
    }

    pub fn move_box(&mut self, entity: EntityId, center: Vector3<Real>) {
        if let Some(e) = self.entities.get_mut(&entity) {
            if let Some(bounds) = e.bounds.as_mut() {
                bounds.position = Isometry3::translation(center.x, center.y, center.z);
            }
        }
    }

    pub fn entity_mut(&mut self, entity: EntityId) -> &mut TestEntity {
        self.entities.get_mut(&entity).expect("known entity")
    }

    pub fn count(&self, note: Note) -> usize {
        self.log.iter().filter(|n| **n == note).count()
    }

    pub fn rules_changed(&self, entity: EntityId) -> usize {
        self.count(Note::RulesChanged(entity))
    }
}

impl EntityHost for RecordingHost {
    fn kind(&self, entity: EntityId) -> EntityKind {
        self.entities
            .get(&entity)
            .map_or(EntityKind::Missing, |e| e.kind)
    }

    fn bounds(&self, entity: EntityId) -> Option<EntityBounds> {
        self.entities.get(&entity).and_then(|e| e.bounds)
    }

    fn physics_body(&self, entity: EntityId) -> Option<BodyHandle> {
        self.entities.get(&entity).and_then(|e| e.body)
    }

    fn is_asleep(&self, entity: EntityId) -> bool {
        self.entities.get(&entity).is_some_and(|e| e.asleep)
    }

    fn children(&self, entity: EntityId) -> Vec<EntityId> {
        self.entities
            .get(&entity)
            .map(|e| e.children.clone())
            .unwrap_or_default()
    }

    fn holder(&self, entity: EntityId) -> Option<EntityId> {
        self.entities.get(&entity).and_then(|e| e.holder)
    }

    fn drop_hold(&mut self, holder: EntityId, entity: EntityId) {
        self.log.push(Note::DropHold(holder, entity));
    }

    fn reacquire_hold(&mut self, holder: EntityId, entity: EntityId) {
        self.log.push(Note::ReacquireHold(holder, entity));
    }

    fn collision_rules_changed(&mut self, entity: EntityId) {
        self.log.push(Note::RulesChanged(entity));
    }

    fn teleported(&mut self, entity: EntityId, _transform: &Isometry3<Real>) {
        self.log.push(Note::Teleported(entity));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Callback {
    Take(SimulatorHandle, EntityId),
    Release(SimulatorHandle, EntityId),
    TakePhysics(SimulatorHandle, EntityId),
    ReleasePhysics(SimulatorHandle, EntityId),
}

/// Callback sink whose log stays readable after the world takes ownership of it.
#[derive(Debug, Clone, Default)]
pub struct RecordingCallbacks(pub Rc<RefCell<Vec<Callback>>>);

impl RecordingCallbacks {
    pub fn events(&self) -> Vec<Callback> {
        self.0.borrow().clone()
    }

    pub fn count(&self, event: Callback) -> usize {
        self.0.borrow().iter().filter(|e| **e == event).count()
    }
}

impl SimulatorCallbacks for RecordingCallbacks {
    fn on_take_ownership(&mut self, simulator: SimulatorHandle, entity: EntityId) {
        self.0.borrow_mut().push(Callback::Take(simulator, entity));
    }

    fn on_release_ownership(&mut self, simulator: SimulatorHandle, entity: EntityId) {
        self.0.borrow_mut().push(Callback::Release(simulator, entity));
    }

    fn on_take_physics_ownership(&mut self, simulator: SimulatorHandle, entity: EntityId) {
        self.0.borrow_mut().push(Callback::TakePhysics(simulator, entity));
    }

    fn on_release_physics_ownership(&mut self, simulator: SimulatorHandle, entity: EntityId) {
        self.0
            .borrow_mut()
            .push(Callback::ReleasePhysics(simulator, entity));
    }
}
