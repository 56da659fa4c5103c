//! The static bodies one simulator keeps in the shared physics environment.

use super::{BodyHandle, PhysicsContext, PhysicsEnvironment};
use crate::collision::{CollisionRepresentation, CollisionSource, LocalCollision};
use crate::entity::EntityId;
use crate::float_types::Real;
use log::debug;
use nalgebra::Isometry3;

/// Which parts of a simulator's physics setup currently exist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Checklist {
    pub local_physics_created: bool,
    pub linked_physics_created: bool,
}

/// Static bodies for the five collision categories of one simulator.
#[derive(Debug, Clone, Default)]
pub struct SimulatorPhysics {
    pub local_world: Option<BodyHandle>,
    pub local_wall: Option<BodyHandle>,
    pub local_tube: Option<BodyHandle>,
    pub remote_world: Option<BodyHandle>,
    pub remote_props: Option<BodyHandle>,
    checklist: Checklist,
}

fn static_body(
    env: &mut dyn PhysicsEnvironment,
    representations: &[&CollisionRepresentation],
    position: &Isometry3<Real>,
    context: PhysicsContext,
    source: CollisionSource,
    owner: EntityId,
) -> Option<BodyHandle> {
    let shapes: Vec<_> = representations
        .iter()
        .filter_map(|r| r.merged().cloned())
        .collect();
    env.create_static_body(&shapes, position, context, source, owner)
}

impl SimulatorPhysics {
    pub const fn checklist(&self) -> Checklist {
        self.checklist
    }

    /// Create the local world (brushes and props), wall and tube bodies.
    ///
    /// Returns `false` without touching anything if they already exist.
    pub fn create_local(
        &mut self,
        env: &mut dyn PhysicsEnvironment,
        collision: &LocalCollision,
        context: PhysicsContext,
        owner: EntityId,
    ) -> bool {
        if self.checklist.local_physics_created {
            return false;
        }
        debug_assert!(collision.is_created(), "local physics needs local collision");
        let identity = Isometry3::identity();
        self.local_world = static_body(
            env,
            &[&collision.world, &collision.world_props],
            &identity,
            context,
            CollisionSource::LocalWorld,
            owner,
        );
        self.local_wall = static_body(
            env,
            &[&collision.wall],
            &identity,
            context,
            CollisionSource::LocalWall,
            owner,
        );
        self.local_tube = static_body(
            env,
            &[&collision.tube],
            &identity,
            context,
            CollisionSource::LocalTube,
            owner,
        );
        self.checklist.local_physics_created = true;
        debug!("local physics created in {context:?}");
        true
    }

    /// Create bodies mirroring the linked simulator's world and props, placed by
    /// `linked_to_this`.
    pub fn create_linked(
        &mut self,
        env: &mut dyn PhysicsEnvironment,
        linked: &LocalCollision,
        linked_to_this: &Isometry3<Real>,
        context: PhysicsContext,
        owner: EntityId,
    ) -> bool {
        if self.checklist.linked_physics_created {
            return false;
        }
        self.remote_world = static_body(
            env,
            &[&linked.world],
            linked_to_this,
            context,
            CollisionSource::RemoteWorld,
            owner,
        );
        self.remote_props = static_body(
            env,
            &[&linked.world_props],
            linked_to_this,
            context,
            CollisionSource::RemoteStaticProps,
            owner,
        );
        self.checklist.linked_physics_created = true;
        debug!("linked physics created in {context:?}");
        true
    }

    pub fn clear_local(&mut self, env: &mut dyn PhysicsEnvironment) {
        for body in [
            self.local_world.take(),
            self.local_wall.take(),
            self.local_tube.take(),
        ]
        .into_iter()
        .flatten()
        {
            env.destroy_body(body);
        }
        self.checklist.local_physics_created = false;
    }

    pub fn clear_linked(&mut self, env: &mut dyn PhysicsEnvironment) {
        for body in [self.remote_world.take(), self.remote_props.take()]
            .into_iter()
            .flatten()
        {
            env.destroy_body(body);
        }
        self.checklist.linked_physics_created = false;
    }

    pub fn clear_all(&mut self, env: &mut dyn PhysicsEnvironment) {
        self.clear_linked(env);
        self.clear_local(env);
    }

    /// Every live static body.
    pub fn bodies(&self) -> impl Iterator<Item = BodyHandle> + '_ {
        [
            self.local_world,
            self.local_wall,
            self.local_tube,
            self.remote_world,
            self.remote_props,
        ]
        .into_iter()
        .flatten()
    }
}
