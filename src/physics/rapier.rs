//! [`PhysicsEnvironment`] on top of rapier.
//!
//! Every body and collider created through the environment carries a packed tag in its
//! `user_data`; a [`PhysicsHooks`] contact filter reads the tags to keep simulator
//! contexts apart. Colliders the host creates itself have `user_data == 0` and count as
//! level geometry, or as a default-context mover when attached to a dynamic body.

use super::{BodyHandle, PhysicsContext, PhysicsEnvironment};
use crate::collision::CollisionSource;
use crate::entity::EntityId;
use crate::float_types::{
    Real,
    rapier3d::prelude::{
        ActiveHooks, CCDSolver, ColliderBuilder, ColliderSet, DefaultBroadPhase, ImpulseJointSet,
        IntegrationParameters, InteractionGroups, IslandManager, MultibodyJointSet, NarrowPhase,
        PairFilterContext, PhysicsHooks, PhysicsPipeline, QueryPipeline, RigidBodyBuilder,
        RigidBodyHandle, RigidBodySet, SharedShape, SolverFlags,
    },
};
use log::{debug, trace};
use nalgebra::{Isometry3, Vector3};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Level = 0,
    LocalWorld = 1,
    LocalWall = 2,
    LocalTube = 3,
    RemoteWorld = 4,
    RemoteStaticProps = 5,
    Mover = 6,
    Shadow = 7,
}

impl Role {
    fn from_bits(bits: u8) -> Self {
        match bits {
            1 => Role::LocalWorld,
            2 => Role::LocalWall,
            3 => Role::LocalTube,
            4 => Role::RemoteWorld,
            5 => Role::RemoteStaticProps,
            6 => Role::Mover,
            7 => Role::Shadow,
            _ => Role::Level,
        }
    }

    fn from_source(source: CollisionSource) -> Self {
        match source {
            CollisionSource::LocalWorld => Role::LocalWorld,
            CollisionSource::LocalWall => Role::LocalWall,
            CollisionSource::LocalTube => Role::LocalTube,
            CollisionSource::RemoteWorld => Role::RemoteWorld,
            CollisionSource::RemoteStaticProps => Role::RemoteStaticProps,
        }
    }
}

/// Packed `user_data`: role in bits 0..8, in-hole in bit 8, context tag in bits 32..64
/// and the owning entity in bits 64..128.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Tag {
    role: Role,
    in_hole: bool,
    context: PhysicsContext,
    owner: u64,
}

impl Tag {
    fn encode(self) -> u128 {
        (self.role as u128)
            | ((self.in_hole as u128) << 8)
            | ((self.context.tag() as u128) << 32)
            | ((self.owner as u128) << 64)
    }

    fn decode(data: u128) -> Self {
        Tag {
            role: Role::from_bits((data & 0xff) as u8),
            in_hole: (data >> 8) & 1 == 1,
            context: PhysicsContext::from_tag(((data >> 32) & 0xffff_ffff) as u32),
            owner: (data >> 64) as u64,
        }
    }
}

/// Contact rules between two tagged colliders.
fn pair_allowed(a: Tag, b: Tag) -> bool {
    use Role::*;
    let is_static = |r: Role| !matches!(r, Mover | Shadow);
    match (a.role, b.role) {
        (Mover, Mover) => true,
        (Shadow, Shadow) => false,
        (Shadow, Mover) | (Mover, Shadow) => a.context == b.context,
        (Shadow, _) | (_, Shadow) => false,
        (Mover, s) => mover_meets_static(a, s, b.context),
        (s, Mover) => mover_meets_static(b, s, a.context),
        (x, y) => {
            debug_assert!(is_static(x) && is_static(y));
            false
        },
    }
}

fn mover_meets_static(mover: Tag, role: Role, context: PhysicsContext) -> bool {
    match role {
        Role::Level => mover.context == PhysicsContext::Default,
        Role::LocalWorld | Role::LocalWall | Role::LocalTube => mover.context == context,
        Role::RemoteWorld | Role::RemoteStaticProps => mover.context == context && mover.in_hole,
        Role::Mover | Role::Shadow => false,
    }
}

/// Contact filter enforcing the simulator context rules.
#[derive(Debug, Default, Clone, Copy)]
pub struct ContextFilter;

impl ContextFilter {
    fn effective_tag(context: &PairFilterContext, collider: usize) -> Tag {
        let (handle, body) = if collider == 1 {
            (context.collider1, context.rigid_body1)
        } else {
            (context.collider2, context.rigid_body2)
        };
        let mut tag = Tag::decode(context.colliders[handle].user_data);
        if tag.role == Role::Level && body.is_some_and(|b| context.bodies[b].is_dynamic()) {
            tag.role = Role::Mover;
        }
        tag
    }
}

impl PhysicsHooks for ContextFilter {
    fn filter_contact_pair(&self, context: &PairFilterContext) -> Option<SolverFlags> {
        let a = Self::effective_tag(context, 1);
        let b = Self::effective_tag(context, 2);
        pair_allowed(a, b).then_some(SolverFlags::COMPUTE_IMPULSES)
    }
}

fn to_rapier(handle: BodyHandle) -> RigidBodyHandle {
    RigidBodyHandle::from_raw_parts(handle.index, handle.generation)
}

fn from_rapier(handle: RigidBodyHandle) -> BodyHandle {
    let (index, generation) = handle.into_raw_parts();
    BodyHandle { index, generation }
}

/// A complete rapier world with the context filter installed.
pub struct RapierEnvironment {
    pub gravity: Vector3<Real>,
    pub integration_parameters: IntegrationParameters,
    pipeline: PhysicsPipeline,
    islands: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    bodies: RigidBodySet,
    colliders: ColliderSet,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd: CCDSolver,
    query_pipeline: QueryPipeline,
    hooks: ContextFilter,
}

impl Default for RapierEnvironment {
    fn default() -> Self {
        Self::new(Vector3::new(0.0, 0.0, -9.81))
    }
}

impl RapierEnvironment {
    pub fn new(gravity: Vector3<Real>) -> Self {
        RapierEnvironment {
            gravity,
            integration_parameters: IntegrationParameters::default(),
            pipeline: PhysicsPipeline::new(),
            islands: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd: CCDSolver::new(),
            query_pipeline: QueryPipeline::new(),
            hooks: ContextFilter,
        }
    }

    pub fn bodies(&self) -> &RigidBodySet {
        &self.bodies
    }

    pub fn colliders(&self) -> &ColliderSet {
        &self.colliders
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    /// Add untagged fixed level geometry, the kind default-context bodies collide with.
    pub fn add_level_collider(&mut self, shape: SharedShape, position: Isometry3<Real>) -> BodyHandle {
        let body = self.bodies.insert(RigidBodyBuilder::fixed().position(position).build());
        self.colliders.insert_with_parent(
            ColliderBuilder::new(shape).build(),
            body,
            &mut self.bodies,
        );
        from_rapier(body)
    }

    /// Add a dynamic body in the default context.
    pub fn add_dynamic_body(
        &mut self,
        shape: SharedShape,
        position: Isometry3<Real>,
        owner: EntityId,
    ) -> BodyHandle {
        let tag = Tag {
            role: Role::Mover,
            in_hole: false,
            context: PhysicsContext::Default,
            owner: owner.0,
        }
        .encode();
        let body = self.bodies.insert(
            RigidBodyBuilder::dynamic()
                .position(position)
                .user_data(tag)
                .build(),
        );
        self.colliders.insert_with_parent(
            ColliderBuilder::new(shape)
                .user_data(tag)
                .active_hooks(ActiveHooks::FILTER_CONTACT_PAIRS)
                .build(),
            body,
            &mut self.bodies,
        );
        from_rapier(body)
    }

    /// Retag a body and all of its colliders.
    fn retag(&mut self, body: BodyHandle, update: impl Fn(Tag) -> Tag) {
        let Some(rb) = self.bodies.get_mut(to_rapier(body)) else {
            return;
        };
        let tag = update(Tag::decode(rb.user_data));
        rb.user_data = tag.encode();
        let colliders: Vec<_> = rb.colliders().to_vec();
        rb.wake_up(true);
        for handle in colliders {
            if let Some(collider) = self.colliders.get_mut(handle) {
                collider.user_data = tag.encode();
                collider.set_active_hooks(ActiveHooks::FILTER_CONTACT_PAIRS);
            }
        }
    }
}

impl PhysicsEnvironment for RapierEnvironment {
    fn create_static_body(
        &mut self,
        shapes: &[SharedShape],
        position: &Isometry3<Real>,
        context: PhysicsContext,
        source: CollisionSource,
        owner: EntityId,
    ) -> Option<BodyHandle> {
        if shapes.is_empty() {
            return None;
        }
        let tag = Tag {
            role: Role::from_source(source),
            in_hole: false,
            context,
            owner: owner.0,
        }
        .encode();
        let body = self.bodies.insert(
            RigidBodyBuilder::fixed()
                .position(*position)
                .user_data(tag)
                .build(),
        );
        for shape in shapes {
            self.colliders.insert_with_parent(
                ColliderBuilder::new(shape.clone())
                    .user_data(tag)
                    .active_hooks(ActiveHooks::FILTER_CONTACT_PAIRS)
                    .build(),
                body,
                &mut self.bodies,
            );
        }
        trace!("static {source:?} body {body:?} in {context:?}");
        Some(from_rapier(body))
    }

    fn destroy_body(&mut self, body: BodyHandle) {
        self.bodies.remove(
            to_rapier(body),
            &mut self.islands,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            true,
        );
    }

    fn body_exists(&self, body: BodyHandle) -> bool {
        self.bodies.contains(to_rapier(body))
    }

    fn create_shadow_body(
        &mut self,
        source: BodyHandle,
        transform: &Isometry3<Real>,
        context: PhysicsContext,
    ) -> Option<BodyHandle> {
        let rb = self.bodies.get(to_rapier(source))?;
        let position = transform * rb.position();
        let owner = Tag::decode(rb.user_data).owner;
        let shapes: Vec<_> = rb
            .colliders()
            .iter()
            .filter_map(|h| self.colliders.get(*h))
            .map(|c| {
                (
                    c.shared_shape().clone(),
                    c.position_wrt_parent().copied().unwrap_or_else(Isometry3::identity),
                    c.friction(),
                )
            })
            .collect();
        let tag = Tag {
            role: Role::Shadow,
            in_hole: false,
            context,
            owner,
        }
        .encode();
        let shadow = self.bodies.insert(
            RigidBodyBuilder::kinematic_position_based()
                .position(position)
                .user_data(tag)
                .build(),
        );
        for (shape, local, friction) in shapes {
            self.colliders.insert_with_parent(
                ColliderBuilder::new(shape)
                    .position(local)
                    .friction(friction)
                    .user_data(tag)
                    .active_hooks(ActiveHooks::FILTER_CONTACT_PAIRS)
                    .build(),
                shadow,
                &mut self.bodies,
            );
        }
        debug!("shadow body {shadow:?} mirrors {source:?} in {context:?}");
        Some(from_rapier(shadow))
    }

    fn sync_shadow_body(&mut self, shadow: BodyHandle, source: BodyHandle, transform: &Isometry3<Real>) {
        let Some(target) = self
            .bodies
            .get(to_rapier(source))
            .map(|rb| transform * rb.position())
        else {
            return;
        };
        if let Some(rb) = self.bodies.get_mut(to_rapier(shadow)) {
            rb.set_next_kinematic_position(target);
        }
    }

    fn set_body_context(&mut self, body: BodyHandle, context: PhysicsContext, in_hole: bool) {
        self.retag(body, |tag| Tag {
            context,
            in_hole,
            ..tag
        });
    }

    fn body_context(&self, body: BodyHandle) -> Option<(PhysicsContext, bool)> {
        let tag = Tag::decode(self.bodies.get(to_rapier(body))?.user_data);
        Some((tag.context, tag.in_hole))
    }

    fn position(&self, body: BodyHandle) -> Option<Isometry3<Real>> {
        self.bodies.get(to_rapier(body)).map(|rb| *rb.position())
    }

    fn set_position(&mut self, body: BodyHandle, position: &Isometry3<Real>) {
        if let Some(rb) = self.bodies.get_mut(to_rapier(body)) {
            rb.set_position(*position, true);
        }
    }

    fn velocity(&self, body: BodyHandle) -> Option<(Vector3<Real>, Vector3<Real>)> {
        self.bodies
            .get(to_rapier(body))
            .map(|rb| (*rb.linvel(), *rb.angvel()))
    }

    fn set_velocity(&mut self, body: BodyHandle, linear: Vector3<Real>, angular: Vector3<Real>) {
        if let Some(rb) = self.bodies.get_mut(to_rapier(body)) {
            rb.set_linvel(linear, true);
            rb.set_angvel(angular, true);
        }
    }

    fn mass(&self, body: BodyHandle) -> Option<Real> {
        self.bodies.get(to_rapier(body)).map(|rb| rb.mass())
    }

    fn is_sleeping(&self, body: BodyHandle) -> bool {
        self.bodies
            .get(to_rapier(body))
            .is_some_and(|rb| rb.is_sleeping())
    }

    fn recheck_collision_filter(&mut self, body: BodyHandle) {
        let Some(rb) = self.bodies.get_mut(to_rapier(body)) else {
            return;
        };
        rb.wake_up(true);
        let colliders: Vec<_> = rb.colliders().to_vec();
        for handle in colliders {
            if let Some(collider) = self.colliders.get_mut(handle) {
                // Flag the groups as modified so existing pairs are re-filtered
                let groups = collider.collision_groups();
                collider.set_collision_groups(InteractionGroups::none());
                collider.set_collision_groups(groups);
            }
        }
    }

    fn step(&mut self, dt: Real) {
        self.integration_parameters.dt = dt;
        self.pipeline.step(
            &self.gravity,
            &self.integration_parameters,
            &mut self.islands,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd,
            Some(&mut self.query_pipeline),
            &self.hooks,
            &(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(role: Role, context: PhysicsContext, in_hole: bool) -> Tag {
        Tag {
            role,
            in_hole,
            context,
            owner: 77,
        }
    }

    #[test]
    fn tags_survive_encoding() {
        let t = tag(Role::RemoteWorld, PhysicsContext::Portal(12), true);
        assert_eq!(Tag::decode(t.encode()), t);
        assert_eq!(Tag::decode(0).role, Role::Level);
        assert_eq!(Tag::decode(0).context, PhysicsContext::Default);
    }

    #[test]
    fn context_rules() {
        let portal = PhysicsContext::Portal(0);
        let other = PhysicsContext::Portal(1);
        let default_mover = tag(Role::Mover, PhysicsContext::Default, false);
        let portal_mover = tag(Role::Mover, portal, false);
        let hole_mover = tag(Role::Mover, portal, true);
        let level = tag(Role::Level, PhysicsContext::Default, false);
        let wall = tag(Role::LocalWall, portal, false);
        let remote = tag(Role::RemoteWorld, portal, false);
        let shadow = tag(Role::Shadow, portal, false);

        assert!(pair_allowed(default_mover, level));
        assert!(!pair_allowed(default_mover, wall));
        assert!(!pair_allowed(portal_mover, level));
        assert!(pair_allowed(portal_mover, wall));
        assert!(!pair_allowed(tag(Role::Mover, other, false), wall));
        assert!(!pair_allowed(portal_mover, remote));
        assert!(pair_allowed(hole_mover, remote));
        assert!(pair_allowed(shadow, portal_mover));
        assert!(!pair_allowed(shadow, default_mover));
        assert!(!pair_allowed(shadow, wall));
        assert!(!pair_allowed(shadow, shadow));
        assert!(pair_allowed(default_mover, portal_mover));
    }
}
