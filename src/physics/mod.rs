//! Physics environment seam.
//!
//! All simulators share one physics environment. Each simulator is a *context* inside it:
//! its static bodies carry the simulator's context tag, and dynamic bodies owned by the
//! simulator are re-tagged into the same context so the environment's contact filter can
//! keep the carved geometry and the ordinary level geometry apart.

use crate::collision::CollisionSource;
use crate::entity::EntityId;
use crate::float_types::{Real, parry3d::shape::SharedShape};
use nalgebra::{Isometry3, Vector3};

pub mod context;
pub mod rapier;

pub use context::SimulatorPhysics;
pub use rapier::RapierEnvironment;

/// Opaque reference to a body inside a [`PhysicsEnvironment`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BodyHandle {
    pub index: u32,
    pub generation: u32,
}

/// Which simulation context a body belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PhysicsContext {
    /// The ordinary level, away from any portal.
    #[default]
    Default,
    /// The context of the simulator in the given arena slot.
    Portal(u32),
}

impl PhysicsContext {
    /// Compact tag: 0 for the default context, slot + 1 otherwise.
    pub const fn tag(self) -> u32 {
        match self {
            PhysicsContext::Default => 0,
            PhysicsContext::Portal(slot) => slot + 1,
        }
    }

    pub const fn from_tag(tag: u32) -> Self {
        match tag {
            0 => PhysicsContext::Default,
            t => PhysicsContext::Portal(t - 1),
        }
    }
}

/// Operations the simulators need from the host's physics engine.
pub trait PhysicsEnvironment {
    /// Create a fixed body with one collider per shape, placed at `position`, tagged as
    /// `source` geometry of `context`. `owner` is the synthetic collision entity.
    fn create_static_body(
        &mut self,
        shapes: &[SharedShape],
        position: &Isometry3<Real>,
        context: PhysicsContext,
        source: CollisionSource,
        owner: EntityId,
    ) -> Option<BodyHandle>;

    /// Remove a body and its colliders. Unknown handles are ignored.
    fn destroy_body(&mut self, body: BodyHandle);

    fn body_exists(&self, body: BodyHandle) -> bool;

    /// Create a kinematic mirror of `source` placed at `transform * source` in `context`.
    fn create_shadow_body(
        &mut self,
        source: BodyHandle,
        transform: &Isometry3<Real>,
        context: PhysicsContext,
    ) -> Option<BodyHandle>;

    /// Drive `shadow` to follow `source` through `transform` for the next step.
    fn sync_shadow_body(&mut self, shadow: BodyHandle, source: BodyHandle, transform: &Isometry3<Real>);

    /// Move a dynamic body into `context`, with its in-hole collision flag.
    fn set_body_context(&mut self, body: BodyHandle, context: PhysicsContext, in_hole: bool);

    /// Current `(context, in_hole)` of a body.
    fn body_context(&self, body: BodyHandle) -> Option<(PhysicsContext, bool)>;

    fn position(&self, body: BodyHandle) -> Option<Isometry3<Real>>;

    /// Teleport a body without sweeping.
    fn set_position(&mut self, body: BodyHandle, position: &Isometry3<Real>);

    /// `(linear, angular)` velocity.
    fn velocity(&self, body: BodyHandle) -> Option<(Vector3<Real>, Vector3<Real>)>;

    fn set_velocity(&mut self, body: BodyHandle, linear: Vector3<Real>, angular: Vector3<Real>);

    fn mass(&self, body: BodyHandle) -> Option<Real>;

    fn is_sleeping(&self, body: BodyHandle) -> bool;

    /// Force the contact filter to be re-evaluated for `body` on the next step.
    fn recheck_collision_filter(&mut self, body: BodyHandle);

    /// Advance the simulation by `dt` seconds.
    fn step(&mut self, dt: Real);
}
