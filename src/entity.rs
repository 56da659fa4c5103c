//! The entity layer as seen by the simulators.
//!
//! Dynamic objects live in the host; the simulators only refer to them by [`EntityId`] and
//! reach back through [`EntityHost`] for bounds, physics bodies and notifications.

use crate::float_types::Real;
use crate::physics::BodyHandle;
use crate::simulator::SimulatorHandle;
use nalgebra::{Isometry3, Vector3};
use serde::{Deserialize, Serialize};

/// Stable identity of a host entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub u64);

/// Coarse classification used to refuse ownership of world geometry and vehicles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    World,
    Vehicle,
    Dynamic,
    /// The id no longer refers to a live entity.
    Missing,
}

/// Oriented bounding box of an entity in world space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntityBounds {
    pub position: Isometry3<Real>,
    pub half_extents: Vector3<Real>,
}

impl EntityBounds {
    pub fn new(position: Isometry3<Real>, half_extents: Vector3<Real>) -> Self {
        EntityBounds {
            position,
            half_extents,
        }
    }

    /// Axis-aligned box centered on `center`.
    pub fn axis_aligned(center: Vector3<Real>, half_extents: Vector3<Real>) -> Self {
        EntityBounds {
            position: Isometry3::translation(center.x, center.y, center.z),
            half_extents,
        }
    }
}

/// Everything the simulators need from the host's entity system.
pub trait EntityHost {
    fn kind(&self, entity: EntityId) -> EntityKind;

    /// Current world-space bounds, `None` for entities without a volume.
    fn bounds(&self, entity: EntityId) -> Option<EntityBounds>;

    /// The entity's dynamic physics body, if it has one.
    fn physics_body(&self, entity: EntityId) -> Option<BodyHandle>;

    fn is_asleep(&self, _entity: EntityId) -> bool {
        false
    }

    /// Attached sub-objects that must share their parent's owner.
    fn children(&self, _entity: EntityId) -> Vec<EntityId> {
        Vec::new()
    }

    /// The entity currently carrying `entity`, if any.
    fn holder(&self, _entity: EntityId) -> Option<EntityId> {
        None
    }

    /// Silently drop a hold without gameplay side effects.
    fn drop_hold(&mut self, _holder: EntityId, _entity: EntityId) {}

    /// Re-establish a hold dropped by [`drop_hold`](EntityHost::drop_hold).
    fn reacquire_hold(&mut self, _holder: EntityId, _entity: EntityId) {}

    /// The collision rules that apply to `entity` changed.
    fn collision_rules_changed(&mut self, _entity: EntityId) {}

    /// `entity` was moved through a portal by `transform`.
    fn teleported(&mut self, _entity: EntityId, _transform: &Isometry3<Real>) {}
}

/// Hooks the entity layer can install to react to ownership changes.
///
/// Every method has an empty default so implementors only override what they need.
pub trait SimulatorCallbacks {
    fn on_take_ownership(&mut self, _simulator: SimulatorHandle, _entity: EntityId) {}
    fn on_release_ownership(&mut self, _simulator: SimulatorHandle, _entity: EntityId) {}
    fn on_take_physics_ownership(&mut self, _simulator: SimulatorHandle, _entity: EntityId) {}
    fn on_release_physics_ownership(&mut self, _simulator: SimulatorHandle, _entity: EntityId) {}
}

/// No-op callbacks, the default of a fresh [`PortalWorld`](crate::PortalWorld).
impl SimulatorCallbacks for () {}
