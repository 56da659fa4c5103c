//! Caller errors
//!
//! Geometry and physics degradations are absorbed where they happen (a dropped fragment,
//! a "no hit" trace); only misuse of the public API surfaces as a [`PortalError`].

use crate::entity::EntityId;
use crate::simulator::SimulatorHandle;

/// All the ways a call into a [`PortalWorld`](crate::PortalWorld) can be refused
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PortalError {
    /// (UnknownSimulator) The handle is stale or was never issued
    #[error("(UnknownSimulator) no live simulator for {0:?}")]
    UnknownSimulator(SimulatorHandle),
    /// (NotPlaced) The operation needs a placement and `move_to` was never called
    #[error("(NotPlaced) simulator {0:?} has not been placed")]
    NotPlaced(SimulatorHandle),
    /// (SelfLink) A simulator cannot be linked to itself
    #[error("(SelfLink) simulator {0:?} cannot be attached to itself")]
    SelfLink(SimulatorHandle),
    /// (AlreadyLinked) The target is linked to a third simulator
    #[error("(AlreadyLinked) simulator {simulator:?} is already linked to {linked:?}")]
    AlreadyLinked {
        simulator: SimulatorHandle,
        linked: SimulatorHandle,
    },
    /// (DegeneratePolyhedron) Geometry that must have volume collapsed
    #[error("(DegeneratePolyhedron) {0}")]
    DegeneratePolyhedron(String),
    /// (UnknownEntity) The entity host does not know the id
    #[error("(UnknownEntity) entity {0:?} is not known to the host")]
    UnknownEntity(EntityId),
    /// (Physics) The physics environment refused an operation
    #[error("(Physics) {0}")]
    Physics(String),
}
