//! Per-portal simulator state and the arena holding all of them.

use crate::carve::CarvedGeometry;
use crate::collision::LocalCollision;
use crate::entity::EntityId;
use crate::link::LinkTransform;
use crate::ownership::OwnedEntity;
use crate::physics::{PhysicsContext, SimulatorPhysics};
use crate::placement::PortalPlacement;
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

/// Stable reference to a simulator. Handles of destroyed simulators never match a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SimulatorHandle {
    index: u32,
    generation: u32,
}

impl SimulatorHandle {
    pub const fn index(self) -> u32 {
        self.index
    }

    pub const fn generation(self) -> u32 {
        self.generation
    }

    /// The physics context of this simulator.
    pub const fn context(self) -> PhysicsContext {
        PhysicsContext::Portal(self.index)
    }

    /// Id of the synthetic entity owning the simulator's static bodies.
    pub const fn collision_entity(self) -> EntityId {
        EntityId((1 << 63) | ((self.generation as u64) << 32) | self.index as u64)
    }
}

/// Counts for debug overlays.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulatorStats {
    pub world_polyhedra: usize,
    pub wall_polyhedra: usize,
    pub tube_polyhedra: usize,
    pub owned_entities: usize,
    pub physics_owned_entities: usize,
    pub shadow_clones_hosted: usize,
    pub static_bodies: usize,
}

/// Everything one portal knows about its surroundings.
#[derive(Debug, Default)]
pub struct PortalSimulator {
    pub(crate) placement: Option<PortalPlacement>,
    pub(crate) local_data_ready: bool,
    pub(crate) linked: Option<SimulatorHandle>,
    pub(crate) link: LinkTransform,
    pub(crate) carved: CarvedGeometry,
    pub(crate) collision: LocalCollision,
    pub(crate) physics: SimulatorPhysics,
    pub(crate) owned: HashMap<EntityId, OwnedEntity>,
    pub(crate) simulating_physics: bool,
}

impl PortalSimulator {
    pub fn placement(&self) -> Option<&PortalPlacement> {
        self.placement.as_ref()
    }

    /// Carve and collision are up to date with the placement.
    pub const fn is_local_data_ready(&self) -> bool {
        self.local_data_ready
    }

    pub const fn linked(&self) -> Option<SimulatorHandle> {
        self.linked
    }

    pub const fn link(&self) -> &LinkTransform {
        &self.link
    }

    pub const fn carved(&self) -> &CarvedGeometry {
        &self.carved
    }

    pub const fn collision(&self) -> &LocalCollision {
        &self.collision
    }

    pub const fn physics(&self) -> &SimulatorPhysics {
        &self.physics
    }

    pub const fn is_simulating_physics(&self) -> bool {
        self.simulating_physics
    }

    pub fn owned(&self, entity: EntityId) -> Option<&OwnedEntity> {
        self.owned.get(&entity)
    }

    /// Owned entities, sorted.
    pub fn owned_entities(&self) -> Vec<EntityId> {
        let mut owned: Vec<_> = self.owned.keys().copied().collect();
        owned.sort_unstable();
        owned
    }
}

struct Slot {
    generation: u32,
    simulator: Option<PortalSimulator>,
}

/// Generational arena of simulators.
#[derive(Default)]
pub(crate) struct SimulatorArena {
    slots: Vec<Slot>,
    free: Vec<u32>,
}

impl SimulatorArena {
    pub fn insert(&mut self, simulator: PortalSimulator) -> SimulatorHandle {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.simulator = Some(simulator);
            return SimulatorHandle {
                index,
                generation: slot.generation,
            };
        }
        self.slots.push(Slot {
            generation: 0,
            simulator: Some(simulator),
        });
        SimulatorHandle {
            index: (self.slots.len() - 1) as u32,
            generation: 0,
        }
    }

    pub fn remove(&mut self, handle: SimulatorHandle) -> Option<PortalSimulator> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        let simulator = slot.simulator.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        Some(simulator)
    }

    pub fn get(&self, handle: SimulatorHandle) -> Option<&PortalSimulator> {
        let slot = self.slots.get(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.simulator.as_ref()
    }

    pub fn get_mut(&mut self, handle: SimulatorHandle) -> Option<&mut PortalSimulator> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.simulator.as_mut()
    }

    /// Two distinct simulators at once.
    pub fn get2_mut(
        &mut self,
        a: SimulatorHandle,
        b: SimulatorHandle,
    ) -> Option<(&mut PortalSimulator, &mut PortalSimulator)> {
        if a.index == b.index || !self.contains(a) || !self.contains(b) {
            return None;
        }
        let (lo, hi, swapped) = if a.index < b.index {
            (a.index as usize, b.index as usize, false)
        } else {
            (b.index as usize, a.index as usize, true)
        };
        let (head, tail) = self.slots.split_at_mut(hi);
        let first = head[lo].simulator.as_mut()?;
        let second = tail[0].simulator.as_mut()?;
        Some(if swapped { (second, first) } else { (first, second) })
    }

    pub fn contains(&self, handle: SimulatorHandle) -> bool {
        self.get(handle).is_some()
    }

    /// Live handles in slot order.
    pub fn handles(&self) -> Vec<SimulatorHandle> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.simulator.is_some())
            .map(|(i, s)| SimulatorHandle {
                index: i as u32,
                generation: s.generation,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.simulator.is_some()).count()
    }
}
