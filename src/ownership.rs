//! Ownership bookkeeping: who owns each entity, and which shadow clones exist.

use crate::entity::EntityId;
use crate::physics::BodyHandle;
use crate::simulator::SimulatorHandle;
use hashbrown::HashMap;

/// Per-simulator state of one owned entity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OwnedEntity {
    /// The entity's body is simulated in this simulator's physics context.
    pub owns_physics: bool,
    /// Result of the last in-hole test.
    pub in_hole: bool,
    /// A shadow clone of the entity exists in the linked simulator.
    pub cloned_from_main: bool,
}

/// Entity → owning simulator. An entity has at most one entry.
#[derive(Debug, Clone, Default)]
pub struct OwnershipMap {
    owners: HashMap<EntityId, SimulatorHandle>,
}

impl OwnershipMap {
    pub fn owner_of(&self, entity: EntityId) -> Option<SimulatorHandle> {
        self.owners.get(&entity).copied()
    }

    /// Record `owner` for `entity`, returning the previous owner.
    pub fn set_owner(&mut self, entity: EntityId, owner: SimulatorHandle) -> Option<SimulatorHandle> {
        self.owners.insert(entity, owner)
    }

    /// Remove the entry if it belongs to `owner`.
    pub fn clear_owner(&mut self, entity: EntityId, owner: SimulatorHandle) -> bool {
        if self.owners.get(&entity) == Some(&owner) {
            self.owners.remove(&entity);
            true
        } else {
            false
        }
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }

    /// Entities owned by `owner`, sorted.
    pub fn owned_by(&self, owner: SimulatorHandle) -> Vec<EntityId> {
        let mut owned: Vec<_> = self
            .owners
            .iter()
            .filter(|(_, o)| **o == owner)
            .map(|(e, _)| *e)
            .collect();
        owned.sort_unstable();
        owned
    }

    pub fn clear(&mut self) {
        self.owners.clear();
    }
}

/// A mirrored body of an entity owned by another simulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShadowClone {
    pub entity: EntityId,
    /// Simulator owning the source entity.
    pub source: SimulatorHandle,
    pub source_body: BodyHandle,
    /// Simulator whose physics context holds the clone.
    pub target: SimulatorHandle,
    pub body: BodyHandle,
}

/// All shadow clones, keyed by `(entity, target simulator)` so each pair has at most one.
#[derive(Debug, Clone, Default)]
pub struct ShadowCloneRegistry {
    clones: HashMap<(EntityId, SimulatorHandle), ShadowClone>,
}

impl ShadowCloneRegistry {
    pub fn get(&self, entity: EntityId, target: SimulatorHandle) -> Option<&ShadowClone> {
        self.clones.get(&(entity, target))
    }

    pub fn contains(&self, entity: EntityId, target: SimulatorHandle) -> bool {
        self.clones.contains_key(&(entity, target))
    }

    /// Register a clone; refuses a second clone for the same pair.
    pub fn insert(&mut self, clone: ShadowClone) -> bool {
        let key = (clone.entity, clone.target);
        if self.clones.contains_key(&key) {
            return false;
        }
        self.clones.insert(key, clone);
        true
    }

    pub fn remove(&mut self, entity: EntityId, target: SimulatorHandle) -> Option<ShadowClone> {
        self.clones.remove(&(entity, target))
    }

    /// Clones living in `target`, sorted by entity.
    pub fn in_target(&self, target: SimulatorHandle) -> Vec<ShadowClone> {
        let mut found: Vec<_> = self
            .clones
            .values()
            .filter(|c| c.target == target)
            .copied()
            .collect();
        found.sort_unstable_by_key(|c| c.entity);
        found
    }

    /// Clones whose source entity is owned by `source`, sorted by entity.
    pub fn from_source(&self, source: SimulatorHandle) -> Vec<ShadowClone> {
        let mut found: Vec<_> = self
            .clones
            .values()
            .filter(|c| c.source == source)
            .copied()
            .collect();
        found.sort_unstable_by_key(|c| c.entity);
        found
    }

    pub fn of_entity(&self, entity: EntityId) -> Vec<ShadowClone> {
        self.clones
            .values()
            .filter(|c| c.entity == entity)
            .copied()
            .collect()
    }

    pub fn all(&self) -> impl Iterator<Item = &ShadowClone> + '_ {
        self.clones.values()
    }

    pub fn len(&self) -> usize {
        self.clones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clones.is_empty()
    }
}
