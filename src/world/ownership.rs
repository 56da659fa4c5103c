//! Entity ownership, shadow clones and the two tick phases.

use super::PortalWorld;
use crate::entity::{EntityHost, EntityId, EntityKind};
use crate::errors::PortalError;
use crate::float_types::parry3d::bounding_volume::BoundingVolume;
use crate::float_types::parry3d::shape::Cuboid;
use crate::ownership::{OwnedEntity, ShadowClone};
use crate::physics::{BodyHandle, PhysicsContext, PhysicsEnvironment};
use crate::simulator::SimulatorHandle;
use log::{debug, trace, warn};
use nalgebra::Point3;

impl<P: PhysicsEnvironment> PortalWorld<P> {
    pub fn owner_of(&self, entity: EntityId) -> Option<SimulatorHandle> {
        self.owners.owner_of(entity)
    }

    /// Entities owned by `handle`, sorted.
    pub fn owned_entities(&self, handle: SimulatorHandle) -> Vec<EntityId> {
        self.owners.owned_by(handle)
    }

    /// Shadow clones living in `handle`'s physics context.
    pub fn shadow_clones_of(&self, handle: SimulatorHandle) -> Vec<ShadowClone> {
        self.clones.in_target(handle)
    }

    /// Make `handle` the owner of `entity` and of its children.
    ///
    /// Returns `Ok(false)` for world geometry, vehicles and entities `handle` already owns.
    /// A different previous owner releases the entity first.
    pub fn take_ownership_of_entity(
        &mut self,
        handle: SimulatorHandle,
        entity: EntityId,
        host: &mut dyn EntityHost,
    ) -> Result<bool, PortalError> {
        let simulating = self.sim(handle)?.simulating_physics;
        match host.kind(entity) {
            EntityKind::World | EntityKind::Vehicle => return Ok(false),
            EntityKind::Missing => return Err(PortalError::UnknownEntity(entity)),
            EntityKind::Dynamic => {},
        }
        match self.owners.owner_of(entity) {
            Some(owner) if owner == handle => return Ok(false),
            Some(owner) => {
                if self.simulators.contains(owner) {
                    self.release_ownership_of_entity(owner, entity, host)?;
                } else {
                    self.owners.clear_owner(entity, owner);
                }
            },
            None => {},
        }

        let in_hole = self.entity_is_in_portal_hole(handle, entity, &*host);
        self.owners.set_owner(entity, handle);
        self.sim_mut(handle)?.owned.insert(
            entity,
            OwnedEntity {
                in_hole,
                ..OwnedEntity::default()
            },
        );
        self.callbacks.on_take_ownership(handle, entity);
        debug!("{handle:?} took ownership of {entity:?} (in hole: {in_hole})");

        if simulating && host.physics_body(entity).is_some() {
            self.take_physics_ownership(handle, entity, host)?;
        }
        for child in host.children(entity) {
            if host.kind(child) == EntityKind::Dynamic {
                self.take_ownership_of_entity(handle, child, host)?;
            }
        }
        self.flush_deferred(host);
        Ok(true)
    }

    /// Give `entity` and its children back to no one. Not owning it is a no-op.
    pub fn release_ownership_of_entity(
        &mut self,
        handle: SimulatorHandle,
        entity: EntityId,
        host: &mut dyn EntityHost,
    ) -> Result<bool, PortalError> {
        self.sim(handle)?;
        if self.owners.owner_of(entity) != Some(handle) {
            return Ok(false);
        }
        self.release_physics_ownership(handle, entity, host)?;
        self.sim_mut(handle)?.owned.remove(&entity);
        self.owners.clear_owner(entity, handle);
        self.callbacks.on_release_ownership(handle, entity);
        debug!("{handle:?} released ownership of {entity:?}");

        for child in host.children(entity) {
            self.release_ownership_of_entity(handle, child, host)?;
        }
        self.flush_deferred(host);
        Ok(true)
    }

    pub fn release_all_entity_ownership(
        &mut self,
        handle: SimulatorHandle,
        host: &mut dyn EntityHost,
    ) -> Result<(), PortalError> {
        for entity in self.sim(handle)?.owned_entities() {
            self.release_ownership_of_entity(handle, entity, host)?;
        }
        Ok(())
    }

    /// Move an owned entity's body into the simulator's physics context and clone it into
    /// the linked simulator.
    pub fn take_physics_ownership(
        &mut self,
        handle: SimulatorHandle,
        entity: EntityId,
        host: &mut dyn EntityHost,
    ) -> Result<bool, PortalError> {
        let sim = self.sim(handle)?;
        let Some(state) = sim.owned.get(&entity).copied() else {
            return Ok(false);
        };
        // Without static bodies the context filter would leave the body with nothing to
        // collide against
        if state.owns_physics
            || !sim.simulating_physics
            || !sim.physics.checklist().local_physics_created
        {
            return Ok(false);
        }
        let Some(body) = host.physics_body(entity) else {
            return Ok(false);
        };

        self.physics
            .set_body_context(body, handle.context(), state.in_hole);
        if let Some(state) = self.sim_mut(handle)?.owned.get_mut(&entity) {
            state.owns_physics = true;
        }
        self.queue_rules_changed(entity, Some(body));
        self.callbacks.on_take_physics_ownership(handle, entity);
        debug!("{handle:?} took physics ownership of {entity:?}");

        self.create_shadow_clone(handle, entity, body, host);
        Ok(true)
    }

    /// Destroy the entity's shadow clone and return its body to the default context.
    pub fn release_physics_ownership(
        &mut self,
        handle: SimulatorHandle,
        entity: EntityId,
        host: &mut dyn EntityHost,
    ) -> Result<bool, PortalError> {
        let sim = self.sim(handle)?;
        let linked = sim.linked;
        if !sim.owned.get(&entity).is_some_and(|s| s.owns_physics) {
            return Ok(false);
        }

        if let Some(target) = linked {
            let holder = host.holder(entity);
            if let Some(holder) = holder {
                host.drop_hold(holder, entity);
            }
            self.destroy_shadow_clone(entity, target);
            if let Some(holder) = holder {
                host.reacquire_hold(holder, entity);
            }
        }

        let body = host.physics_body(entity);
        if let Some(body) = body {
            self.physics
                .set_body_context(body, PhysicsContext::Default, false);
        }
        if let Some(state) = self.sim_mut(handle)?.owned.get_mut(&entity) {
            state.owns_physics = false;
            state.cloned_from_main = false;
        }
        self.queue_rules_changed(entity, body);
        self.callbacks.on_release_physics_ownership(handle, entity);
        debug!("{handle:?} released physics ownership of {entity:?}");
        Ok(true)
    }

    /// Whether the entity's box overlaps the simulator's hole-containment volume.
    ///
    /// `false` for unknown simulators, unplaced portals and entities without bounds.
    pub fn entity_is_in_portal_hole(
        &self,
        handle: SimulatorHandle,
        entity: EntityId,
        host: &dyn EntityHost,
    ) -> bool {
        let Some(sim) = self.simulators.get(handle) else {
            return false;
        };
        let Some(bounds) = host.bounds(entity) else {
            return false;
        };
        sim.collision
            .in_hole(&Cuboid::new(bounds.half_extents), &bounds.position)
    }

    /// Move `entity` through the portal of `handle` and hand it to the linked simulator.
    ///
    /// The body's pose and velocity are transformed by the link. Returns `Ok(false)` when the
    /// simulator is unlinked.
    pub fn teleport_entity(
        &mut self,
        handle: SimulatorHandle,
        entity: EntityId,
        host: &mut dyn EntityHost,
    ) -> Result<bool, PortalError> {
        let sim = self.sim(handle)?;
        let Some(linked) = sim.linked else {
            return Ok(false);
        };
        let transform = sim.link.this_to_linked;

        if let Some(body) = host.physics_body(entity) {
            if let Some(position) = self.physics.position(body) {
                self.physics.set_position(body, &(transform * position));
            }
            if let Some((linear, angular)) = self.physics.velocity(body) {
                self.physics.set_velocity(
                    body,
                    transform.rotation * linear,
                    transform.rotation * angular,
                );
            }
        }
        host.teleported(entity, &transform);
        debug!("{entity:?} teleported from {handle:?} to {linked:?}");

        if self.owners.owner_of(entity) == Some(handle) {
            self.take_ownership_of_entity(linked, entity, host)?;
        }
        self.flush_deferred(host);
        Ok(true)
    }

    /// Recompute in-hole flags, propagate changes to bodies and clones, then drive every
    /// shadow clone to its source.
    pub fn pre_phys_frame(&mut self, host: &mut dyn EntityHost) {
        for handle in self.simulators.handles() {
            let Some(sim) = self.simulators.get(handle) else {
                continue;
            };
            for entity in sim.owned_entities() {
                if host.is_asleep(entity) {
                    continue;
                }
                let in_hole = self.entity_is_in_portal_hole(handle, entity, &*host);
                let Some(state) = self
                    .simulators
                    .get_mut(handle)
                    .and_then(|s| s.owned.get_mut(&entity))
                else {
                    continue;
                };
                if state.in_hole == in_hole {
                    continue;
                }
                state.in_hole = in_hole;
                let owns_physics = state.owns_physics;
                trace!("{entity:?} in hole of {handle:?}: {in_hole}");

                let body = host.physics_body(entity).filter(|_| owns_physics);
                if let Some(body) = body {
                    self.physics.set_body_context(body, handle.context(), in_hole);
                }
                self.queue_rules_changed(entity, body);
                for clone in self.clones.of_entity(entity) {
                    let shadow = clone.body;
                    self.deferred
                        .queue(move |physics, _| physics.recheck_collision_filter(shadow));
                }
            }
        }

        let clones: Vec<ShadowClone> = self.clones.all().copied().collect();
        for clone in clones {
            let Some(source) = self.simulators.get(clone.source) else {
                continue;
            };
            let transform = source.link.this_to_linked;
            self.physics
                .sync_shadow_body(clone.body, clone.source_body, &transform);
        }
        self.flush_deferred(host);
    }

    /// Release entities that left their simulator's carve region and repair bodies whose
    /// context drifted from their ownership state.
    pub fn post_phys_frame(&mut self, host: &mut dyn EntityHost) {
        let margin = self.config.post_phys_release_margin;
        for handle in self.simulators.handles() {
            let Some(sim) = self.simulators.get(handle) else {
                continue;
            };
            let region = sim.placement.map(|p| p.carve_aabb(&self.config, margin));
            for entity in sim.owned_entities() {
                let Some(state) = self
                    .simulators
                    .get(handle)
                    .and_then(|s| s.owned.get(&entity).copied())
                else {
                    continue;
                };
                let body = host.physics_body(entity);
                let associated = host.kind(entity) != EntityKind::Missing
                    && region.is_some_and(|region| match host.bounds(entity) {
                        Some(bounds) => {
                            let aabb = Cuboid::new(bounds.half_extents).aabb(&bounds.position);
                            region.intersects(&aabb)
                        },
                        None => body
                            .and_then(|b| self.physics.position(b))
                            .is_none_or(|p| region.contains_local_point(&Point3::from(p.translation.vector))),
                    });

                if !associated {
                    trace!("{entity:?} left the region of {handle:?}");
                    if let Err(err) = self.release_ownership_of_entity(handle, entity, host) {
                        warn!("{handle:?} could not release {entity:?}: {err}");
                    }
                    continue;
                }

                let Some(body) = body.filter(|_| state.owns_physics) else {
                    continue;
                };
                let expected = (handle.context(), state.in_hole);
                if self.physics.body_context(body) != Some(expected) {
                    warn!("{entity:?} body context drifted from {expected:?}, restoring");
                    self.physics.set_body_context(body, expected.0, expected.1);
                    self.queue_rules_changed(entity, Some(body));
                }
            }
        }
        self.flush_deferred(host);
    }

    /// Re-take physics ownership of everything `handle` owns after its static bodies were
    /// recreated.
    pub(crate) fn reacquire_physics_ownership(
        &mut self,
        handle: SimulatorHandle,
        host: &mut dyn EntityHost,
    ) {
        let Some(sim) = self.simulators.get(handle) else {
            return;
        };
        let owned: Vec<_> = sim.owned.iter().map(|(e, s)| (*e, *s)).collect();
        for (entity, state) in owned {
            if !state.owns_physics {
                if let Err(err) = self.take_physics_ownership(handle, entity, host) {
                    warn!("{handle:?} could not retake physics for {entity:?}: {err}");
                }
                continue;
            }
            if let Some(body) = host.physics_body(entity) {
                self.physics
                    .set_body_context(body, handle.context(), state.in_hole);
                self.queue_rules_changed(entity, Some(body));
            }
        }
    }

    /// Give every physics-owned entity on both sides of the link its missing clone.
    pub(crate) fn rebuild_shadow_clones(&mut self, handle: SimulatorHandle, host: &mut dyn EntityHost) {
        let linked = self.linked_portal_simulator(handle);
        for side in [Some(handle), linked].into_iter().flatten() {
            let Some(sim) = self.simulators.get(side) else {
                continue;
            };
            let owned: Vec<_> = sim
                .owned
                .iter()
                .filter(|(_, s)| s.owns_physics)
                .map(|(e, _)| *e)
                .collect();
            for entity in owned {
                if let Some(body) = host.physics_body(entity) {
                    self.create_shadow_clone(side, entity, body, host);
                }
            }
        }
    }

    /// Mirror `body` into the simulator linked to `source`. Does nothing when unlinked, when
    /// the linked simulator does not simulate physics or when the clone already exists.
    fn create_shadow_clone(
        &mut self,
        source: SimulatorHandle,
        entity: EntityId,
        body: BodyHandle,
        host: &mut dyn EntityHost,
    ) -> bool {
        let Some(sim) = self.simulators.get(source) else {
            return false;
        };
        let Some(target) = sim.linked else {
            return false;
        };
        let transform = sim.link.this_to_linked;
        if !self.is_simulating_physics(target) || self.clones.contains(entity, target) {
            return false;
        }

        let holder = host.holder(entity);
        if let Some(holder) = holder {
            host.drop_hold(holder, entity);
        }
        let shadow = self
            .physics
            .create_shadow_body(body, &transform, target.context());
        if let Some(holder) = holder {
            host.reacquire_hold(holder, entity);
        }
        let Some(shadow) = shadow else {
            warn!("could not clone {entity:?} into {target:?}");
            return false;
        };

        let inserted = self.clones.insert(ShadowClone {
            entity,
            source,
            source_body: body,
            target,
            body: shadow,
        });
        debug_assert!(inserted);
        if let Some(state) = self
            .simulators
            .get_mut(source)
            .and_then(|s| s.owned.get_mut(&entity))
        {
            state.cloned_from_main = true;
        }
        debug!("{entity:?} cloned from {source:?} into {target:?}");
        true
    }

    pub(crate) fn destroy_shadow_clone(&mut self, entity: EntityId, target: SimulatorHandle) -> bool {
        let Some(clone) = self.clones.remove(entity, target) else {
            return false;
        };
        self.physics.destroy_body(clone.body);
        if let Some(state) = self
            .simulators
            .get_mut(clone.source)
            .and_then(|s| s.owned.get_mut(&entity))
        {
            state.cloned_from_main = false;
        }
        debug!("clone of {entity:?} in {target:?} destroyed");
        true
    }

    fn queue_rules_changed(&mut self, entity: EntityId, body: Option<BodyHandle>) {
        self.deferred.queue(move |physics, host| {
            if let Some(body) = body {
                physics.recheck_collision_filter(body);
            }
            host.collision_rules_changed(entity);
        });
    }
}
