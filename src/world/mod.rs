//! The portal world: every simulator of a level plus the state they share.
//!
//! [`PortalWorld`] owns the polyhedron cache, the simulator arena, the ownership map, the
//! shadow-clone registry and the physics environment. Hosts drive it through placement
//! calls and the two tick phases, [`pre_phys_frame`](PortalWorld::pre_phys_frame) and
//! [`post_phys_frame`](PortalWorld::post_phys_frame), passing their [`EntityHost`] in.
//!
//! Placement changes run in two phases: first every affected simulator re-carves its
//! own geometry, then link transforms are recomputed pair by pair in slot order, and
//! only then are physics bodies and shadow clones rebuilt.

use crate::call_queue::CallQueue;
use crate::carve::{CarvedGeometry, carve};
use crate::config::SimulatorConfig;
use crate::entity::{EntityHost, SimulatorCallbacks};
use crate::errors::PortalError;
use crate::float_types::Real;
use crate::level::LevelGeometry;
use crate::link::LinkTransform;
use crate::ownership::{OwnershipMap, ShadowCloneRegistry};
use crate::physics::{PhysicsEnvironment, RapierEnvironment};
use crate::placement::PortalPlacement;
use crate::polyhedron::PolyhedronCache;
use crate::simulator::{PortalSimulator, SimulatorArena, SimulatorHandle, SimulatorStats};
use log::{debug, warn};
use nalgebra::{Isometry3, Point3, UnitQuaternion};

mod ownership;

/// Shared state of all portal simulators in one level.
pub struct PortalWorld<P: PhysicsEnvironment = RapierEnvironment> {
    pub(crate) config: SimulatorConfig,
    pub(crate) level: Option<Box<dyn LevelGeometry>>,
    pub(crate) cache: PolyhedronCache,
    pub(crate) simulators: SimulatorArena,
    pub(crate) owners: OwnershipMap,
    pub(crate) clones: ShadowCloneRegistry,
    pub(crate) physics: P,
    pub(crate) callbacks: Box<dyn SimulatorCallbacks>,
    pub(crate) deferred: CallQueue,
}

impl<P: PhysicsEnvironment> PortalWorld<P> {
    /// Empty world without a level. `config` is validated first.
    pub fn new(config: SimulatorConfig, physics: P) -> Self {
        PortalWorld {
            config: config.validated(),
            level: None,
            cache: PolyhedronCache::new(),
            simulators: SimulatorArena::default(),
            owners: OwnershipMap::default(),
            clones: ShadowCloneRegistry::default(),
            physics,
            callbacks: Box::new(()),
            deferred: CallQueue::new(),
        }
    }

    /// Install the entity layer's ownership callbacks.
    pub fn set_callbacks(&mut self, callbacks: Box<dyn SimulatorCallbacks>) {
        self.callbacks = callbacks;
    }

    pub const fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    pub const fn physics(&self) -> &P {
        &self.physics
    }

    pub fn physics_mut(&mut self) -> &mut P {
        &mut self.physics
    }

    pub const fn cache(&self) -> &PolyhedronCache {
        &self.cache
    }

    pub fn simulator(&self, handle: SimulatorHandle) -> Option<&PortalSimulator> {
        self.simulators.get(handle)
    }

    /// Live simulators in slot order.
    pub fn simulators(&self) -> Vec<SimulatorHandle> {
        self.simulators.handles()
    }

    pub(crate) fn sim(&self, handle: SimulatorHandle) -> Result<&PortalSimulator, PortalError> {
        self.simulators
            .get(handle)
            .ok_or(PortalError::UnknownSimulator(handle))
    }

    pub(crate) fn sim_mut(
        &mut self,
        handle: SimulatorHandle,
    ) -> Result<&mut PortalSimulator, PortalError> {
        self.simulators
            .get_mut(handle)
            .ok_or(PortalError::UnknownSimulator(handle))
    }

    pub(crate) fn flush_deferred(&mut self, host: &mut dyn EntityHost) {
        self.deferred.flush(&mut self.physics, host);
    }

    /// Replace the level: rebuild the cache, then re-carve every placed simulator.
    pub fn load_level(&mut self, level: Box<dyn LevelGeometry>, host: &mut dyn EntityHost) {
        let handles = self.simulators.handles();
        for &handle in &handles {
            self.clear_local_data(handle);
        }
        self.cache = PolyhedronCache::build(level.as_ref(), &self.config);
        self.level = Some(level);
        for &handle in &handles {
            self.build_local_data(handle);
        }
        self.refresh_links();
        for &handle in &handles {
            self.sync_physics(handle, host);
        }
        self.flush_deferred(host);
        debug!("level loaded, {} simulators re-carved", handles.len());
    }

    /// Drop the level and every simulator's carved geometry and static bodies.
    ///
    /// Owned entities stay owned but their bodies go back to the default context until the
    /// next [`load_level`](Self::load_level).
    pub fn unload_level(&mut self, host: &mut dyn EntityHost) {
        for handle in self.simulators.handles() {
            if let Some(sim) = self.simulators.get(handle) {
                for entity in sim.owned_entities() {
                    if let Err(err) = self.release_physics_ownership(handle, entity, host) {
                        warn!("{handle:?} could not return {entity:?} to the default context: {err}");
                    }
                }
            }
            self.clear_local_data(handle);
        }
        self.cache.clear();
        self.level = None;
        self.flush_deferred(host);
        debug!("level unloaded");
    }

    /// New unplaced, unlinked simulator. It simulates physics once placed.
    pub fn create_simulator(&mut self) -> SimulatorHandle {
        let handle = self.simulators.insert(PortalSimulator {
            simulating_physics: true,
            ..PortalSimulator::default()
        });
        debug!("simulator {handle:?} created");
        handle
    }

    /// Release everything the simulator holds, detach it and remove it.
    pub fn destroy_simulator(
        &mut self,
        handle: SimulatorHandle,
        host: &mut dyn EntityHost,
    ) -> Result<(), PortalError> {
        self.sim(handle)?;
        self.release_all_entity_ownership(handle, host)?;
        self.detach_from_linked(handle, host)?;
        self.set_physics_simulation_enabled(handle, false, host)?;
        self.clear_local_data(handle);
        self.simulators.remove(handle);
        self.flush_deferred(host);
        debug!("simulator {handle:?} destroyed");
        Ok(())
    }

    /// Tear down every simulator and the level.
    pub fn shutdown(&mut self, host: &mut dyn EntityHost) {
        for handle in self.simulators.handles() {
            // Handles come from the arena, so destruction cannot fail
            let _ = self.destroy_simulator(handle, host);
        }
        self.unload_level(host);
        self.flush_deferred(host);
        debug_assert!(self.owners.is_empty() && self.clones.is_empty());
    }

    /// Place (or re-place) the portal and rebuild everything derived from the placement.
    pub fn move_to(
        &mut self,
        handle: SimulatorHandle,
        origin: Point3<Real>,
        rotation: UnitQuaternion<Real>,
        host: &mut dyn EntityHost,
    ) -> Result<(), PortalError> {
        self.sim(handle)?;
        self.clear_local_data(handle);
        self.sim_mut(handle)?.placement = Some(PortalPlacement::new(origin, rotation));
        self.build_local_data(handle);

        self.refresh_links();
        let linked = self.sim(handle)?.linked;
        self.sync_physics(handle, host);
        if let Some(linked) = linked {
            self.sync_physics(linked, host);
        }
        self.rebuild_shadow_clones(handle, host);
        self.flush_deferred(host);
        debug!("simulator {handle:?} moved to {origin:?}");
        Ok(())
    }

    /// Link two simulators. Linking an already linked pair again does nothing.
    pub fn attach_to(
        &mut self,
        handle: SimulatorHandle,
        other: SimulatorHandle,
        host: &mut dyn EntityHost,
    ) -> Result<(), PortalError> {
        if handle == other {
            return Err(PortalError::SelfLink(handle));
        }
        let this_link = self.sim(handle)?.linked;
        let other_link = self.sim(other)?.linked;
        if this_link == Some(other) {
            return Ok(());
        }
        if let Some(linked) = this_link {
            return Err(PortalError::AlreadyLinked {
                simulator: handle,
                linked,
            });
        }
        if let Some(linked) = other_link {
            return Err(PortalError::AlreadyLinked {
                simulator: other,
                linked,
            });
        }

        self.sim_mut(handle)?.linked = Some(other);
        self.sim_mut(other)?.linked = Some(handle);
        self.refresh_links();
        self.sync_physics(handle, host);
        self.sync_physics(other, host);
        self.rebuild_shadow_clones(handle, host);
        self.flush_deferred(host);
        debug!("simulators {handle:?} and {other:?} linked");
        Ok(())
    }

    /// Break the link on both sides, destroying every shadow clone across it.
    pub fn detach_from_linked(
        &mut self,
        handle: SimulatorHandle,
        host: &mut dyn EntityHost,
    ) -> Result<(), PortalError> {
        let Some(other) = self.sim(handle)?.linked else {
            return Ok(());
        };
        for side in [handle, other] {
            for clone in self.clones.in_target(side) {
                self.destroy_shadow_clone(clone.entity, side);
            }
            if let Some(sim) = self.simulators.get_mut(side) {
                sim.physics.clear_linked(&mut self.physics);
                sim.linked = None;
            }
        }
        self.refresh_links();
        self.flush_deferred(host);
        debug!("simulators {handle:?} and {other:?} detached");
        Ok(())
    }

    pub fn linked_portal_simulator(&self, handle: SimulatorHandle) -> Option<SimulatorHandle> {
        self.simulators.get(handle).and_then(|s| s.linked)
    }

    /// Turn the simulator's physics context on or off.
    ///
    /// Turning it off hands every physics-owned entity back to the default context and
    /// destroys the static bodies and the shadow clones hosted here.
    pub fn set_physics_simulation_enabled(
        &mut self,
        handle: SimulatorHandle,
        enabled: bool,
        host: &mut dyn EntityHost,
    ) -> Result<(), PortalError> {
        if self.sim(handle)?.simulating_physics == enabled {
            return Ok(());
        }
        if enabled {
            self.sim_mut(handle)?.simulating_physics = true;
            self.sync_physics(handle, host);
            self.rebuild_shadow_clones(handle, host);
        } else {
            for entity in self.sim(handle)?.owned_entities() {
                self.release_physics_ownership(handle, entity, host)?;
            }
            for clone in self.clones.in_target(handle) {
                self.destroy_shadow_clone(clone.entity, handle);
            }
            let sim = self
                .simulators
                .get_mut(handle)
                .ok_or(PortalError::UnknownSimulator(handle))?;
            sim.simulating_physics = false;
            sim.physics.clear_all(&mut self.physics);
        }
        self.flush_deferred(host);
        debug!("simulator {handle:?} physics enabled: {enabled}");
        Ok(())
    }

    pub fn is_simulating_physics(&self, handle: SimulatorHandle) -> bool {
        self.simulators
            .get(handle)
            .is_some_and(|s| s.simulating_physics)
    }

    pub fn stats(&self, handle: SimulatorHandle) -> Option<SimulatorStats> {
        let sim = self.simulators.get(handle)?;
        Some(SimulatorStats {
            world_polyhedra: sim.carved.world().count(),
            wall_polyhedra: sim.carved.wall.len(),
            tube_polyhedra: sim.carved.tube.len(),
            owned_entities: sim.owned.len(),
            physics_owned_entities: sim.owned.values().filter(|o| o.owns_physics).count(),
            shadow_clones_hosted: self.clones.in_target(handle).len(),
            static_bodies: sim.physics.bodies().count(),
        })
    }

    /// Transform taking things in front of this portal out of the linked one.
    pub fn teleport_transform(&self, handle: SimulatorHandle) -> Option<Isometry3<Real>> {
        let sim = self.simulators.get(handle)?;
        sim.linked.map(|_| sim.link.this_to_linked)
    }

    /// `pose` as seen through the portal, `None` when unlinked.
    pub fn transform_through_portal(
        &self,
        handle: SimulatorHandle,
        pose: &Isometry3<Real>,
    ) -> Option<Isometry3<Real>> {
        self.teleport_transform(handle).map(|t| t * pose)
    }

    /// Destroy static bodies that reference this simulator's collision, then the
    /// collision itself.
    fn clear_local_data(&mut self, handle: SimulatorHandle) {
        let Some(sim) = self.simulators.get_mut(handle) else {
            return;
        };
        sim.physics.clear_all(&mut self.physics);
        let linked = sim.linked;
        if let Some(other) = linked.and_then(|l| self.simulators.get_mut(l)) {
            other.physics.clear_linked(&mut self.physics);
        }
        if let Some(sim) = self.simulators.get_mut(handle) {
            debug_assert!(!sim.physics.checklist().local_physics_created);
            sim.collision.clear();
            sim.carved = CarvedGeometry::default();
            sim.local_data_ready = false;
        }
    }

    fn build_local_data(&mut self, handle: SimulatorHandle) {
        let Some(placement) = self.simulators.get(handle).and_then(|s| s.placement) else {
            return;
        };
        let carved = carve(&self.cache, self.level.as_deref(), &placement, &self.config);
        if let Some(sim) = self.simulators.get_mut(handle) {
            sim.collision.create(&carved);
            sim.carved = carved;
            sim.local_data_ready = true;
        }
    }

    /// Recompute every link transform, each pair once from its lower slot.
    fn refresh_links(&mut self) {
        for handle in self.simulators.handles() {
            let Some(linked) = self.simulators.get(handle).map(|s| s.linked) else {
                continue;
            };
            match linked {
                None => {
                    if let Some(sim) = self.simulators.get_mut(handle) {
                        sim.link = LinkTransform::identity();
                    }
                },
                Some(other) if handle.index() < other.index() => {
                    let Some((a, b)) = self.simulators.get2_mut(handle, other) else {
                        continue;
                    };
                    let link = match (&a.placement, &b.placement) {
                        (Some(pa), Some(pb)) => LinkTransform::between(pa, pb),
                        _ => LinkTransform::identity(),
                    };
                    a.link = link;
                    b.link = link.reversed();
                },
                Some(_) => {},
            }
        }
    }

    /// Create whatever static bodies are missing for a simulating simulator.
    fn sync_physics(&mut self, handle: SimulatorHandle, host: &mut dyn EntityHost) {
        let Some(sim) = self.simulators.get_mut(handle) else {
            return;
        };
        if !sim.simulating_physics || !sim.collision.is_created() {
            return;
        }
        let created_local = sim.physics.create_local(
            &mut self.physics,
            &sim.collision,
            handle.context(),
            handle.collision_entity(),
        );
        let linked = sim.linked;
        if let Some(other) = linked {
            if let Some((this, linked)) = self.simulators.get2_mut(handle, other) {
                if linked.collision.is_created() {
                    let linked_to_this = this.link.linked_to_this;
                    this.physics.create_linked(
                        &mut self.physics,
                        &linked.collision,
                        &linked_to_this,
                        handle.context(),
                        handle.collision_entity(),
                    );
                }
            }
        }
        if created_local {
            self.reacquire_physics_ownership(handle, host);
        }
    }
}
