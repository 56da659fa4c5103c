//! Nudging boxes out of solid geometry near a portal.
//!
//! A bounded hill climb: each round tries moving the box along the 26 directions towards
//! its corners, edge midpoints and face centres, scaled by the box extents, and keeps the
//! move that reduces total penetration the most. A round without improvement halves the
//! step. The search gives up after `passable_space_iterations` rounds.

use crate::entity::{EntityBounds, EntityHost, EntityId};
use crate::errors::PortalError;
use crate::float_types::{
    Real,
    parry3d::shape::{Cuboid, Shape},
    tolerance,
};
use crate::physics::PhysicsEnvironment;
use crate::simulator::{PortalSimulator, SimulatorHandle};
use crate::world::PortalWorld;
use log::{debug, warn};
use nalgebra::{Isometry3, Translation3, Vector3};

fn directions() -> impl Iterator<Item = Vector3<Real>> {
    (-1..=1).flat_map(|x| {
        (-1..=1).flat_map(move |y| {
            (-1..=1)
                .filter(move |&z| (x, y, z) != (0, 0, 0))
                .map(move |z| Vector3::new(x as Real, y as Real, z as Real))
        })
    })
}

/// Summed penetration of `shape` into everything the simulator collides with at `position`.
fn penetration(
    sim: &PortalSimulator,
    linked: Option<&PortalSimulator>,
    shape: &dyn Shape,
    position: &Isometry3<Real>,
) -> Real {
    let identity = Isometry3::identity();
    let mut total: Real = sim
        .collision
        .representations()
        .iter()
        .map(|r| r.penetration(&identity, shape, position))
        .sum();
    if let Some(linked) = linked.filter(|_| sim.collision.in_hole(shape, position)) {
        let link = sim.link.linked_to_this;
        total += linked.collision.world.penetration(&link, shape, position);
        total += linked.collision.world_props.penetration(&link, shape, position);
    }
    total
}

impl<P: PhysicsEnvironment> PortalWorld<P> {
    /// Closest pose to `bounds` where the box does not penetrate the simulator's collision.
    ///
    /// Returns the original pose when it is already free and `None` when the iteration
    /// budget runs out.
    pub fn find_closest_passable_space(
        &self,
        handle: SimulatorHandle,
        bounds: &EntityBounds,
    ) -> Option<Isometry3<Real>> {
        let sim = self.simulators.get(handle)?;
        let linked = sim.linked.and_then(|l| self.simulators.get(l));
        let cuboid = Cuboid::new(bounds.half_extents);
        let free = tolerance();

        let mut best = bounds.position;
        let mut score = penetration(sim, linked, &cuboid, &best);
        let mut step: Real = 1.0;
        for _ in 0..self.config.passable_space_iterations {
            if score <= free {
                return Some(best);
            }
            let mut round: Option<(Isometry3<Real>, Real)> = None;
            for direction in directions() {
                let offset = best.rotation * direction.component_mul(&bounds.half_extents) * step;
                let candidate = Translation3::from(offset) * best;
                let candidate_score = penetration(sim, linked, &cuboid, &candidate);
                if candidate_score < round.map_or(score, |(_, s)| s) {
                    round = Some((candidate, candidate_score));
                }
            }
            match round {
                Some((candidate, candidate_score)) => {
                    best = candidate;
                    score = candidate_score;
                },
                None => step *= 0.5,
            }
        }
        if score <= free {
            return Some(best);
        }
        warn!(
            "no passable space near {:?} after {} iterations (penetration {score})",
            bounds.position.translation.vector, self.config.passable_space_iterations
        );
        None
    }

    /// Move a stuck entity's body to the closest passable space.
    ///
    /// `Ok(true)` when the entity ends up free (moved or not), `Ok(false)` when no free
    /// pose was found or the entity has no bounds.
    pub fn unstick_entity(
        &mut self,
        handle: SimulatorHandle,
        entity: EntityId,
        host: &mut dyn EntityHost,
    ) -> Result<bool, PortalError> {
        if self.sim(handle)?.placement.is_none() {
            return Err(PortalError::NotPlaced(handle));
        }
        let Some(bounds) = host.bounds(entity) else {
            return Ok(false);
        };
        let Some(free) = self.find_closest_passable_space(handle, &bounds) else {
            return Ok(false);
        };
        let shift = free.translation.vector - bounds.position.translation.vector;
        if shift.norm_squared() == 0.0 {
            return Ok(true);
        }
        if let Some(body) = host.physics_body(entity) {
            let position = self.physics.position(body).ok_or_else(|| {
                PortalError::Physics(format!("body {body:?} of {entity:?} has no position"))
            })?;
            self.physics
                .set_position(body, &(Translation3::from(shift) * position));
        }
        debug!("{entity:?} moved {shift:?} out of solid geometry");
        host.collision_rules_changed(entity);
        Ok(true)
    }
}
