//! Ray and box traces that continue through a portal.
//!
//! A trace first runs against the simulator's own collision. When the sweep crosses the
//! portal plane inside the hole it also sees the linked simulator's world, placed behind
//! this portal by the link transform. Independently, a sweep aimed into the portal from
//! outside the hole-lock region is re-issued in the linked simulator's space from the
//! point where it crosses the plane, and the hit is brought back. The nearer of the two
//! results wins; on a tie the local one is kept.

use crate::collision::{CollisionRepresentation, CollisionSource};
use crate::entity::{EntityHost, EntityId};
use crate::float_types::{
    Real,
    parry3d::shape::{Cuboid, Shape},
};
use crate::link::LinkTransform;
use crate::physics::PhysicsEnvironment;
use crate::polyhedron::{PolyhedronOrigin, SurfaceMaterial};
use crate::simulator::{PortalSimulator, SimulatorHandle};
use crate::world::PortalWorld;
use nalgebra::{Isometry3, Point3, Translation3, UnitQuaternion, Vector3};

/// Surface information of a trace hit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TraceHit {
    /// Contact point in the simulator's space.
    pub point: Point3<Real>,
    /// Surface normal in the simulator's space.
    pub normal: Vector3<Real>,
    pub source: CollisionSource,
    pub material: SurfaceMaterial,
    pub origin: PolyhedronOrigin,
    /// The hit came from the trace re-issued in linked space.
    pub through_portal: bool,
}

/// Outcome of a trace. A miss has `fraction == 1.0` and no hit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TraceResult {
    pub fraction: Real,
    /// Where the sweep stopped.
    pub end: Point3<Real>,
    pub hit: Option<TraceHit>,
}

impl TraceResult {
    pub fn miss(end: Point3<Real>) -> Self {
        TraceResult {
            fraction: 1.0,
            end,
            hit: None,
        }
    }

    pub const fn did_hit(&self) -> bool {
        self.hit.is_some()
    }
}

#[derive(Clone, Copy)]
enum Sweep<'a> {
    Ray,
    Shape {
        shape: &'a dyn Shape,
        rotation: UnitQuaternion<Real>,
    },
}

impl Sweep<'_> {
    /// The same sweep seen from the other side of `link`.
    fn through(self, link: &LinkTransform) -> Self {
        match self {
            Sweep::Ray => Sweep::Ray,
            Sweep::Shape { shape, rotation } => Sweep::Shape {
                shape,
                rotation: link.rotation_to_linked(&rotation),
            },
        }
    }

    fn cast(
        self,
        representation: &CollisionRepresentation,
        position: &Isometry3<Real>,
        start: &Point3<Real>,
        delta: &Vector3<Real>,
        source: CollisionSource,
    ) -> Option<(Real, TraceHit)> {
        let hit = match self {
            Sweep::Ray => representation.cast_ray(position, start, delta),
            Sweep::Shape { shape, rotation } => representation.cast_shape(
                position,
                shape,
                &Isometry3::from_parts(Translation3::from(start.coords), rotation),
                delta,
            ),
        }?;
        let part = representation.parts().get(hit.part)?;
        Some((
            hit.fraction,
            TraceHit {
                point: hit.point,
                normal: hit.normal,
                source,
                material: part.material,
                origin: part.origin,
                through_portal: false,
            },
        ))
    }
}

/// Keep the nearest of several candidate hits; earlier candidates win ties.
#[derive(Default)]
struct Nearest(Option<(Real, TraceHit)>);

impl Nearest {
    fn offer(&mut self, candidate: Option<(Real, TraceHit)>) {
        if let Some((fraction, hit)) = candidate {
            if self.0.is_none_or(|(best, _)| fraction < best) {
                self.0 = Some((fraction, hit));
            }
        }
    }
}

impl<P: PhysicsEnvironment> PortalWorld<P> {
    /// Trace a ray from `start` to `end` in `handle`'s space.
    pub fn trace_ray(
        &self,
        handle: SimulatorHandle,
        start: &Point3<Real>,
        end: &Point3<Real>,
    ) -> TraceResult {
        self.trace(handle, Sweep::Ray, start, end)
    }

    /// Sweep an oriented box from `start` to `end`.
    pub fn trace_box(
        &self,
        handle: SimulatorHandle,
        start: &Point3<Real>,
        end: &Point3<Real>,
        half_extents: &Vector3<Real>,
        rotation: &UnitQuaternion<Real>,
    ) -> TraceResult {
        let cuboid = Cuboid::new(*half_extents);
        let sweep = Sweep::Shape {
            shape: &cuboid,
            rotation: *rotation,
        };
        self.trace(handle, sweep, start, end)
    }

    /// Sweep the entity's bounding box by `delta`. `None` if the entity has no bounds.
    pub fn trace_entity(
        &self,
        handle: SimulatorHandle,
        entity: EntityId,
        delta: &Vector3<Real>,
        host: &dyn EntityHost,
    ) -> Option<TraceResult> {
        let bounds = host.bounds(entity)?;
        let start = Point3::from(bounds.position.translation.vector);
        Some(self.trace_box(
            handle,
            &start,
            &(start + delta),
            &bounds.half_extents,
            &bounds.position.rotation,
        ))
    }

    /// Whether the segment crosses the portal plane, front to back, inside the hole.
    pub fn ray_is_in_portal_hole(
        &self,
        handle: SimulatorHandle,
        start: &Point3<Real>,
        end: &Point3<Real>,
    ) -> bool {
        let Some(sim) = self.simulators.get(handle) else {
            return false;
        };
        crossing(sim, start, end)
            .and_then(|t| sim.placement.map(|p| (t, p)))
            .is_some_and(|(t, placement)| {
                let point = start + (end - start) * t;
                placement.point_within_hole_rect(&point, &self.config)
            })
    }

    fn trace(
        &self,
        handle: SimulatorHandle,
        sweep: Sweep<'_>,
        start: &Point3<Real>,
        end: &Point3<Real>,
    ) -> TraceResult {
        let Some(sim) = self.simulators.get(handle) else {
            return TraceResult::miss(*end);
        };
        let mut delta = end - start;
        let length = delta.norm();
        if length > self.config.trace_max_distance {
            delta *= self.config.trace_max_distance / length;
        }
        let end = start + delta;
        if delta.norm_squared() == 0.0 {
            return TraceResult::miss(end);
        }

        let through_hole = self.ray_is_in_portal_hole(handle, start, &end);
        let linked = sim.linked.and_then(|l| self.simulators.get(l));
        let identity = Isometry3::identity();

        let mut nearest = Nearest::default();
        for representation in sim.collision.representations() {
            // Through a linked hole the sweep continues into linked space instead of the tube.
            if through_hole && linked.is_some() && representation.source() == CollisionSource::LocalTube {
                continue;
            }
            nearest.offer(sweep.cast(
                representation,
                &identity,
                start,
                &delta,
                representation.source(),
            ));
        }
        if let Some(linked) = linked.filter(|_| through_hole) {
            let position = sim.link.linked_to_this;
            for (representation, source) in [
                (&linked.collision.world, CollisionSource::RemoteWorld),
                (&linked.collision.world_props, CollisionSource::RemoteStaticProps),
            ] {
                nearest.offer(sweep.cast(representation, &position, start, &delta, source));
            }
        }

        if let Some(linked) = linked {
            let aimed_in = sim
                .placement
                .is_some_and(|p| delta.dot(&p.forward) < 0.0);
            if through_hole && aimed_in && !sim.collision.in_hole_lock(start) {
                if let Some(t_cross) = crossing(sim, start, &end) {
                    nearest.offer(trace_linked(sim, linked, sweep, start, &delta, t_cross));
                }
            }
        }

        match nearest.0 {
            Some((fraction, hit)) => TraceResult {
                fraction,
                end: start + delta * fraction,
                hit: Some(hit),
            },
            None => TraceResult::miss(end),
        }
    }
}

/// Fraction along `start → end` at which it crosses the portal plane from the front.
fn crossing(sim: &PortalSimulator, start: &Point3<Real>, end: &Point3<Real>) -> Option<Real> {
    let placement = sim.placement?;
    let ds = placement.distance_in_front(start);
    let de = placement.distance_in_front(end);
    (ds >= 0.0 && de < 0.0).then(|| ds / (ds - de))
}

/// Re-issue the rest of the sweep, from the plane crossing on, in linked space.
fn trace_linked(
    sim: &PortalSimulator,
    linked: &PortalSimulator,
    sweep: Sweep<'_>,
    start: &Point3<Real>,
    delta: &Vector3<Real>,
    t_cross: Real,
) -> Option<(Real, TraceHit)> {
    let link = &sim.link;
    let linked_start = link.point_to_linked(&(start + delta * t_cross));
    let linked_delta = link.vector_to_linked(&(delta * (1.0 - t_cross)));
    let linked_sweep = sweep.through(link);
    let identity = Isometry3::identity();

    let mut nearest = Nearest::default();
    for representation in linked.collision.representations() {
        nearest.offer(linked_sweep.cast(
            representation,
            &identity,
            &linked_start,
            &linked_delta,
            representation.source(),
        ));
    }
    let (fraction, hit) = nearest.0?;
    Some((
        t_cross + (1.0 - t_cross) * fraction,
        TraceHit {
            point: link.point_from_linked(&hit.point),
            normal: link.vector_from_linked(&hit.normal),
            through_portal: true,
            ..hit
        },
    ))
}
