//! Collision assembly: polyhedron sets turned into queryable parry shapes.
//!
//! Every fragment becomes one convex part so a trace can report which fragment (and thus
//! which surface material) it hit; the parts are also merged into one compound shape for
//! the physics bodies. Shapes are reference counted, so the linked simulator's collision
//! is used in place through the link transform instead of being copied.

use crate::carve::CarvedGeometry;
use crate::float_types::{
    Real,
    parry3d::{
        query::{self, PointQuery, Ray, RayCast, ShapeCastOptions},
        shape::{Shape, SharedShape},
    },
};
use crate::polyhedron::{Polyhedron, PolyhedronOrigin, SurfaceMaterial};
use log::{debug, warn};
use nalgebra::{Isometry3, Point3, Vector3};
use std::fmt;

/// What a piece of simulator collision represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollisionSource {
    LocalWorld,
    LocalWall,
    LocalTube,
    /// The linked portal's world brushes, seen through the link.
    RemoteWorld,
    /// The linked portal's static props, seen through the link.
    RemoteStaticProps,
}

impl CollisionSource {
    pub const fn is_remote(self) -> bool {
        matches!(
            self,
            CollisionSource::RemoteWorld | CollisionSource::RemoteStaticProps
        )
    }
}

/// One convex fragment of a collision representation.
#[derive(Clone)]
pub struct CollisionPart {
    pub shape: SharedShape,
    pub material: SurfaceMaterial,
    pub origin: PolyhedronOrigin,
}

/// Closest hit against a representation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PartHit {
    /// Index into [`CollisionRepresentation::parts`].
    pub part: usize,
    /// Fraction of the swept motion at which the hit happens.
    pub fraction: Real,
    pub point: Point3<Real>,
    pub normal: Vector3<Real>,
}

/// A polyhedron set converted into parry shapes.
#[derive(Clone)]
pub struct CollisionRepresentation {
    source: CollisionSource,
    parts: Vec<CollisionPart>,
    merged: Option<SharedShape>,
}

impl fmt::Debug for CollisionRepresentation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollisionRepresentation")
            .field("source", &self.source)
            .field("parts", &self.parts.len())
            .finish()
    }
}

impl CollisionRepresentation {
    pub fn empty(source: CollisionSource) -> Self {
        CollisionRepresentation {
            source,
            parts: Vec::new(),
            merged: None,
        }
    }

    /// Convert every polyhedron; polyhedra parry cannot hull are skipped.
    pub fn build<'a, I>(source: CollisionSource, polyhedra: I) -> Self
    where
        I: IntoIterator<Item = &'a Polyhedron>,
    {
        let mut parts = Vec::new();
        for poly in polyhedra {
            match poly.to_shape() {
                Some(shape) => parts.push(CollisionPart {
                    shape,
                    material: poly.material(),
                    origin: poly.origin(),
                }),
                None => warn!("{source:?}: convex hull failed for fragment of {:?}", poly.origin()),
            }
        }
        let merged = (!parts.is_empty()).then(|| {
            SharedShape::compound(
                parts
                    .iter()
                    .map(|p| (Isometry3::identity(), p.shape.clone()))
                    .collect(),
            )
        });
        CollisionRepresentation {
            source,
            parts,
            merged,
        }
    }

    pub const fn source(&self) -> CollisionSource {
        self.source
    }

    pub fn parts(&self) -> &[CollisionPart] {
        &self.parts
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// All parts merged into one compound shape, `None` when empty.
    pub fn merged(&self) -> Option<&SharedShape> {
        self.merged.as_ref()
    }

    /// Closest hit of the segment `start → start + delta`, with the representation placed
    /// at `position`.
    pub fn cast_ray(
        &self,
        position: &Isometry3<Real>,
        start: &Point3<Real>,
        delta: &Vector3<Real>,
    ) -> Option<PartHit> {
        let ray = Ray::new(*start, *delta);
        let mut best: Option<PartHit> = None;
        for (index, part) in self.parts.iter().enumerate() {
            let Some(hit) = part.shape.cast_ray_and_get_normal(position, &ray, 1.0, true) else {
                continue;
            };
            if best.is_none_or(|b| hit.time_of_impact < b.fraction) {
                best = Some(PartHit {
                    part: index,
                    fraction: hit.time_of_impact,
                    point: ray.point_at(hit.time_of_impact),
                    normal: hit.normal,
                });
            }
        }
        best
    }

    /// Closest hit of `shape` swept from `shape_position` by `delta`.
    pub fn cast_shape(
        &self,
        position: &Isometry3<Real>,
        shape: &dyn Shape,
        shape_position: &Isometry3<Real>,
        delta: &Vector3<Real>,
    ) -> Option<PartHit> {
        let mut best: Option<PartHit> = None;
        for (index, part) in self.parts.iter().enumerate() {
            let hit = query::cast_shapes(
                position,
                &Vector3::zeros(),
                &*part.shape,
                shape_position,
                delta,
                shape,
                ShapeCastOptions::with_max_time_of_impact(1.0),
            );
            let Ok(Some(hit)) = hit else {
                continue;
            };
            if best.is_none_or(|b| hit.time_of_impact < b.fraction) {
                best = Some(PartHit {
                    part: index,
                    fraction: hit.time_of_impact,
                    point: position * hit.witness1,
                    normal: position.rotation * hit.normal1.into_inner(),
                });
            }
        }
        best
    }

    /// Whether `shape` at `shape_position` overlaps any part.
    pub fn intersects(
        &self,
        position: &Isometry3<Real>,
        shape: &dyn Shape,
        shape_position: &Isometry3<Real>,
    ) -> bool {
        self.parts.iter().any(|part| {
            query::intersection_test(position, &*part.shape, shape_position, shape).unwrap_or(false)
        })
    }

    /// Summed penetration depth of `shape` into the parts.
    pub fn penetration(
        &self,
        position: &Isometry3<Real>,
        shape: &dyn Shape,
        shape_position: &Isometry3<Real>,
    ) -> Real {
        self.parts
            .iter()
            .filter_map(|part| {
                query::contact(position, &*part.shape, shape_position, shape, 0.0)
                    .ok()
                    .flatten()
            })
            .map(|contact| (-contact.dist).max(0.0))
            .sum()
    }
}

/// The collision shapes a simulator builds from its own carve.
#[derive(Clone)]
pub struct LocalCollision {
    pub world: CollisionRepresentation,
    pub world_props: CollisionRepresentation,
    pub wall: CollisionRepresentation,
    pub tube: CollisionRepresentation,
    /// Hole-containment volume.
    pub hole: Option<SharedShape>,
    /// Hole-lock region.
    pub hole_lock: Option<SharedShape>,
    created: bool,
}

impl Default for LocalCollision {
    fn default() -> Self {
        LocalCollision {
            world: CollisionRepresentation::empty(CollisionSource::LocalWorld),
            world_props: CollisionRepresentation::empty(CollisionSource::LocalWorld),
            wall: CollisionRepresentation::empty(CollisionSource::LocalWall),
            tube: CollisionRepresentation::empty(CollisionSource::LocalTube),
            hole: None,
            hole_lock: None,
            created: false,
        }
    }
}

impl fmt::Debug for LocalCollision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalCollision")
            .field("world", &self.world)
            .field("world_props", &self.world_props)
            .field("wall", &self.wall)
            .field("tube", &self.tube)
            .field("hole", &self.hole.is_some())
            .field("created", &self.created)
            .finish()
    }
}

impl fmt::Debug for CollisionPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollisionPart")
            .field("material", &self.material)
            .field("origin", &self.origin)
            .finish()
    }
}

impl LocalCollision {
    /// Build shapes from `carved`. Does nothing and returns `false` if already created.
    pub fn create(&mut self, carved: &CarvedGeometry) -> bool {
        if self.created {
            return false;
        }
        self.world = CollisionRepresentation::build(CollisionSource::LocalWorld, &carved.world_brushes);
        self.world_props =
            CollisionRepresentation::build(CollisionSource::LocalWorld, &carved.world_props);
        self.wall = CollisionRepresentation::build(CollisionSource::LocalWall, &carved.wall);
        self.tube = CollisionRepresentation::build(CollisionSource::LocalTube, &carved.tube);
        self.hole = carved.hole.as_ref().and_then(Polyhedron::to_shape);
        self.hole_lock = carved.hole_lock.as_ref().and_then(Polyhedron::to_shape);
        self.created = true;
        debug!(
            "local collision created: {} world, {} props, {} wall, {} tube parts",
            self.world.parts.len(),
            self.world_props.parts.len(),
            self.wall.parts.len(),
            self.tube.parts.len()
        );
        true
    }

    /// Release every shape. Safe to call when nothing was created.
    pub fn clear(&mut self) {
        *self = LocalCollision::default();
    }

    pub const fn is_created(&self) -> bool {
        self.created
    }

    /// World, props, wall and tube, in that order.
    pub fn representations(&self) -> [&CollisionRepresentation; 4] {
        [&self.world, &self.world_props, &self.wall, &self.tube]
    }

    /// Whether `shape` at `shape_position` overlaps the hole-containment volume.
    /// Always `false` without a hole.
    pub fn in_hole(&self, shape: &dyn Shape, shape_position: &Isometry3<Real>) -> bool {
        overlaps(self.hole.as_ref(), shape, shape_position)
    }

    /// Whether `point` is inside the hole-lock region.
    pub fn in_hole_lock(&self, point: &Point3<Real>) -> bool {
        self.hole_lock
            .as_ref()
            .is_some_and(|lock| lock.contains_point(&Isometry3::identity(), point))
    }
}

fn overlaps(volume: Option<&SharedShape>, shape: &dyn Shape, shape_position: &Isometry3<Real>) -> bool {
    volume.is_some_and(|v| {
        query::intersection_test(&Isometry3::identity(), &**v, shape_position, shape).unwrap_or(false)
    })
}
