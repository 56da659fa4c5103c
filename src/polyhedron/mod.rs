//! Convex polyhedra, the unit of clipping and collision assembly.
//!
//! A [`Polyhedron`] is immutable once built: clipping produces a new fragment and leaves
//! the source untouched, which lets the [cache](cache) hand out shared references with
//! level lifetime while every carve owns its own fragments.

use crate::float_types::{
    EPSILON, Real,
    parry3d::{bounding_volume::Aabb, shape::SharedShape, transformation},
};
use crate::level::PropHandle;
use crate::plane::Plane;
use hashbrown::HashSet;
use nalgebra::{Isometry3, Point3, Vector3};
use serde::{Deserialize, Serialize};

pub mod cache;
pub mod clip;

pub use cache::PolyhedronCache;

/// Half-size of the seed box used by [`Polyhedron::from_planes`]; anything reaching it
/// is treated as unbounded.
#[cfg(feature = "f64")]
const HALF_SPACE_BOUND: Real = 1.0e7;
#[cfg(feature = "f32")]
const HALF_SPACE_BOUND: Real = 1.0e5;

/// Surface material index carried from the level data into trace results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SurfaceMaterial(pub u16);

/// Where a polyhedron (or the fragment it was clipped from) came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PolyhedronOrigin {
    /// Decomposed from a static brush.
    Brush(usize),
    /// One convex piece of a static prop's collision model.
    StaticProp(PropHandle),
    /// Generated from planes only (tube slivers, hole volumes).
    Generated,
}

impl PolyhedronOrigin {
    pub const fn is_static_prop(&self) -> bool {
        matches!(self, PolyhedronOrigin::StaticProp(_))
    }
}

/// A planar face, vertices ordered counter-clockwise when seen from outside.
#[derive(Debug, Clone, PartialEq)]
pub struct Face {
    pub plane: Plane,
    pub indices: Vec<usize>,
}

/// An immutable convex mesh fragment.
#[derive(Debug, Clone)]
pub struct Polyhedron {
    vertices: Vec<Point3<Real>>,
    faces: Vec<Face>,
    edges: Vec<[usize; 2]>,
    aabb: Aabb,
    material: SurfaceMaterial,
    origin: PolyhedronOrigin,
}

impl Polyhedron {
    /// Assemble a polyhedron from face loops.
    ///
    /// Vertices closer than `eps` are welded, loops are re-wound to agree with their
    /// plane and faces that collapse below three distinct vertices are dropped.
    /// Returns `None` when the result is not a closed volume.
    pub fn from_face_loops(
        loops: Vec<(Plane, Vec<Point3<Real>>)>,
        eps: Real,
        material: SurfaceMaterial,
        origin: PolyhedronOrigin,
    ) -> Option<Self> {
        let mut vertices: Vec<Point3<Real>> = Vec::new();
        let mut faces = Vec::with_capacity(loops.len());
        let weld_sq = eps * eps;

        for (plane, points) in loops {
            let mut indices: Vec<usize> = Vec::with_capacity(points.len());
            for p in &points {
                let idx = match vertices
                    .iter()
                    .position(|v| (v - p).norm_squared() <= weld_sq)
                {
                    Some(idx) => idx,
                    None => {
                        vertices.push(*p);
                        vertices.len() - 1
                    },
                };
                if indices.last() != Some(&idx) {
                    indices.push(idx);
                }
            }
            while indices.len() > 1 && indices.first() == indices.last() {
                indices.pop();
            }
            if indices.len() < 3 {
                continue;
            }

            // Newell's method gives the winding of the loop as stored
            let newell = indices
                .iter()
                .zip(indices.iter().cycle().skip(1))
                .fold(Vector3::zeros(), |acc, (&a, &b)| {
                    acc + vertices[a].coords.cross(&vertices[b].coords)
                });
            if newell.norm_squared() < EPSILON * EPSILON {
                continue;
            }
            if newell.dot(&plane.normal) < 0.0 {
                indices.reverse();
            }
            faces.push(Face { plane, indices });
        }

        if faces.len() < 4 || vertices.len() < 4 {
            return None;
        }

        // Vertices only referenced by dropped faces would distort the bounds
        let mut used = vec![false; vertices.len()];
        for face in &faces {
            for &i in &face.indices {
                used[i] = true;
            }
        }
        if used.iter().any(|u| !u) {
            let mut remap = vec![usize::MAX; vertices.len()];
            let mut compact = Vec::with_capacity(vertices.len());
            for (i, v) in vertices.iter().enumerate() {
                if used[i] {
                    remap[i] = compact.len();
                    compact.push(*v);
                }
            }
            for face in &mut faces {
                for i in &mut face.indices {
                    *i = remap[*i];
                }
            }
            vertices = compact;
        }

        let polyhedron = Self::from_parts(vertices, faces, material, origin);
        (polyhedron.volume() > EPSILON).then_some(polyhedron)
    }

    fn from_parts(
        vertices: Vec<Point3<Real>>,
        faces: Vec<Face>,
        material: SurfaceMaterial,
        origin: PolyhedronOrigin,
    ) -> Self {
        let mut seen = HashSet::new();
        let mut edges = Vec::new();
        for face in &faces {
            for (&a, &b) in face.indices.iter().zip(face.indices.iter().cycle().skip(1)) {
                let key = if a < b { [a, b] } else { [b, a] };
                if seen.insert(key) {
                    edges.push(key);
                }
            }
        }
        let aabb = aabb_of(&vertices);
        Polyhedron {
            vertices,
            faces,
            edges,
            aabb,
            material,
            origin,
        }
    }

    /// Axis-aligned box `[mins, maxs]`.
    pub fn from_box(mins: Point3<Real>, maxs: Point3<Real>) -> Option<Self> {
        let corner = |i: usize| {
            Point3::new(
                if i & 1 == 0 { mins.x } else { maxs.x },
                if i & 2 == 0 { mins.y } else { maxs.y },
                if i & 4 == 0 { mins.z } else { maxs.z },
            )
        };
        // (normal, corner indices) for the six sides
        let sides: [(Vector3<Real>, [usize; 4]); 6] = [
            (-Vector3::x(), [0, 4, 6, 2]),
            (Vector3::x(), [1, 3, 7, 5]),
            (-Vector3::y(), [0, 1, 5, 4]),
            (Vector3::y(), [2, 6, 7, 3]),
            (-Vector3::z(), [0, 2, 3, 1]),
            (Vector3::z(), [4, 5, 7, 6]),
        ];
        let loops = sides
            .iter()
            .map(|(normal, idx)| {
                let pts: Vec<_> = idx.iter().map(|&i| corner(i)).collect();
                (Plane::from_point_normal(&pts[0], normal), pts)
            })
            .collect();
        Self::from_face_loops(
            loops,
            EPSILON,
            SurfaceMaterial::default(),
            PolyhedronOrigin::Generated,
        )
    }

    /// Box with the given half extents placed by `position`.
    pub fn from_oriented_box(
        position: &Isometry3<Real>,
        half_extents: &Vector3<Real>,
    ) -> Option<Self> {
        let local = Self::from_box(Point3::from(-half_extents), Point3::from(*half_extents))?;
        Some(local.transformed(position))
    }

    /// Intersection of the inside half-spaces of `planes`.
    ///
    /// Returns `None` for empty, degenerate or unbounded intersections.
    pub fn from_planes(
        planes: &[Plane],
        eps: Real,
        material: SurfaceMaterial,
        origin: PolyhedronOrigin,
    ) -> Option<Self> {
        let bound = Point3::new(HALF_SPACE_BOUND, HALF_SPACE_BOUND, HALF_SPACE_BOUND);
        let seed = Self::from_box(-bound, bound)?;
        let clipped = seed.clip(planes, eps)?;
        let limit = HALF_SPACE_BOUND * 0.5;
        if clipped
            .vertices
            .iter()
            .any(|v| v.x.abs() >= limit || v.y.abs() >= limit || v.z.abs() >= limit)
        {
            return None;
        }
        Some(clipped.with_tags(material, origin))
    }

    /// Convex hull of a point cloud.
    pub fn from_points(
        points: &[Point3<Real>],
        eps: Real,
        material: SurfaceMaterial,
        origin: PolyhedronOrigin,
    ) -> Option<Self> {
        if points.len() < 4 {
            return None;
        }
        let Ok((hull_points, triangles)) = transformation::try_convex_hull(points) else {
            return None;
        };
        if hull_points.is_empty() {
            return None;
        }
        let inner = Point3::from(
            hull_points
                .iter()
                .fold(Vector3::zeros(), |acc, p| acc + p.coords)
                / hull_points.len() as Real,
        );
        let mut planes: Vec<Plane> = Vec::new();
        for tri in &triangles {
            let Some(mut plane) = Plane::from_points(
                hull_points[tri[0] as usize],
                hull_points[tri[1] as usize],
                hull_points[tri[2] as usize],
            ) else {
                continue;
            };
            if plane.signed_distance(&inner) > 0.0 {
                plane.flip();
            }
            if !planes.iter().any(|p| p.approx_eq(&plane, eps.max(1e-6))) {
                planes.push(plane);
            }
        }
        if planes.len() < 4 {
            return None;
        }
        Self::from_planes(&planes, eps, material, origin)
    }

    pub(crate) fn with_tags(mut self, material: SurfaceMaterial, origin: PolyhedronOrigin) -> Self {
        self.material = material;
        self.origin = origin;
        self
    }

    pub fn vertices(&self) -> &[Point3<Real>] {
        &self.vertices
    }

    pub fn faces(&self) -> &[Face] {
        &self.faces
    }

    pub fn edges(&self) -> &[[usize; 2]] {
        &self.edges
    }

    pub fn planes(&self) -> impl Iterator<Item = &Plane> + '_ {
        self.faces.iter().map(|f| &f.plane)
    }

    pub const fn aabb(&self) -> &Aabb {
        &self.aabb
    }

    pub const fn material(&self) -> SurfaceMaterial {
        self.material
    }

    pub const fn origin(&self) -> PolyhedronOrigin {
        self.origin
    }

    /// Mean of the vertices; always strictly inside a non-degenerate polyhedron.
    pub fn center(&self) -> Point3<Real> {
        let sum = self
            .vertices
            .iter()
            .fold(Vector3::zeros(), |acc, v| acc + v.coords);
        Point3::from(sum / self.vertices.len() as Real)
    }

    /// Tetrahedra of a fan around the center, as `(six times signed volume, centroid)`.
    fn tetrahedra(&self) -> impl Iterator<Item = (Real, Point3<Real>)> + '_ {
        let c = self.center();
        self.faces.iter().flat_map(move |face| {
            let v0 = self.vertices[face.indices[0]];
            face.indices.windows(2).skip(1).map(move |pair| {
                let v1 = self.vertices[pair[0]];
                let v2 = self.vertices[pair[1]];
                let six_vol = (v0 - c).dot(&(v1 - c).cross(&(v2 - c)));
                let centroid = Point3::from((c.coords + v0.coords + v1.coords + v2.coords) / 4.0);
                (six_vol, centroid)
            })
        })
    }

    /// Enclosed volume.
    pub fn volume(&self) -> Real {
        self.tetrahedra().map(|(six_vol, _)| six_vol).sum::<Real>() / 6.0
    }

    /// Center of mass of the enclosed volume.
    pub fn centroid(&self) -> Point3<Real> {
        let (weight, moment) = self
            .tetrahedra()
            .fold((0.0, Vector3::zeros()), |(w, m), (six_vol, c)| {
                (w + six_vol, m + c.coords * six_vol)
            });
        if weight.abs() < EPSILON {
            return self.center();
        }
        Point3::from(moment / weight)
    }

    /// Whether `point` lies inside or within `eps` of the boundary.
    pub fn contains_point(&self, point: &Point3<Real>, eps: Real) -> bool {
        self.faces
            .iter()
            .all(|f| f.plane.signed_distance(point) <= eps)
    }

    /// Rigidly move the polyhedron.
    pub fn transformed(&self, iso: &Isometry3<Real>) -> Self {
        let vertices: Vec<_> = self.vertices.iter().map(|v| iso * v).collect();
        let faces = self
            .faces
            .iter()
            .map(|f| Face {
                plane: f.plane.transformed(iso),
                indices: f.indices.clone(),
            })
            .collect();
        Self::from_parts(vertices, faces, self.material, self.origin)
    }

    /// Parry convex hull of this polyhedron's vertices.
    ///
    /// `None` when the vertices do not span a volume.
    pub fn to_shape(&self) -> Option<SharedShape> {
        let (points, triangles) = transformation::try_convex_hull(&self.vertices).ok()?;
        if triangles.is_empty() {
            return None;
        }
        SharedShape::convex_mesh(points, &triangles)
    }
}

fn aabb_of(points: &[Point3<Real>]) -> Aabb {
    let mut mins = Point3::new(Real::MAX, Real::MAX, Real::MAX);
    let mut maxs = Point3::new(-Real::MAX, -Real::MAX, -Real::MAX);
    for p in points {
        mins = mins.inf(p);
        maxs = maxs.sup(p);
    }
    if mins.x > maxs.x {
        return Aabb::new(Point3::origin(), Point3::origin());
    }
    Aabb::new(mins, maxs)
}
