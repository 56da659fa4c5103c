//! Static level geometry as seen by the portal simulators.
//!
//! The host's BSP and static-prop systems are reached through [`LevelGeometry`]. Hosts that
//! do not have their own spatial structures can describe a level directly with
//! [`StaticLevel`].

use crate::errors::PortalError;
use crate::float_types::{
    Real,
    parry3d::bounding_volume::{Aabb, BoundingVolume},
};
use crate::plane::Plane;
use crate::polyhedron::{Polyhedron, PolyhedronOrigin, SurfaceMaterial};
use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

/// Identifies one static prop in the level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PropHandle(pub u32);

/// Spatial and shape queries against the level's static geometry.
pub trait LevelGeometry {
    /// Number of brushes; brush indices are `0..brush_count()`.
    fn brush_count(&self) -> usize;

    /// Outward-facing bounding planes of a convex brush.
    fn brush_planes(&self, index: usize) -> Option<Vec<Plane>>;

    fn brush_material(&self, _index: usize) -> SurfaceMaterial {
        SurfaceMaterial::default()
    }

    /// Every static prop in the level.
    fn static_props(&self) -> Vec<PropHandle>;

    /// Convex pieces of a prop's collision model as point clouds in world space.
    /// Props without collision data return an empty list.
    fn static_prop_hulls(&self, prop: PropHandle) -> Vec<Vec<Point3<Real>>>;

    fn static_prop_material(&self, _prop: PropHandle) -> SurfaceMaterial {
        SurfaceMaterial::default()
    }

    /// Brush indices whose bounds intersect `bounds`.
    fn brushes_in_box(&self, bounds: &Aabb) -> Vec<usize>;

    /// Static props whose bounds intersect `bounds`.
    fn static_props_in_box(&self, bounds: &Aabb) -> Vec<PropHandle>;
}

/// A convex brush described by its bounding planes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Brush {
    pub planes: Vec<Plane>,
    pub material: SurfaceMaterial,
    pub mins: Point3<Real>,
    pub maxs: Point3<Real>,
}

impl Brush {
    /// Axis-aligned box brush.
    pub fn cuboid(mins: Point3<Real>, maxs: Point3<Real>, material: SurfaceMaterial) -> Self {
        let planes = vec![
            Plane::from_normal(Vector3::x(), maxs.x),
            Plane::from_normal(-Vector3::x(), -mins.x),
            Plane::from_normal(Vector3::y(), maxs.y),
            Plane::from_normal(-Vector3::y(), -mins.y),
            Plane::from_normal(Vector3::z(), maxs.z),
            Plane::from_normal(-Vector3::z(), -mins.z),
        ];
        Brush {
            planes,
            material,
            mins,
            maxs,
        }
    }

    /// Brush from arbitrary planes; `mins`/`maxs` must enclose the brush.
    pub fn from_planes(
        planes: Vec<Plane>,
        mins: Point3<Real>,
        maxs: Point3<Real>,
        material: SurfaceMaterial,
    ) -> Self {
        Brush {
            planes,
            material,
            mins,
            maxs,
        }
    }

    fn aabb(&self) -> Aabb {
        Aabb::new(self.mins, self.maxs)
    }
}

/// A static prop whose collision model is a list of convex point clouds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticProp {
    pub handle: PropHandle,
    pub hulls: Vec<Vec<Point3<Real>>>,
    pub material: SurfaceMaterial,
}

impl StaticProp {
    fn aabb(&self) -> Option<Aabb> {
        let mut points = self.hulls.iter().flatten();
        let first = points.next()?;
        let mut aabb = Aabb::new(*first, *first);
        for p in points {
            aabb.take_point(*p);
        }
        Some(aabb)
    }
}

/// In-memory level made of brushes and static props.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StaticLevel {
    pub brushes: Vec<Brush>,
    pub props: Vec<StaticProp>,
}

impl StaticLevel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a brush and return its index.
    pub fn add_brush(&mut self, brush: Brush) -> usize {
        self.brushes.push(brush);
        self.brushes.len() - 1
    }

    /// Add a brush after checking that its planes enclose a volume.
    pub fn try_add_brush(&mut self, brush: Brush, eps: Real) -> Result<usize, PortalError> {
        let index = self.brushes.len();
        if Polyhedron::from_planes(&brush.planes, eps, brush.material, PolyhedronOrigin::Brush(index))
            .is_none()
        {
            return Err(PortalError::DegeneratePolyhedron(format!(
                "brush {index} with {} planes encloses no volume",
                brush.planes.len()
            )));
        }
        Ok(self.add_brush(brush))
    }

    /// Add an axis-aligned box brush and return its index.
    pub fn add_box(&mut self, mins: Point3<Real>, maxs: Point3<Real>) -> usize {
        self.add_brush(Brush::cuboid(mins, maxs, SurfaceMaterial::default()))
    }

    /// Add a static prop; the handle is assigned sequentially.
    pub fn add_prop(
        &mut self,
        hulls: Vec<Vec<Point3<Real>>>,
        material: SurfaceMaterial,
    ) -> PropHandle {
        let handle = PropHandle(self.props.len() as u32);
        self.props.push(StaticProp {
            handle,
            hulls,
            material,
        });
        handle
    }

    fn prop(&self, handle: PropHandle) -> Option<&StaticProp> {
        self.props.iter().find(|p| p.handle == handle)
    }
}

impl LevelGeometry for StaticLevel {
    fn brush_count(&self) -> usize {
        self.brushes.len()
    }

    fn brush_planes(&self, index: usize) -> Option<Vec<Plane>> {
        self.brushes.get(index).map(|b| b.planes.clone())
    }

    fn brush_material(&self, index: usize) -> SurfaceMaterial {
        self.brushes
            .get(index)
            .map(|b| b.material)
            .unwrap_or_default()
    }

    fn static_props(&self) -> Vec<PropHandle> {
        self.props.iter().map(|p| p.handle).collect()
    }

    fn static_prop_hulls(&self, prop: PropHandle) -> Vec<Vec<Point3<Real>>> {
        self.prop(prop).map(|p| p.hulls.clone()).unwrap_or_default()
    }

    fn static_prop_material(&self, prop: PropHandle) -> SurfaceMaterial {
        self.prop(prop).map(|p| p.material).unwrap_or_default()
    }

    fn brushes_in_box(&self, bounds: &Aabb) -> Vec<usize> {
        self.brushes
            .iter()
            .enumerate()
            .filter(|(_, b)| b.aabb().intersects(bounds))
            .map(|(i, _)| i)
            .collect()
    }

    fn static_props_in_box(&self, bounds: &Aabb) -> Vec<PropHandle> {
        self.props
            .iter()
            .filter(|p| p.aabb().is_some_and(|aabb| aabb.intersects(bounds)))
            .map(|p| p.handle)
            .collect()
    }
}
