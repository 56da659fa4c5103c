//! Portal placement and the planes derived from it.
//!
//! The portal's local frame has `x` pointing out of the portal (forward), `y` to the left
//! and `z` up. The hole is the rectangle `|y| <= hole_half_width`, `|z| <= hole_half_height`
//! in the `x = 0` plane.

use crate::config::SimulatorConfig;
use crate::float_types::{Real, parry3d::bounding_volume::Aabb};
use crate::plane::Plane;
use crate::polyhedron::{Polyhedron, PolyhedronOrigin, SurfaceMaterial};
use nalgebra::{Isometry3, Point3, Translation3, UnitQuaternion, Vector3};

/// Position and orientation of a placed portal with its derived axes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PortalPlacement {
    pub origin: Point3<Real>,
    pub rotation: UnitQuaternion<Real>,
    pub forward: Vector3<Real>,
    pub right: Vector3<Real>,
    pub up: Vector3<Real>,
    /// The portal plane; its outside is the space in front of the portal.
    pub plane: Plane,
}

impl PortalPlacement {
    pub fn new(origin: Point3<Real>, rotation: UnitQuaternion<Real>) -> Self {
        let forward = rotation * Vector3::x();
        let right = -(rotation * Vector3::y());
        let up = rotation * Vector3::z();
        PortalPlacement {
            origin,
            rotation,
            forward,
            right,
            up,
            plane: Plane::from_point_normal(&origin, &forward),
        }
    }

    /// Local-to-world transform of the portal frame.
    pub fn isometry(&self) -> Isometry3<Real> {
        Isometry3::from_parts(Translation3::from(self.origin.coords), self.rotation)
    }

    pub fn to_local(&self, point: &Point3<Real>) -> Point3<Real> {
        self.isometry().inverse_transform_point(point)
    }

    pub fn to_world(&self, local: &Point3<Real>) -> Point3<Real> {
        self.isometry() * local
    }

    /// Signed distance of `point` in front of the portal plane.
    pub fn distance_in_front(&self, point: &Point3<Real>) -> Real {
        self.plane.signed_distance(point)
    }

    /// Plane with outward `normal` through `origin + normal * distance`.
    fn bound(&self, normal: Vector3<Real>, distance: Real) -> Plane {
        Plane::from_point_normal(&(self.origin + normal * distance), &normal)
    }

    /// Outward planes of the box spanning `forward.0..forward.1`, `right.0..right.1` and
    /// `up.0..up.1` along the portal axes.
    pub fn frame_box_planes(
        &self,
        forward: (Real, Real),
        right: (Real, Real),
        up: (Real, Real),
    ) -> [Plane; 6] {
        [
            self.bound(self.forward, forward.1),
            self.bound(-self.forward, -forward.0),
            self.bound(self.right, right.1),
            self.bound(-self.right, -right.0),
            self.bound(self.up, up.1),
            self.bound(-self.up, -up.0),
        ]
    }

    /// Prism over the rectangle `|right| <= half_width`, `|up| <= half_height`,
    /// from `front` in front of the plane to `back` behind it.
    fn prism_planes(&self, half_width: Real, half_height: Real, front: Real, back: Real) -> [Plane; 6] {
        self.frame_box_planes(
            (-back, front),
            (-half_width, half_width),
            (-half_height, half_height),
        )
    }

    /// Six outward planes of the oversized box that bounds all carving.
    pub fn carve_planes(&self, config: &SimulatorConfig) -> [Plane; 6] {
        self.prism_planes(
            config.hole_half_width + config.carve_side_margin,
            config.hole_half_height + config.carve_side_margin,
            config.carve_front_margin,
            config.carve_back_margin,
        )
    }

    /// World-space bounds of the carve box, optionally grown by `margin`.
    pub fn carve_aabb(&self, config: &SimulatorConfig, margin: Real) -> Aabb {
        let hw = config.hole_half_width + config.carve_side_margin + margin;
        let hh = config.hole_half_height + config.carve_side_margin + margin;
        let front = config.carve_front_margin + margin;
        let back = config.carve_back_margin + margin;
        let mut mins = Point3::new(Real::MAX, Real::MAX, Real::MAX);
        let mut maxs = Point3::new(-Real::MAX, -Real::MAX, -Real::MAX);
        for i in 0..8 {
            let f = if i & 1 == 0 { front } else { -back };
            let r = if i & 2 == 0 { hw } else { -hw };
            let u = if i & 4 == 0 { hh } else { -hh };
            let corner = self.origin + self.forward * f + self.right * r + self.up * u;
            mins = mins.inf(&corner);
            maxs = maxs.sup(&corner);
        }
        Aabb::new(mins, maxs)
    }

    /// The four outward side planes of the hole prism (right, left, up, down).
    pub fn hole_side_planes(&self, config: &SimulatorConfig) -> [Plane; 4] {
        [
            self.bound(self.right, config.hole_half_width),
            self.bound(-self.right, config.hole_half_width),
            self.bound(self.up, config.hole_half_height),
            self.bound(-self.up, config.hole_half_height),
        ]
    }

    /// Hole rectangle extruded from `front_depth` in front of the plane to the back of the
    /// carve box.
    pub fn hole_prism_planes(&self, config: &SimulatorConfig, front_depth: Real) -> [Plane; 6] {
        self.prism_planes(
            config.hole_half_width,
            config.hole_half_height,
            front_depth,
            config.carve_back_margin,
        )
    }

    /// Solid version of [`hole_prism_planes`](Self::hole_prism_planes).
    pub fn hole_volume(&self, config: &SimulatorConfig, front_depth: Real) -> Option<Polyhedron> {
        Polyhedron::from_planes(
            &self.hole_prism_planes(config, front_depth),
            config.clip_epsilon,
            SurfaceMaterial::default(),
            PolyhedronOrigin::Generated,
        )
    }

    /// Whether `point` projects into the hole rectangle.
    pub fn point_within_hole_rect(&self, point: &Point3<Real>, config: &SimulatorConfig) -> bool {
        let d = point - self.origin;
        d.dot(&self.right).abs() <= config.hole_half_width
            && d.dot(&self.up).abs() <= config.hole_half_height
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::float_types::FRAC_PI_2;

    #[test]
    fn axes_follow_rotation() {
        let placement = PortalPlacement::new(
            Point3::new(1.0, 2.0, 3.0),
            UnitQuaternion::from_axis_angle(&Vector3::z_axis(), FRAC_PI_2),
        );
        assert!((placement.forward - Vector3::y()).norm() < 1e-9);
        assert!((placement.right - Vector3::x()).norm() < 1e-9);
        assert!((placement.up - Vector3::z()).norm() < 1e-9);
        assert!(placement.distance_in_front(&Point3::new(1.0, 5.0, 3.0)) > 0.0);
    }

    #[test]
    fn carve_box_contains_hole() {
        let config = SimulatorConfig::default();
        let placement = PortalPlacement::new(Point3::origin(), UnitQuaternion::identity());
        let carve = Polyhedron::from_planes(
            &placement.carve_planes(&config),
            1e-6,
            SurfaceMaterial::default(),
            PolyhedronOrigin::Generated,
        )
        .unwrap();
        let hole = placement.hole_volume(&config, config.hole_front_depth).unwrap();
        assert!(hole.vertices().iter().all(|v| carve.contains_point(v, 1e-6)));
        let aabb = placement.carve_aabb(&config, 0.0);
        assert!((aabb.maxs.x - config.carve_front_margin).abs() < 1e-9);
        assert!((aabb.mins.x + config.carve_back_margin).abs() < 1e-9);
    }
}
