//! Oriented planes and half-space classification
//!
//! Every plane in this crate follows the outward half-space convention used by the
//! clipper: a point `p` is *inside* (kept) when `normal · p - w <= 0` and *outside*
//! (clipped away) when it is positive.

use crate::float_types::{EPSILON, Real};
use nalgebra::{Isometry3, Point3, Vector3};
use serde::{Deserialize, Serialize};

// Point classification constants
pub const COPLANAR: i8 = 0;
pub const FRONT: i8 = 1;
pub const BACK: i8 = 2;
pub const SPANNING: i8 = 3;

/// A plane `normal · p = w` with a unit normal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Plane {
    /// Unit normal vector of the plane
    pub normal: Vector3<Real>,
    /// Distance from origin along normal (plane equation: n·p = w)
    pub w: Real,
}

impl Plane {
    /// Create a new plane from a (not necessarily unit) normal and distance.
    ///
    /// The distance is rescaled together with the normal so the plane keeps
    /// describing the same set of points.
    pub fn from_normal(normal: Vector3<Real>, w: Real) -> Self {
        let len = normal.norm();
        if len < EPSILON {
            return Plane {
                normal: Vector3::z(),
                w: 0.0,
            };
        }
        Plane {
            normal: normal / len,
            w: w / len,
        }
    }

    /// Plane through `point` facing along `normal`.
    pub fn from_point_normal(point: &Point3<Real>, normal: &Vector3<Real>) -> Self {
        let n = normal.normalize();
        Plane {
            normal: n,
            w: n.dot(&point.coords),
        }
    }

    /// Create a plane from three points
    /// The normal direction follows the right-hand rule: (p2-p1) × (p3-p1)
    pub fn from_points(p1: Point3<Real>, p2: Point3<Real>, p3: Point3<Real>) -> Option<Self> {
        let normal = (p2 - p1).cross(&(p3 - p1));
        if normal.norm_squared() < EPSILON * EPSILON {
            return None;
        }
        let normal = normal.normalize();
        Some(Plane {
            normal,
            w: normal.dot(&p1.coords),
        })
    }

    /// Get the plane normal
    pub const fn normal(&self) -> Vector3<Real> {
        self.normal
    }

    /// Get the offset (distance from origin)
    pub const fn offset(&self) -> Real {
        self.w
    }

    /// Flip the plane (reverse normal and distance)
    pub fn flip(&mut self) {
        self.normal = -self.normal;
        self.w = -self.w;
    }

    /// Return a flipped copy of this plane
    pub fn flipped(&self) -> Self {
        Plane {
            normal: -self.normal,
            w: -self.w,
        }
    }

    /// The same plane pushed `distance` along its normal.
    pub fn offset_by(&self, distance: Real) -> Self {
        Plane {
            normal: self.normal,
            w: self.w + distance,
        }
    }

    /// Signed distance from `point` to the plane, positive on the outside.
    #[inline]
    pub fn signed_distance(&self, point: &Point3<Real>) -> Real {
        self.normal.dot(&point.coords) - self.w
    }

    /// Classify a point against the plane with the given tolerance.
    pub fn classify_point(&self, point: &Point3<Real>, eps: Real) -> i8 {
        let d = self.signed_distance(point);
        if d > eps {
            FRONT
        } else if d < -eps {
            BACK
        } else {
            COPLANAR
        }
    }

    /// Classify a set of points, returning the OR of their individual classes.
    pub fn classify_points<'a, I>(&self, points: I, eps: Real) -> i8
    where
        I: IntoIterator<Item = &'a Point3<Real>>,
    {
        points
            .into_iter()
            .fold(COPLANAR, |acc, p| acc | self.classify_point(p, eps))
    }

    /// Point where the segment `a → b` crosses the plane, as a parameter `t` in `[0, 1]`.
    pub fn intersect_segment(&self, a: &Point3<Real>, b: &Point3<Real>) -> Option<Real> {
        let denom = self.normal.dot(&(b - a));
        if denom.abs() < EPSILON {
            return None;
        }
        let t = (self.w - self.normal.dot(&a.coords)) / denom;
        (-EPSILON..=1.0 + EPSILON)
            .contains(&t)
            .then(|| t.clamp(0.0, 1.0))
    }

    /// Apply a rigid transform to the plane.
    pub fn transformed(&self, iso: &Isometry3<Real>) -> Self {
        let normal = iso.rotation * self.normal;
        let point = iso * Point3::from(self.normal * self.w);
        Plane {
            normal,
            w: normal.dot(&point.coords),
        }
    }

    /// Orthonormal basis `(u, v)` spanning the plane with `u × v = normal`.
    pub fn basis(&self) -> (Vector3<Real>, Vector3<Real>) {
        let n = self.normal;
        let helper = if n.x.abs() < 0.6 {
            Vector3::x()
        } else if n.y.abs() < 0.6 {
            Vector3::y()
        } else {
            Vector3::z()
        };
        let u = helper.cross(&n).normalize();
        let v = n.cross(&u);
        (u, v)
    }

    /// Whether two planes describe the same oriented surface within `eps`.
    pub fn approx_eq(&self, other: &Plane, eps: Real) -> bool {
        (self.normal - other.normal).norm() < eps && (self.w - other.w).abs() < eps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Translation3, UnitQuaternion};

    #[test]
    fn from_normal_rescales_distance() {
        let plane = Plane::from_normal(Vector3::new(0.0, 2.0, 0.0), 4.0);
        assert!((plane.normal - Vector3::y()).norm() < 1e-12);
        assert!((plane.w - 2.0).abs() < 1e-12);
    }

    #[test]
    fn classify_against_tolerance() {
        let plane = Plane::from_normal(Vector3::x(), 1.0);
        assert_eq!(plane.classify_point(&Point3::new(2.0, 0.0, 0.0), 1e-6), FRONT);
        assert_eq!(plane.classify_point(&Point3::new(0.0, 0.0, 0.0), 1e-6), BACK);
        assert_eq!(plane.classify_point(&Point3::new(1.0, 5.0, 0.0), 1e-6), COPLANAR);
    }

    #[test]
    fn transformed_plane_keeps_points_on_it() {
        let plane = Plane::from_normal(Vector3::z(), 3.0);
        let iso = Isometry3::from_parts(
            Translation3::new(10.0, -4.0, 2.0),
            UnitQuaternion::from_euler_angles(0.3, -0.2, 1.1),
        );
        let moved = plane.transformed(&iso);
        let on_plane = Point3::new(7.0, -1.0, 3.0);
        assert!(moved.signed_distance(&(iso * on_plane)).abs() < 1e-9);
    }

    #[test]
    fn basis_is_right_handed() {
        let plane = Plane::from_normal(Vector3::new(0.3, -0.8, 0.5), 0.0);
        let (u, v) = plane.basis();
        assert!((u.cross(&v) - plane.normal).norm() < 1e-9);
    }
}
