//! Half-space clipping of convex polyhedra.
//!
//! Each face loop is clipped Sutherland–Hodgman style against the plane; the points that
//! end up on the plane are then ordered into a single cap face. Because the input is
//! convex, the cap is a convex polygon and the result stays convex.

use super::Polyhedron;
use crate::float_types::Real;
use crate::plane::{BACK, COPLANAR, FRONT, Plane};
use nalgebra::Point3;

impl Polyhedron {
    /// Keep the part of this polyhedron on the inside (`n·p - w <= 0`) of `plane`.
    ///
    /// Returns `None` when nothing with volume is left.
    pub fn clip_plane(&self, plane: &Plane, eps: Real) -> Option<Polyhedron> {
        let vertices = self.vertices();
        let dists: Vec<Real> = vertices.iter().map(|v| plane.signed_distance(v)).collect();
        let types: Vec<i8> = dists
            .iter()
            .map(|&d| {
                if d > eps {
                    FRONT
                } else if d < -eps {
                    BACK
                } else {
                    COPLANAR
                }
            })
            .collect();

        let combined = types.iter().fold(COPLANAR, |acc, &t| acc | t);
        match combined {
            // Flat, or everything outside or touching
            COPLANAR | FRONT => return None,
            // Everything inside or touching
            BACK => return Some(self.clone()),
            _ => {},
        }

        let mut loops: Vec<(Plane, Vec<Point3<Real>>)> = Vec::with_capacity(self.faces().len() + 1);
        let mut cap_points: Vec<Point3<Real>> = Vec::new();

        for face in self.faces() {
            let n = face.indices.len();
            let mut kept: Vec<Point3<Real>> = Vec::with_capacity(n + 2);
            for i in 0..n {
                let j = (i + 1) % n;
                let (idx_i, idx_j) = (face.indices[i], face.indices[j]);
                let (type_i, type_j) = (types[idx_i], types[idx_j]);
                let vertex_i = vertices[idx_i];

                if type_i != FRONT {
                    kept.push(vertex_i);
                }
                if type_i == COPLANAR {
                    cap_points.push(vertex_i);
                }

                // The edge crosses the plane strictly
                if (type_i | type_j) == (FRONT | BACK) {
                    let (d_i, d_j) = (dists[idx_i], dists[idx_j]);
                    let t = d_i / (d_i - d_j);
                    let crossing = vertex_i + (vertices[idx_j] - vertex_i) * t;
                    kept.push(crossing);
                    cap_points.push(crossing);
                }
            }
            if kept.len() >= 3 {
                loops.push((face.plane, kept));
            }
        }

        if let Some(cap) = order_cap(plane, cap_points, eps) {
            loops.push((*plane, cap));
        }

        Polyhedron::from_face_loops(loops, eps, self.material(), self.origin())
    }

    /// Keep the part inside every plane in `planes`.
    pub fn clip(&self, planes: &[Plane], eps: Real) -> Option<Polyhedron> {
        let mut current: Option<Polyhedron> = None;
        for plane in planes {
            let source = current.as_ref().unwrap_or(self);
            current = Some(source.clip_plane(plane, eps)?);
        }
        Some(current.unwrap_or_else(|| self.clone()))
    }

    /// Split into `(inside, outside)` parts with respect to `plane`.
    pub fn split(&self, plane: &Plane, eps: Real) -> (Option<Polyhedron>, Option<Polyhedron>) {
        (
            self.clip_plane(plane, eps),
            self.clip_plane(&plane.flipped(), eps),
        )
    }

    /// Whether the interiors of the polyhedron and the region bounded by `planes` overlap
    /// by more than `eps`.
    pub fn touches_region(&self, planes: &[Plane], eps: Real) -> bool {
        // Separating-plane early out before paying for a clip
        if planes.iter().any(|p| {
            self.vertices()
                .iter()
                .all(|v| p.signed_distance(v) >= -eps)
        }) {
            return false;
        }
        self.clip(planes, eps).is_some()
    }
}

/// Order the on-plane points into a counter-clockwise loop around `plane.normal`,
/// welding duplicates.
fn order_cap(plane: &Plane, points: Vec<Point3<Real>>, eps: Real) -> Option<Vec<Point3<Real>>> {
    let weld_sq = eps * eps;
    let mut unique: Vec<Point3<Real>> = Vec::with_capacity(points.len());
    for p in points {
        if !unique.iter().any(|u| (u - p).norm_squared() <= weld_sq) {
            unique.push(p);
        }
    }
    if unique.len() < 3 {
        return None;
    }

    let center = Point3::from(
        unique.iter().fold(nalgebra::Vector3::zeros(), |acc, p| acc + p.coords)
            / unique.len() as Real,
    );
    let (u, v) = plane.basis();
    let mut keyed: Vec<(Real, Point3<Real>)> = unique
        .into_iter()
        .map(|p| {
            let d = p - center;
            (d.dot(&v).atan2(d.dot(&u)), p)
        })
        .collect();
    keyed.sort_by(|a, b| a.0.total_cmp(&b.0));
    Some(keyed.into_iter().map(|(_, p)| p).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;

    fn cube() -> Polyhedron {
        Polyhedron::from_box(Point3::new(-1.0, -1.0, -1.0), Point3::new(1.0, 1.0, 1.0)).unwrap()
    }

    #[test]
    fn clip_through_middle_halves_volume() {
        let plane = Plane::from_normal(Vector3::x(), 0.0);
        let kept = cube().clip_plane(&plane, 1e-9).unwrap();
        assert!((kept.volume() - 4.0).abs() < 1e-9);
        assert_eq!(kept.faces().len(), 6);
        assert!(kept.vertices().iter().all(|v| v.x <= 1e-9));
    }

    #[test]
    fn clip_diagonal_creates_triangle_cap() {
        // Cuts a corner off: the kept part loses a tetrahedron of volume 1/6 * 1 * 1 * 1
        let plane = Plane::from_normal(Vector3::new(1.0, 1.0, 1.0), 2.0);
        let kept = cube().clip_plane(&plane, 1e-9).unwrap();
        assert!((kept.volume() - (8.0 - 1.0 / 6.0)).abs() < 1e-9);
        assert_eq!(kept.faces().len(), 7);
    }

    #[test]
    fn fully_outside_and_fully_inside() {
        let outside = Plane::from_normal(-Vector3::x(), -5.0);
        assert!(cube().clip_plane(&outside, 1e-9).is_none());

        let inside = Plane::from_normal(Vector3::x(), 5.0);
        let kept = cube().clip_plane(&inside, 1e-9).unwrap();
        assert!((kept.volume() - 8.0).abs() < 1e-9);
    }

    #[test]
    fn coincident_face_plane_keeps_whole() {
        let plane = Plane::from_normal(Vector3::z(), 1.0);
        let kept = cube().clip_plane(&plane, 1e-9).unwrap();
        assert!((kept.volume() - 8.0).abs() < 1e-9);
        let flipped = cube().clip_plane(&plane.flipped(), 1e-9);
        assert!(flipped.is_none());
    }

    #[test]
    fn split_volumes_sum() {
        let plane = Plane::from_normal(Vector3::new(0.2, 1.0, -0.4), 0.3);
        let (inside, outside) = cube().split(&plane, 1e-9);
        let total = inside.unwrap().volume() + outside.unwrap().volume();
        assert!((total - 8.0).abs() < 1e-9);
    }
}
