//! Rigid transforms between two linked portals.

use crate::float_types::{PI, Real};
use crate::placement::PortalPlacement;
use nalgebra::{Isometry3, Point3, UnitQuaternion, Vector3};

/// Mutually inverse transforms between a portal's space and its linked portal's space.
///
/// A point in front of one portal maps behind the other: the mapping goes into this portal
/// and comes out of the linked one, turned half a revolution about the portal's up axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkTransform {
    pub this_to_linked: Isometry3<Real>,
    pub linked_to_this: Isometry3<Real>,
}

impl Default for LinkTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl LinkTransform {
    /// The transform of an unlinked portal.
    pub fn identity() -> Self {
        LinkTransform {
            this_to_linked: Isometry3::identity(),
            linked_to_this: Isometry3::identity(),
        }
    }

    /// Compute `this → linked` from both placements; the other direction is its exact inverse.
    pub fn between(this: &PortalPlacement, linked: &PortalPlacement) -> Self {
        let half_turn = Isometry3::rotation(Vector3::z() * PI);
        let this_to_linked = linked.isometry() * half_turn * this.isometry().inverse();
        LinkTransform {
            this_to_linked,
            linked_to_this: this_to_linked.inverse(),
        }
    }

    /// The same link seen from the other side.
    pub fn reversed(&self) -> Self {
        LinkTransform {
            this_to_linked: self.linked_to_this,
            linked_to_this: self.this_to_linked,
        }
    }

    pub fn point_to_linked(&self, p: &Point3<Real>) -> Point3<Real> {
        self.this_to_linked * p
    }

    pub fn point_from_linked(&self, p: &Point3<Real>) -> Point3<Real> {
        self.linked_to_this * p
    }

    pub fn vector_to_linked(&self, v: &Vector3<Real>) -> Vector3<Real> {
        self.this_to_linked * v
    }

    pub fn vector_from_linked(&self, v: &Vector3<Real>) -> Vector3<Real> {
        self.linked_to_this * v
    }

    pub fn rotation_to_linked(&self, r: &UnitQuaternion<Real>) -> UnitQuaternion<Real> {
        self.this_to_linked.rotation * r
    }

    pub fn isometry_to_linked(&self, iso: &Isometry3<Real>) -> Isometry3<Real> {
        self.this_to_linked * iso
    }

    pub fn isometry_from_linked(&self, iso: &Isometry3<Real>) -> Isometry3<Real> {
        self.linked_to_this * iso
    }
}
