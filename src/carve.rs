//! Carving level geometry around a portal.
//!
//! Everything inside the carve box is split by the portal plane (pushed forward by
//! `world_forward_offset`): the front half becomes *world*, the back half becomes *wall*
//! once the hole prism has been cut out of it. The *tube* is generated from planes alone
//! and lines the hole.

use crate::config::SimulatorConfig;
use crate::float_types::Real;
use crate::level::LevelGeometry;
use crate::placement::PortalPlacement;
use crate::plane::Plane;
use crate::polyhedron::{Polyhedron, PolyhedronCache, PolyhedronOrigin, SurfaceMaterial};
use log::{debug, warn};

/// The polyhedron sets produced for one portal placement.
#[derive(Debug, Clone, Default)]
pub struct CarvedGeometry {
    /// Brush fragments in front of the portal plane.
    pub world_brushes: Vec<Polyhedron>,
    /// Static prop fragments in front of the portal plane.
    pub world_props: Vec<Polyhedron>,
    /// Fragments behind the portal plane with the hole removed.
    pub wall: Vec<Polyhedron>,
    /// The slivers lining the hole.
    pub tube: Vec<Polyhedron>,
    /// Hole-containment volume used for in-hole tests.
    pub hole: Option<Polyhedron>,
    /// Region in which traces do not continue through the portal separately.
    pub hole_lock: Option<Polyhedron>,
}

impl CarvedGeometry {
    pub fn is_empty(&self) -> bool {
        self.world_brushes.is_empty()
            && self.world_props.is_empty()
            && self.wall.is_empty()
            && self.tube.is_empty()
    }

    /// All world fragments, brushes first.
    pub fn world(&self) -> impl Iterator<Item = &Polyhedron> + '_ {
        self.world_brushes.iter().chain(self.world_props.iter())
    }
}

/// Carve the level around `placement`.
pub fn carve(
    cache: &PolyhedronCache,
    level: Option<&dyn LevelGeometry>,
    placement: &PortalPlacement,
    config: &SimulatorConfig,
) -> CarvedGeometry {
    let eps = config.clip_epsilon;
    let carve_planes = placement.carve_planes(config);
    let split = placement.plane.offset_by(config.world_forward_offset);
    let hole_sides = placement.hole_side_planes(config);

    let mut carved = CarvedGeometry {
        tube: tube_slivers(placement, config),
        hole: placement.hole_volume(config, config.hole_front_depth),
        hole_lock: placement.hole_volume(config, config.hole_lock_depth),
        ..CarvedGeometry::default()
    };
    if carved.hole.is_none() {
        warn!("portal hole volume is degenerate; in-hole tests will always fail");
    }

    let sources = match level {
        Some(level) => cache.polyhedra_in_box(level, &placement.carve_aabb(config, 0.0)),
        None => Vec::new(),
    };

    for source in sources {
        let Some(inside) = source.clip(&carve_planes, eps) else {
            continue;
        };
        let (behind, in_front) = inside.split(&split, eps);

        if let Some(front) = in_front.filter(|p| p.volume() >= config.min_fragment_volume) {
            if front.origin().is_static_prop() {
                carved.world_props.push(front);
            } else {
                carved.world_brushes.push(front);
            }
        }
        if let Some(back) = behind {
            remove_hole(back, &hole_sides, config, &mut carved.wall);
        }
    }

    debug!(
        "carved portal at {:?}: {} world brushes, {} world props, {} wall, {} tube",
        placement.origin,
        carved.world_brushes.len(),
        carved.world_props.len(),
        carved.wall.len(),
        carved.tube.len()
    );
    carved
}

/// Cut the hole prism out of `piece`, pushing what remains to `out`.
///
/// Pieces that do not reach into the hole are kept whole. Otherwise the part outside each
/// side plane is peeled off in turn; whatever is left after the fourth plane lies inside
/// the hole and is discarded.
fn remove_hole(
    piece: Polyhedron,
    hole_sides: &[Plane; 4],
    config: &SimulatorConfig,
    out: &mut Vec<Polyhedron>,
) {
    let eps = config.clip_epsilon;
    if piece.volume() < config.min_fragment_volume {
        return;
    }
    if !piece.touches_region(hole_sides, eps) {
        out.push(piece);
        return;
    }
    let mut remaining = piece;
    for side in hole_sides {
        let (inside, outside) = remaining.split(side, eps);
        if let Some(fragment) = outside.filter(|p| p.volume() >= config.min_fragment_volume) {
            out.push(fragment);
        }
        match inside {
            Some(rest) => remaining = rest,
            None => return,
        }
    }
}

/// The six slivers of the hole tube.
///
/// Side plates run from the portal plane back to `tube_depth`; the left and right plates
/// span the hole height and the top and bottom plates span the width plus both side
/// plates. An inner cap closes the hole at `tube_depth` and an outer cap one thickness
/// further back covers the plate ends.
fn tube_slivers(placement: &PortalPlacement, config: &SimulatorConfig) -> Vec<Polyhedron> {
    let hw = config.hole_half_width;
    let hh = config.hole_half_height;
    let t = config.tube_thickness;
    let d = config.tube_depth;

    let boxes: [((Real, Real), (Real, Real), (Real, Real)); 6] = [
        // right, left
        ((-d, 0.0), (hw, hw + t), (-hh, hh)),
        ((-d, 0.0), (-hw - t, -hw), (-hh, hh)),
        // up, down
        ((-d, 0.0), (-hw - t, hw + t), (hh, hh + t)),
        ((-d, 0.0), (-hw - t, hw + t), (-hh - t, -hh)),
        // inner and outer depth caps
        ((-d - t, -d), (-hw, hw), (-hh, hh)),
        ((-d - 2.0 * t, -d - t), (-hw - t, hw + t), (-hh - t, hh + t)),
    ];

    boxes
        .iter()
        .filter_map(|&(forward, right, up)| {
            Polyhedron::from_planes(
                &placement.frame_box_planes(forward, right, up),
                config.clip_epsilon,
                SurfaceMaterial::default(),
                PolyhedronOrigin::Generated,
            )
        })
        .collect()
}
