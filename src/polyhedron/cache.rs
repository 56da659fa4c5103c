//! Per-level store of convex decompositions.
//!
//! Built once when a level loads and never mutated afterwards. Every polyhedron sits in one
//! contiguous `Vec`; brushes and props only keep indices into it.

use super::{Polyhedron, PolyhedronOrigin, SurfaceMaterial};
use crate::config::SimulatorConfig;
use crate::float_types::{
    Real,
    parry3d::bounding_volume::{Aabb, BoundingVolume},
};
use crate::level::{LevelGeometry, PropHandle};
use crate::plane::Plane;
use hashbrown::HashMap;
use log::{debug, warn};
use nalgebra::Point3;
use std::ops::Range;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Convex polyhedra for every static brush and static prop of the loaded level.
#[derive(Debug, Clone, Default)]
pub struct PolyhedronCache {
    polyhedra: Vec<Polyhedron>,
    brushes: Vec<Option<usize>>,
    props: HashMap<PropHandle, Range<usize>>,
}

enum Source {
    Brush(usize, Vec<Plane>, SurfaceMaterial),
    Hull(PropHandle, Vec<Point3<Real>>, SurfaceMaterial),
}

impl Source {
    fn decompose(self, eps: Real) -> (PolyhedronOrigin, Option<Polyhedron>) {
        match self {
            Source::Brush(index, planes, material) => {
                let origin = PolyhedronOrigin::Brush(index);
                (origin, Polyhedron::from_planes(&planes, eps, material, origin))
            },
            Source::Hull(handle, points, material) => {
                let origin = PolyhedronOrigin::StaticProp(handle);
                (origin, Polyhedron::from_points(&points, eps, material, origin))
            },
        }
    }
}

impl PolyhedronCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decompose every brush and static prop of `level`.
    ///
    /// Brushes whose planes do not bound a volume and prop hulls that are degenerate are
    /// skipped with a warning; queries for them return nothing.
    pub fn build(level: &dyn LevelGeometry, config: &SimulatorConfig) -> Self {
        let eps = config.clip_epsilon;

        let mut sources = Vec::new();
        for index in 0..level.brush_count() {
            if let Some(planes) = level.brush_planes(index) {
                sources.push(Source::Brush(index, planes, level.brush_material(index)));
            }
        }
        for handle in level.static_props() {
            let material = level.static_prop_material(handle);
            for hull in level.static_prop_hulls(handle) {
                sources.push(Source::Hull(handle, hull, material));
            }
        }

        #[cfg(not(feature = "parallel"))]
        let decomposed: Vec<(PolyhedronOrigin, Option<Polyhedron>)> =
            sources.into_iter().map(|s| s.decompose(eps)).collect();

        #[cfg(feature = "parallel")]
        let decomposed: Vec<(PolyhedronOrigin, Option<Polyhedron>)> =
            sources.into_par_iter().map(|s| s.decompose(eps)).collect();

        let mut cache = PolyhedronCache {
            polyhedra: Vec::with_capacity(decomposed.len()),
            brushes: vec![None; level.brush_count()],
            props: HashMap::new(),
        };
        let mut skipped = 0usize;
        for (origin, poly) in decomposed {
            let Some(poly) = poly else {
                skipped += 1;
                warn!("skipping degenerate convex piece of {origin:?}");
                continue;
            };
            let slot = cache.polyhedra.len();
            cache.polyhedra.push(poly);
            match origin {
                PolyhedronOrigin::Brush(index) => cache.brushes[index] = Some(slot),
                // Hulls of one prop arrive consecutively, so each prop is one range
                PolyhedronOrigin::StaticProp(handle) => {
                    cache
                        .props
                        .entry(handle)
                        .and_modify(|r| r.end = slot + 1)
                        .or_insert(slot..slot + 1);
                },
                PolyhedronOrigin::Generated => {},
            }
        }
        debug!(
            "polyhedron cache built: {} polyhedra from {} brushes and {} props ({} skipped)",
            cache.polyhedra.len(),
            level.brush_count(),
            cache.props.len(),
            skipped
        );
        cache
    }

    pub fn len(&self) -> usize {
        self.polyhedra.len()
    }

    pub fn is_empty(&self) -> bool {
        self.polyhedra.is_empty()
    }

    /// Drop everything; used on level unload.
    pub fn clear(&mut self) {
        self.polyhedra.clear();
        self.brushes.clear();
        self.props.clear();
    }

    /// The polyhedron of brush `index`, `None` if the brush was not cached.
    pub fn brush_polyhedron(&self, index: usize) -> Option<&Polyhedron> {
        let slot = (*self.brushes.get(index)?)?;
        self.polyhedra.get(slot)
    }

    /// Append up to `limit` polyhedra of `prop` to `out` and return how many were added.
    /// Props absent from the cache add nothing.
    pub fn static_prop_polyhedrons<'a>(
        &'a self,
        prop: PropHandle,
        out: &mut Vec<&'a Polyhedron>,
        limit: usize,
    ) -> usize {
        let Some(range) = self.props.get(&prop) else {
            return 0;
        };
        let before = out.len();
        out.extend(self.polyhedra[range.clone()].iter().take(limit));
        out.len() - before
    }

    /// Cached polyhedra whose bounds intersect `bounds`, found through the level's own
    /// spatial query.
    pub fn polyhedra_in_box<'a>(
        &'a self,
        level: &dyn LevelGeometry,
        bounds: &Aabb,
    ) -> Vec<&'a Polyhedron> {
        let mut found: Vec<&Polyhedron> = level
            .brushes_in_box(bounds)
            .into_iter()
            .filter_map(|i| self.brush_polyhedron(i))
            .collect();
        for prop in level.static_props_in_box(bounds) {
            self.static_prop_polyhedrons(prop, &mut found, usize::MAX);
        }
        found.retain(|p| p.aabb().intersects(bounds));
        found
    }
}
