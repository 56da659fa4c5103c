//! Tunable dimensions and tolerances.
//!
//! The defaults are sized for a level where one unit is roughly an inch and a portal hole
//! is 64 × 108 units. Other art scales should scale every length together.

use crate::float_types::{Real, tolerance};
use log::warn;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Geometry and simulation settings shared by every simulator in a [`PortalWorld`](crate::PortalWorld).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Half of the passable aperture along the portal's right axis.
    pub hole_half_width: Real,
    /// Half of the passable aperture along the portal's up axis.
    pub hole_half_height: Real,
    /// How far in front of the portal plane geometry is carved.
    pub carve_front_margin: Real,
    /// How far behind the portal plane geometry is carved.
    pub carve_back_margin: Real,
    /// Extra carve extent beyond the hole on the right/up axes.
    pub carve_side_margin: Real,
    /// Offset of the world/wall split plane in front of the portal plane.
    pub world_forward_offset: Real,
    /// Plane classification and vertex welding tolerance used while clipping.
    pub clip_epsilon: Real,
    /// Fragments with less volume than this are dropped.
    pub min_fragment_volume: Real,
    /// Depth of the tube slivers behind the portal plane.
    pub tube_depth: Real,
    /// Thickness of each tube sliver.
    pub tube_thickness: Real,
    /// How far the hole-containment volume reaches in front of the portal plane.
    pub hole_front_depth: Real,
    /// How far the hole-lock region reaches in front of the portal plane.
    pub hole_lock_depth: Real,
    /// Iteration budget of the passable-space search.
    pub passable_space_iterations: usize,
    /// Slack added to the carve box before an owned entity is considered to have left it.
    pub post_phys_release_margin: Real,
    /// Longest sweep a trace performs; longer requests are shortened.
    pub trace_max_distance: Real,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        SimulatorConfig {
            hole_half_width: 32.0,
            hole_half_height: 54.0,
            carve_front_margin: 128.0,
            carve_back_margin: 64.0,
            carve_side_margin: 64.0,
            world_forward_offset: 0.03125,
            clip_epsilon: (tolerance() * 100.0).max(1e-4),
            min_fragment_volume: 1e-3,
            tube_depth: 54.0,
            tube_thickness: 1.0,
            hole_front_depth: 2.0,
            hole_lock_depth: 1.0,
            passable_space_iterations: 32,
            post_phys_release_margin: 16.0,
            trace_max_distance: 16384.0,
        }
    }
}

impl SimulatorConfig {
    /// Clamp nonsensical values to usable minima, logging each correction.
    pub fn validated(mut self) -> Self {
        fn at_least(name: &str, value: &mut Real, min: Real) {
            if !(*value >= min) {
                warn!("SimulatorConfig::{name} = {value} is below {min}; clamping");
                *value = min;
            }
        }
        at_least("hole_half_width", &mut self.hole_half_width, 1e-2);
        at_least("hole_half_height", &mut self.hole_half_height, 1e-2);
        at_least("carve_front_margin", &mut self.carve_front_margin, 1e-2);
        at_least("carve_back_margin", &mut self.carve_back_margin, 1e-2);
        at_least("carve_side_margin", &mut self.carve_side_margin, 0.0);
        at_least("world_forward_offset", &mut self.world_forward_offset, 0.0);
        at_least("clip_epsilon", &mut self.clip_epsilon, tolerance());
        at_least("min_fragment_volume", &mut self.min_fragment_volume, 0.0);
        at_least("tube_depth", &mut self.tube_depth, 1e-2);
        at_least("tube_thickness", &mut self.tube_thickness, 1e-3);
        at_least("hole_front_depth", &mut self.hole_front_depth, 0.0);
        at_least("hole_lock_depth", &mut self.hole_lock_depth, 0.0);
        at_least("post_phys_release_margin", &mut self.post_phys_release_margin, 0.0);
        at_least("trace_max_distance", &mut self.trace_max_distance, 1.0);
        if self.passable_space_iterations == 0 {
            warn!("SimulatorConfig::passable_space_iterations = 0; clamping to 1");
            self.passable_space_iterations = 1;
        }
        self
    }

    /// Defaults overridden by `PORTALSIM_<FIELD>` environment variables
    /// (e.g. `PORTALSIM_HOLE_HALF_WIDTH=24`). Unparsable values are ignored with a warning.
    pub fn from_env() -> Self {
        let mut config = SimulatorConfig::default();
        {
            let mut reals: [(&str, &mut Real); 14] = [
                ("HOLE_HALF_WIDTH", &mut config.hole_half_width),
                ("HOLE_HALF_HEIGHT", &mut config.hole_half_height),
                ("CARVE_FRONT_MARGIN", &mut config.carve_front_margin),
                ("CARVE_BACK_MARGIN", &mut config.carve_back_margin),
                ("CARVE_SIDE_MARGIN", &mut config.carve_side_margin),
                ("WORLD_FORWARD_OFFSET", &mut config.world_forward_offset),
                ("CLIP_EPSILON", &mut config.clip_epsilon),
                ("MIN_FRAGMENT_VOLUME", &mut config.min_fragment_volume),
                ("TUBE_DEPTH", &mut config.tube_depth),
                ("TUBE_THICKNESS", &mut config.tube_thickness),
                ("HOLE_FRONT_DEPTH", &mut config.hole_front_depth),
                ("HOLE_LOCK_DEPTH", &mut config.hole_lock_depth),
                ("POST_PHYS_RELEASE_MARGIN", &mut config.post_phys_release_margin),
                ("TRACE_MAX_DISTANCE", &mut config.trace_max_distance),
            ];
            for (name, slot) in reals.iter_mut() {
                if let Some(value) = read_env::<Real>(name) {
                    **slot = value;
                }
            }
        }
        if let Some(value) = read_env::<usize>("PASSABLE_SPACE_ITERATIONS") {
            config.passable_space_iterations = value;
        }
        config.validated()
    }
}

fn read_env<T: FromStr>(field: &str) -> Option<T> {
    let key = format!("PORTALSIM_{field}");
    let raw = std::env::var(&key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("ignoring unparsable {key}={raw}");
            None
        },
    }
}
