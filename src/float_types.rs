//! Scalar type, tolerances and the precision-matched parry/rapier crates.
//!
//! Exactly one of the `f64` and `f32` features selects [`Real`]; every geometric and physics
//! type in the crate is built on it.

#[cfg(feature = "f64")]
mod precision {
    pub use core::f64::consts::{FRAC_PI_2, PI};
    pub use parry3d_f64 as parry3d;
    pub use rapier3d_f64 as rapier3d;

    pub type Real = f64;

    /// Length below which a normal or edge is treated as degenerate.
    pub const EPSILON: Real = 1e-8;
    pub(super) const DEFAULT_TOLERANCE: Real = 1e-6;
}

#[cfg(feature = "f32")]
mod precision {
    pub use core::f32::consts::{FRAC_PI_2, PI};
    pub use parry3d;
    pub use rapier3d;

    pub type Real = f32;

    /// Length below which a normal or edge is treated as degenerate.
    pub const EPSILON: Real = 1e-4;
    pub(super) const DEFAULT_TOLERANCE: Real = 1e-3;
}

pub use precision::{EPSILON, FRAC_PI_2, PI, Real, parry3d, rapier3d};

use std::sync::OnceLock;

static TOLERANCE: OnceLock<Real> = OnceLock::new();

/// Distance under which a point counts as lying on a plane, and the penetration depth
/// treated as touching.
///
/// Taken from `PORTALSIM_TOLERANCE` at build time when set, otherwise from
/// [`set_tolerance`], otherwise a precision-dependent default. The first read fixes it.
pub fn tolerance() -> Real {
    *TOLERANCE.get_or_init(|| {
        option_env!("PORTALSIM_TOLERANCE")
            .and_then(|raw| raw.parse::<Real>().ok())
            .map_or(precision::DEFAULT_TOLERANCE, |value| value.max(Real::EPSILON))
    })
}

/// Fix the tolerance before anything reads it. Later calls have no effect.
pub fn set_tolerance(value: Real) {
    let _ = TOLERANCE.set(value.max(Real::EPSILON));
}
