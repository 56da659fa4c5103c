//! Collision carving, physics contexts and cross-portal queries for pairs of linked
//! portals, built on [parry](https://parry.rs) and [rapier](https://rapier.rs).
//!
//! Each placed portal gets a [`PortalSimulator`](simulator::PortalSimulator) which
//! - carves the level's convex [polyhedra](polyhedron) around its hole into *world*,
//!   *wall* and *tube* sets,
//! - turns those sets into [collision](collision) shapes and static bodies inside a
//!   shared [physics environment](physics),
//! - owns the dynamic entities near it and mirrors them into the linked portal as shadow
//!   clones,
//! - answers [traces](trace) that continue through the portal.
//!
//! All simulators of a level live in one [`PortalWorld`], which the host drives with
//! placement calls and the `pre_phys_frame` / `post_phys_frame` tick phases.
//!
//! # Features
//! #### Default
//! - **f64**: use f64 as Real
//!
//! #### Optional
//! - **f32**: use f32 as Real, this conflicts with f64
//! - **parallel**: use rayon to decompose the level in parallel

#![forbid(unsafe_code)]
#![warn(clippy::missing_const_for_fn, clippy::approx_constant, clippy::all)]

pub mod call_queue;
pub mod carve;
pub mod collision;
pub mod config;
pub mod entity;
pub mod errors;
pub mod float_types;
pub mod level;
pub mod link;
pub mod ownership;
pub mod passable;
pub mod physics;
pub mod placement;
pub mod plane;
pub mod polyhedron;
pub mod simulator;
pub mod trace;
pub mod world;

#[cfg(any(all(feature = "f64", feature = "f32"), not(any(feature = "f64", feature = "f32"))))]
compile_error!("Either 'f64' or 'f32' feature must be specified, but not both");

pub use config::SimulatorConfig;
pub use entity::{EntityBounds, EntityHost, EntityId, EntityKind, SimulatorCallbacks};
pub use errors::PortalError;
pub use level::{LevelGeometry, StaticLevel};
pub use link::LinkTransform;
pub use physics::{PhysicsEnvironment, RapierEnvironment};
pub use placement::PortalPlacement;
pub use polyhedron::Polyhedron;
pub use simulator::{SimulatorHandle, SimulatorStats};
pub use trace::{TraceHit, TraceResult};
pub use world::PortalWorld;
