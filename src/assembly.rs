//! Element-to-global assembly.
//!
//! [`local`] holds the element-local (and nodal-local) dense arenas that
//! physics kernels fill; [`global`] drives the two-pass distributed
//! assembly loop and the per-family accumulation into global storage;
//! [`finite_difference`] approximates Jacobian blocks for kernels without
//! analytic Jacobians.

pub mod finite_difference;
pub mod global;
pub mod local;
