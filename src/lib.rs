//! Equations-set assembly and nonlinear evaluation for finite element
//! computations.
//!
//! `hati` provides the machinery that turns a discretized field problem into
//! a solvable linear system: a physics dispatch table routing equations-set
//! specifications to element kernels, a distributed-memory aware assembly
//! loop that accumulates element (or nodal) contributions into global
//! matrices and vectors, a finite-difference Jacobian fallback for kernels
//! without analytic Jacobians, and the boundary-condition algebra
//! (back-substitution, nonlinear RHS updates, incremental load stepping)
//! that closes the system.
//!
//! The per-physics element kernels themselves, the mesh decomposition, the
//! field storage and the outer nonlinear solver are external collaborators;
//! this crate defines their interfaces together with single-process
//! reference implementations suitable for testing and for undistributed
//! problems.

pub mod assembly;
pub mod boundary;
pub mod distributed;
pub mod equations;
pub mod equations_set;
pub mod error;
pub mod field;
pub mod kernel;
pub mod registry;
pub mod specification;

pub extern crate nalgebra;
pub extern crate nalgebra_sparse;

use nalgebra::RealField;

/// Scalar trait alias for the real-valued assembly routines.
pub trait Real: RealField + Copy {}

impl<T> Real for T where T: RealField + Copy {}
