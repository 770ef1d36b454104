//! Finite element solvers for the first order (Blatter-Pattyn) approximation of ice flow on
//! structured, vertically extruded hexahedral grids.
//!
//! The building blocks, from the bottom up:
//!
//! - [`quadrature`]: reference shape functions and quadrature rules.
//! - [`element`]: accessors binding shape functions to one grid cell, gathering nodal values
//!   and scattering element contributions.
//! - [`node_type`]: classification of grid nodes by the ice cover around them.
//! - [`assembly`]: residuals and Jacobians of the [`Blatter`](assembly::Blatter) and
//!   [`Poisson3`](assembly::Poisson3) problems.
//! - [`multigrid`]: the grid hierarchy, transfer operators and the V-cycle preconditioner.
//! - [`solver`]: the Newton driver tying everything together.

pub mod assembly;
pub mod comm;
pub mod config;
pub mod element;
pub mod error;
pub mod field;
pub mod flow_law;
pub mod functional;
pub mod grid;
pub mod multigrid;
pub mod node_type;
pub mod quadrature;
pub mod sliding;
pub mod solver;
pub mod verification;

#[cfg(feature = "proptest")]
pub mod proptest;

pub extern crate nalgebra;
pub extern crate nalgebra_sparse;
