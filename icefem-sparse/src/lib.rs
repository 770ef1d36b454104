//! Sparse linear algebra for the `icefem` solvers.
//!
//! Provides a preconditioned conjugate gradient solver working on any [`cg::LinearOperator`]
//! and Gauss-Seidel relaxation sweeps for CSR matrices, used as multigrid smoothers.

pub mod cg;
pub mod relaxation;
