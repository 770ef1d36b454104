/// Vector function traits and numerical differentiation
pub mod calculus;
/// Newton's method with optional line search
pub mod newton;

use nalgebra::RealField;

/// Scalar types supported by the solvers in this crate.
pub trait Real: RealField + Copy {}

impl<T: RealField + Copy> Real for T {}
