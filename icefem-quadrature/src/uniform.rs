//! Uniform (non-Gaussian) rules for integrating piecewise smooth functions.
//!
//! Gauss rules assume smooth integrands. Near a discontinuity, such as a jump in a basal drag
//! coefficient, a fine uniform rule is more accurate than any fixed-size Gauss rule.

use crate::tensor::quadrilateral_product;
use crate::univariate::midpoint;
use crate::{Error, Rule};

/// Default number of points per dimension of the uniform quadrilateral rule.
pub const DEFAULT_POINTS_PER_DIM: usize = 100;

/// The `100 x 100` uniform rule on the reference quadrilateral.
pub fn quadrilateral_uniform_default() -> Rule<2> {
    quadrilateral_uniform(DEFAULT_POINTS_PER_DIM).expect("default size is nonzero")
}

/// Uniform rule on the reference quadrilateral with `n x n` cells, one point per cell center.
pub fn quadrilateral_uniform(n: usize) -> Result<Rule<2>, Error> {
    midpoint(n).map(|rule| quadrilateral_product(&rule))
}
