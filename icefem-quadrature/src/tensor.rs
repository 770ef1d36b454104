//! 2D and 3D quadrature rules formed by tensor products of 1D rules.
//!
//! Points are ordered with the first coordinate varying fastest.

use crate::univariate::try_gauss;
use crate::{Error, Rule};

/// Tensor product of a 1D rule with itself on the reference quadrilateral.
pub fn quadrilateral_product(rule: &Rule<1>) -> Rule<2> {
    let (weights1d, points1d) = rule;
    let n = weights1d.len();
    let mut weights = Vec::with_capacity(n * n);
    let mut points = Vec::with_capacity(n * n);

    for (wy, [y]) in weights1d.iter().zip(points1d) {
        for (wx, [x]) in weights1d.iter().zip(points1d) {
            weights.push(wx * wy);
            points.push([*x, *y]);
        }
    }

    (weights, points)
}

/// Tensor product of a 1D rule with itself on the reference hexahedron.
pub fn hexahedron_product(rule: &Rule<1>) -> Rule<3> {
    let (weights1d, points1d) = rule;
    let (weights2d, points2d) = quadrilateral_product(rule);
    let n = weights1d.len();
    let mut weights = Vec::with_capacity(n * n * n);
    let mut points = Vec::with_capacity(n * n * n);

    for (wz, [z]) in weights1d.iter().zip(points1d) {
        for (wxy, [x, y]) in weights2d.iter().zip(&points2d) {
            weights.push(wxy * wz);
            points.push([*x, *y, *z]);
        }
    }

    (weights, points)
}

/// Gauss rule on the reference quadrilateral with `n` points per dimension.
///
/// `n = 2, 3, 4` give the 4-, 9- and 16-point rules used for Q1 elements.
pub fn quadrilateral_gauss(n: usize) -> Result<Rule<2>, Error> {
    try_gauss(n).map(|rule| quadrilateral_product(&rule))
}

/// Gauss rule on the reference hexahedron with `n` points per dimension.
pub fn hexahedron_gauss(n: usize) -> Result<Rule<3>, Error> {
    try_gauss(n).map(|rule| hexahedron_product(&rule))
}
