//! Quadrature rules for the reference domains used by the `icefem` solvers.
//!
//! Conventions:
//!
//! - the reference interval is `[-1, 1]`,
//! - the reference quadrilateral is `[-1, 1]^2` and the reference hexahedron is `[-1, 1]^3`,
//! - the reference triangle has the vertices `(0, 0)`, `(1, 0)` and `(0, 1)`.
//!
//! A rule is a pair `(weights, points)`. Weights of rules on the reference quadrilateral sum to
//! `4`, on the reference hexahedron to `8` and on the reference triangle to `1/2`.

use std::fmt;
use std::fmt::{Display, Formatter};

pub mod tensor;
pub mod triangle;
pub mod uniform;
pub mod univariate;

/// Library-wide error type.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// A rule with zero points was requested.
    EmptyRule,
    /// Newton's method failed to locate a root of the Legendre polynomial of the given degree.
    RootNotFound { degree: usize },
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyRule => write!(f, "a quadrature rule needs at least one point"),
            Self::RootNotFound { degree } => {
                write!(f, "failed to find the roots of the Legendre polynomial of degree {}", degree)
            }
        }
    }
}

impl std::error::Error for Error {}

/// A D-dimensional point.
pub type Point<const D: usize> = [f64; D];

/// A two-dimensional point.
pub type Point2 = Point<2>;

/// A three-dimensional point.
pub type Point3 = Point<3>;

/// A D-dimensional rule.
pub type Rule<const D: usize> = (Vec<f64>, Vec<Point<D>>);

/// A one-dimensional quadrature rule.
pub type Rule1d = Rule<1>;

/// A two-dimensional quadrature rule.
pub type Rule2d = Rule<2>;

/// A three-dimensional rule.
pub type Rule3d = Rule<3>;

/// Approximates the integral of `f` over the domain of `rule`.
pub fn integrate<const D: usize>(rule: &Rule<D>, mut f: impl FnMut(&Point<D>) -> f64) -> f64 {
    let (weights, points) = rule;
    weights
        .iter()
        .zip(points)
        .map(|(w, x)| w * f(x))
        .sum()
}
