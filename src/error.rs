//! Errors detected while setting up a solver or traversing the grid.
use std::error::Error;
use std::fmt;

/// A configuration or geometry problem detected before any solve is attempted.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum SetupError {
    /// A grid dimension is too small, e.g. `Mz < 2`.
    GridTooSmall { dimension: &'static str, nodes: usize, minimum: usize },
    /// A spacing, domain width or physical constant has an invalid value.
    InvalidParameter { name: &'static str, value: f64 },
    /// A grid cannot be coarsened the requested number of times.
    NotCoarsenable { nodes: usize, factor: usize },
    /// Padding a dimension for `n_levels` coarsenings by `factor` overflows the node count.
    PaddingOverflow { nodes: usize, n_levels: usize, factor: usize },
    /// An input field does not match the shape of the grid.
    ShapeMismatch {
        field: &'static str,
        expected: (usize, usize, usize),
        actual: (usize, usize, usize),
    },
    /// A patch does not lie within the grid.
    InvalidPatch { xs: usize, xm: usize, ys: usize, ym: usize },
    /// The coarsest level matrix cannot be factored.
    SingularCoarseMatrix { level: usize },
    Geometry(GeometryError),
}

impl fmt::Display for SetupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GridTooSmall {
                dimension,
                nodes,
                minimum,
            } => write!(
                f,
                "grid has {} nodes in the {} direction, at least {} are required",
                nodes, dimension, minimum
            ),
            Self::InvalidParameter { name, value } => write!(f, "invalid value {} for parameter {}", value, name),
            Self::NotCoarsenable { nodes, factor } => write!(
                f,
                "a dimension with {} nodes cannot be coarsened by a factor of {}",
                nodes, factor
            ),
            Self::PaddingOverflow {
                nodes,
                n_levels,
                factor,
            } => write!(
                f,
                "padding {} nodes for {} coarsenings by a factor of {} overflows",
                nodes, n_levels, factor
            ),
            Self::ShapeMismatch {
                field,
                expected,
                actual,
            } => write!(
                f,
                "field {} has shape {:?}, expected {:?}",
                field, actual, expected
            ),
            Self::InvalidPatch { xs, xm, ys, ym } => write!(
                f,
                "patch [{}, {}) x [{}, {}) is empty or outside the grid",
                xs,
                xs + xm,
                ys,
                ys + ym
            ),
            Self::SingularCoarseMatrix { level } => {
                write!(f, "the system matrix on the coarsest level {} is singular", level)
            }
            Self::Geometry(err) => write!(f, "degenerate geometry: {}", err),
        }
    }
}

impl Error for SetupError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Geometry(err) => Some(err),
            _ => None,
        }
    }
}

impl From<GeometryError> for SetupError {
    fn from(err: GeometryError) -> Self {
        Self::Geometry(err)
    }
}

/// An element whose reference-to-physical map is not invertible.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeometryError {
    /// Indices `(i, j, k)` of the lower corner of the element. `k` is zero for 2D elements.
    pub element: (usize, usize, usize),
    pub determinant: f64,
}

impl fmt::Display for GeometryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (i, j, k) = self.element;
        write!(
            f,
            "element ({}, {}, {}) has non-positive Jacobian determinant {:e}",
            i, j, k, self.determinant
        )
    }
}

impl Error for GeometryError {}

/// Returns an error unless `value` is finite and strictly positive.
pub(crate) fn require_positive(name: &'static str, value: f64) -> Result<(), SetupError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(SetupError::InvalidParameter { name, value })
    }
}

/// Returns an error unless `value` is finite and non-negative.
pub(crate) fn require_non_negative(name: &'static str, value: f64) -> Result<(), SetupError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(SetupError::InvalidParameter { name, value })
    }
}
