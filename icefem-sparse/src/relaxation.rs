//! Gauss-Seidel relaxation sweeps for square CSR matrices.
//!
//! A forward sweep followed by a backward sweep is a symmetric smoother, which keeps a
//! V-cycle built from it usable as a preconditioner for conjugate gradients.

use nalgebra::{DVectorView, DVectorViewMut, RealField};
use nalgebra_sparse::CsrMatrix;
use std::error::Error;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum RelaxationError {
    /// The diagonal entry of the given row is missing or zero.
    ZeroDiagonal { row: usize },
    DimensionMismatch { rows: usize, cols: usize, len: usize },
}

impl fmt::Display for RelaxationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroDiagonal { row } => write!(f, "zero diagonal entry in row {}", row),
            Self::DimensionMismatch { rows, cols, len } => {
                write!(f, "cannot relax {}x{} system with vectors of length {}", rows, cols, len)
            }
        }
    }
}

impl Error for RelaxationError {}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SweepDirection {
    Forward,
    Backward,
}

fn check_dimensions<T>(a: &CsrMatrix<T>, x_len: usize, b_len: usize) -> Result<(), RelaxationError> {
    let n = a.nrows();
    if a.ncols() != n || x_len != n || b_len != n {
        return Err(RelaxationError::DimensionMismatch {
            rows: n,
            cols: a.ncols(),
            len: x_len,
        });
    }
    Ok(())
}

fn relax_row<T: RealField + Copy>(
    a: &CsrMatrix<T>,
    i: usize,
    x: &mut DVectorViewMut<T>,
    b: &DVectorView<T>,
) -> Result<(), RelaxationError> {
    let row = a.row(i);
    let mut diagonal = T::zero();
    let mut sum = b[i];
    for (&j, &a_ij) in row.col_indices().iter().zip(row.values()) {
        if j == i {
            diagonal += a_ij;
        } else {
            sum -= a_ij * x[j];
        }
    }
    if diagonal == T::zero() {
        return Err(RelaxationError::ZeroDiagonal { row: i });
    }
    x[i] = sum / diagonal;
    Ok(())
}

/// Performs a single Gauss-Seidel sweep for `A x = b`, updating `x` in place.
pub fn gauss_seidel_sweep<'a, T: RealField + Copy>(
    a: &CsrMatrix<T>,
    x: impl Into<DVectorViewMut<'a, T>>,
    b: impl Into<DVectorView<'a, T>>,
    direction: SweepDirection,
) -> Result<(), RelaxationError> {
    let mut x = x.into();
    let b = b.into();
    check_dimensions(a, x.len(), b.len())?;
    match direction {
        SweepDirection::Forward => {
            for i in 0..a.nrows() {
                relax_row(a, i, &mut x, &b)?;
            }
        }
        SweepDirection::Backward => {
            for i in (0..a.nrows()).rev() {
                relax_row(a, i, &mut x, &b)?;
            }
        }
    }
    Ok(())
}

/// A forward sweep followed by a backward sweep.
pub fn symmetric_gauss_seidel<'a, T: RealField + Copy>(
    a: &CsrMatrix<T>,
    x: impl Into<DVectorViewMut<'a, T>>,
    b: impl Into<DVectorView<'a, T>>,
) -> Result<(), RelaxationError> {
    let mut x = x.into();
    let b = b.into();
    gauss_seidel_sweep(a, &mut x, &b, SweepDirection::Forward)?;
    gauss_seidel_sweep(a, &mut x, &b, SweepDirection::Backward)
}
