use super::{dense, laplacian_1d};
use icefem_sparse::relaxation::{gauss_seidel_sweep, symmetric_gauss_seidel, RelaxationError, SweepDirection};
use matrixcompare::assert_matrix_eq;
use nalgebra::DVector;
use nalgebra_sparse::{CooMatrix, CsrMatrix};

#[test]
fn gauss_seidel_solves_triangular_system_in_one_forward_sweep() {
    // Lower triangular: forward substitution is exact
    let mut coo = CooMatrix::new(3, 3);
    coo.push(0, 0, 2.0);
    coo.push(1, 0, 1.0);
    coo.push(1, 1, 4.0);
    coo.push(2, 1, -1.0);
    coo.push(2, 2, 1.0);
    let a = CsrMatrix::from(&coo);
    let x_exact = DVector::from_vec(vec![1.0, -2.0, 3.0]);
    let b = dense(&a) * &x_exact;

    let mut x = DVector::zeros(3);
    gauss_seidel_sweep(&a, &mut x, &b, SweepDirection::Forward).unwrap();
    assert_matrix_eq!(x, x_exact, comp = abs, tol = 1e-14);
}

#[test]
fn symmetric_gauss_seidel_reduces_error() {
    let n = 20;
    let a = laplacian_1d(n);
    let x_exact = DVector::from_fn(n, |i, _| (i as f64 * 0.3).sin());
    let b = dense(&a) * &x_exact;

    let a_dense = dense(&a);
    let energy_norm = |e: DVector<f64>| e.dot(&(&a_dense * &e)).sqrt();

    let mut x = DVector::zeros(n);
    let mut previous_error = energy_norm(&x - &x_exact);
    for _ in 0..10 {
        symmetric_gauss_seidel(&a, &mut x, &b).unwrap();
        let error = energy_norm(&x - &x_exact);
        assert!(error < previous_error);
        previous_error = error;
    }
}

#[test]
fn gauss_seidel_fixed_point_is_solution() {
    let a = laplacian_1d(6);
    let x_exact = DVector::from_element(6, 2.5);
    let b = dense(&a) * &x_exact;
    let mut x = x_exact.clone();
    symmetric_gauss_seidel(&a, &mut x, &b).unwrap();
    assert_matrix_eq!(x, x_exact, comp = abs, tol = 1e-14);
}

#[test]
fn gauss_seidel_rejects_zero_diagonal() {
    let mut coo = CooMatrix::new(2, 2);
    coo.push(0, 0, 1.0);
    coo.push(1, 0, 1.0);
    let a = CsrMatrix::from(&coo);
    let b = DVector::from_element(2, 1.0);
    let mut x = DVector::zeros(2);
    let err = gauss_seidel_sweep(&a, &mut x, &b, SweepDirection::Forward).unwrap_err();
    assert_eq!(err, RelaxationError::ZeroDiagonal { row: 1 });
}

#[test]
fn gauss_seidel_rejects_mismatched_dimensions() {
    let a = laplacian_1d(3);
    let b = DVector::zeros(4);
    let mut x = DVector::zeros(4);
    let err = symmetric_gauss_seidel(&a, &mut x, &b).unwrap_err();
    assert!(matches!(err, RelaxationError::DimensionMismatch { .. }));
}
