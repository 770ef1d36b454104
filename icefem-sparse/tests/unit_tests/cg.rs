use super::{dense, laplacian_1d};
use icefem_sparse::cg::{
    ConjugateGradient, IdentityOperator, LinearOperator, RelativeResidualCriterion, SolveErrorKind,
};
use matrixcompare::assert_matrix_eq;
use nalgebra::{DMatrix, DVector, DVectorView, DVectorViewMut};
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use proptest::prelude::*;

#[test]
fn csr_operator_matches_dense_product() {
    let a = laplacian_1d(7);
    let x = DVector::from_fn(7, |i, _| (i as f64).sin() + 0.5);
    let mut y = DVector::zeros(7);
    a.apply(DVectorViewMut::from(&mut y), DVectorView::from(&x))
        .unwrap();
    let expected = dense(&a) * &x;
    assert_matrix_eq!(y, expected, comp = abs, tol = 1e-14);
}

#[test]
fn rectangular_csr_operator_overwrites_output() {
    let mut coo = CooMatrix::new(2, 3);
    coo.push(0, 0, 1.0);
    coo.push(0, 2, -2.0);
    coo.push(1, 1, 3.0);
    coo.push(1, 1, 0.5);
    let a = CsrMatrix::from(&coo);
    let x = DVector::from_column_slice(&[1.0, 2.0, 3.0]);
    let mut y = DVector::from_element(2, 10.0);
    a.apply(DVectorViewMut::from(&mut y), DVectorView::from(&x))
        .unwrap();
    assert_matrix_eq!(y, DVector::from_column_slice(&[-5.0, 7.0]), comp = abs, tol = 1e-14);
}

#[test]
fn csr_operator_rejects_mismatched_dimensions() {
    let a = laplacian_1d(4);
    let x = DVector::zeros(5);
    let mut y = DVector::zeros(4);
    assert!(a
        .apply(DVectorViewMut::from(&mut y), DVectorView::from(&x))
        .is_err());
}

#[test]
fn cg_solves_laplacian() {
    let n = 25;
    let a = laplacian_1d(n);
    let x_exact = DVector::from_fn(n, |i, _| 1.0 + i as f64 / n as f64);
    let b = dense(&a) * &x_exact;

    let mut x = DVector::zeros(n);
    let output = ConjugateGradient::new()
        .with_operator(&a)
        .with_stopping_criterion(RelativeResidualCriterion::new(1e-12))
        .solve_with_guess(&b, &mut x)
        .unwrap();

    // n steps in exact arithmetic, allow for some loss of orthogonality
    assert!(output.num_iterations <= 2 * n);
    assert_matrix_eq!(x, x_exact, comp = abs, tol = 1e-8);
}

#[test]
fn cg_with_exact_preconditioner_converges_in_one_iteration() {
    let n = 10;
    let a = dense(&laplacian_1d(n));
    let a_inv = a.clone().try_inverse().unwrap();
    let b = DVector::from_element(n, 1.0);

    let mut x = DVector::zeros(n);
    let output = ConjugateGradient::new()
        .with_operator(&a)
        .with_preconditioner(&a_inv)
        .with_stopping_criterion(RelativeResidualCriterion::new(1e-10))
        .solve_with_guess(&b, &mut x)
        .unwrap();

    assert_eq!(output.num_iterations, 1);
    let residual = &b - &a * &x;
    assert!(residual.norm() <= 1e-10 * b.norm());
}

#[test]
fn cg_zero_rhs_gives_zero_solution() {
    let a = laplacian_1d(5);
    let b = DVector::zeros(5);
    let mut x = DVector::from_element(5, 3.0);
    let output = ConjugateGradient::new()
        .with_operator(&a)
        .with_stopping_criterion(RelativeResidualCriterion::default())
        .solve_with_guess(&b, &mut x)
        .unwrap();
    assert_eq!(output.num_iterations, 0);
    assert_eq!(x, DVector::zeros(5));
}

#[test]
fn cg_detects_indefinite_operator() {
    let a = -DMatrix::<f64>::identity(3, 3);
    let b = DVector::from_element(3, 1.0);
    let mut x = DVector::zeros(3);
    let err = ConjugateGradient::new()
        .with_operator(&a)
        .with_stopping_criterion(RelativeResidualCriterion::default())
        .solve_with_guess(&b, &mut x)
        .unwrap_err();
    assert!(matches!(err.kind, SolveErrorKind::IndefiniteOperator));
}

#[test]
fn cg_reports_max_iterations() {
    let n = 50;
    let a = laplacian_1d(n);
    let b = DVector::from_fn(n, |i, _| if i % 2 == 0 { 1.0 } else { -0.5 });
    let mut x = DVector::zeros(n);
    let err = ConjugateGradient::new()
        .with_operator(&a)
        .with_preconditioner(IdentityOperator)
        .with_max_iter(3)
        .with_stopping_criterion(RelativeResidualCriterion::new(1e-14))
        .solve_with_guess(&b, &mut x)
        .unwrap_err();
    assert!(matches!(err.kind, SolveErrorKind::MaxIterationsReached { max_iter: 3 }));
    assert_eq!(err.output.num_iterations, 3);
}

proptest! {
    #[test]
    fn cg_solves_shifted_laplacian(n in 1usize..30, shift in 0.0..5.0f64) {
        let a = dense(&laplacian_1d(n)) + DMatrix::identity(n, n) * shift;
        let x_exact = DVector::from_fn(n, |i, _| (i as f64 * 0.7).cos());
        let b = &a * &x_exact;
        let mut x = DVector::zeros(n);
        ConjugateGradient::new()
            .with_operator(&a)
            .with_stopping_criterion(RelativeResidualCriterion::new(1e-12))
            .solve_with_guess(&b, &mut x)
            .unwrap();
        let residual = &b - &a * &x;
        prop_assert!(residual.norm() <= 1e-10 * b.norm().max(1.0));
    }
}
