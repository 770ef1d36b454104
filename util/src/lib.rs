//! Test helpers shared by the crates of the workspace.

use nalgebra::DMatrix;

/// Poor man's approx assertion for matrices
#[macro_export]
macro_rules! assert_approx_matrix_eq {
    ($x:expr, $y:expr, abstol = $tol:expr) => {{
        let diff = $x - $y;

        let max_absdiff = diff.abs().max();
        let approx_eq = max_absdiff <= $tol;

        if !approx_eq {
            println!("abstol: {:e}", $tol);
            println!("left: {}", $x);
            println!("right: {}", $y);
            println!("diff: {:e}", diff);
        }
        assert!(approx_eq);
    }};
}

#[macro_export]
macro_rules! assert_panics {
    ($e:expr) => {{
        use std::panic::catch_unwind;
        use std::stringify;
        let expr_string = stringify!($e);
        let result = catch_unwind(|| $e);
        if result.is_ok() {
            panic!("assert_panics!({}) failed.", expr_string);
        }
    }};
}

/// Largest entry of `|a - b|`, scaled by the largest entry of `|b|` when that exceeds one.
pub fn scaled_max_difference(a: &DMatrix<f64>, b: &DMatrix<f64>) -> f64 {
    assert_eq!(a.shape(), b.shape(), "Matrices must have the same shape.");
    let scale = b.amax().max(1.0);
    (a - b).amax() / scale
}

/// Least squares slope of `log(errors)` against `log(resolutions)`.
pub fn convergence_rate(resolutions: &[f64], errors: &[f64]) -> f64 {
    assert_eq!(resolutions.len(), errors.len());
    assert!(resolutions.len() >= 2, "Need at least two samples to estimate a rate.");
    let n = resolutions.len() as f64;
    let xs: Vec<f64> = resolutions.iter().map(|h| h.ln()).collect();
    let ys: Vec<f64> = errors.iter().map(|e| e.ln()).collect();
    let x_mean = xs.iter().sum::<f64>() / n;
    let y_mean = ys.iter().sum::<f64>() / n;
    let covariance: f64 = xs.iter().zip(&ys).map(|(x, y)| (x - x_mean) * (y - y_mean)).sum();
    let variance: f64 = xs.iter().map(|x| (x - x_mean).powi(2)).sum();
    covariance / variance
}
