//! Quadrature rules for the one-dimensional domain `[-1, 1]`.

use crate::{Error, Rule};
use std::f64::consts::PI;

/// Newton iterations allowed per root before giving up.
const MAX_NEWTON_ITERATIONS: usize = 100;

/// Evaluates the Legendre polynomial `P_n` and its derivative at `x` in the open interval
/// `(-1, 1)`, using the three-term recurrence
///
/// ```text
/// m P_m(x) = (2m - 1) x P_{m-1}(x) - (m - 1) P_{m-2}(x).
/// ```
fn legendre(n: usize, x: f64) -> (f64, f64) {
    let (mut current, mut previous) = (1.0, 0.0);
    for m in 1..=n {
        let m = m as f64;
        let next = ((2.0 * m - 1.0) * x * current - (m - 1.0) * previous) / m;
        previous = current;
        current = next;
    }
    // dP_n/dx = n (x P_n - P_{n-1}) / (x^2 - 1), undefined at |x| = 1
    let derivative = n as f64 * (x * current - previous) / (x * x - 1.0);
    (current, derivative)
}

/// Gauss-Legendre quadrature on `[-1, 1]` with `num_points` points.
///
/// The rule integrates polynomials of degree up to `2 n - 1` exactly. Points are returned in
/// increasing order.
pub fn try_gauss(num_points: usize) -> Result<Rule<1>, Error> {
    let n = num_points;
    if n == 0 {
        return Err(Error::EmptyRule);
    }

    let mut points = vec![[0.0]; n];
    let mut weights = vec![0.0; n];

    // Roots are symmetric about the origin: compute the positive half and mirror.
    for i in 0..(n + 1) / 2 {
        let mut x = (PI * (i as f64 + 0.75) / (n as f64 + 0.5)).cos();
        let mut converged = false;
        for _ in 0..MAX_NEWTON_ITERATIONS {
            let (p, dp) = legendre(n, x);
            let dx = p / dp;
            x -= dx;
            if dx.abs() <= 1e-15 {
                converged = true;
                break;
            }
        }
        if !converged {
            return Err(Error::RootNotFound { degree: n });
        }

        let (_, dp) = legendre(n, x);
        let w = 2.0 / ((1.0 - x * x) * dp * dp);

        points[n - 1 - i] = [x];
        weights[n - 1 - i] = w;
        points[i] = [-x];
        weights[i] = w;
    }

    // The middle root of an odd rule is exactly zero
    if n % 2 == 1 {
        points[n / 2] = [0.0];
    }

    Ok((weights, points))
}

/// Same as [`try_gauss`], but panics on failure.
///
/// # Panics
///
/// Panics if zero points are requested.
pub fn gauss(num_points: usize) -> Rule<1> {
    try_gauss(num_points).unwrap_or_else(|err| panic!("Gauss rule with {} points: {}", num_points, err))
}

/// Uniform midpoint rule on `[-1, 1]` with `num_points` equally sized cells.
///
/// This is *not* a Gaussian rule: it only integrates constants and linear functions exactly,
/// but it converges for discontinuous integrands, where Gauss rules of fixed size do not.
pub fn midpoint(num_points: usize) -> Result<Rule<1>, Error> {
    let n = num_points;
    if n == 0 {
        return Err(Error::EmptyRule);
    }
    let h = 2.0 / n as f64;
    let points = (0..n).map(|k| [-1.0 + h * (k as f64 + 0.5)]).collect();
    Ok((vec![h; n], points))
}
