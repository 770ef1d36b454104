use crate::calculus::{DifferentiableVectorFunction, VectorFunction};
use crate::Real;
use itertools::iterate;
use log::debug;
use nalgebra::{DVectorView, DVectorViewMut, Scalar};
use numeric_literals::replace_float_literals;
use std::error::Error;
use std::fmt;
use std::fmt::Display;

/// Stopping criteria of [`newton`] and [`newton_line_search`].
///
/// Iteration stops once `|F(x)| <= max(absolute_tolerance, relative_tolerance * |F(x_0)|)`.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct NewtonSettings<T> {
    pub max_iterations: Option<usize>,
    pub absolute_tolerance: T,
    pub relative_tolerance: T,
}

/// Why the iteration stopped successfully.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ConvergenceReason {
    AbsoluteTolerance,
    RelativeTolerance,
}

/// Residual norms and step lengths of every iteration, including the initial residual.
#[derive(Debug, Clone, PartialEq)]
pub struct ResidualHistory<T> {
    pub residual_norms: Vec<T>,
    pub step_lengths: Vec<T>,
}

impl<T> Default for ResidualHistory<T> {
    fn default() -> Self {
        Self {
            residual_norms: Vec::new(),
            step_lengths: Vec::new(),
        }
    }
}

impl<T: Copy> ResidualHistory<T> {
    /// Number of Newton updates applied to the solution.
    pub fn iterations(&self) -> usize {
        self.step_lengths.len()
    }

    pub fn initial_residual(&self) -> Option<T> {
        self.residual_norms.first().copied()
    }

    pub fn final_residual(&self) -> Option<T> {
        self.residual_norms.last().copied()
    }
}

#[derive(Debug, Clone)]
pub struct NewtonOutput<T> {
    pub reason: ConvergenceReason,
    pub history: ResidualHistory<T>,
}

impl<T: Copy> NewtonOutput<T> {
    pub fn iterations(&self) -> usize {
        self.history.iterations()
    }
}

#[derive(Debug)]
#[non_exhaustive]
pub enum NewtonErrorKind {
    /// The procedure failed because the maximum number of iterations was reached.
    MaximumIterationsReached(usize),
    /// Evaluating the function failed.
    FunctionError(Box<dyn Error>),
    /// The procedure failed because solving the Jacobian system failed.
    JacobianError(Box<dyn Error>),
    /// The line search failed to produce a valid step.
    LineSearchError(Box<dyn Error>),
    /// The residual norm is not a finite number.
    NonFiniteResidual,
}

impl Display for NewtonErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MaximumIterationsReached(maxit) => {
                write!(f, "failed to converge within maximum number of iterations ({})", maxit)
            }
            Self::FunctionError(err) => write!(f, "failed to evaluate function: {}", err),
            Self::JacobianError(err) => write!(f, "failed to solve Jacobian system: {}", err),
            Self::LineSearchError(err) => write!(f, "line search failed to produce valid step: {}", err),
            Self::NonFiniteResidual => write!(f, "residual norm is not finite"),
        }
    }
}

/// Failure of the Newton iteration, together with the history up to the point of failure.
#[derive(Debug)]
pub struct NewtonError<T> {
    pub kind: NewtonErrorKind,
    pub history: ResidualHistory<T>,
}

impl<T> Display for NewtonError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Newton iteration failed after {} steps: {}",
            self.history.step_lengths.len(),
            self.kind
        )
    }
}

impl<T: fmt::Debug> Error for NewtonError<T> {}

/// Attempts to solve the non-linear equation F(u) = 0 with full Newton steps.
///
/// `f` and `dx` are workspace vectors of the same length as `x`. On success, `x` holds the
/// solution and `f` the final residual.
pub fn newton<'a, T, F>(
    function: F,
    x: impl Into<DVectorViewMut<'a, T>>,
    f: impl Into<DVectorViewMut<'a, T>>,
    dx: impl Into<DVectorViewMut<'a, T>>,
    settings: NewtonSettings<T>,
) -> Result<NewtonOutput<T>, NewtonError<T>>
where
    T: Real,
    F: DifferentiableVectorFunction<T>,
{
    newton_line_search(function, x, f, dx, settings, &mut NoLineSearch {})
}

/// Same as `newton`, but allows specifying a line search.
#[replace_float_literals(T::from_f64(literal).unwrap())]
pub fn newton_line_search<'a, T, F>(
    mut function: F,
    x: impl Into<DVectorViewMut<'a, T>>,
    f: impl Into<DVectorViewMut<'a, T>>,
    dx: impl Into<DVectorViewMut<'a, T>>,
    settings: NewtonSettings<T>,
    line_search: &mut impl LineSearch<T, F>,
) -> Result<NewtonOutput<T>, NewtonError<T>>
where
    T: Real,
    F: DifferentiableVectorFunction<T>,
{
    let mut x = x.into();
    let mut f = f.into();
    let mut minus_dx = dx.into();

    assert_eq!(x.nrows(), f.nrows());
    assert_eq!(minus_dx.nrows(), f.nrows());

    let mut history = ResidualHistory::default();
    let fail = |kind, history| Err(NewtonError { kind, history });

    if let Err(err) = function.eval_into(&mut f, &DVectorView::from(&x)) {
        return fail(NewtonErrorKind::FunctionError(err), history);
    }

    let initial_norm = f.norm();
    history.residual_norms.push(initial_norm);
    let tolerance = settings
        .absolute_tolerance
        .max(settings.relative_tolerance * initial_norm);

    loop {
        let norm = *history.residual_norms.last().expect("history starts non-empty");
        if !norm.is_finite() {
            return fail(NewtonErrorKind::NonFiniteResidual, history);
        }
        if norm <= settings.absolute_tolerance {
            return Ok(NewtonOutput {
                reason: ConvergenceReason::AbsoluteTolerance,
                history,
            });
        }
        if norm <= tolerance {
            return Ok(NewtonOutput {
                reason: ConvergenceReason::RelativeTolerance,
                history,
            });
        }

        let iter = history.iterations();
        if settings.max_iterations.map_or(false, |max_iter| iter >= max_iter) {
            return fail(NewtonErrorKind::MaximumIterationsReached(iter), history);
        }

        // Solve the system J dx = -f   <=>   J (-dx) = f
        let j_result = function.solve_jacobian_system(&mut minus_dx, &DVectorView::from(&x), &DVectorView::from(&f));
        if let Err(err) = j_result {
            return fail(NewtonErrorKind::JacobianError(err), history);
        }

        // Flip sign to make it consistent with line search
        minus_dx *= -1.0;
        let dx = &minus_dx;

        let step_length = match line_search.step(
            &mut function,
            DVectorViewMut::from(&mut f),
            DVectorViewMut::from(&mut x),
            DVectorView::from(dx),
        ) {
            Ok(step_length) => step_length,
            Err(err) => return fail(NewtonErrorKind::LineSearchError(err), history),
        };

        let norm = f.norm();
        debug!("Newton iter {}: |F| = {}, step length {}", iter + 1, norm, step_length);
        history.step_lengths.push(step_length);
        history.residual_norms.push(norm);
    }
}

pub trait LineSearch<T: Scalar, F: VectorFunction<T>> {
    /// Updates `x` along `direction` and stores the new residual in `f`.
    ///
    /// Returns the step length.
    fn step(
        &mut self,
        function: &mut F,
        f: DVectorViewMut<T>,
        x: DVectorViewMut<T>,
        direction: DVectorView<T>,
    ) -> Result<T, Box<dyn Error>>;
}

/// Trivial implementation of line search. Equivalent to a single, full Newton step.
#[derive(Clone, Debug)]
pub struct NoLineSearch;

impl<T, F> LineSearch<T, F> for NoLineSearch
where
    T: Real,
    F: VectorFunction<T>,
{
    fn step(
        &mut self,
        function: &mut F,
        mut f: DVectorViewMut<T>,
        mut x: DVectorViewMut<T>,
        direction: DVectorView<T>,
    ) -> Result<T, Box<dyn Error>> {
        x.axpy(T::one(), &direction, T::one());
        function.eval_into(&mut f, &DVectorView::from(&x))?;
        Ok(T::one())
    }
}

/// Backtracking line search using the Armijo condition on `g(x) = |F(x)|^2 / 2`.
///
/// See Nocedal & Wright (2006), Numerical Optimization, Chapter 3.1.
#[derive(Clone, Debug)]
pub struct BacktrackingLineSearch<T> {
    /// Sufficient decrease parameter in `(0, 1)`.
    pub c: T,
    /// The smallest step length tried before giving up.
    pub alpha_min: T,
}

impl Default for BacktrackingLineSearch<f64> {
    fn default() -> Self {
        Self {
            c: 1e-4,
            alpha_min: 1e-6,
        }
    }
}

impl<T, F> LineSearch<T, F> for BacktrackingLineSearch<T>
where
    T: Real,
    F: VectorFunction<T>,
{
    #[replace_float_literals(T::from_f64(literal).unwrap())]
    fn step(
        &mut self,
        function: &mut F,
        mut f: DVectorViewMut<T>,
        mut x: DVectorViewMut<T>,
        direction: DVectorView<T>,
    ) -> Result<T, Box<dyn Error>> {
        // With p the Newton direction, grad g^T p ~= -2 g(x), so the sufficient decrease
        // condition g(x + alpha p) <= g(x) + c alpha grad g^T p becomes
        //  g(x + alpha p) <= (1 - 2 c alpha) g(x)
        let c = self.c;
        let g_initial = 0.5 * f.magnitude_squared();

        // Shrink slowly at first, then geometrically
        let mut alphas = [1.0, 0.75, 0.5]
            .into_iter()
            .chain(iterate(0.25, |alpha| 0.25 * *alpha));

        let mut alpha_prev = 0.0;
        loop {
            let alpha = alphas.next().expect("iterator is infinite");

            // x_{k+1} = x_0 + alpha_k p = x_k + (alpha_k - alpha_{k-1}) p
            x.axpy(alpha - alpha_prev, &direction, T::one());
            function.eval_into(&mut f, &DVectorView::from(&x))?;

            let g = 0.5 * f.magnitude_squared();
            if g.is_finite() && g <= (1.0 - 2.0 * c * alpha) * g_initial {
                return Ok(alpha);
            } else if alpha < self.alpha_min {
                // Leave x where it started
                x.axpy(-alpha, &direction, T::one());
                function.eval_into(&mut f, &DVectorView::from(&x))?;
                return Err(Box::from(format!(
                    "step length {} is smaller than the minimum allowed step length {}",
                    alpha, self.alpha_min
                )));
            }
            alpha_prev = alpha;
        }
    }
}
