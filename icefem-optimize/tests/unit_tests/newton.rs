use icefem_optimize::calculus::{DifferentiableVectorFunction, VectorFunction};
use icefem_optimize::newton::*;
use nalgebra::{DVector, DVectorView, DVectorViewMut, Matrix3, Vector3};
use std::error::Error;

struct MockLinearVectorFunction;

fn system_matrix() -> Matrix3<f64> {
    Matrix3::new(5.0, 1.0, 2.0, 1.0, 4.0, 2.0, 2.0, 2.0, 4.0)
}

impl VectorFunction<f64> for MockLinearVectorFunction {
    fn dimension(&self) -> usize {
        3
    }

    fn eval_into(&mut self, f: &mut DVectorViewMut<f64>, x: &DVectorView<f64>) -> Result<(), Box<dyn Error>> {
        let b = Vector3::new(1.0, 2.0, 3.0);
        let r = system_matrix() * x - b;
        f.copy_from(&r);
        Ok(())
    }
}

impl DifferentiableVectorFunction<f64> for MockLinearVectorFunction {
    fn solve_jacobian_system(
        &mut self,
        sol: &mut DVectorViewMut<f64>,
        _x: &DVectorView<f64>,
        rhs: &DVectorView<f64>,
    ) -> Result<(), Box<dyn Error>> {
        let a_inv = system_matrix().try_inverse().unwrap();
        sol.copy_from(&(a_inv * rhs));
        Ok(())
    }
}

/// F(x) = x^3 - 8 componentwise, root at x = 2.
struct Cubic {
    fail_after: Option<usize>,
    evaluations: usize,
}

impl VectorFunction<f64> for Cubic {
    fn dimension(&self) -> usize {
        2
    }

    fn eval_into(&mut self, f: &mut DVectorViewMut<f64>, x: &DVectorView<f64>) -> Result<(), Box<dyn Error>> {
        if self.fail_after.map_or(false, |n| self.evaluations >= n) {
            return Err(Box::from("evaluation failed"));
        }
        self.evaluations += 1;
        for i in 0..2 {
            f[i] = x[i].powi(3) - 8.0;
        }
        Ok(())
    }
}

impl DifferentiableVectorFunction<f64> for Cubic {
    fn solve_jacobian_system(
        &mut self,
        sol: &mut DVectorViewMut<f64>,
        x: &DVectorView<f64>,
        rhs: &DVectorView<f64>,
    ) -> Result<(), Box<dyn Error>> {
        for i in 0..2 {
            sol[i] = rhs[i] / (3.0 * x[i] * x[i]);
        }
        Ok(())
    }
}

fn settings(max_iterations: usize) -> NewtonSettings<f64> {
    NewtonSettings {
        max_iterations: Some(max_iterations),
        absolute_tolerance: 1e-10,
        relative_tolerance: 1e-14,
    }
}

#[test]
fn newton_converges_in_single_iteration_for_linear_system() {
    let expected_solution = Vector3::new(-0.125, 0.16666667, 0.72916667);

    let mut f = DVector::zeros(3);
    let mut x = DVector::zeros(3);
    let mut dx = DVector::zeros(3);

    let output = newton(MockLinearVectorFunction, &mut x, &mut f, &mut dx, settings(2))
        .expect("Newton iterations must succeed");
    let diff = x - expected_solution;
    assert!(diff.norm() < 1e-6);
    assert_eq!(output.iterations(), 1);
    assert_eq!(output.history.residual_norms.len(), 2);
    assert_eq!(output.reason, ConvergenceReason::AbsoluteTolerance);
}

#[test]
fn newton_records_decreasing_residual_history() {
    let mut function = Cubic {
        fail_after: None,
        evaluations: 0,
    };
    let mut x = DVector::from_element(2, 3.0);
    let mut f = DVector::zeros(2);
    let mut dx = DVector::zeros(2);

    let output = newton_line_search(
        &mut function,
        &mut x,
        &mut f,
        &mut dx,
        settings(50),
        &mut BacktrackingLineSearch::default(),
    )
    .unwrap();

    assert!((x[0] - 2.0).abs() < 1e-10);
    let norms = &output.history.residual_norms;
    assert_eq!(norms.len(), output.iterations() + 1);
    assert!(norms.windows(2).all(|pair| pair[1] < pair[0]));
}

#[test]
fn exceeding_maximum_iterations_is_reported_with_history() {
    let mut x = DVector::from_element(2, 10.0);
    let mut f = DVector::zeros(2);
    let mut dx = DVector::zeros(2);
    let function = Cubic {
        fail_after: None,
        evaluations: 0,
    };

    let err = newton(function, &mut x, &mut f, &mut dx, settings(2)).unwrap_err();
    assert!(matches!(err.kind, NewtonErrorKind::MaximumIterationsReached(2)));
    assert_eq!(err.history.residual_norms.len(), 3);
    assert_eq!(err.history.iterations(), 2);
}

#[test]
fn function_failures_abort_the_iteration() {
    let mut x = DVector::from_element(2, 10.0);
    let mut f = DVector::zeros(2);
    let mut dx = DVector::zeros(2);

    let function = Cubic {
        fail_after: Some(0),
        evaluations: 0,
    };
    let err = newton(function, &mut x, &mut f, &mut dx, settings(10)).unwrap_err();
    assert!(matches!(err.kind, NewtonErrorKind::FunctionError(_)));
    assert!(err.history.residual_norms.is_empty());

    let function = Cubic {
        fail_after: Some(2),
        evaluations: 0,
    };
    let err = newton(function, &mut x, &mut f, &mut dx, settings(10)).unwrap_err();
    assert!(matches!(err.kind, NewtonErrorKind::LineSearchError(_)));
}
