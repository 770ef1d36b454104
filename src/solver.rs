//! The nonlinear solver driver.
//!
//! [`StokesSolver`] owns the multigrid hierarchy of one problem. Each call to
//! [`StokesSolver::solve`] pushes a new geometry into the finest level, restricts it to all
//! coarser levels and runs Newton's method, solving every linearized system with conjugate
//! gradients preconditioned by a multigrid V-cycle.
//!
//! Assembly failures are caught at the callback boundary and agreed upon with a collective
//! reduction, so that every process returns [`SolveError::CallbackFailed`] together.
use crate::assembly::{assemble_jacobian, assemble_residual, boundary_state, Assembler, Blatter, Level};
use crate::comm::{Communicator, SelfCommunicator};
use crate::config::SolverConfig;
use crate::error::SetupError;
use crate::field::{Field2, Field3, Geometry};
use crate::grid::{Grid, Patch};
use crate::multigrid::{CoarseningHook, GridInfo, Hierarchy, MultigridPreconditioner};
use icefem_optimize::calculus::{DifferentiableVectorFunction, VectorFunction};
use icefem_optimize::newton::{
    newton_line_search, BacktrackingLineSearch, NewtonErrorKind, NewtonSettings, ResidualHistory,
};
use icefem_sparse::cg::{ConjugateGradient, RelativeResidualCriterion};
use log::{debug, warn};
use nalgebra::{DVector, DVectorView, DVectorViewMut};
use std::error::Error;
use std::fmt;

/// Summary of a Newton solve.
#[derive(Clone, Debug, PartialEq)]
pub struct SolveReport {
    /// Residual norms of all iterates, starting with the initial guess.
    pub residual_norms: Vec<f64>,
    pub step_lengths: Vec<f64>,
    /// Conjugate gradient iterations of every linear solve.
    pub linear_iterations: Vec<usize>,
    /// Why the iteration stopped, if it did not converge.
    pub failure: Option<String>,
}

impl SolveReport {
    fn new(history: ResidualHistory<f64>, linear_iterations: Vec<usize>, failure: Option<String>) -> Self {
        Self {
            residual_norms: history.residual_norms,
            step_lengths: history.step_lengths,
            linear_iterations,
            failure,
        }
    }

    pub fn converged(&self) -> bool {
        self.failure.is_none()
    }

    pub fn newton_iterations(&self) -> usize {
        self.step_lengths.len()
    }

    pub fn final_residual(&self) -> Option<f64> {
        self.residual_norms.last().copied()
    }
}

#[derive(Debug)]
#[non_exhaustive]
pub enum SolveError {
    Setup(SetupError),
    /// Assembly or coarsening failed on at least one process. The message is only available
    /// on the processes where the failure occurred.
    CallbackFailed { message: Option<String> },
    /// The nonlinear or a linear solve did not reach its tolerance.
    NotConverged(SolveReport),
}

impl fmt::Display for SolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Setup(err) => write!(f, "invalid solver setup: {}", err),
            Self::CallbackFailed { message: Some(message) } => write!(f, "assembly failed: {}", message),
            Self::CallbackFailed { message: None } => write!(f, "assembly failed on another process"),
            Self::NotConverged(report) => write!(
                f,
                "solver did not converge after {} iterations: {}",
                report.newton_iterations(),
                report.failure.as_deref().unwrap_or("unknown reason")
            ),
        }
    }
}

impl Error for SolveError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Setup(err) => Some(err),
            _ => None,
        }
    }
}

impl From<SetupError> for SolveError {
    fn from(err: SetupError) -> Self {
        Self::Setup(err)
    }
}

/// A failure of a collective callback, after all processes agreed on it.
#[derive(Debug)]
struct CallbackFailure {
    message: Option<String>,
}

impl fmt::Display for CallbackFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{}", message),
            None => write!(f, "failure on another process"),
        }
    }
}

impl Error for CallbackFailure {}

/// Reduces the outcome of a local callback over all processes.
///
/// Fails on every process if the callback failed on any of them.
fn collective<T, C: Communicator + ?Sized>(comm: &C, result: eyre::Result<T>) -> Result<T, CallbackFailure> {
    let failed = comm.all_reduce_or(result.is_err());
    match result {
        Ok(value) if !failed => Ok(value),
        Ok(_) => Err(CallbackFailure { message: None }),
        Err(err) => Err(CallbackFailure {
            message: Some(format!("{:#}", err)),
        }),
    }
}

/// The residual of one problem on the finest level, with Jacobian systems solved by
/// multigrid-preconditioned conjugate gradients.
struct NewtonProblem<'a, A: ?Sized, C: ?Sized> {
    assembler: &'a A,
    hierarchy: &'a Hierarchy,
    patches: &'a [Vec<Patch>],
    comm: &'a C,
    config: &'a SolverConfig,
    linear_iterations: Vec<usize>,
}

impl<'a, A, C> VectorFunction<f64> for NewtonProblem<'a, A, C>
where
    A: Assembler + ?Sized,
    C: Communicator + ?Sized,
{
    fn dimension(&self) -> usize {
        self.hierarchy
            .finest()
            .num_dofs(self.assembler.dofs_per_node())
    }

    fn eval_into(&mut self, f: &mut DVectorViewMut<f64>, x: &DVectorView<f64>) -> Result<(), Box<dyn Error>> {
        let local = assemble_residual(self.assembler, self.hierarchy.finest(), &self.patches[0], x.as_slice());
        let residual = collective(self.comm, local)?;
        f.copy_from(&residual);
        Ok(())
    }
}

impl<'a, A, C> DifferentiableVectorFunction<f64> for NewtonProblem<'a, A, C>
where
    A: Assembler + ?Sized,
    C: Communicator + ?Sized,
{
    fn solve_jacobian_system(
        &mut self,
        sol: &mut DVectorViewMut<f64>,
        x: &DVectorView<f64>,
        rhs: &DVectorView<f64>,
    ) -> Result<(), Box<dyn Error>> {
        // Every level is rediscretized around the state injected from the finest level
        let states = self.hierarchy.inject_state(x.as_slice());
        let local: eyre::Result<Vec<_>> = self
            .hierarchy
            .levels()
            .iter()
            .zip(self.patches)
            .zip(&states)
            .map(|((level, patches), state)| assemble_jacobian(self.assembler, level, patches, state))
            .collect();
        let matrices = collective(self.comm, local)?;

        let jacobian = matrices[0].clone();
        let preconditioner = MultigridPreconditioner::new(self.hierarchy, matrices, self.config.linear.smoothing_steps)?;

        sol.fill(0.0);
        let output = ConjugateGradient::new()
            .with_operator(&jacobian)
            .with_preconditioner(&preconditioner)
            .with_stopping_criterion(RelativeResidualCriterion::new(self.config.linear.rtol))
            .with_max_iter(self.config.linear.max_iterations)
            .solve_with_guess(rhs, &mut *sol)?;
        debug!(
            "Linear solve: {} CG iterations, residual norm {:e}",
            output.num_iterations, output.residual_norm
        );
        self.linear_iterations.push(output.num_iterations);
        Ok(())
    }
}

/// A Newton-multigrid solver for the problem defined by `A` on a fixed grid.
pub struct StokesSolver<A, C = SelfCommunicator> {
    assembler: A,
    config: SolverConfig,
    grid: Grid,
    hierarchy: Hierarchy,
    /// The patches of every level owned by this process, finest first.
    patches: Vec<Vec<Patch>>,
    comm: C,
    hooks: Vec<Box<dyn CoarseningHook>>,
    state: Option<Vec<f64>>,
}

impl<A: fmt::Debug, C: fmt::Debug> fmt::Debug for StokesSolver<A, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StokesSolver")
            .field("assembler", &self.assembler)
            .field("config", &self.config)
            .field("grid", &self.grid)
            .field("comm", &self.comm)
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

impl<A: Assembler> StokesSolver<A> {
    /// A single-process solver on the horizontal extent of `grid`, with `config.mz` nodes
    /// per column.
    pub fn new(grid: &Grid, assembler: A, config: SolverConfig) -> Result<Self, SetupError> {
        Self::with_communicator(grid, assembler, config, SelfCommunicator)
    }
}

impl<A: Assembler, C: Communicator> StokesSolver<A, C> {
    pub fn with_communicator(grid: &Grid, assembler: A, config: SolverConfig, comm: C) -> Result<Self, SetupError> {
        config.validate()?;
        let grid = Grid::new(grid.mx(), grid.my(), config.mz, grid.x0(), grid.y0(), grid.lx(), grid.ly())?;
        let padded = grid.padded(config.n_levels, config.coarsening_factor, config.coarsen_horizontally)?;
        let hierarchy = Hierarchy::new(
            padded,
            config.n_levels,
            config.coarsening_factor,
            config.coarsen_horizontally,
            config.min_thickness,
            assembler.dofs_per_node(),
        )?
        .with_domain(grid.mx(), grid.my())?;
        let patches = hierarchy
            .levels()
            .iter()
            .map(|level| vec![Patch::whole(&level.grid)])
            .collect();
        Ok(Self {
            assembler,
            config,
            grid,
            hierarchy,
            patches,
            comm,
            hooks: Vec::new(),
            state: None,
        })
    }

    /// Splits every level into `px x py` patches, all assembled by this process.
    ///
    /// The result does not depend on the partition.
    pub fn with_partition(mut self, px: usize, py: usize) -> Result<Self, SetupError> {
        self.patches = self
            .hierarchy
            .levels()
            .iter()
            .map(|level| Patch::partition(&level.grid, px, py))
            .collect::<Result<_, _>>()?;
        Ok(self)
    }

    /// Registers `hook` to run on every coarse level after its parameters are restricted.
    pub fn register_coarsening_hook(&mut self, hook: impl CoarseningHook + 'static) {
        self.hooks.push(Box::new(hook));
    }

    pub fn assembler(&self) -> &A {
        &self.assembler
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// The unpadded grid.
    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn hierarchy(&self) -> &Hierarchy {
        &self.hierarchy
    }

    /// Level reports, coarsest first.
    pub fn levels(&self) -> Vec<GridInfo> {
        self.hierarchy.grid_info()
    }

    /// The state on the padded finest grid, if a solve has completed.
    pub fn state(&self) -> Option<&[f64]> {
        self.state.as_deref()
    }

    /// Writes `geometry` into the finest level and classifies its nodes.
    fn set_geometry(&mut self, geometry: &Geometry) -> Result<(), SetupError> {
        geometry.check_shape(&self.grid)?;
        let constants = self.config.constants;
        self.hierarchy.finest_mut().set_geometry(geometry, &constants);
        Ok(())
    }

    /// Solves the problem for `geometry`, starting from the previous solution if there is one.
    pub fn solve(&mut self, geometry: &Geometry) -> Result<SolveReport, SolveError> {
        self.set_geometry(geometry)?;

        let coefficient = self.assembler.init_coefficient(self.hierarchy.finest(), geometry);
        self.hierarchy.finest_mut().coefficient =
            collective(&self.comm, coefficient).map_err(|err| SolveError::CallbackFailed { message: err.message })?;
        let restricted = self.hierarchy.restrict_parameters(&mut self.hooks);
        collective(&self.comm, restricted).map_err(|err| SolveError::CallbackFailed { message: err.message })?;

        let finest = self.hierarchy.finest();
        let mut x = match &self.state {
            Some(state) => DVector::from_column_slice(state),
            None => DVector::from_vec(boundary_state(&self.assembler, finest)),
        };
        let n = x.len();
        let mut f = DVector::zeros(n);
        let mut dx = DVector::zeros(n);

        let settings = NewtonSettings {
            max_iterations: Some(self.config.newton.max_iterations),
            absolute_tolerance: self.config.newton.atol,
            relative_tolerance: self.config.newton.rtol,
        };
        let mut problem = NewtonProblem {
            assembler: &self.assembler,
            hierarchy: &self.hierarchy,
            patches: &self.patches,
            comm: &self.comm,
            config: &self.config,
            linear_iterations: Vec::new(),
        };
        let result = newton_line_search(
            &mut problem,
            &mut x,
            &mut f,
            &mut dx,
            settings,
            &mut BacktrackingLineSearch::default(),
        );
        let linear_iterations = problem.linear_iterations;

        match result {
            Ok(output) => {
                let report = SolveReport::new(output.history, linear_iterations, None);
                debug!(
                    "Newton converged ({:?}) in {} iterations, |F| = {:e}",
                    output.reason,
                    report.newton_iterations(),
                    report.final_residual().unwrap_or(f64::NAN)
                );
                self.state = Some(x.as_slice().to_vec());
                Ok(report)
            }
            Err(err) => {
                let callback_failure = match &err.kind {
                    NewtonErrorKind::FunctionError(inner)
                    | NewtonErrorKind::JacobianError(inner)
                    | NewtonErrorKind::LineSearchError(inner) => inner.downcast_ref::<CallbackFailure>(),
                    _ => None,
                };
                if let Some(failure) = callback_failure {
                    return Err(SolveError::CallbackFailed {
                        message: failure.message.clone(),
                    });
                }
                warn!("Newton solve failed: {}", err);
                let report = SolveReport::new(err.history, linear_iterations, Some(err.kind.to_string()));
                Err(SolveError::NotConverged(report))
            }
        }
    }

    /// Component `component` of the solution on the unpadded grid.
    ///
    /// If the vertical direction is padded, every column is interpolated linearly in sigma
    /// to the `Mz` levels of the unpadded grid, so that the last level is the ice surface.
    pub fn solution(&self, component: usize) -> Option<Field3<f64>> {
        let state = self.state.as_ref()?;
        let dofs = self.assembler.dofs_per_node();
        if component >= dofs {
            return None;
        }
        let padded = self.hierarchy.finest().grid;
        let grid = self.grid;
        let intervals = (padded.mz() - 1) as f64;
        Some(Field3::from_fn(grid.mx(), grid.my(), grid.mz(), |i, j, k| {
            let s = grid.sigma(k) * intervals;
            let below = (s.floor() as usize).min(padded.mz() - 2);
            let t = s - below as f64;
            let value = |k| state[padded.node_index(i, j, k) * dofs + component];
            (1.0 - t) * value(below) + t * value(below + 1)
        }))
    }

    /// The finest level, including padding.
    pub fn finest_level(&self) -> &Level {
        self.hierarchy.finest()
    }
}

/// Horizontal ice velocity on the unpadded grid.
#[derive(Clone, Debug, PartialEq)]
pub struct VelocityField {
    pub u: Field3<f64>,
    pub v: Field3<f64>,
}

fn depth_average(field: &Field3<f64>) -> Field2<f64> {
    Field2::from_fn(field.mx(), field.my(), |i, j| {
        let column = field.column(i, j);
        let sum: f64 = column.windows(2).map(|w| 0.5 * (w[0] + w[1])).sum();
        sum / (column.len() - 1) as f64
    })
}

impl VelocityField {
    /// Vertical averages of `u` and `v`, using the trapezoidal rule on the uniform sigma levels.
    pub fn depth_averaged(&self) -> (Field2<f64>, Field2<f64>) {
        (depth_average(&self.u), depth_average(&self.v))
    }

    /// Velocity at the bed.
    pub fn basal(&self) -> (Field2<f64>, Field2<f64>) {
        let basal = |field: &Field3<f64>| Field2::from_fn(field.mx(), field.my(), |i, j| field[(i, j, 0)]);
        (basal(&self.u), basal(&self.v))
    }
}

impl<F, S, B, C> StokesSolver<Blatter<F, S, B>, C>
where
    Blatter<F, S, B>: Assembler,
    C: Communicator,
{
    /// The velocity computed by the last successful solve.
    pub fn velocity(&self) -> Option<VelocityField> {
        Some(VelocityField {
            u: self.solution(0)?,
            v: self.solution(1)?,
        })
    }
}
