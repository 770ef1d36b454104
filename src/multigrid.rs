//! Geometric multigrid on a hierarchy of coarsened grids.
//!
//! Levels are stored finest first. Every level carries its own [`Parameters`], which are
//! restricted from the next finer level and reclassified before each solve. Transfer between
//! levels uses trilinear interpolation in index space (prolongation) and its transpose
//! (restriction).
use crate::assembly::Level;
use crate::error::SetupError;
use crate::field::{Field2, Field3, Parameters};
use crate::grid::Grid;
use crate::node_type::classify;
use icefem_sparse::cg::LinearOperator;
use icefem_sparse::relaxation::{gauss_seidel_sweep, SweepDirection};
use itertools::iproduct;
use log::info;
use nalgebra::linalg::LU;
use nalgebra::{DMatrix, DVector, DVectorView, DVectorViewMut, Dyn};
use nalgebra_sparse::ops::serial::spmm_csr_dense;
use nalgebra_sparse::ops::Op;
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use std::error::Error;
use std::fmt;

/// Interpolation weights of fine node `fine` with respect to the coarse nodes, for a
/// coarsening by `factor`. The second weight is zero for nodes that coincide with a coarse node.
fn interpolation_weights(fine: usize, factor: usize) -> [(usize, f64); 2] {
    let coarse = fine / factor;
    let t = (fine % factor) as f64 / factor as f64;
    [(coarse, 1.0 - t), (coarse + 1, t)]
}

/// Ratio of fine to coarse element counts in one direction.
fn factor(fine_nodes: usize, coarse_nodes: usize) -> usize {
    (fine_nodes - 1) / (coarse_nodes - 1)
}

/// The prolongation from `coarse` to `fine` for fields with `dofs` values per node.
///
/// Both grids must cover the same domain, with node counts related by an integer factor in
/// each direction.
pub fn prolongation(fine: &Grid, coarse: &Grid, dofs: usize) -> CsrMatrix<f64> {
    let (fx, fy, fz) = (
        factor(fine.mx(), coarse.mx()),
        factor(fine.my(), coarse.my()),
        factor(fine.mz(), coarse.mz()),
    );
    let mut coo = CooMatrix::new(fine.num_nodes() * dofs, coarse.num_nodes() * dofs);
    for (j, i, k) in iproduct!(0..fine.my(), 0..fine.mx(), 0..fine.mz()) {
        let row = fine.node_index(i, j, k);
        let weights = iproduct!(
            interpolation_weights(j, fy),
            interpolation_weights(i, fx),
            interpolation_weights(k, fz)
        );
        for ((jc, wy), (ic, wx), (kc, wz)) in weights {
            let w = wx * wy * wz;
            if w == 0.0 {
                continue;
            }
            let col = coarse.node_index(ic, jc, kc);
            for c in 0..dofs {
                coo.push(row * dofs + c, col * dofs + c, w);
            }
        }
    }
    CsrMatrix::from(&coo)
}

/// The horizontal prolongation from the columns of `coarse` to the columns of `fine`.
pub fn column_prolongation(fine: &Grid, coarse: &Grid) -> CsrMatrix<f64> {
    let (fx, fy) = (factor(fine.mx(), coarse.mx()), factor(fine.my(), coarse.my()));
    let mut coo = CooMatrix::new(fine.num_columns(), coarse.num_columns());
    for (j, i) in iproduct!(0..fine.my(), 0..fine.mx()) {
        let weights = iproduct!(interpolation_weights(j, fy), interpolation_weights(i, fx));
        for ((jc, wy), (ic, wx)) in weights {
            if wx * wy != 0.0 {
                coo.push(fine.column_index(i, j), coarse.column_index(ic, jc), wx * wy);
            }
        }
    }
    CsrMatrix::from(&coo)
}

/// The transpose of `prolongation`, with every row scaled to sum to one.
///
/// Unlike the plain transpose this maps constant fields to the same constant, which is what
/// is needed to restrict parameter fields rather than residuals.
pub fn averaging_restriction(prolongation: &CsrMatrix<f64>) -> CsrMatrix<f64> {
    let mut restriction = prolongation.transpose();
    for mut row in restriction.row_iter_mut() {
        let sum: f64 = row.values().iter().sum();
        if sum > 0.0 {
            row.values_mut().iter_mut().for_each(|v| *v /= sum);
        }
    }
    restriction
}

fn apply(matrix: &CsrMatrix<f64>, values: impl Iterator<Item = f64>) -> DVector<f64> {
    let x = DVector::from_iterator(matrix.ncols(), values);
    let mut y = DVector::zeros(matrix.nrows());
    spmm_csr_dense(0.0, &mut y, 1.0, Op::NoOp(matrix), Op::NoOp(&x));
    y
}

/// Copies the values of `fine` at the nodes it shares with `coarse`.
pub fn inject(fine: &Grid, coarse: &Grid, dofs: usize, x: &[f64]) -> Vec<f64> {
    let (fx, fy, fz) = (
        factor(fine.mx(), coarse.mx()),
        factor(fine.my(), coarse.my()),
        factor(fine.mz(), coarse.mz()),
    );
    let mut result = vec![0.0; coarse.num_nodes() * dofs];
    for (j, i, k) in iproduct!(0..coarse.my(), 0..coarse.mx(), 0..coarse.mz()) {
        let src = fine.node_index(i * fx, j * fy, k * fz) * dofs;
        let dst = coarse.node_index(i, j, k) * dofs;
        result[dst..dst + dofs].copy_from_slice(&x[src..src + dofs]);
    }
    result
}

/// A user-supplied step run after the parameters of `coarse` have been restricted from
/// `fine`, e.g. to restrict additional model inputs.
pub trait CoarseningHook {
    fn coarsen(&mut self, fine: &Level, coarse: &mut Level) -> eyre::Result<()>;
}

impl<F> CoarseningHook for F
where
    F: FnMut(&Level, &mut Level) -> eyre::Result<()>,
{
    fn coarsen(&mut self, fine: &Level, coarse: &mut Level) -> eyre::Result<()> {
        self(fine, coarse)
    }
}

/// Size of one level, as reported when the hierarchy is built.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct GridInfo {
    /// The coarsest level is level zero.
    pub level: usize,
    pub mx: usize,
    pub my: usize,
    pub mz: usize,
    /// Extent of the domain in x and y (m).
    pub domain_size: (f64, f64),
    /// Horizontal grid spacing (m).
    pub spacing: (f64, f64),
}

impl GridInfo {
    pub fn new(level: usize, grid: &Grid) -> Self {
        Self {
            level,
            mx: grid.mx(),
            my: grid.my(),
            mz: grid.mz(),
            domain_size: (2.0 * grid.lx(), 2.0 * grid.ly()),
            spacing: (grid.dx(), grid.dy()),
        }
    }

    pub fn num_elements(&self) -> usize {
        (self.mx - 1) * (self.my - 1) * (self.mz - 1)
    }
}

impl fmt::Display for GridInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Level {} domain size (m) {:8.2e} x {:8.2e}, num elements {:3} x {:3} x {:3} ({:8}), size (m) {} x {}",
            self.level,
            self.domain_size.0,
            self.domain_size.1,
            self.mx - 1,
            self.my - 1,
            self.mz - 1,
            self.num_elements(),
            self.spacing.0,
            self.spacing.1
        )
    }
}

/// Transfer operators between a level and the next coarser one.
#[derive(Clone, Debug)]
struct Transfer {
    /// State prolongation, with `dofs` values per node.
    prolongation: CsrMatrix<f64>,
    restriction: CsrMatrix<f64>,
    column_restriction: CsrMatrix<f64>,
    node_restriction: CsrMatrix<f64>,
}

/// The grids of all levels together with the operators transferring data between them.
#[derive(Clone, Debug)]
pub struct Hierarchy {
    levels: Vec<Level>,
    transfers: Vec<Transfer>,
    dofs: usize,
}

impl Hierarchy {
    /// Builds `n_levels` coarsenings of `finest`, which must already be padded.
    pub fn new(
        finest: Grid,
        n_levels: usize,
        factor: usize,
        horizontally: bool,
        min_thickness: f64,
        dofs: usize,
    ) -> Result<Self, SetupError> {
        let mut grids = vec![finest];
        for _ in 0..n_levels {
            let coarse = grids[grids.len() - 1].coarsen(factor, horizontally)?;
            grids.push(coarse);
        }

        let transfers = grids
            .windows(2)
            .map(|pair| {
                let (fine, coarse) = (&pair[0], &pair[1]);
                let state_prolongation = prolongation(fine, coarse, dofs);
                Transfer {
                    restriction: state_prolongation.transpose(),
                    prolongation: state_prolongation,
                    column_restriction: averaging_restriction(&column_prolongation(fine, coarse)),
                    node_restriction: averaging_restriction(&prolongation(fine, coarse, 1)),
                }
            })
            .collect();

        let levels: Vec<Level> = grids
            .into_iter()
            .enumerate()
            .map(|(l, grid)| Level::new(n_levels - l, grid, min_thickness))
            .collect();

        for level in levels.iter().rev() {
            info!("{}", GridInfo::new(level.index, &level.grid));
        }

        Ok(Self {
            levels,
            transfers,
            dofs,
        })
    }

    /// Restricts the lateral boundary of every level to the columns covering the first
    /// `mx x my` columns of the finest grid. Coarse levels round the domain up to whole coarse
    /// elements.
    pub fn with_domain(mut self, mx: usize, my: usize) -> Result<Self, SetupError> {
        let finest = self.levels[0].grid;
        for level in &mut self.levels {
            let grid = level.grid;
            let cx = (finest.mx() - 1) / (grid.mx() - 1);
            let cy = (finest.my() - 1) / (grid.my() - 1);
            let domain_mx = ((mx.max(1) - 1 + cx - 1) / cx + 1).min(grid.mx());
            let domain_my = ((my.max(1) - 1 + cy - 1) / cy + 1).min(grid.my());
            level.domain = grid.sub_grid(domain_mx, domain_my)?;
        }
        Ok(self)
    }

    /// Levels, finest first.
    pub fn levels(&self) -> &[Level] {
        &self.levels
    }

    pub fn finest(&self) -> &Level {
        &self.levels[0]
    }

    pub fn finest_mut(&mut self) -> &mut Level {
        &mut self.levels[0]
    }

    pub fn dofs_per_node(&self) -> usize {
        self.dofs
    }

    /// Level reports, coarsest first.
    pub fn grid_info(&self) -> Vec<GridInfo> {
        self.levels
            .iter()
            .rev()
            .map(|level| GridInfo::new(level.index, &level.grid))
            .collect()
    }

    /// Restricts the parameters and the coefficient of every level from the next finer one,
    /// reclassifies the nodes of every coarse level from its restricted thickness and runs
    /// `hooks` on each coarse level.
    pub fn restrict_parameters(&mut self, hooks: &mut [Box<dyn CoarseningHook>]) -> eyre::Result<()> {
        for l in 0..self.transfers.len() {
            let (fine_levels, coarse_levels) = self.levels.split_at_mut(l + 1);
            let (fine, coarse) = (&fine_levels[l], &mut coarse_levels[0]);
            restrict_level(&self.transfers[l], fine, coarse);
            for hook in hooks.iter_mut() {
                hook.coarsen(fine, coarse)?;
            }
        }
        Ok(())
    }

    /// Injects the finest level state `x` into every level. The result is ordered finest first.
    pub fn inject_state(&self, x: &[f64]) -> Vec<Vec<f64>> {
        let mut states = vec![x.to_vec()];
        for pair in self.levels.windows(2) {
            let fine_state = &states[states.len() - 1];
            let coarse = inject(&pair[0].grid, &pair[1].grid, self.dofs, fine_state);
            states.push(coarse);
        }
        states
    }
}

fn restrict_level(transfer: &Transfer, fine: &Level, coarse: &mut Level) {
    let grid = coarse.grid;
    let restrict = |f: fn(&Parameters) -> f64| {
        apply(
            &transfer.column_restriction,
            fine.parameters.as_slice().iter().map(f),
        )
    };
    let bed = restrict(|p| p.bed);
    let thickness = restrict(|p| p.thickness);
    let floatation = restrict(|p| p.floatation);
    let tauc = restrict(|p| p.tauc);

    let thickness_field = Field2::from_fn(grid.mx(), grid.my(), |i, j| thickness[grid.column_index(i, j)]);
    let node_type = classify(&thickness_field, coarse.min_thickness);

    coarse.parameters = Field2::from_fn(grid.mx(), grid.my(), |i, j| {
        let c = grid.column_index(i, j);
        Parameters {
            bed: bed[c],
            thickness: thickness[c],
            node_type: node_type[(i, j)],
            floatation: floatation[c],
            tauc: tauc[c],
        }
    });

    let coefficient = apply(&transfer.node_restriction, fine.coefficient.as_slice().iter().copied());
    coarse.coefficient = Field3::from_fn(grid.mx(), grid.my(), grid.mz(), |i, j, k| {
        coefficient[grid.node_index(i, j, k)]
    });
}

/// A multigrid V-cycle used as a preconditioner.
///
/// Each level is smoothed with forward Gauss-Seidel sweeps before and backward sweeps after
/// the coarse grid correction, which makes the cycle a symmetric operator. The coarsest level
/// is solved directly.
pub struct MultigridPreconditioner {
    matrices: Vec<CsrMatrix<f64>>,
    prolongations: Vec<CsrMatrix<f64>>,
    restrictions: Vec<CsrMatrix<f64>>,
    coarse_solver: LU<f64, Dyn, Dyn>,
    smoothing_steps: usize,
}

impl fmt::Debug for MultigridPreconditioner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultigridPreconditioner")
            .field("levels", &self.matrices.len())
            .field("smoothing_steps", &self.smoothing_steps)
            .finish()
    }
}

impl MultigridPreconditioner {
    /// Builds a V-cycle from the system matrices of all levels of `hierarchy`, finest first.
    pub fn new(
        hierarchy: &Hierarchy,
        matrices: Vec<CsrMatrix<f64>>,
        smoothing_steps: usize,
    ) -> Result<Self, SetupError> {
        assert_eq!(
            matrices.len(),
            hierarchy.levels.len(),
            "one matrix per level is required"
        );
        let coarsest = matrices.last().expect("hierarchy has at least one level");
        let coarse_solver = DMatrix::from(coarsest).lu();
        if !coarse_solver.is_invertible() {
            return Err(SetupError::SingularCoarseMatrix { level: 0 });
        }
        Ok(Self {
            prolongations: hierarchy.transfers.iter().map(|t| t.prolongation.clone()).collect(),
            restrictions: hierarchy.transfers.iter().map(|t| t.restriction.clone()).collect(),
            matrices,
            coarse_solver,
            smoothing_steps,
        })
    }

    pub fn num_levels(&self) -> usize {
        self.matrices.len()
    }

    fn cycle(&self, l: usize, x: &mut DVector<f64>, b: &DVector<f64>) -> Result<(), Box<dyn Error>> {
        if l + 1 == self.matrices.len() {
            let solution = self
                .coarse_solver
                .solve(b)
                .ok_or("coarse grid solve failed")?;
            x.copy_from(&solution);
            return Ok(());
        }

        let a = &self.matrices[l];
        for _ in 0..self.smoothing_steps {
            gauss_seidel_sweep(a, &mut *x, b, SweepDirection::Forward)?;
        }

        let mut residual = DVector::zeros(b.len());
        a.apply(DVectorViewMut::from(&mut residual), DVectorView::from(&*x))?;
        residual = b - residual;

        let restriction = &self.restrictions[l];
        let mut coarse_rhs = DVector::zeros(restriction.nrows());
        restriction.apply(DVectorViewMut::from(&mut coarse_rhs), DVectorView::from(&residual))?;
        let mut coarse_x = DVector::zeros(restriction.nrows());
        self.cycle(l + 1, &mut coarse_x, &coarse_rhs)?;

        let mut correction = DVector::zeros(x.len());
        self.prolongations[l].apply(DVectorViewMut::from(&mut correction), DVectorView::from(&coarse_x))?;
        *x += correction;

        for _ in 0..self.smoothing_steps {
            gauss_seidel_sweep(a, &mut *x, b, SweepDirection::Backward)?;
        }
        Ok(())
    }
}

impl LinearOperator<f64> for MultigridPreconditioner {
    fn apply(&self, mut y: DVectorViewMut<f64>, x: DVectorView<f64>) -> Result<(), Box<dyn Error>> {
        let b = x.clone_owned();
        let mut z = DVector::zeros(b.len());
        self.cycle(0, &mut z, &b)?;
        y.copy_from(&z);
        Ok(())
    }
}
