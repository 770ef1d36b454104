//! Residual and Jacobian assembly on structured hexahedral grids.
//!
//! An [`Assembler`] computes the residual and the Jacobian of one nonlinear problem on one
//! [`Level`] of the multigrid hierarchy, restricted to the rows owned by one [`Patch`].
//! Assembly over all patches of a partition is the same as assembly over the whole grid.
//!
//! All assemblers share one traversal pattern:
//!
//! 1. Rows of owned nodes that are exterior or carry a Dirichlet condition are set to a scaled
//!    identity relation pinning the node to its boundary value (see [`dirichlet`]). All other
//!    owned rows start out at zero.
//! 2. Elements all of whose nodes are exterior are skipped.
//! 3. Every remaining element gathers its nodal values, replaces the values of pinned nodes by
//!    their boundary values and marks their rows and columns invalid, then integrates the
//!    weak form and scatters the result into the owned rows.
//!
//! The element Jacobians are symmetric: assemblers compute the upper triangle only and
//! mirror it before scattering.
use crate::config::PhysicalConstants;
use crate::error::SetupError;
use crate::field::{Field2, Field3, Geometry, NodeType, Parameters};
use crate::grid::{grid_z, Grid, NodeIndex, Patch};
use crate::node_type::classify;
use crate::quadrature::q13d;
use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::{CooMatrix, CsrMatrix};

pub mod blatter;
pub mod dirichlet;
pub mod poisson3;

pub use blatter::Blatter;
pub use poisson3::Poisson3;

/// One level of the multigrid hierarchy: a grid and the parameters discretized on it.
#[derive(Clone, Debug, PartialEq)]
pub struct Level {
    /// Position in the hierarchy. The coarsest level is level zero.
    pub index: usize,
    pub grid: Grid,
    /// The columns of `grid` not added by padding. Lateral boundary conditions apply at its
    /// last nodes in x and y. It has the vertical node count of `grid`.
    pub domain: Grid,
    pub parameters: Field2<Parameters>,
    /// A 3D coefficient field used by the assembler (ice hardness or a source term).
    pub coefficient: Field3<f64>,
    /// Smallest column height used to place nodes, so that ice-free columns do not produce
    /// degenerate elements.
    pub min_thickness: f64,
}

impl Level {
    /// A level with ice-free parameters and a zero coefficient.
    pub fn new(index: usize, grid: Grid, min_thickness: f64) -> Self {
        Self {
            index,
            grid,
            domain: grid,
            parameters: Field2::from_element(grid.mx(), grid.my(), Parameters::default()),
            coefficient: Field3::from_element(grid.mx(), grid.my(), grid.mz(), 0.0),
            min_thickness,
        }
    }

    /// Writes `geometry` into the parameters and classifies the nodes.
    ///
    /// `geometry` may cover fewer columns than the grid. The remaining (padded) columns are
    /// ice-free and copy the bed and yield stress of the nearest covered column. Floatation is
    /// derived from `constants` where `geometry` does not supply it.
    pub fn set_geometry(&mut self, geometry: &Geometry, constants: &PhysicalConstants) {
        let (mx, my) = (geometry.bed.mx(), geometry.bed.my());
        let grid = self.grid;
        let thickness = Field2::from_fn(grid.mx(), grid.my(), |i, j| {
            if i < mx && j < my {
                geometry.thickness[(i, j)]
            } else {
                0.0
            }
        });
        let node_type = classify(&thickness, self.min_thickness);
        self.parameters = Field2::from_fn(grid.mx(), grid.my(), |i, j| {
            let nearest = (i.min(mx - 1), j.min(my - 1));
            let bed = geometry.bed[nearest];
            let floatation = match &geometry.floatation {
                Some(floatation) if (i, j) == nearest => floatation[nearest],
                _ => constants.floatation(bed, thickness[(i, j)]),
            };
            Parameters {
                bed,
                thickness: thickness[(i, j)],
                node_type: node_type[(i, j)],
                floatation,
                tauc: geometry.tauc[nearest],
            }
        });
    }

    /// Height of the column `(i, j)` used to place its nodes.
    pub fn column_height(&self, i: usize, j: usize) -> f64 {
        self.parameters[(i, j)].thickness.max(self.min_thickness)
    }

    /// Elevation of node `(i, j, k)`.
    pub fn z(&self, i: usize, j: usize, k: usize) -> f64 {
        grid_z(self.parameters[(i, j)].bed, self.column_height(i, j), self.grid.mz(), k)
    }

    /// Vertical spacing of column `(i, j)`.
    pub fn dz(&self, i: usize, j: usize) -> f64 {
        self.column_height(i, j) / (self.grid.mz() - 1) as f64
    }

    pub fn node_type(&self, i: usize, j: usize) -> NodeType {
        self.parameters[(i, j)].node_type
    }

    /// Elevations of the nodes of the element with lower corner `(i, j, k)`.
    pub fn element_z(&self, i: usize, j: usize, k: usize) -> [f64; q13d::N_CHI] {
        q13d::OFFSETS.map(|[di, dj, dk]| self.z(i + di, j + dj, k + dk))
    }

    /// Node types of the nodes of every element with horizontal lower corner `(i, j)`.
    pub fn element_node_types(&self, i: usize, j: usize) -> [NodeType; q13d::N_CHI] {
        q13d::OFFSETS.map(|[di, dj, _]| self.node_type(i + di, j + dj))
    }

    /// Applies `f` to the parameter of every node of the element with lower corner `(i, j)`.
    pub fn element_parameters<T>(&self, i: usize, j: usize, f: impl Fn(&Parameters) -> T) -> [T; q13d::N_CHI] {
        q13d::OFFSETS.map(|[di, dj, _]| f(&self.parameters[(i + di, j + dj)]))
    }

    pub fn num_dofs(&self, dofs_per_node: usize) -> usize {
        self.grid.num_nodes() * dofs_per_node
    }
}

/// A nonlinear problem discretized with Q1 elements on a [`Level`].
///
/// Implementations write only to rows owned by `patch`, reading the state `x` in the ghost
/// halo of the patch. State vectors store `dofs_per_node()` values per node, in the node order
/// of [`Grid::node_index`].
pub trait Assembler {
    fn dofs_per_node(&self) -> usize;

    /// Computes the coefficient field of the finest level from the user-supplied geometry.
    ///
    /// `geometry` covers the unpadded grid. Columns added by padding copy the nearest
    /// unpadded column.
    fn init_coefficient(&self, level: &Level, geometry: &Geometry) -> eyre::Result<Field3<f64>>;

    /// Overwrites the rows of `residual` owned by `patch` with the residual at `x`.
    fn compute_residual(&self, level: &Level, patch: &Patch, x: &[f64], residual: &mut [f64]) -> eyre::Result<()>;

    /// Adds the rows of the Jacobian at `x` owned by `patch` to `jacobian`.
    fn compute_jacobian(
        &self,
        level: &Level,
        patch: &Patch,
        x: &[f64],
        jacobian: &mut CooMatrix<f64>,
    ) -> eyre::Result<()>;

    /// Values of the boundary condition at node `node`. Exterior and Dirichlet nodes are
    /// pinned to these values.
    fn boundary_value(&self, level: &Level, node: NodeIndex) -> Vec<f64>;

    /// Returns true if `node` carries a Dirichlet condition. `domain` is the unpadded part of
    /// the level grid (see [`Level::domain`]). Nodes outside it are never Dirichlet nodes.
    fn dirichlet_node(&self, domain: &Grid, node: NodeIndex) -> bool;
}

/// Assembles the residual at `x` over all `patches`.
pub fn assemble_residual<A: Assembler + ?Sized>(
    assembler: &A,
    level: &Level,
    patches: &[Patch],
    x: &[f64],
) -> eyre::Result<DVector<f64>> {
    let mut residual = DVector::zeros(level.num_dofs(assembler.dofs_per_node()));
    for patch in patches {
        assembler.compute_residual(level, patch, x, residual.as_mut_slice())?;
    }
    Ok(residual)
}

/// Assembles the Jacobian at `x` over all `patches`.
pub fn assemble_jacobian<A: Assembler + ?Sized>(
    assembler: &A,
    level: &Level,
    patches: &[Patch],
    x: &[f64],
) -> eyre::Result<CsrMatrix<f64>> {
    let n = level.num_dofs(assembler.dofs_per_node());
    let mut coo = CooMatrix::new(n, n);
    for patch in patches {
        assembler.compute_jacobian(level, patch, x, &mut coo)?;
    }
    Ok(CsrMatrix::from(&coo))
}

/// A state vector holding the boundary values at every node, and zero elsewhere.
pub fn boundary_state<A: Assembler + ?Sized>(assembler: &A, level: &Level) -> Vec<f64> {
    let dofs = assembler.dofs_per_node();
    let grid = &level.grid;
    let mut x = vec![0.0; level.num_dofs(dofs)];
    for j in 0..grid.my() {
        for i in 0..grid.mx() {
            for k in 0..grid.mz() {
                let node = NodeIndex::new(i, j, k);
                if dirichlet::pinned(assembler, level, node) {
                    let offset = grid.node_index(i, j, k) * dofs;
                    let value = assembler.boundary_value(level, node);
                    x[offset..offset + dofs].copy_from_slice(&value);
                }
            }
        }
    }
    x
}

/// Fills in a 3D field on `level` from a field on the unpadded grid by linear interpolation
/// in the normalized vertical coordinate. Padded columns copy the nearest unpadded column.
pub fn resample_columns(level: &Level, field: &Field3<f64>) -> Result<Field3<f64>, SetupError> {
    let grid = &level.grid;
    if field.mx() > grid.mx() || field.my() > grid.my() || field.mz() < 2 {
        return Err(SetupError::ShapeMismatch {
            field: "3D coefficient",
            expected: (grid.mx(), grid.my(), grid.mz()),
            actual: (field.mx(), field.my(), field.mz()),
        });
    }
    let intervals = (field.mz() - 1) as f64;
    Ok(Field3::from_fn(grid.mx(), grid.my(), grid.mz(), |i, j, k| {
        let column = field.column(i.min(field.mx() - 1), j.min(field.my() - 1));
        let s = grid.sigma(k) * intervals;
        let below = (s.floor() as usize).min(field.mz() - 2);
        let t = s - below as f64;
        (1.0 - t) * column[below] + t * column[below + 1]
    }))
}

/// Copies the strict upper triangle of `matrix` to its lower triangle.
pub(crate) fn clone_upper_to_lower(matrix: &mut DMatrix<f64>) {
    for j in 0..matrix.ncols() {
        for i in (j + 1)..matrix.nrows() {
            matrix[(i, j)] = matrix[(j, i)];
        }
    }
}
