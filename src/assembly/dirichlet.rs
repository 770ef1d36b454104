//! Scaled identity rows pinning exterior and Dirichlet nodes to their boundary values.
use crate::assembly::{Assembler, Level};
use crate::field::NodeType;
use crate::grid::{NodeIndex, Patch};
use eyre::eyre;
use nalgebra_sparse::CooMatrix;

/// The penalty scale `dx dy dz (1/dx^2 + 1/dy^2 + 1/dz^2)`, which is comparable to the
/// diagonal of a Laplacian stiffness matrix on an element with the same spacing.
pub fn penalty_scale(dx: f64, dy: f64, dz: f64) -> f64 {
    dx * dy * dz * (1.0 / (dx * dx) + 1.0 / (dy * dy) + 1.0 / (dz * dz))
}

/// Returns true if node `(i, j, k)` is exterior or carries a Dirichlet condition.
///
/// Dirichlet conditions are evaluated on the unpadded domain of the level. Padded columns
/// are pinned only if they are exterior.
pub fn pinned<A: Assembler + ?Sized>(assembler: &A, level: &Level, node: NodeIndex) -> bool {
    let domain = &level.domain;
    let inside = node.i < domain.mx() && node.j < domain.my() && node.k < domain.mz();
    level.node_type(node.i, node.j) == NodeType::Exterior || (inside && assembler.dirichlet_node(domain, node))
}

/// Visits every owned node, together with the penalty scale at that node if it is pinned.
fn for_each_owned_node<A: Assembler + ?Sized>(
    assembler: &A,
    level: &Level,
    patch: &Patch,
    scale: f64,
    mut f: impl FnMut(NodeIndex, usize, Option<f64>) -> eyre::Result<()>,
) -> eyre::Result<()> {
    let grid = &level.grid;
    let dofs = assembler.dofs_per_node();
    for j in patch.owned_y() {
        for i in patch.owned_x() {
            let penalty = scale * penalty_scale(grid.dx(), grid.dy(), level.dz(i, j));
            for k in 0..grid.mz() {
                let node = NodeIndex::new(i, j, k);
                let offset = grid.node_index(i, j, k) * dofs;
                let weight = pinned(assembler, level, node).then_some(penalty);
                f(node, offset, weight)?;
            }
        }
    }
    Ok(())
}

/// Sets the owned rows of `residual` to `scale (x - x_bc)` at pinned nodes and to zero
/// elsewhere.
pub fn residual_rows<A: Assembler + ?Sized>(
    assembler: &A,
    level: &Level,
    patch: &Patch,
    scale: f64,
    x: &[f64],
    residual: &mut [f64],
) -> eyre::Result<()> {
    let dofs = assembler.dofs_per_node();
    if x.len() != residual.len() || x.len() != level.num_dofs(dofs) {
        return Err(eyre!(
            "state and residual have lengths {} and {}, expected {}",
            x.len(),
            residual.len(),
            level.num_dofs(dofs)
        ));
    }
    for_each_owned_node(assembler, level, patch, scale, |node, offset, penalty| {
        match penalty {
            Some(penalty) => {
                let value = assembler.boundary_value(level, node);
                for c in 0..dofs {
                    residual[offset + c] = penalty * (x[offset + c] - value[c]);
                }
            }
            None => residual[offset..offset + dofs].fill(0.0),
        }
        Ok(())
    })
}

/// Adds `scale I` to the owned diagonal entries of pinned nodes.
pub fn jacobian_rows<A: Assembler + ?Sized>(
    assembler: &A,
    level: &Level,
    patch: &Patch,
    scale: f64,
    jacobian: &mut CooMatrix<f64>,
) -> eyre::Result<()> {
    let dofs = assembler.dofs_per_node();
    let n = level.num_dofs(dofs);
    if jacobian.nrows() != n || jacobian.ncols() != n {
        return Err(eyre!(
            "Jacobian is {}x{}, expected {}x{}",
            jacobian.nrows(),
            jacobian.ncols(),
            n,
            n
        ));
    }
    for_each_owned_node(assembler, level, patch, scale, |_, offset, penalty| {
        if let Some(penalty) = penalty {
            for c in 0..dofs {
                jacobian.push(offset + c, offset + c, penalty);
            }
        }
        Ok(())
    })
}
