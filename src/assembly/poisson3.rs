//! A 3D Poisson problem on the terrain-following grid, used to verify the assembly machinery.
//!
//! Solves `-Δu = F` with `u = u_exact` on the Dirichlet part `{i = Mx-1} ∪ {j = My-1} ∪
//! {k = Mz-1}` of the boundary and the flux of `u_exact` on the Neumann part
//! `{i = 0} ∪ {j = 0} ∪ {k = 0}`.
use crate::assembly::{clone_upper_to_lower, dirichlet, Assembler, Level};
use crate::config::SolverConfig;
use crate::element::{Element3, Element3Face};
use crate::field::{Field3, Geometry};
use crate::grid::{Grid, NodeIndex, Patch};
use crate::node_type::exterior_element;
use crate::quadrature::q13d;
use eyre::WrapErr;
use nalgebra::{DMatrix, Vector3};
use nalgebra_sparse::CooMatrix;

/// An exact solution of the Poisson problem together with its derivatives.
pub trait ManufacturedSolution {
    fn value(&self, x: f64, y: f64, z: f64) -> f64;

    fn gradient(&self, x: f64, y: f64, z: f64) -> Vector3<f64>;

    /// The source term `F = -Δu`.
    fn source(&self, x: f64, y: f64, z: f64) -> f64;
}

impl<M: ManufacturedSolution + ?Sized> ManufacturedSolution for &M {
    fn value(&self, x: f64, y: f64, z: f64) -> f64 {
        M::value(self, x, y, z)
    }

    fn gradient(&self, x: f64, y: f64, z: f64) -> Vector3<f64> {
        M::gradient(self, x, y, z)
    }

    fn source(&self, x: f64, y: f64, z: f64) -> f64 {
        M::source(self, x, y, z)
    }
}

#[derive(Clone, Debug)]
pub struct Poisson3<M> {
    solution: M,
    volume_quadrature: usize,
    dirichlet_scale: f64,
}

impl<M: ManufacturedSolution> Poisson3<M> {
    pub fn new(solution: M, config: &SolverConfig) -> Self {
        Self {
            solution,
            volume_quadrature: config.volume_quadrature,
            dirichlet_scale: config.dirichlet_scale,
        }
    }

    pub fn solution(&self) -> &M {
        &self.solution
    }

    /// The exact solution at every node of `level`.
    pub fn exact_solution(&self, level: &Level) -> Vec<f64> {
        let grid = &level.grid;
        let mut result = vec![0.0; grid.num_nodes()];
        for j in 0..grid.my() {
            for i in 0..grid.mx() {
                for k in 0..grid.mz() {
                    result[grid.node_index(i, j, k)] = self.solution.value(grid.x(i), grid.y(j), level.z(i, j, k));
                }
            }
        }
        result
    }

    fn neumann_node(node: NodeIndex) -> bool {
        node.i == 0 || node.j == 0 || node.k == 0
    }

    /// Binds `element` to element `(i, j, k)`, replaces the state at pinned nodes by the
    /// exact solution and masks their rows and columns.
    fn prepare_element(
        &self,
        level: &Level,
        element: &mut Element3,
        (i, j, k): (usize, usize, usize),
        x: &[f64],
    ) -> eyre::Result<[f64; q13d::N_CHI]> {
        let z = level.element_z(i, j, k);
        element.reset(i, j, k, &z)?;
        let mut u = element.nodal_values(x, 0)?;
        for (n, u_n) in u.iter_mut().enumerate() {
            let node = element.local_to_global(n);
            if dirichlet::pinned(self, level, node) {
                element.mark_row_invalid(n);
                element.mark_col_invalid(n);
                *u_n = self.solution.value(element.x(n), element.y(n), element.z(n));
            }
        }
        Ok(u)
    }
}

impl<M: ManufacturedSolution> Assembler for Poisson3<M> {
    fn dofs_per_node(&self) -> usize {
        1
    }

    /// The source term `F` at the nodes of `level`.
    fn init_coefficient(&self, level: &Level, _geometry: &Geometry) -> eyre::Result<Field3<f64>> {
        let grid = &level.grid;
        Ok(Field3::from_fn(grid.mx(), grid.my(), grid.mz(), |i, j, k| {
            self.solution.source(grid.x(i), grid.y(j), level.z(i, j, k))
        }))
    }

    fn compute_residual(&self, level: &Level, patch: &Patch, x: &[f64], residual: &mut [f64]) -> eyre::Result<()> {
        dirichlet::residual_rows(self, level, patch, self.dirichlet_scale, x, residual)?;

        let grid = &level.grid;
        let mut element = Element3::gauss(grid, patch, self.volume_quadrature, 1)?;
        let mut face = Element3Face::gauss(grid, 2)?;

        for j in patch.elements_y(grid) {
            for i in patch.elements_x(grid) {
                if exterior_element(&level.element_node_types(i, j)) {
                    continue;
                }
                for k in 0..grid.mz() - 1 {
                    let u = self
                        .prepare_element(level, &mut element, (i, j, k), x)
                        .wrap_err_with(|| format!("failed to set up element ({}, {}, {})", i, j, k))?;
                    let f = element.nodal_field_values(&level.coefficient);
                    let mut local = [0.0; q13d::N_CHI];

                    for q in 0..element.n_pts() {
                        let w = element.weight(q);
                        let u_q = element.evaluate(&u, q);
                        let f_q = element.evaluate(&f, q).val;
                        for (t, r_t) in local.iter_mut().enumerate() {
                            let psi = element.chi(q, t);
                            *r_t += w * (u_q.dx * psi.dx + u_q.dy * psi.dy + u_q.dz * psi.dz - f_q * psi.val);
                        }
                    }

                    // A face is on the Neumann boundary if all its nodes are. Nodes that are
                    // also Dirichlet nodes have masked rows, so they receive no flux.
                    for (face_index, nodes) in q13d::INCIDENT_NODES.iter().enumerate() {
                        if !nodes
                            .iter()
                            .all(|&n| Self::neumann_node(element.local_to_global(n)))
                        {
                            continue;
                        }
                        face.reset(face_index, &element)?;
                        let xs = [0, 1, 2, 3, 4, 5, 6, 7].map(|n| element.x(n));
                        let ys = [0, 1, 2, 3, 4, 5, 6, 7].map(|n| element.y(n));
                        for q in 0..face.n_pts() {
                            let (x_q, y_q, z_q) = (
                                face.evaluate(&xs, q),
                                face.evaluate(&ys, q),
                                face.evaluate(element.nodal_z(), q),
                            );
                            let g = -self.solution.gradient(x_q, y_q, z_q).dot(face.normal(q));
                            for (t, r_t) in local.iter_mut().enumerate() {
                                *r_t += face.weight(q) * face.chi(q, t) * g;
                            }
                        }
                    }

                    element.add_residual(&local, residual)?;
                }
            }
        }
        Ok(())
    }

    fn compute_jacobian(
        &self,
        level: &Level,
        patch: &Patch,
        x: &[f64],
        jacobian: &mut CooMatrix<f64>,
    ) -> eyre::Result<()> {
        let grid = &level.grid;
        let mut element = Element3::gauss(grid, patch, self.volume_quadrature, 1)?;
        let mut local = DMatrix::zeros(q13d::N_CHI, q13d::N_CHI);

        for j in patch.elements_y(grid) {
            for i in patch.elements_x(grid) {
                if exterior_element(&level.element_node_types(i, j)) {
                    continue;
                }
                for k in 0..grid.mz() - 1 {
                    self.prepare_element(level, &mut element, (i, j, k), x)
                        .wrap_err_with(|| format!("failed to set up element ({}, {}, {})", i, j, k))?;
                    local.fill(0.0);
                    for q in 0..element.n_pts() {
                        let w = element.weight(q);
                        for t in 0..q13d::N_CHI {
                            let psi = element.chi(q, t);
                            for s in t..q13d::N_CHI {
                                let phi = element.chi(q, s);
                                local[(t, s)] += w * (psi.dx * phi.dx + psi.dy * phi.dy + psi.dz * phi.dz);
                            }
                        }
                    }
                    clone_upper_to_lower(&mut local);
                    element.add_jacobian(&local, jacobian)?;
                }
            }
        }

        dirichlet::jacobian_rows(self, level, patch, self.dirichlet_scale, jacobian)
    }

    fn boundary_value(&self, level: &Level, node: NodeIndex) -> Vec<f64> {
        let NodeIndex { i, j, k } = node;
        let grid = &level.grid;
        vec![self.solution.value(grid.x(i), grid.y(j), level.z(i, j, k))]
    }

    fn dirichlet_node(&self, domain: &Grid, node: NodeIndex) -> bool {
        node.i + 1 == domain.mx() || node.j + 1 == domain.my() || node.k + 1 == domain.mz()
    }
}
