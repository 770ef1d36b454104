//! The first order (Blatter-Pattyn) approximation of the Stokes equations for ice flow.
//!
//! The unknowns are the horizontal velocity components `(u, v)` at every node. The weak form
//! of the momentum balance reads
//! $$
//! \int_\Omega \eta \left[ \psi_x (4 u_x + 2 v_y) + \psi_y (u_y + v_x) + \psi_z u_z \right]
//!   + \psi \rho g s_x \, dV + \int_{\Gamma_b} \psi \beta u \, dA = 0
//! $$
//! for `u` and the analogous equation for `v`, where `s` is the surface elevation, `eta` is
//! given by a [`FlowLaw`] and `beta` by a [`SlidingLaw`]. Lateral faces at a calving front
//! carry the difference between the ice overburden and the sea water pressure.
use crate::assembly::{clone_upper_to_lower, dirichlet, resample_columns, Assembler, Level};
use crate::config::{PhysicalConstants, SolverConfig};
use crate::element::{Element3, Element3Face};
use crate::field::{Field3, Geometry, NodeType};
use crate::flow_law::{FlowLaw, IsothermalGlen};
use crate::grid::{Grid, NodeIndex, Patch};
use crate::node_type::{exterior_element, grounding_line};
use crate::quadrature::q13d;
use crate::sliding::{PseudoPlastic, SlidingLaw};
use eyre::WrapErr;
use nalgebra::{DMatrix, Vector2};
use nalgebra_sparse::CooMatrix;

const N: usize = q13d::N_CHI;

/// Boundary conditions and sources of a Blatter problem.
pub trait BlatterBoundary {
    /// Returns true if the velocity at `node` is prescribed. `domain` is the unpadded part of
    /// the level grid.
    fn dirichlet_node(&self, domain: &Grid, node: NodeIndex) -> bool;

    /// The prescribed velocity at Dirichlet and exterior nodes.
    fn u_bc(&self, x: f64, y: f64, z: f64) -> Vector2<f64>;

    /// Returns true if lateral face `face` of an element whose nodes have the types
    /// `node_type` is part of a calving front.
    fn neumann_bc_face(&self, face: usize, node_type: &[NodeType; N]) -> bool;

    /// The volume source term at `(x, y, z)`, given the driving stress `rho g grad s` there.
    fn source_term(&self, x: f64, y: f64, z: f64, driving_stress: Vector2<f64>) -> Vector2<f64>;
}

/// An ice sheet: no-slip is not imposed anywhere, ice-free nodes are pinned to zero
/// velocity and lateral faces between icy and ice-free columns are calving fronts.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct IceSheetBoundary;

impl BlatterBoundary for IceSheetBoundary {
    fn dirichlet_node(&self, _domain: &Grid, _node: NodeIndex) -> bool {
        false
    }

    fn u_bc(&self, _x: f64, _y: f64, _z: f64) -> Vector2<f64> {
        Vector2::zeros()
    }

    fn neumann_bc_face(&self, face: usize, node_type: &[NodeType; N]) -> bool {
        // Boundary and interior nodes always have ice, so an element without exterior nodes
        // is icy.
        face < 4
            && !node_type.contains(&NodeType::Exterior)
            && q13d::INCIDENT_NODES[face]
                .iter()
                .all(|&n| node_type[n] == NodeType::Boundary)
    }

    fn source_term(&self, _x: f64, _y: f64, _z: f64, driving_stress: Vector2<f64>) -> Vector2<f64> {
        driving_stress
    }
}

/// Ice hardness (Pa s^(1/3)) corresponding to the softness `3.1689e-24 Pa^-3 s^-1`.
pub fn default_hardness() -> f64 {
    3.1689e-24_f64.powf(-1.0 / 3.0)
}

#[derive(Clone, Debug)]
pub struct Blatter<F = IsothermalGlen, S = PseudoPlastic, B = IceSheetBoundary> {
    flow_law: F,
    sliding_law: S,
    boundary: B,
    hardness: f64,
    constants: PhysicalConstants,
    volume_quadrature: usize,
    grounding_line_quadrature: usize,
    dirichlet_scale: f64,
}

impl Blatter {
    /// An ice sheet model with Glen's law, pseudo-plastic sliding and constant hardness.
    pub fn new(config: &SolverConfig) -> Self {
        Self {
            flow_law: IsothermalGlen::default(),
            sliding_law: PseudoPlastic::default(),
            boundary: IceSheetBoundary,
            hardness: default_hardness(),
            constants: config.constants,
            volume_quadrature: config.volume_quadrature,
            grounding_line_quadrature: config.grounding_line_quadrature,
            dirichlet_scale: config.dirichlet_scale,
        }
    }
}

impl<F, S, B> Blatter<F, S, B> {
    pub fn with_flow_law<F2>(self, flow_law: F2) -> Blatter<F2, S, B> {
        Blatter {
            flow_law,
            sliding_law: self.sliding_law,
            boundary: self.boundary,
            hardness: self.hardness,
            constants: self.constants,
            volume_quadrature: self.volume_quadrature,
            grounding_line_quadrature: self.grounding_line_quadrature,
            dirichlet_scale: self.dirichlet_scale,
        }
    }

    pub fn with_sliding_law<S2>(self, sliding_law: S2) -> Blatter<F, S2, B> {
        Blatter {
            flow_law: self.flow_law,
            sliding_law,
            boundary: self.boundary,
            hardness: self.hardness,
            constants: self.constants,
            volume_quadrature: self.volume_quadrature,
            grounding_line_quadrature: self.grounding_line_quadrature,
            dirichlet_scale: self.dirichlet_scale,
        }
    }

    pub fn with_boundary<B2>(self, boundary: B2) -> Blatter<F, S, B2> {
        Blatter {
            flow_law: self.flow_law,
            sliding_law: self.sliding_law,
            boundary,
            hardness: self.hardness,
            constants: self.constants,
            volume_quadrature: self.volume_quadrature,
            grounding_line_quadrature: self.grounding_line_quadrature,
            dirichlet_scale: self.dirichlet_scale,
        }
    }

    /// Sets the hardness used where the geometry does not supply one.
    pub fn with_hardness(self, hardness: f64) -> Self {
        Self { hardness, ..self }
    }

    pub fn boundary(&self) -> &B {
        &self.boundary
    }
}

/// Nodal values of the parameters shared by all elements of one column of elements.
struct ColumnData {
    node_type: [NodeType; N],
    surface: [f64; N],
    tauc: [f64; N],
    floatation: [f64; N],
}

impl ColumnData {
    fn new(level: &Level, i: usize, j: usize) -> Self {
        Self {
            node_type: level.element_node_types(i, j),
            surface: level.element_parameters(i, j, |p| p.bed + p.thickness),
            tauc: level.element_parameters(i, j, |p| p.tauc),
            floatation: level.element_parameters(i, j, |p| p.floatation),
        }
    }
}

/// Velocity derivatives at one quadrature point.
#[derive(Copy, Clone, Debug)]
struct StrainRate {
    ux: f64,
    uy: f64,
    uz: f64,
    vx: f64,
    vy: f64,
    vz: f64,
}

impl StrainRate {
    /// The strain rate invariant of the first order approximation.
    fn gamma(&self) -> f64 {
        let Self { ux, uy, uz, vx, vy, vz } = *self;
        ux * ux + vy * vy + ux * vy + 0.25 * ((uy + vx) * (uy + vx) + uz * uz + vz * vz)
    }
}

impl<F, S, B> Blatter<F, S, B>
where
    F: FlowLaw,
    S: SlidingLaw,
    B: BlatterBoundary,
{
    fn rho_g(&self) -> f64 {
        self.constants.ice_density * self.constants.gravity
    }

    /// Binds `element` to element `(i, j, k)` and gathers the nodal velocity, replacing it
    /// by the boundary value at pinned nodes and masking their rows and columns.
    fn prepare_element(
        &self,
        level: &Level,
        element: &mut Element3,
        (i, j, k): (usize, usize, usize),
        x: &[f64],
    ) -> eyre::Result<([f64; N], [f64; N])> {
        let z = level.element_z(i, j, k);
        element.reset(i, j, k, &z)?;
        let mut u = element.nodal_values(x, 0)?;
        let mut v = element.nodal_values(x, 1)?;
        for n in 0..N {
            if dirichlet::pinned(self, level, element.local_to_global(n)) {
                element.mark_row_invalid(n);
                element.mark_col_invalid(n);
                let bc = self.boundary.u_bc(element.x(n), element.y(n), element.z(n));
                u[n] = bc.x;
                v[n] = bc.y;
            }
        }
        Ok((u, v))
    }

    fn basal_face<'a>(
        &self,
        column: &ColumnData,
        face: &'a mut Element3Face,
        grounding_line_face: &'a mut Element3Face,
    ) -> &'a mut Element3Face {
        let bottom = q13d::INCIDENT_NODES[q13d::BOTTOM_FACE].map(|n| column.floatation[n]);
        if grounding_line(&bottom) {
            grounding_line_face
        } else {
            face
        }
    }

    fn drag(&self, tauc: f64, floatation: f64, u: f64, v: f64) -> (f64, f64) {
        if floatation <= 0.0 {
            self.sliding_law.drag_with_derivative(tauc, u, v)
        } else {
            (0.0, 0.0)
        }
    }

    /// Adds the viscous stress and source terms of one element to `local`.
    fn residual_f(&self, element: &Element3, column: &ColumnData, hardness: &[f64; N], u: &[f64; N], v: &[f64; N], local: &mut [f64]) {
        let xs = [0, 1, 2, 3, 4, 5, 6, 7].map(|n| element.x(n));
        let ys = [0, 1, 2, 3, 4, 5, 6, 7].map(|n| element.y(n));
        let rho_g = self.rho_g();
        for q in 0..element.n_pts() {
            let w = element.weight(q);
            let (u_q, v_q) = (element.evaluate(u, q), element.evaluate(v, q));
            let e = StrainRate {
                ux: u_q.dx,
                uy: u_q.dy,
                uz: u_q.dz,
                vx: v_q.dx,
                vy: v_q.dy,
                vz: v_q.dz,
            };
            let (eta, _) = self
                .flow_law
                .effective_viscosity(element.evaluate(hardness, q).val, e.gamma());
            let s = element.evaluate(&column.surface, q);
            let source = self.boundary.source_term(
                element.evaluate(&xs, q).val,
                element.evaluate(&ys, q).val,
                element.evaluate(element.nodal_z(), q).val,
                Vector2::new(rho_g * s.dx, rho_g * s.dy),
            );
            for t in 0..N {
                let psi = element.chi(q, t);
                local[2 * t] += w
                    * (eta * (psi.dx * (4.0 * e.ux + 2.0 * e.vy) + psi.dy * (e.uy + e.vx) + psi.dz * e.uz)
                        + psi.val * source.x);
                local[2 * t + 1] += w
                    * (eta * (psi.dx * (e.uy + e.vx) + psi.dy * (4.0 * e.vy + 2.0 * e.ux) + psi.dz * e.vz)
                        + psi.val * source.y);
            }
        }
    }

    /// Adds the basal drag term of a bottom face to `local`.
    fn residual_basal(&self, face: &Element3Face, column: &ColumnData, u: &[f64; N], v: &[f64; N], local: &mut [f64]) {
        for q in 0..face.n_pts() {
            let w = face.weight(q);
            let (u_q, v_q) = (face.evaluate(u, q), face.evaluate(v, q));
            let (beta, _) = self.drag(
                face.evaluate(&column.tauc, q),
                face.evaluate(&column.floatation, q),
                u_q,
                v_q,
            );
            for t in 0..N {
                let psi = face.chi(q, t);
                local[2 * t] += w * psi * beta * u_q;
                local[2 * t + 1] += w * psi * beta * v_q;
            }
        }
    }

    /// Adds the pressure difference at a calving front face to `local`.
    fn residual_lateral(&self, face: &Element3Face, element: &Element3, column: &ColumnData, local: &mut [f64]) {
        let PhysicalConstants {
            ice_density,
            sea_water_density,
            gravity,
            sea_level,
        } = self.constants;
        for q in 0..face.n_pts() {
            let w = face.weight(q);
            let z = face.evaluate(element.nodal_z(), q);
            let s = face.evaluate(&column.surface, q);
            let ice_pressure = ice_density * gravity * (s - z).max(0.0);
            let water_pressure = sea_water_density * gravity * (sea_level - z).max(0.0);
            let n = face.normal(q);
            for t in 0..N {
                let psi = face.chi(q, t);
                local[2 * t] -= w * psi * (ice_pressure - water_pressure) * n.x;
                local[2 * t + 1] -= w * psi * (ice_pressure - water_pressure) * n.y;
            }
        }
    }

    /// Adds the upper triangle of the viscous stress Jacobian of one element to `local`.
    fn jacobian_f(&self, element: &Element3, hardness: &[f64; N], u: &[f64; N], v: &[f64; N], local: &mut DMatrix<f64>) {
        for q in 0..element.n_pts() {
            let w = element.weight(q);
            let (u_q, v_q) = (element.evaluate(u, q), element.evaluate(v, q));
            let e = StrainRate {
                ux: u_q.dx,
                uy: u_q.dy,
                uz: u_q.dz,
                vx: v_q.dx,
                vy: v_q.dy,
                vz: v_q.dz,
            };
            let (eta, deta) = self
                .flow_law
                .effective_viscosity(element.evaluate(hardness, q).val, e.gamma());

            for t in 0..N {
                let psi = element.chi(q, t);
                // Twice the derivatives of gamma with respect to u and v in the direction psi
                let psi_u = psi.dx * (4.0 * e.ux + 2.0 * e.vy) + psi.dy * (e.uy + e.vx) + psi.dz * e.uz;
                let psi_v = psi.dx * (e.uy + e.vx) + psi.dy * (4.0 * e.vy + 2.0 * e.ux) + psi.dz * e.vz;
                for s in t..N {
                    let phi = element.chi(q, s);
                    let gamma_u = 2.0 * e.ux * phi.dx
                        + e.vy * phi.dx
                        + 0.5 * phi.dy * (e.uy + e.vx)
                        + 0.5 * e.uz * phi.dz;
                    let gamma_v = 2.0 * e.vy * phi.dy
                        + e.ux * phi.dy
                        + 0.5 * phi.dx * (e.uy + e.vx)
                        + 0.5 * e.vz * phi.dz;
                    let (eta_u, eta_v) = (deta * gamma_u, deta * gamma_v);

                    // Picard part
                    local[(2 * t, 2 * s)] += w * eta * (4.0 * psi.dx * phi.dx + psi.dy * phi.dy + psi.dz * phi.dz);
                    local[(2 * t, 2 * s + 1)] += w * eta * (2.0 * psi.dx * phi.dy + psi.dy * phi.dx);
                    local[(2 * t + 1, 2 * s)] += w * eta * (2.0 * psi.dy * phi.dx + psi.dx * phi.dy);
                    local[(2 * t + 1, 2 * s + 1)] +=
                        w * eta * (4.0 * psi.dy * phi.dy + psi.dx * phi.dx + psi.dz * phi.dz);
                    // Newton part
                    local[(2 * t, 2 * s)] += w * eta_u * psi_u;
                    local[(2 * t, 2 * s + 1)] += w * eta_v * psi_u;
                    local[(2 * t + 1, 2 * s)] += w * eta_u * psi_v;
                    local[(2 * t + 1, 2 * s + 1)] += w * eta_v * psi_v;
                }
            }
        }
    }

    /// Adds the upper triangle of the basal drag Jacobian of a bottom face to `local`.
    fn jacobian_basal(&self, face: &Element3Face, column: &ColumnData, u: &[f64; N], v: &[f64; N], local: &mut DMatrix<f64>) {
        for q in 0..face.n_pts() {
            let w = face.weight(q);
            let (u_q, v_q) = (face.evaluate(u, q), face.evaluate(v, q));
            let (beta, dbeta) = self.drag(
                face.evaluate(&column.tauc, q),
                face.evaluate(&column.floatation, q),
                u_q,
                v_q,
            );
            for t in 0..N {
                let psi = face.chi(q, t);
                for s in t..N {
                    let p = w * psi * face.chi(q, s);
                    local[(2 * t, 2 * s)] += p * (beta + dbeta * u_q * u_q);
                    local[(2 * t, 2 * s + 1)] += p * dbeta * u_q * v_q;
                    local[(2 * t + 1, 2 * s)] += p * dbeta * v_q * u_q;
                    local[(2 * t + 1, 2 * s + 1)] += p * (beta + dbeta * v_q * v_q);
                }
            }
        }
    }
}

impl<F, S, B> Assembler for Blatter<F, S, B>
where
    F: FlowLaw,
    S: SlidingLaw,
    B: BlatterBoundary,
{
    fn dofs_per_node(&self) -> usize {
        2
    }

    /// Ice hardness on `level`, resampled from the geometry if it supplies one.
    fn init_coefficient(&self, level: &Level, geometry: &Geometry) -> eyre::Result<Field3<f64>> {
        match &geometry.hardness {
            Some(hardness) => Ok(resample_columns(level, hardness)?),
            None => {
                let grid = &level.grid;
                Ok(Field3::from_element(grid.mx(), grid.my(), grid.mz(), self.hardness))
            }
        }
    }

    fn compute_residual(&self, level: &Level, patch: &Patch, x: &[f64], residual: &mut [f64]) -> eyre::Result<()> {
        dirichlet::residual_rows(self, level, patch, self.dirichlet_scale, x, residual)?;

        let grid = &level.grid;
        let mut element = Element3::gauss(grid, patch, self.volume_quadrature, 2)?;
        let mut face = Element3Face::gauss(grid, 2)?;
        let mut grounding_line_face = Element3Face::uniform(grid, self.grounding_line_quadrature)?;
        let mut local = [0.0; 2 * N];

        for j in patch.elements_y(grid) {
            for i in patch.elements_x(grid) {
                let column = ColumnData::new(level, i, j);
                if exterior_element(&column.node_type) {
                    continue;
                }
                for k in 0..grid.mz() - 1 {
                    let (u, v) = self
                        .prepare_element(level, &mut element, (i, j, k), x)
                        .wrap_err_with(|| format!("failed to set up element ({}, {}, {})", i, j, k))?;
                    let hardness = element.nodal_field_values(&level.coefficient);
                    local.fill(0.0);

                    self.residual_f(&element, &column, &hardness, &u, &v, &mut local);

                    if k == 0 {
                        let basal = self.basal_face(&column, &mut face, &mut grounding_line_face);
                        basal.reset(q13d::BOTTOM_FACE, &element)?;
                        self.residual_basal(basal, &column, &u, &v, &mut local);
                    }

                    for lateral in 0..4 {
                        if self.boundary.neumann_bc_face(lateral, &column.node_type) {
                            face.reset(lateral, &element)?;
                            self.residual_lateral(&face, &element, &column, &mut local);
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
        let mut element = Element3::gauss(grid, patch, self.volume_quadrature, 2)?;
        let mut face = Element3Face::gauss(grid, 2)?;
        let mut grounding_line_face = Element3Face::uniform(grid, self.grounding_line_quadrature)?;
        let mut local = DMatrix::zeros(2 * N, 2 * N);

        for j in patch.elements_y(grid) {
            for i in patch.elements_x(grid) {
                let column = ColumnData::new(level, i, j);
                if exterior_element(&column.node_type) {
                    continue;
                }
                for k in 0..grid.mz() - 1 {
                    let (u, v) = self
                        .prepare_element(level, &mut element, (i, j, k), x)
                        .wrap_err_with(|| format!("failed to set up element ({}, {}, {})", i, j, k))?;
                    let hardness = element.nodal_field_values(&level.coefficient);
                    local.fill(0.0);

                    self.jacobian_f(&element, &hardness, &u, &v, &mut local);

                    if k == 0 {
                        let basal = self.basal_face(&column, &mut face, &mut grounding_line_face);
                        basal.reset(q13d::BOTTOM_FACE, &element)?;
                        self.jacobian_basal(basal, &column, &u, &v, &mut local);
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
        let bc = self.boundary.u_bc(grid.x(i), grid.y(j), level.z(i, j, k));
        vec![bc.x, bc.y]
    }

    fn dirichlet_node(&self, domain: &Grid, node: NodeIndex) -> bool {
        self.boundary.dirichlet_node(domain, node)
    }
}
