//! Element accessors: transient views of one grid cell used during assembly.
//!
//! An accessor is bound to an element with `reset`, gathers nodal values from global storage,
//! evaluates them (and their gradients) at quadrature points and scatters element-local
//! contributions back. Scattering skips rows and columns marked invalid. Rows of nodes not
//! owned by the current [`Patch`] are marked invalid on every `reset`, so each process only
//! writes to the rows it owns. Row and column masks are independent.
use crate::error::GeometryError;
use crate::field::{Field2, Field3};
use crate::grid::{Grid, NodeIndex, Patch};
use crate::quadrature::{q13d, q1, Germ, Quadrature2, QuadratureError};
use eyre::{bail, eyre};
use icefem_quadrature::{tensor, Rule2d, Rule3d};
use nalgebra::{DMatrix, Vector3};
use nalgebra_sparse::CooMatrix;

/// Q1 element on the horizontal grid.
#[derive(Clone, Debug)]
pub struct Element2 {
    grid: Grid,
    patch: Patch,
    quadrature: Quadrature2,
    i: usize,
    j: usize,
    row_valid: [bool; q1::N_CHI],
    col_valid: [bool; q1::N_CHI],
}

impl Element2 {
    pub fn new(grid: &Grid, patch: &Patch, quadrature: Quadrature2) -> Self {
        Self {
            grid: *grid,
            patch: *patch,
            quadrature,
            i: 0,
            j: 0,
            row_valid: [false; q1::N_CHI],
            col_valid: [true; q1::N_CHI],
        }
    }

    /// An element using the `2 x 2` Gauss rule.
    pub fn gauss(grid: &Grid, patch: &Patch) -> Result<Self, QuadratureError> {
        let quadrature = Quadrature2::q1_gauss(2, grid.dx(), grid.dy())?;
        Ok(Self::new(grid, patch, quadrature))
    }

    /// Binds the accessor to the element with lower-left node `(i, j)`.
    pub fn reset(&mut self, i: usize, j: usize) -> eyre::Result<()> {
        if i + 1 >= self.grid.mx() || j + 1 >= self.grid.my() {
            bail!(
                "element ({}, {}) is outside a grid with {} x {} nodes",
                i,
                j,
                self.grid.mx(),
                self.grid.my()
            );
        }
        self.i = i;
        self.j = j;
        for n in 0..q1::N_CHI {
            let (ii, jj) = self.local_to_global(n);
            self.row_valid[n] = self.patch.owns(ii, jj);
            self.col_valid[n] = true;
        }
        Ok(())
    }

    pub fn local_to_global(&self, n: usize) -> (usize, usize) {
        let [di, dj] = q1::OFFSETS[n];
        (self.i + di, self.j + dj)
    }

    pub fn n_chi(&self) -> usize {
        q1::N_CHI
    }

    pub fn n_pts(&self) -> usize {
        self.quadrature.n_pts()
    }

    pub fn weight(&self, q: usize) -> f64 {
        self.quadrature.weights()[q]
    }

    pub fn chi(&self, q: usize, n: usize) -> &Germ {
        self.quadrature.chi(q, n)
    }

    pub fn mark_row_invalid(&mut self, n: usize) {
        self.row_valid[n] = false;
    }

    pub fn mark_col_invalid(&mut self, n: usize) {
        self.col_valid[n] = false;
    }

    pub fn nodal_values<T: Copy>(&self, field: &Field2<T>) -> [T; q1::N_CHI] {
        [0, 1, 2, 3].map(|n| {
            let (i, j) = self.local_to_global(n);
            field[(i, j)]
        })
    }

    /// Value and gradient at quadrature point `q` of the function with the given nodal values.
    pub fn evaluate(&self, nodal: &[f64; q1::N_CHI], q: usize) -> Germ {
        let mut result = Germ::default();
        for (n, value) in nodal.iter().enumerate() {
            let chi = self.chi(q, n);
            result.val += value * chi.val;
            result.dx += value * chi.dx;
            result.dy += value * chi.dy;
        }
        result
    }

    pub fn add_contribution(&self, local: &[f64; q1::N_CHI], global: &mut Field2<f64>) -> eyre::Result<()> {
        for (n, value) in local.iter().enumerate() {
            if !self.row_valid[n] {
                continue;
            }
            let (i, j) = self.local_to_global(n);
            if i >= global.mx() || j >= global.my() {
                bail!("node ({}, {}) is outside of the {}x{} field", i, j, global.mx(), global.my());
            }
            global[(i, j)] += value;
        }
        Ok(())
    }
}

/// Q1 hexahedral element of a vertically extruded grid.
///
/// The horizontal map is affine. Node elevations vary per column, so germs and weights are
/// recomputed on every `reset`.
#[derive(Clone, Debug)]
pub struct Element3 {
    grid: Grid,
    patch: Patch,
    dofs: usize,
    reference_weights: Vec<f64>,
    reference_germs: Vec<[Germ; q13d::N_CHI]>,
    index: NodeIndex,
    z: [f64; q13d::N_CHI],
    weights: Vec<f64>,
    germs: Vec<[Germ; q13d::N_CHI]>,
    row_valid: [bool; q13d::N_CHI],
    col_valid: [bool; q13d::N_CHI],
}

impl Element3 {
    /// An element on `grid`, scattering into rows owned by `patch`, for fields with `dofs`
    /// degrees of freedom per node.
    pub fn new(grid: &Grid, patch: &Patch, rule: Rule3d, dofs: usize) -> Self {
        let (reference_weights, points) = rule;
        let reference_germs: Vec<_> = points
            .iter()
            .map(|point| [0, 1, 2, 3, 4, 5, 6, 7].map(|n| q13d::chi(n, *point)))
            .collect();
        let n_pts = reference_weights.len();
        Self {
            grid: *grid,
            patch: *patch,
            dofs,
            reference_weights,
            reference_germs,
            index: NodeIndex::new(0, 0, 0),
            z: [0.0; q13d::N_CHI],
            weights: vec![0.0; n_pts],
            germs: vec![[Germ::default(); q13d::N_CHI]; n_pts],
            row_valid: [false; q13d::N_CHI],
            col_valid: [true; q13d::N_CHI],
        }
    }

    /// An element using the `n x n x n` Gauss rule.
    pub fn gauss(grid: &Grid, patch: &Patch, n: usize, dofs: usize) -> Result<Self, QuadratureError> {
        Ok(Self::new(grid, patch, tensor::hexahedron_gauss(n)?, dofs))
    }

    /// Global index of node `n` of the element with lower corner `(i, j, k)`.
    pub fn local_to_global_at(i: usize, j: usize, k: usize, n: usize) -> NodeIndex {
        let [di, dj, dk] = q13d::OFFSETS[n];
        NodeIndex::new(i + di, j + dj, k + dk)
    }

    pub fn local_to_global(&self, n: usize) -> NodeIndex {
        let NodeIndex { i, j, k } = self.index;
        Self::local_to_global_at(i, j, k, n)
    }

    /// Binds the accessor to the element with lower corner `(i, j, k)` whose nodes are at
    /// elevations `z`.
    ///
    /// Fails with a [`GeometryError`] if the element is degenerate and with a plain error if it
    /// is outside the grid. Resets the row and column masks.
    pub fn reset(&mut self, i: usize, j: usize, k: usize, z: &[f64; q13d::N_CHI]) -> eyre::Result<()> {
        let (mx, my, mz) = (self.grid.mx(), self.grid.my(), self.grid.mz());
        if i + 1 >= mx || j + 1 >= my || k + 1 >= mz {
            bail!(
                "element ({}, {}, {}) is outside a grid with {} x {} x {} nodes",
                i,
                j,
                k,
                mx,
                my,
                mz
            );
        }
        self.index = NodeIndex::new(i, j, k);
        self.z = *z;

        let (half_dx, half_dy) = (0.5 * self.grid.dx(), 0.5 * self.grid.dy());
        for (q, reference) in self.reference_germs.iter().enumerate() {
            let (mut z_xi, mut z_eta, mut z_zeta) = (0.0, 0.0, 0.0);
            for (chi, z_n) in reference.iter().zip(z) {
                z_xi += z_n * chi.dx;
                z_eta += z_n * chi.dy;
                z_zeta += z_n * chi.dz;
            }
            let determinant = half_dx * half_dy * z_zeta;
            if !(determinant.is_finite() && determinant > 0.0) {
                return Err(GeometryError {
                    element: (i, j, k),
                    determinant,
                }
                .into());
            }
            self.weights[q] = self.reference_weights[q] * determinant;
            for (germ, chi) in self.germs[q].iter_mut().zip(reference) {
                let dz = chi.dz / z_zeta;
                *germ = Germ {
                    val: chi.val,
                    dx: (chi.dx - z_xi * dz) / half_dx,
                    dy: (chi.dy - z_eta * dz) / half_dy,
                    dz,
                };
            }
        }

        for n in 0..q13d::N_CHI {
            let node = self.local_to_global(n);
            self.row_valid[n] = self.patch.owns(node.i, node.j);
            self.col_valid[n] = true;
        }
        Ok(())
    }

    pub fn n_chi(&self) -> usize {
        q13d::N_CHI
    }

    /// Lower corner of the current element.
    pub fn index(&self) -> NodeIndex {
        self.index
    }

    pub fn n_pts(&self) -> usize {
        self.weights.len()
    }

    pub fn dofs(&self) -> usize {
        self.dofs
    }

    pub fn weight(&self, q: usize) -> f64 {
        self.weights[q]
    }

    pub fn chi(&self, q: usize, n: usize) -> &Germ {
        &self.germs[q][n]
    }

    pub fn x(&self, n: usize) -> f64 {
        self.grid.x(self.local_to_global(n).i)
    }

    pub fn y(&self, n: usize) -> f64 {
        self.grid.y(self.local_to_global(n).j)
    }

    pub fn z(&self, n: usize) -> f64 {
        self.z[n]
    }

    pub fn nodal_z(&self) -> &[f64; q13d::N_CHI] {
        &self.z
    }

    pub fn mark_row_invalid(&mut self, n: usize) {
        self.row_valid[n] = false;
    }

    pub fn mark_col_invalid(&mut self, n: usize) {
        self.col_valid[n] = false;
    }

    pub fn row_valid(&self, n: usize) -> bool {
        self.row_valid[n]
    }

    pub fn col_valid(&self, n: usize) -> bool {
        self.col_valid[n]
    }

    fn global_dof(&self, n: usize, component: usize) -> usize {
        let NodeIndex { i, j, k } = self.local_to_global(n);
        self.grid.node_index(i, j, k) * self.dofs + component
    }

    /// Gathers component `component` of the nodal values of a global vector.
    pub fn nodal_values(&self, x: &[f64], component: usize) -> eyre::Result<[f64; q13d::N_CHI]> {
        let mut result = [0.0; q13d::N_CHI];
        for (n, value) in result.iter_mut().enumerate() {
            let dof = self.global_dof(n, component);
            *value = *x
                .get(dof)
                .ok_or_else(|| eyre!("degree of freedom {} is outside of a vector of length {}", dof, x.len()))?;
        }
        Ok(result)
    }

    pub fn nodal_field_values(&self, field: &Field3<f64>) -> [f64; q13d::N_CHI] {
        [0, 1, 2, 3, 4, 5, 6, 7].map(|n| {
            let NodeIndex { i, j, k } = self.local_to_global(n);
            field[(i, j, k)]
        })
    }

    /// Value and gradient at quadrature point `q` of the function with the given nodal values.
    pub fn evaluate(&self, nodal: &[f64; q13d::N_CHI], q: usize) -> Germ {
        let mut result = Germ::default();
        for (chi, value) in self.germs[q].iter().zip(nodal) {
            result.val += value * chi.val;
            result.dx += value * chi.dx;
            result.dy += value * chi.dy;
            result.dz += value * chi.dz;
        }
        result
    }

    /// Adds an element residual, stored node by node with `dofs` entries per node, to `global`.
    pub fn add_residual(&self, local: &[f64], global: &mut [f64]) -> eyre::Result<()> {
        assert_eq!(local.len(), q13d::N_CHI * self.dofs);
        for n in 0..q13d::N_CHI {
            if !self.row_valid[n] {
                continue;
            }
            for c in 0..self.dofs {
                let row = self.global_dof(n, c);
                let len = global.len();
                let entry = global
                    .get_mut(row)
                    .ok_or_else(|| eyre!("residual row {} is outside of a vector of length {}", row, len))?;
                *entry += local[n * self.dofs + c];
            }
        }
        Ok(())
    }

    /// Adds an element Jacobian with the same layout as the element residual to `global`.
    ///
    /// Inserting outside of the matrix is an error.
    pub fn add_jacobian(&self, local: &DMatrix<f64>, global: &mut CooMatrix<f64>) -> eyre::Result<()> {
        let size = q13d::N_CHI * self.dofs;
        assert_eq!(local.shape(), (size, size));
        for n in 0..q13d::N_CHI {
            if !self.row_valid[n] {
                continue;
            }
            for m in 0..q13d::N_CHI {
                if !self.col_valid[m] {
                    continue;
                }
                for c in 0..self.dofs {
                    for d in 0..self.dofs {
                        let (row, col) = (self.global_dof(n, c), self.global_dof(m, d));
                        if row >= global.nrows() || col >= global.ncols() {
                            bail!(
                                "entry ({}, {}) is outside of a {}x{} matrix",
                                row,
                                col,
                                global.nrows(),
                                global.ncols()
                            );
                        }
                        global.push(row, col, local[(n * self.dofs + c, m * self.dofs + d)]);
                    }
                }
            }
        }
        Ok(())
    }
}

/// A face of a Q1 hexahedral element, for boundary integrals.
///
/// Holds the values of all eight element shape functions at the face quadrature points,
/// physical weights from the surface metric and outward unit normals.
#[derive(Clone, Debug)]
pub struct Element3Face {
    dx: f64,
    dy: f64,
    reference_weights: Vec<f64>,
    reference_points: Vec<[f64; 2]>,
    face: usize,
    weights: Vec<f64>,
    chi: Vec<[f64; q13d::N_CHI]>,
    normals: Vec<Vector3<f64>>,
}

impl Element3Face {
    pub fn new(grid: &Grid, rule: Rule2d) -> Self {
        let (reference_weights, reference_points) = rule;
        let n_pts = reference_weights.len();
        Self {
            dx: grid.dx(),
            dy: grid.dy(),
            reference_weights,
            reference_points,
            face: 0,
            weights: vec![0.0; n_pts],
            chi: vec![[0.0; q13d::N_CHI]; n_pts],
            normals: vec![Vector3::zeros(); n_pts],
        }
    }

    /// A face using the `n x n` Gauss rule.
    pub fn gauss(grid: &Grid, n: usize) -> Result<Self, QuadratureError> {
        Ok(Self::new(grid, tensor::quadrilateral_gauss(n)?))
    }

    /// A face using the `n x n` uniform midpoint rule.
    pub fn uniform(grid: &Grid, n: usize) -> Result<Self, QuadratureError> {
        Ok(Self::new(grid, icefem_quadrature::uniform::quadrilateral_uniform(n)?))
    }

    /// Binds the accessor to face `face` of the element `element` is currently bound to.
    pub fn reset(&mut self, face: usize, element: &Element3) -> eyre::Result<()> {
        if face >= q13d::N_FACES {
            bail!("face {} does not exist, an element has {} faces", face, q13d::N_FACES);
        }
        let z = element.nodal_z();
        self.face = face;
        let [axis_s, axis_t] = q13d::face_axes(face);
        let direction = Vector3::from(q13d::FACE_DIRECTIONS[face]);
        let scales = [0.5 * self.dx, 0.5 * self.dy];

        for (q, point) in self.reference_points.iter().enumerate() {
            let xi = q13d::face_point(face, *point);
            // Derivatives of the map (x, y, z) with respect to (xi, eta, zeta)
            let mut tangents = [Vector3::zeros(); 3];
            for (axis, tangent) in tangents.iter_mut().enumerate().take(2) {
                tangent[axis] = scales[axis];
            }
            for (n, z_n) in z.iter().enumerate() {
                let chi = q13d::chi(n, xi);
                self.chi[q][n] = chi.val;
                tangents[0].z += z_n * chi.dx;
                tangents[1].z += z_n * chi.dy;
                tangents[2].z += z_n * chi.dz;
            }
            let cross = tangents[axis_s].cross(&tangents[axis_t]);
            let area = cross.norm();
            if !(area.is_finite() && area > 0.0) {
                let NodeIndex { i, j, k } = element.index();
                return Err(GeometryError {
                    element: (i, j, k),
                    determinant: area,
                }
                .into());
            }
            let normal = cross / area;
            self.normals[q] = if normal.dot(&direction) < 0.0 { -normal } else { normal };
            self.weights[q] = self.reference_weights[q] * area;
        }
        Ok(())
    }

    pub fn face(&self) -> usize {
        self.face
    }

    pub fn n_pts(&self) -> usize {
        self.weights.len()
    }

    pub fn weight(&self, q: usize) -> f64 {
        self.weights[q]
    }

    /// Value of element shape function `n` at face quadrature point `q`.
    pub fn chi(&self, q: usize, n: usize) -> f64 {
        self.chi[q][n]
    }

    /// Outward unit normal at face quadrature point `q`.
    pub fn normal(&self, q: usize) -> &Vector3<f64> {
        &self.normals[q]
    }

    pub fn evaluate(&self, nodal: &[f64; q13d::N_CHI], q: usize) -> f64 {
        self.chi[q].iter().zip(nodal).map(|(chi, value)| chi * value).sum()
    }
}
