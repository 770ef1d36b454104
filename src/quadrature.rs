//! Shape functions of the reference elements and quadrature rules carrying their values
//! ("germs") at every quadrature point.
//!
//! Reference rules come from [`icefem_quadrature`]. The 2D rules in this module are mapped to
//! a physical grid cell of size `dx x dy`, so their germs hold physical derivatives and their
//! weights include the Jacobian determinant.
use crate::error::GeometryError;
use icefem_quadrature::{tensor, triangle, uniform};
use nalgebra::{Matrix2, Vector2};

pub use icefem_quadrature::Error as QuadratureError;

/// A shape function value and its partial derivatives at one point.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Germ {
    pub val: f64,
    pub dx: f64,
    pub dy: f64,
    pub dz: f64,
}

/// Q1 shape functions on the reference square `[-1, 1]^2`.
///
/// Nodes are numbered counter-clockwise starting from `(-1, -1)`.
pub mod q1 {
    use super::Germ;

    pub const N_CHI: usize = 4;

    /// Reference coordinates of the nodes.
    pub const NODES: [[f64; 2]; N_CHI] = [[-1.0, -1.0], [1.0, -1.0], [1.0, 1.0], [-1.0, 1.0]];

    /// Grid index offsets `(i, j)` of the nodes relative to the lower-left corner.
    pub const OFFSETS: [[usize; 2]; N_CHI] = [[0, 0], [1, 0], [1, 1], [0, 1]];

    /// Nodes incident to each side (S, E, N, W).
    pub const SIDE_NODES: [[usize; 2]; N_CHI] = [[0, 1], [1, 2], [2, 3], [3, 0]];

    /// Outward unit normals of the sides (S, E, N, W).
    pub const SIDE_NORMALS: [[f64; 2]; N_CHI] = [[0.0, -1.0], [1.0, 0.0], [0.0, 1.0], [-1.0, 0.0]];

    pub fn chi(k: usize, [xi, eta]: [f64; 2]) -> Germ {
        let [xi_k, eta_k] = NODES[k];
        Germ {
            val: 0.25 * (1.0 + xi_k * xi) * (1.0 + eta_k * eta),
            dx: 0.25 * xi_k * (1.0 + eta_k * eta),
            dy: 0.25 * eta_k * (1.0 + xi_k * xi),
            dz: 0.0,
        }
    }
}

/// Piecewise-constant (Q0) functions on the reference square: the indicator of the quadrant
/// containing node `k`. Their derivatives vanish.
pub mod q0 {
    use super::{q1, Germ};

    pub fn chi(k: usize, [xi, eta]: [f64; 2]) -> Germ {
        let [xi_k, eta_k] = q1::NODES[k];
        let inside = xi_k * xi >= 0.0 && eta_k * eta >= 0.0;
        Germ {
            val: if inside { 1.0 } else { 0.0 },
            ..Germ::default()
        }
    }
}

/// P1 shape functions on the reference triangle with vertices `(0, 0)`, `(1, 0)`, `(0, 1)`.
///
/// Index 3 is a dummy function that is identically zero, used for the node of a Q1 cell that
/// is not a vertex of the triangle.
pub mod p1 {
    use super::Germ;

    pub const N_CHI: usize = 3;

    /// `PERMUTATION[n][k]` is the P1 function matching node `k` of a Q1 cell in triangle `n`.
    pub const PERMUTATION: [[usize; 4]; 4] = [[0, 1, 3, 2], [2, 0, 1, 3], [3, 2, 0, 1], [1, 3, 2, 0]];

    pub fn chi(k: usize, [xi, eta]: [f64; 2]) -> Germ {
        match k {
            0 => Germ {
                val: 1.0 - xi - eta,
                dx: -1.0,
                dy: -1.0,
                dz: 0.0,
            },
            1 => Germ {
                val: xi,
                dx: 1.0,
                dy: 0.0,
                dz: 0.0,
            },
            2 => Germ {
                val: eta,
                dx: 0.0,
                dy: 1.0,
                dz: 0.0,
            },
            _ => Germ::default(),
        }
    }
}

/// Q1 shape functions on the reference cube `[-1, 1]^3`.
pub mod q13d {
    use super::Germ;

    pub const N_CHI: usize = 8;
    pub const N_FACES: usize = 6;

    /// Grid index offsets `(i, j, k)` of the nodes relative to the lower corner.
    pub const OFFSETS: [[usize; 3]; N_CHI] = [
        [0, 0, 0],
        [1, 0, 0],
        [1, 1, 0],
        [0, 1, 0],
        [0, 0, 1],
        [1, 0, 1],
        [1, 1, 1],
        [0, 1, 1],
    ];

    /// Nodes of each face, in the order `xi = -1, xi = 1, eta = -1, eta = 1, zeta = -1, zeta = 1`.
    pub const INCIDENT_NODES: [[usize; 4]; N_FACES] = [
        [0, 3, 7, 4],
        [1, 2, 6, 5],
        [0, 1, 5, 4],
        [3, 2, 6, 7],
        [0, 1, 2, 3],
        [4, 5, 6, 7],
    ];

    /// The bottom face (`zeta = -1`).
    pub const BOTTOM_FACE: usize = 4;

    /// Outward directions of the faces of the reference cube.
    pub const FACE_DIRECTIONS: [[f64; 3]; N_FACES] = [
        [-1.0, 0.0, 0.0],
        [1.0, 0.0, 0.0],
        [0.0, -1.0, 0.0],
        [0.0, 1.0, 0.0],
        [0.0, 0.0, -1.0],
        [0.0, 0.0, 1.0],
    ];

    pub fn node(k: usize) -> [f64; 3] {
        let [i, j, l] = OFFSETS[k];
        [2.0 * i as f64 - 1.0, 2.0 * j as f64 - 1.0, 2.0 * l as f64 - 1.0]
    }

    /// Maps the face parameters `(s, t)` in `[-1, 1]^2` to reference coordinates.
    pub fn face_point(face: usize, [s, t]: [f64; 2]) -> [f64; 3] {
        match face {
            0 => [-1.0, s, t],
            1 => [1.0, s, t],
            2 => [s, -1.0, t],
            3 => [s, 1.0, t],
            4 => [s, t, -1.0],
            _ => [s, t, 1.0],
        }
    }

    /// Reference derivative directions `(d/ds, d/dt)` of the face parameterization, as axis
    /// indices into `(xi, eta, zeta)`.
    pub fn face_axes(face: usize) -> [usize; 2] {
        match face {
            0 | 1 => [1, 2],
            2 | 3 => [0, 2],
            _ => [0, 1],
        }
    }

    /// Value and reference derivatives `(d/dxi, d/deta, d/dzeta)` of function `k`.
    pub fn chi(k: usize, [xi, eta, zeta]: [f64; 3]) -> Germ {
        let [xi_k, eta_k, zeta_k] = node(k);
        let (a, b, c) = (1.0 + xi_k * xi, 1.0 + eta_k * eta, 1.0 + zeta_k * zeta);
        Germ {
            val: 0.125 * a * b * c,
            dx: 0.125 * xi_k * b * c,
            dy: 0.125 * eta_k * a * c,
            dz: 0.125 * zeta_k * a * b,
        }
    }
}

/// A quadrature rule on a physical grid cell together with the germs of the four Q1 nodes
/// of the cell at every point.
#[derive(Clone, Debug, PartialEq)]
pub struct Quadrature2 {
    weights: Vec<f64>,
    points: Vec<[f64; 2]>,
    germs: Vec<[Germ; q1::N_CHI]>,
}

impl Quadrature2 {
    /// `n x n` Gauss rule with Q1 germs.
    pub fn q1_gauss(n: usize, dx: f64, dy: f64) -> Result<Self, QuadratureError> {
        let rule = tensor::quadrilateral_gauss(n)?;
        Ok(Self::axis_aligned(rule, q1::chi, dx, dy))
    }

    /// `n x n` uniform midpoint rule with Q1 germs.
    pub fn q1_uniform(n: usize, dx: f64, dy: f64) -> Result<Self, QuadratureError> {
        let rule = uniform::quadrilateral_uniform(n)?;
        Ok(Self::axis_aligned(rule, q1::chi, dx, dy))
    }

    /// `n x n` uniform midpoint rule with piecewise-constant (Q0) germs.
    pub fn q0_uniform(n: usize, dx: f64, dy: f64) -> Result<Self, QuadratureError> {
        let rule = uniform::quadrilateral_uniform(n)?;
        Ok(Self::axis_aligned(rule, q0::chi, dx, dy))
    }

    /// The 3-point rule on triangle `n` of a cell, with P1 germs.
    ///
    /// Triangle `n` has its right angle at node `n` of the cell and its vertices numbered
    /// counter-clockwise. The germ of the cell node that is not a vertex of the triangle is
    /// zero. Points are reported in the reference square of the cell.
    pub fn p1(n: usize, dx: f64, dy: f64) -> Result<Self, GeometryError> {
        assert!(n < q1::N_CHI, "a cell has four triangles");
        let (ref_weights, ref_points) = triangle::triangle_3();
        // Row r holds the derivatives of (x, y) with respect to reference coordinate r
        let jacobian = match n {
            0 => Matrix2::new(dx, 0.0, 0.0, dy),
            1 => Matrix2::new(0.0, dy, -dx, 0.0),
            2 => Matrix2::new(-dx, 0.0, 0.0, -dy),
            _ => Matrix2::new(0.0, -dy, dx, 0.0),
        };
        let (det, j_inv) = invert(&jacobian, (n, 0, 0))?;
        let [corner_xi, corner_eta] = q1::NODES[n];

        let mut result = Self::empty();
        for (w, [xi, eta]) in ref_weights.iter().zip(&ref_points) {
            let mut germs = [Germ::default(); q1::N_CHI];
            for (k, germ) in germs.iter_mut().enumerate() {
                let reference = p1::chi(p1::PERMUTATION[n][k], [*xi, *eta]);
                *germ = transform(&j_inv, reference);
            }
            // Physical offset from the corner, expressed in the reference square of the cell
            let offset = jacobian.transpose() * Vector2::new(*xi, *eta);
            result.weights.push(w * det);
            result.points.push([corner_xi + 2.0 * offset.x / dx, corner_eta + 2.0 * offset.y / dy]);
            result.germs.push(germs);
        }
        Ok(result)
    }

    fn empty() -> Self {
        Self {
            weights: Vec::new(),
            points: Vec::new(),
            germs: Vec::new(),
        }
    }

    fn axis_aligned(rule: icefem_quadrature::Rule2d, chi: fn(usize, [f64; 2]) -> Germ, dx: f64, dy: f64) -> Self {
        let (weights, points) = rule;
        let det = 0.25 * dx * dy;
        let germs = points
            .iter()
            .map(|point| {
                let mut germs = [Germ::default(); q1::N_CHI];
                for (k, germ) in germs.iter_mut().enumerate() {
                    let reference = chi(k, *point);
                    *germ = Germ {
                        val: reference.val,
                        dx: 2.0 * reference.dx / dx,
                        dy: 2.0 * reference.dy / dy,
                        dz: 0.0,
                    };
                }
                germs
            })
            .collect();
        Self {
            weights: weights.iter().map(|w| w * det).collect(),
            points,
            germs,
        }
    }

    pub fn n_pts(&self) -> usize {
        self.weights.len()
    }

    /// Physical quadrature weights.
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Points in the reference square of the cell.
    pub fn points(&self) -> &[[f64; 2]] {
        &self.points
    }

    /// Germ of node `k` at point `q`.
    pub fn chi(&self, q: usize, k: usize) -> &Germ {
        &self.germs[q][k]
    }
}

fn invert(jacobian: &Matrix2<f64>, element: (usize, usize, usize)) -> Result<(f64, Matrix2<f64>), GeometryError> {
    let determinant = jacobian.determinant();
    let degenerate = GeometryError { element, determinant };
    if !(determinant.is_finite() && determinant > 0.0) {
        return Err(degenerate);
    }
    jacobian
        .try_inverse()
        .map(|inverse| (determinant, inverse))
        .ok_or(degenerate)
}

fn transform(j_inv: &Matrix2<f64>, reference: Germ) -> Germ {
    let gradient = j_inv * Vector2::new(reference.dx, reference.dy);
    Germ {
        val: reference.val,
        dx: gradient.x,
        dy: gradient.y,
        dz: 0.0,
    }
}

/// Quadrature on the sides of a Q1 cell, used for boundary integrals of 2D problems.
#[derive(Clone, Debug, PartialEq)]
pub struct BoundaryQuadrature2 {
    // Indexed by [side][point]
    weights: Vec<Vec<f64>>,
    germs: Vec<Vec<[Germ; q1::N_CHI]>>,
}

impl BoundaryQuadrature2 {
    /// Two-point Gauss rule on every side of a `dx x dy` cell.
    pub fn new(dx: f64, dy: f64) -> Result<Self, QuadratureError> {
        let (weights_1d, points_1d) = icefem_quadrature::univariate::try_gauss(2)?;
        let mut weights = Vec::with_capacity(q1::N_CHI);
        let mut germs = Vec::with_capacity(q1::N_CHI);
        for side in 0..q1::N_CHI {
            let [a, b] = q1::SIDE_NODES[side];
            let (start, end) = (q1::NODES[a], q1::NODES[b]);
            // Length of the physical side divided by the length of [-1, 1]
            let half_length = 0.5 * ((end[0] - start[0]) * 0.5 * dx).hypot((end[1] - start[1]) * 0.5 * dy);
            let mut side_weights = Vec::new();
            let mut side_germs = Vec::new();
            for (w, [t]) in weights_1d.iter().zip(&points_1d) {
                let s = 0.5 * (1.0 + t);
                let point = [
                    start[0] + s * (end[0] - start[0]),
                    start[1] + s * (end[1] - start[1]),
                ];
                let mut values = [Germ::default(); q1::N_CHI];
                for (k, germ) in values.iter_mut().enumerate() {
                    let reference = q1::chi(k, point);
                    *germ = Germ {
                        val: reference.val,
                        dx: 2.0 * reference.dx / dx,
                        dy: 2.0 * reference.dy / dy,
                        dz: 0.0,
                    };
                }
                side_weights.push(w * half_length);
                side_germs.push(values);
            }
            weights.push(side_weights);
            germs.push(side_germs);
        }
        Ok(Self { weights, germs })
    }

    pub fn n_pts(&self) -> usize {
        self.weights[0].len()
    }

    pub fn weight(&self, side: usize, q: usize) -> f64 {
        self.weights[side][q]
    }

    pub fn chi(&self, side: usize, q: usize, k: usize) -> &Germ {
        &self.germs[side][q][k]
    }

    pub fn normal(&self, side: usize) -> [f64; 2] {
        q1::SIDE_NORMALS[side]
    }
}
