//! Manufactured solutions used to verify the assemblers.
use crate::assembly::blatter::BlatterBoundary;
use crate::assembly::poisson3::ManufacturedSolution;
use crate::assembly::Level;
use crate::comm::Communicator;
use crate::error::SetupError;
use crate::field::{Field2, Geometry, NodeType};
use crate::grid::{Grid, NodeIndex};
use nalgebra::{Vector2, Vector3};
use std::f64::consts::PI;

/// `u = x y (z + 1)^2 + 2 (y + 1) / ((y + 1)^2 + (x + 2)^2)`, with `-Δu = -2 x y`.
///
/// The second term is harmonic, so the source term only depends on the first.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Poisson3Exact;

impl ManufacturedSolution for Poisson3Exact {
    fn value(&self, x: f64, y: f64, z: f64) -> f64 {
        x * y * (z + 1.0).powi(2) + 2.0 * (y + 1.0) / ((y + 1.0).powi(2) + (x + 2.0).powi(2))
    }

    fn gradient(&self, x: f64, y: f64, z: f64) -> Vector3<f64> {
        let d = (y + 1.0).powi(2) + (x + 2.0).powi(2);
        Vector3::new(
            y * (z + 1.0).powi(2) - 4.0 * (x + 2.0) * (y + 1.0) / (d * d),
            x * (z + 1.0).powi(2) + 2.0 * ((x + 2.0).powi(2) - (y + 1.0).powi(2)) / (d * d),
            2.0 * x * y * (z + 1.0),
        )
    }

    fn source(&self, x: f64, y: f64, _z: f64) -> f64 {
        -2.0 * x * y
    }
}

/// The geometry of the Poisson verification problem: bed `-1 + x + y`, thickness
/// `1 + x^2 + y^2`.
pub fn poisson3_geometry(grid: &Grid) -> Geometry {
    let bed = Field2::from_fn(grid.mx(), grid.my(), |i, j| -1.0 + grid.x(i) + grid.y(j));
    let thickness = Field2::from_fn(grid.mx(), grid.my(), |i, j| {
        1.0 + grid.x(i).powi(2) + grid.y(j).powi(2)
    });
    Geometry::new(bed, thickness)
}

/// Blatter verification test with the exact solution `u = e^x sin 2πy`, `v = e^x cos 2πy` on
/// `[0, 1]^3`, using the linear flow law with constant hardness.
///
/// The velocity is prescribed on the lateral boundary. The solution does not depend on `z`
/// and the basal yield stress is zero, so the natural conditions on top and bottom hold.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct BlatterTest1 {
    pub hardness: f64,
}

impl BlatterTest1 {
    pub fn new(hardness: f64) -> Self {
        Self { hardness }
    }

    /// A grid with `m x m x mz` nodes covering the unit square.
    pub fn grid(m: usize, mz: usize) -> Result<Grid, SetupError> {
        Grid::new(m, m, mz, 0.5, 0.5, 0.5, 0.5)
    }

    /// Flat bed at zero, unit thickness and zero yield stress.
    pub fn geometry(grid: &Grid) -> Geometry {
        Geometry::new(
            Field2::from_element(grid.mx(), grid.my(), 0.0),
            Field2::from_element(grid.mx(), grid.my(), 1.0),
        )
    }

    pub fn velocity(&self, x: f64, y: f64) -> Vector2<f64> {
        let e = x.exp();
        Vector2::new(e * (2.0 * PI * y).sin(), e * (2.0 * PI * y).cos())
    }

    /// The exact velocity at every node of `level`, interleaved as `(u, v)`.
    pub fn exact_solution(&self, level: &Level) -> Vec<f64> {
        let grid = &level.grid;
        let mut result = vec![0.0; 2 * grid.num_nodes()];
        for j in 0..grid.my() {
            for i in 0..grid.mx() {
                let velocity = self.velocity(grid.x(i), grid.y(j));
                for k in 0..grid.mz() {
                    let n = grid.node_index(i, j, k);
                    result[2 * n] = velocity.x;
                    result[2 * n + 1] = velocity.y;
                }
            }
        }
        result
    }
}

impl BlatterBoundary for BlatterTest1 {
    fn dirichlet_node(&self, domain: &Grid, node: NodeIndex) -> bool {
        node.i == 0 || node.j == 0 || node.i + 1 == domain.mx() || node.j + 1 == domain.my()
    }

    fn u_bc(&self, x: f64, y: f64, _z: f64) -> Vector2<f64> {
        self.velocity(x, y)
    }

    fn neumann_bc_face(&self, _face: usize, _node_type: &[NodeType; 8]) -> bool {
        false
    }

    fn source_term(&self, x: f64, y: f64, _z: f64, _driving_stress: Vector2<f64>) -> Vector2<f64> {
        let eta = 0.5 * self.hardness;
        let e = x.exp();
        let (s, c) = (2.0 * PI * y).sin_cos();
        Vector2::new(
            eta * e * s * (4.0 - 6.0 * PI - 4.0 * PI * PI),
            eta * e * c * (1.0 + 6.0 * PI - 16.0 * PI * PI),
        )
    }
}

/// The max norm of `exact - computed` over all processes.
pub fn max_error<C: Communicator + ?Sized>(exact: &[f64], computed: &[f64], comm: &C) -> f64 {
    assert_eq!(exact.len(), computed.len(), "vectors must have the same length");
    let local = exact
        .iter()
        .zip(computed)
        .map(|(a, b)| (a - b).abs())
        .fold(0.0, f64::max);
    comm.all_reduce_max(local)
}
