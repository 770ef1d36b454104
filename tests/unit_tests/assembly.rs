use crate::{level_with_geometry, LinearSolution};
use icefem::assembly::poisson3::ManufacturedSolution;
use icefem::assembly::{
    assemble_jacobian, assemble_residual, boundary_state, dirichlet, resample_columns, Assembler, Blatter, Level,
    Poisson3,
};
use icefem::config::SolverConfig;
use icefem::field::{Field2, Field3, Geometry, NodeType};
use icefem::flow_law::IsothermalGlen;
use icefem::grid::{Grid, NodeIndex, Patch};
use icefem::sliding::PseudoPlastic;
use icefem::verification::{poisson3_geometry, Poisson3Exact};
use icefem_optimize::calculus::{approximate_jacobian, VectorFunction};
use matrixcompare::assert_scalar_eq;
use nalgebra::{DMatrix, DVector, DVectorView, DVectorViewMut};
use std::error::Error;
use util::{assert_approx_matrix_eq, scaled_max_difference};

/// The residual of an assembler on a fixed level, as a vector function of the state.
struct Residual<'a, A> {
    assembler: &'a A,
    level: &'a Level,
}

impl<'a, A: Assembler> VectorFunction<f64> for Residual<'a, A> {
    fn dimension(&self) -> usize {
        self.level.num_dofs(self.assembler.dofs_per_node())
    }

    fn eval_into(&mut self, f: &mut DVectorViewMut<f64>, x: &DVectorView<f64>) -> Result<(), Box<dyn Error>> {
        let x = x.clone_owned();
        let residual = assemble_residual(self.assembler, self.level, &[Patch::whole(&self.level.grid)], x.as_slice())?;
        f.copy_from(&residual);
        Ok(())
    }
}

fn poisson_level<M: ManufacturedSolution>(assembler: &Poisson3<M>, m: usize, mz: usize) -> Level {
    let grid = Grid::new(m, m, mz, 0.0, 0.0, 1.0, 1.0).unwrap();
    level_with_geometry(assembler, grid, &poisson3_geometry(&grid), 0.1)
}

/// A state that is not special in any way.
fn arbitrary_state(n: usize) -> Vec<f64> {
    (0..n).map(|i| (0.7 * i as f64).sin() + 0.1 * i as f64).collect()
}

/// A 5x5 grid with ice on the inner 3x3 block only.
fn ice_cap_geometry(grid: &Grid) -> Geometry {
    let thickness = Field2::from_fn(grid.mx(), grid.my(), |i, j| {
        if (1..4).contains(&i) && (1..4).contains(&j) {
            500.0
        } else {
            0.0
        }
    });
    let bed = Field2::from_fn(grid.mx(), grid.my(), |i, _| 100.0 - 10.0 * i as f64);
    Geometry::new(bed, thickness)
}

#[test]
fn poisson_residual_vanishes_for_linear_solution() {
    let assembler = Poisson3::new(LinearSolution, &SolverConfig::default());
    let level = poisson_level(&assembler, 5, 4);
    let exact = assembler.exact_solution(&level);
    let residual = assemble_residual(&assembler, &level, &[Patch::whole(&level.grid)], &exact).unwrap();
    assert!(residual.amax() < 1e-10, "max residual {:e}", residual.amax());

    // Perturbing a free node produces a residual
    let mut perturbed = exact.clone();
    perturbed[level.grid.node_index(1, 1, 1)] += 1.0;
    let residual = assemble_residual(&assembler, &level, &[Patch::whole(&level.grid)], &perturbed).unwrap();
    assert!(residual.amax() > 1e-3);
}

/// A level on the 4x4 grid over `[-1, 1]^2` padded to 5x5 columns, with the Poisson geometry
/// on the unpadded columns.
fn padded_poisson_level<M: ManufacturedSolution>(assembler: &Poisson3<M>) -> (Grid, Level) {
    let grid = Grid::new(4, 4, 3, 0.0, 0.0, 1.0, 1.0).unwrap();
    let padded = grid.padded(1, 2, true).unwrap();
    assert_eq!((padded.mx(), padded.my(), padded.mz()), (5, 5, 3));
    let mut level = level_with_geometry(assembler, padded, &poisson3_geometry(&grid), 0.1);
    level.domain = padded.sub_grid(grid.mx(), grid.my()).unwrap();
    (grid, level)
}

#[test]
fn poisson_dirichlet_nodes_lie_on_the_unpadded_boundary() {
    let assembler = Poisson3::new(Poisson3Exact, &SolverConfig::default());
    let (grid, level) = padded_poisson_level(&assembler);
    assert_scalar_eq!(level.domain.x(3), grid.x(3), comp = abs, tol = 1e-12);
    assert_eq!(level.node_type(3, 1), NodeType::Boundary);
    assert_eq!(level.node_type(4, 1), NodeType::Exterior);

    // The last unpadded column is a Dirichlet column, the one before it is free
    for (i, j) in [(3, 0), (3, 2), (0, 3), (2, 3)] {
        for k in 0..3 {
            assert!(dirichlet::pinned(&assembler, &level, NodeIndex::new(i, j, k)));
        }
    }
    for (i, j, k) in [(2, 1, 0), (2, 2, 1), (1, 2, 0)] {
        assert!(!dirichlet::pinned(&assembler, &level, NodeIndex::new(i, j, k)));
    }
    // Padded columns are exterior
    assert!(dirichlet::pinned(&assembler, &level, NodeIndex::new(4, 1, 1)));

    let x = boundary_state(&assembler, &level);
    let exact = assembler.exact_solution(&level);
    let n = level.grid.node_index(3, 1, 1);
    assert_scalar_eq!(x[n], exact[n], comp = abs, tol = 1e-14);
    assert_eq!(x[level.grid.node_index(2, 1, 1)], 0.0);
}

#[test]
fn poisson_residual_vanishes_for_linear_solution_on_padded_level() {
    let assembler = Poisson3::new(LinearSolution, &SolverConfig::default());
    let (_, level) = padded_poisson_level(&assembler);
    let exact = assembler.exact_solution(&level);
    let patches = [Patch::whole(&level.grid)];
    let residual = assemble_residual(&assembler, &level, &patches, &exact).unwrap();
    assert!(residual.amax() < 1e-10, "max residual {:e}", residual.amax());

    // The last unpadded column is pinned, so perturbing it changes only its own rows
    let mut perturbed = exact.clone();
    let boundary = level.grid.node_index(3, 1, 1);
    perturbed[boundary] += 1.0;
    let residual = assemble_residual(&assembler, &level, &patches, &perturbed).unwrap();
    assert!(residual[boundary] > 0.0);
    for (n, r) in residual.iter().enumerate() {
        if n != boundary {
            assert!(r.abs() < 1e-10, "row {} has residual {:e}", n, r);
        }
    }
}

#[test]
fn poisson_jacobian_is_symmetric_and_matches_finite_differences() {
    let assembler = Poisson3::new(Poisson3Exact, &SolverConfig::default());
    let level = poisson_level(&assembler, 4, 3);
    let x = arbitrary_state(level.num_dofs(1));
    let jacobian = assemble_jacobian(&assembler, &level, &[Patch::whole(&level.grid)], &x).unwrap();
    let jacobian = DMatrix::from(&jacobian);
    assert_approx_matrix_eq!(&jacobian, &jacobian.transpose(), abstol = 1e-12);

    let residual = Residual {
        assembler: &assembler,
        level: &level,
    };
    let approximate = approximate_jacobian(residual, &DVector::from_vec(x), 1e-6).unwrap();
    assert!(scaled_max_difference(&approximate, &jacobian) < 1e-6);
}

#[test]
fn poisson_pinned_nodes_follow_the_boundary() {
    let assembler = Poisson3::new(Poisson3Exact, &SolverConfig::default());
    let level = poisson_level(&assembler, 4, 3);
    let grid = level.grid;
    for (i, j, k) in [(3, 0, 0), (0, 3, 1), (1, 1, 2), (3, 3, 2)] {
        assert!(assembler.dirichlet_node(&grid, NodeIndex::new(i, j, k)));
    }
    for (i, j, k) in [(0, 0, 0), (1, 2, 1), (2, 0, 0)] {
        assert!(!assembler.dirichlet_node(&grid, NodeIndex::new(i, j, k)));
    }

    let x = boundary_state(&assembler, &level);
    let exact = assembler.exact_solution(&level);
    let n = grid.node_index(3, 1, 1);
    assert_scalar_eq!(x[n], exact[n], comp = abs, tol = 1e-14);
    assert_eq!(x[grid.node_index(1, 1, 1)], 0.0);
}

#[test]
fn partitioned_assembly_equals_whole_grid_assembly() {
    let config = SolverConfig::default();
    let poisson = Poisson3::new(Poisson3Exact, &config);
    let level = poisson_level(&poisson, 7, 3);
    let grid = level.grid;
    let whole = [Patch::whole(&grid)];
    let x = arbitrary_state(level.num_dofs(1));
    for (px, py) in [(2, 2), (3, 1), (2, 3)] {
        let patches = Patch::partition(&grid, px, py).unwrap();
        let r_whole = assemble_residual(&poisson, &level, &whole, &x).unwrap();
        let r_split = assemble_residual(&poisson, &level, &patches, &x).unwrap();
        assert_approx_matrix_eq!(&r_split, &r_whole, abstol = 1e-10);

        let j_whole = DMatrix::from(&assemble_jacobian(&poisson, &level, &whole, &x).unwrap());
        let j_split = DMatrix::from(&assemble_jacobian(&poisson, &level, &patches, &x).unwrap());
        assert_approx_matrix_eq!(&j_split, &j_whole, abstol = 1e-10);
    }

    let blatter = Blatter::new(&config).with_hardness(1e8);
    let grid = Grid::new(5, 5, 3, 0.0, 0.0, 2e3, 2e3).unwrap();
    let level = level_with_geometry(&blatter, grid, &ice_cap_geometry(&grid), 1.0);
    let x = arbitrary_state(level.num_dofs(2));
    let patches = Patch::partition(&grid, 2, 2).unwrap();
    let whole = [Patch::whole(&grid)];
    let r_whole = assemble_residual(&blatter, &level, &whole, &x).unwrap();
    let r_split = assemble_residual(&blatter, &level, &patches, &x).unwrap();
    assert!((&r_split - &r_whole).amax() <= 1e-10 * r_whole.amax().max(1.0));
    let j_whole = DMatrix::from(&assemble_jacobian(&blatter, &level, &whole, &x).unwrap());
    let j_split = DMatrix::from(&assemble_jacobian(&blatter, &level, &patches, &x).unwrap());
    assert!(scaled_max_difference(&j_split, &j_whole) < 1e-12);
}

#[test]
fn exterior_rows_are_decoupled() {
    let config = SolverConfig::default();
    let blatter = Blatter::new(&config).with_hardness(1e8);
    let grid = Grid::new(5, 5, 3, 0.0, 0.0, 2e3, 2e3).unwrap();
    let level = level_with_geometry(&blatter, grid, &ice_cap_geometry(&grid), 1.0);
    assert_eq!(level.node_type(0, 2), NodeType::Exterior);
    assert_eq!(level.node_type(1, 1), NodeType::Boundary);
    assert_eq!(level.node_type(2, 2), NodeType::Interior);

    let x = arbitrary_state(level.num_dofs(2));
    let jacobian = DMatrix::from(&assemble_jacobian(&blatter, &level, &[Patch::whole(&grid)], &x).unwrap());
    for j in 0..grid.my() {
        for i in 0..grid.mx() {
            if level.node_type(i, j) != NodeType::Exterior {
                continue;
            }
            for k in 0..grid.mz() {
                for c in 0..2 {
                    let row = 2 * grid.node_index(i, j, k) + c;
                    for col in 0..jacobian.ncols() {
                        if col == row {
                            assert!(jacobian[(row, col)] > 0.0);
                        } else {
                            assert_eq!(jacobian[(row, col)], 0.0, "entry ({}, {})", row, col);
                            assert_eq!(jacobian[(col, row)], 0.0, "entry ({}, {})", col, row);
                        }
                    }
                }
            }
        }
    }
}

#[test]
fn pinned_rows_vanish_at_the_boundary_state() {
    let config = SolverConfig::default();
    let blatter = Blatter::new(&config).with_hardness(1e8);
    let grid = Grid::new(5, 5, 3, 0.0, 0.0, 2e3, 2e3).unwrap();
    let level = level_with_geometry(&blatter, grid, &ice_cap_geometry(&grid), 1.0);
    let x = boundary_state(&blatter, &level);
    assert!(x.iter().all(|&value| value == 0.0));

    let residual = assemble_residual(&blatter, &level, &[Patch::whole(&grid)], &x).unwrap();
    for j in 0..grid.my() {
        for i in 0..grid.mx() {
            for k in 0..grid.mz() {
                let row = 2 * grid.node_index(i, j, k);
                if level.node_type(i, j) == NodeType::Exterior {
                    assert_eq!(residual[row], 0.0);
                    assert_eq!(residual[row + 1], 0.0);
                }
            }
        }
    }
    // The surface slopes down in x, so the driving stress loads the interior column
    assert!(residual[2 * grid.node_index(2, 2, 1)].abs() > 0.0);
}

#[test]
fn blatter_jacobian_matches_finite_differences() {
    let config = SolverConfig {
        min_thickness: 0.1,
        grounding_line_quadrature: 4,
        ..SolverConfig::default()
    };
    let blatter = Blatter::new(&config)
        .with_flow_law(IsothermalGlen::new(3.0, 1e-2).unwrap())
        .with_sliding_law(PseudoPlastic::new(0.5, 1.0, 0.1).unwrap())
        .with_hardness(1.0);

    // Unit spacing, an ice-free last column and a floating second column
    let grid = Grid::new(4, 4, 3, 0.0, 0.0, 1.5, 1.5).unwrap();
    let bed = Field2::from_fn(4, 4, |i, j| 0.1 * i as f64 - 0.05 * j as f64);
    let thickness = Field2::from_fn(4, 4, |i, j| if i == 3 { 0.0 } else { 1.0 + 0.1 * j as f64 });
    let floatation = Field2::from_fn(4, 4, |i, _| if i == 1 { 1.0 } else { -1.0 });
    let tauc = Field2::from_element(4, 4, 1.0);
    let geometry = Geometry::new(bed, thickness)
        .with_floatation(floatation)
        .with_tauc(tauc);
    let level = level_with_geometry(&blatter, grid, &geometry, config.min_thickness);
    assert_eq!(level.node_type(3, 0), NodeType::Exterior);

    let x = DVector::from_fn(level.num_dofs(2), |i, _| {
        let t = i as f64;
        if i % 2 == 0 {
            1.0 + 0.3 * (0.9 * t).sin()
        } else {
            -0.5 + 0.2 * (1.3 * t).cos()
        }
    });
    let jacobian = DMatrix::from(&assemble_jacobian(&blatter, &level, &[Patch::whole(&grid)], x.as_slice()).unwrap());
    assert_approx_matrix_eq!(&jacobian, &jacobian.transpose(), abstol = 1e-10);

    let residual = Residual {
        assembler: &blatter,
        level: &level,
    };
    let approximate = approximate_jacobian(residual, &x, 1e-5).unwrap();
    let difference = scaled_max_difference(&approximate, &jacobian);
    assert!(difference < 1e-5, "scaled difference {:e}", difference);
}

#[test]
fn hardness_is_resampled_onto_the_level() {
    let config = SolverConfig::default();
    let blatter = Blatter::new(&config);
    let grid = Grid::new(3, 3, 5, 0.0, 0.0, 1.0, 1.0).unwrap();
    let geometry = Geometry::new(Field2::from_element(2, 2, 0.0), Field2::from_element(2, 2, 10.0));
    // Hardness given on 3 levels, increasing linearly with sigma
    let hardness = Field3::from_fn(2, 2, 3, |_, _, k| 1.0 + k as f64);
    let geometry = geometry.with_hardness(hardness);
    let level = Level::new(0, grid, 1.0);
    let coefficient = blatter.init_coefficient(&level, &geometry).unwrap();
    for k in 0..grid.mz() {
        let expected = 1.0 + 2.0 * grid.sigma(k);
        assert_scalar_eq!(coefficient[(0, 0, k)], expected, comp = abs, tol = 1e-12);
        // Padded columns copy the nearest column
        assert_scalar_eq!(coefficient[(2, 1, k)], expected, comp = abs, tol = 1e-12);
    }

    let too_large = Field3::from_element(4, 4, 3, 1.0);
    assert!(resample_columns(&level, &too_large).is_err());
    let without = Geometry::new(Field2::from_element(3, 3, 0.0), Field2::from_element(3, 3, 1.0));
    let constant = blatter.init_coefficient(&level, &without).unwrap();
    assert!(constant.as_slice().iter().all(|&b| b == constant[(0, 0, 0)]));
}
