use icefem::element::{Element2, Element3, Element3Face};
use icefem::error::GeometryError;
use icefem::field::Field2;
use icefem::grid::{Grid, Patch};
use icefem::quadrature::q13d;
use matrixcompare::assert_scalar_eq;

/// A 3x3x3 grid with unit spacing on `[-1, 1]^2`.
fn unit_grid() -> Grid {
    Grid::new(3, 3, 3, 0.0, 0.0, 1.0, 1.0).unwrap()
}

/// Elevations of an element with a flat base at zero and a top sloping from 1 to 2 in x.
fn sloping_element_z() -> [f64; q13d::N_CHI] {
    q13d::OFFSETS.map(|[di, _, dk]| dk as f64 * (1.0 + di as f64))
}

#[test]
fn element3_weights_sum_to_volume() {
    let grid = unit_grid();
    let mut element = Element3::gauss(&grid, &Patch::whole(&grid), 2, 1).unwrap();
    element.reset(0, 0, 0, &sloping_element_z()).unwrap();
    let volume: f64 = (0..element.n_pts()).map(|q| element.weight(q)).sum();
    assert_scalar_eq!(volume, 1.5, comp = abs, tol = 1e-12);
}

#[test]
fn element3_reproduces_linear_functions() {
    let grid = unit_grid();
    let mut element = Element3::gauss(&grid, &Patch::whole(&grid), 3, 1).unwrap();
    let z = sloping_element_z().map(|z| z - 0.25);
    element.reset(1, 0, 1, &z).unwrap();

    let f = |x: f64, y: f64, z: f64| 1.0 + 2.0 * x - 3.0 * y + 0.5 * z;
    let nodal = [0, 1, 2, 3, 4, 5, 6, 7].map(|n| f(element.x(n), element.y(n), element.z(n)));
    let xs = [0, 1, 2, 3, 4, 5, 6, 7].map(|n| element.x(n));
    let ys = [0, 1, 2, 3, 4, 5, 6, 7].map(|n| element.y(n));
    for q in 0..element.n_pts() {
        let germ = element.evaluate(&nodal, q);
        let (x_q, y_q, z_q) = (
            element.evaluate(&xs, q).val,
            element.evaluate(&ys, q).val,
            element.evaluate(element.nodal_z(), q).val,
        );
        assert_scalar_eq!(germ.val, f(x_q, y_q, z_q), comp = abs, tol = 1e-12);
        assert_scalar_eq!(germ.dx, 2.0, comp = abs, tol = 1e-12);
        assert_scalar_eq!(germ.dy, -3.0, comp = abs, tol = 1e-12);
        assert_scalar_eq!(germ.dz, 0.5, comp = abs, tol = 1e-12);
    }
}

#[test]
fn element3_shape_functions_are_a_partition_of_unity() {
    let grid = unit_grid();
    let mut element = Element3::gauss(&grid, &Patch::whole(&grid), 2, 1).unwrap();
    element.reset(1, 1, 0, &sloping_element_z()).unwrap();
    for q in 0..element.n_pts() {
        let sum = (0..q13d::N_CHI).map(|n| element.chi(q, n).val).sum::<f64>();
        let dx_sum = (0..q13d::N_CHI).map(|n| element.chi(q, n).dx).sum::<f64>();
        let dz_sum = (0..q13d::N_CHI).map(|n| element.chi(q, n).dz).sum::<f64>();
        assert_scalar_eq!(sum, 1.0, comp = abs, tol = 1e-12);
        assert_scalar_eq!(dx_sum, 0.0, comp = abs, tol = 1e-12);
        assert_scalar_eq!(dz_sum, 0.0, comp = abs, tol = 1e-12);
    }
}

#[test]
fn element3_rejects_degenerate_elements() {
    let grid = unit_grid();
    let mut element = Element3::gauss(&grid, &Patch::whole(&grid), 2, 1).unwrap();
    let flat = [0.0; q13d::N_CHI];
    let err = element.reset(1, 0, 1, &flat).unwrap_err();
    let err = err.downcast_ref::<GeometryError>().unwrap();
    assert_eq!(err.element, (1, 0, 1));
    assert!(!(err.determinant > 0.0));

    let inverted = sloping_element_z().map(|z| -z);
    let err = element.reset(0, 0, 0, &inverted).unwrap_err();
    assert!(err.downcast_ref::<GeometryError>().is_some());
}

#[test]
fn element_resets_outside_the_grid_are_errors() {
    let grid = unit_grid();
    let patch = Patch::whole(&grid);
    let mut element = Element3::gauss(&grid, &patch, 2, 1).unwrap();
    let z = sloping_element_z();
    assert!(element.reset(2, 0, 0, &z).is_err());
    assert!(element.reset(0, 2, 0, &z).is_err());
    assert!(element.reset(0, 0, 2, &z).is_err());
    let err = element.reset(5, 5, 5, &z).unwrap_err();
    assert!(err.downcast_ref::<GeometryError>().is_none());

    element.reset(1, 1, 1, &z).unwrap();
    let mut face = Element3Face::gauss(&grid, 2).unwrap();
    assert!(face.reset(q13d::N_FACES, &element).is_err());

    let mut element2 = Element2::gauss(&grid, &patch).unwrap();
    assert!(element2.reset(2, 0).is_err());
    assert!(element2.reset(0, 2).is_err());
    assert!(element2.reset(1, 1).is_ok());
}

#[test]
fn element3_masks_rows_outside_the_patch() {
    let grid = Grid::new(4, 4, 2, 0.0, 0.0, 1.0, 1.0).unwrap();
    let patch = Patch::new(&grid, 0, 2, 0, 4).unwrap();
    let mut element = Element3::gauss(&grid, &patch, 2, 1).unwrap();
    element.reset(1, 0, 0, &sloping_element_z()).unwrap();

    let local: Vec<f64> = (0..q13d::N_CHI).map(|n| n as f64 + 1.0).collect();
    let mut global = vec![0.0; grid.num_nodes()];
    element.add_residual(&local, &mut global).unwrap();
    for n in 0..q13d::N_CHI {
        let node = element.local_to_global(n);
        let value = global[grid.node_index(node.i, node.j, node.k)];
        if node.i < 2 {
            assert_eq!(value, n as f64 + 1.0);
        } else {
            assert_eq!(value, 0.0);
        }
    }

    assert!(element.nodal_values(&global[..4], 0).is_err());
}

#[test]
fn element3_face_normals_and_areas() {
    let grid = unit_grid();
    let mut element = Element3::gauss(&grid, &Patch::whole(&grid), 2, 1).unwrap();
    element.reset(0, 0, 0, &sloping_element_z()).unwrap();
    let mut face = Element3Face::gauss(&grid, 2).unwrap();

    face.reset(q13d::BOTTOM_FACE, &element).unwrap();
    let area: f64 = (0..face.n_pts()).map(|q| face.weight(q)).sum();
    assert_scalar_eq!(area, 1.0, comp = abs, tol = 1e-12);
    for q in 0..face.n_pts() {
        assert_scalar_eq!(face.normal(q).z, -1.0, comp = abs, tol = 1e-12);
    }

    // The top face rises by one over a unit distance in x
    face.reset(5, &element).unwrap();
    let area: f64 = (0..face.n_pts()).map(|q| face.weight(q)).sum();
    assert_scalar_eq!(area, 2f64.sqrt(), comp = abs, tol = 1e-12);
    let s = 0.5 * 2f64.sqrt();
    for q in 0..face.n_pts() {
        let normal = face.normal(q);
        assert_scalar_eq!(normal.x, -s, comp = abs, tol = 1e-12);
        assert_scalar_eq!(normal.y, 0.0, comp = abs, tol = 1e-12);
        assert_scalar_eq!(normal.z, s, comp = abs, tol = 1e-12);
    }

    // The face at x = 1 is a unit square with height 2
    face.reset(1, &element).unwrap();
    let area: f64 = (0..face.n_pts()).map(|q| face.weight(q)).sum();
    assert_scalar_eq!(area, 2.0, comp = abs, tol = 1e-12);
    assert_scalar_eq!(face.normal(0).x, 1.0, comp = abs, tol = 1e-12);

    // Face shape functions vanish on nodes away from the face
    face.reset(q13d::BOTTOM_FACE, &element).unwrap();
    for q in 0..face.n_pts() {
        for n in 4..q13d::N_CHI {
            assert_scalar_eq!(face.chi(q, n), 0.0, comp = abs, tol = 1e-12);
        }
    }
}

#[test]
fn element2_integrates_bilinear_functions() {
    let grid = Grid::new(3, 3, 2, 0.0, 0.0, 1.0, 2.0).unwrap();
    let mut element = Element2::gauss(&grid, &Patch::whole(&grid)).unwrap();
    let field = Field2::from_fn(3, 3, |i, j| grid.x(i) * grid.y(j));
    element.reset(1, 1).unwrap();
    let nodal = element.nodal_values(&field);

    // Element [0, 1] x [0, 2]: the integral of x y is 1/2 * 2 = 1
    let integral: f64 = (0..element.n_pts())
        .map(|q| element.weight(q) * element.evaluate(&nodal, q).val)
        .sum();
    assert_scalar_eq!(integral, 1.0, comp = abs, tol = 1e-12);

    let mut global = Field2::from_element(3, 3, 0.0);
    element.add_contribution(&[1.0, 2.0, 3.0, 4.0], &mut global).unwrap();
    assert_eq!(global[(1, 1)], 1.0);
    assert_eq!(global[(2, 1)], 2.0);
    assert_eq!(global[(2, 2)], 3.0);
    assert_eq!(global[(1, 2)], 4.0);
    assert_eq!(global[(0, 0)], 0.0);
}
