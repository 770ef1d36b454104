use icefem::quadrature::{q1, q13d, BoundaryQuadrature2, Germ, Quadrature2};
use matrixcompare::assert_scalar_eq;
use util::assert_panics;

const DX: f64 = 2.0;
const DY: f64 = 0.5;

/// Physical position of node `k` of the cell with its lower-left corner at the origin.
fn node_position(k: usize) -> [f64; 2] {
    let [i, j] = q1::OFFSETS[k];
    [i as f64 * DX, j as f64 * DY]
}

fn linear(x: f64, y: f64) -> f64 {
    3.0 * x - 2.0 * y + 1.0
}

#[test]
fn q1_functions_are_nodal_and_sum_to_one() {
    for k in 0..q1::N_CHI {
        for (m, node) in q1::NODES.iter().enumerate() {
            let expected = if k == m { 1.0 } else { 0.0 };
            assert_eq!(q1::chi(k, *node).val, expected);
        }
    }
    let point = [0.3, -0.7];
    let sum: f64 = (0..q1::N_CHI).map(|k| q1::chi(k, point).val).sum();
    assert_scalar_eq!(sum, 1.0, comp = abs, tol = 1e-14);

    let point = [0.1, 0.2, -0.9];
    let germs: Vec<_> = (0..q13d::N_CHI).map(|k| q13d::chi(k, point)).collect();
    assert_scalar_eq!(germs.iter().map(|g| g.val).sum::<f64>(), 1.0, comp = abs, tol = 1e-14);
    assert_scalar_eq!(germs.iter().map(|g| g.dz).sum::<f64>(), 0.0, comp = abs, tol = 1e-14);
}

#[test]
fn gauss_rule_reproduces_linear_functions() {
    let quadrature = Quadrature2::q1_gauss(2, DX, DY).unwrap();
    assert_eq!(quadrature.n_pts(), 4);
    let area: f64 = quadrature.weights().iter().sum();
    assert_scalar_eq!(area, DX * DY, comp = abs, tol = 1e-14);

    for (q, [xi, eta]) in quadrature.points().iter().enumerate() {
        let (mut value, mut dx, mut dy) = (0.0, 0.0, 0.0);
        for k in 0..q1::N_CHI {
            let [x, y] = node_position(k);
            let germ = quadrature.chi(q, k);
            value += linear(x, y) * germ.val;
            dx += linear(x, y) * germ.dx;
            dy += linear(x, y) * germ.dy;
        }
        let (x, y) = (0.5 * (xi + 1.0) * DX, 0.5 * (eta + 1.0) * DY);
        assert_scalar_eq!(value, linear(x, y), comp = abs, tol = 1e-12);
        assert_scalar_eq!(dx, 3.0, comp = abs, tol = 1e-12);
        assert_scalar_eq!(dy, -2.0, comp = abs, tol = 1e-12);
    }
}

#[test]
fn q0_rule_selects_one_quadrant_per_point() {
    let quadrature = Quadrature2::q0_uniform(10, DX, DY).unwrap();
    assert_eq!(quadrature.n_pts(), 100);
    let area: f64 = quadrature.weights().iter().sum();
    assert_scalar_eq!(area, DX * DY, comp = abs, tol = 1e-12);

    let mut quadrant_weights = [0.0; q1::N_CHI];
    for q in 0..quadrature.n_pts() {
        let values: Vec<f64> = (0..q1::N_CHI).map(|k| quadrature.chi(q, k).val).collect();
        assert_eq!(values.iter().sum::<f64>(), 1.0);
        for k in 0..q1::N_CHI {
            assert_eq!(quadrature.chi(q, k).dx, 0.0);
            quadrant_weights[k] += values[k] * quadrature.weights()[q];
        }
    }
    for weight in quadrant_weights {
        assert_scalar_eq!(weight, 0.25 * DX * DY, comp = abs, tol = 1e-12);
    }
}

#[test]
fn p1_rules_reproduce_linear_functions_on_each_triangle() {
    for n in 0..q1::N_CHI {
        let quadrature = Quadrature2::p1(n, DX, DY).unwrap();
        assert_eq!(quadrature.n_pts(), 3);
        let area: f64 = quadrature.weights().iter().sum();
        assert_scalar_eq!(area, 0.5 * DX * DY, comp = abs, tol = 1e-14);

        for (q, [xi, eta]) in quadrature.points().iter().enumerate() {
            // The node opposite to the right angle is not a vertex of the triangle
            let opposite = (n + 2) % q1::N_CHI;
            assert_eq!(*quadrature.chi(q, opposite), Germ::default());

            let (mut value, mut dx, mut dy) = (0.0, 0.0, 0.0);
            for k in 0..q1::N_CHI {
                let [x, y] = node_position(k);
                let germ = quadrature.chi(q, k);
                value += linear(x, y) * germ.val;
                dx += linear(x, y) * germ.dx;
                dy += linear(x, y) * germ.dy;
            }
            let (x, y) = (0.5 * (xi + 1.0) * DX, 0.5 * (eta + 1.0) * DY);
            assert_scalar_eq!(value, linear(x, y), comp = abs, tol = 1e-12);
            assert_scalar_eq!(dx, 3.0, comp = abs, tol = 1e-12);
            assert_scalar_eq!(dy, -2.0, comp = abs, tol = 1e-12);
        }
    }
    assert_panics!(Quadrature2::p1(4, DX, DY));
}

#[test]
fn boundary_rule_integrates_side_lengths() {
    let quadrature = BoundaryQuadrature2::new(DX, DY).unwrap();
    let lengths = [DX, DY, DX, DY];
    for (side, length) in lengths.iter().enumerate() {
        let total: f64 = (0..quadrature.n_pts()).map(|q| quadrature.weight(side, q)).sum();
        assert_scalar_eq!(total, *length, comp = abs, tol = 1e-14);

        // Only the two nodes of the side are non-zero on it
        let [a, b] = q1::SIDE_NODES[side];
        for q in 0..quadrature.n_pts() {
            for k in 0..q1::N_CHI {
                let value = quadrature.chi(side, q, k).val;
                if k == a || k == b {
                    assert!(value > 0.0);
                } else {
                    assert_scalar_eq!(value, 0.0, comp = abs, tol = 1e-14);
                }
            }
        }
    }
    assert_eq!(quadrature.normal(1), [1.0, 0.0]);
}
