use icefem::field::{Field2, NodeType};
use icefem::node_type::classify;
use icefem::proptest::grid_with_thickness;
use proptest::prelude::*;

#[test]
fn uniform_ice_cover() {
    let thickness = Field2::from_element(4, 3, 100.0);
    let node_type = classify(&thickness, 1.0);
    for j in 0..3 {
        for i in 0..4 {
            let on_edge = i == 0 || j == 0 || i == 3 || j == 2;
            let expected = if on_edge { NodeType::Boundary } else { NodeType::Interior };
            assert_eq!(node_type[(i, j)], expected, "node ({}, {})", i, j);
        }
    }
}

#[test]
fn ice_free_domain_is_exterior() {
    let thickness = Field2::from_element(3, 3, 0.0);
    let node_type = classify(&thickness, 1.0);
    assert!(node_type.as_slice().iter().all(|&t| t == NodeType::Exterior));
}

#[test]
fn thickness_at_threshold_is_ice_free() {
    let thickness = Field2::from_element(2, 2, 1.0);
    let node_type = classify(&thickness, 1.0);
    assert!(node_type.as_slice().iter().all(|&t| t == NodeType::Exterior));

    let thickness = Field2::from_element(2, 2, 1.0 + 1e-12);
    let node_type = classify(&thickness, 1.0);
    assert!(node_type.as_slice().iter().all(|&t| t == NodeType::Boundary));
}

#[test]
fn ice_cap_surrounded_by_ice_free_ring() {
    // Ice on the inner 3x3 block of a 5x5 grid
    let thickness = Field2::from_fn(5, 5, |i, j| {
        let inner = (1..4).contains(&i) && (1..4).contains(&j);
        if inner {
            500.0
        } else {
            0.0
        }
    });
    let node_type = classify(&thickness, 1.0);

    #[rustfmt::skip]
    let expected = {
        use NodeType::*;
        [
            [Exterior, Exterior, Exterior, Exterior, Exterior],
            [Exterior, Boundary, Boundary, Boundary, Exterior],
            [Exterior, Boundary, Interior, Boundary, Exterior],
            [Exterior, Boundary, Boundary, Boundary, Exterior],
            [Exterior, Exterior, Exterior, Exterior, Exterior],
        ]
    };
    for j in 0..5 {
        for i in 0..5 {
            assert_eq!(node_type[(i, j)], expected[j][i], "node ({}, {})", i, j);
        }
    }
}

proptest! {
    #[test]
    fn classification_is_repeatable((_grid, thickness) in grid_with_thickness(8, 2), min_thickness in 0.0..2e3) {
        let first = classify(&thickness, min_thickness);
        let second = classify(&thickness, min_thickness);
        prop_assert_eq!(&first, &second);
        // A copy of the input classifies the same way
        let copy = Field2::from_vec(thickness.mx(), thickness.my(), thickness.as_slice().to_vec()).unwrap();
        prop_assert_eq!(classify(&copy, min_thickness), first);
    }

    #[test]
    fn thin_nodes_are_exterior((grid, thickness) in grid_with_thickness(8, 2)) {
        let min_thickness = 1.0;
        let node_type = classify(&thickness, min_thickness);
        for j in 0..grid.my() {
            for i in 0..grid.mx() {
                if thickness[(i, j)] <= min_thickness {
                    prop_assert_eq!(node_type[(i, j)], NodeType::Exterior);
                }
            }
        }
    }

    #[test]
    fn neighbors_of_interior_nodes_are_icy((grid, thickness) in grid_with_thickness(8, 2)) {
        let node_type = classify(&thickness, 1.0);
        for j in 0..grid.my() {
            for i in 0..grid.mx() {
                if node_type[(i, j)] != NodeType::Interior {
                    continue;
                }
                prop_assert!(i > 0 && j > 0 && i + 1 < grid.mx() && j + 1 < grid.my());
                for nj in j - 1..=j + 1 {
                    for ni in i - 1..=i + 1 {
                        prop_assert_ne!(node_type[(ni, nj)], NodeType::Exterior);
                    }
                }
            }
        }
    }

    #[test]
    fn thicker_ice_never_shrinks_the_cover((_grid, thickness) in grid_with_thickness(8, 2)) {
        let rank = |t: NodeType| match t {
            NodeType::Exterior => 0,
            NodeType::Boundary => 1,
            NodeType::Interior => 2,
        };
        let thicker = thickness.map(|h| h + 500.0);
        let before = classify(&thickness, 1.0);
        let after = classify(&thicker, 1.0);
        for (&b, &a) in before.as_slice().iter().zip(after.as_slice()) {
            prop_assert!(rank(a) >= rank(b));
        }
    }
}
