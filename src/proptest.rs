//! `proptest` strategies for grids and geometry fields.
use crate::field::Field2;
use crate::grid::Grid;
use ::proptest::collection::vec;
use ::proptest::prelude::*;

/// Grids with `2..=max_nodes` nodes in each horizontal direction, `mz` nodes per column and
/// moderate extents.
pub fn grid(max_nodes: usize, mz: usize) -> impl Strategy<Value = Grid> {
    (2..=max_nodes, 2..=max_nodes, -1e3..1e3, -1e3..1e3, 1.0..1e4, 1.0..1e4).prop_map(
        move |(mx, my, x0, y0, lx, ly)| {
            Grid::new(mx, my, mz, x0, y0, lx, ly).expect("strategy only produces valid grids")
        },
    )
}

/// Thickness fields on `grid` in which roughly a third of the nodes are ice-free.
pub fn thickness(grid: &Grid) -> impl Strategy<Value = Field2<f64>> {
    let (mx, my) = (grid.mx(), grid.my());
    vec(prop_oneof![Just(0.0), 0.0..1e3, 1e3..4e3], mx * my)
        .prop_map(move |data| Field2::from_vec(mx, my, data).expect("length matches the grid"))
}

/// A grid together with a thickness field on it.
pub fn grid_with_thickness(max_nodes: usize, mz: usize) -> impl Strategy<Value = (Grid, Field2<f64>)> {
    grid(max_nodes, mz).prop_flat_map(|grid| (Just(grid), thickness(&grid)))
}
