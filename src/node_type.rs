//! Classification of horizontal grid nodes by the ice cover of the elements around them.
//!
//! Classification depends only on the horizontal footprint of the ice: every vertical level
//! of a column shares the type of its horizontal node.
use crate::field::{Field2, NodeType};
use crate::quadrature::q1;

/// Classifies every node of the horizontal grid covered by `thickness`.
///
/// An element is icy if the thickness exceeds `min_thickness` at all four of its nodes. A node
/// incident to four icy elements is [`NodeType::Interior`], a node incident to no icy element
/// is [`NodeType::Exterior`] and all remaining nodes are [`NodeType::Boundary`]. Nodes on the
/// edge of the domain have fewer than four incident elements, so they are never interior.
pub fn classify(thickness: &Field2<f64>, min_thickness: f64) -> Field2<NodeType> {
    let (mx, my) = (thickness.mx(), thickness.my());
    let mut icy_count = Field2::from_element(mx, my, 0u8);

    for j in 0..my.saturating_sub(1) {
        for i in 0..mx.saturating_sub(1) {
            let icy = q1::OFFSETS
                .iter()
                .all(|[di, dj]| thickness[(i + di, j + dj)] > min_thickness);
            if icy {
                for [di, dj] in q1::OFFSETS {
                    icy_count[(i + di, j + dj)] += 1;
                }
            }
        }
    }

    icy_count.map(|&count| match count {
        0 => NodeType::Exterior,
        4 => NodeType::Interior,
        _ => NodeType::Boundary,
    })
}

/// Returns true if all nodes of an element are exterior. Such elements do not contribute
/// to residuals or Jacobians.
pub fn exterior_element(node_type: &[NodeType]) -> bool {
    node_type.iter().all(|&t| t == NodeType::Exterior)
}

/// Returns true if the floatation indicator changes sign between the given nodes, i.e. if
/// they straddle the grounding line.
pub fn grounding_line(floatation: &[f64]) -> bool {
    let floating = floatation.iter().filter(|&&f| f > 0.0).count();
    floating > 0 && floating < floatation.len()
}
