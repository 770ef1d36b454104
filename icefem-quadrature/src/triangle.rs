//! Rules for the reference triangle with vertices `(0, 0)`, `(1, 0)` and `(0, 1)`.

use crate::Rule;

/// The symmetric 3-point rule of degree 2.
///
/// Points are `(2/3, 1/6)`, `(1/6, 2/3)` and `(1/6, 1/6)`, each with weight `1/6`.
pub fn triangle_3() -> Rule<2> {
    let a = 2.0 / 3.0;
    let b = 1.0 / 6.0;
    (vec![b; 3], vec![[a, b], [b, a], [b, b]])
}
