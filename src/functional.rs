//! Squared `L2` norms on the horizontal grid: `J(x) = ∫ x^2 dA` for scalar fields and
//! `J(v) = ∫ |v|^2 dA` for vector fields.
//!
//! Used as misfit or regularization terms by inverse problems. All methods are collective.
use crate::comm::Communicator;
use crate::element::Element2;
use crate::field::Field2;
use crate::grid::{Grid, Patch};
use crate::quadrature::QuadratureError;
use eyre::WrapErr;
use nalgebra::Vector2;

pub struct L2NormFunctional<'a, C: ?Sized> {
    grid: Grid,
    patch: Patch,
    comm: &'a C,
    element: Element2,
}

/// Elements whose lower-left node is owned by `patch`, so that every element is visited by
/// exactly one process.
fn owned_elements(grid: &Grid, patch: &Patch) -> Vec<(usize, usize)> {
    let (mx, my) = (grid.mx(), grid.my());
    let xs = patch.owned_x();
    patch
        .owned_y()
        .filter(|&j| j + 1 < my)
        .flat_map(|j| xs.clone().filter(move |&i| i + 1 < mx).map(move |i| (i, j)))
        .collect()
}

/// Accumulates `2 ∫ x ψ_k dA` into `gradient` for every element touching the patch.
fn add_gradient(
    element: &mut Element2,
    grid: &Grid,
    patch: &Patch,
    x: &Field2<f64>,
    gradient: &mut Field2<f64>,
) -> eyre::Result<()> {
    let (xs, ys) = (patch.elements_x(grid), patch.elements_y(grid));
    for j in ys {
        for i in xs.clone() {
            element.reset(i, j)?;
            let nodal = element.nodal_values(x);
            let mut local = [0.0; 4];
            for q in 0..element.n_pts() {
                let w = element.weight(q);
                let x_q = element.evaluate(&nodal, q).val;
                for (k, g) in local.iter_mut().enumerate() {
                    *g += 2.0 * w * x_q * element.chi(q, k).val;
                }
            }
            element
                .add_contribution(&local, gradient)
                .wrap_err_with(|| format!("failed to add gradient of element ({}, {})", i, j))?;
        }
    }
    Ok(())
}

impl<'a, C: Communicator + ?Sized> L2NormFunctional<'a, C> {
    pub fn new(grid: &Grid, patch: &Patch, comm: &'a C) -> Result<Self, QuadratureError> {
        Ok(Self {
            grid: *grid,
            patch: *patch,
            comm,
            element: Element2::gauss(grid, patch)?,
        })
    }

    /// `J(x)`.
    pub fn value_at(&mut self, x: &Field2<f64>) -> eyre::Result<f64> {
        self.dot(x, x)
    }

    /// The inner product `∫ a b dA` associated with the norm.
    pub fn dot(&mut self, a: &Field2<f64>, b: &Field2<f64>) -> eyre::Result<f64> {
        let mut value = 0.0;
        for (i, j) in owned_elements(&self.grid, &self.patch) {
            self.element.reset(i, j)?;
            let (a_nodal, b_nodal) = (self.element.nodal_values(a), self.element.nodal_values(b));
            for q in 0..self.element.n_pts() {
                let a_q = self.element.evaluate(&a_nodal, q).val;
                let b_q = self.element.evaluate(&b_nodal, q).val;
                value += self.element.weight(q) * a_q * b_q;
            }
        }
        Ok(self.comm.all_reduce_sum(value))
    }

    /// The gradient of `J` at `x` with respect to the nodal values, on the nodes owned by the
    /// patch. Other entries of the result are zero.
    pub fn gradient_at(&mut self, x: &Field2<f64>) -> eyre::Result<Field2<f64>> {
        let mut gradient = Field2::from_element(self.grid.mx(), self.grid.my(), 0.0);
        add_gradient(&mut self.element, &self.grid, &self.patch, x, &mut gradient)?;
        Ok(gradient)
    }
}

/// The squared `L2` norm of a horizontal vector field, such as a surface velocity misfit.
pub struct L2NormFunctionalV<'a, C: ?Sized> {
    grid: Grid,
    patch: Patch,
    comm: &'a C,
    element: Element2,
}

impl<'a, C: Communicator + ?Sized> L2NormFunctionalV<'a, C> {
    pub fn new(grid: &Grid, patch: &Patch, comm: &'a C) -> Result<Self, QuadratureError> {
        Ok(Self {
            grid: *grid,
            patch: *patch,
            comm,
            element: Element2::gauss(grid, patch)?,
        })
    }

    /// `J(v)`.
    pub fn value_at(&mut self, v: &Field2<Vector2<f64>>) -> eyre::Result<f64> {
        self.dot(v, v)
    }

    /// The inner product `∫ a · b dA` associated with the norm.
    pub fn dot(&mut self, a: &Field2<Vector2<f64>>, b: &Field2<Vector2<f64>>) -> eyre::Result<f64> {
        let mut value = 0.0;
        for (i, j) in owned_elements(&self.grid, &self.patch) {
            self.element.reset(i, j)?;
            let (a_nodal, b_nodal) = (self.element.nodal_values(a), self.element.nodal_values(b));
            for component in 0..2 {
                let a_c = a_nodal.map(|a_n| a_n[component]);
                let b_c = b_nodal.map(|b_n| b_n[component]);
                for q in 0..self.element.n_pts() {
                    let a_q = self.element.evaluate(&a_c, q).val;
                    let b_q = self.element.evaluate(&b_c, q).val;
                    value += self.element.weight(q) * a_q * b_q;
                }
            }
        }
        Ok(self.comm.all_reduce_sum(value))
    }

    /// The gradient of `J` at `v` with respect to both components of the nodal values, on
    /// the nodes owned by the patch. Other entries of the result are zero.
    pub fn gradient_at(&mut self, v: &Field2<Vector2<f64>>) -> eyre::Result<Field2<Vector2<f64>>> {
        let (mx, my) = (self.grid.mx(), self.grid.my());
        let mut gradients = [0, 1].map(|_| Field2::from_element(mx, my, 0.0));
        for (component, gradient) in gradients.iter_mut().enumerate() {
            let x = v.map(|v_n| v_n[component]);
            add_gradient(&mut self.element, &self.grid, &self.patch, &x, gradient)
                .wrap_err_with(|| format!("failed to compute gradient of component {}", component))?;
        }
        let [gu, gv] = gradients;
        Ok(Field2::from_fn(mx, my, |i, j| Vector2::new(gu[(i, j)], gv[(i, j)])))
    }
}
