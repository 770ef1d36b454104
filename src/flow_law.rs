//! Ice flow laws: the effective viscosity as a function of ice hardness and strain rate.
use crate::error::{require_non_negative, require_positive, SetupError};
use serde::{Deserialize, Serialize};

/// A constitutive law giving the effective viscosity of ice.
pub trait FlowLaw {
    /// Computes the effective viscosity `eta` and its derivative with respect to `gamma`.
    ///
    /// Here `hardness` is the ice hardness `B` and `gamma` the strain rate invariant
    /// $$
    /// \gamma = u_x^2 + v_y^2 + u_x v_y + \frac{1}{4}\left[(u_y + v_x)^2 + u_z^2 + v_z^2\right]
    /// $$
    /// of the first order (Blatter-Pattyn) approximation.
    fn effective_viscosity(&self, hardness: f64, gamma: f64) -> (f64, f64);
}

/// Glen's flow law with a fixed exponent.
///
/// The effective viscosity is
/// $$
/// \eta = \frac{B}{2} (\gamma + \epsilon^2)^{\frac{1 - n}{2n}},
/// $$
/// where the regularization $\epsilon$ keeps it bounded at zero strain rate.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IsothermalGlen {
    /// Glen exponent `n`.
    pub exponent: f64,
    /// Strain rate regularization `epsilon` (1/s).
    pub regularization: f64,
}

impl Default for IsothermalGlen {
    fn default() -> Self {
        Self {
            exponent: 3.0,
            regularization: 1e-5 / crate::config::SECONDS_PER_YEAR,
        }
    }
}

impl IsothermalGlen {
    pub fn new(exponent: f64, regularization: f64) -> Result<Self, SetupError> {
        require_positive("exponent", exponent)?;
        require_non_negative("regularization", regularization)?;
        Ok(Self {
            exponent,
            regularization,
        })
    }

    /// The Newtonian (`n = 1`) law, for which `eta = B / 2` regardless of the strain rate.
    pub fn linear() -> Self {
        Self {
            exponent: 1.0,
            regularization: 0.0,
        }
    }
}

impl FlowLaw for IsothermalGlen {
    fn effective_viscosity(&self, hardness: f64, gamma: f64) -> (f64, f64) {
        let n = self.exponent;
        let power = (1.0 - n) / (2.0 * n);
        let s = gamma + self.regularization * self.regularization;
        if power == 0.0 {
            return (0.5 * hardness, 0.0);
        }
        let eta = 0.5 * hardness * s.powf(power);
        (eta, eta * power / s)
    }
}
