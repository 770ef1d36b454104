//! Basal sliding laws.
use crate::config::SECONDS_PER_YEAR;
use crate::error::{require_non_negative, require_positive, SetupError};
use serde::{Deserialize, Serialize};

/// A sliding law giving the basal drag coefficient `beta`, so that the basal shear stress is
/// `tau_b = -beta u`.
pub trait SlidingLaw {
    /// Computes `beta` and its derivative with respect to `alpha = |u|^2 / 2` for the basal
    /// velocity `(u, v)` and the yield stress `tauc`.
    fn drag_with_derivative(&self, tauc: f64, u: f64, v: f64) -> (f64, f64);
}

/// The pseudo-plastic sliding law
/// $$
/// \beta = \frac{\tau_c}{u_{\text{thr}}^q} (|u|^2 + \epsilon^2)^{\frac{q - 1}{2}}.
/// $$
///
/// With `q = 1` this is linear sliding, small `q` approximates plastic sliding.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PseudoPlastic {
    /// Exponent `q`.
    pub exponent: f64,
    /// Threshold speed `u_thr` (m/s).
    pub threshold_speed: f64,
    /// Speed regularization `epsilon` (m/s).
    pub regularization: f64,
}

impl Default for PseudoPlastic {
    fn default() -> Self {
        Self {
            exponent: 0.25,
            threshold_speed: 100.0 / SECONDS_PER_YEAR,
            regularization: 0.01 / SECONDS_PER_YEAR,
        }
    }
}

impl PseudoPlastic {
    pub fn new(exponent: f64, threshold_speed: f64, regularization: f64) -> Result<Self, SetupError> {
        require_non_negative("exponent", exponent)?;
        require_positive("threshold_speed", threshold_speed)?;
        require_non_negative("regularization", regularization)?;
        Ok(Self {
            exponent,
            threshold_speed,
            regularization,
        })
    }

    /// Linear sliding, `beta = tauc / u_thr`.
    pub fn linear(threshold_speed: f64) -> Self {
        Self {
            exponent: 1.0,
            threshold_speed,
            regularization: 0.0,
        }
    }
}

impl SlidingLaw for PseudoPlastic {
    fn drag_with_derivative(&self, tauc: f64, u: f64, v: f64) -> (f64, f64) {
        let q = self.exponent;
        let s = u * u + v * v + self.regularization * self.regularization;
        let scale = tauc / self.threshold_speed.powf(q);
        if q == 1.0 {
            return (scale, 0.0);
        }
        if s == 0.0 {
            return (0.0, 0.0);
        }
        let beta = scale * s.powf(0.5 * (q - 1.0));
        (beta, (q - 1.0) * beta / s)
    }
}
