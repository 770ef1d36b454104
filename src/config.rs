//! Solver configuration.
//!
//! Callers build a [`SolverConfig`] directly, or deserialize one with any `serde` format.
//! All quantities are in SI units.
use crate::error::{require_non_negative, require_positive, SetupError};
use serde::{Deserialize, Serialize};

/// Seconds per year, used to express velocity scales given in m/yr.
pub const SECONDS_PER_YEAR: f64 = 3.15569259747e7;

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewtonConfig {
    pub rtol: f64,
    pub atol: f64,
    pub max_iterations: usize,
}

impl Default for NewtonConfig {
    fn default() -> Self {
        Self {
            rtol: 1e-8,
            atol: 1e-12,
            max_iterations: 50,
        }
    }
}

/// Settings of the multigrid-preconditioned conjugate gradient solver.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LinearConfig {
    pub rtol: f64,
    pub max_iterations: usize,
    /// Gauss-Seidel sweeps before and after each coarse grid correction.
    pub smoothing_steps: usize,
}

impl Default for LinearConfig {
    fn default() -> Self {
        Self {
            rtol: 1e-10,
            max_iterations: 500,
            smoothing_steps: 2,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PhysicalConstants {
    /// kg / m^3
    pub ice_density: f64,
    /// kg / m^3
    pub sea_water_density: f64,
    /// m / s^2
    pub gravity: f64,
    /// m
    pub sea_level: f64,
}

impl Default for PhysicalConstants {
    fn default() -> Self {
        Self {
            ice_density: 910.0,
            sea_water_density: 1028.0,
            gravity: 9.81,
            sea_level: 0.0,
        }
    }
}

impl PhysicalConstants {
    /// The floatation indicator `rho_w (z_sl - b) - rho_i H`. Ice is grounded where it is not positive.
    pub fn floatation(&self, bed: f64, thickness: f64) -> f64 {
        self.sea_water_density * (self.sea_level - bed) - self.ice_density * thickness
    }

    pub fn validate(&self) -> Result<(), SetupError> {
        require_positive("ice_density", self.ice_density)?;
        require_positive("sea_water_density", self.sea_water_density)?;
        require_non_negative("gravity", self.gravity)?;
        if !self.sea_level.is_finite() {
            return Err(SetupError::InvalidParameter {
                name: "sea_level",
                value: self.sea_level,
            });
        }
        Ok(())
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Number of nodes in each vertical column, before padding.
    pub mz: usize,
    /// Number of coarsenings of the multigrid hierarchy.
    pub n_levels: usize,
    /// Ratio of fine to coarse element counts in each coarsened direction.
    pub coarsening_factor: usize,
    /// If false, only the vertical direction is coarsened.
    pub coarsen_horizontally: bool,
    /// Ice thinner than this is treated as ice-free. Also the smallest column height used to
    /// place nodes, so it must be positive.
    pub min_thickness: f64,
    pub newton: NewtonConfig,
    pub linear: LinearConfig,
    /// Points per direction of the Gauss rule used for volume integrals.
    pub volume_quadrature: usize,
    /// Points per direction of the uniform rule used on basal faces crossing the grounding line.
    pub grounding_line_quadrature: usize,
    /// Multiplier of the penalty used at Dirichlet and exterior nodes.
    pub dirichlet_scale: f64,
    pub constants: PhysicalConstants,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            mz: 5,
            n_levels: 2,
            coarsening_factor: 2,
            coarsen_horizontally: true,
            min_thickness: 1.0,
            newton: NewtonConfig::default(),
            linear: LinearConfig::default(),
            volume_quadrature: 2,
            grounding_line_quadrature: 10,
            dirichlet_scale: 1.0,
            constants: PhysicalConstants::default(),
        }
    }
}

impl SolverConfig {
    pub fn validate(&self) -> Result<(), SetupError> {
        if self.mz < 2 {
            return Err(SetupError::GridTooSmall {
                dimension: "z",
                nodes: self.mz,
                minimum: 2,
            });
        }
        if self.coarsening_factor < 2 {
            return Err(SetupError::InvalidParameter {
                name: "coarsening_factor",
                value: self.coarsening_factor as f64,
            });
        }
        require_positive("min_thickness", self.min_thickness)?;
        require_positive("dirichlet_scale", self.dirichlet_scale)?;
        require_positive("newton.rtol", self.newton.rtol)?;
        require_non_negative("newton.atol", self.newton.atol)?;
        require_positive("linear.rtol", self.linear.rtol)?;
        if self.linear.max_iterations == 0 {
            return Err(SetupError::InvalidParameter {
                name: "linear.max_iterations",
                value: 0.0,
            });
        }
        if self.volume_quadrature == 0 {
            return Err(SetupError::InvalidParameter {
                name: "volume_quadrature",
                value: 0.0,
            });
        }
        if self.grounding_line_quadrature == 0 {
            return Err(SetupError::InvalidParameter {
                name: "grounding_line_quadrature",
                value: 0.0,
            });
        }
        self.constants.validate()
    }
}
