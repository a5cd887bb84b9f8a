use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::domain::velocity::Arrangement;
use crate::error::SolverError;
use crate::linear_solver::SolverConfig;
use crate::numerical::advection::FluxLimiter;
use crate::numerical::assembly::FaceAveraging;
use crate::solver::Discretization;

/// Block of solid cells, `min` inclusive and `max` exclusive cell indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObstacleBox {
    pub min: [usize; 3],
    pub max: [usize; 3],
}

impl ObstacleBox {
    pub fn contains(&self, (i, j, k): (usize, usize, usize)) -> bool {
        [i, j, k]
            .iter()
            .zip(self.min.iter().zip(self.max.iter()))
            .all(|(&c, (&lo, &hi))| lo <= c && c < hi)
    }
}

/// Channel with a parabolic inflow on the west side and an outlet on the east.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelCase {
    pub arrangement: Arrangement,
    pub resolution: [usize; 3],
    pub lengths: [f64; 3],
    /// Mean velocity of the parabolic inflow profile.
    pub inflow_mean: f64,
    pub density: f64,
    pub viscosity: f64,
    pub obstacle: Option<ObstacleBox>,
}

impl Default for ChannelCase {
    fn default() -> Self {
        Self {
            arrangement: Arrangement::Collocated,
            resolution: [128, 16, 4],
            lengths: [1.0, 0.125, 0.125],
            inflow_mean: 0.1,
            density: 1.2,
            viscosity: 1.8e-5,
            obstacle: Some(ObstacleBox {
                min: [32, 0, 0],
                max: [44, 12, 4],
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub dt: f64,
    pub steps: usize,
    pub output_path: Option<String>,
    pub output_frequency: Option<usize>,
    pub solver: SolverConfig,
    pub momentum_limiter: FluxLimiter,
    pub scalar_limiter: FluxLimiter,
    pub face_averaging: FaceAveraging,
    pub case: ChannelCase,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        let disc = Discretization::default();
        Self {
            dt: 0.002,
            steps: 1200,
            output_path: None,
            output_frequency: Some(120),
            solver: SolverConfig::default(),
            momentum_limiter: disc.momentum_limiter,
            scalar_limiter: disc.scalar_limiter,
            face_averaging: disc.averaging,
            case: ChannelCase::default(),
        }
    }
}

impl SimulationConfig {
    /// Reads and validates a configuration file. Missing fields take their
    /// default values.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, SolverError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let config: SimulationConfig = serde_json::from_str(&text)?;
        config.validate()?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn discretization(&self) -> Discretization {
        Discretization {
            momentum_limiter: self.momentum_limiter,
            scalar_limiter: self.scalar_limiter,
            averaging: self.face_averaging,
        }
    }

    pub fn validate(&self) -> Result<(), SolverError> {
        if !(self.dt.is_finite() && self.dt > 0.0) {
            return Err(SolverError::InvalidParameter(format!(
                "time step must be positive, got {}",
                self.dt
            )));
        }
        self.solver.validate()?;

        let case = &self.case;
        if case.resolution.iter().any(|&n| n < 2) {
            return Err(SolverError::InvalidParameter(format!(
                "grid must have at least 2 cells per axis, got {:?}",
                case.resolution
            )));
        }
        if case.lengths.iter().any(|&l| !(l > 0.0)) {
            return Err(SolverError::InvalidParameter(format!(
                "domain lengths must be positive, got {:?}",
                case.lengths
            )));
        }
        if !(case.density > 0.0) || case.viscosity < 0.0 {
            return Err(SolverError::InvalidParameter(format!(
                "density must be positive and viscosity non-negative, got {} and {}",
                case.density, case.viscosity
            )));
        }
        if let Some(b) = &case.obstacle {
            let inside = (0..3).all(|a| b.min[a] < b.max[a] && b.max[a] <= case.resolution[a]);
            if !inside {
                return Err(SolverError::InvalidParameter(format!(
                    "obstacle {:?} does not fit a {:?} grid",
                    b, case.resolution
                )));
            }
        }
        Ok(())
    }
}
