use std::str::FromStr;

use ndarray::{Array3, ArrayView1, ArrayViewMut1, Zip};
use serde::{Deserialize, Serialize};

use crate::domain::grid3d::{Axis, Grid3D};
use crate::domain::unknown::Unknown;
use crate::domain::velocity::VelocityTriple;
use crate::error::SolverError;
use crate::numerical::stencil::{avg, avg_to, dif, face_property, face_spacing};

/// TVD flux limiter `psi(r)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FluxLimiter {
    Upwind,
    Minmod,
    Superbee,
    VanLeer,
    Koren,
}

impl FluxLimiter {
    pub fn psi(self, r: f64) -> f64 {
        match self {
            FluxLimiter::Upwind => 0.0,
            FluxLimiter::Minmod => r.min(1.0).max(0.0),
            FluxLimiter::Superbee => 0.0_f64.max((2.0 * r).min(1.0)).max(r.min(2.0)),
            FluxLimiter::VanLeer => (r + r.abs()) / (1.0 + r.abs()),
            FluxLimiter::Koren => (2.0 * r).min((1.0 + 2.0 * r) / 3.0).min(2.0).max(0.0),
        }
    }
}

impl FromStr for FluxLimiter {
    type Err = SolverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "upwind" => Ok(FluxLimiter::Upwind),
            "minmod" => Ok(FluxLimiter::Minmod),
            "superbee" => Ok(FluxLimiter::Superbee),
            "vanleer" | "van_leer" => Ok(FluxLimiter::VanLeer),
            "koren" => Ok(FluxLimiter::Koren),
            other => Err(SolverError::InvalidParameter(format!(
                "unknown flux limiter '{}'",
                other
            ))),
        }
    }
}

const FLAT: f64 = 1e-12;

/// Limited face values along one lane.
///
/// `phi` holds the node values including both boundary values, `flux` and
/// `courant` hold one entry per face between consecutive nodes. The outermost
/// faces use plain upwinding.
fn limit_lane(
    phi: ArrayView1<'_, f64>,
    flux: ArrayView1<'_, f64>,
    courant: ArrayView1<'_, f64>,
    mut out: ArrayViewMut1<'_, f64>,
    limiter: FluxLimiter,
) {
    let faces = flux.len();
    for f in 0..faces {
        let forward = flux[f] >= 0.0;
        let (c, d) = if forward {
            (phi[f], phi[f + 1])
        } else {
            (phi[f + 1], phi[f])
        };
        let far = if forward {
            f.checked_sub(1).map(|u| phi[u])
        } else {
            phi.get(f + 2).copied()
        };

        out[f] = match far {
            Some(u) if f > 0 && f + 1 < faces && (d - c).abs() > FLAT => {
                let r = (c - u) / (d - c);
                let blend = (1.0 - courant[f].abs()).max(0.0);
                c + 0.5 * limiter.psi(r) * blend * (d - c)
            }
            _ => c,
        };
    }
}

/// Velocity normal to the control-volume faces of `phi` along `axis`,
/// including the domain boundary faces.
fn face_velocity(
    phi: &Unknown,
    axis: Axis,
    uvwf: &VelocityTriple,
) -> Result<Array3<f64>, SolverError> {
    let ext = uvwf.component(axis).extended(axis)?;
    if phi.pos.staggered_axis() == Some(axis) {
        Ok(avg(axis, &ext))
    } else {
        Ok(avg_to(phi.pos, &ext))
    }
}

/// Net convective outflow of `rho * phi` from each control volume of `phi`.
///
/// Fluxes are built from the face velocity triple `uvwf`; the result has the
/// resolution of `phi` and is subtracted from the right-hand side.
pub fn advection(
    rho: &Array3<f64>,
    phi: &Unknown,
    uvwf: &VelocityTriple,
    grid: &Grid3D,
    dt: f64,
    limiter: FluxLimiter,
) -> Result<Array3<f64>, SolverError> {
    let mut c = Array3::zeros(phi.resolution());

    for axis in Axis::ALL {
        let vel = face_velocity(phi, axis, uvwf)?;
        let rho_f = face_property(phi.pos, axis, rho)?;
        let area = face_property(phi.pos, axis, &grid.face_area(axis))?;
        let spacing = face_spacing(phi.pos, axis, grid.spacing(axis))?;

        let flux = &vel * &rho_f * &area;
        let courant = &vel * dt / &spacing;
        let phi_ext = phi.extended(axis)?;

        let mut phi_f = Array3::zeros(flux.dim());
        Zip::from(phi_ext.lanes(axis.nd()))
            .and(flux.lanes(axis.nd()))
            .and(courant.lanes(axis.nd()))
            .and(phi_f.lanes_mut(axis.nd()))
            .for_each(|p, f, cr, out| limit_lane(p, f, cr, out, limiter));

        c += &dif(axis, &(flux * phi_f));
    }

    Ok(c)
}
