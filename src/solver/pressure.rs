use ndarray::{Array3, Slice, Zip};
use tracing::debug;

use crate::boundary::bc3d::BoundaryKind;
use crate::boundary::update::{update_neumann_bounds, update_velocity_component_bounds};
use crate::domain::grid3d::{Axis, Grid3D, Position};
use crate::domain::obstacle::{zero_in_obstacle, Obstacle};
use crate::domain::unknown::Unknown;
use crate::domain::velocity::{Arrangement, VelocityTriple};
use crate::error::SolverError;
use crate::linear_solver::{solve, SolverConfig, SolverReport};
use crate::numerical::assembly::{create_matrix, FaceAveraging, LinearSystem};
use crate::numerical::stencil::{avg_to, dif};

/// Volume balance of every cell: net volume flux into the cell through its
/// six faces, boundary faces included.
///
/// Solid cells are zeroed only when the obstacle has at least one solid cell.
pub fn vol_balance(
    uvwf: &VelocityTriple,
    grid: &Grid3D,
    obstacle: &Obstacle,
) -> Result<Array3<f64>, SolverError> {
    let mut src = Array3::zeros(grid.resolution);
    for axis in Axis::ALL {
        let ext = uvwf.component(axis).extended(axis)?;
        src -= &(dif(axis, &ext) * &grid.face_area(axis));
    }

    if obstacle.is_empty() {
        Ok(src)
    } else {
        Ok(zero_in_obstacle(Position::Cell, &src, obstacle))
    }
}

/// Solves the pressure-correction equation for `p`.
///
/// The operator has no accumulation term and diffusivity `dt / rho`. The
/// solution is shifted to zero mean and the Neumann boundaries refreshed.
#[allow(clippy::too_many_arguments)]
pub fn calc_p(
    p: &mut Unknown,
    uvwf: &VelocityTriple,
    rho: &Array3<f64>,
    dt: f64,
    grid: &Grid3D,
    obstacle: &Obstacle,
    solver: &SolverConfig,
    averaging: FaceAveraging,
) -> Result<SolverReport, SolverError> {
    let inn = Array3::zeros(grid.resolution);
    let mu = dt / rho;
    let sys = create_matrix(p, &inn, &mu, grid, obstacle, BoundaryKind::Neumann, averaging)?;

    // the source is never masked, solid rows are identity rows anyway
    let src = vol_balance(uvwf, grid, &Obstacle::none(grid.resolution))?;
    let system = LinearSystem {
        matrix: sys.matrix,
        rhs: sys.rhs + &src,
    };

    let (val, report) = solve(&system, &p.val, solver, &p.name)?;
    let mean = val.mean().unwrap_or(0.0);
    p.val = val - mean;
    update_neumann_bounds(p);

    debug!(iterations = report.iterations, mean, "pressure solved");
    Ok(report)
}

/// Face values of `dt / rho` normal to `axis`, averaged the way the pressure
/// operator averages its diffusivity.
fn face_coefficient(
    axis: Axis,
    rho: &Array3<f64>,
    dt: f64,
    averaging: FaceAveraging,
) -> Array3<f64> {
    let k = dt / rho;
    let lo = k.slice_axis(axis.nd(), Slice::new(0, Some(-1), 1));
    let hi = k.slice_axis(axis.nd(), Slice::new(1, None, 1));
    let mut out = Array3::zeros(lo.dim());
    Zip::from(&mut out)
        .and(&lo)
        .and(&hi)
        .for_each(|o, &a, &b| *o = averaging.blend(a, b));
    out
}

/// Projects a velocity triple with the pressure correction `p`.
///
/// Face components get the compact face gradient, cell components the
/// edge-padded centered gradient. Boundary layers normal to each component
/// are left alone, so the boundary fluxes seen by the pressure solve stay put.
#[allow(clippy::too_many_arguments)]
pub fn corr_uvw(
    uvw: &mut VelocityTriple,
    p: &Unknown,
    rho: &Array3<f64>,
    dt: f64,
    grid: &Grid3D,
    obstacle: &Obstacle,
    averaging: FaceAveraging,
) -> Result<(), SolverError> {
    for axis in Axis::ALL {
        let c = uvw.component_mut(axis);
        match c.pos.staggered_axis() {
            None => {
                let g = Arrangement::Collocated.gradient_at(axis, &p.val, grid)?;
                c.val -= &(g * dt / rho);
            }
            Some(a) if a == axis => {
                let g = Arrangement::Staggered.gradient_at(axis, &p.val, grid)?;
                c.val -= &(g * &face_coefficient(axis, rho, dt, averaging));
            }
            Some(a) => {
                return Err(SolverError::InvalidParameter(format!(
                    "{} is staggered along {:?} but corrects along {:?}",
                    c.name, a, axis
                )))
            }
        }

        update_velocity_component_bounds(c, axis);
        if !obstacle.is_empty() {
            c.val = zero_in_obstacle(c.pos, &c.val, obstacle);
        }
    }
    Ok(())
}

/// Largest Courant number `|u| dt / dx` over all components.
pub fn cfl_max(uvw: &VelocityTriple, dt: f64, grid: &Grid3D) -> f64 {
    Axis::ALL
        .iter()
        .map(|&axis| {
            let c = uvw.component(axis);
            let d = avg_to(c.pos, grid.spacing(axis));
            Zip::from(&c.val)
                .and(&d)
                .fold(0.0_f64, |m, &v, &h| m.max(v.abs() * dt / h))
        })
        .fold(0.0, f64::max)
}

/// Largest magnitude of the volume balance.
pub fn max_volume_error(src: &Array3<f64>) -> f64 {
    src.iter().fold(0.0, |m, v| m.max(v.abs()))
}
