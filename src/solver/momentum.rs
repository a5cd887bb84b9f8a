use ndarray::Array3;
use tracing::debug;

use crate::boundary::bc3d::{BoundaryKind, Side};
use crate::boundary::update::update_velocity_bounds;
use crate::domain::grid3d::{Axis, Grid3D};
use crate::domain::obstacle::{zero_in_obstacle, Obstacle};
use crate::domain::velocity::{Arrangement, VelocityField};
use crate::error::SolverError;
use crate::linear_solver::{solve, SolverConfig, SolverReport};
use crate::numerical::advection::advection;
use crate::numerical::assembly::{create_matrix, LinearSystem};
use crate::numerical::stencil::{avg, avg_to};
use crate::solver::Discretization;

impl VelocityField {
    /// Rebuilds the face triple from the freshly solved momentum unknowns.
    ///
    /// Collocated fields interpolate cell velocities to faces, swapping the
    /// interpolated cell pressure gradient for the compact face gradient of
    /// `p_tot`. Normal boundary values are copied, tangential ones averaged.
    /// Staggered fields already solve on the faces.
    pub fn reconstruct_face_velocity(
        &mut self,
        rho: &Array3<f64>,
        p_tot: &Array3<f64>,
        dt: f64,
        grid: &Grid3D,
    ) -> Result<(), SolverError> {
        let VelocityField::Collocated { cell, face } = self else {
            return Ok(());
        };

        for axis in Axis::ALL {
            let c = cell.component(axis);
            let f = face.component_mut(axis);

            let g_cell = Arrangement::Collocated.gradient_at(axis, p_tot, grid)?;
            let g_face = Arrangement::Staggered.gradient_at(axis, p_tot, grid)?;
            let predicted = &c.val + &(g_cell * dt / rho);
            f.val = avg(axis, &predicted) - &(g_face * dt / &avg(axis, rho));

            for side in Side::ALL {
                let src = &c.bnd[side].val;
                if side.axis() == axis {
                    f.bnd[side].val.assign(src);
                } else {
                    f.bnd[side].val = avg(axis, src);
                }
            }
        }
        Ok(())
    }
}

/// Forcing vector and operator for one momentum component.
#[allow(clippy::too_many_arguments)]
fn momentum_system(
    field: &VelocityField,
    axis: Axis,
    rho: &Array3<f64>,
    mu: &Array3<f64>,
    p_tot: &Array3<f64>,
    ext_force: &Array3<f64>,
    dt: f64,
    grid: &Grid3D,
    obstacle: &Obstacle,
    disc: &Discretization,
) -> Result<LinearSystem, SolverError> {
    let phi = field.solved().component(axis);
    let pos = phi.pos;
    let dv = avg_to(pos, &grid.cell_volume());

    let sys = create_matrix(
        phi,
        &(rho / dt),
        mu,
        grid,
        obstacle,
        BoundaryKind::Dirichlet,
        disc.averaging,
    )?;

    let c = advection(rho, phi, field.faces(), grid, dt, disc.momentum_limiter)?;
    let inertia = &phi.old * &avg_to(pos, rho) * &dv / dt;
    let p_st = field.arrangement().gradient_at(axis, p_tot, grid)? * &dv;
    let e = avg_to(pos, ext_force) * &dv;

    let mut f = sys.rhs - &c + &inertia - &p_st + &e;
    if !obstacle.is_empty() {
        f = zero_in_obstacle(pos, &f, obstacle);
    }

    Ok(LinearSystem {
        matrix: sys.matrix,
        rhs: f,
    })
}

/// Discretises and solves the three momentum equations.
///
/// * `p_tot` - accumulated pressure at cell centers
/// * `ext_force` - body force per unit volume for x, y and z, at cell centers
///
/// Updates the momentum unknowns with their boundaries and then the face
/// velocities, which are zero on solid faces on return.
#[allow(clippy::too_many_arguments)]
pub fn calc_uvw(
    field: &mut VelocityField,
    rho: &Array3<f64>,
    mu: &Array3<f64>,
    p_tot: &Array3<f64>,
    ext_force: &[Array3<f64>; 3],
    dt: f64,
    grid: &Grid3D,
    obstacle: &Obstacle,
    solver: &SolverConfig,
    disc: &Discretization,
) -> Result<[SolverReport; 3], SolverError> {
    let view: &VelocityField = field;
    let systems = Axis::ALL.map(|axis| {
        momentum_system(
            view,
            axis,
            rho,
            mu,
            p_tot,
            &ext_force[axis.index()],
            dt,
            grid,
            obstacle,
            disc,
        )
    });

    let mut reports = Vec::with_capacity(3);
    for (axis, system) in Axis::ALL.into_iter().zip(systems) {
        let system = system?;
        let phi = field.solved_mut().component_mut(axis);
        let (val, report) = solve(&system, &phi.val, solver, &phi.name)?;
        phi.val = val;
        debug!(unknown = %phi.name, iterations = report.iterations, "momentum component solved");
        reports.push(report);
    }

    update_velocity_bounds(field.solved_mut(), grid, dt);
    field.reconstruct_face_velocity(rho, p_tot, dt, grid)?;

    if !obstacle.is_empty() {
        let faces = field.faces_mut();
        for axis in Axis::ALL {
            let f = faces.component_mut(axis);
            f.val = zero_in_obstacle(f.pos, &f.val, obstacle);
        }
    }

    reports
        .try_into()
        .map_err(|_| SolverError::LinearSolver("missing momentum report".to_string()))
}
