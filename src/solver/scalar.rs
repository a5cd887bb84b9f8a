use ndarray::Array3;

use crate::boundary::bc3d::BoundaryKind;
use crate::boundary::update::update_scalar_bounds;
use crate::domain::grid3d::Grid3D;
use crate::domain::obstacle::{zero_in_obstacle, Obstacle};
use crate::domain::unknown::Unknown;
use crate::domain::velocity::VelocityTriple;
use crate::error::SolverError;
use crate::linear_solver::{solve, SolverConfig, SolverReport};
use crate::numerical::advection::advection;
use crate::numerical::assembly::{create_matrix, LinearSystem};
use crate::solver::Discretization;

/// Transports a cell-centered scalar such as temperature.
///
/// `rho_cap` is the volumetric heat capacity and `kappa` the conductivity.
/// Solids are insulated from the fluid and hold zero. There is no source term.
#[allow(clippy::too_many_arguments)]
pub fn calc_t(
    t: &mut Unknown,
    uvwf: &VelocityTriple,
    rho_cap: &Array3<f64>,
    kappa: &Array3<f64>,
    dt: f64,
    grid: &Grid3D,
    obstacle: &Obstacle,
    solver: &SolverConfig,
    disc: &Discretization,
) -> Result<SolverReport, SolverError> {
    let sys = create_matrix(
        t,
        &(rho_cap / dt),
        kappa,
        grid,
        obstacle,
        BoundaryKind::Neumann,
        disc.averaging,
    )?;

    let c = advection(rho_cap, t, uvwf, grid, dt, disc.scalar_limiter)?;
    let inertia = &t.old * rho_cap * &grid.cell_volume() / dt;

    let mut f = sys.rhs - &c + &inertia;
    if !obstacle.is_empty() {
        f = zero_in_obstacle(t.pos, &f, obstacle);
    }
    let system = LinearSystem {
        matrix: sys.matrix,
        rhs: f,
    };

    let (val, report) = solve(&system, &t.val, solver, &t.name)?;
    t.val = val;
    update_scalar_bounds(t);
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::bc3d::Side;
    use crate::domain::grid3d::Position;
    use approx::assert_relative_eq;

    fn setup() -> (Grid3D, Unknown, VelocityTriple, Array3<f64>, Array3<f64>) {
        let grid = Grid3D::uniform((6, 3, 2), (1.0, 0.5, 0.2)).unwrap();
        let t = Unknown::on_grid("temperature", Position::Cell, &grid, BoundaryKind::Neumann);
        let uvwf = VelocityTriple::staggered(&grid, BoundaryKind::Dirichlet);
        let rho_cap = Array3::from_elem(grid.resolution, 1.0);
        let kappa = Array3::from_elem(grid.resolution, 0.01);
        (grid, t, uvwf, rho_cap, kappa)
    }

    #[test]
    fn test_uniform_temperature_is_steady() {
        let (grid, mut t, uvwf, rho_cap, kappa) = setup();
        t.val.fill(20.0);
        update_scalar_bounds(&mut t);
        t.store_old();
        let cfg = SolverConfig::new(1e-12, 200);
        calc_t(
            &mut t,
            &uvwf,
            &rho_cap,
            &kappa,
            0.1,
            &grid,
            &Obstacle::none(grid.resolution),
            &cfg,
            &Discretization::default(),
        )
        .unwrap();
        for v in t.val.iter() {
            assert_relative_eq!(*v, 20.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_heated_wall_diffuses_inward() {
        let (grid, mut t, uvwf, rho_cap, kappa) = setup();
        t.bnd.set(Side::W, BoundaryKind::Dirichlet, 1.0);
        t.bnd.set(Side::E, BoundaryKind::Dirichlet, -1.0);
        t.store_old();
        calc_t(
            &mut t,
            &uvwf,
            &rho_cap,
            &kappa,
            0.5,
            &grid,
            &Obstacle::none(grid.resolution),
            &SolverConfig::default(),
            &Discretization::default(),
        )
        .unwrap();
        assert!(t.val[(0, 1, 0)] > 0.0);
        assert!(t.val[(5, 1, 0)] < 0.0);
        assert!(t.val[(0, 1, 0)] > t.val[(1, 1, 0)]);
        // antisymmetric problem
        assert_relative_eq!(t.val[(0, 2, 1)], -t.val[(5, 2, 1)], epsilon = 1e-7);
        // insulated sides follow the interior
        assert_eq!(t.bnd[Side::S].val[(2, 0, 1)], t.val[(2, 0, 1)]);
        assert!(t.bnd[Side::W].val.iter().all(|&v| v == 1.0));
    }

    #[test]
    fn test_advected_front_enters_from_inlet() {
        let (grid, mut t, mut uvwf, rho_cap, _) = setup();
        let kappa = Array3::zeros(grid.resolution);
        uvwf.u.val.fill(0.5);
        uvwf.u.bnd.set(Side::W, BoundaryKind::Dirichlet, 0.5);
        uvwf.u.bnd.set(Side::E, BoundaryKind::Outlet, 0.5);
        t.bnd.set(Side::W, BoundaryKind::Dirichlet, 1.0);
        t.bnd.set(Side::E, BoundaryKind::Outlet, 0.0);
        t.store_old();
        calc_t(
            &mut t,
            &uvwf,
            &rho_cap,
            &kappa,
            0.05,
            &grid,
            &Obstacle::none(grid.resolution),
            &SolverConfig::default(),
            &Discretization::default(),
        )
        .unwrap();
        // upwind-explicit inflow: dt * u / dx of the inlet value enters the first cell
        assert_relative_eq!(t.val[(0, 0, 0)], 0.05 * 0.5 / (1.0 / 6.0), epsilon = 1e-9);
        assert_relative_eq!(t.val[(3, 1, 1)], 0.0, epsilon = 1e-12);
        assert_eq!(t.bnd[Side::E].val[(0, 1, 1)], t.val[(5, 1, 1)]);
    }
}
