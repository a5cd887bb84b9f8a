use cartflow::boundary::bc3d::{BoundaryKind, Side};
use cartflow::config::SimulationConfig;
use cartflow::domain::grid3d::{nodes, parabolic_profile, Axis, Grid3D};
use cartflow::domain::obstacle::Obstacle;
use cartflow::domain::velocity::VelocityField;
use cartflow::json_io::JsonOutputManager;
use cartflow::solver::Simulation;
use ndarray::Array3;
use tracing::info;

/// Channel with a parabolic inflow, an outlet and an optional solid block.
fn channel_simulation(config: &SimulationConfig) -> Result<Simulation, Box<dyn std::error::Error>> {
    let case = &config.case;
    let [nx, ny, nz] = case.resolution;
    let [lx, ly, lz] = case.lengths;
    let yn = nodes(0.0, ly, ny);
    let grid = Grid3D::from_nodes(&nodes(0.0, lx, nx), &yn, &nodes(0.0, lz, nz))?;

    let mut velocity = VelocityField::new(case.arrangement, &grid);
    let inflow = parabolic_profile(case.inflow_mean, &yn);
    let uvw = velocity.solved_mut();
    uvw.u.bnd[Side::W].kind = BoundaryKind::Dirichlet;
    uvw.u.bnd[Side::W].val = Array3::from_shape_fn((1, ny, nz), |(_, j, _)| inflow[j]);
    uvw.u.bnd[Side::E].kind = BoundaryKind::Outlet;
    for side in [Side::B, Side::T] {
        for axis in Axis::ALL {
            uvw.component_mut(axis).bnd[side].kind = BoundaryKind::Neumann;
        }
    }

    let obstacle = match &case.obstacle {
        Some(b) => Obstacle::from_fn(grid.resolution, |ijk| b.contains(ijk)),
        None => Obstacle::none(grid.resolution),
    };
    info!(
        "Grid {}x{}x{}, {:?} arrangement, {} solid cells",
        nx,
        ny,
        nz,
        case.arrangement,
        obstacle.solid_count()
    );

    let rho = Array3::from_elem(grid.resolution, case.density);
    let mu = Array3::from_elem(grid.resolution, case.viscosity);
    Ok(Simulation::new(grid, rho, mu, velocity, obstacle, config)?)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_target(false).init();

    let config = match std::env::args().nth(1) {
        Some(path) => SimulationConfig::from_json_file(path)?,
        None => SimulationConfig::default(),
    };
    config.validate()?;

    let mut sim = channel_simulation(&config)?;

    let reports = match &config.output_path {
        Some(path) => {
            let mut output =
                JsonOutputManager::new(path.clone(), config.output_frequency, sim.grid.resolution)?;
            sim.run_with_output(config.steps, &mut output)?
        }
        None => sim.run(config.steps)?,
    };

    if let Some(last) = reports.last() {
        info!(
            "Finished at t={:.4}: max volume error {:.3e}, CFL {:.3}",
            last.time, last.volume_error, last.cfl
        );
    }
    Ok(())
}
