pub mod momentum;
pub mod pressure;
pub mod scalar;

use ndarray::Array3;
use serde::Serialize;
use tracing::{info, info_span, warn};

use crate::boundary::bc3d::BoundaryKind;
use crate::config::SimulationConfig;
use crate::domain::grid3d::{Axis, Grid3D, Position};
use crate::domain::obstacle::Obstacle;
use crate::domain::unknown::Unknown;
use crate::domain::velocity::VelocityField;
use crate::error::SolverError;
use crate::json_io::JsonOutputManager;
use crate::linear_solver::{SolverConfig, SolverReport};
use crate::numerical::advection::FluxLimiter;
use crate::numerical::assembly::FaceAveraging;

use momentum::calc_uvw;
use pressure::{calc_p, cfl_max, corr_uvw, max_volume_error, vol_balance};
use scalar::calc_t;

/// Discretisation choices shared by all transport equations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Discretization {
    pub momentum_limiter: FluxLimiter,
    pub scalar_limiter: FluxLimiter,
    pub averaging: FaceAveraging,
}

impl Default for Discretization {
    fn default() -> Self {
        Self {
            momentum_limiter: FluxLimiter::Superbee,
            scalar_limiter: FluxLimiter::Minmod,
            averaging: FaceAveraging::Arithmetic,
        }
    }
}

/// Transported temperature with its material properties.
#[derive(Debug, Clone)]
pub struct Thermal {
    pub t: Unknown,
    pub rho_cap: Array3<f64>,
    pub kappa: Array3<f64>,
}

/// Boussinesq body force `coefficient * T` along `axis`.
#[derive(Debug, Clone, Copy)]
pub struct Buoyancy {
    pub axis: Axis,
    pub coefficient: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub step: usize,
    pub time: f64,
    /// Largest |volume balance| after the velocity correction.
    pub volume_error: f64,
    pub cfl: f64,
    pub momentum: [SolverReport; 3],
    pub pressure: SolverReport,
    pub scalar: Option<SolverReport>,
}

#[derive(Debug)]
pub struct Simulation {
    pub grid: Grid3D,
    pub rho: Array3<f64>,
    pub mu: Array3<f64>,
    pub velocity: VelocityField,
    pub p: Unknown,
    pub p_tot: Array3<f64>,
    pub thermal: Option<Thermal>,
    pub buoyancy: Option<Buoyancy>,
    pub obstacle: Obstacle,
    pub dt: f64,
    pub solver: SolverConfig,
    pub disc: Discretization,
    pub time: f64,
    pub step_count: usize,
}

fn check_shape(name: &str, a: &Array3<f64>, grid: &Grid3D) -> Result<(), SolverError> {
    if a.dim() != grid.resolution {
        return Err(SolverError::InvalidParameter(format!(
            "{} has shape {:?}, grid resolution is {:?}",
            name,
            a.dim(),
            grid.resolution
        )));
    }
    Ok(())
}

impl Simulation {
    pub fn new(
        grid: Grid3D,
        rho: Array3<f64>,
        mu: Array3<f64>,
        velocity: VelocityField,
        obstacle: Obstacle,
        config: &SimulationConfig,
    ) -> Result<Self, SolverError> {
        config.validate()?;
        check_shape("density", &rho, &grid)?;
        check_shape("viscosity", &mu, &grid)?;
        if rho.iter().any(|&r| r <= 0.0) {
            return Err(SolverError::InvalidParameter("density must be positive".to_string()));
        }
        if mu.iter().any(|&m| m < 0.0) {
            return Err(SolverError::InvalidParameter("viscosity must not be negative".to_string()));
        }
        if obstacle.resolution() != grid.resolution {
            return Err(SolverError::InvalidParameter(format!(
                "obstacle mask has shape {:?}, grid resolution is {:?}",
                obstacle.resolution(),
                grid.resolution
            )));
        }
        let solved = velocity.solved();
        for axis in Axis::ALL {
            let c = solved.component(axis);
            if c.resolution() != grid.resolution_of(c.pos) {
                return Err(SolverError::InvalidParameter(format!(
                    "{} has shape {:?}, expected {:?}",
                    c.name,
                    c.resolution(),
                    grid.resolution_of(c.pos)
                )));
            }
        }

        let p = Unknown::on_grid("pressure", Position::Cell, &grid, BoundaryKind::Neumann);
        let p_tot = Array3::zeros(grid.resolution);

        Ok(Self {
            grid,
            rho,
            mu,
            velocity,
            p,
            p_tot,
            thermal: None,
            buoyancy: None,
            obstacle,
            dt: config.dt,
            solver: config.solver.clone(),
            disc: config.discretization(),
            time: 0.0,
            step_count: 0,
        })
    }

    pub fn with_temperature(
        mut self,
        t: Unknown,
        rho_cap: Array3<f64>,
        kappa: Array3<f64>,
    ) -> Result<Self, SolverError> {
        check_shape("temperature", &t.val, &self.grid)?;
        check_shape("heat capacity", &rho_cap, &self.grid)?;
        check_shape("conductivity", &kappa, &self.grid)?;
        self.thermal = Some(Thermal { t, rho_cap, kappa });
        Ok(self)
    }

    pub fn with_buoyancy(mut self, axis: Axis, coefficient: f64) -> Self {
        self.buoyancy = Some(Buoyancy { axis, coefficient });
        self
    }

    fn body_force(&self) -> [Array3<f64>; 3] {
        let mut ef = Axis::ALL.map(|_| Array3::zeros(self.grid.resolution));
        if let (Some(b), Some(th)) = (self.buoyancy, &self.thermal) {
            ef[b.axis.index()] = &th.t.val * b.coefficient;
        }
        ef
    }

    /// Current maximum volume error of the face velocities.
    pub fn volume_error(&self) -> Result<f64, SolverError> {
        let err = vol_balance(self.velocity.faces(), &self.grid, &self.obstacle)?;
        Ok(max_volume_error(&err))
    }

    /// Advances the solution by one time step of the projection method.
    pub fn step(&mut self) -> Result<StepReport, SolverError> {
        self.velocity.store_old();

        let scalar = match self.thermal.as_mut() {
            Some(th) => {
                th.t.store_old();
                Some(calc_t(
                    &mut th.t,
                    self.velocity.faces(),
                    &th.rho_cap,
                    &th.kappa,
                    self.dt,
                    &self.grid,
                    &self.obstacle,
                    &self.solver,
                    &self.disc,
                )?)
            }
            None => None,
        };

        let ef = self.body_force();
        let momentum = calc_uvw(
            &mut self.velocity,
            &self.rho,
            &self.mu,
            &self.p_tot,
            &ef,
            self.dt,
            &self.grid,
            &self.obstacle,
            &self.solver,
            &self.disc,
        )?;

        let pressure = calc_p(
            &mut self.p,
            self.velocity.faces(),
            &self.rho,
            self.dt,
            &self.grid,
            &self.obstacle,
            &self.solver,
            self.disc.averaging,
        )?;
        self.p_tot += &self.p.val;

        match &mut self.velocity {
            VelocityField::Collocated { cell, face } => {
                corr_uvw(
                    cell,
                    &self.p,
                    &self.rho,
                    self.dt,
                    &self.grid,
                    &self.obstacle,
                    self.disc.averaging,
                )?;
                corr_uvw(
                    face,
                    &self.p,
                    &self.rho,
                    self.dt,
                    &self.grid,
                    &self.obstacle,
                    self.disc.averaging,
                )?;
            }
            VelocityField::Staggered { face } => {
                corr_uvw(
                    face,
                    &self.p,
                    &self.rho,
                    self.dt,
                    &self.grid,
                    &self.obstacle,
                    self.disc.averaging,
                )?;
            }
        }

        self.time += self.dt;
        self.step_count += 1;

        Ok(StepReport {
            step: self.step_count,
            time: self.time,
            volume_error: self.volume_error()?,
            cfl: cfl_max(self.velocity.solved(), self.dt, &self.grid),
            momentum,
            pressure,
            scalar,
        })
    }

    /// Runs `num_steps` time steps.
    pub fn run(&mut self, num_steps: usize) -> Result<Vec<StepReport>, SolverError> {
        self.run_inner(num_steps, None)
    }

    /// Runs `num_steps` time steps, handing snapshots to `output` and writing
    /// it once the run is complete.
    pub fn run_with_output(
        &mut self,
        num_steps: usize,
        output: &mut JsonOutputManager,
    ) -> Result<Vec<StepReport>, SolverError> {
        let reports = self.run_inner(num_steps, Some(&mut *output))?;
        output.write_final_output(&self.grid, self.dt, self.step_count)?;
        Ok(reports)
    }

    fn run_inner(
        &mut self,
        num_steps: usize,
        mut output: Option<&mut JsonOutputManager>,
    ) -> Result<Vec<StepReport>, SolverError> {
        let run_span = info_span!("simulation_run", num_steps = num_steps).entered();
        info!("Starting simulation with {} steps", num_steps);

        let start_time = std::time::Instant::now();
        if let Some(out) = output.as_deref_mut() {
            if out.should_collect(self.step_count, false) {
                out.collect_timestep(self, self.volume_error()?)?;
            }
        }

        let mut reports = Vec::with_capacity(num_steps);
        for i in 0..num_steps {
            let step_span = info_span!("time_step", step = self.step_count + 1).entered();
            let step_start = std::time::Instant::now();

            match self.step() {
                Ok(report) => {
                    info!(
                        "Step {}: time={:.4}, vol_err={:.3e}, cfl={:.3}, elapsed={:.2}ms",
                        report.step,
                        report.time,
                        report.volume_error,
                        report.cfl,
                        step_start.elapsed().as_millis()
                    );
                    if let Some(out) = output.as_deref_mut() {
                        if out.should_collect(report.step, i + 1 == num_steps) {
                            out.collect_timestep(self, report.volume_error)?;
                        }
                    }
                    reports.push(report);
                }
                Err(e) => {
                    warn!(error = %e, "Simulation step failed");
                    return Err(e);
                }
            }
            drop(step_span);
        }

        info!("Simulation finished in {:.2}s", start_time.elapsed().as_secs_f64());
        drop(run_span);
        Ok(reports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::bc3d::Side;
    use approx::assert_relative_eq;

    fn config(dt: f64) -> SimulationConfig {
        SimulationConfig {
            dt,
            ..Default::default()
        }
    }

    fn channel(arrangement_collocated: bool, obstacle: Obstacle) -> Simulation {
        let grid = Grid3D::uniform(obstacle.resolution(), (2.0, 0.5, 0.25)).unwrap();
        let mut velocity = if arrangement_collocated {
            VelocityField::collocated(&grid)
        } else {
            VelocityField::staggered(&grid)
        };
        {
            let solved = velocity.solved_mut();
            solved.u.bnd.set(Side::W, BoundaryKind::Dirichlet, 0.1);
            solved.u.bnd.set(Side::E, BoundaryKind::Outlet, 0.0);
            for side in [Side::B, Side::T] {
                for axis in Axis::ALL {
                    solved.component_mut(axis).bnd[side].kind = BoundaryKind::Neumann;
                }
            }
        }
        let rho = Array3::from_elem(grid.resolution, 1.0);
        let mu = Array3::from_elem(grid.resolution, 1e-3);
        Simulation::new(grid, rho, mu, velocity, obstacle, &config(0.05)).unwrap()
    }

    fn outflow(sim: &Simulation) -> f64 {
        let area = sim.grid.face_area(Axis::X);
        let faces = sim.velocity.faces();
        (&faces.u.bnd[Side::E].val * &area.slice(ndarray::s![-1.., .., ..])).sum()
    }

    #[test]
    fn test_simulation_new_invalid_params() {
        let grid = Grid3D::uniform((3, 3, 3), (1.0, 1.0, 1.0)).unwrap();
        let ok = Array3::from_elem(grid.resolution, 1.0);
        let v = VelocityField::staggered(&grid);
        let none = Obstacle::none(grid.resolution);
        let build = |rho: Array3<f64>, obstacle: Obstacle, dt: f64| {
            Simulation::new(grid.clone(), rho, ok.clone(), v.clone(), obstacle, &config(dt))
        };
        assert!(build(ok.clone(), none.clone(), 0.0).is_err());
        assert!(build(Array3::zeros((2, 3, 3)), none.clone(), 0.1).is_err());
        assert!(build(Array3::zeros((3, 3, 3)), none.clone(), 0.1).is_err());
        assert!(build(ok.clone(), Obstacle::none((2, 2, 2)), 0.1).is_err());
        let sim = Simulation::new(grid, ok.clone(), ok, v, none, &config(0.1)).unwrap();
        assert_eq!(sim.time, 0.0);
        assert_eq!(sim.p.bnd[Side::W].kind, BoundaryKind::Neumann);
    }

    #[test]
    fn test_channel_flow_conserves_mass() {
        for collocated in [true, false] {
            let mut sim = channel(collocated, Obstacle::none((8, 4, 2)));
            let reports = sim.run(4).unwrap();
            assert_eq!(reports.len(), 4);
            assert_relative_eq!(sim.time, 0.2, epsilon = 1e-12);
            for r in &reports {
                assert!(r.volume_error < 1e-6, "volume error {}", r.volume_error);
            }
            let inflow = 0.1 * 0.5 * 0.25;
            assert_relative_eq!(outflow(&sim), inflow, epsilon = 1e-9);
            assert!(sim.velocity.solved().u.val[(3, 2, 0)] > 0.0);
        }
    }

    #[test]
    fn test_channel_with_obstacle() {
        let obstacle = Obstacle::from_fn((8, 4, 2), |(i, j, _)| (3..5).contains(&i) && j < 2);
        for collocated in [true, false] {
            let mut sim = channel(collocated, obstacle.clone());
            let reports = sim.run(3).unwrap();
            assert!(reports.iter().all(|r| r.volume_error < 1e-6));
            let faces = sim.velocity.faces();
            for axis in Axis::ALL {
                let f = faces.component(axis);
                let mask = obstacle.mask_at(f.pos);
                assert!(f.val.iter().zip(mask.iter()).all(|(&v, &s)| !s || v == 0.0));
            }
            // flow squeezes through the open half above the block
            assert!(faces.u.val[(3, 3, 0)] > faces.u.val[(0, 3, 0)]);
            assert!(reports[2].cfl > 0.0);
        }
    }

    #[test]
    fn test_obstacle_on_symmetry_floor_conserves_mass() {
        // the block does not span z, so w is nonzero next to the B/T sides
        let obstacle =
            Obstacle::from_fn((8, 4, 3), |(i, j, k)| (3..5).contains(&i) && j < 2 && k == 0);
        for collocated in [true, false] {
            let mut sim = channel(collocated, obstacle.clone());
            let reports = sim.run(4).unwrap();
            for r in &reports {
                assert!(r.volume_error < 1e-6, "step {}: volume error {}", r.step, r.volume_error);
            }
            let faces = sim.velocity.faces();
            assert!(faces.w.val.iter().any(|&w| w.abs() > 1e-8));
            for side in [Side::B, Side::T] {
                assert!(faces.w.bnd[side].val.iter().all(|&w| w == 0.0));
            }
            let inflow = 0.1 * 0.5 * 0.25;
            assert_relative_eq!(outflow(&sim), inflow, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_buoyancy_drives_hot_fluid_up() {
        let grid = Grid3D::uniform((4, 4, 2), (1.0, 1.0, 0.5)).unwrap();
        let rho = Array3::from_elem(grid.resolution, 1.0);
        let mu = Array3::from_elem(grid.resolution, 0.01);
        let mut t = Unknown::on_grid("temperature", Position::Cell, &grid, BoundaryKind::Neumann);
        t.val = Array3::from_shape_fn(grid.resolution, |(i, _, _)| if i < 2 { 1.0 } else { -1.0 });
        let mut sim = Simulation::new(
            grid.clone(),
            rho.clone(),
            mu,
            VelocityField::collocated(&grid),
            Obstacle::none(grid.resolution),
            &config(0.05),
        )
        .unwrap()
        .with_temperature(t, rho.clone(), Array3::from_elem(grid.resolution, 1e-3))
        .unwrap()
        .with_buoyancy(Axis::Y, 1.0);

        let report = sim.step().unwrap();
        assert!(report.scalar.is_some());
        assert!(report.volume_error < 1e-6);
        let v = &sim.velocity.solved().v.val;
        assert!(v[(0, 2, 0)] > 0.0);
        assert!(v[(3, 2, 0)] < 0.0);
        assert!(sim.p_tot.iter().any(|&p| p != 0.0));
    }
}
