// src/json_io.rs

use crate::domain::grid3d::{Axis, Grid3D};
use crate::error::SolverError;
use crate::solver::Simulation;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::time::Instant;
use tracing::info;

#[derive(Serialize, Debug)]
struct Metadata {
    nx: usize,
    ny: usize,
    nz: usize,
    xn: Vec<f64>,
    yn: Vec<f64>,
    zn: Vec<f64>,
    dt: f64,
    num_steps_completed: usize,
    output_frequency: Option<usize>,
}

/// Cell-centered snapshot, flattened in x-major order.
#[derive(Serialize, Debug)]
pub struct TimestepData {
    pub step: usize,
    pub time: f64,
    pub volume_error: f64,
    pub u_centers: Vec<f64>,
    pub v_centers: Vec<f64>,
    pub w_centers: Vec<f64>,
    pub p_centers: Vec<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub t_centers: Option<Vec<f64>>,
}

#[derive(Serialize, Debug)]
struct SimulationOutput<'a> {
    pub metadata: Metadata,
    pub data: &'a [TimestepData],
}

#[derive(Debug)]
pub struct JsonOutputManager {
    pub output_filepath: String,
    pub output_frequency: Option<usize>,
    pub collected_data: Vec<TimestepData>,
    pub resolution: (usize, usize, usize),
}

impl JsonOutputManager {
    pub fn new(
        output_filepath: String,
        output_frequency: Option<usize>,
        resolution: (usize, usize, usize),
    ) -> Result<Self, io::Error> {
        let path = Path::new(&output_filepath);
        if let Some(parent_dir) = path.parent() {
            fs::create_dir_all(parent_dir)?;
            info!("Ensured output directory exists: {}", parent_dir.display());
        }

        Ok(Self {
            output_filepath,
            output_frequency,
            collected_data: Vec::new(),
            resolution,
        })
    }

    pub fn should_collect(&self, step: usize, is_final_step: bool) -> bool {
        match self.output_frequency {
            Some(0) => step == 0 || is_final_step,
            Some(freq) => step == 0 || step % freq == 0 || is_final_step,
            None => true,
        }
    }

    /// Stores a snapshot of the current state of `sim`.
    pub fn collect_timestep(
        &mut self,
        sim: &Simulation,
        volume_error: f64,
    ) -> Result<(), SolverError> {
        if sim.grid.resolution != self.resolution {
            return Err(SolverError::InvalidParameter(format!(
                "Grid resolution {:?} does not match JsonOutputManager resolution {:?}",
                sim.grid.resolution, self.resolution
            )));
        }
        info!("Collecting data for step {} (time {:.4})...", sim.step_count, sim.time);

        let uvw = sim.velocity.solved();
        let flat = |a: ndarray::Array3<f64>| a.iter().copied().collect::<Vec<f64>>();
        let data_point = TimestepData {
            step: sim.step_count,
            time: sim.time,
            volume_error,
            u_centers: flat(uvw.cell_centered(Axis::X)?),
            v_centers: flat(uvw.cell_centered(Axis::Y)?),
            w_centers: flat(uvw.cell_centered(Axis::Z)?),
            p_centers: sim.p_tot.iter().copied().collect(),
            t_centers: sim.thermal.as_ref().map(|th| th.t.val.iter().copied().collect()),
        };
        self.collected_data.push(data_point);
        Ok(())
    }

    pub fn write_final_output(
        &self,
        grid: &Grid3D,
        dt: f64,
        steps_completed: usize,
    ) -> Result<(), SolverError> {
        if self.collected_data.is_empty() {
            info!("No data collected, skipping JSON output to {}.", self.output_filepath);
            return Ok(());
        }
        info!("Writing collected data to JSON file: {}...", self.output_filepath);
        let output_start = Instant::now();
        let (nx, ny, nz) = self.resolution;
        let metadata = Metadata {
            nx,
            ny,
            nz,
            xn: grid.xn.clone(),
            yn: grid.yn.clone(),
            zn: grid.zn.clone(),
            dt,
            num_steps_completed: steps_completed,
            output_frequency: self.output_frequency,
        };
        let output_data = SimulationOutput {
            metadata,
            data: &self.collected_data,
        };
        let json_string = serde_json::to_string_pretty(&output_data)?;
        let file = File::create(&self.output_filepath)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(json_string.as_bytes())?;
        writer.flush()?;
        info!("JSON output finished in {:.2}ms", output_start.elapsed().as_millis());
        Ok(())
    }
}
