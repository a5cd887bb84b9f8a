use ndarray::Array3;
use serde::{Deserialize, Serialize};

use crate::error::GridError;

/// Cartesian coordinate axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }

    /// The matching ndarray axis, arrays are indexed `[i, j, k]`.
    pub fn nd(self) -> ndarray::Axis {
        ndarray::Axis(self.index())
    }

    /// The two remaining axes, in ascending order.
    pub fn others(self) -> (Axis, Axis) {
        match self {
            Axis::X => (Axis::Y, Axis::Z),
            Axis::Y => (Axis::X, Axis::Z),
            Axis::Z => (Axis::X, Axis::Y),
        }
    }
}

/// Where a variable lives inside a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Position {
    Cell,
    FaceX,
    FaceY,
    FaceZ,
}

impl Position {
    pub fn face(axis: Axis) -> Self {
        match axis {
            Axis::X => Position::FaceX,
            Axis::Y => Position::FaceY,
            Axis::Z => Position::FaceZ,
        }
    }

    /// Axis along which the variable is shifted by half a cell, if any.
    pub fn staggered_axis(self) -> Option<Axis> {
        match self {
            Position::Cell => None,
            Position::FaceX => Some(Axis::X),
            Position::FaceY => Some(Axis::Y),
            Position::FaceZ => Some(Axis::Z),
        }
    }
}

/// Number of values along (x, y, z).
pub type Resolution = (usize, usize, usize);

/// Returns `n + 1` uniformly spaced node coordinates between `start` and `end`.
pub fn nodes(start: f64, end: f64, n: usize) -> Vec<f64> {
    let h = (end - start) / n as f64;
    (0..=n).map(|i| start + h * i as f64).collect()
}

/// Parabolic profile with mean value `mean` at the cell centers between
/// `nodes`, vanishing at both ends.
pub fn parabolic_profile(mean: f64, nodes: &[f64]) -> Vec<f64> {
    let (Some(&lo), Some(&hi)) = (nodes.first(), nodes.last()) else {
        return Vec::new();
    };
    let h = hi - lo;
    nodes
        .windows(2)
        .map(|w| {
            let s = 0.5 * (w[0] + w[1]) - lo;
            6.0 * mean * s * (h - s) / (h * h)
        })
        .collect()
}

/// Cartesian grid with per-cell spacing.
///
/// Face variables exist only on interior faces, boundary faces are held by the
/// boundary descriptors of each unknown. For `nx = 4` along x:
///
/// ```text
///  W |   o   -   o   -   o   -   o   | E
///    ^                               ^
///  bnd[W]     o ... cell (0..4)    bnd[E]
///             - ... x-face (0..3)
/// ```
#[derive(Debug, Clone)]
pub struct Grid3D {
    pub resolution: Resolution,
    pub xn: Vec<f64>,
    pub yn: Vec<f64>,
    pub zn: Vec<f64>,
    pub dx: Array3<f64>,
    pub dy: Array3<f64>,
    pub dz: Array3<f64>,
}

impl Grid3D {
    pub fn from_nodes(xn: &[f64], yn: &[f64], zn: &[f64]) -> Result<Self, GridError> {
        for (name, n) in [("x", xn), ("y", yn), ("z", zn)] {
            if n.len() < 3 {
                return Err(GridError::InvalidGridSize(format!(
                    "at least 2 cells are needed along {}, got {}",
                    name,
                    n.len().saturating_sub(1)
                )));
            }
            if n.windows(2).any(|w| w[1] - w[0] <= 0.0) {
                return Err(GridError::InvalidNodes(format!(
                    "{} nodes must be strictly increasing",
                    name
                )));
            }
        }

        let resolution = (xn.len() - 1, yn.len() - 1, zn.len() - 1);
        let widths = |n: &[f64]| n.windows(2).map(|w| w[1] - w[0]).collect::<Vec<f64>>();
        let (wx, wy, wz) = (widths(xn), widths(yn), widths(zn));

        let dx = Array3::from_shape_fn(resolution, |(i, _, _)| wx[i]);
        let dy = Array3::from_shape_fn(resolution, |(_, j, _)| wy[j]);
        let dz = Array3::from_shape_fn(resolution, |(_, _, k)| wz[k]);

        Ok(Self {
            resolution,
            xn: xn.to_vec(),
            yn: yn.to_vec(),
            zn: zn.to_vec(),
            dx,
            dy,
            dz,
        })
    }

    /// Uniform grid of `resolution` cells spanning `[0, lx] x [0, ly] x [0, lz]`.
    pub fn uniform(resolution: Resolution, lengths: (f64, f64, f64)) -> Result<Self, GridError> {
        let (nx, ny, nz) = resolution;
        if nx < 2 || ny < 2 || nz < 2 {
            return Err(GridError::InvalidGridSize(format!(
                "grid must have at least 2 cells per axis, got {:?}",
                resolution
            )));
        }
        Self::from_nodes(
            &nodes(0.0, lengths.0, nx),
            &nodes(0.0, lengths.1, ny),
            &nodes(0.0, lengths.2, nz),
        )
    }

    pub fn spacing(&self, axis: Axis) -> &Array3<f64> {
        match axis {
            Axis::X => &self.dx,
            Axis::Y => &self.dy,
            Axis::Z => &self.dz,
        }
    }

    pub fn cell_volume(&self) -> Array3<f64> {
        &self.dx * &self.dy * &self.dz
    }

    /// Area of the cell faces normal to `axis`, at cell resolution.
    pub fn face_area(&self, axis: Axis) -> Array3<f64> {
        let (a, b) = axis.others();
        self.spacing(a) * self.spacing(b)
    }

    pub fn cell_count(&self) -> usize {
        self.resolution.0 * self.resolution.1 * self.resolution.2
    }

    /// Resolution of a variable stored at `pos` (`rc`, `ru`, `rv` or `rw`).
    pub fn resolution_of(&self, pos: Position) -> Resolution {
        let (nx, ny, nz) = self.resolution;
        match pos {
            Position::Cell => (nx, ny, nz),
            Position::FaceX => (nx - 1, ny, nz),
            Position::FaceY => (nx, ny - 1, nz),
            Position::FaceZ => (nx, ny, nz - 1),
        }
    }
}
