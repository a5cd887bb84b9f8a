use ndarray::{Array3, ShapeError};

use crate::boundary::bc3d::{BoundaryKind, BoxBoundary, Side};
use crate::domain::grid3d::{Axis, Grid3D, Position, Resolution};
use crate::numerical::stencil::cat;

/// A transported quantity: current and previous values plus boundary layers.
///
/// The shape of `val` and `old` is fixed at creation and equals the grid
/// resolution for `pos`.
#[derive(Debug, Clone)]
pub struct Unknown {
    pub name: String,
    pub pos: Position,
    pub val: Array3<f64>,
    pub old: Array3<f64>,
    pub bnd: BoxBoundary,
}

impl Unknown {
    pub fn new(
        name: &str,
        pos: Position,
        resolution: Resolution,
        default_kind: BoundaryKind,
    ) -> Self {
        Self {
            name: name.to_string(),
            pos,
            val: Array3::zeros(resolution),
            old: Array3::zeros(resolution),
            bnd: BoxBoundary::new(default_kind, resolution),
        }
    }

    /// Creates an unknown sized for `pos` on `grid`.
    pub fn on_grid(name: &str, pos: Position, grid: &Grid3D, default_kind: BoundaryKind) -> Self {
        Self::new(name, pos, grid.resolution_of(pos), default_kind)
    }

    pub fn resolution(&self) -> Resolution {
        self.val.dim()
    }

    /// Snapshot of the current values, taken once per time step.
    pub fn store_old(&mut self) {
        self.old.assign(&self.val);
    }

    /// Values with the boundary layers attached on both ends of `axis`.
    pub fn extended(&self, axis: Axis) -> Result<Array3<f64>, ShapeError> {
        let (lo, hi) = Side::pair(axis);
        cat(axis, &[self.bnd[lo].val.view(), self.val.view(), self.bnd[hi].val.view()])
    }
}
