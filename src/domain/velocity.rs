use ndarray::Array3;
use serde::{Deserialize, Serialize};

use crate::boundary::bc3d::BoundaryKind;
use crate::domain::grid3d::{Axis, Grid3D, Position};
use crate::domain::unknown::Unknown;
use crate::error::SolverError;
use crate::numerical::stencil::{avg, dif, pad_edges};

/// Three velocity components addressed by axis.
#[derive(Debug, Clone)]
pub struct VelocityTriple {
    pub u: Unknown,
    pub v: Unknown,
    pub w: Unknown,
}

impl VelocityTriple {
    pub fn new(u: Unknown, v: Unknown, w: Unknown) -> Self {
        Self { u, v, w }
    }

    /// Face-centered components: u on x-faces, v on y-faces, w on z-faces.
    pub fn staggered(grid: &Grid3D, kind: BoundaryKind) -> Self {
        Self {
            u: Unknown::on_grid("face-u-vel", Position::FaceX, grid, kind),
            v: Unknown::on_grid("face-v-vel", Position::FaceY, grid, kind),
            w: Unknown::on_grid("face-w-vel", Position::FaceZ, grid, kind),
        }
    }

    /// Cell-centered components.
    pub fn collocated(grid: &Grid3D, kind: BoundaryKind) -> Self {
        Self {
            u: Unknown::on_grid("cell-u-vel", Position::Cell, grid, kind),
            v: Unknown::on_grid("cell-v-vel", Position::Cell, grid, kind),
            w: Unknown::on_grid("cell-w-vel", Position::Cell, grid, kind),
        }
    }

    pub fn component(&self, axis: Axis) -> &Unknown {
        match axis {
            Axis::X => &self.u,
            Axis::Y => &self.v,
            Axis::Z => &self.w,
        }
    }

    pub fn component_mut(&mut self, axis: Axis) -> &mut Unknown {
        match axis {
            Axis::X => &mut self.u,
            Axis::Y => &mut self.v,
            Axis::Z => &mut self.w,
        }
    }

    pub fn store_old(&mut self) {
        for axis in Axis::ALL {
            self.component_mut(axis).store_old();
        }
    }

    /// Velocity components averaged to cell centers.
    ///
    /// Face components are averaged together with their boundary layers.
    pub fn cell_centered(&self, axis: Axis) -> Result<Array3<f64>, SolverError> {
        let c = self.component(axis);
        match c.pos.staggered_axis() {
            Some(a) => Ok(avg(a, &c.extended(a)?)),
            None => Ok(c.val.clone()),
        }
    }
}

/// Variable arrangement, fixed when the velocity field is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Arrangement {
    #[default]
    Collocated,
    Staggered,
}

impl Arrangement {
    /// Pressure gradient along `axis` at the location of the momentum unknowns.
    ///
    /// The raw gradient lives on interior faces. Collocated unknowns get it
    /// averaged back to cell centers after replicating the edge values, so the
    /// boundary cells see a one-sided gradient.
    pub fn gradient_at(
        self,
        axis: Axis,
        p: &Array3<f64>,
        grid: &Grid3D,
    ) -> Result<Array3<f64>, SolverError> {
        let staggered = dif(axis, p) / avg(axis, grid.spacing(axis));
        match self {
            Arrangement::Staggered => Ok(staggered),
            Arrangement::Collocated => Ok(avg(axis, &pad_edges(axis, &staggered)?)),
        }
    }
}

/// Velocity storage for either arrangement.
///
/// Collocated runs solve momentum for cell-centered components and carry a
/// separate face triple for fluxes. Staggered runs solve directly for the face
/// components.
#[derive(Debug, Clone)]
pub enum VelocityField {
    Collocated {
        cell: VelocityTriple,
        face: VelocityTriple,
    },
    Staggered {
        face: VelocityTriple,
    },
}

impl VelocityField {
    pub fn collocated(grid: &Grid3D) -> Self {
        VelocityField::Collocated {
            cell: VelocityTriple::collocated(grid, BoundaryKind::Dirichlet),
            face: VelocityTriple::staggered(grid, BoundaryKind::Dirichlet),
        }
    }

    pub fn staggered(grid: &Grid3D) -> Self {
        VelocityField::Staggered {
            face: VelocityTriple::staggered(grid, BoundaryKind::Dirichlet),
        }
    }

    pub fn new(arrangement: Arrangement, grid: &Grid3D) -> Self {
        match arrangement {
            Arrangement::Collocated => Self::collocated(grid),
            Arrangement::Staggered => Self::staggered(grid),
        }
    }

    pub fn arrangement(&self) -> Arrangement {
        match self {
            VelocityField::Collocated { .. } => Arrangement::Collocated,
            VelocityField::Staggered { .. } => Arrangement::Staggered,
        }
    }

    pub fn faces(&self) -> &VelocityTriple {
        match self {
            VelocityField::Collocated { face, .. } | VelocityField::Staggered { face } => face,
        }
    }

    pub fn faces_mut(&mut self) -> &mut VelocityTriple {
        match self {
            VelocityField::Collocated { face, .. } | VelocityField::Staggered { face } => face,
        }
    }

    /// The triple holding the momentum unknowns.
    pub fn solved(&self) -> &VelocityTriple {
        match self {
            VelocityField::Collocated { cell, .. } => cell,
            VelocityField::Staggered { face } => face,
        }
    }

    pub fn solved_mut(&mut self) -> &mut VelocityTriple {
        match self {
            VelocityField::Collocated { cell, .. } => cell,
            VelocityField::Staggered { face } => face,
        }
    }

    pub fn store_old(&mut self) {
        match self {
            VelocityField::Collocated { cell, face } => {
                cell.store_old();
                face.store_old();
            }
            VelocityField::Staggered { face } => face.store_old(),
        }
    }
}
