use ndarray::{Array3, Zip};
use rsparse::data::Sprs;
use serde::{Deserialize, Serialize};

use crate::boundary::bc3d::{BoundaryKind, Side};
use crate::domain::grid3d::{Axis, Grid3D, Resolution};
use crate::domain::obstacle::Obstacle;
use crate::domain::unknown::Unknown;
use crate::error::SolverError;
use crate::linear_solver::sparse_from_triplets;
use crate::numerical::stencil::{avg, avg_to, first, last};

/// Rule for the diffusivity on a face shared by two control volumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FaceAveraging {
    #[default]
    Arithmetic,
    Harmonic,
}

impl FaceAveraging {
    pub fn blend(self, a: f64, b: f64) -> f64 {
        match self {
            FaceAveraging::Arithmetic => 0.5 * (a + b),
            FaceAveraging::Harmonic => {
                if a + b == 0.0 {
                    0.0
                } else {
                    2.0 * a * b / (a + b)
                }
            }
        }
    }
}

/// Sparse operator and right-hand side for one unknown.
///
/// Rows follow the row-major (`[i, j, k]`, `k` fastest) order of the unknown's
/// value array.
pub struct LinearSystem {
    pub matrix: Sprs<f64>,
    pub rhs: Array3<f64>,
}

impl LinearSystem {
    pub fn resolution(&self) -> Resolution {
        self.rhs.dim()
    }
}

/// Linear index of `[i, j, k]` in a field of resolution `res`.
pub fn linear_index(res: Resolution, ijk: [usize; 3]) -> usize {
    (ijk[0] * res.1 + ijk[1]) * res.2 + ijk[2]
}

fn extent(res: Resolution, axis: Axis) -> usize {
    match axis {
        Axis::X => res.0,
        Axis::Y => res.1,
        Axis::Z => res.2,
    }
}

/// Conductances between neighbours along `axis`, one shorter than `mu` along it.
fn interior_conductance(
    axis: Axis,
    mu: &Array3<f64>,
    d: &Array3<f64>,
    area: &Array3<f64>,
    averaging: FaceAveraging,
) -> Array3<f64> {
    let mu_lo = mu.slice_axis(axis.nd(), ndarray::Slice::new(0, Some(-1), 1));
    let mu_hi = mu.slice_axis(axis.nd(), ndarray::Slice::new(1, None, 1));
    let dist = avg(axis, d);
    let face_area = avg(axis, area);
    let mut c = Array3::zeros(dist.dim());
    Zip::from(&mut c)
        .and(&mu_lo)
        .and(&mu_hi)
        .and(&face_area)
        .and(&dist)
        .for_each(|c, &a, &b, &s, &h| *c = averaging.blend(a, b) * s / h);
    c
}

/// Conductance to the wall on `side`, shaped like the boundary layer.
///
/// A variable staggered along the side's axis sits one full cell away from the
/// wall, all others half a cell.
fn boundary_conductance(
    phi: &Unknown,
    side: Side,
    mu: &Array3<f64>,
    d: &Array3<f64>,
    area: &Array3<f64>,
    grid: &Grid3D,
) -> Array3<f64> {
    let axis = side.axis();
    let pick = |a: &Array3<f64>| {
        if side.is_low() {
            first(axis, a).to_owned()
        } else {
            last(axis, a).to_owned()
        }
    };
    let dist = if phi.pos.staggered_axis() == Some(axis) {
        pick(grid.spacing(axis))
    } else {
        pick(d) * 0.5
    };
    pick(mu) * pick(area) / dist
}

/// Assembles the implicit diffusion operator for `phi`.
///
/// * `inn` - accumulation coefficient per cell (e.g. `rho / dt`), multiplied by
///   the control volume on the diagonal
/// * `mu` - diffusivity per cell
/// * `obstacle_kind` - condition imposed on faces shared with solid cells:
///   `Dirichlet` treats them as walls at zero value, anything else as
///   insulated
///
/// Dirichlet sides move the prescribed value times conductance into the
/// right-hand side, Neumann and Outlet sides carry no diffusive flux. Rows of
/// solid cells become identity rows with a zero right-hand side.
pub fn create_matrix(
    phi: &Unknown,
    inn: &Array3<f64>,
    mu: &Array3<f64>,
    grid: &Grid3D,
    obstacle: &Obstacle,
    obstacle_kind: BoundaryKind,
    averaging: FaceAveraging,
) -> Result<LinearSystem, SolverError> {
    let pos = phi.pos;
    let res = phi.resolution();

    let inn_p = avg_to(pos, inn);
    let mu_p = avg_to(pos, mu);
    if mu_p.dim() != res || inn_p.dim() != res {
        return Err(SolverError::InvalidParameter(format!(
            "properties for '{}' have shape {:?}, expected {:?}",
            phi.name,
            mu_p.dim(),
            res
        )));
    }
    let d_p = Axis::ALL.map(|a| avg_to(pos, grid.spacing(a)));
    let vol_p = &d_p[0] * &d_p[1] * &d_p[2];
    let area_p = Axis::ALL.map(|a| {
        let (b, c) = a.others();
        &d_p[b.index()] * &d_p[c.index()]
    });

    let links = Axis::ALL.map(|a| {
        interior_conductance(a, &mu_p, &d_p[a.index()], &area_p[a.index()], averaging)
    });
    let walls = Side::ALL.map(|s| {
        let a = s.axis().index();
        if phi.bnd[s].kind == BoundaryKind::Dirichlet {
            boundary_conductance(phi, s, &mu_p, &d_p[a], &area_p[a], grid)
        } else {
            Array3::zeros(phi.bnd[s].val.dim())
        }
    });

    let solid = if obstacle.is_empty() {
        None
    } else {
        Some(obstacle.mask_at(pos))
    };
    let is_solid = |ijk: [usize; 3]| solid.as_ref().map_or(false, |m| m[ijk]);

    let n = res.0 * res.1 * res.2;
    let mut triplets: Vec<(usize, usize, f64)> = Vec::with_capacity(7 * n);
    let mut rhs = Array3::<f64>::zeros(res);

    for ((i, j, k), &accumulation) in inn_p.indexed_iter() {
        let ijk = [i, j, k];
        let row = linear_index(res, ijk);

        if is_solid(ijk) {
            triplets.push((row, row, 1.0));
            continue;
        }

        let mut diag = accumulation * vol_p[ijk];
        let mut b = 0.0;

        for axis in Axis::ALL {
            let a = axis.index();
            let len = extent(res, axis);
            let (lo_side, hi_side) = Side::pair(axis);

            // low neighbour or wall
            if ijk[a] == 0 {
                let mut wall_ix = ijk;
                wall_ix[a] = 0;
                let c = walls[lo_side.index()][wall_ix];
                diag += c;
                b += c * phi.bnd[lo_side].val[wall_ix];
            } else {
                let mut nb = ijk;
                nb[a] -= 1;
                let c = links[a][nb];
                couple(&mut triplets, &mut diag, row, res, nb, c, is_solid(nb), obstacle_kind);
            }

            // high neighbour or wall
            if ijk[a] == len - 1 {
                let mut wall_ix = ijk;
                wall_ix[a] = 0;
                let c = walls[hi_side.index()][wall_ix];
                diag += c;
                b += c * phi.bnd[hi_side].val[wall_ix];
            } else {
                let mut nb = ijk;
                nb[a] += 1;
                let c = links[a][ijk];
                couple(&mut triplets, &mut diag, row, res, nb, c, is_solid(nb), obstacle_kind);
            }
        }

        triplets.push((row, row, diag));
        rhs[ijk] = b;
    }

    let matrix = sparse_from_triplets(n, &triplets).map_err(SolverError::LinearSolver)?;
    Ok(LinearSystem { matrix, rhs })
}

#[allow(clippy::too_many_arguments)]
fn couple(
    triplets: &mut Vec<(usize, usize, f64)>,
    diag: &mut f64,
    row: usize,
    res: Resolution,
    nb: [usize; 3],
    c: f64,
    nb_solid: bool,
    obstacle_kind: BoundaryKind,
) {
    if !nb_solid {
        *diag += c;
        triplets.push((row, linear_index(res, nb), -c));
    } else if obstacle_kind == BoundaryKind::Dirichlet {
        // wall at zero value: keeps the conductance, adds nothing to the rhs
        *diag += c;
    }
}
