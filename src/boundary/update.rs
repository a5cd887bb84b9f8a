use ndarray::Array3;
use tracing::debug;

use crate::boundary::bc3d::{BoundaryKind, Side};
use crate::domain::grid3d::{Axis, Grid3D};
use crate::domain::unknown::Unknown;
use crate::domain::velocity::VelocityTriple;
use crate::numerical::stencil::{first, last};

const TINY: f64 = 1e-20;

/// Interior layer of `val` adjacent to `side`.
fn edge(val: &Array3<f64>, side: Side) -> Array3<f64> {
    if side.is_low() {
        first(side.axis(), val).to_owned()
    } else {
        last(side.axis(), val).to_owned()
    }
}

fn copy_edges<F>(phi: &mut Unknown, mut pick: F)
where
    F: FnMut(Side, BoundaryKind) -> bool,
{
    for side in Side::ALL {
        if pick(side, phi.bnd[side].kind) {
            let layer = edge(&phi.val, side);
            phi.bnd[side].val.assign(&layer);
        }
    }
}

/// Zero-gradient update: every Neumann side takes the adjacent interior values.
pub fn update_neumann_bounds(phi: &mut Unknown) {
    copy_edges(phi, |_, k| k == BoundaryKind::Neumann);
}

/// Zero-gradient update for transported scalars, where outlets behave like
/// Neumann sides.
pub fn update_scalar_bounds(phi: &mut Unknown) {
    copy_edges(phi, |_, k| k != BoundaryKind::Dirichlet);
}

/// Zero-gradient update of the velocity component along `axis`.
///
/// Only Neumann sides tangential to the component are refreshed. On Neumann
/// sides normal to it the component keeps its prescribed value, so the side
/// is a symmetry plane with a fixed normal flux.
pub fn update_velocity_component_bounds(c: &mut Unknown, axis: Axis) {
    copy_edges(c, |side, k| k == BoundaryKind::Neumann && side.axis() != axis);
}

/// Face area of the boundary layer on `side`, shaped like that layer for the
/// velocity component normal to it.
fn boundary_area(grid: &Grid3D, side: Side) -> Array3<f64> {
    edge(&grid.face_area(side.axis()), side)
}

/// Net volume flux entering through all sides except outlets.
fn volume_in(uvw: &VelocityTriple, grid: &Grid3D) -> f64 {
    Side::ALL
        .iter()
        .map(|&side| {
            let b = &uvw.component(side.axis()).bnd[side];
            if b.kind == BoundaryKind::Outlet {
                return 0.0;
            }
            -side.outward_sign() * (&b.val * &boundary_area(grid, side)).sum()
        })
        .sum()
}

fn outlet_sides(uvw: &VelocityTriple) -> Vec<Side> {
    Side::ALL
        .into_iter()
        .filter(|&side| uvw.component(side.axis()).bnd[side].kind == BoundaryKind::Outlet)
        .collect()
}

/// Convective outflow update of the outlet sides.
///
/// The normal component at each outlet is advected out with the bulk outlet
/// velocity, then all outlet values are scaled so that the outflow equals the
/// net inflow through the other sides. Tangential components at outlets get zero gradient.
pub fn update_outlet_bounds(uvw: &mut VelocityTriple, grid: &Grid3D, dt: f64) {
    let outlets = outlet_sides(uvw);
    if outlets.is_empty() {
        return;
    }

    let vol_in = volume_in(uvw, grid);
    let area_out: f64 = outlets.iter().map(|&s| boundary_area(grid, s).sum()).sum();
    let ub = vol_in / area_out;

    for &side in &outlets {
        let axis = side.axis();
        let d_edge = edge(grid.spacing(axis), side);
        let c = uvw.component_mut(axis);
        let interior = edge(&c.val, side);
        let b = &mut c.bnd[side];
        let mut coef = d_edge.mapv(|d| (ub.abs() * dt / d).min(1.0));
        coef *= &(&b.val - &interior);
        b.val -= &coef;
    }

    let vol_out: f64 = outlets
        .iter()
        .map(|&side| {
            let b = &uvw.component(side.axis()).bnd[side];
            side.outward_sign() * (&b.val * &boundary_area(grid, side)).sum()
        })
        .sum();

    for &side in &outlets {
        let b = &mut uvw.component_mut(side.axis()).bnd[side];
        if vol_out.abs() > TINY {
            b.val *= vol_in / vol_out;
        } else {
            b.val.fill(side.outward_sign() * ub);
        }
    }

    for &side in &outlets {
        let (ta, tb) = side.axis().others();
        for axis in [ta, tb] {
            let c = uvw.component_mut(axis);
            let layer = edge(&c.val, side);
            c.bnd[side].val.assign(&layer);
        }
    }

    debug!(vol_in, vol_out, area_out, "outlet boundaries updated");
}

/// Refreshes all non-Dirichlet boundary values of a velocity triple.
pub fn update_velocity_bounds(uvw: &mut VelocityTriple, grid: &Grid3D, dt: f64) {
    for axis in Axis::ALL {
        update_velocity_component_bounds(uvw.component_mut(axis), axis);
    }
    update_outlet_bounds(uvw, grid, dt);
}
