use std::fmt;
use std::ops::{Index, IndexMut};
use std::str::FromStr;

use ndarray::Array3;
use serde::{Deserialize, Serialize};

use crate::domain::grid3d::{Axis, Resolution};
use crate::error::BoundaryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoundaryKind {
    Dirichlet,
    Neumann,
    Outlet,
}

impl FromStr for BoundaryKind {
    type Err = BoundaryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "dirichlet" => Ok(BoundaryKind::Dirichlet),
            "neumann" => Ok(BoundaryKind::Neumann),
            "outlet" => Ok(BoundaryKind::Outlet),
            other => Err(BoundaryError::InvalidBoundaryCondition(format!(
                "unknown boundary kind '{}'",
                other
            ))),
        }
    }
}

/// The six sides of the box: west/east (x), south/north (y), bottom/top (z).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    W,
    E,
    S,
    N,
    B,
    T,
}

impl Side {
    pub const ALL: [Side; 6] = [Side::W, Side::E, Side::S, Side::N, Side::B, Side::T];

    pub fn of(axis: Axis, low: bool) -> Side {
        match (axis, low) {
            (Axis::X, true) => Side::W,
            (Axis::X, false) => Side::E,
            (Axis::Y, true) => Side::S,
            (Axis::Y, false) => Side::N,
            (Axis::Z, true) => Side::B,
            (Axis::Z, false) => Side::T,
        }
    }

    /// Low and high side along `axis`.
    pub fn pair(axis: Axis) -> (Side, Side) {
        (Side::of(axis, true), Side::of(axis, false))
    }

    pub fn axis(self) -> Axis {
        match self {
            Side::W | Side::E => Axis::X,
            Side::S | Side::N => Axis::Y,
            Side::B | Side::T => Axis::Z,
        }
    }

    pub fn is_low(self) -> bool {
        matches!(self, Side::W | Side::S | Side::B)
    }

    /// +1 where a positive velocity leaves the domain, -1 where it enters.
    pub fn outward_sign(self) -> f64 {
        if self.is_low() {
            -1.0
        } else {
            1.0
        }
    }

    pub fn index(self) -> usize {
        match self {
            Side::W => 0,
            Side::E => 1,
            Side::S => 2,
            Side::N => 3,
            Side::B => 4,
            Side::T => 5,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Shape of the boundary layer of a `resolution`-sized field on `side`.
pub fn boundary_shape(resolution: Resolution, side: Side) -> Resolution {
    let (nx, ny, nz) = resolution;
    match side.axis() {
        Axis::X => (1, ny, nz),
        Axis::Y => (nx, 1, nz),
        Axis::Z => (nx, ny, 1),
    }
}

/// Condition on one side of one unknown.
#[derive(Debug, Clone, PartialEq)]
pub struct Boundary {
    pub kind: BoundaryKind,
    pub val: Array3<f64>,
}

impl Boundary {
    pub fn new(kind: BoundaryKind, shape: Resolution) -> Self {
        Self {
            kind,
            val: Array3::zeros(shape),
        }
    }
}

/// Boundary descriptors for all six sides of a field.
#[derive(Debug, Clone, PartialEq)]
pub struct BoxBoundary {
    sides: [Boundary; 6],
}

impl BoxBoundary {
    pub fn new(kind: BoundaryKind, resolution: Resolution) -> Self {
        Self {
            sides: Side::ALL.map(|s| Boundary::new(kind, boundary_shape(resolution, s))),
        }
    }

    /// Sets the kind of `side` and fills its value layer with `value`.
    pub fn set(&mut self, side: Side, kind: BoundaryKind, value: f64) {
        let b = &mut self[side];
        b.kind = kind;
        b.val.fill(value);
    }

    /// Sets `side` with a full value layer.
    pub fn set_values(
        &mut self,
        side: Side,
        kind: BoundaryKind,
        val: Array3<f64>,
    ) -> Result<(), BoundaryError> {
        let b = &mut self[side];
        if val.dim() != b.val.dim() {
            return Err(BoundaryError::InvalidShape {
                side: side.to_string(),
                expected: b.val.dim(),
                found: val.dim(),
            });
        }
        b.kind = kind;
        b.val = val;
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = (Side, &Boundary)> {
        Side::ALL.into_iter().zip(self.sides.iter())
    }
}

impl Index<Side> for BoxBoundary {
    type Output = Boundary;

    fn index(&self, side: Side) -> &Boundary {
        &self.sides[side.index()]
    }
}

impl IndexMut<Side> for BoxBoundary {
    fn index_mut(&mut self, side: Side) -> &mut Boundary {
        &mut self.sides[side.index()]
    }
}
