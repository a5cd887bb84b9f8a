use ndarray::{Array3, Zip};

use crate::domain::grid3d::{Position, Resolution};

/// Solid mask at cell resolution, `true` marks a solid cell.
#[derive(Debug, Clone, PartialEq)]
pub struct Obstacle {
    mask: Array3<bool>,
}

impl Obstacle {
    pub fn new(mask: Array3<bool>) -> Self {
        Self { mask }
    }

    /// Pure fluid domain.
    pub fn none(resolution: Resolution) -> Self {
        Self::new(Array3::from_elem(resolution, false))
    }

    pub fn from_fn<F>(resolution: Resolution, f: F) -> Self
    where
        F: FnMut((usize, usize, usize)) -> bool,
    {
        Self::new(Array3::from_shape_fn(resolution, f))
    }

    pub fn resolution(&self) -> Resolution {
        self.mask.dim()
    }

    pub fn mask(&self) -> &Array3<bool> {
        &self.mask
    }

    /// True when no cell is solid. Masking is skipped entirely in that case.
    pub fn is_empty(&self) -> bool {
        !self.mask.iter().any(|&s| s)
    }

    pub fn solid_count(&self) -> usize {
        self.mask.iter().filter(|&&s| s).count()
    }

    /// Mask evaluated at `pos`: a face is solid if either cell sharing it is.
    pub fn mask_at(&self, pos: Position) -> Array3<bool> {
        let (nx, ny, nz) = self.mask.dim();
        let m = &self.mask;
        match pos {
            Position::Cell => m.clone(),
            Position::FaceX => Array3::from_shape_fn((nx - 1, ny, nz), |(i, j, k)| {
                m[(i, j, k)] || m[(i + 1, j, k)]
            }),
            Position::FaceY => Array3::from_shape_fn((nx, ny - 1, nz), |(i, j, k)| {
                m[(i, j, k)] || m[(i, j + 1, k)]
            }),
            Position::FaceZ => Array3::from_shape_fn((nx, ny, nz - 1), |(i, j, k)| {
                m[(i, j, k)] || m[(i, j, k + 1)]
            }),
        }
    }
}

/// Returns a copy of `val` with zeros at every location of `pos` covered by
/// the obstacle.
///
/// # Panics
/// If `val` does not have the resolution of `pos`.
pub fn zero_in_obstacle(pos: Position, val: &Array3<f64>, obstacle: &Obstacle) -> Array3<f64> {
    let mask = obstacle.mask_at(pos);
    let mut out = val.clone();
    Zip::from(&mut out).and(&mask).for_each(|v, &solid| {
        if solid {
            *v = 0.0;
        }
    });
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block() -> Obstacle {
        // single solid cell in the middle of a 3x3x2 grid
        Obstacle::from_fn((3, 3, 2), |(i, j, _)| i == 1 && j == 1)
    }

    #[test]
    fn test_empty_obstacle() {
        let obst = Obstacle::none((4, 4, 4));
        assert!(obst.is_empty());
        assert_eq!(obst.solid_count(), 0);
        assert!(!block().is_empty());
        assert_eq!(block().solid_count(), 2);
    }

    #[test]
    fn test_face_masks() {
        let obst = block();
        let mx = obst.mask_at(Position::FaceX);
        assert_eq!(mx.dim(), (2, 3, 2));
        // both x-faces of the solid cell are masked
        assert!(mx[(0, 1, 0)] && mx[(1, 1, 1)]);
        assert!(!mx[(0, 0, 0)] && !mx[(1, 2, 1)]);

        let my = obst.mask_at(Position::FaceY);
        assert_eq!(my.dim(), (3, 2, 2));
        assert!(my[(1, 0, 0)] && my[(1, 1, 0)]);
        assert!(!my[(0, 0, 0)]);

        // solid column spans z, so the single z-face inside it is masked
        let mz = obst.mask_at(Position::FaceZ);
        assert_eq!(mz.dim(), (3, 3, 1));
        assert!(mz[(1, 1, 0)]);
        assert_eq!(mz.iter().filter(|&&s| s).count(), 1);
    }

    #[test]
    fn test_zero_in_obstacle_cell_and_face() {
        let obst = block();
        let c = Array3::from_elem((3, 3, 2), 2.0);
        let zc = zero_in_obstacle(Position::Cell, &c, &obst);
        assert_eq!(zc[(1, 1, 0)], 0.0);
        assert_eq!(zc[(0, 1, 0)], 2.0);
        assert_eq!(zc.sum(), 2.0 * 16.0);

        let u = Array3::from_elem((2, 3, 2), 1.0);
        let zu = zero_in_obstacle(Position::FaceX, &u, &obst);
        assert_eq!(zu.sum(), 8.0);
    }

    #[test]
    fn test_masking_is_idempotent() {
        let obst = block();
        let v = Array3::from_shape_fn((3, 2, 2), |(i, j, k)| 1.0 + (i + j + k) as f64);
        let once = zero_in_obstacle(Position::FaceY, &v, &obst);
        let twice = zero_in_obstacle(Position::FaceY, &once, &obst);
        assert_eq!(once, twice);
    }
}
