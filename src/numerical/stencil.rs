use ndarray::{concatenate, Array3, ArrayBase, ArrayView3, Data, Ix3, ShapeError, Slice};

use crate::domain::grid3d::{Axis, Position};

fn head<S: Data<Elem = f64>>(axis: Axis, a: &ArrayBase<S, Ix3>) -> ArrayView3<'_, f64> {
    a.slice_axis(axis.nd(), Slice::new(0, Some(-1), 1))
}

fn tail<S: Data<Elem = f64>>(axis: Axis, a: &ArrayBase<S, Ix3>) -> ArrayView3<'_, f64> {
    a.slice_axis(axis.nd(), Slice::new(1, None, 1))
}

/// First layer along `axis`, kept three-dimensional (extent 1).
pub fn first<S: Data<Elem = f64>>(axis: Axis, a: &ArrayBase<S, Ix3>) -> ArrayView3<'_, f64> {
    a.slice_axis(axis.nd(), Slice::new(0, Some(1), 1))
}

/// Last layer along `axis`, kept three-dimensional (extent 1).
pub fn last<S: Data<Elem = f64>>(axis: Axis, a: &ArrayBase<S, Ix3>) -> ArrayView3<'_, f64> {
    a.slice_axis(axis.nd(), Slice::new(-1, None, 1))
}

/// Arithmetic mean of neighbouring values along `axis`.
///
/// The result is one shorter than the input along `axis`:
///
/// ```text
/// [1, 3, 7]  ->  [2, 5]
/// ```
pub fn avg<S: Data<Elem = f64>>(axis: Axis, a: &ArrayBase<S, Ix3>) -> Array3<f64> {
    (&head(axis, a) + &tail(axis, a)) * 0.5
}

/// Forward difference along `axis`, one shorter than the input.
pub fn dif<S: Data<Elem = f64>>(axis: Axis, a: &ArrayBase<S, Ix3>) -> Array3<f64> {
    &tail(axis, a) - &head(axis, a)
}

/// Joins arrays along `axis`. Fails if the other two extents differ.
pub fn cat(axis: Axis, parts: &[ArrayView3<'_, f64>]) -> Result<Array3<f64>, ShapeError> {
    concatenate(axis.nd(), parts)
}

/// Replicates the first and last layers along `axis`, two longer than the input.
pub fn pad_edges<S: Data<Elem = f64>>(
    axis: Axis,
    a: &ArrayBase<S, Ix3>,
) -> Result<Array3<f64>, ShapeError> {
    cat(axis, &[first(axis, a), a.view(), last(axis, a)])
}

/// Averages a cell-resolution array onto the given position.
///
/// Cell-centered input is returned unchanged for `Position::Cell`, and
/// averaged along the staggering axis for face positions.
pub fn avg_to<S: Data<Elem = f64>>(pos: Position, a: &ArrayBase<S, Ix3>) -> Array3<f64> {
    match pos.staggered_axis() {
        Some(axis) => avg(axis, a),
        None => a.to_owned(),
    }
}

/// Face-normal spacing of the control volumes at `pos`, including domain
/// boundary faces (one longer than the `pos` resolution along `axis`).
///
/// Inside the domain this is the distance between the two nodes sharing the
/// face, at the boundary it is the distance from the last node to the wall.
pub fn face_spacing(pos: Position, axis: Axis, d: &Array3<f64>) -> Result<Array3<f64>, ShapeError> {
    if pos.staggered_axis() == Some(axis) {
        return Ok(d.to_owned());
    }
    let inner = avg(axis, d);
    let lo = first(axis, d).mapv(|v| 0.5 * v);
    let hi = last(axis, d).mapv(|v| 0.5 * v);
    let full = cat(axis, &[lo.view(), inner.view(), hi.view()])?;
    Ok(avg_to(pos, &full))
}

/// Cell property evaluated on the control-volume faces normal to `axis` for
/// variables at `pos`, including domain boundary faces.
///
/// Boundary faces take the value of the adjacent cell.
pub fn face_property(
    pos: Position,
    axis: Axis,
    a: &Array3<f64>,
) -> Result<Array3<f64>, ShapeError> {
    if pos.staggered_axis() == Some(axis) {
        return Ok(a.to_owned());
    }
    let inner = avg(axis, a);
    let full = cat(axis, &[first(axis, a), inner.view(), last(axis, a)])?;
    Ok(avg_to(pos, &full))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array3;

    fn ramp(shape: (usize, usize, usize)) -> Array3<f64> {
        Array3::from_shape_fn(shape, |(i, j, k)| (i * 100 + j * 10 + k) as f64)
    }

    #[test]
    fn test_avg_along_each_axis() {
        let a = ramp((3, 3, 3));
        let ax = avg(Axis::X, &a);
        let ay = avg(Axis::Y, &a);
        let az = avg(Axis::Z, &a);
        assert_eq!(ax.dim(), (2, 3, 3));
        assert_eq!(ay.dim(), (3, 2, 3));
        assert_eq!(az.dim(), (3, 3, 2));
        assert_relative_eq!(ax[(0, 1, 2)], 62.0);
        assert_relative_eq!(ay[(2, 1, 0)], 215.0);
        assert_relative_eq!(az[(1, 1, 1)], 111.5);
    }

    #[test]
    fn test_dif_along_each_axis() {
        let a = ramp((3, 2, 2));
        assert!(dif(Axis::X, &a).iter().all(|&v| v == 100.0));
        assert!(dif(Axis::Y, &a).iter().all(|&v| v == 10.0));
        assert!(dif(Axis::Z, &a).iter().all(|&v| v == 1.0));
        assert_eq!(dif(Axis::X, &a).dim(), (2, 2, 2));
    }

    #[test]
    fn test_cat_and_edges() {
        let a = ramp((2, 3, 2));
        let padded = pad_edges(Axis::Y, &a).unwrap();
        assert_eq!(padded.dim(), (2, 5, 2));
        assert_relative_eq!(padded[(1, 0, 1)], a[(1, 0, 1)]);
        assert_relative_eq!(padded[(1, 4, 1)], a[(1, 2, 1)]);
        assert_relative_eq!(padded[(0, 2, 0)], a[(0, 1, 0)]);

        assert_eq!(first(Axis::Z, &a).dim(), (2, 3, 1));
        assert_eq!(last(Axis::X, &a).dim(), (1, 3, 2));

        let wrong = Array3::<f64>::zeros((1, 2, 2));
        assert!(cat(Axis::X, &[a.view(), wrong.view()]).is_err());
    }

    #[test]
    fn test_avg_to_position() {
        let a = ramp((3, 3, 3));
        assert_eq!(avg_to(Position::Cell, &a), a);
        assert_eq!(avg_to(Position::FaceY, &a).dim(), (3, 2, 3));
        assert_relative_eq!(avg_to(Position::FaceZ, &a)[(0, 0, 0)], 0.5);
    }

    #[test]
    fn test_face_spacing_and_property() {
        let d = Array3::from_elem((4, 2, 2), 0.5);
        let sx = face_spacing(Position::Cell, Axis::X, &d).unwrap();
        assert_eq!(sx.dim(), (5, 2, 2));
        assert_relative_eq!(sx[(0, 0, 0)], 0.25);
        assert_relative_eq!(sx[(2, 0, 0)], 0.5);
        assert_relative_eq!(sx[(4, 1, 1)], 0.25);

        let su = face_spacing(Position::FaceX, Axis::X, &d).unwrap();
        assert_eq!(su.dim(), (4, 2, 2));

        let sv = face_spacing(Position::FaceY, Axis::X, &d).unwrap();
        assert_eq!(sv.dim(), (5, 1, 2));

        let rho = ramp((4, 2, 2));
        let rf = face_property(Position::Cell, Axis::X, &rho).unwrap();
        assert_eq!(rf.dim(), (5, 2, 2));
        assert_relative_eq!(rf[(0, 1, 1)], rho[(0, 1, 1)]);
        assert_relative_eq!(rf[(1, 1, 1)], 0.5 * (rho[(0, 1, 1)] + rho[(1, 1, 1)]));
        assert_relative_eq!(rf[(4, 0, 0)], rho[(3, 0, 0)]);
    }
}
