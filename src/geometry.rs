//! Plane geometry for the triangulated corrector: triangles, containment and affine maps.
#![allow(non_snake_case)]

use std::ops::{Deref, Index};

use nalgebra::{Matrix2, Vector2, vector};

use crate::Float;
use crate::error::Result;
use crate::matrix::invert_2x2;

/// Signed areas are divided by this before summing, which keeps encoder-step scale coordinates
/// well inside `f64` range.
pub(crate) const AREA_SCALE: f64 = 10_000.;

/// Maximum difference between a triangle's area and the sum of the three sub-triangles around a
/// point that still counts as inside, in scaled area units.
pub(crate) const CONTAINMENT_TOLERANCE: f64 = 2.;

#[derive(Debug, Clone, PartialEq)]
pub struct Triangle<F: Float> {
    vertices: [Vector2<F>; 3],
}

impl<F: Float> Triangle<F> {
    pub(crate) fn new(vertex1: Vector2<F>, vertex2: Vector2<F>, vertex3: Vector2<F>) -> Self {
        Self {
            vertices: [vertex1, vertex2, vertex3],
        }
    }

    /// Calculate the centroid.
    pub(crate) fn centroid(&self) -> Vector2<F> {
        let three: F = nalgebra::convert(3.);
        let x = (self[0][0] + self[1][0] + self[2][0]) / three;
        let y = (self[0][1] + self[1][1] + self[2][1]) / three;
        vector![x, y]
    }

    /// Scaled area, see [`AREA_SCALE`].
    pub(crate) fn area(&self) -> F {
        scaled_area(&self[0], &self[1], &self[2])
    }

    /// Whether `point` lies inside, by comparing the area with the sum of the three triangles the
    /// point forms with each edge.
    pub(crate) fn contains(&self, point: &Vector2<F>) -> bool {
        let total = self.area();
        let a1 = scaled_area(point, &self[1], &self[2]);
        let a2 = scaled_area(&self[0], point, &self[2]);
        let a3 = scaled_area(&self[0], &self[1], point);
        (total - a1 - a2 - a3).abs() < nalgebra::convert(CONTAINMENT_TOLERANCE)
    }
}

fn scaled_area<F: Float>(p1: &Vector2<F>, p2: &Vector2<F>, p3: &Vector2<F>) -> F {
    let scale: F = nalgebra::convert(AREA_SCALE);
    let two: F = nalgebra::convert(2.);
    let (x1, y1, x2, y2, x3, y3) = (p1[0], p1[1], p2[0], p2[1], p3[0], p3[1]);
    let sum =
        (x2 * y1 - x1 * y2) / scale + (x3 * y2 - x2 * y3) / scale + (x1 * y3 - x3 * y1) / scale;
    sum.abs() / two
}

impl<F: Float> Deref for Triangle<F> {
    type Target = [Vector2<F>; 3];

    fn deref(&self) -> &Self::Target {
        &self.vertices
    }
}

impl<F: Float> Index<usize> for Triangle<F> {
    type Output = Vector2<F>;

    fn index(&self, index: usize) -> &Self::Output {
        &self.vertices[index]
    }
}

/// `p ↦ L p + t`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineMap<F: Float> {
    pub(crate) linear: Matrix2<F>,
    pub(crate) translation: Vector2<F>,
}

impl<F: Float> AffineMap<F> {
    /// The affine map sending the vertices of `source` onto those of `destination`.
    ///
    /// With `S = [a2 - a1, a3 - a1]` and `D = [m2 - m1, m3 - m1]` as columns, `L = D S⁻¹` and
    /// `t = m1 - L a1`.
    pub(crate) fn between(source: &Triangle<F>, destination: &Triangle<F>) -> Result<Self> {
        let S = Matrix2::from_columns(&[source[1] - source[0], source[2] - source[0]]);
        let D = Matrix2::from_columns(&[
            destination[1] - destination[0],
            destination[2] - destination[0],
        ]);
        let L = D * invert_2x2(&S)?;
        let t = destination[0] - L * source[0];

        Ok(Self {
            linear: L,
            translation: t,
        })
    }

    pub(crate) fn apply(&self, point: &Vector2<F>) -> Vector2<F> {
        self.linear * point + self.translation
    }
}

/// Build the map from the `a` triangle to the `m` triangle, and report whether `target` lies
/// inside the `m` triangle. A target at `x + y == 0` never counts as inside.
pub(crate) fn assemble_matrix<F: Float>(
    target: &Vector2<F>,
    a: &Triangle<F>,
    m: &Triangle<F>,
) -> Result<(AffineMap<F>, bool)> {
    let map = AffineMap::between(a, m)?;
    let inside = target[0] + target[1] != F::zero() && m.contains(target);
    Ok((map, inside))
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use nalgebra::Rotation2;
    use rand::Rng;

    use super::*;
    use crate::error::AlignmentError;

    fn triangle(points: [[f64; 2]; 3]) -> Triangle<f64> {
        Triangle::new(
            vector![points[0][0], points[0][1]],
            vector![points[1][0], points[1][1]],
            vector![points[2][0], points[2][1]],
        )
    }

    #[test]
    fn centroid_and_area() {
        let t = triangle([[0., 0.], [300., 0.], [0., 600.]]);
        assert_abs_diff_eq!(t.centroid(), vector![100., 200.], epsilon = 1e-12);
        assert_abs_diff_eq!(t.area(), 300. * 600. / 2. / AREA_SCALE, epsilon = 1e-12);
    }

    #[test]
    fn containment() {
        let t = triangle([[0., 0.], [1000., 0.], [0., 1000.]]);
        assert!(t.contains(&vector![100., 100.]));
        assert!(t.contains(&vector![0., 0.]));
        assert!(t.contains(&vector![499., 499.]));
        assert!(!t.contains(&vector![2000., 2000.]));
        assert!(!t.contains(&vector![-500., 200.]));
    }

    #[test]
    fn affine_map_reproduces_vertices() {
        let mut rng = rand::rng();
        for _ in 0..20 {
            let a = triangle([
                [rng.random_range(-200.0..200.0), rng.random_range(-200.0..200.0)],
                [rng.random_range(-200.0..200.0), rng.random_range(-200.0..200.0)],
                [rng.random_range(-200.0..200.0), rng.random_range(-200.0..200.0)],
            ]);
            if a.area() < 1e-3 {
                continue;
            }
            let rot = Rotation2::new(rng.random_range(-0.1..0.1));
            let shift = vector![rng.random_range(-2.0..2.0), rng.random_range(-2.0..2.0)];
            let m = Triangle::new(rot * a[0] + shift, rot * a[1] + shift, rot * a[2] + shift);

            let map = AffineMap::between(&a, &m).unwrap();
            for i in 0..3 {
                assert_abs_diff_eq!(map.apply(&a[i]), m[i], epsilon = 1e-8);
            }
            let inner = a.centroid();
            assert_abs_diff_eq!(map.apply(&inner), rot * inner + shift, epsilon = 1e-8);
        }
    }

    #[test]
    fn assemble() {
        let a = triangle([[0., 0.], [1000., 0.], [0., 1000.]]);
        let m = triangle([[10., 5.], [1010., 5.], [10., 1005.]]);

        let (map, inside) = assemble_matrix(&vector![200., 300.], &a, &m).unwrap();
        assert!(inside);
        assert_abs_diff_eq!(map.apply(&vector![200., 300.]), vector![210., 305.], epsilon = 1e-9);

        let (_, inside) = assemble_matrix(&vector![2000., 2000.], &a, &m).unwrap();
        assert!(!inside);

        let (_, inside) = assemble_matrix(&vector![200., -200.], &a, &m).unwrap();
        assert!(!inside);
    }

    #[test]
    fn assemble_degenerate() {
        let a = triangle([[0., 0.], [1., 1.], [2., 2.]]);
        let m = triangle([[0., 0.], [1., 0.], [0., 1.]]);
        assert!(matches!(
            assemble_matrix(&vector![0.5, 0.5], &a, &m),
            Err(AlignmentError::SingularMatrix { .. })
        ));
    }
}
