//! Triangulated affine corrector.
//!
//! The target is located in the Cartesian projection of the source space, a triangle of
//! calibration points around it is chosen, and the affine map between that triangle and the same
//! points in the destination space is applied to the target.

use std::cmp::Ordering;

use itertools::Itertools;
use log::debug;
use nalgebra::Vector2;

use crate::angle::range_plus_minus_180;
use crate::config::{PointFilterMode, ThreePointMode, TriangleDistance};
use crate::coordinates::{AxisPosition, CartesianCoordinate, PierSide, TimeRecord};
use crate::error::Result;
use crate::geometry::{Triangle, assemble_matrix};
use crate::model::{Corrector, Direction, ModelState};
use crate::notification::NotificationKind;

/// Outcome of mapping a position through a calibration triangle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TriangleMapping {
    /// The mapped axes.
    pub axes: AxisPosition,
    /// Ids of the three points spanning the triangle.
    pub triangle: [u32; 3],
    /// Whether the position lies inside the destination triangle.
    pub in_triangle: bool,
}

fn triangle(xy: &[CartesianCoordinate], indices: &[usize]) -> Triangle<f64> {
    Triangle::new(
        xy[indices[0]].to_vector(),
        xy[indices[1]].to_vector(),
        xy[indices[2]].to_vector(),
    )
}

fn by_distance(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

/// Triangle and nearest point search over one space's projected points.
#[derive(Clone, Copy, Debug)]
pub(crate) struct TriangleSearch<'a> {
    xy: &'a [CartesianCoordinate],
    axes: &'a [AxisPosition],
    filter: PointFilterMode,
    mode: ThreePointMode,
    distance: TriangleDistance,
    max_combinations: usize,
}

impl<'a> TriangleSearch<'a> {
    pub(crate) fn new(xy: &'a [CartesianCoordinate], axes: &'a [AxisPosition]) -> Self {
        Self {
            xy,
            axes,
            filter: PointFilterMode::default(),
            mode: ThreePointMode::default(),
            distance: TriangleDistance::default(),
            max_combinations: 50,
        }
    }

    pub(crate) fn with_filter(mut self, filter: PointFilterMode) -> Self {
        self.filter = filter;
        self
    }

    pub(crate) fn with_mode(mut self, mode: ThreePointMode) -> Self {
        self.mode = mode;
        self
    }

    pub(crate) fn with_distance(mut self, distance: TriangleDistance) -> Self {
        self.distance = distance;
        self
    }

    pub(crate) fn with_max_combinations(mut self, max_combinations: usize) -> Self {
        self.max_combinations = max_combinations;
        self
    }

    fn passes_filter(&self, index: usize, target: &CartesianCoordinate) -> bool {
        let point = &self.xy[index];
        match self.filter {
            PointFilterMode::AllPoints => true,
            PointFilterMode::Meridian => point.y * target.y >= 0.,
            PointFilterMode::LocalQuadrant => point.quadrant() == target.quadrant(),
        }
    }

    fn distance_to(
        &self,
        index: usize,
        target_xy: &CartesianCoordinate,
        target_axes: &AxisPosition,
    ) -> f64 {
        match self.distance {
            TriangleDistance::Cartesian => self.xy[index].distance_squared(target_xy),
            TriangleDistance::Polar => {
                let axes = &self.axes[index];
                range_plus_minus_180(axes.ra_axis - target_axes.ra_axis).powi(2)
                    + (axes.dec_axis - target_axes.dec_axis).powi(2)
            }
        }
    }

    /// Filtered points, nearest first, with their squared distances.
    fn ranked(
        &self,
        target_xy: &CartesianCoordinate,
        target_axes: &AxisPosition,
    ) -> Vec<(usize, f64)> {
        (0..self.xy.len())
            .filter(|&i| self.passes_filter(i, target_xy))
            .map(|i| (i, self.distance_to(i, target_xy, target_axes)))
            .sorted_by(|a, b| by_distance(a.1, b.1))
            .collect()
    }

    /// Candidates for the combination search, or the answer if the store is too small to search.
    fn candidates(
        &self,
        target_xy: &CartesianCoordinate,
        target_axes: &AxisPosition,
    ) -> std::result::Result<Vec<usize>, Option<[usize; 3]>> {
        match self.xy.len() {
            0..=2 => Err(None),
            3 => Err(Some([0, 1, 2])),
            _ => {
                let candidates = self
                    .ranked(target_xy, target_axes)
                    .into_iter()
                    .take(self.max_combinations)
                    .map(|(i, _)| i)
                    .collect_vec();
                if candidates.len() < 3 { Err(None) } else { Ok(candidates) }
            }
        }
    }

    /// The triangle of points to map `target` through.
    ///
    /// Three points are always used as they are. With more, combinations of the nearest points are
    /// searched for one containing the target.
    pub(crate) fn select(
        &self,
        target_xy: &CartesianCoordinate,
        target_axes: &AxisPosition,
    ) -> Option<[usize; 3]> {
        let candidates = match self.candidates(target_xy, target_axes) {
            Ok(c) => c,
            Err(answer) => return answer,
        };
        let target = target_xy.to_vector();

        let containing = candidates
            .iter()
            .copied()
            .combinations(3)
            .map(|c| (triangle(self.xy, &c), c))
            .filter(|(t, _)| t.contains(&target));

        let found = match self.mode {
            ThreePointMode::NearestTriangle => containing.map(|(_, c)| c).next(),
            ThreePointMode::TriangleWithNearestCentre => containing
                .map(|(t, c)| ((t.centroid() - target).norm_squared(), c))
                .min_by(|a, b| by_distance(a.0, b.0))
                .map(|(_, c)| c),
        };
        found.map(|c| [c[0], c[1], c[2]])
    }

    /// Nearest point passing the filter.
    pub(crate) fn nearest(
        &self,
        target_xy: &CartesianCoordinate,
        target_axes: &AxisPosition,
    ) -> Option<usize> {
        self.ranked(target_xy, target_axes).first().map(|(i, _)| *i)
    }
}

#[cfg(feature = "parallel")]
mod parallel {
    use super::*;
    use rayon::prelude::*;

    impl TriangleSearch<'_> {
        /// Same as [`select`](TriangleSearch::select), with the combinations checked in parallel.
        pub(crate) fn select_par(
            &self,
            target_xy: &CartesianCoordinate,
            target_axes: &AxisPosition,
        ) -> Option<[usize; 3]> {
            let candidates = match self.candidates(target_xy, target_axes) {
                Ok(c) => c,
                Err(answer) => return answer,
            };
            let target = target_xy.to_vector();
            let combinations = candidates.iter().copied().combinations(3).collect_vec();

            let containing = combinations
                .par_iter()
                .enumerate()
                .map(|(order, c)| (order, triangle(self.xy, c), c))
                .filter(|(_, t, _)| t.contains(&target));

            let found = match self.mode {
                ThreePointMode::NearestTriangle => {
                    containing.find_first(|_| true).map(|(_, _, c)| c)
                }
                ThreePointMode::TriangleWithNearestCentre => containing
                    .map(|(order, t, c)| ((t.centroid() - target).norm_squared(), order, c))
                    .min_by(|a, b| by_distance(a.0, b.0).then(a.1.cmp(&b.1)))
                    .map(|(_, _, c)| c),
            };
            found.map(|c| [c[0], c[1], c[2]])
        }
    }
}

/// The affine corrector.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct TriangulatedAffine;

impl TriangulatedAffine {
    /// Map `target` through the triangle around it. `Ok(None)` when no triangle qualifies.
    pub(crate) fn delta_matrix(
        state: &mut ModelState,
        target: AxisPosition,
        direction: Direction,
        time: &TimeRecord,
    ) -> Result<Option<TriangleMapping>> {
        let method = direction.map_method();
        let source = direction.source();
        let destination = direction.destination();
        let target_xy = state.projection.axes_to_cartesian(&target, time);

        let search = state.triangle_search(source);
        #[cfg(feature = "parallel")]
        let selected = search.select_par(&target_xy, &target);
        #[cfg(not(feature = "parallel"))]
        let selected = search.select(&target_xy, &target);

        let Some(indices) = selected else {
            debug!("{method}: no triangle around {target}.");
            return Ok(None);
        };

        let a = triangle(state.cache.xy(source), &indices);
        let m = triangle(state.cache.xy(destination), &indices);
        let (map, in_triangle) = assemble_matrix(&target_xy.to_vector(), &a, &m)?;

        let mapped: Vector2<f64> = map.apply(&target_xy.to_vector());
        let mapped = CartesianCoordinate::from_vector(mapped, target_xy.side);
        let axes = state.projection.cartesian_to_axes(&mapped, time);

        state.points.select(&indices);
        let ids = indices.map(|i| state.points[i].id);
        state.notify(
            NotificationKind::Data,
            method,
            format!(
                "Triangle ({:03}) ({:03}) ({:03}), inside: {in_triangle}, {target_xy} -> {mapped}",
                ids[0], ids[1], ids[2]
            ),
        );

        Ok(Some(TriangleMapping {
            axes,
            triangle: ids,
            in_triangle,
        }))
    }

    fn nearest_delta(
        state: &mut ModelState,
        target: &AxisPosition,
        direction: Direction,
        time: &TimeRecord,
    ) -> AxisPosition {
        let target_xy = state.projection.axes_to_cartesian(target, time);
        let search = state.triangle_search(direction.source());
        let Some(index) = search.nearest(&target_xy, target) else {
            return AxisPosition::default();
        };
        state.points.select(&[index]);
        let point = &state.points[index];
        let delta = direction.delta(point);
        let message = format!("Using nearest point {:03}, offset {}", point.id, delta);
        state.notify(NotificationKind::Data, direction.method(), message);
        delta
    }
}

impl Corrector for TriangulatedAffine {
    fn correct(
        &self,
        state: &mut ModelState,
        target: AxisPosition,
        _pier_side: PierSide,
        direction: Direction,
        time: &TimeRecord,
    ) -> AxisPosition {
        let method = direction.method();
        state.points.clear_selection();

        let corrected = match state.points.len() {
            0 => target,
            1 => {
                state.points.select(&[0]);
                target + direction.orient(state.one_star_adjustment)
            }
            2 => target + Self::nearest_delta(state, &target, direction, time),
            _ => {
                let fallback = state.settings.nearest_fallback;
                match Self::delta_matrix(state, target, direction, time) {
                    Ok(Some(mapping)) if mapping.in_triangle || !fallback => mapping.axes,
                    Ok(_) if fallback => {
                        target + Self::nearest_delta(state, &target, direction, time)
                    }
                    Ok(_) => target,
                    Err(e) => {
                        state.notify(NotificationKind::Warning, method, e.to_string());
                        if fallback {
                            target + Self::nearest_delta(state, &target, direction, time)
                        } else {
                            target
                        }
                    }
                }
            }
        };

        state.notify(
            NotificationKind::Information,
            method,
            format!("{target} -> {corrected}"),
        );
        corrected
    }
}
