//! Local regression corrector.
//!
//! The offset at a target is fitted per axis as `c + a·ra² + b·dec²` over the nearest
//! calibration points on the same pier side. With too few points it degrades to the nearest
//! point's offset.

use std::fmt::Write;

use log::debug;
use nalgebra::DMatrix;

use crate::angle::range_plus_minus_180;
use crate::coordinates::{AxisPosition, PierSide, TimeRecord};
use crate::error::Result;
use crate::matrix::{format_matrix, solve_normal_equation};
use crate::model::{Corrector, Direction, ModelState};
use crate::notification::NotificationKind;
use crate::point::AlignmentPoint;

/// The quadratic per-axis least-squares corrector.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct LocalRegression;

/// Result of a successful fit.
#[derive(Clone, Debug)]
pub(crate) struct Fit {
    pub(crate) offset: AxisPosition,
    pub(crate) features: DMatrix<f64>,
    pub(crate) values: DMatrix<f64>,
    pub(crate) theta: DMatrix<f64>,
}

impl Fit {
    fn report(&self, ids: &[u32], target: &AxisPosition) -> String {
        let mut out = String::from("Points chosen are");
        for id in ids {
            let _ = write!(out, " ({id:03})");
        }
        out.push_str(".\n");
        let _ = writeln!(out, "Features\n{}", format_matrix(&self.features));
        let _ = writeln!(out, "Values\n{}", format_matrix(&self.values));
        let _ = writeln!(out, "Theta\n{}", format_matrix(&self.theta));
        let _ = writeln!(out, "Target\n{}", format_matrix(&feature_row(target)));
        let _ = writeln!(out, "Offsets\n{:.6}\t{:.6}", self.offset.ra_axis, self.offset.dec_axis);
        out
    }
}

fn feature_row(axes: &AxisPosition) -> DMatrix<f64> {
    DMatrix::from_row_slice(1, 3, &[1., axes.ra_axis.powi(2), axes.dec_axis.powi(2)])
}

/// Fit the offsets of `points` in `direction` and evaluate them at `target`.
pub(crate) fn fit_offsets<'a>(
    points: impl ExactSizeIterator<Item = &'a AlignmentPoint>,
    direction: Direction,
    target: &AxisPosition,
) -> Result<Fit> {
    let rows = points.len();
    let mut features = DMatrix::zeros(rows, 3);
    let mut values = DMatrix::zeros(rows, 2);

    for (i, p) in points.enumerate() {
        let source = direction.source().axes(p);
        let destination = direction.destination().axes(p);
        features[(i, 0)] = 1.;
        features[(i, 1)] = source.ra_axis.powi(2);
        features[(i, 2)] = source.dec_axis.powi(2);
        values[(i, 0)] = range_plus_minus_180(destination.ra_axis - source.ra_axis);
        values[(i, 1)] = range_plus_minus_180(destination.dec_axis - source.dec_axis);
    }

    let theta = solve_normal_equation(&features, &values)?;
    let offsets = feature_row(target) * &theta;

    Ok(Fit {
        offset: AxisPosition::new(offsets[(0, 0)], offsets[(0, 1)]),
        features,
        values,
        theta,
    })
}

impl LocalRegression {
    fn nearest_delta(
        state: &mut ModelState,
        index: usize,
        direction: Direction,
        label: &str,
    ) -> AxisPosition {
        state.points.select(&[index]);
        let point = &state.points[index];
        let delta = direction.delta(point);
        let message = format!(
            "{label} {:03}, Mount axes: {}, Observed axes: {}",
            point.id, point.mount_axes, point.sky_axes
        );
        state.notify(NotificationKind::Data, direction.method(), message);
        delta
    }
}

impl Corrector for LocalRegression {
    fn correct(
        &self,
        state: &mut ModelState,
        target: AxisPosition,
        pier_side: PierSide,
        direction: Direction,
        _time: &TimeRecord,
    ) -> AxisPosition {
        let method = direction.method();
        state.points.clear_selection();

        let offset = if state.points.len() == 1 {
            Self::nearest_delta(state, 0, direction, "Single alignment point selected")
        } else {
            let neighbours = state.cache.index(direction.source()).nearest(
                &target,
                pier_side,
                state.settings.nearby_limit,
                state.settings.sample_size,
            );
            let indices = neighbours.iter().map(|n| n.index).collect::<Vec<_>>();
            debug!("{method}: {} candidate points near {target}.", indices.len());

            match indices.len() {
                0 => AxisPosition::default(),
                1 | 2 => Self::nearest_delta(state, indices[0], direction, "Nearest point"),
                _ => match fit_offsets(
                    indices.iter().map(|&i| &state.points[i]),
                    direction,
                    &target,
                ) {
                    Ok(fit) => {
                        state.points.select(&indices);
                        let ids = indices.iter().map(|&i| state.points[i].id).collect::<Vec<_>>();
                        let report = fit.report(&ids, &target);
                        state.notify(NotificationKind::Data, method, report);
                        fit.offset
                    }
                    Err(e) => {
                        state.notify(
                            NotificationKind::Warning,
                            method,
                            format!("{e}, using the nearest point instead"),
                        );
                        Self::nearest_delta(state, indices[0], direction, "Using nearest point")
                    }
                },
            }
        };

        let corrected = target + offset;
        state.notify(
            NotificationKind::Data,
            method,
            format!("Correction = {:.6}/{:.6}", offset.ra_axis, offset.dec_axis),
        );
        state.notify(
            NotificationKind::Information,
            method,
            format!("{target} -> {corrected}"),
        );
        corrected
    }
}
