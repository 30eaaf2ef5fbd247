//! Calibration points and their ordered collection.

use std::fmt::Write;
use std::ops::Index;

use serde::{Deserialize, Serialize};

use crate::angle::range_plus_minus_180;
use crate::coordinates::{AxisPosition, PierSide, TimeRecord};

/// A sync: the mount reported `mount_axes` while actually pointing at `sky_axes`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AlignmentPoint {
    /// Stable identifier, unique within a collection.
    pub id: u32,
    /// Synced target as `[ra_hours, dec_degrees]`.
    pub target_ra_dec: [f64; 2],
    /// `[alt, az]` of the target at sync time.
    pub alt_az: [f64; 2],
    /// Raw axis readings.
    pub mount_axes: AxisPosition,
    /// Axis angles that would have pointed exactly at the target.
    #[serde(alias = "observed_axes")]
    pub sky_axes: AxisPosition,
    /// Pier side at sync time.
    pub pier_side: PierSide,
    /// When the sync happened.
    pub sync_time: TimeRecord,
    /// Used by the most recent correction. Never persisted.
    #[serde(skip)]
    pub selected: bool,
}

impl AlignmentPoint {
    /// Per-axis `sky - mount`, wrapped to `(-180, 180]`.
    pub fn mount_to_sky_delta(&self) -> AxisPosition {
        AxisPosition::new(
            range_plus_minus_180(self.sky_axes.ra_axis - self.mount_axes.ra_axis),
            range_plus_minus_180(self.sky_axes.dec_axis - self.mount_axes.dec_axis),
        )
    }

    /// The correction in arcseconds, for display.
    pub fn correction(&self) -> String {
        let delta = self.mount_to_sky_delta();
        format!(
            "{:+.1}\"/{:+.1}\"",
            delta.ra_axis * 3600.,
            delta.dec_axis * 3600.
        )
    }
}

/// Calibration points in insertion order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlignmentPointCollection {
    points: Vec<AlignmentPoint>,
}

impl AlignmentPointCollection {
    /// An empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Id the next added point receives: one more than the largest present, starting at 1.
    pub fn next_id(&self) -> u32 {
        self.points.iter().map(|p| p.id).max().unwrap_or(0) + 1
    }

    /// Number of points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// No points stored.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Iterate in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, AlignmentPoint> {
        self.points.iter()
    }

    /// The points as a slice.
    pub fn as_slice(&self) -> &[AlignmentPoint] {
        &self.points
    }

    /// Most recently added point.
    pub fn last(&self) -> Option<&AlignmentPoint> {
        self.points.last()
    }

    /// Point with the given id.
    pub fn get_by_id(&self, id: u32) -> Option<&AlignmentPoint> {
        self.points.iter().find(|p| p.id == id)
    }

    pub(crate) fn push(&mut self, point: AlignmentPoint) {
        self.points.push(point);
    }

    /// Remove the point with `id`, returning it.
    pub(crate) fn remove_by_id(&mut self, id: u32) -> Option<AlignmentPoint> {
        let index = self.points.iter().position(|p| p.id == id)?;
        Some(self.points.remove(index))
    }

    /// Remove every point matching `predicate`, returning the removed ids.
    pub(crate) fn remove_where(&mut self, predicate: impl Fn(&AlignmentPoint) -> bool) -> Vec<u32> {
        let mut removed = Vec::new();
        self.points.retain(|p| {
            if predicate(p) {
                removed.push(p.id);
                false
            } else {
                true
            }
        });
        removed
    }

    pub(crate) fn clear_selection(&mut self) {
        for p in &mut self.points {
            p.selected = false;
        }
    }

    pub(crate) fn select(&mut self, indices: &[usize]) {
        for &i in indices {
            if let Some(p) = self.points.get_mut(i) {
                p.selected = true;
            }
        }
    }

    /// Tab separated table of all points, for the data notifications.
    pub fn report(&self) -> String {
        let mut out = String::from(
            "Id\tRA\tDec\tMount RA\tMount Dec\tSky RA\tSky Dec\tPier\tCorrection\tSynced\n",
        );
        for p in &self.points {
            let _ = writeln!(
                out,
                "{}\t{:.4}\t{:.4}\t{:.4}\t{:.4}\t{:.4}\t{:.4}\t{}\t{}\t{}",
                p.id,
                p.target_ra_dec[0],
                p.target_ra_dec[1],
                p.mount_axes.ra_axis,
                p.mount_axes.dec_axis,
                p.sky_axes.ra_axis,
                p.sky_axes.dec_axis,
                p.pier_side,
                p.correction(),
                p.sync_time.utc.to_rfc3339(),
            );
        }
        out
    }
}

impl Index<usize> for AlignmentPointCollection {
    type Output = AlignmentPoint;

    fn index(&self, index: usize) -> &Self::Output {
        &self.points[index]
    }
}

impl<'a> IntoIterator for &'a AlignmentPointCollection {
    type Item = &'a AlignmentPoint;
    type IntoIter = std::slice::Iter<'a, AlignmentPoint>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.iter()
    }
}

impl From<Vec<AlignmentPoint>> for AlignmentPointCollection {
    fn from(points: Vec<AlignmentPoint>) -> Self {
        Self { points }
    }
}
