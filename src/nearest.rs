//! Angular nearest neighbour search over the calibration points.

use std::cmp::Ordering;

use kiddo::float::{distance::SquaredEuclidean, kdtree::KdTree};

use crate::coordinates::{AxisPosition, PierSide};
use crate::point::{AlignmentPoint, AlignmentPointCollection};

/// Slack on the chord radius so the exact angular filter sees every boundary candidate.
const CHORD_SLACK: f64 = 1e-9;

/// Which axes of a point a query refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Space {
    /// Raw mount axes.
    Mount,
    /// Corrected sky axes.
    Sky,
}

impl Space {
    /// The axes of `point` in this space.
    pub fn axes(self, point: &AlignmentPoint) -> AxisPosition {
        match self {
            Space::Mount => point.mount_axes,
            Space::Sky => point.sky_axes,
        }
    }
}

/// A point found by [`SpatialIndex::nearest`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Neighbour {
    /// Index into the collection.
    pub index: usize,
    /// Included angle to the query in degrees.
    pub angle: f64,
}

/// kd-tree over the unit vectors of one space's axes.
pub struct SpatialIndex {
    tree: KdTree<f64, usize, 3, 32, u32>,
    axes: Vec<AxisPosition>,
    pier_sides: Vec<PierSide>,
}

impl SpatialIndex {
    /// Index the points of `collection` in `space`.
    pub fn build(collection: &AlignmentPointCollection, space: Space) -> Self {
        let axes = collection.iter().map(|p| space.axes(p)).collect::<Vec<_>>();
        let pier_sides = collection.iter().map(|p| p.pier_side).collect();
        let tree = axes
            .iter()
            .enumerate()
            .map(|(i, a)| (a.to_unit_vector(), i))
            .collect();

        Self {
            tree,
            axes,
            pier_sides,
        }
    }

    /// Number of indexed points.
    pub fn len(&self) -> usize {
        self.axes.len()
    }

    /// Nothing indexed.
    pub fn is_empty(&self) -> bool {
        self.axes.is_empty()
    }

    /// Up to `count` points on `pier_side` within `limit` degrees of `target`, nearest first.
    /// Equal angles keep insertion order.
    pub fn nearest(
        &self,
        target: &AxisPosition,
        pier_side: PierSide,
        limit: f64,
        count: usize,
    ) -> Vec<Neighbour> {
        if self.is_empty() || count == 0 || limit < 0. {
            return Vec::new();
        }

        let chord_squared = if limit >= 180. {
            4.
        } else {
            2. - 2. * limit.to_radians().cos()
        };

        let radius = chord_squared + CHORD_SLACK;
        let mut found = self
            .tree
            .within_unsorted::<SquaredEuclidean>(&target.to_unit_vector(), radius)
            .into_iter()
            .map(|n| n.item)
            .filter(|&i| self.pier_sides[i] == pier_side)
            .map(|i| Neighbour {
                index: i,
                angle: target.included_angle_to(&self.axes[i]),
            })
            .filter(|n| n.angle <= limit)
            .collect::<Vec<_>>();

        found.sort_by(|a, b| {
            a.angle
                .partial_cmp(&b.angle)
                .unwrap_or(Ordering::Equal)
                .then(a.index.cmp(&b.index))
        });
        found.truncate(count);
        found
    }
}
