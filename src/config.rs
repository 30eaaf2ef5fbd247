//! Site and alignment settings.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::coordinates::AxisPosition;
use crate::error::PersistenceError;

/// Hemisphere of the observing site.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Hemisphere {
    /// Latitude `>= 0`.
    Northern,
    /// Latitude `< 0`.
    Southern,
}

/// Geographic location of the mount.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Site {
    /// Latitude in degrees, north positive.
    pub latitude: f64,
    /// Longitude in degrees, east positive.
    pub longitude: f64,
    /// Elevation in metres.
    pub elevation: f64,
}

impl Site {
    /// Create a new site.
    pub fn new(latitude: f64, longitude: f64, elevation: f64) -> Self {
        Self {
            latitude,
            longitude,
            elevation,
        }
    }

    /// Hemisphere derived from the latitude.
    pub fn hemisphere(&self) -> Hemisphere {
        if self.latitude < 0. {
            Hemisphere::Southern
        } else {
            Hemisphere::Northern
        }
    }
}

/// Which corrector computes the offsets.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlignmentAlgorithm {
    /// Per-axis quadratic least squares over the nearest points.
    #[default]
    LocalRegression,
    /// Affine map of the triangle of points surrounding the target.
    TriangulatedAffine,
}

/// Which points may take part in a triangle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PointFilterMode {
    /// Every point.
    #[default]
    AllPoints,
    /// Points on the same side of the meridian as the target.
    Meridian,
    /// Points in the same Cartesian quadrant as the target.
    LocalQuadrant,
}

/// How the triangle around the target is chosen.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThreePointMode {
    /// The first enclosing triangle, searching from the nearest points outwards.
    NearestTriangle,
    /// The enclosing triangle whose centroid is nearest the target.
    #[default]
    TriangleWithNearestCentre,
}

/// Distance used to rank candidate triangle vertices.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriangleDistance {
    /// Squared Euclidean distance in the Cartesian plane.
    #[default]
    Cartesian,
    /// Squared difference of the axis angles.
    Polar,
}

/// Tunable parameters of the alignment model.
///
/// Every field has a default, so partial JSON documents deserialize fine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignmentSettings {
    /// Apply corrections at all.
    pub is_alignment_on: bool,
    /// Corrector used for both directions.
    pub alignment_algorithm: AlignmentAlgorithm,
    /// Vertex filter for the triangle search.
    pub point_filter_mode: PointFilterMode,
    /// Triangle choice.
    pub three_point_mode: ThreePointMode,
    /// Distance for ranking triangle vertices.
    pub triangle_distance: TriangleDistance,
    /// Points closer than this (degrees, per axis) to a new sync are replaced by it. Targets this
    /// close to home are not corrected.
    pub proximity_limit: f64,
    /// Maximum angular distance (degrees) of a point used by the regression.
    pub nearby_limit: f64,
    /// Maximum number of points used by the regression.
    pub sample_size: usize,
    /// Number of nearest points combined into candidate triangles.
    pub maximum_combination_count: usize,
    /// Apply the nearest point's offset when no triangle encloses the target.
    pub nearest_fallback: bool,
    /// Axis position of the parked mount, which is never corrected.
    pub home_position: AxisPosition,
    /// Start empty when the points were last touched more than an hour ago.
    pub clear_points_on_startup: bool,
    /// Largest accepted absolute target declination.
    pub declination_limit: f64,
}

impl Default for AlignmentSettings {
    fn default() -> Self {
        Self {
            is_alignment_on: false,
            alignment_algorithm: AlignmentAlgorithm::default(),
            point_filter_mode: PointFilterMode::default(),
            three_point_mode: ThreePointMode::default(),
            triangle_distance: TriangleDistance::default(),
            proximity_limit: 0.5,
            nearby_limit: 45.,
            sample_size: 3,
            maximum_combination_count: 50,
            nearest_fallback: false,
            home_position: AxisPosition::new(90., 90.),
            clear_points_on_startup: false,
            declination_limit: 89.9,
        }
    }
}

impl AlignmentSettings {
    /// Read settings from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| PersistenceError::io(path, e))?;
        serde_json::from_str(&text).map_err(|e| PersistenceError::json(path, e))
    }

    /// Write settings to a JSON file.
    pub fn to_json_file(&self, path: impl AsRef<Path>) -> Result<(), PersistenceError> {
        let path = path.as_ref();
        let text = serde_json::to_string_pretty(self).map_err(|e| PersistenceError::json(path, e))?;
        fs::write(path, text).map_err(|e| PersistenceError::io(path, e))
    }

    /// Enable or disable corrections.
    pub fn with_alignment_on(mut self, on: bool) -> Self {
        self.is_alignment_on = on;
        self
    }

    /// Set the corrector.
    pub fn with_algorithm(mut self, algorithm: AlignmentAlgorithm) -> Self {
        self.alignment_algorithm = algorithm;
        self
    }

    /// Set the triangle vertex filter.
    pub fn with_point_filter_mode(mut self, mode: PointFilterMode) -> Self {
        self.point_filter_mode = mode;
        self
    }

    /// Set the triangle choice.
    pub fn with_three_point_mode(mut self, mode: ThreePointMode) -> Self {
        self.three_point_mode = mode;
        self
    }

    /// Set the vertex ranking distance.
    pub fn with_triangle_distance(mut self, distance: TriangleDistance) -> Self {
        self.triangle_distance = distance;
        self
    }

    /// Set the proximity limit in degrees.
    pub fn with_proximity_limit(mut self, limit: f64) -> Self {
        self.proximity_limit = limit;
        self
    }

    /// Set the regression search radius in degrees.
    pub fn with_nearby_limit(mut self, limit: f64) -> Self {
        self.nearby_limit = limit;
        self
    }

    /// Set the regression sample size.
    pub fn with_sample_size(mut self, size: usize) -> Self {
        self.sample_size = size;
        self
    }

    /// Set how many nearest points are combined into triangles.
    pub fn with_maximum_combination_count(mut self, count: usize) -> Self {
        self.maximum_combination_count = count;
        self
    }

    /// Fall back to the nearest point's offset outside all triangles.
    pub fn with_nearest_fallback(mut self, fallback: bool) -> Self {
        self.nearest_fallback = fallback;
        self
    }

    /// Set the home axis position.
    pub fn with_home_position(mut self, home: AxisPosition) -> Self {
        self.home_position = home;
        self
    }

    /// Discard stale points on startup.
    pub fn with_clear_points_on_startup(mut self, clear: bool) -> Self {
        self.clear_points_on_startup = clear;
        self
    }
}
