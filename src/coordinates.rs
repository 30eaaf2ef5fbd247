//! Coordinate types shared by the model and its correctors.

use std::fmt;
use std::ops::{Add, Index, Sub};

use chrono::{DateTime, Utc};
use nalgebra::{Vector2, vector};
use serde::{Deserialize, Serialize};

use crate::angle::{range_360, range_plus_minus_180};

/// Tolerance applied at the ±90° boundary between weights-down and weights-up.
pub const POLE_SIDE_TOLERANCE: f64 = 0.001;

/// Raw or corrected mount axis angles in degrees.
///
/// The RA axis may be more than 90° from home, which represents a position through the pole with
/// the counterweights up.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct AxisPosition {
    /// RA (polar) axis angle.
    pub ra_axis: f64,
    /// Dec axis angle.
    pub dec_axis: f64,
}

impl AxisPosition {
    /// Create a new axis position.
    pub const fn new(ra_axis: f64, dec_axis: f64) -> Self {
        Self { ra_axis, dec_axis }
    }

    /// The alternative axis position reaching the same sky position from the other side of the
    /// pole.
    pub fn flip(self) -> Self {
        let ra_axis = if self.ra_axis > 90. {
            self.ra_axis - 180.
        } else {
            self.ra_axis + 180.
        };
        Self::new(ra_axis, 180. - self.dec_axis)
    }

    /// Great-circle angle to `other` in degrees, treating the Dec axis as latitude and the RA axis
    /// as longitude.
    pub fn included_angle_to(&self, other: &AxisPosition) -> f64 {
        let (sin_d1, cos_d1) = self.dec_axis.to_radians().sin_cos();
        let (sin_d2, cos_d2) = other.dec_axis.to_radians().sin_cos();
        let cos_r = (self.ra_axis - other.ra_axis).to_radians().cos();
        (sin_d1 * sin_d2 + cos_d1 * cos_d2 * cos_r)
            .clamp(-1., 1.)
            .acos()
            .to_degrees()
    }

    /// Both axes agree within `tolerance` degrees, modulo 360.
    pub fn approx_eq(&self, other: &AxisPosition, tolerance: f64) -> bool {
        range_plus_minus_180(self.ra_axis - other.ra_axis).abs() <= tolerance
            && range_plus_minus_180(self.dec_axis - other.dec_axis).abs() <= tolerance
    }

    /// Direction on the unit sphere used by the nearest neighbour search.
    ///
    /// The squared chord between two of these is `2 - 2 cos θ` for the included angle `θ`.
    pub fn to_unit_vector(&self) -> [f64; 3] {
        let (sin_d, cos_d) = self.dec_axis.to_radians().sin_cos();
        let (sin_r, cos_r) = self.ra_axis.to_radians().sin_cos();
        [cos_d * cos_r, cos_d * sin_r, sin_d]
    }

    /// Which side of the pole this position is on, relative to `home`.
    ///
    /// The weights-down range is half open, so a position and its [`flip`](Self::flip) always
    /// land on opposite sides.
    pub fn pole_side(&self, home: &AxisPosition) -> PoleSide {
        let offset = range_plus_minus_180(self.ra_axis - home.ra_axis);
        if (-90. - POLE_SIDE_TOLERANCE..90. - POLE_SIDE_TOLERANCE).contains(&offset) {
            PoleSide::WeightsDown
        } else {
            PoleSide::WeightsUp
        }
    }

    /// Wrap both axes into `[0, 360)`.
    pub fn normalized(self) -> Self {
        Self::new(range_360(self.ra_axis), range_360(self.dec_axis))
    }
}

impl From<[f64; 2]> for AxisPosition {
    fn from([ra_axis, dec_axis]: [f64; 2]) -> Self {
        Self::new(ra_axis, dec_axis)
    }
}

impl From<AxisPosition> for [f64; 2] {
    fn from(value: AxisPosition) -> Self {
        [value.ra_axis, value.dec_axis]
    }
}

impl Add for AxisPosition {
    type Output = AxisPosition;

    fn add(self, rhs: Self) -> Self::Output {
        Self::new(self.ra_axis + rhs.ra_axis, self.dec_axis + rhs.dec_axis)
    }
}

impl Sub for AxisPosition {
    type Output = AxisPosition;

    fn sub(self, rhs: Self) -> Self::Output {
        Self::new(self.ra_axis - rhs.ra_axis, self.dec_axis - rhs.dec_axis)
    }
}

impl Index<usize> for AxisPosition {
    type Output = f64;

    fn index(&self, index: usize) -> &Self::Output {
        match index {
            0 => &self.ra_axis,
            1 => &self.dec_axis,
            _ => panic!("axis index {index} out of range"),
        }
    }
}

impl fmt::Display for AxisPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}°/{:.2}°", self.ra_axis, self.dec_axis)
    }
}

/// Counterweight state of a German equatorial mount.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PoleSide {
    /// RA axis within 90° of home, the normal attitude.
    #[default]
    WeightsDown,
    /// RA axis beyond 90° of home, pointing through the pole.
    WeightsUp,
}

/// Side of the pier the telescope tube is on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PierSide {
    /// Tube east of the pier.
    East,
    /// Tube west of the pier.
    West,
    /// Not reported by the mount.
    #[default]
    Unknown,
}

impl fmt::Display for PierSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PierSide::East => "East",
            PierSide::West => "West",
            PierSide::Unknown => "Unknown",
        };
        f.write_str(name)
    }
}

/// Quadrant of a [`CartesianCoordinate`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Quadrant {
    /// `x < 0`, `y < 0`.
    NorthWest,
    /// `x >= 0`, `y < 0`.
    NorthEast,
    /// `x < 0`, `y >= 0`.
    SouthWest,
    /// `x >= 0`, `y >= 0`.
    SouthEast,
}

/// Home-relative polar position, flattened to the plane.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CartesianCoordinate {
    /// Horizontal component.
    pub x: f64,
    /// Vertical component.
    pub y: f64,
    /// Counterweight state carried through the round trip.
    pub side: PoleSide,
    /// The polar radius was zero and has been replaced by one.
    pub zero_radius: bool,
}

impl CartesianCoordinate {
    /// Create a coordinate with a non-zero radius.
    pub const fn new(x: f64, y: f64, side: PoleSide) -> Self {
        Self {
            x,
            y,
            side,
            zero_radius: false,
        }
    }

    /// Quadrant of the position.
    pub fn quadrant(&self) -> Quadrant {
        if self.x >= 0. {
            if self.y >= 0. {
                Quadrant::SouthEast
            } else {
                Quadrant::NorthEast
            }
        } else if self.y < 0. {
            Quadrant::NorthWest
        } else {
            Quadrant::SouthWest
        }
    }

    /// Squared Euclidean distance to `other`.
    pub fn distance_squared(&self, other: &CartesianCoordinate) -> f64 {
        (self.x - other.x).powi(2) + (self.y - other.y).powi(2)
    }

    pub(crate) fn to_vector(self) -> Vector2<f64> {
        vector![self.x, self.y]
    }

    pub(crate) fn from_vector(v: Vector2<f64>, side: PoleSide) -> Self {
        Self::new(v[0], v[1], side)
    }
}

impl fmt::Display for CartesianCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.4}, {:.4}, {:?})", self.x, self.y, self.side)
    }
}

/// Alt/Az of an axis position, stretched over the mount's axis ranges around home.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SphericalCoordinate {
    /// Azimuth analog of the RA axis: `az - 180 + home.ra`.
    pub x: f64,
    /// Altitude analog of the Dec axis: `(alt + 90) * 2 + home.dec`.
    pub y: f64,
    /// Counterweight state of the originating axis position.
    pub side: PoleSide,
}

impl SphericalCoordinate {
    /// Create a new spherical coordinate.
    pub const fn new(x: f64, y: f64, side: PoleSide) -> Self {
        Self { x, y, side }
    }
}

/// A UTC instant together with the local sidereal time at the site.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimeRecord {
    /// UTC instant.
    pub utc: DateTime<Utc>,
    /// Local sidereal time in hours.
    pub local_sidereal_time: f64,
}

impl TimeRecord {
    /// Pair a UTC instant with its sidereal time.
    pub fn new(utc: DateTime<Utc>, local_sidereal_time: f64) -> Self {
        Self {
            utc,
            local_sidereal_time,
        }
    }
}
