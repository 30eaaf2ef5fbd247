//! Angles in degrees and the range helpers used throughout the model.

use std::fmt;
use std::ops::{Add, Neg, Sub};

use serde::{Deserialize, Serialize};

/// An angle in degrees, normalised to `[0, 360)`.
#[derive(Clone, Copy, Debug, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Angle(f64);

impl Angle {
    /// Create a new angle from degrees. The value is wrapped into `[0, 360)`.
    pub fn new(degrees: f64) -> Self {
        Self(range_360(degrees))
    }

    /// Create a new angle from radians.
    pub fn from_radians(radians: f64) -> Self {
        Self::new(radians.to_degrees())
    }

    /// The value in degrees, in `[0, 360)`.
    pub fn degrees(self) -> f64 {
        self.0
    }

    /// The value in radians, in `[0, 2π)`.
    pub fn radians(self) -> f64 {
        self.0.to_radians()
    }

    /// The value in degrees wrapped to `(-180, 180]`.
    pub fn signed(self) -> f64 {
        range_plus_minus_180(self.0)
    }

    /// Smallest absolute difference to `other`, in `[0, 180]`.
    pub fn separation(self, other: Angle) -> f64 {
        range_plus_minus_180(self.0 - other.0).abs()
    }
}

impl From<f64> for Angle {
    fn from(value: f64) -> Self {
        Angle::new(value)
    }
}

impl From<Angle> for f64 {
    fn from(value: Angle) -> Self {
        value.0
    }
}

impl Add for Angle {
    type Output = Angle;

    fn add(self, rhs: Self) -> Self::Output {
        Angle::new(self.0 + rhs.0)
    }
}

impl Sub for Angle {
    type Output = Angle;

    fn sub(self, rhs: Self) -> Self::Output {
        Angle::new(self.0 - rhs.0)
    }
}

impl Neg for Angle {
    type Output = Angle;

    fn neg(self) -> Self::Output {
        Angle::new(-self.0)
    }
}

impl fmt::Display for Angle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}°", self.0)
    }
}

/// Wrap to `[0, 360)`.
pub fn range_360(degrees: f64) -> f64 {
    let wrapped = degrees.rem_euclid(360.);
    // rem_euclid can round up to exactly 360 for tiny negative inputs
    if wrapped >= 360. { 0. } else { wrapped }
}

/// Wrap to `(-180, 180]`.
pub fn range_plus_minus_180(degrees: f64) -> f64 {
    let wrapped = range_360(degrees);
    if wrapped > 180. { wrapped - 360. } else { wrapped }
}

/// Fold into `[-90, 90]`, reflecting at the poles.
pub fn range_90(degrees: f64) -> f64 {
    let mut d = range_plus_minus_180(degrees);
    if d > 90. {
        d = 180. - d;
    } else if d < -90. {
        d = -180. - d;
    }
    d
}

/// Wrap hours to `[0, 24)`.
pub fn range_24(hours: f64) -> f64 {
    let wrapped = hours.rem_euclid(24.);
    if wrapped >= 24. { 0. } else { wrapped }
}

/// Wrap hours to `(-12, 12]`.
pub fn range_12(hours: f64) -> f64 {
    let wrapped = range_24(hours);
    if wrapped > 12. { wrapped - 24. } else { wrapped }
}
