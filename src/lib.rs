#![warn(missing_docs)]

//! Pointing correction for equatorial mounts built from sparse calibration points. \
//! Each time the mount is synced on a star, the raw axis reading and the axis angles that actually
//! point at the star are stored. From these points, any mount position can be corrected to where
//! it really points, and any wanted sky position converted to the axes to command.
//!
//! ## Interface
//! The central struct of this library is [`AlignmentModel`]. It owns the points, the site and the
//! [`AlignmentSettings`], and is safe to share between threads. Settings are built with
//! `AlignmentSettings::with_*()` functions or read from JSON.
//!
//! Example:
//! ```rust
//! use chrono::Utc;
//! use nstar::{AlignmentModel, AlignmentSettings, AxisPosition, PierSide, Site};
//!
//! let settings = AlignmentSettings::default()
//!     .with_alignment_on(true)
//!     .with_nearby_limit(60.);
//! let model = AlignmentModel::new(Site::new(52., -1.5, 100.), settings);
//!
//! model
//!     .add_alignment_point(
//!         [10., 20.],
//!         AxisPosition::new(10., 20.),
//!         AxisPosition::new(10.5, 20.3),
//!         PierSide::East,
//!         Utc::now(),
//!     )
//!     .unwrap();
//! let observed = model.get_observed_axes(AxisPosition::new(30., 40.), PierSide::East);
//! ```
//!
//! Two algorithms are available, see [`AlignmentAlgorithm`]:
//! - Local regression: a per-axis quadratic least-squares fit over the nearest points on the same
//!   pier side.
//! - Triangulated affine: the affine map between a triangle of points in mount and sky space,
//!   applied in a home-centred planar projection.
//!
//! The triangle search can be executed in parallel with the `parallel` feature.
//!
//! ## Parameters
//! - `proximity_limit`: Syncs closer than this to an existing point replace it, and positions
//!   closer than this to home are not corrected.
//! - `nearby_limit`: Angular radius of the regression's point search.
//! - `sample_size`: Maximum number of points per regression.
//! - `maximum_combination_count`: Number of nearest points whose triangles are searched.
//! - `nearest_fallback`: Use the nearest point's offset when no triangle surrounds the target.
//!
//! Diagnostics are sent as [`Notification`]s to a [`NotificationSink`], by default the `log` crate.

pub mod angle;
pub mod astro;
pub mod config;
pub mod coordinates;
pub mod error;
pub(crate) mod geometry;
pub(crate) mod matrix;
pub mod model;
pub mod nearest;
pub mod notification;
pub mod persistence;
pub mod point;
pub mod projection;
pub(crate) mod regression;
pub(crate) mod triangles;

pub use astro::{AstroConverter, StandardConverter};
pub use config::{
    AlignmentAlgorithm, AlignmentSettings, Hemisphere, PointFilterMode, Site, ThreePointMode,
    TriangleDistance,
};
pub use coordinates::{
    AxisPosition, CartesianCoordinate, PierSide, PoleSide, Quadrant, SphericalCoordinate,
    TimeRecord,
};
pub use error::{AlignmentError, PersistenceError};
pub use model::{AlignmentModel, Direction};
pub use notification::{LogSink, Notification, NotificationKind, NotificationSink};
pub use point::{AlignmentPoint, AlignmentPointCollection};
pub use triangles::TriangleMapping;

/// A generic float trait such that the plane geometry is generic over `f32`/`f64`.
///
/// This trait is automatically implemented for all types implementing the supertraits.
/// Particularly, this includes `f32` and `f64`.
/// [`num_traits::Float`] is not a supertrait as the need to specify the provider of the redundant
/// definitions of the basic math functions would clutter the code.
pub trait Float: Copy + Default + nalgebra::RealField + num_traits::FromPrimitive {}

impl<F> Float for F where F: Copy + Default + nalgebra::RealField + num_traits::FromPrimitive {}
