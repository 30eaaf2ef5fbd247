//! Error types.

use std::path::PathBuf;

use thiserror::Error;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, AlignmentError>;

/// Errors raised by the alignment model.
#[derive(Debug, Error)]
pub enum AlignmentError {
    /// The sync target is too close to the celestial pole.
    #[error("target declination {dec}° is outside ±{limit}°")]
    OutOfRange {
        /// Declination of the rejected target in degrees.
        dec: f64,
        /// Allowed absolute declination.
        limit: f64,
    },
    /// The points were changed in memory but could not be written or read.
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    /// The regression normal matrix is (nearly) singular.
    #[error("regression matrix is ill-conditioned (rcond = {rcond:.3e})")]
    IllConditioned {
        /// Reciprocal condition number of the design matrix.
        rcond: f64,
    },
    /// A 2x2 affine matrix could not be inverted.
    #[error("singular matrix: determinant = {determinant:.6e}")]
    SingularMatrix {
        /// The offending determinant.
        determinant: f64,
    },
}

/// Errors while reading or writing the calibration files.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// Filesystem failure.
    #[error("i/o error on {path}: {source}")]
    Io {
        /// File or directory involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// Malformed or unserializable JSON.
    #[error("json error on {path}: {source}")]
    Json {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },
}

impl PersistenceError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.into(),
            source,
        }
    }
}
