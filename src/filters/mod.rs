pub mod ema;
pub mod kalman;

use std::fmt;

use crate::matrix::MatrixError;

/// Errors raised by the estimation filters.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterError {
    /// Smoothing factor outside (0, 1].
    InvalidAlpha(f64),
    /// The residual covariance could not be inverted. With a nonzero
    /// measurement noise this cannot happen; seeing it means the filter was
    /// configured with zero noise everywhere.
    SingularResidual,
    /// A shape error escaped the matrix layer. Unreachable with the fixed
    /// shapes used here, but propagated rather than swallowed.
    Algebra(MatrixError),
}

impl fmt::Display for FilterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterError::InvalidAlpha(alpha) => {
                write!(f, "alpha must be in the range (0, 1], got {}", alpha)
            }
            FilterError::SingularResidual => {
                write!(f, "residual covariance is singular")
            }
            FilterError::Algebra(err) => write!(f, "matrix algebra failed: {}", err),
        }
    }
}

impl std::error::Error for FilterError {}
