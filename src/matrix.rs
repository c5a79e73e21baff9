use ndarray::Array2;
use std::fmt;

/// Shape errors surfaced by the matrix primitives.
///
/// The estimator is the only consumer, so the vocabulary stays small: either
/// the operand shapes disagree, or an inverse was requested for a non-square
/// matrix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatrixError {
    ShapeMismatch {
        op: &'static str,
        lhs: (usize, usize),
        rhs: (usize, usize),
    },
    NotSquare {
        shape: (usize, usize),
    },
}

impl fmt::Display for MatrixError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatrixError::ShapeMismatch { op, lhs, rhs } => write!(
                f,
                "{}: matrix dimensions do not match ({}x{} vs {}x{})",
                op, lhs.0, lhs.1, rhs.0, rhs.1
            ),
            MatrixError::NotSquare { shape } => {
                write!(f, "invert: matrix must be square, got {}x{}", shape.0, shape.1)
            }
        }
    }
}

impl std::error::Error for MatrixError {}

/// Multiply two matrices. Fails when the inner dimensions disagree.
pub fn multiply(a: &Array2<f64>, b: &Array2<f64>) -> Result<Array2<f64>, MatrixError> {
    if a.ncols() != b.nrows() {
        return Err(MatrixError::ShapeMismatch {
            op: "multiply",
            lhs: a.dim(),
            rhs: b.dim(),
        });
    }
    Ok(a.dot(b))
}

pub fn add(a: &Array2<f64>, b: &Array2<f64>) -> Result<Array2<f64>, MatrixError> {
    if a.dim() != b.dim() {
        return Err(MatrixError::ShapeMismatch {
            op: "add",
            lhs: a.dim(),
            rhs: b.dim(),
        });
    }
    Ok(a + b)
}

pub fn subtract(a: &Array2<f64>, b: &Array2<f64>) -> Result<Array2<f64>, MatrixError> {
    if a.dim() != b.dim() {
        return Err(MatrixError::ShapeMismatch {
            op: "subtract",
            lhs: a.dim(),
            rhs: b.dim(),
        });
    }
    Ok(a - b)
}

pub fn transpose(a: &Array2<f64>) -> Array2<f64> {
    a.t().to_owned()
}

pub fn scalar_multiply(a: &Array2<f64>, c: f64) -> Array2<f64> {
    a * c
}

/// Invert a square matrix by Gauss-Jordan elimination with partial pivoting.
///
/// Returns `Ok(None)` when the matrix is singular (no usable pivot in some
/// column). The 1x1 case degenerates to a checked reciprocal, so the
/// estimator's residual covariance goes through the same path as everything
/// else instead of a hand-rolled divide.
pub fn invert(a: &Array2<f64>) -> Result<Option<Array2<f64>>, MatrixError> {
    let n = a.nrows();
    if n != a.ncols() {
        return Err(MatrixError::NotSquare { shape: a.dim() });
    }

    // Augmented [A | I] worked in place.
    let mut work = a.clone();
    let mut inv = Array2::<f64>::eye(n);

    for col in 0..n {
        // Pick the largest-magnitude pivot at or below the diagonal.
        let mut pivot_row = col;
        let mut pivot_mag = work[[col, col]].abs();
        for row in (col + 1)..n {
            let mag = work[[row, col]].abs();
            if mag > pivot_mag {
                pivot_row = row;
                pivot_mag = mag;
            }
        }
        if pivot_mag == 0.0 {
            return Ok(None);
        }

        if pivot_row != col {
            for j in 0..n {
                work.swap([col, j], [pivot_row, j]);
                inv.swap([col, j], [pivot_row, j]);
            }
        }

        let pivot = work[[col, col]];
        for j in 0..n {
            work[[col, j]] /= pivot;
            inv[[col, j]] /= pivot;
        }

        for row in 0..n {
            if row == col {
                continue;
            }
            let factor = work[[row, col]];
            if factor == 0.0 {
                continue;
            }
            for j in 0..n {
                work[[row, j]] -= factor * work[[col, j]];
                inv[[row, j]] -= factor * inv[[col, j]];
            }
        }
    }

    Ok(Some(inv))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::arr2;

    #[test]
    fn test_multiply_identity() {
        let a = arr2(&[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0], [7.0, 8.0, 10.0]]);
        let i = Array2::<f64>::eye(3);
        let product = multiply(&a, &i).unwrap();
        assert_eq!(product, a);
    }

    #[test]
    fn test_multiply_shape_mismatch() {
        let a = arr2(&[[1.0, 2.0]]);
        let b = arr2(&[[1.0, 2.0]]);
        let err = multiply(&a, &b).unwrap_err();
        assert!(matches!(err, MatrixError::ShapeMismatch { op: "multiply", .. }));
    }

    #[test]
    fn test_add_shape_mismatch() {
        let a = arr2(&[[1.0, 2.0]]);
        let b = arr2(&[[1.0], [2.0]]);
        assert!(add(&a, &b).is_err());
        assert!(subtract(&a, &b).is_err());
    }

    #[test]
    fn test_double_transpose() {
        let a = arr2(&[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
        assert_eq!(transpose(&transpose(&a)), a);
    }

    #[test]
    fn test_scalar_multiply() {
        let a = arr2(&[[1.0, -2.0], [0.5, 4.0]]);
        let scaled = scalar_multiply(&a, 2.0);
        assert_eq!(scaled, arr2(&[[2.0, -4.0], [1.0, 8.0]]));
    }

    #[test]
    fn test_invert_singular_returns_none() {
        // Second row is a multiple of the first.
        let a = arr2(&[[1.0, 2.0, 3.0], [2.0, 4.0, 6.0], [1.0, 0.0, 1.0]]);
        assert!(invert(&a).unwrap().is_none());
    }

    #[test]
    fn test_invert_round_trip() {
        let a = arr2(&[[4.0, 7.0, 2.0], [3.0, 6.0, 1.0], [2.0, 5.0, 3.0]]);
        let inv = invert(&a).unwrap().expect("matrix is invertible");
        let product = multiply(&a, &inv).unwrap();
        let identity = Array2::<f64>::eye(3);
        for (got, want) in product.iter().zip(identity.iter()) {
            assert_relative_eq!(*got, *want, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_invert_1x1() {
        let s = arr2(&[[4.0]]);
        let inv = invert(&s).unwrap().unwrap();
        assert_relative_eq!(inv[[0, 0]], 0.25);

        let zero = arr2(&[[0.0]]);
        assert!(invert(&zero).unwrap().is_none());
    }

    #[test]
    fn test_invert_not_square() {
        let a = arr2(&[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
        assert!(matches!(invert(&a), Err(MatrixError::NotSquare { .. })));
    }
}
