//! Sample Matrices
//!
//! A [`Matrix`] is a fixed `rows × cols` table of samples read by lookup
//! nodes through two normalized coordinates. Matrices are plain data: the
//! host builds one, wraps it in an `Arc` and binds it to as many nodes as it
//! likes. Nodes only ever read it.

use libm::floor;
use serde::{Deserialize, Serialize};

/// Largest `f64` strictly below 1.0, the upper bound of a normalized position
pub const MAX_POSITION: f64 = 1.0 - f64::EPSILON / 2.0;

/// Clamp a normalized position into `[0, 1)`.
///
/// Values below zero (and NaN) map to 0.0, values at or above 1.0 map to
/// [`MAX_POSITION`]. Applying it twice gives the same result as applying it once.
#[inline]
pub fn clamp_position(x: f64) -> f64 {
    if x.is_nan() || x < 0.0 {
        0.0
    } else if x >= 1.0 {
        MAX_POSITION
    } else {
        x
    }
}

#[inline]
fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + t * (b - a)
}

/// Errors raised while building a matrix
#[derive(Debug, Clone, PartialEq)]
pub enum MatrixError {
    Empty,
    Ragged {
        row: usize,
        expected: usize,
        found: usize,
    },
    SizeMismatch {
        expected: usize,
        found: usize,
    },
}

impl std::fmt::Display for MatrixError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatrixError::Empty => write!(f, "Matrix must have at least one row and one column"),
            MatrixError::Ragged {
                row,
                expected,
                found,
            } => write!(
                f,
                "Row {} has {} columns, expected {}",
                row, found, expected
            ),
            MatrixError::SizeMismatch { expected, found } => {
                write!(f, "Expected {} samples, got {}", expected, found)
            }
        }
    }
}

impl std::error::Error for MatrixError {}

/// Serialized form, validated on the way in
#[derive(Serialize, Deserialize)]
struct RawMatrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

/// Row-major 2D table of samples
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawMatrix", into = "RawMatrix")]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Matrix {
    /// Create a silent matrix
    pub fn new(rows: usize, cols: usize) -> Result<Self, MatrixError> {
        Self::from_vec(rows, cols, vec![0.0; rows * cols])
    }

    /// Create a matrix from row-major samples
    pub fn from_vec(rows: usize, cols: usize, data: Vec<f64>) -> Result<Self, MatrixError> {
        if rows == 0 || cols == 0 {
            return Err(MatrixError::Empty);
        }
        if data.len() != rows * cols {
            return Err(MatrixError::SizeMismatch {
                expected: rows * cols,
                found: data.len(),
            });
        }
        Ok(Self { rows, cols, data })
    }

    /// Create a matrix from a list of equally long rows
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self, MatrixError> {
        let cols = rows.first().map(Vec::len).unwrap_or(0);
        let n_rows = rows.len();
        let mut data = Vec::with_capacity(n_rows * cols);
        for (i, row) in rows.into_iter().enumerate() {
            if row.len() != cols {
                return Err(MatrixError::Ragged {
                    row: i,
                    expected: cols,
                    found: row.len(),
                });
            }
            data.extend(row);
        }
        Self::from_vec(n_rows, cols, data)
    }

    /// Create a matrix by evaluating `f(row, col)` for every cell
    pub fn from_fn<F>(rows: usize, cols: usize, mut f: F) -> Result<Self, MatrixError>
    where
        F: FnMut(usize, usize) -> f64,
    {
        let mut data = Vec::with_capacity(rows * cols);
        for r in 0..rows {
            for c in 0..cols {
                data.push(f(r, c));
            }
        }
        Self::from_vec(rows, cols, data)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Backing samples, row-major
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        if row < self.rows && col < self.cols {
            Some(self.data[row * self.cols + col])
        } else {
            None
        }
    }

    /// Set a cell; out-of-range writes are ignored
    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        if row < self.rows && col < self.cols {
            self.data[row * self.cols + col] = value;
        }
    }

    #[inline]
    fn at(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.cols + col]
    }

    /// Split a clamped position into (lower index, upper index, fraction)
    #[inline]
    fn axis(pos: f64, len: usize) -> (usize, usize, f64) {
        let scaled = pos * (len - 1) as f64;
        let lower = floor(scaled);
        let frac = scaled - lower;
        let i0 = lower as usize;
        (i0, (i0 + 1).min(len - 1), frac)
    }

    /// Bilinear lookup at normalized `(row, col)`.
    ///
    /// Both coordinates are clamped with [`clamp_position`] and then scaled
    /// onto `0..=rows-1` and `0..=cols-1`. Positions that land exactly on a
    /// grid point return the stored sample unchanged.
    pub fn interp(&self, row: f64, col: f64) -> f64 {
        let (r0, r1, fr) = Self::axis(clamp_position(row), self.rows);
        let (c0, c1, fc) = Self::axis(clamp_position(col), self.cols);

        let upper = lerp(self.at(r0, c0), self.at(r0, c1), fc);
        let lower = lerp(self.at(r1, c0), self.at(r1, c1), fc);
        lerp(upper, lower, fr)
    }
}

impl TryFrom<RawMatrix> for Matrix {
    type Error = MatrixError;

    fn try_from(raw: RawMatrix) -> Result<Self, Self::Error> {
        Matrix::from_vec(raw.rows, raw.cols, raw.data)
    }
}

impl From<Matrix> for RawMatrix {
    fn from(matrix: Matrix) -> Self {
        RawMatrix {
            rows: matrix.rows,
            cols: matrix.cols,
            data: matrix.data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn ramp4() -> Matrix {
        Matrix::from_fn(4, 4, |r, c| (r * 4 + c) as f64).unwrap()
    }

    #[test]
    fn test_construction_errors() {
        assert_eq!(Matrix::new(0, 4), Err(MatrixError::Empty));
        assert_eq!(
            Matrix::from_vec(2, 2, vec![1.0; 3]),
            Err(MatrixError::SizeMismatch {
                expected: 4,
                found: 3
            })
        );
        assert_eq!(
            Matrix::from_rows(vec![vec![0.0, 1.0], vec![2.0]]),
            Err(MatrixError::Ragged {
                row: 1,
                expected: 2,
                found: 1
            })
        );
        assert_eq!(Matrix::from_rows(vec![]), Err(MatrixError::Empty));
    }

    #[test]
    fn test_get_set() {
        let mut m = Matrix::new(2, 3).unwrap();
        m.set(1, 2, 7.0);
        m.set(5, 5, 1.0); // ignored
        assert_eq!(m.get(1, 2), Some(7.0));
        assert_eq!(m.get(2, 0), None);
        assert_eq!(m.data().len(), 6);
    }

    #[test]
    fn test_clamp_position() {
        assert_eq!(clamp_position(-0.5), 0.0);
        assert_eq!(clamp_position(f64::NAN), 0.0);
        assert_eq!(clamp_position(0.25), 0.25);
        assert_eq!(clamp_position(1.0), MAX_POSITION);
        assert_eq!(clamp_position(7.0), MAX_POSITION);
        assert!(MAX_POSITION < 1.0);

        for x in [-3.0, -0.0, 0.3, 0.999, 1.0, 1.5, f64::INFINITY] {
            let once = clamp_position(x);
            assert_eq!(clamp_position(once), once);
        }
    }

    #[test]
    fn test_exact_at_corners() {
        let m = Matrix::from_rows(vec![vec![0.0, 1.0], vec![2.0, 3.0]]).unwrap();
        assert_eq!(m.interp(0.0, 0.0), 0.0);
        assert_relative_eq!(m.interp(0.0, MAX_POSITION), 1.0, epsilon = 1e-12);
        assert_relative_eq!(m.interp(MAX_POSITION, 0.0), 2.0, epsilon = 1e-12);
        assert_relative_eq!(m.interp(MAX_POSITION, MAX_POSITION), 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_exact_at_interior_grid_points() {
        let m = Matrix::from_fn(3, 5, |r, c| (r * 10 + c) as f64).unwrap();
        // Row 0.5 -> index 1, col 0.25 -> index 1, col 0.75 -> index 3
        assert_eq!(m.interp(0.5, 0.25), 11.0);
        assert_eq!(m.interp(0.5, 0.75), 13.0);
        assert_eq!(m.interp(0.0, 0.5), 2.0);
    }

    #[test]
    fn test_centre_of_2x2_is_mean() {
        let m = Matrix::from_rows(vec![vec![0.0, 1.0], vec![2.0, 3.0]]).unwrap();
        assert_eq!(m.interp(0.5, 0.5), 1.5);
    }

    #[test]
    fn test_linear_along_each_axis() {
        let m = Matrix::from_rows(vec![vec![0.0, 1.0], vec![2.0, 3.0]]).unwrap();
        assert_relative_eq!(m.interp(0.0, 0.25), 0.25);
        assert_relative_eq!(m.interp(0.25, 0.0), 0.5);
        assert_relative_eq!(m.interp(0.75, 0.5), 2.0);
    }

    #[test]
    fn test_out_of_range_matches_boundary() {
        let m = ramp4();
        assert_eq!(m.interp(-1.0, -2.0), m.interp(0.0, 0.0));
        assert_eq!(m.interp(2.0, 0.3), m.interp(MAX_POSITION, 0.3));
        assert_eq!(m.interp(0.3, 1.0), m.interp(0.3, MAX_POSITION));
        assert_relative_eq!(m.interp(5.0, 5.0), 15.0, epsilon = 1e-12);
    }

    #[test]
    fn test_last_column_of_ramp() {
        let m = ramp4();
        assert_relative_eq!(m.interp(0.0, MAX_POSITION), 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_single_cell_matrix() {
        let m = Matrix::from_vec(1, 1, vec![4.5]).unwrap();
        assert_eq!(m.interp(0.0, 0.0), 4.5);
        assert_eq!(m.interp(0.7, 0.2), 4.5);
        assert_eq!(m.interp(9.0, -9.0), 4.5);
    }

    #[test]
    fn test_deserialize_validates_shape() {
        let m: Matrix = serde_json::from_str(r#"{"rows":1,"cols":2,"data":[0.5,1.5]}"#).unwrap();
        assert_eq!(m.get(0, 1), Some(1.5));

        let bad = serde_json::from_str::<Matrix>(r#"{"rows":2,"cols":2,"data":[0.5]}"#);
        assert!(bad.is_err());
    }
}
