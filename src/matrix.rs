//! Dense row-major matrices returned by the Jacobian drivers.

use std::fmt;
use std::ops::{Index, IndexMut};

use crate::error::{Result, TapeError};
use crate::float::Float;

/// Dense matrix stored row-major in one contiguous buffer.
///
/// Indexing is bounds-checked: `m[(i, j)]` panics outside the shape and
/// [`get`](Self::get) returns `None`.
#[derive(Clone, Debug, PartialEq)]
pub struct Matrix<F: Float> {
    rows: usize,
    cols: usize,
    data: Vec<F>,
}

/// One entry on which two matrices disagree beyond the tolerance.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Mismatch<F: Float> {
    pub row: usize,
    pub col: usize,
    /// Entry of the reference matrix (`self`).
    pub expected: F,
    /// Entry of the compared matrix.
    pub actual: F,
}

impl<F: Float> Matrix<F> {
    /// A `rows x cols` matrix of zeros.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Matrix {
            rows,
            cols,
            data: vec![F::zero(); rows * cols],
        }
    }

    /// Wrap a row-major buffer.
    ///
    /// # Errors
    ///
    /// [`TapeError::ShapeMismatch`] if `data.len() != rows * cols`.
    pub fn from_vec(rows: usize, cols: usize, data: Vec<F>) -> Result<Self> {
        crate::error::check_len("matrix data", rows * cols, data.len())?;
        Ok(Matrix { rows, cols, data })
    }

    /// Build from nested rows, which must all have the same length.
    pub fn from_rows(rows: &[Vec<F>]) -> Result<Self> {
        let cols = rows.first().map_or(0, Vec::len);
        let mut data = Vec::with_capacity(rows.len() * cols);
        for row in rows {
            crate::error::check_len("matrix row", cols, row.len())?;
            data.extend_from_slice(row);
        }
        Ok(Matrix {
            rows: rows.len(),
            cols,
            data,
        })
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// `(rows, cols)`.
    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    #[inline]
    pub fn get(&self, i: usize, j: usize) -> Option<F> {
        if i < self.rows && j < self.cols {
            Some(self.data[i * self.cols + j])
        } else {
            None
        }
    }

    /// Row `i` as a slice. Panics if `i >= rows`.
    #[inline]
    pub fn row(&self, i: usize) -> &[F] {
        assert!(i < self.rows, "row {} out of bounds ({} rows)", i, self.rows);
        &self.data[i * self.cols..(i + 1) * self.cols]
    }

    /// Row `i` as a mutable slice. Panics if `i >= rows`.
    #[inline]
    pub fn row_mut(&mut self, i: usize) -> &mut [F] {
        assert!(i < self.rows, "row {} out of bounds ({} rows)", i, self.rows);
        &mut self.data[i * self.cols..(i + 1) * self.cols]
    }

    /// Iterate over rows.
    pub fn iter_rows(&self) -> impl Iterator<Item = &[F]> + '_ {
        // `max(1)` keeps chunks() valid for zero-width matrices.
        self.data.chunks(self.cols.max(1)).take(self.rows)
    }

    /// The row-major buffer.
    #[inline]
    pub fn as_slice(&self) -> &[F] {
        &self.data
    }

    #[inline]
    pub(crate) fn as_mut_slice(&mut self) -> &mut [F] {
        &mut self.data
    }

    /// Copy into nested rows.
    pub fn to_rows(&self) -> Vec<Vec<F>> {
        (0..self.rows).map(|i| self.row(i).to_vec()).collect()
    }

    fn check_same_shape(&self, other: &Self) -> Result<()> {
        if self.shape() != other.shape() {
            return Err(TapeError::ShapeMismatch {
                what: "matrix elements",
                expected: self.rows * self.cols,
                actual: other.rows * other.cols,
            });
        }
        Ok(())
    }

    /// Largest element-wise absolute difference (zero for empty matrices).
    ///
    /// # Errors
    ///
    /// [`TapeError::ShapeMismatch`] if the shapes differ.
    pub fn max_abs_diff(&self, other: &Self) -> Result<F> {
        self.check_same_shape(other)?;
        Ok(self
            .data
            .iter()
            .zip(&other.data)
            .map(|(&a, &b)| (a - b).abs())
            .fold(F::zero(), F::max))
    }

    /// Entries where `|self - other| > eps`, in row-major order.
    ///
    /// # Errors
    ///
    /// [`TapeError::ShapeMismatch`] if the shapes differ.
    pub fn mismatches(&self, other: &Self, eps: F) -> Result<Vec<Mismatch<F>>> {
        self.check_same_shape(other)?;
        let cols = self.cols.max(1);
        Ok(self
            .data
            .iter()
            .zip(&other.data)
            .enumerate()
            // NaN entries never compare within tolerance.
            .filter(|&(_, (&a, &b))| !((a - b).abs() <= eps))
            .map(|(k, (&expected, &actual))| Mismatch {
                row: k / cols,
                col: k % cols,
                expected,
                actual,
            })
            .collect())
    }
}

impl<F: Float> Index<(usize, usize)> for Matrix<F> {
    type Output = F;

    #[inline]
    fn index(&self, (i, j): (usize, usize)) -> &F {
        assert!(
            i < self.rows && j < self.cols,
            "index ({}, {}) out of bounds for {}x{} matrix",
            i,
            j,
            self.rows,
            self.cols
        );
        &self.data[i * self.cols + j]
    }
}

impl<F: Float> IndexMut<(usize, usize)> for Matrix<F> {
    #[inline]
    fn index_mut(&mut self, (i, j): (usize, usize)) -> &mut F {
        assert!(
            i < self.rows && j < self.cols,
            "index ({}, {}) out of bounds for {}x{} matrix",
            i,
            j,
            self.rows,
            self.cols
        );
        &mut self.data[i * self.cols + j]
    }
}

/// One line per row, `i: v0  v1 ...`; precision defaults to 4 digits.
impl<F: Float> fmt::Display for Matrix<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prec = f.precision().unwrap_or(4);
        for (i, row) in self.iter_rows().enumerate() {
            write!(f, "  {}: ", i)?;
            for v in row {
                write!(f, "{:.*}  ", prec, v)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_and_indexing_agree() {
        let m = Matrix::from_rows(&[vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]).unwrap();
        assert_eq!(m.shape(), (2, 3));
        assert_eq!(m.row(1), &[4.0, 5.0, 6.0]);
        assert_eq!(m[(0, 2)], 3.0);
        assert_eq!(m.get(2, 0), None);
        assert_eq!(m.iter_rows().count(), 2);
    }

    #[test]
    fn ragged_rows_are_rejected() {
        assert!(matches!(
            Matrix::from_rows(&[vec![1.0], vec![1.0, 2.0]]),
            Err(TapeError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn mismatches_report_positions() {
        let a = Matrix::from_rows(&[vec![1.0_f64, 2.0], vec![3.0, 4.0]]).unwrap();
        let mut b = a.clone();
        b[(1, 0)] += 1e-3;
        b[(0, 1)] += 1e-12;
        let bad = a.mismatches(&b, 1e-10).unwrap();
        assert_eq!(bad.len(), 1);
        assert_eq!((bad[0].row, bad[0].col), (1, 0));
        assert!((a.max_abs_diff(&b).unwrap() - 1e-3).abs() < 1e-15);
    }

    #[test]
    fn shape_mismatch_in_comparison() {
        let a = Matrix::<f64>::zeros(2, 2);
        let b = Matrix::<f64>::zeros(2, 3);
        assert!(a.mismatches(&b, 1e-10).is_err());
    }

    #[test]
    #[should_panic]
    fn out_of_bounds_index_panics() {
        let m = Matrix::<f64>::zeros(2, 2);
        let _ = m[(0, 2)];
    }
}
