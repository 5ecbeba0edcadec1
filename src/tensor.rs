//! Plaintext and encrypted 2D grids.

use crate::error::{Error, Result};
use itertools::iproduct;
use log::error;
use nalgebra::DMatrix;
use rayon::prelude::*;

/// Immutable real-valued matrix, the input and reference side of every run.
#[derive(Clone, Debug, PartialEq)]
pub struct PlaintextTensor(DMatrix<f64>);

impl PlaintextTensor {
    /// Build from row literals; rows must be non-empty and of equal length.
    pub fn from_rows<R: AsRef<[f64]>>(rows: &[R]) -> Result<Self> {
        let cols = rows.first().map(|r| r.as_ref().len()).unwrap_or(0);
        if cols == 0 {
            return Err(Error::ShapeMismatch("tensor must have at least one element".to_string()));
        }
        if let Some((i, r)) = rows.iter().enumerate().find(|(_, r)| r.as_ref().len() != cols) {
            return Err(Error::ShapeMismatch(format!(
                "row {i} has {} entries, expected {cols}",
                r.as_ref().len()
            )));
        }
        Ok(Self(DMatrix::from_fn(rows.len(), cols, |i, j| rows[i].as_ref()[j])))
    }

    /// Wrap a non-empty matrix.
    pub fn from_matrix(matrix: DMatrix<f64>) -> Result<Self> {
        if matrix.is_empty() {
            return Err(Error::ShapeMismatch("tensor must have at least one element".to_string()));
        }
        Ok(Self(matrix))
    }

    /// Number of rows.
    pub fn rows(&self) -> usize {
        self.0.nrows()
    }

    /// Number of columns.
    pub fn cols(&self) -> usize {
        self.0.ncols()
    }

    /// `(rows, cols)`
    pub fn shape(&self) -> (usize, usize) {
        self.0.shape()
    }

    /// Element at `(row, col)`; panics when out of range.
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.0[(row, col)]
    }

    /// Underlying matrix.
    pub fn as_matrix(&self) -> &DMatrix<f64> {
        &self.0
    }

    /// Element-wise map into a new tensor.
    pub fn map(&self, f: impl Fn(f64) -> f64) -> Self {
        Self(self.0.map(f))
    }
}

/// Plaintext convolution weights. Never encrypted.
#[derive(Clone, Debug, PartialEq)]
pub struct Kernel(PlaintextTensor);

impl Kernel {
    /// Same rules as [`PlaintextTensor::from_rows`].
    pub fn from_rows<R: AsRef<[f64]>>(rows: &[R]) -> Result<Self> {
        PlaintextTensor::from_rows(rows).map(Self)
    }

    /// Kernel height.
    pub fn rows(&self) -> usize {
        self.0.rows()
    }

    /// Kernel width.
    pub fn cols(&self) -> usize {
        self.0.cols()
    }

    /// Weight at `(row, col)`.
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.0.get(row, col)
    }

    /// Weights as a plain tensor.
    pub fn as_tensor(&self) -> &PlaintextTensor {
        &self.0
    }
}

/// Row-major grid of ciphertext handles, one per plaintext element.
#[derive(Clone, Debug)]
pub struct EncryptedTensor<C> {
    rows: usize,
    cols: usize,
    cells: Vec<C>,
}

impl<C: Clone> EncryptedTensor<C> {
    pub(crate) fn from_cells(rows: usize, cols: usize, cells: Vec<C>) -> Self {
        debug_assert_eq!(cells.len(), rows * cols, "cell count must match shape");
        Self { rows, cols, cells }
    }

    /// Number of rows.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns.
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// `(rows, cols)`
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Handle at `(row, col)`, if in range.
    pub fn get(&self, row: usize, col: usize) -> Option<&C> {
        (row < self.rows && col < self.cols).then(|| &self.cells[row * self.cols + col])
    }

    /// Handles of row `i`, in column order.
    pub fn row(&self, i: usize) -> Vec<C> {
        self.cells[i * self.cols..(i + 1) * self.cols].to_vec()
    }

    /// Handles of column `j`, in row order.
    pub fn column(&self, j: usize) -> Vec<C> {
        self.cells.iter().skip(j).step_by(self.cols).cloned().collect()
    }

    /// All handles, row-major.
    pub fn cells(&self) -> &[C] {
        &self.cells
    }
}

/// Evaluate `f` at every `(row, col)` of a `rows × cols` grid on the rayon pool.
///
/// All cells run; failures are logged with their position and the first one in
/// row-major order is returned.
pub(crate) fn par_cells<T, F>(rows: usize, cols: usize, f: F) -> Result<Vec<T>>
where
    T: Send,
    F: Fn(usize, usize) -> Result<T> + Sync,
{
    let positions: Vec<(usize, usize)> = iproduct!(0..rows, 0..cols).collect();
    let results: Vec<Result<T>> = positions.par_iter().map(|&(i, j)| f(i, j)).collect();

    let mut first_error = None;
    let mut cells = Vec::with_capacity(results.len());
    for ((i, j), result) in positions.into_iter().zip(results) {
        match result {
            Ok(cell) => cells.push(cell),
            Err(e) => {
                error!("cell ({i}, {j}) failed: {e}");
                first_error.get_or_insert(e);
            }
        }
    }
    match first_error {
        Some(e) => Err(e),
        None => Ok(cells),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plaintext_shape() {
        let t = PlaintextTensor::from_rows(&[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]).unwrap();
        assert_eq!(t.shape(), (2, 3));
        assert_eq!(t.get(1, 0), 4.0);
        assert_eq!(t.map(|x| x * 2.0).get(0, 2), 6.0);

        let ragged: Vec<Vec<f64>> = vec![vec![1.0, 2.0], vec![3.0]];
        assert!(matches!(
            PlaintextTensor::from_rows(&ragged),
            Err(Error::ShapeMismatch(_))
        ));
        let empty: Vec<Vec<f64>> = vec![];
        assert!(PlaintextTensor::from_rows(&empty).is_err());
        assert!(Kernel::from_rows(&[Vec::<f64>::new()]).is_err());
    }

    #[test]
    fn test_rows_and_columns() {
        let t = EncryptedTensor::from_cells(2, 3, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(t.row(1), vec![4, 5, 6]);
        assert_eq!(t.column(2), vec![3, 6]);
        assert_eq!(t.get(0, 1), Some(&2));
        assert_eq!(t.get(2, 0), None);
    }

    #[test]
    fn test_par_cells_reports_first_failure() {
        let out = par_cells(3, 2, |i, j| Ok(i * 10 + j)).unwrap();
        assert_eq!(out, vec![0, 1, 10, 11, 20, 21]);

        let err = par_cells(3, 3, |i, j| {
            if i + j >= 3 {
                Err(Error::ShapeMismatch(format!("({i}, {j})")))
            } else {
                Ok(())
            }
        })
        .unwrap_err();
        assert_eq!(err, Error::ShapeMismatch("(1, 2)".to_string()));
    }
}
