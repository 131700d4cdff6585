use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};

/// Coefficients along a lambda path: one column per lambda.
///
/// Stored densely; the hierarchical penalty makes most trailing entries
/// exactly zero, and [`active_set`](Self::active_set) /
/// [`nonzeros`](Self::nonzeros) give the nonzero-indexed view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoefficientPath {
    values: Array2<f64>,
}

impl CoefficientPath {
    pub fn new(values: Array2<f64>) -> Self {
        Self { values }
    }

    pub fn ncoef(&self) -> usize {
        self.values.nrows()
    }

    pub fn nlam(&self) -> usize {
        self.values.ncols()
    }

    pub fn column(&self, lam_index: usize) -> ArrayView1<'_, f64> {
        self.values.column(lam_index)
    }

    pub fn as_dense(&self) -> &Array2<f64> {
        &self.values
    }

    /// Indices of nonzero coefficients at one lambda.
    pub fn active_set(&self, lam_index: usize) -> Vec<usize> {
        self.values
            .column(lam_index)
            .iter()
            .enumerate()
            .filter_map(|(i, &v)| (v != 0.0).then_some(i))
            .collect()
    }

    /// Number of nonzero coefficients per lambda.
    pub fn active_set_sizes(&self) -> Array1<usize> {
        self.values
            .axis_iter(Axis(1))
            .map(|col| col.iter().filter(|&&v| v != 0.0).count())
            .collect()
    }

    /// `(row, lambda index, value)` for every nonzero entry, column-major.
    pub fn nonzeros(&self) -> Vec<(usize, usize, f64)> {
        let mut out = Vec::new();
        for (l, col) in self.values.axis_iter(Axis(1)).enumerate() {
            for (i, &v) in col.iter().enumerate() {
                if v != 0.0 {
                    out.push((i, l, v));
                }
            }
        }
        out
    }
}
