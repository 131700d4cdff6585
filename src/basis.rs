//! Polynomial bases and the nested-group weight schedule.

use crate::error::{HierBasisError, Result, ensure_finite};
use ndarray::{Array1, Array2, ArrayBase, Axis, Data, Ix1, Ix2};
use serde::{Deserialize, Serialize};

/// Build the `n x nbasis` matrix whose columns are `x, x^2, ..., x^nbasis`.
///
/// Basis index `j` (0-based) is the polynomial of degree `j + 1`; the nested
/// penalty therefore removes high degrees before low ones.
pub fn polynomial_basis<S: Data<Elem = f64>>(
    x: &ArrayBase<S, Ix1>,
    nbasis: usize,
) -> Result<Array2<f64>> {
    if nbasis == 0 {
        return Err(HierBasisError::InvalidInput(
            "nbasis must be at least 1".to_string(),
        ));
    }
    ensure_finite(x.iter(), "predictor values")?;

    let mut basis = Array2::<f64>::zeros((x.len(), nbasis));
    for (mut row, &xi) in basis.axis_iter_mut(Axis(0)).zip(x.iter()) {
        let mut power = xi;
        for entry in row.iter_mut() {
            *entry = power;
            power *= xi;
        }
    }
    Ok(basis)
}

/// Base weights `ak[j] = j^m - (j-1)^m` for `j = 1..=nbasis`.
///
/// The sum of the first `j` weights telescopes to `j^m`, so the penalty on
/// the suffix starting at `j` grows like a degree-`m` polynomial in `j`.
pub fn weight_schedule(nbasis: usize, m: f64) -> Result<Array1<f64>> {
    if nbasis == 0 {
        return Err(HierBasisError::InvalidInput(
            "nbasis must be at least 1".to_string(),
        ));
    }
    if !m.is_finite() || m <= 0.0 {
        return Err(HierBasisError::InvalidInput(format!(
            "smoothness order must be positive and finite, got {m}"
        )));
    }
    Ok(Array1::from_iter((1..=nbasis).map(|j| {
        let j = j as f64;
        j.powf(m) - (j - 1.0).powf(m)
    })))
}

/// A design matrix with its column means removed.
///
/// The means are kept so that prediction-time bases can be centered the same
/// way the training basis was.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CenteredDesign {
    pub matrix: Array2<f64>,
    pub column_means: Array1<f64>,
}

impl CenteredDesign {
    pub fn new<S: Data<Elem = f64>>(design: &ArrayBase<S, Ix2>) -> Result<Self> {
        if design.nrows() == 0 {
            return Err(HierBasisError::EmptyInput(
                "design matrix has no rows".to_string(),
            ));
        }
        ensure_finite(design.iter(), "design matrix")?;
        let column_means = design
            .mean_axis(Axis(0))
            .ok_or_else(|| HierBasisError::EmptyInput("design matrix has no rows".to_string()))?;
        let matrix = design - &column_means;
        Ok(Self {
            matrix,
            column_means,
        })
    }
}
