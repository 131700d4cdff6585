//! QR reparametrization that makes the hierarchical proximal step exact.
//!
//! For a design with `QᵗQ = n·I` the two problems
//!
//! ```text
//!   (1/2n)·‖y − Q·β‖² + P(β)      and      ½·‖Qᵗy/n − β‖² + P(β)
//! ```
//!
//! share their minimizer, so fitting reduces to one proximal evaluation per
//! lambda followed by a triangular back-transform.

use crate::basis::CenteredDesign;
use crate::error::{HierBasisError, Result};
use crate::linalg::faer_ndarray::{FaerQr, fast_atv};
use ndarray::{Array1, Array2, ArrayBase, ArrayView1, Axis, Data, Ix1, Ix2};
use serde::{Deserialize, Serialize};

/// Relative size below which a diagonal entry of R counts as zero.
const RANK_TOLERANCE: f64 = 1e-10;

/// Orthogonal factorization of a centered design: `X_c = Q·R`, `QᵗQ = n·I`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrthogonalBasis {
    /// n x J, columns scaled to squared norm `n`.
    pub q: Array2<f64>,
    /// J x J upper triangular.
    pub r: Array2<f64>,
    pub column_means: Array1<f64>,
}

/// Center `design` and factor it.
///
/// Fails with [`HierBasisError::RankDeficient`] when the centered columns are
/// numerically collinear, since the fit could not be mapped back to the
/// original basis.
pub fn orthogonalize<S: Data<Elem = f64>>(design: &ArrayBase<S, Ix2>) -> Result<OrthogonalBasis> {
    let centered = CenteredDesign::new(design)?;
    orthogonalize_centered(centered)
}

pub fn orthogonalize_centered(centered: CenteredDesign) -> Result<OrthogonalBasis> {
    let (n, ncols) = centered.matrix.dim();
    if ncols == 0 {
        return Err(HierBasisError::EmptyInput(
            "design matrix has no columns".to_string(),
        ));
    }
    if n < ncols {
        return Err(HierBasisError::RankDeficient { rank: n, ncols });
    }

    let (q, r) = centered.matrix.thin_qr()?;

    let diag_scale = r.diag().iter().fold(0.0f64, |acc, v| acc.max(v.abs()));
    let rank = r
        .diag()
        .iter()
        .filter(|v| v.abs() > RANK_TOLERANCE * diag_scale.max(f64::MIN_POSITIVE))
        .count();
    if rank < ncols {
        return Err(HierBasisError::RankDeficient { rank, ncols });
    }

    let scale = (n as f64).sqrt();
    Ok(OrthogonalBasis {
        q: q * scale,
        r: r / scale,
        column_means: centered.column_means,
    })
}

impl OrthogonalBasis {
    pub fn nobs(&self) -> usize {
        self.q.nrows()
    }

    pub fn nbasis(&self) -> usize {
        self.q.ncols()
    }

    /// Center a new design (same columns) with the training column means.
    pub fn center_like<S: Data<Elem = f64>>(
        &self,
        design: &ArrayBase<S, Ix2>,
    ) -> Result<Array2<f64>> {
        crate::error::ensure_len("design columns", self.column_means.len(), design.ncols())?;
        Ok(design - &self.column_means)
    }

    /// Response projection `Qᵗy / n` onto the orthogonal coordinates.
    pub fn project<S: Data<Elem = f64>>(&self, y: &ArrayBase<S, Ix1>) -> Result<Array1<f64>> {
        crate::error::ensure_len("response length", self.nobs(), y.len())?;
        let n = self.nobs() as f64;
        Ok(fast_atv(&self.q, y) / n)
    }

    /// Solve `R·β = β_orth` for one coefficient vector.
    pub fn back_transform(&self, beta_orth: ArrayView1<'_, f64>) -> Result<Array1<f64>> {
        solve_upper_triangular(&self.r, beta_orth)
    }

    /// Back-transform every column of an orthogonal-scale coefficient path.
    pub fn back_transform_path<S: Data<Elem = f64>>(
        &self,
        path: &ArrayBase<S, Ix2>,
    ) -> Result<Array2<f64>> {
        crate::error::ensure_len("coefficient rows", self.nbasis(), path.nrows())?;
        let mut out = Array2::<f64>::zeros(path.raw_dim());
        for (src, mut dst) in path.axis_iter(Axis(1)).zip(out.axis_iter_mut(Axis(1))) {
            dst.assign(&self.back_transform(src)?);
        }
        Ok(out)
    }
}

/// Back-substitution for an upper-triangular system.
///
/// Zero or non-finite pivots are reported instead of producing NaNs.
pub fn solve_upper_triangular(
    r: &Array2<f64>,
    rhs: ArrayView1<'_, f64>,
) -> Result<Array1<f64>> {
    let p = r.nrows();
    crate::error::ensure_len("triangular factor columns", p, r.ncols())?;
    crate::error::ensure_len("right-hand side length", p, rhs.len())?;

    let mut x = Array1::<f64>::zeros(p);
    for i in (0..p).rev() {
        let pivot = r[[i, i]];
        if pivot == 0.0 || !pivot.is_finite() {
            return Err(HierBasisError::SingularBacktransform { index: i, pivot });
        }
        let mut acc = rhs[i];
        for k in (i + 1)..p {
            acc -= r[[i, k]] * x[k];
        }
        x[i] = acc / pivot;
    }
    Ok(x)
}
