//! Closed-form proximal operator of the nested-suffix group penalty
//!
//! ```text
//!   argmin_β ½‖y − β‖² + Σ_j w_j · ‖β[j..J]‖₂
//! ```
//!
//! Groups are suffixes, so group `j` contains every group after it. Working
//! from the innermost suffix outward, each group's shrinkage only depends on
//! coordinates already finalized by the inner groups, and a single backward
//! pass yields the exact minimizer.
//!
//! Step `j` scales the whole suffix `j..J` by
//! `c_j = max(1 − w_j / ‖s_j‖, 0)`, hence coordinate `k` ends up as
//! `y_k · c_1 ⋯ c_k`. The pass below tracks `‖s_j‖` incrementally and applies
//! the cumulative products in a forward sweep, which keeps the whole
//! evaluation linear in `J`.

use crate::error::{HierBasisError, Result, ensure_finite, ensure_len};
use crate::path::CoefficientPath;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, ArrayViewMut1, Axis};
use rayon::prelude::*;

/// Paths with at least this many coefficient entries are solved in parallel.
const PARALLEL_MIN_ENTRIES: usize = 4096;

const SHRINK_SNAP: f64 = 4.0 * f64::EPSILON;

/// Exact minimizer of `½‖y − β‖² + Σ_j weights_j · ‖β[j..]‖₂`.
///
/// The support of the result is a leading block: once a suffix is shrunk to
/// zero it stays zero.
pub fn prox_hierarchical(
    y: ArrayView1<'_, f64>,
    weights: ArrayView1<'_, f64>,
) -> Result<Array1<f64>> {
    validate_weights(y.len(), weights)?;
    ensure_finite(y.iter(), "prox input")?;
    let mut beta = y.to_owned();
    prox_hierarchical_in_place(beta.view_mut(), weights);
    Ok(beta)
}

/// In-place variant used by the solvers; inputs are assumed validated.
pub(crate) fn prox_hierarchical_in_place(
    mut beta: ArrayViewMut1<'_, f64>,
    weights: ArrayView1<'_, f64>,
) {
    let len = beta.len();
    debug_assert_eq!(len, weights.len());
    if len == 0 {
        return;
    }

    let mut factors = vec![0.0f64; len];
    let mut tail_sq = 0.0f64;
    for j in (0..len).rev() {
        let norm = (beta[j] * beta[j] + tail_sq).sqrt();
        // A zero suffix has no direction to keep; treat it as fully shrunk.
        // Margins at rounding level also count as fully shrunk so the
        // critical lambda lands exactly on zero.
        let excess = norm - weights[j];
        let factor = if norm > 0.0 && excess > SHRINK_SNAP * norm {
            excess / norm
        } else {
            0.0
        };
        factors[j] = factor;
        tail_sq = factor * factor * norm * norm;
    }

    let mut cumulative = 1.0f64;
    for (value, factor) in beta.iter_mut().zip(factors) {
        cumulative *= factor;
        *value = if cumulative == 0.0 {
            0.0
        } else {
            *value * cumulative
        };
    }
}

/// Apply [`prox_hierarchical`] to `y` once per column of `weights`
/// (J x nlam). Columns are independent and large paths are split across the
/// rayon pool.
pub fn prox_hierarchical_path(
    y: ArrayView1<'_, f64>,
    weights: ArrayView2<'_, f64>,
) -> Result<CoefficientPath> {
    let (ncoef, nlam) = weights.dim();
    ensure_len("weight matrix rows", y.len(), ncoef)?;
    ensure_finite(y.iter(), "prox input")?;
    for col in weights.axis_iter(Axis(1)) {
        validate_weights(ncoef, col)?;
    }

    let solve_column = |l: usize| {
        let mut beta = y.to_owned();
        prox_hierarchical_in_place(beta.view_mut(), weights.column(l));
        beta
    };
    let columns: Vec<Array1<f64>> = if ncoef * nlam >= PARALLEL_MIN_ENTRIES {
        (0..nlam).into_par_iter().map(solve_column).collect()
    } else {
        (0..nlam).map(solve_column).collect()
    };

    let mut out = Array2::<f64>::zeros((ncoef, nlam));
    for (mut dst, src) in out.axis_iter_mut(Axis(1)).zip(columns) {
        dst.assign(&src);
    }
    Ok(CoefficientPath::new(out))
}

/// Broadcast a base weight vector over a lambda path: `w[j, l] = lambda[l] · ak[j]`.
pub fn weight_matrix(ak: ArrayView1<'_, f64>, lambdas: ArrayView1<'_, f64>) -> Array2<f64> {
    let ak_col = ak.insert_axis(Axis(1));
    let lam_row = lambdas.insert_axis(Axis(0));
    &ak_col * &lam_row
}

fn validate_weights(expected: usize, weights: ArrayView1<'_, f64>) -> Result<()> {
    ensure_len("weight vector length", expected, weights.len())?;
    if weights.iter().any(|&w| !(w >= 0.0) || !w.is_finite()) {
        return Err(HierBasisError::InvalidInput(
            "penalty weights must be non-negative and finite".to_string(),
        ));
    }
    Ok(())
}
