//! Effective degrees of freedom of a hierarchical-penalty fit.
//!
//! On the active prefix `A = {1..K'}` the penalty is smooth, and the fitted
//! values `Q_A·β_A(y)` have Jacobian `Q_A·M⁻¹·Q_Aᵗ / n` with
//!
//! ```text
//!   M = I + Σ_{j ≤ K'} (λ·a_j / ‖s_j‖) · (I_j − s_j·s_jᵗ / ‖s_j‖²),   s_j = β[j..K']
//! ```
//!
//! where `I_j` is the identity on coordinates `j..K'`. The degrees of freedom
//! are the trace of that Jacobian.

use crate::error::{HierBasisError, Result, ensure_len};
use crate::linalg::faer_ndarray::{FaerCholesky, fast_ata};
use crate::orthogonal::OrthogonalBasis;
use crate::path::CoefficientPath;
use faer::Side;
use ndarray::{Array1, Array2, ArrayView1, s};
use rayon::prelude::*;

/// Degrees of freedom for one orthogonal-scale coefficient vector.
///
/// An all-zero vector has no active basis and zero degrees of freedom.
pub fn degrees_of_freedom(
    beta_orth: ArrayView1<'_, f64>,
    lambda: f64,
    ak: ArrayView1<'_, f64>,
    basis: &OrthogonalBasis,
) -> Result<f64> {
    ensure_len("coefficient length", basis.nbasis(), beta_orth.len())?;
    ensure_len("weight template length", basis.nbasis(), ak.len())?;
    if !(lambda >= 0.0) || !lambda.is_finite() {
        return Err(HierBasisError::InvalidInput(format!(
            "lambda must be non-negative and finite, got {lambda}"
        )));
    }

    let Some(last) = beta_orth.iter().rposition(|&v| v != 0.0) else {
        return Ok(0.0);
    };
    let active = last + 1;

    let m = curvature_system(beta_orth.slice(s![..active]), lambda, ak);
    let m_inv = m.cholesky(Side::Lower)?.inverse();
    let gram = fast_ata(&basis.q.slice(s![.., ..active]));

    // trace(Q_A M⁻¹ Q_Aᵗ) = trace(M⁻¹ Q_AᵗQ_A)
    let trace: f64 = (0..active)
        .map(|a| m_inv.row(a).dot(&gram.column(a)))
        .sum();
    Ok(trace / basis.nobs() as f64)
}

/// Degrees of freedom for every column of an orthogonal-scale path.
pub fn degrees_of_freedom_path(
    path: &CoefficientPath,
    lambdas: ArrayView1<'_, f64>,
    ak: ArrayView1<'_, f64>,
    basis: &OrthogonalBasis,
) -> Result<Array1<f64>> {
    ensure_len("lambda count", path.nlam(), lambdas.len())?;
    let values = (0..path.nlam())
        .into_par_iter()
        .map(|l| degrees_of_freedom(path.column(l), lambdas[l], ak, basis))
        .collect::<Result<Vec<f64>>>()?;
    Ok(Array1::from(values))
}

fn curvature_system(
    beta: ArrayView1<'_, f64>,
    lambda: f64,
    ak: ArrayView1<'_, f64>,
) -> Array2<f64> {
    let k = beta.len();
    let mut m = Array2::<f64>::eye(k);
    for j in 0..k {
        let suffix = beta.slice(s![j..]);
        let norm_sq = suffix.dot(&suffix);
        if norm_sq <= 0.0 {
            continue;
        }
        let norm = norm_sq.sqrt();
        let coef = lambda * ak[j] / norm;
        for a in j..k {
            m[[a, a]] += coef;
            for b in j..k {
                m[[a, b]] -= coef * beta[a] * beta[b] / norm_sq;
            }
        }
    }
    m
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orthogonal::orthogonalize;
    use crate::prox::prox_hierarchical;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn cubic_basis() -> OrthogonalBasis {
        let x = Array1::<f64>::linspace(-1.0, 1.0, 25);
        let design = Array2::from_shape_fn((25, 3), |(i, j)| x[i].powi(j as i32 + 1));
        orthogonalize(&design).unwrap()
    }

    #[test]
    fn zero_fit_has_zero_dof() {
        let basis = cubic_basis();
        let ak = array![1.0, 7.0, 19.0];
        let dof = degrees_of_freedom(Array1::zeros(3).view(), 0.4, ak.view(), &basis).unwrap();
        assert_eq!(dof, 0.0);
    }

    #[test]
    fn unpenalized_fit_counts_active_columns() {
        let basis = cubic_basis();
        let ak = array![1.0, 7.0, 19.0];
        let full =
            degrees_of_freedom(array![0.3, -0.2, 0.1].view(), 0.0, ak.view(), &basis).unwrap();
        assert_abs_diff_eq!(full, 3.0, epsilon = 1e-9);
        let two =
            degrees_of_freedom(array![0.3, -0.2, 0.0].view(), 0.0, ak.view(), &basis).unwrap();
        assert_abs_diff_eq!(two, 2.0, epsilon = 1e-9);
    }

    #[test]
    fn shrinkage_lowers_dof_below_active_count() {
        let basis = cubic_basis();
        let ak = array![1.0, 7.0, 19.0];
        let v = array![0.9, 0.5, 0.3];
        let lambda = 0.005;
        let beta = prox_hierarchical(v.view(), (&ak * lambda).view()).unwrap();
        let active = beta.iter().filter(|&&b| b != 0.0).count();
        assert!(active > 0);
        let dof = degrees_of_freedom(beta.view(), lambda, ak.view(), &basis).unwrap();
        assert!(dof > 0.0 && dof < active as f64, "dof = {dof}, active = {active}");
    }

    #[test]
    fn matches_finite_difference_trace_of_fit_map() {
        let basis = cubic_basis();
        let n = basis.nobs();
        let ak: Array1<f64> = array![1.0, 7.0, 19.0];
        let y = Array1::from_shape_fn(n, |i| {
            let t = i as f64 / n as f64;
            (3.0 * t).sin() + 0.4 * t * t - 0.1 * (7.0 * t).cos()
        });

        for lambda in [0.001f64, 0.004, 0.015] {
            let weights = &ak * lambda;
            let fit = |response: &Array1<f64>| {
                let v = basis.project(response).unwrap();
                let beta = prox_hierarchical(v.view(), weights.view()).unwrap();
                basis.q.dot(&beta)
            };

            let h = 1e-6;
            let mut trace = 0.0;
            for i in 0..n {
                let mut up = y.clone();
                up[i] += h;
                let mut down = y.clone();
                down[i] -= h;
                trace += (fit(&up)[i] - fit(&down)[i]) / (2.0 * h);
            }

            let v = basis.project(&y).unwrap();
            let beta = prox_hierarchical(v.view(), weights.view()).unwrap();
            let dof = degrees_of_freedom(beta.view(), lambda, ak.view(), &basis).unwrap();
            assert_abs_diff_eq!(dof, trace, epsilon = 1e-5);
        }

        let beta = prox_hierarchical(basis.project(&y).unwrap().view(), (&ak * 0.001).view())
            .unwrap();
        assert!(degrees_of_freedom(beta.view(), 0.001, ak.view(), &basis).unwrap() > 0.5);
    }

    #[test]
    fn curvature_system_is_identity_plus_projections() {
        let beta = array![3.0, 4.0];
        let ak = array![1.0, 2.0];
        let m = curvature_system(beta.view(), 1.0, ak.view());
        // j = 1: (1/5)(I - ssᵗ/25) on both coords; j = 2: (2/4)(1 - 1) on the last.
        assert_abs_diff_eq!(m[[0, 0]], 1.0 + 0.2 * (1.0 - 9.0 / 25.0), epsilon = 1e-12);
        assert_abs_diff_eq!(m[[0, 1]], -0.2 * 12.0 / 25.0, epsilon = 1e-12);
        assert_abs_diff_eq!(m[[1, 0]], m[[0, 1]], epsilon = 1e-15);
        assert_abs_diff_eq!(m[[1, 1]], 1.0 + 0.2 * (1.0 - 16.0 / 25.0), epsilon = 1e-12);
    }
}
