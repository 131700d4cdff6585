//! Single-predictor hierarchical basis regression.
//!
//! The pipeline is orthogonalize → project → lambda path → one prox per
//! lambda → triangular back-transform. No iteration is involved: the
//! orthogonal design makes every path point a closed-form prox evaluation.

use crate::basis::{polynomial_basis, weight_schedule};
use crate::dof::degrees_of_freedom_path;
use crate::error::{HierBasisError, Result, ensure_finite, ensure_len};
use crate::lambda::build_lambda_path;
use crate::linalg::faer_ndarray::fast_ab;
use crate::orthogonal::{OrthogonalBasis, orthogonalize};
use crate::path::CoefficientPath;
use crate::prox::{prox_hierarchical_path, weight_matrix};
use crate::types::{HierBasisConfig, LambdaPath, PathConfig};
use ndarray::{Array1, Array2, ArrayBase, ArrayView1, ArrayView2, Data, Ix2};
use serde::{Deserialize, Serialize};

/// Coefficient path of a single-response fit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SingleResponsePath {
    /// Coefficients on the original (centered) design columns.
    pub beta: CoefficientPath,
    /// Coefficients on the orthogonal basis `Q`.
    pub beta_orthogonal: CoefficientPath,
    pub lambdas: LambdaPath,
    pub basis: OrthogonalBasis,
}

/// Fit the full lambda path for one design and one response.
///
/// `design` is centered internally. `ak` is the base weight vector; the
/// penalty at `lambda[l]` is `lambda[l] · ak`.
pub fn fit_single_response<S: Data<Elem = f64>>(
    design: &ArrayBase<S, Ix2>,
    y: ArrayView1<'_, f64>,
    ak: ArrayView1<'_, f64>,
    path: &PathConfig,
) -> Result<SingleResponsePath> {
    let (basis, v, lambdas) = prepare(design, y, ak, path)?;
    let weights = weight_matrix(ak, lambdas.view());
    finish(basis, v, lambdas, weights.view())
}

/// Variant taking an explicit `J x nlam` weight template; column `l` is
/// scaled by `lambda[l]`. The automatic top of the path is still derived from
/// `ak`.
pub fn fit_single_response_with_template<S: Data<Elem = f64>>(
    design: &ArrayBase<S, Ix2>,
    y: ArrayView1<'_, f64>,
    ak: ArrayView1<'_, f64>,
    template: ArrayView2<'_, f64>,
    path: &PathConfig,
) -> Result<SingleResponsePath> {
    ensure_len("weight template rows", design.ncols(), template.nrows())?;
    ensure_len("weight template columns", path.nlam, template.ncols())?;
    let (basis, v, lambdas) = prepare(design, y, ak, path)?;
    let weights = &template * &lambdas.view().insert_axis(ndarray::Axis(0));
    finish(basis, v, lambdas, weights.view())
}

fn prepare<S: Data<Elem = f64>>(
    design: &ArrayBase<S, Ix2>,
    y: ArrayView1<'_, f64>,
    ak: ArrayView1<'_, f64>,
    path: &PathConfig,
) -> Result<(OrthogonalBasis, Array1<f64>, LambdaPath)> {
    ensure_len("response length", design.nrows(), y.len())?;
    ensure_len("weight template length", design.ncols(), ak.len())?;
    ensure_finite(y.iter(), "response")?;

    let basis = orthogonalize(design)?;
    let v = basis.project(&y)?;
    let lambdas = build_lambda_path(
        v.view(),
        ak,
        path.nlam,
        path.lam_min_ratio,
        path.max_lambda,
    )?;
    Ok((basis, v, lambdas))
}

fn finish(
    basis: OrthogonalBasis,
    v: Array1<f64>,
    lambdas: LambdaPath,
    weights: ArrayView2<'_, f64>,
) -> Result<SingleResponsePath> {
    let beta_orthogonal = prox_hierarchical_path(v.view(), weights)?;
    let beta = CoefficientPath::new(basis.back_transform_path(beta_orthogonal.as_dense())?);
    log::debug!(
        "hierarchical path: {} lambdas from {:.3e} to {:.3e}, final active set {}",
        lambdas.len(),
        lambdas.max_lambda(),
        lambdas[lambdas.len() - 1],
        beta_orthogonal
            .active_set_sizes()
            .last()
            .copied()
            .unwrap_or(0)
    );
    Ok(SingleResponsePath {
        beta,
        beta_orthogonal,
        lambdas,
        basis,
    })
}

/// Univariate nonparametric fit on a polynomial basis of `x`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HierBasis {
    pub intercept: f64,
    pub ak: Array1<f64>,
    pub nbasis: usize,
    pub m: f64,
    pub path: SingleResponsePath,
}

impl HierBasis {
    pub fn fit(
        x: ArrayView1<'_, f64>,
        y: ArrayView1<'_, f64>,
        config: &HierBasisConfig,
    ) -> Result<Self> {
        ensure_len("response length", x.len(), y.len())?;
        if y.is_empty() {
            return Err(HierBasisError::EmptyInput("no observations".to_string()));
        }
        let design = polynomial_basis(&x, config.nbasis)?;
        let ak = weight_schedule(config.nbasis, config.m)?;
        let intercept = y.mean().unwrap_or(0.0);
        let centered_y = y.mapv(|v| v - intercept);
        let path = fit_single_response(&design, centered_y.view(), ak.view(), &config.path)?;
        Ok(Self {
            intercept,
            ak,
            nbasis: config.nbasis,
            m: config.m,
            path,
        })
    }

    pub fn lambdas(&self) -> &LambdaPath {
        &self.path.lambdas
    }

    pub fn nlam(&self) -> usize {
        self.path.lambdas.len()
    }

    pub fn active_set_sizes(&self) -> Array1<usize> {
        self.path.beta_orthogonal.active_set_sizes()
    }

    /// Training fitted values at one lambda.
    pub fn fitted_values(&self, lam_index: usize) -> Array1<f64> {
        self.path
            .basis
            .q
            .dot(&self.path.beta_orthogonal.column(lam_index))
            + self.intercept
    }

    /// Predictions at new points, one column per lambda.
    pub fn predict(&self, new_x: ArrayView1<'_, f64>) -> Result<Array2<f64>> {
        let design = polynomial_basis(&new_x, self.nbasis)?;
        let centered = self.path.basis.center_like(&design)?;
        Ok(fast_ab(&centered, self.path.beta.as_dense()) + self.intercept)
    }

    /// Effective degrees of freedom at every lambda.
    pub fn degrees_of_freedom(&self) -> Result<Array1<f64>> {
        degrees_of_freedom_path(
            &self.path.beta_orthogonal,
            self.path.lambdas.view(),
            self.ak.view(),
            &self.path.basis,
        )
    }
}
