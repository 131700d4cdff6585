//! Sparse additive models by block coordinate descent.
//!
//! Each predictor `l` owns a block of `J` coefficients on its own orthogonal
//! basis `X_l` (`X_lᵗX_l = n·I`). For a fixed lambda the objective
//!
//! ```text
//!   (1/2n)·‖y − Σ_l X_l·β_l‖² + Σ_l Σ_j w_j·‖β_l[j..J]‖
//! ```
//!
//! is minimized exactly in one block by the hierarchical prox of
//! `X_lᵗ·r_l / n`, where `r_l` is the partial residual that leaves block `l`
//! out. Cycling over blocks never increases the objective.

use crate::basis::{polynomial_basis, weight_schedule};
use crate::error::{HierBasisError, Result, ensure_finite, ensure_len};
use crate::lambda::{critical_lambda, lambda_path_from_top};
use crate::linalg::faer_ndarray::{fast_ab, fast_atv};
use crate::orthogonal::{OrthogonalBasis, orthogonalize};
use crate::path::CoefficientPath;
use crate::prox::{prox_hierarchical_in_place, weight_matrix};
use crate::types::{AdditiveConfig, AdditiveHierBasisConfig, LambdaPath};
use ndarray::{Array1, Array2, Array3, ArrayView1, ArrayView2, ArrayView3, Axis, s};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Outcome of the sweeps for one lambda.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceState {
    pub lambda_index: usize,
    /// Number of completed sweeps.
    pub iterations: usize,
    pub converged: bool,
    /// Change in the Frobenius norm of the stacked coefficients over the last sweep.
    pub last_change: f64,
}

/// Coefficient path of an additive fit.
///
/// `beta` has `J·p` rows, block-major: predictor `l` occupies rows
/// `l·J .. (l+1)·J`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdditivePathResult {
    pub beta: CoefficientPath,
    pub convergence: Vec<ConvergenceState>,
}

impl AdditivePathResult {
    /// `false` when any lambda stopped at the iteration cap.
    pub fn all_converged(&self) -> bool {
        self.convergence.iter().all(|c| c.converged)
    }

    pub fn non_converged(&self) -> Vec<usize> {
        self.convergence
            .iter()
            .filter(|c| !c.converged)
            .map(|c| c.lambda_index)
            .collect()
    }
}

/// Mutable iterate of the coordinate descent for one lambda.
#[derive(Debug, Clone)]
pub struct AdditiveState<'a> {
    y: ArrayView1<'a, f64>,
    bases: ArrayView3<'a, f64>,
    /// J x p, one column per predictor.
    beta: Array2<f64>,
    /// n x p, column `l` is `X_l·β_l`.
    contributions: Array2<f64>,
    /// Σ_l X_l·β_l
    fitted: Array1<f64>,
}

impl<'a> AdditiveState<'a> {
    /// `bases` is `n x J x p`; `initial_beta` is `J x p`.
    pub fn new(
        y: ArrayView1<'a, f64>,
        bases: ArrayView3<'a, f64>,
        initial_beta: ArrayView2<'_, f64>,
    ) -> Result<Self> {
        let (n, nbasis, npred) = bases.dim();
        ensure_len("response length", n, y.len())?;
        ensure_len("initial coefficient rows", nbasis, initial_beta.nrows())?;
        ensure_len("initial coefficient columns", npred, initial_beta.ncols())?;

        let mut contributions = Array2::<f64>::zeros((n, npred));
        for (l, mut col) in contributions.axis_iter_mut(Axis(1)).enumerate() {
            col.assign(&bases.index_axis(Axis(2), l).dot(&initial_beta.column(l)));
        }
        let fitted = contributions.sum_axis(Axis(1));
        Ok(Self {
            y,
            bases,
            beta: initial_beta.to_owned(),
            contributions,
            fitted,
        })
    }

    pub fn beta(&self) -> &Array2<f64> {
        &self.beta
    }

    pub fn fitted(&self) -> &Array1<f64> {
        &self.fitted
    }

    /// One cyclic pass over all blocks using the running fitted-value
    /// accumulator. Returns `‖B_new‖_F − ‖B_old‖_F`.
    pub fn sweep(&mut self, weights: ArrayView1<'_, f64>) -> f64 {
        let n = self.y.len() as f64;
        let norm_before = frobenius(&self.beta);
        let bases = self.bases;
        for l in 0..self.beta.ncols() {
            let block = bases.index_axis(Axis(2), l);
            let partial = &self.y - &self.fitted + &self.contributions.column(l);
            self.update_block(l, block, partial, n, weights);
        }
        frobenius(&self.beta) - norm_before
    }

    /// Same update as [`sweep`](Self::sweep) but every partial residual is
    /// rebuilt from the current coefficients of all other blocks.
    pub fn sweep_recompute(&mut self, weights: ArrayView1<'_, f64>) -> f64 {
        let n = self.y.len() as f64;
        let norm_before = frobenius(&self.beta);
        let bases = self.bases;
        for l in 0..self.beta.ncols() {
            let mut partial = self.y.to_owned();
            for other in 0..self.beta.ncols() {
                if other != l {
                    let x_other = bases.index_axis(Axis(2), other);
                    partial -= &x_other.dot(&self.beta.column(other));
                }
            }
            let block = bases.index_axis(Axis(2), l);
            self.update_block(l, block, partial, n, weights);
        }
        frobenius(&self.beta) - norm_before
    }

    fn update_block(
        &mut self,
        l: usize,
        block: ArrayView2<'_, f64>,
        partial: Array1<f64>,
        n: f64,
        weights: ArrayView1<'_, f64>,
    ) {
        let mut v = fast_atv(&block, &partial) / n;
        prox_hierarchical_in_place(v.view_mut(), weights);
        let contribution = block.dot(&v);

        self.fitted -= &self.contributions.column(l);
        self.fitted += &contribution;
        self.contributions.column_mut(l).assign(&contribution);
        self.beta.column_mut(l).assign(&v);
    }

    /// Penalized objective at the current iterate.
    pub fn objective(&self, weights: ArrayView1<'_, f64>) -> f64 {
        let n = self.y.len() as f64;
        let resid = &self.y - &self.fitted;
        let loss = resid.dot(&resid) / (2.0 * n);
        let penalty: f64 = self
            .beta
            .axis_iter(Axis(1))
            .map(|block| {
                let mut tail_sq = 0.0;
                let mut total = 0.0;
                for j in (0..block.len()).rev() {
                    tail_sq += block[j] * block[j];
                    total += weights[j] * tail_sq.sqrt();
                }
                total
            })
            .sum();
        loss + penalty
    }

    fn into_beta(self) -> Array2<f64> {
        self.beta
    }
}

fn frobenius(matrix: &Array2<f64>) -> f64 {
    matrix.iter().map(|v| v * v).sum::<f64>().sqrt()
}

/// Sweep until the coefficient norm settles or `max_iter` is hit.
///
/// Running out of iterations is not an error: the last iterate stands and
/// the returned state records `converged = false`.
pub fn solve_lambda(
    state: &mut AdditiveState<'_>,
    weights: ArrayView1<'_, f64>,
    lambda_index: usize,
    config: &AdditiveConfig,
) -> ConvergenceState {
    let mut iterations = 0usize;
    let mut converged = false;
    let mut last_change = f64::INFINITY;

    while iterations < config.max_iter {
        last_change = state.sweep(weights);
        iterations += 1;
        if last_change.abs() < config.tol {
            converged = true;
            break;
        }
    }

    if converged {
        log::debug!(
            "lambda {}: converged after {} sweeps (change {:.3e})",
            lambda_index,
            iterations,
            last_change
        );
    } else {
        log::warn!(
            "additive coordinate descent did not converge for lambda {} within {} sweeps \
            (last change {:.3e}); keeping the last iterate",
            lambda_index,
            config.max_iter,
            last_change
        );
    }

    ConvergenceState {
        lambda_index,
        iterations,
        converged,
        last_change,
    }
}

/// Fit every column of `weights` (J x nlam) by block coordinate descent.
///
/// `bases` is `n x J x p` with one orthogonal block per predictor and
/// `initial_beta` is `J x p`. Sequentially, each lambda starts from the
/// previous lambda's solution; with `config.parallel` every lambda starts
/// from `initial_beta` and lambdas are solved concurrently.
pub fn fit_additive<'a>(
    y: ArrayView1<'a, f64>,
    weights: ArrayView2<'_, f64>,
    bases: ArrayView3<'a, f64>,
    initial_beta: ArrayView2<'_, f64>,
    config: &AdditiveConfig,
) -> Result<AdditivePathResult> {
    let (n, nbasis, npred) = bases.dim();
    let nlam = weights.ncols();
    if n == 0 || nbasis == 0 || npred == 0 {
        return Err(HierBasisError::EmptyInput(format!(
            "basis cube has shape ({n}, {nbasis}, {npred})"
        )));
    }
    ensure_len("weight matrix rows", nbasis, weights.nrows())?;
    if nlam == 0 {
        return Err(HierBasisError::EmptyInput("no lambda values".to_string()));
    }
    if config.max_iter == 0 {
        return Err(HierBasisError::InvalidInput(
            "max_iter must be at least 1".to_string(),
        ));
    }
    if !(config.tol >= 0.0) || !config.tol.is_finite() {
        return Err(HierBasisError::InvalidInput(format!(
            "tolerance must be non-negative and finite, got {}",
            config.tol
        )));
    }
    if weights.iter().any(|&w| !(w >= 0.0) || !w.is_finite()) {
        return Err(HierBasisError::InvalidInput(
            "penalty weights must be non-negative and finite".to_string(),
        ));
    }
    ensure_finite(y.iter(), "response")?;
    ensure_finite(bases.iter(), "basis cube")?;
    ensure_finite(initial_beta.iter(), "initial coefficients")?;

    let solutions: Vec<(Array2<f64>, ConvergenceState)> = if config.parallel {
        let template = AdditiveState::new(y, bases, initial_beta)?;
        (0..nlam)
            .into_par_iter()
            .map(|l| {
                let mut state = template.clone();
                let conv = solve_lambda(&mut state, weights.column(l), l, config);
                (state.into_beta(), conv)
            })
            .collect()
    } else {
        let mut state = AdditiveState::new(y, bases, initial_beta)?;
        let mut out = Vec::with_capacity(nlam);
        for l in 0..nlam {
            let conv = solve_lambda(&mut state, weights.column(l), l, config);
            out.push((state.beta().clone(), conv));
        }
        out
    };

    let mut beta = Array2::<f64>::zeros((nbasis * npred, nlam));
    let mut convergence = Vec::with_capacity(nlam);
    for (l, (block_beta, conv)) in solutions.into_iter().enumerate() {
        beta.column_mut(l).assign(&stack_blocks(&block_beta));
        convergence.push(conv);
    }

    let failures = convergence.iter().filter(|c| !c.converged).count();
    if failures > 0 {
        log::warn!(
            "additive fit: {} of {} lambda values hit max_iter = {}",
            failures,
            nlam,
            config.max_iter
        );
    }

    Ok(AdditivePathResult {
        beta: CoefficientPath::new(beta),
        convergence,
    })
}

/// Column-major flattening of a `J x p` block matrix.
fn stack_blocks(block_beta: &Array2<f64>) -> Array1<f64> {
    block_beta.t().iter().copied().collect()
}

/// Sparse additive model with one polynomial block per predictor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdditiveHierBasis {
    pub intercept: f64,
    pub nbasis: usize,
    /// Effective base weights after the sparsity mix.
    pub ak: Array1<f64>,
    pub lambdas: LambdaPath,
    pub bases: Vec<OrthogonalBasis>,
    /// Coefficients on the centered polynomial columns, `J·p x nlam`.
    pub beta: CoefficientPath,
    /// Coefficients on the orthogonal blocks, `J·p x nlam`.
    pub beta_orthogonal: CoefficientPath,
    pub convergence: Vec<ConvergenceState>,
}

impl AdditiveHierBasis {
    /// `x` is `n x p`, one column per predictor.
    pub fn fit(
        x: ArrayView2<'_, f64>,
        y: ArrayView1<'_, f64>,
        config: &AdditiveHierBasisConfig,
    ) -> Result<Self> {
        let (n, npred) = x.dim();
        ensure_len("response length", n, y.len())?;
        if n == 0 || npred == 0 {
            return Err(HierBasisError::EmptyInput(format!(
                "predictor matrix has shape ({n}, {npred})"
            )));
        }
        if !(0.0..1.0).contains(&config.sparsity_mix) {
            return Err(HierBasisError::InvalidInput(format!(
                "sparsity_mix must lie in [0, 1), got {}",
                config.sparsity_mix
            )));
        }
        ensure_finite(y.iter(), "response")?;

        let nbasis = config.nbasis;
        let mut ak = weight_schedule(nbasis, config.m)? * (1.0 - config.sparsity_mix);
        ak[0] += config.sparsity_mix;

        let bases = x
            .axis_iter(Axis(1))
            .map(|col| orthogonalize(&polynomial_basis(&col, nbasis)?))
            .collect::<Result<Vec<_>>>()?;

        let intercept = y.mean().unwrap_or(0.0);
        let centered_y = y.mapv(|v| v - intercept);

        let max_lambda = match config.path.max_lambda {
            Some(value) => value,
            None => bases.iter().try_fold(0.0f64, |acc, basis| {
                let v = basis.project(&centered_y)?;
                Ok::<f64, HierBasisError>(acc.max(critical_lambda(v.view(), ak.view())?))
            })?,
        };
        let lambdas =
            lambda_path_from_top(max_lambda, config.path.nlam, config.path.lam_min_ratio)?;
        let weights = weight_matrix(ak.view(), lambdas.view());

        let mut cube = Array3::<f64>::zeros((n, nbasis, npred));
        for (l, basis) in bases.iter().enumerate() {
            cube.index_axis_mut(Axis(2), l).assign(&basis.q);
        }

        let result = fit_additive(
            centered_y.view(),
            weights.view(),
            cube.view(),
            Array2::<f64>::zeros((nbasis, npred)).view(),
            &config.solver,
        )?;

        let mut beta = Array2::<f64>::zeros(result.beta.as_dense().raw_dim());
        for (l, basis) in bases.iter().enumerate() {
            let block = result.beta.as_dense().slice(s![l * nbasis..(l + 1) * nbasis, ..]);
            let original = basis.back_transform_path(&block)?;
            beta.slice_mut(s![l * nbasis..(l + 1) * nbasis, ..]).assign(&original);
        }

        Ok(Self {
            intercept,
            nbasis,
            ak,
            lambdas,
            bases,
            beta: CoefficientPath::new(beta),
            beta_orthogonal: result.beta,
            convergence: result.convergence,
        })
    }

    pub fn npredictors(&self) -> usize {
        self.bases.len()
    }

    pub fn all_converged(&self) -> bool {
        self.convergence.iter().all(|c| c.converged)
    }

    pub fn active_set_sizes(&self) -> Array1<usize> {
        self.beta_orthogonal.active_set_sizes()
    }

    /// Predictors with at least one nonzero coefficient at one lambda.
    pub fn active_predictors(&self, lam_index: usize) -> Vec<usize> {
        let column = self.beta_orthogonal.column(lam_index);
        (0..self.npredictors())
            .filter(|&l| {
                column
                    .slice(s![l * self.nbasis..(l + 1) * self.nbasis])
                    .iter()
                    .any(|&v| v != 0.0)
            })
            .collect()
    }

    /// Training fitted values at one lambda.
    pub fn fitted_values(&self, lam_index: usize) -> Array1<f64> {
        let column = self.beta_orthogonal.column(lam_index);
        let mut fitted = Array1::from_elem(self.bases[0].nobs(), self.intercept);
        for (l, basis) in self.bases.iter().enumerate() {
            fitted += &basis
                .q
                .dot(&column.slice(s![l * self.nbasis..(l + 1) * self.nbasis]));
        }
        fitted
    }

    /// Predictions for new rows (`m x p`), one column per lambda.
    pub fn predict(&self, new_x: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        ensure_len("predictor columns", self.npredictors(), new_x.ncols())?;
        let mut out = Array2::<f64>::from_elem((new_x.nrows(), self.lambdas.len()), self.intercept);
        for (l, basis) in self.bases.iter().enumerate() {
            let design = basis.center_like(&polynomial_basis(&new_x.column(l), self.nbasis)?)?;
            let block = self
                .beta
                .as_dense()
                .slice(s![l * self.nbasis..(l + 1) * self.nbasis, ..]);
            out += &fast_ab(&design, &block);
        }
        Ok(out)
    }
}
