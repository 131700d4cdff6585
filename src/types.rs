use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};
use std::ops::Deref;

pub fn default_nlam() -> usize {
    50
}

pub fn default_lam_min_ratio() -> f64 {
    1e-4
}

pub fn default_nbasis() -> usize {
    10
}

pub fn default_smoothness_order() -> f64 {
    3.0
}

pub fn default_tolerance() -> f64 {
    1e-4
}

pub fn default_max_iter() -> usize {
    100
}

/// Controls the regularization path shared by every solver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathConfig {
    #[serde(default = "default_nlam")]
    pub nlam: usize,
    #[serde(default = "default_lam_min_ratio")]
    pub lam_min_ratio: f64,
    /// Top of the path. When absent the smallest value that zeroes every
    /// coefficient is selected.
    #[serde(default)]
    pub max_lambda: Option<f64>,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            nlam: default_nlam(),
            lam_min_ratio: default_lam_min_ratio(),
            max_lambda: None,
        }
    }
}

/// Block coordinate-descent settings for additive fits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdditiveConfig {
    /// Sweeps stop once the Frobenius norm of the stacked coefficients moves
    /// by less than this amount.
    #[serde(default = "default_tolerance")]
    pub tol: f64,
    #[serde(default = "default_max_iter")]
    pub max_iter: usize,
    /// Solve lambda values concurrently. Every lambda then starts from the
    /// initial coefficients instead of the previous lambda's solution.
    #[serde(default)]
    pub parallel: bool,
}

impl Default for AdditiveConfig {
    fn default() -> Self {
        Self {
            tol: default_tolerance(),
            max_iter: default_max_iter(),
            parallel: false,
        }
    }
}

/// Univariate fit on a polynomial basis of one predictor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HierBasisConfig {
    #[serde(default = "default_nbasis")]
    pub nbasis: usize,
    /// Smoothness order `m` of the weight schedule `j^m - (j-1)^m`.
    #[serde(default = "default_smoothness_order")]
    pub m: f64,
    #[serde(default)]
    pub path: PathConfig,
}

impl Default for HierBasisConfig {
    fn default() -> Self {
        Self {
            nbasis: default_nbasis(),
            m: default_smoothness_order(),
            path: PathConfig::default(),
        }
    }
}

/// Sparse additive fit with one polynomial block per predictor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdditiveHierBasisConfig {
    #[serde(default = "default_nbasis")]
    pub nbasis: usize,
    #[serde(default = "default_smoothness_order")]
    pub m: f64,
    #[serde(default)]
    pub path: PathConfig,
    #[serde(default)]
    pub solver: AdditiveConfig,
    /// Share of each lambda moved from the hierarchical weights onto the
    /// whole-block norm. Zero keeps the pure hierarchical penalty; larger
    /// values remove entire predictors more aggressively.
    #[serde(default)]
    pub sparsity_mix: f64,
}

impl Default for AdditiveHierBasisConfig {
    fn default() -> Self {
        Self {
            nbasis: default_nbasis(),
            m: default_smoothness_order(),
            path: PathConfig::default(),
            solver: AdditiveConfig::default(),
            sparsity_mix: 0.0,
        }
    }
}

/// Strictly decreasing sequence of regularization strengths.
#[repr(transparent)]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LambdaPath(pub Array1<f64>);

impl LambdaPath {
    pub fn new(values: Array1<f64>) -> Self {
        Self(values)
    }

    pub fn view(&self) -> ArrayView1<'_, f64> {
        self.0.view()
    }

    pub fn max_lambda(&self) -> f64 {
        self.0[0]
    }
}

impl Deref for LambdaPath {
    type Target = Array1<f64>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<Array1<f64>> for LambdaPath {
    fn as_ref(&self) -> &Array1<f64> {
        &self.0
    }
}

impl From<LambdaPath> for Array1<f64> {
    fn from(values: LambdaPath) -> Self {
        values.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configs_fill_missing_fields_with_defaults() {
        let cfg: AdditiveHierBasisConfig =
            serde_json::from_str(r#"{"nbasis": 6, "solver": {"max_iter": 7}}"#).unwrap();
        assert_eq!(cfg.nbasis, 6);
        assert_eq!(cfg.m, 3.0);
        assert_eq!(cfg.path, PathConfig::default());
        assert_eq!(cfg.solver.max_iter, 7);
        assert_eq!(cfg.solver.tol, 1e-4);
        assert!(!cfg.solver.parallel);
        assert_eq!(cfg.sparsity_mix, 0.0);
    }

    #[test]
    fn path_config_round_trips_through_json() {
        let cfg = PathConfig {
            nlam: 12,
            lam_min_ratio: 0.05,
            max_lambda: Some(2.5),
        };
        let text = serde_json::to_string(&cfg).unwrap();
        let back: PathConfig = serde_json::from_str(&text).unwrap();
        assert_eq!(cfg, back);
    }
}
