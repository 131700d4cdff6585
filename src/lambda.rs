use crate::error::{HierBasisError, Result, ensure_finite, ensure_len};
use crate::types::LambdaPath;
use ndarray::{Array1, ArrayView1};

/// Smallest lambda at which the hierarchical prox of `v` under `lambda·ak`
/// returns the zero vector: `max_j |v_j| / ak_j`.
pub fn critical_lambda(v: ArrayView1<'_, f64>, ak: ArrayView1<'_, f64>) -> Result<f64> {
    ensure_len("weight template length", v.len(), ak.len())?;
    if ak.iter().any(|&a| !(a > 0.0) || !a.is_finite()) {
        return Err(HierBasisError::InvalidInput(
            "weight template entries must be positive and finite".to_string(),
        ));
    }
    ensure_finite(v.iter(), "response projection")?;
    Ok(v.iter()
        .zip(ak.iter())
        .map(|(&vj, &aj)| vj.abs() / aj)
        .fold(0.0, f64::max))
}

/// Log10-equally spaced lambdas from `max_lambda` down to
/// `max_lambda · lam_min_ratio`.
///
/// When `max_lambda` is `None` the critical lambda of `v` is used, so the
/// first solution on the path is exactly zero.
pub fn build_lambda_path(
    v: ArrayView1<'_, f64>,
    ak: ArrayView1<'_, f64>,
    nlam: usize,
    lam_min_ratio: f64,
    max_lambda: Option<f64>,
) -> Result<LambdaPath> {
    ensure_len("weight template length", v.len(), ak.len())?;
    let top = match max_lambda {
        Some(value) => value,
        None => critical_lambda(v, ak)?,
    };
    lambda_path_from_top(top, nlam, lam_min_ratio)
}

/// Path below an already chosen top value.
pub(crate) fn lambda_path_from_top(
    top: f64,
    nlam: usize,
    lam_min_ratio: f64,
) -> Result<LambdaPath> {
    if nlam == 0 {
        return Err(HierBasisError::InvalidInput(
            "nlam must be at least 1".to_string(),
        ));
    }
    if !(lam_min_ratio > 0.0 && lam_min_ratio < 1.0) {
        return Err(HierBasisError::InvalidInput(format!(
            "lam_min_ratio must lie in (0, 1), got {lam_min_ratio}"
        )));
    }
    if !(top > 0.0) || !top.is_finite() {
        return Err(HierBasisError::InvalidInput(format!(
            "max_lambda must be positive and finite, got {top}; \
            the response may be orthogonal to every basis column"
        )));
    }
    Ok(LambdaPath::new(log_spaced(top, top * lam_min_ratio, nlam)))
}

fn log_spaced(start: f64, end: f64, count: usize) -> Array1<f64> {
    let mut values =
        Array1::linspace(start.log10(), end.log10(), count).mapv(|e| 10f64.powf(e));
    // Keep the top exact so the critical lambda is hit without rounding.
    values[0] = start;
    values
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn explicit_top_gives_decades() {
        let v = array![0.0];
        let ak = array![1.0];
        let path = build_lambda_path(v.view(), ak.view(), 3, 0.01, Some(10.0)).unwrap();
        assert_eq!(path.len(), 3);
        assert_abs_diff_eq!(path[0], 10.0, epsilon = 1e-12);
        assert_abs_diff_eq!(path[1], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(path[2], 0.1, epsilon = 1e-12);
    }

    #[test]
    fn automatic_top_is_critical_lambda() {
        let v = array![0.5, -3.0, 1.0];
        let ak = array![1.0, 7.0, 19.0];
        let path = build_lambda_path(v.view(), ak.view(), 20, 1e-3, None).unwrap();
        assert_abs_diff_eq!(path.max_lambda(), 0.5, epsilon = 1e-15);
        for w in path.windows(2) {
            assert!(w[1] < w[0]);
        }
        assert_abs_diff_eq!(path[19], 0.5e-3, epsilon = 1e-15);
    }

    #[test]
    fn single_value_path_is_the_top() {
        let v = array![2.0, 1.0];
        let ak = array![1.0, 3.0];
        let path = build_lambda_path(v.view(), ak.view(), 1, 0.1, None).unwrap();
        assert_eq!(path.to_vec(), vec![2.0]);
    }

    #[test]
    fn ratio_outside_unit_interval_is_rejected() {
        let v = array![1.0];
        let ak = array![1.0];
        for ratio in [0.0, 1.0, 1.5, -0.2, f64::NAN] {
            assert!(matches!(
                build_lambda_path(v.view(), ak.view(), 5, ratio, None),
                Err(HierBasisError::InvalidInput(_))
            ));
        }
    }

    #[test]
    fn zero_projection_cannot_seed_a_path() {
        let v = array![0.0, 0.0];
        let ak = array![1.0, 3.0];
        assert!(build_lambda_path(v.view(), ak.view(), 5, 0.1, None).is_err());
    }

    #[test]
    fn mismatched_template_is_rejected() {
        let v = array![1.0, 2.0];
        let ak = array![1.0];
        for top in [None, Some(4.0)] {
            assert!(matches!(
                build_lambda_path(v.view(), ak.view(), 5, 0.1, top),
                Err(HierBasisError::DimensionMismatch { .. })
            ));
        }
    }

    #[test]
    fn path_from_top_validates_and_keeps_top_exact() {
        let top = 0.123_456_789;
        let path = lambda_path_from_top(top, 7, 0.05).unwrap();
        assert_eq!(path[0], top);
        assert_abs_diff_eq!(path[6], top * 0.05, epsilon = 1e-15);
        assert!(lambda_path_from_top(0.0, 7, 0.05).is_err());
        assert!(lambda_path_from_top(top, 0, 0.05).is_err());
    }
}
