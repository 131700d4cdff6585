use hierbasis::{HierBasis, HierBasisConfig, PathConfig};
use ndarray::Array1;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal, Uniform};

fn simulate_univariate(n: usize, seed: u64) -> (Array1<f64>, Array1<f64>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let unif = Uniform::<f64>::new(0.0, 1.0).expect("uniform params must be valid");
    let noise = Normal::<f64>::new(0.0, 0.15).expect("normal params must be valid");
    let x: Array1<f64> = Array1::from_shape_fn(n, |_| unif.sample(&mut rng));
    let signal = x.mapv(|v: f64| (3.0 * v).sin() + 0.5 * v * v);
    let y = signal + Array1::from_shape_fn(n, |_| noise.sample(&mut rng));
    (x, y)
}

fn fit_default(n: usize, seed: u64) -> (HierBasis, Array1<f64>, Array1<f64>) {
    let (x, y) = simulate_univariate(n, seed);
    let config = HierBasisConfig {
        nbasis: 8,
        m: 3.0,
        path: PathConfig {
            nlam: 30,
            lam_min_ratio: 1e-4,
            max_lambda: None,
        },
    };
    let fit = HierBasis::fit(x.view(), y.view(), &config).expect("fit should succeed");
    (fit, x, y)
}

#[test]
fn path_support_grows_as_a_leading_block() {
    let (fit, _, _) = fit_default(150, 20261019);
    let sizes = fit.active_set_sizes();
    assert_eq!(sizes.len(), 30);
    assert_eq!(sizes[0], 0);
    assert!(sizes[29] > 0);
    for w in sizes.windows(2) {
        assert!(w[0] <= w[1], "active set shrank along the path: {sizes:?}");
    }

    let path = &fit.path.beta_orthogonal;
    for l in 0..path.nlam() {
        let active = path.active_set(l);
        assert_eq!(active, (0..active.len()).collect::<Vec<_>>(), "lambda {l}");
    }
}

#[test]
fn lambdas_are_log_spaced_from_the_critical_value() {
    let (fit, _, _) = fit_default(120, 11);
    let lambdas = fit.lambdas();
    let ratio = lambdas[29] / lambdas[0];
    assert!((ratio - 1e-4).abs() < 1e-12);
    let step = lambdas[1] / lambdas[0];
    for w in lambdas.windows(2) {
        assert!((w[1] / w[0] - step).abs() < 1e-10);
    }
}

#[test]
fn residual_sum_of_squares_falls_along_the_path() {
    let (fit, _, y) = fit_default(150, 3);
    let mut previous = f64::INFINITY;
    for l in 0..fit.nlam() {
        let resid = &y - &fit.fitted_values(l);
        let rss = resid.dot(&resid);
        assert!(rss <= previous + 1e-9, "lambda {l}: {rss} > {previous}");
        previous = rss;
    }
}

#[test]
fn degrees_of_freedom_stay_between_zero_and_active_count() {
    let (fit, _, _) = fit_default(150, 7);
    let dof = fit.degrees_of_freedom().expect("dof should be computable");
    let sizes = fit.active_set_sizes();
    assert_eq!(dof[0], 0.0);
    for (l, (&d, &k)) in dof.iter().zip(sizes.iter()).enumerate() {
        assert!(d >= -1e-10, "lambda {l}: negative dof {d}");
        assert!(d <= k as f64 + 1e-8, "lambda {l}: dof {d} above active count {k}");
    }
    assert!(dof[29] > 1.0);
}

#[test]
fn predictions_reproduce_training_fit() {
    let (fit, x, _) = fit_default(100, 5);
    let pred = fit.predict(x.view()).expect("predict should succeed");
    for l in [0, 10, 29] {
        let fitted = fit.fitted_values(l);
        for (p, f) in pred.column(l).iter().zip(fitted.iter()) {
            assert!((p - f).abs() < 1e-6, "lambda {l}: {p} vs {f}");
        }
    }
}
