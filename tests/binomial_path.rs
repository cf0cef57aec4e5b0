use approx::assert_abs_diff_eq;
use elnet::{fit_binomial, DataView, InternalParams, PathOptions, Penalty};
use ndarray::{Array1, Array2};
use rand::prelude::*;

fn logistic_problem(seed: u64, n: usize, p: usize) -> (Array2<f64>, Array1<f64>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut x = Array2::<f64>::zeros((n, p));
    for i in 0..n {
        for j in 0..p {
            x[[i, j]] = rng.random_range(-1.0..1.0);
        }
    }
    let y: Array1<f64> = (0..n)
        .map(|i| {
            let eta = -0.3 + 1.8 * x[[i, 0]] - 1.2 * x[[i, 1]];
            let prob = 1.0 / (1.0 + (-eta).exp());
            if rng.random::<f64>() < prob { 1.0 } else { 0.0 }
        })
        .collect();
    (x, y)
}

#[test]
fn binomial_path_monotone_deviance_and_kkt() {
    let (x, y) = logistic_problem(11, 100, 5);
    let opts = PathOptions {
        nlambda: 40,
        standardize: false,
        thresh: 1e-10,
        ..PathOptions::default()
    };
    let params = InternalParams::default();
    let fit = fit_binomial(
        &DataView::from(x.clone()),
        y.view(),
        None,
        None,
        &Penalty::lasso(),
        &opts,
        &params,
        None,
    )
    .unwrap();

    assert!(fit.n_steps() >= params.mnlam);
    assert_eq!(fit.nin[0], 0, "beta must be zero at lambda_max");
    assert!(fit.null_dev > 0.0);

    let n = x.nrows();
    let p = x.ncols();
    let w = 1.0 / n as f64;
    let xm: Vec<f64> = (0..p).map(|j| x.column(j).sum() / n as f64).collect();

    for m in 0..fit.n_steps() {
        if m > 0 {
            assert!(fit.lambda[m] < fit.lambda[m - 1]);
            assert!(
                fit.dev_ratio[m] >= fit.dev_ratio[m - 1] - 1e-7,
                "deviance fraction decreased at step {m}"
            );
        }

        // Probabilities stay inside the clip.
        let beta = fit.coefficients(m, p);
        let mut probs = vec![0.0; n];
        for i in 0..n {
            let mut eta = fit.a0[m];
            for j in 0..p {
                eta += beta[j] * (x[[i, j]] - xm[j]);
            }
            probs[i] = 1.0 / (1.0 + (-eta).exp());
            assert!(probs[i] >= params.pmin && probs[i] <= 1.0 - params.pmin);
        }

        // KKT at the working residual for inactive coordinates.
        let lambda = fit.lambda[m];
        for j in 0..p {
            if beta[j] != 0.0 {
                continue;
            }
            let mut g = 0.0;
            for i in 0..n {
                g += (x[[i, j]] - xm[j]) * w * (y[i] - probs[i]);
            }
            assert!(
                g.abs() <= lambda + 1e-5,
                "KKT violated at step {m}, coordinate {j}: |g| = {:.3e} > {lambda:.3e}",
                g.abs()
            );
        }
    }

    // The signal variables dominate by the end of the path.
    let last = fit.n_steps() - 1;
    let beta = fit.coefficients(last, p);
    assert!(beta[0] > 0.0);
    assert!(beta[1] < 0.0);
    assert!(fit.dev_ratio[last] > 0.2);
}

#[test]
fn intercept_free_fit_keeps_a0_at_zero() {
    let (x, y) = logistic_problem(13, 80, 4);
    let opts = PathOptions {
        nlambda: 15,
        intercept: false,
        ..PathOptions::default()
    };
    let fit = fit_binomial(
        &DataView::from(x),
        y.view(),
        None,
        None,
        &Penalty::lasso(),
        &opts,
        &InternalParams::default(),
        None,
    )
    .unwrap();
    for m in 0..fit.n_steps() {
        assert_eq!(fit.a0[m], 0.0);
    }
}

#[test]
fn offset_shifts_the_null_intercept() {
    let (x, y) = logistic_problem(17, 90, 4);
    let offset = Array1::from_elem(90, 0.75);
    let opts = PathOptions {
        nlambda: 12,
        ..PathOptions::default()
    };
    let params = InternalParams::default();
    let plain = fit_binomial(
        &DataView::from(x.clone()),
        y.view(),
        None,
        None,
        &Penalty::lasso(),
        &opts,
        &params,
        None,
    )
    .unwrap();
    let shifted = fit_binomial(
        &DataView::from(x),
        y.view(),
        None,
        Some(offset.view()),
        &Penalty::lasso(),
        &opts,
        &params,
        None,
    )
    .unwrap();
    // A constant offset is absorbed by the intercept; the null fits agree on
    // the total linear predictor.
    assert_abs_diff_eq!(shifted.a0[0] + 0.75, plain.a0[0], epsilon = 1e-6);
    assert_abs_diff_eq!(shifted.null_dev, plain.null_dev, epsilon = 1e-8);
}

#[test]
fn modified_newton_reaches_the_same_optimum() {
    let (x, y) = logistic_problem(23, 100, 4);
    let opts_exact = PathOptions {
        nlambda: 20,
        lambda_min_ratio: Some(0.05),
        thresh: 1e-11,
        ..PathOptions::default()
    };
    let opts_bounded = PathOptions {
        modified_newton: true,
        ..opts_exact.clone()
    };
    let params = InternalParams::default();
    let exact = fit_binomial(
        &DataView::from(x.clone()),
        y.view(),
        None,
        None,
        &Penalty::lasso(),
        &opts_exact,
        &params,
        None,
    )
    .unwrap();
    let bounded = fit_binomial(
        &DataView::from(x),
        y.view(),
        None,
        None,
        &Penalty::lasso(),
        &opts_bounded,
        &params,
        None,
    )
    .unwrap();

    // Same objective, different curvature surrogate: the converged points
    // agree to optimization tolerance.
    let steps = exact.n_steps().min(bounded.n_steps());
    assert!(steps >= 5);
    let m = steps - 1;
    assert_abs_diff_eq!(exact.dev_ratio[m], bounded.dev_ratio[m], epsilon = 1e-3);
    let be = exact.coefficients(m, 4);
    let bb = bounded.coefficients(m, 4);
    for j in 0..4 {
        assert_abs_diff_eq!(be[j], bb[j], epsilon = 1e-2);
    }
}

#[test]
fn per_coordinate_penalty_factors_order_entry() {
    let (x, y) = logistic_problem(19, 120, 3);
    // Make variable 0 ten times cheaper than the rest; it must enter first.
    let penalty = Penalty {
        factors: Some(ndarray::array![0.1, 1.0, 1.0]),
        ..Penalty::lasso()
    };
    let opts = PathOptions {
        nlambda: 40,
        ..PathOptions::default()
    };
    let fit = fit_binomial(
        &DataView::from(x),
        y.view(),
        None,
        None,
        &penalty,
        &opts,
        &InternalParams::default(),
        None,
    )
    .unwrap();
    assert!(!fit.ia.is_empty());
    assert_eq!(fit.ia[0], 0, "discounted variable should activate first");
}
