use approx::assert_abs_diff_eq;
use elnet::{fit_binomial, fit_gaussian, DataView, GaussianMode, InternalParams, PathOptions, Penalty};
use faer::sparse::{SparseColMat, Triplet};
use ndarray::{Array1, Array2};
use rand::prelude::*;

/// Random design with ~90% structural zeros, returned both ways.
fn sparse_and_dense(seed: u64, n: usize, p: usize) -> (DataView, DataView, Array2<f64>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut dense = Array2::<f64>::zeros((n, p));
    for i in 0..n {
        for j in 0..p {
            if rng.random::<f64>() < 0.1 {
                dense[[i, j]] = rng.random_range(-2.0..2.0);
            }
        }
    }
    // Guarantee every column carries signal so no variance check trips.
    for j in 0..p {
        let i = (j * 7) % n;
        if dense[[i, j]] == 0.0 {
            dense[[i, j]] = rng.random_range(0.5..1.5);
        }
    }
    let mut triplets = Vec::new();
    for i in 0..n {
        for j in 0..p {
            if dense[[i, j]] != 0.0 {
                triplets.push(Triplet::new(i, j, dense[[i, j]]));
            }
        }
    }
    let sparse = SparseColMat::try_new_from_triplets(n, p, &triplets).unwrap();
    (
        DataView::from(dense.clone()),
        DataView::from(sparse),
        dense,
    )
}

#[test]
fn gaussian_paths_match_across_encodings() {
    let (dense, sparse, raw) = sparse_and_dense(101, 80, 12);
    let mut rng = StdRng::seed_from_u64(102);
    let y: Array1<f64> = (0..80)
        .map(|i| 0.9 * raw[[i, 0]] - 1.3 * raw[[i, 5]] + 0.1 * rng.random_range(-1.0..1.0))
        .collect();

    let opts = PathOptions {
        nlambda: 40,
        thresh: 1e-11,
        // Same bookkeeping on both encodings isolates the storage layer.
        mode: GaussianMode::Naive,
        ..PathOptions::default()
    };
    let params = InternalParams::default();
    let fit_d = fit_gaussian(
        &dense,
        y.view(),
        None,
        None,
        &Penalty::lasso(),
        &opts,
        &params,
        None,
    )
    .unwrap();
    let fit_s = fit_gaussian(
        &sparse,
        y.view(),
        None,
        None,
        &Penalty::lasso(),
        &opts,
        &params,
        None,
    )
    .unwrap();

    assert_eq!(fit_d.n_steps(), fit_s.n_steps());
    for m in 0..fit_d.n_steps() {
        assert_abs_diff_eq!(fit_d.lambda[m], fit_s.lambda[m], epsilon = 1e-10);
        assert_abs_diff_eq!(fit_d.dev_ratio[m], fit_s.dev_ratio[m], epsilon = 1e-6);
        let bd = fit_d.coefficients(m, 12);
        let bs = fit_s.coefficients(m, 12);
        for j in 0..12 {
            assert_abs_diff_eq!(bd[j], bs[j], epsilon = 1e-6);
        }
    }
}

#[test]
fn gaussian_covariance_mode_handles_sparse_input() {
    let (dense, sparse, raw) = sparse_and_dense(103, 60, 6);
    let mut rng = StdRng::seed_from_u64(104);
    let y: Array1<f64> = (0..60)
        .map(|i| raw[[i, 1]] + 0.5 * raw[[i, 4]] + 0.1 * rng.random_range(-1.0..1.0))
        .collect();
    let opts_cov = PathOptions {
        nlambda: 25,
        thresh: 1e-11,
        mode: GaussianMode::Covariance,
        ..PathOptions::default()
    };
    let params = InternalParams::default();
    let fit_cov = fit_gaussian(
        &sparse,
        y.view(),
        None,
        None,
        &Penalty::lasso(),
        &opts_cov,
        &params,
        None,
    )
    .unwrap();
    let opts_naive = PathOptions {
        mode: GaussianMode::Naive,
        ..opts_cov
    };
    let fit_naive = fit_gaussian(
        &dense,
        y.view(),
        None,
        None,
        &Penalty::lasso(),
        &opts_naive,
        &params,
        None,
    )
    .unwrap();

    assert_eq!(fit_cov.n_steps(), fit_naive.n_steps());
    for m in 0..fit_cov.n_steps() {
        let bc = fit_cov.coefficients(m, 6);
        let bn = fit_naive.coefficients(m, 6);
        for j in 0..6 {
            assert_abs_diff_eq!(bc[j], bn[j], epsilon = 1e-4);
        }
    }
}

#[test]
fn binomial_paths_match_across_encodings() {
    let (dense, sparse, raw) = sparse_and_dense(105, 120, 8);
    let mut rng = StdRng::seed_from_u64(106);
    let y: Array1<f64> = (0..120)
        .map(|i| {
            let eta = 0.4 + 1.5 * raw[[i, 2]] - raw[[i, 6]];
            let prob = 1.0 / (1.0 + (-eta).exp());
            if rng.random::<f64>() < prob { 1.0 } else { 0.0 }
        })
        .collect();

    let opts = PathOptions {
        nlambda: 30,
        thresh: 1e-10,
        ..PathOptions::default()
    };
    let params = InternalParams::default();
    let fit_d = fit_binomial(
        &dense,
        y.view(),
        None,
        None,
        &Penalty::lasso(),
        &opts,
        &params,
        None,
    )
    .unwrap();
    let fit_s = fit_binomial(
        &sparse,
        y.view(),
        None,
        None,
        &Penalty::lasso(),
        &opts,
        &params,
        None,
    )
    .unwrap();

    assert_eq!(fit_d.n_steps(), fit_s.n_steps());
    for m in 0..fit_d.n_steps() {
        assert_abs_diff_eq!(fit_d.lambda[m], fit_s.lambda[m], epsilon = 1e-10);
        assert_abs_diff_eq!(fit_d.a0[m], fit_s.a0[m], epsilon = 1e-6);
        assert_abs_diff_eq!(fit_d.dev_ratio[m], fit_s.dev_ratio[m], epsilon = 1e-6);
        let bd = fit_d.coefficients(m, 8);
        let bs = fit_s.coefficients(m, 8);
        for j in 0..8 {
            assert_abs_diff_eq!(bd[j], bs[j], epsilon = 1e-6);
        }
    }
}
