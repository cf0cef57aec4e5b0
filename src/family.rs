use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};

use crate::errors::PathWarning;

/// GLM family selector carried on path results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Family {
    Gaussian,
    Binomial,
    Poisson,
    Multinomial,
}

/// IRLS families sharing the single-response point solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum IrlsFamily {
    Binomial,
    Poisson,
}

const MIN_WEIGHT: f64 = 1e-12;

/// One IRLS refresh: fitted means, working weights, and the canonical-link
/// working residual `v .* (z - eta) = w .* (y - mu)` for the current linear
/// predictor. `bounded` replaces the exact binomial curvature with the 1/4
/// upper bound (modified Newton); the score is unchanged.
#[allow(clippy::too_many_arguments)]
pub(crate) fn irls_update(
    family: IrlsFamily,
    y: ArrayView1<f64>,
    eta: &Array1<f64>,
    w: &Array1<f64>,
    bounded: bool,
    pmin: f64,
    exmx: f64,
    big: f64,
    step: usize,
    mu: &mut Array1<f64>,
    v: &mut Array1<f64>,
    r: &mut Array1<f64>,
) -> Result<(), PathWarning> {
    let n = eta.len();
    match family {
        IrlsFamily::Binomial => {
            for i in 0..n {
                let e = eta[i].clamp(-exmx, exmx);
                let mu_i = (1.0 / (1.0 + (-e).exp())).clamp(pmin, 1.0 - pmin);
                mu[i] = mu_i;
                v[i] = if bounded {
                    0.25 * w[i]
                } else {
                    (w[i] * mu_i * (1.0 - mu_i)).max(w[i] * MIN_WEIGHT)
                };
                r[i] = w[i] * (y[i] - mu_i);
            }
        }
        IrlsFamily::Poisson => {
            for i in 0..n {
                let e = eta[i].clamp(-exmx, exmx);
                let mu_i = e.exp();
                if mu_i > big {
                    return Err(PathWarning::PoissonOverflow { step });
                }
                mu[i] = mu_i;
                v[i] = w[i] * mu_i;
                r[i] = w[i] * (y[i] - mu_i);
            }
        }
    }
    Ok(())
}

pub(crate) fn irls_deviance(
    family: IrlsFamily,
    y: ArrayView1<f64>,
    mu: &Array1<f64>,
    w: &Array1<f64>,
) -> f64 {
    match family {
        IrlsFamily::Binomial => binomial_deviance(y, mu, w),
        IrlsFamily::Poisson => poisson_deviance(y, mu, w),
    }
}

/// Binomial deviance `2 sum w [y ln(y/mu) + (1-y) ln((1-y)/(1-mu))]`,
/// with the usual zero-entropy conventions at y in {0, 1}.
pub(crate) fn binomial_deviance(y: ArrayView1<f64>, mu: &Array1<f64>, w: &Array1<f64>) -> f64 {
    const EPS: f64 = 1e-10;
    let mut acc = 0.0;
    for ((&yi, &mui), &wi) in y.iter().zip(mu).zip(w) {
        let m = mui.clamp(EPS, 1.0 - EPS);
        let t1 = if yi > EPS { yi * (yi.ln() - m.ln()) } else { 0.0 };
        let t2 = if yi < 1.0 - EPS {
            (1.0 - yi) * ((1.0 - yi).ln() - (1.0 - m).ln())
        } else {
            0.0
        };
        acc += wi * (t1 + t2);
    }
    2.0 * acc
}

/// Poisson deviance `2 sum w [y ln(y/mu) - (y - mu)]`.
pub(crate) fn poisson_deviance(y: ArrayView1<f64>, mu: &Array1<f64>, w: &Array1<f64>) -> f64 {
    let mut acc = 0.0;
    for ((&yi, &mui), &wi) in y.iter().zip(mu).zip(w) {
        let t = if yi > 0.0 { yi * (yi.ln() - mui.ln()) } else { 0.0 };
        acc += wi * (t - (yi - mui));
    }
    2.0 * acc
}

/// Null intercept for the binomial family. Closed-form weighted log-odds
/// without an offset; a scalar Newton iteration with one.
pub(crate) fn binomial_null_intercept(
    y: ArrayView1<f64>,
    w: &Array1<f64>,
    offset: Option<&Array1<f64>>,
    pmin: f64,
) -> f64 {
    match offset {
        None => {
            let p0: f64 = y
                .iter()
                .zip(w)
                .map(|(&yi, &wi)| wi * yi)
                .sum::<f64>()
                .clamp(pmin, 1.0 - pmin);
            (p0 / (1.0 - p0)).ln()
        }
        Some(off) => {
            let mut a0 = 0.0;
            for _ in 0..20 {
                let mut grad = 0.0;
                let mut hess = 0.0;
                for ((&yi, &oi), &wi) in y.iter().zip(off).zip(w) {
                    let p = 1.0 / (1.0 + (-(a0 + oi)).exp());
                    let p = p.clamp(pmin, 1.0 - pmin);
                    grad += wi * (yi - p);
                    hess += wi * p * (1.0 - p);
                }
                let step = grad / hess.max(MIN_WEIGHT);
                a0 += step;
                if step.abs() < 1e-10 {
                    break;
                }
            }
            a0
        }
    }
}

/// Null intercept for the Poisson family: `ln(sum w y / sum w exp(offset))`.
pub(crate) fn poisson_null_intercept(
    y: ArrayView1<f64>,
    w: &Array1<f64>,
    offset: Option<&Array1<f64>>,
) -> f64 {
    let num: f64 = y.iter().zip(w).map(|(&yi, &wi)| wi * yi).sum();
    let den: f64 = match offset {
        None => w.sum(),
        Some(off) => off.iter().zip(w).map(|(&oi, &wi)| wi * oi.exp()).sum(),
    };
    (num.max(1e-300) / den.max(1e-300)).ln()
}

/// Row-wise softmax probabilities with an overflow shift and a `pmin` clip.
/// `eta` and `prob` are `n x K`.
pub(crate) fn multinomial_probs(eta: &Array2<f64>, pmin: f64, prob: &mut Array2<f64>) {
    let (n, k) = eta.dim();
    for i in 0..n {
        let row_max = (0..k).fold(f64::NEG_INFINITY, |m, c| m.max(eta[[i, c]]));
        let mut total = 0.0;
        for c in 0..k {
            let e = (eta[[i, c]] - row_max).exp();
            prob[[i, c]] = e;
            total += e;
        }
        for c in 0..k {
            prob[[i, c]] = (prob[[i, c]] / total).clamp(pmin, 1.0 - pmin);
        }
    }
}

/// Multinomial deviance `2 sum_i w_i sum_k y_ik ln(y_ik / p_ik)`.
pub(crate) fn multinomial_deviance(y: &Array2<f64>, prob: &Array2<f64>, w: &Array1<f64>) -> f64 {
    let (n, k) = y.dim();
    let mut acc = 0.0;
    for i in 0..n {
        for c in 0..k {
            let yic = y[[i, c]];
            if yic > 0.0 {
                acc += w[i] * yic * (yic.ln() - prob[[i, c]].ln());
            }
        }
    }
    2.0 * acc
}

/// Per-class null intercepts from weighted class frequencies.
pub(crate) fn multinomial_null_intercepts(
    y: &Array2<f64>,
    w: &Array1<f64>,
    pmin: f64,
) -> Array1<f64> {
    let (n, k) = y.dim();
    let mut freq = Array1::<f64>::zeros(k);
    for i in 0..n {
        for c in 0..k {
            freq[c] += w[i] * y[[i, c]];
        }
    }
    let total: f64 = freq.sum();
    freq.mapv(|f| (f / total).clamp(pmin, 1.0 - pmin).ln())
}
