use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

use crate::data::DataView;
use crate::errors::ElnetError;

/// Fail-fast checks shared by every entry point, plus weight normalization.
/// Returns the weights rescaled to sum to one.
pub(crate) fn check_common(
    data: &DataView,
    n_obs: usize,
    weights: Option<ArrayView1<f64>>,
) -> Result<Array1<f64>, ElnetError> {
    let n = data.n_rows();
    if n != n_obs {
        return Err(ElnetError::DimensionMismatch {
            n_rows: n,
            n_obs,
        });
    }
    data.validate_finite()?;

    let w = match weights {
        Some(w) => {
            if w.len() != n {
                return Err(ElnetError::LengthMismatch {
                    name: "weights",
                    expected: n,
                    actual: w.len(),
                });
            }
            if w.iter().any(|&wi| !wi.is_finite() || wi < 0.0) {
                return Err(ElnetError::InvalidWeights);
            }
            w.to_owned()
        }
        None => Array1::ones(n),
    };
    let total: f64 = w.sum();
    if total <= 0.0 {
        return Err(ElnetError::InvalidWeights);
    }
    Ok(w / total)
}

pub(crate) fn check_offset(
    offset: Option<ArrayView1<f64>>,
    n: usize,
) -> Result<Option<Array1<f64>>, ElnetError> {
    match offset {
        None => Ok(None),
        Some(off) => {
            if off.len() != n {
                return Err(ElnetError::LengthMismatch {
                    name: "offset",
                    expected: n,
                    actual: off.len(),
                });
            }
            Ok(Some(off.to_owned()))
        }
    }
}

pub(crate) fn check_binomial_response(y: ArrayView1<f64>) -> Result<(), ElnetError> {
    if y.iter().any(|&yi| !yi.is_finite() || !(0.0..=1.0).contains(&yi)) {
        return Err(ElnetError::BinomialResponseOutOfRange);
    }
    Ok(())
}

pub(crate) fn check_poisson_response(y: ArrayView1<f64>) -> Result<(), ElnetError> {
    if y.iter().any(|&yi| !yi.is_finite() || yi < 0.0) {
        return Err(ElnetError::NegativeCount);
    }
    Ok(())
}

/// Class indicators must be non-negative with every class represented.
pub(crate) fn check_class_indicator(
    y: ArrayView2<f64>,
    w: &Array1<f64>,
) -> Result<(), ElnetError> {
    let (n, k) = y.dim();
    if k < 2 {
        return Err(ElnetError::DegenerateClassIndicator);
    }
    for c in 0..k {
        let mut total = 0.0;
        for i in 0..n {
            let yic = y[[i, c]];
            if !yic.is_finite() || yic < 0.0 {
                return Err(ElnetError::DegenerateClassIndicator);
            }
            total += w[i] * yic;
        }
        if total <= 0.0 {
            return Err(ElnetError::DegenerateClassIndicator);
        }
    }
    Ok(())
}

/// Validates a user-supplied lambda sequence: positive, strictly decreasing.
pub(crate) fn check_user_lambdas(lambdas: &Array1<f64>) -> Result<Vec<f64>, ElnetError> {
    if lambdas.is_empty() {
        return Err(ElnetError::BadLambdaSequence);
    }
    let vals: Vec<f64> = lambdas.iter().copied().collect();
    if vals.iter().any(|&l| !l.is_finite() || l < 0.0) {
        return Err(ElnetError::BadLambdaSequence);
    }
    if vals.windows(2).any(|pair| pair[1] >= pair[0]) {
        return Err(ElnetError::BadLambdaSequence);
    }
    Ok(vals)
}

/// Row-normalized copy of a class indicator (rows may encode counts).
pub(crate) fn normalize_class_rows(y: ArrayView2<f64>) -> Array2<f64> {
    let (n, k) = y.dim();
    let mut out = y.to_owned();
    for i in 0..n {
        let total: f64 = (0..k).map(|c| out[[i, c]]).sum();
        if total > 0.0 {
            for c in 0..k {
                out[[i, c]] /= total;
            }
        }
    }
    out
}
