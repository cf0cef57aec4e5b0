use ndarray::Array1;

use crate::errors::ElnetError;

/// Convex penalty description: elastic-net mix, per-coordinate factors,
/// box constraints, and hard exclusions.
#[derive(Debug, Clone)]
pub struct Penalty {
    /// Elastic-net mixing parameter in `[0, 1]`: 1 is pure lasso, 0 pure ridge.
    pub alpha: f64,
    /// Per-coordinate penalty factors. `None` means all ones. Non-finite
    /// entries freeze the coordinate at zero.
    pub factors: Option<Array1<f64>>,
    /// Per-coordinate lower bounds (must be `<= 0`). `None` means unbounded.
    pub lower: Option<Array1<f64>>,
    /// Per-coordinate upper bounds (must be `>= 0`). `None` means unbounded.
    pub upper: Option<Array1<f64>>,
    /// Coordinates frozen at zero for the whole path.
    pub exclude: Vec<usize>,
}

impl Default for Penalty {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            factors: None,
            lower: None,
            upper: None,
            exclude: Vec::new(),
        }
    }
}

impl Penalty {
    pub fn lasso() -> Self {
        Self::default()
    }

    pub fn ridge() -> Self {
        Self {
            alpha: 0.0,
            ..Self::default()
        }
    }

    pub fn elastic_net(alpha: f64) -> Self {
        Self {
            alpha,
            ..Self::default()
        }
    }
}

/// Penalty state after validation: factors rescaled to sum to `p`, bounds
/// densified, and the screening mask `ju` folded over exclusions.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ResolvedPenalty {
    pub alpha: f64,
    pub vp: Array1<f64>,
    pub lower: Array1<f64>,
    pub upper: Array1<f64>,
    /// `false` marks coordinates frozen at zero (excluded or non-finite
    /// penalty factor). Zero-variance freezes are folded in later, once the
    /// column moments are known.
    pub ju: Vec<bool>,
}

impl ResolvedPenalty {
    pub fn new(penalty: &Penalty, p: usize) -> Result<Self, ElnetError> {
        if !(0.0..=1.0).contains(&penalty.alpha) {
            return Err(ElnetError::BadAlpha {
                alpha: penalty.alpha,
            });
        }

        let mut ju = vec![true; p];
        for &j in &penalty.exclude {
            if j >= p {
                return Err(ElnetError::BadExclusion { index: j, p });
            }
            ju[j] = false;
        }

        let mut vp = match &penalty.factors {
            Some(f) => {
                if f.len() != p {
                    return Err(ElnetError::LengthMismatch {
                        name: "penalty factors",
                        expected: p,
                        actual: f.len(),
                    });
                }
                f.mapv(|v| v.max(0.0))
            }
            None => Array1::ones(p),
        };
        for j in 0..p {
            if !vp[j].is_finite() {
                ju[j] = false;
                vp[j] = 0.0;
            }
        }
        let total: f64 = vp.sum();
        if total <= 0.0 {
            return Err(ElnetError::AllFactorsZero);
        }
        vp.mapv_inplace(|v| v * p as f64 / total);

        let lower = match &penalty.lower {
            Some(lo) => {
                if lo.len() != p {
                    return Err(ElnetError::LengthMismatch {
                        name: "lower bounds",
                        expected: p,
                        actual: lo.len(),
                    });
                }
                lo.clone()
            }
            None => Array1::from_elem(p, f64::NEG_INFINITY),
        };
        let upper = match &penalty.upper {
            Some(hi) => {
                if hi.len() != p {
                    return Err(ElnetError::LengthMismatch {
                        name: "upper bounds",
                        expected: p,
                        actual: hi.len(),
                    });
                }
                hi.clone()
            }
            None => Array1::from_elem(p, f64::INFINITY),
        };
        for j in 0..p {
            if lower[j] > 0.0 || upper[j] < 0.0 || lower[j].is_nan() || upper[j].is_nan() {
                return Err(ElnetError::BadBounds);
            }
        }

        if !ju.iter().any(|&keep| keep) {
            return Err(ElnetError::NothingToFit);
        }

        Ok(Self {
            alpha: penalty.alpha,
            vp,
            lower,
            upper,
            ju,
        })
    }

    /// Any zero bound disables the fractional-deviance early stop: a clamped
    /// path can sit on a flat step without being finished.
    pub fn has_zero_bound(&self) -> bool {
        (0..self.vp.len()).any(|j| self.lower[j] == 0.0 || self.upper[j] == 0.0)
    }
}
