use serde::{Deserialize, Serialize};

/// Numerical safeguards shared by every fit.
///
/// An explicit value passed into every entry point rather than process-wide
/// state; a scoped override is just a locally modified copy, so nothing has
/// to be saved and restored around a fit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InternalParams {
    /// Minimum fractional deviance gain required to continue the path.
    pub fdev: f64,
    /// Stop the path once this fraction of the null deviance is explained.
    pub devmax: f64,
    /// Floor for the automatic `lambda_min_ratio`.
    pub eps: f64,
    /// Overflow guard for fitted means and denominators.
    pub big: f64,
    /// Fitted probabilities are kept inside `[pmin, 1 - pmin]`.
    pub pmin: f64,
    /// Symmetric clamp on linear predictors before exponentiation.
    pub exmx: f64,
    /// Minimum number of path steps emitted before deviance-based stops fire.
    pub mnlam: usize,
    /// Iteration cap for the IRLS outer loop at one lambda.
    pub mxitnr: usize,
    /// Convergence tolerance for the IRLS outer loop, relative to the null
    /// deviance.
    pub epsnr: f64,
}

impl Default for InternalParams {
    fn default() -> Self {
        Self {
            fdev: 1e-5,
            devmax: 0.999,
            eps: 1e-6,
            big: 9.9e35,
            pmin: 1e-9,
            exmx: 250.0,
            mnlam: 5,
            mxitnr: 25,
            epsnr: 1e-6,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let p = InternalParams::default();
        assert_eq!(p.mnlam, 5);
        assert!(p.fdev > 0.0 && p.fdev < 1e-3);
        assert!(p.devmax < 1.0);
        assert!(p.pmin > 0.0 && p.pmin < 1e-3);
    }
}
