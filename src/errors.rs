use thiserror::Error;

/// Fatal failures: the fit aborts and no partial path is returned.
///
/// Inner loops never panic; they surface one of these (or a [`PathWarning`])
/// to the path driver, which decides truncate-vs-abort. Numeric codes for
/// callers that still speak the legacy convention are available through
/// [`ElnetError::code`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ElnetError {
    #[error("design matrix has {n_rows} rows but the response has {n_obs}")]
    DimensionMismatch { n_rows: usize, n_obs: usize },

    #[error("{name} must have length {expected}, got {actual}")]
    LengthMismatch {
        name: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("non-finite value in the design matrix at column {column}")]
    NonFiniteDesign { column: usize },

    #[error("observation weights must be non-negative with a positive sum")]
    InvalidWeights,

    #[error("all penalty factors are zero; nothing to penalize")]
    AllFactorsZero,

    #[error("every predictor is excluded or constant; nothing to fit")]
    NothingToFit,

    #[error("predictor {column} has zero variance and alpha = 1 leaves its update undefined")]
    ZeroVariance { column: usize },

    #[error("response is constant; the intercept-only model is already exact")]
    ConstantResponse,

    #[error("binomial responses must lie in [0, 1]")]
    BinomialResponseOutOfRange,

    #[error("poisson responses must be non-negative counts")]
    NegativeCount,

    #[error("class indicator matrix must have non-negative entries with positive class totals")]
    DegenerateClassIndicator,

    #[error("user lambda sequence must be positive and strictly decreasing")]
    BadLambdaSequence,

    #[error("coefficient bounds must satisfy lower <= 0 <= upper at every coordinate")]
    BadBounds,

    #[error("elastic-net mixing parameter must lie in [0, 1], got {alpha}")]
    BadAlpha { alpha: f64 },

    #[error("fitted mean overflow in the null model; check the offset scale")]
    NullModelOverflow,

    #[error("exclusion index {index} is out of range for {p} predictors")]
    BadExclusion { index: usize, p: usize },
}

impl ElnetError {
    /// Legacy numeric error code. Positive codes are fatal; `10000 + j`
    /// identifies a zero-variance predictor at 1-based column `j`.
    pub fn code(&self) -> i32 {
        match self {
            Self::ZeroVariance { column } => 10_000 + *column as i32 + 1,
            Self::AllFactorsZero => 10_000,
            Self::NothingToFit => 7_777,
            Self::ConstantResponse => 7_778,
            _ => 1,
        }
    }
}

/// Non-fatal reasons a path stopped before its full lambda grid.
///
/// The path driver truncates the result to the last completed column and
/// records the cause here; `code()` follows the legacy convention of
/// negating the 1-based step index, offset by family-specific blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathWarning {
    /// Coordinate-descent pass budget exhausted at this step.
    MaxIterations { step: usize },
    /// More than `pmax` predictors ever entered the active set.
    EverActiveOverflow { step: usize },
    /// Binomial/multinomial working weights collapsed; the fit is saturated.
    Saturated { step: usize },
    /// A Poisson mean exceeded the overflow guard.
    PoissonOverflow { step: usize },
}

impl PathWarning {
    pub fn step(&self) -> usize {
        match *self {
            Self::MaxIterations { step }
            | Self::EverActiveOverflow { step }
            | Self::Saturated { step }
            | Self::PoissonOverflow { step } => step,
        }
    }

    /// Legacy numeric code for the truncation, always negative.
    pub fn code(&self) -> i32 {
        let k = self.step() as i32 + 1;
        match self {
            Self::MaxIterations { .. } => -k,
            Self::EverActiveOverflow { .. } => -10_000 - k,
            Self::Saturated { .. } => -20_000 - k,
            Self::PoissonOverflow { .. } => -30_000 - k,
        }
    }
}
