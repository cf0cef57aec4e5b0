use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::config::InternalParams;
use crate::data::{standardize, DataView};
use crate::errors::{ElnetError, PathWarning};
use crate::family::{self, Family, IrlsFamily};
use crate::gradient::NaiveState;
use crate::penalty::{Penalty, ResolvedPenalty};
use crate::point::{
    gaussian_point, irls_point, multinomial_point, FitCtx, GaussianWork, IrlsWork,
    MultinomialWork,
};
use crate::validation;

/// Gaussian gradient bookkeeping selector. `Auto` picks covariance for
/// dense designs with fewer than 500 columns, naive otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GaussianMode {
    Auto,
    Covariance,
    Naive,
}

const COVARIANCE_COLUMN_LIMIT: usize = 500;

impl GaussianMode {
    fn resolve(self, data: &DataView) -> bool {
        match self {
            Self::Covariance => true,
            Self::Naive => false,
            Self::Auto => data.is_dense() && data.n_cols() < COVARIANCE_COLUMN_LIMIT,
        }
    }
}

/// Per-fit options for the path driver.
#[derive(Debug, Clone)]
pub struct PathOptions {
    pub nlambda: usize,
    /// Smallest lambda as a fraction of the computed lambda_max. Defaults to
    /// 1e-4 when n > p, 1e-2 otherwise.
    pub lambda_min_ratio: Option<f64>,
    /// User-supplied grid, strictly decreasing; overrides the automatic one
    /// and disables the deviance-based early stops.
    pub lambdas: Option<Array1<f64>>,
    /// Stop once a solution uses more than this many variables.
    pub dfmax: Option<usize>,
    /// Hard cap on the ever-active set; exceeding it truncates the path.
    pub pmax: Option<usize>,
    /// Inner convergence threshold, relative to the null deviance.
    pub thresh: f64,
    /// Cap on total coordinate-descent passes over the whole path.
    pub maxit: usize,
    pub standardize: bool,
    pub intercept: bool,
    pub mode: GaussianMode,
    /// Multinomial only: penalize each coefficient row by its L2 norm.
    pub grouped: bool,
    /// Binomial/multinomial: use the 1/4 curvature upper bound instead of
    /// the exact working weights (modified Newton).
    pub modified_newton: bool,
}

impl Default for PathOptions {
    fn default() -> Self {
        Self {
            nlambda: 100,
            lambda_min_ratio: None,
            lambdas: None,
            dfmax: None,
            pmax: None,
            thresh: 1e-7,
            maxit: 100_000,
            standardize: true,
            intercept: true,
            mode: GaussianMode::Auto,
            grouped: false,
            modified_newton: false,
        }
    }
}

/// Progress callback, invoked after each recorded lambda step. Must not
/// re-enter the solver.
pub type Progress<'a> = Option<&'a mut dyn FnMut(usize)>;

/// Compressed single-response path.
///
/// Column `m` packs as: `beta[ia[k]] = ca[m][k]` for `k < nin[m]`, all other
/// coordinates zero. Coefficients are on the standardized scale when
/// standardization was requested; unstandardization (and for the Gaussian
/// family, intercept reconstruction) is the caller's job. The first lambda
/// is the computed lambda_max, never infinity.
#[derive(Debug, Clone)]
pub struct PathFit {
    pub family: Family,
    pub lambda: Vec<f64>,
    pub a0: Vec<f64>,
    pub ca: Vec<Array1<f64>>,
    /// Ever-active variable indices in first-entry order.
    pub ia: Vec<usize>,
    pub nin: Vec<usize>,
    /// Fraction of null deviance explained, non-decreasing along the path.
    pub dev_ratio: Vec<f64>,
    /// Null deviance on the solver's working scale; the standardized
    /// Gaussian response makes this exactly one for that family.
    pub null_dev: f64,
    /// Total inner coordinate-descent passes.
    pub nlp: usize,
    pub warning: Option<PathWarning>,
}

impl PathFit {
    /// Number of lambda values actually fitted.
    pub fn n_steps(&self) -> usize {
        self.lambda.len()
    }

    /// Dense coefficient vector at step `m`.
    pub fn coefficients(&self, m: usize, p: usize) -> Array1<f64> {
        let mut beta = Array1::zeros(p);
        for k in 0..self.nin[m] {
            beta[self.ia[k]] = self.ca[m][k];
        }
        beta
    }
}

/// Compressed multinomial path; one coefficient block per class.
#[derive(Debug, Clone)]
pub struct MultinomialPathFit {
    pub lambda: Vec<f64>,
    /// Per-step class intercepts, length K each.
    pub a0: Vec<Array1<f64>>,
    /// Per-step compressed coefficients, `nin[m] x K`.
    pub ca: Vec<Array2<f64>>,
    pub ia: Vec<usize>,
    pub nin: Vec<usize>,
    pub dev_ratio: Vec<f64>,
    pub null_dev: f64,
    pub nlp: usize,
    pub warning: Option<PathWarning>,
}

impl MultinomialPathFit {
    pub fn n_steps(&self) -> usize {
        self.lambda.len()
    }

    pub fn coefficients(&self, m: usize, p: usize) -> Array2<f64> {
        let k = self.a0[m].len();
        let mut beta = Array2::zeros((p, k));
        for row in 0..self.nin[m] {
            for c in 0..k {
                beta[[self.ia[row], c]] = self.ca[m][[row, c]];
            }
        }
        beta
    }
}

/// Largest penalty at which the all-zero solution is optimal, from the null
/// gradients. The mixing parameter is floored so a pure-ridge request still
/// yields a finite grid.
fn lambda_max_from(scores: &Array1<f64>, pen: &ResolvedPenalty, ju: &[bool]) -> f64 {
    let mut top = 0.0f64;
    for j in 0..scores.len() {
        if ju[j] && pen.vp[j] > 0.0 {
            top = top.max(scores[j].abs() / pen.vp[j]);
        }
    }
    (top / pen.alpha.max(1e-3)).max(1e-12)
}

/// Lambda grid: user-supplied verbatim, or log-spaced decay from lambda_max.
fn build_grid(
    opts: &PathOptions,
    params: &InternalParams,
    n: usize,
    p: usize,
    lambda_max: f64,
) -> Result<(Vec<f64>, bool), ElnetError> {
    if let Some(user) = &opts.lambdas {
        return Ok((validation::check_user_lambdas(user)?, false));
    }
    let default_ratio = if n > p { 1e-4 } else { 1e-2 };
    let ratio = opts
        .lambda_min_ratio
        .unwrap_or(default_ratio)
        .max(params.eps);
    if opts.nlambda < 2 {
        return Ok((vec![lambda_max], true));
    }
    let alf = ratio.powf(1.0 / (opts.nlambda - 1) as f64);
    let mut grid = Vec::with_capacity(opts.nlambda);
    let mut lam = lambda_max;
    for _ in 0..opts.nlambda {
        grid.push(lam);
        lam *= alf;
    }
    Ok((grid, true))
}

/// Deviance-based stop decisions applied after a column is recorded.
fn deviance_stop(
    dev_ratio: &[f64],
    m: usize,
    auto_grid: bool,
    params: &InternalParams,
    fdev: f64,
) -> bool {
    if !auto_grid || m + 1 < params.mnlam {
        return false;
    }
    let cur = dev_ratio[m];
    if m > 0 && cur - dev_ratio[m - 1] < fdev * cur {
        return true;
    }
    cur > params.devmax
}

struct Limits {
    dfmax: usize,
    pmax: usize,
}

fn resolve_limits(opts: &PathOptions, p: usize) -> Limits {
    let dfmax = opts.dfmax.unwrap_or(p + 1);
    let pmax = opts.pmax.unwrap_or((2 * dfmax + 20).min(p));
    Limits { dfmax, pmax }
}

fn warn_on(warning: PathWarning) {
    match warning {
        PathWarning::MaxIterations { step } => {
            log::warn!("coordinate descent did not converge at step {step}; path truncated");
        }
        PathWarning::Saturated { step } => {
            log::warn!("fit saturated at step {step}; path truncated");
        }
        PathWarning::PoissonOverflow { step } => {
            log::warn!("poisson mean overflow at step {step}; path truncated");
        }
        // Structural cap: expected behavior, not worth a warning.
        PathWarning::EverActiveOverflow { .. } => {}
    }
}

// ---------------------------------------------------------------------------
// Gaussian entry
// ---------------------------------------------------------------------------

/// Elastic-net path for the Gaussian family (squared-error loss). An offset
/// is folded into the response under the identity link.
#[allow(clippy::too_many_arguments)]
pub fn fit_gaussian(
    x: &DataView,
    y: ArrayView1<'_, f64>,
    weights: Option<ArrayView1<'_, f64>>,
    offset: Option<ArrayView1<'_, f64>>,
    penalty: &Penalty,
    opts: &PathOptions,
    params: &InternalParams,
    mut progress: Progress<'_>,
) -> Result<PathFit, ElnetError> {
    let n = y.len();
    let p = x.n_cols();
    let w = validation::check_common(x, n, weights)?;
    let offset = validation::check_offset(offset, n)?;
    let pen = ResolvedPenalty::new(penalty, p)?;
    let mut ju = pen.ju.clone();
    let std = standardize(x, &w, opts.standardize, opts.intercept, pen.alpha, &mut ju)?;

    let mut y_adj = y.to_owned();
    if let Some(off) = &offset {
        y_adj -= off;
    }
    let ym: f64 = if opts.intercept {
        y_adj.iter().zip(&w).map(|(&yi, &wi)| wi * yi).sum()
    } else {
        0.0
    };
    let yvar: f64 = y_adj
        .iter()
        .zip(&w)
        .map(|(&yi, &wi)| wi * (yi - ym) * (yi - ym))
        .sum();
    if yvar <= 0.0 {
        return Err(ElnetError::ConstantResponse);
    }
    let ys = yvar.sqrt();

    let r0: Array1<f64> = y_adj
        .iter()
        .zip(&w)
        .map(|(&yi, &wi)| wi * (yi - ym) / ys)
        .collect();
    let base = NaiveState::new(r0.clone());
    let mut g0 = Array1::<f64>::zeros(p);
    for j in 0..p {
        if ju[j] {
            g0[j] = base.gradient(x, &std, j, std.wmean[j], 1.0);
        }
    }

    let lambda_max = lambda_max_from(&g0, &pen, &ju);
    let (grid, auto_grid) = build_grid(opts, params, n, p, lambda_max)?;
    let limits = resolve_limits(opts, p);
    let fdev = if pen.has_zero_bound() { 0.0 } else { params.fdev };

    let covariance = opts.mode.resolve(x);
    let mut work = GaussianWork::new(p, g0, covariance);
    work.set_residual(r0);

    let ctx = FitCtx {
        data: x,
        std: &std,
        pen: &pen,
        w: &w,
        ju: &ju,
        intercept: opts.intercept,
        maxit: opts.maxit,
        pmax: limits.pmax,
    };

    let mut fit = PathFit {
        family: Family::Gaussian,
        lambda: Vec::new(),
        a0: Vec::new(),
        ca: Vec::new(),
        ia: Vec::new(),
        nin: Vec::new(),
        dev_ratio: Vec::new(),
        null_dev: 1.0,
        nlp: 0,
        warning: None,
    };
    let mut nlp = 0usize;
    let mut lambda_prev = grid[0];
    for (m, &lambda) in grid.iter().enumerate() {
        if let Err(warning) =
            gaussian_point(&ctx, &mut work, lambda, lambda_prev, opts.thresh, m, &mut nlp)
        {
            warn_on(warning);
            fit.warning = Some(warning);
            break;
        }
        let nin = work.active.len();
        let col: Array1<f64> = work.active.order().iter().map(|&j| work.a[j]).collect();
        let me = col.iter().filter(|&&b| b != 0.0).count();
        fit.lambda.push(lambda);
        fit.a0.push(0.0);
        fit.ca.push(col);
        fit.nin.push(nin);
        fit.dev_ratio.push(work.rsq);
        log::debug!(
            "lambda[{m}] = {lambda:.6e}: {me} active, rsq = {:.6}",
            work.rsq
        );
        if let Some(cb) = progress.as_deref_mut() {
            cb(m);
        }
        if me > limits.dfmax
            || deviance_stop(&fit.dev_ratio, m, auto_grid, params, fdev)
        {
            break;
        }
        lambda_prev = lambda;
    }
    fit.ia = work.active.order().to_vec();
    fit.nlp = nlp;
    Ok(fit)
}

// ---------------------------------------------------------------------------
// IRLS entries
// ---------------------------------------------------------------------------

struct IrlsInit {
    a0: f64,
    null_dev: f64,
    g0: Array1<f64>,
}

#[allow(clippy::too_many_arguments)]
fn fit_irls(
    fam: IrlsFamily,
    family_tag: Family,
    x: &DataView,
    y: ArrayView1<'_, f64>,
    weights: Option<ArrayView1<'_, f64>>,
    offset: Option<ArrayView1<'_, f64>>,
    penalty: &Penalty,
    opts: &PathOptions,
    params: &InternalParams,
    mut progress: Progress<'_>,
) -> Result<PathFit, ElnetError> {
    let n = y.len();
    let p = x.n_cols();
    let w = validation::check_common(x, n, weights)?;
    let offset = validation::check_offset(offset, n)?;
    let pen = ResolvedPenalty::new(penalty, p)?;
    let mut ju = pen.ju.clone();
    let std = standardize(x, &w, opts.standardize, opts.intercept, pen.alpha, &mut ju)?;

    let init = irls_null_fit(fam, y, &w, offset.as_ref(), opts.intercept, params, x, &std, &ju)?;
    let IrlsInit {
        a0: a0_init,
        null_dev,
        g0,
    } = init;

    let lambda_max = lambda_max_from(&g0, &pen, &ju);
    let (grid, auto_grid) = build_grid(opts, params, n, p, lambda_max)?;
    let limits = resolve_limits(opts, p);
    let fdev = if pen.has_zero_bound() { 0.0 } else { params.fdev };

    let mut work = IrlsWork::new(p, n, a0_init, null_dev, g0);
    let ctx = FitCtx {
        data: x,
        std: &std,
        pen: &pen,
        w: &w,
        ju: &ju,
        intercept: opts.intercept,
        maxit: opts.maxit,
        pmax: limits.pmax,
    };
    let tol_inner = opts.thresh * null_dev;
    let tol_outer = params.epsnr * null_dev;

    let mut fit = PathFit {
        family: family_tag,
        lambda: Vec::new(),
        a0: Vec::new(),
        ca: Vec::new(),
        ia: Vec::new(),
        nin: Vec::new(),
        dev_ratio: Vec::new(),
        null_dev,
        nlp: 0,
        warning: None,
    };
    let mut nlp = 0usize;
    let mut lambda_prev = grid[0];
    for (m, &lambda) in grid.iter().enumerate() {
        if let Err(warning) = irls_point(
            &ctx,
            fam,
            y,
            offset.as_ref(),
            &mut work,
            lambda,
            lambda_prev,
            opts.modified_newton,
            tol_inner,
            tol_outer,
            params,
            m,
            &mut nlp,
        ) {
            warn_on(warning);
            fit.warning = Some(warning);
            break;
        }
        let nin = work.active.len();
        let col: Array1<f64> = work.active.order().iter().map(|&j| work.a[j]).collect();
        let me = col.iter().filter(|&&b| b != 0.0).count();
        let ratio = (null_dev - work.dev) / null_dev;
        fit.lambda.push(lambda);
        fit.a0.push(work.a0);
        fit.ca.push(col);
        fit.nin.push(nin);
        fit.dev_ratio.push(ratio);
        log::debug!("lambda[{m}] = {lambda:.6e}: {me} active, dev ratio = {ratio:.6}");
        if let Some(cb) = progress.as_deref_mut() {
            cb(m);
        }
        if me > limits.dfmax
            || deviance_stop(&fit.dev_ratio, m, auto_grid, params, fdev)
        {
            break;
        }
        lambda_prev = lambda;
    }
    fit.ia = work.active.order().to_vec();
    fit.nlp = nlp;
    Ok(fit)
}

/// Null (intercept-plus-offset) fit: initial intercept, null deviance, and
/// the screening gradients at beta = 0.
#[allow(clippy::too_many_arguments)]
fn irls_null_fit(
    fam: IrlsFamily,
    y: ArrayView1<'_, f64>,
    w: &Array1<f64>,
    offset: Option<&Array1<f64>>,
    intercept: bool,
    params: &InternalParams,
    x: &DataView,
    std: &crate::data::Standardization,
    ju: &[bool],
) -> Result<IrlsInit, ElnetError> {
    let n = y.len();
    let p = x.n_cols();
    let a0 = if intercept {
        match fam {
            IrlsFamily::Binomial => family::binomial_null_intercept(y, w, offset, params.pmin),
            IrlsFamily::Poisson => family::poisson_null_intercept(y, w, offset),
        }
    } else {
        0.0
    };
    let mut eta0 = match offset {
        Some(off) => off.clone(),
        None => Array1::zeros(n),
    };
    if a0 != 0.0 {
        eta0.mapv_inplace(|e| e + a0);
    }
    let mut mu = Array1::zeros(n);
    let mut v = Array1::zeros(n);
    let mut r = Array1::zeros(n);
    family::irls_update(
        fam,
        y,
        &eta0,
        w,
        false,
        params.pmin,
        params.exmx,
        params.big,
        0,
        &mut mu,
        &mut v,
        &mut r,
    )
    .map_err(|_| ElnetError::NullModelOverflow)?;
    let null_dev = family::irls_deviance(fam, y, &mu, w);
    if !(null_dev > 0.0) || !null_dev.is_finite() {
        return Err(ElnetError::ConstantResponse);
    }
    let state = NaiveState::new(r);
    let mut g0 = Array1::<f64>::zeros(p);
    for j in 0..p {
        if ju[j] {
            g0[j] = state.gradient(x, std, j, 0.0, 0.0);
        }
    }
    Ok(IrlsInit { a0, null_dev, g0 })
}

/// Lasso/elastic-net path for binomial deviance (logit link). Responses are
/// probabilities or 0/1 indicators.
#[allow(clippy::too_many_arguments)]
pub fn fit_binomial(
    x: &DataView,
    y: ArrayView1<'_, f64>,
    weights: Option<ArrayView1<'_, f64>>,
    offset: Option<ArrayView1<'_, f64>>,
    penalty: &Penalty,
    opts: &PathOptions,
    params: &InternalParams,
    progress: Progress<'_>,
) -> Result<PathFit, ElnetError> {
    validation::check_binomial_response(y)?;
    fit_irls(
        IrlsFamily::Binomial,
        Family::Binomial,
        x,
        y,
        weights,
        offset,
        penalty,
        opts,
        params,
        progress,
    )
}

/// Lasso/elastic-net path for Poisson deviance (log link).
#[allow(clippy::too_many_arguments)]
pub fn fit_poisson(
    x: &DataView,
    y: ArrayView1<'_, f64>,
    weights: Option<ArrayView1<'_, f64>>,
    offset: Option<ArrayView1<'_, f64>>,
    penalty: &Penalty,
    opts: &PathOptions,
    params: &InternalParams,
    progress: Progress<'_>,
) -> Result<PathFit, ElnetError> {
    validation::check_poisson_response(y)?;
    fit_irls(
        IrlsFamily::Poisson,
        Family::Poisson,
        x,
        y,
        weights,
        offset,
        penalty,
        opts,
        params,
        progress,
    )
}

// ---------------------------------------------------------------------------
// Multinomial entry
// ---------------------------------------------------------------------------

/// Elastic-net path for multinomial deviance. `y` is an `n x K` indicator or
/// count matrix; rows with counts are normalized and their totals folded
/// into the observation weights.
#[allow(clippy::too_many_arguments)]
pub fn fit_multinomial(
    x: &DataView,
    y: ArrayView2<'_, f64>,
    weights: Option<ArrayView1<'_, f64>>,
    offset: Option<&Array2<f64>>,
    penalty: &Penalty,
    opts: &PathOptions,
    params: &InternalParams,
    mut progress: Progress<'_>,
) -> Result<MultinomialPathFit, ElnetError> {
    let n = y.nrows();
    let nk = y.ncols();
    let p = x.n_cols();
    let mut w = validation::check_common(x, n, weights)?;
    validation::check_class_indicator(y, &w)?;
    if let Some(off) = offset {
        if off.dim() != (n, nk) {
            return Err(ElnetError::LengthMismatch {
                name: "offset",
                expected: n * nk,
                actual: off.len(),
            });
        }
    }

    // Fold count rows into the weights and keep row-normalized indicators.
    let y01 = validation::normalize_class_rows(y);
    for i in 0..n {
        let row_total: f64 = (0..nk).map(|c| y[[i, c]]).sum();
        w[i] *= row_total;
    }
    let w_total: f64 = w.sum();
    if w_total <= 0.0 {
        return Err(ElnetError::InvalidWeights);
    }
    w /= w_total;

    let pen = ResolvedPenalty::new(penalty, p)?;
    let mut ju = pen.ju.clone();
    let std = standardize(x, &w, opts.standardize, opts.intercept, pen.alpha, &mut ju)?;

    let a0 = if opts.intercept {
        family::multinomial_null_intercepts(&y01, &w, params.pmin)
    } else {
        Array1::zeros(nk)
    };
    let mut eta0 = match offset {
        Some(off) => off.clone(),
        None => Array2::zeros((n, nk)),
    };
    for c in 0..nk {
        let a0c = a0[c];
        eta0.column_mut(c).mapv_inplace(|e| e + a0c);
    }
    let mut prob = Array2::zeros((n, nk));
    family::multinomial_probs(&eta0, params.pmin, &mut prob);
    let null_dev = family::multinomial_deviance(&y01, &prob, &w);
    if !(null_dev > 0.0) || !null_dev.is_finite() {
        return Err(ElnetError::ConstantResponse);
    }

    let mut ga0 = Array1::<f64>::zeros(p);
    let states: Vec<NaiveState> = (0..nk)
        .map(|c| {
            let r: Array1<f64> = (0..n).map(|i| w[i] * (y01[[i, c]] - prob[[i, c]])).collect();
            NaiveState::new(r)
        })
        .collect();
    for j in 0..p {
        if !ju[j] {
            continue;
        }
        let mut max_abs = 0.0f64;
        let mut norm_sq = 0.0f64;
        for state in &states {
            let g = state.gradient(x, &std, j, 0.0, 0.0);
            max_abs = max_abs.max(g.abs());
            norm_sq += g * g;
        }
        ga0[j] = if opts.grouped { norm_sq.sqrt() } else { max_abs };
    }

    let lambda_max = lambda_max_from(&ga0, &pen, &ju);
    let (grid, auto_grid) = build_grid(opts, params, n, p, lambda_max)?;
    let limits = resolve_limits(opts, p);
    let fdev = if pen.has_zero_bound() { 0.0 } else { params.fdev };

    let mut work = MultinomialWork::new(p, a0, null_dev, ga0);
    let ctx = FitCtx {
        data: x,
        std: &std,
        pen: &pen,
        w: &w,
        ju: &ju,
        intercept: opts.intercept,
        maxit: opts.maxit,
        pmax: limits.pmax,
    };
    let tol_inner = opts.thresh * null_dev;
    let tol_outer = params.epsnr * null_dev;

    let mut fit = MultinomialPathFit {
        lambda: Vec::new(),
        a0: Vec::new(),
        ca: Vec::new(),
        ia: Vec::new(),
        nin: Vec::new(),
        dev_ratio: Vec::new(),
        null_dev,
        nlp: 0,
        warning: None,
    };
    let mut nlp = 0usize;
    let mut lambda_prev = grid[0];
    for (m, &lambda) in grid.iter().enumerate() {
        if let Err(warning) = multinomial_point(
            &ctx,
            &y01,
            offset,
            &mut work,
            lambda,
            lambda_prev,
            opts.grouped,
            opts.modified_newton,
            tol_inner,
            tol_outer,
            params,
            m,
            &mut nlp,
        ) {
            warn_on(warning);
            fit.warning = Some(warning);
            break;
        }
        let nin = work.active.len();
        let mut col = Array2::<f64>::zeros((nin, nk));
        let mut me = 0usize;
        for (row, &j) in work.active.order().iter().enumerate() {
            let mut any = false;
            for c in 0..nk {
                col[[row, c]] = work.a[[j, c]];
                any |= work.a[[j, c]] != 0.0;
            }
            me += usize::from(any);
        }
        let ratio = (null_dev - work.dev) / null_dev;
        fit.lambda.push(lambda);
        fit.a0.push(work.a0.clone());
        fit.ca.push(col);
        fit.nin.push(nin);
        fit.dev_ratio.push(ratio);
        log::debug!("lambda[{m}] = {lambda:.6e}: {me} active, dev ratio = {ratio:.6}");
        if let Some(cb) = progress.as_deref_mut() {
            cb(m);
        }
        if me > limits.dfmax
            || deviance_stop(&fit.dev_ratio, m, auto_grid, params, fdev)
        {
            break;
        }
        lambda_prev = lambda;
    }
    fit.ia = work.active.order().to_vec();
    fit.nlp = nlp;
    Ok(fit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn auto_grid_is_log_spaced_and_decreasing() {
        let opts = PathOptions {
            nlambda: 5,
            lambda_min_ratio: Some(1e-2),
            ..PathOptions::default()
        };
        let params = InternalParams::default();
        let (grid, auto) = build_grid(&opts, &params, 100, 10, 2.0).unwrap();
        assert!(auto);
        assert_eq!(grid.len(), 5);
        assert_eq!(grid[0], 2.0);
        assert!((grid[4] / grid[0] - 1e-2).abs() < 1e-10);
        for pair in grid.windows(2) {
            assert!(pair[1] < pair[0]);
        }
    }

    #[test]
    fn user_grid_disables_auto_stops() {
        let opts = PathOptions {
            lambdas: Some(array![0.5, 0.1, 0.02]),
            ..PathOptions::default()
        };
        let params = InternalParams::default();
        let (grid, auto) = build_grid(&opts, &params, 10, 3, 99.0).unwrap();
        assert!(!auto);
        assert_eq!(grid, vec![0.5, 0.1, 0.02]);
    }

    #[test]
    fn deviance_stop_requires_minimum_path_length() {
        let params = InternalParams::default();
        let ratios = vec![0.0, 0.5, 0.500001];
        // Too early even though the gain is negligible.
        assert!(!deviance_stop(&ratios, 2, true, &params, params.fdev));
        let ratios = vec![0.0, 0.1, 0.2, 0.3, 0.4, 0.400001];
        assert!(deviance_stop(&ratios, 5, true, &params, params.fdev));
        // User grids never stop early.
        assert!(!deviance_stop(&ratios, 5, false, &params, params.fdev));
    }
}
