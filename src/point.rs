use ndarray::{Array1, Array2, ArrayView1};

use crate::coordinate::CoordinateKernel;
use crate::data::{DataView, Standardization};
use crate::errors::PathWarning;
use crate::family::{self, IrlsFamily};
use crate::gradient::{CovarianceState, NaiveState};
use crate::penalty::ResolvedPenalty;

/// Ever-active registry in first-entry order. The order doubles as the row
/// order of the compressed path output.
#[derive(Debug, Clone)]
pub(crate) struct ActiveSet {
    slot: Vec<Option<usize>>,
    order: Vec<usize>,
}

impl ActiveSet {
    pub fn new(p: usize) -> Self {
        Self {
            slot: vec![None; p],
            order: Vec::new(),
        }
    }

    pub fn contains(&self, j: usize) -> bool {
        self.slot[j].is_some()
    }

    /// Registers a first activation; fails when the ever-active count would
    /// exceed `pmax`.
    pub fn register(&mut self, j: usize, pmax: usize) -> Result<(), ()> {
        if self.slot[j].is_none() {
            if self.order.len() >= pmax {
                return Err(());
            }
            self.slot[j] = Some(self.order.len());
            self.order.push(j);
        }
        Ok(())
    }

    pub fn order(&self) -> &[usize] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }
}

/// Immutable per-fit context shared by the point solvers.
pub(crate) struct FitCtx<'a> {
    pub data: &'a DataView,
    pub std: &'a Standardization,
    pub pen: &'a ResolvedPenalty,
    pub w: &'a Array1<f64>,
    pub ju: &'a [bool],
    pub intercept: bool,
    pub maxit: usize,
    pub pmax: usize,
}

/// Screening state: the strong set is monotone over the whole path, so a
/// plain mask plus an insertion-ordered list suffices.
#[derive(Debug, Clone)]
pub(crate) struct Screen {
    pub mask: Vec<bool>,
    pub list: Vec<usize>,
}

impl Screen {
    pub fn new(p: usize) -> Self {
        Self {
            mask: vec![false; p],
            list: Vec::new(),
        }
    }

    pub fn admit(&mut self, j: usize) {
        if !self.mask[j] {
            self.mask[j] = true;
            self.list.push(j);
        }
    }
}

/// Sequential-strong-rule screen: admit every coordinate whose last known
/// gradient magnitude clears `alpha * vp_j * (2 lambda - lambda_prev)`.
fn strong_screen(
    screen: &mut Screen,
    scores: &Array1<f64>,
    pen: &ResolvedPenalty,
    ju: &[bool],
    lambda: f64,
    lambda_prev: f64,
) {
    let tlam = pen.alpha * (2.0 * lambda - lambda_prev);
    for j in 0..scores.len() {
        if ju[j] && !screen.mask[j] && scores[j].abs() > tlam * pen.vp[j] {
            screen.admit(j);
        }
    }
}

// ---------------------------------------------------------------------------
// Gaussian
// ---------------------------------------------------------------------------

/// Gradient bookkeeping variants for the Gaussian inner loop.
pub(crate) enum GaussianGradient {
    Naive(NaiveState),
    Covariance(CovarianceState),
}

pub(crate) struct GaussianWork {
    pub a: Array1<f64>,
    pub rsq: f64,
    pub grad: GaussianGradient,
    /// Gradient magnitudes as of the last KKT refresh; drives the strong
    /// screen at the next lambda. In covariance mode this mirrors the
    /// maintained gradient vector.
    pub g_screen: Array1<f64>,
    pub screen: Screen,
    pub active: ActiveSet,
}

impl GaussianWork {
    pub fn new(p: usize, g0: Array1<f64>, covariance: bool) -> Self {
        let grad = if covariance {
            GaussianGradient::Covariance(CovarianceState::new(g0.clone()))
        } else {
            GaussianGradient::Naive(NaiveState::new(Array1::zeros(0)))
        };
        Self {
            a: Array1::zeros(p),
            rsq: 0.0,
            grad,
            g_screen: g0,
            screen: Screen::new(p),
            active: ActiveSet::new(p),
        }
    }

    /// Installs the initial residual for naive mode. The residual persists
    /// across the whole path (warm starts), so this runs once.
    pub fn set_residual(&mut self, r0: Array1<f64>) {
        if let GaussianGradient::Naive(_) = self.grad {
            self.grad = GaussianGradient::Naive(NaiveState::new(r0));
        }
    }
}

/// Point solve for the Gaussian family at one lambda. The working response
/// is standardized so the null deviance is one and `rsq` accumulates via
/// the incremental identity `delta * (2 g - delta * xv)`.
pub(crate) fn gaussian_point(
    ctx: &FitCtx<'_>,
    work: &mut GaussianWork,
    lambda: f64,
    lambda_prev: f64,
    tol: f64,
    step: usize,
    nlp: &mut usize,
) -> Result<(), PathWarning> {
    let p = ctx.data.n_cols();
    let kernel = CoordinateKernel::new(lambda, ctx.pen.alpha);
    strong_screen(
        &mut work.screen,
        &work.g_screen,
        ctx.pen,
        ctx.ju,
        lambda,
        lambda_prev,
    );

    loop {
        *nlp += 1;
        let mut dlx = 0.0f64;
        for j in 0..p {
            if !work.screen.mask[j] {
                continue;
            }
            let gj = match &work.grad {
                GaussianGradient::Naive(state) => {
                    state.gradient(ctx.data, ctx.std, j, ctx.std.wmean[j], 1.0)
                }
                GaussianGradient::Covariance(state) => state.g[j],
            };
            let aj = work.a[j];
            let (new, delta) = kernel.update(
                aj,
                gj,
                ctx.std.xv[j],
                ctx.pen.vp[j],
                ctx.pen.lower[j],
                ctx.pen.upper[j],
            );
            if delta == 0.0 {
                continue;
            }
            if !work.active.contains(j) {
                if let GaussianGradient::Covariance(state) = &mut work.grad {
                    state.cache_column(ctx.data, ctx.std, ctx.w, j);
                }
                if work.active.register(j, ctx.pmax).is_err() {
                    return Err(PathWarning::EverActiveOverflow { step });
                }
            }
            work.a[j] = new;
            work.rsq += delta * (2.0 * gj - delta * ctx.std.xv[j]);
            match &mut work.grad {
                GaussianGradient::Naive(state) => {
                    state.apply_delta(ctx.data, ctx.std, j, delta, ctx.w)
                }
                GaussianGradient::Covariance(state) => {
                    state.apply_delta(&work.screen.list, j, delta)
                }
            }
            dlx = dlx.max(ctx.std.xv[j] * delta * delta);
        }

        if dlx < tol {
            // Mandatory KKT sweep over the unscreened complement; the strong
            // rule is only a heuristic.
            match &mut work.grad {
                GaussianGradient::Naive(state) => {
                    for j in 0..p {
                        if ctx.ju[j] && !work.screen.mask[j] {
                            work.g_screen[j] =
                                state.gradient(ctx.data, ctx.std, j, ctx.std.wmean[j], 1.0);
                        }
                    }
                }
                GaussianGradient::Covariance(state) => {
                    state.reconcile(&work.a, &work.screen.mask, ctx.ju);
                    work.g_screen.assign(&state.g);
                }
            }
            let mut violated = false;
            for j in 0..p {
                if ctx.ju[j]
                    && !work.screen.mask[j]
                    && work.g_screen[j].abs() > lambda * ctx.pen.alpha * ctx.pen.vp[j]
                {
                    work.screen.admit(j);
                    violated = true;
                }
            }
            if !violated {
                return Ok(());
            }
        }
        if *nlp > ctx.maxit {
            return Err(PathWarning::MaxIterations { step });
        }
    }
}

// ---------------------------------------------------------------------------
// IRLS families (binomial, poisson)
// ---------------------------------------------------------------------------

pub(crate) struct IrlsWork {
    pub a: Array1<f64>,
    pub a0: f64,
    pub dev: f64,
    pub g_screen: Array1<f64>,
    pub screen: Screen,
    pub active: ActiveSet,
    mu: Array1<f64>,
    v: Array1<f64>,
    r: Array1<f64>,
}

impl IrlsWork {
    pub fn new(p: usize, n: usize, a0: f64, null_dev: f64, g0: Array1<f64>) -> Self {
        Self {
            a: Array1::zeros(p),
            a0,
            dev: null_dev,
            g_screen: g0,
            screen: Screen::new(p),
            active: ActiveSet::new(p),
            mu: Array1::zeros(n),
            v: Array1::zeros(n),
            r: Array1::zeros(n),
        }
    }
}

/// Linear predictor at the current coefficients, rebuilt at IRLS boundaries.
fn rebuild_eta(
    ctx: &FitCtx<'_>,
    a: &Array1<f64>,
    a0: f64,
    offset: Option<&Array1<f64>>,
    active: &ActiveSet,
) -> Array1<f64> {
    let n = ctx.data.n_rows();
    let mut eta = match offset {
        Some(off) => off.clone(),
        None => Array1::zeros(n),
    };
    if a0 != 0.0 {
        eta.mapv_inplace(|e| e + a0);
    }
    for &j in active.order() {
        if a[j] != 0.0 {
            ctx.data.add_scaled_col(j, a[j], ctx.std, &mut eta);
        }
    }
    eta
}

/// Working-weight floor below which a binomial fit counts as saturated.
const SATURATION_FLOOR: f64 = 1e-9;

/// Point solve for an IRLS family at one lambda: local quadratic
/// approximation, Gaussian-like inner descent, KKT re-entry on the working
/// gradients once the outer loop stabilizes.
#[allow(clippy::too_many_arguments)]
pub(crate) fn irls_point(
    ctx: &FitCtx<'_>,
    fam: IrlsFamily,
    y: ArrayView1<f64>,
    offset: Option<&Array1<f64>>,
    work: &mut IrlsWork,
    lambda: f64,
    lambda_prev: f64,
    bounded: bool,
    tol_inner: f64,
    tol_outer: f64,
    params: &crate::config::InternalParams,
    step: usize,
    nlp: &mut usize,
) -> Result<(), PathWarning> {
    let p = ctx.data.n_cols();
    let kernel = CoordinateKernel::new(lambda, ctx.pen.alpha);
    strong_screen(
        &mut work.screen,
        &work.g_screen,
        ctx.pen,
        ctx.ju,
        lambda,
        lambda_prev,
    );

    let mut xv = Array1::<f64>::zeros(p);
    for _ in 0..params.mxitnr {
        let eta = rebuild_eta(ctx, &work.a, work.a0, offset, &work.active);
        family::irls_update(
            fam,
            y,
            &eta,
            ctx.w,
            bounded,
            params.pmin,
            params.exmx,
            params.big,
            step,
            &mut work.mu,
            &mut work.v,
            &mut work.r,
        )?;
        let sv: f64 = work.v.sum();
        if sv < SATURATION_FLOOR {
            return Err(PathWarning::Saturated { step });
        }
        let (vx, vxx) = ctx.data.weighted_moments(&work.v);
        for j in 0..p {
            if ctx.ju[j] {
                xv[j] = (vxx[j] - 2.0 * ctx.std.xm[j] * vx[j]
                    + ctx.std.xm[j] * ctx.std.xm[j] * sv)
                    / (ctx.std.xs[j] * ctx.std.xs[j]);
            }
        }

        let mut state = NaiveState::new(work.r.clone());
        loop {
            *nlp += 1;
            let mut dlx = 0.0f64;
            for j in 0..p {
                if !work.screen.mask[j] {
                    continue;
                }
                let gj = state.gradient(ctx.data, ctx.std, j, vx[j], sv);
                let aj = work.a[j];
                let (new, delta) = kernel.update(
                    aj,
                    gj,
                    xv[j],
                    ctx.pen.vp[j],
                    ctx.pen.lower[j],
                    ctx.pen.upper[j],
                );
                if delta == 0.0 {
                    continue;
                }
                if !work.active.contains(j) && work.active.register(j, ctx.pmax).is_err() {
                    return Err(PathWarning::EverActiveOverflow { step });
                }
                work.a[j] = new;
                state.apply_delta(ctx.data, ctx.std, j, delta, &work.v);
                dlx = dlx.max(xv[j] * delta * delta);
            }
            if ctx.intercept {
                let d0 = state.total(sv) / sv;
                if d0 != 0.0 {
                    work.a0 += d0;
                    state.apply_intercept(d0);
                    dlx = dlx.max(sv * d0 * d0);
                }
            }
            if dlx < tol_inner {
                break;
            }
            if *nlp > ctx.maxit {
                return Err(PathWarning::MaxIterations { step });
            }
        }

        let eta_new = rebuild_eta(ctx, &work.a, work.a0, offset, &work.active);
        let mut dex = 0.0f64;
        for i in 0..eta.len() {
            let d = eta_new[i] - eta[i];
            dex = dex.max(work.v[i] * d * d);
        }
        if dex < tol_outer {
            // Refresh the working vectors at the settled predictor before
            // checking optimality and reporting deviance.
            family::irls_update(
                fam,
                y,
                &eta_new,
                ctx.w,
                bounded,
                params.pmin,
                params.exmx,
                params.big,
                step,
                &mut work.mu,
                &mut work.v,
                &mut work.r,
            )?;
            work.dev = family::irls_deviance(fam, y, &work.mu, ctx.w);
            if !work.dev.is_finite() {
                return Err(PathWarning::Saturated { step });
            }
            let sv2: f64 = work.v.sum();
            let (vx2, _) = ctx.data.weighted_moments(&work.v);
            let settled = NaiveState::new(work.r.clone());
            let mut violated = false;
            for j in 0..p {
                if ctx.ju[j] && !work.screen.mask[j] {
                    work.g_screen[j] = settled.gradient(ctx.data, ctx.std, j, vx2[j], sv2);
                    if work.g_screen[j].abs() > lambda * ctx.pen.alpha * ctx.pen.vp[j] {
                        work.screen.admit(j);
                        violated = true;
                    }
                }
            }
            if !violated {
                return Ok(());
            }
            continue;
        }
    }
    Err(PathWarning::MaxIterations { step })
}

// ---------------------------------------------------------------------------
// Multinomial
// ---------------------------------------------------------------------------

pub(crate) struct MultinomialWork {
    /// Coefficients, `p x K`.
    pub a: Array2<f64>,
    pub a0: Array1<f64>,
    pub dev: f64,
    /// Screen scores: per-variable gradient magnitude collapsed over classes
    /// (max-abs when unpenalized per class, L2 norm in grouped mode).
    pub ga: Array1<f64>,
    pub screen: Screen,
    pub active: ActiveSet,
}

impl MultinomialWork {
    pub fn new(p: usize, a0: Array1<f64>, null_dev: f64, ga0: Array1<f64>) -> Self {
        Self {
            a: Array2::zeros((p, a0.len())),
            a0,
            dev: null_dev,
            ga: ga0,
            screen: Screen::new(p),
            active: ActiveSet::new(p),
        }
    }
}

fn class_eta(
    ctx: &FitCtx<'_>,
    work: &MultinomialWork,
    offset: Option<&Array2<f64>>,
    k: usize,
) -> Array1<f64> {
    let n = ctx.data.n_rows();
    let mut eta = match offset {
        Some(off) => off.column(k).to_owned(),
        None => Array1::zeros(n),
    };
    let a0k = work.a0[k];
    if a0k != 0.0 {
        eta.mapv_inplace(|e| e + a0k);
    }
    for &j in work.active.order() {
        let b = work.a[[j, k]];
        if b != 0.0 {
            ctx.data.add_scaled_col(j, b, ctx.std, &mut eta);
        }
    }
    eta
}

fn all_class_eta(
    ctx: &FitCtx<'_>,
    work: &MultinomialWork,
    offset: Option<&Array2<f64>>,
) -> Array2<f64> {
    let n = ctx.data.n_rows();
    let k = work.a0.len();
    let mut eta = Array2::<f64>::zeros((n, k));
    for c in 0..k {
        let col = class_eta(ctx, work, offset, c);
        eta.column_mut(c).assign(&col);
    }
    eta
}

/// Multinomial point solve. Ungrouped mode cycles classes, giving each a
/// working response and a Gaussian-like inner solve; grouped mode applies
/// the vector soft-threshold across the whole coefficient row under the
/// shared quarter-bound curvature.
#[allow(clippy::too_many_arguments)]
pub(crate) fn multinomial_point(
    ctx: &FitCtx<'_>,
    y: &Array2<f64>,
    offset: Option<&Array2<f64>>,
    work: &mut MultinomialWork,
    lambda: f64,
    lambda_prev: f64,
    grouped: bool,
    bounded: bool,
    tol_inner: f64,
    tol_outer: f64,
    params: &crate::config::InternalParams,
    step: usize,
    nlp: &mut usize,
) -> Result<(), PathWarning> {
    let p = ctx.data.n_cols();
    let n = ctx.data.n_rows();
    let nk = work.a0.len();
    let kernel = CoordinateKernel::new(lambda, ctx.pen.alpha);
    strong_screen(
        &mut work.screen,
        &work.ga,
        ctx.pen,
        ctx.ju,
        lambda,
        lambda_prev,
    );

    let mut prob = Array2::<f64>::zeros((n, nk));
    let mut xv = Array1::<f64>::zeros(p);

    for _ in 0..params.mxitnr {
        let eta = all_class_eta(ctx, work, offset);
        family::multinomial_probs(&eta, params.pmin, &mut prob);

        if grouped {
            // Shared upper-bound curvature lets all classes move together.
            let v: Array1<f64> = ctx.w.mapv(|wi| 0.25 * wi);
            let sv: f64 = v.sum();
            let (vx, vxx) = ctx.data.weighted_moments(&v);
            for j in 0..p {
                if ctx.ju[j] {
                    xv[j] = (vxx[j] - 2.0 * ctx.std.xm[j] * vx[j]
                        + ctx.std.xm[j] * ctx.std.xm[j] * sv)
                        / (ctx.std.xs[j] * ctx.std.xs[j]);
                }
            }
            let mut states: Vec<NaiveState> = (0..nk)
                .map(|c| {
                    let r: Array1<f64> =
                        (0..n).map(|i| ctx.w[i] * (y[[i, c]] - prob[[i, c]])).collect();
                    NaiveState::new(r)
                })
                .collect();

            let mut g_row = vec![0.0; nk];
            let mut b_old = vec![0.0; nk];
            let mut b_new = vec![0.0; nk];
            loop {
                *nlp += 1;
                let mut dlx = 0.0f64;
                for j in 0..p {
                    if !work.screen.mask[j] {
                        continue;
                    }
                    for c in 0..nk {
                        g_row[c] = states[c].gradient(ctx.data, ctx.std, j, vx[j], sv);
                        b_old[c] = work.a[[j, c]];
                    }
                    kernel.update_grouped(
                        &b_old,
                        &g_row,
                        xv[j],
                        ctx.pen.vp[j],
                        ctx.pen.lower[j],
                        ctx.pen.upper[j],
                        &mut b_new,
                    );
                    let mut moved = false;
                    for c in 0..nk {
                        let delta = b_new[c] - b_old[c];
                        if delta == 0.0 {
                            continue;
                        }
                        if !moved {
                            moved = true;
                            if !work.active.contains(j)
                                && work.active.register(j, ctx.pmax).is_err()
                            {
                                return Err(PathWarning::EverActiveOverflow { step });
                            }
                        }
                        work.a[[j, c]] = b_new[c];
                        states[c].apply_delta(ctx.data, ctx.std, j, delta, &v);
                        dlx = dlx.max(xv[j] * delta * delta);
                    }
                }
                if ctx.intercept {
                    for c in 0..nk {
                        let d0 = states[c].total(sv) / sv;
                        if d0 != 0.0 {
                            work.a0[c] += d0;
                            states[c].apply_intercept(d0);
                            dlx = dlx.max(sv * d0 * d0);
                        }
                    }
                }
                if dlx < tol_inner {
                    break;
                }
                if *nlp > ctx.maxit {
                    return Err(PathWarning::MaxIterations { step });
                }
            }
        } else {
            for c in 0..nk {
                // Refresh this class's probabilities against the classes
                // already updated in this cycle.
                let eta_c = all_class_eta(ctx, work, offset);
                family::multinomial_probs(&eta_c, params.pmin, &mut prob);
                let mut v = Array1::<f64>::zeros(n);
                let mut r = Array1::<f64>::zeros(n);
                let mut sv = 0.0;
                for i in 0..n {
                    let pc = prob[[i, c]];
                    v[i] = if bounded {
                        0.25 * ctx.w[i]
                    } else {
                        (ctx.w[i] * pc * (1.0 - pc)).max(ctx.w[i] * 1e-12)
                    };
                    sv += v[i];
                    r[i] = ctx.w[i] * (y[[i, c]] - pc);
                }
                if sv < SATURATION_FLOOR {
                    return Err(PathWarning::Saturated { step });
                }
                let (vx, vxx) = ctx.data.weighted_moments(&v);
                for j in 0..p {
                    if ctx.ju[j] {
                        xv[j] = (vxx[j] - 2.0 * ctx.std.xm[j] * vx[j]
                            + ctx.std.xm[j] * ctx.std.xm[j] * sv)
                            / (ctx.std.xs[j] * ctx.std.xs[j]);
                    }
                }
                let mut state = NaiveState::new(r);
                loop {
                    *nlp += 1;
                    let mut dlx = 0.0f64;
                    for j in 0..p {
                        if !work.screen.mask[j] {
                            continue;
                        }
                        let gj = state.gradient(ctx.data, ctx.std, j, vx[j], sv);
                        let aj = work.a[[j, c]];
                        let (new, delta) = kernel.update(
                            aj,
                            gj,
                            xv[j],
                            ctx.pen.vp[j],
                            ctx.pen.lower[j],
                            ctx.pen.upper[j],
                        );
                        if delta == 0.0 {
                            continue;
                        }
                        if !work.active.contains(j)
                            && work.active.register(j, ctx.pmax).is_err()
                        {
                            return Err(PathWarning::EverActiveOverflow { step });
                        }
                        work.a[[j, c]] = new;
                        state.apply_delta(ctx.data, ctx.std, j, delta, &v);
                        dlx = dlx.max(xv[j] * delta * delta);
                    }
                    if ctx.intercept {
                        let d0 = state.total(sv) / sv;
                        if d0 != 0.0 {
                            work.a0[c] += d0;
                            state.apply_intercept(d0);
                            dlx = dlx.max(sv * d0 * d0);
                        }
                    }
                    if dlx < tol_inner {
                        break;
                    }
                    if *nlp > ctx.maxit {
                        return Err(PathWarning::MaxIterations { step });
                    }
                }
            }
        }

        let eta_new = all_class_eta(ctx, work, offset);
        let mut dex = 0.0f64;
        for i in 0..n {
            for c in 0..nk {
                let d = eta_new[[i, c]] - eta[[i, c]];
                dex = dex.max(ctx.w[i] * d * d);
            }
        }
        if dex < tol_outer {
            family::multinomial_probs(&eta_new, params.pmin, &mut prob);
            work.dev = family::multinomial_deviance(y, &prob, ctx.w);
            if !work.dev.is_finite() {
                return Err(PathWarning::Saturated { step });
            }
            // KKT over the unscreened complement on per-class gradients.
            let states: Vec<NaiveState> = (0..nk)
                .map(|c| {
                    let r: Array1<f64> =
                        (0..n).map(|i| ctx.w[i] * (y[[i, c]] - prob[[i, c]])).collect();
                    NaiveState::new(r)
                })
                .collect();
            let mut violated = false;
            for j in 0..p {
                if !ctx.ju[j] || work.screen.mask[j] {
                    continue;
                }
                let mut max_abs = 0.0f64;
                let mut norm_sq = 0.0f64;
                for state in &states {
                    let g = state.gradient(ctx.data, ctx.std, j, 0.0, 0.0);
                    max_abs = max_abs.max(g.abs());
                    norm_sq += g * g;
                }
                work.ga[j] = if grouped { norm_sq.sqrt() } else { max_abs };
                if work.ga[j] > lambda * ctx.pen.alpha * ctx.pen.vp[j] {
                    work.screen.admit(j);
                    violated = true;
                }
            }
            if !violated {
                return Ok(());
            }
            continue;
        }
    }
    Err(PathWarning::MaxIterations { step })
}
