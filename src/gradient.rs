use ndarray::Array1;

use crate::data::{ColumnRef, DataView, Standardization};

/// Running partial-residual bookkeeping, the "naive" gradient shape.
///
/// Stores the working-weighted residual in a deficit form: the true residual
/// is `r_i + shift * v_i`, where `shift` accumulates the centering part of
/// sparse column updates and absorbed intercept steps. Coordinate updates
/// touch only a column's stored rows; gradients fold the correction back in
/// algebraically.
#[derive(Debug, Clone)]
pub(crate) struct NaiveState {
    r: Array1<f64>,
    rsum: f64,
    shift: f64,
}

impl NaiveState {
    /// `r` must be the working-weighted residual `v .* (z - eta)` at the
    /// current coefficients.
    pub fn new(r: Array1<f64>) -> Self {
        let rsum = r.sum();
        Self {
            r,
            rsum,
            shift: 0.0,
        }
    }

    /// Partial gradient for standardized coordinate `j`. `vx_j` is
    /// `sum_i v_i x_ij` under the current working weights and `sv` their sum.
    pub fn gradient(
        &self,
        data: &DataView,
        std: &Standardization,
        j: usize,
        vx_j: f64,
        sv: f64,
    ) -> f64 {
        let raw = data.dot_col(j, &self.r);
        (raw + self.shift * vx_j - std.xm[j] * (self.rsum + self.shift * sv)) / std.xs[j]
    }

    /// Applies a coefficient step `delta` on coordinate `j`: the linear
    /// predictor gains `delta * x_std_j`, so the weighted residual loses
    /// `delta * v .* x_std_j`. The uncentered part is applied to stored rows;
    /// the centering part goes into `shift`.
    pub fn apply_delta(
        &mut self,
        data: &DataView,
        std: &Standardization,
        j: usize,
        delta: f64,
        v: &Array1<f64>,
    ) {
        let scale = delta / std.xs[j];
        let mut removed = 0.0;
        match data.column(j) {
            ColumnRef::Dense(col) => {
                for (i, &x) in col.iter().enumerate() {
                    let d = scale * v[i] * x;
                    self.r[i] -= d;
                    removed += d;
                }
            }
            ColumnRef::Sparse { rows, values } => {
                for (&i, &x) in rows.iter().zip(values) {
                    let d = scale * v[i] * x;
                    self.r[i] -= d;
                    removed += d;
                }
            }
        }
        self.rsum -= removed;
        self.shift += delta * std.xm[j] / std.xs[j];
    }

    /// Total residual sum `sum_i (r_i + shift * v_i)`.
    pub fn total(&self, sv: f64) -> f64 {
        self.rsum + self.shift * sv
    }

    /// An intercept step `eta += d0` folds entirely into the shift.
    pub fn apply_intercept(&mut self, d0: f64) {
        self.shift -= d0;
    }
}

/// Covariance-mode gradient bookkeeping for the Gaussian family.
///
/// Keeps the full gradient vector `g = X_std' r` current for screened
/// coordinates via cached Gram columns, and reconciles the rest from
/// accumulated coefficient deltas once per point-solve, right before the
/// KKT scan. Gram columns are materialized the first time a coordinate
/// activates and cached for the remainder of the path.
#[derive(Debug, Clone)]
pub(crate) struct CovarianceState {
    pub g: Array1<f64>,
    gram: Vec<Array1<f64>>,
    slot: Vec<Option<usize>>,
    vars: Vec<usize>,
    snapshot: Vec<f64>,
}

impl CovarianceState {
    pub fn new(g0: Array1<f64>) -> Self {
        let p = g0.len();
        Self {
            g: g0,
            gram: Vec::new(),
            slot: vec![None; p],
            vars: Vec::new(),
            snapshot: Vec::new(),
        }
    }

    pub fn is_cached(&self, j: usize) -> bool {
        self.slot[j].is_some()
    }

    /// Materializes the standardized, weight-carrying Gram column for `j`.
    pub fn cache_column(
        &mut self,
        data: &DataView,
        std: &Standardization,
        w: &Array1<f64>,
        j: usize,
    ) {
        if self.slot[j].is_some() {
            return;
        }
        let p = data.n_cols();
        let s = data.gram_col(j, w);
        let mut c = Array1::<f64>::zeros(p);
        for l in 0..p {
            c[l] = (s[l] - std.xm[l] * std.wmean[j] - std.xm[j] * std.wmean[l]
                + std.xm[l] * std.xm[j])
                / (std.xs[l] * std.xs[j]);
        }
        self.slot[j] = Some(self.gram.len());
        self.gram.push(c);
        self.vars.push(j);
        self.snapshot.push(0.0);
    }

    /// Propagates a coordinate step to the gradients of the screened set.
    pub fn apply_delta(&mut self, screened: &[usize], j: usize, delta: f64) {
        let s = self.slot[j].expect("gram column cached before first update");
        let c = &self.gram[s];
        for &l in screened {
            self.g[l] -= c[l] * delta;
        }
    }

    /// Brings gradients outside the screened set current using the
    /// per-variable deltas accumulated since the previous reconcile.
    pub fn reconcile(&mut self, a: &Array1<f64>, screened: &[bool], ju: &[bool]) {
        let da: Vec<f64> = self
            .vars
            .iter()
            .zip(&self.snapshot)
            .map(|(&k, &prev)| a[k] - prev)
            .collect();
        if da.iter().any(|&d| d != 0.0) {
            for l in 0..self.g.len() {
                if screened[l] || !ju[l] {
                    continue;
                }
                let mut acc = 0.0;
                for (s, &d) in da.iter().enumerate() {
                    if d != 0.0 {
                        acc += self.gram[s][l] * d;
                    }
                }
                self.g[l] -= acc;
            }
        }
        for (s, &k) in self.vars.iter().enumerate() {
            self.snapshot[s] = a[k];
        }
    }
}
