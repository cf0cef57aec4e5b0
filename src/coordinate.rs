/// `S(u, t) = sign(u) * max(|u| - t, 0)`.
#[inline]
pub fn soft_threshold(u: f64, t: f64) -> f64 {
    let v = u.abs() - t;
    if v > 0.0 { v.copysign(u) } else { 0.0 }
}

/// Single-coordinate elastic-net update at fixed lambda.
///
/// `l1 = lambda * alpha` and `l2 = lambda * (1 - alpha)`; both are scaled by
/// the coordinate's penalty factor at update time. A zero penalty factor
/// leaves the coordinate unshrunk but still box-clipped.
#[derive(Debug, Clone, Copy)]
pub struct CoordinateKernel {
    pub l1: f64,
    pub l2: f64,
}

impl CoordinateKernel {
    pub fn new(lambda: f64, alpha: f64) -> Self {
        Self {
            l1: lambda * alpha,
            l2: lambda * (1.0 - alpha),
        }
    }

    /// Proposes the new value for one coordinate given its current value,
    /// partial gradient `g`, and curvature `denom`. Returns `(beta_new, delta)`;
    /// a zero delta is a no-op for the caller's gradient state.
    #[inline]
    pub fn update(
        &self,
        beta_old: f64,
        g: f64,
        denom: f64,
        vp: f64,
        lower: f64,
        upper: f64,
    ) -> (f64, f64) {
        let u = g + beta_old * denom;
        let beta = soft_threshold(u, self.l1 * vp) / (denom + self.l2 * vp);
        let beta = beta.clamp(lower, upper);
        (beta, beta - beta_old)
    }

    /// Grouped variant: the whole row `beta_j.` is shrunk by the L2 norm of
    /// its unpenalized update, then each class is box-clipped.
    pub fn update_grouped(
        &self,
        beta_old: &[f64],
        g: &[f64],
        denom: f64,
        vp: f64,
        lower: f64,
        upper: f64,
        beta_new: &mut [f64],
    ) {
        let mut norm_sq = 0.0;
        for (k, &b) in beta_old.iter().enumerate() {
            let u = g[k] + b * denom;
            beta_new[k] = u;
            norm_sq += u * u;
        }
        let norm = norm_sq.sqrt();
        let gain = soft_threshold(norm, self.l1 * vp);
        if gain <= 0.0 {
            beta_new.iter_mut().for_each(|b| *b = 0.0);
            return;
        }
        let scale = gain / (norm * (denom + self.l2 * vp));
        for b in beta_new.iter_mut() {
            *b = (*b * scale).clamp(lower, upper);
        }
    }
}
