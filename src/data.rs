use faer::sparse::SparseColMat;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

use crate::errors::ElnetError;

/// Uniform column-addressable view of the design matrix, dense or
/// compressed-sparse-column. Read-only; created once per fit.
#[derive(Clone)]
pub enum DataView {
    Dense(Array2<f64>),
    Sparse(SparseColMat<usize, f64>),
}

/// Borrowed single column. Sparse columns expose only their stored rows;
/// centering is applied algebraically by the callers.
pub enum ColumnRef<'a> {
    Dense(ArrayView1<'a, f64>),
    Sparse {
        rows: &'a [usize],
        values: &'a [f64],
    },
}

impl DataView {
    pub fn n_rows(&self) -> usize {
        match self {
            Self::Dense(x) => x.nrows(),
            Self::Sparse(x) => x.nrows(),
        }
    }

    pub fn n_cols(&self) -> usize {
        match self {
            Self::Dense(x) => x.ncols(),
            Self::Sparse(x) => x.ncols(),
        }
    }

    pub fn is_dense(&self) -> bool {
        matches!(self, Self::Dense(_))
    }

    pub fn column(&self, j: usize) -> ColumnRef<'_> {
        match self {
            Self::Dense(x) => ColumnRef::Dense(x.column(j)),
            Self::Sparse(x) => {
                let (symbolic, values) = x.parts();
                let col_ptr = symbolic.col_ptr();
                let row_idx = symbolic.row_idx();
                let start = col_ptr[j];
                let end = col_ptr[j + 1];
                ColumnRef::Sparse {
                    rows: &row_idx[start..end],
                    values: &values[start..end],
                }
            }
        }
    }

    /// Raw column dot `<x_j, v>` over stored entries.
    pub fn dot_col(&self, j: usize, v: &Array1<f64>) -> f64 {
        match self.column(j) {
            ColumnRef::Dense(col) => col.dot(v),
            ColumnRef::Sparse { rows, values } => rows
                .iter()
                .zip(values)
                .map(|(&i, &x)| x * v[i])
                .sum(),
        }
    }

    /// Per-column weighted sums `(sum_i v_i x_ij, sum_i v_i x_ij^2)` for all
    /// columns in one sweep.
    pub fn weighted_moments(&self, v: &Array1<f64>) -> (Array1<f64>, Array1<f64>) {
        let p = self.n_cols();
        let mut vx = Array1::<f64>::zeros(p);
        let mut vxx = Array1::<f64>::zeros(p);
        for j in 0..p {
            let (a, b) = self.col_weighted_sums(j, v);
            vx[j] = a;
            vxx[j] = b;
        }
        (vx, vxx)
    }

    /// Weighted sums `(sum_i v_i x_ij, sum_i v_i x_ij^2)` for one column.
    pub fn col_weighted_sums(&self, j: usize, v: &Array1<f64>) -> (f64, f64) {
        let mut s = 0.0;
        let mut sq = 0.0;
        match self.column(j) {
            ColumnRef::Dense(col) => {
                for (i, &x) in col.iter().enumerate() {
                    s += v[i] * x;
                    sq += v[i] * x * x;
                }
            }
            ColumnRef::Sparse { rows, values } => {
                for (&i, &x) in rows.iter().zip(values) {
                    s += v[i] * x;
                    sq += v[i] * x * x;
                }
            }
        }
        (s, sq)
    }

    /// Raw Gram column `S[l] = sum_i v_i x_il x_ij` against every column `l`.
    /// Used by the covariance bookkeeping when a variable first activates.
    pub fn gram_col(&self, j: usize, v: &Array1<f64>) -> Array1<f64> {
        let mut t = Array1::<f64>::zeros(self.n_rows());
        match self.column(j) {
            ColumnRef::Dense(col) => {
                for (i, &x) in col.iter().enumerate() {
                    t[i] = v[i] * x;
                }
            }
            ColumnRef::Sparse { rows, values } => {
                for (&i, &x) in rows.iter().zip(values) {
                    t[i] = v[i] * x;
                }
            }
        }
        let p = self.n_cols();
        let mut out = Array1::<f64>::zeros(p);
        for l in 0..p {
            out[l] = self.dot_col(l, &t);
        }
        out
    }

    /// Accumulates `coef * x_std_j` into `eta`, with standardization applied.
    pub fn add_scaled_col(&self, j: usize, coef: f64, std: &Standardization, eta: &mut Array1<f64>) {
        let scale = coef / std.xs[j];
        let shift = coef * std.xm[j] / std.xs[j];
        match self.column(j) {
            ColumnRef::Dense(col) => {
                for (i, &x) in col.iter().enumerate() {
                    eta[i] += scale * x - shift;
                }
            }
            ColumnRef::Sparse { rows, values } => {
                if shift != 0.0 {
                    eta.mapv_inplace(|e| e - shift);
                }
                for (&i, &x) in rows.iter().zip(values) {
                    eta[i] += scale * x;
                }
            }
        }
    }

    /// Fails fast on the first non-finite entry.
    pub fn validate_finite(&self) -> Result<(), ElnetError> {
        for j in 0..self.n_cols() {
            let bad = match self.column(j) {
                ColumnRef::Dense(col) => col.iter().any(|x| !x.is_finite()),
                ColumnRef::Sparse { values, .. } => values.iter().any(|x| !x.is_finite()),
            };
            if bad {
                return Err(ElnetError::NonFiniteDesign { column: j });
            }
        }
        Ok(())
    }
}

impl From<Array2<f64>> for DataView {
    fn from(value: Array2<f64>) -> Self {
        Self::Dense(value)
    }
}

impl<'a> From<ArrayView2<'a, f64>> for DataView {
    fn from(value: ArrayView2<'a, f64>) -> Self {
        Self::Dense(value.to_owned())
    }
}

impl From<SparseColMat<usize, f64>> for DataView {
    fn from(value: SparseColMat<usize, f64>) -> Self {
        Self::Sparse(value)
    }
}

/// Per-column centering/scale caches plus the fixed Gaussian denominators.
///
/// `xm`/`xs` define the standardized column `(x_j - xm_j) / xs_j` the solver
/// conceptually operates on; sparse columns are never materialized in that
/// form. `xv` is `sum_i w_i x_std_ij^2` under the base weights. All moments
/// use `1/n`-style weighted averages with the weights normalized to sum one.
#[derive(Debug, Clone)]
pub struct Standardization {
    pub xm: Array1<f64>,
    pub xs: Array1<f64>,
    pub xv: Array1<f64>,
    /// Raw weighted column means under the base weights, kept for the sparse
    /// residual bookkeeping.
    pub wmean: Array1<f64>,
}

const VAR_TOL: f64 = 1e-12;

/// Computes the standardization caches and folds zero-variance columns into
/// the screening mask. Columns are centered only when an intercept is fit;
/// without an intercept the scale is still the centered standard deviation,
/// with the uncentered second moment kept in the denominator term.
pub(crate) fn standardize(
    data: &DataView,
    w: &Array1<f64>,
    standardize_flag: bool,
    intercept: bool,
    alpha: f64,
    ju: &mut [bool],
) -> Result<Standardization, ElnetError> {
    let p = data.n_cols();
    let mut xm = Array1::<f64>::zeros(p);
    let mut xs = Array1::<f64>::ones(p);
    let mut xv = Array1::<f64>::ones(p);
    let mut wmean = Array1::<f64>::zeros(p);

    for j in 0..p {
        if !ju[j] {
            continue;
        }
        let (m, q) = data.col_weighted_sums(j, w);
        wmean[j] = m;
        let var = q - m * m;
        if var <= VAR_TOL * q.abs().max(1.0) {
            // Constant column. A pure-lasso update has a vanishing
            // denominator here, which the caller cannot recover from.
            if alpha == 1.0 {
                return Err(ElnetError::ZeroVariance { column: j });
            }
            log::debug!("freezing zero-variance column {j}");
            ju[j] = false;
            continue;
        }
        if intercept {
            xm[j] = m;
            if standardize_flag {
                xs[j] = var.sqrt();
                xv[j] = 1.0;
            } else {
                xv[j] = var;
            }
        } else if standardize_flag {
            xs[j] = var.sqrt();
            xv[j] = 1.0 + m * m / var;
        } else {
            xv[j] = q;
        }
    }

    if !ju.iter().any(|&keep| keep) {
        return Err(ElnetError::NothingToFit);
    }

    Ok(Standardization { xm, xs, xv, wmean })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use faer::sparse::Triplet;
    use ndarray::array;

    fn small_dense() -> DataView {
        DataView::from(array![[1.0, 0.0], [2.0, 3.0], [3.0, 0.0], [4.0, 1.0]])
    }

    fn small_sparse() -> DataView {
        let triplets = vec![
            Triplet::new(0, 0, 1.0),
            Triplet::new(1, 0, 2.0),
            Triplet::new(2, 0, 3.0),
            Triplet::new(3, 0, 4.0),
            Triplet::new(1, 1, 3.0),
            Triplet::new(3, 1, 1.0),
        ];
        DataView::from(SparseColMat::try_new_from_triplets(4, 2, &triplets).unwrap())
    }

    #[test]
    fn sparse_and_dense_moments_agree() {
        let w = Array1::from_elem(4, 0.25);
        let (vx_d, vxx_d) = small_dense().weighted_moments(&w);
        let (vx_s, vxx_s) = small_sparse().weighted_moments(&w);
        for j in 0..2 {
            assert_abs_diff_eq!(vx_d[j], vx_s[j], epsilon = 1e-14);
            assert_abs_diff_eq!(vxx_d[j], vxx_s[j], epsilon = 1e-14);
        }
    }

    #[test]
    fn gram_columns_match_explicit_products() {
        let data = small_dense();
        let w = Array1::from_elem(4, 0.25);
        let s = data.gram_col(1, &w);
        // S[0] = sum w_i x_i0 x_i1 = 0.25 * (2*3 + 4*1)
        assert_abs_diff_eq!(s[0], 2.5, epsilon = 1e-14);
        assert_abs_diff_eq!(s[1], 0.25 * (9.0 + 1.0), epsilon = 1e-14);
    }

    #[test]
    fn zero_variance_is_fatal_under_pure_lasso() {
        let data = DataView::from(array![[1.0, 1.0], [2.0, 1.0], [3.0, 1.0]]);
        let w = Array1::from_elem(3, 1.0 / 3.0);
        let mut ju = vec![true, true];
        let err = standardize(&data, &w, true, false, 1.0, &mut ju).unwrap_err();
        assert_eq!(err, ElnetError::ZeroVariance { column: 1 });
    }

    #[test]
    fn zero_variance_is_frozen_when_ridge_is_present() {
        let data = DataView::from(array![[1.0, 1.0], [2.0, 1.0], [3.0, 1.0]]);
        let w = Array1::from_elem(3, 1.0 / 3.0);
        let mut ju = vec![true, true];
        let std = standardize(&data, &w, true, true, 0.5, &mut ju).unwrap();
        assert!(!ju[1]);
        assert_abs_diff_eq!(std.xv[0], 1.0, epsilon = 1e-14);
    }

    #[test]
    fn add_scaled_col_centers_sparse_columns() {
        let dense = small_dense();
        let sparse = small_sparse();
        let w = Array1::from_elem(4, 0.25);
        let mut ju = vec![true, true];
        let std_d = standardize(&dense, &w, true, true, 1.0, &mut ju.clone()).unwrap();
        let std_s = standardize(&sparse, &w, true, true, 1.0, &mut ju).unwrap();
        let mut eta_d = Array1::<f64>::zeros(4);
        let mut eta_s = Array1::<f64>::zeros(4);
        dense.add_scaled_col(1, 0.7, &std_d, &mut eta_d);
        sparse.add_scaled_col(1, 0.7, &std_s, &mut eta_s);
        for i in 0..4 {
            assert_abs_diff_eq!(eta_d[i], eta_s[i], epsilon = 1e-12);
        }
        // Standardized columns have zero weighted mean.
        let mean: f64 = (0..4).map(|i| 0.25 * eta_d[i]).sum();
        assert_abs_diff_eq!(mean, 0.0, epsilon = 1e-12);
    }
}
