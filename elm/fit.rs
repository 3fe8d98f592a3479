//! # Closed-Form Output Fitting
//!
//! The output layer is the minimum-norm least-squares solution of
//! `H · W_out ≈ Y`. Two solvers are offered and both select that same
//! solution on rank-deficient input:
//!
//! - `PseudoInverse`: `pinv(H) · Y` with the pseudo-inverse assembled from a
//!   thin divide-and-conquer SVD, dropping singular values at or below
//!   `max(N, k) · ε · σ_max`.
//! - `LeastSquares`: LAPACK's SVD-based least-squares driver (`gelsd`).
//!
//! Wide (`k > N`) and tall (`k < N`) hidden matrices are both valid.

use crate::error::ElmError;
use ndarray::{Array2, ArrayView2, Axis, s};
use ndarray_linalg::{JobSvd, LeastSquaresSvd, SVDDC};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitMethod {
    #[default]
    PseudoInverse,
    /// `gelsd` with its fixed `rcond = -1`, i.e. a cutoff of `ε · σ_max`.
    /// That is tighter than the `max(N, k) · ε · σ_max` used by
    /// `PseudoInverse`: on exactly rank-deficient input both agree, but when
    /// `H` has singular values between the two cutoffs this solver keeps
    /// them and the solutions can differ.
    LeastSquares,
}

/// Moore-Penrose pseudo-inverse of `h`, shape `[k, N]` for `h` of shape `[N, k]`.
pub fn pinv(h: ArrayView2<f64>) -> Result<Array2<f64>, ElmError> {
    let (pinv, _rank) = internal::pinv_with_rank(h)?;
    Ok(pinv)
}

/// Fits `W_out` (shape `[k, 1]`) minimizing `||H · W_out - Y||²`.
pub fn fit(
    h: ArrayView2<f64>,
    y: ArrayView2<f64>,
    method: FitMethod,
) -> Result<Array2<f64>, ElmError> {
    internal::validate(h, y)?;

    let (w_out, rank) = match method {
        FitMethod::PseudoInverse => {
            let (pinv, rank) = internal::pinv_with_rank(h)?;
            (pinv.dot(&y), rank)
        }
        FitMethod::LeastSquares => {
            let result = h.least_squares(&y).map_err(|e| {
                ElmError::unstable("least squares fit", format!("SVD solver failed: {e}"))
            })?;
            let rank = result.rank.max(0) as usize;
            if rank == 0 {
                return Err(ElmError::unstable(
                    "least squares fit",
                    "every singular value of the hidden matrix is negligible",
                ));
            }
            (result.solution, rank)
        }
    };

    let full_rank = h.nrows().min(h.ncols());
    if rank < full_rank {
        log::warn!(
            "Hidden matrix {}x{} is rank deficient (rank {} of {}); using the minimum-norm solution",
            h.nrows(),
            h.ncols(),
            rank,
            full_rank
        );
    }
    if w_out.iter().any(|v| !v.is_finite()) {
        return Err(ElmError::unstable(
            "output fit",
            "the fitted output weights contain NaN or infinite values",
        ));
    }

    log::debug!(
        "Fitted {}x{} output weights with {:?} (rank {})",
        w_out.nrows(),
        w_out.ncols(),
        method,
        rank
    );
    Ok(w_out)
}

mod internal {
    use super::*;

    pub(super) fn validate(h: ArrayView2<f64>, y: ArrayView2<f64>) -> Result<(), ElmError> {
        if h.nrows() != y.nrows() {
            return Err(ElmError::ShapeMismatch {
                operation: "output fit (target rows)",
                expected: h.nrows(),
                found: y.nrows(),
            });
        }
        if y.iter().any(|v| !v.is_finite()) {
            return Err(ElmError::invalid(
                "output fit",
                "the targets contain NaN or infinite values",
            ));
        }
        check_hidden("output fit", h)
    }

    fn check_hidden(operation: &'static str, h: ArrayView2<f64>) -> Result<(), ElmError> {
        let (n, k) = h.dim();
        if n == 0 || k == 0 {
            return Err(ElmError::invalid(
                operation,
                format!("cannot fit against a {n}x{k} hidden matrix"),
            ));
        }
        if h.iter().any(|v| !v.is_finite()) {
            return Err(ElmError::unstable(
                operation,
                format!("the {n}x{k} hidden matrix contains NaN or infinite values"),
            ));
        }
        Ok(())
    }

    pub(super) fn pinv_with_rank(h: ArrayView2<f64>) -> Result<(Array2<f64>, usize), ElmError> {
        check_hidden("pseudo-inverse", h)?;
        let (n, k) = h.dim();

        let (u, sigma, vt) = h.svddc(JobSvd::Some).map_err(|e| {
            ElmError::unstable("pseudo-inverse", format!("SVD failed to converge: {e}"))
        })?;
        let (u, vt) = match (u, vt) {
            (Some(u), Some(vt)) => (u, vt),
            _ => {
                return Err(ElmError::unstable(
                    "pseudo-inverse",
                    "SVD did not return singular vectors",
                ));
            }
        };

        let sigma_max = sigma.iter().copied().fold(0.0_f64, f64::max);
        let cutoff = n.max(k) as f64 * f64::EPSILON * sigma_max;
        let rank = sigma.iter().take_while(|&&sv| sv > cutoff).count();
        if rank == 0 {
            return Err(ElmError::unstable(
                "pseudo-inverse",
                format!("every singular value of the {n}x{k} hidden matrix is negligible"),
            ));
        }

        // pinv = V_r · diag(1/σ_r) · U_rᵀ
        let mut u_r = u.slice(s![.., ..rank]).to_owned();
        for (mut column, &sv) in u_r.axis_iter_mut(Axis(1)).zip(sigma.iter()) {
            column.mapv_inplace(|x| x / sv);
        }
        let v_r = vt.slice(s![..rank, ..]);
        Ok((v_r.t().dot(&u_r.t()), rank))
    }
}
