//! Rank-revealing QR compression.
//!
//! The block is materialized and factorized with column pivoting, `A P = Q R`. Pivoting keeps
//! `|R[k, k]|` non-increasing, so the rank is the number of leading diagonal entries with
//! `|R[k, k]| ≥ tolerance · |R[0, 0]|`. With `Q_r` the first `r` columns of `Q`, the
//! approximation is the projection `A ≈ Q_r (Q_rᵀ A)`, returned as `U = Q_r`, `V = Aᵀ Q_r`.

use super::LowRank;
use crate::matrix::BlockView;

/// Compresses `block` with a truncated pivoted QR.
pub fn truncated_rrqr(block: &BlockView<'_>, tolerance: f64) -> LowRank {
    let a = block.dense();
    let qr = a.col_piv_qr();
    let r = qr.thin_R();
    let diagonal = r.nrows().min(r.ncols());

    let leading = if diagonal > 0 { r[(0, 0)].abs() } else { 0.0 };
    let rank = if leading > 0.0 {
        (0..diagonal)
            .position(|k| r[(k, k)].abs() < tolerance * leading || r[(k, k)] == 0.0)
            .unwrap_or(diagonal)
    } else {
        0
    };

    let q = qr.compute_thin_Q();
    let u = q.subcols(0, rank).to_owned();
    let v = a.transpose() * &u;
    LowRank { u, v }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::test_support::*;

    #[test]
    fn test_rrqr_meets_tolerance() {
        let a = smooth_block(60, 50);
        let block = BlockView::new(&a, 0, 0, 60, 50);
        let factors = truncated_rrqr(&block, 1e-10);
        assert!(factors.rank() < 25);
        assert!(relative_error(&a, &factors.to_dense()) < 1e-7);
    }

    #[test]
    fn test_rrqr_on_wide_block() {
        let a = random_low_rank(8, 40, 3, 21);
        let block = BlockView::new(&a, 0, 0, 8, 40);
        let factors = truncated_rrqr(&block, 1e-10);
        assert_eq!(factors.rank(), 3);
        assert_eq!(factors.u.nrows(), 8);
        assert_eq!(factors.v.nrows(), 40);
        assert!(relative_error(&a, &factors.to_dense()) < 1e-10);
    }
}
