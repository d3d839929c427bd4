//! Truncated SVD compression.
//!
//! The block is materialized and decomposed as `A = U Σ Vᵀ` with [`faer`]'s thin SVD. The
//! factorization is cut at the first singular value below `tolerance · σ₀`, which gives the
//! smallest rank with spectral-norm error under `tolerance · ‖A‖₂`.

use super::LowRank;
use crate::{
    error::{HodlrError, HodlrErrorKind},
    matrix::BlockView,
};
use faer::Mat;

/// Number of leading singular values `σ_k ≥ tolerance · σ₀`.
///
/// `sigma` must be sorted in non-increasing order. Returns `0` when `σ₀` is zero.
pub fn singular_value_cutoff(sigma: &[f64], tolerance: f64) -> usize {
    let Some(&leading) = sigma.first() else {
        return 0;
    };
    if leading <= 0.0 {
        return 0;
    }
    let threshold = tolerance * leading;
    sigma
        .iter()
        .position(|&s| s < threshold || s <= 0.0)
        .unwrap_or(sigma.len())
}

/// Compresses `block` with a truncated SVD. `U` carries the singular values.
pub fn truncated_svd(block: &BlockView<'_>, tolerance: f64) -> Result<LowRank, HodlrError> {
    let a = block.dense();
    let svd = a.thin_svd().map_err(HodlrErrorKind::Svd)?;
    let sigma: Vec<f64> = svd.S().column_vector().iter().copied().collect();
    let rank = singular_value_cutoff(&sigma, tolerance);

    let u = Mat::from_fn(a.nrows(), rank, |i, j| svd.U()[(i, j)] * sigma[j]);
    let v = svd.V().subcols(0, rank).to_owned();
    Ok(LowRank { u, v })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::test_support::*;

    #[test]
    fn test_cutoff_stops_at_first_small_value() {
        let sigma = [10.0, 1.0, 0.1, 1e-9, 1e-12];
        assert_eq!(singular_value_cutoff(&sigma, 1e-3), 3);
        assert_eq!(singular_value_cutoff(&sigma, 1e-10), 4);
        assert_eq!(singular_value_cutoff(&sigma, 0.0), 5);
    }

    #[test]
    fn test_cutoff_of_zero_spectrum() {
        assert_eq!(singular_value_cutoff(&[0.0, 0.0], 1e-8), 0);
        assert_eq!(singular_value_cutoff(&[], 1e-8), 0);
    }

    #[test]
    fn test_truncated_svd_meets_tolerance() {
        let a = smooth_block(60, 50);
        let block = BlockView::new(&a, 0, 0, 60, 50);
        let factors = truncated_svd(&block, 1e-9).unwrap();
        assert!(factors.rank() < 20);
        assert!(relative_error(&a, &factors.to_dense()) < 1e-7);
    }
}
