//! Fixed-rank randomized SVD.
//!
//! Following Halko, Martinsson and Tropp, the range of the block is captured by a Gaussian
//! sketch `Y = A Ω` with `Ω` of size `cols x (k + p)`. An orthonormal basis `Q` of `Y` gives
//! the small matrix `B = Qᵀ A`, whose SVD `B = Û Σ Vᵀ` yields `A ≈ (Q Û Σ) Vᵀ`. The leading
//! `k` triplets are kept.
//!
//! The returned factors always have exactly `k` columns. If the block cannot support rank
//! `k`, the surplus columns are zero.

use super::LowRank;
use crate::{
    error::{HodlrError, HodlrErrorKind},
    matrix::BlockView,
};
use faer::Mat;
use rand::{Rng, SeedableRng, rngs::StdRng};
use rand_distr::StandardNormal;

/// Extra sketch columns beyond the target rank.
pub const OVERSAMPLING: usize = 5;

/// Rank-`rank` approximation of `block` from a Gaussian sketch seeded with `seed`.
pub fn randomized_svd(
    block: &BlockView<'_>,
    rank: usize,
    seed: u64,
) -> Result<LowRank, HodlrError> {
    let a = block.dense();
    let (nrows, ncols) = (a.nrows(), a.ncols());
    let samples = rank.saturating_add(OVERSAMPLING).min(ncols);

    let mut rng = StdRng::seed_from_u64(seed);
    let omega = Mat::from_fn(ncols, samples, |_, _| rng.sample::<f64, _>(StandardNormal));
    let y = &a * &omega;
    let q = y.qr().compute_thin_Q();

    let b = q.transpose() * &a;
    let svd = b.thin_svd().map_err(HodlrErrorKind::Svd)?;
    let sigma: Vec<f64> = svd.S().column_vector().iter().copied().collect();
    let available = rank.min(sigma.len());
    if available < rank {
        log::debug!(
            "randomized SVD: {nrows}x{ncols} block supports rank {available}, padding to {rank}"
        );
    }

    let scaled = Mat::from_fn(svd.U().nrows(), available, |i, j| {
        svd.U()[(i, j)] * sigma[j]
    });
    let mut u = Mat::zeros(nrows, rank);
    let mut v = Mat::zeros(ncols, rank);
    u.subcols_mut(0, available)
        .copy_from((&q * &scaled).as_ref());
    v.subcols_mut(0, available)
        .copy_from(svd.V().subcols(0, available));
    Ok(LowRank { u, v })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::test_support::*;

    #[test]
    fn test_requested_rank_is_returned_exactly() {
        let a = smooth_block(50, 40);
        let block = BlockView::new(&a, 0, 0, 50, 40);
        for rank in [1, 5, 12] {
            let factors = randomized_svd(&block, rank, 3).unwrap();
            assert_eq!(factors.rank(), rank);
            assert_eq!(factors.u.nrows(), 50);
            assert_eq!(factors.v.nrows(), 40);
        }
    }

    #[test]
    fn test_rank_above_block_size_is_padded() {
        let a = random_low_rank(6, 4, 4, 9);
        let block = BlockView::new(&a, 0, 0, 6, 4);
        let factors = randomized_svd(&block, 10, 3).unwrap();
        assert_eq!(factors.rank(), 10);
        assert!(relative_error(&a, &factors.to_dense()) < 1e-10);
    }

    #[test]
    fn test_same_seed_is_deterministic() {
        let a = smooth_block(30, 30);
        let block = BlockView::new(&a, 0, 0, 30, 30);
        let first = randomized_svd(&block, 6, 17).unwrap();
        let second = randomized_svd(&block, 6, 17).unwrap();
        assert_eq!(first.u, second.u);
        assert_eq!(first.v, second.v);
    }

    #[test]
    fn test_sketch_captures_smooth_block() {
        let a = smooth_block(80, 60);
        let block = BlockView::new(&a, 0, 0, 80, 60);
        let factors = randomized_svd(&block, 15, 5).unwrap();
        assert!(relative_error(&a, &factors.to_dense()) < 1e-6);
    }
}
