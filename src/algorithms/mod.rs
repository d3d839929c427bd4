//! Low-rank approximation of off-diagonal blocks.
//!
//! Every algorithm in this module satisfies the same contract: given a rectangular block
//! (seen through a [`BlockView`]) it returns factors `U` (`rows x r`) and `V` (`cols x r`)
//! with `block ≈ U Vᵀ`. They differ in how they get there:
//!
//! | Method | Module | Reads the block | Rank |
//! |--------|--------|-----------------|------|
//! | [`LowRankMethod::RookPivoting`] | [`aca`] | row/column at a time | adaptive |
//! | [`LowRankMethod::QueenPivoting`] | [`aca`] | row/column/diagonals at a time | adaptive |
//! | [`LowRankMethod::Svd`] | [`svd`] | dense | adaptive |
//! | [`LowRankMethod::Rrqr`] | [`rrqr`] | dense | adaptive |
//! | [`LowRankMethod::RandomizedSvd`] | [`rsvd`] | dense | fixed |
//!
//! The adaptive methods stop at the smallest rank that meets the relative tolerance; the
//! randomized SVD returns exactly the requested rank.

pub mod aca;
pub mod rrqr;
pub mod rsvd;
pub mod svd;

use crate::{
    error::{HodlrError, HodlrErrorKind},
    matrix::BlockView,
};
use clap::ValueEnum;
use faer::Mat;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// The closed set of compression algorithms.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum LowRankMethod {
    /// Adaptive cross approximation, alternating row/column pivot search.
    RookPivoting,
    /// Adaptive cross approximation searching row, column and both diagonals.
    QueenPivoting,
    /// Truncated singular value decomposition of the dense block.
    Svd,
    /// Truncated QR decomposition with column pivoting of the dense block.
    Rrqr,
    /// Fixed-rank randomized SVD through a Gaussian sketch.
    RandomizedSvd,
}

impl LowRankMethod {
    pub const ALL: [LowRankMethod; 5] = [
        LowRankMethod::RookPivoting,
        LowRankMethod::QueenPivoting,
        LowRankMethod::Svd,
        LowRankMethod::Rrqr,
        LowRankMethod::RandomizedSvd,
    ];

    /// Returns the kebab-case name of the method.
    pub fn name(&self) -> &'static str {
        match self {
            LowRankMethod::RookPivoting => "rook-pivoting",
            LowRankMethod::QueenPivoting => "queen-pivoting",
            LowRankMethod::Svd => "svd",
            LowRankMethod::Rrqr => "rrqr",
            LowRankMethod::RandomizedSvd => "randomized-svd",
        }
    }
}

impl fmt::Display for LowRankMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Accepts both the kebab-case names and the legacy identifiers
/// (`rookPivoting`, `queenPivoting`, `SVD`, `RRQR`, `rSVD`).
impl FromStr for LowRankMethod {
    type Err = HodlrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rook-pivoting" | "rookPivoting" => Ok(LowRankMethod::RookPivoting),
            "queen-pivoting" | "queenPivoting" => Ok(LowRankMethod::QueenPivoting),
            "svd" | "SVD" => Ok(LowRankMethod::Svd),
            "rrqr" | "RRQR" => Ok(LowRankMethod::Rrqr),
            "randomized-svd" | "rSVD" => Ok(LowRankMethod::RandomizedSvd),
            other => Err(HodlrErrorKind::UnknownMethod(other.to_string()).into()),
        }
    }
}

/// When to stop adding rank.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Truncation {
    /// Stop once the relative error estimate drops below the tolerance.
    Tolerance(f64),
    /// Return exactly this many columns.
    Rank(usize),
}

/// A low-rank factorization `U Vᵀ`.
#[derive(Clone, Debug)]
pub struct LowRank {
    pub u: Mat<f64>,
    pub v: Mat<f64>,
}

impl LowRank {
    /// The empty (rank-0) factorization of an `nrows x ncols` block.
    pub fn zero(nrows: usize, ncols: usize) -> Self {
        Self {
            u: Mat::zeros(nrows, 0),
            v: Mat::zeros(ncols, 0),
        }
    }

    #[inline]
    pub fn rank(&self) -> usize {
        self.u.ncols()
    }

    /// Materializes `U Vᵀ`.
    pub fn to_dense(&self) -> Mat<f64> {
        &self.u * self.v.transpose()
    }
}

/// Compresses `block` with `method`.
///
/// `seed` is only read by [`LowRankMethod::RandomizedSvd`].
///
/// # Errors
/// [`HodlrErrorKind::Svd`] if an SVD fails to converge. Passing a [`Truncation::Rank`] to an
/// adaptive method, or a [`Truncation::Tolerance`] to randomized SVD, is a configuration
/// error reported as [`HodlrErrorKind::InvalidRank`] / [`HodlrErrorKind::InvalidTolerance`].
pub fn compress(
    block: &BlockView<'_>,
    method: LowRankMethod,
    truncation: Truncation,
    seed: u64,
) -> Result<LowRank, HodlrError> {
    if block.nrows() == 0 || block.ncols() == 0 {
        return Ok(LowRank::zero(block.nrows(), block.ncols()));
    }
    match (method, truncation) {
        (LowRankMethod::RandomizedSvd, Truncation::Rank(rank)) => {
            rsvd::randomized_svd(block, rank, seed)
        }
        (LowRankMethod::RandomizedSvd, Truncation::Tolerance(tolerance)) => {
            Err(HodlrErrorKind::InvalidTolerance(tolerance).into())
        }
        (_, Truncation::Rank(rank)) => Err(HodlrErrorKind::InvalidRank(rank).into()),
        (LowRankMethod::RookPivoting, Truncation::Tolerance(tolerance)) => {
            let factors = aca::rook_pivoting(block, tolerance);
            recompress(factors, tolerance)
        }
        (LowRankMethod::QueenPivoting, Truncation::Tolerance(tolerance)) => {
            let factors = aca::queen_pivoting(block, tolerance);
            recompress(factors, tolerance)
        }
        (LowRankMethod::Svd, Truncation::Tolerance(tolerance)) => svd::truncated_svd(block, tolerance),
        (LowRankMethod::Rrqr, Truncation::Tolerance(tolerance)) => Ok(rrqr::truncated_rrqr(block, tolerance)),
    }
}

/// Recompresses `U Vᵀ` to the smallest rank meeting `tolerance`.
///
/// Both factors are orthogonalized with a thin QR, `U = Q_u R_u` and `V = Q_v R_v`, and the
/// small core `R_u R_vᵀ` goes through an SVD. The result keeps the leading singular triplets
/// down to `tolerance · σ₀`.
pub fn recompress(factors: LowRank, tolerance: f64) -> Result<LowRank, HodlrError> {
    let rank = factors.rank();
    if rank == 0 {
        return Ok(factors);
    }
    let u_qr = factors.u.qr();
    let q_u = u_qr.compute_thin_Q();
    let r_u = u_qr.thin_R();

    let v_qr = factors.v.qr();
    let q_v = v_qr.compute_thin_Q();
    let r_v = v_qr.thin_R();

    let core = r_u * r_v.transpose();
    let core_svd = core.thin_svd().map_err(HodlrErrorKind::Svd)?;
    let sigma: Vec<f64> = core_svd.S().column_vector().iter().copied().collect();
    let new_rank = svd::singular_value_cutoff(&sigma, tolerance);
    if new_rank >= rank {
        return Ok(factors);
    }

    let scaled = Mat::from_fn(core_svd.U().nrows(), new_rank, |i, j| {
        core_svd.U()[(i, j)] * sigma[j]
    });
    let u = &q_u * &scaled;
    let v = &q_v * core_svd.V().subcols(0, new_rank);
    Ok(LowRank { u, v })
}

#[cfg(test)]
pub(crate) mod test_support {
    use faer::Mat;
    use rand::{Rng, SeedableRng, rngs::StdRng};

    /// A random `nrows x ncols` matrix of exact rank `rank`.
    pub fn random_low_rank(nrows: usize, ncols: usize, rank: usize, seed: u64) -> Mat<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let a = Mat::from_fn(nrows, rank, |_, _| rng.random::<f64>() - 0.5);
        let b = Mat::from_fn(ncols, rank, |_, _| rng.random::<f64>() - 0.5);
        &a * b.transpose()
    }

    /// A smooth kernel block with rapidly decaying singular values.
    pub fn smooth_block(nrows: usize, ncols: usize) -> Mat<f64> {
        Mat::from_fn(nrows, ncols, |i, j| {
            let x = i as f64 / nrows as f64;
            let y = 2.0 + j as f64 / ncols as f64;
            1.0 / (x - y).abs()
        })
    }

    pub fn relative_error(exact: &Mat<f64>, approx: &Mat<f64>) -> f64 {
        (exact - approx).norm_l2() / exact.norm_l2()
    }
}
