//! Engine configuration.
//!
//! A [`HodlrConfig`] fixes the three numbers that shape a HODLR matrix: its dimension `N`,
//! the leaf threshold `M` below which diagonal blocks are stored densely, and the compression
//! tolerance handed to the low-rank approximators. It also carries the knobs that only some
//! code paths read: an explicit target rank for randomized SVD, the seed for its random
//! sketches, and whether tree levels are processed in parallel.

use crate::algorithms::{LowRankMethod, Truncation};
use crate::error::{HodlrError, HodlrErrorKind};
use serde::{Deserialize, Serialize};

/// Selects how independent nodes on one tree level are processed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Parallelism {
    /// Visit nodes one after another on the calling thread.
    Sequential,
    /// Spread the nodes of each level over the global `rayon` thread pool.
    #[default]
    Rayon,
}

/// Configuration of a HODLR matrix.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HodlrConfig {
    /// Dimension `N` of the (square) matrix.
    pub size: usize,
    /// Largest range size stored as a dense leaf block.
    pub leaf_size: usize,
    /// Relative accuracy requested from the low-rank approximators. For randomized SVD without
    /// an explicit [`rank`](Self::rank) this value is read as the integer target rank.
    pub tolerance: f64,
    /// Explicit target rank for randomized SVD.
    pub rank: Option<usize>,
    /// Seed for the Gaussian sketches drawn by randomized SVD.
    pub seed: u64,
    /// How nodes of a tree level are scheduled.
    pub parallelism: Parallelism,
}

impl HodlrConfig {
    /// Creates a configuration with default seed and parallelism and no explicit rank.
    pub fn new(size: usize, leaf_size: usize, tolerance: f64) -> Self {
        Self {
            size,
            leaf_size,
            tolerance,
            rank: None,
            seed: 42,
            parallelism: Parallelism::default(),
        }
    }

    /// Sets the target rank used by randomized SVD.
    pub fn with_rank(mut self, rank: usize) -> Self {
        self.rank = Some(rank);
        self
    }

    /// Sets the seed for randomized SVD sketches.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Sets the scheduling of per-level tree work.
    pub fn with_parallelism(mut self, parallelism: Parallelism) -> Self {
        self.parallelism = parallelism;
        self
    }

    /// Checks the size parameters and resolves the truncation rule for `method`.
    ///
    /// A leaf size larger than or equal to `size` is accepted: the tree then degenerates to a
    /// single dense block.
    pub(crate) fn truncation_for(&self, method: LowRankMethod) -> Result<Truncation, HodlrError> {
        if self.size == 0 {
            return Err(HodlrErrorKind::InvalidSize(self.size).into());
        }
        if self.leaf_size == 0 {
            return Err(HodlrErrorKind::InvalidLeafSize(self.leaf_size).into());
        }
        match method {
            LowRankMethod::RandomizedSvd => {
                let rank = match self.rank {
                    Some(rank) => rank,
                    None if self.tolerance.is_finite() && self.tolerance >= 0.0 => {
                        self.tolerance.round() as usize
                    }
                    None => return Err(HodlrErrorKind::InvalidTolerance(self.tolerance).into()),
                };
                if rank == 0 || rank > self.size {
                    return Err(HodlrErrorKind::InvalidRank(rank).into());
                }
                Ok(Truncation::Rank(rank))
            }
            _ => {
                if !self.tolerance.is_finite() || self.tolerance < 0.0 {
                    return Err(HodlrErrorKind::InvalidTolerance(self.tolerance).into());
                }
                Ok(Truncation::Tolerance(self.tolerance))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tolerance_methods_use_tolerance() {
        let config = HodlrConfig::new(100, 10, 1e-8);
        assert_eq!(
            config.truncation_for(LowRankMethod::RookPivoting).unwrap(),
            Truncation::Tolerance(1e-8)
        );
    }

    #[test]
    fn test_randomized_svd_reads_tolerance_as_rank() {
        let config = HodlrConfig::new(100, 10, 20.0);
        assert_eq!(
            config.truncation_for(LowRankMethod::RandomizedSvd).unwrap(),
            Truncation::Rank(20)
        );
    }

    #[test]
    fn test_explicit_rank_wins_over_tolerance() {
        let config = HodlrConfig::new(100, 10, 1e-12).with_rank(7);
        assert_eq!(
            config.truncation_for(LowRankMethod::RandomizedSvd).unwrap(),
            Truncation::Rank(7)
        );
    }

    #[test]
    fn test_zero_rank_is_rejected() {
        let config = HodlrConfig::new(100, 10, 1e-12);
        let err = config
            .truncation_for(LowRankMethod::RandomizedSvd)
            .unwrap_err();
        assert_eq!(err.kind(), &HodlrErrorKind::InvalidRank(0));
    }

    #[test]
    fn test_rank_above_matrix_size_is_rejected() {
        let err = HodlrConfig::new(100, 10, 1e13)
            .truncation_for(LowRankMethod::RandomizedSvd)
            .unwrap_err();
        assert!(matches!(err.kind(), HodlrErrorKind::InvalidRank(_)));

        let err = HodlrConfig::new(100, 10, 1e-8)
            .with_rank(101)
            .truncation_for(LowRankMethod::RandomizedSvd)
            .unwrap_err();
        assert_eq!(err.kind(), &HodlrErrorKind::InvalidRank(101));

        let config = HodlrConfig::new(100, 10, 1e-8).with_rank(100);
        assert_eq!(
            config.truncation_for(LowRankMethod::RandomizedSvd).unwrap(),
            Truncation::Rank(100)
        );
    }

    #[test]
    fn test_invalid_sizes_are_rejected() {
        let err = HodlrConfig::new(0, 10, 1e-8)
            .truncation_for(LowRankMethod::Svd)
            .unwrap_err();
        assert_eq!(err.kind(), &HodlrErrorKind::InvalidSize(0));

        let err = HodlrConfig::new(10, 0, 1e-8)
            .truncation_for(LowRankMethod::Svd)
            .unwrap_err();
        assert_eq!(err.kind(), &HodlrErrorKind::InvalidLeafSize(0));

        let err = HodlrConfig::new(10, 5, f64::NAN)
            .truncation_for(LowRankMethod::Rrqr)
            .unwrap_err();
        assert!(matches!(err.kind(), HodlrErrorKind::InvalidTolerance(_)));
    }
}
