//! The HODLR engine.
//!
//! [`Hodlr`] owns the partition tree of one matrix and, once [`factorize`](Hodlr::factorize)
//! has run, its factorization. The life cycle is:
//!
//! 1. [`Hodlr::new`] with a [`HodlrConfig`].
//! 2. [`assemble`](Hodlr::assemble) over a [`MatrixSource`]. After this,
//!    [`matmat_product`](Hodlr::matmat_product) is available.
//! 3. [`factorize`](Hodlr::factorize). After this, [`solve`](Hodlr::solve) and the
//!    determinant are available, and, for matrices assembled as symmetric positive-definite,
//!    the symmetric-factor operations.
//!
//! Reassembling discards the factorization; factorizing again replaces it.

use crate::{
    algorithms::LowRankMethod,
    config::HodlrConfig,
    error::{HodlrError, HodlrErrorKind},
    factor::{
        Factorization, SymmetricFactorization, WoodburyFactorization, symmetric::FactorOp,
    },
    matrix::MatrixSource,
    tree::PartitionTree,
};
use faer::{Mat, MatRef};
use std::time::Instant;

/// A hierarchical off-diagonal low-rank matrix.
pub struct Hodlr {
    config: HodlrConfig,
    tree: Option<PartitionTree>,
    positive_definite: bool,
    factorization: Option<Factorization>,
}

impl Hodlr {
    pub fn new(config: HodlrConfig) -> Self {
        Self {
            config,
            tree: None,
            positive_definite: false,
            factorization: None,
        }
    }

    pub fn config(&self) -> &HodlrConfig {
        &self.config
    }

    /// Dimension `N`.
    pub fn size(&self) -> usize {
        self.config.size
    }

    pub fn is_assembled(&self) -> bool {
        self.tree.is_some()
    }

    pub fn is_factorized(&self) -> bool {
        self.factorization.is_some()
    }

    /// Whether the matrix was assembled with both `symmetric` and `positive_definite` set.
    pub fn is_symmetric_positive_definite(&self) -> bool {
        self.positive_definite
    }

    /// Builds the hierarchical representation of `source`.
    ///
    /// With `symmetric` set only the upper off-diagonal blocks are compressed and reused
    /// transposed. `positive_definite` selects the symmetric factorization at
    /// [`factorize`](Self::factorize) time and only takes effect together with `symmetric`.
    ///
    /// # Errors
    ///
    /// Fails on an invalid configuration (zero size or leaf size, unusable tolerance or rank),
    /// if `source` is not `N x N`, or if a block compression fails.
    pub fn assemble(
        &mut self,
        source: &dyn MatrixSource,
        method: LowRankMethod,
        symmetric: bool,
        positive_definite: bool,
    ) -> Result<(), HodlrError> {
        self.tree = None;
        self.factorization = None;
        self.positive_definite = false;

        let truncation = self.config.truncation_for(method)?;
        let size = self.config.size;
        if source.nrows() != size || source.ncols() != size {
            return Err(HodlrErrorKind::SourceMismatch {
                size,
                rows: source.nrows(),
                cols: source.ncols(),
            }
            .into());
        }
        if self.config.leaf_size >= size {
            log::warn!(
                "leaf size {} >= N = {size}: the matrix is stored as a single dense block",
                self.config.leaf_size
            );
        }
        if positive_definite && !symmetric {
            log::warn!("positive_definite has no effect without symmetric; using the general path");
        }

        let start = Instant::now();
        let tree = PartitionTree::assemble(source, &self.config, method, truncation, symmetric)?;
        log::info!(
            "assembled N = {size} with {method} in {:.2?}: {} nodes, depth {}, max rank {}",
            start.elapsed(),
            tree.node_count(),
            tree.depth(),
            tree.max_rank()
        );
        log::debug!("ranks by level: {:?}", tree.ranks_by_level());

        self.tree = Some(tree);
        self.positive_definite = symmetric && positive_definite;
        Ok(())
    }

    fn tree(&self) -> Result<&PartitionTree, HodlrError> {
        self.tree
            .as_ref()
            .ok_or_else(|| HodlrErrorKind::NotAssembled.into())
    }

    fn check_rows(&self, rows: usize) -> Result<(), HodlrError> {
        if rows != self.config.size {
            return Err(HodlrErrorKind::DimensionMismatch {
                expected: self.config.size,
                actual: rows,
            }
            .into());
        }
        Ok(())
    }

    /// Computes `A X` for a dense `N x k` matrix `X`.
    pub fn matmat_product(&self, x: MatRef<'_, f64>) -> Result<Mat<f64>, HodlrError> {
        let tree = self.tree()?;
        self.check_rows(x.nrows())?;
        Ok(tree.apply(x))
    }

    /// Factorizes the assembled matrix, replacing any previous factorization.
    ///
    /// # Errors
    ///
    /// `NotAssembled` before [`assemble`](Self::assemble); `SingularBlock` if a block is
    /// singular to working precision; `NotPositiveDefinite` on the symmetric positive-definite
    /// path if positivity is lost.
    pub fn factorize(&mut self) -> Result<(), HodlrError> {
        self.factorization = None;
        let tree = self.tree()?;
        let parallelism = self.config.parallelism;

        let start = Instant::now();
        let factorization = if self.positive_definite {
            Factorization::Symmetric(SymmetricFactorization::new(tree, parallelism)?)
        } else {
            Factorization::General(WoodburyFactorization::new(tree, parallelism)?)
        };
        log::info!(
            "factorized N = {} ({}) in {:.2?}",
            self.config.size,
            if self.positive_definite { "symmetric" } else { "general" },
            start.elapsed()
        );

        self.factorization = Some(factorization);
        Ok(())
    }

    fn factorization(&self) -> Result<(&PartitionTree, &Factorization), HodlrError> {
        let tree = self.tree()?;
        let factorization = self
            .factorization
            .as_ref()
            .ok_or(HodlrErrorKind::NotFactorized)?;
        Ok((tree, factorization))
    }

    /// Solves `A X = B` for a dense `N x k` right-hand side.
    pub fn solve(&self, b: MatRef<'_, f64>) -> Result<Mat<f64>, HodlrError> {
        let (tree, factorization) = self.factorization()?;
        self.check_rows(b.nrows())?;
        let mut x = b.to_owned();
        match factorization {
            Factorization::General(f) => f.solve_in_place(tree, x.as_mut())?,
            Factorization::Symmetric(f) => f.solve_in_place(tree, x.as_mut())?,
        }
        Ok(x)
    }

    /// Returns `log|det A|`.
    pub fn log_determinant(&self) -> Result<f64, HodlrError> {
        self.sign_log_determinant().map(|(_, log_abs)| log_abs)
    }

    /// Returns `(sign, log|det A|)` with `sign` in `{-1, 1}`.
    pub fn sign_log_determinant(&self) -> Result<(f64, f64), HodlrError> {
        let (_, factorization) = self.factorization()?;
        Ok(match factorization {
            Factorization::General(f) => {
                let det = f.determinant();
                (det.sign, det.log_abs)
            }
            Factorization::Symmetric(f) => (1.0, f.log_determinant()),
        })
    }

    fn symmetric_factor_op(&self, op: FactorOp, x: MatRef<'_, f64>) -> Result<Mat<f64>, HodlrError> {
        let tree = self.tree()?;
        if !self.positive_definite {
            return Err(HodlrErrorKind::NotSymmetricPositiveDefinite.into());
        }
        let (_, factorization) = self.factorization()?;
        let Factorization::Symmetric(factor) = factorization else {
            return Err(HodlrErrorKind::NotSymmetricPositiveDefinite.into());
        };
        self.check_rows(x.nrows())?;
        let mut y = x.to_owned();
        factor.apply_in_place(tree, op, y.as_mut())?;
        Ok(y)
    }

    /// Computes `W Y`, where `A = W Wᵀ` is the symmetric factorization.
    pub fn symmetric_factor_product(&self, y: MatRef<'_, f64>) -> Result<Mat<f64>, HodlrError> {
        self.symmetric_factor_op(FactorOp::Factor, y)
    }

    /// Computes `Wᵀ X`.
    pub fn symmetric_factor_transpose_product(
        &self,
        x: MatRef<'_, f64>,
    ) -> Result<Mat<f64>, HodlrError> {
        self.symmetric_factor_op(FactorOp::Transpose, x)
    }

    /// Computes `W⁻¹ Z`.
    pub fn symmetric_factor_solve(&self, z: MatRef<'_, f64>) -> Result<Mat<f64>, HodlrError> {
        self.symmetric_factor_op(FactorOp::Inverse, z)
    }

    /// Computes `W⁻ᵀ Z`.
    pub fn symmetric_factor_transpose_solve(
        &self,
        z: MatRef<'_, f64>,
    ) -> Result<Mat<f64>, HodlrError> {
        self.symmetric_factor_op(FactorOp::InverseTranspose, z)
    }

    /// Materializes the dense `N x N` symmetric factor `W`.
    ///
    /// This costs as much as a dense factorization and is meant for testing and export.
    pub fn symmetric_factor(&self) -> Result<Mat<f64>, HodlrError> {
        let n = self.config.size;
        self.symmetric_factor_op(FactorOp::Factor, Mat::<f64>::identity(n, n).as_ref())
    }

    /// Materializes the dense matrix represented by the compressed tree.
    pub fn dense(&self) -> Result<Mat<f64>, HodlrError> {
        let n = self.config.size;
        self.matmat_product(Mat::<f64>::identity(n, n).as_ref())
    }

    /// Number of tree nodes.
    pub fn node_count(&self) -> Result<usize, HodlrError> {
        Ok(self.tree()?.node_count())
    }

    /// Number of levels below the root.
    pub fn depth(&self) -> Result<usize, HodlrError> {
        Ok(self.tree()?.depth())
    }

    /// Largest off-diagonal rank in the tree.
    pub fn max_rank(&self) -> Result<usize, HodlrError> {
        Ok(self.tree()?.max_rank())
    }

    /// Largest off-diagonal rank on each level, root first.
    pub fn ranks_by_level(&self) -> Result<Vec<usize>, HodlrError> {
        Ok(self.tree()?.ranks_by_level())
    }
}
