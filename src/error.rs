//! This module defines the custom error types for the library.
//!
//! Every failure the HODLR engine can report surfaces through a single error type,
//! [`HodlrError`], which wraps a [`HodlrErrorKind`]. The kinds fall into four groups:
//!
//! - **Configuration**: bad matrix size, leaf size, tolerance, rank or method name.
//! - **Sequencing**: an operation was called before `assemble`/`factorize`, or a
//!   symmetric-factor operation was requested on a matrix that was not assembled as
//!   symmetric positive-definite.
//! - **Numerical**: a singular leaf block or a loss of positive-definiteness, reported with
//!   the index range of the offending node.
//! - **Dimension mismatch**: an input whose row count disagrees with the matrix size.
//!
//! Using the [`thiserror`] crate allows us to create idiomatic error types with minimal
//! boilerplate. [`faer::linalg::svd::SvdError`] does not implement the standard
//! [`std::error::Error`] trait, so it is wrapped manually.
use thiserror::Error;

/// Represents all possible errors that can occur while assembling, factorizing or
/// applying a HODLR matrix.
#[derive(Error, Debug)]
#[error(transparent)]
pub struct HodlrError(#[from] HodlrErrorKind);

impl HodlrError {
    /// Returns the underlying error kind.
    pub fn kind(&self) -> &HodlrErrorKind {
        &self.0
    }
}

/// The distinct kinds of errors.
#[derive(Error, Debug, PartialEq)]
pub enum HodlrErrorKind {
    /// The matrix dimension must be at least one.
    #[error("Invalid matrix size: {0}. The matrix must have at least one row.")]
    InvalidSize(usize),

    /// The leaf threshold must be at least one.
    #[error("Invalid leaf size: {0}. Leaves must hold at least one row.")]
    InvalidLeafSize(usize),

    /// The compression tolerance must be a finite, non-negative number.
    #[error("Invalid tolerance: {0}. Expected a finite, non-negative value.")]
    InvalidTolerance(f64),

    /// Randomized SVD needs a target rank between one and the matrix size.
    #[error("Invalid target rank for randomized SVD: {0}. The rank must be positive and at most the matrix size.")]
    InvalidRank(usize),

    /// The compression method identifier was not recognised.
    #[error("Unknown low-rank method: '{0}'.")]
    UnknownMethod(String),

    /// The matrix source does not describe an N x N matrix.
    #[error("Matrix source is {rows}x{cols}, but the HODLR matrix was configured for size {size}.")]
    SourceMismatch { size: usize, rows: usize, cols: usize },

    /// An operation that needs an assembled tree was called before `assemble`.
    #[error("The HODLR matrix has not been assembled. Call `assemble` first.")]
    NotAssembled,

    /// An operation that needs a factorization was called before `factorize`.
    #[error("The HODLR matrix has not been factorized. Call `factorize` first.")]
    NotFactorized,

    /// A symmetric-factor operation was requested on a matrix that was not assembled
    /// as symmetric positive-definite.
    #[error(
        "Symmetric factor operations require assembly with `symmetric = true` and `positive_definite = true`."
    )]
    NotSymmetricPositiveDefinite,

    /// A leaf block, or the correction matrix of the node covering the given range, is
    /// singular to working precision.
    #[error("Block at rows {start}..{} is singular to working precision.", .start + .size)]
    SingularBlock { start: usize, size: usize },

    /// Positive-definiteness was lost while factorizing the node covering the given range.
    #[error("Matrix is not positive-definite: factorization failed at rows {start}..{}.", .start + .size)]
    NotPositiveDefinite { start: usize, size: usize },

    /// The input does not have as many rows as the matrix.
    #[error("Dimension mismatch: matrix has {expected} rows but the input has {actual} rows.")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Wraps an error originating from [`faer`]'s SVD module.
    #[error("A numerical error occurred during the SVD of an off-diagonal block: {0:?}")]
    Svd(faer::linalg::svd::SvdError),
}

impl PartialEq for HodlrError {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}
