//! Hierarchical off-diagonal low-rank (HODLR) matrices.
//!
//! This crate compresses dense matrices whose off-diagonal blocks are numerically low-rank,
//! typically kernel matrices `A[i, j] = k(x_i, x_j)` over a spatially sorted point set, and
//! operates on the compressed form directly. Storage drops from O(N²) to roughly O(N r log N)
//! and products, factorization, solves and determinants run in near-linear time.
//!
//! Built on the [`faer`] linear algebra framework. The matrix itself is never required in
//! dense form: entries are requested on demand through the [`MatrixSource`] trait.
//!
//! ## Structure
//!
//! The index range `[0, N)` is split recursively into two halves until a range holds at most
//! `leaf_size` indices. Each leaf stores its dense diagonal block; each internal node stores
//! the low-rank factors of the two off-diagonal blocks coupling its children:
//!
//! ```text
//! A = [ A_L      U₀V₀ᵀ ]
//!     [ U₁V₁ᵀ    A_R   ]
//! ```
//!
//! ## Compression
//!
//! Off-diagonal blocks are compressed with one of five interchangeable algorithms (see
//! [`algorithms`]): adaptive cross approximation with rook or queen pivoting, truncated SVD,
//! rank-revealing QR, or fixed-rank randomized SVD.
//!
//! ## Factorization
//!
//! **General path** ([`factor::woodbury`]): leaves are LU-factorized and every internal node
//! folds its coupling into its children's factorization through the Woodbury identity. The
//! correction matrix is as large as the coupling rank, not the node's range.
//!
//! **Symmetric positive-definite path** ([`factor::symmetric`]): builds an implicit factor `W`
//! with `A = W Wᵀ`. It can be applied, transposed and inverted without being formed, which
//! gives solves, determinants, and samples `W z` from a Gaussian process with covariance `A`.
//!
//! ## Example Usage
//!
//! ```rust
//! use faer::Mat;
//! use hodlr::{Hodlr, HodlrConfig, LowRankMethod, matrix::FnMatrix};
//!
//! let n = 200;
//! let source = FnMatrix::new(n, |i, j| {
//!     let d = (i as f64 - j as f64) / n as f64;
//!     (-d * d).exp() + if i == j { 1.0 } else { 0.0 }
//! });
//!
//! let mut hodlr = Hodlr::new(HodlrConfig::new(n, 25, 1e-12));
//! hodlr.assemble(&source, LowRankMethod::RookPivoting, true, true).unwrap();
//! hodlr.factorize().unwrap();
//!
//! let b = Mat::from_fn(n, 1, |i, _| (i % 7) as f64);
//! let x = hodlr.solve(b.as_ref()).unwrap();
//! let residual = hodlr.matmat_product(x.as_ref()).unwrap() - &b;
//! assert!(residual.norm_l2() < 1e-8 * b.norm_l2());
//!
//! // A = W Wᵀ
//! let w = hodlr.symmetric_factor().unwrap();
//! let a = hodlr.dense().unwrap();
//! assert!((&w * w.transpose() - &a).norm_l2() < 1e-8 * a.norm_l2());
//! ```
//!
//! ## Parallelism
//!
//! Assembly compresses all blocks independently and factorization processes each tree level
//! as one batch; both run on the global [`rayon`] pool unless
//! [`Parallelism::Sequential`] is configured. Results do not depend on the choice.

pub mod algorithms;
pub mod config;
pub mod error;
pub mod factor;
pub mod hodlr;
pub mod matrix;
pub mod tree;
pub mod utils;

pub use algorithms::LowRankMethod;
pub use config::{HodlrConfig, Parallelism};
pub use error::{HodlrError, HodlrErrorKind};
pub use hodlr::Hodlr;
pub use matrix::MatrixSource;
