//! Common utilities for the binaries and tests.
//!
//! None of this is needed to use the engine itself. It is organized into three submodules:
//!
//! - **`kernels`**: ready-made [`MatrixSource`](crate::MatrixSource) implementations over
//!   point sets (Gaussian and Matérn kernels) and a dense random SPD test matrix.
//!
//! - **`data_loader`**: reads point sets from plain-text files.
//!
//! - **`perf`**: peak resident memory on Linux and a small timing helper.

pub mod data_loader;
pub mod kernels;
pub mod perf;
