//! Integration tests for the symmetric factorization `A = W Wᵀ`, the degenerate inputs and
//! the usage-error surface of the engine.

mod common;

use anyhow::{Result, ensure};
use common::{random_matrix, relative_error, to_dense};
use faer::{Mat, linalg::solvers::Solve};
use hodlr::{
    Hodlr, HodlrConfig, HodlrErrorKind, LowRankMethod, Parallelism,
    matrix::ZeroMatrix,
    utils::kernels::{GaussianKernel, MaternKernel, random_spd_matrix},
};

const TOLERANCE: f64 = 1e-10;

fn factorized_gaussian(n: usize, leaf_size: usize, method: LowRankMethod) -> Result<(Hodlr, Mat<f64>)> {
    let kernel = GaussianKernel::random(n, 1, 42);
    let mut hodlr = Hodlr::new(HodlrConfig::new(n, leaf_size, TOLERANCE));
    hodlr.assemble(&kernel, method, true, true)?;
    hodlr.factorize()?;
    Ok((hodlr, to_dense(&kernel)))
}

#[test]
fn test_factor_products_reproduce_matvec() -> Result<()> {
    let n = 500;
    let (hodlr, _) = factorized_gaussian(n, 50, LowRankMethod::RookPivoting)?;
    let x = random_matrix(n, 3, 1);

    let y = hodlr.symmetric_factor_transpose_product(x.as_ref())?;
    let wwt_x = hodlr.symmetric_factor_product(y.as_ref())?;
    let ax = hodlr.matmat_product(x.as_ref())?;
    let error = relative_error(&wwt_x, &ax);
    ensure!(error < n as f64 * TOLERANCE, "W Wᵀ x differs from A x: {error:e}");
    Ok(())
}

#[test]
fn test_explicit_factor_reproduces_matrix() -> Result<()> {
    let n = 300;
    let (hodlr, a) = factorized_gaussian(n, 40, LowRankMethod::Svd)?;
    let w = hodlr.symmetric_factor()?;
    let wwt = &w * w.transpose();

    let error = relative_error(&wwt, &a);
    ensure!(error < n as f64 * TOLERANCE, "W Wᵀ differs from A: {error:e}");
    let error = relative_error(&wwt, &hodlr.dense()?);
    ensure!(error < 1e-12, "W Wᵀ differs from the compressed matrix: {error:e}");
    Ok(())
}

#[test]
fn test_solving_with_explicit_factor_matches_solve() -> Result<()> {
    let n = 300;
    let (hodlr, a) = factorized_gaussian(n, 40, LowRankMethod::QueenPivoting)?;
    let x = random_matrix(n, 1, 2);
    let b = &a * &x;
    let expected = hodlr.solve(b.as_ref())?;

    // A⁻¹ b = W⁻ᵀ (W⁻¹ b), with dense solves against the materialized W.
    let w = hodlr.symmetric_factor()?;
    let z = w.partial_piv_lu().solve(b.as_ref());
    let wt = w.transpose().to_owned();
    let dense = wt.partial_piv_lu().solve(z.as_ref());
    let error = relative_error(&dense, &expected);
    ensure!(error < n as f64 * TOLERANCE, "dense W solves differ: {error:e}");

    // The same through the implicit inverse applications.
    let z = hodlr.symmetric_factor_solve(b.as_ref())?;
    let implicit = hodlr.symmetric_factor_transpose_solve(z.as_ref())?;
    let error = relative_error(&implicit, &expected);
    ensure!(error < 1e-12, "implicit W solves differ: {error:e}");

    let error = relative_error(&expected, &x);
    ensure!(error < n as f64 * TOLERANCE, "solve error too high: {error:e}");
    Ok(())
}

#[test]
fn test_inverse_factor_undoes_factor() -> Result<()> {
    let n = 257;
    let (hodlr, _) = factorized_gaussian(n, 30, LowRankMethod::Rrqr)?;
    let x = random_matrix(n, 2, 3);
    let wx = hodlr.symmetric_factor_product(x.as_ref())?;
    let back = hodlr.symmetric_factor_solve(wx.as_ref())?;
    ensure!(relative_error(&back, &x) < 1e-10);

    let wtx = hodlr.symmetric_factor_transpose_product(x.as_ref())?;
    let back = hodlr.symmetric_factor_transpose_solve(wtx.as_ref())?;
    ensure!(relative_error(&back, &x) < 1e-10);
    Ok(())
}

#[test]
fn test_matern_kernel_with_nugget() -> Result<()> {
    let n = 400;
    let kernel = MaternKernel::random(n, 10.0, 5.0, 9).with_nugget(1.0);
    let mut hodlr = Hodlr::new(HodlrConfig::new(n, 50, 1e-12));
    hodlr.assemble(&kernel, LowRankMethod::RookPivoting, true, true)?;
    hodlr.factorize()?;

    let a = to_dense(&kernel);
    let x = random_matrix(n, 1, 4);
    let b = &a * &x;
    let error = relative_error(&hodlr.matmat_product(x.as_ref())?, &b);
    ensure!(error < n as f64 * 1e-12, "matvec error too high: {error:e}");
    let log_det = hodlr.log_determinant()?;
    let exact = common::dense_cholesky_log_det(&a)?;
    ensure!((log_det - exact).abs() < 1e-6 * exact.abs().max(1.0));
    Ok(())
}

#[test]
fn test_parallel_and_sequential_factorizations_agree() -> Result<()> {
    let n = 400;
    let a = random_spd_matrix(n, 8);
    let b = random_matrix(n, 1, 5);
    let mut solutions = Vec::new();
    for parallelism in [Parallelism::Sequential, Parallelism::Rayon] {
        let config = HodlrConfig::new(n, 32, 1e-8).with_parallelism(parallelism);
        let mut hodlr = Hodlr::new(config);
        hodlr.assemble(&a, LowRankMethod::Svd, true, true)?;
        hodlr.factorize()?;
        solutions.push((hodlr.solve(b.as_ref())?, hodlr.log_determinant()?));
    }
    ensure!(solutions[0].0 == solutions[1].0);
    ensure!(solutions[0].1 == solutions[1].1);
    Ok(())
}

#[test]
fn test_randomized_svd_returns_requested_rank() -> Result<()> {
    let n = 320;
    let kernel = GaussianKernel::random(n, 2, 3);
    for (config, rank) in [
        (HodlrConfig::new(n, 40, 1e-3).with_rank(7), 7),
        (HodlrConfig::new(n, 40, 12.0), 12),
    ] {
        let mut hodlr = Hodlr::new(config);
        hodlr.assemble(&kernel, LowRankMethod::RandomizedSvd, false, false)?;
        let ranks = hodlr.ranks_by_level()?;
        // The last level holds only leaves.
        ensure!(ranks[..ranks.len() - 1].iter().all(|&r| r == rank), "ranks {ranks:?}");
        ensure!(*ranks.last().unwrap_or(&1) == 0);
        ensure!(hodlr.max_rank()? == rank);
    }
    Ok(())
}

#[test]
fn test_zero_source_assembles_with_rank_zero() -> Result<()> {
    let n = 1000;
    let source = ZeroMatrix::new(n);
    let mut hodlr = Hodlr::new(HodlrConfig::new(n, 100, 1e-12));
    hodlr.assemble(&source, LowRankMethod::RookPivoting, false, false)?;
    ensure!(hodlr.max_rank()? == 0);
    ensure!(hodlr.ranks_by_level()?.iter().all(|&r| r == 0));

    let x = random_matrix(n, 1, 6);
    let y = hodlr.matmat_product(x.as_ref())?;
    ensure!(y.norm_l2() == 0.0);

    // The zero matrix is singular; its first leaf is reported.
    let err = hodlr.factorize().unwrap_err();
    ensure!(
        err.kind() == &HodlrErrorKind::SingularBlock { start: 0, size: 63 },
        "unexpected error: {err}"
    );
    Ok(())
}

#[test]
fn test_indefinite_matrix_fails_on_positive_definite_path() -> Result<()> {
    let n = 64;
    let a = Mat::from_fn(n, n, |i, j| {
        if i == j {
            if i == 40 { -3.0 } else { 3.0 }
        } else {
            0.01
        }
    });
    let mut hodlr = Hodlr::new(HodlrConfig::new(n, 16, 1e-10));
    hodlr.assemble(&a, LowRankMethod::Svd, true, true)?;
    let err = hodlr.factorize().unwrap_err();
    ensure!(
        err.kind() == &HodlrErrorKind::NotPositiveDefinite { start: 32, size: 16 },
        "unexpected error: {err}"
    );
    ensure!(!hodlr.is_factorized());

    // The general path handles the same matrix.
    hodlr.assemble(&a, LowRankMethod::Svd, true, false)?;
    hodlr.factorize()?;
    let (sign, _) = hodlr.sign_log_determinant()?;
    ensure!(sign == -1.0);
    Ok(())
}

#[test]
fn test_unknown_method_name() {
    let err = "hmatrix".parse::<LowRankMethod>().unwrap_err();
    assert_eq!(
        err.kind(),
        &HodlrErrorKind::UnknownMethod("hmatrix".to_string())
    );
}

#[test]
fn test_invalid_configuration_is_rejected_at_assembly() {
    let source = ZeroMatrix::new(10);
    let mut hodlr = Hodlr::new(HodlrConfig::new(0, 4, 1e-8));
    let err = hodlr
        .assemble(&source, LowRankMethod::Svd, false, false)
        .unwrap_err();
    assert_eq!(err.kind(), &HodlrErrorKind::InvalidSize(0));

    let mut hodlr = Hodlr::new(HodlrConfig::new(10, 0, 1e-8));
    let err = hodlr
        .assemble(&source, LowRankMethod::Svd, false, false)
        .unwrap_err();
    assert_eq!(err.kind(), &HodlrErrorKind::InvalidLeafSize(0));
}
