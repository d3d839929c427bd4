//! Shared helpers for the integration tests.

#![allow(dead_code)]

use anyhow::{Result, anyhow};
use faer::{Mat, Side};
use hodlr::matrix::FnMatrix;
use rand::{Rng, SeedableRng, rngs::StdRng};

/// `‖a − b‖ / ‖b‖` in the Frobenius norm.
pub fn relative_error(a: &Mat<f64>, b: &Mat<f64>) -> f64 {
    (a - b).norm_l2() / b.norm_l2()
}

/// An `n x k` matrix with entries uniform in `[-0.5, 0.5)`.
pub fn random_matrix(n: usize, k: usize, seed: u64) -> Mat<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    Mat::from_fn(n, k, |_, _| rng.random::<f64>() - 0.5)
}

/// Sign and `log|det a|` from a dense LU decomposition.
pub fn dense_sign_log_det(a: &Mat<f64>) -> (f64, f64) {
    let n = a.nrows();
    let lu = a.partial_piv_lu();
    let u = lu.U();
    let forward = lu.P().arrays().0;

    let mut visited = vec![false; n];
    let mut sign = 1.0;
    for start in 0..n {
        let mut k = start;
        let mut len = 0;
        while !visited[k] {
            visited[k] = true;
            k = forward[k];
            len += 1;
        }
        if len > 0 && len % 2 == 0 {
            sign = -sign;
        }
    }

    let mut log_abs = 0.0;
    for k in 0..n {
        sign *= u[(k, k)].signum();
        log_abs += u[(k, k)].abs().ln();
    }
    (sign, log_abs)
}

/// `log det a` from a dense Cholesky decomposition.
pub fn dense_cholesky_log_det(a: &Mat<f64>) -> Result<f64> {
    let llt = a
        .llt(Side::Lower)
        .map_err(|e| anyhow!("dense Cholesky failed: {e:?}"))?;
    let l = llt.L();
    Ok(2.0 * (0..a.nrows()).map(|k| l[(k, k)].ln()).sum::<f64>())
}

/// A smooth non-symmetric kernel over equispaced points, strictly diagonally dominant.
pub fn skewed_kernel(n: usize) -> FnMatrix<impl Fn(usize, usize) -> f64 + Sync> {
    FnMatrix::new(n, move |i, j| {
        if i == j {
            return 50.0;
        }
        let x = i as f64 / n as f64;
        let y = j as f64 / n as f64;
        let r = x - y;
        0.02 * ((-4.0 * r * r).exp() * (1.0 + 0.5 * r) + 0.2 * (-(r - 0.1).powi(2)).exp())
    })
}

/// Dense copy of a square source.
pub fn to_dense(source: &dyn hodlr::MatrixSource) -> Mat<f64> {
    source.block(0, 0, source.nrows(), source.ncols())
}
