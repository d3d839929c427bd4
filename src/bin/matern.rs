//! Single-run driver over a Matérn covariance matrix.
//!
//! Builds a Matérn (ν = 5/2) kernel over sorted random points in `[-1, 1]` (or over points
//! read from a file), then runs one full cycle: assembly, matrix-vector product,
//! factorization, solve, symmetric-factor products and log-determinant. Each stage is timed
//! and logged. With `--check`, the results are compared against a dense factorization, which
//! costs O(N³) and is only sensible for moderate `N`.
//!
//! With `--output`, a single CSV row with the timings and errors is written.

use anyhow::{Context, Result, anyhow, ensure};
use clap::Parser;
use faer::{Mat, Side};
use hodlr::{
    Hodlr, HodlrConfig, LowRankMethod, MatrixSource,
    utils::{
        data_loader::load_points,
        kernels::{MaternKernel, sort_by_first_coordinate},
        perf::{get_peak_rss_kb, timed},
    },
};
use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::Serialize;
use std::path::PathBuf;

/// Command-line arguments.
#[derive(Parser, Debug)]
#[clap(
    name = "matern",
    about = "Assembles, factorizes and solves a Matérn covariance matrix in HODLR form."
)]
struct Args {
    /// Matrix size N (ignored when --points is given).
    #[clap(long, default_value_t = 10_000)]
    size: usize,
    /// Largest diagonal block stored densely.
    #[clap(long, default_value_t = 200)]
    leaf_size: usize,
    /// Compression tolerance is 10^(-tolerance_exponent).
    #[clap(long, default_value_t = 12)]
    tolerance_exponent: i32,
    /// Low-rank compression method.
    #[clap(long, value_enum, default_value_t = LowRankMethod::RookPivoting)]
    method: LowRankMethod,
    /// Target rank for randomized SVD.
    #[clap(long)]
    rank: Option<usize>,
    /// Standard deviation σ of the kernel.
    #[clap(long, default_value_t = 10.0)]
    sigma: f64,
    /// Length scale ρ of the kernel.
    #[clap(long, default_value_t = 5.0)]
    rho: f64,
    /// Added to the diagonal to keep the matrix well conditioned.
    #[clap(long, default_value_t = 1.0)]
    nugget: f64,
    /// Treat the matrix as non-symmetric (general factorization path).
    #[clap(long)]
    general: bool,
    /// Point file, one point per line.
    #[clap(long, value_name = "PATH")]
    points: Option<PathBuf>,
    /// Seed for the random points and the test vector.
    #[clap(long, default_value_t = 42)]
    seed: u64,
    /// Compare against a dense factorization.
    #[clap(long)]
    check: bool,
    /// Path to an output CSV file for the result row.
    #[clap(long, value_name = "PATH")]
    output: Option<PathBuf>,
}

/// One row of the output CSV.
#[derive(Debug, Serialize)]
struct RunResult {
    method: LowRankMethod,
    n: usize,
    leaf_size: usize,
    tolerance: f64,
    symmetric: bool,
    max_rank: usize,
    assemble_s: f64,
    matvec_s: f64,
    factorize_s: f64,
    solve_s: f64,
    log_det: f64,
    matvec_error: Option<f64>,
    solve_error: Option<f64>,
    log_det_error: Option<f64>,
    rss_kb: u64,
}

fn main() -> Result<()> {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .try_init()
        .map_err(|e| anyhow!("Failed to initialize logger: {}", e))?;

    let args = Args::parse();
    let kernel = match &args.points {
        Some(path) => {
            let points = load_points(path)
                .with_context(|| format!("Failed to load points from {path:?}"))?;
            MaternKernel::new(sort_by_first_coordinate(&points), args.sigma, args.rho)
        }
        None => MaternKernel::random(args.size, args.sigma, args.rho, args.seed),
    }
    .with_nugget(args.nugget);
    let n = kernel.nrows();
    ensure!(n > 0, "The problem has no points.");

    let tolerance = 10f64.powi(-args.tolerance_exponent);
    let symmetric = !args.general;
    let mut config = HodlrConfig::new(n, args.leaf_size, tolerance).with_seed(args.seed);
    if let Some(rank) = args.rank {
        config = config.with_rank(rank);
    }
    log::info!(
        "N = {n}, leaf size = {}, tolerance = {tolerance:e}, method = {}",
        args.leaf_size,
        args.method
    );

    let mut hodlr = Hodlr::new(config);
    let (assembled, assemble_time) =
        timed(|| hodlr.assemble(&kernel, args.method, symmetric, symmetric));
    assembled.context("Assembly failed")?;
    log::info!("Time for assembly in HODLR form: {assemble_time:.3?}");

    let mut rng = StdRng::seed_from_u64(args.seed.wrapping_add(1));
    let x = Mat::from_fn(n, 1, |_, _| rng.random::<f64>() - 0.5);
    let (b, matvec_time) = timed(|| hodlr.matmat_product(x.as_ref()));
    let b = b?;
    log::info!("Time for matrix-vector product: {matvec_time:.3?}");

    let (factorized, factorize_time) = timed(|| hodlr.factorize());
    factorized.context("Factorization failed")?;
    log::info!("Time to factorize: {factorize_time:.3?}");

    let (solution, solve_time) = timed(|| hodlr.solve(b.as_ref()));
    let solution = solution?;
    log::info!("Time to solve: {solve_time:.3?}");

    if symmetric {
        let (y, time) = timed(|| hodlr.symmetric_factor_transpose_product(x.as_ref()));
        let y = y?;
        log::info!("Time to apply the transposed symmetric factor: {time:.3?}");
        let (wy, time) = timed(|| hodlr.symmetric_factor_product(y.as_ref()));
        let wy = wy?;
        log::info!("Time to apply the symmetric factor: {time:.3?}");
        let error = (&wy - &b).norm_l2() / b.norm_l2();
        log::info!("Relative difference between W Wᵀ x and A x: {error:e}");
    }

    let (log_det, time) = timed(|| hodlr.log_determinant());
    let log_det = log_det?;
    log::info!("Time to calculate log determinant: {time:.3?} (log det = {log_det})");

    let (matvec_error, solve_error, log_det_error) = if args.check {
        let (errors, time) = timed(|| dense_errors(&kernel, &x, &b, &solution, log_det, symmetric));
        log::info!("Time for the dense reference: {time:.3?}");
        let errors = errors?;
        log::info!(
            "Errors vs dense: matvec {:e}, solve {:e}, log det {:e}",
            errors.0,
            errors.1,
            errors.2
        );
        (Some(errors.0), Some(errors.1), Some(errors.2))
    } else {
        let error = (&solution - &x).norm_l2() / x.norm_l2();
        log::info!("Relative error of the solve against the generating vector: {error:e}");
        (None, Some(error), None)
    };

    let result = RunResult {
        method: args.method,
        n,
        leaf_size: args.leaf_size,
        tolerance,
        symmetric,
        max_rank: hodlr.max_rank()?,
        assemble_s: assemble_time.as_secs_f64(),
        matvec_s: matvec_time.as_secs_f64(),
        factorize_s: factorize_time.as_secs_f64(),
        solve_s: solve_time.as_secs_f64(),
        log_det,
        matvec_error,
        solve_error,
        log_det_error,
        rss_kb: get_peak_rss_kb(),
    };

    if let Some(path) = &args.output {
        let mut writer = csv::Writer::from_path(path)
            .with_context(|| format!("Failed to create CSV writer for {path:?}"))?;
        writer.serialize(&result)?;
        writer.flush()?;
        log::info!("Wrote results to {path:?}");
    }
    Ok(())
}

/// Relative errors of the product, the solve and the log-determinant against a dense
/// factorization of the kernel.
fn dense_errors(
    kernel: &MaternKernel,
    x: &Mat<f64>,
    b: &Mat<f64>,
    solution: &Mat<f64>,
    log_det: f64,
    symmetric: bool,
) -> Result<(f64, f64, f64)> {
    let n = kernel.nrows();
    let a = kernel.block(0, 0, n, n);
    let exact = &a * x;
    let matvec_error = (b - &exact).norm_l2() / exact.norm_l2();
    let solve_error = (solution - x).norm_l2() / x.norm_l2();

    let exact_log_det = if symmetric {
        let llt = a
            .llt(Side::Lower)
            .map_err(|e| anyhow!("Dense Cholesky failed: {e:?}"))?;
        let l = llt.L();
        2.0 * (0..n).map(|k| l[(k, k)].ln()).sum::<f64>()
    } else {
        let lu = a.partial_piv_lu();
        let u = lu.U();
        (0..n).map(|k| u[(k, k)].abs().ln()).sum::<f64>()
    };
    let log_det_error = (log_det - exact_log_det).abs() / exact_log_det.abs().max(1.0);
    Ok((matvec_error, solve_error, log_det_error))
}
