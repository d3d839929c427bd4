//! Scaling sweep over the matrix size.
//!
//! For every size in `--sizes-start..=--sizes-end` (multiplied by `--sizes-factor` each step)
//! and every requested compression method, a Gaussian kernel over sorted random points is
//! assembled, factorized and solved. Timings, ranks, peak memory and accuracy figures are
//! appended to the output CSV one row at a time, so a sweep that is interrupted keeps the
//! rows it already produced.
//!
//! The matrix-vector error is measured against the dense product, which is evaluated row by
//! row from the kernel and therefore only costs O(N²).

use anyhow::{Context, Result, anyhow, ensure};
use clap::Parser;
use faer::Mat;
use hodlr::{
    Hodlr, HodlrConfig, LowRankMethod, MatrixSource, Parallelism,
    utils::{kernels::GaussianKernel, perf::{get_peak_rss_kb, timed}},
};
use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::Serialize;
use std::path::PathBuf;

/// Command-line arguments.
#[derive(Parser, Debug)]
#[clap(
    name = "scaling",
    about = "Measures HODLR assembly, factorization and solve time against the matrix size."
)]
struct Args {
    /// Smallest matrix size.
    #[clap(long, default_value_t = 1_000)]
    sizes_start: usize,
    /// Largest matrix size.
    #[clap(long, default_value_t = 16_000)]
    sizes_end: usize,
    /// Factor between consecutive sizes.
    #[clap(long, default_value_t = 2)]
    sizes_factor: usize,
    /// Largest diagonal block stored densely.
    #[clap(long, default_value_t = 100)]
    leaf_size: usize,
    /// Compression tolerance (read as the target rank for randomized SVD).
    #[clap(long, default_value_t = 1e-10)]
    tolerance: f64,
    /// Compression methods to compare.
    #[clap(long, value_enum, num_args = 1.., default_values_t = [LowRankMethod::RookPivoting])]
    methods: Vec<LowRankMethod>,
    /// Target rank for randomized SVD.
    #[clap(long)]
    rank: Option<usize>,
    /// Dimension of the random point set.
    #[clap(long, default_value_t = 1)]
    dim: usize,
    /// Use the symmetric positive-definite path.
    #[clap(long)]
    spd: bool,
    /// Run every tree level on the calling thread.
    #[clap(long)]
    sequential: bool,
    /// Seed for the points and the test vector.
    #[clap(long, default_value_t = 42)]
    seed: u64,
    /// Path to the output CSV file.
    #[clap(long, value_name = "PATH")]
    output: PathBuf,
}

/// One row of the output CSV.
#[derive(Debug, Serialize)]
struct ScalingResult {
    method: LowRankMethod,
    n: usize,
    leaf_size: usize,
    depth: usize,
    max_rank: usize,
    parallelism: Parallelism,
    assemble_s: f64,
    factorize_s: f64,
    solve_s: f64,
    matvec_error: f64,
    solve_error: f64,
    rss_kb: u64,
}

fn main() -> Result<()> {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .try_init()
        .map_err(|e| anyhow!("Failed to initialize logger: {}", e))?;

    let args = Args::parse();
    ensure!(args.sizes_factor >= 2, "--sizes-factor must be at least 2.");
    ensure!(args.sizes_start > 0, "--sizes-start must be positive.");

    let mut writer = csv::Writer::from_path(&args.output)
        .with_context(|| format!("Failed to create CSV writer for {:?}", &args.output))?;

    let parallelism = if args.sequential {
        Parallelism::Sequential
    } else {
        Parallelism::Rayon
    };

    let mut n = args.sizes_start;
    while n <= args.sizes_end {
        let kernel = GaussianKernel::random(n, args.dim, args.seed);
        let mut rng = StdRng::seed_from_u64(args.seed.wrapping_add(n as u64));
        let x = Mat::from_fn(n, 1, |_, _| rng.random::<f64>() - 0.5);
        let exact = dense_product(&kernel, &x);

        for &method in &args.methods {
            log::info!("N = {n}, method = {method}");
            let result = run(&args, &kernel, method, parallelism, &x, &exact)
                .with_context(|| format!("Run failed for N = {n}, method = {method}"))?;
            writer.serialize(&result)?;
            writer.flush()?;
        }
        n *= args.sizes_factor;
    }
    log::info!("Wrote results to {:?}", &args.output);
    Ok(())
}

fn run(
    args: &Args,
    kernel: &GaussianKernel,
    method: LowRankMethod,
    parallelism: Parallelism,
    x: &Mat<f64>,
    exact: &Mat<f64>,
) -> Result<ScalingResult> {
    let n = kernel.nrows();
    let mut config = HodlrConfig::new(n, args.leaf_size, args.tolerance)
        .with_seed(args.seed)
        .with_parallelism(parallelism);
    if let Some(rank) = args.rank {
        config = config.with_rank(rank);
    }
    let mut hodlr = Hodlr::new(config);

    let (assembled, assemble_time) = timed(|| hodlr.assemble(kernel, method, true, args.spd));
    assembled?;
    let b = hodlr.matmat_product(x.as_ref())?;
    let matvec_error = (&b - exact).norm_l2() / exact.norm_l2();

    let (factorized, factorize_time) = timed(|| hodlr.factorize());
    factorized?;
    let (solution, solve_time) = timed(|| hodlr.solve(b.as_ref()));
    let solve_error = (&solution? - x).norm_l2() / x.norm_l2();

    Ok(ScalingResult {
        method,
        n,
        leaf_size: args.leaf_size,
        depth: hodlr.depth()?,
        max_rank: hodlr.max_rank()?,
        parallelism,
        assemble_s: assemble_time.as_secs_f64(),
        factorize_s: factorize_time.as_secs_f64(),
        solve_s: solve_time.as_secs_f64(),
        matvec_error,
        solve_error,
        rss_kb: get_peak_rss_kb(),
    })
}

/// `A x` evaluated one row of the kernel at a time.
fn dense_product(kernel: &GaussianKernel, x: &Mat<f64>) -> Mat<f64> {
    let n = kernel.nrows();
    let mut y = Mat::zeros(n, x.ncols());
    for i in 0..n {
        let row = kernel.block(i, 0, 1, n);
        let value = &row * x;
        for k in 0..x.ncols() {
            y[(i, k)] = value[(0, k)];
        }
    }
    y
}
