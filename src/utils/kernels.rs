//! Kernel matrices over point sets, used as matrix sources by the binaries and tests.
//!
//! HODLR compression relies on nearby indices referring to nearby points. The constructors
//! here therefore order the points along their first coordinate, which is exact in one
//! dimension and good enough for the test problems in higher dimensions.

use crate::matrix::MatrixSource;
use faer::Mat;
use rand::{Rng, SeedableRng, rngs::StdRng};

/// Returns `points` (one point per row) with rows ordered by their first coordinate.
pub fn sort_by_first_coordinate(points: &Mat<f64>) -> Mat<f64> {
    let mut order: Vec<usize> = (0..points.nrows()).collect();
    if points.ncols() > 0 {
        order.sort_by(|&a, &b| points[(a, 0)].total_cmp(&points[(b, 0)]));
    }
    Mat::from_fn(points.nrows(), points.ncols(), |i, k| points[(order[i], k)])
}

/// `n` points drawn uniformly from `[-1, 1]^dim`, sorted by first coordinate.
pub fn random_points(n: usize, dim: usize, seed: u64) -> Mat<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let points = Mat::from_fn(n, dim, |_, _| rng.random_range(-1.0..=1.0));
    sort_by_first_coordinate(&points)
}

fn squared_distance(points: &Mat<f64>, i: usize, j: usize) -> f64 {
    (0..points.ncols())
        .map(|k| {
            let d = points[(i, k)] - points[(j, k)];
            d * d
        })
        .sum()
}

/// Gaussian kernel `exp(-|x_i - x_j|²)` with a constant diagonal.
///
/// A diagonal well above one makes the matrix strictly diagonally dominant for moderate `N`,
/// so it is safe to factorize on both paths.
#[derive(Clone, Debug)]
pub struct GaussianKernel {
    points: Mat<f64>,
    diagonal: f64,
}

impl GaussianKernel {
    pub fn new(points: Mat<f64>, diagonal: f64) -> Self {
        Self { points, diagonal }
    }

    /// Kernel over `n` random points in `[-1, 1]^dim` with diagonal `100`.
    pub fn random(n: usize, dim: usize, seed: u64) -> Self {
        Self::new(random_points(n, dim, seed), 100.0)
    }
}

impl MatrixSource for GaussianKernel {
    fn nrows(&self) -> usize {
        self.points.nrows()
    }

    fn ncols(&self) -> usize {
        self.points.nrows()
    }

    fn entry(&self, i: usize, j: usize) -> f64 {
        if i == j {
            self.diagonal
        } else {
            (-squared_distance(&self.points, i, j)).exp()
        }
    }
}

/// Matérn covariance with smoothness `ν = 5/2`:
///
/// `K(r) = σ² (1 + √5 r/ρ + 5/3 (r/ρ)²) exp(-√5 r/ρ)`, plus `nugget` on the diagonal.
#[derive(Clone, Debug)]
pub struct MaternKernel {
    points: Mat<f64>,
    sigma_squared: f64,
    rho: f64,
    nugget: f64,
}

impl MaternKernel {
    /// Kernel with standard deviation `sigma` and length scale `rho` over `points`.
    pub fn new(points: Mat<f64>, sigma: f64, rho: f64) -> Self {
        Self {
            points,
            sigma_squared: sigma * sigma,
            rho,
            nugget: 0.0,
        }
    }

    /// Adds `nugget` to every diagonal entry.
    pub fn with_nugget(mut self, nugget: f64) -> Self {
        self.nugget = nugget;
        self
    }

    /// Kernel over `n` sorted random points in `[-1, 1]`.
    pub fn random(n: usize, sigma: f64, rho: f64, seed: u64) -> Self {
        Self::new(random_points(n, 1, seed), sigma, rho)
    }
}

impl MatrixSource for MaternKernel {
    fn nrows(&self) -> usize {
        self.points.nrows()
    }

    fn ncols(&self) -> usize {
        self.points.nrows()
    }

    fn entry(&self, i: usize, j: usize) -> f64 {
        let r = squared_distance(&self.points, i, j).sqrt() / self.rho;
        let sqrt5_r = 5f64.sqrt() * r;
        let value = self.sigma_squared * (1.0 + sqrt5_r + 5.0 / 3.0 * r * r) * (-sqrt5_r).exp();
        if i == j { value + self.nugget } else { value }
    }
}

/// Dense random symmetric matrix `(|R| + |R|ᵀ)/2 + n² I` with `R` uniform in `[-1, 1]`.
///
/// The off-diagonal part has no low-rank structure, which makes this a hard compression
/// test; the dominant diagonal keeps it positive-definite.
pub fn random_spd_matrix(n: usize, seed: u64) -> Mat<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let r = Mat::from_fn(n, n, |_, _| rng.random_range(-1.0..=1.0f64).abs());
    let shift = (n * n) as f64;
    Mat::from_fn(n, n, |i, j| {
        let value = 0.5 * (r[(i, j)] + r[(j, i)]);
        if i == j { value + shift } else { value }
    })
}
